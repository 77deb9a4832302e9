//! Bounded register polling
//!
//! Busy-waiting on the NVM status register is a generic "poll a register
//! until a predicate holds or a deadline passes" primitive. The only
//! suspension points are the probe's own `read32` and `delay_us`, so the
//! same code composes under threads, event loops, or cooperative tasks.

use crate::error::{Error, Result};
use crate::probe::Probe;
use maybe_async::maybe_async;

/// Poll `addr` until `done` accepts the value read
///
/// The wait is bounded at 1.5x `nominal_timeout_ms`, sleeping
/// `nominal_timeout_ms / 20` between polls. The first poll happens before
/// any sleep, so an already-satisfied predicate returns immediately.
///
/// Returns the last value read on success, or [`Error::OperationTimeout`]
/// once the bound has fully elapsed. Timeouts are cooperative wall-clock
/// deadlines: a device that never satisfies the predicate is only detected
/// when the bound runs out.
#[maybe_async]
pub async fn poll_register<P, F>(
    probe: &mut P,
    addr: u32,
    nominal_timeout_ms: u32,
    mut done: F,
) -> Result<u32>
where
    P: Probe + ?Sized,
    F: FnMut(u32) -> bool,
{
    let interval_us = nominal_timeout_ms.max(1).saturating_mul(50);
    let bound_us = nominal_timeout_ms.saturating_mul(1500);

    let mut elapsed_us = 0u32;
    loop {
        let value = probe.read32(addr).await?;
        if done(value) {
            return Ok(value);
        }
        if elapsed_us >= bound_us {
            return Err(Error::OperationTimeout);
        }
        probe.delay_us(interval_us).await;
        elapsed_us = elapsed_us.saturating_add(interval_us);
    }
}
