//! Debug probe trait definitions
//!
//! These traits use `maybe_async` to support both sync and async modes.
//! - By default, traits are async (suitable for async probe transports)
//! - With the `is_sync` feature, traits become synchronous

use crate::error::Result;
use maybe_async::maybe_async;

/// Raw register access to a halted target, as exposed by an in-circuit
/// debug probe (sync or async depending on the `is_sync` feature).
///
/// The engine issues every flash operation through this boundary; it never
/// talks to a transport directly. An exclusive `&mut` borrow of a `Probe`
/// is the single-owner access token for one physical target: at most one
/// controller can be active against it at a time, which is what the
/// hardware lock state requires.
#[maybe_async(AFIT)]
pub trait Probe {
    /// Read a 32-bit word from a memory-mapped address
    async fn read32(&mut self, addr: u32) -> Result<u32>;

    /// Write a 32-bit word to a memory-mapped address
    async fn write32(&mut self, addr: u32, value: u32) -> Result<()>;

    /// Write a block of consecutive 32-bit words starting at `addr`
    ///
    /// Used for half-page burst programming; the probe is expected to
    /// issue the words back to back without interleaving other accesses.
    async fn write_block(&mut self, addr: u32, words: &[u32]) -> Result<()>;

    /// Halt the target core
    ///
    /// The core must not execute from flash while the NVM is being erased
    /// or programmed.
    async fn halt_core(&mut self) -> Result<()>;

    /// Debug port core identifier, read once when attaching
    ///
    /// Selects the silicon-variant profile (see [`crate::device`]).
    fn core_id(&self) -> u32;

    /// Delay for the specified number of microseconds
    ///
    /// Supplied by the probe so busy-polling composes under threads,
    /// event loops, or cooperative tasks alike.
    async fn delay_us(&mut self, us: u32);
}

// Blanket impl for boxed probes to allow trait objects (sync mode only)
// In async mode, traits with async fn are not object-safe
#[cfg(all(feature = "alloc", feature = "is_sync"))]
impl Probe for alloc::boxed::Box<dyn Probe + Send> {
    fn read32(&mut self, addr: u32) -> Result<u32> {
        (**self).read32(addr)
    }

    fn write32(&mut self, addr: u32, value: u32) -> Result<()> {
        (**self).write32(addr, value)
    }

    fn write_block(&mut self, addr: u32, words: &[u32]) -> Result<()> {
        (**self).write_block(addr, words)
    }

    fn halt_core(&mut self) -> Result<()> {
        (**self).halt_core()
    }

    fn core_id(&self) -> u32 {
        (**self).core_id()
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}
