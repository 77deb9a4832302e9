//! High-level erase and write operations
//!
//! These orchestrate whole-region erase and the half-page programming
//! algorithm on top of [`NvmController`]. Each call constructs its own
//! controller, unlocks, performs one operation, and locks again - on the
//! error path as well, returning the device to a safe state.

use log::{debug, trace};
use maybe_async::maybe_async;

use super::controller::NvmController;
use super::regs::Pecr;
use crate::device::FlashContext;
use crate::error::{Error, Result};
use crate::probe::Probe;
use crate::progress::ProgressReporter;

/// Largest half page across the supported variants, in words
const MAX_HALF_PAGE_WORDS: usize = 32;

/// Options for a [`write`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Erase before programming
    pub erase: bool,
    /// Accepted for interface compatibility; verification is the caller's
    /// responsibility via an external read-back after the call returns
    pub verify: bool,
    /// With `erase`, erase only the pages covering the write range instead
    /// of the whole flash region
    pub erase_sizes: bool,
}

/// Erase the first `total_size` bytes of flash, page by page
///
/// Equivalent to repeated page erase across the whole region; a hardware
/// mass erase is deliberately not used because it would also clear the
/// EEPROM-backed option storage.
#[maybe_async]
pub async fn erase_all<P, R>(
    probe: &mut P,
    ctx: &FlashContext,
    total_size: u32,
    progress: &mut R,
) -> Result<()>
where
    P: Probe + ?Sized,
    R: ProgressReporter,
{
    if total_size > ctx.flash_size {
        return Err(Error::AddressOutOfBounds);
    }

    let mut nvm = NvmController::new(probe, ctx.profile);
    let result = erase_all_inner(&mut nvm, ctx, total_size, progress).await;
    let locked = nvm.lock().await;
    result.and(locked)
}

#[maybe_async]
async fn erase_all_inner<P, R>(
    nvm: &mut NvmController<'_, P>,
    ctx: &FlashContext,
    total_size: u32,
    progress: &mut R,
) -> Result<()>
where
    P: Probe + ?Sized,
    R: ProgressReporter,
{
    nvm.unlock().await?;
    nvm.prog_unlock().await?;
    nvm.erase_pages(ctx.profile.flash_base, total_size, progress)
        .await
}

/// Write `data` to flash starting at `addr`
///
/// `addr` must be word-aligned and the range must lie within flash; both
/// are checked before any register access. With `options.erase`, the pages
/// covering the range (or the whole region, without `erase_sizes`) are
/// erased first.
///
/// Programming consumes `data` from `addr` forward: chunks are clamped to
/// the next half-page boundary while unaligned, the whole remainder when
/// less than a half page is left, and everything in between goes out as
/// half-page bursts in fast-programming mode. Words that already carry the
/// erased pattern are skipped (see
/// [`crate::device::DeviceProfile::erased_word`]).
#[maybe_async]
pub async fn write<P, R>(
    probe: &mut P,
    ctx: &FlashContext,
    addr: u32,
    data: &[u8],
    options: &WriteOptions,
    progress: &mut R,
) -> Result<()>
where
    P: Probe + ?Sized,
    R: ProgressReporter,
{
    if addr % 4 != 0 {
        return Err(Error::InvalidAlignment);
    }
    if !ctx.is_valid_range(addr, data.len()) {
        return Err(Error::AddressOutOfBounds);
    }
    if options.verify {
        debug!("verify requested; caller performs the read-back after this call");
    }

    let mut nvm = NvmController::new(probe, ctx.profile);
    let result = write_inner(&mut nvm, ctx, addr, data, options, progress).await;
    let locked = nvm.lock().await;
    progress.done();
    result.and(locked)
}

#[maybe_async]
async fn write_inner<P, R>(
    nvm: &mut NvmController<'_, P>,
    ctx: &FlashContext,
    addr: u32,
    data: &[u8],
    options: &WriteOptions,
    progress: &mut R,
) -> Result<()>
where
    P: Probe + ?Sized,
    R: ProgressReporter,
{
    nvm.unlock().await?;
    nvm.prog_unlock().await?;

    if options.erase {
        if options.erase_sizes {
            nvm.erase_pages(addr, data.len() as u32, progress).await?;
        } else {
            nvm.erase_pages(ctx.profile.flash_base, ctx.flash_size, progress)
                .await?;
        }
    }

    let half_page = ctx.profile.half_page_size();
    debug!(
        "writing {} bytes at 0x{:08X} (half page {} bytes)",
        data.len(),
        addr,
        half_page
    );
    progress.start("Writing flash", addr, addr + data.len() as u32);

    let mut current = addr;
    let mut remaining = data;
    let mut burst_mode = false;

    while !remaining.is_empty() {
        let offset_in_half = current % half_page;

        if offset_in_half != 0 || (remaining.len() as u32) < half_page {
            // Partial chunk: clamp to the next half-page boundary, or take
            // the whole remainder, and program word by word.
            let mut chunk_len = remaining.len();
            if offset_in_half != 0 {
                chunk_len = chunk_len.min((half_page - offset_in_half) as usize);
            }
            if burst_mode {
                nvm.set_control(Pecr::empty()).await?;
                burst_mode = false;
            }

            let (chunk, rest) = remaining.split_at(chunk_len);
            write_words(nvm, ctx, current, chunk).await?;
            current += chunk_len as u32;
            remaining = rest;
        } else {
            if !burst_mode {
                nvm.set_control(Pecr::FPRG | Pecr::PRG).await?;
                burst_mode = true;
            }

            let (chunk, rest) = remaining.split_at(half_page as usize);
            write_half_page(nvm, ctx, current, chunk).await?;
            current += half_page;
            remaining = rest;
        }

        progress.update(current);
    }

    nvm.set_control(Pecr::empty()).await
}

/// Program a partial chunk one word at a time
#[maybe_async]
async fn write_words<P>(
    nvm: &mut NvmController<'_, P>,
    ctx: &FlashContext,
    addr: u32,
    chunk: &[u8],
) -> Result<()>
where
    P: Probe + ?Sized,
{
    let erased = ctx.profile.erased_word;
    let mut word_addr = addr;

    for bytes in chunk.chunks(4) {
        let mut word = [0u8; 4];
        word[..bytes.len()].copy_from_slice(bytes);
        let value = u32::from_le_bytes(word);

        // Words already carrying the erased pattern need no programming.
        if value != erased {
            trace!("program word 0x{:08X} = 0x{:08X}", word_addr, value);
            nvm.program_word(word_addr, value).await?;
        }
        word_addr += 4;
    }

    Ok(())
}

/// Burst-program one aligned half page
#[maybe_async]
async fn write_half_page<P>(
    nvm: &mut NvmController<'_, P>,
    ctx: &FlashContext,
    addr: u32,
    chunk: &[u8],
) -> Result<()>
where
    P: Probe + ?Sized,
{
    let erased = ctx.profile.erased_word;
    let count = chunk.len() / 4;
    let mut words = [0u32; MAX_HALF_PAGE_WORDS];

    for (i, bytes) in chunk.chunks_exact(4).enumerate() {
        words[i] = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }

    // A block that is entirely the erased pattern needs no programming.
    if words[..count].iter().all(|w| *w == erased) {
        return Ok(());
    }

    trace!("program half page 0x{:08X} ({} words)", addr, count);
    nvm.program_half_page(addr, &words[..count]).await
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::device::DeviceProfile;
    use crate::progress::{NoProgress, ProgressReporter};
    use crate::testutil::MockProbe;
    use std::string::{String, ToString};
    use std::vec;
    use std::vec::Vec;

    const L0: DeviceProfile = DeviceProfile::STM32L0;

    fn ctx() -> FlashContext {
        FlashContext::new(L0, 64 * 1024)
    }

    fn pattern(len: usize) -> Vec<u8> {
        // No all-zero words, so nothing gets skipped.
        (0..len).map(|i| (i % 251 + 1) as u8).collect()
    }

    #[test]
    fn misaligned_address_touches_no_registers() {
        let mut probe = MockProbe::new();
        let err = write(
            &mut probe,
            &ctx(),
            L0.flash_base + 2,
            &[1, 2, 3, 4],
            &WriteOptions::default(),
            &mut NoProgress,
        )
        .unwrap_err();
        assert_eq!(err, Error::InvalidAlignment);
        assert!(probe.reg_writes.is_empty());
        assert!(probe.flash_writes.is_empty());
        assert!(probe.bursts.is_empty());
    }

    #[test]
    fn out_of_range_write_is_rejected_up_front() {
        let mut probe = MockProbe::new();
        let c = ctx();
        let err = write(
            &mut probe,
            &c,
            c.flash_end() - 4,
            &[0u8; 8],
            &WriteOptions::default(),
            &mut NoProgress,
        )
        .unwrap_err();
        assert_eq!(err, Error::AddressOutOfBounds);
        assert!(probe.reg_writes.is_empty());
    }

    #[test]
    fn failed_unlock_stops_before_any_programming() {
        let mut probe = MockProbe::new();
        probe.auto_unlock = false;

        let err = write(
            &mut probe,
            &ctx(),
            L0.flash_base,
            &pattern(16),
            &WriteOptions::default(),
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnlockFailed { .. }));
        assert!(probe.flash_writes.is_empty());
        assert!(probe.bursts.is_empty());
    }

    #[test]
    fn unaligned_start_splits_into_expected_chunks() {
        // Page size 128 so half pages are 64 bytes. 300 bytes starting 16
        // bytes past a half-page boundary: 48 word-wise, then aligned
        // 64-byte bursts while a full half page remains (3 of them), then
        // the trailing 60 bytes word-wise.
        let mut probe = MockProbe::new();
        let base = L0.flash_base;
        let data = pattern(300);

        write(
            &mut probe,
            &ctx(),
            base + 16,
            &data,
            &WriteOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        let burst_addrs: Vec<u32> = probe.bursts.iter().map(|(a, _)| *a).collect();
        assert_eq!(burst_addrs, vec![base + 64, base + 128, base + 192]);
        assert!(probe.bursts.iter().all(|(_, w)| w.len() == 16));

        // 48 leading bytes and 60 trailing bytes, one word each.
        let word_addrs: Vec<u32> = probe.flash_writes.iter().map(|(a, _)| *a).collect();
        let leading: Vec<u32> = (0..12).map(|i| base + 16 + 4 * i).collect();
        let trailing: Vec<u32> = (0..15).map(|i| base + 256 + 4 * i).collect();
        assert_eq!(word_addrs[..12], leading[..]);
        assert_eq!(word_addrs[12..], trailing[..]);

        // The chunks, concatenated in order, reproduce the buffer.
        assert_eq!(probe.image_of_writes(base + 16, 300), data);
    }

    #[test]
    fn burst_mode_is_entered_once_per_run() {
        let mut probe = MockProbe::new();
        let base = L0.flash_base;

        write(
            &mut probe,
            &ctx(),
            base,
            &pattern(256),
            &WriteOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        let pecr = L0.nvm_base + crate::nvm::regs::PECR_OFFSET;
        let fprg = (Pecr::FPRG | Pecr::PRG).bits();
        let fprg_writes = probe
            .reg_writes
            .iter()
            .filter(|(a, v)| *a == pecr && *v == fprg)
            .count();
        assert_eq!(fprg_writes, 1);
        assert_eq!(probe.bursts.len(), 4);

        // Control register cleared at the end of the run.
        let last_pecr = probe
            .reg_writes
            .iter()
            .rev()
            .find(|(a, _)| *a == pecr)
            .map(|(_, v)| *v);
        assert_eq!(last_pecr, Some(Pecr::PELOCK.bits()));
    }

    #[test]
    fn erased_words_are_skipped() {
        let mut probe = MockProbe::new();
        let base = L0.flash_base;
        // Second word is all-zero: the erased pattern for this family.
        let data = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8];

        write(
            &mut probe,
            &ctx(),
            base + 16,
            &data,
            &WriteOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        let word_addrs: Vec<u32> = probe.flash_writes.iter().map(|(a, _)| *a).collect();
        assert_eq!(word_addrs, vec![base + 16, base + 24]);
    }

    #[test]
    fn erased_half_pages_are_skipped() {
        let mut probe = MockProbe::new();
        let base = L0.flash_base;
        let mut data = pattern(192);
        // Middle half page entirely erased pattern.
        data[64..128].fill(0);

        write(
            &mut probe,
            &ctx(),
            base,
            &data,
            &WriteOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        let burst_addrs: Vec<u32> = probe.bursts.iter().map(|(a, _)| *a).collect();
        assert_eq!(burst_addrs, vec![base, base + 128]);
    }

    #[test]
    fn erase_option_rounds_to_covering_pages() {
        let mut probe = MockProbe::new();
        let base = L0.flash_base;
        let opts = WriteOptions {
            erase: true,
            erase_sizes: true,
            ..Default::default()
        };

        write(&mut probe, &ctx(), base + 200, &pattern(100), &opts, &mut NoProgress).unwrap();

        // [base+200, base+300) covers pages at base+128 and base+256.
        let triggers: Vec<u32> = probe
            .flash_writes
            .iter()
            .filter(|(_, v)| *v == 0)
            .map(|(a, _)| *a)
            .collect();
        assert_eq!(triggers, vec![base + 128, base + 256]);
    }

    #[test]
    fn erase_without_sizes_covers_whole_region() {
        let mut probe = MockProbe::new();
        let c = FlashContext::new(L0, 1024);
        let base = L0.flash_base;
        let opts = WriteOptions {
            erase: true,
            ..Default::default()
        };

        write(&mut probe, &c, base + 256, &pattern(64), &opts, &mut NoProgress).unwrap();

        let triggers = probe.flash_writes.iter().filter(|(_, v)| *v == 0).count();
        assert_eq!(triggers, 8); // 1024 / 128 pages
    }

    #[test]
    fn erase_all_bounds_checked_against_context() {
        let mut probe = MockProbe::new();
        let c = FlashContext::new(L0, 1024);
        let err = erase_all(&mut probe, &c, 2048, &mut NoProgress).unwrap_err();
        assert_eq!(err, Error::AddressOutOfBounds);
        assert!(probe.reg_writes.is_empty());
    }

    #[test]
    fn progress_spans_the_write_range() {
        struct Recorder {
            started: Vec<(String, u32, u32)>,
            last: u32,
            done: usize,
        }
        impl ProgressReporter for Recorder {
            fn start(&mut self, label: &str, min: u32, max: u32) {
                self.started.push((label.into(), min, max));
            }
            fn update(&mut self, value: u32) {
                self.last = value;
            }
            fn done(&mut self) {
                self.done += 1;
            }
        }

        let mut probe = MockProbe::new();
        let base = L0.flash_base;
        let mut progress = Recorder {
            started: Vec::new(),
            last: 0,
            done: 0,
        };

        write(
            &mut probe,
            &ctx(),
            base,
            &pattern(128),
            &WriteOptions::default(),
            &mut progress,
        )
        .unwrap();

        assert_eq!(
            progress.started,
            vec![("Writing flash".to_string(), base, base + 128)]
        );
        assert_eq!(progress.last, base + 128);
        assert!(progress.done >= 1);
    }
}
