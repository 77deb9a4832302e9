//! NVM lock state machine, page erase, and status polling

use log::{debug, trace};
use maybe_async::maybe_async;

use super::regs::{self, Pecr, Sr};
use crate::device::DeviceProfile;
use crate::error::{Error, Result};
use crate::poll::poll_register;
use crate::probe::Probe;
use crate::progress::ProgressReporter;

/// Lock state of the NVM controller, as this engine has driven it
///
/// `Locked -> (PEKEY pair) -> EraseProgramUnlocked -> (PRGKEY pair) ->
/// ProgramUnlocked`. A failed handshake is terminal for the controller
/// instance; there is no retry of a failed key sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// PELOCK set; no erase or program operation possible
    Locked,
    /// PELOCK clear, PRGLOCK still set
    EraseProgramUnlocked,
    /// Both locks clear; erase and program operations allowed
    ProgramUnlocked,
}

/// Drives the NVM register block of one target through a debug probe
///
/// A controller is constructed per erase/write call, unlocked immediately,
/// used for one operation, then explicitly locked by the caller - on the
/// error path too, since a failed operation leaves the device in whatever
/// lock state it had reached.
///
/// The exclusive borrow of the probe is the single-owner token for the
/// physical target; the hardware lock state has no reentrancy guard of
/// its own.
pub struct NvmController<'a, P: Probe + ?Sized> {
    probe: &'a mut P,
    profile: DeviceProfile,
    state: LockState,
}

#[maybe_async]
impl<'a, P: Probe + ?Sized> NvmController<'a, P> {
    /// Create a controller over `probe` for the given variant profile
    pub fn new(probe: &'a mut P, profile: DeviceProfile) -> Self {
        Self {
            probe,
            profile,
            state: LockState::Locked,
        }
    }

    /// Current lock state as driven by this controller
    pub fn state(&self) -> LockState {
        self.state
    }

    fn reg(&self, offset: u32) -> u32 {
        self.profile.nvm_base + offset
    }

    /// Release the erase/program lock (PELOCK)
    ///
    /// Halts the core, waits for any in-flight operation to quiesce,
    /// clears latched status bits, then performs the PEKEY handshake.
    /// Replaying the key sequence against an already-unlocked PECR is a
    /// hardware error, so PELOCK is forced on and read back before the
    /// keys are written.
    pub async fn unlock(&mut self) -> Result<()> {
        debug!("unlocking NVM ({})", self.profile.variant);
        self.probe.halt_core().await?;

        let sr_addr = self.reg(regs::SR_OFFSET);
        poll_register(self.probe, sr_addr, regs::PROGRAM_TIMEOUT_MS, |v| {
            v & Sr::BSY.bits() == 0
        })
        .await?;

        // Latched EOP/error bits are write-1-to-clear.
        let status = self.probe.read32(sr_addr).await?;
        self.probe.write32(sr_addr, status).await?;

        let pecr_addr = self.reg(regs::PECR_OFFSET);
        self.probe.write32(pecr_addr, Pecr::PELOCK.bits()).await?;
        let control = self.probe.read32(pecr_addr).await?;
        if !Pecr::from_bits_truncate(control).contains(Pecr::PELOCK) {
            return Err(Error::UnlockFailed { control });
        }

        self.probe
            .write32(self.reg(regs::PEKEYR_OFFSET), regs::PEKEY1)
            .await?;
        self.probe
            .write32(self.reg(regs::PEKEYR_OFFSET), regs::PEKEY2)
            .await?;

        let control = self.probe.read32(pecr_addr).await?;
        if Pecr::from_bits_truncate(control).contains(Pecr::PELOCK) {
            return Err(Error::UnlockFailed { control });
        }

        self.state = LockState::EraseProgramUnlocked;
        Ok(())
    }

    /// Re-assert PELOCK and halt the core
    pub async fn lock(&mut self) -> Result<()> {
        trace!("locking NVM");
        self.probe
            .write32(self.reg(regs::PECR_OFFSET), Pecr::PELOCK.bits())
            .await?;
        self.probe.halt_core().await?;
        self.state = LockState::Locked;
        Ok(())
    }

    /// Release the program-only lock (PRGLOCK)
    ///
    /// No-op when PRGLOCK is already clear. Fails with a lock state error
    /// when PELOCK has not been released first, or when the PRGKEY pair
    /// does not take.
    pub async fn prog_unlock(&mut self) -> Result<()> {
        let pecr_addr = self.reg(regs::PECR_OFFSET);
        let control = self.probe.read32(pecr_addr).await?;
        let flags = Pecr::from_bits_truncate(control);

        if !flags.contains(Pecr::PRGLOCK) {
            self.state = LockState::ProgramUnlocked;
            return Ok(());
        }
        if flags.contains(Pecr::PELOCK) {
            return Err(Error::LockState { control });
        }

        self.probe
            .write32(self.reg(regs::PRGKEYR_OFFSET), regs::PRGKEY1)
            .await?;
        self.probe
            .write32(self.reg(regs::PRGKEYR_OFFSET), regs::PRGKEY2)
            .await?;

        let control = self.probe.read32(pecr_addr).await?;
        if Pecr::from_bits_truncate(control).contains(Pecr::PRGLOCK) {
            return Err(Error::LockState { control });
        }

        self.state = LockState::ProgramUnlocked;
        Ok(())
    }

    /// Write the given mode flags to the control register
    pub async fn set_control(&mut self, flags: Pecr) -> Result<()> {
        self.probe
            .write32(self.reg(regs::PECR_OFFSET), flags.bits())
            .await
    }

    /// Erase every page touching `[addr, addr + size)`
    ///
    /// The range is rounded outward to page boundaries. Requires
    /// [`Self::prog_unlock`] to have succeeded. Pages are erased one at a
    /// time rather than by mass erase: mass erase on this family also
    /// clears the EEPROM-backed option storage.
    pub async fn erase_pages<R: ProgressReporter>(
        &mut self,
        addr: u32,
        size: u32,
        progress: &mut R,
    ) -> Result<()> {
        if self.state != LockState::ProgramUnlocked {
            let control = self.probe.read32(self.reg(regs::PECR_OFFSET)).await?;
            return Err(Error::LockState { control });
        }

        let page = self.profile.page_size;
        let start = addr & !(page - 1);
        let end = (addr + size + page - 1) & !(page - 1);
        debug!(
            "erasing {} pages: 0x{:08X}..0x{:08X}",
            (end - start) / page,
            start,
            end
        );

        progress.start("Erasing flash", start, end);
        self.set_control(Pecr::ERASE | Pecr::PRG).await?;

        let mut page_addr = start;
        while page_addr < end {
            trace!("erase page 0x{:08X}", page_addr);
            // Writing a word to a page address triggers its erase.
            self.probe.write32(page_addr, 0).await?;
            self.wait_busy(regs::ERASE_TIMEOUT_MS).await?;
            progress.update(page_addr);
            page_addr += page;
        }

        self.set_control(Pecr::empty()).await?;
        progress.done();
        Ok(())
    }

    /// Program a single word and wait for it to complete
    ///
    /// Requires both locks to be released and the control register set up
    /// for the intended mode by the caller.
    pub async fn program_word(&mut self, addr: u32, value: u32) -> Result<()> {
        self.probe.write32(addr, value).await?;
        self.wait_busy(regs::PROGRAM_TIMEOUT_MS).await
    }

    /// Burst-program one half page and wait for it to complete
    ///
    /// The control register must have FPRG|PRG set and `addr` must sit on
    /// a half-page boundary.
    pub async fn program_half_page(&mut self, addr: u32, words: &[u32]) -> Result<()> {
        self.probe.write_block(addr, words).await?;
        self.wait_busy(regs::PROGRAM_TIMEOUT_MS).await
    }

    /// Poll the status register until BUSY clears, then decode the result
    ///
    /// Bounded at 1.5x `nominal_timeout_ms`, sleeping a twentieth of the
    /// nominal timeout between polls.
    pub async fn wait_busy(&mut self, nominal_timeout_ms: u32) -> Result<()> {
        let status = poll_register(
            self.probe,
            self.reg(regs::SR_OFFSET),
            nominal_timeout_ms,
            |v| v & Sr::BSY.bits() == 0,
        )
        .await?;
        self.end_of_operation(status)
    }

    /// Decode a final status register value
    pub fn end_of_operation(&self, status: u32) -> Result<()> {
        if Sr::from_bits_truncate(status).intersects(Sr::ERRORS) {
            return Err(Error::WriteFailed { status });
        }
        Ok(())
    }
}
