//! lxflash-dummy - In-memory STM32Lx NVM emulator for testing
//!
//! This crate emulates the NVM register block and flash array of an
//! STM32L0/L1 target behind the [`Probe`] trait. It's useful for testing
//! and development without real hardware: the key-handshake rules, lock
//! bits, page erase, half-page bursts, and the latched status bits all
//! behave like the real controller, including the error cases.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

#[cfg(feature = "alloc")]
use log::{debug, warn};

#[cfg(feature = "alloc")]
use lxflash_core::device::{DeviceProfile, FlashContext};
use lxflash_core::device::CORE_ID_CORTEX_M0PLUS;
#[cfg(feature = "alloc")]
use lxflash_core::error::{Error, Result};
#[cfg(feature = "alloc")]
use lxflash_core::nvm::regs::{self, Pecr, Sr};
#[cfg(feature = "alloc")]
use lxflash_core::probe::Probe;

/// Configuration for the dummy target
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Debug port core identifier reported by the probe
    pub core_id: u32,
    /// Flash size in bytes
    pub flash_size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            core_id: CORE_ID_CORTEX_M0PLUS, // STM32L0
            flash_size: 64 * 1024,
        }
    }
}

#[cfg(feature = "alloc")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyStage {
    Idle,
    FirstAccepted,
}

/// Dummy STM32Lx target
///
/// Emulates the NVM register block and flash array in memory.
#[cfg(feature = "alloc")]
pub struct DummyTarget {
    config: DummyConfig,
    profile: DeviceProfile,
    flash: Vec<u8>,
    pecr: u32,
    sr: u32,
    pekey_stage: KeyStage,
    prgkey_stage: KeyStage,
    halts: u32,
    slept_us: u64,
    stick_busy: bool,
    reg_writes: Vec<(u32, u32)>,
}

#[cfg(feature = "alloc")]
impl DummyTarget {
    /// Create a new dummy target with the given configuration
    ///
    /// Flash starts in the erased state (all zeros on this family) and
    /// both locks are set, as after reset.
    pub fn new(config: DummyConfig) -> Self {
        let profile = DeviceProfile::from_core_id(config.core_id);
        let flash = vec![0x00; config.flash_size];
        Self {
            config,
            profile,
            flash,
            pecr: (Pecr::PELOCK | Pecr::PRGLOCK).bits(),
            sr: 0,
            pekey_stage: KeyStage::Idle,
            prgkey_stage: KeyStage::Idle,
            halts: 0,
            slept_us: 0,
            stick_busy: false,
            reg_writes: Vec::new(),
        }
    }

    /// Create a new dummy target with the default configuration (STM32L0)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy target with pre-filled flash contents
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut target = Self::new(config);
        let len = core::cmp::min(initial_data.len(), target.flash.len());
        target.flash[..len].copy_from_slice(&initial_data[..len]);
        target
    }

    /// Flash context matching this target's variant and size
    pub fn context(&self) -> FlashContext {
        FlashContext::from_core_id(self.config.core_id, self.config.flash_size as u32)
    }

    /// Get a reference to the flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Get a mutable reference to the flash contents
    pub fn flash_mut(&mut self) -> &mut [u8] {
        &mut self.flash
    }

    /// Current control register value
    pub fn pecr(&self) -> u32 {
        self.pecr
    }

    /// Current status register value
    pub fn sr(&self) -> u32 {
        self.sr
    }

    /// Number of halt_core calls seen
    pub fn halts(&self) -> u32 {
        self.halts
    }

    /// Total time slept through delay_us, in microseconds
    pub fn slept_us(&self) -> u64 {
        self.slept_us
    }

    /// All register-block writes seen, in order
    pub fn reg_writes(&self) -> &[(u32, u32)] {
        &self.reg_writes
    }

    /// Make BUSY stick: operations start but never complete
    pub fn set_stick_busy(&mut self, stick: bool) {
        self.stick_busy = stick;
    }

    fn locks_set(&self) -> bool {
        self.pecr & (Pecr::PELOCK | Pecr::PRGLOCK).bits() != 0
    }

    fn mode(&self) -> Pecr {
        Pecr::from_bits_truncate(self.pecr)
    }

    fn flash_range(&self, addr: u32) -> Option<usize> {
        let base = self.profile.flash_base;
        if addr >= base && ((addr - base) as usize) < self.flash.len() {
            Some((addr - base) as usize)
        } else {
            None
        }
    }

    fn relock(&mut self) {
        self.pecr |= (Pecr::PELOCK | Pecr::PRGLOCK).bits();
        self.pekey_stage = KeyStage::Idle;
        self.prgkey_stage = KeyStage::Idle;
    }

    fn handle_pecr_write(&mut self, value: u32) {
        if value & Pecr::PELOCK.bits() != 0 {
            // Setting PELOCK re-asserts PRGLOCK as well.
            self.relock();
            return;
        }
        let locks = (Pecr::PELOCK | Pecr::PRGLOCK).bits();
        let modes = (Pecr::PRG | Pecr::ERASE | Pecr::FPRG).bits();
        let mut next = (self.pecr & locks) | (value & modes);
        if value & Pecr::PRGLOCK.bits() != 0 {
            next |= Pecr::PRGLOCK.bits();
        }
        self.pecr = next;
    }

    fn handle_pekey_write(&mut self, value: u32) {
        if self.pecr & Pecr::PELOCK.bits() == 0 {
            // Replaying the key sequence without an intervening lock is a
            // hardware error; the block locks back up.
            warn!("PEKEYR written while PELOCK already clear");
            self.relock();
            return;
        }
        self.pekey_stage = match (self.pekey_stage, value) {
            (KeyStage::Idle, regs::PEKEY1) => KeyStage::FirstAccepted,
            (KeyStage::FirstAccepted, regs::PEKEY2) => {
                self.pecr &= !Pecr::PELOCK.bits();
                KeyStage::Idle
            }
            _ => KeyStage::Idle,
        };
    }

    fn handle_prgkey_write(&mut self, value: u32) {
        if self.pecr & Pecr::PELOCK.bits() != 0 {
            // PRGLOCK can only be released once PELOCK is clear.
            self.prgkey_stage = KeyStage::Idle;
            return;
        }
        if self.pecr & Pecr::PRGLOCK.bits() == 0 {
            warn!("PRGKEYR written while PRGLOCK already clear");
            self.relock();
            return;
        }
        self.prgkey_stage = match (self.prgkey_stage, value) {
            (KeyStage::Idle, regs::PRGKEY1) => KeyStage::FirstAccepted,
            (KeyStage::FirstAccepted, regs::PRGKEY2) => {
                self.pecr &= !Pecr::PRGLOCK.bits();
                KeyStage::Idle
            }
            _ => KeyStage::Idle,
        };
    }

    fn program_word(&mut self, addr: u32, value: u32) -> Result<()> {
        let offset = self.flash_range(addr).ok_or(Error::Probe)?;

        if self.stick_busy {
            self.sr |= Sr::BSY.bits();
            return Ok(());
        }

        let mode = self.mode();
        if mode.contains(Pecr::ERASE | Pecr::PRG) {
            if self.locks_set() {
                self.sr |= Sr::WRPERR.bits();
                return Ok(());
            }
            let page = self.profile.page_size as usize;
            let start = offset & !(page - 1);
            debug!("dummy: erase page at flash offset 0x{:X}", start);
            self.flash[start..start + page].fill(0x00);
            self.sr |= Sr::EOP.bits();
            return Ok(());
        }

        if mode.contains(Pecr::FPRG) {
            // A lone word write in fast-programming mode is a sequencing
            // bug in the engine; the hardware flags it.
            self.sr |= Sr::SIZERR.bits();
            return Ok(());
        }

        if self.locks_set() {
            self.sr |= Sr::WRPERR.bits();
            return Ok(());
        }
        if addr % 4 != 0 {
            self.sr |= Sr::PGAERR.bits();
            return Ok(());
        }

        self.flash[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        self.sr |= Sr::EOP.bits();
        Ok(())
    }
}

#[cfg(feature = "alloc")]
impl Probe for DummyTarget {
    fn read32(&mut self, addr: u32) -> Result<u32> {
        let base = self.profile.nvm_base;
        if addr >= base && addr < base + 0x1C {
            return Ok(match addr - base {
                regs::PECR_OFFSET => self.pecr,
                regs::SR_OFFSET => self.sr,
                _ => 0,
            });
        }
        let offset = self.flash_range(addr).ok_or(Error::Probe)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.flash[offset..offset + 4]);
        Ok(u32::from_le_bytes(word))
    }

    fn write32(&mut self, addr: u32, value: u32) -> Result<()> {
        let base = self.profile.nvm_base;
        if addr >= base && addr < base + 0x1C {
            self.reg_writes.push((addr, value));
            match addr - base {
                regs::PECR_OFFSET => self.handle_pecr_write(value),
                regs::PEKEYR_OFFSET => self.handle_pekey_write(value),
                regs::PRGKEYR_OFFSET => self.handle_prgkey_write(value),
                regs::SR_OFFSET => {
                    // EOP and the error bits are write-1-to-clear.
                    let w1c = (Sr::EOP | Sr::ERRORS).bits();
                    self.sr &= !(value & w1c);
                }
                _ => {}
            }
            return Ok(());
        }
        self.program_word(addr, value)
    }

    fn write_block(&mut self, addr: u32, words: &[u32]) -> Result<()> {
        let mode = self.mode();
        if !mode.contains(Pecr::FPRG | Pecr::PRG) {
            // Without fast-programming mode this is just consecutive
            // single-word writes.
            for (i, word) in words.iter().enumerate() {
                self.write32(addr + 4 * i as u32, *word)?;
            }
            return Ok(());
        }

        let offset = self.flash_range(addr).ok_or(Error::Probe)?;

        if self.stick_busy {
            self.sr |= Sr::BSY.bits();
            return Ok(());
        }
        if self.locks_set() {
            self.sr |= Sr::WRPERR.bits();
            return Ok(());
        }

        let half_page = self.profile.half_page_size();
        if addr % half_page != 0 {
            self.sr |= Sr::PGAERR.bits();
            return Ok(());
        }
        if words.len() != (half_page / 4) as usize {
            self.sr |= Sr::SIZERR.bits();
            return Ok(());
        }

        for (i, word) in words.iter().enumerate() {
            let at = offset + 4 * i;
            self.flash[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }
        self.sr |= Sr::EOP.bits();
        Ok(())
    }

    fn halt_core(&mut self) -> Result<()> {
        self.halts += 1;
        Ok(())
    }

    fn core_id(&self) -> u32 {
        self.config.core_id
    }

    fn delay_us(&mut self, us: u32) {
        self.slept_us += us as u64;
    }
}
