//! Recording probe mock shared by the unit tests
//!
//! Simulates just enough of the NVM register block for the engine's
//! sequencing to be observable: register writes, flash word writes, and
//! half-page bursts are recorded separately, and the key registers clear
//! the lock bits when the second key of a pair arrives. Full register
//! behavior lives in the lxflash-dummy emulator.

use std::collections::HashMap;
use std::vec::Vec;

use crate::device::{DeviceProfile, CORE_ID_CORTEX_M0PLUS};
use crate::error::Result;
use crate::nvm::regs::{self, Pecr};
use crate::probe::Probe;

pub(crate) struct MockProbe {
    /// Backing store for register reads; missing registers read as 0
    pub regs: HashMap<u32, u32>,
    /// All write32 calls into the NVM register block, in order
    pub reg_writes: Vec<(u32, u32)>,
    /// All write32 calls outside the register block (flash), in order
    pub flash_writes: Vec<(u32, u32)>,
    /// All write_block calls, in order
    pub bursts: Vec<(u32, Vec<u32>)>,
    /// Number of halt_core calls
    pub halts: u32,
    /// Accumulated delay_us time
    pub slept_us: u64,
    /// Whether the key registers actually clear the lock bits
    pub auto_unlock: bool,

    nvm_base: u32,
    read_countdown: HashMap<u32, u32>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self {
            regs: HashMap::new(),
            reg_writes: Vec::new(),
            flash_writes: Vec::new(),
            bursts: Vec::new(),
            halts: 0,
            slept_us: 0,
            auto_unlock: true,
            nvm_base: DeviceProfile::STM32L0.nvm_base,
            read_countdown: HashMap::new(),
        }
    }

    /// After `reads` further reads, `addr` starts reading back as 0
    pub fn clear_reg_after_reads(&mut self, addr: u32, reads: u32) {
        self.read_countdown.insert(addr, reads);
    }

    /// Reconstruct the bytes the recorded word and burst writes would have
    /// placed in `[addr, addr + len)`, zero-filled where nothing was written
    pub fn image_of_writes(&self, addr: u32, len: usize) -> Vec<u8> {
        let mut image = std::vec![0u8; len];
        let mut place = |word_addr: u32, value: u32| {
            if word_addr >= addr && (word_addr - addr) as usize + 4 <= len {
                let offset = (word_addr - addr) as usize;
                image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
            }
        };
        for (a, v) in &self.flash_writes {
            place(*a, *v);
        }
        for (a, words) in &self.bursts {
            for (i, w) in words.iter().enumerate() {
                place(*a + 4 * i as u32, *w);
            }
        }
        image
    }

    fn in_reg_block(&self, addr: u32) -> bool {
        addr >= self.nvm_base && addr < self.nvm_base + 0x1C
    }

    fn current_pecr(&self) -> u32 {
        let pecr = self.nvm_base + regs::PECR_OFFSET;
        *self.regs.get(&pecr).unwrap_or(&0)
    }
}

impl Probe for MockProbe {
    fn read32(&mut self, addr: u32) -> Result<u32> {
        if let Some(left) = self.read_countdown.get_mut(&addr) {
            if *left == 0 {
                self.regs.insert(addr, 0);
            } else {
                *left -= 1;
            }
        }
        Ok(*self.regs.get(&addr).unwrap_or(&0))
    }

    fn write32(&mut self, addr: u32, value: u32) -> Result<()> {
        if !self.in_reg_block(addr) {
            self.flash_writes.push((addr, value));
            return Ok(());
        }

        self.reg_writes.push((addr, value));
        let pecr = self.nvm_base + regs::PECR_OFFSET;
        match addr - self.nvm_base {
            regs::PECR_OFFSET => {
                let stored = if value & Pecr::PELOCK.bits() != 0 {
                    // Asserting PELOCK re-asserts PRGLOCK as well.
                    value | Pecr::PELOCK.bits() | Pecr::PRGLOCK.bits()
                } else {
                    let locks = (Pecr::PELOCK | Pecr::PRGLOCK).bits();
                    (self.current_pecr() & locks) | (value & !locks)
                };
                self.regs.insert(pecr, stored);
            }
            regs::PEKEYR_OFFSET => {
                if self.auto_unlock && value == regs::PEKEY2 {
                    let v = self.current_pecr() & !Pecr::PELOCK.bits();
                    self.regs.insert(pecr, v);
                }
            }
            regs::PRGKEYR_OFFSET => {
                if self.auto_unlock && value == regs::PRGKEY2 {
                    let v = self.current_pecr() & !Pecr::PRGLOCK.bits();
                    self.regs.insert(pecr, v);
                }
            }
            regs::SR_OFFSET => {
                let sr = self.nvm_base + regs::SR_OFFSET;
                let v = *self.regs.get(&sr).unwrap_or(&0) & !value;
                self.regs.insert(sr, v);
            }
            _ => {}
        }
        Ok(())
    }

    fn write_block(&mut self, addr: u32, words: &[u32]) -> Result<()> {
        self.bursts.push((addr, words.to_vec()));
        Ok(())
    }

    fn halt_core(&mut self) -> Result<()> {
        self.halts += 1;
        Ok(())
    }

    fn core_id(&self) -> u32 {
        CORE_ID_CORTEX_M0PLUS
    }

    fn delay_us(&mut self, us: u32) {
        self.slept_us += us as u64;
    }
}
