//! NVM register block layout, unlock keys, and bit definitions
//!
//! Offsets are relative to the per-variant NVM base address
//! (see [`crate::device::DeviceProfile`]). Reference manuals RM0377
//! (STM32L0x1) and RM0038 (STM32L1), chapter "Flash program memory and
//! data EEPROM".

use bitflags::bitflags;

/// Program/erase control register (FLASH_PECR)
pub const PECR_OFFSET: u32 = 0x04;
/// Erase/program key register (FLASH_PEKEYR)
pub const PEKEYR_OFFSET: u32 = 0x0C;
/// Program-only key register (FLASH_PRGKEYR)
pub const PRGKEYR_OFFSET: u32 = 0x10;
/// Option byte key register (FLASH_OPTKEYR)
pub const OPTKEYR_OFFSET: u32 = 0x14;
/// Status register (FLASH_SR)
pub const SR_OFFSET: u32 = 0x18;

/// First PELOCK unlock key
pub const PEKEY1: u32 = 0x89AB_CDEF;
/// Second PELOCK unlock key
pub const PEKEY2: u32 = 0x0203_0405;
/// First PRGLOCK unlock key
pub const PRGKEY1: u32 = 0x8C9D_AEBF;
/// Second PRGLOCK unlock key
pub const PRGKEY2: u32 = 0x1314_1516;

/// Nominal timeout for a page erase, in milliseconds
pub const ERASE_TIMEOUT_MS: u32 = 100;
/// Nominal timeout for a word or half-page program, in milliseconds
pub const PROGRAM_TIMEOUT_MS: u32 = 50;

bitflags! {
    /// FLASH_PECR control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Pecr: u32 {
        /// Erase/program lock; cleared only by the PEKEY pair
        const PELOCK  = 1 << 0;
        /// Program-only lock; cleared only by the PRGKEY pair, and only
        /// while PELOCK is already clear
        const PRGLOCK = 1 << 1;
        /// Program mode
        const PRG     = 1 << 3;
        /// Erase mode
        const ERASE   = 1 << 9;
        /// Fast (half-page) programming mode
        const FPRG    = 1 << 10;
    }
}

bitflags! {
    /// FLASH_SR status register bits
    ///
    /// EOP and the error bits latch and are write-1-to-clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sr: u32 {
        /// An erase/program operation is in flight
        const BSY    = 1 << 0;
        /// End of operation
        const EOP    = 1 << 1;
        /// Write protection error
        const WRPERR = 1 << 8;
        /// Programming alignment error
        const PGAERR = 1 << 9;
        /// Size error
        const SIZERR = 1 << 10;

        /// Any error that fails the operation
        const ERRORS = Self::WRPERR.bits() | Self::PGAERR.bits() | Self::SIZERR.bits();
    }
}
