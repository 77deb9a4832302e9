//! Silicon variant profiles and runtime flash context
//!
//! The two supported variants differ only in the NVM register block base
//! and the flash page size. The profile is selected once from the debug
//! port core identifier and is immutable for the lifetime of a controller.

use core::fmt;

/// Debug port identifier of the Cortex-M0+ port used by the STM32L0 line
///
/// Any other identifier selects the STM32L1 profile.
pub const CORE_ID_CORTEX_M0PLUS: u32 = 0x0BC1_1477;

/// STM32 product family variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// STM32L0 family (Cortex-M0+, 128-byte pages)
    Stm32L0,
    /// STM32L1 family (Cortex-M3, 256-byte pages)
    Stm32L1,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Stm32L0 => write!(f, "STM32L0"),
            Variant::Stm32L1 => write!(f, "STM32L1"),
        }
    }
}

/// Immutable per-variant configuration table
///
/// Groups the NVM base, flash geometry, and erase polarity so the
/// erase/write logic never references per-variant literals directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// The silicon variant this profile describes
    pub variant: Variant,
    /// Base address of the NVM controller register block
    pub nvm_base: u32,
    /// First address of program flash
    pub flash_base: u32,
    /// Flash page size in bytes
    pub page_size: u32,
    /// The value an erased word reads back as
    ///
    /// Program memory on this family erases to all-zeros, unlike NOR-style
    /// flash which erases to all-ones. The write path skips words equal to
    /// this value; that is only sound while this field matches the true
    /// erase polarity of the part.
    pub erased_word: u32,
}

impl DeviceProfile {
    /// STM32L0: compact 128-byte pages, NVM block at 0x4002_2000
    pub const STM32L0: Self = Self {
        variant: Variant::Stm32L0,
        nvm_base: 0x4002_2000,
        flash_base: 0x0800_0000,
        page_size: 128,
        erased_word: 0x0000_0000,
    };

    /// STM32L1: 256-byte pages, NVM block at 0x4002_3C00
    pub const STM32L1: Self = Self {
        variant: Variant::Stm32L1,
        nvm_base: 0x4002_3C00,
        flash_base: 0x0800_0000,
        page_size: 256,
        erased_word: 0x0000_0000,
    };

    /// Select the profile for a debug port core identifier
    ///
    /// The Cortex-M0+ identifier selects the STM32L0 profile; every other
    /// identifier selects STM32L1.
    pub const fn from_core_id(core_id: u32) -> Self {
        if core_id == CORE_ID_CORTEX_M0PLUS {
            Self::STM32L0
        } else {
            Self::STM32L1
        }
    }

    /// Half-page size in bytes, the burst programming unit
    pub const fn half_page_size(&self) -> u32 {
        self.page_size / 2
    }
}

/// Runtime context for flash operations
///
/// Holds the selected profile together with the detected flash size of the
/// connected part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashContext {
    /// The selected silicon-variant profile
    pub profile: DeviceProfile,
    /// Total flash size of the connected part, in bytes
    pub flash_size: u32,
}

impl FlashContext {
    /// Create a context from an already-selected profile
    pub const fn new(profile: DeviceProfile, flash_size: u32) -> Self {
        Self {
            profile,
            flash_size,
        }
    }

    /// Create a context by selecting the profile from a core identifier
    pub const fn from_core_id(core_id: u32, flash_size: u32) -> Self {
        Self::new(DeviceProfile::from_core_id(core_id), flash_size)
    }

    /// First address past the end of flash
    pub const fn flash_end(&self) -> u32 {
        self.profile.flash_base + self.flash_size
    }

    /// Check that `[addr, addr + len)` lies entirely within flash
    pub fn is_valid_range(&self, addr: u32, len: usize) -> bool {
        if addr < self.profile.flash_base {
            return false;
        }
        let end = addr as u64 + len as u64;
        end <= self.profile.flash_base as u64 + self.flash_size as u64
    }
}
