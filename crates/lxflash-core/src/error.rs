//! Error types for lxflash-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate. Failures carry the raw control or status register
//! value so the hardware condition can be diagnosed from the error alone.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
///
/// None of these errors are retried internally. Every failure aborts the
/// in-progress erase/write; an aborted write leaves flash contents at and
/// after the failing address in an undefined state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The debug probe failed to complete a register access
    Probe,

    /// The PELOCK key handshake did not clear the erase/program lock bit
    UnlockFailed {
        /// Control register value observed after the handshake
        control: u32,
    },
    /// A prerequisite lock was not released before a dependent unlock, or
    /// an operation was attempted in the wrong lock state
    LockState {
        /// Control register value observed when the violation was detected
        control: u32,
    },
    /// BUSY never cleared within the polling bound
    OperationTimeout,
    /// The status register reported a protection/alignment/size error
    WriteFailed {
        /// Raw status register value including the latched error bits
        status: u32,
    },

    /// Write start address is not word-aligned
    InvalidAlignment,
    /// Address range extends beyond the target's flash region
    AddressOutOfBounds,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probe => write!(f, "debug probe register access failed"),
            Self::UnlockFailed { control } => {
                write!(f, "NVM unlock handshake failed (PECR = 0x{:08X})", control)
            }
            Self::LockState { control } => {
                write!(f, "NVM lock state violation (PECR = 0x{:08X})", control)
            }
            Self::OperationTimeout => write!(f, "NVM operation timed out"),
            Self::WriteFailed { status } => {
                write!(f, "NVM operation failed (SR = 0x{:08X})", status)
            }
            Self::InvalidAlignment => write!(f, "write address must be word-aligned"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
