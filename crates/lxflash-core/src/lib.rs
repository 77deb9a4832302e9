//! lxflash-core - Core library for STM32L0/L1 flash programming
//!
//! This crate implements the NVM (non-volatile memory controller)
//! programming engine for the STM32L0 and STM32L1 families, driven through
//! an in-circuit debug probe. It owns the lock/unlock key handshakes, page
//! erase, the half-page burst-programming algorithm, and the busy-polling
//! with status decoding that goes with them.
//!
//! Everything below the register-access boundary - probe transport,
//! probe enumeration, CLI, progress display - lives outside this crate.
//! Callers provide a [`probe::Probe`] for raw memory-mapped register
//! access and optionally a [`progress::ProgressReporter`] for one-way
//! progress notifications.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable heap allocation (boxed probe trait objects)
//! - `is_sync` - Compile the engine as blocking/synchronous code
//!
//! # Example
//!
//! ```ignore
//! use lxflash_core::{device::FlashContext, nvm, probe::Probe, progress::NoProgress};
//!
//! fn flash_firmware<P: Probe>(probe: &mut P, image: &[u8]) -> lxflash_core::Result<()> {
//!     let ctx = FlashContext::from_core_id(probe.core_id(), 64 * 1024);
//!     let opts = nvm::WriteOptions { erase: true, ..Default::default() };
//!     nvm::write(probe, &ctx, ctx.profile.flash_base, image, &opts, &mut NoProgress)
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
// Allow async fn in traits - we use maybe-async for dual sync/async support
#![allow(async_fn_in_trait)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod device;
pub mod error;
pub mod nvm;
pub mod poll;
pub mod probe;
pub mod progress;

#[cfg(all(test, feature = "std"))]
pub(crate) mod testutil;

pub use error::{Error, Result};
