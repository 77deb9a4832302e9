//! NVM controller: lock state machine, erase, and half-page programming

pub mod regs;

mod controller;
mod driver;

pub use controller::{LockState, NvmController};
pub use driver::{erase_all, write, WriteOptions};
