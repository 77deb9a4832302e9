//! Progress reporting for long-running flash operations
//!
//! The engine notifies a reporter one-way while erasing and writing; the
//! reporter never influences the operation. Display (terminal bars, GUI,
//! logging) lives outside this crate.

/// Receives one-way progress notifications from erase/write operations
pub trait ProgressReporter {
    /// Called once when an operation over `[min, max)` begins
    fn start(&mut self, label: &str, min: u32, max: u32);

    /// Called as the operation advances; `value` is within `[min, max]`
    fn update(&mut self, value: u32);

    /// Called when the operation completes or is aborted
    fn done(&mut self);
}

/// A no-op progress reporter
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&mut self, _label: &str, _min: u32, _max: u32) {}
    fn update(&mut self, _value: u32) {}
    fn done(&mut self) {}
}
