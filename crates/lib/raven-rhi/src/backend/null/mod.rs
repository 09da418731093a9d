//! Headless backend.
//!
//! Creates no GPU objects, only hands out handles, tracks memory against an optional budget
//! and simulates frame fences. Everything recorded into a command buffer is kept as a
//! [`RecordedCommand`] so callers can inspect what a frame would have submitted.

mod device;
mod recorder;

pub use device::{NullDevice, NullDeviceDesc, NullDeviceDescBuilder, NullDeviceStats};
pub use recorder::{RecordedCommand, BarrierTarget};
