mod buffer;
mod image;
mod format;
pub mod barrier;
mod command;
mod device;
mod error;

pub mod null;

use std::fmt;

pub use buffer::{Buffer, BufferDesc, BufferUsageFlags, MemoryLocation};
pub use image::{Image, ImageDesc, ImageType, ImageUsageFlags, SampleCount};
pub use format::Format;
pub use barrier::{AccessType, ImageBarrier, BufferBarrier, ImageLayout};
pub use command::CommandBuffer;
pub use device::{RenderDevice, DrawFrame};
pub use error::RHIError;

/// Opaque backend object handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(pub u64);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);

    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
