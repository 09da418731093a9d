use std::hash::Hash;

use super::RawHandle;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsageFlags: u32 {
        const TRANSFER_SRC   = 1 << 0;
        const TRANSFER_DST   = 1 << 1;
        const UNIFORM_TEXEL  = 1 << 2;
        const STORAGE_TEXEL  = 1 << 3;
        const UNIFORM        = 1 << 4;
        const STORAGE        = 1 << 5;
        const INDEX          = 1 << 6;
        const VERTEX         = 1 << 7;
        const INDIRECT       = 1 << 8;
        const ACCELERATION_STRUCTURE_INPUT   = 1 << 9;
        const ACCELERATION_STRUCTURE_STORAGE = 1 << 10;
    }
}

/// Where the memory of a buffer lives, and who can see it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    GpuOnly,
    /// Written by the CPU every frame and read by the GPU.
    CpuToGpu,
    /// Written by the GPU and read back on the CPU.
    GpuToCpu,
}

impl MemoryLocation {
    /// The CPU touches this memory while later frames are being recorded.
    #[inline]
    pub fn is_cpu_visible(&self) -> bool {
        !matches!(self, MemoryLocation::GpuOnly)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub size: usize,
    pub alignment: Option<usize>,
    pub usage: BufferUsageFlags,
    pub memory_location: MemoryLocation,
}

impl BufferDesc {
    pub fn new_gpu_only(size: usize, usage: BufferUsageFlags) -> Self {
        BufferDesc {
            size,
            usage,
            memory_location: MemoryLocation::GpuOnly,
            alignment: None,
        }
    }

    pub fn new_cpu_to_gpu(size: usize, usage: BufferUsageFlags) -> Self {
        BufferDesc {
            size,
            usage,
            memory_location: MemoryLocation::CpuToGpu,
            alignment: None,
        }
    }

    pub fn new_gpu_to_cpu(size: usize, usage: BufferUsageFlags) -> Self {
        BufferDesc {
            size,
            usage,
            memory_location: MemoryLocation::GpuToCpu,
            alignment: None,
        }
    }

    #[inline]
    pub fn alignment(mut self, alignment: usize) -> Self {
        self.alignment = Some(alignment);
        self
    }

    #[inline]
    pub fn usage_flags(mut self, usage: BufferUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    /// Bytes this buffer occupies once aligned.
    pub fn estimate_memory(&self) -> u64 {
        let alignment = self.alignment.unwrap_or(1).max(1);
        (((self.size + alignment - 1) / alignment) * alignment) as u64
    }
}

/// Buffer object created by a [`RenderDevice`](super::RenderDevice).
#[derive(Debug)]
pub struct Buffer {
    pub raw: RawHandle,
    pub desc: BufferDesc,
    pub name: String,
}
