// Raven Engine exposed APIs
pub use super::user::{App, FrameControl};
pub use super::EngineContext;

pub use crate::raven_main;

// render graph module
pub mod rg {
    pub use raven_rg::{
        Executor, FrameStats, GraphResourceRef, PassBuilder, PassContext,
        RenderGraphBuilder, RenderGraphConfig, RgHandle, RT, SRV, UAV,
    };
}

// rhi module
pub mod rhi {
    pub use raven_rhi::backend::{
        AccessType, Buffer, BufferDesc, BufferUsageFlags, Format,
        Image, ImageDesc, ImageUsageFlags, RenderDevice,
    };
}
