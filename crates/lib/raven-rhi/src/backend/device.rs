use super::{
    Buffer, BufferBarrier, BufferDesc, CommandBuffer, Image, ImageBarrier, ImageDesc, RHIError,
};

/// Per frame recording state handed out by [`RenderDevice::begin_frame`].
#[derive(Debug)]
pub struct DrawFrame {
    pub frame_index: u64,
    pub command_buffer: CommandBuffer,
}

/// The minimal device surface the render graph needs.
///
/// Frames are identified by a monotonically increasing index. A frame is *retired* once the
/// device guarantees it no longer touches anything that frame referenced, only then objects
/// used by that frame may be destroyed or reused.
pub trait RenderDevice: Send + Sync {
    fn create_buffer(&self, desc: BufferDesc, name: &str) -> Result<Buffer, RHIError>;
    fn create_image(&self, desc: ImageDesc, name: &str) -> Result<Image, RHIError>;

    fn destroy_buffer(&self, buffer: Buffer);
    fn destroy_image(&self, image: Image);

    /// How many frames the device may still be working on while the next one is recorded.
    fn frames_in_flight(&self) -> usize;

    /// Start recording `frame_index`.
    /// May block until the frame `frames_in_flight` frames back is retired.
    fn begin_frame(&self, frame_index: u64) -> DrawFrame;
    /// Submit everything recorded into `frame`.
    fn end_frame(&self, frame: DrawFrame);

    fn is_frame_retired(&self, frame_index: u64) -> bool;
    /// Block until `frame_index` (and every frame before it) is retired.
    fn wait_for_frame(&self, frame_index: u64);
    fn wait_idle(&self);

    fn cmd_pipeline_barrier(
        &self,
        cb: &CommandBuffer,
        buffer_barriers: &[BufferBarrier],
        image_barriers: &[ImageBarrier],
    );
    fn cmd_clear_image(&self, cb: &CommandBuffer, image: &Image, value: [f32; 4]);
    fn cmd_fill_buffer(&self, cb: &CommandBuffer, buffer: &Buffer, value: u32);

    fn cmd_begin_label(&self, cb: &CommandBuffer, name: &str);
    fn cmd_end_label(&self, cb: &CommandBuffer);
}
