use super::RawHandle;

/// A recording target handed out by the device for one frame.
///
/// The command buffer does not own anything, all recording goes through the device
/// so that a backend decides how (and whether) commands are stored.
#[derive(Debug)]
pub struct CommandBuffer {
    pub raw: RawHandle,
    /// The frame this command buffer belongs to. Used to tag resource usage.
    pub frame_index: u64,
}

impl CommandBuffer {
    pub fn new(raw: RawHandle, frame_index: u64) -> Self {
        Self { raw, frame_index }
    }
}
