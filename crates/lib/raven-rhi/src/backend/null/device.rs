use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::backend::barrier::{BufferBarrier, ImageBarrier};
use crate::backend::{
    Buffer, BufferDesc, CommandBuffer, DrawFrame, Image, ImageDesc, RHIError, RawHandle,
    RenderDevice,
};

use super::recorder::{BarrierTarget, RecordedCommand, Recorder};

#[derive(Builder, Clone, Debug)]
#[builder(pattern = "owned", derive(Clone))]
pub struct NullDeviceDesc {
    #[builder(default = "2")]
    pub frames_in_flight: usize,
    /// Bytes the device can hand out in total. `None` is unlimited.
    #[builder(default, setter(strip_option))]
    pub memory_budget: Option<u64>,
}

impl NullDeviceDesc {
    pub fn builder() -> NullDeviceDescBuilder {
        NullDeviceDescBuilder::default()
    }
}

impl Default for NullDeviceDesc {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            memory_budget: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NullDeviceStats {
    pub buffers_created: u64,
    pub images_created: u64,
    pub buffers_destroyed: u64,
    pub images_destroyed: u64,
    pub live_objects: usize,
    pub allocated_bytes: u64,
    pub peak_allocated_bytes: u64,
    /// Times the CPU had to block on a frame that was not retired yet through [`RenderDevice::wait_for_frame`].
    pub stall_count: u64,
    pub frames_submitted: u64,
    /// Objects destroyed while a frame that used them was still in flight.
    pub unsafe_destroys: u64,
}

#[derive(Default)]
struct Inner {
    recording: Option<u64>,
    /// Submitted but not retired frames, oldest first.
    in_flight: VecDeque<u64>,
    next_frame: u64,

    live: HashMap<RawHandle, u64>,
    failing_names: HashSet<String>,

    recorder: Recorder,
    stats: NullDeviceStats,
}

impl Inner {
    fn is_frame_retired(&self, frame_index: u64) -> bool {
        frame_index < self.next_frame
            && self.recording != Some(frame_index)
            && !self.in_flight.contains(&frame_index)
    }

    /// Retire every in flight frame up to and including `frame_index`. Returns true if any frame got retired.
    fn retire_until(&mut self, frame_index: u64) -> bool {
        let mut retired_any = false;
        while let Some(&oldest) = self.in_flight.front() {
            if oldest > frame_index {
                break;
            }
            self.in_flight.pop_front();
            retired_any = true;
        }
        retired_any
    }

    fn allocate(&mut self, raw: RawHandle, name: &str, bytes: u64, budget: Option<u64>) -> Result<(), RHIError> {
        if self.failing_names.iter().any(|pattern| name.contains(pattern.as_str())) {
            return Err(RHIError::AllocationFailure {
                name: name.to_owned(),
                error: "injected allocation failure".to_owned(),
            });
        }

        if let Some(budget) = budget {
            let available = budget.saturating_sub(self.stats.allocated_bytes);
            if bytes > available {
                return Err(RHIError::OutOfBudget {
                    name: name.to_owned(),
                    requested: bytes,
                    available,
                });
            }
        }

        self.live.insert(raw, bytes);
        self.stats.allocated_bytes += bytes;
        self.stats.peak_allocated_bytes = self.stats.peak_allocated_bytes.max(self.stats.allocated_bytes);
        self.stats.live_objects = self.live.len();
        Ok(())
    }

    fn free(&mut self, raw: RawHandle, name: &str) {
        if let Some(bytes) = self.live.remove(&raw) {
            self.stats.allocated_bytes -= bytes;
            self.stats.live_objects = self.live.len();
        } else {
            glog::error!("Destroying unknown or already destroyed object {} ({})", name, raw);
        }

        if let Some(last_used) = self.recorder.forget(raw) {
            if !self.is_frame_retired(last_used) {
                glog::error!("{} ({}) destroyed while frame {} still uses it!", name, raw, last_used);
                self.stats.unsafe_destroys += 1;
            }
        }
    }
}

/// A [`RenderDevice`] without a GPU behind it.
///
/// Beginning frame `N` retires frame `N - frames_in_flight`, which is what a fence wait at the
/// start of a frame would do on real hardware.
pub struct NullDevice {
    desc: NullDeviceDesc,
    next_handle: AtomicU64,
    inner: Mutex<Inner>,
}

impl NullDevice {
    pub fn new(desc: NullDeviceDesc) -> Self {
        glog::debug!(
            "Null device created: {} frames in flight, memory budget {:?}",
            desc.frames_in_flight,
            desc.memory_budget
        );

        Self {
            desc: NullDeviceDesc {
                frames_in_flight: desc.frames_in_flight.max(1),
                ..desc
            },
            next_handle: AtomicU64::new(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn stats(&self) -> NullDeviceStats {
        self.inner.lock().stats
    }

    /// Make every allocation whose name contains `pattern` fail.
    pub fn fail_allocations_of(&self, pattern: &str) {
        self.inner.lock().failing_names.insert(pattern.to_owned());
    }

    pub fn clear_allocation_failures(&self) {
        self.inner.lock().failing_names.clear();
    }

    /// Commands submitted with the most recent [`RenderDevice::end_frame`].
    pub fn last_submitted_commands(&self) -> Vec<RecordedCommand> {
        self.inner.lock().recorder.last_submitted().to_vec()
    }

    fn new_handle(&self) -> RawHandle {
        RawHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn record(&self, cb: &CommandBuffer, command: RecordedCommand) {
        let mut inner = self.inner.lock();
        if inner.recording != Some(cb.frame_index) {
            glog::warn!("Recording into command buffer of frame {} which is not being recorded", cb.frame_index);
        }
        inner.recorder.record(cb.frame_index, command);
    }
}

impl RenderDevice for NullDevice {
    fn create_buffer(&self, desc: BufferDesc, name: &str) -> Result<Buffer, RHIError> {
        if desc.size == 0 {
            return Err(RHIError::InvalidDescriptor {
                name: name.to_owned(),
                reason: "buffer size is zero",
            });
        }

        let raw = self.new_handle();
        let mut inner = self.inner.lock();
        inner.allocate(raw, name, desc.estimate_memory(), self.desc.memory_budget)?;
        inner.stats.buffers_created += 1;

        Ok(Buffer {
            raw,
            desc,
            name: name.to_owned(),
        })
    }

    fn create_image(&self, desc: ImageDesc, name: &str) -> Result<Image, RHIError> {
        if desc.extent.iter().any(|&e| e == 0) || desc.mip_levels == 0 || desc.array_elements == 0 {
            return Err(RHIError::InvalidDescriptor {
                name: name.to_owned(),
                reason: "image has a zero sized dimension",
            });
        }

        let raw = self.new_handle();
        let mut inner = self.inner.lock();
        inner.allocate(raw, name, desc.estimate_memory(), self.desc.memory_budget)?;
        inner.stats.images_created += 1;

        Ok(Image {
            raw,
            desc,
            name: name.to_owned(),
        })
    }

    fn destroy_buffer(&self, buffer: Buffer) {
        let mut inner = self.inner.lock();
        inner.free(buffer.raw, &buffer.name);
        inner.stats.buffers_destroyed += 1;
    }

    fn destroy_image(&self, image: Image) {
        let mut inner = self.inner.lock();
        inner.free(image.raw, &image.name);
        inner.stats.images_destroyed += 1;
    }

    fn frames_in_flight(&self) -> usize {
        self.desc.frames_in_flight
    }

    fn begin_frame(&self, frame_index: u64) -> DrawFrame {
        let mut inner = self.inner.lock();

        if let Some(recording) = inner.recording {
            glog::warn!("Frame {} begins while frame {} was never ended", frame_index, recording);
        }

        // throttle: the oldest frame slot gets reused now
        if let Some(oldest_allowed) = frame_index.checked_sub(self.desc.frames_in_flight as u64) {
            inner.retire_until(oldest_allowed);
        }

        inner.recording = Some(frame_index);
        inner.next_frame = inner.next_frame.max(frame_index + 1);
        drop(inner);

        DrawFrame {
            frame_index,
            command_buffer: CommandBuffer::new(self.new_handle(), frame_index),
        }
    }

    fn end_frame(&self, frame: DrawFrame) {
        let mut inner = self.inner.lock();

        if inner.recording != Some(frame.frame_index) {
            glog::warn!("Ending frame {} which is not being recorded", frame.frame_index);
        }

        inner.recording = None;
        inner.in_flight.push_back(frame.frame_index);
        inner.recorder.submit();
        inner.stats.frames_submitted += 1;
    }

    fn is_frame_retired(&self, frame_index: u64) -> bool {
        self.inner.lock().is_frame_retired(frame_index)
    }

    fn wait_for_frame(&self, frame_index: u64) {
        let mut inner = self.inner.lock();

        if inner.recording == Some(frame_index) {
            glog::warn!("Waiting on frame {} which is still being recorded", frame_index);
            return;
        }

        if inner.retire_until(frame_index) {
            glog::debug!("Stalled on frame {}", frame_index);
            inner.stats.stall_count += 1;
        }
    }

    fn wait_idle(&self) {
        let mut inner = self.inner.lock();
        inner.in_flight.clear();
    }

    fn cmd_pipeline_barrier(
        &self,
        cb: &CommandBuffer,
        buffer_barriers: &[BufferBarrier],
        image_barriers: &[ImageBarrier],
    ) {
        for barrier in buffer_barriers {
            self.record(cb, RecordedCommand::Barrier {
                target: BarrierTarget::Buffer,
                raw: barrier.buffer.raw,
                name: barrier.buffer.name.clone(),
                prev_access: barrier.prev_access.to_vec(),
                next_access: barrier.next_access.to_vec(),
                discard_contents: false,
            });
        }

        for barrier in image_barriers {
            self.record(cb, RecordedCommand::Barrier {
                target: BarrierTarget::Image,
                raw: barrier.image.raw,
                name: barrier.image.name.clone(),
                prev_access: barrier.prev_access.to_vec(),
                next_access: barrier.next_access.to_vec(),
                discard_contents: barrier.discard_contents,
            });
        }
    }

    fn cmd_clear_image(&self, cb: &CommandBuffer, image: &Image, _value: [f32; 4]) {
        self.record(cb, RecordedCommand::ClearImage {
            raw: image.raw,
            name: image.name.clone(),
        });
    }

    fn cmd_fill_buffer(&self, cb: &CommandBuffer, buffer: &Buffer, value: u32) {
        self.record(cb, RecordedCommand::FillBuffer {
            raw: buffer.raw,
            name: buffer.name.clone(),
            value,
        });
    }

    fn cmd_begin_label(&self, cb: &CommandBuffer, name: &str) {
        self.record(cb, RecordedCommand::BeginLabel(name.to_owned()));
    }

    fn cmd_end_label(&self, cb: &CommandBuffer) {
        self.record(cb, RecordedCommand::EndLabel);
    }
}
