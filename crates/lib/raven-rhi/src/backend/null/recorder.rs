use std::collections::HashMap;

use crate::backend::{AccessType, RawHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierTarget {
    Buffer,
    Image,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedCommand {
    Barrier {
        target: BarrierTarget,
        raw: RawHandle,
        name: String,
        prev_access: Vec<AccessType>,
        next_access: Vec<AccessType>,
        discard_contents: bool,
    },
    ClearImage {
        raw: RawHandle,
        name: String,
    },
    FillBuffer {
        raw: RawHandle,
        name: String,
        value: u32,
    },
    BeginLabel(String),
    EndLabel,
}

impl RecordedCommand {
    pub fn raw_handle(&self) -> Option<RawHandle> {
        match self {
            RecordedCommand::Barrier { raw, .. }
            | RecordedCommand::ClearImage { raw, .. }
            | RecordedCommand::FillBuffer { raw, .. } => Some(*raw),
            _ => None,
        }
    }
}

/// Stores the commands of the frame being recorded and of the last submitted frame.
#[derive(Default)]
pub(super) struct Recorder {
    recording: Vec<RecordedCommand>,
    last_submitted: Vec<RecordedCommand>,
    /// Last frame that referenced an object.
    last_used: HashMap<RawHandle, u64>,
}

impl Recorder {
    pub fn record(&mut self, frame_index: u64, command: RecordedCommand) {
        glog::trace!("[frame {}] {:?}", frame_index, command);

        if let Some(raw) = command.raw_handle() {
            self.last_used.insert(raw, frame_index);
        }
        self.recording.push(command);
    }

    pub fn submit(&mut self) {
        self.last_submitted = std::mem::take(&mut self.recording);
    }

    pub fn last_submitted(&self) -> &[RecordedCommand] {
        &self.last_submitted
    }

    pub fn forget(&mut self, raw: RawHandle) -> Option<u64> {
        self.last_used.remove(&raw)
    }
}
