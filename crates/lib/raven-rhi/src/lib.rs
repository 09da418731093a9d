#[macro_use]
extern crate derive_builder;

pub mod backend;

use std::sync::Arc;

use crate::backend::{RenderDevice, null::{NullDevice, NullDeviceDesc}};

#[derive(Clone, Copy, Debug)]
pub struct RHIConfig {
    pub frames_in_flight: usize,
    /// Device memory budget in bytes, `None` is unlimited.
    pub memory_budget: Option<u64>,
}

impl Default for RHIConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            memory_budget: None,
        }
    }
}

/// Owns the device every other system records through.
pub struct RHI {
    pub device: Arc<dyn RenderDevice>,
}

impl RHI {
    /// Headless rhi, backed by a [`NullDevice`].
    pub fn new_headless(config: RHIConfig) -> Self {
        let device = Arc::new(NullDevice::new(NullDeviceDesc {
            frames_in_flight: config.frames_in_flight,
            memory_budget: config.memory_budget,
        }));

        Self { device }
    }

    pub fn from_device(device: Arc<dyn RenderDevice>) -> Self {
        Self { device }
    }
}

impl Drop for RHI {
    fn drop(&mut self) {
        self.device.wait_idle();
    }
}

// global logger macro
extern crate log as glog;
