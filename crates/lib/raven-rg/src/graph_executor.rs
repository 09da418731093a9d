use std::sync::Arc;

use raven_rhi::backend::{RawHandle, RenderDevice};

use crate::allocator::{AllocatorStats, HistorySide, ResourceAllocator};
use crate::compiled_graph::CompiledRenderGraph;
use crate::error::RenderGraphError;
use crate::executing_graph::ExecutingRenderGraph;
use crate::graph::RenderGraph;
use crate::graph_builder::RenderGraphBuilder;
use crate::resource_table::ResourceTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderGraphConfig {
    /// Should match the device, the device value wins otherwise.
    pub frames_in_flight: usize,
    /// Let transient resources with disjoint lifetimes share physical objects.
    pub enable_aliasing: bool,
    /// Drop passes that do not contribute to any exported resource.
    pub cull_unused_passes: bool,
    /// Clear newly created objects before their first use.
    pub clear_new_resources: bool,
    /// Retained resources not declared for this many frames are evicted.
    pub retire_unused_after_frames: u64,
}

impl Default for RenderGraphConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            enable_aliasing: true,
            cull_unused_passes: false,
            clear_new_resources: true,
            retire_unused_after_frames: 8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderGraphState {
    /// Passes are declaring their resources.
    Building,
    /// Execution order is fixed, waiting for `execute()`.
    Compiled,
    Executing,
    /// Ready to build the next frame.
    Idle,
}

/// What happened in one executed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_index: u64,
    pub passes_executed: usize,
    pub passes_culled: usize,
    pub barriers: usize,
    pub clears: usize,
    pub objects_created: u64,
    pub aliased: u64,
    pub allocation_failures: u64,
    pub stalls: u64,
    pub executor_errors: usize,
}

/// Owns everything that outlives a single frame's graph: the device, the resource table
/// and the physical resources.
///
/// Every frame goes through `prepare()` and then `execute()` (or `abandon_frame()`).
pub struct GraphExecutor {
    device: Arc<dyn RenderDevice>,
    table: ResourceTable,
    allocator: ResourceAllocator,
    config: RenderGraphConfig,

    frame_index: u64,
    state: RenderGraphState,
    compiled: Option<CompiledRenderGraph>,
}

impl GraphExecutor {
    pub fn new(device: Arc<dyn RenderDevice>, mut config: RenderGraphConfig) -> Result<Self, RenderGraphError> {
        if config.frames_in_flight != device.frames_in_flight() {
            glog::warn!(
                "Render graph configured for {} frames in flight, but the device uses {}",
                config.frames_in_flight,
                device.frames_in_flight()
            );
            config.frames_in_flight = device.frames_in_flight();
        }

        let allocator = ResourceAllocator::new(device.clone())?;

        Ok(Self {
            device,
            table: ResourceTable::new(),
            allocator,
            config,
            frame_index: 0,
            state: RenderGraphState::Idle,
            compiled: None,
        })
    }

    #[inline]
    pub fn state(&self) -> RenderGraphState {
        self.state
    }

    /// Index of the frame the next `prepare()` builds.
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    pub fn config(&self) -> &RenderGraphConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.device
    }

    /// The compiled frame waiting for `execute()`.
    pub fn compiled(&self) -> Option<&CompiledRenderGraph> {
        self.compiled.as_ref()
    }

    pub fn allocator_stats(&self) -> AllocatorStats {
        self.allocator.stats()
    }

    /// Number of logical resources alive in the resource table.
    pub fn resource_count(&self) -> usize {
        self.table.len()
    }

    /// Transient objects currently pooled for reuse.
    pub fn pooled_transient_count(&self) -> usize {
        self.allocator.pooled_transients()
    }

    /// Physical object backing `name` as of the last executed frame, `None` if nothing is allocated.
    pub fn physical_handle(&self, name: &str) -> Option<RawHandle> {
        self.physical_handle_of(name, HistorySide::Current)
    }

    /// Object holding the content `name` had before the last frame wrote it.
    /// Only history resources keep one.
    pub fn physical_history_handle(&self, name: &str) -> Option<RawHandle> {
        self.physical_handle_of(name, HistorySide::Previous)
    }

    fn physical_handle_of(&self, name: &str, side: HistorySide) -> Option<RawHandle> {
        let handle = self.table.lookup(name)?;
        self.allocator.raw_of(handle, side, self.frame_index.saturating_sub(1))
    }

    /// Build and compile the graph of the next frame.
    ///
    /// On failure every configuration error of the frame is logged and returned, the executor
    /// goes back to idle and the frame can be prepared again.
    pub fn prepare<PrepareFunc>(&mut self, prepare_func: PrepareFunc) -> Result<(), RenderGraphError>
    where
        PrepareFunc: FnOnce(&mut RenderGraphBuilder),
    {
        if self.state != RenderGraphState::Idle {
            return Err(RenderGraphError::InvalidState {
                expected: RenderGraphState::Idle,
                found: self.state,
            });
        }

        let frame = self.frame_index;
        self.allocator.begin_frame(frame);

        for (handle, entry) in self.table.evict_unused(frame, self.config.retire_unused_after_frames) {
            glog::debug!("{} not declared for {} frames, evicted", entry.name, self.config.retire_unused_after_frames);
            self.allocator.release_slot(handle);
        }
        self.allocator.trim_transients(frame, self.config.retire_unused_after_frames);

        self.state = RenderGraphState::Building;
        self.table.begin_build();

        let mut rg_builder = RenderGraphBuilder::new(RenderGraph::new(frame, std::mem::take(&mut self.table)));
        // user-side callback to build the render graph with custom passes
        prepare_func(&mut rg_builder);

        let mut rg = rg_builder.build();
        self.table = rg.finish_declarations();

        match rg.compile(&self.config, &self.allocator) {
            Ok(compiled) => {
                self.compiled = Some(compiled);
                self.state = RenderGraphState::Compiled;
                Ok(())
            }
            Err(errors) => {
                for err in errors.iter() {
                    glog::error!("Frame {}: {}", frame, err);
                }
                self.state = RenderGraphState::Idle;
                Err(errors.into())
            }
        }
    }

    /// Bind physical resources and record every pass of the compiled frame.
    pub fn execute(&mut self) -> Result<FrameStats, RenderGraphError> {
        let compiled = match (self.state, self.compiled.take()) {
            (RenderGraphState::Compiled, Some(compiled)) => compiled,
            (state, _) => {
                glog::warn!("Render Graph is not compiled yet, execute request denied!");
                return Err(RenderGraphError::InvalidState {
                    expected: RenderGraphState::Compiled,
                    found: state,
                });
            }
        };

        self.state = RenderGraphState::Executing;
        let stats_before = self.allocator.stats();
        let passes_culled = compiled.culled_passes();

        // may block until the frame using the same in-flight slot is retired
        let draw_frame = self.device.begin_frame(self.frame_index);

        let (retired_rg, counters) = {
            let mut executing_rg = ExecutingRenderGraph::new(compiled, &self.device, &mut self.allocator, &self.config);
            executing_rg.record_commands(&draw_frame.command_buffer);
            executing_rg.finish()
        };

        // give owned objects back together with the access state they ended in
        retired_rg.release_owned_resources(&mut self.allocator);
        self.device.end_frame(draw_frame);

        let stats_after = self.allocator.stats();
        let frame_stats = FrameStats {
            frame_index: self.frame_index,
            passes_executed: counters.passes_executed,
            passes_culled,
            barriers: counters.barriers,
            clears: counters.clears,
            objects_created: stats_after.objects_created - stats_before.objects_created,
            aliased: stats_after.aliased - stats_before.aliased,
            allocation_failures: stats_after.allocation_failures - stats_before.allocation_failures,
            stalls: stats_after.stalls - stats_before.stalls,
            executor_errors: counters.executor_errors,
        };
        glog::trace!("{:?}", frame_stats);

        self.frame_index += 1;
        self.state = RenderGraphState::Idle;

        Ok(frame_stats)
    }

    /// Throw the compiled frame away without executing it.
    ///
    /// Pooled transient objects are dropped as well, persistent and history resources stay.
    /// The same frame index is prepared again next.
    pub fn abandon_frame(&mut self) {
        if self.state == RenderGraphState::Compiled {
            self.compiled = None;
            self.state = RenderGraphState::Idle;
        }

        glog::debug!("Frame {} abandoned", self.frame_index);
        self.allocator.abandon_transients();
    }

    /// Explicitly clean up all the resources used by the render graph.
    pub fn shutdown(mut self) {
        self.compiled = None;
        self.device.wait_idle();
        self.allocator.shutdown();

        let stats = self.allocator.stats();
        glog::debug!(
            "Render graph shut down after {} frames: {} objects created, {} destroyed",
            self.frame_index,
            stats.objects_created,
            stats.objects_destroyed
        );
    }
}
