extern crate log as glog;

mod user;
pub mod prelude;

// Raven Engine APIs
use raven_core::log;
use raven_core::console::{self, ConsoleVars};
use raven_core::filesystem;
use raven_rhi::{RHI, RHIConfig};
use raven_rg::{FrameStats, GraphExecutor, RenderGraphConfig};

// Raven Engine exposed APIs
pub use raven_core::filesystem::ProjectFolder;
pub use user::{App, FrameControl};

/// Global engine context to have control on engine on user side.
/// Facade Design Pattern to take control on different part of engine without knowing the underlying implementation.
pub struct EngineContext {
    console_vars: ConsoleVars,
    // drop order matters, the graph goes before the device
    executor: GraphExecutor,
    rhi: RHI,
}

impl EngineContext {
    /// Bring up the device and the render graph from already parsed console variables.
    /// Logging is left untouched.
    pub fn new(console_vars: ConsoleVars) -> anyhow::Result<Self> {
        let rhi = RHI::new_headless(RHIConfig {
            frames_in_flight: console_vars.frames_in_flight,
            memory_budget: console_vars.memory_budget_mb.map(|mb| mb * 1024 * 1024),
        });

        let executor = GraphExecutor::new(rhi.device.clone(), render_graph_config(&console_vars))?;

        Ok(Self {
            console_vars,
            executor,
            rhi,
        })
    }

    pub fn console_vars(&self) -> &ConsoleVars {
        &self.console_vars
    }

    pub fn executor(&self) -> &GraphExecutor {
        &self.executor
    }

    pub fn rhi(&self) -> &RHI {
        &self.rhi
    }
}

fn render_graph_config(console_vars: &ConsoleVars) -> RenderGraphConfig {
    RenderGraphConfig {
        frames_in_flight: console_vars.frames_in_flight,
        enable_aliasing: console_vars.enable_aliasing,
        cull_unused_passes: console_vars.cull_unused_passes,
        clear_new_resources: console_vars.clear_new_resources,
        ..Default::default()
    }
}

/// Initialize raven engine.
pub fn init() -> anyhow::Result<EngineContext> {
    filesystem::set_default_root_path()?;

    let console_vars = console::from_args()?;

    log::init_log(log::LogConfig {
        level: console_vars.level,
        write_to_file: console_vars.log_to_file,
    })?;

    let engine_context = EngineContext::new(console_vars)?;

    glog::trace!("Raven Engine initialized!");
    Ok(engine_context)
}

/// Run `app` for the number of frames asked on the console.
///
/// A frame that fails to compile is skipped, its errors are already logged by the render graph.
pub fn main_loop(engine_context: &mut EngineContext, app: &mut dyn App) -> anyhow::Result<()> {
    app.init(engine_context)?;

    glog::trace!("Begin main loop.");
    let EngineContext {
        console_vars,
        executor,
        ..
    } = engine_context;

    let mut totals = FrameStats::default();
    for _ in 0..console_vars.frames {
        let frame_index = executor.frame_index();

        let control = app.tick_logic(frame_index);
        if control == FrameControl::Exit {
            break;
        }

        if let Err(err) = executor.prepare(|rg| app.prepare_frame(rg)) {
            glog::warn!("Frame {} skipped: {}", frame_index, err);
            continue;
        }

        if control == FrameControl::Abandon {
            executor.abandon_frame();
            continue;
        }

        let stats = executor.execute()?;
        app.frame_finished(&stats);

        totals.passes_executed += stats.passes_executed;
        totals.barriers += stats.barriers;
        totals.objects_created += stats.objects_created;
        totals.stalls += stats.stalls;
        totals.executor_errors += stats.executor_errors;
    }

    glog::info!(
        "Exit main loop after {} frames: {} passes, {} barriers, {} objects created, {} stalls, {} executor errors",
        executor.frame_index(),
        totals.passes_executed,
        totals.barriers,
        totals.objects_created,
        totals.stalls,
        totals.executor_errors
    );
    Ok(())
}

/// Shutdown raven engine.
pub fn shutdown(engine_context: EngineContext, app: &mut dyn App) {
    app.shutdown();

    let EngineContext { executor, rhi, .. } = engine_context;
    executor.shutdown();
    drop(rhi);

    glog::trace!("Raven Engine shutdown.");
}
