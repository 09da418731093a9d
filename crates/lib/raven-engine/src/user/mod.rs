use raven_rg::{FrameStats, RenderGraphBuilder};

use crate::EngineContext;

/// What the main loop does with the frame about to be built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameControl {
    Continue,
    /// Build the frame, then throw it away (e.g. the swapchain went out of date while recording).
    Abandon,
    Exit,
}

pub trait App {
    fn init(&mut self, _engine_context: &EngineContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn tick_logic(&mut self, _frame_index: u64) -> FrameControl {
        FrameControl::Continue
    }

    /// Declare the passes of the frame.
    fn prepare_frame(&mut self, rg: &mut RenderGraphBuilder);

    fn frame_finished(&mut self, _stats: &FrameStats) {}

    fn shutdown(&mut self) {}
}

#[macro_export]
macro_rules! raven_main {
    ($app:expr) => {
        fn main() {
            let mut app = $app;
            let mut engine_context = raven_engine::init().unwrap_or_else(|err| {
                eprintln!("Raven Engine failed to initialize with: {}", err); // use eprintln here, because log module may not be initialized successfully.
                std::process::exit(1);
            });

            let result = raven_engine::main_loop(&mut engine_context, &mut app);
            raven_engine::shutdown(engine_context, &mut app);

            if let Err(err) = result {
                eprintln!("Raven Engine stopped with: {:?}", err);
                std::process::exit(1);
            }
        }
    };
}
