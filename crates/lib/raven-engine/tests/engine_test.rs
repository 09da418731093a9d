use raven_core::console;
use raven_engine::prelude::*;
use raven_engine::prelude::rg::{FrameStats, RenderGraphBuilder};
use raven_engine::prelude::rhi::{AccessType, Format, ImageDesc, RenderDevice};

#[derive(Default)]
struct ResizingApp {
    initialized: bool,
    abandoned_once: bool,
    finished: Vec<FrameStats>,
    shut_down: bool,
}

impl App for ResizingApp {
    fn init(&mut self, engine_context: &EngineContext) -> anyhow::Result<()> {
        assert_eq!(engine_context.executor().frame_index(), 0);
        self.initialized = true;
        Ok(())
    }

    fn tick_logic(&mut self, frame_index: u64) -> FrameControl {
        if frame_index == 1 && !self.abandoned_once {
            self.abandoned_once = true;
            return FrameControl::Abandon;
        }
        FrameControl::Continue
    }

    fn prepare_frame(&mut self, rg: &mut RenderGraphBuilder) {
        let mut pass = rg.add_pass("Fill");
        let _ = pass.write_texture("Color", ImageDesc::new_2d([320, 240], Format::R8G8B8A8Unorm), AccessType::ComputeShaderWrite);
    }

    fn frame_finished(&mut self, stats: &FrameStats) {
        self.finished.push(*stats);
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
    }
}

#[test]
fn main_loop_runs_requested_frames() {
    let console_vars = console::from_iter(["sandbox", "--frames", "3", "--no-log-file", "--frames-in-flight", "3"]).unwrap();
    let mut engine_context = EngineContext::new(console_vars).unwrap();
    assert_eq!(engine_context.rhi().device.frames_in_flight(), 3);
    assert_eq!(engine_context.executor().config().frames_in_flight, 3);

    let mut app = ResizingApp::default();
    raven_engine::main_loop(&mut engine_context, &mut app).unwrap();

    assert!(app.initialized);
    assert!(app.abandoned_once);
    // the abandoned iteration still counts against --frames
    assert_eq!(app.finished.len(), 2);
    assert_eq!(app.finished[0].frame_index, 0);
    assert_eq!(app.finished[1].frame_index, 1);
    assert_eq!(app.finished[1].objects_created, 0);
    assert_eq!(engine_context.executor().frame_index(), 2);

    raven_engine::shutdown(engine_context, &mut app);
    assert!(app.shut_down);
}

#[test]
fn console_flags_reach_the_render_graph() {
    let console_vars = console::from_iter(["sandbox", "--no-aliasing", "--cull", "--no-clear", "--no-log-file"]).unwrap();
    let engine_context = EngineContext::new(console_vars).unwrap();

    let config = engine_context.executor().config();
    assert!(!config.enable_aliasing);
    assert!(config.cull_unused_passes);
    assert!(!config.clear_new_resources);
}
