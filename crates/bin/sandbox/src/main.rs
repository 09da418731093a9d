// use log macros.
#[macro_use]
extern crate log as _log;

use std::sync::Arc;

use parking_lot::Mutex;

use raven_engine::prelude::*;
use raven_engine::prelude::rg::{Executor, FrameStats, GraphResourceRef, PassBuilder, PassContext, RenderGraphBuilder, RT, SRV};
use raven_engine::prelude::rhi::{AccessType, BufferDesc, BufferUsageFlags, Format, Image, ImageDesc};

/// Tonemapping lives across frames, its pipeline gets built on the first execute.
#[derive(Default)]
struct TonemapExecutor {
    pipeline_ready: bool,
    input: Option<GraphResourceRef<Image, SRV>>,
    output: Option<GraphResourceRef<Image, RT>>,
    extent: [u32; 2],
}

impl Executor for TonemapExecutor {
    fn setup(&mut self, pass: &mut PassBuilder) {
        self.input = Some(pass.read_texture("TaaOutput", AccessType::FragmentShaderReadSampledImageOrUniformTexelBuffer));
        self.output = Some(pass.add_color_output("Final", ImageDesc::new_2d(self.extent, Format::R8G8B8A8Unorm)));
    }

    fn execute(&mut self, ctx: &mut PassContext) -> anyhow::Result<()> {
        if !self.pipeline_ready {
            debug!("Tonemap pipeline created in frame {}", ctx.frame_index());
            self.pipeline_ready = true;
        }

        let (input, output) = match (&self.input, &self.output) {
            (Some(input), Some(output)) => (input, output),
            _ => anyhow::bail!("{} executed without setup", ctx.pass_name()),
        };

        trace!(
            "{}: {} -> {}",
            ctx.pass_name(),
            ctx.get_read_texture(input).raw,
            ctx.get_attachment(output).raw
        );
        Ok(())
    }
}

struct Sandbox {
    extent: [u32; 2],
    resize_pending: bool,
    tonemap: Arc<Mutex<TonemapExecutor>>,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self {
            extent: [1280, 720],
            resize_pending: false,
            tonemap: Arc::new(Mutex::new(TonemapExecutor::default())),
        }
    }
}

impl App for Sandbox {
    fn init(&mut self, engine_context: &EngineContext) -> anyhow::Result<()> {
        let console_vars = engine_context.console_vars();
        info!(
            "Running {} frames with {} frames in flight",
            console_vars.frames, console_vars.frames_in_flight
        );
        Ok(())
    }

    fn tick_logic(&mut self, frame_index: u64) -> FrameControl {
        // pretend the window gets resized halfway, the frame being recorded is lost
        if frame_index == 3 && self.extent == [1280, 720] {
            self.extent = [1920, 1080];
            self.resize_pending = true;
            return FrameControl::Abandon;
        }

        self.resize_pending = false;
        FrameControl::Continue
    }

    fn prepare_frame(&mut self, rg: &mut RenderGraphBuilder) {
        let extent = self.extent;
        if self.resize_pending {
            info!("Resized to {}x{}", extent[0], extent[1]);
        }

        {
            let mut pass = rg.add_pass("Upload");
            let constants = pass.write_buffer(
                "FrameConstants",
                BufferDesc::new_cpu_to_gpu(256, BufferUsageFlags::UNIFORM),
                AccessType::HostWrite,
            );
            pass.render(move |ctx| {
                trace!("frame constants uploaded into {}", ctx.get_write_buffer(&constants).raw);
                Ok(())
            });
        }

        {
            let mut pass = rg.add_pass("DepthFill");
            let _ = pass.add_uniform_input("FrameConstants");
            let _ = pass.add_depth_output("Depth", ImageDesc::new_2d(extent, Format::D32Sfloat));
        }

        {
            let mut pass = rg.add_pass("DepthHierarchy");
            let _ = pass.read_texture("Depth", AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer);
            let _ = pass.write_texture(
                "DepthHierarchy",
                ImageDesc::new_2d(extent, Format::R32Sfloat).all_mip_levels(),
                AccessType::ComputeShaderWrite,
            );
        }

        {
            let mut pass = rg.add_pass("GBuffer");
            let _ = pass.add_uniform_input("FrameConstants");
            let _ = pass.add_color_output("Albedo", ImageDesc::new_2d(extent, Format::R8G8B8A8Unorm));
            let _ = pass.add_color_output("Normal", ImageDesc::new_2d(extent, Format::R16G16Sfloat));
        }

        // visible light count, only needed inside this frame
        let mut light_counter = rg.create_transient(
            "LightCounter",
            BufferDesc::new_gpu_only(4, BufferUsageFlags::STORAGE | BufferUsageFlags::TRANSFER_DST),
        );

        {
            let mut pass = rg.add_pass("ResetLightCounter");
            let _ = pass.write(&mut light_counter, AccessType::TransferWrite);
        }

        {
            let mut pass = rg.add_pass("LightCulling");
            let _ = pass.read_texture("DepthHierarchy", AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer);
            let _ = pass.read(&light_counter, AccessType::ComputeShaderReadOther);
            let _ = pass.write(&mut light_counter, AccessType::ComputeShaderWrite);
        }

        {
            let mut pass = rg.add_pass("Lighting");
            let _ = pass.add_texture_input("Albedo");
            let _ = pass.add_texture_input("Normal");
            let _ = pass.read(&light_counter, AccessType::ComputeShaderReadOther);
            let _ = pass.add_storage_image_output("Hdr", ImageDesc::new_2d(extent, Format::B10G11R11UfloatPack32));
        }

        {
            let mut pass = rg.add_pass("Taa");
            let history = pass.read_history_texture("TaaOutput", AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer);
            let hdr = pass.read_texture("Hdr", AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer);
            let output = pass.write_texture(
                "TaaOutput",
                ImageDesc::new_2d(extent, Format::R16G16B16A16Sfloat),
                AccessType::ComputeShaderWrite,
            );
            pass.render(move |ctx| {
                trace!(
                    "{}: history {} + {} -> {}",
                    ctx.pass_name(),
                    ctx.get_read_texture(&history).raw,
                    ctx.get_read_texture(&hdr).raw,
                    ctx.get_write_texture(&output).raw
                );
                Ok(())
            });
        }

        self.tonemap.lock().extent = extent;
        rg.add_executor_pass("Tonemap", Box::new(self.tonemap.clone()));

        let output = self.tonemap.lock().output.as_ref().map(|output| output.handle());
        if let Some(output) = output {
            rg.export(&output);
        }
    }

    fn frame_finished(&mut self, stats: &FrameStats) {
        debug!(
            "Frame {}: {} passes ({} culled), {} barriers, {} clears, {} created, {} aliased, {} stalls",
            stats.frame_index,
            stats.passes_executed,
            stats.passes_culled,
            stats.barriers,
            stats.clears,
            stats.objects_created,
            stats.aliased,
            stats.stalls
        );
    }

    fn shutdown(&mut self) {
        info!("Sandbox shutdown.");
    }
}

raven_main!(Sandbox::default());
