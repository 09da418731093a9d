use std::sync::Arc;

use parking_lot::Mutex;

use raven_rg::{Executor, GraphExecutor, GraphResourceRef, PassBuilder, PassContext, RenderGraphConfig, UAV};
use raven_rhi::backend::{
    AccessType, Buffer, BufferDesc, BufferUsageFlags, Format, ImageDesc,
    null::{BarrierTarget, NullDevice, NullDeviceDesc, RecordedCommand},
};

fn setup(config: RenderGraphConfig) -> (Arc<NullDevice>, GraphExecutor) {
    let device = Arc::new(NullDevice::new(NullDeviceDesc::default()));
    let executor = GraphExecutor::new(device.clone(), config).unwrap();
    (device, executor)
}

fn no_clear() -> RenderGraphConfig {
    RenderGraphConfig {
        clear_new_resources: false,
        ..Default::default()
    }
}

fn barriers_of<'a>(commands: &'a [RecordedCommand], resource: &'a str) -> impl Iterator<Item = &'a RecordedCommand> + 'a {
    commands.iter().filter(move |command| matches!(command, RecordedCommand::Barrier { name, .. } if name == resource))
}

#[test]
fn passes_are_bracketed_and_first_writes_discard() {
    let (device, mut executor) = setup(no_clear());

    executor.prepare(|rg| {
        {
            let mut pass = rg.add_pass("Depth");
            let _ = pass.add_depth_output("Depth", ImageDesc::new_2d([1280, 720], Format::D32Sfloat));
        }
        let mut pass = rg.add_pass("Shade");
        let _ = pass.read_texture("Depth", AccessType::FragmentShaderReadSampledImageOrUniformTexelBuffer);
        let _ = pass.add_color_output("Color", ImageDesc::new_2d([1280, 720], Format::R8G8B8A8Unorm));
    }).unwrap();
    let stats = executor.execute().unwrap();

    let depth = executor.physical_handle("Depth").unwrap();
    let color = executor.physical_handle("Color").unwrap();

    let expected = vec![
        RecordedCommand::BeginLabel("Depth".to_owned()),
        RecordedCommand::Barrier {
            target: BarrierTarget::Image,
            raw: depth,
            name: "Depth".to_owned(),
            prev_access: vec![],
            next_access: vec![AccessType::DepthStencilAttachmentWrite],
            discard_contents: true,
        },
        RecordedCommand::EndLabel,
        RecordedCommand::BeginLabel("Shade".to_owned()),
        RecordedCommand::Barrier {
            target: BarrierTarget::Image,
            raw: depth,
            name: "Depth".to_owned(),
            prev_access: vec![AccessType::DepthStencilAttachmentWrite],
            next_access: vec![AccessType::FragmentShaderReadSampledImageOrUniformTexelBuffer],
            discard_contents: false,
        },
        RecordedCommand::Barrier {
            target: BarrierTarget::Image,
            raw: color,
            name: "Color".to_owned(),
            prev_access: vec![],
            next_access: vec![AccessType::ColorAttachmentWrite],
            discard_contents: true,
        },
        RecordedCommand::EndLabel,
    ];

    assert_eq!(device.last_submitted_commands(), expected);
    assert_eq!(stats.barriers, 3);
    assert_eq!(stats.clears, 0);
}

#[test]
fn planned_transitions_match_recorded_ones() {
    let (device, mut executor) = setup(no_clear());

    executor.prepare(|rg| {
        {
            let mut pass = rg.add_pass("Depth");
            let _ = pass.add_depth_output("Depth", ImageDesc::new_2d([1280, 720], Format::D32Sfloat));
        }
        let mut pass = rg.add_pass("Shade");
        let _ = pass.read_texture("Depth", AccessType::FragmentShaderReadSampledImageOrUniformTexelBuffer);
    }).unwrap();

    let planned = executor.compiled().unwrap().transitions_of("Shade").unwrap().to_vec();
    assert_eq!(planned.len(), 1);
    assert!(planned[0].needs_barrier);
    assert_eq!(planned[0].prev_access, vec![AccessType::DepthStencilAttachmentWrite]);
    assert_eq!(planned[0].next_access, vec![AccessType::FragmentShaderReadSampledImageOrUniformTexelBuffer]);

    executor.execute().unwrap();
    let recorded = device.last_submitted_commands();
    let shade_barrier = barriers_of(&recorded, "Depth").nth(1).unwrap();
    match shade_barrier {
        RecordedCommand::Barrier { prev_access, next_access, .. } => {
            assert_eq!(prev_access, &planned[0].prev_access);
            assert_eq!(next_access, &planned[0].next_access);
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn pooled_transients_start_from_their_last_access() {
    let (device, mut executor) = setup(no_clear());
    let desc = BufferDesc::new_gpu_only(1024, BufferUsageFlags::STORAGE);

    for frame in 0..3 {
        executor.prepare(|rg| {
            let mut scratch = rg.create_transient("Scratch", desc);
            {
                let mut pass = rg.add_pass("Fill");
                let _ = pass.write(&mut scratch, AccessType::ComputeShaderWrite);
            }
            let mut pass = rg.add_pass("Use");
            let _ = pass.read(&scratch, AccessType::ComputeShaderReadOther);
        }).unwrap();

        let planned = executor.compiled().unwrap().transitions_of("Fill").unwrap().to_vec();
        assert!(planned[0].prev_access.is_empty());

        let stats = executor.execute().unwrap();
        let recorded = device.last_submitted_commands();
        let first = barriers_of(&recorded, "Scratch").next().unwrap();

        match first {
            RecordedCommand::Barrier { prev_access, next_access, .. } => {
                assert_eq!(next_access, &planned[0].next_access);
                if frame < 2 {
                    assert_eq!(stats.objects_created, 1);
                    assert!(prev_access.is_empty());
                } else {
                    // frame 0's object came back from the pool
                    assert_eq!(stats.objects_created, 0);
                    assert_eq!(prev_access, &vec![AccessType::ComputeShaderReadOther]);
                }
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}

#[test]
fn read_after_read_skips_barriers() {
    let (device, mut executor) = setup(no_clear());

    executor.prepare(|rg| {
        {
            let mut pass = rg.add_pass("Upload");
            let _ = pass.write_buffer("Lights", BufferDesc::new_gpu_only(4096, BufferUsageFlags::STORAGE), AccessType::TransferWrite);
            let _ = pass.write_texture("Albedo", ImageDesc::new_2d([640, 480], Format::R8G8B8A8Unorm), AccessType::ComputeShaderWrite);
        }
        {
            let mut pass = rg.add_pass("CullA");
            let _ = pass.read_buffer("Lights", AccessType::ComputeShaderReadOther);
            let _ = pass.read_texture("Albedo", AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer);
        }
        {
            let mut pass = rg.add_pass("CullB");
            let _ = pass.read_buffer("Lights", AccessType::ComputeShaderReadOther);
            // same layout, still no barrier
            let _ = pass.read_texture("Albedo", AccessType::FragmentShaderReadSampledImageOrUniformTexelBuffer);
        }
        let mut pass = rg.add_pass("Resolve");
        let _ = pass.read_texture("Albedo", AccessType::ComputeShaderReadOther);
    }).unwrap();
    assert_eq!(executor.compiled().unwrap().pass_order(), vec!["Upload", "CullA", "CullB", "Resolve"]);
    executor.execute().unwrap();

    let commands = device.last_submitted_commands();
    assert_eq!(barriers_of(&commands, "Lights").count(), 2);

    let albedo: Vec<_> = barriers_of(&commands, "Albedo").collect();
    assert_eq!(albedo.len(), 3);
    match albedo[2] {
        RecordedCommand::Barrier { prev_access, next_access, discard_contents, .. } => {
            assert_eq!(prev_access, &vec![
                AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer,
                AccessType::FragmentShaderReadSampledImageOrUniformTexelBuffer,
            ]);
            assert_eq!(next_access, &vec![AccessType::ComputeShaderReadOther]);
            assert!(!discard_contents);
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn buffers_are_transitioned_before_images_in_a_batch() {
    let (device, mut executor) = setup(no_clear());

    executor.prepare(|rg| {
        let mut pass = rg.add_pass("Init");
        let _ = pass.write_texture("Noise", ImageDesc::new_2d([64, 64], Format::R8Unorm), AccessType::ComputeShaderWrite);
        let _ = pass.write_buffer("Counter", BufferDesc::new_gpu_only(4, BufferUsageFlags::STORAGE), AccessType::ComputeShaderWrite);
    }).unwrap();
    executor.execute().unwrap();

    let targets: Vec<_> = device.last_submitted_commands().iter()
        .filter_map(|command| match command {
            RecordedCommand::Barrier { target, .. } => Some(*target),
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![BarrierTarget::Buffer, BarrierTarget::Image]);
}

#[test]
fn new_objects_are_cleared_once() {
    let (device, mut executor) = setup(RenderGraphConfig::default());

    let declare = |rg: &mut raven_rg::RenderGraphBuilder| {
        let mut pass = rg.add_pass("Init");
        let _ = pass.write_texture("Noise", ImageDesc::new_2d([64, 64], Format::R8Unorm), AccessType::ComputeShaderWrite);
        let _ = pass.write_buffer("Counter", BufferDesc::new_gpu_only(4, BufferUsageFlags::STORAGE), AccessType::ComputeShaderWrite);
    };

    executor.prepare(declare).unwrap();
    let stats = executor.execute().unwrap();
    assert_eq!(stats.clears, 2);

    let noise = executor.physical_handle("Noise").unwrap();
    let counter = executor.physical_handle("Counter").unwrap();

    let expected = vec![
        RecordedCommand::BeginLabel("Init".to_owned()),
        RecordedCommand::Barrier {
            target: BarrierTarget::Image,
            raw: noise,
            name: "Noise".to_owned(),
            prev_access: vec![],
            next_access: vec![AccessType::TransferWrite],
            discard_contents: true,
        },
        RecordedCommand::ClearImage { raw: noise, name: "Noise".to_owned() },
        RecordedCommand::Barrier {
            target: BarrierTarget::Buffer,
            raw: counter,
            name: "Counter".to_owned(),
            prev_access: vec![],
            next_access: vec![AccessType::TransferWrite],
            discard_contents: false,
        },
        RecordedCommand::FillBuffer { raw: counter, name: "Counter".to_owned(), value: 0 },
        RecordedCommand::Barrier {
            target: BarrierTarget::Buffer,
            raw: counter,
            name: "Counter".to_owned(),
            prev_access: vec![AccessType::TransferWrite],
            next_access: vec![AccessType::ComputeShaderWrite],
            discard_contents: false,
        },
        // the cleared content is kept
        RecordedCommand::Barrier {
            target: BarrierTarget::Image,
            raw: noise,
            name: "Noise".to_owned(),
            prev_access: vec![AccessType::TransferWrite],
            next_access: vec![AccessType::ComputeShaderWrite],
            discard_contents: false,
        },
        RecordedCommand::EndLabel,
    ];
    assert_eq!(device.last_submitted_commands(), expected);

    executor.prepare(declare).unwrap();
    let stats = executor.execute().unwrap();
    assert_eq!(stats.clears, 0);
    assert!(device.last_submitted_commands().iter().all(|command| {
        !matches!(command, RecordedCommand::ClearImage { .. } | RecordedCommand::FillBuffer { .. })
    }));
}

#[test]
fn unknown_reads_bind_the_placeholders() {
    let (device, mut executor) = setup(RenderGraphConfig::default());

    for frame in 0..2 {
        let names: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        executor.prepare(|rg| {
            let mut pass = rg.add_pass("Sky");
            let environment = pass.read_texture("Environment", AccessType::FragmentShaderReadSampledImageOrUniformTexelBuffer);
            let probes = pass.read_buffer("Probes", AccessType::FragmentShaderReadUniformBuffer);
            let names = names.clone();
            pass.render(move |ctx| {
                let mut names = names.lock();
                names.push(ctx.get_read_texture(&environment).name.clone());
                names.push(ctx.get_read_buffer(&probes).name.clone());
                Ok(())
            });
        }).unwrap();
        let stats = executor.execute().unwrap();

        assert_eq!(*names.lock(), vec!["rg placeholder image".to_owned(), "rg placeholder buffer".to_owned()]);
        assert_eq!(stats.objects_created, 0);
        // placeholders get cleared the first time they are bound only
        assert_eq!(stats.clears, if frame == 0 { 2 } else { 0 });
    }

    assert_eq!(executor.physical_handle("Environment"), None);
    assert_eq!(device.stats().images_created, 1);
    assert_eq!(device.stats().buffers_created, 1);
}

#[test]
fn failing_executor_does_not_abort_the_frame() {
    let (device, mut executor) = setup(no_clear());
    let after_ran = Arc::new(Mutex::new(false));

    executor.prepare(|rg| {
        {
            let mut pass = rg.add_pass("Broken");
            let _ = pass.write_texture("Target", ImageDesc::new_2d([32, 32], Format::R8G8B8A8Unorm), AccessType::ComputeShaderWrite);
            pass.render(|_| Err(anyhow::anyhow!("pipeline not ready")));
        }
        let mut pass = rg.add_pass("After");
        let _ = pass.read_texture("Target", AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer);
        let after_ran = after_ran.clone();
        pass.render(move |_| {
            *after_ran.lock() = true;
            Ok(())
        });
    }).unwrap();
    let stats = executor.execute().unwrap();

    assert_eq!(stats.executor_errors, 1);
    assert_eq!(stats.passes_executed, 2);
    assert!(*after_ran.lock());

    let labels = device.last_submitted_commands().iter()
        .filter(|command| matches!(command, RecordedCommand::BeginLabel(_) | RecordedCommand::EndLabel))
        .count();
    assert_eq!(labels, 4);
}

#[derive(Default)]
struct CounterReset {
    setups: usize,
    executions: usize,
    counter: Option<GraphResourceRef<Buffer, UAV>>,
    seen_raw: Vec<raven_rhi::backend::RawHandle>,
}

impl Executor for CounterReset {
    fn setup(&mut self, pass: &mut PassBuilder) {
        self.setups += 1;
        self.counter = Some(pass.add_storage_output("DrawCounter", BufferDesc::new_gpu_only(16, BufferUsageFlags::STORAGE | BufferUsageFlags::INDIRECT)));
    }

    fn execute(&mut self, ctx: &mut PassContext) -> anyhow::Result<()> {
        let counter = self.counter.as_ref().ok_or_else(|| anyhow::anyhow!("setup never ran"))?;
        assert_eq!(ctx.pass_name(), "ResetCounter");

        self.executions += 1;
        self.seen_raw.push(ctx.get_write_buffer(counter).raw);
        Ok(())
    }
}

#[test]
fn shared_executor_persists_across_frames() {
    let (_device, mut executor) = setup(RenderGraphConfig::default());
    let reset = Arc::new(Mutex::new(CounterReset::default()));

    for _ in 0..3 {
        executor.prepare(|rg| {
            rg.add_executor_pass("ResetCounter", Box::new(reset.clone()));
            let mut pass = rg.add_pass("Draw");
            let _ = pass.add_indirect_input("DrawCounter");
        }).unwrap();
        let stats = executor.execute().unwrap();
        assert_eq!(stats.executor_errors, 0);
    }

    let reset = reset.lock();
    assert_eq!(reset.setups, 3);
    assert_eq!(reset.executions, 3);
    assert!(reset.seen_raw.iter().all(|raw| *raw == reset.seen_raw[0]));
    assert_eq!(executor.physical_handle("DrawCounter"), Some(reset.seen_raw[0]));
}
