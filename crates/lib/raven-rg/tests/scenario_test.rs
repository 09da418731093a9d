use std::sync::Arc;

use parking_lot::Mutex;

use raven_rg::{GraphExecutor, RenderGraphConfig};
use raven_rhi::backend::{
    AccessType, BufferDesc, BufferUsageFlags, Format, ImageDesc, RawHandle,
    null::{NullDevice, NullDeviceDesc},
};

fn setup(config: RenderGraphConfig) -> (Arc<NullDevice>, GraphExecutor) {
    let device = Arc::new(NullDevice::new(NullDeviceDesc::default()));
    let executor = GraphExecutor::new(device.clone(), config).unwrap();
    (device, executor)
}

#[test]
fn depth_hierarchy_shares_one_depth_object() {
    let (_device, mut executor) = setup(RenderGraphConfig::default());

    let depth_desc = ImageDesc::new_2d([1920, 1080], Format::R32Sfloat);
    let mips_desc = depth_desc.mip_levels(7);
    let seen: Arc<Mutex<Vec<(&'static str, RawHandle)>>> = Arc::new(Mutex::new(Vec::new()));

    executor.prepare(|rg| {
        {
            let mut pass = rg.add_pass("Fill");
            let depth = pass.write_texture("Depth", depth_desc, AccessType::ComputeShaderWrite);
            let seen = seen.clone();
            pass.render(move |ctx| {
                seen.lock().push(("Fill", ctx.get_write_texture(&depth).raw));
                Ok(())
            });
        }

        let mut pass = rg.add_pass("Hierarchy");
        let depth = pass.read_texture("Depth", AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer);
        let mips = pass.write_texture("DepthMips", mips_desc, AccessType::ComputeShaderWrite);
        let seen = seen.clone();
        pass.render(move |ctx| {
            seen.lock().push(("Hierarchy", ctx.get_read_texture(&depth).raw));
            let mips = ctx.get_write_texture(&mips);
            assert_eq!(mips.desc.mip_levels, 7);
            assert_eq!(mips.desc.extent_2d(), [1920, 1080]);
            Ok(())
        });
    }).unwrap();

    assert_eq!(executor.compiled().unwrap().pass_order(), vec!["Fill", "Hierarchy"]);

    let stats = executor.execute().unwrap();
    assert_eq!(stats.passes_executed, 2);
    assert_eq!(stats.executor_errors, 0);

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "Fill");
    assert_eq!(seen[1].0, "Hierarchy");
    assert_eq!(seen[0].1, seen[1].1);
    assert_eq!(Some(seen[0].1), executor.physical_handle("Depth"));
}

#[test]
fn read_modify_write_keeps_one_counter() {
    let (_device, mut executor) = setup(RenderGraphConfig::default());
    let counter_desc = BufferDesc::new_gpu_only(4, BufferUsageFlags::STORAGE);
    let seen: Arc<Mutex<Vec<RawHandle>>> = Arc::new(Mutex::new(Vec::new()));

    executor.prepare(|rg| {
        // the consumer is declared first, it still has to run after both writers
        {
            let mut pass = rg.add_pass("Downstream");
            let counter = pass.read_buffer("Counter", AccessType::ComputeShaderReadOther);
            let seen = seen.clone();
            pass.render(move |ctx| {
                seen.lock().push(ctx.get_read_buffer(&counter).raw);
                Ok(())
            });
        }

        let mut counter = {
            let mut pass = rg.add_pass("A");
            let counter = pass.write_buffer("Counter", counter_desc, AccessType::TransferWrite);
            let seen = seen.clone();
            let handle = counter.handle();
            pass.render(move |ctx| {
                seen.lock().push(ctx.get_write_buffer(&counter).raw);
                Ok(())
            });
            handle
        };
        assert_eq!(counter.version(), 1);

        let mut pass = rg.add_pass("B");
        let read = pass.read(&counter, AccessType::ComputeShaderReadOther);
        let write = pass.write(&mut counter, AccessType::ComputeShaderWrite);
        assert_eq!(read.version(), 1);
        assert_eq!(write.version(), 2);
        assert_eq!(counter.version(), 2);
        let seen = seen.clone();
        pass.render(move |ctx| {
            let read = ctx.get_read_buffer(&read).raw;
            assert_eq!(read, ctx.get_write_buffer(&write).raw);
            seen.lock().push(read);
            Ok(())
        });
    }).unwrap();

    let compiled = executor.compiled().unwrap();
    assert_eq!(compiled.pass_order(), vec!["A", "B", "Downstream"]);

    // one merged declaration, so a single transition for the counter in B
    let transitions = compiled.transitions_of("B").unwrap();
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].resource, "Counter");
    assert_eq!(
        transitions[0].next_access,
        vec![AccessType::ComputeShaderReadOther, AccessType::ComputeShaderWrite]
    );
    assert!(!transitions[0].discard_contents);

    executor.execute().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|raw| *raw == seen[0]));
}

#[test]
fn persistent_texture_survives_a_frame_without_writer() {
    let (_device, mut executor) = setup(RenderGraphConfig::default());
    let velocity_desc = ImageDesc::new_2d([1280, 720], Format::R16G16Sfloat);

    // frame 0 writes the persistent texture
    executor.prepare(|rg| {
        let mut velocity = rg.get_or_create_temporal("Velocity_Prev", velocity_desc);
        let mut pass = rg.add_pass("Velocity");
        let _ = pass.write(&mut velocity, AccessType::ComputeShaderWrite);
    }).unwrap();
    executor.execute().unwrap();

    let written = executor.physical_handle("Velocity_Prev").unwrap();
    let seen: Arc<Mutex<Option<RawHandle>>> = Arc::new(Mutex::new(None));

    // frame 1 only reads it
    executor.prepare(|rg| {
        let velocity = rg.get_or_create_temporal("Velocity_Prev", velocity_desc);
        let mut pass = rg.add_pass("Reproject");
        let velocity = pass.read(&velocity, AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer);
        let seen = seen.clone();
        pass.render(move |ctx| {
            *seen.lock() = Some(ctx.get_read_texture(&velocity).raw);
            Ok(())
        });
    }).unwrap();
    let stats = executor.execute().unwrap();

    assert_eq!(*seen.lock(), Some(written));
    assert_eq!(stats.objects_created, 0);
    assert_eq!(executor.physical_handle("Velocity_Prev"), Some(written));
}

#[test]
fn written_texture_has_the_declared_descriptor() {
    let (_device, mut executor) = setup(RenderGraphConfig::default());
    let desc = ImageDesc::new_2d([640, 360], Format::R16G16B16A16Sfloat).all_mip_levels();
    let seen: Arc<Mutex<Option<ImageDesc>>> = Arc::new(Mutex::new(None));

    executor.prepare(|rg| {
        let mut pass = rg.add_pass("Lighting");
        let output = pass.write_texture("T", desc, AccessType::ComputeShaderWrite);
        assert_eq!(*output.desc(), desc);

        let seen = seen.clone();
        pass.render(move |ctx| {
            *seen.lock() = Some(ctx.get_write_texture(&output).desc);
            Ok(())
        });
    }).unwrap();
    executor.execute().unwrap();

    assert_eq!(*seen.lock(), Some(desc));
}

#[test]
fn same_descriptor_keeps_the_physical_object() {
    let (device, mut executor) = setup(RenderGraphConfig::default());
    let desc = ImageDesc::new_2d([1920, 1080], Format::B10G11R11UfloatPack32);

    let mut handles = Vec::new();
    for _ in 0..4 {
        executor.prepare(|rg| {
            let mut pass = rg.add_pass("Lighting");
            let _ = pass.write_texture("Lit", desc, AccessType::ComputeShaderWrite);
        }).unwrap();
        executor.execute().unwrap();
        handles.push(executor.physical_handle("Lit").unwrap());
    }

    assert!(handles.iter().all(|raw| *raw == handles[0]));
    assert_eq!(executor.allocator_stats().reallocations, 0);
    // the placeholders and the single texture
    assert_eq!(device.stats().images_created, 2);
}

#[test]
fn resize_reallocates() {
    let (device, mut executor) = setup(RenderGraphConfig::default());
    let small = ImageDesc::new_2d([960, 540], Format::R8G8B8A8Unorm);
    let large = ImageDesc::new_2d([1920, 1080], Format::R8G8B8A8Unorm);
    let seen: Arc<Mutex<Option<ImageDesc>>> = Arc::new(Mutex::new(None));

    executor.prepare(|rg| {
        let mut pass = rg.add_pass("Tonemap");
        let _ = pass.write_texture("T", small, AccessType::ComputeShaderWrite);
    }).unwrap();
    executor.execute().unwrap();
    let before = executor.physical_handle("T").unwrap();

    executor.prepare(|rg| {
        let mut pass = rg.add_pass("Tonemap");
        let output = pass.write_texture("T", large, AccessType::ComputeShaderWrite);
        let seen = seen.clone();
        pass.render(move |ctx| {
            *seen.lock() = Some(ctx.get_write_texture(&output).desc);
            Ok(())
        });
    }).unwrap();
    let stats = executor.execute().unwrap();

    let after = executor.physical_handle("T").unwrap();
    assert_ne!(before, after);
    assert_eq!(*seen.lock(), Some(large));
    assert_eq!(stats.objects_created, 1);
    assert_eq!(executor.allocator_stats().reallocations, 1);

    // frame 0 was still in flight when the old texture went away
    assert_eq!(stats.stalls, 1);
    assert_eq!(device.stats().stall_count, 1);
    assert_eq!(device.stats().unsafe_destroys, 0);
}
