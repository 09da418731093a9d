use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use raven_rg::{ConfigurationError, GraphExecutor, RenderGraphConfig, RenderGraphError, RenderGraphState};
use raven_rhi::backend::{
    AccessType, BufferDesc, BufferUsageFlags, Format, ImageDesc, RenderDevice,
    null::{NullDevice, NullDeviceDesc},
};

fn setup() -> (Arc<NullDevice>, GraphExecutor) {
    let device = Arc::new(NullDevice::new(NullDeviceDesc::default()));
    let executor = GraphExecutor::new(device.clone(), RenderGraphConfig::default()).unwrap();
    (device, executor)
}

fn buffer() -> BufferDesc {
    BufferDesc::new_gpu_only(1024, BufferUsageFlags::STORAGE)
}

#[test]
fn cycle_is_reported_at_compile() {
    let (device, mut executor) = setup();
    let executed = Arc::new(AtomicUsize::new(0));

    let result = executor.prepare(|rg| {
        {
            let mut pass = rg.add_pass("A");
            let _ = pass.read_buffer("R1", AccessType::ComputeShaderReadOther);
            let _ = pass.write_buffer("R2", buffer(), AccessType::ComputeShaderWrite);
            let executed = executed.clone();
            pass.render(move |_| {
                executed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        }

        let mut pass = rg.add_pass("B");
        let _ = pass.read_buffer("R2", AccessType::ComputeShaderReadOther);
        let _ = pass.write_buffer("R1", buffer(), AccessType::ComputeShaderWrite);
    });

    let errors = match result {
        Err(RenderGraphError::Configuration(errors)) => errors,
        other => panic!("expected a configuration error, got {:?}", other),
    };
    assert_eq!(errors.len(), 1);

    match &errors.0[0] {
        ConfigurationError::DependencyCycle { passes, resources } => {
            let mut passes = passes.clone();
            passes.sort();
            assert_eq!(passes, vec!["A", "B"]);

            let mut resources = resources.clone();
            resources.sort();
            assert_eq!(resources, vec!["R1", "R2"]);
        }
        err => panic!("unexpected error {}", err),
    }

    // the frame never reaches execution
    assert_eq!(executor.state(), RenderGraphState::Idle);
    assert!(executor.compiled().is_none());
    assert!(matches!(
        executor.execute(),
        Err(RenderGraphError::InvalidState { expected: RenderGraphState::Compiled, found: RenderGraphState::Idle })
    ));
    assert_eq!(executed.load(Ordering::Relaxed), 0);
    assert_eq!(device.stats().frames_submitted, 0);
}

#[test]
fn every_error_of_a_frame_is_collected() {
    let (_device, mut executor) = setup();

    let result = executor.prepare(|rg| {
        // cycle
        {
            let mut pass = rg.add_pass("A");
            let _ = pass.read_buffer("R1", AccessType::ComputeShaderReadOther);
            let _ = pass.write_buffer("R2", buffer(), AccessType::ComputeShaderWrite);
        }
        {
            let mut pass = rg.add_pass("B");
            let _ = pass.read_buffer("R2", AccessType::ComputeShaderReadOther);
            let _ = pass.write_buffer("R1", buffer(), AccessType::ComputeShaderWrite);
        }

        // kind mismatch
        {
            let mut pass = rg.add_pass("C");
            let _ = pass.write_texture("Shared", ImageDesc::new_2d([64, 64], Format::R8Unorm), AccessType::ComputeShaderWrite);
        }
        {
            let mut pass = rg.add_pass("D");
            let _ = pass.read_buffer("Shared", AccessType::ComputeShaderReadOther);
        }

        // descriptor conflict
        {
            let mut pass = rg.add_pass("E");
            let _ = pass.write_texture("Hdr", ImageDesc::new_2d([1280, 720], Format::R16G16B16A16Sfloat), AccessType::ComputeShaderWrite);
        }
        let mut pass = rg.add_pass("F");
        let _ = pass.write_texture("Hdr", ImageDesc::new_2d([640, 360], Format::R16G16B16A16Sfloat), AccessType::ComputeShaderWrite);
    });

    let errors = match result {
        Err(RenderGraphError::Configuration(errors)) => errors,
        other => panic!("expected a configuration error, got {:?}", other),
    };

    assert_eq!(errors.len(), 3);
    assert!(errors.iter().any(|err| matches!(err, ConfigurationError::DependencyCycle { .. })));
    assert!(errors.iter().any(|err| matches!(err, ConfigurationError::KindMismatch { pass, .. } if pass == "D")));
    assert!(errors.iter().any(|err| matches!(err, ConfigurationError::DescriptorConflict { pass, .. } if pass == "F")));

    let message = errors.to_string();
    assert!(message.starts_with("3 render graph configuration error(s):"));
    assert!(message.contains("\"Hdr\""));
}

#[test]
fn failed_frame_can_be_prepared_again() {
    let (_device, mut executor) = setup();

    assert!(executor.prepare(|rg| {
        {
            let mut pass = rg.add_pass("A");
            let _ = pass.read_buffer("R1", AccessType::ComputeShaderReadOther);
            let _ = pass.write_buffer("R2", buffer(), AccessType::ComputeShaderWrite);
        }
        let mut pass = rg.add_pass("B");
        let _ = pass.read_buffer("R2", AccessType::ComputeShaderReadOther);
        let _ = pass.write_buffer("R1", buffer(), AccessType::ComputeShaderWrite);
    }).is_err());
    assert_eq!(executor.frame_index(), 0);

    executor.prepare(|rg| {
        {
            let mut pass = rg.add_pass("A");
            let _ = pass.write_buffer("R2", buffer(), AccessType::ComputeShaderWrite);
        }
        let mut pass = rg.add_pass("B");
        let _ = pass.read_buffer("R2", AccessType::ComputeShaderReadOther);
        let _ = pass.write_buffer("R1", buffer(), AccessType::ComputeShaderWrite);
    }).unwrap();

    let stats = executor.execute().unwrap();
    assert_eq!(stats.frame_index, 0);
    assert_eq!(stats.passes_executed, 2);
    assert_eq!(executor.frame_index(), 1);
}

#[test]
fn writing_through_a_superseded_handle_conflicts() {
    let (_device, mut executor) = setup();

    let result = executor.prepare(|rg| {
        let mut first = {
            let mut pass = rg.add_pass("Clear");
            pass.write_buffer("Histogram", buffer(), AccessType::TransferWrite).handle()
        };
        {
            let mut pass = rg.add_pass("Accumulate");
            let _ = pass.write_buffer("Histogram", buffer(), AccessType::ComputeShaderWrite);
        }
        let mut pass = rg.add_pass("Late");
        let _ = pass.write(&mut first, AccessType::ComputeShaderWrite);
    });

    match result {
        Err(RenderGraphError::Configuration(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors.0[0], ConfigurationError::VersionConflict {
                pass: "Late".to_owned(),
                resource: "Histogram".to_owned(),
                expected: 2,
                found: 1,
            });
        }
        other => panic!("expected a version conflict, got {:?}", other),
    }
}

#[test]
fn reading_two_versions_in_one_pass_conflicts() {
    let (_device, mut executor) = setup();

    let result = executor.prepare(|rg| {
        let first = {
            let mut pass = rg.add_pass("Build");
            pass.write_buffer("Clusters", buffer(), AccessType::ComputeShaderWrite).handle()
        };
        let mut second = first.clone();
        {
            let mut pass = rg.add_pass("Refine");
            let _ = pass.write(&mut second, AccessType::ComputeShaderWrite);
        }
        let mut pass = rg.add_pass("Compare");
        let _ = pass.read(&first, AccessType::ComputeShaderReadOther);
        let _ = pass.read(&second, AccessType::ComputeShaderReadOther);
    });

    match result {
        Err(RenderGraphError::Configuration(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors.0[0], ConfigurationError::VersionConflict {
                pass: "Compare".to_owned(),
                resource: "Clusters".to_owned(),
                expected: 1,
                found: 2,
            });
        }
        other => panic!("expected a version conflict, got {:?}", other),
    }
    assert!(executor.compiled().is_none());
}

#[test]
fn state_machine_rejects_out_of_order_calls() {
    let (device, mut executor) = setup();

    assert!(matches!(
        executor.execute(),
        Err(RenderGraphError::InvalidState { expected: RenderGraphState::Compiled, found: RenderGraphState::Idle })
    ));

    executor.prepare(|rg| {
        let mut pass = rg.add_pass("A");
        let _ = pass.write_buffer("R", buffer(), AccessType::ComputeShaderWrite);
    }).unwrap();
    assert_eq!(executor.state(), RenderGraphState::Compiled);

    assert!(matches!(
        executor.prepare(|_| {}),
        Err(RenderGraphError::InvalidState { expected: RenderGraphState::Idle, found: RenderGraphState::Compiled })
    ));

    executor.execute().unwrap();
    assert_eq!(executor.state(), RenderGraphState::Idle);
    assert_eq!(device.frames_in_flight(), 2);
}
