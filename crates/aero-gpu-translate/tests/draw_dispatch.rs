mod common;

use aero_gpu_translate::caps::{DynamicStateTier, HostCapabilities, Vendor};
use aero_gpu_translate::cmd::{BarrierKinds, NativeCmd, StencilFaces};
use aero_gpu_translate::state::DynamicFields;
use aero_gpu_translate::types::{
    BindPoint, BlendDescriptor, BlendFactor, BufferHandle, BufferRange, ColorWriteMask, ContextId,
    CullMode, Format, IndexType, NativeBuffer, NativeBufferSlice, PrimitiveTopology, ProgramId,
    Rect2D, StencilFace, StencilTest, Viewport,
};
use aero_gpu_translate::{DrawOutcome, RuntimeConfig, SkipReason, TranslateError};
use pretty_assertions::assert_eq;

use common::{
    color_target, dynamic_commands, guest_buffer, pipeline_binds, recording, runtime,
    runtime_with_config, since, TestProgram,
};

fn with_target(caps: HostCapabilities) -> aero_gpu_translate::GfxRuntime<common::FakeBackend> {
    let mut rt = recording(caps);
    rt.set_render_targets(&[Some(color_target(1, Format::Rgba8Unorm))], None)
        .unwrap();
    rt
}

#[test]
fn draw_without_context_is_an_error() {
    let mut rt = runtime(HostCapabilities::desktop(Vendor::Nvidia));
    rt.set_program(TestProgram::graphics(1));
    assert!(matches!(
        rt.draw(3, 1, 0, 0),
        Err(TranslateError::NoRecordingContext)
    ));
}

#[test]
fn recording_contexts_must_be_sequential() {
    let mut rt = runtime(HostCapabilities::default());
    rt.begin_recording(ContextId(3)).unwrap();
    assert!(matches!(
        rt.begin_recording(ContextId(4)),
        Err(TranslateError::RecordingInProgress(ContextId(3)))
    ));
    rt.end_recording().unwrap();
    assert!(matches!(
        rt.begin_recording(ContextId(3)),
        Err(TranslateError::ContextOutOfOrder { .. })
    ));
    rt.begin_recording(ContextId(4)).unwrap();
}

#[test]
fn repeated_state_emits_nothing_on_the_second_draw() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    let viewport = Viewport {
        width: 640.0,
        height: 480.0,
        ..Viewport::default()
    };
    rt.set_viewports(&[viewport]);
    rt.set_cull_mode(CullMode::Back);
    assert_eq!(rt.draw(3, 1, 0, 0).unwrap(), DrawOutcome::Recorded);
    assert!(dynamic_commands(rt.commands()) > 0);
    assert_eq!(pipeline_binds(rt.commands()), 1);

    let mark = rt.commands().len();
    rt.set_viewports(&[viewport]);
    rt.set_cull_mode(CullMode::Back);
    assert_eq!(rt.draw(3, 1, 0, 0).unwrap(), DrawOutcome::Recorded);

    assert_eq!(
        since(&rt, mark),
        vec![NativeCmd::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }]
    );
    let stats = rt.stats();
    assert_eq!(stats.pipeline_binds, 1);
    assert_eq!(stats.pipeline_binds_elided, 1);
    assert_eq!(stats.draws_recorded, 2);
}

#[test]
fn extended_tier_changes_dynamic_state_without_a_new_pipeline() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Amd));
    assert!(matches!(rt.tier(), DynamicStateTier::Extended2 { .. }));
    rt.draw(3, 1, 0, 0).unwrap();

    let mark = rt.commands().len();
    rt.set_cull_mode(CullMode::Back);
    rt.draw(3, 1, 0, 0).unwrap();

    let cmds = since(&rt, mark);
    assert_eq!(cmds[0], NativeCmd::SetCullMode(CullMode::Back));
    assert_eq!(dynamic_commands(&cmds), 1);
    assert_eq!(pipeline_binds(&cmds), 0);
    assert_eq!(rt.backend().graphics_pipelines.len(), 1);
    assert_eq!(
        rt.backend().graphics_pipelines[0].dynamic_fields,
        rt.tier().dynamic_fields()
    );
}

#[test]
fn baseline_tier_bakes_state_into_the_pipeline() {
    let mut rt = with_target(HostCapabilities::default());
    assert_eq!(rt.tier(), DynamicStateTier::Baseline);
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(dynamic_commands(rt.commands()), 0);

    let mark = rt.commands().len();
    rt.set_cull_mode(CullMode::Back);
    rt.draw(3, 1, 0, 0).unwrap();

    let cmds = since(&rt, mark);
    assert_eq!(dynamic_commands(&cmds), 0);
    assert_eq!(pipeline_binds(&cmds), 1);
    let created = &rt.backend().graphics_pipelines;
    assert_eq!(created.len(), 2);
    assert_ne!(created[0].key_hash, created[1].key_hash);
    assert!(created[0].dynamic_fields.is_empty());

    // Back to the first state: the cached pipeline is reused.
    rt.set_cull_mode(CullMode::None);
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(rt.backend().graphics_pipelines.len(), 2);
    assert_eq!(rt.pipeline_cache_stats().hits, 1);
}

#[test]
fn disabling_extended_state_by_config_selects_baseline() {
    let config = RuntimeConfig {
        disable_extended_dynamic_state: true,
        ..RuntimeConfig::default()
    };
    let rt = runtime_with_config(HostCapabilities::desktop(Vendor::Nvidia), config);
    assert_eq!(rt.tier(), DynamicStateTier::Baseline);
    assert!(rt.dynamic_state().covered().is_empty());
}

#[test]
fn dynamic_fields_never_change_the_pipeline_key() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Intel));
    rt.draw(3, 1, 0, 0).unwrap();
    rt.set_scissors(&[Rect2D {
        x: 4,
        y: 4,
        width: 16,
        height: 16,
    }]);
    rt.set_line_width(3.0);
    rt.set_blend_constants([0.5; 4]);
    rt.set_primitive_restart(true);
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(rt.backend().graphics_pipelines.len(), 1);
    assert!(rt
        .dynamic_state()
        .covers(DynamicFields::SCISSOR | DynamicFields::LINE_WIDTH));
}

#[test]
fn unlinked_program_skips_until_linking_finishes() {
    let mut rt = runtime(HostCapabilities::desktop(Vendor::Nvidia));
    let program = TestProgram::compiling(5);
    rt.set_program(program.clone());
    rt.begin_recording(ContextId(1)).unwrap();

    assert_eq!(
        rt.draw(3, 1, 0, 0).unwrap(),
        DrawOutcome::Skipped(SkipReason::ProgramNotLinked)
    );
    assert!(rt.commands().is_empty());
    assert!(rt.backend().graphics_pipelines.is_empty());

    program.finish_linking();
    assert_eq!(rt.draw(3, 1, 0, 0).unwrap(), DrawOutcome::Recorded);
    assert_eq!(rt.backend().graphics_pipelines.len(), 1);
    assert_eq!(rt.stats().draws_skipped, 1);
}

#[test]
fn draw_without_program_or_work_is_skipped() {
    let mut rt = runtime(HostCapabilities::default());
    rt.begin_recording(ContextId(1)).unwrap();
    assert_eq!(
        rt.draw(3, 1, 0, 0).unwrap(),
        DrawOutcome::Skipped(SkipReason::NoProgram)
    );
    rt.set_program(TestProgram::graphics(1));
    assert_eq!(
        rt.draw(0, 1, 0, 0).unwrap(),
        DrawOutcome::Skipped(SkipReason::EmptyDraw)
    );
    assert_eq!(
        rt.draw(3, 0, 0, 0).unwrap(),
        DrawOutcome::Skipped(SkipReason::EmptyDraw)
    );
    assert_eq!(
        rt.draw_indexed(6, 1, 0, 0, 0).unwrap(),
        DrawOutcome::Skipped(SkipReason::NoIndexBuffer)
    );
    assert!(rt.commands().is_empty());
}

#[test]
fn compile_failure_skips_and_the_next_draw_retries() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.backend_mut().fail_pipelines = true;
    assert_eq!(
        rt.draw(3, 1, 0, 0).unwrap(),
        DrawOutcome::Skipped(SkipReason::PipelineCompileFailed)
    );
    assert!(!rt.commands().iter().any(NativeCmd::is_draw));

    rt.backend_mut().fail_pipelines = false;
    assert_eq!(rt.draw(3, 1, 0, 0).unwrap(), DrawOutcome::Recorded);
    let stats = rt.stats();
    assert_eq!(stats.pipeline_compile_failures, 1);
    assert_eq!(stats.draws_skipped, 1);
    assert_eq!(rt.pipeline_cache_stats().compile_failures, 1);
}

#[test]
fn alternating_programs_rebind_but_do_not_recompile() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    let a = TestProgram::graphics(1);
    let b = TestProgram::graphics(2);
    for program in [&a, &b, &a] {
        rt.set_program(program.clone());
        rt.draw(3, 1, 0, 0).unwrap();
    }
    assert_eq!(pipeline_binds(rt.commands()), 3);
    assert_eq!(rt.backend().graphics_pipelines.len(), 2);

    // Setting the same program again is not a state change.
    rt.set_program(a.clone());
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(pipeline_binds(rt.commands()), 3);
}

#[test]
fn qualcomm_discard_toggle_forces_a_full_replay() {
    fn replay_after_discard_toggle(vendor: Vendor) -> (usize, usize) {
        let mut rt = with_target(HostCapabilities::desktop(vendor));
        rt.draw(3, 1, 0, 0).unwrap();
        let full = dynamic_commands(rt.commands());

        rt.set_rasterizer_discard(true);
        let mark = rt.commands().len();
        rt.draw(3, 1, 0, 0).unwrap();
        assert_eq!(
            since(&rt, mark)[0],
            NativeCmd::SetRasterizerDiscardEnable(true)
        );

        rt.set_rasterizer_discard(false);
        let mark = rt.commands().len();
        rt.draw(3, 1, 0, 0).unwrap();
        (full, dynamic_commands(&since(&rt, mark)))
    }

    let (full, after) = replay_after_discard_toggle(Vendor::Qualcomm);
    assert_eq!(after, full);

    let (full, after) = replay_after_discard_toggle(Vendor::Nvidia);
    assert!(full > 1);
    assert_eq!(after, 1);
}

#[test]
fn forced_replay_re_emits_everything_each_draw() {
    let config = RuntimeConfig {
        force_full_dynamic_replay: true,
        ..RuntimeConfig::default()
    };
    let mut rt = runtime_with_config(HostCapabilities::desktop(Vendor::Nvidia), config);
    rt.set_program(TestProgram::graphics(1));
    rt.begin_recording(ContextId(1)).unwrap();
    rt.draw(3, 1, 0, 0).unwrap();
    let first = dynamic_commands(rt.commands());
    let mark = rt.commands().len();
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(dynamic_commands(&since(&rt, mark)), first);
}

#[test]
fn new_context_rebinds_from_the_cache() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.draw(3, 1, 0, 0).unwrap();
    let first = rt.end_recording().unwrap();
    assert_eq!(first.last(), Some(&NativeCmd::EndRenderPass));
    let full = dynamic_commands(&first);

    rt.begin_recording(ContextId(2)).unwrap();
    rt.draw(3, 1, 0, 0).unwrap();
    let second = rt.end_recording().unwrap();
    assert_eq!(pipeline_binds(&second), 1);
    assert_eq!(dynamic_commands(&second), full);
    assert_eq!(rt.backend().graphics_pipelines.len(), 1);
    assert_eq!(rt.backend().descriptor_invalidations, 2);
}

#[test]
fn compute_dispatch_ends_the_render_pass() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.draw(3, 1, 0, 0).unwrap();
    rt.set_program(TestProgram::compute(9));
    let mark = rt.commands().len();
    assert_eq!(rt.dispatch_compute(4, 1, 1).unwrap(), DrawOutcome::Recorded);

    let cmds = since(&rt, mark);
    let end = cmds
        .iter()
        .position(|c| *c == NativeCmd::EndRenderPass)
        .unwrap();
    let dispatch = cmds
        .iter()
        .position(|c| *c == NativeCmd::Dispatch { x: 4, y: 1, z: 1 })
        .unwrap();
    assert!(end < dispatch);
    assert!(cmds.iter().any(|c| matches!(
        c,
        NativeCmd::BindPipeline {
            bind_point: BindPoint::Compute,
            ..
        }
    )));
    assert_eq!(
        rt.backend().descriptor_updates,
        vec![BindPoint::Graphics, BindPoint::Compute]
    );
    assert_eq!(rt.stats().dispatches_recorded, 1);
    assert_eq!(
        rt.dispatch_compute(0, 1, 1).unwrap(),
        DrawOutcome::Skipped(SkipReason::EmptyDraw)
    );
}

#[test]
fn destroyed_program_pipelines_wait_for_their_context() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.draw(3, 1, 0, 0).unwrap();
    rt.destroy_program(ProgramId(1));
    assert_eq!(rt.pending_destroys(), 1);
    assert_eq!(
        rt.draw(3, 1, 0, 0).unwrap(),
        DrawOutcome::Skipped(SkipReason::NoProgram)
    );
    rt.end_recording().unwrap();

    assert_eq!(rt.retire_contexts(ContextId(0)), 0);
    assert_eq!(rt.retire_contexts(ContextId(1)), 1);
    assert_eq!(rt.backend().destroyed_pipelines.len(), 1);
    assert_eq!(rt.stats().deferred_destroys, 1);
}

#[test]
fn pipeline_cache_blob_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipelines.bin");
    let config = RuntimeConfig {
        pipeline_cache_path: Some(path.clone()),
        ..RuntimeConfig::default()
    };

    let mut rt = runtime_with_config(HostCapabilities::default(), config.clone());
    assert!(rt.backend().loaded_cache.is_none());
    rt.backend_mut().device_cache = b"driver pipeline cache".to_vec();
    assert!(rt.save_pipeline_cache().unwrap());

    let rt = runtime_with_config(HostCapabilities::default(), config.clone());
    assert_eq!(
        rt.backend().loaded_cache.as_deref(),
        Some(&b"driver pipeline cache"[..])
    );

    // A damaged blob is ignored rather than handed to the driver.
    std::fs::write(&path, b"garbage").unwrap();
    let rt = runtime_with_config(HostCapabilities::default(), config);
    assert!(rt.backend().loaded_cache.is_none());
}

#[test]
fn saving_without_a_path_is_a_no_op() {
    let mut rt = runtime(HostCapabilities::default());
    assert!(!rt.save_pipeline_cache().unwrap());
}

#[test]
fn stats_report_as_json() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.draw(3, 1, 0, 0).unwrap();
    rt.draw(0, 1, 0, 0).unwrap();
    let json = rt.stats().to_json();
    assert!(json.contains("\"draws_recorded\":1"));
    assert!(json.contains("\"draws_skipped\":1"));
    assert!(json.contains("\"render_pass\":{\"begins\":1,"));
}

#[test]
fn teardown_destroys_every_cached_object() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.draw(3, 1, 0, 0).unwrap();
    rt.end_recording().unwrap();
    let backend = rt.into_backend();
    assert_eq!(backend.destroyed_pipelines.len(), 1);
    assert_eq!(backend.destroyed_framebuffers.len(), 1);
}

#[test]
fn stencil_reference_splits_per_face_only_when_faces_differ() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.draw(3, 1, 0, 0).unwrap();

    let face = StencilFace {
        reference: 3,
        ..StencilFace::default()
    };
    rt.set_stencil_test(StencilTest {
        enable: true,
        front: face,
        back: face,
    });
    let mark = rt.commands().len();
    rt.draw(3, 1, 0, 0).unwrap();
    let cmds = since(&rt, mark);
    assert_eq!(
        &cmds[..2],
        &[
            NativeCmd::SetStencilTestEnable(true),
            NativeCmd::SetStencilReference {
                faces: StencilFaces::FrontAndBack,
                reference: 3,
            },
        ]
    );
    assert_eq!(pipeline_binds(&cmds), 0);

    rt.set_stencil_test(StencilTest {
        enable: true,
        front: face,
        back: StencilFace {
            reference: 5,
            ..face
        },
    });
    let mark = rt.commands().len();
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(
        since(&rt, mark),
        vec![
            NativeCmd::SetStencilReference {
                faces: StencilFaces::Front,
                reference: 3,
            },
            NativeCmd::SetStencilReference {
                faces: StencilFaces::Back,
                reference: 5,
            },
            NativeCmd::Draw {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            },
        ]
    );
}

#[test]
fn blend_set_while_masked_applies_once_unmasked() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    let additive = BlendDescriptor {
        enable: true,
        color_src: BlendFactor::One,
        color_dst: BlendFactor::One,
        ..BlendDescriptor::default()
    };

    rt.set_render_target_color_masks(&[ColorWriteMask::empty()])
        .unwrap();
    rt.set_blend_state(0, additive).unwrap();
    assert!(rt.pipeline_state().color_write_mask(0).is_empty());
    assert_eq!(rt.pipeline_state().blend(0), BlendDescriptor::default());
    rt.draw(3, 1, 0, 0).unwrap();

    rt.set_render_target_color_masks(&[ColorWriteMask::ALL])
        .unwrap();
    assert_eq!(rt.pipeline_state().blend(0), additive);
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(rt.backend().graphics_pipelines.len(), 2);

    // Slots past the last render target are dropped.
    rt.set_blend_state(8, additive).unwrap();
}

#[test]
fn only_the_specialization_bytes_a_program_reads_select_a_pipeline() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.set_program(TestProgram::specialized(2, 4));
    rt.draw(3, 1, 0, 0).unwrap();

    rt.set_specialization_data(&[1, 2, 3, 4, 5]);
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(rt.backend().graphics_pipelines.len(), 2);

    rt.set_specialization_data(&[1, 2, 3, 4, 9]);
    let mark = rt.commands().len();
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(pipeline_binds(&since(&rt, mark)), 0);
    assert_eq!(rt.backend().graphics_pipelines.len(), 2);
}

#[test]
fn native_indexed_indirect_draws_pass_the_arguments_through() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    let args = guest_buffer(&mut rt, 20, 0, 40);
    assert_eq!(
        rt.draw_indexed_indirect(args, 2, 20).unwrap(),
        DrawOutcome::Skipped(SkipReason::NoIndexBuffer)
    );

    let indices = guest_buffer(&mut rt, 21, 0, 64);
    rt.set_index_buffer(Some(indices), IndexType::U16);
    let outcome = rt.draw_indexed_indirect(args, 2, 20).unwrap();
    assert!(outcome.is_recorded());
    assert_eq!(
        rt.commands().last(),
        Some(&NativeCmd::DrawIndexedIndirect {
            args: NativeBufferSlice {
                buffer: NativeBuffer(20),
                offset: 0,
                size: 40,
            },
            draw_count: 2,
            stride: 20,
        })
    );
    assert!(!rt.draw_indexed_indirect(args, 0, 20).unwrap().is_recorded());
}

#[test]
fn indirect_compute_dispatch() {
    let mut rt = recording(HostCapabilities::desktop(Vendor::Nvidia));
    rt.set_program(TestProgram::compute(9));
    let args = guest_buffer(&mut rt, 30, 16, 12);
    assert_eq!(
        rt.dispatch_compute_indirect(args).unwrap(),
        DrawOutcome::Recorded
    );
    assert_eq!(
        rt.commands().last(),
        Some(&NativeCmd::DispatchIndirect {
            args: NativeBufferSlice {
                buffer: NativeBuffer(30),
                offset: 16,
                size: 12,
            },
        })
    );

    assert_eq!(
        rt.dispatch_compute_indirect(BufferRange::new(BufferHandle(30), 0, 0))
            .unwrap(),
        DrawOutcome::Skipped(SkipReason::EmptyDraw)
    );
    assert_eq!(
        rt.dispatch_compute_indirect(BufferRange::new(BufferHandle(77), 0, 12))
            .unwrap(),
        DrawOutcome::Skipped(SkipReason::UnresolvedBuffer)
    );
    assert_eq!(rt.stats().dispatches_recorded, 1);
}

#[test]
fn queued_barriers_flush_before_the_next_draw() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.draw(3, 1, 0, 0).unwrap();
    rt.command_buffer_barrier();
    let mark = rt.commands().len();
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(
        since(&rt, mark)[0],
        NativeCmd::PipelineBarrier(BarrierKinds::COMMAND_BUFFER)
    );
}

#[test]
fn forcing_dynamic_state_dirty_replays_it_once() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.draw(3, 1, 0, 0).unwrap();
    let full = dynamic_commands(rt.commands());

    rt.force_dynamic_state_dirty();
    let mark = rt.commands().len();
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(dynamic_commands(&since(&rt, mark)), full);

    let mark = rt.commands().len();
    rt.draw(3, 1, 0, 0).unwrap();
    assert_eq!(dynamic_commands(&since(&rt, mark)), 0);
}

#[test]
fn record_metrics_count_the_current_context() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    assert!(rt.render_passes().current_framebuffer().is_some());
    rt.draw(3, 1, 0, 0).unwrap();
    rt.draw(3, 1, 0, 0).unwrap();

    let metrics = rt.record_metrics();
    assert_eq!(metrics.commands, rt.commands().len() as u64);
    assert_eq!(metrics.draws, 2);
    assert_eq!(metrics.pipeline_binds, 1);
    assert_eq!(metrics.render_passes, 1);
    assert_eq!(
        metrics.dynamic_state_commands,
        dynamic_commands(rt.commands()) as u64
    );
}

#[test]
fn pipeline_evicted_while_realized_is_rebuilt_before_reuse() {
    let config = RuntimeConfig {
        pipeline_cache_capacity: 1,
        ..RuntimeConfig::default()
    };
    let mut rt = runtime_with_config(HostCapabilities::desktop(Vendor::Nvidia), config);
    rt.set_program(TestProgram::graphics(1));
    rt.set_program(TestProgram::compute(9));
    rt.begin_recording(ContextId(1)).unwrap();
    rt.draw(3, 1, 0, 0).unwrap();
    let graphics = rt.backend().graphics_pipelines[0].handle;

    // The compute pipeline pushes the graphics one out of the cache.
    rt.dispatch_compute(1, 1, 1).unwrap();
    assert_eq!(rt.pipeline_cache_stats().evictions, 1);
    rt.end_recording().unwrap();
    rt.retire_contexts(ContextId(1));
    assert_eq!(rt.backend().destroyed_pipelines, vec![graphics]);

    rt.begin_recording(ContextId(2)).unwrap();
    rt.draw(3, 1, 0, 0).unwrap();
    let bound: Vec<_> = rt
        .commands()
        .iter()
        .filter_map(|c| match c {
            NativeCmd::BindPipeline {
                bind_point: BindPoint::Graphics,
                pipeline,
            } => Some(*pipeline),
            _ => None,
        })
        .collect();
    assert_eq!(rt.backend().graphics_pipelines.len(), 2);
    assert_eq!(bound, vec![rt.backend().graphics_pipelines[1].handle]);
    assert_ne!(bound[0], graphics);
}

#[test]
fn emulated_draws_reject_first_vertex_beyond_the_base_vertex_range() {
    let mut rt = with_target(HostCapabilities::desktop(Vendor::Nvidia));
    rt.set_primitive_topology(PrimitiveTopology::Quads);
    let mark = rt.commands().len();
    assert!(matches!(
        rt.draw(4, 1, u32::MAX, 0),
        Err(TranslateError::BaseVertexOutOfRange(u32::MAX))
    ));
    assert_eq!(rt.commands().len(), mark);

    rt.draw(4, 1, i32::MAX as u32, 0).unwrap();
    assert!(matches!(
        rt.commands().last(),
        Some(NativeCmd::DrawIndexed {
            base_vertex: i32::MAX,
            ..
        })
    ));

    // Native draws carry the unsigned first vertex as is.
    rt.set_primitive_topology(PrimitiveTopology::Triangles);
    rt.draw(3, 1, u32::MAX, 0).unwrap();
}
