//! Shared helpers for `aero-gpu-translate` integration tests.
//!
//! [`FakeBackend`] stands in for every host collaborator. Guest buffers resolve to a native
//! buffer named after their backing allocation, so tests can observe allocation swaps in the
//! recorded command stream.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use aero_gpu_translate::backend::{ComputePipelineDesc, GraphicsPipelineDesc};
use aero_gpu_translate::cmd::BarrierKinds;
use aero_gpu_translate::render_pass::{AttachmentSignature, FramebufferKey};
use aero_gpu_translate::state::DynamicFields;
use aero_gpu_translate::types::{
    AllocationId, BindPoint, BufferHandle, BufferRange, ContextId, Extent2D, Format, ImageViewId,
    NativeBuffer, NativeFramebuffer, NativePipeline, NativeRenderPass, PipelineLayoutId,
    ProgramId, RenderTarget, ShaderStages, VertexBindingDesc,
};
use aero_gpu_translate::{
    BarrierBatch, BufferAllocator, BufferRef, CommandSink, DescriptorUpdater, GfxRuntime,
    HostCapabilities, NativeCmd, NativeDevice, RenderPassObserver, RuntimeConfig, ShaderProgram,
};

/// Scratch buffers get handles far away from allocation-backed ones.
const SCRATCH_BASE: u64 = 1 << 32;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

pub struct TestProgram {
    id: ProgramId,
    compute: bool,
    linked: Cell<bool>,
    specialization_size: usize,
}

impl TestProgram {
    pub fn graphics(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: ProgramId(id),
            compute: false,
            linked: Cell::new(true),
            specialization_size: 0,
        })
    }

    /// Graphics program that reads the first `size` specialization bytes.
    pub fn specialized(id: u64, size: usize) -> Arc<Self> {
        Arc::new(Self {
            id: ProgramId(id),
            compute: false,
            linked: Cell::new(true),
            specialization_size: size,
        })
    }

    pub fn compute(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: ProgramId(id),
            compute: true,
            linked: Cell::new(true),
            specialization_size: 0,
        })
    }

    pub fn compiling(id: u64) -> Arc<Self> {
        let program = Self::graphics(id);
        program.linked.set(false);
        program
    }

    pub fn finish_linking(&self) {
        self.linked.set(true);
    }
}

impl ShaderProgram for TestProgram {
    fn id(&self) -> ProgramId {
        self.id
    }

    fn is_linked(&self) -> bool {
        self.linked.get()
    }

    fn is_compute(&self) -> bool {
        self.compute
    }

    fn stages(&self) -> ShaderStages {
        if self.compute {
            ShaderStages::COMPUTE
        } else {
            ShaderStages::VERTEX | ShaderStages::FRAGMENT
        }
    }

    fn layout(&self) -> PipelineLayoutId {
        PipelineLayoutId(self.id.0)
    }

    fn specialization_size(&self) -> usize {
        self.specialization_size
    }
}

/// What the fake device saw when asked for a graphics pipeline.
#[derive(Clone, Debug)]
pub struct CreatedPipeline {
    pub handle: NativePipeline,
    pub key_hash: u64,
    pub program: ProgramId,
    pub dynamic_fields: DynamicFields,
    pub vertex_bindings: Vec<VertexBindingDesc>,
    pub attachments: AttachmentSignature,
}

#[derive(Default)]
pub struct FakeBackend {
    next: u64,
    buffers: HashMap<BufferHandle, AllocationId>,

    pub graphics_pipelines: Vec<CreatedPipeline>,
    pub compute_pipelines: Vec<NativePipeline>,
    pub destroyed_pipelines: Vec<NativePipeline>,
    pub fail_pipelines: bool,

    pub render_passes: Vec<AttachmentSignature>,
    pub framebuffers: Vec<FramebufferKey>,
    pub destroyed_framebuffers: Vec<NativeFramebuffer>,

    pub scratch: Vec<(NativeBuffer, u64)>,
    pub destroyed_scratch: Vec<NativeBuffer>,

    pending: BarrierKinds,
    /// Pending barriers force the current pass to end.
    pub barriers_break_pass: bool,
    pub attachment_loads: Vec<ImageViewId>,
    pub attachment_stores: Vec<ImageViewId>,

    pub descriptor_updates: Vec<BindPoint>,
    pub descriptor_invalidations: u32,

    pub device_cache: Vec<u8>,
    pub loaded_cache: Option<Vec<u8>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    /// Makes guest buffer `handle` resolvable, backed by `allocation`.
    pub fn add_buffer(&mut self, handle: BufferHandle, allocation: AllocationId) {
        self.buffers.insert(handle, allocation);
    }

    /// Moves `handle` to a new allocation; the runtime must be told via `swap_buffer`.
    pub fn move_buffer(&mut self, handle: BufferHandle, allocation: AllocationId) {
        self.buffers.insert(handle, allocation);
    }

    pub fn native(allocation: AllocationId) -> NativeBuffer {
        NativeBuffer(allocation.0)
    }

    pub fn live_scratch(&self) -> usize {
        self.scratch.len() - self.destroyed_scratch.len()
    }
}

impl NativeDevice for FakeBackend {
    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> anyhow::Result<NativePipeline> {
        if self.fail_pipelines {
            anyhow::bail!("shader module rejected by driver");
        }
        let handle = NativePipeline(self.next());
        self.graphics_pipelines.push(CreatedPipeline {
            handle,
            key_hash: desc.key.hash_value(),
            program: desc.program.id(),
            dynamic_fields: desc.dynamic_fields,
            vertex_bindings: desc.state.vertex_bindings().to_vec(),
            attachments: desc.state.attachments().clone(),
        });
        Ok(handle)
    }

    fn create_compute_pipeline(
        &mut self,
        _desc: &ComputePipelineDesc<'_>,
    ) -> anyhow::Result<NativePipeline> {
        if self.fail_pipelines {
            anyhow::bail!("shader module rejected by driver");
        }
        let handle = NativePipeline(self.next());
        self.compute_pipelines.push(handle);
        Ok(handle)
    }

    fn destroy_pipeline(&mut self, pipeline: NativePipeline) {
        self.destroyed_pipelines.push(pipeline);
    }

    fn create_render_pass(
        &mut self,
        signature: &AttachmentSignature,
    ) -> anyhow::Result<NativeRenderPass> {
        self.render_passes.push(signature.clone());
        Ok(NativeRenderPass(self.next()))
    }

    fn destroy_render_pass(&mut self, _render_pass: NativeRenderPass) {}

    fn create_framebuffer(
        &mut self,
        _render_pass: NativeRenderPass,
        key: &FramebufferKey,
    ) -> anyhow::Result<NativeFramebuffer> {
        self.framebuffers.push(key.clone());
        Ok(NativeFramebuffer(self.next()))
    }

    fn destroy_framebuffer(&mut self, framebuffer: NativeFramebuffer) {
        self.destroyed_framebuffers.push(framebuffer);
    }

    fn load_pipeline_cache(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.loaded_cache = Some(data.to_vec());
        Ok(())
    }

    fn pipeline_cache_data(&mut self) -> anyhow::Result<Vec<u8>> {
        Ok(self.device_cache.clone())
    }
}

impl BufferAllocator for FakeBackend {
    fn resolve(&mut self, range: BufferRange, _write: bool) -> Option<BufferRef> {
        let allocation = *self.buffers.get(&range.handle)?;
        Some(BufferRef {
            allocation,
            buffer: Self::native(allocation),
            offset: range.offset,
            size: range.size,
        })
    }

    fn create_scratch(&mut self, size: u64) -> anyhow::Result<NativeBuffer> {
        let buffer = NativeBuffer(SCRATCH_BASE + self.next());
        self.scratch.push((buffer, size));
        Ok(buffer)
    }

    fn destroy_scratch(&mut self, buffer: NativeBuffer) {
        self.destroyed_scratch.push(buffer);
    }
}

impl BarrierBatch for FakeBackend {
    fn queue_memory_barrier(&mut self) {
        self.pending |= BarrierKinds::MEMORY;
    }

    fn queue_texture_barrier(&mut self) {
        self.pending |= BarrierKinds::TEXTURE;
    }

    fn queue_command_buffer_barrier(&mut self) {
        self.pending |= BarrierKinds::COMMAND_BUFFER;
    }

    fn queue_attachment_load(&mut self, view: ImageViewId) {
        self.attachment_loads.push(view);
    }

    fn record_attachment_store(&mut self, view: ImageViewId) {
        self.attachment_stores.push(view);
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn requires_render_pass_break(&self) -> bool {
        self.barriers_break_pass && self.has_pending()
    }

    fn flush(&mut self, sink: &mut dyn CommandSink, _in_render_pass: bool) {
        if self.pending.is_empty() {
            return;
        }
        sink.push(NativeCmd::PipelineBarrier(self.pending));
        self.pending = BarrierKinds::empty();
    }
}

impl DescriptorUpdater for FakeBackend {
    fn update_and_bind(
        &mut self,
        bind_point: BindPoint,
        _program: &dyn ShaderProgram,
        _sink: &mut dyn CommandSink,
    ) {
        self.descriptor_updates.push(bind_point);
    }

    fn force_texture_dirty(&mut self) {}

    fn force_image_dirty(&mut self) {}

    fn invalidate(&mut self) {
        self.descriptor_invalidations += 1;
    }
}

/// Counts end-pass notifications; clones share the counter.
#[derive(Clone, Default)]
pub struct PassCounter(pub Rc<Cell<u32>>);

impl PassCounter {
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl RenderPassObserver for PassCounter {
    fn render_pass_ended(&mut self, _sink: &mut dyn CommandSink) {
        self.0.set(self.0.get() + 1);
    }
}

/// Observer that appends a marker command after each pass, like a query pool resolve would.
#[derive(Clone, Default)]
pub struct MarkerObserver(pub Rc<RefCell<Vec<usize>>>);

impl RenderPassObserver for MarkerObserver {
    fn render_pass_ended(&mut self, sink: &mut dyn CommandSink) {
        let mut seen = self.0.borrow_mut();
        let n = seen.len();
        seen.push(n);
        sink.push(NativeCmd::SetLineWidth(seen.len() as f32));
    }
}

pub fn runtime(caps: HostCapabilities) -> GfxRuntime<FakeBackend> {
    runtime_with_config(caps, RuntimeConfig::default())
}

pub fn runtime_with_config(
    caps: HostCapabilities,
    config: RuntimeConfig,
) -> GfxRuntime<FakeBackend> {
    init_tracing();
    GfxRuntime::new(FakeBackend::new(), caps, config)
}

/// Runtime with a linked graphics program, recording context 1.
pub fn recording(caps: HostCapabilities) -> GfxRuntime<FakeBackend> {
    let mut rt = runtime(caps);
    rt.set_program(TestProgram::graphics(1));
    rt.begin_recording(ContextId(1)).expect("begin recording");
    rt
}

pub fn color_target(view: u64, format: Format) -> RenderTarget {
    RenderTarget {
        view: ImageViewId(view),
        format,
        extent: Extent2D {
            width: 640,
            height: 480,
        },
        layers: 1,
        samples: 1,
    }
}

pub fn depth_target(view: u64) -> RenderTarget {
    color_target(view, Format::D24UnormS8Uint)
}

/// Registers guest buffer `handle` (backed by allocation `handle`) and returns a range of it.
pub fn guest_buffer(
    rt: &mut GfxRuntime<FakeBackend>,
    handle: u64,
    offset: u64,
    size: u64,
) -> BufferRange {
    rt.backend_mut()
        .add_buffer(BufferHandle(handle), AllocationId(handle));
    BufferRange::new(BufferHandle(handle), offset, size)
}

pub fn count_where(cmds: &[NativeCmd], f: impl Fn(&NativeCmd) -> bool) -> usize {
    cmds.iter().filter(|c| f(c)).count()
}

pub fn dynamic_commands(cmds: &[NativeCmd]) -> usize {
    count_where(cmds, NativeCmd::is_dynamic_state)
}

pub fn pipeline_binds(cmds: &[NativeCmd]) -> usize {
    count_where(cmds, |c| matches!(c, NativeCmd::BindPipeline { .. }))
}

/// Commands recorded after index `from`.
pub fn since(rt: &GfxRuntime<FakeBackend>, from: usize) -> Vec<NativeCmd> {
    rt.commands()[from..].to_vec()
}
