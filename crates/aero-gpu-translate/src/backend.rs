//! Contracts of the collaborators the translation layer drives.
//!
//! Shader compilation, memory allocation, descriptor binding and barrier accumulation are
//! owned elsewhere; the runtime only calls into them at fixed points.

use crate::cmd::CommandSink;
use crate::render_pass::{AttachmentSignature, FramebufferKey};
use crate::state::{DynamicFields, PipelineKey, PipelineState};
use crate::types::{
    AllocationId, BindPoint, BufferRange, ImageViewId, NativeBuffer, NativeBufferSlice,
    NativeFramebuffer, NativePipeline, NativeRenderPass, PipelineLayoutId, ProgramId,
    ShaderStages,
};

pub struct GraphicsPipelineDesc<'a> {
    pub key: &'a PipelineKey,
    pub state: &'a PipelineState,
    pub program: &'a dyn ShaderProgram,
    pub render_pass: NativeRenderPass,
    /// Fields the pipeline must declare as dynamic.
    pub dynamic_fields: DynamicFields,
}

pub struct ComputePipelineDesc<'a> {
    pub key: &'a PipelineKey,
    pub program: &'a dyn ShaderProgram,
    pub specialization: &'a [u8],
}

/// Native object creation. Failures are reported, never panicked on.
pub trait NativeDevice {
    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> anyhow::Result<NativePipeline>;
    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDesc<'_>,
    ) -> anyhow::Result<NativePipeline>;
    fn destroy_pipeline(&mut self, pipeline: NativePipeline);

    fn create_render_pass(
        &mut self,
        signature: &AttachmentSignature,
    ) -> anyhow::Result<NativeRenderPass>;
    fn destroy_render_pass(&mut self, render_pass: NativeRenderPass);

    fn create_framebuffer(
        &mut self,
        render_pass: NativeRenderPass,
        key: &FramebufferKey,
    ) -> anyhow::Result<NativeFramebuffer>;
    fn destroy_framebuffer(&mut self, framebuffer: NativeFramebuffer);

    /// Seeds the driver pipeline cache with data saved by a previous session.
    fn load_pipeline_cache(&mut self, _data: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }

    fn pipeline_cache_data(&mut self) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// A guest buffer range resolved against its backing allocation for the current context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferRef {
    pub allocation: AllocationId,
    pub buffer: NativeBuffer,
    pub offset: u64,
    pub size: u64,
}

impl BufferRef {
    pub fn whole(&self) -> NativeBufferSlice {
        NativeBufferSlice {
            buffer: self.buffer,
            offset: self.offset,
            size: self.size,
        }
    }

    /// Native slice for `offset..offset+size` relative to the start of this reference,
    /// clipped to the reference.
    pub fn slice(&self, offset: u64, size: u64) -> NativeBufferSlice {
        let offset = offset.min(self.size);
        NativeBufferSlice {
            buffer: self.buffer,
            offset: self.offset + offset,
            size: size.min(self.size - offset),
        }
    }
}

pub trait BufferAllocator {
    fn resolve(&mut self, range: BufferRange, write: bool) -> Option<BufferRef>;

    /// Resolves a vertex range whose offset has to satisfy `alignment`. Allocators that can
    /// realign (e.g. by staging a copy) override this.
    fn resolve_aligned(&mut self, range: BufferRange, alignment: u32) -> Option<BufferRef> {
        let _ = alignment;
        self.resolve(range, false)
    }

    /// Device-local buffer owned by the translation layer (conversion and pattern buffers).
    fn create_scratch(&mut self, size: u64) -> anyhow::Result<NativeBuffer>;
    fn destroy_scratch(&mut self, buffer: NativeBuffer);
}

/// A linked (or linking) shader program. Link status is queried on every bind since
/// background compilation can finish at any time.
pub trait ShaderProgram {
    fn id(&self) -> ProgramId;
    fn is_linked(&self) -> bool;
    fn is_compute(&self) -> bool;
    fn stages(&self) -> ShaderStages;
    fn layout(&self) -> PipelineLayoutId;
    /// Number of specialization-constant bytes the program actually reads.
    fn specialization_size(&self) -> usize {
        0
    }
}

pub trait BarrierBatch {
    fn queue_memory_barrier(&mut self);
    fn queue_texture_barrier(&mut self);
    fn queue_command_buffer_barrier(&mut self);
    /// Load-operation barrier for an attachment about to be used by a render pass.
    fn queue_attachment_load(&mut self, view: ImageViewId);
    /// Store-operation usage of an attachment at the end of a render pass.
    fn record_attachment_store(&mut self, view: ImageViewId);
    fn has_pending(&self) -> bool;
    /// Whether the pending barriers cannot be recorded inside a render pass.
    fn requires_render_pass_break(&self) -> bool;
    fn flush(&mut self, sink: &mut dyn CommandSink, in_render_pass: bool);
}

pub trait DescriptorUpdater {
    fn update_and_bind(
        &mut self,
        bind_point: BindPoint,
        program: &dyn ShaderProgram,
        sink: &mut dyn CommandSink,
    );
    fn force_texture_dirty(&mut self);
    fn force_image_dirty(&mut self);
    /// Forget every binding (a new recording context starts with nothing bound).
    fn invalidate(&mut self);
}

/// Called after every native end-pass, for query and counter bookkeeping.
pub trait RenderPassObserver {
    fn render_pass_ended(&mut self, sink: &mut dyn CommandSink);
}

/// Everything the runtime needs from the host side.
pub trait Backend: NativeDevice + BufferAllocator + BarrierBatch + DescriptorUpdater {}

impl<T> Backend for T where T: NativeDevice + BufferAllocator + BarrierBatch + DescriptorUpdater {}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::Cell;

    use super::*;

    pub struct TestProgram {
        id: ProgramId,
        compute: bool,
        linked: Cell<bool>,
        specialization_size: usize,
    }

    impl TestProgram {
        pub fn graphics(id: u64) -> Self {
            Self {
                id: ProgramId(id),
                compute: false,
                linked: Cell::new(true),
                specialization_size: 0,
            }
        }

        pub fn compute(id: u64) -> Self {
            Self {
                compute: true,
                ..Self::graphics(id)
            }
        }

        pub fn with_specialization_size(mut self, size: usize) -> Self {
            self.specialization_size = size;
            self
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

    /// Device that hands out sequential handles and remembers what it created.
    #[derive(Default)]
    pub struct CountingDevice {
        next: u64,
        pub render_passes: Vec<AttachmentSignature>,
        pub framebuffers: Vec<FramebufferKey>,
        pub destroyed_framebuffers: Vec<NativeFramebuffer>,
        pub fail_render_pass: bool,
    }

    impl CountingDevice {
        /// Device whose render pass creation always fails.
        pub fn failing_render_pass() -> Self {
            Self {
                fail_render_pass: true,
                ..Self::default()
            }
        }

        fn next(&mut self) -> u64 {
            self.next += 1;
            self.next
        }
    }

    impl NativeDevice for CountingDevice {
        fn create_graphics_pipeline(
            &mut self,
            _desc: &GraphicsPipelineDesc<'_>,
        ) -> anyhow::Result<NativePipeline> {
            Ok(NativePipeline(self.next()))
        }

        fn create_compute_pipeline(
            &mut self,
            _desc: &ComputePipelineDesc<'_>,
        ) -> anyhow::Result<NativePipeline> {
            Ok(NativePipeline(self.next()))
        }

        fn destroy_pipeline(&mut self, _pipeline: NativePipeline) {}

        fn create_render_pass(
            &mut self,
            signature: &AttachmentSignature,
        ) -> anyhow::Result<NativeRenderPass> {
            if self.fail_render_pass {
                anyhow::bail!("out of device memory");
            }
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
    }
}
