//! Render pass lifecycle, clears, barriers, buffer copies and transform feedback.

use tracing::trace;

use super::GfxRuntime;
use crate::backend::Backend;
use crate::bindings::TransformFeedbackState;
use crate::cmd::{ClearAttachment, CommandSink, NativeCmd};
use crate::error::{Result, TranslateError};
use crate::types::{BufferRange, ClearColor, MAX_RENDER_TARGETS};

impl<B: Backend> GfxRuntime<B> {
    /// Opens the current render pass. No-op when a pass is already open.
    pub fn begin_render_pass(&mut self) -> Result<()> {
        self.require_context()?;
        self.begin_pass()
    }

    /// Closes the open render pass. No-op when none is open.
    pub fn end_render_pass(&mut self) {
        self.end_pass();
    }

    pub(super) fn begin_pass(&mut self) -> Result<()> {
        let context = self.context_serial();
        if self
            .passes
            .begin(&mut self.backend, &mut self.recorder, context)?
        {
            self.stats.inc_render_pass_begins();
        }
        Ok(())
    }

    pub(super) fn end_pass(&mut self) {
        if !self.passes.is_active() {
            return;
        }
        self.passes.record_attachment_stores(&mut self.backend);
        self.bindings.pause_transform_feedback(&mut self.recorder);
        self.passes.finish_end(&mut self.recorder);
        if let Some(observer) = self.observer.as_mut() {
            observer.render_pass_ended(&mut self.recorder);
        }
        self.stats.inc_render_pass_ends();
    }

    /// Flushes pending barriers before a draw or clear, splitting the pass when the barriers
    /// cannot be recorded inside it.
    pub(super) fn flush_barriers(&mut self) -> Result<()> {
        if !self.backend.has_pending() {
            return Ok(());
        }
        if self.passes.is_active() && self.backend.requires_render_pass_break() {
            self.end_pass();
            self.backend.flush(&mut self.recorder, false);
            self.begin_pass()?;
        } else {
            let in_render_pass = self.passes.is_active();
            self.backend.flush(&mut self.recorder, in_render_pass);
        }
        Ok(())
    }

    pub fn memory_barrier(&mut self) {
        self.backend.queue_memory_barrier();
    }

    pub fn texture_barrier(&mut self) {
        self.backend.queue_texture_barrier();
    }

    pub fn command_buffer_barrier(&mut self) {
        self.backend.queue_command_buffer_barrier();
    }

    /// Clears color target `slot`, restricted to the first scissor and the framebuffer's
    /// layers. Absent targets are ignored.
    pub fn clear_render_target_color(
        &mut self,
        slot: usize,
        color: [f32; 4],
        base_layer: u32,
        layer_count: u32,
    ) -> Result<()> {
        self.require_context()?;
        if !self.check_slot("render target", slot, MAX_RENDER_TARGETS)? {
            return Ok(());
        }
        let Some(params) = self.passes.params() else {
            return Ok(());
        };
        let Some(target) = params.requested_colors()[slot] else {
            return Ok(());
        };
        // A dropped duplicate shares its image with the slot that was kept.
        let attachment_slot = if params.color_target(slot).is_some() {
            slot
        } else {
            match (0..MAX_RENDER_TARGETS)
                .find(|&s| params.color_target(s).is_some_and(|rt| rt.view == target.view))
            {
                Some(s) => s,
                None => return Ok(()),
            }
        };
        let Some((base_layer, layer_count)) = self.passes.clamp_layers(base_layer, layer_count)
        else {
            return Ok(());
        };
        let rect = self.passes.clear_rect(self.clear_scissor);
        if rect.width == 0 || rect.height == 0 {
            return Ok(());
        }

        self.begin_pass()?;
        self.flush_barriers()?;
        self.recorder.push(NativeCmd::ClearAttachments {
            attachments: vec![ClearAttachment::Color {
                slot: attachment_slot as u32,
                value: ClearColor::for_format(color, target.format),
            }],
            rect,
            base_layer,
            layer_count,
        });
        Ok(())
    }

    /// Clears the depth and/or stencil aspect of the bound depth-stencil target. Aspects the
    /// format lacks are ignored.
    pub fn clear_render_target_depth_stencil(
        &mut self,
        depth: Option<f32>,
        stencil: Option<u32>,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<()> {
        self.require_context()?;
        let Some(target) = self.passes.params().and_then(|p| p.depth_stencil().copied()) else {
            return Ok(());
        };
        let depth = depth.filter(|_| target.format.has_depth());
        let stencil = stencil.filter(|_| target.format.has_stencil());
        if depth.is_none() && stencil.is_none() {
            return Ok(());
        }
        let Some((base_layer, layer_count)) = self.passes.clamp_layers(base_layer, layer_count)
        else {
            return Ok(());
        };
        let rect = self.passes.clear_rect(self.clear_scissor);
        if rect.width == 0 || rect.height == 0 {
            return Ok(());
        }

        self.begin_pass()?;
        self.flush_barriers()?;
        self.recorder.push(NativeCmd::ClearAttachments {
            attachments: vec![ClearAttachment::DepthStencil { depth, stencil }],
            rect,
            base_layer,
            layer_count,
        });
        Ok(())
    }

    /// Copies `min(src.size, dst.size)` bytes. The destination range counts as written.
    pub fn copy_buffer(&mut self, src: BufferRange, dst: BufferRange) -> Result<()> {
        self.require_context()?;
        let size = src.size.min(dst.size);
        if size == 0 {
            return Ok(());
        }
        let (Some(from), Some(to)) = (
            self.backend.resolve(src, false),
            self.backend.resolve(dst, true),
        ) else {
            trace!(src = src.handle.0, dst = dst.handle.0, "buffer copy did not resolve");
            return Ok(());
        };
        self.end_pass();
        self.backend.queue_memory_barrier();
        self.backend.flush(&mut self.recorder, false);
        self.recorder.push(NativeCmd::CopyBuffer {
            src: from.slice(0, size),
            dst: to.slice(0, size),
        });
        self.buffer_written(dst.handle, dst.offset, size);
        Ok(())
    }

    /// Requests capture into the bound transform-feedback buffers; it starts with the next
    /// draw.
    pub fn begin_transform_feedback(&mut self) -> Result<()> {
        if !self.caps.transform_feedback {
            return Err(TranslateError::Unsupported("transform feedback"));
        }
        self.bindings.begin_transform_feedback();
        Ok(())
    }

    pub fn end_transform_feedback(&mut self) {
        self.bindings.end_transform_feedback(&mut self.recorder);
    }

    /// Binds dirty capture buffers and starts (or resumes) pending capture. Running capture
    /// whose buffers were retargeted or written is paused first so the new binding takes.
    pub(super) fn resume_transform_feedback(&mut self) {
        if !self.caps.transform_feedback {
            return;
        }
        if self.bindings.has_dirty_transform_feedback() {
            self.bindings.pause_transform_feedback(&mut self.recorder);
        }
        if !matches!(
            self.bindings.transform_feedback_state(),
            TransformFeedbackState::Pending { .. }
        ) {
            return;
        }
        for slot in self.bindings.dirty_transform_feedback_slots() {
            let binding = self.bindings.transform_feedback_slot(slot).binding;
            if let Some(r) = binding.and_then(|b| self.backend.resolve(b.range, true)) {
                self.recorder.push(NativeCmd::BindTransformFeedbackBuffer {
                    slot: slot as u32,
                    buffer: r.whole(),
                });
            }
            self.bindings.clear_transform_feedback_dirty(slot);
        }
        self.bindings.start_transform_feedback(&mut self.recorder);
    }
}
