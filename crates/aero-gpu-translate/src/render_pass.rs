//! Render pass and framebuffer lifecycle.
//!
//! Passes are keyed by [`AttachmentSignature`], framebuffers by [`FramebufferKey`]; both are
//! cached for the lifetime of the device context. The manager tracks the
//! `Inactive -> Created -> Active -> Created` state machine of the current pass.

use hashbrown::HashMap;
use tracing::debug;

use crate::backend::{BarrierBatch, NativeDevice};
use crate::cmd::{CommandSink, NativeCmd};
use crate::error::{Result, TranslateError};
use crate::types::{
    ColorWriteMask, Extent2D, Format, ImageViewId, NativeFramebuffer, NativeRenderPass, Rect2D,
    RenderTarget, MAX_RENDER_TARGETS,
};

/// Render-pass compatibility class of a set of attachments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentSignature {
    /// Color formats in guest slot order; `None` for unbound (or dropped) slots.
    pub color_formats: [Option<Format>; MAX_RENDER_TARGETS],
    pub depth_stencil: Option<Format>,
    pub samples: u32,
    /// Bit `i` set when slot `i` has an integer format.
    pub integer_mask: u8,
}

impl Default for AttachmentSignature {
    fn default() -> Self {
        Self {
            color_formats: [None; MAX_RENDER_TARGETS],
            depth_stencil: None,
            samples: 1,
            integer_mask: 0,
        }
    }
}

impl AttachmentSignature {
    /// Recomputes the derived fields.
    pub fn normalized(mut self) -> Self {
        self.integer_mask = 0;
        for (i, f) in self.color_formats.iter().enumerate() {
            if f.is_some_and(Format::is_integer) {
                self.integer_mask |= 1 << i;
            }
        }
        self.samples = self.samples.max(1);
        self
    }

    pub fn color_attachment_count(&self) -> usize {
        self.color_formats.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.depth_stencil.is_none() && self.color_attachment_count() == 0
    }
}

/// Identity of a concrete framebuffer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferKey {
    pub signature: AttachmentSignature,
    /// Attachment views in attachment order (colors after deduplication, then depth).
    pub views: Vec<ImageViewId>,
    pub extent: Extent2D,
    pub layers: u32,
}

/// Render targets as bound by the guest, plus the framebuffer layout derived from them.
///
/// The pre-deduplication arrays are retained so the layout can be rebuilt verbatim when the
/// color write masks change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramebufferParams {
    requested: [Option<RenderTarget>; MAX_RENDER_TARGETS],
    depth_stencil: Option<RenderTarget>,
    /// Slots dropped as masked-out duplicates.
    dropped: u8,
    /// Zero-mask slots the layout was derived from.
    zero_masks: u8,
    has_duplicates: bool,
    extent: Extent2D,
    layers: u32,
}

pub(crate) fn zero_mask_bits(masks: &[ColorWriteMask; MAX_RENDER_TARGETS]) -> u8 {
    masks
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_empty())
        .fold(0u8, |acc, (i, _)| acc | (1 << i))
}

impl FramebufferParams {
    pub fn new(
        colors: &[Option<RenderTarget>],
        depth_stencil: Option<RenderTarget>,
        masks: &[ColorWriteMask; MAX_RENDER_TARGETS],
        dedup: bool,
    ) -> Self {
        let mut requested = [None; MAX_RENDER_TARGETS];
        for (slot, rt) in colors.iter().take(MAX_RENDER_TARGETS).enumerate() {
            requested[slot] = *rt;
        }
        Self::build(requested, depth_stencil, zero_mask_bits(masks), dedup)
    }

    /// Attachment-less 1x1 layout, used when a pass is needed before any target is bound.
    pub fn empty() -> Self {
        Self::build([None; MAX_RENDER_TARGETS], None, 0, false)
    }

    fn build(
        requested: [Option<RenderTarget>; MAX_RENDER_TARGETS],
        depth_stencil: Option<RenderTarget>,
        zero_masks: u8,
        dedup: bool,
    ) -> Self {
        let mut dropped = 0u8;
        let mut has_duplicates = false;
        for i in 0..MAX_RENDER_TARGETS {
            let Some(a) = requested[i] else { continue };
            for j in (i + 1)..MAX_RENDER_TARGETS {
                let Some(b) = requested[j] else { continue };
                if a.view != b.view || dropped & (1 << j) != 0 {
                    continue;
                }
                has_duplicates = true;
                if !dedup {
                    continue;
                }
                if zero_masks & (1 << j) != 0 {
                    dropped |= 1 << j;
                } else if zero_masks & (1 << i) != 0 {
                    dropped |= 1 << i;
                    break;
                }
            }
        }

        let mut extent: Option<Extent2D> = None;
        let mut layers: Option<u32> = None;
        let kept = requested
            .iter()
            .enumerate()
            .filter(|(i, _)| dropped & (1 << i) == 0)
            .filter_map(|(_, rt)| rt.as_ref())
            .chain(depth_stencil.as_ref());
        for rt in kept {
            extent = Some(match extent {
                None => rt.extent,
                Some(e) => Extent2D {
                    width: e.width.min(rt.extent.width),
                    height: e.height.min(rt.extent.height),
                },
            });
            layers = Some(layers.map_or(rt.layers, |l| l.min(rt.layers)));
        }

        Self {
            requested,
            depth_stencil,
            dropped,
            zero_masks,
            has_duplicates,
            extent: extent.unwrap_or(Extent2D {
                width: 1,
                height: 1,
            }),
            layers: layers.unwrap_or(1).max(1),
        }
    }

    /// Re-derives the layout from the retained guest bindings with new write masks.
    pub fn rebuild(&self, masks: &[ColorWriteMask; MAX_RENDER_TARGETS], dedup: bool) -> Self {
        Self::build(
            self.requested,
            self.depth_stencil,
            zero_mask_bits(masks),
            dedup,
        )
    }

    /// Whether new write masks would produce a different layout.
    pub fn needs_rebuild(&self, masks: &[ColorWriteMask; MAX_RENDER_TARGETS]) -> bool {
        self.has_duplicates && zero_mask_bits(masks) != self.zero_masks
    }

    pub fn requested_colors(&self) -> &[Option<RenderTarget>; MAX_RENDER_TARGETS] {
        &self.requested
    }

    pub fn dropped_slots(&self) -> u8 {
        self.dropped
    }

    /// Color target of `slot` if it is part of the framebuffer.
    pub fn color_target(&self, slot: usize) -> Option<&RenderTarget> {
        if slot >= MAX_RENDER_TARGETS || self.dropped & (1 << slot) != 0 {
            return None;
        }
        self.requested[slot].as_ref()
    }

    pub fn depth_stencil(&self) -> Option<&RenderTarget> {
        self.depth_stencil.as_ref()
    }

    pub fn attachments(&self) -> Vec<ImageViewId> {
        (0..MAX_RENDER_TARGETS)
            .filter_map(|slot| self.color_target(slot))
            .chain(self.depth_stencil.as_ref())
            .map(|rt| rt.view)
            .collect()
    }

    pub fn references(&self, view: ImageViewId) -> bool {
        self.requested.iter().flatten().any(|rt| rt.view == view)
            || self.depth_stencil.is_some_and(|rt| rt.view == view)
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    pub fn signature(&self) -> AttachmentSignature {
        let mut sig = AttachmentSignature::default();
        let mut samples = None;
        for slot in 0..MAX_RENDER_TARGETS {
            if let Some(rt) = self.color_target(slot) {
                sig.color_formats[slot] = Some(rt.format);
                samples.get_or_insert(rt.samples);
            }
        }
        if let Some(ds) = &self.depth_stencil {
            sig.depth_stencil = Some(ds.format);
            samples.get_or_insert(ds.samples);
        }
        sig.samples = samples.unwrap_or(1);
        sig.normalized()
    }

    pub fn key(&self) -> FramebufferKey {
        FramebufferKey {
            signature: self.signature(),
            views: self.attachments(),
            extent: self.extent,
            layers: self.layers,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    /// No pass object exists.
    Inactive,
    /// Pass and framebuffer exist but no pass is open.
    Created,
    /// A native pass is open.
    Active,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderPassCacheStats {
    pub render_pass_hits: u64,
    pub render_pass_misses: u64,
    pub framebuffer_hits: u64,
    pub framebuffer_misses: u64,
    pub render_passes: usize,
    pub framebuffers: usize,
}

#[derive(Debug)]
struct CurrentPass {
    params: FramebufferParams,
    signature: AttachmentSignature,
    render_pass: NativeRenderPass,
    framebuffer: NativeFramebuffer,
}

#[derive(Debug, Clone, Copy)]
struct FramebufferEntry {
    handle: NativeFramebuffer,
    last_used: u64,
}

#[derive(Debug)]
pub struct RenderPassManager {
    state: PassState,
    current: Option<CurrentPass>,
    render_passes: HashMap<AttachmentSignature, NativeRenderPass>,
    framebuffers: HashMap<FramebufferKey, FramebufferEntry>,
    stats: RenderPassCacheStats,
}

impl Default for RenderPassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPassManager {
    pub fn new() -> Self {
        Self {
            state: PassState::Inactive,
            current: None,
            render_passes: HashMap::new(),
            framebuffers: HashMap::new(),
            stats: RenderPassCacheStats::default(),
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == PassState::Active
    }

    pub fn params(&self) -> Option<&FramebufferParams> {
        self.current.as_ref().map(|c| &c.params)
    }

    pub fn current_framebuffer(&self) -> Option<NativeFramebuffer> {
        self.current.as_ref().map(|c| c.framebuffer)
    }

    pub fn stats(&self) -> RenderPassCacheStats {
        RenderPassCacheStats {
            render_passes: self.render_passes.len(),
            framebuffers: self.framebuffers.len(),
            ..self.stats
        }
    }

    /// Cached render pass for `signature`, created on first use.
    pub fn render_pass_for<D: NativeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        signature: &AttachmentSignature,
    ) -> Result<NativeRenderPass> {
        if let Some(rp) = self.render_passes.get(signature) {
            self.stats.render_pass_hits += 1;
            return Ok(*rp);
        }
        self.stats.render_pass_misses += 1;
        let rp = device
            .create_render_pass(signature)
            .map_err(TranslateError::RenderPassCreation)?;
        debug!(
            colors = signature.color_attachment_count(),
            depth_stencil = signature.depth_stencil.is_some(),
            samples = signature.samples,
            "created render pass"
        );
        self.render_passes.insert(signature.clone(), rp);
        Ok(rp)
    }

    /// Makes `params` the current framebuffer layout. The caller ends any open pass first.
    pub fn bind<D: NativeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        params: FramebufferParams,
        context: u64,
    ) -> Result<&AttachmentSignature> {
        debug_assert!(!self.is_active(), "render targets changed inside a pass");
        let signature = params.signature();
        let render_pass = self.render_pass_for(device, &signature)?;
        let key = params.key();
        let framebuffer = match self.framebuffers.get_mut(&key) {
            Some(entry) => {
                self.stats.framebuffer_hits += 1;
                entry.last_used = entry.last_used.max(context);
                entry.handle
            }
            None => {
                self.stats.framebuffer_misses += 1;
                let handle = device
                    .create_framebuffer(render_pass, &key)
                    .map_err(TranslateError::FramebufferCreation)?;
                debug!(
                    attachments = key.views.len(),
                    width = key.extent.width,
                    height = key.extent.height,
                    layers = key.layers,
                    "created framebuffer"
                );
                self.framebuffers.insert(
                    key,
                    FramebufferEntry {
                        handle,
                        last_used: context,
                    },
                );
                handle
            }
        };
        self.state = PassState::Created;
        let current = self.current.insert(CurrentPass {
            params,
            signature,
            render_pass,
            framebuffer,
        });
        Ok(&current.signature)
    }

    /// Render pass of the current layout, creating the attachment-less layout when no
    /// targets were ever bound.
    pub fn ensure_created<D: NativeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        context: u64,
    ) -> Result<NativeRenderPass> {
        if self.current.is_none() {
            self.bind(device, FramebufferParams::empty(), context)?;
        }
        match &self.current {
            Some(c) => Ok(c.render_pass),
            None => Err(TranslateError::Unsupported("render pass without framebuffer")),
        }
    }

    /// Opens the current pass. No-op (returns `false`) when already active.
    pub fn begin<H: NativeDevice + BarrierBatch + ?Sized>(
        &mut self,
        host: &mut H,
        sink: &mut dyn CommandSink,
        context: u64,
    ) -> Result<bool> {
        if self.is_active() {
            return Ok(false);
        }
        self.ensure_created(host, context)?;
        let Some(current) = &self.current else {
            return Ok(false);
        };

        for view in current.params.attachments() {
            host.queue_attachment_load(view);
        }
        if host.has_pending() {
            host.flush(sink, false);
        }

        sink.push(NativeCmd::BeginRenderPass {
            render_pass: current.render_pass,
            framebuffer: current.framebuffer,
            render_area: Rect2D::from_extent(current.params.extent()),
        });
        let key = current.params.key();
        if let Some(entry) = self.framebuffers.get_mut(&key) {
            entry.last_used = entry.last_used.max(context);
        }
        self.state = PassState::Active;
        Ok(true)
    }

    /// First half of ending a pass: store-operation usage of every attachment.
    pub fn record_attachment_stores<B: BarrierBatch + ?Sized>(&self, barriers: &mut B) {
        if !self.is_active() {
            return;
        }
        if let Some(current) = &self.current {
            for view in current.params.attachments() {
                barriers.record_attachment_store(view);
            }
        }
    }

    /// Emits the native end-pass. No-op (returns `false`) when no pass is open.
    pub fn finish_end(&mut self, sink: &mut dyn CommandSink) -> bool {
        if !self.is_active() {
            return false;
        }
        sink.push(NativeCmd::EndRenderPass);
        self.state = PassState::Created;
        true
    }

    /// A new recording context starts outside any pass.
    pub fn reset_for_new_context(&mut self) {
        if self.is_active() {
            self.state = PassState::Created;
        }
    }

    /// Clear rectangle: `scissor` (if any) clipped to the framebuffer.
    pub fn clear_rect(&self, scissor: Option<Rect2D>) -> Rect2D {
        let extent = self
            .params()
            .map(FramebufferParams::extent)
            .unwrap_or_default();
        let full = Rect2D::from_extent(extent);
        match scissor {
            Some(s) => full.intersect(&s),
            None => full,
        }
    }

    /// Clamps a layer range to the framebuffer; `None` when nothing remains.
    pub fn clamp_layers(&self, base_layer: u32, layer_count: u32) -> Option<(u32, u32)> {
        let layers = self.params().map_or(1, FramebufferParams::layers);
        if base_layer >= layers || layer_count == 0 {
            return None;
        }
        Some((base_layer, layer_count.min(layers - base_layer)))
    }

    /// Drops cached framebuffers that reference `view`; returns them with their last use.
    pub fn evict_view(&mut self, view: ImageViewId) -> Vec<(NativeFramebuffer, u64)> {
        let mut evicted = Vec::new();
        self.framebuffers.retain(|key, entry| {
            if key.views.contains(&view) {
                evicted.push((entry.handle, entry.last_used));
                false
            } else {
                true
            }
        });
        if self
            .current
            .as_ref()
            .is_some_and(|c| c.params.references(view))
        {
            self.current = None;
            self.state = PassState::Inactive;
        }
        evicted
    }

    /// Forgets every cached object, handing back the native handles.
    pub fn drain(&mut self) -> (Vec<NativeRenderPass>, Vec<NativeFramebuffer>) {
        self.current = None;
        self.state = PassState::Inactive;
        let render_passes = self.render_passes.drain().map(|(_, rp)| rp).collect();
        let framebuffers = self.framebuffers.drain().map(|(_, fb)| fb.handle).collect();
        (render_passes, framebuffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::CountingDevice;

    fn rt(view: u64, format: Format) -> RenderTarget {
        RenderTarget {
            view: ImageViewId(view),
            format,
            extent: Extent2D {
                width: 64,
                height: 32,
            },
            layers: 1,
            samples: 1,
        }
    }

    fn masks(zero: &[usize]) -> [ColorWriteMask; MAX_RENDER_TARGETS] {
        let mut m = [ColorWriteMask::ALL; MAX_RENDER_TARGETS];
        for &i in zero {
            m[i] = ColorWriteMask::empty();
        }
        m
    }

    #[test]
    fn masked_duplicate_is_dropped_and_restored() {
        let colors = [
            Some(rt(1, Format::Rgba8Unorm)),
            Some(rt(2, Format::Rgba8Unorm)),
            Some(rt(2, Format::Rgba8Unorm)),
        ];
        let params = FramebufferParams::new(&colors, None, &masks(&[2]), true);
        assert_eq!(params.attachments(), vec![ImageViewId(1), ImageViewId(2)]);
        assert_eq!(params.dropped_slots(), 0b100);
        assert_eq!(params.signature().color_formats[2], None);

        assert!(params.needs_rebuild(&masks(&[])));
        let restored = params.rebuild(&masks(&[]), true);
        assert_eq!(
            restored.attachments(),
            vec![ImageViewId(1), ImageViewId(2), ImageViewId(2)]
        );
        assert_eq!(
            restored,
            FramebufferParams::new(&colors, None, &masks(&[]), true)
        );
    }

    #[test]
    fn earlier_slot_is_dropped_when_it_is_the_masked_one() {
        let colors = [Some(rt(5, Format::R32Float)), Some(rt(5, Format::R32Float))];
        let params = FramebufferParams::new(&colors, None, &masks(&[0]), true);
        assert_eq!(params.dropped_slots(), 0b01);
        assert!(params.color_target(0).is_none());
        assert!(params.color_target(1).is_some());
    }

    #[test]
    fn no_dedup_without_workaround() {
        let colors = [Some(rt(2, Format::Rgba8Unorm)), Some(rt(2, Format::Rgba8Unorm))];
        let params = FramebufferParams::new(&colors, None, &masks(&[1]), false);
        assert_eq!(params.attachments().len(), 2);
    }

    #[test]
    fn passes_and_framebuffers_are_cached_by_signature() {
        let mut device = CountingDevice::default();
        let mut mgr = RenderPassManager::new();
        let colors = [Some(rt(1, Format::Rgba8Unorm))];
        let params = FramebufferParams::new(&colors, None, &masks(&[]), false);

        mgr.bind(&mut device, params.clone(), 1).unwrap();
        mgr.bind(&mut device, params, 1).unwrap();
        let stats = mgr.stats();
        assert_eq!(stats.render_pass_misses, 1);
        assert_eq!(stats.render_pass_hits, 1);
        assert_eq!(stats.framebuffer_misses, 1);
        assert_eq!(stats.framebuffer_hits, 1);
        assert_eq!(device.render_passes.len(), 1);
        assert_eq!(mgr.state(), PassState::Created);
    }

    #[test]
    fn ensure_created_uses_an_attachment_less_pass() {
        let mut device = CountingDevice::default();
        let mut mgr = RenderPassManager::new();
        assert_eq!(mgr.state(), PassState::Inactive);
        mgr.ensure_created(&mut device, 1).unwrap();
        assert_eq!(mgr.state(), PassState::Created);
        assert!(device.render_passes[0].is_empty());
        assert_eq!(
            mgr.params().map(FramebufferParams::extent),
            Some(Extent2D {
                width: 1,
                height: 1
            })
        );
    }

    #[test]
    fn render_pass_failure_surfaces_as_error() {
        let mut device = CountingDevice::failing_render_pass();
        let mut mgr = RenderPassManager::new();
        let err = mgr.ensure_created(&mut device, 1).unwrap_err();
        assert!(matches!(err, TranslateError::RenderPassCreation(_)));
        assert!(err.to_string().contains("out of device memory"));
    }

    #[test]
    fn clear_helpers_clip_to_framebuffer() {
        let mut device = CountingDevice::default();
        let mut mgr = RenderPassManager::new();
        let mut target = rt(1, Format::Rgba8Unorm);
        target.layers = 4;
        let params = FramebufferParams::new(&[Some(target)], None, &masks(&[]), false);
        mgr.bind(&mut device, params, 1).unwrap();

        let rect = mgr.clear_rect(Some(Rect2D {
            x: 60,
            y: 0,
            width: 100,
            height: 100,
        }));
        assert_eq!(
            rect,
            Rect2D {
                x: 60,
                y: 0,
                width: 4,
                height: 32
            }
        );
        assert_eq!(mgr.clamp_layers(2, 8), Some((2, 2)));
        assert_eq!(mgr.clamp_layers(4, 1), None);
    }

    #[test]
    fn evicting_a_view_drops_its_framebuffers() {
        let mut device = CountingDevice::default();
        let mut mgr = RenderPassManager::new();
        let params = FramebufferParams::new(
            &[Some(rt(1, Format::Rgba8Unorm))],
            None,
            &masks(&[]),
            false,
        );
        mgr.bind(&mut device, params, 3).unwrap();
        let evicted = mgr.evict_view(ImageViewId(1));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].1, 3);
        assert_eq!(mgr.state(), PassState::Inactive);
        assert!(mgr.evict_view(ImageViewId(1)).is_empty());
    }
}
