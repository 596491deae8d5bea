//! Pipeline state shadow and the key that identifies a compiled pipeline object.

use std::hash::{Hash, Hasher};

use crate::backend::ShaderProgram;
use crate::render_pass::AttachmentSignature;
use crate::types::{
    BindPoint, BlendDescriptor, ColorWriteMask, CullMode, DepthBias, DepthTest, FrontFace,
    LogicOp, NativeTopology, PolygonMode, Rect2D, StencilFace, StencilTest, VertexAttrib,
    VertexBindingDesc, Viewport, MAX_RENDER_TARGETS,
};

fn update<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub rasterizer_discard: bool,
    pub depth_clamp: bool,
    pub depth_bias: DepthBias,
    pub polygon_mode: PolygonMode,
    pub line_width: f32,
    pub primitive_restart: bool,
    pub patch_control_points: u32,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            rasterizer_discard: false,
            depth_clamp: false,
            depth_bias: DepthBias::default(),
            polygon_mode: PolygonMode::Fill,
            line_width: 1.0,
            primitive_restart: false,
            patch_control_points: 1,
        }
    }
}

/// Every non-dynamic pipeline creation parameter.
///
/// Fields covered by the active dynamic-state tier are never written here (they live in the
/// dynamic shadow), so they keep their defaults and do not perturb the key.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineState {
    topology: NativeTopology,
    blend: [BlendDescriptor; MAX_RENDER_TARGETS],
    /// Blend state of masked-out targets, restored when the mask becomes non-zero.
    stored_blend: [BlendDescriptor; MAX_RENDER_TARGETS],
    write_masks: [ColorWriteMask; MAX_RENDER_TARGETS],
    blend_constants: [f32; 4],
    logic_op: Option<LogicOp>,
    alpha_to_coverage: bool,
    depth: DepthTest,
    stencil: StencilTest,
    raster: RasterState,
    viewports: Vec<Viewport>,
    scissors: Vec<Rect2D>,
    vertex_bindings: Vec<VertexBindingDesc>,
    vertex_attribs: Vec<VertexAttrib>,
    attachments: AttachmentSignature,
    specialization: Vec<u8>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            topology: NativeTopology::TriangleList,
            blend: [BlendDescriptor::default(); MAX_RENDER_TARGETS],
            stored_blend: [BlendDescriptor::default(); MAX_RENDER_TARGETS],
            write_masks: [ColorWriteMask::ALL; MAX_RENDER_TARGETS],
            blend_constants: [0.0; 4],
            logic_op: None,
            alpha_to_coverage: false,
            depth: DepthTest::default(),
            stencil: StencilTest::default(),
            raster: RasterState::default(),
            viewports: vec![Viewport::default()],
            scissors: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attribs: Vec::new(),
            attachments: AttachmentSignature::default(),
            specialization: Vec::new(),
        }
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topology(&self) -> NativeTopology {
        self.topology
    }

    pub fn blend(&self, index: usize) -> BlendDescriptor {
        self.blend[index]
    }

    pub fn color_write_mask(&self, index: usize) -> ColorWriteMask {
        self.write_masks[index]
    }

    pub fn color_write_masks(&self) -> &[ColorWriteMask; MAX_RENDER_TARGETS] {
        &self.write_masks
    }

    pub fn blend_constants(&self) -> [f32; 4] {
        self.blend_constants
    }

    pub fn logic_op(&self) -> Option<LogicOp> {
        self.logic_op
    }

    pub fn alpha_to_coverage(&self) -> bool {
        self.alpha_to_coverage
    }

    pub fn depth(&self) -> DepthTest {
        self.depth
    }

    pub fn stencil(&self) -> StencilTest {
        self.stencil
    }

    pub fn raster(&self) -> &RasterState {
        &self.raster
    }

    pub fn viewports(&self) -> &[Viewport] {
        &self.viewports
    }

    pub fn scissors(&self) -> &[Rect2D] {
        &self.scissors
    }

    pub fn vertex_bindings(&self) -> &[VertexBindingDesc] {
        &self.vertex_bindings
    }

    pub fn vertex_attribs(&self) -> &[VertexAttrib] {
        &self.vertex_attribs
    }

    pub fn attachments(&self) -> &AttachmentSignature {
        &self.attachments
    }

    pub fn specialization(&self) -> &[u8] {
        &self.specialization
    }

    pub fn set_topology(&mut self, topology: NativeTopology) -> bool {
        update(&mut self.topology, topology)
    }

    /// Blend state set while the target is masked out goes to the stored slot; it takes
    /// effect once the mask is non-zero again.
    pub fn set_blend(&mut self, index: usize, desc: BlendDescriptor) -> bool {
        if self.write_masks[index].is_empty() {
            self.stored_blend[index] = desc;
            return false;
        }
        update(&mut self.blend[index], desc)
    }

    pub fn set_color_write_mask(&mut self, index: usize, mask: ColorWriteMask) -> bool {
        let old = self.write_masks[index];
        if old == mask {
            return false;
        }
        match (old.is_empty(), mask.is_empty()) {
            (false, true) => {
                self.stored_blend[index] = self.blend[index];
                self.blend[index] = BlendDescriptor::default();
            }
            (true, false) => {
                self.blend[index] = self.stored_blend[index];
            }
            _ => {}
        }
        self.write_masks[index] = mask;
        true
    }

    pub fn set_blend_constants(&mut self, constants: [f32; 4]) -> bool {
        update(&mut self.blend_constants, constants)
    }

    pub fn set_logic_op(&mut self, op: Option<LogicOp>) -> bool {
        update(&mut self.logic_op, op)
    }

    pub fn set_logic_op_enable(&mut self, enable: bool) -> bool {
        let op = enable.then(|| self.logic_op.unwrap_or_default());
        update(&mut self.logic_op, op)
    }

    pub fn set_alpha_to_coverage(&mut self, enable: bool) -> bool {
        update(&mut self.alpha_to_coverage, enable)
    }

    pub fn set_depth(&mut self, depth: DepthTest) -> bool {
        update(&mut self.depth, depth)
    }

    pub fn set_stencil(&mut self, stencil: StencilTest) -> bool {
        update(&mut self.stencil, stencil)
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) -> bool {
        update(&mut self.raster.cull_mode, mode)
    }

    pub fn set_front_face(&mut self, face: FrontFace) -> bool {
        update(&mut self.raster.front_face, face)
    }

    pub fn set_rasterizer_discard(&mut self, enable: bool) -> bool {
        update(&mut self.raster.rasterizer_discard, enable)
    }

    pub fn set_depth_clamp(&mut self, enable: bool) -> bool {
        update(&mut self.raster.depth_clamp, enable)
    }

    pub fn set_depth_bias(&mut self, bias: DepthBias) -> bool {
        update(&mut self.raster.depth_bias, bias)
    }

    pub fn set_polygon_mode(&mut self, mode: PolygonMode) -> bool {
        update(&mut self.raster.polygon_mode, mode)
    }

    pub fn set_line_width(&mut self, width: f32) -> bool {
        update(&mut self.raster.line_width, width)
    }

    pub fn set_primitive_restart(&mut self, enable: bool) -> bool {
        update(&mut self.raster.primitive_restart, enable)
    }

    pub fn set_patch_control_points(&mut self, points: u32) -> bool {
        update(&mut self.raster.patch_control_points, points)
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) -> bool {
        if self.viewports[..] == viewports[..] {
            return false;
        }
        self.viewports = viewports.to_vec();
        true
    }

    pub fn set_scissors(&mut self, scissors: &[Rect2D]) -> bool {
        if self.scissors[..] == scissors[..] {
            return false;
        }
        self.scissors = scissors.to_vec();
        true
    }

    pub fn set_vertex_input(
        &mut self,
        bindings: &[VertexBindingDesc],
        attribs: &[VertexAttrib],
    ) -> bool {
        if self.vertex_bindings[..] == bindings[..] && self.vertex_attribs[..] == attribs[..] {
            return false;
        }
        self.vertex_bindings = bindings.to_vec();
        self.vertex_attribs = attribs.to_vec();
        true
    }

    pub fn set_attachments(&mut self, signature: AttachmentSignature) -> bool {
        update(&mut self.attachments, signature)
    }

    pub fn set_specialization(&mut self, data: &[u8]) -> bool {
        if self.specialization[..] == data[..] {
            return false;
        }
        self.specialization = data.to_vec();
        true
    }

    /// Key of the graphics pipeline this shadow describes when combined with `program`.
    pub fn graphics_key(&self, program: &dyn ShaderProgram) -> PipelineKey {
        let mut w = KeyWriter::new(BindPoint::Graphics);
        w.program(program);
        self.write_graphics(&mut w);
        w.specialization(&self.specialization, program.specialization_size());
        w.finish()
    }

    /// Compute pipelines only depend on the program and its specialization data.
    pub fn compute_key(&self, program: &dyn ShaderProgram) -> PipelineKey {
        let mut w = KeyWriter::new(BindPoint::Compute);
        w.program(program);
        w.specialization(&self.specialization, program.specialization_size());
        w.finish()
    }

    fn write_graphics(&self, w: &mut KeyWriter) {
        w.u8(self.topology as u8);

        let sig = &self.attachments;
        for (slot, format) in sig.color_formats.iter().enumerate() {
            let Some(format) = format else {
                // Unbound targets contribute nothing beyond their absence.
                w.u8(0);
                continue;
            };
            w.u8(1);
            w.u8(*format as u8);
            w.u8(self.write_masks[slot].bits());
            let mut blend = self.blend[slot];
            if format.is_integer() || !blend.enable {
                blend = BlendDescriptor::default();
            }
            w.blend(&blend);
        }
        match sig.depth_stencil {
            Some(format) => {
                w.u8(1);
                w.u8(format as u8);
            }
            None => w.u8(0),
        }
        w.u32(sig.samples);

        w.f32s(&self.blend_constants);
        match self.logic_op {
            Some(op) => {
                w.u8(1);
                w.u8(op as u8);
            }
            None => w.u8(0),
        }
        w.bool(self.alpha_to_coverage);

        w.bool(self.depth.test_enable);
        w.bool(self.depth.write_enable);
        w.u8(self.depth.compare as u8);
        w.bool(self.stencil.enable);
        w.stencil_face(&self.stencil.front);
        w.stencil_face(&self.stencil.back);

        let r = &self.raster;
        w.u8(r.cull_mode as u8);
        w.u8(r.front_face as u8);
        w.bool(r.rasterizer_discard);
        w.bool(r.depth_clamp);
        w.bool(r.depth_bias.enable);
        w.f32s(&[
            r.depth_bias.constant_factor,
            r.depth_bias.slope_factor,
            r.depth_bias.clamp,
        ]);
        w.u8(r.polygon_mode as u8);
        w.f32s(&[r.line_width]);
        w.bool(r.primitive_restart);
        w.u32(r.patch_control_points);

        w.u32(self.viewports.len() as u32);
        for vp in &self.viewports {
            w.f32s(&[vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth]);
        }
        w.u32(self.scissors.len() as u32);
        for s in &self.scissors {
            w.u32(s.x as u32);
            w.u32(s.y as u32);
            w.u32(s.width);
            w.u32(s.height);
        }

        w.u32(self.vertex_bindings.len() as u32);
        for b in &self.vertex_bindings {
            w.u32(b.binding);
            w.u32(b.stride);
            w.u8(b.step as u8);
            w.u32(b.divisor);
        }
        w.u32(self.vertex_attribs.len() as u32);
        for a in &self.vertex_attribs {
            w.u32(a.location);
            w.u32(a.binding);
            w.u8(a.format as u8);
            w.u32(a.offset);
        }
    }
}

/// Identifies a compiled pipeline object.
///
/// The hash is computed once with xxh3; equality falls back to the full serialized state so
/// hash collisions can never alias two different pipelines.
#[derive(Clone, Debug)]
pub struct PipelineKey {
    hash: u64,
    bytes: Box<[u8]>,
}

impl PipelineKey {
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for PipelineKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bytes == other.bytes
    }
}

impl Eq for PipelineKey {}

impl Hash for PipelineKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

struct KeyWriter {
    buf: Vec<u8>,
}

impl KeyWriter {
    fn new(bind_point: BindPoint) -> Self {
        let mut w = Self {
            buf: Vec::with_capacity(512),
        };
        w.u8(bind_point as u8);
        w
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f32s(&mut self, v: &[f32]) {
        for f in v {
            self.u32(f.to_bits());
        }
    }

    fn blend(&mut self, b: &BlendDescriptor) {
        self.bool(b.enable);
        self.u8(b.color_op as u8);
        self.u8(b.color_src as u8);
        self.u8(b.color_dst as u8);
        self.u8(b.alpha_op as u8);
        self.u8(b.alpha_src as u8);
        self.u8(b.alpha_dst as u8);
    }

    fn stencil_face(&mut self, f: &StencilFace) {
        self.u8(f.fail_op as u8);
        self.u8(f.pass_op as u8);
        self.u8(f.depth_fail_op as u8);
        self.u8(f.compare as u8);
        self.u32(f.compare_mask);
        self.u32(f.write_mask);
        self.u32(f.reference);
    }

    fn program(&mut self, program: &dyn ShaderProgram) {
        self.u64(program.id().0);
        self.u64(program.layout().0);
        self.u8(program.stages().bits());
    }

    /// Bytes past what the program consumes are ignored so they cannot split the cache.
    fn specialization(&mut self, data: &[u8], used: usize) {
        let n = data.len().min(used);
        self.u32(used as u32);
        self.buf.extend_from_slice(&data[..n]);
        // Missing bytes read as zero.
        self.buf.resize(self.buf.len() + (used - n), 0);
    }

    fn finish(self) -> PipelineKey {
        let hash = xxhash_rust::xxh3::xxh3_64(&self.buf);
        PipelineKey {
            hash,
            bytes: self.buf.into_boxed_slice(),
        }
    }
}
