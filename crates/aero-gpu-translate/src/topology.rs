//! Primitive topology emulation.
//!
//! Topologies the host cannot draw are rewritten into triangle lists through an
//! [`IndexBufferPattern`]: a fixed template of index references applied once per primitive.
//! Non-indexed draws use a generated pattern index buffer that only ever grows; indexed draws
//! convert the bound index buffer into a side buffer.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::debug;

use crate::backend::BufferAllocator;
use crate::caps::HostCapabilities;
use crate::cmd::{CommandSink, NativeCmd};
use crate::error::{Result, TranslateError};
use crate::types::{
    AllocationId, BufferHandle, IndexType, NativeBuffer, NativeTopology, PrimitiveTopology,
};

/// One entry of a pattern template, resolved per primitive against the primitive's
/// `current` vertex (`base_index + primitive * stride`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TemplateEntry {
    /// Vertex 0 of the draw, shared by every primitive.
    FixedApex,
    /// `current - 1`.
    PreviousMinusOne,
    /// `current`.
    Current,
    /// `current + n`.
    Offset(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Quads,
    TriangleFan,
    /// One output index per input index; widens index types the host cannot read.
    Identity,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatternKind::Quads => "quads",
            PatternKind::TriangleFan => "triangle_fan",
            PatternKind::Identity => "identity",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexBufferPattern {
    kind: PatternKind,
    /// Input vertices skipped before the first primitive's `current` vertex.
    base_index: u32,
    /// Input vertices advanced per primitive.
    stride: u32,
    template: &'static [TemplateEntry],
}

const QUADS_TEMPLATE: [TemplateEntry; 6] = [
    TemplateEntry::Offset(0),
    TemplateEntry::Offset(1),
    TemplateEntry::Offset(2),
    TemplateEntry::Offset(0),
    TemplateEntry::Offset(2),
    TemplateEntry::Offset(3),
];

const FAN_TEMPLATE: [TemplateEntry; 3] = [
    TemplateEntry::FixedApex,
    TemplateEntry::PreviousMinusOne,
    TemplateEntry::Current,
];

const IDENTITY_TEMPLATE: [TemplateEntry; 1] = [TemplateEntry::Current];

impl IndexBufferPattern {
    /// Every 4 input vertices produce `[0, 1, 2, 0, 2, 3]`.
    pub fn quads() -> Self {
        Self {
            kind: PatternKind::Quads,
            base_index: 0,
            stride: 4,
            template: &QUADS_TEMPLATE,
        }
    }

    /// Triangle `p` is `(0, p + 1, p + 2)`.
    pub fn triangle_fan() -> Self {
        Self {
            kind: PatternKind::TriangleFan,
            base_index: 2,
            stride: 1,
            template: &FAN_TEMPLATE,
        }
    }

    pub fn identity() -> Self {
        Self {
            kind: PatternKind::Identity,
            base_index: 0,
            stride: 1,
            template: &IDENTITY_TEMPLATE,
        }
    }

    pub fn for_kind(kind: PatternKind) -> Self {
        match kind {
            PatternKind::Quads => Self::quads(),
            PatternKind::TriangleFan => Self::triangle_fan(),
            PatternKind::Identity => Self::identity(),
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn template(&self) -> &'static [TemplateEntry] {
        self.template
    }

    pub fn uses_fixed_apex(&self) -> bool {
        self.template.contains(&TemplateEntry::FixedApex)
    }

    pub fn indices_per_primitive(&self) -> u32 {
        self.template.len() as u32
    }

    /// Whole primitives formed by `vertex_count` input vertices.
    pub fn primitive_count(&self, vertex_count: u32) -> u32 {
        vertex_count.saturating_sub(self.base_index) / self.stride
    }

    /// Output indices produced for `vertex_count` input vertices (or indices).
    pub fn converted_count(&self, vertex_count: u32) -> u32 {
        self.primitive_count(vertex_count)
            .saturating_mul(self.indices_per_primitive())
    }

    fn resolve(&self, entry: TemplateEntry, primitive: u32) -> u32 {
        let current = self.base_index + primitive * self.stride;
        match entry {
            TemplateEntry::FixedApex => 0,
            TemplateEntry::PreviousMinusOne => current - 1,
            TemplateEntry::Current => current,
            TemplateEntry::Offset(n) => current + n,
        }
    }

    /// Index buffer for a non-indexed draw of `vertex_count` vertices.
    pub fn generate(&self, vertex_count: u32) -> Vec<u32> {
        let primitives = self.primitive_count(vertex_count);
        let mut out = Vec::with_capacity(self.converted_count(vertex_count) as usize);
        for p in 0..primitives {
            out.extend(self.template.iter().map(|&e| self.resolve(e, p)));
        }
        out
    }

    /// Rewrites an index list through the pattern.
    pub fn convert_indices(&self, indices: &[u32]) -> Vec<u32> {
        let count = u32::try_from(indices.len()).unwrap_or(u32::MAX);
        let primitives = self.primitive_count(count);
        let mut out = Vec::with_capacity(self.converted_count(count) as usize);
        for p in 0..primitives {
            out.extend(
                self.template
                    .iter()
                    .map(|&e| indices[self.resolve(e, p) as usize]),
            );
        }
        out
    }
}

/// How a guest topology is drawn on the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopologyPlan {
    pub native: NativeTopology,
    pub pattern: Option<PatternKind>,
}

impl TopologyPlan {
    fn direct(native: NativeTopology) -> Self {
        Self {
            native,
            pattern: None,
        }
    }

    fn emulated(pattern: PatternKind) -> Self {
        Self {
            native: NativeTopology::TriangleList,
            pattern: Some(pattern),
        }
    }
}

pub fn plan_topology(
    topology: PrimitiveTopology,
    caps: &HostCapabilities,
) -> Result<TopologyPlan> {
    Ok(match topology {
        PrimitiveTopology::Points => TopologyPlan::direct(NativeTopology::PointList),
        PrimitiveTopology::Lines => TopologyPlan::direct(NativeTopology::LineList),
        PrimitiveTopology::LineStrip => TopologyPlan::direct(NativeTopology::LineStrip),
        PrimitiveTopology::Triangles => TopologyPlan::direct(NativeTopology::TriangleList),
        PrimitiveTopology::TriangleStrip | PrimitiveTopology::QuadStrip => {
            TopologyPlan::direct(NativeTopology::TriangleStrip)
        }
        PrimitiveTopology::TriangleFan | PrimitiveTopology::Polygon => {
            if caps.triangle_fans {
                TopologyPlan::direct(NativeTopology::TriangleFan)
            } else {
                TopologyPlan::emulated(PatternKind::TriangleFan)
            }
        }
        PrimitiveTopology::Quads => TopologyPlan::emulated(PatternKind::Quads),
        PrimitiveTopology::LinesAdjacency => {
            TopologyPlan::direct(NativeTopology::LineListWithAdjacency)
        }
        PrimitiveTopology::LineStripAdjacency => {
            TopologyPlan::direct(NativeTopology::LineStripWithAdjacency)
        }
        PrimitiveTopology::TrianglesAdjacency => {
            TopologyPlan::direct(NativeTopology::TriangleListWithAdjacency)
        }
        PrimitiveTopology::TriangleStripAdjacency => {
            TopologyPlan::direct(NativeTopology::TriangleStripWithAdjacency)
        }
        PrimitiveTopology::Patches => TopologyPlan::direct(NativeTopology::PatchList),
        PrimitiveTopology::LineLoop => return Err(TranslateError::UnsupportedTopology(topology)),
    })
}

/// Buffer owned by the translation layer that is replaced (never shrunk) when too small.
#[derive(Debug, Default)]
pub(crate) struct ScratchBuffer {
    buffer: Option<NativeBuffer>,
    size: u64,
}

impl ScratchBuffer {
    /// Returns the buffer plus the one it superseded, if it had to grow.
    pub(crate) fn ensure<A: BufferAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
        size: u64,
    ) -> Result<(NativeBuffer, Option<NativeBuffer>)> {
        if let Some(buffer) = self.buffer {
            if self.size >= size {
                return Ok((buffer, None));
            }
        }
        let new_size = size.max(256).next_power_of_two();
        let buffer = allocator
            .create_scratch(new_size)
            .map_err(TranslateError::ScratchAllocation)?;
        let old = self.buffer.replace(buffer);
        self.size = new_size;
        Ok((buffer, old))
    }

    pub(crate) fn take(&mut self) -> Option<NativeBuffer> {
        self.size = 0;
        self.buffer.take()
    }
}

#[derive(Debug, Default)]
struct PatternBuffer {
    buffer: Option<NativeBuffer>,
    vertex_capacity: u32,
}

/// Identity of an indexed conversion; the converted buffer is reused while the source range
/// is untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConversionKey {
    pub pattern: PatternKind,
    pub source: BufferHandle,
    pub allocation: AllocationId,
    pub offset: u64,
    pub index_type: IndexType,
    pub first_index: u32,
    pub index_count: u32,
}

impl ConversionKey {
    fn source_bytes(&self) -> (u64, u64) {
        let size = self.index_type.size_bytes();
        (
            self.offset + u64::from(self.first_index) * size,
            u64::from(self.index_count) * size,
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ConvertedIndices {
    pub buffer: NativeBuffer,
    pub index_count: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub pattern_buffer_grows: u64,
    pub conversion_hits: u64,
    pub conversion_misses: u64,
    pub conversion_invalidations: u64,
}

/// Storage driven by the patterns: per-kind pattern buffers, the indexed conversion cache and
/// the scratch buffers used by indirect conversions.
#[derive(Debug)]
pub struct TopologyEmulator {
    patterns: [PatternBuffer; 3],
    conversions: LruCache<ConversionKey, ConvertedIndices>,
    pub(crate) indirect_indices: ScratchBuffer,
    pub(crate) indirect_args: ScratchBuffer,
    stats: ConversionStats,
}

fn pattern_slot(kind: PatternKind) -> usize {
    match kind {
        PatternKind::Quads => 0,
        PatternKind::TriangleFan => 1,
        PatternKind::Identity => 2,
    }
}

impl TopologyEmulator {
    pub fn new(conversion_capacity: usize) -> Self {
        let cap = NonZeroUsize::new(conversion_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            patterns: Default::default(),
            conversions: LruCache::new(cap),
            indirect_indices: ScratchBuffer::default(),
            indirect_args: ScratchBuffer::default(),
            stats: ConversionStats::default(),
        }
    }

    pub fn stats(&self) -> ConversionStats {
        self.stats
    }

    /// Pattern buffer already large enough for `vertex_count`, if any.
    pub fn pattern_buffer(&self, kind: PatternKind, vertex_count: u32) -> Option<NativeBuffer> {
        let slot = &self.patterns[pattern_slot(kind)];
        slot.buffer.filter(|_| slot.vertex_capacity >= vertex_count)
    }

    /// Replaces the pattern buffer with one covering at least `vertex_count` vertices and
    /// records its upload. Must be called outside a render pass. Returns the new buffer and the
    /// superseded one.
    pub fn grow_pattern_buffer<A: BufferAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
        sink: &mut dyn CommandSink,
        kind: PatternKind,
        vertex_count: u32,
    ) -> Result<(NativeBuffer, Option<NativeBuffer>)> {
        let slot = &mut self.patterns[pattern_slot(kind)];
        let capacity = vertex_count
            .max(slot.vertex_capacity.saturating_mul(2))
            .max(64)
            .checked_next_power_of_two()
            .unwrap_or(u32::MAX);
        let pattern = IndexBufferPattern::for_kind(kind);
        let indices = pattern.generate(capacity);
        let data: Vec<u8> = bytemuck::cast_slice(&indices).to_vec();
        let buffer = allocator
            .create_scratch(data.len().max(4) as u64)
            .map_err(TranslateError::ScratchAllocation)?;
        sink.push(NativeCmd::UpdateBuffer {
            buffer,
            offset: 0,
            data,
        });
        debug!(
            pattern = %kind,
            vertex_capacity = capacity,
            index_count = indices.len(),
            "grew pattern index buffer"
        );
        let old = slot.buffer.replace(buffer);
        slot.vertex_capacity = capacity;
        self.stats.pattern_buffer_grows += 1;
        Ok((buffer, old))
    }

    pub fn lookup_conversion(&mut self, key: &ConversionKey) -> Option<ConvertedIndices> {
        let hit = self.conversions.get(key).copied();
        if hit.is_some() {
            self.stats.conversion_hits += 1;
        } else {
            self.stats.conversion_misses += 1;
        }
        hit
    }

    /// Caches a conversion; returns the buffer of an evicted entry.
    pub fn insert_conversion(
        &mut self,
        key: ConversionKey,
        converted: ConvertedIndices,
    ) -> Option<NativeBuffer> {
        match self.conversions.push(key, converted) {
            Some((evicted_key, evicted)) if evicted_key != key => Some(evicted.buffer),
            Some((_, replaced)) if replaced.buffer != converted.buffer => Some(replaced.buffer),
            _ => None,
        }
    }

    /// Drops conversions whose source bytes overlap a written range.
    pub fn invalidate_written(
        &mut self,
        source: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Vec<NativeBuffer> {
        let end = offset.saturating_add(size);
        self.invalidate_where(|k| {
            let (start, len) = k.source_bytes();
            k.source == source && start < end && offset < start + len
        })
    }

    /// Drops conversions read from an allocation that was relocated.
    pub fn invalidate_allocation(&mut self, allocation: AllocationId) -> Vec<NativeBuffer> {
        self.invalidate_where(|k| k.allocation == allocation)
    }

    fn invalidate_where(&mut self, pred: impl Fn(&ConversionKey) -> bool) -> Vec<NativeBuffer> {
        let stale: Vec<ConversionKey> = self
            .conversions
            .iter()
            .filter(|(k, _)| pred(k))
            .map(|(k, _)| *k)
            .collect();
        let mut freed = Vec::with_capacity(stale.len());
        for key in stale {
            if let Some(entry) = self.conversions.pop(&key) {
                freed.push(entry.buffer);
            }
        }
        self.stats.conversion_invalidations += freed.len() as u64;
        freed
    }

    /// Every buffer owned by the emulator; used on teardown.
    pub fn drain_buffers(&mut self) -> Vec<NativeBuffer> {
        let mut out: Vec<NativeBuffer> = self
            .patterns
            .iter_mut()
            .filter_map(|p| {
                p.vertex_capacity = 0;
                p.buffer.take()
            })
            .collect();
        while let Some((_, entry)) = self.conversions.pop_lru() {
            out.push(entry.buffer);
        }
        out.extend(self.indirect_indices.take());
        out.extend(self.indirect_args.take());
        out
    }
}
