//! Indirect draw argument layouts and the reference semantics of indirect conversion.
//!
//! The conversion itself runs on the GPU (recorded as `ConvertIndexedIndirect` /
//! `ConvertIndirect`); the functions here define what those commands must produce and are
//! what backend implementations are tested against.

use bytemuck::{Pod, Zeroable};

use crate::topology::IndexBufferPattern;

/// Arguments of a non-indexed indirect draw.
///
/// Layout: `vertex_count, instance_count, first_vertex, first_instance` (16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Arguments of an indexed indirect draw.
///
/// Layout: `index_count, instance_count, first_index, base_vertex, first_instance` (20 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl DrawIndirectArgs {
    pub const SIZE_BYTES: u64 = core::mem::size_of::<Self>() as u64;

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl DrawIndexedIndirectArgs {
    pub const SIZE_BYTES: u64 = core::mem::size_of::<Self>() as u64;

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Size of a 32-bit draw count.
pub const DRAW_COUNT_SIZE_BYTES: u64 = 4;

/// Number of records a count-driven draw actually executes.
pub fn effective_draw_count(count: Option<u32>, max_draw_count: u32) -> u32 {
    count.map_or(max_draw_count, |c| c.min(max_draw_count))
}

/// Converts indexed indirect draws through `pattern`.
///
/// Returns the converted index buffer and `max_draw_count` argument records. Draw `i` reads
/// `indices[first_index..first_index + index_count]`; its converted indices are packed after
/// those of draw `i - 1`. Records at or beyond the effective draw count are zero, so issuing
/// all `max_draw_count` records draws exactly what the count-limited draw would.
pub fn convert_indexed_indirect(
    pattern: &IndexBufferPattern,
    indices: &[u32],
    args: &[DrawIndexedIndirectArgs],
    count: Option<u32>,
    max_draw_count: u32,
) -> (Vec<u32>, Vec<DrawIndexedIndirectArgs>) {
    let active = effective_draw_count(count, max_draw_count) as usize;
    let mut out_indices = Vec::new();
    let mut out_args = vec![DrawIndexedIndirectArgs::zeroed(); max_draw_count as usize];

    for (i, (src, dst)) in args.iter().zip(out_args.iter_mut()).enumerate() {
        if i >= active {
            break;
        }
        let start = (src.first_index as usize).min(indices.len());
        let end = start
            .saturating_add(src.index_count as usize)
            .min(indices.len());
        let converted = pattern.convert_indices(&indices[start..end]);
        *dst = DrawIndexedIndirectArgs {
            index_count: converted.len() as u32,
            instance_count: src.instance_count,
            first_index: out_indices.len() as u32,
            base_vertex: src.base_vertex,
            first_instance: src.first_instance,
        };
        out_indices.extend(converted);
    }
    (out_indices, out_args)
}

/// Converts non-indexed indirect draws into indexed draws over the pattern index buffer
/// (generated for `vertex_capacity` vertices starting at vertex 0).
pub fn convert_indirect(
    pattern: &IndexBufferPattern,
    args: &[DrawIndirectArgs],
    count: Option<u32>,
    max_draw_count: u32,
    vertex_capacity: u32,
) -> Vec<DrawIndexedIndirectArgs> {
    let active = effective_draw_count(count, max_draw_count) as usize;
    let mut out = vec![DrawIndexedIndirectArgs::zeroed(); max_draw_count as usize];
    for (i, (src, dst)) in args.iter().zip(out.iter_mut()).enumerate() {
        if i >= active {
            break;
        }
        *dst = DrawIndexedIndirectArgs {
            index_count: pattern.converted_count(src.vertex_count.min(vertex_capacity)),
            instance_count: src.instance_count,
            first_index: 0,
            // Reinterpreted bitwise, as the device-side conversion does.
            base_vertex: src.first_vertex as i32,
            first_instance: src.first_instance,
        };
    }
    out
}
