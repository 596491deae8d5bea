//! Host capability descriptor and the dynamic-state tier derived from it.

use bitflags::bitflags;

use crate::config::RuntimeConfig;
use crate::state::dynamic::DynamicFields;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Vendor {
    Amd,
    Nvidia,
    Intel,
    Qualcomm,
    Arm,
    ImgTec,
    Apple,
    Broadcom,
    Software,
    #[default]
    Unknown,
}

impl Vendor {
    /// Maps a PCI vendor id (as reported by adapter info) onto a [`Vendor`].
    pub fn from_pci_id(id: u32) -> Vendor {
        match id {
            0x1002 | 0x1022 => Vendor::Amd,
            0x10de => Vendor::Nvidia,
            0x8086 => Vendor::Intel,
            0x5143 => Vendor::Qualcomm,
            0x13b5 => Vendor::Arm,
            0x1010 => Vendor::ImgTec,
            0x106b => Vendor::Apple,
            0x14e4 => Vendor::Broadcom,
            0x10005 => Vendor::Software,
            _ => Vendor::Unknown,
        }
    }

    pub fn is_tile_based(self) -> bool {
        matches!(
            self,
            Vendor::Qualcomm | Vendor::Arm | Vendor::ImgTec | Vendor::Apple | Vendor::Broadcom
        )
    }
}

bitflags! {
    /// Documented per-vendor driver defects the translation layer works around.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Workarounds: u32 {
        /// Turning rasterizer discard off corrupts previously set dynamic state (viewports in
        /// particular); every dynamic field has to be replayed afterwards.
        const RASTERIZER_DISCARD_CLOBBERS_DYNAMIC_STATE = 1 << 0;
        /// Binding one image to several color attachments is undefined on tile-based
        /// renderers; drop masked-out duplicates from the framebuffer.
        const DEDUPLICATE_COLOR_ATTACHMENTS = 1 << 1;
    }
}

impl Workarounds {
    pub fn for_vendor(vendor: Vendor) -> Workarounds {
        let mut w = Workarounds::empty();
        if vendor == Vendor::Qualcomm {
            w |= Workarounds::RASTERIZER_DISCARD_CLOBBERS_DYNAMIC_STATE;
        }
        if vendor.is_tile_based() {
            w |= Workarounds::DEDUPLICATE_COLOR_ATTACHMENTS;
        }
        w
    }
}

/// Immutable description of what the host device supports. Supplied at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostCapabilities {
    pub extended_dynamic_state: bool,
    pub extended_dynamic_state2: bool,
    pub extended_dynamic_state2_logic_op: bool,
    pub extended_dynamic_state2_patch_control_points: bool,
    pub multi_viewport: bool,
    pub max_viewports: u32,
    pub indirect_draw_count: bool,
    pub triangle_fans: bool,
    pub index_type_u8: bool,
    pub transform_feedback: bool,
    /// Required alignment of index buffer offsets, in bytes (in addition to index size).
    pub index_buffer_alignment: u64,
    pub vendor: Vendor,
    pub workarounds: Workarounds,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            extended_dynamic_state: false,
            extended_dynamic_state2: false,
            extended_dynamic_state2_logic_op: false,
            extended_dynamic_state2_patch_control_points: false,
            multi_viewport: false,
            max_viewports: 1,
            indirect_draw_count: false,
            triangle_fans: false,
            index_type_u8: false,
            transform_feedback: false,
            index_buffer_alignment: 4,
            vendor: Vendor::Unknown,
            workarounds: Workarounds::empty(),
        }
    }
}

impl HostCapabilities {
    /// A descriptor for a fully featured desktop device.
    pub fn desktop(vendor: Vendor) -> Self {
        Self {
            extended_dynamic_state: true,
            extended_dynamic_state2: true,
            extended_dynamic_state2_logic_op: true,
            extended_dynamic_state2_patch_control_points: true,
            multi_viewport: true,
            max_viewports: 16,
            indirect_draw_count: true,
            triangle_fans: true,
            index_type_u8: true,
            transform_feedback: true,
            index_buffer_alignment: 4,
            vendor,
            workarounds: Workarounds::for_vendor(vendor),
        }
    }

    pub fn max_viewports(&self) -> usize {
        if self.multi_viewport {
            (self.max_viewports.max(1) as usize).min(crate::types::MAX_VIEWPORTS)
        } else {
            1
        }
    }
}

/// How much pipeline state can be set without rebuilding a pipeline object.
///
/// Selected once from the capability descriptor; never changes afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DynamicStateTier {
    /// Everything is baked into pipeline objects.
    Baseline,
    /// Common draw state is dynamic (tier A).
    Extended,
    /// Tier A plus rasterizer discard, primitive restart, and optionally patch control points
    /// and logic op (tier B).
    Extended2 {
        logic_op: bool,
        patch_control_points: bool,
    },
}

impl DynamicStateTier {
    pub fn select(caps: &HostCapabilities, config: &RuntimeConfig) -> DynamicStateTier {
        if config.disable_extended_dynamic_state || !caps.extended_dynamic_state {
            return DynamicStateTier::Baseline;
        }
        if !caps.extended_dynamic_state2 {
            return DynamicStateTier::Extended;
        }
        DynamicStateTier::Extended2 {
            logic_op: caps.extended_dynamic_state2_logic_op,
            patch_control_points: caps.extended_dynamic_state2_patch_control_points,
        }
    }

    /// Fields covered by this tier; these never enter a pipeline key.
    pub fn dynamic_fields(self) -> DynamicFields {
        match self {
            DynamicStateTier::Baseline => DynamicFields::empty(),
            DynamicStateTier::Extended => DynamicFields::TIER_A,
            DynamicStateTier::Extended2 {
                logic_op,
                patch_control_points,
            } => {
                let mut f = DynamicFields::TIER_A
                    | DynamicFields::RASTERIZER_DISCARD
                    | DynamicFields::PRIMITIVE_RESTART;
                if logic_op {
                    f |= DynamicFields::LOGIC_OP;
                }
                if patch_control_points {
                    f |= DynamicFields::PATCH_CONTROL_POINTS;
                }
                f
            }
        }
    }
}
