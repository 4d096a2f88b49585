//! Vertex layout planning.
//!
//! Inspects a mesh's declared buffer layouts and decides which output
//! attributes the packed interleaved buffer will carry, in a fixed order
//! with fixed per-attribute sizes.

use crate::flver::{BufferLayout, LayoutSemantic};

pub const MAX_COLOR_CHANNELS: usize = 2;
pub const MAX_UV_CHANNELS: usize = 6;

// Presence flags for the planned attribute set
pub const LAYOUT_POSITION: u16 = 0x1;
pub const LAYOUT_NORMAL: u16 = 0x2;
pub const LAYOUT_TANGENT: u16 = 0x4;
pub const LAYOUT_JOINTS: u16 = 0x8;
/// Rigid binding: joints carry one bone index with weight 1.0.
pub const LAYOUT_SINGLE_JOINT: u16 = 0x10;

/// An output vertex attribute. Channel-indexed variants carry their set
/// index (COLOR_0, TEXCOORD_3, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexAttribute {
    Position,
    Normal,
    Tangent,
    Color(u8),
    TexCoord(u8),
    Joints,
    Weights,
}

impl VertexAttribute {
    /// Attribute name in glTF accessor convention.
    pub fn accessor_name(&self) -> String {
        match self {
            Self::Position => "POSITION".to_string(),
            Self::Normal => "NORMAL".to_string(),
            Self::Tangent => "TANGENT".to_string(),
            Self::Color(n) => format!("COLOR_{n}"),
            Self::TexCoord(n) => format!("TEXCOORD_{n}"),
            Self::Joints => "JOINTS_0".to_string(),
            Self::Weights => "WEIGHTS_0".to_string(),
        }
    }

    /// Byte size of the attribute in the packed buffer.
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Position | Self::Normal => 12,
            Self::Tangent | Self::Color(_) | Self::Weights => 16,
            Self::TexCoord(_) | Self::Joints => 8,
        }
    }
}

/// One attribute's placement within the interleaved vertex.
#[derive(Debug, Clone, Copy)]
pub struct PlannedAttribute {
    pub attribute: VertexAttribute,
    pub offset: usize,
    pub size: usize,
}

/// The full interleaved layout decided for one mesh.
#[derive(Debug, Clone, Default)]
pub struct VertexLayoutPlan {
    pub attributes: Vec<PlannedAttribute>,
    pub stride: usize,
    pub flags: u16,
    pub color_count: usize,
    pub uv_count: usize,
}

impl VertexLayoutPlan {
    pub fn has(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }
}

/// Plans the output layout for a mesh with the given declared buffer
/// layouts.
///
/// Duplicate semantic declarations across buffers are counted once. A UV
/// member wider than 8 bytes contributes one channel per 8-byte pair.
/// Joints and weights are emitted as a unit: either the blended form (when
/// the mesh is skinned and declares bone indices) or the single-joint
/// placeholder (when the mesh is skinned but rigidly bound).
pub fn plan_vertex_layout(
    layouts: &[&BufferLayout],
    skinned: bool,
    use_bone_weights: bool,
) -> VertexLayoutPlan {
    let mut flags = 0u16;
    let mut color_count = 0usize;
    let mut uv_count = 0usize;
    let mut has_bone_indices = false;

    for layout in layouts {
        for member in layout.iter() {
            match member.semantic {
                LayoutSemantic::Position => flags |= LAYOUT_POSITION,
                LayoutSemantic::Normal => flags |= LAYOUT_NORMAL,
                LayoutSemantic::Tangent => flags |= LAYOUT_TANGENT,
                LayoutSemantic::VertexColor => {
                    color_count = (color_count + 1).min(MAX_COLOR_CHANNELS);
                }
                LayoutSemantic::Uv => {
                    let pairs = (member.size / 8).max(1) as usize;
                    uv_count = (uv_count + pairs).min(MAX_UV_CHANNELS);
                }
                LayoutSemantic::BoneIndices => has_bone_indices = true,
                // Weights ride along with indices; bitangents are not
                // representable in the output attribute set.
                LayoutSemantic::BoneWeights | LayoutSemantic::Bitangent => {}
            }
        }
    }

    if skinned {
        if use_bone_weights && has_bone_indices {
            flags |= LAYOUT_JOINTS;
        } else if !use_bone_weights {
            flags |= LAYOUT_SINGLE_JOINT;
        }
    }

    let mut attributes = Vec::new();
    let mut offset = 0usize;
    let mut push = |attribute: VertexAttribute, attrs: &mut Vec<PlannedAttribute>| {
        let size = attribute.byte_size();
        attrs.push(PlannedAttribute {
            attribute,
            offset,
            size,
        });
        offset += size;
    };

    if flags & LAYOUT_POSITION != 0 {
        push(VertexAttribute::Position, &mut attributes);
    }
    if flags & LAYOUT_NORMAL != 0 {
        push(VertexAttribute::Normal, &mut attributes);
    }
    if flags & LAYOUT_TANGENT != 0 {
        push(VertexAttribute::Tangent, &mut attributes);
    }
    for n in 0..color_count {
        push(VertexAttribute::Color(n as u8), &mut attributes);
    }
    for n in 0..uv_count {
        push(VertexAttribute::TexCoord(n as u8), &mut attributes);
    }
    if flags & (LAYOUT_JOINTS | LAYOUT_SINGLE_JOINT) != 0 {
        push(VertexAttribute::Joints, &mut attributes);
        push(VertexAttribute::Weights, &mut attributes);
    }

    VertexLayoutPlan {
        attributes,
        stride: offset,
        flags,
        color_count,
        uv_count,
    }
}
