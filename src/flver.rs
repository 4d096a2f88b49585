//! Source model structures (decoded FLVER-style skinned meshes).
//!
//! These are the inputs handed over by the archive/extraction layer: a flat
//! node list with parent-index adjacency, meshes bound to nodes, and the
//! declared vertex buffer layouts that drive packing.

use glam::{Vec2, Vec3, Vec4};
use smallvec::SmallVec;

/// Sentinel parent index for root nodes.
pub const NO_NODE: i16 = -1;

/// A decoded source model.
#[derive(Debug, Clone, Default)]
pub struct Flver {
    pub nodes: Vec<FlverNode>,
    pub meshes: Vec<FlverMesh>,
    pub buffer_layouts: Vec<BufferLayout>,
}

/// A node in the model's flat hierarchy.
///
/// Rotation is an Euler angle triple in radians, in the source coordinate
/// convention (left-handed, Z toward the viewer).
#[derive(Debug, Clone)]
pub struct FlverNode {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub parent_index: i16,
}

impl FlverNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            parent_index: NO_NODE,
        }
    }
}

/// A mesh owned by exactly one node.
#[derive(Debug, Clone)]
pub struct FlverMesh {
    /// Index of the owning node.
    pub node_index: usize,
    /// False when the mesh is rigidly bound to a single bone (no blended
    /// weights); selects the single-joint placeholder unit during planning.
    pub use_bone_weights: bool,
    /// One entry per vertex buffer, indexing into [`Flver::buffer_layouts`].
    pub layout_indices: Vec<usize>,
    pub vertices: Vec<Vertex>,
    pub face_sets: Vec<FaceSet>,
}

impl FlverMesh {
    /// The face set with the most indices (highest level of detail).
    pub fn primary_face_set(&self) -> Option<&FaceSet> {
        self.face_sets.iter().max_by_key(|fs| fs.indices.len())
    }
}

/// An index buffer with its topology tag.
#[derive(Debug, Clone)]
pub struct FaceSet {
    pub indices: Vec<u32>,
    pub triangle_strip: bool,
}

/// A single vertex record.
///
/// Channel presence is mesh-scoped: the declared buffer layout decides which
/// channels are meaningful, and the same set applies to every vertex of a
/// mesh. Unused channels hold defaults.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// Bone index for single-joint meshes, carried in the source's normal W
    /// component.
    pub normal_w: i16,
    /// Tangent vector in xyz, handedness scalar in w.
    pub tangent: Vec4,
    pub colors: SmallVec<[Vec4; 2]>,
    pub uvs: SmallVec<[Vec2; 6]>,
    /// Global bone indices; index 0 is the "no binding" sentinel.
    pub bone_indices: [i16; 4],
    pub bone_weights: [f32; 4],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
            normal_w: 0,
            tangent: Vec4::ZERO,
            colors: SmallVec::new(),
            uvs: SmallVec::new(),
            bone_indices: [0; 4],
            bone_weights: [0.0; 4],
        }
    }
}

/// Declared semantic of one layout member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSemantic {
    Position,
    BoneWeights,
    BoneIndices,
    Normal,
    Uv,
    Tangent,
    Bitangent,
    VertexColor,
}

/// One member of a declared vertex buffer layout.
#[derive(Debug, Clone, Copy)]
pub struct LayoutMember {
    pub semantic: LayoutSemantic,
    /// Member size in bytes. A UV member may pack several logical UV pairs;
    /// each pair occupies 8 bytes.
    pub size: u32,
}

impl LayoutMember {
    pub fn new(semantic: LayoutSemantic, size: u32) -> Self {
        Self { semantic, size }
    }
}

/// The ordered member list declared for one vertex buffer.
pub type BufferLayout = Vec<LayoutMember>;
