//! Mesh conversion: layout planning and vertex buffer packing.

pub mod layout;
pub mod packing;

pub use layout::{plan_vertex_layout, PlannedAttribute, VertexAttribute, VertexLayoutPlan};
pub use packing::{pack_mesh_buffer, IndexFormat, PackedMeshBuffer};
