//! Converts FLVER-style skinned models and spline-compressed skeletal
//! animations into scene structures ready for glTF serialization.
//!
//! The pipeline has four stages:
//! 1. [`skeleton::reconcile`] merges the model's flat node list with the
//!    skeleton's bone hierarchy into one node tree.
//! 2. [`mesh::plan_vertex_layout`] decides each mesh's interleaved output
//!    layout from its declared buffer layouts.
//! 3. [`mesh::pack_mesh_buffer`] converts and packs vertices and indices.
//! 4. [`scene::compose_scene`] joins nodes, meshes, the skin, and decoded
//!    animations into an [`scene::ExportScene`].
//!
//! Archive extraction and glTF serialization live with the callers; this
//! crate owns the conversion in between.

pub mod animation;
pub mod error;
pub mod flver;
pub mod mesh;
pub mod scene;
pub mod skeleton;

pub use animation::{DecodedAnimation, SplineCompressedAnimation};
pub use error::ConvertError;
pub use flver::{Flver, FlverMesh, FlverNode, Vertex};
pub use scene::{compose_scene, convert_batch, ExportScene, ModelInput};
pub use skeleton::{HkaSkeleton, NodeTree};
