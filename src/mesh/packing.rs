//! Interleaved vertex buffer packing.
//!
//! Walks each vertex through the planned attribute list, converting
//! positions and direction vectors into the output coordinate convention
//! (Z negated, the model's master rotation applied) and remapping global
//! bone indices into the skin's joint-local order. Indices are appended to
//! the same buffer after the vertex region.

use glam::{Mat4, Vec2, Vec4};
use tracing::warn;

use crate::flver::Vertex;
use crate::mesh::layout::{VertexAttribute, VertexLayoutPlan};

/// Index element width, chosen per mesh from its vertex count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn byte_size(&self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// One mesh's packed geometry: interleaved vertices followed by indices.
#[derive(Debug, Clone)]
pub struct PackedMeshBuffer {
    pub data: Vec<u8>,
    pub vertex_count: usize,
    pub stride: usize,
    pub index_count: usize,
    pub index_format: IndexFormat,
    /// Start of the index region; the vertex region is exactly
    /// `vertex_count * stride` bytes before it.
    pub index_byte_offset: usize,
}

/// Packs a mesh's vertices and indices into one interleaved buffer.
///
/// `joint_order` lists global bone indices in skin joint order; per-vertex
/// bone indices are rewritten to positions in that list. Index 0 is the
/// "no binding" sentinel and always maps to joint 0.
pub fn pack_mesh_buffer(
    vertices: &[Vertex],
    indices: &[u32],
    plan: &VertexLayoutPlan,
    master_rotation: Mat4,
    joint_order: &[i16],
) -> PackedMeshBuffer {
    let mut data = Vec::with_capacity(vertices.len() * plan.stride + indices.len() * 4);

    for vertex in vertices {
        for planned in &plan.attributes {
            match planned.attribute {
                VertexAttribute::Position => {
                    let mut p = vertex.position;
                    p.z = -p.z;
                    let p = master_rotation.transform_point3(p);
                    data.extend_from_slice(bytemuck::cast_slice(&p.to_array()));
                }
                VertexAttribute::Normal => {
                    let mut n = vertex.normal;
                    n.z = -n.z;
                    let n = master_rotation.transform_vector3(n).normalize_or_zero();
                    data.extend_from_slice(bytemuck::cast_slice(&n.to_array()));
                }
                VertexAttribute::Tangent => {
                    let mut t = vertex.tangent.truncate();
                    t.z = -t.z;
                    let t = master_rotation.transform_vector3(t).normalize_or_zero();
                    let t = t.extend(vertex.tangent.w);
                    data.extend_from_slice(bytemuck::cast_slice(&t.to_array()));
                }
                VertexAttribute::Color(n) => {
                    let color = vertex.colors.get(n as usize).copied().unwrap_or(Vec4::ONE);
                    data.extend_from_slice(bytemuck::cast_slice(&color.to_array()));
                }
                VertexAttribute::TexCoord(n) => {
                    let uv = vertex.uvs.get(n as usize).copied().unwrap_or(Vec2::ZERO);
                    data.extend_from_slice(bytemuck::cast_slice(&uv.to_array()));
                }
                VertexAttribute::Joints => {
                    let joints = if plan.has(crate::mesh::layout::LAYOUT_SINGLE_JOINT) {
                        [vertex.normal_w as u16, 0, 0, 0]
                    } else {
                        remap_joints(vertex.bone_indices, joint_order)
                    };
                    data.extend_from_slice(bytemuck::cast_slice(&joints));
                }
                VertexAttribute::Weights => {
                    let weights = if plan.has(crate::mesh::layout::LAYOUT_SINGLE_JOINT) {
                        [1.0, 0.0, 0.0, 0.0]
                    } else {
                        normalize_weights(vertex.bone_weights)
                    };
                    data.extend_from_slice(bytemuck::cast_slice(&weights));
                }
            }
        }
    }

    let index_byte_offset = data.len();
    let index_format = if vertices.len() < u16::MAX as usize {
        IndexFormat::U16
    } else {
        IndexFormat::U32
    };
    match index_format {
        IndexFormat::U16 => {
            for &i in indices {
                data.extend_from_slice(&(i as u16).to_le_bytes());
            }
        }
        IndexFormat::U32 => {
            for &i in indices {
                data.extend_from_slice(&i.to_le_bytes());
            }
        }
    }

    PackedMeshBuffer {
        data,
        vertex_count: vertices.len(),
        stride: plan.stride,
        index_count: indices.len(),
        index_format,
        index_byte_offset,
    }
}

fn remap_joints(bone_indices: [i16; 4], joint_order: &[i16]) -> [u16; 4] {
    let mut joints = [0u16; 4];
    for (out, &global) in joints.iter_mut().zip(&bone_indices) {
        if global == 0 {
            continue;
        }
        match joint_order.iter().position(|&j| j == global) {
            Some(local) => *out = local as u16,
            None => {
                warn!(bone = global, "vertex references a bone outside the skin");
            }
        }
    }
    joints
}

/// Renormalizes weights to sum to 1. All-zero weights bind fully to the
/// first joint.
fn normalize_weights(weights: [f32; 4]) -> [f32; 4] {
    let sum: f32 = weights.iter().sum();
    if sum <= 0.0 {
        return [1.0, 0.0, 0.0, 0.0];
    }
    weights.map(|w| w / sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flver::{LayoutMember, LayoutSemantic, Vertex};
    use crate::mesh::layout::plan_vertex_layout;
    use glam::Vec3;

    fn layout(members: &[(LayoutSemantic, u32)]) -> Vec<LayoutMember> {
        members
            .iter()
            .map(|&(semantic, size)| LayoutMember::new(semantic, size))
            .collect()
    }

    fn vertex(position: Vec3) -> Vertex {
        Vertex {
            position,
            normal: Vec3::Y,
            ..Default::default()
        }
    }

    #[test]
    fn test_position_only_buffer_size() {
        let l = layout(&[(LayoutSemantic::Position, 12)]);
        let plan = plan_vertex_layout(&[&l], false, true);
        let vertices = vec![vertex(Vec3::ZERO); 5];
        let packed = pack_mesh_buffer(&vertices, &[0, 1, 2], &plan, Mat4::IDENTITY, &[]);
        assert_eq!(packed.index_byte_offset, 5 * 12);
        assert_eq!(packed.data.len(), 5 * 12 + 3 * 2);
        assert_eq!(packed.stride, 12);
    }

    #[test]
    fn test_position_z_negated_through_master_rotation() {
        let l = layout(&[(LayoutSemantic::Position, 12)]);
        let plan = plan_vertex_layout(&[&l], false, true);
        let vertices = vec![vertex(Vec3::new(1.0, 2.0, 3.0))];
        let packed = pack_mesh_buffer(&vertices, &[], &plan, Mat4::IDENTITY, &[]);
        let floats: &[f32] = bytemuck::cast_slice(&packed.data[..12]);
        assert_eq!(floats, &[1.0, 2.0, -3.0]);
    }

    #[test]
    fn test_normal_renormalized_after_rotation() {
        let l = layout(&[(LayoutSemantic::Position, 12), (LayoutSemantic::Normal, 12)]);
        let plan = plan_vertex_layout(&[&l], false, true);
        let mut v = vertex(Vec3::ZERO);
        v.normal = Vec3::new(0.0, 2.0, 0.0);
        let packed = pack_mesh_buffer(&[v], &[], &plan, Mat4::IDENTITY, &[]);
        let floats: &[f32] = bytemuck::cast_slice(&packed.data[12..24]);
        assert_eq!(floats, &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_zero_length_normal_stays_zero() {
        let l = layout(&[(LayoutSemantic::Position, 12), (LayoutSemantic::Normal, 12)]);
        let plan = plan_vertex_layout(&[&l], false, true);
        let mut v = vertex(Vec3::ZERO);
        v.normal = Vec3::ZERO;
        let packed = pack_mesh_buffer(&[v], &[], &plan, Mat4::IDENTITY, &[]);
        let floats: &[f32] = bytemuck::cast_slice(&packed.data[12..24]);
        assert_eq!(floats, &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_color_and_uv_channels_get_defaults() {
        let l = layout(&[
            (LayoutSemantic::Position, 12),
            (LayoutSemantic::VertexColor, 16),
            (LayoutSemantic::Uv, 8),
        ]);
        let plan = plan_vertex_layout(&[&l], false, true);
        // Vertex carries no color/uv data despite the declared layout.
        let packed = pack_mesh_buffer(&[vertex(Vec3::ZERO)], &[], &plan, Mat4::IDENTITY, &[]);
        let color: &[f32] = bytemuck::cast_slice(&packed.data[12..28]);
        assert_eq!(color, &[1.0, 1.0, 1.0, 1.0]);
        let uv: &[f32] = bytemuck::cast_slice(&packed.data[28..36]);
        assert_eq!(uv, &[0.0, 0.0]);
    }

    #[test]
    fn test_weight_renormalization() {
        assert_eq!(
            normalize_weights([1.0, 1.0, 1.0, 1.0]),
            [0.25, 0.25, 0.25, 0.25]
        );
        assert_eq!(normalize_weights([2.0, 0.0, 0.0, 0.0]), [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_zero_weights_bind_to_first_joint() {
        assert_eq!(normalize_weights([0.0; 4]), [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_joint_remap_with_sentinel() {
        // Global bone 0 is "unbound" and never searched for.
        let joint_order = [7i16, 3, 12];
        assert_eq!(remap_joints([3, 12, 0, 7], &joint_order), [1, 2, 0, 0]);
    }

    #[test]
    fn test_joint_remap_miss_falls_back_to_zero() {
        let joint_order = [7i16];
        assert_eq!(remap_joints([42, 0, 0, 0], &joint_order), [0, 0, 0, 0]);
    }

    #[test]
    fn test_skinned_vertex_region_layout() {
        let l = layout(&[
            (LayoutSemantic::Position, 12),
            (LayoutSemantic::BoneIndices, 8),
        ]);
        let plan = plan_vertex_layout(&[&l], true, true);
        let mut v = vertex(Vec3::ZERO);
        v.bone_indices = [3, 0, 0, 0];
        v.bone_weights = [1.0, 0.0, 0.0, 0.0];
        let packed = pack_mesh_buffer(&[v], &[0], &plan, Mat4::IDENTITY, &[5, 3]);
        // 12 position + 8 joints + 16 weights per vertex.
        assert_eq!(packed.stride, 36);
        let joints: &[u16] = bytemuck::cast_slice(&packed.data[12..20]);
        assert_eq!(joints, &[1, 0, 0, 0]);
        let weights: &[f32] = bytemuck::cast_slice(&packed.data[20..36]);
        assert_eq!(weights, &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_single_joint_placeholder_uses_normal_w() {
        let l = layout(&[(LayoutSemantic::Position, 12)]);
        let plan = plan_vertex_layout(&[&l], true, false);
        let mut v = vertex(Vec3::ZERO);
        v.normal_w = 4;
        let packed = pack_mesh_buffer(&[v], &[], &plan, Mat4::IDENTITY, &[]);
        let joints: &[u16] = bytemuck::cast_slice(&packed.data[12..20]);
        assert_eq!(joints, &[4, 0, 0, 0]);
        let weights: &[f32] = bytemuck::cast_slice(&packed.data[20..36]);
        assert_eq!(weights, &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_small_mesh_uses_u16_indices() {
        let l = layout(&[(LayoutSemantic::Position, 12)]);
        let plan = plan_vertex_layout(&[&l], false, true);
        let vertices = vec![vertex(Vec3::ZERO); 100];
        let packed = pack_mesh_buffer(&vertices, &[0, 1, 99], &plan, Mat4::IDENTITY, &[]);
        assert_eq!(packed.index_format, IndexFormat::U16);
        assert_eq!(packed.data.len() - packed.index_byte_offset, 3 * 2);
    }

    #[test]
    fn test_large_mesh_uses_u32_indices() {
        let l = layout(&[(LayoutSemantic::Position, 12)]);
        let plan = plan_vertex_layout(&[&l], false, true);
        let vertices = vec![vertex(Vec3::ZERO); 70_000];
        let packed = pack_mesh_buffer(&vertices, &[0, 69_999], &plan, Mat4::IDENTITY, &[]);
        assert_eq!(packed.index_format, IndexFormat::U32);
        assert_eq!(packed.data.len() - packed.index_byte_offset, 2 * 4);
    }
}
