//! Scene composition.
//!
//! Joins the reconciled node tree, the reference pose, the packed mesh
//! buffers, and the decoded animations into one export-ready scene in the
//! output coordinate convention (right-handed, Z negated relative to the
//! source).

use anyhow::{Context, Result};
use glam::{Mat4, Quat, Vec3};
use tracing::{error, info, warn};

use crate::animation::{DecodedAnimation, SplineCompressedAnimation};
use crate::error::ConvertError;
use crate::flver::{BufferLayout, Flver, NO_NODE};
use crate::mesh::layout::{plan_vertex_layout, LAYOUT_JOINTS, LAYOUT_SINGLE_JOINT};
use crate::mesh::packing::{pack_mesh_buffer, PackedMeshBuffer};
use crate::mesh::VertexLayoutPlan;
use crate::skeleton::{reconcile, HkaSkeleton, TreeNode};

/// Conventional name of the skeleton root; matched case-insensitively.
pub const MASTER_BONE_NAME: &str = "Master";

/// A composed scene, ready for glTF serialization.
#[derive(Debug, Clone)]
pub struct ExportScene {
    pub name: String,
    pub nodes: Vec<SceneNode>,
    pub roots: Vec<usize>,
    pub meshes: Vec<SceneMesh>,
    pub skin: Option<SkinBinding>,
    pub animations: Vec<DecodedAnimation>,
}

/// A scene node with decomposed local transform.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub children: Vec<usize>,
    pub mesh: Option<usize>,
    /// True when the node's mesh deforms through the skin.
    pub skinned: bool,
}

#[derive(Debug, Clone)]
pub struct SceneMesh {
    pub name: String,
    pub primitives: Vec<ScenePrimitive>,
}

#[derive(Debug, Clone)]
pub struct ScenePrimitive {
    pub plan: VertexLayoutPlan,
    pub buffer: PackedMeshBuffer,
    pub topology: Topology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    TriangleList,
    TriangleStrip,
}

/// The skin: joint nodes in traversal order plus the skeleton root.
#[derive(Debug, Clone)]
pub struct SkinBinding {
    pub joints: Vec<usize>,
    pub skeleton_root: usize,
}

/// One model's inputs for batch conversion.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub name: String,
    pub flver: Flver,
    pub skeleton: Option<HkaSkeleton>,
    pub animations: Vec<SplineCompressedAnimation>,
}

// ---------------------------------------------------------------------------
// Transform conversion
// ---------------------------------------------------------------------------

/// Local rotation of a node, from the source's Euler triple.
pub fn euler_rotation(r: Vec3) -> Mat4 {
    Mat4::from_rotation_y(-r.y) * Mat4::from_rotation_z(r.z) * Mat4::from_rotation_x(-r.x)
}

/// Rotation baked into every vertex: the root node's orientation without
/// the handedness sign flips, so geometry and hierarchy stay aligned.
pub fn master_rotation_matrix(r: Vec3) -> Mat4 {
    Mat4::from_rotation_y(r.y) * Mat4::from_rotation_z(r.z) * Mat4::from_rotation_x(r.x)
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Composes one model (plus optional skeleton and animations) into a scene.
pub fn compose_scene(
    name: &str,
    flver: &Flver,
    skeleton: Option<&HkaSkeleton>,
    animations: &[SplineCompressedAnimation],
) -> Result<ExportScene> {
    let tree = reconcile(flver, skeleton).context("hierarchy reconciliation failed")?;
    let skinned = skeleton.is_some();

    let master_tree = tree.find_named_ci(MASTER_BONE_NAME);
    if skinned && master_tree.is_none() {
        return Err(ConvertError::MissingRootNode(MASTER_BONE_NAME.to_string()).into());
    }

    let master_rotation = master_tree
        .and_then(|m| tree.nodes[m].flver_node)
        .map(|f| master_rotation_matrix(flver.nodes[f].rotation))
        .unwrap_or(Mat4::IDENTITY);

    // Membership in the master subtree decides which nodes join the skin.
    let mut under_master = vec![false; tree.nodes.len()];
    if let Some(m) = master_tree {
        let mut stack = vec![m];
        while let Some(i) = stack.pop() {
            under_master[i] = true;
            stack.extend(&tree.nodes[i].children);
        }
    }

    let mut nodes: Vec<SceneNode> = Vec::with_capacity(tree.nodes.len());
    let mut tree_to_scene = vec![usize::MAX; tree.nodes.len()];
    let mut joints = Vec::new();
    // Global source node index per joint, for vertex bone-index remapping.
    // Skeleton-only bones have no source node and never match a vertex.
    let mut joint_order: Vec<i16> = Vec::new();

    for root in tree.roots() {
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            let tnode = &tree.nodes[i];
            let (translation, rotation, scale) =
                node_transform(i, tnode, flver, skeleton, master_tree, &under_master);

            let scene_index = nodes.len();
            tree_to_scene[i] = scene_index;
            nodes.push(SceneNode {
                name: tnode.name.clone(),
                translation,
                rotation,
                scale,
                children: Vec::new(),
                mesh: None,
                skinned: false,
            });

            if skinned && under_master[i] {
                joints.push(scene_index);
                joint_order.push(tnode.flver_node.map(|f| f as i16).unwrap_or(NO_NODE));
            }

            for &child in tnode.children.iter().rev() {
                stack.push(child);
            }
        }
    }

    for (i, tnode) in tree.nodes.iter().enumerate() {
        nodes[tree_to_scene[i]].children =
            tnode.children.iter().map(|&c| tree_to_scene[c]).collect();
    }
    let mut roots: Vec<usize> = tree.roots().map(|r| tree_to_scene[r]).collect();

    let mut meshes = Vec::new();
    for (mi, mesh) in flver.meshes.iter().enumerate() {
        let owner = mesh.node_index;
        if owner >= flver.nodes.len() {
            return Err(ConvertError::InvalidMeshNode {
                mesh: mi,
                index: owner,
                len: flver.nodes.len(),
            }
            .into());
        }
        let layouts: Vec<&BufferLayout> = mesh
            .layout_indices
            .iter()
            .map(|&l| {
                flver
                    .buffer_layouts
                    .get(l)
                    .ok_or(ConvertError::InvalidLayoutIndex {
                        mesh: mi,
                        index: l,
                        len: flver.buffer_layouts.len(),
                    })
            })
            .collect::<Result<_, _>>()?;
        let plan = plan_vertex_layout(&layouts, skinned, mesh.use_bone_weights);
        let uses_skin = plan.has(LAYOUT_JOINTS) || plan.has(LAYOUT_SINGLE_JOINT);

        let face_set = mesh
            .primary_face_set()
            .with_context(|| format!("mesh {mi} of '{name}' has no face sets"))?;
        let topology = if face_set.triangle_strip {
            Topology::TriangleStrip
        } else {
            Topology::TriangleList
        };
        let buffer = pack_mesh_buffer(
            &mesh.vertices,
            &face_set.indices,
            &plan,
            master_rotation,
            &joint_order,
        );

        let owner_name = tree.nodes[owner].name.clone();
        let mesh_index = meshes.len();
        meshes.push(SceneMesh {
            name: owner_name.clone(),
            primitives: vec![ScenePrimitive {
                plan,
                buffer,
                topology,
            }],
        });

        if skinned && under_master[owner] {
            // Geometry owned by a joint must not inherit the joint's
            // transform twice; it moves to its own root, driven by the skin.
            let detached = nodes.len();
            nodes.push(SceneNode {
                name: format!("{owner_name}_mesh"),
                translation: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
                children: Vec::new(),
                mesh: Some(mesh_index),
                skinned: uses_skin,
            });
            roots.push(detached);
        } else {
            // Geometry is baked into output space; the owning node's source
            // transform must not apply on top of it.
            let node = &mut nodes[tree_to_scene[owner]];
            node.translation = Vec3::ZERO;
            node.rotation = Quat::IDENTITY;
            node.scale = Vec3::ONE;
            node.mesh = Some(mesh_index);
            node.skinned = uses_skin;
        }
    }

    let skin = match (skinned, master_tree) {
        (true, Some(m)) if !joints.is_empty() => Some(SkinBinding {
            joints,
            skeleton_root: tree_to_scene[m],
        }),
        _ => None,
    };

    let mut decoded = Vec::new();
    for anim in animations {
        match anim.decode() {
            Ok(blocks) => decoded.push(DecodedAnimation {
                name: anim.name.clone(),
                num_frames: anim.num_frames,
                frame_duration: anim.frame_duration as f32,
                blocks,
            }),
            Err(err) => warn!(animation = %anim.name, %err, "skipping undecodable animation"),
        }
    }

    info!(
        model = name,
        nodes = nodes.len(),
        meshes = meshes.len(),
        animations = decoded.len(),
        "composed scene"
    );

    Ok(ExportScene {
        name: name.to_string(),
        nodes,
        roots,
        meshes,
        skin,
        animations: decoded,
    })
}

fn node_transform(
    index: usize,
    tnode: &TreeNode,
    flver: &Flver,
    skeleton: Option<&HkaSkeleton>,
    master_tree: Option<usize>,
    under_master: &[bool],
) -> (Vec3, Quat, Vec3) {
    if Some(index) == master_tree {
        // The master's translation and scale are already baked into the
        // vertices; only its orientation remains on the node.
        let rotation = tnode
            .flver_node
            .map(|f| Quat::from_mat4(&euler_rotation(flver.nodes[f].rotation)))
            .unwrap_or(Quat::IDENTITY);
        return (Vec3::ZERO, rotation, Vec3::ONE);
    }

    if under_master[index] {
        if let Some(pose) = skeleton.and_then(|s| tnode.bone.and_then(|b| s.reference_pose.get(b)))
        {
            let t = pose.translation;
            let q = pose.rotation;
            return (
                Vec3::new(t.x, t.y, -t.z),
                Quat::from_xyzw(-q.x, -q.y, q.z, q.w),
                pose.scale,
            );
        }
    }

    if let Some(f) = tnode.flver_node {
        // The factors are kept separate; a composed matrix with non-uniform
        // scale under rotation has no exact TRS decomposition.
        let n = &flver.nodes[f];
        return (
            Vec3::new(n.translation.x, n.translation.y, -n.translation.z),
            Quat::from_mat4(&euler_rotation(n.rotation)),
            n.scale,
        );
    }

    (Vec3::ZERO, Quat::IDENTITY, Vec3::ONE)
}

/// Converts a batch of models, skipping any that fail.
pub fn convert_batch(models: &[ModelInput]) -> Vec<ExportScene> {
    let mut scenes = Vec::with_capacity(models.len());
    for model in models {
        match compose_scene(
            &model.name,
            &model.flver,
            model.skeleton.as_ref(),
            &model.animations,
        ) {
            Ok(scene) => scenes.push(scene),
            Err(err) => error!(model = %model.name, err = %format!("{err:#}"), "conversion failed"),
        }
    }
    scenes
}
