//! End-to-end conversion: model plus skeleton plus animation in, composed
//! scene out.

use flver_export::flver::{FaceSet, FlverMesh, FlverNode, LayoutMember, LayoutSemantic, Vertex};
use flver_export::scene::{compose_scene, Topology};
use flver_export::skeleton::{BonePose, HkaBone, HkaSkeleton};
use flver_export::SplineCompressedAnimation;
use glam::{Quat, Vec3};

fn character_skeleton() -> HkaSkeleton {
    let bones = ["Master", "Spine", "Head"];
    HkaSkeleton {
        name: "c1000".to_string(),
        bones: bones
            .iter()
            .map(|name| HkaBone {
                name: name.to_string(),
                lock_translation: false,
            })
            .collect(),
        parent_indices: vec![-1, 0, 1],
        reference_pose: vec![
            BonePose {
                translation: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
            },
            BonePose {
                translation: Vec3::new(0.0, 1.0, 0.0),
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
            },
            BonePose {
                translation: Vec3::new(0.0, 0.5, 0.2),
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
            },
        ],
    }
}

fn character_model(vertex_count: usize) -> flver_export::Flver {
    let mut spine = FlverNode::new("Spine");
    spine.parent_index = 0;
    let mut head = FlverNode::new("Head");
    head.parent_index = 1;

    let mut vertices = Vec::with_capacity(vertex_count);
    for i in 0..vertex_count {
        vertices.push(Vertex {
            position: Vec3::new(i as f32, 0.0, 1.0),
            normal: Vec3::Y,
            ..Default::default()
        });
    }

    flver_export::Flver {
        nodes: vec![FlverNode::new("Master"), spine, head],
        meshes: vec![FlverMesh {
            node_index: 2,
            use_bone_weights: true,
            layout_indices: vec![0],
            vertices,
            face_sets: vec![
                FaceSet {
                    indices: vec![0, 1],
                    triangle_strip: true,
                },
                FaceSet {
                    indices: vec![0, 1, 2, 2, 1, 0],
                    triangle_strip: false,
                },
            ],
        }],
        buffer_layouts: vec![vec![
            LayoutMember::new(LayoutSemantic::Position, 12),
            LayoutMember::new(LayoutSemantic::Normal, 12),
        ]],
    }
}

/// Single-block animation with one Smallest3_40 identity-rotation track.
fn idle_animation() -> SplineCompressedAnimation {
    let mut data = Vec::new();
    data.extend_from_slice(&[0b0000_0100, 0, 0, 0]);
    data.extend_from_slice(&0f32.to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&2u16.to_le_bytes());
    data.extend_from_slice(&[1, 2]);
    // Identity quaternion: zero small components, W reconstructed.
    let identity40 = [0u8, 0, 0, 0, 0b1100_0000];
    data.extend_from_slice(&identity40);
    data.extend_from_slice(&identity40);

    SplineCompressedAnimation {
        name: "a00_3000".to_string(),
        num_frames: 2,
        num_blocks: 1,
        mask_and_quantization_size: 4,
        frame_duration: 1.0 / 30.0,
        block_offsets: vec![0],
        data,
        ..Default::default()
    }
}

#[test]
fn test_full_character_conversion() {
    let flver = character_model(4);
    let skeleton = character_skeleton();
    let animations = [idle_animation()];

    let scene = compose_scene("c1000", &flver, Some(&skeleton), &animations).unwrap();

    // Hierarchy: Master -> Spine -> Head, plus the detached mesh node.
    let master = scene.nodes.iter().position(|n| n.name == "Master").unwrap();
    let spine = scene.nodes.iter().position(|n| n.name == "Spine").unwrap();
    let head = scene.nodes.iter().position(|n| n.name == "Head").unwrap();
    assert_eq!(scene.nodes[master].children, vec![spine]);
    assert_eq!(scene.nodes[spine].children, vec![head]);
    assert_eq!(scene.nodes[spine].translation, Vec3::new(0.0, 1.0, 0.0));
    assert_eq!(scene.nodes[head].translation, Vec3::new(0.0, 0.5, -0.2));

    // The skin covers the whole master subtree, rooted at the master.
    let skin = scene.skin.as_ref().unwrap();
    assert_eq!(skin.skeleton_root, master);
    assert_eq!(skin.joints, vec![master, spine, head]);

    // Geometry left its joint for a detached root.
    let detached = scene
        .nodes
        .iter()
        .position(|n| n.name == "Head_mesh")
        .unwrap();
    assert!(scene.roots.contains(&detached));
    assert_eq!(scene.nodes[detached].mesh, Some(0));
    assert_eq!(scene.nodes[head].mesh, None);

    // The larger face set won; its triangle-list topology carried over.
    let primitive = &scene.meshes[0].primitives[0];
    assert_eq!(primitive.topology, Topology::TriangleList);
    assert_eq!(primitive.buffer.index_count, 6);

    // Position + normal at 12 bytes each, interleaved per vertex.
    assert_eq!(primitive.buffer.stride, 24);
    assert_eq!(primitive.buffer.index_byte_offset, 4 * 24);

    // Z negated on the way through.
    let first_vertex: &[f32] = bytemuck::cast_slice(&primitive.buffer.data[..12]);
    assert_eq!(first_vertex, &[0.0, 0.0, -1.0]);

    // The animation decoded into one block with one identity-rotation track.
    assert_eq!(scene.animations.len(), 1);
    let block = &scene.animations[0].blocks[0];
    assert_eq!(block.tracks.len(), 1);
    assert_eq!(block.tracks[0].keys.len(), 2);
    let rotation = block.tracks[0].keys[0].rotation;
    assert!(rotation.abs_diff_eq(Quat::IDENTITY, 1e-3));
}

#[test]
fn test_conversion_is_deterministic() {
    let flver = character_model(4);
    let skeleton = character_skeleton();

    let a = compose_scene("c1000", &flver, Some(&skeleton), &[]).unwrap();
    let b = compose_scene("c1000", &flver, Some(&skeleton), &[]).unwrap();

    assert_eq!(a.nodes.len(), b.nodes.len());
    for (x, y) in a.nodes.iter().zip(b.nodes.iter()) {
        assert_eq!(x.name, y.name);
        assert_eq!(x.children, y.children);
    }
    assert_eq!(
        a.meshes[0].primitives[0].buffer.data,
        b.meshes[0].primitives[0].buffer.data
    );
}
