//! Flat skeleton structures and hierarchy reconciliation.
//!
//! A skeleton arrives as a flat bone list plus a parallel parent-index array.
//! Parent indices are NOT guaranteed to point backwards: a parent may appear
//! after its children, so reconciliation never relies on array order beyond
//! the convention that index 0 is the root.

use glam::{Quat, Vec3};
use hashbrown::HashMap;

use crate::error::ConvertError;
use crate::flver::{Flver, NO_NODE};

/// A bone in the flat skeleton.
#[derive(Debug, Clone)]
pub struct HkaBone {
    pub name: String,
    pub lock_translation: bool,
}

/// Reference-pose transform for one bone, rotation as a quaternion.
#[derive(Debug, Clone, Copy)]
pub struct BonePose {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// A decoded skeleton: bones, parent indices, and the reference pose,
/// all parallel arrays.
#[derive(Debug, Clone, Default)]
pub struct HkaSkeleton {
    pub name: String,
    pub bones: Vec<HkaBone>,
    pub parent_indices: Vec<i16>,
    pub reference_pose: Vec<BonePose>,
}

/// One node of the reconciled tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    /// Index into the source model's node list, when the node came from it.
    pub flver_node: Option<usize>,
    /// Index into the skeleton's bone list, when the node is a bone.
    pub bone: Option<usize>,
    pub parent: Option<usize>,
    /// Child indices in insertion order.
    pub children: Vec<usize>,
}

/// The reconciled node tree.
///
/// Built fresh on every conversion run: an owning arena with index links,
/// never mutated incrementally across runs. The first `flver.nodes.len()`
/// entries correspond one-to-one with the source node list; bones that only
/// exist in the skeleton are appended after them.
#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    pub nodes: Vec<TreeNode>,
}

impl NodeTree {
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| i)
    }

    /// Case-insensitive lookup, used for the conventional root bone name.
    pub fn find_named_ci(&self, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.name.eq_ignore_ascii_case(name))
    }
}

/// Merges a model's node list with a skeleton's bone hierarchy into one tree.
///
/// The arena is seeded from the model nodes (children in node-array order).
/// Every node matching a skeleton bone by name is then detached and
/// re-attached according to the skeleton's parent indices, in bone-array
/// order. Children are appended at the end of their parent's child list, so
/// bones declared at array indices `i1 < i2 < i3` under the same parent keep
/// that sibling order.
pub fn reconcile(flver: &Flver, skeleton: Option<&HkaSkeleton>) -> Result<NodeTree, ConvertError> {
    let mut tree = NodeTree {
        nodes: flver
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| TreeNode {
                name: n.name.clone(),
                flver_node: Some(i),
                bone: None,
                parent: None,
                children: Vec::new(),
            })
            .collect(),
    };

    // Seed adjacency from the model's parent indices.
    for (i, node) in flver.nodes.iter().enumerate() {
        if node.parent_index == NO_NODE {
            continue;
        }
        let parent = node.parent_index as usize;
        if node.parent_index < 0 || parent >= tree.nodes.len() {
            return Err(ConvertError::InvalidParentIndex {
                name: node.name.clone(),
                index: node.parent_index,
                len: tree.nodes.len(),
            });
        }
        tree.nodes[i].parent = Some(parent);
        tree.nodes[parent].children.push(i);
    }

    if let Some(skeleton) = skeleton {
        apply_skeleton(&mut tree, skeleton)?;
    }

    validate_acyclic(&tree)?;

    Ok(tree)
}

fn apply_skeleton(tree: &mut NodeTree, skeleton: &HkaSkeleton) -> Result<(), ConvertError> {
    if skeleton.parent_indices.len() < skeleton.bones.len() {
        return Err(ConvertError::ParentIndexMismatch {
            bones: skeleton.bones.len(),
            parents: skeleton.parent_indices.len(),
        });
    }

    let mut by_name: HashMap<String, usize> = HashMap::new();
    for (i, node) in tree.nodes.iter().enumerate() {
        by_name.entry(node.name.clone()).or_insert(i);
    }

    // Locate-or-create every bone first, so parents that appear after their
    // children in the bone array still resolve.
    let mut bone_nodes = Vec::with_capacity(skeleton.bones.len());
    for (b, bone) in skeleton.bones.iter().enumerate() {
        let existing = by_name.get(&bone.name).copied().or_else(|| {
            // The implicit root name matches case-insensitively across sources.
            if b == 0 {
                tree.find_named_ci(&bone.name)
            } else {
                None
            }
        });

        let idx = match existing {
            Some(idx) => idx,
            None => {
                tree.nodes.push(TreeNode {
                    name: bone.name.clone(),
                    flver_node: None,
                    bone: None,
                    parent: None,
                    children: Vec::new(),
                });
                let idx = tree.nodes.len() - 1;
                by_name.insert(bone.name.clone(), idx);
                idx
            }
        };
        tree.nodes[idx].bone = Some(b);
        bone_nodes.push(idx);
    }

    // Detach every involved node before rebuilding, so a skeleton source and
    // a geometry source with overlapping bone sets merge cleanly.
    for &idx in &bone_nodes {
        if let Some(parent) = tree.nodes[idx].parent.take() {
            tree.nodes[parent].children.retain(|&c| c != idx);
        }
    }

    // Re-attach in bone-array order; index 0 is the implicit root.
    for (b, &idx) in bone_nodes.iter().enumerate().skip(1) {
        let parent_index = skeleton.parent_indices[b];
        if parent_index < 0 || parent_index as usize >= skeleton.bones.len() {
            return Err(ConvertError::MissingParentBone {
                bone: skeleton.bones[b].name.clone(),
                index: parent_index,
                len: skeleton.bones.len(),
            });
        }
        let parent = bone_nodes[parent_index as usize];
        tree.nodes[idx].parent = Some(parent);
        tree.nodes[parent].children.push(idx);
    }

    Ok(())
}

/// Every parent chain must terminate at a root within node-count steps.
fn validate_acyclic(tree: &NodeTree) -> Result<(), ConvertError> {
    for (i, node) in tree.nodes.iter().enumerate() {
        let mut current = i;
        let mut steps = 0;
        while let Some(parent) = tree.nodes[current].parent {
            current = parent;
            steps += 1;
            if steps > tree.nodes.len() {
                return Err(ConvertError::CyclicHierarchy(node.name.clone()));
            }
        }
    }
    Ok(())
}
