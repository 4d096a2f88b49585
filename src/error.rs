//! Error taxonomy for conversion failures.
//!
//! Structural errors abort a single conversion run. Unsupported format
//! variants are fatal for the object being decoded only; batch processing
//! skips the object and continues.

use thiserror::Error;

use crate::animation::RotationQuantization;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// A non-root bone's declared parent cannot be resolved.
    #[error("bone '{bone}' has parent index {index}, outside the {len}-bone skeleton")]
    MissingParentBone { bone: String, index: i16, len: usize },

    /// A node's parent index points outside the node list.
    #[error("node '{name}' has parent index {index}, outside the {len}-node list")]
    InvalidParentIndex { name: String, index: i16, len: usize },

    /// The parent-index array does not cover every bone.
    #[error("skeleton has {bones} bones but only {parents} parent indices")]
    ParentIndexMismatch { bones: usize, parents: usize },

    /// Following parent links from this node never reaches a root.
    #[error("bone '{0}' is part of a parent cycle")]
    CyclicHierarchy(String),

    /// A skinned model must contain the conventional root bone.
    #[error("skinned model has no '{0}' root node")]
    MissingRootNode(String),

    /// A mesh is bound to a node outside the node list.
    #[error("mesh {mesh} is bound to node {index}, outside the {len}-node list")]
    InvalidMeshNode {
        mesh: usize,
        index: usize,
        len: usize,
    },

    /// A mesh references a buffer layout outside the declared set.
    #[error("mesh {mesh} references buffer layout {index}, outside the {len}-layout set")]
    InvalidLayoutIndex {
        mesh: usize,
        index: usize,
        len: usize,
    },

    /// A block offset points outside the compressed data region.
    #[error("animation block {block} offset {offset} is out of bounds (data length {len})")]
    MalformedBlockOffset {
        block: usize,
        offset: usize,
        len: usize,
    },

    /// The compressed stream ended mid-header or mid-run.
    #[error("animation data truncated in block {block} at byte {offset}")]
    TruncatedAnimation { block: usize, offset: usize },

    /// A block declared fewer quantized tracks than it contains sample runs.
    #[error("animation block {block} has more sample runs than declared tracks ({tracks})")]
    TrackOverrun { block: usize, tracks: usize },

    /// A recognized but undecodable rotation encoding.
    #[error("unsupported rotation quantization mode {0:?}")]
    UnsupportedRotationQuantization(RotationQuantization),

    /// Mode bits that do not name any known quantization scheme.
    #[error("unrecognized quantization mask bits {0:#04x}")]
    UnknownQuantizationMask(u8),
}
