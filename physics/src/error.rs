use thiserror::Error;

use crate::collider::ColliderId;

/// Errors surfaced at the physics call boundary.
///
/// Degenerate simulation state (stuck colliders, zero mass bodies) is never reported
/// here. It is recovered in place and logged.
#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    #[error("bone index {index} out of range (bone count {count})")]
    BoneIndexOutOfRange { index: usize, count: usize },

    #[error("constraint index {index} out of range (constraint count {count})")]
    ConstraintIndexOutOfRange { index: usize, count: usize },

    #[error("unknown or removed collider {0:?}")]
    UnknownCollider(ColliderId),

    #[error("shape construction failed: {0}")]
    ShapeConstruction(String),
}

pub type Result<T, E = PhysicsError> = core::result::Result<T, E>;
