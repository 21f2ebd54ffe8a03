use nalgebra as na;

use super::dof::{ConstraintDef, DofAxis, DofState};
use crate::{config::PhysicsConfig, math::Quat};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// All six axes locked.
    Static,
    /// One free or limited angular axis.
    Hinge,
    ConeTwist,
    /// Angular axes all free.
    BallSocket,
    Generic6Dof,
    Generic6DofSpring,
}

/// Axis permutation applied to generic joints whose single unlocked angular axis is Y.
///
/// Frame rows are `[0,0,1], [1,0,0], [0,1,0]`: the new X axis is the old Y, new Y the old
/// Z, new Z the old X.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisRemap;

impl AxisRemap {
    /// Source axis (0..3) for each remapped axis.
    pub const SOURCE: [usize; 3] = [1, 2, 0];
    /// Remapped index of each source axis (X→2, Y→0, Z→1).
    pub const TARGET: [usize; 3] = [2, 0, 1];

    pub fn rotation() -> Quat {
        let m = na::Matrix3::new(
            0.0, 0.0, 1.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0,
        );
        Quat::from_rotation_matrix(&na::Rotation3::from_matrix_unchecked(m))
    }

    /// Index of `axis` after remapping.
    pub fn map(axis: DofAxis) -> DofAxis {
        let base = if axis.is_linear() { 0 } else { 3 };
        DofAxis::ALL[base + Self::TARGET[axis.index() % 3]]
    }
}

/// Result of [`detect_constraint_type`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Detection {
    pub kind: ConstraintKind,
    pub remap: Option<AxisRemap>,
    /// Per-axis state in definition axis order, before any remap.
    pub states: [DofState; 6],
    pub linear_locked: u8,
    pub angular_locked: u8,
}

impl Detection {
    #[inline]
    pub fn state(&self, axis: DofAxis) -> DofState {
        self.states[axis.index()]
    }
}

/// Classify a constraint by its axis states.
///
/// Pure: the same definition and flags always give the same result.
pub fn detect_constraint_type(def: &ConstraintDef, config: &PhysicsConfig) -> Detection {
    let states = def.dofs.map(|d| d.state());
    let linear_locked = states[..3].iter().filter(|s| **s == DofState::Locked).count() as u8;
    let angular_locked = states[3..].iter().filter(|s| **s == DofState::Locked).count() as u8;
    let angular_free = states[3..].iter().filter(|s| **s == DofState::Free).count();

    let kind = if def.dofs.iter().any(|d| d.has_spring()) {
        ConstraintKind::Generic6DofSpring
    } else if def.dofs.iter().any(|d| d.has_friction()) {
        ConstraintKind::Generic6Dof
    } else {
        match (linear_locked, angular_locked) {
            (3, 3) => ConstraintKind::Static,
            (3, 2) if config.enable_constraint_hinge => ConstraintKind::Hinge,
            (3, 1) if angular_free == 0 && config.enable_constraint_cone_twist => {
                ConstraintKind::ConeTwist
            }
            (3, 0) if angular_free == 3 && config.enable_constraint_point2point => {
                ConstraintKind::BallSocket
            }
            (3, 0) if angular_free == 0 && config.enable_constraint_cone_twist => {
                ConstraintKind::ConeTwist
            }
            // Sliders and everything else.
            _ => ConstraintKind::Generic6Dof,
        }
    };

    let generic = matches!(
        kind,
        ConstraintKind::Generic6Dof | ConstraintKind::Generic6DofSpring
    );
    let remap = (generic
        && angular_locked == 2
        && states[DofAxis::AngularY.index()] != DofState::Locked)
        .then_some(AxisRemap);

    Detection {
        kind,
        remap,
        states,
        linear_locked,
        angular_locked,
    }
}
