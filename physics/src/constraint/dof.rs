use rapier3d::prelude::JointAxis;

use crate::{
    collision::settings::{AXIS_EPS, SPRING_EPS},
    math::{Iso, Vec3},
};

/// One degree of freedom of a constraint. Angles are in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConstraintDof {
    pub lower: f32,
    pub upper: f32,
    pub spring_stiffness: f32,
    pub static_friction: f32,
    pub kinematic_friction: f32,
}

/// How an axis is restricted, derived from its limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DofState {
    Locked,
    Limited,
    /// `lower > upper`: the axis moves without limits.
    Free,
}

impl ConstraintDof {
    pub fn locked() -> Self {
        Self::default()
    }

    pub fn limited(lower: f32, upper: f32) -> Self {
        Self {
            lower,
            upper,
            ..Self::default()
        }
    }

    pub fn free() -> Self {
        Self {
            lower: 1.0,
            upper: -1.0,
            ..Self::default()
        }
    }

    pub fn state(&self) -> DofState {
        if self.upper - self.lower > AXIS_EPS {
            DofState::Limited
        } else if self.lower - self.upper > AXIS_EPS {
            DofState::Free
        } else {
            DofState::Locked
        }
    }

    #[inline]
    pub fn has_spring(&self) -> bool {
        self.spring_stiffness > SPRING_EPS
    }

    #[inline]
    pub fn has_friction(&self) -> bool {
        self.static_friction > AXIS_EPS || self.kinematic_friction > AXIS_EPS
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DofAxis {
    LinearX,
    LinearY,
    LinearZ,
    AngularX,
    AngularY,
    AngularZ,
}

impl DofAxis {
    pub const ALL: [DofAxis; 6] = [
        DofAxis::LinearX,
        DofAxis::LinearY,
        DofAxis::LinearZ,
        DofAxis::AngularX,
        DofAxis::AngularY,
        DofAxis::AngularZ,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn is_linear(self) -> bool {
        self.index() < 3
    }

    /// Unit direction of the axis in its constraint frame.
    pub fn direction(self) -> Vec3 {
        match self.index() % 3 {
            0 => Vec3::x(),
            1 => Vec3::y(),
            _ => Vec3::z(),
        }
    }

    pub fn joint_axis(self) -> JointAxis {
        match self {
            DofAxis::LinearX => JointAxis::LinX,
            DofAxis::LinearY => JointAxis::LinY,
            DofAxis::LinearZ => JointAxis::LinZ,
            DofAxis::AngularX => JointAxis::AngX,
            DofAxis::AngularY => JointAxis::AngY,
            DofAxis::AngularZ => JointAxis::AngZ,
        }
    }
}

/// Full description of a constraint between two bodies.
///
/// Frames are given relative to each body's reference point; `offset1`/`offset2` are
/// the central mass points of the bodies, subtracted to get the frame relative to the
/// backend body origin.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintDef {
    /// Linear X, Y, Z then angular X, Y, Z.
    pub dofs: [ConstraintDof; 6],
    pub damping: f32,
    pub breaking_threshold: f32,
    pub frame1: Iso,
    pub frame2: Iso,
}

impl Default for ConstraintDef {
    fn default() -> Self {
        Self {
            dofs: [ConstraintDof::locked(); 6],
            damping: 0.0,
            breaking_threshold: 0.0,
            frame1: Iso::identity(),
            frame2: Iso::identity(),
        }
    }
}

impl ConstraintDef {
    #[inline]
    pub fn dof(&self, axis: DofAxis) -> &ConstraintDof {
        &self.dofs[axis.index()]
    }

    #[inline]
    pub fn dof_mut(&mut self, axis: DofAxis) -> &mut ConstraintDof {
        &mut self.dofs[axis.index()]
    }

    pub fn with_dof(mut self, axis: DofAxis, dof: ConstraintDof) -> Self {
        self.dofs[axis.index()] = dof;
        self
    }

    /// Scale linear limits, skipping free axes.
    pub fn scale_linear_limits(&mut self, scale: &Vec3) {
        for (i, dof) in self.dofs.iter_mut().take(3).enumerate() {
            if dof.lower <= dof.upper {
                dof.lower *= scale[i];
                dof.upper *= scale[i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dof_states() {
        assert_eq!(ConstraintDof::locked().state(), DofState::Locked);
        assert_eq!(ConstraintDof::limited(-0.5, 0.5).state(), DofState::Limited);
        assert_eq!(ConstraintDof::free().state(), DofState::Free);
        assert_eq!(ConstraintDof::limited(0.2, 0.2).state(), DofState::Locked);
    }

    #[test]
    fn linear_scaling_skips_free_axes() {
        let mut def = ConstraintDef::default()
            .with_dof(DofAxis::LinearX, ConstraintDof::limited(-1.0, 1.0))
            .with_dof(DofAxis::LinearY, ConstraintDof::free());
        def.scale_linear_limits(&Vec3::new(2.0, 3.0, 4.0));

        assert_eq!(def.dof(DofAxis::LinearX).upper, 2.0);
        assert_eq!(def.dof(DofAxis::LinearY).state(), DofState::Free);
        assert_eq!(def.dof(DofAxis::LinearY).lower, 1.0);
    }
}
