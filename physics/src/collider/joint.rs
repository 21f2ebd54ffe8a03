use super::ColliderId;
use crate::{
    body::PhysicsBody,
    config::PhysicsConfig,
    constraint::{BodyRef, ColliderConstraint, ConstraintDef},
    dynamics::DynamicsWorld,
    math::Vec3,
};

/// What the second end of a collider joint is anchored to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JointTarget {
    World,
    /// Body of another collider; `bone: None` picks its simple or root bone body.
    Collider { id: ColliderId, bone: Option<usize> },
}

/// A joint from one of the owner's bodies to the world or to another collider.
pub struct ColliderJoint {
    constraint: ColliderConstraint,
    /// Owner bone the joint starts on; `None` for the simple or root bone body.
    bone: Option<usize>,
    target: JointTarget,
}

impl ColliderJoint {
    pub fn new(def: ConstraintDef, bone: Option<usize>, target: JointTarget, config: &PhysicsConfig) -> Self {
        Self {
            constraint: ColliderConstraint::new(def, config),
            bone,
            target,
        }
    }

    #[inline]
    pub fn constraint(&self) -> &ColliderConstraint {
        &self.constraint
    }
    #[inline]
    pub fn constraint_mut(&mut self) -> &mut ColliderConstraint {
        &mut self.constraint
    }
    #[inline]
    pub fn bone(&self) -> Option<usize> {
        self.bone
    }
    #[inline]
    pub fn target(&self) -> JointTarget {
        self.target
    }

    /// Point both ends at their current bodies and refresh friction motors.
    ///
    /// A collider target whose body is missing keeps the joint dormant instead of
    /// anchoring it to the world.
    pub(crate) fn prepare_for_step(
        &mut self,
        dynamics: &mut DynamicsWorld,
        first: (Option<&PhysicsBody>, Vec3),
        second: (Option<&PhysicsBody>, Vec3),
        dt: f32,
    ) {
        let declared = matches!(self.target, JointTarget::Collider { .. });
        self.constraint.set_first_body(dynamics, first.0.and_then(BodyRef::of));
        self.constraint
            .set_second_body(dynamics, second.0.and_then(BodyRef::of), declared);
        self.constraint.set_first_offset(dynamics, first.1);
        self.constraint.set_second_offset(dynamics, second.1);
        self.constraint.prepare_for_step(dynamics, first.0, second.0, dt);
    }
}
