//! Script-level callbacks invoked during a world step.
//!
//! Callbacks get the world back, so they may change velocities, move or remove
//! colliders. The step re-checks the collider id after every callback and abandons work
//! on colliders that were removed.

use crate::{
    collider::{BrokenConstraint, ColliderId},
    math::{DVec3, Vec3},
    world::World,
};

/// A kinematic sweep hit, handed to [`ColliderListener::collision_response`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionInfo {
    /// The moving collider, already placed at the hit.
    pub collider: ColliderId,
    pub other: ColliderId,
    /// Bone of `other` that was hit, for bone colliders.
    pub other_bone: Option<usize>,
    /// Surface normal of `other`, opposing the motion.
    pub normal: Vec3,
    /// Position of the moving collider at the hit.
    pub position: DVec3,
    /// Part of the attempted displacement left after the hit.
    pub distance: f32,
    /// Frame time left after the hit.
    pub remaining_time: f32,
}

pub trait ColliderListener {
    /// Respond to a sweep hit, typically by changing the collider's velocity.
    ///
    /// Leaving the velocity unchanged slides the collider along the surface.
    fn collision_response(&mut self, world: &mut World, info: &CollisionInfo) {
        let _ = (world, info);
    }

    /// A breakable rig constraint of a bone collider broke. Reported once per break.
    fn rig_constraint_broke(&mut self, world: &mut World, collider: ColliderId, broken: &BrokenConstraint) {
        let _ = (world, collider, broken);
    }

    /// A collider joint broke; `joint` is its index in the collider's joint list.
    fn constraint_broke(&mut self, world: &mut World, collider: ColliderId, joint: usize) {
        let _ = (world, collider, joint);
    }
}

/// Listener that ignores every callback.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoListener;

impl ColliderListener for NoListener {}
