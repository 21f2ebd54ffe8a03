/*!
What a collider simulates: nothing, one simple body, or per-bone bodies.

Shared by every collider variant. Rig and component colliders pass their animated
[`Component`] (if any) so bones follow and write back the skeleton; volume colliders
always pass `None`.
*/

use std::sync::Arc;

use super::{
    ColliderId,
    bones::{BrokenConstraint, ColliderBones},
    simple::{SimpleBody, simple_response},
    state::ColliderState,
};
use crate::{
    body::{PhysicsBody, ResponseType},
    collision::{broad::SceneEntry, volume::ExtentBox},
    config::PhysicsConfig,
    debug_drawer::DebugDrawer,
    dynamics::DynamicsWorld,
    error::Result,
    force_field::{Fluctuation, ForceField},
    math::{DVec3, Vec3},
    rig::{Component, Rig},
    shape::Shape,
};

#[derive(Default)]
pub enum ColliderBody {
    #[default]
    None,
    Simple(SimpleBody),
    Bones(ColliderBones),
}

impl ColliderBody {
    /// Single body carrying `shapes`, placed on `offset`.
    pub fn for_shapes(
        owner: ColliderId,
        shapes: Vec<Shape>,
        offset: Vec3,
        state: &mut ColliderState,
        config: &PhysicsConfig,
    ) -> Result<Self> {
        let (response, kinematic) = simple_response(state.response_type(), config.use_fake_dynamics);
        state.use_kinematic_simulation = kinematic;
        Ok(Self::Simple(SimpleBody::new(owner, shapes, offset, state, response)?))
    }

    /// Body layout for a rig.
    ///
    /// Rig level shapes win over bone shapes; a rig with neither simulates nothing.
    pub fn for_rig(
        owner: ColliderId,
        rig: Option<&Arc<Rig>>,
        state: &mut ColliderState,
        component: Option<&Component>,
        config: &PhysicsConfig,
    ) -> Result<Self> {
        let Some(rig) = rig else {
            state.use_kinematic_simulation = false;
            return Ok(Self::None);
        };
        if !rig.shapes().is_empty() {
            return Self::for_shapes(owner, rig.shapes().to_vec(), rig.central_mass_point(), state, config);
        }
        state.use_kinematic_simulation = false;
        if rig.bones().iter().all(|b| b.shapes.is_empty()) {
            return Ok(Self::None);
        }
        Ok(Self::Bones(ColliderBones::new(owner, Arc::clone(rig), state, component, config)?))
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn simple(&self) -> Option<&SimpleBody> {
        match self {
            Self::Simple(simple) => Some(simple),
            _ => None,
        }
    }

    pub fn bones(&self) -> Option<&ColliderBones> {
        match self {
            Self::Bones(bones) => Some(bones),
            _ => None,
        }
    }

    pub fn bones_mut(&mut self) -> Option<&mut ColliderBones> {
        match self {
            Self::Bones(bones) => Some(bones),
            _ => None,
        }
    }

    /// Body of `bone`, or the simple body (root bone body for bones) when `bone` is `None`.
    pub fn body(&self, bone: Option<usize>) -> Option<&PhysicsBody> {
        match (self, bone) {
            (Self::Simple(simple), None) => Some(simple.body()),
            (Self::Bones(bones), Some(index)) => bones.bone(index).ok()?.body(),
            (Self::Bones(bones), None) => bones.bone(bones.root_bone()?).ok()?.body(),
            _ => None,
        }
    }

    /// Central mass point of [`ColliderBody::body`], the joint offset of that body.
    pub fn body_offset(&self, bone: Option<usize>) -> Vec3 {
        match (self, bone) {
            (Self::Simple(simple), None) => simple.offset(),
            (Self::Bones(bones), Some(index)) => bones.bone(index).map_or(Vec3::zeros(), |b| b.offset()),
            (Self::Bones(bones), None) => bones
                .root_bone()
                .and_then(|root| bones.bone(root).ok())
                .map_or(Vec3::zeros(), |b| b.offset()),
            _ => Vec3::zeros(),
        }
    }

    fn bodies_mut(&mut self) -> Vec<&mut PhysicsBody> {
        match self {
            Self::None => Vec::new(),
            Self::Simple(simple) => vec![simple.body_mut()],
            Self::Bones(bones) => bones.bodies_mut().collect(),
        }
    }

    pub fn attach(&mut self, dynamics: &mut DynamicsWorld, state: &mut ColliderState, component: Option<&Component>) {
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.attach(dynamics),
            Self::Bones(bones) => bones.attach(dynamics, state.matrix(), component),
        }
    }

    pub fn detach(&mut self, dynamics: &mut DynamicsWorld) {
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.detach(dynamics),
            Self::Bones(bones) => bones.detach(dynamics),
        }
    }

    /// Follow a collider pose set from outside the simulation.
    ///
    /// Animated bones pick the new pose up in the next detection; simulated bones of a
    /// dynamic collider are moved along.
    pub fn pose_changed(&mut self, state: &mut ColliderState, component: Option<&Component>) {
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.sync_pose(state),
            Self::Bones(bones) => {
                if state.response_type() == ResponseType::Dynamic {
                    bones.teleport(state.matrix(), component);
                }
            }
        }
    }

    pub fn velocity_changed(&mut self, state: &ColliderState) {
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.sync_velocities(state),
            Self::Bones(bones) => {
                bones.set_linear_velocity(state.linear_velocity());
                bones.set_angular_velocity(state.angular_velocity());
            }
        }
    }

    pub fn gravity_changed(&mut self, gravity: Vec3) {
        for body in self.bodies_mut() {
            body.set_gravity(gravity);
        }
    }

    pub fn enabled_changed(&mut self, dynamics: &mut DynamicsWorld, enabled: bool) {
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.body_mut().set_enabled(enabled),
            Self::Bones(bones) => bones.set_enabled(dynamics, enabled),
        }
    }

    /// Bone bodies keep their rig masses; only a simple body follows the collider mass.
    pub fn mass_changed(&mut self, mass: f32) {
        if let Self::Simple(simple) = self {
            simple.body_mut().set_mass(mass);
        }
    }

    pub fn response_type_changed(&mut self, state: &mut ColliderState, config: &PhysicsConfig) {
        match self {
            Self::None => state.use_kinematic_simulation = false,
            Self::Simple(simple) => {
                let (response, kinematic) = simple_response(state.response_type(), config.use_fake_dynamics);
                simple.body_mut().set_response_type(response);
                state.use_kinematic_simulation = kinematic;
            }
            Self::Bones(bones) => {
                state.use_kinematic_simulation = false;
                if let Err(err) = bones.update_physics_type(state.response_type(), None) {
                    log::warn!("bone response type not applied: {err}");
                }
            }
        }
    }

    /// Estimate animated bone velocities and refresh collision volumes.
    pub fn prepare_for_detection(&mut self, state: &mut ColliderState, component: Option<&Component>, elapsed: f32) {
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.update_shapes(state),
            Self::Bones(bones) => {
                let dynamic = state.response_type() == ResponseType::Dynamic;
                let matrix = *state.matrix();
                bones.prepare_for_detection(&matrix, component, elapsed, dynamic);
                bones.update_shapes(&matrix, component);
            }
        }
    }

    pub fn apply_force_field(&mut self, field: &ForceField, state: &ColliderState, fluctuation: &Fluctuation) {
        let factors = state.force_field_factors();
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.apply_force_field(field, &factors, fluctuation),
            Self::Bones(bones) => bones.apply_force_field(field, &factors, fluctuation),
        }
    }

    /// Wake changed bodies, push body state into the backend and refresh joint motors.
    ///
    /// Bodies go first: recreating a backend body removes the joints attached to it.
    pub fn prepare_for_step(&mut self, dynamics: &mut DynamicsWorld, dt: f32) {
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.body_mut().prepare_for_step(dynamics),
            Self::Bones(bones) => {
                bones.activate_dirty_physics_bodies(dynamics);
                bones.prepare_bodies_for_step(dynamics);
                bones.prepare_constraints_for_step(dynamics, dt);
            }
        }
    }

    pub fn update_from_body(
        &mut self,
        dynamics: &DynamicsWorld,
        state: &mut ColliderState,
        component: Option<&mut Component>,
    ) -> bool {
        match self {
            Self::None => false,
            Self::Simple(simple) => simple.update_from_body(dynamics, state),
            Self::Bones(bones) => bones.update_from_body(dynamics, state, component),
        }
    }

    pub fn check_constraints_broke(&mut self, dynamics: &DynamicsWorld) -> Vec<BrokenConstraint> {
        match self {
            Self::Bones(bones) => bones.check_constraints_broke(dynamics),
            _ => Vec::new(),
        }
    }

    pub fn point_inside(&self, point: &DVec3) -> bool {
        match self {
            Self::None => false,
            Self::Simple(simple) => simple.point_inside(point),
            Self::Bones(bones) => bones.point_inside(point),
        }
    }

    pub fn calc_shape_extends(&self) -> Option<ExtentBox> {
        match self {
            Self::None => None,
            Self::Simple(simple) => simple.calc_shape_extends(),
            Self::Bones(bones) => bones.calc_shape_extends(),
        }
    }

    pub fn scene_entries(&self, state: &ColliderState) -> Vec<SceneEntry> {
        let filter = *state.collision_filter();
        match self {
            Self::None => Vec::new(),
            Self::Simple(simple) => simple.scene_entry(filter).into_iter().collect(),
            Self::Bones(bones) => bones.scene_entries(filter),
        }
    }

    pub fn publish_debug(&self, drawer: &mut DebugDrawer) {
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.publish_debug(drawer),
            Self::Bones(bones) => bones.publish_debug(drawer),
        }
    }

    /// Force at the center of mass. Bones share it by mass.
    pub fn apply_force(&mut self, force: Vec3, point: Option<DVec3>) {
        match (self, point) {
            (Self::None, _) => {}
            (Self::Simple(simple), None) => simple.body_mut().apply_force(force),
            (Self::Simple(simple), Some(point)) => simple.body_mut().apply_force_at(force, point),
            (Self::Bones(bones), None) => bones.apply_force(force),
            (Self::Bones(bones), Some(point)) => bones.apply_force_at(force, point),
        }
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, point: Option<DVec3>) {
        match (self, point) {
            (Self::None, _) => {}
            (Self::Simple(simple), None) => simple.body_mut().apply_impulse(impulse),
            (Self::Simple(simple), Some(point)) => simple.body_mut().apply_impulse_at(impulse, point),
            (Self::Bones(bones), None) => bones.apply_impulse(impulse),
            (Self::Bones(bones), Some(point)) => bones.apply_impulse_at(impulse, point),
        }
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.body_mut().apply_torque(torque),
            Self::Bones(bones) => bones.apply_torque(torque),
        }
    }

    pub fn apply_torque_impulse(&mut self, torque: Vec3) {
        match self {
            Self::None => {}
            Self::Simple(simple) => simple.body_mut().apply_torque_impulse(torque),
            Self::Bones(bones) => bones.apply_torque_impulse(torque),
        }
    }
}
