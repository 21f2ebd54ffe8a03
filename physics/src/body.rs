/*!
Single rigid body owned by a collider or a collider bone.

The local state is authoritative between steps: setters only record the new value and
mark the body dirty. [`PhysicsBody::prepare_for_step`] pushes dirty state, accumulated
forces and per-body gravity into the backend, [`PhysicsBody::update_from_body`] pulls the
simulated result back for dynamic bodies.
*/

use rapier3d::parry::{bounding_volume::Aabb, shape::Shape as _};
use rapier3d::prelude::{
    ActiveHooks, Collider, ColliderBuilder, RigidBody, RigidBodyBuilder, Vector,
};

use crate::{
    collision::settings::{MIN_DYNAMIC_MASS, PULL_EPS},
    dynamics::{BodyKey, DynamicsWorld},
    math::{DVec3, Iso, Quat, Transform, Vec3, to_f32, vec_is_zero},
    shape::BuiltShape,
};

/// How a body takes part in the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// Never moves.
    Static,
    /// Moved externally every step, pushes dynamic bodies.
    Kinematic,
    /// Integrated by the dynamics world.
    #[default]
    Dynamic,
}

/// Velocity and mass data of a body at the start of a step, used by joint friction.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BodySnapshot {
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force: Vec3,
    pub torque: Vec3,
    pub inv_mass: f32,
    pub inv_inertia: f32,
}

pub struct PhysicsBody {
    user_data: u128,
    position: DVec3,
    orientation: Quat,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    gravity: Vec3,
    mass: f32,
    response_type: ResponseType,
    enabled: bool,
    shape: Option<BuiltShape>,

    key: Option<BodyKey>,
    state_dirty: bool,
    needs_recreate: bool,
    dirty_aabb: bool,
    last_pull: Option<(DVec3, Quat)>,

    pending_force: Vec3,
    pending_torque: Vec3,
    pending_impulse: Vec3,
    pending_torque_impulse: Vec3,
    applied_force: Vec3,
    applied_torque: Vec3,
}

impl PhysicsBody {
    /// New detached dynamic body. `user_data` is written to every backend object.
    pub fn new(user_data: u128) -> Self {
        Self {
            user_data,
            position: DVec3::zeros(),
            orientation: Quat::identity(),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            gravity: Vec3::zeros(),
            mass: 1.0,
            response_type: ResponseType::Dynamic,
            enabled: true,
            shape: None,
            key: None,
            state_dirty: true,
            needs_recreate: false,
            dirty_aabb: true,
            last_pull: None,
            pending_force: Vec3::zeros(),
            pending_torque: Vec3::zeros(),
            pending_impulse: Vec3::zeros(),
            pending_torque_impulse: Vec3::zeros(),
            applied_force: Vec3::zeros(),
            applied_torque: Vec3::zeros(),
        }
    }

    #[inline]
    pub fn position(&self) -> DVec3 {
        self.position
    }
    #[inline]
    pub fn orientation(&self) -> Quat {
        self.orientation
    }
    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.orientation)
    }
    #[inline]
    pub fn iso(&self) -> Iso {
        self.transform().iso()
    }
    #[inline]
    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }
    #[inline]
    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }
    #[inline]
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }
    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }
    #[inline]
    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.response_type == ResponseType::Dynamic
    }
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }
    #[inline]
    pub fn shape(&self) -> Option<&BuiltShape> {
        self.shape.as_ref()
    }
    #[inline]
    pub fn key(&self) -> Option<BodyKey> {
        self.key
    }
    #[inline]
    pub fn user_data(&self) -> u128 {
        self.user_data
    }
    /// Force and torque pushed into the backend by the last `prepare_for_step`,
    /// gravity included.
    #[inline]
    pub fn applied_force(&self) -> (Vec3, Vec3) {
        (self.applied_force, self.applied_torque)
    }

    pub fn set_response_type(&mut self, response_type: ResponseType) {
        if self.response_type == response_type {
            return;
        }
        self.response_type = response_type;
        self.needs_recreate = true;
        if response_type != ResponseType::Dynamic {
            self.clear_pending();
        }
    }

    pub fn set_position(&mut self, position: DVec3) {
        self.position = position;
        self.state_dirty = true;
        self.dirty_aabb = true;
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
        self.state_dirty = true;
        self.dirty_aabb = true;
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.linear_velocity = velocity;
        self.state_dirty = true;
    }

    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.angular_velocity = velocity;
        self.state_dirty = true;
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    pub fn set_mass(&mut self, mass: f32) {
        let mass = if mass < MIN_DYNAMIC_MASS {
            if self.is_dynamic() {
                log::warn!("body mass {mass} too small, clamped to {MIN_DYNAMIC_MASS}");
            }
            MIN_DYNAMIC_MASS
        } else {
            mass
        };
        self.mass = mass;
        self.state_dirty = true;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.state_dirty = true;
        }
    }

    /// Replace the backend shape. The collision object is rebuilt on the next step.
    pub fn set_shape(&mut self, shape: Option<BuiltShape>) {
        self.shape = shape;
        self.needs_recreate = true;
        self.dirty_aabb = true;
    }

    pub fn apply_force(&mut self, force: Vec3) {
        if self.is_dynamic() {
            self.pending_force += force;
        }
    }

    /// Force at a world point; the lever arm adds torque.
    pub fn apply_force_at(&mut self, force: Vec3, point: DVec3) {
        if self.is_dynamic() {
            self.pending_force += force;
            self.pending_torque += to_f32(&(point - self.position)).cross(&force);
        }
    }

    pub fn apply_impulse(&mut self, impulse: Vec3) {
        if self.is_dynamic() {
            self.pending_impulse += impulse;
        }
    }

    pub fn apply_impulse_at(&mut self, impulse: Vec3, point: DVec3) {
        if self.is_dynamic() {
            self.pending_impulse += impulse;
            self.pending_torque_impulse += to_f32(&(point - self.position)).cross(&impulse);
        }
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        if self.is_dynamic() {
            self.pending_torque += torque;
        }
    }

    pub fn apply_torque_impulse(&mut self, torque: Vec3) {
        if self.is_dynamic() {
            self.pending_torque_impulse += torque;
        }
    }

    fn clear_pending(&mut self) {
        self.pending_force = Vec3::zeros();
        self.pending_torque = Vec3::zeros();
        self.pending_impulse = Vec3::zeros();
        self.pending_torque_impulse = Vec3::zeros();
    }

    #[inline]
    pub fn has_pending_forces(&self) -> bool {
        !(vec_is_zero(&self.pending_force, 0.0)
            && vec_is_zero(&self.pending_torque, 0.0)
            && vec_is_zero(&self.pending_impulse, 0.0)
            && vec_is_zero(&self.pending_torque_impulse, 0.0))
    }

    /// Create the backend body (and collision object, if shaped) in `dynamics`.
    pub fn attach(&mut self, dynamics: &mut DynamicsWorld) {
        if self.key.is_some() {
            return;
        }
        let key = dynamics.create_key();
        self.key = Some(key);
        self.construct(dynamics, key);
    }

    /// Remove the backend body. Local state is kept.
    pub fn detach(&mut self, dynamics: &mut DynamicsWorld) {
        if let Some(key) = self.key.take() {
            dynamics.remove_collision_object(key);
            dynamics.remove_rigid_body(key);
        }
        self.last_pull = None;
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.key.is_some()
    }

    fn construct(&mut self, dynamics: &mut DynamicsWorld, key: BodyKey) {
        dynamics.add_rigid_body(key, self.build_rigid_body());
        if let Some(collider) = self.build_collider() {
            dynamics.add_collision_object(key, collider);
        }
        self.needs_recreate = false;
        self.state_dirty = false;
        self.last_pull = Some((self.position, self.orientation));
    }

    /// Dynamic bodies with a shape use continuous collision detection. The backend only
    /// sweeps bodies moving farther than their own thickness in a step, which takes the
    /// place of the shape's CCD motion threshold.
    pub fn uses_ccd(&self) -> bool {
        self.is_dynamic() && self.shape.is_some()
    }

    fn build_rigid_body(&self) -> RigidBody {
        let builder = match self.response_type {
            ResponseType::Static => RigidBodyBuilder::fixed(),
            ResponseType::Kinematic => RigidBodyBuilder::kinematic_position_based(),
            ResponseType::Dynamic => RigidBodyBuilder::dynamic()
                .linvel(self.linear_velocity)
                .angvel(self.angular_velocity)
                .additional_mass(self.mass),
        };
        builder
            .pose(self.iso())
            .gravity_scale(0.0)
            .enabled(self.enabled)
            .user_data(self.user_data)
            .ccd_enabled(self.uses_ccd())
            .build()
    }

    fn build_collider(&self) -> Option<Collider> {
        let shape = self.shape.as_ref()?;
        Some(
            ColliderBuilder::new(shape.shape.clone())
                .density(0.0)
                .user_data(self.user_data)
                .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
                .enabled(self.enabled)
                .build(),
        )
    }

    /// Push pending state into the backend before a dynamics step.
    ///
    /// A changed response type or shape recreates the backend body (destroy then
    /// construct); during a locked step both go through the delayed queue.
    pub fn prepare_for_step(&mut self, dynamics: &mut DynamicsWorld) {
        let Some(key) = self.key else {
            self.clear_pending();
            return;
        };
        if self.needs_recreate {
            log::debug!("recreating backend body {key:?} as {:?}", self.response_type);
            dynamics.remove_collision_object(key);
            dynamics.remove_rigid_body(key);
            self.construct(dynamics, key);
        }

        let position = Vector::new(
            self.position.x as f32,
            self.position.y as f32,
            self.position.z as f32,
        );
        let state_dirty = std::mem::take(&mut self.state_dirty);
        let response_type = self.response_type;
        let (force, torque) = (
            self.gravity * self.mass + self.pending_force,
            self.pending_torque,
        );
        let (impulse, torque_impulse) = (self.pending_impulse, self.pending_torque_impulse);

        let Some(rb) = dynamics.rigid_body_mut(key) else {
            // Still queued; forces wait for the next step.
            self.state_dirty |= state_dirty;
            return;
        };

        match response_type {
            ResponseType::Static => {
                if state_dirty {
                    rb.set_translation(position, false);
                    rb.set_rotation(self.orientation, false);
                }
            }
            ResponseType::Kinematic => {
                rb.set_next_kinematic_translation(position);
                rb.set_next_kinematic_rotation(self.orientation);
            }
            ResponseType::Dynamic => {
                if state_dirty {
                    rb.set_translation(position, true);
                    rb.set_rotation(self.orientation, true);
                    rb.set_linvel(self.linear_velocity, true);
                    rb.set_angvel(self.angular_velocity, true);
                    rb.set_additional_mass(self.mass, true);
                }
                rb.reset_forces(false);
                if !vec_is_zero(&force, 0.0) {
                    rb.add_force(force, true);
                }
                if !vec_is_zero(&torque, 0.0) {
                    rb.add_torque(torque, true);
                }
                if !vec_is_zero(&impulse, 0.0) {
                    rb.apply_impulse(impulse, true);
                }
                if !vec_is_zero(&torque_impulse, 0.0) {
                    rb.apply_torque_impulse(torque_impulse, true);
                }
            }
        }
        if state_dirty && rb.is_enabled() != self.enabled {
            rb.set_enabled(self.enabled);
        }

        if response_type == ResponseType::Dynamic {
            self.applied_force = force;
            self.applied_torque = torque;
        } else {
            self.applied_force = Vec3::zeros();
            self.applied_torque = Vec3::zeros();
        }
        self.clear_pending();
        self.last_pull = Some((self.position, self.orientation));
    }

    /// Pull transform and velocities of a dynamic body from the backend.
    ///
    /// Returns whether anything changed since the last pull.
    pub fn update_from_body(&mut self, dynamics: &DynamicsWorld) -> bool {
        if !self.is_dynamic() {
            return false;
        }
        let Some(rb) = self.key.and_then(|key| dynamics.rigid_body(key)) else {
            return false;
        };
        let t = rb.translation();
        let position = DVec3::new(f64::from(t.x), f64::from(t.y), f64::from(t.z));
        let orientation = *rb.rotation();

        let moved = self.last_pull.is_none_or(|(p, q)| {
            (p - position).norm_squared() > PULL_EPS * PULL_EPS
                || q.angle_to(&orientation) > PULL_EPS as f32
        });
        let linvel = *rb.linvel();
        let angvel = *rb.angvel();
        let accelerated = linvel != self.linear_velocity || angvel != self.angular_velocity;
        if !moved && !accelerated {
            return false;
        }

        self.position = position;
        self.orientation = orientation;
        self.linear_velocity = linvel;
        self.angular_velocity = angvel;
        self.last_pull = Some((position, orientation));
        self.dirty_aabb |= moved;
        true
    }

    /// Wake a sleeping backend body.
    pub fn activate(&self, dynamics: &mut DynamicsWorld) {
        if let Some(rb) = self.key.and_then(|key| dynamics.rigid_body_mut(key)) {
            rb.wake_up(true);
        }
    }

    pub fn is_deactivated(&self, dynamics: &DynamicsWorld) -> bool {
        self.key
            .and_then(|key| dynamics.rigid_body(key))
            .is_some_and(|rb| rb.is_sleeping())
    }

    #[inline]
    pub fn dirty_aabb(&self) -> bool {
        self.dirty_aabb
    }

    /// Clear the dirty-AABB flag, returning whether it was set.
    pub fn update_aabb(&mut self) -> bool {
        std::mem::take(&mut self.dirty_aabb)
    }

    pub fn world_aabb(&self) -> Option<Aabb> {
        let shape = self.shape.as_ref()?;
        Some(shape.shape.compute_aabb(&self.iso()))
    }

    /// Mass and velocity data for joint friction. Inertia is approximated by a solid
    /// sphere of the shape's CCD radius.
    pub fn snapshot(&self) -> BodySnapshot {
        if !self.is_dynamic() {
            return BodySnapshot {
                linear_velocity: self.linear_velocity,
                angular_velocity: self.angular_velocity,
                ..BodySnapshot::default()
            };
        }
        let radius = self.shape.as_ref().map_or(0.5, |s| s.ccd_radius.max(1.0e-3));
        let inertia = 0.4 * self.mass * radius * radius;
        BodySnapshot {
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
            force: self.applied_force,
            torque: self.applied_torque,
            inv_mass: 1.0 / self.mass,
            inv_inertia: 1.0 / inertia,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Shape, ShapeFactory};

    fn ball_shape() -> Option<BuiltShape> {
        ShapeFactory::build(&[Shape::sphere(Vec3::zeros(), 0.5)], Vec3::new(1.0, 1.0, 1.0), Vec3::zeros())
            .expect("shape")
    }

    #[test]
    fn static_body_ignores_forces_and_impulses() {
        let mut body = PhysicsBody::new(0);
        body.set_response_type(ResponseType::Static);
        body.apply_force(Vec3::new(10.0, 0.0, 0.0));
        body.apply_force_at(Vec3::new(0.0, 5.0, 0.0), DVec3::new(1.0, 0.0, 0.0));
        body.apply_impulse(Vec3::new(1.0, 0.0, 0.0));
        body.apply_torque(Vec3::new(0.0, 1.0, 0.0));
        body.apply_torque_impulse(Vec3::new(0.0, 1.0, 0.0));
        assert!(!body.has_pending_forces());

        let mut dynamics = DynamicsWorld::new();
        body.set_shape(ball_shape());
        body.attach(&mut dynamics);
        body.prepare_for_step(&mut dynamics);
        dynamics.step_simulation(1.0 / 60.0, 1, 1.0 / 60.0);
        assert!(!body.update_from_body(&dynamics));
        assert_eq!(body.position(), DVec3::zeros());
    }

    #[test]
    fn force_at_point_adds_torque() {
        let mut body = PhysicsBody::new(0);
        body.apply_force_at(Vec3::new(0.0, 1.0, 0.0), DVec3::new(1.0, 0.0, 0.0));
        assert!(body.has_pending_forces());
        assert!((body.pending_torque - Vec3::new(0.0, 0.0, 1.0)).norm() < 1.0e-6);
    }

    #[test]
    fn dynamic_body_falls_under_its_own_gravity() {
        let mut dynamics = DynamicsWorld::new();
        let mut body = PhysicsBody::new(0);
        body.set_shape(ball_shape());
        body.set_gravity(Vec3::new(0.0, -10.0, 0.0));
        body.attach(&mut dynamics);

        for _ in 0..10 {
            body.prepare_for_step(&mut dynamics);
            dynamics.step_simulation(1.0 / 60.0, 1, 1.0 / 60.0);
            body.update_from_body(&dynamics);
        }
        assert!(body.position().y < -0.05);
        assert!(body.linear_velocity().y < -1.0);
    }

    #[test]
    fn response_type_change_recreates_backend_body() {
        let mut dynamics = DynamicsWorld::new();
        let mut body = PhysicsBody::new(0);
        body.set_shape(ball_shape());
        body.attach(&mut dynamics);
        let key = body.key().expect("attached");

        body.set_response_type(ResponseType::Kinematic);
        body.prepare_for_step(&mut dynamics);
        assert!(dynamics.rigid_body(key).is_some_and(|rb| rb.is_kinematic()));
        assert_eq!(dynamics.rigid_body_count(), 1);

        body.detach(&mut dynamics);
        assert_eq!(dynamics.rigid_body_count(), 0);
        assert_eq!(dynamics.collision_object_count(), 0);
    }

    #[test]
    fn mass_is_clamped() {
        let mut body = PhysicsBody::new(0);
        body.set_mass(0.0);
        assert!((body.mass() - MIN_DYNAMIC_MASS).abs() < 1.0e-9);
    }

    #[test]
    fn only_dynamic_bodies_with_a_shape_use_ccd() {
        let mut dynamics = DynamicsWorld::new();
        let mut body = PhysicsBody::new(0);
        body.set_response_type(ResponseType::Dynamic);
        assert!(!body.uses_ccd());

        body.set_shape(ball_shape());
        body.attach(&mut dynamics);
        let key = body.key().expect("key");
        assert!(dynamics.rigid_body(key).expect("body").is_ccd_enabled());

        body.set_response_type(ResponseType::Kinematic);
        body.prepare_for_step(&mut dynamics);
        assert!(!body.uses_ccd());
        assert!(!dynamics.rigid_body(key).expect("body").is_ccd_enabled());
    }
}
