use crate::{
    body::ResponseType,
    collision::{filter::CollisionFilter, volume::ExtentBox},
    math::{DMat4, DVec3, Quat, Vec3, matrix_from_scaled, matrix_inverse, vec_is_zero},
};

use super::{ColliderId, attachment::Attachment, joint::ColliderJoint};

/// Squared linear speed above which a collider counts as moving.
const MOVING_LINEAR_SQ: f32 = 1.0e-6;
/// Squared angular speed above which a collider counts as moving (1 degree per second).
const MOVING_ANGULAR_SQ: f32 = 3.046_174e-4;

/// How strongly force fields act on a collider, per application type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForceFieldFactors {
    pub direct: f32,
    pub surface: f32,
    pub mass: f32,
    pub speed: f32,
}

impl Default for ForceFieldFactors {
    fn default() -> Self {
        Self {
            direct: 1.0,
            surface: 1.0,
            mass: 1.0,
            speed: 1.0,
        }
    }
}

/// Lazily refreshed collider data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub shapes: bool,
    pub bones: bool,
    pub attachments: bool,
    pub sweep_test: bool,
    pub matrix: bool,
    pub extends: bool,
}

impl DirtyFlags {
    fn all() -> Self {
        Self {
            shapes: true,
            bones: true,
            attachments: true,
            sweep_test: true,
            matrix: true,
            extends: true,
        }
    }
}

/// Engine-facing state shared by every collider variant.
///
/// Setters only record values and raise dirty flags; the owning [`super::Collider`]
/// forwards the change to its variant through [`super::ColliderNotify`].
pub struct ColliderState {
    position: DVec3,
    orientation: Quat,
    scale: Vec3,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    /// Gravity override; `None` follows the world gravity.
    local_gravity: Option<Vec3>,
    gravity: Vec3,
    mass: f32,
    response_type: ResponseType,
    enabled: bool,
    filter: CollisionFilter,
    ignore: Vec<ColliderId>,
    force_field: ForceFieldFactors,

    pub(crate) attachments: Vec<Attachment>,
    pub(crate) joints: Vec<ColliderJoint>,
    pub(crate) dirty: DirtyFlags,

    matrix: DMat4,
    inverse_matrix: DMat4,
    pub(crate) predict_disp: DVec3,
    pub(crate) use_kinematic_simulation: bool,
    pub(crate) extends: Option<ExtentBox>,
}

impl Default for ColliderState {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            orientation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            local_gravity: None,
            gravity: Vec3::zeros(),
            mass: 1.0,
            response_type: ResponseType::Static,
            enabled: true,
            filter: CollisionFilter::default(),
            ignore: Vec::new(),
            force_field: ForceFieldFactors::default(),
            attachments: Vec::new(),
            joints: Vec::new(),
            dirty: DirtyFlags::all(),
            matrix: DMat4::identity(),
            inverse_matrix: DMat4::identity(),
            predict_disp: DVec3::zeros(),
            use_kinematic_simulation: false,
            extends: None,
        }
    }
}

impl ColliderState {
    #[inline]
    pub fn position(&self) -> DVec3 {
        self.position
    }
    #[inline]
    pub fn orientation(&self) -> Quat {
        self.orientation
    }
    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
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
    pub fn local_gravity(&self) -> Option<Vec3> {
        self.local_gravity
    }
    /// Effective gravity: the override, or the world gravity last resolved.
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
    pub fn enabled(&self) -> bool {
        self.enabled
    }
    #[inline]
    pub fn collision_filter(&self) -> &CollisionFilter {
        &self.filter
    }
    #[inline]
    pub fn ignored(&self) -> &[ColliderId] {
        &self.ignore
    }
    #[inline]
    pub fn force_field_factors(&self) -> ForceFieldFactors {
        self.force_field
    }
    #[inline]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
    #[inline]
    pub fn joints(&self) -> &[ColliderJoint] {
        &self.joints
    }
    #[inline]
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }
    #[inline]
    pub fn use_kinematic_simulation(&self) -> bool {
        self.use_kinematic_simulation
    }
    #[inline]
    pub fn predicted_displacement(&self) -> DVec3 {
        self.predict_disp
    }
    #[inline]
    pub fn extends(&self) -> Option<ExtentBox> {
        self.extends
    }

    pub(crate) fn set_position(&mut self, position: DVec3) {
        self.position = position;
        self.dirty.matrix = true;
        self.dirty.attachments = true;
        self.dirty.extends = true;
    }

    pub(crate) fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
        self.dirty.matrix = true;
        self.dirty.attachments = true;
        self.dirty.extends = true;
    }

    pub(crate) fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty = DirtyFlags::all();
    }

    pub(crate) fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.linear_velocity = velocity;
        self.dirty.sweep_test = true;
    }

    pub(crate) fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.angular_velocity = velocity;
        self.dirty.sweep_test = true;
    }

    pub(crate) fn set_local_gravity(&mut self, gravity: Option<Vec3>) {
        self.local_gravity = gravity;
    }

    /// Resolve the effective gravity against the world gravity.
    pub(crate) fn resolve_gravity(&mut self, world_gravity: Vec3) -> Vec3 {
        self.gravity = self.local_gravity.unwrap_or(world_gravity);
        self.gravity
    }

    pub(crate) fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
    }

    pub(crate) fn set_response_type(&mut self, response_type: ResponseType) {
        self.response_type = response_type;
        self.dirty.sweep_test = true;
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_collision_filter(&mut self, filter: CollisionFilter) {
        self.filter = filter;
    }

    pub(crate) fn set_force_field_factors(&mut self, factors: ForceFieldFactors) {
        self.force_field = factors;
    }

    /// Returns false if `other` was already ignored.
    pub(crate) fn add_ignore(&mut self, other: ColliderId) -> bool {
        if self.ignore.contains(&other) {
            return false;
        }
        self.ignore.push(other);
        true
    }

    pub(crate) fn remove_ignore(&mut self, other: ColliderId) -> bool {
        let before = self.ignore.len();
        self.ignore.retain(|c| *c != other);
        before != self.ignore.len()
    }

    #[inline]
    pub fn ignores(&self, other: ColliderId) -> bool {
        self.ignore.contains(&other)
    }

    /// `T * R * S` of the collider, refreshed on demand.
    pub fn matrix(&mut self) -> &DMat4 {
        self.refresh_matrix();
        &self.matrix
    }

    pub fn inverse_matrix(&mut self) -> &DMat4 {
        self.refresh_matrix();
        &self.inverse_matrix
    }

    /// Cached matrix without refreshing; valid after [`ColliderState::matrix`].
    #[inline]
    pub fn cached_matrix(&self) -> &DMat4 {
        &self.matrix
    }

    fn refresh_matrix(&mut self) {
        if self.dirty.matrix {
            self.matrix = matrix_from_scaled(&self.position, &self.orientation, &self.scale);
            self.inverse_matrix = matrix_inverse(&self.matrix);
            self.dirty.matrix = false;
        }
    }

    /// Whether the collider would move this step on its own.
    pub fn is_moving(&self) -> bool {
        self.response_type != ResponseType::Static
            && (self.linear_velocity.norm_squared() > MOVING_LINEAR_SQ
                || self.angular_velocity.norm_squared() > MOVING_ANGULAR_SQ
                || self.gravity.norm_squared() > MOVING_LINEAR_SQ)
    }

    #[inline]
    pub fn has_velocity(&self) -> bool {
        !vec_is_zero(&self.linear_velocity, 0.0) || !vec_is_zero(&self.angular_velocity, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::matrix_position;

    #[test]
    fn matrix_is_refreshed_after_moves() {
        let mut state = ColliderState::default();
        state.set_position(DVec3::new(1.0, 2.0, 3.0));
        assert!((matrix_position(state.matrix()) - DVec3::new(1.0, 2.0, 3.0)).norm() < 1.0e-12);

        state.set_position(DVec3::new(-1.0, 0.0, 0.0));
        let product = *state.matrix() * *state.inverse_matrix();
        assert!((product - DMat4::identity()).norm() < 1.0e-9);
        assert!(!state.dirty().matrix);
    }

    #[test]
    fn static_colliders_never_move() {
        let mut state = ColliderState::default();
        state.set_linear_velocity(Vec3::new(1.0, 0.0, 0.0));
        assert!(!state.is_moving());

        state.set_response_type(ResponseType::Kinematic);
        assert!(state.is_moving());

        state.set_linear_velocity(Vec3::zeros());
        assert!(!state.is_moving());
        state.resolve_gravity(Vec3::new(0.0, -9.81, 0.0));
        assert!(state.is_moving());
    }

    #[test]
    fn ignore_list_has_no_duplicates() {
        let mut state = ColliderState::default();
        let other = ColliderId::new(3, 1);
        assert!(state.add_ignore(other));
        assert!(!state.add_ignore(other));
        assert!(state.ignores(other));
        assert!(state.remove_ignore(other));
        assert!(state.ignored().is_empty());
    }
}
