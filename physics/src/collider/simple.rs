//! One rigid body carrying all shapes of a collider.
//!
//! Used by volume colliders and by rig or component colliders whose rig defines shapes
//! of its own. The body sits on the central mass point: `body = T * R * (cmp * scale)`.

use super::{
    ColliderId,
    state::{ColliderState, ForceFieldFactors},
};
use crate::{
    body::{PhysicsBody, ResponseType},
    collision::{broad::SceneEntry, filter::CollisionFilter, volume::ExtentBox},
    debug_drawer::{DebugDrawer, DebugShape, Highlight},
    dynamics::DynamicsWorld,
    error::Result,
    force_field::{Fluctuation, ForceField},
    math::{DVec3, Iso, Quat, Vec3, to_f32, to_f64},
    owner::{BodyOwner, pack_owner},
    shape::{Shape, ShapeFactory, ShapeList},
};

/// Backend response of a single-body collider and whether it moves by kinematic sweeps.
///
/// Fake dynamics simulates dynamic colliders with sweeps instead of the dynamics world.
pub fn simple_response(response: ResponseType, fake_dynamics: bool) -> (ResponseType, bool) {
    match response {
        ResponseType::Static => (ResponseType::Static, false),
        ResponseType::Kinematic => (ResponseType::Kinematic, true),
        ResponseType::Dynamic if fake_dynamics => (ResponseType::Kinematic, true),
        ResponseType::Dynamic => (ResponseType::Dynamic, false),
    }
}

pub struct SimpleBody {
    owner: ColliderId,
    body: PhysicsBody,
    shapes: ShapeList,
    /// Central mass point in unscaled collider space.
    offset: Vec3,
    scale: Vec3,
}

impl SimpleBody {
    pub fn new(
        owner: ColliderId,
        shapes: Vec<Shape>,
        offset: Vec3,
        state: &ColliderState,
        response: ResponseType,
    ) -> Result<Self> {
        let scale = state.scale();
        let built = ShapeFactory::build(&shapes, scale, -offset.component_mul(&scale))?;

        let mut body = PhysicsBody::new(pack_owner(BodyOwner::new(owner, None)));
        body.set_response_type(response);
        body.set_shape(built);
        body.set_mass(state.mass());
        body.set_gravity(state.gravity());
        body.set_enabled(state.enabled());

        let mut simple = Self {
            owner,
            body,
            shapes: ShapeList::new(shapes),
            offset,
            scale,
        };
        simple.sync_pose(state);
        simple.sync_velocities(state);
        Ok(simple)
    }

    #[inline]
    pub fn body(&self) -> &PhysicsBody {
        &self.body
    }
    #[inline]
    pub fn body_mut(&mut self) -> &mut PhysicsBody {
        &mut self.body
    }
    #[inline]
    pub fn shapes(&self) -> &ShapeList {
        &self.shapes
    }
    /// Central mass point in unscaled collider space.
    #[inline]
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    #[inline]
    fn scaled_offset(&self) -> Vec3 {
        self.offset.component_mul(&self.scale)
    }

    /// Body pose for a collider pose.
    pub fn body_iso(&self, position: &DVec3, orientation: &Quat) -> Iso {
        let p = to_f32(position) + orientation * self.scaled_offset();
        Iso::from_parts(p.into(), *orientation)
    }

    pub fn sync_pose(&mut self, state: &ColliderState) {
        let orientation = state.orientation();
        let position = state.position() + to_f64(&(orientation * self.scaled_offset()));
        self.body.set_position(position);
        self.body.set_orientation(orientation);
    }

    pub fn sync_velocities(&mut self, state: &ColliderState) {
        self.body.set_linear_velocity(state.linear_velocity());
        self.body.set_angular_velocity(state.angular_velocity());
    }

    /// Copy a simulated body pose back into the collider.
    pub fn update_from_body(&mut self, dynamics: &DynamicsWorld, state: &mut ColliderState) -> bool {
        if !self.body.update_from_body(dynamics) {
            return false;
        }
        let orientation = self.body.orientation();
        let position = self.body.position() - to_f64(&(orientation * self.scaled_offset()));
        state.set_position(position);
        state.set_orientation(orientation);
        state.set_linear_velocity(self.body.linear_velocity());
        state.set_angular_velocity(self.body.angular_velocity());
        true
    }

    pub fn apply_force_field(&mut self, field: &ForceField, factors: &ForceFieldFactors, fluctuation: &Fluctuation) {
        field.apply_to_body(&mut self.body, factors, fluctuation);
    }

    pub fn update_shapes(&mut self, state: &mut ColliderState) {
        self.shapes.update_volumes(state.matrix());
    }

    pub fn point_inside(&self, point: &DVec3) -> bool {
        self.shapes.point_inside(point)
    }

    pub fn calc_shape_extends(&self) -> Option<ExtentBox> {
        self.shapes.enclosing_box()
    }

    pub fn scene_entry(&self, filter: CollisionFilter) -> Option<SceneEntry> {
        let shape = self.body.shape()?;
        Some(SceneEntry::new(self.owner, None, shape.shape.clone(), self.body.iso(), filter))
    }

    pub fn publish_debug(&self, drawer: &mut DebugDrawer) {
        drawer.push(DebugShape {
            owner: self.owner,
            bone: None,
            volumes: self.shapes.volumes().to_vec(),
            highlight: Highlight::for_response(self.body.response_type()),
        });
    }

    pub fn attach(&mut self, dynamics: &mut DynamicsWorld) {
        self.body.attach(dynamics);
    }

    pub fn detach(&mut self, dynamics: &mut DynamicsWorld) {
        self.body.detach(dynamics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_sits_on_the_scaled_mass_point() {
        let mut state = ColliderState::default();
        state.set_position(DVec3::new(0.0, 1.0, 0.0));
        state.set_scale(Vec3::new(2.0, 2.0, 2.0));
        state.set_orientation(Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2));
        let simple = SimpleBody::new(
            ColliderId::new(0, 0),
            vec![Shape::sphere(Vec3::zeros(), 0.5)],
            Vec3::new(1.0, 0.0, 0.0),
            &state,
            ResponseType::Kinematic,
        )
        .expect("body");

        // (1,0,0) * 2 rotated a quarter turn about Z lands on +Y.
        let p = simple.body().position();
        assert!((p - DVec3::new(0.0, 3.0, 0.0)).norm() < 1.0e-5);
        let iso = simple.body_iso(&state.position(), &state.orientation());
        assert!((iso.translation.vector - Vec3::new(0.0, 3.0, 0.0)).norm() < 1.0e-5);
    }

    #[test]
    fn fake_dynamics_sweeps_dynamic_colliders() {
        assert_eq!(simple_response(ResponseType::Dynamic, true), (ResponseType::Kinematic, true));
        assert_eq!(simple_response(ResponseType::Dynamic, false), (ResponseType::Dynamic, false));
        assert_eq!(simple_response(ResponseType::Static, true), (ResponseType::Static, false));
    }
}
