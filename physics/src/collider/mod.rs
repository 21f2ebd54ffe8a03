/*!
Colliders: the simulated objects of a [`crate::world::World`].

A collider is common state plus one of three variants:

- [`VolumeCollider`]: raw shapes, one body.
- [`RigCollider`]: a rig without animation. Rig shapes make one body, bone shapes make one
  body per bone.
- [`ComponentCollider`]: an animated rig instance. Bones follow the animation and write
  simulated poses back into it.

State changes go through [`ColliderNotify`], which every variant implements. The shared
reaction lives in the provided methods; variants only supply their parts and how to
build bodies.

Layout
- state:      engine facing state, dirty flags, matrix cache
- simulation: nothing / simple body / bones
- bone/bones: per bone simulation
- attachment: colliders following this one
- joint:      joints to the world or other colliders
- sweep:      kinematic sweep and slide
- unstuck:    de-penetration of stuck colliders
*/

pub mod attachment;
pub mod bone;
pub mod bones;
mod component;
pub mod joint;
mod rigged;
pub mod simple;
pub mod simulation;
pub mod state;
pub mod sweep;
pub mod unstuck;
mod volume;

use std::sync::Arc;

pub use attachment::{Attachment, AttachmentKind};
pub use bone::{BoneConstraint, ColliderBone, MatrixPair};
pub use bones::{BrokenConstraint, ColliderBones};
pub use component::ComponentCollider;
pub use joint::{ColliderJoint, JointTarget};
pub use rigged::RigCollider;
pub use simulation::ColliderBody;
pub use state::{ColliderState, DirtyFlags, ForceFieldFactors};
pub use volume::VolumeCollider;

use crate::{
    body::ResponseType,
    collision::{broad::SceneEntry, filter::CollisionFilter},
    config::PhysicsConfig,
    debug_drawer::DebugDrawer,
    dynamics::{ContactRules, DynamicsWorld},
    error::Result,
    force_field::{Fluctuation, ForceField},
    math::{DVec3, Quat, Vec3},
    rig::{Component, Rig},
    shape::Shape,
};

/// Generational handle of a collider in a world.
///
/// A removed collider's slot is reused with a new generation, so stale ids never reach
/// the new occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderId {
    index: u32,
    generation: u32,
}

impl ColliderId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// World services available to notifications.
pub struct NotifyContext<'a> {
    pub owner: ColliderId,
    pub dynamics: &'a mut DynamicsWorld,
    pub config: &'a PhysicsConfig,
    pub world_gravity: Vec3,
}

fn contact_rules(state: &ColliderState) -> ContactRules {
    ContactRules {
        filter: *state.collision_filter(),
        ignore: state.ignored().to_vec(),
        enabled: state.enabled(),
    }
}

/// Enclosing box of the shapes, grown to cover the predicted displacement.
fn update_extends(state: &mut ColliderState, body: &ColliderBody) {
    state.extends = body.calc_shape_extends().map(|b| b.swept(&state.predict_disp));
    state.dirty.extends = false;
}

/// Reactions of a collider variant to state changes.
///
/// The state is already updated when a notification runs.
pub trait ColliderNotify {
    /// Simulated bodies and the animated skeleton they follow.
    fn parts(&mut self) -> (&mut ColliderBody, Option<&mut Component>);
    fn parts_ref(&self) -> (&ColliderBody, Option<&Component>);
    /// Rig used for bone lookups.
    fn rig(&self) -> Option<&Arc<Rig>>;
    /// Build bodies for the current geometry.
    fn build_body(&self, state: &mut ColliderState, owner: ColliderId, config: &PhysicsConfig) -> Result<ColliderBody>;

    /// Replace the bodies. The old bodies stay when building fails.
    fn rebuild(&mut self, state: &mut ColliderState, ctx: &mut NotifyContext<'_>) -> Result<()> {
        let built = self.build_body(state, ctx.owner, ctx.config)?;
        let (body, component) = self.parts();
        body.detach(ctx.dynamics);
        *body = built;
        body.attach(ctx.dynamics, state, component.as_deref());
        state.dirty.shapes = true;
        state.dirty.bones = true;
        state.dirty.extends = true;
        Ok(())
    }

    fn position_changed(&mut self, state: &mut ColliderState, _ctx: &mut NotifyContext<'_>) {
        let (body, component) = self.parts();
        body.pose_changed(state, component.as_deref());
    }

    fn orientation_changed(&mut self, state: &mut ColliderState, _ctx: &mut NotifyContext<'_>) {
        let (body, component) = self.parts();
        body.pose_changed(state, component.as_deref());
    }

    fn scale_changed(&mut self, state: &mut ColliderState, ctx: &mut NotifyContext<'_>) -> Result<()> {
        self.rebuild(state, ctx)
    }

    fn geometry_changed(&mut self, state: &mut ColliderState, ctx: &mut NotifyContext<'_>) -> Result<()> {
        self.rebuild(state, ctx)
    }

    fn rig_changed(&mut self, state: &mut ColliderState, ctx: &mut NotifyContext<'_>) -> Result<()> {
        self.rebuild(state, ctx)
    }

    fn component_changed(&mut self, state: &mut ColliderState, ctx: &mut NotifyContext<'_>) -> Result<()> {
        self.rebuild(state, ctx)
    }

    fn linear_velocity_changed(&mut self, state: &mut ColliderState, _ctx: &mut NotifyContext<'_>) {
        self.parts().0.velocity_changed(state);
    }

    fn angular_velocity_changed(&mut self, state: &mut ColliderState, _ctx: &mut NotifyContext<'_>) {
        self.parts().0.velocity_changed(state);
    }

    fn gravity_changed(&mut self, state: &mut ColliderState, ctx: &mut NotifyContext<'_>) {
        let gravity = state.resolve_gravity(ctx.world_gravity);
        self.parts().0.gravity_changed(gravity);
    }

    fn enabled_changed(&mut self, state: &mut ColliderState, ctx: &mut NotifyContext<'_>) {
        self.parts().0.enabled_changed(ctx.dynamics, state.enabled());
        ctx.dynamics.set_contact_rules(ctx.owner, contact_rules(state));
    }

    /// Mass and force field factors.
    fn properties_changed(&mut self, state: &mut ColliderState, _ctx: &mut NotifyContext<'_>) {
        self.parts().0.mass_changed(state.mass());
    }

    fn response_type_changed(&mut self, state: &mut ColliderState, ctx: &mut NotifyContext<'_>) {
        self.parts().0.response_type_changed(state, ctx.config);
    }

    /// Filter or ignore list.
    fn collision_filter_changed(&mut self, state: &mut ColliderState, ctx: &mut NotifyContext<'_>) {
        ctx.dynamics.set_contact_rules(ctx.owner, contact_rules(state));
    }

    /// Bone dynamic flags changed in the rig; `bone: None` for all bones.
    fn bone_changed(&mut self, state: &mut ColliderState, bone: Option<usize>) -> Result<()> {
        match self.parts().0.bones_mut() {
            Some(bones) => bones.update_physics_type(state.response_type(), bone),
            None => Ok(()),
        }
    }
}

/// The closed set of collider variants.
pub enum ColliderKind {
    Volume(VolumeCollider),
    Rig(RigCollider),
    Component(ComponentCollider),
}

impl ColliderKind {
    pub fn notify(&mut self) -> &mut dyn ColliderNotify {
        match self {
            ColliderKind::Volume(v) => v,
            ColliderKind::Rig(r) => r,
            ColliderKind::Component(c) => c,
        }
    }

    pub fn notify_ref(&self) -> &dyn ColliderNotify {
        match self {
            ColliderKind::Volume(v) => v,
            ColliderKind::Rig(r) => r,
            ColliderKind::Component(c) => c,
        }
    }
}

pub struct Collider {
    id: ColliderId,
    state: ColliderState,
    kind: ColliderKind,
    fluctuation: Fluctuation,
    /// Set while the collider lives in a world.
    attached: bool,
}

impl Collider {
    fn with_kind(kind: ColliderKind) -> Self {
        Self {
            id: ColliderId::new(u32::MAX, 0),
            state: ColliderState::default(),
            kind,
            fluctuation: Fluctuation::default(),
            attached: false,
        }
    }

    pub fn volume(shapes: Vec<Shape>) -> Self {
        Self::with_kind(ColliderKind::Volume(VolumeCollider::new(shapes)))
    }

    pub fn rig(rig: Option<Arc<Rig>>) -> Self {
        Self::with_kind(ColliderKind::Rig(RigCollider::new(rig)))
    }

    pub fn component(component: Option<Component>) -> Self {
        Self::with_kind(ColliderKind::Component(ComponentCollider::new(component)))
    }

    pub fn with_position(mut self, position: DVec3) -> Self {
        self.state.set_position(position);
        self
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.state.set_orientation(orientation);
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.state.set_scale(scale);
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.state.set_response_type(response_type);
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.state.set_mass(mass);
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec3) -> Self {
        self.state.set_linear_velocity(velocity);
        self
    }

    pub fn with_angular_velocity(mut self, velocity: Vec3) -> Self {
        self.state.set_angular_velocity(velocity);
        self
    }

    /// Gravity override; `None` follows the world.
    pub fn with_gravity(mut self, gravity: Option<Vec3>) -> Self {
        self.state.set_local_gravity(gravity);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.state.set_enabled(enabled);
        self
    }

    pub fn with_collision_filter(mut self, filter: CollisionFilter) -> Self {
        self.state.set_collision_filter(filter);
        self
    }

    pub fn with_force_field_factors(mut self, factors: ForceFieldFactors) -> Self {
        self.state.set_force_field_factors(factors);
        self
    }

    #[inline]
    pub fn id(&self) -> ColliderId {
        self.id
    }
    #[inline]
    pub fn state(&self) -> &ColliderState {
        &self.state
    }
    #[inline]
    pub fn kind(&self) -> &ColliderKind {
        &self.kind
    }
    #[inline]
    pub fn fluctuation(&self) -> &Fluctuation {
        &self.fluctuation
    }
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn body(&self) -> &ColliderBody {
        self.kind.notify_ref().parts_ref().0
    }

    pub fn bones(&self) -> Option<&ColliderBones> {
        self.body().bones()
    }

    pub fn animated_component(&self) -> Option<&Component> {
        self.kind.notify_ref().parts_ref().1
    }

    pub fn current_rig(&self) -> Option<&Arc<Rig>> {
        self.kind.notify_ref().rig()
    }

    /// State and variant, borrowed apart.
    pub(crate) fn split(&mut self) -> (&mut ColliderState, &mut dyn ColliderNotify) {
        (&mut self.state, self.kind.notify())
    }

    pub(crate) fn kind_mut(&mut self) -> &mut ColliderKind {
        &mut self.kind
    }

    /// Join a world: build bodies and put them into `dynamics`.
    pub(crate) fn attach(
        &mut self,
        id: ColliderId,
        dynamics: &mut DynamicsWorld,
        config: &PhysicsConfig,
        world_gravity: Vec3,
    ) -> Result<()> {
        self.id = id;
        self.state.resolve_gravity(world_gravity);
        let body = self.kind.notify_ref().build_body(&mut self.state, id, config)?;
        let (state, notify) = self.split();
        let (slot, component) = notify.parts();
        *slot = body;
        slot.attach(dynamics, state, component.as_deref());
        dynamics.set_contact_rules(id, contact_rules(state));

        // Spread fluctuation phases over slots.
        self.fluctuation = Fluctuation::with_phase(id.index() as f32 * 0.618_034);
        self.resolve_attachments();
        self.attached = true;
        Ok(())
    }

    /// Leave the world: joints first, then bodies.
    pub(crate) fn detach(&mut self, dynamics: &mut DynamicsWorld) {
        for joint in &mut self.state.joints {
            joint.constraint_mut().detach(dynamics);
        }
        self.kind.notify().parts().0.detach(dynamics);
        dynamics.remove_contact_rules(self.id);
        self.attached = false;
    }

    pub(crate) fn resolve_attachments(&mut self) {
        let rig = self.kind.notify_ref().rig().cloned();
        for attachment in &mut self.state.attachments {
            attachment.resolve(rig.as_deref());
        }
        self.state.dirty.attachments = true;
    }

    pub(crate) fn state_mut(&mut self) -> &mut ColliderState {
        &mut self.state
    }

    /// Advance fluctuation, estimate bone velocities, refresh volumes, extents and field
    /// forces.
    pub(crate) fn prepare_for_detection(&mut self, elapsed: f32, fields: &[ForceField]) {
        self.fluctuation.update(elapsed);
        let (state, notify) = (&mut self.state, self.kind.notify());
        let (body, mut component) = notify.parts();
        if let Some(component) = component.as_deref_mut() {
            component.prepare_bones();
        }
        body.prepare_for_detection(state, component.as_deref(), elapsed);

        state.predict_disp = crate::math::to_f64(&(state.linear_velocity() * elapsed));
        update_extends(state, body);

        for field in fields {
            if !field.enabled || !field.filter.collides(state.collision_filter()) {
                continue;
            }
            if let Some(extends) = &state.extends
                && !extends.intersects_sphere(&field.position, f64::from(field.radius))
            {
                continue;
            }
            body.apply_force_field(field, state, &self.fluctuation);
        }
    }

    pub(crate) fn scene_entries(&self) -> Vec<SceneEntry> {
        if !self.state.enabled() || self.state.collision_filter().collides_not() {
            return Vec::new();
        }
        self.body().scene_entries(&self.state)
    }

    pub(crate) fn prepare_for_step(&mut self, dynamics: &mut DynamicsWorld, dt: f32) {
        self.kind.notify().parts().0.prepare_for_step(dynamics, dt);
    }

    /// Pull simulated poses; returns whether the collider moved.
    pub(crate) fn update_from_body(&mut self, dynamics: &DynamicsWorld) -> bool {
        let (state, notify) = (&mut self.state, self.kind.notify());
        let (body, component) = notify.parts();
        body.update_from_body(dynamics, state, component)
    }

    pub fn point_inside(&self, point: &DVec3) -> bool {
        self.body().point_inside(point)
    }

    pub(crate) fn publish_debug(&self, drawer: &mut DebugDrawer) {
        self.body().publish_debug(drawer);
    }
}
