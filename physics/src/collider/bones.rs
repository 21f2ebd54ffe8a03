/*!
Per-bone simulation of rig and component colliders.

Every rig bone gets a [`ColliderBone`]; bones with shapes also get a [`PhysicsBody`] and
the joints authored on the rig bone.

Conventions
- The body of a bone sits on its central mass point: `body = collider * bone * T(cmp)`,
  with `collider` the scaled collider matrix and `bone` the component (or rig rest) bone
  matrix.
- Dynamic bones are driven by the dynamics world and written back into the collider and
  the component. All other bones follow the animation and get finite-difference
  velocities.
*/

use std::sync::Arc;

use super::{
    ColliderId,
    bone::{BoneConstraint, ColliderBone},
    state::{ColliderState, ForceFieldFactors},
};
use crate::{
    body::{PhysicsBody, ResponseType},
    collision::{broad::SceneEntry, filter::CollisionFilter, settings::ELAPSED_EPS, volume::ExtentBox},
    config::PhysicsConfig,
    constraint::{BodyRef, ColliderConstraint, ConstraintDef},
    debug_drawer::{DebugDrawer, DebugShape, Highlight},
    dynamics::DynamicsWorld,
    error::{PhysicsError, Result},
    force_field::{Fluctuation, ForceField},
    math::{
        DMat4, DVec3, Iso, Quat, Vec3, matrix_from, matrix_inverse, matrix_orientation,
        matrix_position, to_f32, to_f64, transform_point, vec_is_zero,
    },
    owner::{BodyOwner, pack_owner},
    rig::{BonePose, Component, Rig, RigConstraint},
    shape::ShapeFactory,
};

/// A rig constraint whose joint broke during the last step.
#[derive(Clone, Debug, PartialEq)]
pub struct BrokenConstraint {
    pub bone: usize,
    /// Index of the constraint in the rig bone.
    pub constraint: usize,
    pub def: RigConstraint,
}

/// Physics response of one bone for a collider response type.
fn bone_response(collider: ResponseType, bone_dynamic: bool) -> ResponseType {
    match collider {
        ResponseType::Static => ResponseType::Static,
        ResponseType::Kinematic => ResponseType::Kinematic,
        ResponseType::Dynamic if bone_dynamic => ResponseType::Dynamic,
        ResponseType::Dynamic => ResponseType::Kinematic,
    }
}

#[inline]
fn scale_matrix(scale: &Vec3) -> DMat4 {
    DMat4::new_nonuniform_scaling(&to_f64(scale))
}

pub struct ColliderBones {
    owner: ColliderId,
    rig: Arc<Rig>,
    bones: Vec<ColliderBone>,
    root_bone: Option<usize>,
    total_mass: f32,
    scale: Vec3,
    attached: bool,
}

impl ColliderBones {
    /// Build bones, bodies and joints for `rig`.
    ///
    /// Bodies are placed at the rest pose (or the component pose) and stay detached until
    /// [`ColliderBones::attach`].
    pub fn new(
        owner: ColliderId,
        rig: Arc<Rig>,
        state: &mut ColliderState,
        component: Option<&Component>,
        config: &PhysicsConfig,
    ) -> Result<Self> {
        let mut bones = Self {
            owner,
            rig,
            bones: Vec::new(),
            root_bone: None,
            total_mass: 0.0,
            scale: state.scale(),
            attached: false,
        };
        bones.create_bones(state)?;
        bones.create_constraints(state.enabled(), config);
        let matrix = *state.matrix();
        bones.teleport(&matrix, component);
        Ok(bones)
    }

    fn create_bones(&mut self, state: &ColliderState) -> Result<()> {
        let scale = state.scale();
        let count = self.rig.bone_count();
        self.bones = Vec::with_capacity(count);

        for index in 0..count {
            let mut bone = ColliderBone::new(index);
            bone.set_from_rig_bone(&self.rig, index)?;

            if !bone.shapes().is_empty() {
                let offset = -bone.offset().component_mul(&scale);
                let shape = ShapeFactory::build(bone.shapes().shapes(), scale, offset)?;

                let mut body = PhysicsBody::new(pack_owner(BodyOwner::new(self.owner, Some(index))));
                body.set_response_type(bone_response(state.response_type(), bone.is_dynamic()));
                body.set_shape(shape);
                body.set_mass(bone.mass());
                body.set_gravity(state.gravity());
                body.set_enabled(state.enabled());
                bone.body = Some(body);
            }
            self.bones.push(bone);
        }

        self.root_bone = self
            .rig
            .root_bone()
            .filter(|root| self.bones[*root].has_body());
        self.total_mass = self
            .bones
            .iter()
            .filter_map(ColliderBone::body)
            .map(PhysicsBody::mass)
            .sum();
        Ok(())
    }

    /// Constraint definition of rig constraint `rc` on `bone`, frames in bone space.
    ///
    /// The first frame sits on the reference point of the owning bone; the second frame is
    /// the same point and orientation expressed in the partner bone.
    fn constraint_def(&self, bone: usize, partner: usize, rc: &RigConstraint) -> ConstraintDef {
        let b = &self.bones[bone];
        let p = &self.bones[partner];
        let mut def = rc.to_def();

        let position1 = rc.reference_position + rc.reference_orientation * rc.bone_offset;
        def.frame1 = Iso::from_parts(position1.into(), Quat::identity());

        let relative = p.bone_matrix().inverse * b.bone_matrix().matrix;
        let position2 = transform_point(&relative, &to_f64(&rc.reference_position));
        let rotation2 = matrix_orientation(&(relative * matrix_from(&DVec3::zeros(), &rc.reference_orientation)));
        def.frame2 = Iso::from_parts(to_f32(&position2).into(), rotation2);

        def.scale_linear_limits(&self.scale);
        def
    }

    fn create_constraints(&mut self, enabled: bool, config: &PhysicsConfig) {
        let count = self.bones.len();
        for index in 0..count {
            if !self.bones[index].has_body() {
                continue;
            }
            let mut built = Vec::new();
            for (rig_index, rc) in self.rig.bones()[index].constraints.iter().enumerate() {
                let Some(partner) = rc.partner_bone else {
                    continue;
                };
                if partner >= count || !self.bones[partner].has_body() {
                    log::debug!(
                        "bone {index} constraint {rig_index}: partner {partner} has no body, skipped"
                    );
                    continue;
                }
                let def = self.constraint_def(index, partner, rc);
                // Bodies and offsets are bound once the bodies exist in a dynamics world.
                built.push(BoneConstraint {
                    rig_index,
                    partner,
                    constraint: ColliderConstraint::new(def, config).with_enabled(enabled),
                });
            }
            self.bones[index].constraints = built;
        }
    }

    #[inline]
    pub fn owner(&self) -> ColliderId {
        self.owner
    }
    #[inline]
    pub fn rig(&self) -> &Arc<Rig> {
        &self.rig
    }
    #[inline]
    pub fn bones(&self) -> &[ColliderBone] {
        &self.bones
    }
    #[inline]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bone(&self, index: usize) -> Result<&ColliderBone> {
        self.bones.get(index).ok_or(PhysicsError::BoneIndexOutOfRange {
            index,
            count: self.bones.len(),
        })
    }

    pub fn bone_mut(&mut self, index: usize) -> Result<&mut ColliderBone> {
        let count = self.bones.len();
        self.bones
            .get_mut(index)
            .ok_or(PhysicsError::BoneIndexOutOfRange { index, count })
    }

    /// Bone driving the collider transform, if the rig root has a body.
    #[inline]
    pub fn root_bone(&self) -> Option<usize> {
        self.root_bone
    }
    #[inline]
    pub fn total_mass(&self) -> f32 {
        self.total_mass
    }
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    fn physics_bones(&self) -> impl Iterator<Item = &ColliderBone> {
        self.bones.iter().filter(|b| b.has_body())
    }

    pub(crate) fn bodies_mut(&mut self) -> impl Iterator<Item = &mut PhysicsBody> {
        self.bones.iter_mut().filter_map(ColliderBone::body_mut)
    }

    pub fn has_constraints(&self) -> bool {
        self.bones.iter().any(|b| !b.constraints.is_empty())
    }

    pub fn has_breakable_constraints(&self) -> bool {
        self.bones
            .iter()
            .flat_map(|b| b.constraints.iter())
            .any(|c| c.constraint.is_breakable())
    }

    /// Teleport bones to their goal pose at rest, then put bodies and joints into
    /// `dynamics`.
    pub fn attach(&mut self, dynamics: &mut DynamicsWorld, collider_matrix: &DMat4, component: Option<&Component>) {
        self.teleport(collider_matrix, component);
        for body in self.bodies_mut() {
            body.attach(dynamics);
        }
        self.bind_constraints(dynamics);
        for bone in &mut self.bones {
            for c in &mut bone.constraints {
                c.constraint.attach(dynamics);
            }
        }
        self.attached = true;
    }

    /// Remove joints first, then bodies.
    pub fn detach(&mut self, dynamics: &mut DynamicsWorld) {
        for bone in &mut self.bones {
            for c in &mut bone.constraints {
                c.constraint.detach(dynamics);
            }
        }
        for body in self.bodies_mut() {
            body.detach(dynamics);
        }
        self.attached = false;
    }

    /// Refresh body references and offsets of every joint; unchanged bindings are kept.
    fn bind_constraints(&mut self, dynamics: &mut DynamicsWorld) {
        for index in 0..self.bones.len() {
            let mut constraints = std::mem::take(&mut self.bones[index].constraints);
            let first = self.bones[index].body().and_then(BodyRef::of);
            let first_offset = self.bones[index].offset();
            for c in &mut constraints {
                let partner = &self.bones[c.partner];
                c.constraint.set_first_body(dynamics, first);
                c.constraint
                    .set_second_body(dynamics, partner.body().and_then(BodyRef::of), true);
                c.constraint.set_first_offset(dynamics, first_offset);
                c.constraint.set_second_offset(dynamics, partner.offset());
            }
            self.bones[index].constraints = constraints;
        }
    }

    /// Bones `a` and `b` may touch: different bones and not joined by an enabled joint.
    pub fn can_bones_collide(&self, a: usize, b: usize) -> bool {
        if a == b {
            return false;
        }
        let (Some(first), Some(second)) = (self.bones.get(a), self.bones.get(b)) else {
            return false;
        };
        let joined = |bone: &ColliderBone, other: usize| {
            bone.constraints
                .iter()
                .any(|c| c.partner == other && c.constraint.is_enabled() && !c.constraint.has_broken())
        };
        !(joined(first, b) || joined(second, a))
    }

    /// Goal world matrix of a bone body from the collider matrix and the animated pose.
    fn goal_matrix(&self, index: usize, collider_matrix: &DMat4, component: Option<&Component>) -> DMat4 {
        let bone = &self.bones[index];
        let bone_matrix = component
            .and_then(|c| c.bone_matrix(index).ok())
            .copied()
            .unwrap_or(bone.bone_matrix().matrix);
        collider_matrix * bone_matrix * bone.static_offset_matrix().matrix
    }

    /// Move every body, simulated ones included, to its goal pose and stop it.
    pub fn teleport(&mut self, collider_matrix: &DMat4, component: Option<&Component>) {
        for index in 0..self.bones.len() {
            if !self.bones[index].has_body() {
                continue;
            }
            let goal = self.goal_matrix(index, collider_matrix, component);
            let bone = &mut self.bones[index];
            bone.set_pose(matrix_position(&goal), matrix_orientation(&goal));
            bone.set_velocities(Vec3::zeros(), Vec3::zeros());
        }
    }

    /// Drive animated bones towards their goal pose.
    ///
    /// Behavior
    /// - Dynamic bones of a dynamic collider are skipped.
    /// - Velocities are the backward difference to the current pose, zero when `elapsed`
    ///   is too small to divide by.
    /// - The component must have its bone matrices prepared.
    pub fn prepare_for_detection(
        &mut self,
        collider_matrix: &DMat4,
        component: Option<&Component>,
        elapsed: f32,
        collider_dynamic: bool,
    ) {
        let factor = if elapsed > ELAPSED_EPS { 1.0 / elapsed } else { 0.0 };

        for index in 0..self.bones.len() {
            let bone = &self.bones[index];
            if !bone.has_body() || (collider_dynamic && bone.is_dynamic()) {
                continue;
            }
            let goal = self.goal_matrix(index, collider_matrix, component);
            let position = matrix_position(&goal);
            let orientation = matrix_orientation(&goal);

            let bone = &mut self.bones[index];
            let linear = to_f32(&(position - bone.position())) * factor;
            let angular = (orientation * bone.orientation().inverse()).scaled_axis() * factor;
            bone.set_pose(position, orientation);
            bone.set_velocities(linear, angular);
        }
    }

    /// Pull simulated bodies back into bones, the collider and the component.
    ///
    /// Behavior
    /// - A changed root bone moves the collider: `collider * S * root_collider = body`.
    ///   The component root pose is reset since the collider carries it.
    /// - Non-root dynamic bones write their pose into the component, parent first.
    ///
    /// Returns whether any bone changed.
    pub fn update_from_body(
        &mut self,
        dynamics: &DynamicsWorld,
        state: &mut ColliderState,
        component: Option<&mut Component>,
    ) -> bool {
        let mut any_changed = false;
        let mut root_changed = false;
        for bone in &mut self.bones {
            let Some(body) = &mut bone.body else {
                continue;
            };
            if !body.update_from_body(dynamics) {
                continue;
            }
            bone.pull_from_body();
            any_changed = true;
            root_changed |= Some(bone.index()) == self.root_bone;
        }
        if !any_changed {
            return false;
        }

        if root_changed && let Some(root) = self.root_bone {
            let bone = &self.bones[root];
            let rest = scale_matrix(&self.scale) * bone.collider_matrix().matrix;
            let matrix = bone.body_matrix() * matrix_inverse(&rest);
            state.set_position(matrix_position(&matrix));
            state.set_orientation(matrix_orientation(&matrix));
            state.set_linear_velocity(bone.linear_velocity());
            state.set_angular_velocity(bone.angular_velocity());
        }

        let Some(component) = component else {
            return true;
        };
        if root_changed && let Some(root) = self.root_bone {
            if let Err(err) = component.set_bone_pose(root, BonePose::default()) {
                log::warn!("root bone {root} pose not reset: {err}");
            }
        }

        let inverse_collider = *state.inverse_matrix();
        for index in 0..self.bones.len() {
            let bone = &self.bones[index];
            if Some(index) != self.root_bone && bone.is_dynamic() && bone.is_simulated() {
                let mut matrix = bone.local_matrix().inverse;
                if let Some(parent) = bone.parent()
                    && let Ok(parent_inverse) = component.bone_inverse_matrix(parent)
                {
                    matrix *= *parent_inverse;
                }
                matrix = matrix * inverse_collider * bone.body_matrix();
                let pose = BonePose {
                    position: transform_point(&matrix, &to_f64(&-bone.offset())),
                    rotation: matrix_orientation(&matrix),
                };
                if let Err(err) = component.set_bone_pose(index, pose) {
                    log::warn!("bone {index} pose not written back: {err}");
                }
            }
            if let Err(err) = component.update_bone(index) {
                log::warn!("bone {index} not updated: {err}");
            }
        }
        component.validate_bones();
        true
    }

    /// Push bone state and pending forces into the backend bodies.
    pub fn prepare_bodies_for_step(&mut self, dynamics: &mut DynamicsWorld) {
        for body in self.bodies_mut() {
            body.prepare_for_step(dynamics);
        }
    }

    /// Wake bodies whose bones changed since the last step.
    pub fn activate_dirty_physics_bodies(&mut self, dynamics: &mut DynamicsWorld) {
        for bone in &mut self.bones {
            if !bone.dirty {
                continue;
            }
            if let Some(body) = &bone.body {
                body.activate(dynamics);
            }
            bone.dirty = false;
        }
    }

    /// Bind, create and refresh friction motors of every joint.
    pub fn prepare_constraints_for_step(&mut self, dynamics: &mut DynamicsWorld, dt: f32) {
        self.bind_constraints(dynamics);
        for index in 0..self.bones.len() {
            let mut constraints = std::mem::take(&mut self.bones[index].constraints);
            for c in &mut constraints {
                let first = self.bones[index].body();
                let second = self.bones[c.partner].body();
                c.constraint.prepare_for_step(dynamics, first, second, dt);
            }
            self.bones[index].constraints = constraints;
        }
    }

    /// Joints that broke since the last check, each reported once.
    pub fn check_constraints_broke(&mut self, dynamics: &DynamicsWorld) -> Vec<BrokenConstraint> {
        let mut broken = Vec::new();
        for bone in &mut self.bones {
            let index = bone.index();
            for c in &mut bone.constraints {
                if !c.constraint.check_has_broken(dynamics) {
                    continue;
                }
                let def = self.rig.bones()[index].constraints[c.rig_index].clone();
                broken.push(BrokenConstraint {
                    bone: index,
                    constraint: c.rig_index,
                    def,
                });
            }
        }
        broken
    }

    fn find_constraint(&mut self, bone: usize, constraint: usize) -> Result<Option<&mut BoneConstraint>> {
        let rig_bone = self.rig.bone(bone)?;
        if constraint >= rig_bone.constraints.len() {
            return Err(PhysicsError::ConstraintIndexOutOfRange {
                index: constraint,
                count: rig_bone.constraints.len(),
            });
        }
        // Skipped rig constraints have no joint, so search by rig index.
        Ok(self.bones[bone]
            .constraints
            .iter_mut()
            .find(|c| c.rig_index == constraint))
    }

    pub fn enable_constraint(
        &mut self,
        dynamics: &mut DynamicsWorld,
        bone: usize,
        constraint: usize,
        enable: bool,
    ) -> Result<()> {
        if let Some(c) = self.find_constraint(bone, constraint)? {
            c.constraint.set_enabled(dynamics, enable);
        }
        Ok(())
    }

    /// Replace the joint of one rig constraint, keeping its partner.
    pub fn replace_constraint(
        &mut self,
        dynamics: &mut DynamicsWorld,
        bone: usize,
        constraint: usize,
        rc: &RigConstraint,
        config: &PhysicsConfig,
    ) -> Result<()> {
        let Some(partner) = self.find_constraint(bone, constraint)?.map(|c| c.partner) else {
            return Ok(());
        };
        if rc.partner_bone != Some(partner) {
            return Err(PhysicsError::InvalidParam("replacement constraint changes the partner bone"));
        }
        let def = self.constraint_def(bone, partner, rc);
        if let Some(c) = self.find_constraint(bone, constraint)? {
            c.constraint.set_constraint(dynamics, def, config);
        }
        Ok(())
    }

    /// Re-derive body response types; `bone` limits the update to one bone.
    pub fn update_physics_type(&mut self, response: ResponseType, bone: Option<usize>) -> Result<()> {
        let range = match bone {
            Some(index) => {
                self.bone(index)?;
                index..index + 1
            }
            None => 0..self.bones.len(),
        };
        for index in range {
            let dynamic = self.rig.bones()[index].dynamic;
            let bone = &mut self.bones[index];
            bone.set_dynamic(dynamic);
            bone.dirty = true;
            if let Some(body) = &mut bone.body {
                body.set_response_type(bone_response(response, dynamic));
            }
        }
        Ok(())
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        for body in self.bodies_mut() {
            body.set_gravity(gravity);
        }
    }

    pub fn set_enabled(&mut self, dynamics: &mut DynamicsWorld, enabled: bool) {
        for bone in &mut self.bones {
            if let Some(body) = &mut bone.body {
                body.set_enabled(enabled);
            }
            for c in &mut bone.constraints {
                c.constraint.set_enabled(dynamics, enabled);
            }
        }
    }

    /// Collider velocity changes reach only animated bones; simulated ones keep theirs.
    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        for bone in self.bones.iter_mut().filter(|b| !b.is_dynamic()) {
            if let Some(body) = &mut bone.body {
                body.set_linear_velocity(velocity);
            }
        }
    }

    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        for bone in self.bones.iter_mut().filter(|b| !b.is_dynamic()) {
            if let Some(body) = &mut bone.body {
                body.set_angular_velocity(velocity);
            }
        }
    }

    pub fn apply_force_field(&mut self, field: &ForceField, factors: &ForceFieldFactors, fluctuation: &Fluctuation) {
        for body in self.bodies_mut() {
            field.apply_to_body(body, factors, fluctuation);
        }
    }

    /// Share of the collider mass carried by `body`.
    fn mass_share(&self, body: &PhysicsBody) -> f32 {
        if self.total_mass > 0.0 {
            body.mass() / self.total_mass
        } else {
            0.0
        }
    }

    fn distribute(&mut self, amount: Vec3, mut apply: impl FnMut(&mut PhysicsBody, Vec3)) {
        if vec_is_zero(&amount, 0.0) {
            return;
        }
        let total = self.total_mass;
        for body in self.bodies_mut() {
            let share = if total > 0.0 { body.mass() / total } else { 0.0 };
            apply(body, amount * share);
        }
    }

    pub fn apply_impulse(&mut self, impulse: Vec3) {
        self.distribute(impulse, |b, i| b.apply_impulse(i));
    }

    pub fn apply_impulse_at(&mut self, impulse: Vec3, point: DVec3) {
        self.distribute(impulse, |b, i| b.apply_impulse_at(i, point));
    }

    pub fn apply_torque_impulse(&mut self, torque: Vec3) {
        self.distribute(torque, |b, t| b.apply_torque_impulse(t));
    }

    pub fn apply_force(&mut self, force: Vec3) {
        self.distribute(force, |b, f| b.apply_force(f));
    }

    pub fn apply_force_at(&mut self, force: Vec3, point: DVec3) {
        self.distribute(force, |b, f| b.apply_force_at(f, point));
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.distribute(torque, |b, t| b.apply_torque(t));
    }

    /// Impulse on a single bone body.
    pub fn apply_bone_impulse(&mut self, bone: usize, impulse: Vec3, point: Option<DVec3>) -> Result<()> {
        if let Some(body) = self.bone_mut(bone)?.body_mut() {
            match point {
                Some(point) => body.apply_impulse_at(impulse, point),
                None => body.apply_impulse(impulse),
            }
        }
        Ok(())
    }

    pub fn apply_bone_force(&mut self, bone: usize, force: Vec3, point: Option<DVec3>) -> Result<()> {
        if let Some(body) = self.bone_mut(bone)?.body_mut() {
            match point {
                Some(point) => body.apply_force_at(force, point),
                None => body.apply_force(force),
            }
        }
        Ok(())
    }

    /// Refresh bone collision volumes.
    ///
    /// Simulated bones use their body pose, the rest follow the animated pose.
    pub fn update_shapes(&mut self, collider_matrix: &DMat4, component: Option<&Component>) {
        let scale = scale_matrix(&self.scale);
        for index in 0..self.bones.len() {
            if !self.bones[index].has_body() {
                continue;
            }
            let matrix = if self.bones[index].is_simulated() {
                self.bones[index].real_matrix().matrix * scale
            } else {
                let goal = self.goal_matrix(index, collider_matrix, component);
                goal * self.bones[index].static_offset_matrix().inverse
            };
            self.bones[index].shapes.update_volumes(&matrix);
        }
    }

    pub fn point_inside(&self, point: &DVec3) -> bool {
        self.physics_bones().any(|b| b.shapes().point_inside(point))
    }

    /// Box enclosing every bone shape, `None` without shapes.
    pub fn calc_shape_extends(&self) -> Option<ExtentBox> {
        self.physics_bones()
            .filter_map(|b| b.shapes().enclosing_box())
            .reduce(|a, b| a.union(&b))
    }

    /// Broad-phase entries of every shaped bone body.
    pub fn scene_entries(&self, filter: CollisionFilter) -> Vec<SceneEntry> {
        self.physics_bones()
            .filter_map(|bone| {
                let body = bone.body()?;
                let shape = body.shape()?;
                Some(SceneEntry::new(
                    self.owner,
                    Some(bone.index()),
                    shape.shape.clone(),
                    body.iso(),
                    filter,
                ))
            })
            .collect()
    }

    /// Publish bone volumes, highlighting bones with a broken joint.
    pub fn publish_debug(&self, drawer: &mut DebugDrawer) {
        for bone in self.physics_bones() {
            let Some(body) = bone.body() else {
                continue;
            };
            let highlight = if bone.constraints.iter().any(|c| c.constraint.has_broken()) {
                Highlight::BrokenConstraint
            } else {
                Highlight::for_response(body.response_type())
            };
            drawer.push(DebugShape {
                owner: self.owner,
                bone: Some(bone.index()),
                volumes: bone.shapes().volumes().to_vec(),
                highlight,
            });
        }
    }

    /// Body mass fraction of one bone, `0` for bones without a body.
    pub fn bone_mass_share(&self, bone: usize) -> Result<f32> {
        Ok(self.bone(bone)?.body().map_or(0.0, |b| self.mass_share(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{math::matrix_position, rig::RigBone, shape::Shape};

    fn rig() -> Arc<Rig> {
        let joint = RigConstraint {
            partner_bone: Some(0),
            ..RigConstraint::default()
        };
        Arc::new(
            Rig::new(
                vec![
                    RigBone::new("pelvis", None, Vec3::zeros(), Quat::identity())
                        .with_shapes(vec![Shape::sphere(Vec3::zeros(), 0.5)])
                        .with_mass(3.0, Vec3::zeros())
                        .dynamic(true),
                    RigBone::new("spine", Some(0), Vec3::new(0.0, 2.0, 0.0), Quat::identity())
                        .with_shapes(vec![Shape::sphere(Vec3::zeros(), 0.3)])
                        .with_mass(1.0, Vec3::new(0.0, 0.5, 0.0))
                        .with_constraint(joint),
                    RigBone::new("tip", Some(1), Vec3::new(0.0, 1.0, 0.0), Quat::identity()),
                ],
                Some(0),
            )
            .expect("rig"),
        )
    }

    fn bones(response: ResponseType) -> ColliderBones {
        let mut state = ColliderState::default();
        state.set_position(DVec3::new(1.0, 0.0, 0.0));
        state.set_response_type(response);
        ColliderBones::new(ColliderId::new(0, 0), rig(), &mut state, None, &PhysicsConfig::default())
            .expect("bones")
    }

    #[test]
    fn bodies_only_for_shaped_bones() {
        let bones = bones(ResponseType::Dynamic);
        assert_eq!(bones.bone_count(), 3);
        assert!(bones.bone(0).expect("bone").has_body());
        assert!(!bones.bone(2).expect("bone").has_body());
        assert_eq!(bones.root_bone(), Some(0));
        assert!((bones.total_mass() - 4.0).abs() < 1.0e-6);
        assert!((bones.bone_mass_share(0).expect("share") - 0.75).abs() < 1.0e-6);
        assert!(bones.has_constraints());
        assert!(!bones.has_breakable_constraints());
    }

    #[test]
    fn response_follows_the_bone_dynamic_flag() {
        let dynamic = bones(ResponseType::Dynamic);
        let response = |b: &ColliderBones, i: usize| b.bone(i).expect("bone").body().expect("body").response_type();
        assert_eq!(response(&dynamic, 0), ResponseType::Dynamic);
        assert_eq!(response(&dynamic, 1), ResponseType::Kinematic);

        let kinematic = bones(ResponseType::Kinematic);
        assert_eq!(response(&kinematic, 0), ResponseType::Kinematic);
        assert_eq!(response(&bones(ResponseType::Static), 1), ResponseType::Static);
    }

    #[test]
    fn bodies_start_on_the_central_mass_point() {
        let bones = bones(ResponseType::Dynamic);
        let spine = bones.bone(1).expect("bone");
        assert!((spine.position() - DVec3::new(1.0, 2.5, 0.0)).norm() < 1.0e-6);
        let origin = matrix_position(&spine.real_matrix().matrix);
        assert!((origin - DVec3::new(1.0, 2.0, 0.0)).norm() < 1.0e-6);
    }

    #[test]
    fn second_frame_is_expressed_in_the_partner_bone() {
        let bones = bones(ResponseType::Dynamic);
        let c = &bones.bone(1).expect("bone").constraints()[0];
        assert_eq!((c.rig_index, c.partner), (0, 0));
        let frame2 = c.constraint.def().frame2.translation.vector;
        assert!((frame2 - Vec3::new(0.0, 2.0, 0.0)).norm() < 1.0e-6);
    }

    #[test]
    fn joined_bones_do_not_collide_until_the_joint_is_disabled() {
        let mut bones = bones(ResponseType::Dynamic);
        let mut dynamics = DynamicsWorld::new();
        assert!(!bones.can_bones_collide(0, 0));
        assert!(!bones.can_bones_collide(0, 1));
        assert!(!bones.can_bones_collide(1, 0));
        assert!(bones.can_bones_collide(0, 2));

        bones.enable_constraint(&mut dynamics, 1, 0, false).expect("enable");
        assert!(bones.can_bones_collide(0, 1));

        assert!(matches!(
            bones.enable_constraint(&mut dynamics, 1, 4, true),
            Err(PhysicsError::ConstraintIndexOutOfRange { index: 4, count: 1 })
        ));
        assert!(matches!(
            bones.enable_constraint(&mut dynamics, 9, 0, true),
            Err(PhysicsError::BoneIndexOutOfRange { index: 9, .. })
        ));
    }

    #[test]
    fn animated_bones_get_finite_difference_velocities() {
        let mut bones = bones(ResponseType::Kinematic);
        let moved = matrix_from(&DVec3::new(1.5, 0.0, 0.0), &Quat::identity());
        bones.prepare_for_detection(&moved, None, 0.5, false);
        let pelvis = bones.bone(0).expect("bone");
        assert!((pelvis.linear_velocity() - Vec3::new(1.0, 0.0, 0.0)).norm() < 1.0e-5);
        assert!(pelvis.angular_velocity().norm() < 1.0e-6);

        // Zero elapsed moves without velocity.
        bones.prepare_for_detection(&DMat4::identity(), None, 0.0, false);
        assert!(bones.bone(0).expect("bone").linear_velocity().norm() < 1.0e-9);
    }

    #[test]
    fn write_back_skips_bones_missing_from_the_component() {
        let mut bones = bones(ResponseType::Dynamic);
        let mut dynamics = DynamicsWorld::new();
        let mut state = ColliderState::default();
        state.set_position(DVec3::new(1.0, 0.0, 0.0));
        bones.attach(&mut dynamics, &matrix_from(&DVec3::new(1.0, 0.0, 0.0), &Quat::identity()), None);

        let key = bones.bone(0).expect("bone").body().and_then(PhysicsBody::key).expect("key");
        dynamics
            .rigid_body_mut(key)
            .expect("backend")
            .set_translation(Vec3::new(1.0, 0.5, 0.0), true);

        let pelvis_only = Rig::new(
            vec![RigBone::new("pelvis", None, Vec3::zeros(), Quat::identity())],
            Some(0),
        )
        .expect("rig");
        let mut component = Component::new(Arc::new(pelvis_only));
        assert!(bones.update_from_body(&dynamics, &mut state, Some(&mut component)));
        assert!((state.position() - DVec3::new(1.0, 0.5, 0.0)).norm() < 1.0e-5);
    }
}
