/*!
The simulation world: colliders, force fields and the dynamics backend, advanced by
[`World::step`].

Step phases
1) prepare detection: fluctuations, animated bone velocities, volumes, force fields,
2) kinematic detection: sweep and slide of kinematically simulated colliders, with
   script responses through [`ColliderListener`],
3) prepare for step: attachments, joints, backend body state,
4) dynamics: fixed sub-steps of the backend,
5) read-back of simulated poses, then attachments again,
6) finish detection: constraint break checks and debug output.

Notes
- Colliders live in generational slots. Callbacks may add or remove colliders; removed
  colliders are skipped from then on and their slot generation is bumped.
- Structural backend changes made from callbacks are queued and applied before the
  dynamics phase.
*/

use std::mem;

use crate::{
    body::ResponseType,
    collider::{
        Attachment, BrokenConstraint, Collider, ColliderId, ColliderJoint, ColliderKind, ColliderNotify,
        ColliderState, JointTarget, NotifyContext,
        sweep::{KinematicSweep, SweepStep},
    },
    collision::{
        broad::{CollisionScene, SceneEntry},
        filter::CollisionFilter,
        settings::SWEEP_TIME_EPS,
    },
    config::PhysicsConfig,
    constraint::ConstraintDef,
    debug_drawer::DebugDrawer,
    dynamics::DynamicsWorld,
    error::{PhysicsError, Result},
    force_field::ForceField,
    listener::ColliderListener,
    math::{DVec3, Quat, Transform, Vec3},
    rig::{BonePose, Component, Rig, RigConstraint},
    shape::Shape,
};

/// Gravity of a new world.
pub const DEFAULT_GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

/// Attachment chains longer than this are cut for the frame.
const MAX_ATTACHMENT_DEPTH: usize = 8;

#[derive(Default)]
struct Slot {
    generation: u32,
    collider: Option<Collider>,
}

/// Handle of a force field in a world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ForceFieldId(usize);

/// Counters of one [`World::step`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Colliders moved by kinematic sweeps.
    pub swept: usize,
    pub sweep_hits: usize,
    pub sub_steps: u32,
    /// Colliders moved by the dynamics backend.
    pub simulated: usize,
    /// Rig constraints and joints that broke.
    pub broken_constraints: usize,
}

pub struct World {
    slots: Vec<Slot>,
    free: Vec<u32>,
    fields: Vec<Option<ForceField>>,
    dynamics: DynamicsWorld,
    scene: CollisionScene,
    config: PhysicsConfig,
    gravity: Vec3,
    drawer: DebugDrawer,
}

impl Default for World {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl World {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            fields: Vec::new(),
            dynamics: DynamicsWorld::new(),
            scene: CollisionScene::default(),
            config,
            gravity: DEFAULT_GRAVITY,
            drawer: DebugDrawer::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }
    #[inline]
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }
    #[inline]
    pub fn dynamics(&self) -> &DynamicsWorld {
        &self.dynamics
    }
    #[inline]
    pub fn debug_drawer(&self) -> &DebugDrawer {
        &self.drawer
    }

    /// Change the world gravity; colliders without an override follow.
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
        for id in self.collider_ids() {
            if let Ok(mut collider) = self.collider_mut(id) {
                collider.notify(|state, notify, ctx| notify.gravity_changed(state, ctx));
            }
        }
    }

    // ---------------------------------------------------------------------------------
    // colliders

    /// Put a collider into the world and build its bodies.
    pub fn add_collider(&mut self, mut collider: Collider) -> Result<ColliderId> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let id = ColliderId::new(index, self.slots[index as usize].generation);
        if let Err(err) = collider.attach(id, &mut self.dynamics, &self.config, self.gravity) {
            self.free.push(index);
            return Err(err);
        }
        self.slots[index as usize].collider = Some(collider);
        Ok(id)
    }

    /// Take a collider out of the world. Its id goes stale.
    pub fn remove_collider(&mut self, id: ColliderId) -> Result<Collider> {
        let slot = self
            .slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation() && s.collider.is_some())
            .ok_or(PhysicsError::UnknownCollider(id))?;
        let Some(mut collider) = slot.collider.take() else {
            return Err(PhysicsError::UnknownCollider(id));
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());

        collider.detach(&mut self.dynamics);
        self.scene.remove_owner(id);
        Ok(collider)
    }

    #[inline]
    pub fn is_alive(&self, id: ColliderId) -> bool {
        self.collider(id).is_some()
    }

    pub fn collider(&self, id: ColliderId) -> Option<&Collider> {
        self.slots
            .get(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.collider.as_ref())
    }

    /// Mutable access; every change goes through the collider's notifications.
    pub fn collider_mut(&mut self, id: ColliderId) -> Result<ColliderMut<'_>> {
        let collider = self
            .slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.collider.as_mut())
            .ok_or(PhysicsError::UnknownCollider(id))?;
        Ok(ColliderMut {
            collider,
            dynamics: &mut self.dynamics,
            config: &self.config,
            gravity: self.gravity,
        })
    }

    pub fn collider_ids(&self) -> Vec<ColliderId> {
        self.colliders().map(Collider::id).collect()
    }

    pub fn colliders(&self) -> impl Iterator<Item = &Collider> {
        self.slots.iter().filter_map(|s| s.collider.as_ref())
    }

    #[inline]
    pub fn collider_count(&self) -> usize {
        self.colliders().count()
    }

    fn take_collider(&mut self, id: ColliderId) -> Option<Collider> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.collider.take())
    }

    fn put_back(&mut self, collider: Collider) {
        let id = collider.id();
        if let Some(slot) = self.slots.get_mut(id.index() as usize)
            && slot.generation == id.generation()
        {
            slot.collider = Some(collider);
        }
    }

    // ---------------------------------------------------------------------------------
    // force fields

    pub fn add_force_field(&mut self, field: ForceField) -> ForceFieldId {
        if let Some(index) = self.fields.iter().position(Option::is_none) {
            self.fields[index] = Some(field);
            return ForceFieldId(index);
        }
        self.fields.push(Some(field));
        ForceFieldId(self.fields.len() - 1)
    }

    pub fn remove_force_field(&mut self, id: ForceFieldId) -> Option<ForceField> {
        self.fields.get_mut(id.0).and_then(Option::take)
    }

    pub fn force_field(&self, id: ForceFieldId) -> Option<&ForceField> {
        self.fields.get(id.0).and_then(Option::as_ref)
    }

    pub fn force_field_mut(&mut self, id: ForceFieldId) -> Option<&mut ForceField> {
        self.fields.get_mut(id.0).and_then(Option::as_mut)
    }

    // ---------------------------------------------------------------------------------
    // step

    /// Advance the world by `elapsed` seconds.
    pub fn step(&mut self, elapsed: f32, listener: &mut dyn ColliderListener) -> StepReport {
        let mut report = StepReport::default();
        if elapsed <= 0.0 {
            return report;
        }

        self.prepare_detection(elapsed);

        self.dynamics.lock();
        if elapsed > SWEEP_TIME_EPS {
            self.detect_kinematic_collisions(elapsed, listener, &mut report);
        }
        self.dynamics.unlock();

        let dt = if self.config.max_sub_steps == 0 {
            elapsed
        } else {
            self.config.simulation_time_step
        };
        self.prepare_for_step(dt);
        report.sub_steps =
            self.dynamics
                .step_simulation(elapsed, self.config.max_sub_steps, self.config.simulation_time_step);

        if report.sub_steps > 0 {
            for slot in &mut self.slots {
                if let Some(collider) = slot.collider.as_mut()
                    && collider.update_from_body(&self.dynamics)
                {
                    report.simulated += 1;
                }
            }
        }
        self.propagate_attachments();

        report.broken_constraints = self.finish_detection(listener);
        report
    }

    fn prepare_detection(&mut self, elapsed: f32) {
        let fields: Vec<ForceField> = self.fields.iter().flatten().filter(|f| f.enabled).cloned().collect();
        for slot in &mut self.slots {
            if let Some(collider) = slot.collider.as_mut() {
                collider.prepare_for_detection(elapsed, &fields);
            }
        }
        let entries: Vec<SceneEntry> = self.colliders().flat_map(Collider::scene_entries).collect();
        self.scene = CollisionScene::build(entries);
    }

    /// Whether a sweep of `mover` may hit `entry`.
    fn sweep_accepts(&self, mover: ColliderId, filter: &CollisionFilter, ignore: &[ColliderId], entry: &SceneEntry) -> bool {
        if ignore.contains(&entry.owner) || !filter.collides(&entry.filter) {
            return false;
        }
        // Entries of colliders removed by a callback are still in the frame's scene.
        self.collider(entry.owner)
            .is_some_and(|other| !other.state().ignores(mover))
    }

    fn detect_kinematic_collisions(
        &mut self,
        elapsed: f32,
        listener: &mut dyn ColliderListener,
        report: &mut StepReport,
    ) {
        let ids: Vec<ColliderId> = self
            .colliders()
            .filter(|c| {
                let state = c.state();
                state.use_kinematic_simulation() || state.response_type() == ResponseType::Kinematic
            })
            .map(Collider::id)
            .collect();

        let mut scene = mem::take(&mut self.scene);
        for id in ids {
            let Some(collider) = self.collider_mut_raw(id) else {
                continue;
            };
            let sweep = KinematicSweep::begin(collider, elapsed);
            refresh_scene(&mut scene, collider);
            let Some(mut sweep) = sweep else {
                continue;
            };
            report.swept += 1;
            self.run_sweep(&mut sweep, &mut scene, listener, report);
        }
        self.scene = scene;
    }

    fn run_sweep(
        &mut self,
        sweep: &mut KinematicSweep,
        scene: &mut CollisionScene,
        listener: &mut dyn ColliderListener,
        report: &mut StepReport,
    ) {
        let id = sweep.id();
        loop {
            // Out of its slot while sweeping, so the scene filter can read the others.
            let Some(mut collider) = self.take_collider(id) else {
                return;
            };
            let filter = *collider.state().collision_filter();
            let ignore = collider.state().ignored().to_vec();
            let step = sweep.advance(&mut collider, scene, |entry| {
                self.sweep_accepts(id, &filter, &ignore, entry)
            });
            refresh_scene(scene, &collider);
            let fake = self.config.use_fake_dynamics && collider.state().response_type() == ResponseType::Dynamic;
            self.put_back(collider);

            let SweepStep::Hit(info) = step else {
                return;
            };
            report.sweep_hits += 1;
            if fake {
                if let Some(collider) = self.collider_mut_raw(id) {
                    sweep.fake_response(collider);
                }
            } else {
                listener.collision_response(self, &info);
            }

            let Some(collider) = self.collider_mut_raw(id) else {
                log::debug!("collider {id:?} removed during its collision response");
                return;
            };
            let resume = sweep.resume(collider);
            refresh_scene(scene, collider);
            if !resume {
                return;
            }
        }
    }

    fn collider_mut_raw(&mut self, id: ColliderId) -> Option<&mut Collider> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.collider.as_mut())
    }

    fn prepare_for_step(&mut self, dt: f32) {
        self.propagate_attachments();
        for slot in &mut self.slots {
            if let Some(collider) = slot.collider.as_mut() {
                collider.prepare_for_step(&mut self.dynamics, dt);
            }
        }
        self.prepare_joints(dt);
    }

    /// Bind collider joints to the current bodies of both ends.
    fn prepare_joints(&mut self, dt: f32) {
        for index in 0..self.slots.len() {
            let Some(collider) = self.slots[index].collider.as_mut() else {
                continue;
            };
            if collider.state().joints().is_empty() {
                continue;
            }
            let owner = collider.id();
            let mut joints = mem::take(&mut collider.state_mut().joints);

            let slots = &self.slots;
            let find = |id: ColliderId| {
                slots
                    .get(id.index() as usize)
                    .filter(|s| s.generation == id.generation())
                    .and_then(|s| s.collider.as_ref())
            };
            if let Some(collider) = find(owner) {
                for joint in &mut joints {
                    let body = collider.body();
                    let first = (body.body(joint.bone()), body.body_offset(joint.bone()));
                    let second = match joint.target() {
                        JointTarget::World => (None, Vec3::zeros()),
                        JointTarget::Collider { id, bone } => match find(id) {
                            Some(other) => (other.body().body(bone), other.body().body_offset(bone)),
                            None => (None, Vec3::zeros()),
                        },
                    };
                    joint.prepare_for_step(&mut self.dynamics, first, second, dt);
                }
            }

            if let Some(collider) = self.slots[index].collider.as_mut() {
                collider.state_mut().joints = joints;
            }
        }
    }

    /// Move attachment targets after their sources moved.
    fn propagate_attachments(&mut self) {
        for _ in 0..MAX_ATTACHMENT_DEPTH {
            let mut moves: Vec<(ColliderId, Transform)> = Vec::new();
            for slot in &mut self.slots {
                let Some(collider) = slot.collider.as_mut() else {
                    continue;
                };
                let (state, notify) = collider.split();
                if !state.dirty.attachments {
                    continue;
                }
                state.dirty.attachments = false;
                let attachments = mem::take(&mut state.attachments);
                let component = notify.parts_ref().1;
                let rig = notify.rig().map(|r| &**r);
                for attachment in &attachments {
                    moves.push((attachment.target(), attachment.world_transform(state, component, rig)));
                }
                state.attachments = attachments;
            }
            if moves.is_empty() {
                return;
            }
            for (target, transform) in moves {
                if let Ok(mut collider) = self.collider_mut(target) {
                    collider.set_position(transform.translation);
                    collider.set_orientation(transform.rotation);
                }
            }
        }
        log::warn!("attachment chain deeper than {MAX_ATTACHMENT_DEPTH}; rest moves next frame");
    }

    /// Report broken constraints and publish debug shapes. Returns the break count.
    fn finish_detection(&mut self, listener: &mut dyn ColliderListener) -> usize {
        let mut rig_breaks: Vec<(ColliderId, BrokenConstraint)> = Vec::new();
        let mut joint_breaks: Vec<(ColliderId, usize)> = Vec::new();
        for slot in &mut self.slots {
            let Some(collider) = slot.collider.as_mut() else {
                continue;
            };
            let id = collider.id();
            let broken = collider
                .kind_mut()
                .notify()
                .parts()
                .0
                .check_constraints_broke(&self.dynamics);
            rig_breaks.extend(broken.into_iter().map(|b| (id, b)));
            for (index, joint) in collider.state_mut().joints.iter_mut().enumerate() {
                if joint.constraint_mut().check_has_broken(&self.dynamics) {
                    joint_breaks.push((id, index));
                }
            }
        }

        let count = rig_breaks.len() + joint_breaks.len();
        for (id, broken) in &rig_breaks {
            if self.is_alive(*id) {
                listener.rig_constraint_broke(self, *id, broken);
            }
        }
        for (id, joint) in joint_breaks {
            if self.is_alive(id) {
                listener.constraint_broke(self, id, joint);
            }
        }

        self.drawer.clear();
        if self.config.debug_enabled {
            for collider in self.slots.iter().filter_map(|s| s.collider.as_ref()) {
                collider.publish_debug(&mut self.drawer);
            }
        }
        count
    }
}

/// Re-place the scene entries of `collider` at its body poses.
fn refresh_scene(scene: &mut CollisionScene, collider: &Collider) {
    let body = collider.body();
    scene.update_owner(collider.id(), |bone| body.body(bone).map(|b| b.iso()));
}

/// A collider borrowed from its world. Setters record the change and run the matching
/// notification.
pub struct ColliderMut<'w> {
    collider: &'w mut Collider,
    dynamics: &'w mut DynamicsWorld,
    config: &'w PhysicsConfig,
    gravity: Vec3,
}

impl ColliderMut<'_> {
    #[inline]
    pub fn collider(&self) -> &Collider {
        self.collider
    }
    #[inline]
    pub fn id(&self) -> ColliderId {
        self.collider.id()
    }

    fn notify<R>(
        &mut self,
        f: impl FnOnce(&mut ColliderState, &mut dyn ColliderNotify, &mut NotifyContext<'_>) -> R,
    ) -> R {
        let mut ctx = NotifyContext {
            owner: self.collider.id(),
            dynamics: &mut *self.dynamics,
            config: self.config,
            world_gravity: self.gravity,
        };
        let (state, notify) = self.collider.split();
        f(state, notify, &mut ctx)
    }

    pub fn set_position(&mut self, position: DVec3) {
        self.notify(|state, notify, ctx| {
            state.set_position(position);
            notify.position_changed(state, ctx);
        });
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.notify(|state, notify, ctx| {
            state.set_orientation(orientation);
            notify.orientation_changed(state, ctx);
        });
    }

    /// Rebuilds the bodies; the old scale stays when that fails.
    pub fn set_scale(&mut self, scale: Vec3) -> Result<()> {
        if scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(PhysicsError::InvalidParam("scale must be positive"));
        }
        self.notify(|state, notify, ctx| {
            let old = state.scale();
            state.set_scale(scale);
            let result = notify.scale_changed(state, ctx);
            if result.is_err() {
                state.set_scale(old);
            }
            result
        })
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.notify(|state, notify, ctx| {
            state.set_linear_velocity(velocity);
            notify.linear_velocity_changed(state, ctx);
        });
    }

    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.notify(|state, notify, ctx| {
            state.set_angular_velocity(velocity);
            notify.angular_velocity_changed(state, ctx);
        });
    }

    /// Gravity override; `None` follows the world.
    pub fn set_gravity(&mut self, gravity: Option<Vec3>) {
        self.notify(|state, notify, ctx| {
            state.set_local_gravity(gravity);
            notify.gravity_changed(state, ctx);
        });
    }

    pub fn set_mass(&mut self, mass: f32) -> Result<()> {
        if !mass.is_finite() || mass < 0.0 {
            return Err(PhysicsError::InvalidParam("mass must be finite and not negative"));
        }
        self.notify(|state, notify, ctx| {
            state.set_mass(mass);
            notify.properties_changed(state, ctx);
        });
        Ok(())
    }

    pub fn set_force_field_factors(&mut self, factors: crate::collider::ForceFieldFactors) {
        self.notify(|state, notify, ctx| {
            state.set_force_field_factors(factors);
            notify.properties_changed(state, ctx);
        });
    }

    pub fn set_response_type(&mut self, response_type: ResponseType) {
        self.notify(|state, notify, ctx| {
            state.set_response_type(response_type);
            notify.response_type_changed(state, ctx);
        });
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.notify(|state, notify, ctx| {
            state.set_enabled(enabled);
            notify.enabled_changed(state, ctx);
        });
    }

    pub fn set_collision_filter(&mut self, filter: CollisionFilter) {
        self.notify(|state, notify, ctx| {
            state.set_collision_filter(filter);
            notify.collision_filter_changed(state, ctx);
        });
    }

    /// Stop colliding with `other`. Returns false if it was ignored already.
    pub fn add_ignore(&mut self, other: ColliderId) -> bool {
        self.notify(|state, notify, ctx| {
            let added = state.add_ignore(other);
            if added {
                notify.collision_filter_changed(state, ctx);
            }
            added
        })
    }

    pub fn remove_ignore(&mut self, other: ColliderId) -> bool {
        self.notify(|state, notify, ctx| {
            let removed = state.remove_ignore(other);
            if removed {
                notify.collision_filter_changed(state, ctx);
            }
            removed
        })
    }

    /// Replace the shapes of a volume collider.
    pub fn set_shapes(&mut self, shapes: Vec<Shape>) -> Result<()> {
        let ColliderKind::Volume(volume) = self.collider.kind_mut() else {
            return Err(PhysicsError::InvalidParam("not a volume collider"));
        };
        volume.set_shapes(shapes);
        self.notify(|state, notify, ctx| notify.geometry_changed(state, ctx))
    }

    /// Replace the rig of a rig collider.
    pub fn set_rig(&mut self, rig: Option<std::sync::Arc<Rig>>) -> Result<()> {
        let ColliderKind::Rig(rigged) = self.collider.kind_mut() else {
            return Err(PhysicsError::InvalidParam("not a rig collider"));
        };
        rigged.set_rig(rig);
        self.notify(|state, notify, ctx| notify.rig_changed(state, ctx))?;
        self.collider.resolve_attachments();
        Ok(())
    }

    /// Replace the animated component of a component collider.
    pub fn set_component(&mut self, component: Option<Component>) -> Result<()> {
        let ColliderKind::Component(animated) = self.collider.kind_mut() else {
            return Err(PhysicsError::InvalidParam("not a component collider"));
        };
        animated.set_component(component);
        self.notify(|state, notify, ctx| notify.component_changed(state, ctx))?;
        self.collider.resolve_attachments();
        Ok(())
    }

    /// Pose one bone of the animated component.
    pub fn set_bone_pose(&mut self, bone: usize, pose: BonePose) -> Result<()> {
        let ColliderKind::Component(animated) = self.collider.kind_mut() else {
            return Err(PhysicsError::InvalidParam("not a component collider"));
        };
        let component = animated
            .component_mut()
            .ok_or(PhysicsError::InvalidParam("collider has no component"))?;
        component.set_bone_pose(bone, pose)
    }

    /// Re-read the dynamic flags of the rig bones; `bone: None` for all bones.
    pub fn bone_changed(&mut self, bone: Option<usize>) -> Result<()> {
        self.notify(|state, notify, _| notify.bone_changed(state, bone))
    }

    /// Enable or disable one rig constraint of a bone collider.
    pub fn enable_rig_constraint(&mut self, bone: usize, constraint: usize, enable: bool) -> Result<()> {
        let dynamics = &mut *self.dynamics;
        let bones = self
            .collider
            .kind_mut()
            .notify()
            .parts()
            .0
            .bones_mut()
            .ok_or(PhysicsError::InvalidParam("collider has no bones"))?;
        bones.enable_constraint(dynamics, bone, constraint, enable)
    }

    /// Swap the limits of one rig constraint. The partner bone must stay the same.
    pub fn replace_rig_constraint(&mut self, bone: usize, constraint: usize, replacement: &RigConstraint) -> Result<()> {
        let dynamics = &mut *self.dynamics;
        let config = self.config;
        let bones = self
            .collider
            .kind_mut()
            .notify()
            .parts()
            .0
            .bones_mut()
            .ok_or(PhysicsError::InvalidParam("collider has no bones"))?;
        bones.replace_constraint(dynamics, bone, constraint, replacement, config)
    }

    pub fn add_attachment(&mut self, mut attachment: Attachment) {
        attachment.resolve(self.collider.current_rig().map(|r| &**r));
        let state = self.collider.state_mut();
        state.attachments.push(attachment);
        state.dirty.attachments = true;
    }

    /// Drop every attachment of `target`. Returns whether any existed.
    pub fn remove_attachment(&mut self, target: ColliderId) -> bool {
        let attachments = &mut self.collider.state_mut().attachments;
        let before = attachments.len();
        attachments.retain(|a| a.target() != target);
        before != attachments.len()
    }

    /// Add a joint from `bone` (or the main body) to `target`. Returns its index.
    pub fn add_joint(&mut self, def: ConstraintDef, bone: Option<usize>, target: JointTarget) -> Result<usize> {
        if let Some(index) = bone {
            let count = self.collider.bones().map_or(0, |b| b.bone_count());
            if index >= count {
                return Err(PhysicsError::BoneIndexOutOfRange { index, count });
            }
        }
        let mut joint = ColliderJoint::new(def, bone, target, self.config);
        joint.constraint_mut().attach(self.dynamics);
        let joints = &mut self.collider.state_mut().joints;
        joints.push(joint);
        Ok(joints.len() - 1)
    }

    pub fn remove_joint(&mut self, index: usize) -> Result<()> {
        let joints = &mut self.collider.state_mut().joints;
        if index >= joints.len() {
            return Err(PhysicsError::ConstraintIndexOutOfRange {
                index,
                count: joints.len(),
            });
        }
        let mut joint = joints.remove(index);
        joint.constraint_mut().detach(self.dynamics);
        Ok(())
    }

    pub fn set_joint_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        let joints = &mut self.collider.state_mut().joints;
        let count = joints.len();
        let joint = joints
            .get_mut(index)
            .ok_or(PhysicsError::ConstraintIndexOutOfRange { index, count })?;
        joint.constraint_mut().set_enabled(self.dynamics, enabled);
        Ok(())
    }

    /// The animated component, for driving the animation.
    pub fn component_mut(&mut self) -> Option<&mut Component> {
        match self.collider.kind_mut() {
            ColliderKind::Component(animated) => animated.component_mut(),
            _ => None,
        }
    }

    pub fn apply_force(&mut self, force: Vec3, point: Option<DVec3>) {
        self.collider.kind_mut().notify().parts().0.apply_force(force, point);
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, point: Option<DVec3>) {
        self.collider.kind_mut().notify().parts().0.apply_impulse(impulse, point);
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.collider.kind_mut().notify().parts().0.apply_torque(torque);
    }

    pub fn apply_torque_impulse(&mut self, torque: Vec3) {
        self.collider.kind_mut().notify().parts().0.apply_torque_impulse(torque);
    }

    pub fn apply_bone_force(&mut self, bone: usize, force: Vec3, point: Option<DVec3>) -> Result<()> {
        self.bones_mut()?.apply_bone_force(bone, force, point)
    }

    pub fn apply_bone_impulse(&mut self, bone: usize, impulse: Vec3, point: Option<DVec3>) -> Result<()> {
        self.bones_mut()?.apply_bone_impulse(bone, impulse, point)
    }

    fn bones_mut(&mut self) -> Result<&mut crate::collider::ColliderBones> {
        self.collider
            .kind_mut()
            .notify()
            .parts()
            .0
            .bones_mut()
            .ok_or(PhysicsError::InvalidParam("collider has no bones"))
    }
}
