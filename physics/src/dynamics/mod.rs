/*!
Rigid-body dynamics world.

Wraps the rapier sets and pipeline. Bodies, collision objects and joints are addressed by
keys owned by this crate; the backend handles behind them may change when a body is
recreated or the broadphase is cleared.

While locked (during kinematic detection), structural changes are queued in
[`DelayedOperations`] and applied in a fixed order on [`DynamicsWorld::unlock`].
*/

mod delayed;

pub use delayed::{DelayedOperation, DelayedOperations};

use std::collections::HashMap;

use rapier3d::prelude::*;

use crate::{
    collider::ColliderId,
    collision::{filter::CollisionFilter, settings::BREAKING_APPLY_EPS},
    owner::unpack_owner,
};

/// Key of one backend body slot (a rigid body plus at most one collision object).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyKey(pub(crate) u32);

/// Key of one backend joint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointKey(pub(crate) u32);

#[derive(Clone, Copy, Debug, Default)]
struct BackendBody {
    body: Option<RigidBodyHandle>,
    collider: Option<ColliderHandle>,
}

#[derive(Clone, Copy, Debug)]
struct BackendJoint {
    handle: ImpulseJointHandle,
    breaking_threshold: f32,
}

/// Contact rules of one collider, consulted for every backend contact pair.
#[derive(Clone, Debug, Default)]
pub struct ContactRules {
    pub filter: CollisionFilter,
    pub ignore: Vec<ColliderId>,
    pub enabled: bool,
}

struct ContactFilter<'a> {
    rules: &'a HashMap<ColliderId, ContactRules>,
}

impl ContactFilter<'_> {
    fn allowed(&self, a: ColliderId, b: ColliderId) -> bool {
        let (Some(ra), Some(rb)) = (self.rules.get(&a), self.rules.get(&b)) else {
            return true;
        };
        ra.enabled
            && rb.enabled
            && ra.filter.collides(&rb.filter)
            && !ra.ignore.contains(&b)
            && !rb.ignore.contains(&a)
    }
}

impl PhysicsHooks for ContactFilter<'_> {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let owner = |h| {
            context
                .colliders
                .get(h)
                .and_then(|c: &Collider| unpack_owner(c.user_data))
        };
        match (owner(context.collider1), owner(context.collider2)) {
            (Some(a), Some(b)) if a.collider == b.collider => {
                // Bones of one collider touch each other unless they are the same bone;
                // jointed bones are excluded by the joint itself.
                (a.bone != b.bone).then_some(SolverFlags::COMPUTE_IMPULSES)
            }
            (Some(a), Some(b)) => self
                .allowed(a.collider, b.collider)
                .then_some(SolverFlags::COMPUTE_IMPULSES),
            _ => Some(SolverFlags::COMPUTE_IMPULSES),
        }
    }
}

pub struct DynamicsWorld {
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    ground: RigidBodyHandle,

    handles: HashMap<BodyKey, BackendBody>,
    joints: HashMap<JointKey, BackendJoint>,
    rules: HashMap<ColliderId, ContactRules>,
    next_body: u32,
    next_joint: u32,

    delayed: DelayedOperations,
    locked: bool,
    local_time: f32,
}

impl Default for DynamicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicsWorld {
    pub fn new() -> Self {
        let mut bodies = RigidBodySet::new();
        let ground = bodies.insert(RigidBodyBuilder::fixed().build());
        Self {
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            ground,
            handles: HashMap::new(),
            joints: HashMap::new(),
            rules: HashMap::new(),
            next_body: 0,
            next_joint: 0,
            delayed: DelayedOperations::default(),
            locked: false,
            local_time: 0.0,
        }
    }

    /// Reserve a key for a new backend body slot.
    pub fn create_key(&mut self) -> BodyKey {
        let key = BodyKey(self.next_body);
        self.next_body += 1;
        key
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Start queueing structural changes.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Stop queueing and apply every queued change in drain order.
    pub fn unlock(&mut self) {
        self.locked = false;
        if self.delayed.is_empty() {
            return;
        }
        let ops = self.delayed.drain();
        log::debug!("draining {} delayed dynamics operations", ops.len());
        for op in ops {
            match op {
                DelayedOperation::ClearBroadphase => self.clear_broadphase_now(),
                DelayedOperation::RemoveCollisionObject(key) => {
                    self.remove_collision_object_now(key)
                }
                DelayedOperation::RemoveRigidBody(key) => self.remove_rigid_body_now(key),
                DelayedOperation::AddRigidBody(key, body) => self.add_rigid_body_now(key, body),
                DelayedOperation::AddCollisionObject(key, collider) => {
                    self.add_collision_object_now(key, collider)
                }
            }
        }
    }

    #[inline]
    pub fn pending_operations(&self) -> usize {
        self.delayed.len()
    }

    pub fn add_rigid_body(&mut self, key: BodyKey, body: RigidBody) {
        if self.locked {
            self.delayed.push(DelayedOperation::AddRigidBody(key, body));
        } else {
            self.add_rigid_body_now(key, body);
        }
    }

    pub fn add_collision_object(&mut self, key: BodyKey, collider: Collider) {
        if self.locked {
            self.delayed
                .push(DelayedOperation::AddCollisionObject(key, collider));
        } else {
            self.add_collision_object_now(key, collider);
        }
    }

    /// Remove the collision object of `key`. A queued addition is cancelled instead.
    pub fn remove_collision_object(&mut self, key: BodyKey) {
        if self.delayed.cancel_add_collision_object(key) {
            return;
        }
        if self.locked {
            self.delayed
                .push(DelayedOperation::RemoveCollisionObject(key));
        } else {
            self.remove_collision_object_now(key);
        }
    }

    /// Remove the rigid body of `key` (and its collision object). Queued additions for
    /// the key are cancelled instead.
    pub fn remove_rigid_body(&mut self, key: BodyKey) {
        let had_pending_collider = self.delayed.cancel_add_collision_object(key);
        let had_pending_body = self.delayed.cancel_add_rigid_body(key);
        let exists = self.handles.get(&key).is_some_and(|h| h.body.is_some());
        if !exists {
            if !(had_pending_body || had_pending_collider) {
                log::debug!("remove of unknown rigid body {key:?} ignored");
            }
            return;
        }
        if self.locked {
            self.delayed.push(DelayedOperation::RemoveRigidBody(key));
        } else {
            self.remove_rigid_body_now(key);
        }
    }

    /// Drop cached broadphase and contact state so contact pairs are re-filtered.
    pub fn clear_broadphase(&mut self) {
        if self.locked {
            self.delayed.push(DelayedOperation::ClearBroadphase);
        } else {
            self.clear_broadphase_now();
        }
    }

    fn add_rigid_body_now(&mut self, key: BodyKey, body: RigidBody) {
        let handle = self.bodies.insert(body);
        let entry = self.handles.entry(key).or_default();
        if let Some(old) = entry.body.replace(handle) {
            log::warn!("rigid body {key:?} added twice; replacing the old backend body");
            self.bodies.remove(
                old,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
        }
    }

    fn add_collision_object_now(&mut self, key: BodyKey, collider: Collider) {
        let Some(entry) = self.handles.get_mut(&key) else {
            log::warn!("collision object for {key:?} has no rigid body; dropped");
            return;
        };
        let Some(parent) = entry.body else {
            log::warn!("collision object for {key:?} has no rigid body; dropped");
            return;
        };
        if let Some(old) = entry.collider.take() {
            self.colliders
                .remove(old, &mut self.islands, &mut self.bodies, true);
        }
        entry.collider = Some(
            self.colliders
                .insert_with_parent(collider, parent, &mut self.bodies),
        );
    }

    fn remove_collision_object_now(&mut self, key: BodyKey) {
        if let Some(handle) = self.handles.get_mut(&key).and_then(|e| e.collider.take()) {
            self.colliders
                .remove(handle, &mut self.islands, &mut self.bodies, true);
        }
    }

    fn remove_rigid_body_now(&mut self, key: BodyKey) {
        let Some(entry) = self.handles.remove(&key) else {
            return;
        };
        if let Some(handle) = entry.body {
            self.bodies.remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
        }
        // Joints attached to the body went with it.
        let impulse_joints = &self.impulse_joints;
        self.joints
            .retain(|_, j| impulse_joints.get(j.handle).is_some());
    }

    fn clear_broadphase_now(&mut self) {
        // Re-inserting a collision object drops its proxies and contact pairs.
        for entry in self.handles.values_mut() {
            let (Some(body), Some(collider)) = (entry.body, entry.collider) else {
                continue;
            };
            if let Some(co) =
                self.colliders
                    .remove(collider, &mut self.islands, &mut self.bodies, false)
            {
                entry.collider = Some(self.colliders.insert_with_parent(co, body, &mut self.bodies));
            }
        }
    }

    #[inline]
    pub fn has_rigid_body(&self, key: BodyKey) -> bool {
        self.handles.get(&key).is_some_and(|e| e.body.is_some())
    }

    /// True when the key has a backend body or one is queued.
    pub fn is_known(&self, key: BodyKey) -> bool {
        self.has_rigid_body(key) || self.delayed.has_pending_rigid_body(key)
    }

    pub fn rigid_body(&self, key: BodyKey) -> Option<&RigidBody> {
        let handle = self.handles.get(&key)?.body?;
        self.bodies.get(handle)
    }

    pub fn rigid_body_mut(&mut self, key: BodyKey) -> Option<&mut RigidBody> {
        let handle = self.handles.get(&key)?.body?;
        self.bodies.get_mut(handle)
    }

    #[inline]
    pub fn rigid_body_count(&self) -> usize {
        self.handles.values().filter(|e| e.body.is_some()).count()
    }

    #[inline]
    pub fn collision_object_count(&self) -> usize {
        self.colliders.len()
    }

    /// Insert a joint between two body slots. `second == None` anchors the joint to the
    /// world. Returns `None` when a referenced body has no backend body yet.
    pub fn add_joint(
        &mut self,
        first: BodyKey,
        second: Option<BodyKey>,
        joint: GenericJoint,
        breaking_threshold: f32,
    ) -> Option<JointKey> {
        let h1 = self.handles.get(&first)?.body?;
        let h2 = match second {
            Some(key) => self.handles.get(&key)?.body?,
            None => self.ground,
        };
        let handle = self.impulse_joints.insert(h1, h2, joint, true);
        let key = JointKey(self.next_joint);
        self.next_joint += 1;
        self.joints.insert(
            key,
            BackendJoint {
                handle,
                breaking_threshold,
            },
        );
        Some(key)
    }

    pub fn remove_joint(&mut self, key: JointKey) {
        if let Some(joint) = self.joints.remove(&key) {
            self.impulse_joints.remove(joint.handle, true);
        }
    }

    #[inline]
    pub fn has_joint(&self, key: JointKey) -> bool {
        self.joints
            .get(&key)
            .is_some_and(|j| self.impulse_joints.get(j.handle).is_some())
    }

    pub fn joint_mut(&mut self, key: JointKey) -> Option<&mut GenericJoint> {
        let handle = self.joints.get(&key)?.handle;
        self.impulse_joints.get_mut(handle, true).map(|j| &mut j.data)
    }

    pub fn is_joint_enabled(&self, key: JointKey) -> Option<bool> {
        let handle = self.joints.get(&key)?.handle;
        self.impulse_joints.get(handle).map(|j| j.data.is_enabled())
    }

    pub fn set_joint_enabled(&mut self, key: JointKey, enabled: bool) {
        if let Some(joint) = self.joint_mut(key) {
            joint.set_enabled(enabled);
        }
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn set_contact_rules(&mut self, owner: ColliderId, rules: ContactRules) {
        self.rules.insert(owner, rules);
    }

    pub fn remove_contact_rules(&mut self, owner: ColliderId) {
        self.rules.remove(&owner);
    }

    /// Advance the simulation.
    ///
    /// With `max_sub_steps > 0`, elapsed time is accumulated and consumed in
    /// `fixed_time_step` slices, at most `max_sub_steps` per call; leftover beyond the cap
    /// is dropped. With `max_sub_steps == 0` a single step of `elapsed` is taken.
    /// Returns the number of steps performed.
    pub fn step_simulation(&mut self, elapsed: f32, max_sub_steps: u32, fixed_time_step: f32) -> u32 {
        let (count, dt) = sub_step_plan(&mut self.local_time, elapsed, max_sub_steps, fixed_time_step);
        if count == 0 {
            return 0;
        }
        self.integration_parameters.dt = dt;
        for _ in 0..count {
            self.step_once();
            self.break_overloaded_joints();
        }
        count
    }

    fn step_once(&mut self) {
        let hooks = ContactFilter { rules: &self.rules };
        let gravity = Vector::zeros();
        self.pipeline.step(
            &gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &hooks,
            &(),
        );
    }

    /// Disable every joint whose last impulse exceeded its breaking threshold.
    fn break_overloaded_joints(&mut self) {
        for (key, joint) in &self.joints {
            if joint.breaking_threshold <= BREAKING_APPLY_EPS {
                continue;
            }
            let Some(backend) = self.impulse_joints.get_mut(joint.handle, false) else {
                continue;
            };
            if !backend.data.is_enabled() {
                continue;
            }
            let impulse = backend.impulses.fixed_rows::<3>(0).norm();
            if impulse > joint.breaking_threshold {
                log::debug!(
                    "joint {key:?} impulse {impulse:.4} exceeds threshold {:.4}",
                    joint.breaking_threshold
                );
                backend.data.set_enabled(false);
            }
        }
    }
}

/// Sub-step count and step length for one call of [`DynamicsWorld::step_simulation`].
pub(crate) fn sub_step_plan(
    local_time: &mut f32,
    elapsed: f32,
    max_sub_steps: u32,
    fixed_time_step: f32,
) -> (u32, f32) {
    if max_sub_steps == 0 || fixed_time_step <= 0.0 {
        return if elapsed > 0.0 { (1, elapsed) } else { (0, 0.0) };
    }
    *local_time += elapsed.max(0.0);
    if *local_time < fixed_time_step {
        return (0, fixed_time_step);
    }
    let steps = (*local_time / fixed_time_step) as u32;
    *local_time -= steps as f32 * fixed_time_step;
    (steps.min(max_sub_steps), fixed_time_step)
}
