use rapier3d::prelude::{Collider, RigidBody};

use super::BodyKey;

/// One backend mutation deferred while the dynamics world is locked.
pub enum DelayedOperation {
    ClearBroadphase,
    RemoveCollisionObject(BodyKey),
    RemoveRigidBody(BodyKey),
    AddRigidBody(BodyKey, RigidBody),
    AddCollisionObject(BodyKey, Collider),
}

impl DelayedOperation {
    fn rank(&self) -> u8 {
        match self {
            DelayedOperation::ClearBroadphase => 0,
            DelayedOperation::RemoveCollisionObject(_) => 1,
            DelayedOperation::RemoveRigidBody(_) => 2,
            DelayedOperation::AddRigidBody(..) => 3,
            DelayedOperation::AddCollisionObject(..) => 4,
        }
    }
}

/// Backend mutations queued during a locked step.
///
/// Draining always yields: clear broadphase, remove collision objects, remove rigid
/// bodies, add rigid bodies, add collision objects. Within one kind, request order is
/// kept. Removals run before additions so a key recreated during the lock never sees its
/// fresh backend object removed.
#[derive(Default)]
pub struct DelayedOperations {
    clear_broadphase: bool,
    remove_collision_objects: Vec<BodyKey>,
    remove_rigid_bodies: Vec<BodyKey>,
    add_rigid_bodies: Vec<(BodyKey, RigidBody)>,
    add_collision_objects: Vec<(BodyKey, Collider)>,
}

impl DelayedOperations {
    pub fn push(&mut self, op: DelayedOperation) {
        match op {
            DelayedOperation::ClearBroadphase => self.clear_broadphase = true,
            DelayedOperation::RemoveCollisionObject(key) => {
                if !self.remove_collision_objects.contains(&key) {
                    self.remove_collision_objects.push(key);
                }
            }
            DelayedOperation::RemoveRigidBody(key) => {
                if !self.remove_rigid_bodies.contains(&key) {
                    self.remove_rigid_bodies.push(key);
                }
            }
            DelayedOperation::AddRigidBody(key, body) => self.add_rigid_bodies.push((key, body)),
            DelayedOperation::AddCollisionObject(key, collider) => {
                self.add_collision_objects.push((key, collider))
            }
        }
    }

    /// Drop a pending rigid body addition for `key`; true if one was queued.
    pub fn cancel_add_rigid_body(&mut self, key: BodyKey) -> bool {
        let before = self.add_rigid_bodies.len();
        self.add_rigid_bodies.retain(|(k, _)| *k != key);
        before != self.add_rigid_bodies.len()
    }

    /// Drop a pending collision object addition for `key`; true if one was queued.
    pub fn cancel_add_collision_object(&mut self, key: BodyKey) -> bool {
        let before = self.add_collision_objects.len();
        self.add_collision_objects.retain(|(k, _)| *k != key);
        before != self.add_collision_objects.len()
    }

    pub fn has_pending_rigid_body(&self, key: BodyKey) -> bool {
        self.add_rigid_bodies.iter().any(|(k, _)| *k == key)
    }

    pub fn len(&self) -> usize {
        usize::from(self.clear_broadphase)
            + self.remove_collision_objects.len()
            + self.remove_rigid_bodies.len()
            + self.add_rigid_bodies.len()
            + self.add_collision_objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every queued operation in drain order.
    pub fn drain(&mut self) -> Vec<DelayedOperation> {
        let mut ops = Vec::with_capacity(self.len());
        if std::mem::take(&mut self.clear_broadphase) {
            ops.push(DelayedOperation::ClearBroadphase);
        }
        ops.extend(
            self.remove_collision_objects
                .drain(..)
                .map(DelayedOperation::RemoveCollisionObject),
        );
        ops.extend(self.remove_rigid_bodies.drain(..).map(DelayedOperation::RemoveRigidBody));
        ops.extend(
            self.add_rigid_bodies
                .drain(..)
                .map(|(k, b)| DelayedOperation::AddRigidBody(k, b)),
        );
        ops.extend(
            self.add_collision_objects
                .drain(..)
                .map(|(k, c)| DelayedOperation::AddCollisionObject(k, c)),
        );
        debug_assert!(ops.windows(2).all(|w| w[0].rank() <= w[1].rank()));
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::prelude::{ColliderBuilder, RigidBodyBuilder};

    fn ranks(ops: &[DelayedOperation]) -> Vec<u8> {
        ops.iter().map(DelayedOperation::rank).collect()
    }

    #[test]
    fn drain_uses_fixed_order_regardless_of_request_order() {
        let mut q = DelayedOperations::default();
        q.push(DelayedOperation::AddCollisionObject(BodyKey(1), ColliderBuilder::ball(1.0).build()));
        q.push(DelayedOperation::AddRigidBody(BodyKey(1), RigidBodyBuilder::dynamic().build()));
        q.push(DelayedOperation::RemoveRigidBody(BodyKey(0)));
        q.push(DelayedOperation::RemoveCollisionObject(BodyKey(0)));
        q.push(DelayedOperation::ClearBroadphase);

        let ops = q.drain();
        assert_eq!(ranks(&ops), vec![0, 1, 2, 3, 4]);
        assert!(q.is_empty());
    }

    #[test]
    fn duplicate_removals_collapse() {
        let mut q = DelayedOperations::default();
        q.push(DelayedOperation::RemoveRigidBody(BodyKey(3)));
        q.push(DelayedOperation::RemoveRigidBody(BodyKey(3)));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn cancel_pending_addition() {
        let mut q = DelayedOperations::default();
        q.push(DelayedOperation::AddRigidBody(BodyKey(4), RigidBodyBuilder::fixed().build()));
        assert!(q.has_pending_rigid_body(BodyKey(4)));
        assert!(q.cancel_add_rigid_body(BodyKey(4)));
        assert!(!q.cancel_add_rigid_body(BodyKey(4)));
        assert!(q.is_empty());
    }
}
