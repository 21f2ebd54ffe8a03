use std::sync::Arc;

use super::{ColliderBody, ColliderId, ColliderNotify, ColliderState};
use crate::{
    config::PhysicsConfig,
    error::Result,
    rig::{Component, Rig},
};

/// Collider following a rig in its rest pose.
///
/// Simulated bones still write the collider transform through the root bone; the other
/// bones have no skeleton to write into.
pub struct RigCollider {
    rig: Option<Arc<Rig>>,
    body: ColliderBody,
}

impl RigCollider {
    pub fn new(rig: Option<Arc<Rig>>) -> Self {
        Self {
            rig,
            body: ColliderBody::None,
        }
    }

    pub(crate) fn set_rig(&mut self, rig: Option<Arc<Rig>>) {
        self.rig = rig;
    }
}

impl ColliderNotify for RigCollider {
    fn parts(&mut self) -> (&mut ColliderBody, Option<&mut Component>) {
        (&mut self.body, None)
    }

    fn parts_ref(&self) -> (&ColliderBody, Option<&Component>) {
        (&self.body, None)
    }

    fn rig(&self) -> Option<&Arc<Rig>> {
        self.rig.as_ref()
    }

    fn build_body(&self, state: &mut ColliderState, owner: ColliderId, config: &PhysicsConfig) -> Result<ColliderBody> {
        ColliderBody::for_rig(owner, self.rig.as_ref(), state, None, config)
    }
}
