use std::sync::Arc;

use super::{ColliderBody, ColliderId, ColliderNotify, ColliderState};
use crate::{
    config::PhysicsConfig,
    error::Result,
    rig::{Component, Rig},
};

/// Collider driven by an animated rig instance.
///
/// Animated bones chase the component pose; simulated bones write their pose back into
/// it after every dynamics step.
pub struct ComponentCollider {
    component: Option<Component>,
    body: ColliderBody,
}

impl ComponentCollider {
    pub fn new(component: Option<Component>) -> Self {
        Self {
            component,
            body: ColliderBody::None,
        }
    }

    pub(crate) fn set_component(&mut self, component: Option<Component>) {
        self.component = component;
    }

    pub(crate) fn component_mut(&mut self) -> Option<&mut Component> {
        self.component.as_mut()
    }
}

impl ColliderNotify for ComponentCollider {
    fn parts(&mut self) -> (&mut ColliderBody, Option<&mut Component>) {
        (&mut self.body, self.component.as_mut())
    }

    fn parts_ref(&self) -> (&ColliderBody, Option<&Component>) {
        (&self.body, self.component.as_ref())
    }

    fn rig(&self) -> Option<&Arc<Rig>> {
        self.component.as_ref().map(Component::rig)
    }

    fn build_body(&self, state: &mut ColliderState, owner: ColliderId, config: &PhysicsConfig) -> Result<ColliderBody> {
        let component = self.component.as_ref();
        ColliderBody::for_rig(owner, component.map(Component::rig), state, component, config)
    }
}
