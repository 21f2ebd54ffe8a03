use std::sync::Arc;

use super::{ColliderBody, ColliderId, ColliderNotify, ColliderState};
use crate::{
    config::PhysicsConfig,
    error::Result,
    math::Vec3,
    rig::{Component, Rig},
    shape::Shape,
};

/// Collider made of raw shapes, simulated as one body on the collider origin.
pub struct VolumeCollider {
    shapes: Vec<Shape>,
    body: ColliderBody,
}

impl VolumeCollider {
    pub fn new(shapes: Vec<Shape>) -> Self {
        Self {
            shapes,
            body: ColliderBody::None,
        }
    }

    #[inline]
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    /// Replace the shapes; the caller rebuilds through [`ColliderNotify::geometry_changed`].
    pub(crate) fn set_shapes(&mut self, shapes: Vec<Shape>) {
        self.shapes = shapes;
    }
}

impl ColliderNotify for VolumeCollider {
    fn parts(&mut self) -> (&mut ColliderBody, Option<&mut Component>) {
        (&mut self.body, None)
    }

    fn parts_ref(&self) -> (&ColliderBody, Option<&Component>) {
        (&self.body, None)
    }

    fn rig(&self) -> Option<&Arc<Rig>> {
        None
    }

    fn build_body(&self, state: &mut ColliderState, owner: ColliderId, config: &PhysicsConfig) -> Result<ColliderBody> {
        ColliderBody::for_shapes(owner, self.shapes.clone(), Vec3::zeros(), state, config)
    }
}
