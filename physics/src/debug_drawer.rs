//! One-way debug output of collider geometry.
//!
//! When enabled, the world republishes every collider body (or bone) after each step with
//! its world-space collision volumes and a highlight describing how it is simulated.
//! Nothing reads the drawer back.

use crate::{body::ResponseType, collider::ColliderId, collision::volume::CollisionVolume};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Highlight {
    Dynamic,
    Kinematic,
    Static,
    /// A breakable constraint of the body broke.
    BrokenConstraint,
}

impl Highlight {
    pub fn for_response(response: ResponseType) -> Self {
        match response {
            ResponseType::Static => Highlight::Static,
            ResponseType::Kinematic => Highlight::Kinematic,
            ResponseType::Dynamic => Highlight::Dynamic,
        }
    }

    /// RGBA fill color used by viewers.
    pub fn color(self) -> [f32; 4] {
        match self {
            Highlight::Dynamic => [0.0, 0.5, 1.0, 0.2],
            Highlight::Kinematic => [1.0, 0.5, 0.0, 0.2],
            Highlight::Static => [0.5, 0.5, 0.5, 0.2],
            Highlight::BrokenConstraint => [1.0, 0.0, 0.0, 0.4],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DebugShape {
    pub owner: ColliderId,
    pub bone: Option<usize>,
    pub volumes: Vec<CollisionVolume>,
    pub highlight: Highlight,
}

#[derive(Clone, Debug, Default)]
pub struct DebugDrawer {
    shapes: Vec<DebugShape>,
}

impl DebugDrawer {
    pub fn clear(&mut self) {
        self.shapes.clear();
    }

    pub fn push(&mut self, shape: DebugShape) {
        if !shape.volumes.is_empty() {
            self.shapes.push(shape);
        }
    }

    #[inline]
    pub fn shapes(&self) -> &[DebugShape] {
        &self.shapes
    }

    pub fn shapes_of(&self, owner: ColliderId) -> impl Iterator<Item = &DebugShape> {
        self.shapes.iter().filter(move |s| s.owner == owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::DVec3;

    #[test]
    fn empty_shapes_are_not_published() {
        let mut drawer = DebugDrawer::default();
        let owner = ColliderId::new(0, 0);
        drawer.push(DebugShape {
            owner,
            bone: None,
            volumes: Vec::new(),
            highlight: Highlight::Static,
        });
        drawer.push(DebugShape {
            owner,
            bone: Some(1),
            volumes: vec![CollisionVolume::Sphere {
                center: DVec3::zeros(),
                radius: 1.0,
            }],
            highlight: Highlight::BrokenConstraint,
        });
        assert_eq!(drawer.shapes().len(), 1);
        assert_eq!(drawer.shapes_of(owner).count(), 1);
        assert_eq!(Highlight::for_response(ResponseType::Kinematic), Highlight::Kinematic);
    }
}
