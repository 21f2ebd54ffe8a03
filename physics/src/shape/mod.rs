/*!
Semantic collision shapes and the per-owner shape list.

A [`Shape`] describes geometry the way rigs and colliders author it (sphere, box,
cylinder, capsule, hull, each with a local placement). Two things are derived from it:
- a backend shape through [`factory::ShapeFactory`], used by the dynamics world and sweeps;
- a [`CollisionVolume`], used for point tests, extents and debug drawing.
*/

pub mod factory;

pub use factory::{BuiltShape, ShapeFactory};

use nalgebra as na;

use crate::{
    collision::volume::{CollisionVolume, ExtentBox},
    math::{DMat4, DVec3, Quat, Vec3, to_f64},
};

pub type Vec2 = na::Vector2<f32>;

#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Sphere, optionally squashed into an ellipsoid by `axis_scaling` (x, z).
    Sphere {
        center: Vec3,
        radius: f32,
        axis_scaling: Vec2,
    },
    /// Box; `tapering` scales the top face along x and z.
    Box {
        center: Vec3,
        half_extends: Vec3,
        orientation: Quat,
        tapering: Vec2,
    },
    /// Y aligned cylinder, possibly with different end radii.
    Cylinder {
        center: Vec3,
        orientation: Quat,
        half_height: f32,
        top_radius: f32,
        bottom_radius: f32,
    },
    /// Y aligned capsule, possibly with different cap radii.
    Capsule {
        center: Vec3,
        orientation: Quat,
        half_height: f32,
        top_radius: f32,
        bottom_radius: f32,
    },
    Hull {
        center: Vec3,
        orientation: Quat,
        points: Vec<Vec3>,
    },
}

impl Shape {
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Shape::Sphere {
            center,
            radius,
            axis_scaling: Vec2::new(1.0, 1.0),
        }
    }

    pub fn cuboid(center: Vec3, half_extends: Vec3) -> Self {
        Shape::Box {
            center,
            half_extends,
            orientation: Quat::identity(),
            tapering: Vec2::new(1.0, 1.0),
        }
    }

    pub fn cylinder(center: Vec3, half_height: f32, radius: f32) -> Self {
        Shape::Cylinder {
            center,
            orientation: Quat::identity(),
            half_height,
            top_radius: radius,
            bottom_radius: radius,
        }
    }

    pub fn capsule(center: Vec3, half_height: f32, radius: f32) -> Self {
        Shape::Capsule {
            center,
            orientation: Quat::identity(),
            half_height,
            top_radius: radius,
            bottom_radius: radius,
        }
    }

    pub fn hull(points: Vec<Vec3>) -> Self {
        Shape::Hull {
            center: Vec3::zeros(),
            orientation: Quat::identity(),
            points,
        }
    }

    pub fn center(&self) -> Vec3 {
        match self {
            Shape::Sphere { center, .. }
            | Shape::Box { center, .. }
            | Shape::Cylinder { center, .. }
            | Shape::Capsule { center, .. }
            | Shape::Hull { center, .. } => *center,
        }
    }

    pub fn orientation(&self) -> Quat {
        match self {
            Shape::Sphere { .. } => Quat::identity(),
            Shape::Box { orientation, .. }
            | Shape::Cylinder { orientation, .. }
            | Shape::Capsule { orientation, .. }
            | Shape::Hull { orientation, .. } => *orientation,
        }
    }

    /// Volume in the owner's local space (before the owner matrix).
    pub fn local_volume(&self) -> CollisionVolume {
        let center = to_f64(&self.center());
        let orientation = self.orientation().cast::<f64>();

        match self {
            Shape::Sphere {
                radius,
                axis_scaling,
                ..
            } => {
                let largest = axis_scaling.x.max(axis_scaling.y).max(1.0);
                CollisionVolume::Sphere {
                    center,
                    radius: f64::from(radius * largest),
                }
            }
            Shape::Box { half_extends, .. } => CollisionVolume::Box {
                center,
                half_size: to_f64(half_extends),
                orientation,
            },
            Shape::Cylinder {
                half_height,
                top_radius,
                bottom_radius,
                ..
            } => {
                let r = f64::from(top_radius.max(*bottom_radius));
                CollisionVolume::Box {
                    center,
                    half_size: DVec3::new(r, f64::from(*half_height), r),
                    orientation,
                }
            }
            Shape::Capsule {
                half_height,
                top_radius,
                bottom_radius,
                ..
            } => {
                let r = f64::from(top_radius.max(*bottom_radius));
                CollisionVolume::Box {
                    center,
                    half_size: DVec3::new(r, f64::from(*half_height) + r, r),
                    orientation,
                }
            }
            Shape::Hull { points, .. } => {
                let (min, max) = point_bounds(points);
                let local_center = to_f64(&((min + max) * 0.5));
                CollisionVolume::Box {
                    center: center + orientation * local_center,
                    half_size: to_f64(&((max - min) * 0.5)),
                    orientation,
                }
            }
        }
    }

    /// Outer surface area estimate, used by surface-proportional force fields.
    pub fn surface(&self, scale: &Vec3) -> f32 {
        use std::f32::consts::PI;

        match self {
            Shape::Sphere {
                radius,
                axis_scaling,
                ..
            } => {
                let rx = radius * axis_scaling.x * scale.x;
                let ry = radius * scale.y;
                let rz = radius * axis_scaling.y * scale.z;
                4.0 * PI * (rx * ry + ry * rz + rx * rz) / 3.0
            }
            Shape::Box {
                half_extends,
                tapering,
                ..
            } => {
                let h = half_extends.component_mul(scale);
                let top = (tapering.x + tapering.y) * 0.5;
                8.0 * (h.x * h.y + h.y * h.z + h.x * h.z) * (1.0 + top) * 0.5
            }
            Shape::Cylinder {
                half_height,
                top_radius,
                bottom_radius,
                ..
            } => {
                let s = scale.x.max(scale.z);
                let (rt, rb) = (top_radius * s, bottom_radius * s);
                let h = half_height * scale.y * 2.0;
                PI * (rt + rb) * h + PI * (rt * rt + rb * rb)
            }
            Shape::Capsule {
                half_height,
                top_radius,
                bottom_radius,
                ..
            } => {
                let s = scale.x.max(scale.z);
                let (rt, rb) = (top_radius * s, bottom_radius * s);
                let h = half_height * scale.y * 2.0;
                PI * (rt + rb) * h + 2.0 * PI * (rt * rt + rb * rb)
            }
            Shape::Hull { points, .. } => {
                let (min, max) = point_bounds(points);
                let e = (max - min).component_mul(scale);
                2.0 * (e.x * e.y + e.y * e.z + e.x * e.z)
            }
        }
    }
}

pub(crate) fn point_bounds(points: &[Vec3]) -> (Vec3, Vec3) {
    let mut iter = points.iter();
    let Some(first) = iter.next() else {
        return (Vec3::zeros(), Vec3::zeros());
    };
    iter.fold((*first, *first), |(min, max), p| (min.inf(p), max.sup(p)))
}

/// Ordered shapes of one owner plus their world-space collision volumes.
///
/// Volumes are rebuilt lazily: only when the shapes changed or the owner matrix moved.
#[derive(Clone, Debug, Default)]
pub struct ShapeList {
    shapes: Vec<Shape>,
    volumes: Vec<CollisionVolume>,
    matrix: Option<DMat4>,
    dirty: bool,
}

impl ShapeList {
    pub fn new(shapes: Vec<Shape>) -> Self {
        Self {
            shapes,
            volumes: Vec::new(),
            matrix: None,
            dirty: true,
        }
    }

    #[inline]
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn push(&mut self, shape: Shape) {
        self.shapes.push(shape);
        self.dirty = true;
    }

    pub fn set_shapes(&mut self, shapes: Vec<Shape>) {
        self.shapes = shapes;
        self.dirty = true;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bring the world volumes up to date with `matrix` (owner matrix including scale).
    pub fn update_volumes(&mut self, matrix: &DMat4) {
        if !self.dirty && self.matrix.as_ref() == Some(matrix) {
            return;
        }
        self.volumes = self
            .shapes
            .iter()
            .map(|s| s.local_volume().transformed(matrix))
            .collect();
        self.matrix = Some(*matrix);
        self.dirty = false;
    }

    #[inline]
    pub fn volumes(&self) -> &[CollisionVolume] {
        &self.volumes
    }

    pub fn point_inside(&self, point: &DVec3) -> bool {
        self.volumes.iter().any(|v| v.point_inside(point))
    }

    /// Union of the volume enclosing boxes, `None` for an empty list.
    pub fn enclosing_box(&self) -> Option<ExtentBox> {
        self.volumes
            .iter()
            .map(CollisionVolume::enclosing_box)
            .reduce(|a, b| a.union(&b))
    }

    pub fn surface(&self, scale: &Vec3) -> f32 {
        self.shapes.iter().map(|s| s.surface(scale)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{matrix_from, to_f64};

    #[test]
    fn volumes_follow_the_owner_matrix() {
        let mut list = ShapeList::new(vec![Shape::sphere(Vec3::zeros(), 0.5)]);
        list.update_volumes(&matrix_from(&DVec3::new(5.0, 0.0, 0.0), &Quat::identity()));
        assert!(list.point_inside(&DVec3::new(5.2, 0.0, 0.0)));
        assert!(!list.point_inside(&DVec3::zeros()));

        list.update_volumes(&matrix_from(&DVec3::zeros(), &Quat::identity()));
        assert!(list.point_inside(&DVec3::zeros()));
    }

    #[test]
    fn enclosing_box_unions_all_shapes() {
        let mut list = ShapeList::new(vec![
            Shape::sphere(Vec3::new(-2.0, 0.0, 0.0), 1.0),
            Shape::cuboid(Vec3::new(3.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.5)),
        ]);
        list.update_volumes(&DMat4::identity());
        let b = list.enclosing_box().unwrap();
        assert!((b.min().x + 3.0).abs() < 1.0e-9);
        assert!((b.max().x - 3.5).abs() < 1.0e-9);
        assert!(ShapeList::default().enclosing_box().is_none());
    }

    #[test]
    fn hull_volume_is_centered_on_points() {
        let shape = Shape::hull(vec![
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(3.0, 1.0, 1.0),
            Vec3::new(1.0, 2.0, 1.0),
            Vec3::new(1.0, 1.0, 4.0),
        ]);
        match shape.local_volume() {
            CollisionVolume::Box {
                center, half_size, ..
            } => {
                assert!((center - to_f64(&Vec3::new(2.0, 1.5, 2.5))).norm() < 1.0e-6);
                assert!((half_size - to_f64(&Vec3::new(1.0, 0.5, 1.5))).norm() < 1.0e-6);
            }
            _ => panic!("box expected"),
        }
    }

    #[test]
    fn sphere_surface_matches_formula() {
        let s = Shape::sphere(Vec3::zeros(), 2.0);
        let expected = 4.0 * std::f32::consts::PI * 4.0;
        assert!((s.surface(&Vec3::new(1.0, 1.0, 1.0)) - expected).abs() < 1.0e-3);
    }
}
