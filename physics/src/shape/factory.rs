use nalgebra as na;
use rapier3d::parry::{
    either::Either,
    shape::{Ball, Shape as _},
};
use rapier3d::prelude::SharedShape;

use super::{Shape, Vec2, point_bounds};
use crate::{
    collision::settings::CCD_DEFAULT,
    error::{PhysicsError, Result},
    math::{Iso, Quat, Vec3, approx_eq, vec_is_zero},
};

/// Backend shape plus the heuristics derived while building it.
#[derive(Clone)]
pub struct BuiltShape {
    pub shape: SharedShape,
    pub ccd_threshold: f32,
    pub ccd_radius: f32,
    pub surface: f32,
}

impl std::fmt::Debug for BuiltShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltShape")
            .field("shape", &self.shape.shape_type())
            .field("ccd_threshold", &self.ccd_threshold)
            .field("ccd_radius", &self.ccd_radius)
            .field("surface", &self.surface)
            .finish()
    }
}

/// Turns a list of [`Shape`]s into one backend shape.
///
/// Notes
/// - `scale` is baked into each child's dimensions and placement. The backend has no
///   per-axis scaling for boxes and rounds, so tapered or non-uniformly scaled ones
///   become convex hulls. Stretched balls use the backend's polyhedral ellipsoid.
/// - An ellipsoid always becomes a compound, with the stretched ball as its child.
/// - `offset` shifts every child, e.g. `-central_mass_point * scale` so the body origin
///   sits on the center of mass.
/// - A compound is produced when more than one shape is added, when scaling is present,
///   or when a child is placed away from the origin. A single plain shape is used bare.
/// - CCD threshold/radius start at [`CCD_DEFAULT`]; the first shape sets them and later
///   shapes only lower them.
pub struct ShapeFactory {
    scale: Vec3,
    offset: Vec3,
    children: Vec<(Iso, SharedShape)>,
    transformed: bool,
    ccd_threshold: f32,
    ccd_radius: f32,
    has_ccd: bool,
    surface: f32,
}

impl Default for ShapeFactory {
    fn default() -> Self {
        Self::new(Vec3::new(1.0, 1.0, 1.0), Vec3::zeros())
    }
}

const RING_SEGMENTS: usize = 16;
const SPHERE_RINGS: usize = 5;
const SPHERE_SEGMENTS: usize = 8;
const ELLIPSOID_SUBDIVISIONS: u32 = 10;

impl ShapeFactory {
    pub fn new(scale: Vec3, offset: Vec3) -> Self {
        Self {
            scale,
            offset,
            children: Vec::new(),
            transformed: false,
            ccd_threshold: CCD_DEFAULT,
            ccd_radius: CCD_DEFAULT,
            has_ccd: false,
            surface: 0.0,
        }
    }

    /// Convenience wrapper: add every shape and finish.
    pub fn build(shapes: &[Shape], scale: Vec3, offset: Vec3) -> Result<Option<BuiltShape>> {
        let mut factory = ShapeFactory::new(scale, offset);
        for shape in shapes {
            factory.add(shape)?;
        }
        Ok(factory.finish())
    }

    #[inline]
    fn has_scaling(&self) -> bool {
        !vec_is_zero(&(self.scale - Vec3::new(1.0, 1.0, 1.0)), 1.0e-6)
    }

    fn update_ccd(&mut self, threshold: f32, radius: f32) {
        if self.has_ccd {
            self.ccd_threshold = self.ccd_threshold.min(threshold);
            self.ccd_radius = self.ccd_radius.min(radius);
        } else {
            self.ccd_threshold = threshold;
            self.ccd_radius = radius;
            self.has_ccd = true;
        }
    }

    fn push_child(&mut self, center: &Vec3, orientation: &Quat, shape: SharedShape) {
        let translation = center.component_mul(&self.scale) + self.offset;
        if !vec_is_zero(&translation, 1.0e-6) || orientation.angle() > 1.0e-6 {
            self.transformed = true;
        }
        let iso = Iso::from_parts(na::Translation3::from(translation), *orientation);
        self.children.push((iso, shape));
    }

    pub fn add(&mut self, shape: &Shape) -> Result<()> {
        self.surface += shape.surface(&self.scale);
        let s = self.scale;

        match shape {
            Shape::Sphere {
                center,
                radius,
                axis_scaling,
            } => {
                let ellipsoid = !approx_eq(axis_scaling.x, 1.0, 1.0e-6)
                    || !approx_eq(axis_scaling.y, 1.0, 1.0e-6);
                let stretch = Vec3::new(axis_scaling.x * s.x, s.y, axis_scaling.y * s.z);
                let built = scaled_ball(*radius, &stretch)?;

                let r = radius * s.min();
                let mut ccd_radius = r * 0.5;
                if ellipsoid {
                    ccd_radius = ccd_radius.min(r * axis_scaling.x * 0.5).min(r * axis_scaling.y * 0.5);
                    // Ellipsoids always go through a compound.
                    self.transformed = true;
                }
                self.update_ccd(ccd_radius * 0.5, ccd_radius);
                self.push_child(center, &Quat::identity(), built);
            }

            Shape::Box {
                center,
                half_extends,
                orientation,
                tapering,
            } => {
                let h = half_extends.component_mul(&s);
                let tapered = !approx_eq(tapering.x, 1.0, 1.0e-6) || !approx_eq(tapering.y, 1.0, 1.0e-6);
                let smallest = h
                    .x
                    .min(h.y)
                    .min(h.z)
                    .min(h.x * tapering.x)
                    .min(h.z * tapering.y);

                let built = if tapered {
                    hull(&tapered_box_points(&h, tapering), "tapered box")?
                } else {
                    SharedShape::cuboid(h.x, h.y, h.z)
                };

                self.update_ccd(smallest, smallest * 0.5);
                self.push_child(center, orientation, built);
            }

            Shape::Cylinder {
                center,
                orientation,
                half_height,
                top_radius,
                bottom_radius,
            } => {
                let hh = half_height * s.y;
                let (rx, rz) = (s.x, s.z);
                let uniform = approx_eq(*top_radius, *bottom_radius, 1.0e-6) && approx_eq(rx, rz, 1.0e-6);

                let built = if uniform {
                    SharedShape::cylinder(hh, top_radius * rx)
                } else {
                    let mut points = Vec::with_capacity(RING_SEGMENTS * 2);
                    ring_points(hh, &Vec2::new(top_radius * rx, top_radius * rz), &mut points);
                    ring_points(-hh, &Vec2::new(bottom_radius * rx, bottom_radius * rz), &mut points);
                    hull(&points, "cylinder")?
                };

                let r = top_radius.max(*bottom_radius) * rx.max(rz);
                self.update_ccd(0.25 * hh.min(r), hh + r);
                self.push_child(center, orientation, built);
            }

            Shape::Capsule {
                center,
                orientation,
                half_height,
                top_radius,
                bottom_radius,
            } => {
                let hh = half_height * s.y;
                let (rx, rz) = (s.x, s.z);
                let uniform = approx_eq(*top_radius, *bottom_radius, 1.0e-6) && approx_eq(rx, rz, 1.0e-6);

                let built = if uniform {
                    SharedShape::capsule_y(hh, top_radius * rx)
                } else {
                    let mut points = Vec::new();
                    let rt = Vec3::new(top_radius * rx, top_radius * s.y, top_radius * rz);
                    let rb = Vec3::new(bottom_radius * rx, bottom_radius * s.y, bottom_radius * rz);
                    sphere_points(&Vec3::new(0.0, hh, 0.0), &rt, &mut points);
                    sphere_points(&Vec3::new(0.0, -hh, 0.0), &rb, &mut points);
                    hull(&points, "capsule")?
                };

                let (rt, rb) = (top_radius * rx.max(rz), bottom_radius * rx.max(rz));
                self.update_ccd(0.25 * hh.min(rt).min(rb), hh + rt + rb);
                self.push_child(center, orientation, built);
            }

            Shape::Hull {
                center,
                orientation,
                points,
            } => {
                if points.len() < 4 {
                    return Err(PhysicsError::ShapeConstruction(format!(
                        "hull needs at least 4 points, got {}",
                        points.len()
                    )));
                }
                let scaled: Vec<Vec3> = points.iter().map(|p| p.component_mul(&s)).collect();
                let centroid = scaled.iter().sum::<Vec3>() / scaled.len() as f32;
                let radius = scaled
                    .iter()
                    .map(|p| (p - centroid).norm())
                    .fold(0.0_f32, f32::max);
                let (min, max) = point_bounds(&scaled);
                let half = (max - min) * 0.5;

                let built = hull(&scaled, "hull")?;
                self.update_ccd(0.25 * half.min(), radius);
                self.push_child(center, orientation, built);
            }
        }

        Ok(())
    }

    /// Produce the backend shape, `None` if no shape was added.
    pub fn finish(mut self) -> Option<BuiltShape> {
        if self.children.is_empty() {
            return None;
        }

        let use_compound = self.children.len() > 1 || self.has_scaling() || self.transformed;
        let shape = if use_compound {
            SharedShape::compound(std::mem::take(&mut self.children))
        } else {
            self.children.pop()?.1
        };

        Some(BuiltShape {
            shape,
            ccd_threshold: self.ccd_threshold,
            ccd_radius: self.ccd_radius,
            surface: self.surface,
        })
    }
}

/// Ball stretched per axis; non-uniform stretches give the backend's polyhedral ellipsoid.
fn scaled_ball(radius: f32, stretch: &Vec3) -> Result<SharedShape> {
    let ball = Ball::new(radius);
    match ball.scaled(stretch, ELLIPSOID_SUBDIVISIONS) {
        Some(Either::Left(ball)) => Ok(SharedShape::new(ball)),
        Some(Either::Right(polyhedron)) => Ok(SharedShape::new(polyhedron)),
        None => Err(PhysicsError::ShapeConstruction(format!(
            "degenerate ellipsoid, radius {radius} stretched by {stretch:?}"
        ))),
    }
}

fn hull(points: &[Vec3], what: &str) -> Result<SharedShape> {
    let points: Vec<na::Point3<f32>> = points.iter().map(|p| na::Point3::from(*p)).collect();
    SharedShape::convex_hull(&points)
        .ok_or_else(|| PhysicsError::ShapeConstruction(format!("degenerate {what} convex hull")))
}

fn tapered_box_points(h: &Vec3, tapering: &Vec2) -> Vec<Vec3> {
    let (tx, tz) = (h.x * tapering.x, h.z * tapering.y);
    vec![
        Vec3::new(-h.x, -h.y, -h.z),
        Vec3::new(h.x, -h.y, -h.z),
        Vec3::new(h.x, -h.y, h.z),
        Vec3::new(-h.x, -h.y, h.z),
        Vec3::new(-tx, h.y, -tz),
        Vec3::new(tx, h.y, -tz),
        Vec3::new(tx, h.y, tz),
        Vec3::new(-tx, h.y, tz),
    ]
}

fn ring_points(y: f32, radii: &Vec2, out: &mut Vec<Vec3>) {
    for i in 0..RING_SEGMENTS {
        let a = std::f32::consts::TAU * i as f32 / RING_SEGMENTS as f32;
        out.push(Vec3::new(a.cos() * radii.x, y, a.sin() * radii.y));
    }
}

fn sphere_points(center: &Vec3, radii: &Vec3, out: &mut Vec<Vec3>) {
    out.push(center + Vec3::new(0.0, radii.y, 0.0));
    out.push(center - Vec3::new(0.0, radii.y, 0.0));
    for ring in 1..=SPHERE_RINGS {
        let polar = std::f32::consts::PI * ring as f32 / (SPHERE_RINGS + 1) as f32;
        let (sp, cp) = polar.sin_cos();
        for seg in 0..SPHERE_SEGMENTS {
            let a = std::f32::consts::TAU * seg as f32 / SPHERE_SEGMENTS as f32;
            out.push(center + Vec3::new(sp * a.cos() * radii.x, cp * radii.y, sp * a.sin() * radii.z));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Vec3 {
        Vec3::new(1.0, 1.0, 1.0)
    }

    #[test]
    fn single_plain_shape_is_bare() {
        let built = ShapeFactory::build(&[Shape::sphere(Vec3::zeros(), 0.5)], unit(), Vec3::zeros())
            .unwrap()
            .unwrap();
        assert!(built.shape.as_ball().is_some());
        assert!((built.ccd_radius - 0.25).abs() < 1.0e-6);
        assert!((built.ccd_threshold - 0.125).abs() < 1.0e-6);
    }

    #[test]
    fn offset_or_scaling_forces_compound() {
        let shapes = [Shape::cuboid(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0))];
        let offset = ShapeFactory::build(&shapes, unit(), Vec3::new(0.0, -0.5, 0.0))
            .unwrap()
            .unwrap();
        assert!(offset.shape.as_compound().is_some());

        let scaled = ShapeFactory::build(&shapes, Vec3::new(2.0, 2.0, 2.0), Vec3::zeros())
            .unwrap()
            .unwrap();
        assert!(scaled.shape.as_compound().is_some());
    }

    #[test]
    fn ccd_radius_is_bounded_by_smallest_half_extent() {
        let shapes = [
            Shape::cuboid(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.4, 1.0, 2.0)),
            Shape::sphere(Vec3::new(0.0, -1.0, 0.0), 0.6),
        ];
        let built = ShapeFactory::build(&shapes, unit(), Vec3::zeros()).unwrap().unwrap();
        assert!(built.ccd_radius > 0.0);
        assert!(built.ccd_radius <= 0.5 * 0.4 + 1.0e-6);
        assert!(built.shape.as_compound().is_some());
    }

    #[test]
    fn tapered_box_becomes_hull() {
        let shape = Shape::Box {
            center: Vec3::zeros(),
            half_extends: Vec3::new(1.0, 1.0, 1.0),
            orientation: Quat::identity(),
            tapering: Vec2::new(0.5, 0.5),
        };
        let built = ShapeFactory::build(&[shape], unit(), Vec3::zeros()).unwrap().unwrap();
        assert!(built.shape.as_convex_polyhedron().is_some());
        assert!((built.ccd_threshold - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn ellipsoid_uses_axis_scaled_ccd() {
        let shape = Shape::Sphere {
            center: Vec3::zeros(),
            radius: 1.0,
            axis_scaling: Vec2::new(2.0, 0.5),
        };
        let built = ShapeFactory::build(&[shape], unit(), Vec3::zeros()).unwrap().unwrap();
        assert!((built.ccd_radius - 0.25).abs() < 1.0e-6);
        assert!((built.ccd_threshold - 0.125).abs() < 1.0e-6);

        let compound = built.shape.as_compound().expect("compound");
        assert_eq!(compound.shapes().len(), 1);
        let (iso, child) = &compound.shapes()[0];
        assert!(iso.translation.vector.norm() < 1.0e-6);
        let aabb = child.compute_local_aabb();
        // Polyhedral approximation of radii (2, 1, 0.5).
        let m = aabb.maxs;
        assert!((m.x - 2.0).abs() < 0.1 && (m.y - 1.0).abs() < 0.05 && (m.z - 0.5).abs() < 0.05, "{m:?}");
    }

    #[test]
    fn non_uniform_scale_stretches_a_plain_sphere() {
        let built = ShapeFactory::build(&[Shape::sphere(Vec3::zeros(), 1.0)], Vec3::new(1.0, 2.0, 1.0), Vec3::zeros())
            .unwrap()
            .unwrap();
        let compound = built.shape.as_compound().expect("compound");
        assert!(compound.shapes()[0].1.as_convex_polyhedron().is_some());
        assert!((built.ccd_radius - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn capsule_and_cylinder_ccd_rules() {
        let built = ShapeFactory::build(&[Shape::capsule(Vec3::zeros(), 1.0, 0.5)], unit(), Vec3::zeros())
            .unwrap()
            .unwrap();
        assert!((built.ccd_radius - 2.0).abs() < 1.0e-6);
        assert!((built.ccd_threshold - 0.125).abs() < 1.0e-6);
        assert!(built.shape.as_capsule().is_some());

        let built = ShapeFactory::build(&[Shape::cylinder(Vec3::zeros(), 1.0, 0.5)], unit(), Vec3::zeros())
            .unwrap()
            .unwrap();
        assert!((built.ccd_radius - 1.5).abs() < 1.0e-6);
        assert!((built.ccd_threshold - 0.125).abs() < 1.0e-6);
    }

    #[test]
    fn short_hull_is_rejected() {
        let shape = Shape::hull(vec![Vec3::zeros(), Vec3::x(), Vec3::y()]);
        let result = ShapeFactory::build(&[shape], unit(), Vec3::zeros());
        assert!(matches!(result, Err(PhysicsError::ShapeConstruction(_))));
    }

    #[test]
    fn empty_list_builds_nothing() {
        assert!(ShapeFactory::build(&[], unit(), Vec3::zeros()).unwrap().is_none());
    }
}
