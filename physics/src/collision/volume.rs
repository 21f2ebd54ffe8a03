use crate::math::{DMat4, DQuat, DVec3, matrix_orientation, transform_normal, transform_point};

/// Axis aligned box given by center and half size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtentBox {
    pub center: DVec3,
    pub half_size: DVec3,
}

impl ExtentBox {
    pub fn from_min_max(min: DVec3, max: DVec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            half_size: (max - min) * 0.5,
        }
    }

    #[inline]
    pub fn min(&self) -> DVec3 {
        self.center - self.half_size
    }

    #[inline]
    pub fn max(&self) -> DVec3 {
        self.center + self.half_size
    }

    pub fn union(&self, other: &ExtentBox) -> ExtentBox {
        ExtentBox::from_min_max(self.min().inf(&other.min()), self.max().sup(&other.max()))
    }

    /// Grow towards `displacement` so the box covers both ends of a move.
    pub fn swept(&self, displacement: &DVec3) -> ExtentBox {
        let moved = ExtentBox {
            center: self.center + displacement,
            half_size: self.half_size,
        };
        self.union(&moved)
    }

    pub fn intersects_sphere(&self, center: &DVec3, radius: f64) -> bool {
        let closest = center.sup(&self.min()).inf(&self.max());
        (closest - center).norm_squared() <= radius * radius
    }
}

/// Geometry used for point tests, extents and debug drawing.
///
/// These are evaluated by this crate directly instead of the backend, which keeps point
/// queries exact for the sphere and box cases.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CollisionVolume {
    Sphere {
        center: DVec3,
        radius: f64,
    },
    Box {
        center: DVec3,
        half_size: DVec3,
        orientation: DQuat,
    },
}

impl CollisionVolume {
    pub fn point_inside(&self, point: &DVec3) -> bool {
        match self {
            CollisionVolume::Sphere { center, radius } => {
                (point - center).norm_squared() <= radius * radius
            }
            CollisionVolume::Box {
                center,
                half_size,
                orientation,
            } => {
                let local = orientation.inverse_transform_vector(&(point - center));
                local.x.abs() <= half_size.x
                    && local.y.abs() <= half_size.y
                    && local.z.abs() <= half_size.z
            }
        }
    }

    pub fn enclosing_box(&self) -> ExtentBox {
        match self {
            CollisionVolume::Sphere { center, radius } => ExtentBox {
                center: *center,
                half_size: DVec3::repeat(*radius),
            },
            CollisionVolume::Box {
                center,
                half_size,
                orientation,
            } => {
                let rot = orientation.to_rotation_matrix();
                let m = rot.matrix();
                let half = DVec3::new(
                    m[(0, 0)].abs() * half_size.x
                        + m[(0, 1)].abs() * half_size.y
                        + m[(0, 2)].abs() * half_size.z,
                    m[(1, 0)].abs() * half_size.x
                        + m[(1, 1)].abs() * half_size.y
                        + m[(1, 2)].abs() * half_size.z,
                    m[(2, 0)].abs() * half_size.x
                        + m[(2, 1)].abs() * half_size.y
                        + m[(2, 2)].abs() * half_size.z,
                );
                ExtentBox {
                    center: *center,
                    half_size: half,
                }
            }
        }
    }

    /// Move the volume by an affine matrix. Scaling stretches a box along its axes and
    /// grows a sphere by the largest axis scale.
    pub fn transformed(&self, m: &DMat4) -> CollisionVolume {
        let axis_scale = DVec3::new(
            transform_normal(m, &DVec3::x()).norm(),
            transform_normal(m, &DVec3::y()).norm(),
            transform_normal(m, &DVec3::z()).norm(),
        );
        let rotation = matrix_orientation(m).cast::<f64>();

        match self {
            CollisionVolume::Sphere { center, radius } => CollisionVolume::Sphere {
                center: transform_point(m, center),
                radius: radius * axis_scale.max(),
            },
            CollisionVolume::Box {
                center,
                half_size,
                orientation,
            } => CollisionVolume::Box {
                center: transform_point(m, center),
                half_size: half_size.component_mul(&axis_scale),
                orientation: rotation * orientation,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quat, Vec3, matrix_from, matrix_from_scaled};

    #[test]
    fn rotated_box_point_inside() {
        let v = CollisionVolume::Box {
            center: DVec3::new(1.0, 0.0, 0.0),
            half_size: DVec3::new(2.0, 0.1, 0.1),
            orientation: DQuat::from_axis_angle(&DVec3::z_axis(), std::f64::consts::FRAC_PI_2),
        };
        assert!(v.point_inside(&DVec3::new(1.0, 1.5, 0.0)));
        assert!(!v.point_inside(&DVec3::new(2.5, 0.0, 0.0)));
    }

    #[test]
    fn enclosing_box_of_rotated_box_grows() {
        let v = CollisionVolume::Box {
            center: DVec3::zeros(),
            half_size: DVec3::new(1.0, 1.0, 1.0),
            orientation: DQuat::from_axis_angle(&DVec3::y_axis(), std::f64::consts::FRAC_PI_4),
        };
        let b = v.enclosing_box();
        assert!((b.half_size.x - 2.0_f64.sqrt()).abs() < 1.0e-9);
        assert!((b.half_size.y - 1.0).abs() < 1.0e-9);
    }

    #[test]
    fn sphere_moves_and_scales_with_matrix() {
        let v = CollisionVolume::Sphere {
            center: DVec3::new(0.0, 1.0, 0.0),
            radius: 0.5,
        };
        let m = matrix_from_scaled(&DVec3::new(10.0, 0.0, 0.0), &Quat::identity(), &Vec3::new(2.0, 1.0, 1.0));
        match v.transformed(&m) {
            CollisionVolume::Sphere { center, radius } => {
                assert!((center - DVec3::new(10.0, 1.0, 0.0)).norm() < 1.0e-9);
                assert!((radius - 1.0).abs() < 1.0e-9);
            }
            _ => panic!("sphere expected"),
        }

        let moved = v.transformed(&matrix_from(&DVec3::new(0.0, 0.0, 3.0), &Quat::identity()));
        assert!(moved.point_inside(&DVec3::new(0.0, 1.0, 3.2)));
    }

    #[test]
    fn swept_box_covers_both_ends() {
        let b = ExtentBox {
            center: DVec3::zeros(),
            half_size: DVec3::repeat(1.0),
        };
        let s = b.swept(&DVec3::new(4.0, 0.0, 0.0));
        assert!((s.min().x + 1.0).abs() < 1.0e-12);
        assert!((s.max().x - 5.0).abs() < 1.0e-12);
        assert!(s.intersects_sphere(&DVec3::new(6.0, 0.0, 0.0), 1.5));
        assert!(!s.intersects_sphere(&DVec3::new(7.0, 0.0, 0.0), 1.5));
    }
}
