/*!
Math aliases and small helpers shared by every physics submodule.

World positions and bone hierarchies are double precision; velocities, forces and
orientations stay single precision because that is what the rigid-body backend consumes.

Conventions
- Matrices are column-major and transform column vectors: `world = parent * local`.
- A "matrix" in this crate is an affine `DMat4` (rotation, translation, optional scaling).
*/

use nalgebra as na;
use num_traits::Float;

pub type Vec3 = na::Vector3<f32>;
pub type DVec3 = na::Vector3<f64>;
pub type Quat = na::UnitQuaternion<f32>;
pub type DQuat = na::UnitQuaternion<f64>;
pub type Iso = na::Isometry3<f32>;
pub type DMat4 = na::Matrix4<f64>;

/// A rigid transform with a double precision translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: DVec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: DVec3::zeros(),
            rotation: Quat::identity(),
        }
    }
}

impl Transform {
    #[inline]
    pub fn new(translation: DVec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Single precision isometry for backend and parry queries.
    #[inline]
    pub fn iso(&self) -> Iso {
        Iso::from_parts(
            na::Translation3::new(
                self.translation.x as f32,
                self.translation.y as f32,
                self.translation.z as f32,
            ),
            self.rotation,
        )
    }

    #[inline]
    pub fn matrix(&self) -> DMat4 {
        matrix_from(&self.translation, &self.rotation)
    }

    pub fn from_matrix(m: &DMat4) -> Self {
        Self {
            translation: matrix_position(m),
            rotation: matrix_orientation(m),
        }
    }
}

/// `|v| <= eps`, for both precisions.
#[inline]
pub fn is_zero<T: Float>(v: T, eps: T) -> bool {
    v.abs() <= eps
}

#[inline]
pub fn approx_eq<T: Float>(a: T, b: T, eps: T) -> bool {
    is_zero(a - b, eps)
}

/// Every component of `v` within `eps` of zero.
#[inline]
pub fn vec_is_zero(v: &Vec3, eps: f32) -> bool {
    v.iter().all(|c| is_zero(*c, eps))
}

#[inline]
pub fn dvec_approx_eq(a: &DVec3, b: &DVec3, eps: f64) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| approx_eq(*x, *y, eps))
}

#[inline]
pub fn to_f64(v: &Vec3) -> DVec3 {
    v.cast::<f64>()
}

#[inline]
pub fn to_f32(v: &DVec3) -> Vec3 {
    v.cast::<f32>()
}

pub fn matrix_from(position: &DVec3, orientation: &Quat) -> DMat4 {
    na::Isometry3::from_parts(
        na::Translation3::from(*position),
        orientation.cast::<f64>(),
    )
    .to_homogeneous()
}

/// `T * R * S`, scaling applied first.
pub fn matrix_from_scaled(position: &DVec3, orientation: &Quat, scale: &Vec3) -> DMat4 {
    matrix_from(position, orientation) * DMat4::new_nonuniform_scaling(&to_f64(scale))
}

#[inline]
pub fn translation_matrix(offset: &DVec3) -> DMat4 {
    DMat4::new_translation(offset)
}

#[inline]
pub fn matrix_position(m: &DMat4) -> DVec3 {
    DVec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Rotation part of an affine matrix. Columns are normalized first so scaled
/// matrices still yield a proper rotation.
pub fn matrix_orientation(m: &DMat4) -> Quat {
    let mut basis: na::Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    for mut column in basis.column_iter_mut() {
        let len = column.norm();
        if len > 1.0e-12 {
            column /= len;
        }
    }
    DQuat::from_matrix(&basis).cast::<f32>()
}

/// Inverse of an affine matrix; singular input yields identity.
pub fn matrix_inverse(m: &DMat4) -> DMat4 {
    m.try_inverse().unwrap_or_else(DMat4::identity)
}

#[inline]
pub fn transform_point(m: &DMat4, p: &DVec3) -> DVec3 {
    m.transform_point(&na::Point3::from(*p)).coords
}

#[inline]
pub fn transform_normal(m: &DMat4, v: &DVec3) -> DVec3 {
    m.transform_vector(v)
}

#[inline]
pub fn rotation_y(angle: f32) -> Quat {
    Quat::from_axis_angle(&Vec3::y_axis(), angle)
}

/// Euler angles in degrees (roll, pitch, yaw), for log output.
pub fn euler_degrees(q: &Quat) -> Vec3 {
    let (r, p, y) = q.euler_angles();
    Vec3::new(r.to_degrees(), p.to_degrees(), y.to_degrees())
}

/// Largest absolute difference between two matrices.
pub fn matrix_max_deviation(a: &DMat4, b: &DMat4) -> f64 {
    (a - b).iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_round_trip_keeps_position_and_rotation() {
        let q = Quat::from_euler_angles(0.3, -0.7, 1.1);
        let p = DVec3::new(4.0, -2.5, 100.25);
        let m = matrix_from(&p, &q);

        assert!(dvec_approx_eq(&matrix_position(&m), &p, 1.0e-9));
        assert!(matrix_orientation(&m).angle_to(&q) < 1.0e-5);
    }

    #[test]
    fn scaled_matrix_orientation_ignores_scale() {
        let q = Quat::from_euler_angles(0.0, 0.5, 0.0);
        let m = matrix_from_scaled(&DVec3::zeros(), &q, &Vec3::new(2.0, 3.0, 0.5));
        assert!(matrix_orientation(&m).angle_to(&q) < 1.0e-5);
    }

    #[test]
    fn singular_inverse_is_identity() {
        let m = DMat4::zeros();
        assert_eq!(matrix_inverse(&m), DMat4::identity());
    }

    #[test]
    fn tolerance_helpers_work_for_both_precisions() {
        assert!(approx_eq(1.0_f32, 1.0 + 1.0e-7, 1.0e-6));
        assert!(!approx_eq(1.0_f64, 1.001, 1.0e-6));
        assert!(vec_is_zero(&Vec3::new(1.0e-4, 0.0, -1.0e-4), 1.0e-3));
    }
}
