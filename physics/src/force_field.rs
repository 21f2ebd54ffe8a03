/*!
Force fields pushing collider bodies around.

A field acts inside a sphere of `radius` around its position. Linear fields push along
their direction, radial fields push away from their center (negative force pulls in).

Behavior
- The magnitude falls off with `(1 - distance / radius)^exponent`.
- The application type decides which body property scales the force (see
  [`ApplicationType`]).
- Fluctuation jitters magnitude and direction (rotation about the world Y axis) with a
  per collider [`Fluctuation`] state.
*/

use std::f32::consts::PI;

use crate::{
    body::PhysicsBody,
    collider::ForceFieldFactors,
    collision::filter::CollisionFilter,
    math::{DVec3, Quat, Vec3, rotation_y, to_f32},
};

/// Squared distance below which a radial field has no defined direction.
const RADIAL_EPS: f32 = 1.0e-6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FieldType {
    #[default]
    Radial,
    Linear,
}

/// Body property the field force is multiplied with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ApplicationType {
    /// The collider's direct factor only.
    #[default]
    Direct,
    /// Half the shape surface, the part facing the field.
    Surface,
    Mass,
    /// Current linear speed.
    Speed,
}

impl ApplicationType {
    pub fn factor(self, factors: &ForceFieldFactors, body: &PhysicsBody) -> f32 {
        match self {
            ApplicationType::Direct => factors.direct,
            ApplicationType::Surface => {
                factors.surface * body.shape().map_or(0.0, |s| s.surface) * 0.5
            }
            ApplicationType::Mass => factors.mass * body.mass(),
            ApplicationType::Speed => factors.speed * body.linear_velocity().norm(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForceField {
    pub position: DVec3,
    pub orientation: Quat,
    /// Push direction of linear fields, in field space.
    pub direction: Vec3,
    pub radius: f32,
    pub exponent: f32,
    pub field_type: FieldType,
    pub application_type: ApplicationType,
    pub force: f32,
    /// Fluctuation of the direction, `1` allows half turns both ways.
    pub fluctuation_direction: f32,
    /// Fluctuation of the force magnitude.
    pub fluctuation_force: f32,
    pub enabled: bool,
    pub filter: CollisionFilter,
}

impl Default for ForceField {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            orientation: Quat::identity(),
            direction: Vec3::z(),
            radius: 1.0,
            exponent: 1.0,
            field_type: FieldType::Radial,
            application_type: ApplicationType::Direct,
            force: 1.0,
            fluctuation_direction: 0.0,
            fluctuation_force: 0.0,
            enabled: true,
            filter: CollisionFilter::default(),
        }
    }
}

impl ForceField {
    /// Push direction in world space.
    #[inline]
    pub fn world_direction(&self) -> Vec3 {
        self.orientation * self.direction
    }

    /// Force on a body at `position`, scaled by `factor`.
    ///
    /// `None` when the position is outside the field or, for radial fields, at its center.
    pub fn force_at(&self, position: &DVec3, factor: f32, fluctuation: &Fluctuation) -> Option<Vec3> {
        let offset = to_f32(&(position - self.position));
        let distance_sq = offset.norm_squared();
        if distance_sq >= self.radius * self.radius {
            return None;
        }
        let distance = distance_sq.sqrt();
        let falloff = 1.0 - distance / self.radius;

        let direction = match self.field_type {
            FieldType::Linear => self.world_direction(),
            FieldType::Radial => {
                if distance_sq < RADIAL_EPS {
                    return None;
                }
                offset * falloff
            }
        };

        let magnitude = (self.force + self.fluctuation_force * fluctuation.strength())
            * falloff.powf(self.exponent)
            * factor;
        let turn = rotation_y(self.fluctuation_direction * fluctuation.direction() * PI);
        Some(turn * direction * magnitude)
    }

    /// Accumulate this field's force on `body` for the next step.
    pub fn apply_to_body(&self, body: &mut PhysicsBody, factors: &ForceFieldFactors, fluctuation: &Fluctuation) {
        let factor = self.application_type.factor(factors, body);
        if let Some(force) = self.force_at(&body.position(), factor, fluctuation) {
            body.apply_force(force);
        }
    }
}

/// Smoothly varying fluctuation values in `[-1, 1]`.
///
/// Deterministic: two incommensurate oscillations per channel, advanced by elapsed time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Fluctuation {
    time: f32,
    strength: f32,
    direction: f32,
}

impl Fluctuation {
    /// Start at a phase so colliders created together do not fluctuate in lockstep.
    pub fn with_phase(phase: f32) -> Self {
        let mut f = Self {
            time: phase,
            ..Self::default()
        };
        f.update(0.0);
        f
    }

    pub fn update(&mut self, elapsed: f32) {
        self.time += elapsed;
        let t = self.time;
        self.strength = (0.6 * (t * 2.3).sin() + 0.4 * (t * 5.9 + 1.3).sin()).clamp(-1.0, 1.0);
        self.direction = (0.7 * (t * 0.9 + 0.4).sin() + 0.3 * (t * 3.7).sin()).clamp(-1.0, 1.0);
    }

    #[inline]
    pub fn strength(&self) -> f32 {
        self.strength
    }

    #[inline]
    pub fn direction(&self) -> f32 {
        self.direction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm() -> Fluctuation {
        Fluctuation::default()
    }

    #[test]
    fn outside_radius_has_no_force() {
        let field = ForceField {
            radius: 2.0,
            ..ForceField::default()
        };
        assert!(field.force_at(&DVec3::new(2.0, 0.0, 0.0), 1.0, &calm()).is_none());
        assert!(field.force_at(&DVec3::new(3.0, 0.0, 0.0), 1.0, &calm()).is_none());
    }

    #[test]
    fn radial_field_pushes_outwards_with_falloff() {
        let field = ForceField {
            radius: 4.0,
            force: 10.0,
            exponent: 1.0,
            ..ForceField::default()
        };
        // distance 2 of 4: direction (2,0,0)*0.5, magnitude 10*0.5.
        let f = field.force_at(&DVec3::new(2.0, 0.0, 0.0), 1.0, &calm()).expect("force");
        assert!((f - Vec3::new(5.0, 0.0, 0.0)).norm() < 1.0e-4);
        assert!(field.force_at(&DVec3::zeros(), 1.0, &calm()).is_none());
    }

    #[test]
    fn linear_field_uses_direction_and_factor() {
        let field = ForceField {
            field_type: FieldType::Linear,
            direction: Vec3::y(),
            radius: 10.0,
            force: 2.0,
            exponent: 0.0,
            ..ForceField::default()
        };
        let f = field.force_at(&DVec3::new(1.0, 0.0, 0.0), 3.0, &calm()).expect("force");
        assert!((f - Vec3::new(0.0, 6.0, 0.0)).norm() < 1.0e-4);
    }

    #[test]
    fn fluctuation_direction_turns_about_y() {
        let field = ForceField {
            field_type: FieldType::Linear,
            direction: Vec3::x(),
            radius: 10.0,
            exponent: 0.0,
            fluctuation_direction: 0.5,
            ..ForceField::default()
        };
        let fluct = Fluctuation {
            time: 0.0,
            strength: 0.0,
            direction: 1.0,
        };
        // Quarter turn about +Y maps +X to -Z.
        let f = field.force_at(&DVec3::zeros(), 1.0, &fluct).expect("force");
        assert!((f - Vec3::new(0.0, 0.0, -1.0)).norm() < 1.0e-4);
    }

    #[test]
    fn fluctuation_stays_in_range() {
        let mut f = Fluctuation::with_phase(0.3);
        for _ in 0..200 {
            f.update(0.05);
            assert!((-1.0..=1.0).contains(&f.strength()));
            assert!((-1.0..=1.0).contains(&f.direction()));
        }
    }
}
