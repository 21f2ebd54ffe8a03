/*!
Rapier joints for classified constraints.

Each [`ConstraintKind`] gets its own axis layout:
- Static: every axis locked.
- BallSocket: linear axes locked, frames reduced to their pivots.
- Hinge: revolute layout, the unlocked angular axis turned onto the joint X axis.
- ConeTwist: linear axes locked, the twist axis turned onto joint X, zero spans locked.
- Generic6Dof(Spring): locked axes masked per definition, remap folded into the frames,
  springs as position motors.

Notes
- Angular limits are absolute angles between the frames, so centred spans need no frame
  correction.
- Locked linear axes may carry an offset in their lower limit; hinge and cone-twist
  joints move the first pivot by it.
*/

use std::f32::consts::{FRAC_PI_2, TAU};

use nalgebra as na;
use rapier3d::prelude::{GenericJoint, GenericJointBuilder, JointAxesMask, MotorModel, SpringCoefficients};

use super::{
    detect::{AxisRemap, ConstraintKind, Detection},
    dof::{ConstraintDef, ConstraintDof, DofAxis, DofState},
};
use crate::{
    collision::settings::{AXIS_EPS, JOINT_DAMPING_RATIO},
    math::{Iso, Quat, Vec3},
};

/// Position error correction of one joint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverParams {
    /// Fraction of the position error removed per time step.
    pub erp: f32,
    pub damping_ratio: f32,
}

impl SolverParams {
    /// Defaults; a joint between two non-dynamic bodies is made rigid.
    pub fn for_bodies(any_dynamic: bool) -> Self {
        Self {
            erp: if any_dynamic { 0.2 } else { 0.8 },
            damping_ratio: JOINT_DAMPING_RATIO,
        }
    }

    /// Joint softness removing `erp` of the error every `time_step`.
    ///
    /// Inverts `erp = h*w / (h*w + 2*zeta)`. A degenerate `erp` or step falls back to
    /// the backend's rigid defaults.
    pub fn softness(&self, time_step: f32) -> SpringCoefficients<f32> {
        if !(self.erp > 0.0 && self.erp < 1.0) || time_step <= 0.0 {
            return SpringCoefficients::joint_defaults();
        }
        let angular_frequency = 2.0 * self.damping_ratio * self.erp / (time_step * (1.0 - self.erp));
        SpringCoefficients::new(angular_frequency / TAU, self.damping_ratio)
    }
}

/// Axis states and limits as seen by the backend joint, remap applied.
pub(crate) fn backend_dofs(def: &ConstraintDef, detection: &Detection) -> [ConstraintDof; 6] {
    if detection.remap.is_none() {
        return def.dofs;
    }
    let mut dofs = def.dofs;
    for base in [0, 3] {
        for (target, source) in AxisRemap::SOURCE.iter().enumerate() {
            dofs[base + target] = def.dofs[base + source];
        }
    }
    dofs
}

fn lock_mask(axis: DofAxis) -> JointAxesMask {
    match axis {
        DofAxis::LinearX => JointAxesMask::LIN_X,
        DofAxis::LinearY => JointAxesMask::LIN_Y,
        DofAxis::LinearZ => JointAxesMask::LIN_Z,
        DofAxis::AngularX => JointAxesMask::ANG_X,
        DofAxis::AngularY => JointAxesMask::ANG_Y,
        DofAxis::AngularZ => JointAxesMask::ANG_Z,
    }
}

/// Constraint frames relative to the backend body origins.
fn body_frames(def: &ConstraintDef, offset1: &Vec3, offset2: &Vec3) -> (Iso, Iso) {
    let mut frame1 = def.frame1;
    let mut frame2 = def.frame2;
    frame1.translation.vector -= offset1;
    frame2.translation.vector -= offset2;
    (frame1, frame2)
}

/// Backend frames of a generic joint, with the axis remap folded into the rotations.
pub(crate) fn backend_frames(
    def: &ConstraintDef,
    detection: &Detection,
    offset1: &Vec3,
    offset2: &Vec3,
) -> (Iso, Iso) {
    let (mut frame1, mut frame2) = body_frames(def, offset1, offset2);
    if detection.remap.is_some() {
        let r = AxisRemap::rotation();
        frame1.rotation *= r;
        frame2.rotation *= r;
    }
    (frame1, frame2)
}

/// Move the first pivot by the lower limits of the locked linear axes.
fn shift_by_linear_offset(def: &ConstraintDef, frame1: &mut Iso) {
    let offset = Vec3::new(def.dofs[0].lower, def.dofs[1].lower, def.dofs[2].lower);
    frame1.translation.vector += frame1.rotation * offset;
}

/// Rotation taking the joint axes onto the constraint axes, starting at `first` (0..3)
/// for joint X and continuing cyclically.
fn cyclic_rotation(first: usize) -> Quat {
    let axes = [Vec3::x(), Vec3::y(), Vec3::z()];
    let m = na::Matrix3::from_columns(&[axes[first % 3], axes[(first + 1) % 3], axes[(first + 2) % 3]]);
    Quat::from_rotation_matrix(&na::Rotation3::from_matrix_unchecked(m))
}

fn turned(frames: (Iso, Iso), rotation: Quat) -> (Iso, Iso) {
    let (mut frame1, mut frame2) = frames;
    frame1.rotation *= rotation;
    frame2.rotation *= rotation;
    (frame1, frame2)
}

fn frames_joint(mask: JointAxesMask, (frame1, frame2): (Iso, Iso)) -> GenericJointBuilder {
    GenericJointBuilder::new(mask).local_frame1(frame1).local_frame2(frame2)
}

fn ball_socket_joint(frames: (Iso, Iso)) -> GenericJointBuilder {
    let pivot = |frame: Iso| Iso::from_parts(frame.translation, Quat::identity());
    frames_joint(JointAxesMask::LOCKED_SPHERICAL_AXES, (pivot(frames.0), pivot(frames.1)))
}

/// The first angular axis that is not locked (X, then Y) turns around; Z otherwise.
fn hinge_joint(def: &ConstraintDef, mut frames: (Iso, Iso)) -> GenericJointBuilder {
    shift_by_linear_offset(def, &mut frames.0);
    let (rotation, dof) = if def.dof(DofAxis::AngularX).state() != DofState::Locked {
        (Quat::identity(), def.dof(DofAxis::AngularX))
    } else if def.dof(DofAxis::AngularY).state() != DofState::Locked {
        (Quat::from_axis_angle(&Vec3::z_axis(), FRAC_PI_2), def.dof(DofAxis::AngularY))
    } else {
        (Quat::from_axis_angle(&Vec3::y_axis(), -FRAC_PI_2), def.dof(DofAxis::AngularZ))
    };
    let builder = frames_joint(JointAxesMask::LOCKED_REVOLUTE_AXES, turned(frames, rotation));
    if dof.state() == DofState::Limited {
        builder.limits(DofAxis::AngularX.joint_axis(), [dof.lower, dof.upper])
    } else {
        builder
    }
}

/// Twist axis: a zero span if there is one (X, Y, Z in order), else the widest span.
fn twist_axis(spans: &[f32; 3]) -> usize {
    if let Some(axis) = spans.iter().position(|s| *s < AXIS_EPS) {
        return axis;
    }
    if spans[0] > spans[1] && spans[0] > spans[2] {
        0
    } else if spans[1] > spans[2] {
        1
    } else {
        2
    }
}

fn cone_twist_joint(def: &ConstraintDef, mut frames: (Iso, Iso)) -> GenericJointBuilder {
    shift_by_linear_offset(def, &mut frames.0);
    let angular = [
        def.dof(DofAxis::AngularX),
        def.dof(DofAxis::AngularY),
        def.dof(DofAxis::AngularZ),
    ];
    let spans = angular.map(|d| ((d.upper - d.lower) * 0.5).max(0.0));
    let twist = twist_axis(&spans);

    let joint_axes = [DofAxis::AngularX, DofAxis::AngularY, DofAxis::AngularZ];
    let mut mask = JointAxesMask::LIN_AXES;
    for (i, axis) in joint_axes.iter().enumerate() {
        if spans[(twist + i) % 3] < AXIS_EPS {
            mask |= lock_mask(*axis);
        }
    }
    let mut builder = frames_joint(mask, turned(frames, cyclic_rotation(twist)));
    for (i, axis) in joint_axes.iter().enumerate() {
        let source = (twist + i) % 3;
        if spans[source] >= AXIS_EPS {
            builder = builder.limits(axis.joint_axis(), [angular[source].lower, angular[source].upper]);
        }
    }
    builder
}

fn generic_joint(
    def: &ConstraintDef,
    detection: &Detection,
    frames: (Iso, Iso),
    time_step: f32,
) -> GenericJointBuilder {
    let dofs = backend_dofs(def, detection);
    let mask = DofAxis::ALL
        .iter()
        .filter(|a| dofs[a.index()].state() == DofState::Locked)
        .fold(JointAxesMask::empty(), |m, a| m | lock_mask(*a));
    let mut builder = frames_joint(mask, frames);

    let spring_damping = def.damping * time_step;
    for axis in DofAxis::ALL {
        let dof = &dofs[axis.index()];
        if dof.state() == DofState::Limited {
            builder = builder.limits(axis.joint_axis(), [dof.lower, dof.upper]);
        }
        if detection.kind == ConstraintKind::Generic6DofSpring && dof.has_spring() {
            let rest = if dof.state() == DofState::Limited {
                (dof.lower + dof.upper) * 0.5
            } else {
                0.0
            };
            builder = builder
                .motor_model(axis.joint_axis(), MotorModel::ForceBased)
                .motor_position(axis.joint_axis(), rest, dof.spring_stiffness, spring_damping);
        }
    }
    builder
}

/// Build the backend joint for a classified constraint.
///
/// Contacts between the two bodies are disabled; the solver parameters set the joint
/// softness.
pub fn build_joint(
    def: &ConstraintDef,
    detection: &Detection,
    offset1: &Vec3,
    offset2: &Vec3,
    solver: &SolverParams,
    time_step: f32,
) -> GenericJoint {
    let frames = body_frames(def, offset1, offset2);
    let builder = match detection.kind {
        ConstraintKind::Static => frames_joint(JointAxesMask::LOCKED_FIXED_AXES, frames),
        ConstraintKind::BallSocket => ball_socket_joint(frames),
        ConstraintKind::Hinge => hinge_joint(def, frames),
        ConstraintKind::ConeTwist => cone_twist_joint(def, frames),
        ConstraintKind::Generic6Dof | ConstraintKind::Generic6DofSpring => generic_joint(
            def,
            detection,
            backend_frames(def, detection, offset1, offset2),
            time_step,
        ),
    };
    builder
        .contacts_enabled(false)
        .softness(solver.softness(time_step))
        .build()
}

#[cfg(test)]
mod tests {
    use rapier3d::prelude::JointAxis;

    use super::*;
    use crate::{config::PhysicsConfig, constraint::detect::detect_constraint_type};

    const DT: f32 = 1.0 / 60.0;

    fn joint_for(def: &ConstraintDef) -> (Detection, GenericJoint) {
        let detection = detect_constraint_type(def, &PhysicsConfig::default());
        let joint = build_joint(
            def,
            &detection,
            &Vec3::zeros(),
            &Vec3::zeros(),
            &SolverParams::for_bodies(true),
            DT,
        );
        (detection, joint)
    }

    #[test]
    fn hinge_turns_its_axis_onto_joint_x() {
        let def = ConstraintDef::default().with_dof(DofAxis::AngularZ, ConstraintDof::limited(-0.5, 0.25));
        let (detection, joint) = joint_for(&def);
        assert_eq!(detection.kind, ConstraintKind::Hinge);

        assert_eq!(joint.locked_axes, JointAxesMask::LOCKED_REVOLUTE_AXES);
        let axis = joint.local_frame1.rotation * Vec3::x();
        assert!((axis - Vec3::z()).norm() < 1.0e-5, "{axis:?}");
        let limits = joint.limits(JointAxis::AngX).expect("limits");
        assert!((limits.min + 0.5).abs() < 1.0e-6);
        assert!((limits.max - 0.25).abs() < 1.0e-6);
        assert!(!joint.contacts_enabled);
    }

    #[test]
    fn free_hinge_has_no_limits() {
        let def = ConstraintDef::default().with_dof(DofAxis::AngularY, ConstraintDof::free());
        let (detection, joint) = joint_for(&def);
        assert_eq!(detection.kind, ConstraintKind::Hinge);
        assert!(joint.limits(JointAxis::AngX).is_none());
        let axis = joint.local_frame2.rotation * Vec3::x();
        assert!((axis - Vec3::y()).norm() < 1.0e-5, "{axis:?}");
    }

    #[test]
    fn hinge_pivot_follows_locked_linear_offset() {
        let def = ConstraintDef::default()
            .with_dof(DofAxis::LinearY, ConstraintDof::limited(0.5, 0.5))
            .with_dof(DofAxis::AngularX, ConstraintDof::limited(-1.0, 1.0));
        let (detection, joint) = joint_for(&def);
        assert_eq!(detection.kind, ConstraintKind::Hinge);
        assert!((joint.local_frame1.translation.vector - Vec3::new(0.0, 0.5, 0.0)).norm() < 1.0e-6);
    }

    #[test]
    fn ball_socket_leaves_every_angle_free() {
        let mut def = ConstraintDef::default()
            .with_dof(DofAxis::AngularX, ConstraintDof::free())
            .with_dof(DofAxis::AngularY, ConstraintDof::free())
            .with_dof(DofAxis::AngularZ, ConstraintDof::free());
        def.frame1 = Iso::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0));
        let (detection, joint) = joint_for(&def);
        assert_eq!(detection.kind, ConstraintKind::BallSocket);

        assert_eq!(joint.locked_axes, JointAxesMask::LOCKED_SPHERICAL_AXES);
        assert!(joint.limits(JointAxis::AngX).is_none());
        assert!((joint.local_frame1.translation.vector - Vec3::new(0.0, 1.0, 0.0)).norm() < 1.0e-6);
        assert!(joint.local_frame1.rotation.angle() < 1.0e-6);
    }

    #[test]
    fn cone_twist_uses_the_locked_axis_as_twist() {
        // Y locked: twist along Y, swings around Z and X.
        let def = ConstraintDef::default()
            .with_dof(DofAxis::AngularX, ConstraintDof::limited(-0.4, 0.4))
            .with_dof(DofAxis::AngularZ, ConstraintDof::limited(-0.2, 0.6));
        let (detection, joint) = joint_for(&def);
        assert_eq!(detection.kind, ConstraintKind::ConeTwist);

        assert_eq!(joint.locked_axes, JointAxesMask::LIN_AXES | JointAxesMask::ANG_X);
        let twist = joint.local_frame1.rotation * Vec3::x();
        assert!((twist - Vec3::y()).norm() < 1.0e-5, "{twist:?}");
        let z = joint.limits(JointAxis::AngY).expect("z swing");
        assert!((z.min + 0.2).abs() < 1.0e-6 && (z.max - 0.6).abs() < 1.0e-6);
        let x = joint.limits(JointAxis::AngZ).expect("x swing");
        assert!((x.min + 0.4).abs() < 1.0e-6 && (x.max - 0.4).abs() < 1.0e-6);
    }

    #[test]
    fn cone_twist_without_locks_twists_around_the_widest_span() {
        let def = ConstraintDef::default()
            .with_dof(DofAxis::AngularX, ConstraintDof::limited(-0.1, 0.1))
            .with_dof(DofAxis::AngularY, ConstraintDof::limited(-0.2, 0.2))
            .with_dof(DofAxis::AngularZ, ConstraintDof::limited(-0.9, 0.9));
        let (detection, joint) = joint_for(&def);
        assert_eq!(detection.kind, ConstraintKind::ConeTwist);
        assert_eq!(joint.locked_axes, JointAxesMask::LIN_AXES);
        let twist = joint.local_frame1.rotation * Vec3::x();
        assert!((twist - Vec3::z()).norm() < 1.0e-5, "{twist:?}");
        let limits = joint.limits(JointAxis::AngX).expect("twist");
        assert!((limits.max - 0.9).abs() < 1.0e-6);
    }

    #[test]
    fn kinds_differ_in_backend_layout() {
        let hinge = ConstraintDef::default().with_dof(DofAxis::AngularX, ConstraintDof::limited(-0.3, 0.3));
        let cone = hinge
            .clone()
            .with_dof(DofAxis::AngularY, ConstraintDof::limited(-0.3, 0.3));
        let ball = ConstraintDef::default()
            .with_dof(DofAxis::AngularX, ConstraintDof::free())
            .with_dof(DofAxis::AngularY, ConstraintDof::free())
            .with_dof(DofAxis::AngularZ, ConstraintDof::free());
        let masks = [ConstraintDef::default(), hinge, cone, ball].map(|def| joint_for(&def).1.locked_axes);
        for (i, a) in masks.iter().enumerate() {
            for b in &masks[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn remap_moves_limits() {
        let cfg = PhysicsConfig {
            enable_constraint_hinge: false,
            ..PhysicsConfig::default()
        };
        let def = ConstraintDef::default().with_dof(DofAxis::AngularY, ConstraintDof::limited(-0.3, 0.3));
        let detection = detect_constraint_type(&def, &cfg);
        let dofs = backend_dofs(&def, &detection);

        assert_eq!(dofs[DofAxis::AngularX.index()].state(), DofState::Limited);
        assert_eq!(dofs[DofAxis::AngularY.index()].state(), DofState::Locked);
        let joint = build_joint(&def, &detection, &Vec3::zeros(), &Vec3::zeros(), &SolverParams::for_bodies(true), DT);
        assert!(!joint.locked_axes.contains(JointAxesMask::ANG_X));
        assert!(joint.locked_axes.contains(JointAxesMask::ANG_Y | JointAxesMask::ANG_Z));
    }

    #[test]
    fn frames_subtract_body_offsets() {
        let mut def = ConstraintDef::default();
        def.frame1 = Iso::translation(1.0, 2.0, 3.0);
        let detection = detect_constraint_type(&def, &PhysicsConfig::default());
        let (f1, f2) = backend_frames(&def, &detection, &Vec3::new(1.0, 0.0, 0.0), &Vec3::new(0.0, 1.0, 0.0));
        assert!((f1.translation.vector - Vec3::new(0.0, 2.0, 3.0)).norm() < 1.0e-6);
        assert!((f2.translation.vector - Vec3::new(0.0, -1.0, 0.0)).norm() < 1.0e-6);
    }

    #[test]
    fn softness_reproduces_the_error_reduction() {
        for any_dynamic in [true, false] {
            let params = SolverParams::for_bodies(any_dynamic);
            let softness = params.softness(DT);
            assert!((softness.erp(DT) - params.erp).abs() < 1.0e-4);
        }
        assert!((SolverParams::for_bodies(false).erp - 0.8).abs() < 1.0e-6);
        assert!((SolverParams::for_bodies(true).erp - 0.2).abs() < 1.0e-6);
    }

    #[test]
    fn joint_carries_the_solver_softness() {
        let def = ConstraintDef::default();
        let detection = detect_constraint_type(&def, &PhysicsConfig::default());
        let rigid = SolverParams::for_bodies(false);
        let joint = build_joint(&def, &detection, &Vec3::zeros(), &Vec3::zeros(), &rigid, DT);
        assert!((joint.softness.erp(DT) - 0.8).abs() < 1.0e-4);
        assert_eq!(joint.locked_axes, JointAxesMask::LOCKED_FIXED_AXES);
    }
}
