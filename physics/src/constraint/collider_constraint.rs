use super::{
    backend::{SolverParams, backend_dofs, backend_frames, build_joint},
    detect::{ConstraintKind, Detection, detect_constraint_type},
    dof::{ConstraintDef, ConstraintDof, DofAxis},
};
use crate::{
    body::{BodySnapshot, PhysicsBody},
    collision::settings::{AXIS_EPS, BREAKABLE_EPS, BREAKING_APPLY_EPS},
    config::PhysicsConfig,
    dynamics::{BodyKey, DynamicsWorld, JointKey},
    math::Vec3,
};

/// Non-owning reference to a constrained body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BodyRef {
    pub key: BodyKey,
    pub dynamic: bool,
}

impl BodyRef {
    /// Reference to an attached body; `None` while it has no backend key.
    pub fn of(body: &PhysicsBody) -> Option<Self> {
        body.key().map(|key| Self {
            key,
            dynamic: body.is_dynamic(),
        })
    }
}

/// A joint between a first body and an optional second body (`None` = the world).
///
/// The backend joint is created lazily: only when the constraint is enabled, attached to
/// a dynamics world, the first body exists in the backend and a declared second body
/// exists too. Any change of bodies, offsets or definition drops the joint; it is
/// recreated on the next [`ColliderConstraint::prepare_for_step`].
pub struct ColliderConstraint {
    def: ConstraintDef,
    detection: Detection,
    first: Option<BodyRef>,
    second: Option<BodyRef>,
    second_declared: bool,
    offset1: Vec3,
    offset2: Vec3,
    enabled: bool,
    attached: bool,
    joint: Option<JointKey>,
    broken: bool,
    solver: SolverParams,
    time_step: f32,
}

impl ColliderConstraint {
    pub fn new(def: ConstraintDef, config: &PhysicsConfig) -> Self {
        let detection = detect_constraint_type(&def, config);
        Self {
            def,
            detection,
            first: None,
            second: None,
            second_declared: false,
            offset1: Vec3::zeros(),
            offset2: Vec3::zeros(),
            enabled: true,
            attached: false,
            joint: None,
            broken: false,
            solver: SolverParams::for_bodies(false),
            time_step: config.simulation_time_step,
        }
    }

    /// Initial enabled state, before the constraint joins a world.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[inline]
    pub fn def(&self) -> &ConstraintDef {
        &self.def
    }

    #[inline]
    pub fn kind(&self) -> ConstraintKind {
        self.detection.kind
    }

    #[inline]
    pub fn detection(&self) -> &Detection {
        &self.detection
    }

    #[inline]
    pub fn solver_params(&self) -> SolverParams {
        self.solver
    }

    #[inline]
    pub fn is_created(&self) -> bool {
        self.joint.is_some()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn is_breakable(&self) -> bool {
        self.def.breaking_threshold > BREAKABLE_EPS
    }

    #[inline]
    pub fn has_broken(&self) -> bool {
        self.broken
    }

    /// Joint friction is driven by velocity motors; no separate friction constraints exist.
    #[inline]
    pub fn get_constraint_friction_count(&self) -> usize {
        0
    }

    #[inline]
    pub fn first_body(&self) -> Option<BodyRef> {
        self.first
    }

    #[inline]
    pub fn second_body(&self) -> Option<BodyRef> {
        self.second
    }

    /// Join a dynamics world and create the joint when possible.
    pub fn attach(&mut self, dynamics: &mut DynamicsWorld) {
        self.attached = true;
        self.try_create(dynamics);
    }

    /// Leave the dynamics world, dropping the backend joint.
    pub fn detach(&mut self, dynamics: &mut DynamicsWorld) {
        self.destroy(dynamics);
        self.attached = false;
    }

    pub fn set_first_body(&mut self, dynamics: &mut DynamicsWorld, body: Option<BodyRef>) {
        if self.first != body {
            self.destroy(dynamics);
            self.first = body;
        }
    }

    /// Set the second body. `declared` marks that a second body is required even while
    /// `body` is still missing, which defers creation instead of anchoring to the world.
    pub fn set_second_body(&mut self, dynamics: &mut DynamicsWorld, body: Option<BodyRef>, declared: bool) {
        if self.second != body || self.second_declared != declared {
            self.destroy(dynamics);
            self.second = body;
            self.second_declared = declared;
        }
    }

    pub fn set_first_offset(&mut self, dynamics: &mut DynamicsWorld, offset: Vec3) {
        if self.offset1 != offset {
            self.destroy(dynamics);
            self.offset1 = offset;
        }
    }

    pub fn set_second_offset(&mut self, dynamics: &mut DynamicsWorld, offset: Vec3) {
        if self.offset2 != offset {
            self.destroy(dynamics);
            self.offset2 = offset;
        }
    }

    /// Replace the definition: re-classify and recreate.
    pub fn set_constraint(&mut self, dynamics: &mut DynamicsWorld, def: ConstraintDef, config: &PhysicsConfig) {
        self.destroy(dynamics);
        self.detection = detect_constraint_type(&def, config);
        self.def = def;
        self.time_step = config.simulation_time_step;
        self.broken = false;
    }

    pub fn set_enabled(&mut self, dynamics: &mut DynamicsWorld, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            self.broken = false;
            self.try_create(dynamics);
        } else {
            self.destroy(dynamics);
        }
    }

    fn destroy(&mut self, dynamics: &mut DynamicsWorld) {
        if let Some(joint) = self.joint.take() {
            dynamics.remove_joint(joint);
        }
    }

    fn can_create(&self, dynamics: &DynamicsWorld) -> bool {
        if !self.enabled || !self.attached || self.broken {
            return false;
        }
        let Some(first) = self.first else {
            return false;
        };
        if !dynamics.has_rigid_body(first.key) {
            return false;
        }
        match self.second {
            Some(second) => dynamics.has_rigid_body(second.key),
            None => !self.second_declared,
        }
    }

    fn try_create(&mut self, dynamics: &mut DynamicsWorld) {
        if let Some(joint) = self.joint {
            if dynamics.has_joint(joint) {
                return;
            }
            // The backend drops joints together with a recreated body.
            log::debug!("constraint {:?} lost its backend joint; recreating", self.detection.kind);
            self.joint = None;
        }
        if !self.can_create(dynamics) {
            log::debug!("constraint {:?} not created yet", self.detection.kind);
            return;
        }
        let Some(first) = self.first else {
            return;
        };
        let any_dynamic = first.dynamic || self.second.is_some_and(|b| b.dynamic);
        self.solver = SolverParams::for_bodies(any_dynamic);

        let joint = build_joint(
            &self.def,
            &self.detection,
            &self.offset1,
            &self.offset2,
            &self.solver,
            self.time_step,
        );
        let threshold = if self.def.breaking_threshold > BREAKING_APPLY_EPS {
            self.def.breaking_threshold
        } else {
            0.0
        };
        self.joint = dynamics.add_joint(first.key, self.second.map(|b| b.key), joint, threshold);
    }

    /// Create a pending joint and refresh joint-friction motors.
    ///
    /// Friction axes get a zero-velocity motor whose force cap is
    /// `|relvel·axis + (ext·inv_mass)·axis·dt| * dt * friction`, where friction is the
    /// kinematic coefficient or, without one, the static coefficient.
    pub fn prepare_for_step(
        &mut self,
        dynamics: &mut DynamicsWorld,
        first: Option<&PhysicsBody>,
        second: Option<&PhysicsBody>,
        dt: f32,
    ) {
        self.try_create(dynamics);
        let Some(joint_key) = self.joint else {
            return;
        };
        let dofs = backend_dofs(&self.def, &self.detection);
        let friction_axes: Vec<DofAxis> = DofAxis::ALL
            .into_iter()
            .filter(|a| dofs[a.index()].has_friction())
            .collect();
        if friction_axes.is_empty() {
            return;
        }

        let s1 = first.map(PhysicsBody::snapshot).unwrap_or_default();
        let s2 = second.map(PhysicsBody::snapshot).unwrap_or_default();
        let frame_rotation = first.map_or_else(crate::math::Quat::identity, |b| b.orientation())
            * backend_frames(&self.def, &self.detection, &self.offset1, &self.offset2)
                .0
                .rotation;

        let Some(joint) = dynamics.joint_mut(joint_key) else {
            return;
        };
        for axis in friction_axes {
            let world_axis = frame_rotation * axis.direction();
            let max_force = friction_force(&s1, &s2, axis, &world_axis, dt) * friction_coefficient(&dofs[axis.index()]);
            joint.set_motor_velocity(axis.joint_axis(), 0.0, 1.0);
            joint.set_motor_max_force(axis.joint_axis(), max_force);
        }
    }

    /// Report a break once: true the first time the backend joint is found disabled.
    pub fn check_has_broken(&mut self, dynamics: &DynamicsWorld) -> bool {
        if self.broken || !self.enabled {
            return false;
        }
        let Some(joint) = self.joint else {
            return false;
        };
        if dynamics.is_joint_enabled(joint) == Some(false) {
            self.broken = true;
            log::info!(
                "constraint {:?} broke (threshold {:.3})",
                self.detection.kind,
                self.def.breaking_threshold
            );
            return true;
        }
        false
    }
}

/// Kinematic friction, or static friction on axes without kinematic friction.
fn friction_coefficient(dof: &ConstraintDof) -> f32 {
    if dof.kinematic_friction > AXIS_EPS {
        dof.kinematic_friction
    } else {
        dof.static_friction
    }
}

/// `|relvel·axis + (ext·inv_mass)·axis·dt| * dt` for one axis.
fn friction_force(s1: &BodySnapshot, s2: &BodySnapshot, axis: DofAxis, world_axis: &Vec3, dt: f32) -> f32 {
    let (relvel, ext) = if axis.is_linear() {
        (
            s1.linear_velocity - s2.linear_velocity,
            s1.force * s1.inv_mass - s2.force * s2.inv_mass,
        )
    } else {
        (
            s1.angular_velocity - s2.angular_velocity,
            s1.torque * s1.inv_inertia - s2.torque * s2.inv_inertia,
        )
    };
    (relvel.dot(world_axis) + ext.dot(world_axis) * dt).abs() * dt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        body::ResponseType,
        shape::{Shape, ShapeFactory},
    };

    fn body(dynamics: &mut DynamicsWorld, response: ResponseType) -> PhysicsBody {
        let mut b = PhysicsBody::new(0);
        b.set_response_type(response);
        b.set_shape(
            ShapeFactory::build(&[Shape::sphere(Vec3::zeros(), 0.5)], Vec3::new(1.0, 1.0, 1.0), Vec3::zeros())
                .expect("shape"),
        );
        b.attach(dynamics);
        b
    }

    fn bref(b: &PhysicsBody) -> Option<BodyRef> {
        BodyRef::of(b)
    }

    #[test]
    fn creation_waits_for_world_and_declared_second_body() {
        let mut dynamics = DynamicsWorld::new();
        let a = body(&mut dynamics, ResponseType::Dynamic);
        let mut c = ColliderConstraint::new(ConstraintDef::default(), &PhysicsConfig::default());

        c.set_first_body(&mut dynamics, bref(&a));
        c.set_second_body(&mut dynamics, None, true);
        c.attach(&mut dynamics);
        assert!(!c.is_created());

        let b = body(&mut dynamics, ResponseType::Dynamic);
        c.set_second_body(&mut dynamics, bref(&b), true);
        c.prepare_for_step(&mut dynamics, Some(&a), Some(&b), 1.0 / 60.0);
        assert!(c.is_created());
        assert_eq!(c.kind(), ConstraintKind::Static);
        assert_eq!(c.get_constraint_friction_count(), 0);

        c.detach(&mut dynamics);
        assert!(!c.is_created());
        assert_eq!(dynamics.joint_count(), 0);
    }

    #[test]
    fn break_latch_reports_once() {
        let mut dynamics = DynamicsWorld::new();
        let a = body(&mut dynamics, ResponseType::Dynamic);
        let mut def = ConstraintDef::default();
        def.breaking_threshold = 5.0;
        let mut c = ColliderConstraint::new(def, &PhysicsConfig::default());
        c.set_first_body(&mut dynamics, bref(&a));
        c.attach(&mut dynamics);
        assert!(c.is_breakable());
        assert!(!c.check_has_broken(&dynamics));

        let joint = c.joint.expect("joint");
        dynamics.set_joint_enabled(joint, false);
        assert!(c.check_has_broken(&dynamics));
        assert!(!c.check_has_broken(&dynamics));
        assert!(c.has_broken());
    }

    #[test]
    fn friction_force_uses_relative_velocity() {
        let s1 = BodySnapshot {
            linear_velocity: Vec3::new(2.0, 0.0, 0.0),
            inv_mass: 1.0,
            ..BodySnapshot::default()
        };
        let s2 = BodySnapshot::default();
        let f = friction_force(&s1, &s2, DofAxis::LinearX, &Vec3::x(), 0.5);
        assert!((f - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn friction_constraint_gets_motors() {
        let mut dynamics = DynamicsWorld::new();
        let a = body(&mut dynamics, ResponseType::Dynamic);
        let mut def = ConstraintDef::default().with_dof(DofAxis::AngularX, ConstraintDof::free());
        def.dof_mut(DofAxis::AngularX).kinematic_friction = 0.5;
        let mut c = ColliderConstraint::new(def, &PhysicsConfig::default());
        assert_eq!(c.kind(), ConstraintKind::Generic6Dof);

        c.set_first_body(&mut dynamics, bref(&a));
        c.attach(&mut dynamics);
        c.prepare_for_step(&mut dynamics, Some(&a), None, 1.0 / 60.0);
        let joint = dynamics.joint_mut(c.joint.expect("joint")).expect("backend");
        assert!(joint.motor(rapier3d::prelude::JointAxis::AngX).is_some());
    }

    #[test]
    fn static_friction_alone_gets_a_motor() {
        let mut dynamics = DynamicsWorld::new();
        let mut a = body(&mut dynamics, ResponseType::Dynamic);
        a.set_linear_velocity(Vec3::new(3.0, 0.0, 0.0));
        let mut def = ConstraintDef::default().with_dof(DofAxis::LinearX, ConstraintDof::free());
        def.dof_mut(DofAxis::LinearX).static_friction = 0.8;
        let mut c = ColliderConstraint::new(def, &PhysicsConfig::default());
        assert_eq!(c.kind(), ConstraintKind::Generic6Dof);

        c.set_first_body(&mut dynamics, bref(&a));
        c.attach(&mut dynamics);
        c.prepare_for_step(&mut dynamics, Some(&a), None, 0.5);
        let joint = dynamics.joint_mut(c.joint.expect("joint")).expect("backend");
        let motor = joint.motor(rapier3d::prelude::JointAxis::LinX).expect("motor");
        // |3 * 0.5| * 0.5 * 0.8
        assert!((motor.max_force - 0.6).abs() < 1.0e-5, "{}", motor.max_force);
    }
}
