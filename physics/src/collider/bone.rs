use crate::{
    body::PhysicsBody,
    constraint::ColliderConstraint,
    error::Result,
    math::{
        DMat4, DVec3, Quat, Transform, Vec3, matrix_from, matrix_inverse, to_f64, translation_matrix,
    },
    rig::Rig,
    shape::ShapeList,
};

/// A matrix with its cached inverse.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatrixPair {
    pub matrix: DMat4,
    pub inverse: DMat4,
}

impl Default for MatrixPair {
    fn default() -> Self {
        Self {
            matrix: DMat4::identity(),
            inverse: DMat4::identity(),
        }
    }
}

impl MatrixPair {
    pub fn new(matrix: DMat4) -> Self {
        Self {
            matrix,
            inverse: matrix_inverse(&matrix),
        }
    }
}

/// Joint from a bone to a partner bone, built from one rig constraint.
pub struct BoneConstraint {
    /// Index of the source constraint in the rig bone.
    pub rig_index: usize,
    pub partner: usize,
    pub constraint: ColliderConstraint,
}

/// Simulation state of one rig bone inside a bone collider.
///
/// Matrices
/// - `local`: rest transform relative to the parent bone.
/// - `bone`: rest transform in rig space.
/// - `static_offset`: translation to the central mass point.
/// - `collider`: `bone * static_offset`, the body frame in rig space.
/// - `real`: world matrix of the bone, derived from the body state.
pub struct ColliderBone {
    index: usize,
    parent: Option<usize>,
    dynamic: bool,
    offset: Vec3,
    mass: f32,
    pub(crate) body: Option<PhysicsBody>,
    pub(crate) constraints: Vec<BoneConstraint>,
    pub(crate) shapes: ShapeList,

    local: MatrixPair,
    bone: MatrixPair,
    static_offset: MatrixPair,
    collider: MatrixPair,
    real: MatrixPair,

    position: DVec3,
    orientation: Quat,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    pub(crate) dirty: bool,
}

impl ColliderBone {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            parent: None,
            dynamic: false,
            offset: Vec3::zeros(),
            mass: 1.0,
            body: None,
            constraints: Vec::new(),
            shapes: ShapeList::default(),
            local: MatrixPair::default(),
            bone: MatrixPair::default(),
            static_offset: MatrixPair::default(),
            collider: MatrixPair::default(),
            real: MatrixPair::default(),
            position: DVec3::zeros(),
            orientation: Quat::identity(),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            dirty: true,
        }
    }

    /// Copy hierarchy, mass, shapes and rest matrices from the rig.
    pub fn set_from_rig_bone(&mut self, rig: &Rig, index: usize) -> Result<()> {
        let rig_bone = rig.bone(index)?;
        self.index = index;
        self.parent = rig_bone.parent;
        self.dynamic = rig_bone.dynamic;
        self.offset = rig_bone.central_mass_point;
        self.mass = rig_bone.mass;
        self.shapes = ShapeList::new(rig_bone.shapes.clone());

        self.local = MatrixPair::new(*rig_bone.local_matrix());
        self.bone = MatrixPair {
            matrix: *rig_bone.matrix(),
            inverse: *rig_bone.inverse_matrix(),
        };
        self.static_offset = MatrixPair::new(translation_matrix(&to_f64(&self.offset)));
        self.collider = MatrixPair::new(self.bone.matrix * self.static_offset.matrix);
        Ok(())
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
    #[inline]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }
    /// Dynamic flag of the rig bone.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
    pub fn set_dynamic(&mut self, dynamic: bool) {
        self.dynamic = dynamic;
    }
    /// Central mass point in bone space.
    #[inline]
    pub fn offset(&self) -> Vec3 {
        self.offset
    }
    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }
    #[inline]
    pub fn body(&self) -> Option<&PhysicsBody> {
        self.body.as_ref()
    }
    #[inline]
    pub fn body_mut(&mut self) -> Option<&mut PhysicsBody> {
        self.body.as_mut()
    }
    #[inline]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
    /// Whether dynamics drives this bone: its body exists and is dynamic.
    #[inline]
    pub fn is_simulated(&self) -> bool {
        self.body.as_ref().is_some_and(PhysicsBody::is_dynamic)
    }
    #[inline]
    pub fn constraints(&self) -> &[BoneConstraint] {
        &self.constraints
    }
    #[inline]
    pub fn shapes(&self) -> &ShapeList {
        &self.shapes
    }

    #[inline]
    pub fn local_matrix(&self) -> &MatrixPair {
        &self.local
    }
    #[inline]
    pub fn bone_matrix(&self) -> &MatrixPair {
        &self.bone
    }
    #[inline]
    pub fn static_offset_matrix(&self) -> &MatrixPair {
        &self.static_offset
    }
    #[inline]
    pub fn collider_matrix(&self) -> &MatrixPair {
        &self.collider
    }
    #[inline]
    pub fn real_matrix(&self) -> &MatrixPair {
        &self.real
    }

    #[inline]
    pub fn position(&self) -> DVec3 {
        self.position
    }
    #[inline]
    pub fn orientation(&self) -> Quat {
        self.orientation
    }
    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.orientation)
    }
    #[inline]
    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }
    #[inline]
    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    /// Set the body-frame pose (central mass point) and push it into the body.
    pub fn set_pose(&mut self, position: DVec3, orientation: Quat) {
        self.position = position;
        self.orientation = orientation;
        self.update_real_matrix();
        if let Some(body) = &mut self.body {
            body.set_position(position);
            body.set_orientation(orientation);
        }
        self.dirty = true;
    }

    pub fn set_velocities(&mut self, linear: Vec3, angular: Vec3) {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        if let Some(body) = &mut self.body {
            body.set_linear_velocity(linear);
            body.set_angular_velocity(angular);
        }
        self.dirty = true;
    }

    /// Copy the simulated body state into the bone.
    pub(crate) fn pull_from_body(&mut self) {
        let Some(body) = &self.body else {
            return;
        };
        self.position = body.position();
        self.orientation = body.orientation();
        self.linear_velocity = body.linear_velocity();
        self.angular_velocity = body.angular_velocity();
        self.update_real_matrix();
    }

    /// World matrix of the bone origin: the body frame moved back by the central mass point.
    fn update_real_matrix(&mut self) {
        let body = matrix_from(&self.position, &self.orientation);
        self.real = MatrixPair::new(body * self.static_offset.inverse);
    }

    /// Body frame in world space.
    #[inline]
    pub fn body_matrix(&self) -> DMat4 {
        matrix_from(&self.position, &self.orientation)
    }
}
