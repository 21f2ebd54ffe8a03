/*!
Read-only skeleton data consumed by bone colliders.

A [`Rig`] is the static definition (rest pose, central mass points, shapes, constraints).
A [`Component`] is one animated instance of a rig: it owns a pose per bone and the bone
matrices derived from it.

Conventions
- Bone matrices map bone space to rig (component) space: `matrix = parent * local`.
- A rig bone's `local` matrix is its rest transform relative to its parent.
- A component bone matrix is `parent * rest_local * pose`.
*/

use std::sync::Arc;

use crate::{
    constraint::{ConstraintDef, ConstraintDof},
    error::{PhysicsError, Result},
    math::{DMat4, DVec3, Quat, Vec3, matrix_from, matrix_inverse, to_f64},
    shape::Shape,
};

/// Constraint from a rig bone to a partner bone, authored in the owning bone's space.
#[derive(Clone, Debug, PartialEq)]
pub struct RigConstraint {
    /// Bone the constraint connects to. Constraints without a partner are not simulated.
    pub partner_bone: Option<usize>,
    pub reference_position: Vec3,
    pub reference_orientation: Quat,
    /// Offset of the joint point relative to the reference frame.
    pub bone_offset: Vec3,
    /// Linear X, Y, Z then angular X, Y, Z.
    pub dofs: [ConstraintDof; 6],
    pub damping: f32,
    pub breaking_threshold: f32,
}

impl Default for RigConstraint {
    fn default() -> Self {
        Self {
            partner_bone: None,
            reference_position: Vec3::zeros(),
            reference_orientation: Quat::identity(),
            bone_offset: Vec3::zeros(),
            dofs: [ConstraintDof::locked(); 6],
            damping: 0.0,
            breaking_threshold: 0.0,
        }
    }
}

impl RigConstraint {
    /// Constraint definition with default frames; frames are filled in by the collider.
    pub fn to_def(&self) -> ConstraintDef {
        ConstraintDef {
            dofs: self.dofs,
            damping: self.damping,
            breaking_threshold: self.breaking_threshold,
            ..ConstraintDef::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RigBone {
    pub name: String,
    pub parent: Option<usize>,
    pub position: Vec3,
    pub orientation: Quat,
    pub central_mass_point: Vec3,
    /// Simulated by dynamics when the owning collider is dynamic.
    pub dynamic: bool,
    pub mass: f32,
    pub shapes: Vec<Shape>,
    pub constraints: Vec<RigConstraint>,

    local: DMat4,
    matrix: DMat4,
    inverse_matrix: DMat4,
}

impl RigBone {
    pub fn new(name: impl Into<String>, parent: Option<usize>, position: Vec3, orientation: Quat) -> Self {
        Self {
            name: name.into(),
            parent,
            position,
            orientation,
            central_mass_point: Vec3::zeros(),
            dynamic: false,
            mass: 1.0,
            shapes: Vec::new(),
            constraints: Vec::new(),
            local: DMat4::identity(),
            matrix: DMat4::identity(),
            inverse_matrix: DMat4::identity(),
        }
    }

    pub fn with_shapes(mut self, shapes: Vec<Shape>) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn with_constraint(mut self, constraint: RigConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_mass(mut self, mass: f32, central_mass_point: Vec3) -> Self {
        self.mass = mass;
        self.central_mass_point = central_mass_point;
        self
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    /// Rest transform relative to the parent bone.
    #[inline]
    pub fn local_matrix(&self) -> &DMat4 {
        &self.local
    }

    /// Rest transform in rig space.
    #[inline]
    pub fn matrix(&self) -> &DMat4 {
        &self.matrix
    }

    #[inline]
    pub fn inverse_matrix(&self) -> &DMat4 {
        &self.inverse_matrix
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rig {
    bones: Vec<RigBone>,
    root_bone: Option<usize>,
    shapes: Vec<Shape>,
    central_mass_point: Vec3,
    mass: f32,
}

impl Rig {
    /// Validate the hierarchy and compute rest matrices.
    ///
    /// Parents must precede their children, so matrices are resolved in one pass.
    pub fn new(bones: Vec<RigBone>, root_bone: Option<usize>) -> Result<Self> {
        let count = bones.len();
        if let Some(root) = root_bone
            && root >= count
        {
            return Err(PhysicsError::BoneIndexOutOfRange { index: root, count });
        }

        let mut bones = bones;
        for index in 0..count {
            let parent_matrix = match bones[index].parent {
                Some(parent) if parent >= count => {
                    return Err(PhysicsError::BoneIndexOutOfRange { index: parent, count });
                }
                Some(parent) if parent >= index => {
                    return Err(PhysicsError::InvalidParam("bone parent must precede the bone"));
                }
                Some(parent) => bones[parent].matrix,
                None => DMat4::identity(),
            };
            for constraint in &bones[index].constraints {
                if let Some(partner) = constraint.partner_bone
                    && partner >= count
                {
                    return Err(PhysicsError::BoneIndexOutOfRange { index: partner, count });
                }
            }
            let bone = &mut bones[index];
            if bone.mass < 0.0 {
                return Err(PhysicsError::InvalidParam("negative bone mass"));
            }
            bone.local = matrix_from(&to_f64(&bone.position), &bone.orientation);
            bone.matrix = parent_matrix * bone.local;
            bone.inverse_matrix = matrix_inverse(&bone.matrix);
        }

        let mass = bones.iter().map(|b| b.mass).sum();
        Ok(Self {
            bones,
            root_bone,
            shapes: Vec::new(),
            central_mass_point: Vec3::zeros(),
            mass,
        })
    }

    /// Rig level shapes. A rig with shapes collides as one body instead of per bone.
    pub fn with_shapes(mut self, shapes: Vec<Shape>, central_mass_point: Vec3) -> Self {
        self.shapes = shapes;
        self.central_mass_point = central_mass_point;
        self
    }

    #[inline]
    pub fn bones(&self) -> &[RigBone] {
        &self.bones
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bone(&self, index: usize) -> Result<&RigBone> {
        self.bones.get(index).ok_or(PhysicsError::BoneIndexOutOfRange {
            index,
            count: self.bones.len(),
        })
    }

    pub fn index_of_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    #[inline]
    pub fn root_bone(&self) -> Option<usize> {
        self.root_bone
    }

    #[inline]
    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    #[inline]
    pub fn central_mass_point(&self) -> Vec3 {
        self.central_mass_point
    }

    /// Sum of bone masses.
    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }
}

/// Animated pose of one bone, relative to its rest transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BonePose {
    pub position: DVec3,
    pub rotation: Quat,
}

impl Default for BonePose {
    fn default() -> Self {
        Self {
            position: DVec3::zeros(),
            rotation: Quat::identity(),
        }
    }
}

/// Animated instance of a rig.
#[derive(Clone, Debug)]
pub struct Component {
    rig: Arc<Rig>,
    poses: Vec<BonePose>,
    matrices: Vec<DMat4>,
    inverse_matrices: Vec<DMat4>,
    dirty: bool,
}

impl Component {
    pub fn new(rig: Arc<Rig>) -> Self {
        let count = rig.bone_count();
        let mut component = Self {
            rig,
            poses: vec![BonePose::default(); count],
            matrices: vec![DMat4::identity(); count],
            inverse_matrices: vec![DMat4::identity(); count],
            dirty: true,
        };
        component.prepare_bones();
        component
    }

    #[inline]
    pub fn rig(&self) -> &Arc<Rig> {
        &self.rig
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.poses.len()
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.poses.len() {
            Ok(())
        } else {
            Err(PhysicsError::BoneIndexOutOfRange {
                index,
                count: self.poses.len(),
            })
        }
    }

    pub fn bone_pose(&self, index: usize) -> Result<BonePose> {
        self.check(index)?;
        Ok(self.poses[index])
    }

    pub fn set_bone_pose(&mut self, index: usize, pose: BonePose) -> Result<()> {
        self.check(index)?;
        if self.poses[index] != pose {
            self.poses[index] = pose;
            self.dirty = true;
        }
        Ok(())
    }

    /// Recompute bone matrices if any pose changed.
    pub fn prepare_bones(&mut self) {
        if !self.dirty {
            return;
        }
        for index in 0..self.poses.len() {
            self.refresh_bone(index);
        }
        self.dirty = false;
    }

    /// Recompute one bone matrix from its pose and the current parent matrix.
    ///
    /// Used while walking the hierarchy parent first; other bones are left as they are.
    pub fn update_bone(&mut self, index: usize) -> Result<()> {
        self.check(index)?;
        self.refresh_bone(index);
        Ok(())
    }

    fn refresh_bone(&mut self, index: usize) {
        let bone = &self.rig.bones()[index];
        let pose = &self.poses[index];
        let local = bone.local_matrix() * matrix_from(&pose.position, &pose.rotation);
        let matrix = match bone.parent {
            Some(parent) => self.matrices[parent] * local,
            None => local,
        };
        self.matrices[index] = matrix;
        self.inverse_matrices[index] = matrix_inverse(&matrix);
    }

    /// Mark every bone matrix as current after a parent-first [`Component::update_bone`] walk.
    pub(crate) fn validate_bones(&mut self) {
        self.dirty = false;
    }

    /// Bone matrix in component space. Call [`Component::prepare_bones`] after pose
    /// changes.
    pub fn bone_matrix(&self, index: usize) -> Result<&DMat4> {
        self.check(index)?;
        Ok(&self.matrices[index])
    }

    pub fn bone_inverse_matrix(&self, index: usize) -> Result<&DMat4> {
        self.check(index)?;
        Ok(&self.inverse_matrices[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{matrix_position, transform_point};

    fn chain() -> Rig {
        Rig::new(
            vec![
                RigBone::new("root", None, Vec3::new(0.0, 1.0, 0.0), Quat::identity()),
                RigBone::new("child", Some(0), Vec3::new(0.0, 2.0, 0.0), Quat::identity()),
            ],
            Some(0),
        )
        .expect("rig")
    }

    #[test]
    fn rest_matrices_chain_through_parents() {
        let rig = chain();
        let p = matrix_position(rig.bone(1).expect("bone").matrix());
        assert!((p - DVec3::new(0.0, 3.0, 0.0)).norm() < 1.0e-9);
        assert_eq!(rig.index_of_bone("child"), Some(1));
    }

    #[test]
    fn parent_after_child_is_rejected() {
        let bones = vec![
            RigBone::new("a", Some(1), Vec3::zeros(), Quat::identity()),
            RigBone::new("b", None, Vec3::zeros(), Quat::identity()),
        ];
        assert!(matches!(Rig::new(bones, None), Err(PhysicsError::InvalidParam(_))));
        assert!(matches!(
            Rig::new(Vec::new(), Some(0)),
            Err(PhysicsError::BoneIndexOutOfRange { index: 0, count: 0 })
        ));
    }

    #[test]
    fn component_pose_moves_children() {
        let mut component = Component::new(Arc::new(chain()));
        component
            .set_bone_pose(
                0,
                BonePose {
                    position: DVec3::zeros(),
                    rotation: Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2),
                },
            )
            .expect("pose");
        component.prepare_bones();

        // Child sits 2 units along the rotated root Y, which now points to -X.
        let m = component.bone_matrix(1).expect("matrix");
        let p = transform_point(m, &DVec3::zeros());
        assert!((p - DVec3::new(-2.0, 1.0, 0.0)).norm() < 1.0e-5);
        assert!(component.set_bone_pose(5, BonePose::default()).is_err());
    }
}
