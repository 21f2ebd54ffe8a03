/*!
Colliders carried along by another collider.

An attachment names a target collider and how it follows its owner:

- `Static`: a fixed transform relative to the owner.
- `Bone`: relative to a named bone of the owner's skeleton. Unknown bones fall back to
  the owner transform.
- `Weight`: relative to a blend of bones, like a skinned vertex.

World transforms are `source * local`, with scale stripped from the result.
*/

use super::{ColliderId, state::ColliderState};
use crate::{
    math::{DMat4, Transform, matrix_from},
    rig::{Component, Rig},
};

#[derive(Clone, Debug, PartialEq)]
pub enum AttachmentKind {
    Static,
    Bone { name: String },
    /// `(bone index, weight)` pairs. Weights are used as given.
    Weight { weights: Vec<(usize, f32)> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    target: ColliderId,
    kind: AttachmentKind,
    local: Transform,
    /// Resolved bone of a `Bone` attachment.
    bone: Option<usize>,
}

impl Attachment {
    pub fn new(target: ColliderId, kind: AttachmentKind, local: Transform) -> Self {
        Self {
            target,
            kind,
            local,
            bone: None,
        }
    }

    #[inline]
    pub fn target(&self) -> ColliderId {
        self.target
    }
    #[inline]
    pub fn kind(&self) -> &AttachmentKind {
        &self.kind
    }
    #[inline]
    pub fn local(&self) -> &Transform {
        &self.local
    }

    /// Look the bone name up again, after the owner's rig changed.
    pub(crate) fn resolve(&mut self, rig: Option<&Rig>) {
        self.bone = match (&self.kind, rig) {
            (AttachmentKind::Bone { name }, Some(rig)) => rig.index_of_bone(name),
            _ => None,
        };
    }

    /// Source matrix the local transform is relative to.
    fn source_matrix(&self, state: &mut ColliderState, component: Option<&Component>, rig: Option<&Rig>) -> DMat4 {
        let unscaled = matrix_from(&state.position(), &state.orientation());
        match &self.kind {
            AttachmentKind::Static => unscaled,
            AttachmentKind::Bone { .. } => {
                let Some(index) = self.bone else {
                    return unscaled;
                };
                let bone = match (component, rig) {
                    (Some(component), _) => component.bone_matrix(index).ok().copied(),
                    (None, Some(rig)) => rig.bone(index).ok().map(|b| *b.matrix()),
                    (None, None) => None,
                };
                match bone {
                    Some(bone) => state.matrix() * bone,
                    None => unscaled,
                }
            }
            AttachmentKind::Weight { weights } => {
                let Some(component) = component else {
                    return *state.matrix();
                };
                let rig = component.rig();
                let mut blend = DMat4::zeros();
                let mut any = false;
                for &(index, weight) in weights {
                    let (Ok(pose), Ok(rest)) = (component.bone_matrix(index), rig.bone(index)) else {
                        continue;
                    };
                    blend += (pose * rest.inverse_matrix()) * f64::from(weight);
                    any = true;
                }
                if any { state.matrix() * blend } else { unscaled }
            }
        }
    }

    /// World transform the target should take now.
    pub fn world_transform(
        &self,
        state: &mut ColliderState,
        component: Option<&Component>,
        rig: Option<&Rig>,
    ) -> Transform {
        let source = self.source_matrix(state, component, rig);
        Transform::from_matrix(&(source * self.local.matrix()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        math::{DVec3, Quat, Vec3},
        rig::{BonePose, RigBone},
    };

    fn rig() -> Arc<Rig> {
        Arc::new(
            Rig::new(
                vec![
                    RigBone::new("root", None, Vec3::zeros(), Quat::identity()),
                    RigBone::new("hand", Some(0), Vec3::new(0.0, 1.0, 0.0), Quat::identity()),
                ],
                Some(0),
            )
            .expect("rig"),
        )
    }

    fn state_at(x: f64) -> ColliderState {
        let mut state = ColliderState::default();
        state.set_position(DVec3::new(x, 0.0, 0.0));
        state
    }

    #[test]
    fn static_attachment_keeps_relative_transform() {
        let mut state = state_at(2.0);
        state.set_orientation(Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2));
        let a = Attachment::new(
            ColliderId::new(1, 0),
            AttachmentKind::Static,
            Transform::new(DVec3::new(1.0, 0.0, 0.0), Quat::identity()),
        );
        // +X turned a quarter about +Y points to -Z.
        let t = a.world_transform(&mut state, None, None);
        assert!((t.translation - DVec3::new(2.0, 0.0, -1.0)).norm() < 1.0e-6);
    }

    #[test]
    fn bone_attachment_follows_the_animated_bone() {
        let rig = rig();
        let mut component = Component::new(Arc::clone(&rig));
        component
            .set_bone_pose(
                1,
                BonePose {
                    position: DVec3::new(0.0, 0.5, 0.0),
                    rotation: Quat::identity(),
                },
            )
            .expect("pose");
        component.prepare_bones();

        let mut a = Attachment::new(
            ColliderId::new(1, 0),
            AttachmentKind::Bone { name: "hand".into() },
            Transform::default(),
        );
        a.resolve(Some(&rig));
        let mut state = state_at(1.0);
        let t = a.world_transform(&mut state, Some(&component), Some(&rig));
        assert!((t.translation - DVec3::new(1.0, 1.5, 0.0)).norm() < 1.0e-6);

        // Unknown bones stay on the collider.
        let mut missing = Attachment::new(
            ColliderId::new(1, 0),
            AttachmentKind::Bone { name: "tail".into() },
            Transform::default(),
        );
        missing.resolve(Some(&rig));
        let t = missing.world_transform(&mut state, Some(&component), Some(&rig));
        assert!((t.translation - DVec3::new(1.0, 0.0, 0.0)).norm() < 1.0e-6);
    }

    #[test]
    fn weight_attachment_blends_bone_deltas() {
        let rig = rig();
        let mut component = Component::new(Arc::clone(&rig));
        component
            .set_bone_pose(
                0,
                BonePose {
                    position: DVec3::new(0.0, 0.0, 2.0),
                    rotation: Quat::identity(),
                },
            )
            .expect("pose");
        component.prepare_bones();

        // Root moved by 2 along Z and carried the hand; bone deltas are both T(0,0,2),
        // a half/half blend moves the point by 2 as well.
        let a = Attachment::new(
            ColliderId::new(1, 0),
            AttachmentKind::Weight {
                weights: vec![(0, 0.5), (1, 0.5)],
            },
            Transform::new(DVec3::new(0.0, 1.0, 0.0), Quat::identity()),
        );
        let mut state = state_at(0.0);
        let t = a.world_transform(&mut state, Some(&component), Some(&rig));
        assert!((t.translation - DVec3::new(0.0, 1.0, 2.0)).norm() < 1.0e-6);
    }
}
