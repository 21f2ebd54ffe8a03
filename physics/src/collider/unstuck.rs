/*!
De-penetration of colliders that start a sweep inside other colliders.

1) gather scene entries near the stuck shape,
2) keep the ones it overlaps deeper than [`UNSTUCK_DEPTH_EPS`], with their contact normals,
3) iteratively project a correction over those normals until every overlap is cleared.

Each push prefers the part of the normal perpendicular to the intended motion, so the
correction disturbs the motion as little as possible. Normals almost parallel to the
motion are used as they are.
*/

use rapier3d::parry::shape::Shape;

use super::ColliderId;
use crate::{
    collision::{
        broad::{CollisionScene, SceneEntry, aabb_inflate},
        narrow_phase::penetration,
        settings::{NEARBY_MARGIN, UNSTUCK_CLEARANCE, UNSTUCK_DEPTH_EPS, UNSTUCK_ITERATIONS},
    },
    math::{Iso, Vec3, vec_is_zero},
};

/// Shortest perpendicular part of a normal still used instead of the normal itself.
const PERPENDICULAR_MIN: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Scene entry overlapping the stuck shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blocker {
    pub entry: usize,
    pub owner: ColliderId,
    /// Direction pushing the stuck shape out.
    pub normal: Vec3,
    pub depth: f32,
}

/// Accepted scene entries whose bounds come within [`NEARBY_MARGIN`] of `shape`.
pub fn find_nearby_colliders(
    scene: &mut CollisionScene,
    shape: &dyn Shape,
    iso: &Iso,
    mut accept: impl FnMut(&SceneEntry) -> bool,
) -> Vec<usize> {
    let bounds = aabb_inflate(&shape.compute_aabb(iso), NEARBY_MARGIN);
    scene
        .query(&bounds)
        .into_iter()
        .filter(|&index| scene.entry(index).is_some_and(&mut accept))
        .collect()
}

/// Overlaps of `shape` with `candidates` deeper than [`UNSTUCK_DEPTH_EPS`].
pub fn find_blocker_normals(scene: &CollisionScene, candidates: &[usize], shape: &dyn Shape, iso: &Iso) -> Vec<Blocker> {
    candidates
        .iter()
        .filter_map(|&index| {
            let entry = scene.entry(index)?;
            let contact = penetration(iso, shape, &entry.iso, &*entry.shape, 0.0)?;
            (contact.depth > UNSTUCK_DEPTH_EPS).then_some(Blocker {
                entry: index,
                owner: entry.owner,
                normal: contact.normal,
                depth: contact.depth,
            })
        })
        .collect()
}

/// Correction that clears every blocker, or `None` when nothing blocks.
pub fn unstuck(blockers: &[Blocker], displacement: &Vec3) -> Option<Vec3> {
    if blockers.is_empty() {
        return None;
    }
    let motion = displacement.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros);

    let mut correction = Vec3::zeros();
    for _ in 0..UNSTUCK_ITERATIONS {
        let mut cleared = true;
        for blocker in blockers {
            let required = blocker.depth + UNSTUCK_CLEARANCE;
            let missing = required - correction.dot(&blocker.normal);
            if missing <= UNSTUCK_DEPTH_EPS {
                continue;
            }
            cleared = false;

            let perpendicular = blocker.normal - motion * blocker.normal.dot(&motion);
            let length = perpendicular.norm();
            if length >= PERPENDICULAR_MIN {
                // Along the unit perpendicular p, p·n equals |p|.
                correction += perpendicular / length * (missing / length);
            } else {
                correction += blocker.normal * missing;
            }
        }
        if cleared {
            break;
        }
    }
    (!vec_is_zero(&correction, f32::EPSILON)).then_some(correction)
}

#[cfg(test)]
mod tests {
    use rapier3d::prelude::SharedShape;

    use super::*;
    use crate::collision::filter::CollisionFilter;

    fn blocker(normal: Vec3, depth: f32) -> Blocker {
        Blocker {
            entry: 0,
            owner: ColliderId::new(0, 0),
            normal,
            depth,
        }
    }

    #[test]
    fn nothing_to_resolve_without_blockers() {
        assert!(unstuck(&[], &Vec3::x()).is_none());
    }

    #[test]
    fn floor_pushes_up_regardless_of_motion() {
        let c = unstuck(&[blocker(Vec3::y(), 0.1)], &Vec3::new(1.0, 0.0, 0.0)).expect("correction");
        assert!((c - Vec3::new(0.0, 0.1 + UNSTUCK_CLEARANCE, 0.0)).norm() < 1.0e-5);
    }

    #[test]
    fn head_on_wall_pushes_back_along_normal() {
        let c = unstuck(&[blocker(-Vec3::x(), 0.2)], &Vec3::new(2.0, 0.0, 0.0)).expect("correction");
        assert!((c - Vec3::new(-(0.2 + UNSTUCK_CLEARANCE), 0.0, 0.0)).norm() < 1.0e-5);
    }

    #[test]
    fn slanted_normal_is_resolved_perpendicular_to_motion() {
        // 30 degrees off the floor normal, towards the motion.
        let n = Vec3::new(-0.5, 0.866_025_4, 0.0);
        let c = unstuck(&[blocker(n, 0.1)], &Vec3::x()).expect("correction");
        assert!(c.x.abs() < 1.0e-5);
        assert!(c.dot(&n) >= 0.1 + UNSTUCK_CLEARANCE - 1.0e-4);
    }

    #[test]
    fn corner_clears_both_walls() {
        let blockers = [blocker(Vec3::y(), 0.05), blocker(-Vec3::x(), 0.05)];
        let c = unstuck(&blockers, &Vec3::new(1.0, -1.0, 0.0)).expect("correction");
        for b in &blockers {
            assert!(c.dot(&b.normal) >= b.depth);
        }
    }

    #[test]
    fn overlapping_ball_finds_the_floor_normal() {
        let floor = SceneEntry::new(
            ColliderId::new(1, 0),
            None,
            SharedShape::cuboid(5.0, 0.5, 5.0),
            Iso::identity(),
            CollisionFilter::default(),
        );
        let mut scene = CollisionScene::build(vec![floor]);
        let ball = SharedShape::ball(0.5);
        let iso = Iso::translation(0.0, 0.8, 0.0);

        let nearby = find_nearby_colliders(&mut scene, &*ball, &iso, |_| true);
        assert_eq!(nearby, vec![0]);
        let blockers = find_blocker_normals(&scene, &nearby, &*ball, &iso);
        assert_eq!(blockers.len(), 1);
        assert!((blockers[0].depth - 0.2).abs() < 1.0e-4);
        assert!((blockers[0].normal - Vec3::y()).norm() < 1.0e-4);
    }
}
