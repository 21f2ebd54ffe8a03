use rapier3d::parry::{
    query::{self, ShapeCastOptions},
    shape::Shape,
};

use super::broad::{CollisionScene, SceneEntry, swept_aabb};
use crate::math::{Iso, Vec3};

/// Earliest hit of a swept shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepHit {
    /// World-space normal on the obstacle, opposing the motion.
    pub normal: Vec3,
    /// Fraction of the displacement travelled before contact, in `[0, 1]`.
    pub fraction: f32,
    /// Scene entry that was hit.
    pub entry: usize,
}

/// Shallow contact between two placed shapes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Penetration {
    /// World-space direction that pushes the first shape out of the second.
    pub normal: Vec3,
    /// Positive when overlapping.
    pub depth: f32,
}

/// Cast `shape` along `displacement` against one static `target`.
///
/// Shapes that start overlapping and move apart are not reported, so a collider resting
/// on a surface can slide away from it.
pub fn cast_shape(
    iso: &Iso,
    shape: &dyn Shape,
    displacement: &Vec3,
    target_iso: &Iso,
    target: &dyn Shape,
) -> Option<(Vec3, f32)> {
    let mut opts = ShapeCastOptions::with_max_time_of_impact(1.0);
    opts.stop_at_penetration = false;

    let hit = query::cast_shapes(
        iso,
        displacement,
        shape,
        target_iso,
        &Vec3::zeros(),
        target,
        opts,
    )
    .ok()
    .flatten()?;

    // normal1 is local to the moving shape; bring it to world space and make it oppose
    // the motion.
    let mut n = iso.rotation * hit.normal1.into_inner();
    if n.dot(displacement) > 0.0 {
        n = -n;
    }
    let len = n.norm();
    if len > f32::EPSILON {
        n /= len;
    }
    Some((n, hit.time_of_impact.clamp(0.0, 1.0)))
}

/// Sweep `shape` through the scene, returning the earliest hit among entries accepted
/// by `accept`.
pub fn cast_against_scene(
    scene: &mut CollisionScene,
    iso: &Iso,
    shape: &dyn Shape,
    displacement: &Vec3,
    mut accept: impl FnMut(&SceneEntry) -> bool,
) -> Option<SweepHit> {
    let swept = swept_aabb(shape, iso, displacement, 0.0);
    let candidates = scene.query(&swept);

    let mut best: Option<SweepHit> = None;
    for index in candidates {
        let Some(entry) = scene.entry(index) else {
            continue;
        };
        if !accept(entry) {
            continue;
        }
        if let Some((normal, fraction)) =
            cast_shape(iso, shape, displacement, &entry.iso, &*entry.shape)
            && best.is_none_or(|b| fraction < b.fraction)
        {
            best = Some(SweepHit {
                normal,
                fraction,
                entry: index,
            });
        }
    }
    best
}

/// Contact between `shape` and `target` when closer than `prediction`.
pub fn penetration(
    iso: &Iso,
    shape: &dyn Shape,
    target_iso: &Iso,
    target: &dyn Shape,
    prediction: f32,
) -> Option<Penetration> {
    let contact = query::contact(iso, shape, target_iso, target, prediction)
        .ok()
        .flatten()?;
    Some(Penetration {
        normal: -contact.normal1.into_inner(),
        depth: -contact.dist,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{collider::ColliderId, collision::filter::CollisionFilter};
    use rapier3d::prelude::SharedShape;

    #[test]
    fn sphere_hits_box_face_head_on() {
        let ball = SharedShape::ball(0.5);
        let wall = SharedShape::cuboid(0.5, 2.0, 2.0);
        let (n, t) = cast_shape(
            &Iso::translation(-3.0, 0.0, 0.0),
            &*ball,
            &Vec3::new(4.0, 0.0, 0.0),
            &Iso::translation(0.0, 0.0, 0.0),
            &*wall,
        )
        .expect("hit");

        // Travel 2.0 of 4.0 before the surfaces touch.
        assert!((t - 0.5).abs() < 1.0e-3);
        assert!((n - Vec3::new(-1.0, 0.0, 0.0)).norm() < 1.0e-3);
    }

    #[test]
    fn moving_away_from_overlap_is_not_a_hit() {
        let ball = SharedShape::ball(0.5);
        let wall = SharedShape::cuboid(0.5, 2.0, 2.0);
        let hit = cast_shape(
            &Iso::translation(-0.9, 0.0, 0.0),
            &*ball,
            &Vec3::new(-2.0, 0.0, 0.0),
            &Iso::identity(),
            &*wall,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn scene_cast_picks_nearest_accepted_entry() {
        let make = |i: u32, x: f32| {
            SceneEntry::new(
                ColliderId::new(i, 0),
                None,
                SharedShape::cuboid(0.5, 0.5, 0.5),
                Iso::translation(x, 0.0, 0.0),
                CollisionFilter::default(),
            )
        };
        let mut scene = CollisionScene::build(vec![make(0, 5.0), make(1, 3.0)]);
        let ball = SharedShape::ball(0.25);
        let iso = Iso::identity();
        let disp = Vec3::new(10.0, 0.0, 0.0);

        let hit = cast_against_scene(&mut scene, &iso, &*ball, &disp, |_| true).expect("hit");
        assert_eq!(hit.entry, 1);

        let hit = cast_against_scene(&mut scene, &iso, &*ball, &disp, |e| e.owner.index() != 1)
            .expect("hit");
        assert_eq!(hit.entry, 0);
    }

    #[test]
    fn overlapping_shapes_report_depth() {
        let a = SharedShape::ball(1.0);
        let b = SharedShape::ball(1.0);
        let p = penetration(&Iso::identity(), &*a, &Iso::translation(1.5, 0.0, 0.0), &*b, 0.0)
            .expect("contact");
        assert!((p.depth - 0.5).abs() < 1.0e-4);
        assert!((p.normal - Vec3::new(-1.0, 0.0, 0.0)).norm() < 1.0e-4);
    }
}
