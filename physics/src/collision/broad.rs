use nalgebra as na;
use rapier3d::parry::{
    bounding_volume::Aabb,
    partitioning::{Bvh, BvhBuildStrategy},
    shape::Shape,
};
use rapier3d::prelude::SharedShape;

use crate::{
    collider::ColliderId,
    collision::filter::CollisionFilter,
    math::{Iso, Vec3},
};

/// One collidable placed in the scene: a simple collider body or one bone of a bone
/// collider, frozen at its current pose.
#[derive(Clone)]
pub struct SceneEntry {
    pub owner: ColliderId,
    pub bone: Option<usize>,
    pub shape: SharedShape,
    pub iso: Iso,
    pub aabb: Aabb,
    pub filter: CollisionFilter,
}

impl SceneEntry {
    pub fn new(
        owner: ColliderId,
        bone: Option<usize>,
        shape: SharedShape,
        iso: Iso,
        filter: CollisionFilter,
    ) -> Self {
        let aabb = shape.compute_aabb(&iso);
        Self {
            owner,
            bone,
            shape,
            iso,
            aabb,
            filter,
        }
    }

    /// Re-place the entry after its owner moved.
    pub fn set_iso(&mut self, iso: Iso) {
        self.iso = iso;
        self.aabb = self.shape.compute_aabb(&iso);
    }
}

/// Broad-phase snapshot over every collidable of a world, used by the kinematic sweep and
/// the unstuck query.
///
/// The BVH is built over entry AABBs and rebuilt lazily: moving an entry marks the scene
/// dirty and the next query rebuilds it.
pub struct CollisionScene {
    entries: Vec<SceneEntry>,
    bvh: Bvh,
    dirty: bool,
}

impl Default for CollisionScene {
    fn default() -> Self {
        Self::build(Vec::new())
    }
}

impl CollisionScene {
    pub fn build(entries: Vec<SceneEntry>) -> Self {
        let bvh = build_bvh(&entries);
        Self {
            entries,
            bvh,
            dirty: false,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn entries(&self) -> &[SceneEntry] {
        &self.entries
    }

    #[inline]
    pub fn entry(&self, index: usize) -> Option<&SceneEntry> {
        self.entries.get(index)
    }

    /// Move every entry of `owner` (and `bone`, if given) by a new pose lookup.
    pub fn update_owner(&mut self, owner: ColliderId, mut pose: impl FnMut(Option<usize>) -> Option<Iso>) {
        for entry in self.entries.iter_mut().filter(|e| e.owner == owner) {
            if let Some(iso) = pose(entry.bone) {
                entry.set_iso(iso);
                self.dirty = true;
            }
        }
    }

    pub fn remove_owner(&mut self, owner: ColliderId) {
        let before = self.entries.len();
        self.entries.retain(|e| e.owner != owner);
        if before != self.entries.len() {
            self.dirty = true;
        }
    }

    pub fn refit(&mut self) {
        if self.dirty {
            self.bvh = build_bvh(&self.entries);
            self.dirty = false;
        }
    }

    /// Indices of entries whose AABB intersects `aabb`.
    pub fn query(&mut self, aabb: &Aabb) -> Vec<usize> {
        self.refit();
        self.bvh
            .intersect_aabb(aabb)
            .map(|leaf| leaf as usize)
            .collect()
    }
}

fn build_bvh(entries: &[SceneEntry]) -> Bvh {
    let aabbs: Vec<Aabb> = entries.iter().map(|e| e.aabb).collect();
    Bvh::from_leaves(BvhBuildStrategy::Binned, &aabbs)
}

/// AABB covering `shape` at `iso` and at `iso` moved by `displacement`, grown by `skin`.
pub fn swept_aabb(shape: &dyn Shape, iso: &Iso, displacement: &Vec3, skin: f32) -> Aabb {
    let start = shape.compute_aabb(iso);
    let mut end_iso = *iso;
    end_iso.translation.vector += displacement;
    let end = shape.compute_aabb(&end_iso);

    aabb_inflate(&aabb_union(&start, &end), skin)
}

pub fn aabb_union(a: &Aabb, b: &Aabb) -> Aabb {
    Aabb {
        mins: na::Point3::new(
            a.mins.x.min(b.mins.x),
            a.mins.y.min(b.mins.y),
            a.mins.z.min(b.mins.z),
        ),
        maxs: na::Point3::new(
            a.maxs.x.max(b.maxs.x),
            a.maxs.y.max(b.maxs.y),
            a.maxs.z.max(b.maxs.z),
        ),
    }
}

pub fn aabb_inflate(a: &Aabb, margin: f32) -> Aabb {
    if margin <= 0.0 {
        return *a;
    }
    let delta = Vec3::repeat(margin);
    Aabb {
        mins: a.mins - delta,
        maxs: a.maxs + delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: u32, x: f32) -> SceneEntry {
        SceneEntry::new(
            ColliderId::new(index, 0),
            None,
            SharedShape::cuboid(0.5, 0.5, 0.5),
            Iso::translation(x, 0.0, 0.0),
            CollisionFilter::default(),
        )
    }

    #[test]
    fn query_returns_only_overlapping_entries() {
        let mut scene = CollisionScene::build(vec![entry(0, 0.0), entry(1, 10.0)]);
        let ball = SharedShape::ball(0.25);
        let aabb = swept_aabb(&*ball, &Iso::translation(-3.0, 0.0, 0.0), &Vec3::new(2.5, 0.0, 0.0), 0.0);

        assert_eq!(scene.query(&aabb), vec![0]);
    }

    #[test]
    fn moved_entry_is_found_after_refit() {
        let mut scene = CollisionScene::build(vec![entry(0, 0.0), entry(1, 10.0)]);
        scene.update_owner(ColliderId::new(1, 0), |_| Some(Iso::translation(0.0, 5.0, 0.0)));

        let query_box = Aabb::new(na::Point3::new(-0.1, 4.9, -0.1), na::Point3::new(0.1, 5.1, 0.1));
        assert_eq!(scene.query(&query_box), vec![1]);
    }

    #[test]
    fn empty_scene_queries_nothing() {
        let mut scene = CollisionScene::default();
        let query_box = Aabb::new(na::Point3::new(-1.0, -1.0, -1.0), na::Point3::new(1.0, 1.0, 1.0));
        assert!(scene.query(&query_box).is_empty());
    }
}
