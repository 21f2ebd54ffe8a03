/*!
Collision root module.

Geometry queries used by the kinematic sweep and the unstuck resolver, built on the
parry queries re-exported by the rigid-body backend:

- settings:     tolerance constants and caps
- filter:       category/filter layer masks
- volume:       sphere and oriented box volumes for point tests and extents
- broad:        BVH scene of placed collidables, swept AABB helpers
- narrow_phase: thin wrappers over shape casts and contact queries
*/

pub mod broad;
pub mod filter;
pub mod narrow_phase;
pub mod settings;
pub mod volume;

pub use broad::{CollisionScene, SceneEntry, swept_aabb};
pub use filter::CollisionFilter;
pub use narrow_phase::{Penetration, SweepHit, cast_against_scene, cast_shape, penetration};
pub use volume::{CollisionVolume, ExtentBox};
