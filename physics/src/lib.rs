pub mod bitmask_flags;
pub mod body;
pub mod collider;
pub mod collision;
pub mod config;
pub mod constraint;
pub mod debug_drawer;
pub mod dynamics;
pub mod error;
pub mod force_field;
pub mod listener;
pub mod math;
pub mod owner;
pub mod rig;
pub mod shape;
pub mod world;

pub use bitmask_flags::LayerMask;
pub use body::{PhysicsBody, ResponseType};
pub use collider::{
    Attachment, AttachmentKind, Collider, ColliderBones, ColliderId, ColliderKind, ColliderState, JointTarget,
};
pub use collision::filter::CollisionFilter;
pub use config::PhysicsConfig;
pub use constraint::{ColliderConstraint, ConstraintDef, ConstraintDof, ConstraintKind, DofAxis};
pub use debug_drawer::{DebugDrawer, DebugShape, Highlight};
pub use error::{PhysicsError, Result};
pub use force_field::{ApplicationType, FieldType, ForceField};
pub use listener::{ColliderListener, CollisionInfo, NoListener};
pub use math::{DVec3, Quat, Transform, Vec3};
pub use rig::{BonePose, Component, Rig, RigBone, RigConstraint};
pub use shape::{Shape, ShapeFactory, ShapeList};
pub use world::{ColliderMut, ForceFieldId, StepReport, World};
