/*!
Joints between collider bodies.

- dof:                 per-axis limits, springs and friction; the full constraint definition
- detect:              pure classification of a definition into a joint kind
- backend:             rapier joint construction and solver tuning
- collider_constraint: lifecycle of one joint (lazy creation, friction motors, breaking)
*/

pub mod backend;
pub mod collider_constraint;
pub mod detect;
pub mod dof;

pub use backend::SolverParams;
pub use collider_constraint::{BodyRef, ColliderConstraint};
pub use detect::{AxisRemap, ConstraintKind, Detection, detect_constraint_type};
pub use dof::{ConstraintDef, ConstraintDof, DofAxis, DofState};
