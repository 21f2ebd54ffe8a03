/*!
Tolerances and tuning constants for kinematic sweeps, constraints and shape building.

Notes
- Distances are in meters, time in seconds.
- The sweep constants are tuned together. Changing one usually means re-checking the
  oscillation guard and the unstuck bias.
*/

/// Remaining frame time below which the sweep loop stops (seconds).
pub const SWEEP_TIME_EPS: f32 = 1.0e-6;

/// Hard cap on sweep iterations per collider and step.
/// Reaching it zeroes the collider velocities and logs the full sweep history.
pub const SWEEP_MAX_ITERATIONS: u32 = 20;

/// Hit-plane travel (`(n · displacement) * fraction`) above which a hit counts as
/// "touching without progress" for the oscillation guard.
pub const OSCILLATION_DISTANCE: f32 = -1.5e-4;

/// Consecutive touching hits after which the sweep loop gives up.
pub const OSCILLATION_LIMIT: u32 = 3;

/// Push along the hit normal applied when a response left the collider at the hit.
pub const RESPONSE_SHIFT: f64 = 1.0e-5;

/// Linear speed below which a collider is considered at rest after a response.
pub const MIN_RESPONSE_VELOCITY: f32 = 1.0e-3;

/// Outward normal speed a response must leave behind; less triggers unstuck velocity.
pub const UNSTUCK_THRESHOLD: f32 = 1.0e-4;

/// Target outward speed the unstuck velocity nudges towards.
pub const UNSTUCK_TARGET: f32 = 1.0e-3;

/// Fake dynamics: hits closer than this fraction stop the collider.
pub const FAKE_DYNAMICS_MIN_FRACTION: f32 = 1.0e-3;

/// Fake dynamics: velocity damping applied after removing the normal component.
pub const FAKE_DYNAMICS_DAMPING: f32 = 0.95;

/// Initial CCD threshold and radius before any shape contributes.
pub const CCD_DEFAULT: f32 = 1.0e-3;

/// Axis classification tolerance for constraint limits.
pub const AXIS_EPS: f32 = 1.0e-6;

/// Joint damping ratio. Large enough that joints carry no constraint force mixing.
pub const JOINT_DAMPING_RATIO: f32 = 1.0e3;

/// Spring stiffness above which a constraint axis counts as sprung.
pub const SPRING_EPS: f32 = 1.0e-5;

/// Breaking thresholds above this are handed to the backend.
pub const BREAKING_APPLY_EPS: f32 = 1.0e-3;

/// Breaking thresholds above this make a constraint breakable.
pub const BREAKABLE_EPS: f32 = 1.0e-2;

/// Elapsed time below which kinematic bone velocities are not estimated.
pub const ELAPSED_EPS: f32 = 1.0e-6;

/// Smallest mass handed to the backend for dynamic bodies (kilograms).
pub const MIN_DYNAMIC_MASS: f32 = 1.0e-3;

/// Positional change below which a backend pull counts as "unchanged".
pub const PULL_EPS: f64 = 1.0e-9;

/// Unstuck resolution: iterations of projection over blocker normals.
pub const UNSTUCK_ITERATIONS: u32 = 8;

/// Unstuck resolution: penetration depth treated as resolved (meters).
pub const UNSTUCK_DEPTH_EPS: f32 = 1.0e-4;

/// Unstuck resolution: extra clearance added on top of the penetration depth (meters).
pub const UNSTUCK_CLEARANCE: f32 = 1.0e-3;

/// Broad-phase margin used when gathering colliders near a stuck one (meters).
pub const NEARBY_MARGIN: f32 = 0.05;
