/// Runtime switches for a physics [`World`](crate::world::World).
///
/// Conventions
/// - Time is in seconds.
/// - `max_sub_steps == 0` runs one variable-length dynamics step per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicsConfig {
    /// Allow hinge joints for 3 linear + 2 angular locked constraints.
    pub enable_constraint_hinge: bool,
    /// Allow cone-twist joints.
    pub enable_constraint_cone_twist: bool,
    /// Allow ball-socket joints.
    pub enable_constraint_point2point: bool,
    /// Reserved. Slider detection stays off regardless of this flag.
    pub enable_constraint_slider: bool,
    /// Fixed dynamics sub-step length.
    pub simulation_time_step: f32,
    /// Maximum number of fixed sub-steps per frame. Excess accumulated time is dropped.
    pub max_sub_steps: u32,
    /// Resolve kinematic sweep hits locally instead of calling the listener.
    pub use_fake_dynamics: bool,
    /// Publish debug drawer shapes every step.
    pub debug_enabled: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            enable_constraint_hinge: true,
            enable_constraint_cone_twist: true,
            enable_constraint_point2point: true,
            enable_constraint_slider: false,
            simulation_time_step: 1.0 / 60.0,
            max_sub_steps: 5,
            use_fake_dynamics: false,
            debug_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_behaviour() {
        let c = PhysicsConfig::default();
        assert!(c.enable_constraint_hinge);
        assert!(!c.enable_constraint_slider);
        assert_eq!(c.max_sub_steps, 5);
        assert!((c.simulation_time_step - 1.0 / 60.0).abs() < 1.0e-6);
    }
}
