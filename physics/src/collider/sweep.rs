/*!
Kinematic sweep and slide.

Colliders simulated kinematically move by sweeping their shape through a
[`CollisionScene`] instead of through the dynamics world. The world drives the loop:

1) [`KinematicSweep::begin`] applies gravity and the frame rotation,
2) [`KinematicSweep::advance`] sweeps the rest of the frame and stops at the first hit,
3) the caller runs a response (script callback or [`KinematicSweep::fake_response`]),
4) [`KinematicSweep::resume`] consumes the hit and tells whether to advance again.

Behavior
- Responses that leave the velocity pointing into the surface get a small outward
  velocity, so an unchanged velocity slides along the surface.
- A collider starting inside other shapes is pushed out first, see [`super::unstuck`].
- Three touching hits in a row stop the sweep for this frame.
- Hitting [`SWEEP_MAX_ITERATIONS`] logs the sweep history and zeroes the velocities.

Rotation is applied up front and never swept.
*/

use rapier3d::parry::shape::Shape;

use super::{Collider, ColliderId, unstuck};
use crate::{
    body::ResponseType,
    collision::{
        broad::{CollisionScene, SceneEntry},
        narrow_phase::cast_against_scene,
        settings::{
            FAKE_DYNAMICS_DAMPING, FAKE_DYNAMICS_MIN_FRACTION, MIN_RESPONSE_VELOCITY, OSCILLATION_DISTANCE,
            OSCILLATION_LIMIT, RESPONSE_SHIFT, SWEEP_MAX_ITERATIONS, SWEEP_TIME_EPS, UNSTUCK_TARGET,
            UNSTUCK_THRESHOLD,
        },
    },
    listener::CollisionInfo,
    math::{DVec3, Quat, Vec3, dvec_approx_eq, to_f64, vec_is_zero},
};

/// Outcome of one [`KinematicSweep::advance`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SweepStep {
    /// The frame is used up.
    Done,
    /// The collider stopped at a hit; respond, then [`KinematicSweep::resume`].
    Hit(CollisionInfo),
    /// Gave up on this frame.
    Stopped,
}

#[derive(Clone, Copy, Debug)]
struct SweepRecord {
    position: DVec3,
    velocity: Vec3,
    normal: Vec3,
    fraction: f32,
    remaining: f32,
}

#[derive(Clone, Copy, Debug)]
struct PendingHit {
    normal: Vec3,
    fraction: f32,
    position: DVec3,
}

/// Sweep state of one collider over one frame.
#[derive(Debug)]
pub struct KinematicSweep {
    id: ColliderId,
    remaining: f32,
    iterations: u32,
    touching: u32,
    unstuck_done: bool,
    pending: Option<PendingHit>,
    history: Vec<SweepRecord>,
}

fn place(collider: &mut Collider, position: DVec3, orientation: Quat) {
    let (state, notify) = collider.split();
    state.set_position(position);
    state.set_orientation(orientation);
    let (body, component) = notify.parts();
    body.pose_changed(state, component.as_deref());
}

fn set_velocities(collider: &mut Collider, linear: Vec3, angular: Vec3) {
    let (state, notify) = collider.split();
    state.set_linear_velocity(linear);
    state.set_angular_velocity(angular);
    notify.parts().0.velocity_changed(state);
}

fn set_linear_velocity(collider: &mut Collider, linear: Vec3) {
    let angular = collider.state().angular_velocity();
    set_velocities(collider, linear, angular);
}

impl KinematicSweep {
    /// Start a frame of `elapsed` seconds.
    ///
    /// Returns `None` when the collider needs no sweep: static colliders stay, colliders
    /// without a simple body or not colliding with anything move freely.
    pub fn begin(collider: &mut Collider, elapsed: f32) -> Option<Self> {
        let state = collider.state();
        if state.response_type() == ResponseType::Static || elapsed <= 0.0 {
            return None;
        }

        let velocity = state.linear_velocity() + state.gravity() * elapsed;
        let angular = state.angular_velocity();
        let mut orientation = state.orientation();
        if !vec_is_zero(&angular, 0.0) {
            orientation = Quat::from_scaled_axis(angular * elapsed) * orientation;
        }
        let position = state.position();
        let sweeps = state.enabled()
            && !state.collision_filter().collides_not()
            && collider.body().simple().is_some_and(|s| s.body().shape().is_some());

        set_velocities(collider, velocity, angular);
        if !sweeps {
            place(collider, position + to_f64(&(velocity * elapsed)), orientation);
            return None;
        }
        place(collider, position, orientation);

        Some(Self {
            id: collider.id(),
            remaining: elapsed,
            iterations: 0,
            touching: 0,
            unstuck_done: false,
            pending: None,
            history: Vec::new(),
        })
    }

    #[inline]
    pub fn id(&self) -> ColliderId {
        self.id
    }
    #[inline]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
    /// Frame time not swept yet.
    #[inline]
    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    /// Sweep until the frame is used up or something is hit.
    ///
    /// `accept` filters scene entries; the collider's own entries are always skipped.
    pub fn advance(
        &mut self,
        collider: &mut Collider,
        scene: &mut CollisionScene,
        mut accept: impl FnMut(&SceneEntry) -> bool,
    ) -> SweepStep {
        let id = self.id;
        let mut accept = move |entry: &SceneEntry| entry.owner != id && accept(entry);
        let Some(shape) = collider
            .body()
            .simple()
            .and_then(|s| s.body().shape())
            .map(|built| built.shape.clone())
        else {
            return SweepStep::Done;
        };

        if !self.unstuck_done {
            self.unstuck_done = true;
            self.unstuck(collider, scene, &*shape, &mut accept);
        }

        while self.remaining > SWEEP_TIME_EPS {
            if self.iterations >= SWEEP_MAX_ITERATIONS {
                self.give_up(collider);
                return SweepStep::Stopped;
            }
            self.iterations += 1;

            let state = collider.state();
            let position = state.position();
            let orientation = state.orientation();
            let velocity = state.linear_velocity();
            let displacement = velocity * self.remaining;
            if vec_is_zero(&displacement, f32::EPSILON) {
                self.remaining = 0.0;
                return SweepStep::Done;
            }
            let Some(iso) = collider.body().simple().map(|s| s.body_iso(&position, &orientation)) else {
                return SweepStep::Done;
            };

            let Some(hit) = cast_against_scene(scene, &iso, &*shape, &displacement, &mut accept) else {
                place(collider, position + to_f64(&displacement), orientation);
                self.remaining = 0.0;
                return SweepStep::Done;
            };
            let Some(entry) = scene.entry(hit.entry) else {
                return SweepStep::Done;
            };
            let (other, other_bone) = (entry.owner, entry.bone);

            let at = position + to_f64(&(displacement * hit.fraction));
            place(collider, at, orientation);
            self.history.push(SweepRecord {
                position: at,
                velocity,
                normal: hit.normal,
                fraction: hit.fraction,
                remaining: self.remaining,
            });

            if hit.normal.dot(&displacement) * hit.fraction > OSCILLATION_DISTANCE {
                self.touching += 1;
            } else {
                self.touching = 0;
            }
            if self.touching >= OSCILLATION_LIMIT {
                log::debug!("collider {:?} keeps touching {:?}; sweep stopped", self.id, other);
                self.remaining = 0.0;
                return SweepStep::Stopped;
            }

            self.pending = Some(PendingHit {
                normal: hit.normal,
                fraction: hit.fraction,
                position: at,
            });
            return SweepStep::Hit(CollisionInfo {
                collider: self.id,
                other,
                other_bone,
                normal: hit.normal,
                position: at,
                distance: displacement.norm() * (1.0 - hit.fraction),
                remaining_time: self.remaining * (1.0 - hit.fraction),
            });
        }
        SweepStep::Done
    }

    /// Response used with fake dynamics instead of a script callback.
    ///
    /// Near hits stop the collider, others keep the tangential velocity, damped.
    pub fn fake_response(&self, collider: &mut Collider) {
        let Some(hit) = self.pending else {
            return;
        };
        let velocity = if hit.fraction < FAKE_DYNAMICS_MIN_FRACTION {
            Vec3::zeros()
        } else {
            let v = collider.state().linear_velocity();
            (v - hit.normal * v.dot(&hit.normal)) * FAKE_DYNAMICS_DAMPING
        };
        set_linear_velocity(collider, velocity);
    }

    /// Consume the pending hit after the response ran. Returns whether to advance again.
    pub fn resume(&mut self, collider: &mut Collider) -> bool {
        let Some(hit) = self.pending.take() else {
            return self.remaining > SWEEP_TIME_EPS;
        };
        self.remaining -= self.remaining * hit.fraction;

        let state = collider.state();
        let position = state.position();
        if dvec_approx_eq(&position, &hit.position, RESPONSE_SHIFT) {
            let orientation = state.orientation();
            place(collider, position + to_f64(&hit.normal) * RESPONSE_SHIFT, orientation);
        }

        let mut velocity = collider.state().linear_velocity();
        if velocity.norm() < MIN_RESPONSE_VELOCITY {
            self.remaining = 0.0;
            return false;
        }
        let outward = velocity.dot(&hit.normal);
        if outward < UNSTUCK_THRESHOLD {
            velocity += hit.normal * (UNSTUCK_TARGET - outward);
            set_linear_velocity(collider, velocity);
        }
        self.remaining > SWEEP_TIME_EPS
    }

    fn unstuck(
        &self,
        collider: &mut Collider,
        scene: &mut CollisionScene,
        shape: &dyn Shape,
        accept: &mut impl FnMut(&SceneEntry) -> bool,
    ) {
        let state = collider.state();
        let position = state.position();
        let orientation = state.orientation();
        let displacement = state.linear_velocity() * self.remaining;
        let Some(iso) = collider.body().simple().map(|s| s.body_iso(&position, &orientation)) else {
            return;
        };

        let nearby = unstuck::find_nearby_colliders(scene, shape, &iso, &mut *accept);
        let blockers = unstuck::find_blocker_normals(scene, &nearby, shape, &iso);
        if let Some(correction) = unstuck::unstuck(&blockers, &displacement) {
            log::debug!(
                "collider {:?} stuck in {} shapes; moved by {correction:?}",
                self.id,
                blockers.len()
            );
            place(collider, position + to_f64(&correction), orientation);
        }
    }

    fn give_up(&mut self, collider: &mut Collider) {
        log::warn!(
            "collider {:?} hit the sweep iteration cap ({SWEEP_MAX_ITERATIONS}); velocities zeroed",
            self.id
        );
        for (i, r) in self.history.iter().enumerate() {
            log::warn!(
                "  #{i}: at {:?} v {:?} n {:?} fraction {} remaining {}",
                r.position,
                r.velocity,
                r.normal,
                r.fraction,
                r.remaining
            );
        }
        set_velocities(collider, Vec3::zeros(), Vec3::zeros());
        self.remaining = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use rapier3d::prelude::SharedShape;

    use super::*;
    use crate::{
        collision::filter::CollisionFilter, config::PhysicsConfig, dynamics::DynamicsWorld, math::Iso,
        shape::Shape as ColliderShape,
    };

    fn ball(position: DVec3, velocity: Vec3) -> Collider {
        let mut collider = Collider::volume(vec![ColliderShape::sphere(Vec3::zeros(), 0.5)])
            .with_response_type(ResponseType::Kinematic)
            .with_position(position)
            .with_linear_velocity(velocity)
            .with_gravity(Some(Vec3::zeros()));
        let mut dynamics = DynamicsWorld::new();
        collider
            .attach(ColliderId::new(0, 0), &mut dynamics, &PhysicsConfig::default(), Vec3::zeros())
            .expect("attach");
        collider
    }

    fn floor() -> CollisionScene {
        CollisionScene::build(vec![SceneEntry::new(
            ColliderId::new(1, 0),
            None,
            SharedShape::cuboid(10.0, 0.5, 10.0),
            Iso::identity(),
            CollisionFilter::default(),
        )])
    }

    fn wall(owner: u32, x: f32) -> SceneEntry {
        SceneEntry::new(
            ColliderId::new(owner, 0),
            None,
            SharedShape::cuboid(0.5, 10.0, 10.0),
            Iso::translation(x, 0.0, 0.0),
            CollisionFilter::default(),
        )
    }

    struct Run {
        iterations: u32,
        hits: Vec<CollisionInfo>,
        last: SweepStep,
    }

    /// Drive a sweep. `respond` runs before [`KinematicSweep::resume`], `after` once it
    /// asked for another advance.
    fn run_with(
        collider: &mut Collider,
        scene: &mut CollisionScene,
        elapsed: f32,
        mut respond: impl FnMut(&mut Collider, &CollisionInfo),
        mut after: impl FnMut(&mut Collider),
    ) -> Run {
        let mut hits = Vec::new();
        let Some(mut sweep) = KinematicSweep::begin(collider, elapsed) else {
            return Run {
                iterations: 0,
                hits,
                last: SweepStep::Done,
            };
        };
        let last = loop {
            match sweep.advance(collider, scene, |_| true) {
                SweepStep::Hit(info) => {
                    respond(collider, &info);
                    hits.push(info);
                    if !sweep.resume(collider) {
                        break SweepStep::Hit(info);
                    }
                    after(collider);
                }
                step => break step,
            }
        };
        Run {
            iterations: sweep.iterations(),
            hits,
            last,
        }
    }

    /// Drive a sweep with a response that leaves velocities alone.
    fn run(collider: &mut Collider, scene: &mut CollisionScene, elapsed: f32) -> (u32, Vec<CollisionInfo>) {
        let r = run_with(collider, scene, elapsed, |_, _| {}, |_| {});
        (r.iterations, r.hits)
    }

    #[test]
    fn free_flight_moves_by_velocity() {
        let mut collider = ball(DVec3::new(0.0, 5.0, 0.0), Vec3::new(2.0, 0.0, 0.0));
        let mut scene = floor();
        let (_, hits) = run(&mut collider, &mut scene, 0.5);
        assert!(hits.is_empty());
        assert!((collider.state().position() - DVec3::new(1.0, 5.0, 0.0)).norm() < 1.0e-5);
    }

    #[test]
    fn head_on_hit_stops_at_the_surface_in_two_iterations() {
        let mut collider = ball(DVec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -4.0, 0.0));
        let mut scene = floor();
        let (iterations, hits) = run(&mut collider, &mut scene, 1.0);

        assert_eq!(iterations, 2);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].other, ColliderId::new(1, 0));
        assert!((hits[0].normal - Vec3::y()).norm() < 1.0e-3);
        // Floor top at 0.5, ball radius 0.5; the unstuck velocity lifts it slightly.
        let y = collider.state().position().y;
        assert!((1.0..1.01).contains(&y), "y = {y}");
        let v = collider.state().linear_velocity();
        assert!(v.y > 0.0 && v.y <= UNSTUCK_TARGET + 1.0e-6);
    }

    #[test]
    fn slanted_hit_slides_along_the_surface() {
        let mut collider = ball(DVec3::new(0.0, 2.0, 0.0), Vec3::new(3.0, -3.0, 0.0));
        let mut scene = floor();
        let (_, hits) = run(&mut collider, &mut scene, 1.0);

        assert_eq!(hits.len(), 1);
        let p = collider.state().position();
        assert!(p.x > 2.9, "x = {}", p.x);
        assert!((p.y - 1.0).abs() < 0.01);
    }

    #[test]
    fn stopping_response_ends_the_sweep() {
        let mut collider = ball(DVec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -4.0, 0.0));
        let mut scene = floor();
        let mut sweep = KinematicSweep::begin(&mut collider, 1.0).expect("sweep");
        let SweepStep::Hit(info) = sweep.advance(&mut collider, &mut scene, |_| true) else {
            panic!("expected a hit");
        };
        assert!((info.remaining_time - 0.75).abs() < 1.0e-3);

        set_linear_velocity(&mut collider, Vec3::zeros());
        assert!(!sweep.resume(&mut collider));
        assert!((collider.state().position().y - 1.0).abs() < 1.0e-3);
    }

    #[test]
    fn rejected_entries_are_passed_through() {
        let mut collider = ball(DVec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -4.0, 0.0));
        let mut scene = floor();
        let mut sweep = KinematicSweep::begin(&mut collider, 1.0).expect("sweep");
        assert_eq!(sweep.advance(&mut collider, &mut scene, |_| false), SweepStep::Done);
        assert!((collider.state().position().y + 2.0).abs() < 1.0e-5);
    }

    #[test]
    fn fake_response_keeps_damped_tangential_velocity() {
        let mut collider = ball(DVec3::new(0.0, 2.0, 0.0), Vec3::new(2.0, -4.0, 0.0));
        let mut scene = floor();
        let mut sweep = KinematicSweep::begin(&mut collider, 1.0).expect("sweep");
        assert!(matches!(sweep.advance(&mut collider, &mut scene, |_| true), SweepStep::Hit(_)));

        sweep.fake_response(&mut collider);
        let v = collider.state().linear_velocity();
        assert!((v.x - 2.0 * FAKE_DYNAMICS_DAMPING).abs() < 1.0e-3);
        assert!(v.y.abs() < 1.0e-3);
        assert!(sweep.resume(&mut collider));
    }

    #[test]
    fn stuck_collider_is_pushed_out_first() {
        let mut collider = ball(DVec3::new(0.0, 0.8, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let mut scene = floor();
        run(&mut collider, &mut scene, 0.1);
        let p = collider.state().position();
        assert!(p.y >= 1.0, "y = {}", p.y);
        assert!((p.x - 0.1).abs() < 1.0e-3);
    }

    #[test]
    fn static_colliders_do_not_sweep() {
        let mut collider = ball(DVec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, -4.0, 0.0));
        collider.state_mut().set_response_type(ResponseType::Static);
        assert!(KinematicSweep::begin(&mut collider, 1.0).is_none());
        assert!((collider.state().position().y - 2.0).abs() < 1.0e-9);
    }

    #[test]
    fn repeated_touching_hits_stop_the_sweep() {
        // Resting just above the floor and pushed back into it after every hit.
        let down = Vec3::new(0.0, -1.0, 0.0);
        let mut collider = ball(DVec3::new(0.0, 1.0 + 5.0e-5, 0.0), down);
        let mut scene = floor();
        let r = run_with(&mut collider, &mut scene, 1.0, |_, _| {}, |c| set_linear_velocity(c, down));

        assert_eq!(r.last, SweepStep::Stopped);
        assert_eq!(r.iterations, OSCILLATION_LIMIT);
        assert_eq!(r.hits.len() as u32, OSCILLATION_LIMIT - 1);
        // Stopped by the touching guard, not the iteration cap: velocity untouched.
        assert!((collider.state().linear_velocity() - down).norm() < 1.0e-6);
        assert!(collider.state().position().y >= 1.0);
    }

    #[test]
    fn iteration_cap_zeroes_velocities() {
        // Bouncing between two walls one unit apart never uses up the frame.
        let mut collider = ball(DVec3::zeros(), Vec3::new(100.0, 0.0, 0.0));
        let mut scene = CollisionScene::build(vec![wall(1, 1.5), wall(2, -1.5)]);
        let reflect = |c: &mut Collider, info: &CollisionInfo| {
            let v = c.state().linear_velocity();
            set_linear_velocity(c, v - info.normal * (2.0 * v.dot(&info.normal)));
        };
        let r = run_with(&mut collider, &mut scene, 1.0, reflect, |_| {});

        assert_eq!(r.last, SweepStep::Stopped);
        assert_eq!(r.iterations, SWEEP_MAX_ITERATIONS);
        assert_eq!(r.hits.len() as u32, SWEEP_MAX_ITERATIONS);
        assert!(r.hits.iter().all(|h| h.normal.x.abs() > 0.99));
        assert!(vec_is_zero(&collider.state().linear_velocity(), 0.0));
        assert!(vec_is_zero(&collider.state().angular_velocity(), 0.0));
        assert!(collider.state().position().x.abs() <= 0.5 + 1.0e-3);
    }

    #[test]
    fn collider_stuck_in_a_corner_is_pushed_out_of_both_planes() {
        let mut entries = floor().entries().to_vec();
        entries.push(wall(2, 1.5));
        let mut scene = CollisionScene::build(entries);

        // 0.1 into the floor and 0.1 into the wall, moving along the corner.
        let mut collider = ball(DVec3::new(0.6, 0.9, 0.0), Vec3::new(0.0, 0.0, 1.0));
        let (_, hits) = run(&mut collider, &mut scene, 0.1);

        assert!(hits.is_empty());
        let p = collider.state().position();
        assert!(p.y >= 1.0, "y = {}", p.y);
        assert!(p.x <= 0.5, "x = {}", p.x);
        assert!((p.z - 0.1).abs() < 1.0e-3, "z = {}", p.z);
    }
}
