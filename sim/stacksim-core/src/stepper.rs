//! Frame driver.
//!
//! The [`Stepper`] sequences one frame of the stacking algorithm over a
//! [`System`]: collision resolution against predicted poses, velocity
//! integration, resting-contact passes over a supports-first contact graph,
//! optional shock propagation, and finally position integration.
//!
//! # Example
//!
//! ```
//! use stacksim_core::{Body, Shape, Stepper, System};
//! use stacksim_types::{Material, Pose, SimulationConfig};
//! use nalgebra::{Point3, Vector3};
//!
//! let floor = Body::fixed(
//!     Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
//!     Shape::cuboid_from_size(Vector3::new(20.0, 20.0, 1.0)),
//!     Material::default(),
//! );
//! let cube = Body::dynamic(
//!     Pose::from_position(Point3::new(0.0, 0.0, 2.0)),
//!     Shape::cube(1.0),
//!     1.0,
//!     Material::default(),
//! );
//! let mut system = System::new(vec![floor, cube], SimulationConfig::default()).unwrap();
//!
//! let mut stepper = Stepper::new();
//! let reports = stepper.run(&mut system, 100).unwrap();
//! assert_eq!(reports.len(), 100);
//! assert!(system.bodies()[1].position().z < 2.0);
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use stacksim_types::{BodyId, Result, SimError, SimulationConfig};
use tracing::{debug, trace};

use crate::body::Body;
use crate::integrators::{integrator_for, Integrator};
use crate::system::{StateSnapshot, System};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What happened during one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepReport {
    /// Collision passes that applied impulses and forced a re-prediction.
    pub collision_iterations: usize,
    /// Contact passes that applied impulses.
    pub contact_iterations: usize,
    /// Shock-propagation passes run.
    pub shock_passes: usize,
    /// Whether contact resolution settled within `max_contacts` passes.
    pub contacts_converged: bool,
}

/// Configuration for the stepper.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepperConfig {
    /// Randomly permute the processing order at the start of each frame.
    pub shuffle_order: bool,
    /// Check for non-finite state before and after each frame.
    pub validate_state: bool,
    /// Seed for the shuffle. `None` uses the system's `shuffle_seed`.
    pub seed: Option<u64>,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            shuffle_order: true,
            validate_state: true,
            seed: None,
        }
    }
}

impl StepperConfig {
    /// Keep the processing order between frames (apart from the
    /// supports-first sort).
    #[must_use]
    pub fn without_shuffle() -> Self {
        Self {
            shuffle_order: false,
            ..Default::default()
        }
    }

    /// Seed the shuffle explicitly.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enable or disable state validation.
    #[must_use]
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.validate_state = enable;
        self
    }
}

/// Drives a [`System`] one frame at a time.
///
/// The random generator is seeded on the first frame, from
/// [`StepperConfig::seed`] or else the system's
/// [`shuffle_seed`](SimulationConfig::shuffle_seed). The integrator
/// defaults to the one named by the system's solver configuration.
#[derive(Debug)]
pub struct Stepper {
    config: StepperConfig,
    integrator: Option<Box<dyn Integrator>>,
    rng: Option<StdRng>,
}

impl Default for Stepper {
    fn default() -> Self {
        Self::new()
    }
}

impl Stepper {
    /// Create a new stepper with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StepperConfig::default())
    }

    /// Create a stepper with custom configuration.
    #[must_use]
    pub fn with_config(config: StepperConfig) -> Self {
        Self {
            config,
            integrator: None,
            rng: None,
        }
    }

    /// Use a specific integrator instead of the configured one.
    #[must_use]
    pub fn with_integrator(mut self, integrator: Box<dyn Integrator>) -> Self {
        self.integrator = Some(integrator);
        self
    }

    /// Get the stepper configuration.
    #[must_use]
    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    /// Restart the shuffle sequence from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = Some(StdRng::seed_from_u64(seed));
    }

    /// Execute one frame.
    ///
    /// This performs:
    /// 1. Shuffle the processing order
    /// 2. Snapshot positions and velocities
    /// 3. Predict: gravity, then velocity and position integration
    /// 4. Resolve collisions at the predicted poses, re-predicting after
    ///    each pass that changed a velocity, then restore the snapshot
    /// 5. Re-apply gravity
    /// 6. Build the contact graph with gravity-informed prediction
    /// 7. Integrate velocities, then run contact passes until none applies
    ///    an impulse or `max_contacts` is reached
    /// 8. If contacts did not settle, run shock-propagation passes
    /// 9. Integrate positions and advance time
    ///
    /// # Errors
    ///
    /// Returns an error if the system state is invalid (contains `NaN` or
    /// `Inf` values) before or after the frame. Failing to converge is not
    /// an error; it shows in the returned [`StepReport`].
    pub fn step(&mut self, system: &mut System) -> Result<StepReport> {
        if self.config.validate_state {
            system.validate()?;
        }

        let dt = system.timestep();
        let solver = system.config().solver.clone();
        let seed = self.config.seed.unwrap_or(system.config().shuffle_seed);
        let integrator: &dyn Integrator = &**self
            .integrator
            .get_or_insert_with(|| integrator_for(solver.integration));
        let rng = self.rng.get_or_insert_with(|| StdRng::seed_from_u64(seed));

        // 1. Shuffle
        if self.config.shuffle_order {
            system.shuffle_order(rng);
        }

        // 2. Snapshot
        let mut snapshot = StateSnapshot::capture(system);

        // 3. Predict
        predict(system, integrator, dt);

        // 4. Collisions
        let mut collision_iterations = 0;
        while system.collision_detect(&mut snapshot) && collision_iterations < solver.max_collisions
        {
            snapshot.restore(system)?;
            predict(system, integrator, dt);
            collision_iterations += 1;
            trace!(collision_iterations, "collision pass");
        }
        snapshot.restore(system)?;

        // 5. Forces for the real integration
        system.zero_forces();
        system.add_gravity();

        // 6. Contact graph, gravity-informed
        system.build_contact_graph(integrator, true);

        // 7. Velocities, then resting contacts
        for index in 0..system.num_bodies() {
            integrator.integrate_vel(system, dt, BodyId::new(index));
        }
        let mut contact_iterations = 0;
        while system.contact_detect(contact_iterations, false)
            && contact_iterations < solver.max_contacts
        {
            system.build_contact_graph(integrator, false);
            contact_iterations += 1;
        }
        system.build_contact_graph(integrator, false);
        let contacts_converged = contact_iterations < solver.max_contacts;

        // 8. Shock propagation
        let mut shock_passes = 0;
        if !contacts_converged {
            for pass in 0..solver.max_shock_propagation {
                shock_passes += 1;
                if !system.contact_detect(pass, true) {
                    break;
                }
                system.build_contact_graph(integrator, false);
            }
        }

        // 9. Positions and time
        for index in 0..system.num_bodies() {
            integrator.integrate_pos(system, dt, BodyId::new(index));
        }
        system.advance_time(dt);

        let report = StepReport {
            collision_iterations,
            contact_iterations,
            shock_passes,
            contacts_converged,
        };
        debug!(
            frame = system.frame_count(),
            collision_iterations,
            contact_iterations,
            shock_passes,
            contacts_converged,
            "frame complete"
        );

        if self.config.validate_state {
            system.validate()?;
        }
        Ok(report)
    }

    /// Run a fixed number of frames.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`step`](Self::step).
    pub fn run(&mut self, system: &mut System, frames: u64) -> Result<Vec<StepReport>> {
        let mut reports = Vec::new();
        for _ in 0..frames {
            reports.push(self.step(system)?);
        }
        Ok(reports)
    }

    /// Run for a specific duration of simulated time.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] for a negative or non-finite
    /// duration, otherwise the first error from [`step`](Self::step).
    pub fn run_for(&mut self, system: &mut System, duration: f64) -> Result<Vec<StepReport>> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(SimError::invalid_config(format!(
                "run duration must be finite and non-negative, got {duration}"
            )));
        }
        let target_time = system.time() + duration;
        let dt = system.timestep();
        // Safe cast: duration and dt are positive, result is bounded
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let estimated_steps = (duration / dt).ceil() as usize;
        let mut reports = Vec::with_capacity(estimated_steps);

        for _ in 0..estimated_steps {
            // Half a frame of slack absorbs rounding in the accumulated time
            if system.time() + 0.5 * dt >= target_time {
                break;
            }
            reports.push(self.step(system)?);
        }

        Ok(reports)
    }
}

/// Zero forces, apply gravity and integrate every body over `dt`.
fn predict(system: &mut System, integrator: &dyn Integrator, dt: f64) {
    system.zero_forces();
    system.add_gravity();
    for index in 0..system.num_bodies() {
        let id = BodyId::new(index);
        integrator.integrate_vel(system, dt, id);
        integrator.integrate_pos(system, dt, id);
    }
}

/// Builder for creating simulation scenarios.
#[derive(Debug, Clone, Default)]
pub struct SimulationBuilder {
    bodies: Vec<Body>,
    config: SimulationConfig,
    stepper_config: StepperConfig,
}

impl SimulationBuilder {
    /// Create a new simulation builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body.
    #[must_use]
    pub fn body(mut self, body: Body) -> Self {
        self.bodies.push(body);
        self
    }

    /// Add several bodies.
    #[must_use]
    pub fn bodies(mut self, bodies: impl IntoIterator<Item = Body>) -> Self {
        self.bodies.extend(bodies);
        self
    }

    /// Set the simulation configuration.
    #[must_use]
    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the stepper configuration.
    #[must_use]
    pub fn stepper_config(mut self, config: StepperConfig) -> Self {
        self.stepper_config = config;
        self
    }

    /// Build the simulation, returning (System, Stepper).
    ///
    /// # Errors
    ///
    /// Any error from [`System::new`].
    pub fn build(self) -> Result<(System, Stepper)> {
        let system = System::new(self.bodies, self.config)?;
        Ok((system, Stepper::with_config(self.stepper_config)))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use crate::integrators::SemiImplicitEuler;
    use crate::shape::Shape;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};
    use stacksim_types::{Material, Pose, SolverConfig, Twist};

    fn floor() -> Body {
        Body::fixed(
            Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
            Shape::cuboid_from_size(Vector3::new(20.0, 20.0, 1.0)),
            Material::new(0.3, 0.5),
        )
    }

    fn cube_at(x: f64, z: f64) -> Body {
        Body::dynamic(
            Pose::from_position(Point3::new(x, 0.0, z)),
            Shape::cube(1.0),
            1.0,
            Material::new(0.4, 0.5),
        )
    }

    #[test]
    fn test_single_step() {
        let mut system = System::new(vec![cube_at(0.0, 10.0)], SimulationConfig::default()).unwrap();
        let mut stepper = Stepper::new();

        let report = stepper.step(&mut system).expect("step should succeed");
        assert_eq!(report.collision_iterations, 0);
        assert_eq!(report.contact_iterations, 0);
        assert_eq!(report.shock_passes, 0);
        assert!(report.contacts_converged);
        assert_eq!(system.frame_count(), 1);
        assert_relative_eq!(system.time(), 0.005);
    }

    #[test]
    fn test_zero_gravity_keeps_velocity() {
        let body = cube_at(0.0, 0.0).with_velocity(Twist::linear(Vector3::new(1.0, 0.0, 0.0)));
        let mut system = System::new(vec![body], SimulationConfig::default().zero_gravity()).unwrap();
        let mut stepper = Stepper::new();
        stepper.run(&mut system, 200).unwrap();

        let body = &system.bodies()[0];
        assert_relative_eq!(body.linear_velocity().x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(body.position().x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(body.position().z, 0.0);
    }

    #[test]
    fn test_run_for_duration() {
        let mut system = System::new(vec![cube_at(0.0, 10.0)], SimulationConfig::default()).unwrap();
        let mut stepper = Stepper::new();
        let reports = stepper.run_for(&mut system, 0.1).unwrap();

        assert_eq!(reports.len(), 20);
        assert_relative_eq!(system.time(), 0.1, epsilon = 1e-12);
        assert!(stepper.run_for(&mut system, -1.0).unwrap_err().is_config_error());
    }

    #[test]
    fn test_resting_box_stays_put() {
        let mut system =
            System::new(vec![floor(), cube_at(0.0, 0.5 + 1e-5)], SimulationConfig::default())
                .unwrap();
        let mut stepper = Stepper::new();

        let report = stepper.step(&mut system).unwrap();
        assert_eq!(report.collision_iterations, 0);
        assert!(report.contact_iterations >= 1);
        assert!(report.contacts_converged);
        assert!(system.bodies()[1].linear_velocity().z.abs() < 1e-9);
        assert_relative_eq!(system.bodies()[1].position().z, 0.5 + 1e-5, epsilon = 1e-9);
    }

    #[test]
    fn test_drop_triggers_collision() {
        // Fast enough to cross the gap within one frame
        let cube = cube_at(0.0, 0.51).with_velocity(Twist::linear(Vector3::new(0.0, 0.0, -3.0)));
        let mut system = System::new(vec![floor(), cube], SimulationConfig::default()).unwrap();
        let mut stepper = Stepper::new();

        let report = stepper.step(&mut system).unwrap();
        assert!(report.collision_iterations >= 1);
        // Bounced with the floor's restitution
        assert!(system.bodies()[1].linear_velocity().z > 0.0);
    }

    #[test]
    fn test_shock_propagation_runs_when_contacts_do_not_settle() {
        let bodies = vec![floor(), cube_at(0.0, 0.50001), cube_at(0.0, 1.50002), cube_at(0.0, 2.50003)];
        let config = SimulationConfig::default().solver(SolverConfig::default().iterations(5, 1, 1));
        let mut system = System::new(bodies, config).unwrap();
        let mut stepper = Stepper::new();

        let report = stepper.step(&mut system).unwrap();
        assert!(!report.contacts_converged);
        assert_eq!(report.contact_iterations, 1);
        assert_eq!(report.shock_passes, 1);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let make = || {
            let bodies = vec![floor(), cube_at(0.0, 0.6), cube_at(0.2, 1.7), cube_at(-0.1, 2.9)];
            System::new(bodies, SimulationConfig::default().seed(42)).unwrap()
        };
        let (mut a, mut b) = (make(), make());
        Stepper::new().run(&mut a, 100).unwrap();
        Stepper::new().run(&mut b, 100).unwrap();

        assert_eq!(StateSnapshot::capture(&a), StateSnapshot::capture(&b));
        assert_eq!(a.processing_order(), b.processing_order());
    }

    #[test]
    fn test_reseed_restarts_shuffle() {
        let bodies: Vec<Body> = (0..6).map(|i| cube_at(3.0 * i as f64, 10.0)).collect();
        let mut system = System::new(bodies, SimulationConfig::default()).unwrap();
        let mut stepper = Stepper::with_config(StepperConfig::default().with_seed(9));

        stepper.step(&mut system).unwrap();
        let first = system.processing_order().to_vec();
        system.reset();
        stepper.reseed(9);
        stepper.step(&mut system).unwrap();
        assert_eq!(system.processing_order(), &first[..]);
    }

    #[test]
    fn test_without_shuffle_keeps_order() {
        let bodies: Vec<Body> = (0..4).map(|i| cube_at(3.0 * i as f64, 10.0)).collect();
        let mut system = System::new(bodies, SimulationConfig::default()).unwrap();
        let mut stepper = Stepper::with_config(StepperConfig::without_shuffle());
        stepper.run(&mut system, 5).unwrap();
        let identity: Vec<BodyId> = (0..4).map(BodyId::new).collect();
        assert_eq!(system.processing_order(), &identity[..]);
    }

    #[test]
    fn test_detect_divergence() {
        let body = cube_at(0.0, 10.0).with_velocity(Twist::linear(Vector3::new(f64::NAN, 0.0, 0.0)));
        let mut system = System::new(vec![body], SimulationConfig::default()).unwrap();
        let mut stepper = Stepper::new();

        let err = stepper.step(&mut system).unwrap_err();
        assert!(err.is_diverged());
        assert_eq!(system.frame_count(), 0);
    }

    #[test]
    fn test_custom_integrator() {
        let mut system = System::new(vec![cube_at(0.0, 10.0)], SimulationConfig::default()).unwrap();
        let mut stepper = Stepper::new().with_integrator(Box::new(SemiImplicitEuler));
        stepper.step(&mut system).unwrap();
        assert_relative_eq!(system.bodies()[0].linear_velocity().z, -9.81 * 0.005, epsilon = 1e-12);
    }

    #[test]
    fn test_simulation_builder() {
        let (system, stepper) = SimulationBuilder::new()
            .body(floor())
            .bodies([cube_at(0.0, 1.0), cube_at(0.0, 3.0)])
            .config(SimulationConfig::default().seed(1))
            .stepper_config(StepperConfig::without_shuffle())
            .build()
            .unwrap();
        assert_eq!(system.num_bodies(), 3);
        assert!(!stepper.config().shuffle_order);

        assert!(matches!(
            SimulationBuilder::new().build(),
            Err(SimError::EmptySystem)
        ));
    }
}
