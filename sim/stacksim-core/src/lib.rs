//! Rigid-body stacking engine.
//!
//! This crate simulates rigid boxes and spheres that collide, come to rest
//! and pile up into stable stacks. Collisions are resolved with impulses
//! against predicted poses; resting contacts are resolved bottom-up over a
//! contact graph ordered with Tarjan's strongly-connected-components
//! algorithm, and tall stacks settle through shock propagation. It builds
//! on [`stacksim_types`] for the data structures.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Stepper                               │
//! │  shuffle → collisions → contact graph → contacts → shock    │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         System                               │
//! │  Contains: bodies, processing order, configuration, time    │
//! │  Provides: state buffers, passes, Tarjan ordering           │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!              ┌────────────┴─────────────┐
//!              ▼                          ▼
//! ┌──────────────────────────┐ ┌────────────────────────────────┐
//! │      Body / Shape        │ │   Integrator / impulse         │
//! │  pose, momentum, SAT     │ │   semi-implicit Euler, Coulomb │
//! └──────────────────────────┘ └────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use stacksim_core::{Body, Shape, Stepper, System};
//! use stacksim_types::{Material, Pose, SimulationConfig};
//! use nalgebra::{Point3, Vector3};
//!
//! // A static floor and two boxes, one above the other
//! let floor = Body::fixed(
//!     Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
//!     Shape::cuboid_from_size(Vector3::new(200.0, 200.0, 1.0)),
//!     Material::new(0.3, 0.5),
//! );
//! let lower = Body::dynamic(
//!     Pose::from_position(Point3::new(0.0, 0.0, 0.6)),
//!     Shape::cube(1.0),
//!     1.0,
//!     Material::new(0.4, 0.5),
//! );
//! let upper = Body::dynamic(
//!     Pose::from_position(Point3::new(0.0, 0.0, 1.8)),
//!     Shape::cube(1.0),
//!     1.0,
//!     Material::new(0.4, 0.5),
//! );
//!
//! let mut system = System::new(vec![floor, lower, upper], SimulationConfig::default()).unwrap();
//! let mut stepper = Stepper::new();
//! stepper.run_for(&mut system, 2.0).unwrap();
//!
//! let gap = system.bodies()[2].position().z - system.bodies()[1].position().z;
//! assert!((gap - 1.0).abs() < 0.05);
//! ```
//!
//! # Diagnostics
//!
//! ```
//! use stacksim_core::{Body, Shape, System};
//! use stacksim_types::{Material, Pose, SimulationConfig, Twist};
//! use nalgebra::Vector3;
//!
//! let body = Body::dynamic(Pose::identity(), Shape::sphere(0.5), 2.0, Material::default())
//!     .with_velocity(Twist::linear(Vector3::new(1.0, 0.0, 0.0)));
//! let system = System::new(vec![body], SimulationConfig::default()).unwrap();
//!
//! println!("Total kinetic energy: {} J", system.total_kinetic_energy());
//! println!("Total momentum: {:?}", system.total_linear_momentum());
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

mod body;
pub mod contact_graph;
pub mod impulse;
pub mod integrators;
pub mod narrow_phase;
mod shape;
mod stepper;
mod system;

pub use body::Body;
pub use contact_graph::{topological_order, ContactOrdering};
pub use impulse::ContactSide;
pub use integrators::{integrator_for, Integrator, SemiImplicitEuler};
pub use shape::Shape;
pub use stepper::{SimulationBuilder, StepReport, Stepper, StepperConfig};
pub use system::{StateSnapshot, System, POS_STATE_SIZE, VEL_STATE_SIZE};

// Re-export key types from stacksim-types for convenience
pub use stacksim_types::{
    BodyId, Contact, ContactManifold, Gravity, IntegrationMethod, MassProperties, Material, Pose,
    SimError, SimulationConfig, SolverConfig, Twist,
};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_free_fall_energy_conservation() {
        let initial_height = 100.0;
        let mass = 2.0;
        let body = Body::dynamic(
            Pose::from_position(Point3::new(0.0, 0.0, initial_height)),
            Shape::sphere(0.5),
            mass,
            Material::default(),
        );
        let mut system = System::new(vec![body], SimulationConfig::default()).unwrap();

        let g = 9.81;
        let initial_total = mass * g * initial_height + system.total_kinetic_energy();

        let mut stepper = Stepper::new();
        stepper
            .run_for(&mut system, 0.5)
            .expect("simulation should succeed");

        let final_height = system.bodies()[0].position().z;
        let final_total = mass * g * final_height + system.total_kinetic_energy();

        // Semi-implicit Euler drifts by O(dt)
        let energy_drift = (final_total - initial_total).abs() / initial_total;
        assert!(
            energy_drift < 0.01,
            "Energy drift too large: {}%",
            energy_drift * 100.0
        );
    }

    #[test]
    fn test_static_ground_holds_body() {
        let ground = Body::fixed(Pose::identity(), Shape::ground_plane(), Material::default());
        let ball = Body::dynamic(
            Pose::from_position(Point3::new(0.0, 0.0, 1.0)),
            Shape::sphere(0.5),
            1.0,
            Material::new(0.0, 0.5),
        );
        let mut system = System::new(vec![ground, ball], SimulationConfig::default()).unwrap();

        let mut stepper = Stepper::new();
        stepper
            .run_for(&mut system, 1.0)
            .expect("simulation should succeed");

        assert_eq!(*system.bodies()[0].pose(), Pose::identity());
        let ball = &system.bodies()[1];
        assert!(ball.position().z > 0.45, "ball sank to {}", ball.position().z);
        assert!(ball.linear_velocity().norm() < 0.1);
    }

    #[test]
    fn test_builder_pattern() {
        let config = SimulationConfig::realtime().zero_gravity();
        let (system, stepper) = SimulationBuilder::new()
            .body(Body::dynamic(
                Pose::identity(),
                Shape::cube(1.0),
                1.0,
                Material::default(),
            ))
            .config(config)
            .stepper_config(StepperConfig::default().with_seed(5))
            .build()
            .unwrap();

        assert_eq!(stepper.config().seed, Some(5));
        assert_eq!(system.num_bodies(), 1);
        assert!(system.config().gravity.is_zero());
    }

    #[test]
    fn test_reexported_sizes() {
        assert_eq!(POS_STATE_SIZE, 7);
        assert_eq!(VEL_STATE_SIZE, 6);
        let v = Twist::linear(Vector3::x());
        assert_relative_eq!(v.speed(), 1.0);
    }
}
