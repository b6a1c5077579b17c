//! Core types for rigid-body stacking simulation.
//!
//! This crate provides the foundational types shared by the stacking engine:
//!
//! - [`Pose`], [`Twist`] - Position, orientation and velocity of rigid bodies
//! - [`MassProperties`], [`Material`] - What a body weighs and how it bounces
//! - [`Contact`], [`ContactManifold`] - Narrow-phase results
//! - [`SimulationConfig`], [`SolverConfig`] - Timestep, iteration caps, seed
//! - [`SimError`] - Construction and validation failures
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no behavior beyond constructors,
//! validation and small math helpers. The engine in `stacksim-core` owns
//! every piece of physics.
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: forward
//! - Z: up
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use stacksim_types::{MassProperties, Pose, Twist};
//! use nalgebra::{Point3, Vector3};
//!
//! let pose = Pose::from_position(Point3::new(0.0, 0.0, 1.0));
//! let twist = Twist::zero();
//! let props = MassProperties::box_shape(1.0, Vector3::new(0.5, 0.5, 0.5));
//!
//! assert_eq!(pose.position.z, 1.0);
//! assert!(twist.linear.norm() < 1e-10);
//! assert!(props.validate().is_ok());
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod contact;
mod dynamics;
mod error;

pub use body::{BodyId, MassProperties, Material, Pose, Twist};
pub use config::{IntegrationMethod, SimulationConfig, SolverConfig};
pub use contact::{Contact, ContactManifold};
pub use dynamics::Gravity;
pub use error::SimError;

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_transform() {
        let pose = Pose::from_position_rotation(
            Point3::new(1.0, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );

        // After 90 degree rotation around Z, (1,0,0) becomes (0,1,0),
        // plus translation of (1,0,0)
        let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert!((world.x - 1.0).abs() < 1e-10);
        assert!((world.y - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_result_alias() {
        fn check(mass: &MassProperties) -> Result<f64> {
            mass.validate()?;
            Ok(mass.mass())
        }
        assert!(check(&MassProperties::sphere(0.5, 1.0)).is_ok());
        assert!(check(&MassProperties::sphere(-0.5, 1.0)).is_err());
    }
}
