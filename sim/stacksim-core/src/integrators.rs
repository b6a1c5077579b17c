//! Numerical integration of rigid body state.
//!
//! Integration is split into a velocity half and a position half so the
//! frame driver can resolve contacts in between. Integrators are stateless
//! and touch only the body they are given.
//!
//! # Example
//!
//! ```
//! use stacksim_core::integrators::{Integrator, SemiImplicitEuler};
//! use stacksim_core::{Body, Shape};
//! use stacksim_types::{Material, Pose};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut body = Body::dynamic(
//!     Pose::from_position(Point3::new(0.0, 0.0, 10.0)),
//!     Shape::cube(1.0),
//!     1.0,
//!     Material::default(),
//! );
//! body.add_force_at_com(Vector3::new(0.0, 0.0, -9.81));
//!
//! let euler = SemiImplicitEuler;
//! euler.integrate_body_vel(&mut body, 0.01);
//! euler.integrate_body_pos(&mut body, 0.01);
//!
//! assert!(body.position().z < 10.0);
//! assert!(body.linear_velocity().z < 0.0);
//! ```

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use stacksim_types::{BodyId, IntegrationMethod, Pose};

use crate::body::Body;
use crate::system::System;

/// Trait for integration methods.
///
/// Implementors provide the per-body halves; the system-level entry points
/// look the body up by id and do nothing for unknown ids.
pub trait Integrator: std::fmt::Debug + Send {
    /// Advance momentum by the accumulated force and torque, then derive
    /// velocity. Immovable bodies are left untouched.
    fn integrate_body_vel(&self, body: &mut Body, dt: f64);

    /// Advance position and orientation by the current velocity.
    /// Immovable bodies are left untouched.
    fn integrate_body_pos(&self, body: &mut Body, dt: f64);

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Integrate the velocity of one body of a system.
    fn integrate_vel(&self, system: &mut System, dt: f64, id: BodyId) {
        if let Some(body) = system.body_mut(id) {
            self.integrate_body_vel(body, dt);
        }
    }

    /// Integrate the position of one body of a system.
    fn integrate_pos(&self, system: &mut System, dt: f64, id: BodyId) {
        if let Some(body) = system.body_mut(id) {
            self.integrate_body_pos(body, dt);
        }
    }
}

/// Build the integrator selected by a configuration.
#[must_use]
pub fn integrator_for(method: IntegrationMethod) -> Box<dyn Integrator> {
    match method {
        IntegrationMethod::SemiImplicitEuler => Box::new(SemiImplicitEuler),
    }
}

/// Semi-implicit Euler integration (symplectic Euler).
///
/// Updates momentum first, then uses the new velocity for position.
///
/// ```text
/// P(t+dt) = P(t) + F * dt          v = P / m
/// L(t+dt) = L(t) + τ * dt          ω = I⁻¹ L
/// x(t+dt) = x(t) + v * dt
/// q(t+dt) = normalize(q + ½ dt (ω ⊗ q))
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SemiImplicitEuler;

impl Integrator for SemiImplicitEuler {
    fn integrate_body_vel(&self, body: &mut Body, dt: f64) {
        if body.is_static() {
            return;
        }
        let linear = body.linear_momentum() + body.force() * dt;
        let angular = body.angular_momentum() + body.torque() * dt;
        body.set_momentum(linear, angular);
    }

    fn integrate_body_pos(&self, body: &mut Body, dt: f64) {
        if body.is_static() {
            return;
        }
        let position = body.position() + body.linear_velocity() * dt;
        let rotation = integrate_rotation(&body.orientation(), &body.angular_velocity(), dt);
        body.set_pose_conserving_momentum(Pose::from_position_rotation(position, rotation));
    }

    fn name(&self) -> &'static str {
        "Semi-Implicit Euler"
    }
}

/// Integrate orientation with the quaternion derivative.
///
/// q̇ = ½ ω ⊗ q, with ω in world coordinates. The result is renormalized;
/// a degenerate result keeps the previous orientation.
#[must_use]
pub fn integrate_rotation(
    rotation: &UnitQuaternion<f64>,
    omega: &Vector3<f64>,
    dt: f64,
) -> UnitQuaternion<f64> {
    if omega.norm_squared() == 0.0 {
        return *rotation;
    }
    let q = rotation.into_inner();
    let spin = Quaternion::from_imag(*omega) * q * (0.5 * dt);
    UnitQuaternion::try_new(q + spin, f64::EPSILON).unwrap_or(*rotation)
}
