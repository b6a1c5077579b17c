//! Rigid body state types.
//!
//! This module provides the value types that describe a rigid body without
//! any behavior attached: its identity, pose, velocity, mass properties and
//! surface material.

use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a rigid body in a simulation.
///
/// The identifier is the body's index in the canonical body collection it was
/// handed over in. It stays valid however the bodies are reordered for
/// processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub usize);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Index into the canonical body collection.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for BodyId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Position and orientation of a rigid body.
///
/// # Example
///
/// ```
/// use stacksim_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Create an identity pose (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position only (identity rotation).
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position and rotation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Create a pose rotated by `angle` radians about `axis`.
    ///
    /// A zero-length axis yields the identity rotation.
    #[must_use]
    pub fn from_axis_angle(position: Point3<f64>, axis: Vector3<f64>, angle: f64) -> Self {
        let rotation = nalgebra::Unit::try_new(axis, 1e-12).map_or_else(UnitQuaternion::identity, |axis| {
            UnitQuaternion::from_axis_angle(&axis, angle)
        });
        Self { position, rotation }
    }

    /// Convert to an isometry.
    #[must_use]
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(self.position.coords.into(), self.rotation)
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a vector from local to world coordinates (rotation only).
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Transform a point from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// Transform a vector from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * world
    }

    /// Check if the pose contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity in world coordinates (m/s).
    pub linear: Vector3<f64>,
    /// Angular velocity in world coordinates (rad/s).
    pub angular: Vector3<f64>,
}

impl Default for Twist {
    fn default() -> Self {
        Self::zero()
    }
}

impl Twist {
    /// Create a twist with specified linear and angular velocity.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Create a zero twist (at rest).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Create a twist with linear velocity only.
    #[must_use]
    pub fn linear(v: Vector3<f64>) -> Self {
        Self {
            linear: v,
            angular: Vector3::zeros(),
        }
    }

    /// Create a twist with angular velocity only.
    #[must_use]
    pub fn angular(omega: Vector3<f64>) -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: omega,
        }
    }

    /// Velocity of a material point at `offset` from the center of mass.
    ///
    /// `v_point` = `v_linear` + omega × r
    #[must_use]
    pub fn velocity_at_point(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(offset)
    }

    /// Check if the twist contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().all(|x| x.is_finite()) && self.angular.iter().all(|x| x.is_finite())
    }

    /// Get the linear speed (magnitude of linear velocity).
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.linear.norm()
    }
}

/// Mass properties of a rigid body about its center of mass.
///
/// The body origin is the center of mass; shapes are centered on it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Inverse of the total mass (1/kg). Zero marks an immovable body.
    pub inverse_mass: f64,
    /// Inertia tensor in body coordinates (kg·m²).
    pub inertia: Matrix3<f64>,
}

impl MassProperties {
    /// Mass properties of an immovable body.
    #[must_use]
    pub fn immovable() -> Self {
        Self {
            inverse_mass: 0.0,
            inertia: Matrix3::zeros(),
        }
    }

    /// Create mass properties for a uniform sphere.
    ///
    /// Inertia of a solid sphere: I = (2/5) * m * r²
    #[must_use]
    pub fn sphere(inverse_mass: f64, radius: f64) -> Self {
        if inverse_mass == 0.0 {
            return Self::immovable();
        }
        let i = 0.4 * radius * radius / inverse_mass;
        Self {
            inverse_mass,
            inertia: Matrix3::from_diagonal(&Vector3::new(i, i, i)),
        }
    }

    /// Create mass properties for a uniform box.
    ///
    /// Inertia of a solid box with dimensions (x, y, z):
    /// - Ixx = (1/12) * m * (y² + z²)
    /// - Iyy = (1/12) * m * (x² + z²)
    /// - Izz = (1/12) * m * (x² + y²)
    #[must_use]
    pub fn box_shape(inverse_mass: f64, half_extents: Vector3<f64>) -> Self {
        if inverse_mass == 0.0 {
            return Self::immovable();
        }
        let mass = 1.0 / inverse_mass;
        let x2 = 4.0 * half_extents.x * half_extents.x;
        let y2 = 4.0 * half_extents.y * half_extents.y;
        let z2 = 4.0 * half_extents.z * half_extents.z;

        let ixx = mass * (y2 + z2) / 12.0;
        let iyy = mass * (x2 + z2) / 12.0;
        let izz = mass * (x2 + y2) / 12.0;

        Self {
            inverse_mass,
            inertia: Matrix3::from_diagonal(&Vector3::new(ixx, iyy, izz)),
        }
    }

    /// Total mass in kg (infinite for immovable bodies).
    #[must_use]
    pub fn mass(&self) -> f64 {
        if self.is_static() {
            f64::INFINITY
        } else {
            1.0 / self.inverse_mass
        }
    }

    /// Get the inverse inertia tensor in body coordinates.
    ///
    /// Immovable bodies have a zero inverse inertia. Returns `None` for a
    /// movable body whose inertia is singular.
    #[must_use]
    pub fn inverse_inertia(&self) -> Option<Matrix3<f64>> {
        if self.is_static() {
            return Some(Matrix3::zeros());
        }
        self.inertia
            .try_inverse()
            .filter(|inv| inv.iter().all(|x| x.is_finite()))
    }

    /// Check if this represents a static (immovable) body.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0
    }

    /// Validate that the mass properties are physically valid.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.inverse_mass.is_finite() {
            return Err(crate::SimError::invalid_mass(
                "inverse mass must be finite",
            ));
        }

        if self.inverse_mass < 0.0 {
            return Err(crate::SimError::invalid_mass(
                "inverse mass cannot be negative",
            ));
        }

        if self.is_static() {
            return Ok(());
        }

        // Movable bodies need a positive definite inertia tensor.
        let eigenvalues = self.inertia.symmetric_eigenvalues();
        if eigenvalues.iter().any(|&e| !e.is_finite() || e <= 1e-12) {
            return Err(crate::SimError::invalid_mass(
                "inertia tensor must be positive definite",
            ));
        }

        Ok(())
    }
}

/// Surface material of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    /// Coefficient of restitution in [0, 1].
    pub restitution: f64,
    /// Coulomb friction coefficient (>= 0).
    pub friction: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            restitution: 0.5,
            friction: 0.5,
        }
    }
}

impl Material {
    /// Create a material.
    #[must_use]
    pub const fn new(restitution: f64, friction: f64) -> Self {
        Self {
            restitution,
            friction,
        }
    }

    /// Combine two materials for a contact between them.
    ///
    /// Restitution takes the minimum, friction the maximum.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            restitution: self.restitution.min(other.restitution),
            friction: self.friction.max(other.friction),
        }
    }

    /// Check the coefficient ranges, returning a description of the first
    /// violation.
    pub fn check(&self) -> std::result::Result<(), &'static str> {
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err("restitution must be between 0 and 1");
        }
        if !self.friction.is_finite() || self.friction < 0.0 {
            return Err("friction must be finite and non-negative");
        }
        Ok(())
    }
}
