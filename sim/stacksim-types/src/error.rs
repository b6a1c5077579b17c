//! Error types for simulation operations.

use thiserror::Error;

/// Errors that can occur while building or checking a simulation.
///
/// Runtime non-convergence of the collision and contact loops is not an
/// error; it is reported through the step report instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(usize),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },

    /// A system needs at least one body.
    #[error("a system needs at least one body")]
    EmptySystem,

    /// A movable body whose inertia tensor cannot be inverted.
    #[error("body {body} is movable but its inertia tensor is degenerate")]
    DegenerateInertia {
        /// Index of the offending body.
        body: usize,
    },

    /// Shape dimensions or initial pose that cannot be simulated.
    #[error("body {body} has invalid geometry: {reason}")]
    InvalidGeometry {
        /// Index of the offending body.
        body: usize,
        /// Description of what's wrong.
        reason: String,
    },

    /// Material coefficients out of range.
    #[error("body {body} has an invalid material: {reason}")]
    InvalidMaterial {
        /// Index of the offending body.
        body: usize,
        /// Description of the violated range.
        reason: String,
    },
}

impl SimError {
    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Create an invalid geometry error.
    #[must_use]
    pub fn invalid_geometry(body: usize, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            body,
            reason: reason.into(),
        }
    }

    /// Create an invalid material error.
    #[must_use]
    pub fn invalid_material(body: usize, reason: impl Into<String>) -> Self {
        Self::InvalidMaterial {
            body,
            reason: reason.into(),
        }
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::InvalidTimestep(_))
    }
}
