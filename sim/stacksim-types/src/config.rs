//! Configuration types for simulation.
//!
//! This module provides configuration types that control how the simulation
//! runs: timestep, gravity, iteration caps and the shuffle seed.

use crate::dynamics::Gravity;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main configuration for a simulation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Fixed timestep for physics integration (seconds).
    pub timestep: f64,
    /// Gravity configuration.
    pub gravity: Gravity,
    /// Solver configuration.
    pub solver: SolverConfig,
    /// Seed for the per-frame random permutation of the processing order.
    pub shuffle_seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timestep: 0.005, // 200 Hz
            gravity: Gravity::earth(),
            solver: SolverConfig::default(),
            shuffle_seed: 0,
        }
    }
}

impl SimulationConfig {
    /// Create a new simulation config with the given timestep.
    #[must_use]
    pub fn with_timestep(timestep: f64) -> Self {
        Self {
            timestep,
            ..Default::default()
        }
    }

    /// Create a configuration for real-time simulation (60 Hz).
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            timestep: 1.0 / 60.0,
            ..Default::default()
        }
    }

    /// Create a configuration for tall stacks (1000 Hz, more iterations).
    #[must_use]
    pub fn high_fidelity() -> Self {
        Self {
            timestep: 1.0 / 1000.0,
            solver: SolverConfig::high_accuracy(),
            ..Default::default()
        }
    }

    /// Set the gravity.
    #[must_use]
    pub fn gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity (zero-G environment).
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Gravity::zero();
        self
    }

    /// Set the solver configuration.
    #[must_use]
    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Set the shuffle seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = seed;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.timestep));
        }

        if self.timestep > 1.0 {
            return Err(crate::SimError::invalid_config(
                "timestep > 1 second is likely an error",
            ));
        }

        if !self.gravity.acceleration.iter().all(|x| x.is_finite()) {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }

        self.solver.validate()?;

        Ok(())
    }

    /// Get the frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.timestep
    }
}

/// Configuration for the collision and contact solver.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Integration method for dynamics.
    pub integration: IntegrationMethod,
    /// Cap on collision re-integration passes per frame.
    pub max_collisions: usize,
    /// Cap on contact resolution passes per frame.
    pub max_contacts: usize,
    /// Cap on shock propagation passes per frame.
    pub max_shock_propagation: usize,
    /// Approach speed (m/s) above which an overlapping pair is a collision.
    pub collision_velocity_threshold: f64,
    /// Approach speed (m/s) above which a contact still needs an impulse.
    pub contact_velocity_threshold: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            integration: IntegrationMethod::SemiImplicitEuler,
            max_collisions: 5,
            max_contacts: 10,
            max_shock_propagation: 1,
            collision_velocity_threshold: 1e-3,
            contact_velocity_threshold: 1e-6,
        }
    }
}

impl SolverConfig {
    /// Create a high-accuracy solver configuration.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            max_collisions: 10,
            max_contacts: 20,
            max_shock_propagation: 2,
            ..Default::default()
        }
    }

    /// Set the integration method.
    #[must_use]
    pub fn integration(mut self, method: IntegrationMethod) -> Self {
        self.integration = method;
        self
    }

    /// Set the iteration caps for collisions, contacts and shock propagation.
    #[must_use]
    pub fn iterations(mut self, collisions: usize, contacts: usize, shock: usize) -> Self {
        self.max_collisions = collisions;
        self.max_contacts = contacts;
        self.max_shock_propagation = shock;
        self
    }

    /// Set the approach-speed thresholds.
    #[must_use]
    pub fn thresholds(mut self, collision: f64, contact: f64) -> Self {
        self.collision_velocity_threshold = collision;
        self.contact_velocity_threshold = contact;
        self
    }

    /// Validate the solver configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_contacts == 0 {
            return Err(crate::SimError::invalid_config(
                "max_contacts must be at least 1",
            ));
        }

        if !self.collision_velocity_threshold.is_finite() || self.collision_velocity_threshold < 0.0
        {
            return Err(crate::SimError::invalid_config(
                "collision_velocity_threshold must be finite and non-negative",
            ));
        }

        if !self.contact_velocity_threshold.is_finite() || self.contact_velocity_threshold < 0.0 {
            return Err(crate::SimError::invalid_config(
                "contact_velocity_threshold must be finite and non-negative",
            ));
        }

        Ok(())
    }
}

/// Integration method for dynamics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntegrationMethod {
    /// Semi-implicit Euler (symplectic, good for games).
    #[default]
    SemiImplicitEuler,
}

impl IntegrationMethod {
    /// Get the order of accuracy for this method.
    #[must_use]
    pub const fn order(self) -> usize {
        match self {
            Self::SemiImplicitEuler => 1,
        }
    }

    /// Check if this method is symplectic (energy-preserving).
    #[must_use]
    pub const fn is_symplectic(self) -> bool {
        matches!(self, Self::SemiImplicitEuler)
    }
}

impl std::fmt::Display for IntegrationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SemiImplicitEuler => write!(f, "Semi-Implicit Euler"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_relative_eq!(config.timestep, 0.005, epsilon = 1e-12);
        assert_eq!(config.solver.max_collisions, 5);
        assert_eq!(config.solver.max_contacts, 10);
        assert_eq!(config.solver.max_shock_propagation, 1);
    }

    #[test]
    fn test_config_presets() {
        let realtime = SimulationConfig::realtime();
        assert_relative_eq!(realtime.timestep, 1.0 / 60.0, epsilon = 1e-10);

        let hifi = SimulationConfig::high_fidelity();
        assert_relative_eq!(hifi.timestep, 1.0 / 1000.0, epsilon = 1e-10);
        assert!(hifi.solver.max_contacts > SolverConfig::default().max_contacts);
    }

    #[test]
    fn test_config_builder() {
        let config = SimulationConfig::with_timestep(0.001)
            .zero_gravity()
            .seed(7)
            .solver(SolverConfig::default().iterations(2, 3, 0));

        assert_relative_eq!(config.timestep, 0.001, epsilon = 1e-10);
        assert_relative_eq!(config.gravity.acceleration.norm(), 0.0, epsilon = 1e-10);
        assert_eq!(config.shuffle_seed, 7);
        assert_eq!(config.solver.max_collisions, 2);
        assert_eq!(config.solver.max_contacts, 3);
        assert_eq!(config.solver.max_shock_propagation, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SimulationConfig::default();
        assert!(config.validate().is_ok());

        config.timestep = -0.01;
        assert!(matches!(
            config.validate(),
            Err(crate::SimError::InvalidTimestep(_))
        ));

        config.timestep = 0.0;
        assert!(config.validate().is_err());

        config.timestep = f64::NAN;
        assert!(config.validate().is_err());

        config.timestep = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_solver_validation() {
        let mut solver = SolverConfig::default();
        assert!(solver.validate().is_ok());

        solver.max_contacts = 0;
        assert!(solver.validate().is_err());

        solver.max_contacts = 10;
        solver.contact_velocity_threshold = -1.0;
        assert!(solver.validate().is_err());

        solver = SolverConfig::default().thresholds(f64::NAN, 0.0);
        assert!(solver.validate().is_err());
    }

    #[test]
    fn test_integration_method() {
        assert_eq!(IntegrationMethod::default(), IntegrationMethod::SemiImplicitEuler);
        assert_eq!(IntegrationMethod::SemiImplicitEuler.order(), 1);
        assert!(IntegrationMethod::SemiImplicitEuler.is_symplectic());
        assert_eq!(
            IntegrationMethod::SemiImplicitEuler.to_string(),
            "Semi-Implicit Euler"
        );
    }

    #[test]
    fn test_frequency() {
        let config = SimulationConfig::with_timestep(0.01);
        assert_relative_eq!(config.frequency(), 100.0, epsilon = 1e-10);
    }
}
