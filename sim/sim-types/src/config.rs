//! Configuration types for simulation.
//!
//! This module provides the read-only tuning structs consumed by the physics
//! engine: timestep, gravity, the engine's inertial frame and the settings of
//! the successive-over-relaxation impulse solver.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Name of the default inertial frame.
pub const WORLD_FRAME: &str = "world";

/// Gravity configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gravity {
    /// Acceleration due to gravity (m/s²), expressed in the inertial frame.
    pub acceleration: Vector3<f64>,
}

impl Default for Gravity {
    fn default() -> Self {
        Self::earth()
    }
}

impl Gravity {
    /// Standard Earth gravity (9.81 m/s² in -Z direction).
    #[must_use]
    pub fn earth() -> Self {
        Self {
            acceleration: Vector3::new(0.0, 0.0, -9.81),
        }
    }

    /// Zero gravity (microgravity).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            acceleration: Vector3::zeros(),
        }
    }

    /// Custom gravity vector.
    #[must_use]
    pub fn custom(acceleration: Vector3<f64>) -> Self {
        Self { acceleration }
    }

    /// Compute the gravitational force on a body of the given mass.
    #[must_use]
    pub fn force_on_mass(&self, mass: f64) -> Vector3<f64> {
        self.acceleration * mass
    }
}

/// Main configuration for a physics engine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Fixed timestep for physics integration (seconds).
    pub timestep: f64,
    /// Gravity configuration.
    pub gravity: Gravity,
    /// Name of the frame every robot must be expressed in.
    pub inertial_frame: String,
    /// Impulse solver configuration.
    pub solver: SolverConfig,
    /// Number of ticks averaged by the real-time-rate telemetry.
    pub real_time_rate_window: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 1000.0,
            gravity: Gravity::earth(),
            inertial_frame: WORLD_FRAME.to_string(),
            solver: SolverConfig::default(),
            real_time_rate_window: 100,
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

    /// Create a configuration for interactive simulation (250 Hz).
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            timestep: 1.0 / 250.0,
            solver: SolverConfig::fast(),
            ..Default::default()
        }
    }

    /// Create a configuration for high-fidelity simulation (2 kHz).
    #[must_use]
    pub fn high_fidelity() -> Self {
        Self {
            timestep: 1.0 / 2000.0,
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

    /// Set the inertial frame name.
    #[must_use]
    pub fn inertial_frame(mut self, name: impl Into<String>) -> Self {
        self.inertial_frame = name.into();
        self
    }

    /// Set the solver configuration.
    #[must_use]
    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Set the real-time-rate averaging window.
    #[must_use]
    pub fn real_time_rate_window(mut self, ticks: usize) -> Self {
        self.real_time_rate_window = ticks;
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

        if !self.gravity.acceleration.iter().all(|g| g.is_finite()) {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }

        if self.inertial_frame.is_empty() {
            return Err(crate::SimError::invalid_config(
                "inertial frame name cannot be empty",
            ));
        }

        if self.real_time_rate_window == 0 {
            return Err(crate::SimError::invalid_config(
                "real_time_rate_window must be at least 1",
            ));
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

/// Configuration for the successive-over-relaxation impulse solver.
///
/// The relaxation factor starts at 1 and decays every pass as
/// `alpha = alpha_min + gamma * (alpha - alpha_min)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Convergence threshold on both the impulse and velocity residuals.
    pub tolerance: f64,
    /// Maximum number of SOR passes before giving up.
    pub max_iterations: usize,
    /// Lower bound of the relaxation factor.
    pub alpha_min: f64,
    /// Decay rate of the relaxation factor toward `alpha_min`.
    pub gamma: f64,
    /// Closing-velocity tolerance of a single contact.
    pub single_contact_tolerance: f64,
    /// Solve every constraint on its own when the coupled iteration fails.
    pub solve_contacts_independently_on_failure: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-6,
            max_iterations: 100,
            alpha_min: 0.7,
            gamma: 0.99,
            single_contact_tolerance: 1.0e-6,
            solve_contacts_independently_on_failure: false,
        }
    }
}

impl SolverConfig {
    /// Create a high-accuracy solver configuration.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            tolerance: 1.0e-8,
            max_iterations: 500,
            ..Default::default()
        }
    }

    /// Create a fast solver configuration.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            tolerance: 1.0e-4,
            max_iterations: 30,
            solve_contacts_independently_on_failure: true,
            ..Default::default()
        }
    }

    /// Set the convergence tolerance.
    #[must_use]
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the iteration budget.
    #[must_use]
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relaxation schedule.
    #[must_use]
    pub fn relaxation(mut self, alpha_min: f64, gamma: f64) -> Self {
        self.alpha_min = alpha_min;
        self.gamma = gamma;
        self
    }

    /// Enable the independent fallback on non-convergence.
    #[must_use]
    pub fn independent_fallback(mut self, enabled: bool) -> Self {
        self.solve_contacts_independently_on_failure = enabled;
        self
    }

    /// Next value of the relaxation factor.
    #[must_use]
    pub fn decay_alpha(&self, alpha: f64) -> f64 {
        self.alpha_min + self.gamma * (alpha - self.alpha_min)
    }

    /// Validate the solver configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_iterations == 0 {
            return Err(crate::SimError::invalid_config(
                "max_iterations must be at least 1",
            ));
        }

        if !self.tolerance.is_finite()
            || self.tolerance <= 0.0
            || !self.single_contact_tolerance.is_finite()
            || self.single_contact_tolerance < 0.0
        {
            return Err(crate::SimError::invalid_config(
                "tolerances must be positive",
            ));
        }

        if self.alpha_min.is_nan() || self.alpha_min <= 0.0 || self.alpha_min > 1.0 {
            return Err(crate::SimError::invalid_config(
                "alpha_min must be in (0, 1]",
            ));
        }

        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(crate::SimError::invalid_config(
                "gamma must be in [0, 1]",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_relative_eq!(config.timestep, 0.001, epsilon = 1e-12);
        assert_eq!(config.inertial_frame, WORLD_FRAME);
    }

    #[test]
    fn test_config_presets() {
        assert!(SimulationConfig::realtime().validate().is_ok());
        let hifi = SimulationConfig::high_fidelity();
        assert!(hifi.validate().is_ok());
        assert_eq!(hifi.solver.max_iterations, 500);
    }

    #[test]
    fn test_config_builder() {
        let config = SimulationConfig::with_timestep(0.002)
            .zero_gravity()
            .inertial_frame("odom")
            .real_time_rate_window(10);

        assert_relative_eq!(config.frequency(), 500.0, epsilon = 1e-9);
        assert_relative_eq!(config.gravity.acceleration.norm(), 0.0);
        assert_eq!(config.inertial_frame, "odom");
        assert_eq!(config.real_time_rate_window, 10);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SimulationConfig::default();

        config.timestep = -0.01;
        assert!(matches!(config.validate(), Err(crate::SimError::InvalidTimestep(_))));

        config.timestep = f64::NAN;
        assert!(config.validate().is_err());

        config.timestep = 0.001;
        config.inertial_frame.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_solver_defaults() {
        let solver = SolverConfig::default();
        assert!(solver.validate().is_ok());
        assert_eq!(solver.tolerance, 1e-6);
        assert_eq!(solver.max_iterations, 100);
        assert_eq!(solver.alpha_min, 0.7);
        assert_eq!(solver.gamma, 0.99);
        assert!(!solver.solve_contacts_independently_on_failure);
    }

    #[test]
    fn test_alpha_decay() {
        let solver = SolverConfig::default();
        let mut alpha = 1.0;
        for _ in 0..2000 {
            let next = solver.decay_alpha(alpha);
            assert!(next <= alpha);
            assert!(next >= solver.alpha_min);
            alpha = next;
        }
        assert_relative_eq!(alpha, 0.7, epsilon = 1e-6);
    }

    #[test]
    fn test_solver_validation() {
        assert!(SolverConfig::default().max_iterations(0).validate().is_err());
        assert!(SolverConfig::default().relaxation(0.0, 0.5).validate().is_err());
        assert!(SolverConfig::default().relaxation(0.5, 1.5).validate().is_err());
        assert!(SolverConfig::default().tolerance(f64::NAN).validate().is_err());
    }
}
