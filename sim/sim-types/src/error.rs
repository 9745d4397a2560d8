//! Error types for simulation operations.

use thiserror::Error;

/// Errors that can occur while building or simulating robots.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid robot ID referenced.
    #[error("invalid robot ID: {0}")]
    InvalidRobotId(usize),

    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(usize),

    /// Invalid joint ID referenced.
    #[error("invalid joint ID: {0}")]
    InvalidJointId(usize),

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

    /// A robot was added whose inertial frame differs from the engine's.
    #[error("inertial frame mismatch: expected {expected}, got {actual}")]
    InertialFrameMismatch {
        /// The engine's inertial frame.
        expected: String,
        /// The robot's inertial frame.
        actual: String,
    },

    /// A one-DoF joint was declared with a zero or non-finite axis.
    #[error("joint {joint_name} has an invalid axis")]
    InvalidJointAxis {
        /// Name of the offending joint.
        joint_name: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
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

    /// Create an inertial frame mismatch error.
    #[must_use]
    pub fn frame_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InertialFrameMismatch {
            expected: expected.into(),
            actual: actual.into(),
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
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::InvalidTimestep(_) | Self::InertialFrameMismatch { .. }
        )
    }
}
