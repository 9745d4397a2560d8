//! Contact parameters.
//!
//! These parameters shape how a single impulse-based contact responds: when it
//! is considered touching, how much it bounces and how hard it grips.

use sim_types::{Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Physical parameters of an impulse-based contact.
///
/// The target normal velocity after the impulse is
///
/// ```text
/// v_target = max(e · (-v_n)   if -v_n > restitution_threshold else 0,
///                erp · penetration / dt)
/// ```
///
/// and the tangential impulse is limited by `|λ_t| ≤ μ · λ_n`.
///
/// # Example
///
/// ```
/// use sim_contact::ContactParameters;
///
/// let bouncy = ContactParameters::elastic();
/// assert_eq!(bouncy.coefficient_of_restitution, 1.0);
///
/// let custom = ContactParameters::default()
///     .with_friction(0.4)
///     .with_restitution(0.2);
/// assert!(custom.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactParameters {
    /// Signed distance below which two shapes are reported in contact (m).
    ///
    /// This is the only parameter the collision detection depends on.
    pub minimum_penetration: f64,

    /// Coulomb friction coefficient (dimensionless).
    pub coefficient_of_friction: f64,

    /// Coefficient of restitution (dimensionless, 0-1).
    ///
    /// - 0.0 = perfectly inelastic (no bounce)
    /// - 1.0 = perfectly elastic (full bounce)
    pub coefficient_of_restitution: f64,

    /// Approach speed below which restitution is ignored (m/s).
    pub restitution_threshold: f64,

    /// Fraction of the penetration removed per step (1/s after dividing by dt).
    ///
    /// Zero disables positional correction, so a contact at rest stays exactly
    /// at rest.
    pub error_reduction_parameter: f64,
}

impl Default for ContactParameters {
    fn default() -> Self {
        Self {
            minimum_penetration: 5.0e-5,
            coefficient_of_friction: 0.7,
            coefficient_of_restitution: 0.0,
            restitution_threshold: 0.0,
            error_reduction_parameter: 0.0,
        }
    }
}

impl ContactParameters {
    /// Frictionless, inelastic contact.
    #[must_use]
    pub fn frictionless() -> Self {
        Self {
            coefficient_of_friction: 0.0,
            ..Self::default()
        }
    }

    /// Frictionless, perfectly elastic contact.
    #[must_use]
    pub fn elastic() -> Self {
        Self {
            coefficient_of_friction: 0.0,
            coefficient_of_restitution: 1.0,
            ..Self::default()
        }
    }

    /// Rubber-like grip with a small bounce above 5 cm/s.
    #[must_use]
    pub fn high_friction() -> Self {
        Self {
            coefficient_of_friction: 1.2,
            coefficient_of_restitution: 0.1,
            restitution_threshold: 0.05,
            ..Self::default()
        }
    }

    /// Set the detection threshold.
    #[must_use]
    pub fn with_minimum_penetration(mut self, minimum_penetration: f64) -> Self {
        self.minimum_penetration = minimum_penetration;
        self
    }

    /// Set the friction coefficient.
    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.coefficient_of_friction = friction;
        self
    }

    /// Set the restitution (bounciness).
    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.coefficient_of_restitution = restitution.clamp(0.0, 1.0);
        self
    }

    /// Set the restitution threshold.
    #[must_use]
    pub fn with_restitution_threshold(mut self, threshold: f64) -> Self {
        self.restitution_threshold = threshold;
        self
    }

    /// Set the error reduction parameter.
    #[must_use]
    pub fn with_error_reduction(mut self, erp: f64) -> Self {
        self.error_reduction_parameter = erp;
        self
    }

    /// Target normal velocity after the impulse.
    ///
    /// `approach_velocity` is the relative normal velocity before the impulse
    /// (negative when closing) and `signed_distance` the predicted separation.
    #[must_use]
    pub fn target_normal_velocity(&self, approach_velocity: f64, signed_distance: f64, dt: f64) -> f64 {
        let approach_speed = -approach_velocity;
        let bounce = if approach_speed > self.restitution_threshold {
            self.coefficient_of_restitution * approach_speed
        } else {
            0.0
        };
        let correction = if dt > 0.0 {
            self.error_reduction_parameter * (-signed_distance).max(0.0) / dt
        } else {
            0.0
        };
        bounce.max(correction)
    }

    /// Validate the parameters are physically reasonable.
    pub fn validate(&self) -> Result<()> {
        if !self.minimum_penetration.is_finite() {
            return Err(SimError::invalid_config("minimum_penetration must be finite"));
        }
        if self.coefficient_of_friction.is_nan() || self.coefficient_of_friction < 0.0 {
            return Err(SimError::invalid_config("coefficient_of_friction cannot be negative"));
        }
        if !(0.0..=1.0).contains(&self.coefficient_of_restitution) {
            return Err(SimError::invalid_config(
                "coefficient_of_restitution must be in [0, 1]",
            ));
        }
        if self.restitution_threshold.is_nan() || self.restitution_threshold < 0.0 {
            return Err(SimError::invalid_config("restitution_threshold cannot be negative"));
        }
        if !(0.0..=1.0).contains(&self.error_reduction_parameter) {
            return Err(SimError::invalid_config(
                "error_reduction_parameter must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_preset_params_valid() {
        assert!(ContactParameters::default().validate().is_ok());
        assert!(ContactParameters::frictionless().validate().is_ok());
        assert!(ContactParameters::elastic().validate().is_ok());
        assert!(ContactParameters::high_friction().validate().is_ok());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = ContactParameters::default().with_friction(-0.1);
        assert!(params.validate().unwrap_err().is_config_error());

        let params = ContactParameters::default().with_error_reduction(2.0);
        assert!(params.validate().is_err());

        let params = ContactParameters::default().with_friction(f64::NAN);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_restitution_threshold() {
        let params = ContactParameters::elastic().with_restitution_threshold(0.1);
        assert_eq!(params.target_normal_velocity(-0.05, 0.0, 0.001), 0.0);
        assert_relative_eq!(params.target_normal_velocity(-2.0, 0.0, 0.001), 2.0);
    }

    #[test]
    fn test_error_reduction_pushes_out() {
        let params = ContactParameters::default().with_error_reduction(0.2);
        // 1 mm deep, 1 ms step: 0.2 * 1e-3 / 1e-3.
        assert_relative_eq!(params.target_normal_velocity(0.0, -1e-3, 1e-3), 0.2, epsilon = 1e-12);
        assert_eq!(params.target_normal_velocity(0.0, 1e-3, 1e-3), 0.0);
    }

    #[test]
    fn test_builder_pattern() {
        let params = ContactParameters::default()
            .with_minimum_penetration(1e-4)
            .with_friction(0.8)
            .with_restitution(1.5);

        assert_relative_eq!(params.minimum_penetration, 1e-4);
        assert_relative_eq!(params.coefficient_of_friction, 0.8);
        assert_relative_eq!(params.coefficient_of_restitution, 1.0);
    }
}
