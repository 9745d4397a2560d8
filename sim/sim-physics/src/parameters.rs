//! Contact parameters per robot pair.

use std::collections::HashMap;

use sim_contact::ContactParameters;
use sim_core::CollisionResult;
use sim_types::{Result, RobotId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The other side of a contact: a robot or the static environment.
pub type ContactPartner = Option<RobotId>;

/// Global contact parameters with per-pair overrides.
///
/// A pair is unordered: `(a, b)` and `(b, a)` name the same override.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactParameterTable {
    default: ContactParameters,
    overrides: HashMap<(RobotId, ContactPartner), ContactParameters>,
}

fn key(a: RobotId, b: ContactPartner) -> (RobotId, ContactPartner) {
    match b {
        Some(b) if b < a => (b, Some(a)),
        _ => (a, b),
    }
}

impl ContactParameterTable {
    /// Table applying `default` to every pair.
    #[must_use]
    pub fn new(default: ContactParameters) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Parameters of pairs without an override.
    #[must_use]
    pub fn default_parameters(&self) -> &ContactParameters {
        &self.default
    }

    /// Replace the parameters of pairs without an override.
    ///
    /// # Errors
    ///
    /// Returns an error if `parameters` fail validation.
    pub fn set_default(&mut self, parameters: ContactParameters) -> Result<()> {
        parameters.validate()?;
        self.default = parameters;
        Ok(())
    }

    /// Override the parameters between `a` and `b` (`None` for the environment).
    ///
    /// # Errors
    ///
    /// Returns an error if `parameters` fail validation.
    pub fn set_pair(
        &mut self,
        a: RobotId,
        b: ContactPartner,
        parameters: ContactParameters,
    ) -> Result<()> {
        parameters.validate()?;
        self.overrides.insert(key(a, b), parameters);
        Ok(())
    }

    /// Remove an override.
    pub fn remove_pair(&mut self, a: RobotId, b: ContactPartner) -> Option<ContactParameters> {
        self.overrides.remove(&key(a, b))
    }

    /// Parameters between `a` and `b`.
    #[must_use]
    pub fn get(&self, a: RobotId, b: ContactPartner) -> ContactParameters {
        self.overrides.get(&key(a, b)).copied().unwrap_or(self.default)
    }

    /// Parameters of a collision.
    #[must_use]
    pub fn for_collision(&self, collision: &CollisionResult) -> ContactParameters {
        self.get(collision.body_a.robot, collision.body_b.map(|b| b.robot))
    }

    /// Widest contact threshold of the table, used by the collision detection.
    #[must_use]
    pub fn detection_threshold(&self) -> f64 {
        self.overrides
            .values()
            .map(|p| p.minimum_penetration)
            .fold(self.default.minimum_penetration, f64::max)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pairs_are_unordered() {
        let mut table = ContactParameterTable::default();
        let slippery = ContactParameters::frictionless();
        table
            .set_pair(RobotId::new(2), Some(RobotId::new(1)), slippery)
            .unwrap();

        assert_eq!(table.get(RobotId::new(1), Some(RobotId::new(2))), slippery);
        assert_eq!(table.get(RobotId::new(2), Some(RobotId::new(1))), slippery);
        assert_eq!(
            table.get(RobotId::new(1), None),
            ContactParameters::default()
        );
    }

    #[test]
    fn test_environment_override() {
        let mut table = ContactParameterTable::default();
        let bouncy = ContactParameters::default().with_restitution(0.8);
        table.set_pair(RobotId::new(0), None, bouncy).unwrap();

        assert_relative_eq!(
            table.get(RobotId::new(0), None).coefficient_of_restitution,
            0.8
        );
        assert!(table.remove_pair(RobotId::new(0), None).is_some());
        assert_eq!(table.get(RobotId::new(0), None), ContactParameters::default());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut table = ContactParameterTable::default();
        let invalid = ContactParameters {
            coefficient_of_friction: -1.0,
            ..ContactParameters::default()
        };
        assert!(table.set_default(invalid).is_err());
        assert!(table.set_pair(RobotId::new(0), None, invalid).is_err());
    }

    #[test]
    fn test_detection_threshold_is_the_widest() {
        let mut table = ContactParameterTable::default();
        let wide = ContactParameters {
            minimum_penetration: 1e-3,
            ..ContactParameters::default()
        };
        table.set_pair(RobotId::new(0), None, wide).unwrap();
        assert_relative_eq!(table.detection_threshold(), 1e-3);
    }
}
