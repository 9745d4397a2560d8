//! Joint tags and limits for articulated robots.
//!
//! Joints connect a parent body to a child body and constrain their relative
//! motion. The tag here is the pure-data description; the joint payload with
//! its mutable state lives in the multibody tree.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of a joint inside its robot.
///
/// Joint `i` always moves body `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointId(pub usize);

impl JointId {
    /// Create a new joint ID.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for JointId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Joint({})", self.0)
    }
}

/// Type of joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointType {
    /// Fixed joint - no relative motion allowed.
    Fixed,
    /// Revolute joint - rotation around a single axis.
    Revolute,
    /// Prismatic joint - translation along a single axis.
    Prismatic,
    /// Planar joint - pitch about Y and translation in the XZ plane.
    Planar,
    /// Spherical joint - rotation around all axes (ball joint).
    Spherical,
    /// Floating joint - 6 DOF (free base).
    Floating,
}

impl JointType {
    /// Get the number of velocity degrees of freedom for this joint type.
    #[must_use]
    pub const fn dof(self) -> usize {
        match self {
            Self::Fixed => 0,
            Self::Revolute | Self::Prismatic => 1,
            Self::Planar | Self::Spherical => 3,
            Self::Floating => 6,
        }
    }

    /// Whether this is a single-DoF joint.
    #[must_use]
    pub const fn is_one_dof(self) -> bool {
        matches!(self, Self::Revolute | Self::Prismatic)
    }

    /// Check if this joint type has rotational degrees of freedom.
    #[must_use]
    pub const fn has_rotation(self) -> bool {
        matches!(
            self,
            Self::Revolute | Self::Spherical | Self::Planar | Self::Floating
        )
    }

    /// Check if this joint type has translational degrees of freedom.
    #[must_use]
    pub const fn has_translation(self) -> bool {
        matches!(self, Self::Prismatic | Self::Planar | Self::Floating)
    }
}

impl std::fmt::Display for JointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Revolute => write!(f, "revolute"),
            Self::Prismatic => write!(f, "prismatic"),
            Self::Planar => write!(f, "planar"),
            Self::Spherical => write!(f, "spherical"),
            Self::Floating => write!(f, "floating"),
        }
    }
}

/// Position, velocity and effort limits for a single-DoF joint.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointLimits {
    /// Minimum position (angle for revolute, distance for prismatic).
    pub position_min: f64,
    /// Maximum position.
    pub position_max: f64,
    /// Maximum velocity magnitude.
    pub velocity_max: f64,
    /// Maximum effort (force/torque) magnitude.
    pub effort_max: f64,
}

impl Default for JointLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl JointLimits {
    /// Create limits with specified bounds.
    #[must_use]
    pub fn new(position_min: f64, position_max: f64, velocity_max: f64, effort_max: f64) -> Self {
        Self {
            position_min,
            position_max,
            velocity_max,
            effort_max,
        }
    }

    /// Create unlimited joint limits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            position_min: f64::NEG_INFINITY,
            position_max: f64::INFINITY,
            velocity_max: f64::INFINITY,
            effort_max: f64::INFINITY,
        }
    }

    /// Position limits only, unlimited velocity and effort.
    #[must_use]
    pub fn position(position_min: f64, position_max: f64) -> Self {
        Self {
            position_min,
            position_max,
            ..Self::unlimited()
        }
    }

    /// Check if a position is within limits.
    #[must_use]
    pub fn position_in_range(&self, position: f64) -> bool {
        position >= self.position_min && position <= self.position_max
    }

    /// Clamp an effort to be within limits.
    #[must_use]
    pub fn clamp_effort(&self, effort: f64) -> f64 {
        effort.clamp(-self.effort_max, self.effort_max)
    }

    /// Whether either position bound is finite.
    #[must_use]
    pub fn has_position_limits(&self) -> bool {
        self.position_min.is_finite() || self.position_max.is_finite()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_dof() {
        assert_eq!(JointType::Fixed.dof(), 0);
        assert_eq!(JointType::Revolute.dof(), 1);
        assert_eq!(JointType::Planar.dof(), 3);
        assert_eq!(JointType::Spherical.dof(), 3);
        assert_eq!(JointType::Floating.dof(), 6);
        assert!(JointType::Prismatic.is_one_dof());
        assert!(!JointType::Prismatic.has_rotation());
    }

    #[test]
    fn test_joint_limits() {
        let limits = JointLimits::position(-1.0, 1.0);
        assert!(limits.position_in_range(0.5));
        assert!(!limits.position_in_range(1.5));
        assert!(limits.has_position_limits());
        assert!(!JointLimits::unlimited().has_position_limits());

        let limits = JointLimits::new(-1.0, 1.0, 2.0, 10.0);
        assert_eq!(limits.clamp_effort(20.0), 10.0);
    }

    #[test]
    fn test_joint_id() {
        assert_eq!(JointId::new(3).to_string(), "Joint(3)");
        assert_eq!(JointId::from(2).index(), 2);
    }
}
