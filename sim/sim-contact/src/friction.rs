//! Coulomb friction cone in contact coordinates.
//!
//! Contact impulses are expressed in a local frame whose Z axis is the contact
//! normal and whose X and Y axes span the tangent plane. The cone constrains
//! an impulse `λ = (λx, λy, λz)` to satisfy:
//!
//! ```text
//! λz ≥ 0
//! |(λx, λy)| ≤ μ · λz
//! ```

use nalgebra::{Vector2, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Circular Coulomb friction cone.
///
/// # Example
///
/// ```
/// use nalgebra::Vector3;
/// use sim_contact::FrictionCone;
///
/// let cone = FrictionCone::new(0.5);
/// let projected = cone.project_impulse(&Vector3::new(3.0, 0.0, 2.0));
///
/// assert!((projected.x - 1.0).abs() < 1e-12);
/// assert!(cone.contains(&projected));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrictionCone {
    /// Coulomb friction coefficient.
    pub mu: f64,
}

impl FrictionCone {
    /// Create a new friction cone with the given coefficient.
    #[must_use]
    pub fn new(mu: f64) -> Self {
        Self { mu: mu.max(0.0) }
    }

    /// Create a frictionless cone (μ = 0).
    #[must_use]
    pub fn frictionless() -> Self {
        Self { mu: 0.0 }
    }

    /// Clamp a tangential impulse to the cone for a given normal impulse.
    #[must_use]
    pub fn project(&self, tangent: Vector2<f64>, normal_magnitude: f64) -> Vector2<f64> {
        if normal_magnitude <= 0.0 || self.mu <= 0.0 {
            return Vector2::zeros();
        }

        let max_friction = self.mu * normal_magnitude;
        let tangent_magnitude = tangent.norm();

        if tangent_magnitude <= max_friction {
            tangent
        } else {
            tangent * (max_friction / tangent_magnitude)
        }
    }

    /// Clamp a contact-frame impulse into the cone.
    ///
    /// The normal part is clipped at zero and the tangential part scaled onto
    /// the cone boundary if it lies outside.
    #[must_use]
    pub fn project_impulse(&self, impulse: &Vector3<f64>) -> Vector3<f64> {
        let normal = impulse.z.max(0.0);
        let tangent = self.project(impulse.xy(), normal);
        Vector3::new(tangent.x, tangent.y, normal)
    }

    /// Check if a contact-frame impulse lies inside the cone.
    #[must_use]
    pub fn contains(&self, impulse: &Vector3<f64>) -> bool {
        if impulse.z < 0.0 {
            return false;
        }
        impulse.xy().norm() <= self.mu * impulse.z + 1e-10
    }

    /// Compute the maximum friction magnitude for a normal impulse.
    #[must_use]
    pub fn max_friction(&self, normal_magnitude: f64) -> f64 {
        self.mu * normal_magnitude.max(0.0)
    }

    /// Get the cone half-angle in radians.
    #[must_use]
    pub fn half_angle(&self) -> f64 {
        self.mu.atan()
    }
}
