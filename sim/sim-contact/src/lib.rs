//! Impulse-based contact resolution.
//!
//! A contact is resolved by a single impulse per tick rather than by a
//! penalty force. Given the relative velocity at the contact point and the
//! inverse apparent inertia `W` seen there, the impulse `λ` is chosen so that:
//!
//! - the post-impulse normal velocity reaches its target (zero, or a bounce
//!   from the coefficient of restitution),
//! - the impulse stays inside the Coulomb cone `|λ_t| ≤ μ · λ_n`,
//! - a separating contact gets no impulse at all.
//!
//! [`SingleContactImpulseCalculator`] implements
//! [`ImpulseBasedConstraintCalculator`](sim_core::ImpulseBasedConstraintCalculator)
//! so that many contacts can be coupled by the group solver in `sim-constraint`.
//!
//! # Example
//!
//! ```
//! use nalgebra::{Matrix3, Vector3};
//! use sim_contact::{FrictionCone, solve_contact};
//!
//! // A 2 kg point mass hitting the ground at 1 m/s.
//! let w = Matrix3::identity() * 0.5;
//! let solution = solve_contact(
//!     &w,
//!     &Vector3::new(0.0, 0.0, -1.0),
//!     0.0,
//!     &FrictionCone::new(0.5),
//!     1e-6,
//! );
//!
//! assert!((solution.impulse.z - 2.0).abs() < 1e-9);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-contact/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::suboptimal_flops)]

mod calculator;
mod friction;
mod params;

pub use calculator::{
    ContactSolution, DEFAULT_CONTACT_TOLERANCE, SingleContactImpulseCalculator, solve_contact,
};
pub use friction::FrictionCone;
pub use params::ContactParameters;

// Re-export types needed to build contacts
pub use sim_core::{CollisionResult, ContactBody};
