//! Core types for impulse-based multibody simulation.
//!
//! This crate provides the foundational data shared by every layer of the
//! physics stack:
//!
//! - [`RobotId`], [`BodyId`], [`JointId`] - arena indices into robots and their trees
//! - [`Pose`], [`Twist`], [`MassProperties`] - rigid body kinematics and inertia
//! - [`JointType`], [`JointLimits`] - joint tags and limits
//! - [`SimulationConfig`], [`SolverConfig`], [`Gravity`] - engine tuning
//! - [`SimError`] - the error type of every fallible operation
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They carry no dynamics, no integration and no
//! collision logic. Ids are plain indices assigned when a robot is built, so
//! every per-body accumulator downstream is a flat array.
//!
//! # Coordinate System
//!
//! - X: forward
//! - Y: left
//! - Z: up
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use sim_types::{Pose, Twist};
//! use nalgebra::{Point3, Vector3};
//!
//! let pose = Pose::from_position(Point3::new(0.0, 0.0, 1.0));
//! let twist = Twist::angular(Vector3::z());
//!
//! assert_eq!(pose.position.z, 1.0);
//! assert!(twist.linear.norm() < 1e-10);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;
mod joint;

pub use body::{BodyId, MassProperties, Pose, RobotId, Twist};
pub use config::{Gravity, SimulationConfig, SolverConfig, WORLD_FRAME};
pub use error::SimError;
pub use joint::{JointId, JointLimits, JointType};

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
