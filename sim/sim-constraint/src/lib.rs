//! Coupled contact and joint-limit resolution for articulated robots.
//!
//! A tick's collisions are first partitioned into groups of robots that touch
//! each other ([`CollisionGrouping`]). Each group is then solved by a
//! [`MultiContactImpulseCalculator`], which iterates over one
//! [`SingleContactImpulseCalculator`](sim_contact::SingleContactImpulseCalculator)
//! per collision and one [`RobotJointLimitImpulseBasedCalculator`] per robot
//! until their impulses agree.
//!
//! # Pipeline
//!
//! ```text
//! collisions ──► CollisionGrouping ──► groups
//!                                        │
//!                      ┌─────────────────┘
//!                      ▼
//!   MultiContactImpulseCalculator::configure(group)
//!   MultiContactImpulseCalculator::compute_impulses(dt, robots)
//!   MultiContactImpulseCalculator::write_joint_delta_velocities(robots)
//! ```
//!
//! Joint limits of robots outside every group are handled by a standalone
//! [`RobotJointLimitImpulseBasedCalculator`], driven directly through
//! [`ImpulseBasedConstraintCalculator`](sim_core::ImpulseBasedConstraintCalculator).
//!
//! # Joint limits
//!
//! All active limits of one robot form a small LCP in joint space, solved by
//! [`ProjectedGaussSeidel`]:
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use sim_constraint::ProjectedGaussSeidel;
//!
//! // Two limits; the second one is separating.
//! let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
//! let b = DVector::from_column_slice(&[-1.0, 2.0]);
//! let mut lambda = DVector::zeros(2);
//! let result = ProjectedGaussSeidel::default().solve(&a, &b, &mut lambda);
//!
//! assert!(result.converged);
//! assert!((lambda[0] - 0.5).abs() < 1e-12);
//! assert_eq!(lambda[1], 0.0);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-constraint/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::suboptimal_flops)]

mod islands;
mod limits;
mod pgs;
mod solver;

pub use islands::{CollisionGrouping, MultiRobotCollisionGroup};
pub use limits::{
    ActiveLimit, ConstraintParameters, JointLimitTarget, RobotJointLimitImpulseBasedCalculator,
};
pub use pgs::{PgsConfig, PgsResult, ProjectedGaussSeidel};
pub use solver::{MultiContactImpulseCalculator, MultiContactStep, MultiContactStepListener};

// Re-export types needed to configure the solver
pub use sim_types::{RobotId, SolverConfig};
