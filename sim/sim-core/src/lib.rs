//! Multibody dynamics core of the impulse-based engine.
//!
//! This crate holds everything a single robot needs during a tick, plus the
//! shared plumbing the constraint solvers build on. It builds on [`sim_types`]
//! for ids, poses and configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ImpulseBasedRobot                         │
//! │  Robot tree · wrench points · collidables · IMUs            │
//! └───────────┬─────────────────────────────────┬───────────────┘
//!             │                                 │
//!             ▼                                 ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────┐
//! │  ForwardDynamicsCalculator│   │  collision                  │
//! │  ABA · impulse response   │   │  SAP broad phase · analytic │
//! └───────────┬───────────────┘   │  narrow phase · detector    │
//!             │                   └─────────────────────────────┘
//!             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  constraint: DeltaTwistRegistry · TwistCoupling · calculator │
//! │  trait · CalculatorPool                                      │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 FirstOrderIntegrator                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Spatial vectors are `[angular; linear]`, expressed in world coordinates
//! about the world origin.
//!
//! # Quick Start
//!
//! ```
//! use nalgebra::{DVector, Vector3};
//! use sim_core::{FirstOrderIntegrator, ImpulseBasedRobot, JointKind, RobotBuilder};
//! use sim_types::{BodyId, MassProperties, Pose};
//!
//! let mut builder = RobotBuilder::new("ball");
//! builder
//!     .add_body(
//!         BodyId::ROOT,
//!         "float",
//!         JointKind::Floating,
//!         Pose::identity(),
//!         "ball",
//!         MassProperties::sphere(1.0, 0.1),
//!     )
//!     .unwrap();
//! let mut robot = ImpulseBasedRobot::new(builder.build());
//!
//! let gravity = Vector3::new(0.0, 0.0, -9.81);
//! robot.do_forward_dynamics(&gravity);
//! robot.write_joint_accelerations(0.001);
//! robot.integrate_state(0.001);
//!
//! assert!(robot.robot().velocities()[5] < 0.0);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-core/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::many_single_char_names,    // Featherstone notation: U, D, u, p
)]

pub mod collision;
pub mod constraint;
pub mod dynamics;
pub mod integrators;
pub mod multibody;
pub mod pool;
pub mod registry;
mod robot;
mod sensors;

pub use collision::{
    Collidable, CollisionDetector, CollisionResult, CollisionShape, ContactBody,
    SimpleCollisionDetection,
};
pub use constraint::{
    ConstraintTarget, DeltaTwistRegistry, ImpulseBasedConstraintCalculator, TwistCoupling,
};
pub use dynamics::{ForwardDynamicsCalculator, ImpulseResponse, SpatialVector};
pub use integrators::FirstOrderIntegrator;
pub use multibody::{Joint, JointKind, JointPosition, OneDofJoint, RigidBody, Robot, RobotBuilder};
pub use pool::{CalculatorPool, PoolHandle};
pub use registry::{RigidBodyImpulseRegistry, RigidBodyWrenchRegistry};
pub use robot::{ExternalWrenchPoint, ImpulseBasedRobot, RobotStateSnapshot};
pub use sensors::ImuSensor;

// Re-export key types from sim-types for convenience
pub use sim_types::{
    BodyId, Gravity, JointId, JointLimits, JointType, MassProperties, Pose, RobotId, SimError,
    SimulationConfig, SolverConfig, Twist,
};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    fn pendulum() -> ImpulseBasedRobot {
        let mut builder = RobotBuilder::new("pendulum");
        builder
            .add_body(
                BodyId::ROOT,
                "hinge",
                JointKind::revolute(Vector3::y()),
                Pose::identity(),
                "bob",
                MassProperties::sphere(1.0, 0.05).with_center_of_mass(Vector3::new(0.0, 0.0, -1.0)),
            )
            .unwrap();
        let mut robot = builder.build();
        robot
            .set_joint_position(JointId::new(0), JointPosition::OneDof(0.5))
            .unwrap();
        ImpulseBasedRobot::new(robot)
    }

    fn total_energy(robot: &ImpulseBasedRobot, g: f64) -> f64 {
        let com = robot.robot().body_center_of_mass(BodyId::new(1));
        robot.robot().kinetic_energy() + g * com.z
    }

    #[test]
    fn test_free_fall_matches_closed_form() {
        let mut builder = RobotBuilder::new("ball");
        builder
            .add_body(
                BodyId::ROOT,
                "float",
                JointKind::Floating,
                Pose::identity(),
                "ball",
                MassProperties::sphere(2.0, 0.1),
            )
            .unwrap();
        let mut robot = ImpulseBasedRobot::new(builder.build());
        let gravity = Vector3::new(0.0, 0.0, -9.81);
        let dt = 0.001;

        for _ in 0..1000 {
            robot.reset_calculators();
            robot.do_forward_dynamics(&gravity);
            robot.write_joint_accelerations(dt);
            robot.integrate_state(dt);
            robot.update_frames();
        }

        let position = robot.robot().body_pose(BodyId::new(1)).position;
        assert_relative_eq!(position, Point3::new(0.0, 0.0, -0.5 * 9.81), epsilon = 1e-9);
    }

    #[test]
    fn test_pendulum_energy_drift_is_small() {
        let mut robot = pendulum();
        let gravity = Vector3::new(0.0, 0.0, -9.81);
        let dt = 1e-4;
        let initial = total_energy(&robot, 9.81);

        for _ in 0..5000 {
            robot.reset_calculators();
            robot.do_forward_dynamics(&gravity);
            robot.write_joint_accelerations(dt);
            robot.integrate_state(dt);
            robot.update_frames();
        }

        let drift = (total_energy(&robot, 9.81) - initial).abs();
        assert!(drift < 1e-2, "energy drift {drift}");
    }
}
