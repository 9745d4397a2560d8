//! Impulse-based physics engine for articulated robots.
//!
//! This crate ties the simulation stack together:
//!
//! - [`sim_types`] - ids, poses, mass properties, configuration, errors
//! - [`sim_core`] - multibody trees, forward dynamics, collision detection, integration
//! - [`sim_contact`] - single-contact impulses with Coulomb friction
//! - [`sim_constraint`] - joint limits, collision groups and the multi-contact solver
//!
//! and adds the [`ImpulseBasedPhysicsEngine`] that runs them every tick.
//!
//! # Quick Start
//!
//! ```
//! use sim_physics::prelude::*;
//!
//! // A free ball one meter above the ground.
//! let mut builder = RobotBuilder::new("ball");
//! let body = builder
//!     .add_body(
//!         BodyId::ROOT,
//!         "float",
//!         JointKind::Floating,
//!         Pose::identity(),
//!         "ball",
//!         MassProperties::sphere(1.0, 0.1),
//!     )
//!     .unwrap();
//! let mut robot = builder.build();
//! robot
//!     .set_joint_position(
//!         JointId::new(0),
//!         JointPosition::Floating(Pose::from_position(Point3::new(0.0, 0.0, 1.0))),
//!     )
//!     .unwrap();
//! let mut robot = ImpulseBasedRobot::new(robot);
//! robot
//!     .add_collidable(Collidable::attached("ball", body, CollisionShape::sphere(0.1), Pose::identity()))
//!     .unwrap();
//!
//! let mut engine = ImpulseBasedPhysicsEngine::new(SimulationConfig::default()).unwrap();
//! let id = engine.add_robot(robot).unwrap();
//! engine.add_environment_collidable(Collidable::ground(0.0));
//!
//! for _ in 0..100 {
//!     engine.step().unwrap();
//! }
//!
//! let height = engine.robot(id).unwrap().robot().body_pose(body).position.z;
//! assert!(height < 1.0);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-physics/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn, clippy::suboptimal_flops)]

mod controller;
mod engine;
mod parameters;
mod telemetry;

pub use controller::{ControllerManager, RobotController};
pub use engine::{EngineState, ImpulseBasedPhysicsEngine};
pub use parameters::{ContactParameterTable, ContactPartner};
pub use telemetry::PhysicsEngineTimers;

// Re-export the layers
pub use sim_constraint;
pub use sim_contact;
pub use sim_core;
pub use sim_types;

/// Everything needed to build robots and run the engine.
pub mod prelude {
    pub use crate::{
        ContactParameterTable, ControllerManager, EngineState, ImpulseBasedPhysicsEngine,
        PhysicsEngineTimers, RobotController,
    };

    pub use sim_constraint::{
        CollisionGrouping, ConstraintParameters, MultiContactImpulseCalculator,
        MultiContactStep, MultiRobotCollisionGroup, RobotJointLimitImpulseBasedCalculator,
    };
    pub use sim_contact::{ContactParameters, FrictionCone, SingleContactImpulseCalculator};
    pub use sim_core::{
        Collidable, CollisionDetector, CollisionResult, CollisionShape, ContactBody,
        ExternalWrenchPoint, ImpulseBasedRobot, ImuSensor, JointKind, JointPosition, OneDofJoint,
        Robot, RobotBuilder, SimpleCollisionDetection,
    };
    pub use sim_types::{
        BodyId, Gravity, JointId, JointLimits, MassProperties, Pose, RobotId, SimError,
        SimulationConfig, SolverConfig,
    };

    pub use nalgebra::{DVector, Point3, UnitQuaternion, Vector3};
}
