//! Robot builders shared by the end-to-end tests.
//!
//! # Tolerances
//!
//! ```text
//! EXACT_TOL = 1e-9  ── quantities an impulse sets directly (contact velocity)
//! DRIFT_TOL = 1e-3  ── quantities accumulated over many ticks (velocity after 1 s)
//! ```

#![allow(dead_code, clippy::unwrap_used)]

use sim_physics::prelude::*;

/// Tick length of every scenario.
pub const DT: f64 = 0.001;

/// Standard gravity on -Z.
pub const G: f64 = 9.81;

/// Velocities an impulse sets directly.
pub const EXACT_TOL: f64 = 1e-9;

/// Quantities accumulated over many ticks.
pub const DRIFT_TOL: f64 = 1e-3;

/// Engine with the default configuration.
pub fn engine() -> ImpulseBasedPhysicsEngine {
    ImpulseBasedPhysicsEngine::new(SimulationConfig::with_timestep(DT)).unwrap()
}

/// Engine without gravity.
pub fn zero_gravity_engine() -> ImpulseBasedPhysicsEngine {
    ImpulseBasedPhysicsEngine::new(SimulationConfig::with_timestep(DT).zero_gravity()).unwrap()
}

/// Run the initializing first call, so that every following `step` is a
/// physics tick.
pub fn start(engine: &mut ImpulseBasedPhysicsEngine) {
    let gravity = engine.config().gravity.acceleration;
    assert!(engine.initialize(&gravity));
}

/// Free-floating body with the given mass properties at `position`.
pub fn floating(name: &str, mass: MassProperties, position: Point3<f64>) -> ImpulseBasedRobot {
    let mut builder = RobotBuilder::new(name);
    builder
        .add_body(
            BodyId::ROOT,
            "float",
            JointKind::Floating,
            Pose::identity(),
            name,
            mass,
        )
        .unwrap();
    let mut robot = builder.build();
    robot
        .set_joint_position(JointId::new(0), JointPosition::Floating(Pose::from_position(position)))
        .unwrap();
    ImpulseBasedRobot::new(robot)
}

/// Free sphere of unit mass with a matching collidable.
pub fn ball(radius: f64, position: Point3<f64>) -> ImpulseBasedRobot {
    let mut robot = floating("ball", MassProperties::sphere(1.0, radius), position);
    robot
        .add_collidable(Collidable::attached(
            "ball",
            BodyId::new(1),
            CollisionShape::sphere(radius),
            Pose::identity(),
        ))
        .unwrap();
    robot
}

/// Unit-mass sphere of radius 0.1 sliding along X on a prismatic joint
/// anchored at `anchor_x`.
pub fn slider(anchor_x: f64) -> ImpulseBasedRobot {
    let mut builder = RobotBuilder::new("slider");
    let body = builder
        .add_body(
            BodyId::ROOT,
            "rail",
            JointKind::prismatic(Vector3::x()),
            Pose::from_position(Point3::new(anchor_x, 0.0, 0.0)),
            "puck",
            MassProperties::sphere(1.0, 0.1),
        )
        .unwrap();
    let mut robot = ImpulseBasedRobot::new(builder.build());
    robot
        .add_collidable(Collidable::attached(
            "puck",
            body,
            CollisionShape::sphere(0.1),
            Pose::identity(),
        ))
        .unwrap();
    robot
}

/// One-meter pendulum hinged about Y at (0, 0, 1) with a unit point mass
/// and a sphere of radius 0.1 at its tip.
///
/// At angle 0 the tip hangs at the origin; a positive angle swings it toward -X.
pub fn pendulum(angle: f64, limits: Option<(f64, f64)>) -> ImpulseBasedRobot {
    let mut joint = OneDofJoint::new(Vector3::y());
    if let Some((lower, upper)) = limits {
        joint = joint.with_position_limits(lower, upper);
    }
    let mut builder = RobotBuilder::new("pendulum");
    let body = builder
        .add_body(
            BodyId::ROOT,
            "hinge",
            JointKind::Revolute(joint),
            Pose::from_position(Point3::new(0.0, 0.0, 1.0)),
            "rod",
            MassProperties::sphere(1.0, 0.05).with_center_of_mass(Vector3::new(0.0, 0.0, -1.0)),
        )
        .unwrap();
    let mut robot = builder.build();
    robot
        .set_joint_position(JointId::new(0), JointPosition::OneDof(angle))
        .unwrap();
    let mut robot = ImpulseBasedRobot::new(robot);
    robot
        .add_collidable(Collidable::attached(
            "tip",
            body,
            CollisionShape::sphere(0.1),
            Pose::from_position(Point3::new(0.0, 0.0, -1.0)),
        ))
        .unwrap();
    robot
}

/// Set every joint velocity of a robot.
pub fn set_velocities(robot: &mut ImpulseBasedRobot, velocities: &[f64]) {
    let qd = robot.robot_mut().velocities_mut();
    for (target, &value) in qd.iter_mut().zip(velocities) {
        *target = value;
    }
}

/// World linear velocity of a body's origin.
pub fn point_velocity(robot: &ImpulseBasedRobot, body: BodyId, point: &Point3<f64>) -> Vector3<f64> {
    sim_physics::sim_core::dynamics::spatial::velocity_at_point(&robot.robot().body_velocity(body), point)
}

/// Relative velocity along the normal of a collision, evaluated on the
/// current state. Negative means closing.
pub fn normal_velocity(engine: &ImpulseBasedPhysicsEngine, collision: &CollisionResult) -> f64 {
    let a = collision.body_a;
    let robot_a = engine.robot(a.robot).unwrap();
    let velocity_a = point_velocity(robot_a, a.body, &collision.point_on_a);
    let velocity_b = collision.body_b.map_or_else(Vector3::zeros, |b| {
        point_velocity(engine.robot(b.robot).unwrap(), b.body, &collision.point_on_b)
    });
    (velocity_a - velocity_b).dot(&collision.normal)
}
