//! Controllers, wrench points, IMUs and timers driven by the engine.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{EXACT_TOL, G};
use sim_physics::prelude::*;

struct ConstantEffort(f64);

impl RobotController for ConstantEffort {
    fn update(&mut self, _time: f64, _robot: &Robot, efforts: &mut DVector<f64>) {
        efforts[0] += self.0;
    }
}

struct PauseFlag(Rc<Cell<bool>>);

impl RobotController for PauseFlag {
    fn update(&mut self, _time: f64, _robot: &Robot, _efforts: &mut DVector<f64>) {}

    fn pause(&mut self) {
        self.0.set(true);
    }
}

// ============================================================================
// Controllers
// ============================================================================

/// A constant 2 N push on a 1 kg puck reaches 2 m/s after one second.
#[test]
fn controller_effort_drives_robot() {
    let mut engine = common::zero_gravity_engine();
    let id = engine.add_robot(common::slider(0.0)).unwrap();
    engine.add_controller(id, ConstantEffort(2.0)).unwrap();
    common::start(&mut engine);

    for _ in 0..1000 {
        engine.step().unwrap();
    }

    let robot = engine.robot(id).unwrap();
    assert!((robot.robot().velocities()[0] - 2.0).abs() < 1e-9);
    // The snapshot holds the efforts written before the physics.
    assert_eq!(robot.snapshot().efforts[0], 2.0);
    assert!((robot.snapshot().velocities[0] - 1.998).abs() < 1e-9);
}

/// Pausing the engine pauses the controllers.
#[test]
fn pause_reaches_controllers() {
    let paused = Rc::new(Cell::new(false));
    let mut engine = common::engine();
    let id = engine.add_robot(common::slider(0.0)).unwrap();
    engine.add_controller(id, PauseFlag(Rc::clone(&paused))).unwrap();

    engine.step().unwrap();
    engine.pause();
    assert!(paused.get());
    assert_eq!(engine.state(), EngineState::Paused);
}

// ============================================================================
// Wrench points
// ============================================================================

/// An upward force equal to the weight keeps a ball hovering.
#[test]
fn wrench_point_holds_ball() {
    let mut robot = common::ball(0.1, Point3::new(0.0, 0.0, 1.0));
    let index = robot
        .add_wrench_point(ExternalWrenchPoint::new("lift", BodyId::new(1), Vector3::zeros()))
        .unwrap();
    robot.wrench_points_mut()[index].force = Vector3::new(0.0, 0.0, G);

    let mut engine = common::engine();
    let id = engine.add_robot(robot).unwrap();
    for _ in 0..100 {
        engine.step().unwrap();
    }

    let robot = engine.robot(id).unwrap().robot();
    assert!(robot.velocities()[5].abs() < EXACT_TOL);
    assert!((robot.body_pose(BodyId::new(1)).position.z - 1.0).abs() < EXACT_TOL);
}

// ============================================================================
// Sensors
// ============================================================================

fn ball_with_imu(z: f64) -> ImpulseBasedRobot {
    let mut robot = common::ball(0.1, Point3::new(0.0, 0.0, z));
    robot
        .add_imu(ImuSensor::new("imu", BodyId::new(1), Pose::identity()))
        .unwrap();
    robot
}

/// A falling IMU measures no specific force.
#[test]
fn falling_imu_reads_zero() {
    let mut engine = common::engine();
    let id = engine.add_robot(ball_with_imu(1.0)).unwrap();
    for _ in 0..10 {
        engine.step().unwrap();
    }
    let imu = &engine.robot(id).unwrap().imus()[0];
    assert!(imu.linear_acceleration().norm() < 1e-9);
}

/// An IMU resting on the ground measures the support force, +g on Z.
#[test]
fn resting_imu_reads_support() {
    let mut engine = common::engine();
    let id = engine.add_robot(ball_with_imu(0.1)).unwrap();
    engine.add_environment_collidable(Collidable::ground(0.0));
    for _ in 0..10 {
        engine.step().unwrap();
    }
    let imu = &engine.robot(id).unwrap().imus()[0];
    let expected = Vector3::new(0.0, 0.0, G);
    assert!((imu.linear_acceleration() - expected).norm() < 1e-6);
}

/// Initialization fills the sensors before the first tick.
#[test]
fn initialize_fills_sensors() {
    let mut engine = common::engine();
    let id = engine.add_robot(ball_with_imu(1.0)).unwrap();
    assert!(engine.initialize(&Vector3::new(0.0, 0.0, -G)));
    let imu = &engine.robot(id).unwrap().imus()[0];
    assert!(imu.linear_acceleration().norm() < 1e-9);
    assert_eq!(imu.angular_velocity(), &Vector3::zeros());
}

// ============================================================================
// Telemetry
// ============================================================================

/// Stage timers partition the tick.
#[test]
fn timers_cover_the_tick() {
    let mut engine = common::engine();
    engine.add_robot(common::ball(0.1, Point3::new(0.0, 0.0, 0.1))).unwrap();
    engine.add_environment_collidable(Collidable::ground(0.0));
    common::start(&mut engine);
    engine.step().unwrap();

    let timers = engine.timers();
    let stages = timers.initial_phase
        + timers.detect_collisions
        + timers.configure_collision_handlers
        + timers.handle_collisions
        + timers.final_phase;
    assert!(timers.total >= stages);
    assert!(timers.real_time_rate > 0.0);
}
