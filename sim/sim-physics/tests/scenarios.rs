//! End-to-end scenarios: free fall, resting contact, colliding robots.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

mod common;

use common::{DRIFT_TOL, DT, EXACT_TOL, G};
use sim_physics::prelude::*;

// ============================================================================
// Free fall
// ============================================================================

/// A unit-mass, unit-inertia body falls for one second.
///
/// Configuration:
/// - No collidables, no environment
/// - Gravity -9.81 on Z, dt = 0.001, 1000 ticks
/// - Expected: vz = -9.81 ± 1e-3 and no contact solver ever built
#[test]
fn free_fall_reaches_g_after_one_second() {
    let unit = MassProperties::new(1.0, Vector3::zeros(), nalgebra::Matrix3::identity());
    let mut engine = common::engine();
    let id = engine
        .add_robot(common::floating("body", unit, Point3::new(0.0, 0.0, 10.0)))
        .unwrap();
    common::start(&mut engine);

    for _ in 0..1000 {
        engine.step().unwrap();
        assert!(engine.collisions().is_empty());
        assert!(engine.multi_contact_calculators().is_empty());
    }

    let robot = engine.robot(id).unwrap().robot();
    assert!((robot.velocities()[5] + G).abs() < DRIFT_TOL);
    assert!((engine.time() - 1.0).abs() < 1e-9);

    // z = 10 - g t² / 2, up to the first-order integration error.
    let z = robot.body_pose(BodyId::new(1)).position.z;
    assert!((z - (10.0 - 0.5 * G)).abs() < 1e-2);
}

// ============================================================================
// Resting contact
// ============================================================================

/// A ball resting exactly on the ground stays at rest.
///
/// Configuration:
/// - Sphere radius 0.1, center at z = 0.1, zero velocity
/// - Ground plane at z = 0, default contact parameters
/// - Expected: vz ≈ 0 every tick, no sinking beyond the contact threshold
#[test]
fn ball_rests_on_plane() {
    let mut engine = common::engine();
    let id = engine
        .add_robot(common::ball(0.1, Point3::new(0.0, 0.0, 0.1)))
        .unwrap();
    engine.add_environment_collidable(Collidable::ground(0.0));
    common::start(&mut engine);
    let threshold = engine.contact_parameters().default_parameters().minimum_penetration;

    for _ in 0..500 {
        engine.step().unwrap();
        assert_eq!(engine.collisions().len(), 1);

        let robot = engine.robot(id).unwrap().robot();
        assert!(robot.velocities()[5].abs() < EXACT_TOL);
        let z = robot.body_pose(BodyId::new(1)).position.z;
        assert!(z > 0.1 - threshold);
    }
}

/// A box resting on the ground is held by its four bottom corners.
///
/// Configuration:
/// - Box half extents 0.1, center at z = 0.1
/// - Four corner contacts solved together by the SOR solver
/// - Expected: no sinking and no measurable vertical drift
#[test]
fn box_rests_on_four_corners() {
    let half = Vector3::new(0.1, 0.1, 0.1);
    let mut robot = common::floating(
        "box",
        MassProperties::box_shape(1.0, half),
        Point3::new(0.0, 0.0, 0.1),
    );
    robot
        .add_collidable(Collidable::attached(
            "box",
            BodyId::new(1),
            CollisionShape::box_shape(half),
            Pose::identity(),
        ))
        .unwrap();

    let mut engine = common::engine();
    let id = engine.add_robot(robot).unwrap();
    engine.add_environment_collidable(Collidable::ground(0.0));
    common::start(&mut engine);

    for _ in 0..200 {
        engine.step().unwrap();
    }

    assert_eq!(engine.collisions().len(), 4);
    let solver = &engine.multi_contact_calculators()[0];
    assert_eq!(solver.contact_calculators().count(), 4);

    let robot = engine.robot(id).unwrap().robot();
    assert!(robot.velocities()[5].abs() < DRIFT_TOL);
    let z = robot.body_pose(BodyId::new(1)).position.z;
    assert!((z - 0.1).abs() < DRIFT_TOL);
}

/// Two balls stacked on the ground, each its own robot.
///
/// Configuration:
/// - Unit-mass spheres of radius 0.1 at z = 0.1 and z = 0.3
/// - Ground plane at z = 0, default contact parameters
/// - Expected: both contacts stop closing every tick, and neither ball sinks
#[test]
fn stacked_balls_do_not_sink() {
    let mut engine = common::engine();
    let lower = engine
        .add_robot(common::ball(0.1, Point3::new(0.0, 0.0, 0.1)))
        .unwrap();
    let upper = engine
        .add_robot(common::ball(0.1, Point3::new(0.0, 0.0, 0.3)))
        .unwrap();
    engine.add_environment_collidable(Collidable::ground(0.0));
    common::start(&mut engine);

    for _ in 0..500 {
        engine.step().unwrap();
        assert_eq!(engine.collisions().len(), 2);
        assert_eq!(engine.multi_contact_calculators().len(), 1);
        for collision in engine.collisions() {
            assert!(common::normal_velocity(&engine, collision) > -1e-5);
        }
    }

    let height = |id| engine.robot(id).unwrap().robot().body_pose(BodyId::new(1)).position.z;
    assert!((height(lower) - 0.1).abs() < 1e-4);
    assert!((height(upper) - 0.3).abs() < 1e-4);
}

// ============================================================================
// Two robots colliding
// ============================================================================

/// A pendulum swings into a puck on a rail.
///
/// Configuration:
/// - No gravity
/// - Pendulum tip (radius 0.1) at the origin moving +X at 1 m/s
/// - Puck (radius 0.1) at rest at x = 0.205, free to slide along X
/// - Expected: both robots in one collision group, and after the impulse the
///   contact is no longer closing
#[test]
fn pendulum_hits_puck() {
    let mut engine = common::zero_gravity_engine();
    let mut pendulum = common::pendulum(0.0, None);
    common::set_velocities(&mut pendulum, &[-1.0]);
    let pendulum = engine.add_robot(pendulum).unwrap();
    let puck = engine.add_robot(common::slider(0.205)).unwrap();

    let mut hit = false;
    for _ in 0..50 {
        engine.step().unwrap();
        if engine.collisions().is_empty() {
            continue;
        }
        hit = true;

        let groups = engine.collision_grouping().groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].robots, vec![pendulum, puck]);

        for collision in engine.collisions() {
            assert!(common::normal_velocity(&engine, collision) > -1e-6);
        }
        break;
    }
    assert!(hit, "the pendulum never reached the puck");

    // The puck was pushed away.
    let puck_velocity = engine.robot(puck).unwrap().robot().velocities()[0];
    assert!(puck_velocity > 0.1);
}
