//! Joint limits, alone and inside collision groups.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

mod common;

use common::{DRIFT_TOL, EXACT_TOL};
use sim_physics::prelude::*;

fn angle(engine: &ImpulseBasedPhysicsEngine, id: RobotId) -> f64 {
    engine.robot(id).unwrap().robot().joints()[0]
        .position()
        .as_scalar()
        .unwrap()
}

fn rate(engine: &ImpulseBasedPhysicsEngine, id: RobotId) -> f64 {
    engine.robot(id).unwrap().robot().velocities()[0]
}

// ============================================================================
// Standalone limits
// ============================================================================

/// A pendulum released at 0.5 rad falls onto its lower limit at 0.3 rad.
///
/// Configuration:
/// - Gravity -9.81 on Z, no collidables in the environment
/// - Expected: the joint never passes the limit by more than half a tick of
///   travel, and comes to rest on it
#[test]
fn pendulum_stops_on_lower_limit() {
    let mut engine = common::engine();
    let id = engine.add_robot(common::pendulum(0.5, Some((0.3, 1.0)))).unwrap();

    for _ in 0..2000 {
        engine.step().unwrap();
        assert!(engine.collisions().is_empty());
        assert!(angle(&engine, id) > 0.3 - DRIFT_TOL);
    }

    assert!(rate(&engine, id).abs() < EXACT_TOL);
    assert!((angle(&engine, id) - 0.3).abs() < DRIFT_TOL);
}

/// A bouncing limit sends the pendulum back up.
#[test]
fn restitution_bounces_off_limit() {
    let mut engine = common::engine();
    engine
        .set_constraint_parameters(ConstraintParameters::default().with_restitution(0.5))
        .unwrap();
    let id = engine.add_robot(common::pendulum(0.5, Some((0.3, 1.0)))).unwrap();

    let mut bounced = false;
    for _ in 0..1000 {
        let before = rate(&engine, id);
        engine.step().unwrap();
        if before < -0.5 && rate(&engine, id) > 0.0 {
            bounced = true;
            break;
        }
    }
    assert!(bounced);
}

// ============================================================================
// Limits inside collision groups
// ============================================================================

/// A hanging pendulum whose tip touches the ground has no active limit, so its
/// limit calculator is dropped from the group solver.
#[test]
fn inactive_limit_is_filtered_from_group() {
    let mut engine = common::engine();
    engine.add_robot(common::pendulum(0.0, Some((-1.0, 1.0)))).unwrap();
    engine.add_environment_collidable(Collidable::ground(-0.1));
    common::start(&mut engine);
    engine.step().unwrap();

    assert_eq!(engine.collisions().len(), 1);
    let solver = &engine.multi_contact_calculators()[0];
    assert_eq!(solver.calculator_count(), 1);
    assert_eq!(solver.joint_limit_calculators().count(), 0);
}

/// Known approximation: limits are detected from the unconstrained
/// prediction only, so a contact that pushes a joint toward its limit within
/// the same tick does not re-activate a dropped limit calculator. The limit
/// catches the joint on a following tick instead.
///
/// Configuration:
/// - No gravity; pendulum at 0.01 rad with its lower limit at 0
/// - A puck coming from -X at 1 m/s strikes the tip toward the limit
#[test]
fn contact_pushing_into_limit_is_caught_next_tick() {
    let mut engine = common::zero_gravity_engine();
    let pendulum = engine
        .add_robot(common::pendulum(0.01, Some((0.0, 1.0))))
        .unwrap();
    let tip_x = -(0.01_f64).sin();
    let mut puck = common::slider(tip_x - 0.205);
    common::set_velocities(&mut puck, &[1.0]);
    let puck = engine.add_robot(puck).unwrap();

    let mut impact = false;
    for _ in 0..50 {
        engine.step().unwrap();
        if !engine.collisions().is_empty() {
            impact = true;
            let solver = &engine.multi_contact_calculators()[0];
            assert_eq!(solver.joint_limit_calculators().count(), 0);
            // Pushed toward the limit during the impact tick.
            assert!(rate(&engine, pendulum) < 0.0);
            break;
        }
    }
    assert!(impact);

    for _ in 0..300 {
        engine.step().unwrap();
        assert!(angle(&engine, pendulum) > -DRIFT_TOL);
    }
    assert!(rate(&engine, pendulum).abs() < DRIFT_TOL);
    assert!(rate(&engine, puck).abs() < DRIFT_TOL);
}
