//! First-order integration of a robot's joint state.
//!
//! The integrator combines the unconstrained acceleration `q̈` from forward
//! dynamics with the velocity change `Δq̇` produced by impulses:
//!
//! ```text
//! q̇(t+dt) = q̇ + dt q̈ + Δq̇
//! q(t+dt) = q + dt (q̇ + Δq̇/2) + dt² q̈/2
//! ```
//!
//! Orientations are advanced by composing the exponential of the rotation
//! vector `dt ω + dt Δω/2 + dt² α/2` onto the current orientation.
//!
//! # Example
//!
//! ```
//! use nalgebra::{DVector, Vector3};
//! use sim_core::integrators::FirstOrderIntegrator;
//! use sim_core::multibody::{JointKind, JointPosition, RobotBuilder};
//! use sim_types::{BodyId, JointId, MassProperties, Pose};
//!
//! let mut builder = RobotBuilder::new("slider");
//! builder
//!     .add_body(
//!         BodyId::ROOT,
//!         "rail",
//!         JointKind::prismatic(Vector3::x()),
//!         Pose::identity(),
//!         "cart",
//!         MassProperties::sphere(1.0, 0.1),
//!     )
//!     .unwrap();
//! let mut robot = builder.build();
//! robot.set_joint_velocity(JointId::new(0), &[1.0]).unwrap();
//!
//! FirstOrderIntegrator::integrate(&mut robot, &DVector::zeros(1), 0.5);
//!
//! assert_eq!(robot.joints()[0].position(), &JointPosition::OneDof(0.5));
//! ```

use nalgebra::{DVector, UnitQuaternion, Vector3};
use sim_types::{JointId, Pose};

use crate::multibody::{JointKind, JointPosition, Robot};

/// Largest velocity dimension of a single joint.
const MAX_JOINT_DOF: usize = 6;

/// First-order integrator over the whole tree.
pub struct FirstOrderIntegrator;

impl FirstOrderIntegrator {
    /// Advance every unpinned joint by `dt`.
    ///
    /// `velocity_change` is indexed like the robot velocity vector.
    pub fn integrate(robot: &mut Robot, velocity_change: &DVector<f64>, dt: f64) {
        for index in 0..robot.joints().len() {
            let joint = &robot.joints()[index];
            if joint.pinned {
                continue;
            }
            let offset = joint.dof_offset;
            let dof = joint.dof();
            let kind = joint.kind.clone();
            let position = *joint.position();

            let mut qd = [0.0; MAX_JOINT_DOF];
            let mut qdd = [0.0; MAX_JOINT_DOF];
            let mut dqd = [0.0; MAX_JOINT_DOF];
            qd[..dof].copy_from_slice(&robot.velocities().as_slice()[offset..offset + dof]);
            qdd[..dof].copy_from_slice(&robot.accelerations().as_slice()[offset..offset + dof]);
            for (k, slot) in dqd[..dof].iter_mut().enumerate() {
                *slot = velocity_change.get(offset + k).copied().unwrap_or(0.0);
            }

            let new_position = match (&kind, position) {
                (JointKind::Revolute(_) | JointKind::Prismatic(_), JointPosition::OneDof(q)) => {
                    JointPosition::OneDof(integrate_scalar(q, &mut qd[0], qdd[0], dqd[0], dt))
                }
                (JointKind::Planar, JointPosition::Planar { pitch, x, z }) => {
                    JointPosition::Planar {
                        pitch: integrate_scalar(pitch, &mut qd[0], qdd[0], dqd[0], dt),
                        x: integrate_scalar(x, &mut qd[1], qdd[1], dqd[1], dt),
                        z: integrate_scalar(z, &mut qd[2], qdd[2], dqd[2], dt),
                    }
                }
                (JointKind::Spherical, JointPosition::Spherical(rotation)) => {
                    let (omega, alpha, d_omega) = (vec3(&qd, 0), vec3(&qdd, 0), vec3(&dqd, 0));
                    let (rotation, omega) = integrate_rotation(rotation, omega, alpha, d_omega, dt);
                    qd[..3].copy_from_slice(omega.as_slice());
                    JointPosition::Spherical(rotation)
                }
                (JointKind::Floating, JointPosition::Floating(pose)) => {
                    let (pose, velocity, acceleration) = integrate_floating(
                        &pose,
                        [vec3(&qd, 0), vec3(&qd, 3)],
                        [vec3(&qdd, 0), vec3(&qdd, 3)],
                        [vec3(&dqd, 0), vec3(&dqd, 3)],
                        dt,
                    );
                    qd[..3].copy_from_slice(velocity[0].as_slice());
                    qd[3..6].copy_from_slice(velocity[1].as_slice());
                    qdd[3..6].copy_from_slice(acceleration.as_slice());
                    JointPosition::Floating(pose)
                }
                (_, position) => position,
            };

            if let Some(slot) = robot.joint_position_mut(JointId(index)) {
                *slot = new_position;
            }
            robot.velocities_mut().rows_mut(offset, dof).copy_from_slice(&qd[..dof]);
            robot.accelerations_mut().rows_mut(offset, dof).copy_from_slice(&qdd[..dof]);
        }
    }
}

fn vec3(values: &[f64], start: usize) -> Vector3<f64> {
    Vector3::new(values[start], values[start + 1], values[start + 2])
}

/// Returns the new position and updates `qd` in place.
fn integrate_scalar(q: f64, qd: &mut f64, qdd: f64, dqd: f64, dt: f64) -> f64 {
    let q_new = q + (*qd + 0.5 * dqd) * dt + 0.5 * qdd * dt * dt;
    *qd += dt * qdd + dqd;
    q_new
}

fn rotation_vector(
    omega: &Vector3<f64>,
    alpha: &Vector3<f64>,
    d_omega: &Vector3<f64>,
    dt: f64,
) -> Vector3<f64> {
    omega * dt + d_omega * (0.5 * dt) + alpha * (0.5 * dt * dt)
}

/// Body-frame angular velocity integration.
fn integrate_rotation(
    rotation: UnitQuaternion<f64>,
    omega: Vector3<f64>,
    alpha: Vector3<f64>,
    d_omega: Vector3<f64>,
    dt: f64,
) -> (UnitQuaternion<f64>, Vector3<f64>) {
    let delta = UnitQuaternion::from_scaled_axis(rotation_vector(&omega, &alpha, &d_omega, dt));
    let mut rotation = rotation * delta;
    rotation.renormalize();
    (rotation, omega + alpha * dt + d_omega)
}

/// Floating joint: `[ω; v]` is the body-frame twist of the child origin.
///
/// The linear part is integrated with the classical acceleration
/// `v̇ + ω × v`, then re-expressed in the rotated body frame. Returns the new
/// pose, the new `[ω; v]` and the new `v̇`.
fn integrate_floating(
    pose: &Pose,
    velocity: [Vector3<f64>; 2],
    acceleration: [Vector3<f64>; 2],
    velocity_change: [Vector3<f64>; 2],
    dt: f64,
) -> (Pose, [Vector3<f64>; 2], Vector3<f64>) {
    let [omega, v] = velocity;
    let [alpha, v_dot] = acceleration;
    let [d_omega, d_v] = velocity_change;

    let linear_acceleration = v_dot + omega.cross(&v);
    let delta_rotation =
        UnitQuaternion::from_scaled_axis(rotation_vector(&omega, &alpha, &d_omega, dt));

    let delta_position = v * dt + d_v * (0.5 * dt) + linear_acceleration * (0.5 * dt * dt);
    let position = pose.position + pose.rotation * delta_position;

    let omega_new = omega + alpha * dt + d_omega;
    let v_new = delta_rotation.inverse_transform_vector(&(v + linear_acceleration * dt + d_v));
    let linear_acceleration = delta_rotation.inverse_transform_vector(&linear_acceleration);
    let v_dot_new = linear_acceleration - omega_new.cross(&v_new);

    let mut rotation = pose.rotation * delta_rotation;
    rotation.renormalize();

    (
        Pose::from_position_rotation(position, rotation),
        [omega_new, v_new],
        v_dot_new,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::multibody::RobotBuilder;
    use approx::assert_relative_eq;
    use sim_types::{BodyId, MassProperties};

    fn single(kind: JointKind) -> Robot {
        let mut builder = RobotBuilder::new("r");
        builder
            .add_body(
                BodyId::ROOT,
                "j",
                kind,
                Pose::identity(),
                "b",
                MassProperties::sphere(1.0, 0.1),
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_one_dof_constant_acceleration_is_exact() {
        let mut robot = single(JointKind::revolute(Vector3::z()));
        robot.set_joint_velocity(JointId::new(0), &[1.0]).unwrap();
        robot.accelerations_mut()[0] = 2.0;

        FirstOrderIntegrator::integrate(&mut robot, &DVector::zeros(1), 0.1);

        assert_relative_eq!(robot.joints()[0].position().as_scalar().unwrap(), 0.11, epsilon = 1e-12);
        assert_relative_eq!(robot.velocities()[0], 1.2, epsilon = 1e-12);
    }

    #[test]
    fn test_velocity_change_counts_half_in_position() {
        let mut robot = single(JointKind::prismatic(Vector3::x()));
        let change = DVector::from_element(1, 2.0);
        FirstOrderIntegrator::integrate(&mut robot, &change, 0.5);

        assert_relative_eq!(robot.joints()[0].position().as_scalar().unwrap(), 0.5);
        assert_relative_eq!(robot.velocities()[0], 2.0);
    }

    #[test]
    fn test_pinned_joint_untouched() {
        let mut robot = single(JointKind::revolute(Vector3::z()));
        robot.set_joint_pinned(JointId::new(0), true).unwrap();
        FirstOrderIntegrator::integrate(&mut robot, &DVector::from_element(1, 1.0), 0.1);
        assert_eq!(robot.joints()[0].position(), &JointPosition::OneDof(0.0));
    }

    #[test]
    fn test_spherical_rotation_stays_unit() {
        let mut robot = single(JointKind::Spherical);
        robot.set_joint_velocity(JointId::new(0), &[0.0, 0.0, 2.0]).unwrap();
        for _ in 0..1000 {
            FirstOrderIntegrator::integrate(&mut robot, &DVector::zeros(3), 0.001);
        }
        let JointPosition::Spherical(rotation) = robot.joints()[0].position() else {
            panic!("expected a spherical position");
        };
        assert_relative_eq!(rotation.quaternion().norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(rotation.angle(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_floating_spin_keeps_world_velocity() {
        let mut robot = single(JointKind::Floating);
        robot
            .set_joint_velocity(JointId::new(0), &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0])
            .unwrap();
        robot.update_frames();
        let before = robot.body_twist(BodyId::new(1)).linear;

        // Torque-free spin: the body-frame velocity rotates, the world velocity does not.
        let v_dot = -Vector3::new(0.0, 0.0, 1.0).cross(&Vector3::x());
        robot.accelerations_mut().rows_mut(3, 3).copy_from(&v_dot);
        for _ in 0..100 {
            FirstOrderIntegrator::integrate(&mut robot, &DVector::zeros(6), 0.01);
        }
        robot.update_frames();

        let after = robot.body_twist(BodyId::new(1)).linear;
        assert_relative_eq!(after, before, epsilon = 1e-12);
        let JointPosition::Floating(pose) = robot.joints()[0].position() else {
            panic!("expected a floating position");
        };
        assert_relative_eq!(pose.position.x, 1.0, epsilon = 1e-12);
    }
}
