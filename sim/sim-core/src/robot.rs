//! Per-robot physics state driven by the impulse-based engine.
//!
//! [`ImpulseBasedRobot`] bundles a [`Robot`] with everything the engine needs
//! across one tick: the forward-dynamics calculator and its external wrench
//! accumulator, collidables placed at their predicted poses, the joint
//! velocity change accumulated from constraint impulses, and sensors.

use nalgebra::{DVector, Point3, UnitQuaternion, Vector3};
use sim_types::{BodyId, JointId, Pose, Result, SimError};

use crate::collision::Collidable;
use crate::dynamics::spatial::{SpatialVector, angular_part, force_at_point, velocity_at_point};
use crate::dynamics::{ForwardDynamicsCalculator, ImpulseResponse};
use crate::integrators::FirstOrderIntegrator;
use crate::multibody::{JointPosition, Robot};
use crate::registry::RigidBodyImpulseRegistry;
use crate::sensors::ImuSensor;

/// A point on a body where an external wrench is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalWrenchPoint {
    /// Name for diagnostics.
    pub name: String,
    /// Body the point is attached to.
    pub body: BodyId,
    /// Position of the point in the body frame.
    pub offset: Vector3<f64>,
    /// Force applied at the point, world frame.
    pub force: Vector3<f64>,
    /// Free moment, world frame.
    pub moment: Vector3<f64>,
}

impl ExternalWrenchPoint {
    /// A point with no wrench applied.
    #[must_use]
    pub fn new(name: impl Into<String>, body: BodyId, offset: Vector3<f64>) -> Self {
        Self {
            name: name.into(),
            body,
            offset,
            force: Vector3::zeros(),
            moment: Vector3::zeros(),
        }
    }
}

/// Joint state saved before the physics of a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotStateSnapshot {
    /// Joint configurations, indexed by joint.
    pub positions: Vec<JointPosition>,
    /// Velocity coordinates.
    pub velocities: DVector<f64>,
    /// Effort coordinates, as written by the controllers.
    pub efforts: DVector<f64>,
}

/// A robot plus its per-tick physics state.
#[derive(Debug, Clone)]
pub struct ImpulseBasedRobot {
    robot: Robot,
    forward_dynamics: ForwardDynamicsCalculator,
    collidables: Vec<Collidable>,
    wrench_points: Vec<ExternalWrenchPoint>,
    imus: Vec<ImuSensor>,
    joint_velocity_change: DVector<f64>,
    impulses: RigidBodyImpulseRegistry,
    body_accelerations: Vec<SpatialVector>,
    snapshot: RobotStateSnapshot,
}

impl ImpulseBasedRobot {
    /// Wrap a robot.
    #[must_use]
    pub fn new(mut robot: Robot) -> Self {
        robot.update_frames();
        let forward_dynamics = ForwardDynamicsCalculator::new(&robot);
        let dof = robot.dof();
        let bodies = robot.body_count();
        Self {
            forward_dynamics,
            collidables: Vec::new(),
            wrench_points: Vec::new(),
            imus: Vec::new(),
            joint_velocity_change: DVector::zeros(dof),
            impulses: RigidBodyImpulseRegistry::new(bodies),
            body_accelerations: vec![SpatialVector::zeros(); bodies],
            snapshot: RobotStateSnapshot::default(),
            robot,
        }
    }

    fn check_body(&self, body: BodyId) -> Result<()> {
        if body.0 < self.robot.body_count() {
            Ok(())
        } else {
            Err(SimError::InvalidBodyId(body.0))
        }
    }

    /// Attach a collidable. Environment collidables are rejected.
    pub fn add_collidable(&mut self, mut collidable: Collidable) -> Result<()> {
        let body = collidable.body().ok_or_else(|| {
            SimError::invalid_config(format!(
                "collidable {} is not attached to a body",
                collidable.name
            ))
        })?;
        self.check_body(body)?;
        collidable.update(&self.robot.body_pose(body));
        self.collidables.push(collidable);
        Ok(())
    }

    /// Add an external wrench point. Returns its index.
    pub fn add_wrench_point(&mut self, point: ExternalWrenchPoint) -> Result<usize> {
        self.check_body(point.body)?;
        self.wrench_points.push(point);
        Ok(self.wrench_points.len() - 1)
    }

    /// Add an IMU. Returns its index.
    pub fn add_imu(&mut self, imu: ImuSensor) -> Result<usize> {
        self.check_body(imu.body)?;
        self.imus.push(imu);
        Ok(self.imus.len() - 1)
    }

    /// The underlying robot.
    #[must_use]
    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    /// Mutable access to the underlying robot.
    pub fn robot_mut(&mut self) -> &mut Robot {
        &mut self.robot
    }

    /// Forward dynamics from the last pass.
    #[must_use]
    pub fn forward_dynamics(&self) -> &ForwardDynamicsCalculator {
        &self.forward_dynamics
    }

    /// Collidables attached to the robot.
    #[must_use]
    pub fn collidables(&self) -> &[Collidable] {
        &self.collidables
    }

    /// External wrench points.
    #[must_use]
    pub fn wrench_points(&self) -> &[ExternalWrenchPoint] {
        &self.wrench_points
    }

    /// Mutable external wrench points.
    pub fn wrench_points_mut(&mut self) -> &mut [ExternalWrenchPoint] {
        &mut self.wrench_points
    }

    /// IMUs.
    #[must_use]
    pub fn imus(&self) -> &[ImuSensor] {
        &self.imus
    }

    /// Joint velocity change accumulated from constraint impulses this tick.
    #[must_use]
    pub fn joint_velocity_change(&self) -> &DVector<f64> {
        &self.joint_velocity_change
    }

    /// Impulses applied to the bodies this tick.
    #[must_use]
    pub fn impulses(&self) -> &RigidBodyImpulseRegistry {
        &self.impulses
    }

    /// Mutable impulse registry.
    pub fn impulses_mut(&mut self) -> &mut RigidBodyImpulseRegistry {
        &mut self.impulses
    }

    /// State saved before the physics of the last tick.
    #[must_use]
    pub fn snapshot(&self) -> &RobotStateSnapshot {
        &self.snapshot
    }

    /// Clear every per-tick accumulator.
    pub fn reset_calculators(&mut self) {
        self.forward_dynamics.reset();
        self.joint_velocity_change.fill(0.0);
        self.impulses.reset();
    }

    /// Save the joint state, efforts included.
    pub fn save_snapshot(&mut self) {
        self.snapshot.positions.clear();
        self.snapshot
            .positions
            .extend(self.robot.joints().iter().map(|j| *j.position()));
        self.snapshot.velocities.clone_from(self.robot.velocities());
        self.snapshot.efforts.clone_from(self.robot.efforts());
    }

    /// Sum the wrench points into the external wrenches and run the
    /// unconstrained forward dynamics.
    pub fn do_forward_dynamics(&mut self, gravity: &Vector3<f64>) {
        let wrenches = self.forward_dynamics.external_wrenches_mut();
        for point in &self.wrench_points {
            let world = self
                .robot
                .body_pose(point.body)
                .transform_point(&Point3::from(point.offset));
            wrenches.add(point.body, &force_at_point(&point.moment, &point.force, &world));
        }
        self.forward_dynamics.compute(&self.robot, gravity);
    }

    /// Body spatial velocity after `dt` with no constraint impulse.
    #[must_use]
    pub fn predicted_body_velocity(&self, body: BodyId, dt: f64) -> SpatialVector {
        self.robot.body_velocity(body) + self.forward_dynamics.body_acceleration(body) * dt
    }

    /// Joint velocity coordinate after `dt` with no constraint impulse.
    #[must_use]
    pub fn predicted_joint_velocity(&self, dof: usize, dt: f64) -> f64 {
        let qd = self.robot.velocities().get(dof).copied().unwrap_or(0.0);
        let qdd = self
            .forward_dynamics
            .joint_accelerations()
            .get(dof)
            .copied()
            .unwrap_or(0.0);
        qd + qdd * dt
    }

    /// Predicted world pose of a body after `dt`.
    #[must_use]
    pub fn predicted_body_pose(&self, body: BodyId, dt: f64) -> Pose {
        let pose = self.robot.body_pose(body);
        let v = self.predicted_body_velocity(body, dt);
        let omega = angular_part(&v);
        let origin_velocity = velocity_at_point(&v, &pose.position);
        Pose::from_position_rotation(
            pose.position + origin_velocity * dt,
            UnitQuaternion::from_scaled_axis(omega * dt) * pose.rotation,
        )
    }

    /// Place the collidables at their predicted poses.
    pub fn update_collidables(&mut self, dt: f64) {
        for index in 0..self.collidables.len() {
            let Some(body) = self.collidables[index].body() else {
                continue;
            };
            let pose = self.predicted_body_pose(body, dt);
            self.collidables[index].update(&pose);
        }
    }

    /// Response of the robot to impulses, using the last forward-dynamics pass.
    pub fn impulse_response(
        &self,
        body_impulses: &[(BodyId, SpatialVector)],
        joint_impulses: &[(usize, f64)],
        response: &mut ImpulseResponse,
    ) {
        self.forward_dynamics
            .impulse_response(&self.robot, body_impulses, joint_impulses, response);
    }

    /// Add a joint velocity change produced by a constraint.
    pub fn add_joint_velocity_change(&mut self, change: &DVector<f64>) {
        if change.len() == self.joint_velocity_change.len() {
            self.joint_velocity_change += change;
        }
    }

    /// Copy the forward-dynamics accelerations into the robot and record the
    /// body accelerations seen by the sensors.
    pub fn write_joint_accelerations(&mut self, dt: f64) {
        self.robot
            .accelerations_mut()
            .copy_from(self.forward_dynamics.joint_accelerations());

        // The buffer first holds each body's velocity change, then its acceleration.
        let joints = self.robot.joints();
        let changes = &mut self.body_accelerations;
        changes.fill(SpatialVector::zeros());
        for (index, joint) in joints.iter().enumerate() {
            let mut dv = changes[joint.parent.0];
            if joint.active_dof() > 0 {
                if let Some(s) = self.robot.motion_subspace(JointId(index)) {
                    dv += s * self.joint_velocity_change.rows(joint.dof_offset, joint.dof());
                }
            }
            changes[joint.child.0] = dv;
        }
        for (body, acceleration) in self.body_accelerations.iter_mut().enumerate() {
            let dv = *acceleration;
            *acceleration = self.forward_dynamics.body_acceleration(BodyId(body)) + dv / dt;
        }
    }

    /// Advance the joint state by `dt`.
    pub fn integrate_state(&mut self, dt: f64) {
        FirstOrderIntegrator::integrate(&mut self.robot, &self.joint_velocity_change, dt);
    }

    /// Refresh the cached kinematics.
    pub fn update_frames(&mut self) {
        self.robot.update_frames();
    }

    /// Refresh the sensor readings.
    pub fn update_sensors(&mut self, gravity: &Vector3<f64>) {
        for imu in &mut self.imus {
            let body = imu.body;
            imu.update(
                &self.robot.body_pose(body),
                &self.robot.body_velocity(body),
                &self.body_accelerations[body.0],
                gravity,
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::collision::CollisionShape;
    use crate::multibody::{JointKind, RobotBuilder};
    use approx::assert_relative_eq;
    use sim_types::MassProperties;

    fn ball() -> ImpulseBasedRobot {
        let mut builder = RobotBuilder::new("ball");
        builder
            .add_body(
                BodyId::ROOT,
                "float",
                JointKind::Floating,
                Pose::identity(),
                "ball",
                MassProperties::sphere(1.0, 0.1),
            )
            .unwrap();
        ImpulseBasedRobot::new(builder.build())
    }

    #[test]
    fn test_wrench_point_cancels_gravity() {
        let mut robot = ball();
        let index = robot
            .add_wrench_point(ExternalWrenchPoint::new("lift", BodyId::new(1), Vector3::zeros()))
            .unwrap();
        robot.wrench_points_mut()[index].force = Vector3::new(0.0, 0.0, 9.81);
        robot.do_forward_dynamics(&Vector3::new(0.0, 0.0, -9.81));

        assert_relative_eq!(
            robot.forward_dynamics().joint_accelerations().norm(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_predicted_pose_includes_acceleration() {
        let mut robot = ball();
        robot.do_forward_dynamics(&Vector3::new(0.0, 0.0, -10.0));
        let pose = robot.predicted_body_pose(BodyId::new(1), 0.1);
        // Velocity after dt is -1 m/s, applied over dt.
        assert_relative_eq!(pose.position.z, -0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_body_acceleration_includes_velocity_change_once() {
        let gravity = Vector3::new(0.0, 0.0, -10.0);
        let mut robot = ball();
        robot.do_forward_dynamics(&gravity);
        robot.add_joint_velocity_change(&DVector::from_column_slice(&[0.0, 0.0, 0.0, 0.0, 0.0, 1.0]));
        robot.write_joint_accelerations(0.1);
        assert_relative_eq!(robot.body_accelerations[1][5], 0.0, epsilon = 1e-12);

        // Next tick without an impulse: the previous change must not linger.
        robot.reset_calculators();
        robot.do_forward_dynamics(&gravity);
        robot.write_joint_accelerations(0.1);
        assert_relative_eq!(robot.body_accelerations[1][5], -10.0, epsilon = 1e-12);
        assert_relative_eq!(robot.body_accelerations[0].norm(), 0.0);
    }

    #[test]
    fn test_rejects_unknown_body() {
        let mut robot = ball();
        let result = robot.add_collidable(Collidable::attached(
            "ghost",
            BodyId::new(9),
            CollisionShape::sphere(0.1),
            Pose::identity(),
        ));
        assert_eq!(result, Err(SimError::InvalidBodyId(9)));
        assert!(robot.add_collidable(Collidable::ground(0.0)).is_err());
    }

    #[test]
    fn test_snapshot_keeps_pre_physics_state() {
        let mut robot = ball();
        robot
            .robot_mut()
            .set_joint_velocity(JointId::new(0), &[0.0, 0.0, 0.0, 0.0, 0.0, 1.0])
            .unwrap();
        robot.save_snapshot();
        robot.robot_mut().velocities_mut().fill(0.0);

        assert_relative_eq!(robot.snapshot().velocities[5], 1.0);
        assert_eq!(robot.snapshot().positions.len(), 1);
    }
}
