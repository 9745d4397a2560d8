//! Joint position limits as unilateral impulse constraints.
//!
//! A limit behaves like a wall in joint space. At the start of a tick, each
//! one-DoF joint is projected forward with its unconstrained acceleration:
//!
//! ```text
//! q⁺  = q + dt·q̇ + ½·dt²·q̈
//! q̇⁺ = q̇ + dt·q̈
//! ```
//!
//! The lower limit is active when `q⁺ ≤ lower` and `q̇⁺ ≤ 0`, the upper limit
//! when `q⁺ ≥ upper` and `q̇⁺ ≥ 0`. All active limits of one robot are solved
//! together as a small LCP in joint space.

use nalgebra::{DMatrix, DVector};
use smallvec::{SmallVec, smallvec};
use sim_core::constraint::{
    ConstraintTarget, DeltaTwistRegistry, ImpulseBasedConstraintCalculator, TwistCoupling,
};
use sim_core::{ImpulseBasedRobot, ImpulseResponse, RigidBodyImpulseRegistry};
use sim_types::{JointId, Result, RobotId, SimError};

use crate::pgs::ProjectedGaussSeidel;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Limit-space velocity below which a limit counts as still closing.
const CLOSING_TOLERANCE: f64 = 1e-6;

/// Response parameters of joint-limit impulses.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintParameters {
    /// Coefficient of restitution when hitting a limit (0-1).
    pub coefficient_of_restitution: f64,

    /// Approach speed below which restitution is ignored.
    pub restitution_threshold: f64,

    /// Fraction of the limit violation removed per step.
    pub error_reduction_parameter: f64,
}

impl ConstraintParameters {
    /// Parameters with the given restitution, threshold and error reduction.
    #[must_use]
    pub fn new(
        coefficient_of_restitution: f64,
        restitution_threshold: f64,
        error_reduction_parameter: f64,
    ) -> Self {
        Self {
            coefficient_of_restitution,
            restitution_threshold,
            error_reduction_parameter,
        }
    }

    /// Set the restitution.
    #[must_use]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.coefficient_of_restitution = restitution.clamp(0.0, 1.0);
        self
    }

    /// Set the error reduction parameter.
    #[must_use]
    pub fn with_error_reduction(mut self, erp: f64) -> Self {
        self.error_reduction_parameter = erp;
        self
    }

    /// Target velocity away from the limit after the impulse.
    ///
    /// `approach_velocity` is negative when moving into the limit and
    /// `distance` is negative when the predicted position violates it.
    #[must_use]
    pub fn target_velocity(&self, approach_velocity: f64, distance: f64, dt: f64) -> f64 {
        let approach_speed = -approach_velocity;
        let bounce = if approach_speed > self.restitution_threshold {
            self.coefficient_of_restitution * approach_speed
        } else {
            0.0
        };
        let correction = if dt > 0.0 {
            self.error_reduction_parameter * (-distance).max(0.0) / dt
        } else {
            0.0
        };
        bounce.max(correction)
    }

    /// Validate the parameters.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.coefficient_of_restitution) {
            return Err(SimError::invalid_config(
                "coefficient_of_restitution must be in [0, 1]",
            ));
        }
        if self.restitution_threshold.is_nan() || self.restitution_threshold < 0.0 {
            return Err(SimError::invalid_config("restitution_threshold cannot be negative"));
        }
        if !(0.0..=1.0).contains(&self.error_reduction_parameter) {
            return Err(SimError::invalid_config(
                "error_reduction_parameter must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Which side of a joint's range is being hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActiveLimit {
    /// Moving below `position_min`.
    Lower,
    /// Moving above `position_max`.
    Upper,
}

impl ActiveLimit {
    /// +1 for a lower limit, -1 for an upper limit.
    #[must_use]
    pub fn sign(self) -> f64 {
        match self {
            Self::Lower => 1.0,
            Self::Upper => -1.0,
        }
    }
}

/// A joint pressing against one of its limits this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimitTarget {
    /// The limited joint.
    pub joint: JointId,
    /// Velocity coordinate of the joint.
    pub dof: usize,
    /// Side being hit.
    pub limit: ActiveLimit,
    /// Predicted signed distance to the limit, negative when violated.
    pub distance: f64,
}

/// Enforces the position limits of every one-DoF joint of one robot.
///
/// Impulses are stored in limit coordinates (`λ ≥ 0` pushes away from the
/// limit); [`RobotJointLimitImpulseBasedCalculator::impulse`] reports them as
/// signed joint impulses.
#[derive(Debug, Clone)]
pub struct RobotJointLimitImpulseBasedCalculator {
    robot: RobotId,
    parameters: ConstraintParameters,
    pgs: ProjectedGaussSeidel,

    targets: Vec<JointLimitTarget>,
    free_velocity: DVector<f64>,
    target_velocity: DVector<f64>,

    owner: usize,
    slots: Vec<usize>,
    inverse_inertia: DMatrix<f64>,
    joint_response: DMatrix<f64>,
    coupling: TwistCoupling,

    impulse: DVector<f64>,
    published_impulse: DVector<f64>,
    velocity_solution: DVector<f64>,
    impulse_update: f64,
    velocity_update: f64,
    first_update: bool,
    active: bool,

    joint_velocity_change: DVector<f64>,
}

impl RobotJointLimitImpulseBasedCalculator {
    /// Calculator for the limits of `robot`.
    #[must_use]
    pub fn new(robot: RobotId, parameters: ConstraintParameters) -> Self {
        Self {
            robot,
            parameters,
            pgs: ProjectedGaussSeidel::default(),
            targets: Vec::new(),
            free_velocity: DVector::zeros(0),
            target_velocity: DVector::zeros(0),
            owner: 0,
            slots: Vec::new(),
            inverse_inertia: DMatrix::zeros(0, 0),
            joint_response: DMatrix::zeros(0, 0),
            coupling: TwistCoupling::default(),
            impulse: DVector::zeros(0),
            published_impulse: DVector::zeros(0),
            velocity_solution: DVector::zeros(0),
            impulse_update: 0.0,
            velocity_update: 0.0,
            first_update: true,
            active: false,
            joint_velocity_change: DVector::zeros(0),
        }
    }

    /// Re-target the calculator, keeping its buffers.
    pub fn reset(&mut self, robot: RobotId, parameters: ConstraintParameters) {
        self.robot = robot;
        self.parameters = parameters;
        self.targets.clear();
        self.slots.clear();
        self.coupling.clear();
        self.active = false;
    }

    /// Robot whose limits are enforced.
    #[must_use]
    pub fn robot(&self) -> RobotId {
        self.robot
    }

    /// Set the constraint parameters.
    pub fn set_constraint_parameters(&mut self, parameters: ConstraintParameters) {
        self.parameters = parameters;
    }

    /// Constraint parameters in use.
    #[must_use]
    pub fn constraint_parameters(&self) -> &ConstraintParameters {
        &self.parameters
    }

    /// Joints found at a limit by the last `initialize`.
    #[must_use]
    pub fn active_limits(&self) -> &[JointLimitTarget] {
        &self.targets
    }

    /// Signed joint impulse per active limit.
    #[must_use]
    pub fn impulse(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.targets.len(),
            self.targets
                .iter()
                .zip(self.impulse.iter())
                .map(|(target, lambda)| target.limit.sign() * lambda),
        )
    }

    /// Joint-space inverse inertia seen by the active limits, limit coordinates.
    #[must_use]
    pub fn inverse_apparent_inertia(&self) -> &DMatrix<f64> {
        &self.inverse_inertia
    }

    fn current_velocity(&self, registry: &DeltaTwistRegistry) -> DVector<f64> {
        let mut velocity = self.free_velocity.clone();
        for (i, (target, slot)) in self.targets.iter().zip(&self.slots).enumerate() {
            velocity[i] += target.limit.sign() * registry.joint_delta(*slot);
        }
        velocity
    }

    fn solve(&mut self, alpha: f64, registry: &DeltaTwistRegistry) {
        let n = self.targets.len();
        if n == 0 {
            self.active = false;
            return;
        }
        let velocity = self.current_velocity(registry);
        let bias = &velocity - &self.target_velocity;

        let mut solution = if self.first_update {
            DVector::zeros(n)
        } else {
            self.impulse.clone()
        };
        let result = self.pgs.solve(&self.inverse_inertia, &bias, &mut solution);
        if !result.converged {
            tracing::trace!(
                robot = %self.robot,
                residual = result.residual,
                "joint-limit LCP stopped at the sweep budget"
            );
        }

        let impulse = if self.first_update {
            solution
        } else {
            solution * alpha + &self.impulse * (1.0 - alpha)
        };
        self.first_update = false;

        let velocity_solution = &velocity + &self.inverse_inertia * &impulse;
        self.impulse_update = (&impulse - &self.impulse).norm();
        self.velocity_update = (&velocity_solution - &self.velocity_solution).norm();
        self.active = impulse.iter().any(|&lambda| lambda > 0.0);
        self.impulse = impulse;
        self.velocity_solution = velocity_solution;
    }
}

impl ImpulseBasedConstraintCalculator for RobotJointLimitImpulseBasedCalculator {
    fn initialize(&mut self, dt: f64, robots: &[ImpulseBasedRobot]) {
        self.targets.clear();
        self.slots.clear();
        self.coupling.clear();
        self.active = false;
        self.first_update = true;
        self.impulse_update = 0.0;
        self.velocity_update = 0.0;

        let Some(robot) = robots.get(self.robot.0) else {
            return;
        };
        let qdd = robot.forward_dynamics().joint_accelerations();
        for (index, joint) in robot.robot().joints().iter().enumerate() {
            if joint.pinned {
                continue;
            }
            let Some(one_dof) = joint.kind.one_dof() else {
                continue;
            };
            let limits = &one_dof.limits;
            if !limits.has_position_limits() {
                continue;
            }
            let Some(q) = joint.position().as_scalar() else {
                continue;
            };
            let dof = joint.dof_offset;
            let qd = robot.robot().velocities().get(dof).copied().unwrap_or(0.0);
            let acceleration = qdd.get(dof).copied().unwrap_or(0.0);
            let q_next = q + dt * qd + 0.5 * dt * dt * acceleration;
            let qd_next = qd + dt * acceleration;

            let limit = if q_next <= limits.position_min && qd_next <= 0.0 {
                Some((ActiveLimit::Lower, q_next - limits.position_min))
            } else if q_next >= limits.position_max && qd_next >= 0.0 {
                Some((ActiveLimit::Upper, limits.position_max - q_next))
            } else {
                None
            };
            if let Some((limit, distance)) = limit {
                self.targets.push(JointLimitTarget {
                    joint: JointId::new(index),
                    dof,
                    limit,
                    distance,
                });
            }
        }

        let n = self.targets.len();
        self.free_velocity = DVector::zeros(n);
        self.target_velocity = DVector::zeros(n);
        for (i, target) in self.targets.iter().enumerate() {
            let velocity = target.limit.sign() * robot.predicted_joint_velocity(target.dof, dt);
            self.free_velocity[i] = velocity;
            self.target_velocity[i] = self
                .parameters
                .target_velocity(velocity, target.distance, dt);
        }
        self.impulse = DVector::zeros(n);
        self.published_impulse = DVector::zeros(n);
        self.velocity_solution = self.free_velocity.clone();
        self.joint_velocity_change = DVector::zeros(robot.robot().dof());
    }

    fn register_targets(&mut self, owner: usize, registry: &mut DeltaTwistRegistry) {
        self.owner = owner;
        self.slots.clear();
        for target in &self.targets {
            self.slots.push(registry.register(owner, ConstraintTarget::JointDof {
                robot: self.robot,
                dof: target.dof,
            }));
        }
    }

    fn update_inertia(&mut self, robots: &[ImpulseBasedRobot], registry: &DeltaTwistRegistry) {
        self.coupling.clear();
        let n = self.targets.len();
        let Some(robot) = robots.get(self.robot.0) else {
            self.targets.clear();
            return;
        };
        self.inverse_inertia = DMatrix::zeros(n, n);
        self.joint_response = DMatrix::zeros(robot.robot().dof(), n);

        let mut response = ImpulseResponse::new(robot.robot());
        for k in 0..n {
            let column = &self.targets[k];
            robot.impulse_response(&[], &[(column.dof, column.limit.sign())], &mut response);
            let change = response.joint_velocity_change();
            for (i, row) in self.targets.iter().enumerate() {
                self.inverse_inertia[(i, k)] =
                    row.limit.sign() * change.get(row.dof).copied().unwrap_or(0.0);
            }
            self.joint_response.set_column(k, change);
            self.coupling
                .record(self.owner, registry, self.robot, &response, k, n);
        }
    }

    fn compute_impulse(&mut self, _dt: f64, registry: &DeltaTwistRegistry) {
        self.first_update = true;
        self.solve(1.0, registry);
    }

    fn update_impulse(&mut self, _dt: f64, alpha: f64, verbose: bool, registry: &DeltaTwistRegistry) {
        self.solve(alpha, registry);
        if verbose {
            tracing::debug!(
                robot = %self.robot,
                limits = self.targets.len(),
                alpha,
                active = self.active,
                impulse_update = self.impulse_update,
                velocity_update = self.velocity_update,
                "joint-limit update"
            );
        }
    }

    fn update_twist_modifiers(&mut self, registry: &mut DeltaTwistRegistry) {
        if self.impulse.len() != self.published_impulse.len() {
            return;
        }
        let change = &self.impulse - &self.published_impulse;
        if change.norm() > 0.0 {
            self.coupling.publish(registry, &change);
        }
        self.published_impulse.copy_from(&self.impulse);
    }

    fn finalize_impulse(&mut self) {
        if self.joint_response.ncols() == self.impulse.len() {
            self.joint_velocity_change = &self.joint_response * &self.impulse;
        }
        self.active = self.impulse.iter().any(|&lambda| lambda > 0.0);
    }

    fn impulse_update(&self) -> f64 {
        self.impulse_update
    }

    fn velocity_update(&self) -> f64 {
        self.velocity_update
    }

    fn is_constraint_active(&self) -> bool {
        self.active
    }

    fn is_closing(&self, registry: &DeltaTwistRegistry) -> bool {
        let n = self.targets.len();
        if n == 0 || self.inverse_inertia.shape() != (n, n) || self.impulse.len() != n {
            return false;
        }
        let velocity = self.current_velocity(registry) + &self.inverse_inertia * &self.impulse;
        velocity.iter().any(|&v| v < -CLOSING_TOLERANCE)
    }

    fn robots(&self) -> SmallVec<[RobotId; 2]> {
        smallvec![self.robot]
    }

    fn joint_velocity_change(&self, robot: RobotId) -> Option<&DVector<f64>> {
        (robot == self.robot).then_some(&self.joint_velocity_change)
    }

    fn write_impulses(&self, _robot: RobotId, _registry: &mut RigidBodyImpulseRegistry) {
        // Joint impulses act inside the robot; no body receives an external impulse.
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use sim_core::{JointKind, JointPosition, OneDofJoint, RobotBuilder};
    use sim_types::{BodyId, MassProperties, Pose};

    const DT: f64 = 0.01;

    /// Chain of hinges about Y, each link hanging 1 m below its joint.
    fn chain(limits: &[(f64, f64)], angles: &[f64]) -> ImpulseBasedRobot {
        let mut builder = RobotBuilder::new("chain");
        let mut parent = BodyId::ROOT;
        for (i, &(lower, upper)) in limits.iter().enumerate() {
            let offset = if i == 0 { 0.0 } else { -1.0 };
            parent = builder
                .add_body(
                    parent,
                    format!("hinge{i}"),
                    JointKind::Revolute(
                        OneDofJoint::new(Vector3::y()).with_position_limits(lower, upper),
                    ),
                    Pose::from_position(nalgebra::Point3::new(0.0, 0.0, offset)),
                    format!("link{i}"),
                    MassProperties::sphere(1.0, 0.05)
                        .with_center_of_mass(Vector3::new(0.0, 0.0, -1.0)),
                )
                .unwrap();
        }
        let mut robot = builder.build();
        for (i, &angle) in angles.iter().enumerate() {
            robot
                .set_joint_position(JointId::new(i), JointPosition::OneDof(angle))
                .unwrap();
        }
        let mut robot = ImpulseBasedRobot::new(robot);
        robot.do_forward_dynamics(&Vector3::new(0.0, 0.0, -9.81));
        robot
    }

    fn solve(
        robots: &[ImpulseBasedRobot],
        parameters: ConstraintParameters,
    ) -> RobotJointLimitImpulseBasedCalculator {
        let mut calculator = RobotJointLimitImpulseBasedCalculator::new(RobotId::new(0), parameters);
        let mut registry = DeltaTwistRegistry::new();
        calculator.initialize(DT, robots);
        calculator.register_targets(0, &mut registry);
        calculator.update_inertia(robots, &registry);
        calculator.compute_impulse(DT, &registry);
        calculator.finalize_impulse();
        calculator
    }

    fn velocity_after(robot: &ImpulseBasedRobot, calculator: &RobotJointLimitImpulseBasedCalculator, dof: usize) -> f64 {
        let change = calculator.joint_velocity_change(RobotId::new(0)).unwrap();
        robot.predicted_joint_velocity(dof, DT) + change[dof]
    }

    #[test]
    fn test_parameters_target_velocity() {
        let params = ConstraintParameters::new(0.5, 0.1, 0.0);
        assert_eq!(params.target_velocity(-0.05, 0.0, DT), 0.0);
        assert_relative_eq!(params.target_velocity(-2.0, 0.0, DT), 1.0);
        assert!(ConstraintParameters::default().validate().is_ok());
        assert!(ConstraintParameters::new(2.0, 0.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_joint_within_limits_is_inactive() {
        let robots = [chain(&[(-1.0, 1.0)], &[0.5])];
        let calculator = solve(&robots, ConstraintParameters::default());

        assert!(calculator.active_limits().is_empty());
        assert!(!calculator.is_constraint_active());
    }

    #[test]
    fn test_falling_into_lower_limit_stops_the_joint() {
        // Gravity swings the link back toward zero, into the lower limit.
        let robots = [chain(&[(0.5 - 1e-12, 2.0)], &[0.5])];
        let calculator = solve(&robots, ConstraintParameters::default());

        assert_eq!(calculator.active_limits().len(), 1);
        assert_eq!(calculator.active_limits()[0].limit, ActiveLimit::Lower);
        assert!(calculator.is_constraint_active());
        assert!(calculator.impulse()[0] > 0.0);
        assert_relative_eq!(velocity_after(&robots[0], &calculator, 0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_upper_limit_with_restitution_bounces() {
        let mut robot = chain(&[(-2.0, 0.1)], &[0.1 - 1e-9]);
        robot.robot_mut().velocities_mut()[0] = 1.0;
        robot.robot_mut().update_frames();
        robot.do_forward_dynamics(&Vector3::new(0.0, 0.0, -9.81));
        let robots = [robot];

        let calculator = solve(&robots, ConstraintParameters::default().with_restitution(0.5));
        let approach = robots[0].predicted_joint_velocity(0, DT);

        assert_eq!(calculator.active_limits()[0].limit, ActiveLimit::Upper);
        assert!(calculator.impulse()[0] < 0.0);
        assert_relative_eq!(
            velocity_after(&robots[0], &calculator, 0),
            -0.5 * approach,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_multiple_limits_satisfy_complementarity() {
        let robots = [chain(&[(0.4 - 1e-12, 2.0), (-2.0, -0.3 + 1e-12)], &[0.4, -0.3])];
        let calculator = solve(&robots, ConstraintParameters::default());
        let impulse = calculator.impulse();

        for (i, target) in calculator.active_limits().iter().enumerate() {
            let qd = velocity_after(&robots[0], &calculator, target.dof);
            let lambda = target.limit.sign() * impulse[i];
            assert!(lambda >= -1e-12);
            assert!(target.limit.sign() * qd >= -1e-9);
            assert_relative_eq!(qd * lambda, 0.0, epsilon = 1e-9);
        }
    }
}
