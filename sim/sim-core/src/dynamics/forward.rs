//! Featherstone's articulated-body algorithm (ABA) in world coordinates.
//!
//! Three sweeps over the tree:
//!
//! 1. Outward (root to leaves): body velocity `v_i`, velocity-product
//!    acceleration `c_i` and bias force `p_i = v_i ×* I_i v_i - f_ext,i`.
//! 2. Inward (leaves to root): articulated inertia and bias force
//!    ```text
//!    U_i = I^A_i S_i
//!    D_i = S_iᵀ U_i
//!    u_i = τ_i - S_iᵀ p^A_i
//!    I^A_λ += I^A_i - U_i D_i⁻¹ U_iᵀ
//!    p^A_λ += p^A_i + I^a_i c_i + U_i D_i⁻¹ u_i
//!    ```
//! 3. Outward: `q̈_i = D_i⁻¹ (u_i - U_iᵀ (a_λ + c_i))`, `a_i = a_λ + c_i + S_i q̈_i`.
//!
//! Gravity enters as a fictitious upward acceleration of the root,
//! `a_0 = [0; -g]`. Pinned and fixed joints pass the full articulated inertia
//! to their parent and report the effort needed to hold them.
//!
//! The per-joint `U_i`, `D_i⁻¹` and the articulated inertias stay cached after
//! the pass. They are the robot's apparent inertia, reused by the impulse
//! response until the configuration changes.

use nalgebra::{DMatrix, DVector, Matrix6, Matrix6xX, Vector3};
use sim_types::{BodyId, JointId};

use super::spatial::{SpatialVector, spatial, spatial_cross_force};
use crate::multibody::Robot;
use crate::registry::RigidBodyWrenchRegistry;

/// Forward dynamics of one robot plus its cached apparent inertia.
#[derive(Debug, Clone)]
pub struct ForwardDynamicsCalculator {
    pub(super) articulated_inertias: Vec<Matrix6<f64>>,
    pub(super) bias_forces: Vec<SpatialVector>,
    pub(super) body_accelerations: Vec<SpatialVector>,
    pub(super) u_matrices: Vec<Matrix6xX<f64>>,
    pub(super) d_inverses: Vec<DMatrix<f64>>,
    pub(super) u_vectors: Vec<DVector<f64>>,
    joint_accelerations: DVector<f64>,
    holding_efforts: DVector<f64>,
    external_wrenches: RigidBodyWrenchRegistry,
    gravity: Vector3<f64>,
}

impl ForwardDynamicsCalculator {
    /// Allocate buffers sized for `robot`.
    #[must_use]
    pub fn new(robot: &Robot) -> Self {
        let bodies = robot.body_count();
        let joints = robot.joints();
        Self {
            articulated_inertias: vec![Matrix6::zeros(); bodies],
            bias_forces: vec![SpatialVector::zeros(); bodies],
            body_accelerations: vec![SpatialVector::zeros(); bodies],
            u_matrices: joints.iter().map(|j| Matrix6xX::zeros(j.dof())).collect(),
            d_inverses: joints
                .iter()
                .map(|j| DMatrix::zeros(j.dof(), j.dof()))
                .collect(),
            u_vectors: joints.iter().map(|j| DVector::zeros(j.dof())).collect(),
            joint_accelerations: DVector::zeros(robot.dof()),
            holding_efforts: DVector::zeros(robot.dof()),
            external_wrenches: RigidBodyWrenchRegistry::new(bodies),
            gravity: Vector3::zeros(),
        }
    }

    /// External wrenches applied during the next pass.
    #[must_use]
    pub fn external_wrenches(&self) -> &RigidBodyWrenchRegistry {
        &self.external_wrenches
    }

    /// Mutable access to the external wrench accumulator.
    pub fn external_wrenches_mut(&mut self) -> &mut RigidBodyWrenchRegistry {
        &mut self.external_wrenches
    }

    /// Clear the external wrenches.
    pub fn reset(&mut self) {
        self.external_wrenches.reset();
    }

    /// Run the three sweeps for the robot's current state.
    ///
    /// `robot` must have up-to-date frames.
    pub fn compute(&mut self, robot: &Robot, gravity: &Vector3<f64>) {
        self.gravity = *gravity;
        let tau = robot.effective_efforts();
        let joints = robot.joints();

        for body in 0..robot.body_count() {
            let id = BodyId(body);
            let inertia = robot.body_spatial_inertia(id);
            let v = robot.body_velocity(id);
            self.articulated_inertias[body] = inertia;
            self.bias_forces[body] =
                spatial_cross_force(&v, &(inertia * v)) - self.external_wrenches.get(id);
        }

        for (index, joint) in joints.iter().enumerate().rev() {
            let child = joint.child.0;
            let parent = joint.parent.0;
            let c = robot.velocity_product(JointId(index));
            let inertia = self.articulated_inertias[child];
            let bias = self.bias_forces[child];

            if joint.active_dof() == 0 {
                self.articulated_inertias[parent] += inertia;
                self.bias_forces[parent] += bias + inertia * c;
                continue;
            }

            let Some(s) = robot.motion_subspace(JointId(index)) else {
                continue;
            };
            let u_matrix = inertia * s;
            let d = s.transpose() * &u_matrix;
            let d_inverse = d
                .clone()
                .try_inverse()
                .unwrap_or_else(|| DMatrix::from_element(d.nrows(), d.ncols(), f64::NAN));
            let tau_j = tau.rows(joint.dof_offset, joint.dof());
            let u = tau_j - s.transpose() * bias;

            let u_d_inv = &u_matrix * &d_inverse;
            let reduced: Matrix6<f64> = inertia - &u_d_inv * u_matrix.transpose();
            self.articulated_inertias[parent] += reduced;
            self.bias_forces[parent] += bias + reduced * c + &u_d_inv * &u;

            self.u_matrices[index] = u_matrix;
            self.d_inverses[index] = d_inverse;
            self.u_vectors[index] = u;
        }

        self.body_accelerations[0] = spatial(&Vector3::zeros(), &(-gravity));
        for (index, joint) in joints.iter().enumerate() {
            let child = joint.child.0;
            let a_prime =
                self.body_accelerations[joint.parent.0] + robot.velocity_product(JointId(index));
            let range = joint.dof_offset..joint.dof_offset + joint.dof();

            if joint.active_dof() == 0 {
                self.body_accelerations[child] = a_prime;
                if let Some(s) = robot.motion_subspace(JointId(index)) {
                    let f = self.articulated_inertias[child] * a_prime + self.bias_forces[child];
                    let holding = s.transpose() * f;
                    self.holding_efforts
                        .rows_mut(joint.dof_offset, joint.dof())
                        .copy_from(&holding);
                }
                self.joint_accelerations
                    .rows_mut(range.start, range.len())
                    .fill(0.0);
                continue;
            }

            let Some(s) = robot.motion_subspace(JointId(index)) else {
                continue;
            };
            let qdd = &self.d_inverses[index]
                * (&self.u_vectors[index] - self.u_matrices[index].transpose() * a_prime);
            self.body_accelerations[child] = a_prime + s * &qdd;
            self.joint_accelerations
                .rows_mut(range.start, range.len())
                .copy_from(&qdd);
            self.holding_efforts.rows_mut(range.start, range.len()).fill(0.0);
        }
    }

    /// Joint accelerations from the last pass.
    #[must_use]
    pub fn joint_accelerations(&self) -> &DVector<f64> {
        &self.joint_accelerations
    }

    /// Efforts that hold the pinned and fixed joints in place.
    #[must_use]
    pub fn holding_efforts(&self) -> &DVector<f64> {
        &self.holding_efforts
    }

    /// True spatial acceleration of a body from the last pass, gravity offset removed.
    #[must_use]
    pub fn body_acceleration(&self, body: BodyId) -> SpatialVector {
        self.body_accelerations
            .get(body.0)
            .map_or_else(SpatialVector::zeros, |a| {
                a + spatial(&Vector3::zeros(), &self.gravity)
            })
    }

    /// Articulated inertia of the subtree rooted at `body`.
    #[must_use]
    pub fn articulated_inertia(&self, body: BodyId) -> Option<&Matrix6<f64>> {
        self.articulated_inertias.get(body.0)
    }

    /// Gravity used in the last pass.
    #[must_use]
    pub fn gravity(&self) -> &Vector3<f64> {
        &self.gravity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dynamics::spatial::{force_at_point, linear_part};
    use crate::multibody::{JointKind, RobotBuilder};
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use sim_types::{MassProperties, Pose};

    fn free_body(mass: MassProperties) -> Robot {
        let mut builder = RobotBuilder::new("body");
        builder
            .add_body(BodyId::ROOT, "float", JointKind::Floating, Pose::identity(), "b", mass)
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_free_fall() {
        let robot = free_body(MassProperties::sphere(2.0, 0.5));
        let mut fd = ForwardDynamicsCalculator::new(&robot);
        fd.compute(&robot, &Vector3::new(0.0, 0.0, -9.81));

        let qdd = fd.joint_accelerations();
        assert_relative_eq!(qdd[5], -9.81, epsilon = 1e-12);
        assert_relative_eq!(qdd.rows(0, 5).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            linear_part(&fd.body_acceleration(BodyId::new(1))),
            Vector3::new(0.0, 0.0, -9.81),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_external_force_at_point() {
        let robot = free_body(MassProperties::sphere(1.0, 1.0));
        let mut fd = ForwardDynamicsCalculator::new(&robot);
        let force = force_at_point(&Vector3::zeros(), &Vector3::x(), &Point3::new(0.0, 0.0, 1.0));
        fd.external_wrenches_mut().add(BodyId::new(1), &force);
        fd.compute(&robot, &Vector3::zeros());

        // F = x at height 1: linear accel 1 along x, torque 1 about +y.
        let qdd = fd.joint_accelerations();
        assert_relative_eq!(qdd[3], 1.0, epsilon = 1e-12);
        assert_relative_eq!(qdd[1], 1.0 / 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_pendulum_matches_closed_form() {
        // Point-like mass at distance l from a horizontal revolute axis.
        let l = 0.8;
        let mut builder = RobotBuilder::new("pendulum");
        builder
            .add_body(
                BodyId::ROOT,
                "pivot",
                JointKind::revolute(Vector3::y()),
                Pose::identity(),
                "bob",
                MassProperties::sphere(1.5, 1e-3).with_center_of_mass(Vector3::new(l, 0.0, 0.0)),
            )
            .unwrap();
        let robot = builder.build();
        let mut fd = ForwardDynamicsCalculator::new(&robot);
        fd.compute(&robot, &Vector3::new(0.0, 0.0, -9.81));

        // Horizontal arm: torque m g l about +y, inertia ~ m l².
        let i_total = 1.5 * l * l + 0.4 * 1.5 * 1e-6;
        let expected = 1.5 * 9.81 * l / i_total;
        assert_relative_eq!(fd.joint_accelerations()[0], expected, epsilon = 1e-9);
    }

    #[test]
    fn test_pinned_joint_reports_holding_effort() {
        let l = 0.5;
        let mut builder = RobotBuilder::new("arm");
        builder
            .add_body(
                BodyId::ROOT,
                "pivot",
                JointKind::revolute(Vector3::y()),
                Pose::identity(),
                "arm",
                MassProperties::sphere(2.0, 0.1).with_center_of_mass(Vector3::new(l, 0.0, 0.0)),
            )
            .unwrap();
        let mut robot = builder.build();
        robot.set_joint_pinned(JointId::new(0), true).unwrap();
        let mut fd = ForwardDynamicsCalculator::new(&robot);
        fd.compute(&robot, &Vector3::new(0.0, 0.0, -9.81));

        assert_relative_eq!(fd.joint_accelerations()[0], 0.0);
        // The joint must push back the gravity torque m g l about +y.
        assert_relative_eq!(fd.holding_efforts()[0], -2.0 * 9.81 * l, epsilon = 1e-9);
    }

    #[test]
    fn test_planar_free_fall_with_spin() {
        let mut builder = RobotBuilder::new("planar");
        builder
            .add_body(
                BodyId::ROOT,
                "plane",
                JointKind::Planar,
                Pose::identity(),
                "box",
                MassProperties::box_shape(1.0, Vector3::new(0.2, 0.1, 0.05)),
            )
            .unwrap();
        let mut robot = builder.build();
        robot.set_joint_velocity(JointId::new(0), &[3.0, 1.0, 0.0]).unwrap();
        robot.update_frames();

        let mut fd = ForwardDynamicsCalculator::new(&robot);
        fd.compute(&robot, &Vector3::new(0.0, 0.0, -9.81));

        // COM at the origin: the spin is torque-free and the translation is ballistic.
        let qdd = fd.joint_accelerations();
        assert_relative_eq!(qdd[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(qdd[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(qdd[2], -9.81, epsilon = 1e-12);
    }
}
