//! Impulse response of an articulated robot (Mirtich).
//!
//! With the configuration frozen, the response to a set of impulses is the
//! articulated-body algorithm with zero velocity, zero gravity and the
//! impulses standing in for external forces:
//!
//! ```text
//! inward:  p_i = -ι_i
//!          u_j = τ_j - S_jᵀ p_i
//!          p_λ += p_i + U_j D_j⁻¹ u_j
//! outward: Δq̇_j = D_j⁻¹ (u_j - U_jᵀ Δv_λ)
//!          Δv_i = Δv_λ + S_j Δq̇_j
//! ```
//!
//! Only the cached `U`, `D⁻¹` of the last forward-dynamics pass are needed, so
//! the response costs one linear sweep per query.

use nalgebra::DVector;
use sim_types::{BodyId, JointId};

use super::forward::ForwardDynamicsCalculator;
use super::spatial::SpatialVector;
use crate::multibody::Robot;

/// Joint and body velocity changes caused by a set of impulses.
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    joint_velocity_change: DVector<f64>,
    body_velocity_change: Vec<SpatialVector>,
    bias: Vec<SpatialVector>,
    joint_impulses: DVector<f64>,
    u_vectors: Vec<DVector<f64>>,
}

impl ImpulseResponse {
    /// Allocate buffers sized for `robot`.
    #[must_use]
    pub fn new(robot: &Robot) -> Self {
        Self {
            joint_velocity_change: DVector::zeros(robot.dof()),
            body_velocity_change: vec![SpatialVector::zeros(); robot.body_count()],
            bias: vec![SpatialVector::zeros(); robot.body_count()],
            joint_impulses: DVector::zeros(robot.dof()),
            u_vectors: robot
                .joints()
                .iter()
                .map(|j| DVector::zeros(j.dof()))
                .collect(),
        }
    }

    /// Change of every joint velocity coordinate.
    #[must_use]
    pub fn joint_velocity_change(&self) -> &DVector<f64> {
        &self.joint_velocity_change
    }

    /// Change of a body's spatial velocity.
    #[must_use]
    pub fn body_velocity_change(&self, body: BodyId) -> SpatialVector {
        self.body_velocity_change
            .get(body.0)
            .copied()
            .unwrap_or_else(SpatialVector::zeros)
    }

    /// Changes of all body spatial velocities, indexed by body.
    #[must_use]
    pub fn body_velocity_changes(&self) -> &[SpatialVector] {
        &self.body_velocity_change
    }
}

impl ForwardDynamicsCalculator {
    /// Velocity change produced by body impulses and joint impulses.
    ///
    /// Body impulses are spatial (world frame, about the world origin); joint
    /// impulses are indexed by velocity coordinate. Impulses on pinned joints
    /// are absorbed.
    pub fn impulse_response(
        &self,
        robot: &Robot,
        body_impulses: &[(BodyId, SpatialVector)],
        joint_impulses: &[(usize, f64)],
        response: &mut ImpulseResponse,
    ) {
        response.bias.iter_mut().for_each(|p| *p = SpatialVector::zeros());
        response.joint_impulses.fill(0.0);
        for (body, impulse) in body_impulses {
            if let Some(p) = response.bias.get_mut(body.0) {
                *p -= impulse;
            }
        }
        for &(dof, impulse) in joint_impulses {
            if dof < response.joint_impulses.len() {
                response.joint_impulses[dof] += impulse;
            }
        }

        let joints = robot.joints();
        for (index, joint) in joints.iter().enumerate().rev() {
            let p = response.bias[joint.child.0];
            if joint.active_dof() == 0 {
                response.bias[joint.parent.0] += p;
                continue;
            }
            let Some(s) = robot.motion_subspace(JointId(index)) else {
                continue;
            };
            let u = response.joint_impulses.rows(joint.dof_offset, joint.dof()) - s.transpose() * p;
            let propagated = p + &self.u_matrices[index] * (&self.d_inverses[index] * &u);
            response.bias[joint.parent.0] += propagated;
            response.u_vectors[index] = u;
        }

        response.body_velocity_change[0] = SpatialVector::zeros();
        for (index, joint) in joints.iter().enumerate() {
            let dv_parent = response.body_velocity_change[joint.parent.0];
            let range_len = joint.dof();
            if joint.active_dof() == 0 {
                response.body_velocity_change[joint.child.0] = dv_parent;
                response
                    .joint_velocity_change
                    .rows_mut(joint.dof_offset, range_len)
                    .fill(0.0);
                continue;
            }
            let Some(s) = robot.motion_subspace(JointId(index)) else {
                continue;
            };
            let dqd = &self.d_inverses[index]
                * (&response.u_vectors[index] - self.u_matrices[index].transpose() * dv_parent);
            response.body_velocity_change[joint.child.0] = dv_parent + s * &dqd;
            response
                .joint_velocity_change
                .rows_mut(joint.dof_offset, range_len)
                .copy_from(&dqd);
        }
    }
}
