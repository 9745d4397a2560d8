//! Kinematic/inertial tree of an articulated robot.
//!
//! A [`Robot`] is an arena of rigid bodies connected by joints. Body 0 is the
//! root, fixed to the robot's inertial frame; joint `i` always moves body
//! `i + 1`, and joints are stored in topological order so a single forward
//! sweep visits every parent before its children.
//!
//! Joint velocities, accelerations and efforts are stored in robot-wide
//! vectors. Each joint owns the contiguous range starting at its
//! [`Joint::dof_offset`].
//!
//! World-frame kinematics (body poses, spatial velocities, spatial inertias and
//! joint motion subspaces) are cached by [`Robot::update_frames`], which must
//! be called after any change to the configuration or velocity.

mod builder;
mod joint;

pub use builder::RobotBuilder;
pub use joint::{Joint, JointKind, JointPosition, OneDofJoint};

use nalgebra::{DVector, DVectorView, Matrix6, Matrix6xX, Point3, Vector3};
use smallvec::SmallVec;
use sim_types::{BodyId, JointId, MassProperties, Pose, Result, SimError, Twist};

use crate::dynamics::spatial::{
    SpatialVector, angular_part, kinetic_energy, linear_part, spatial_cross_motion,
    spatial_inertia, velocity_at_point,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rigid body of the tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBody {
    /// Body name.
    pub name: String,
    /// Mass, center of mass and inertia.
    pub mass_properties: MassProperties,
    /// Joint connecting this body to its parent, `None` for the root.
    pub parent_joint: Option<JointId>,
    /// Joints whose parent is this body.
    pub child_joints: SmallVec<[JointId; 4]>,
}

impl RigidBody {
    /// Whether this is the root body.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_joint.is_none()
    }
}

/// World-frame kinematics cached per body and per joint.
#[derive(Debug, Clone, Default)]
struct Frames {
    body_poses: Vec<Pose>,
    body_velocities: Vec<SpatialVector>,
    body_inertias: Vec<Matrix6<f64>>,
    motion_subspaces: Vec<Matrix6xX<f64>>,
    velocity_product: Vec<SpatialVector>,
}

/// An articulated robot: a tree of rigid bodies plus its joint state.
#[derive(Debug, Clone)]
pub struct Robot {
    name: String,
    inertial_frame: String,
    bodies: Vec<RigidBody>,
    joints: Vec<Joint>,
    velocities: DVector<f64>,
    accelerations: DVector<f64>,
    efforts: DVector<f64>,
    frames: Frames,
}

impl Robot {
    pub(crate) fn from_parts(
        name: String,
        inertial_frame: String,
        bodies: Vec<RigidBody>,
        joints: Vec<Joint>,
    ) -> Self {
        let dof = joints.iter().map(Joint::dof).sum();
        let mut robot = Self {
            name,
            inertial_frame,
            bodies,
            joints,
            velocities: DVector::zeros(dof),
            accelerations: DVector::zeros(dof),
            efforts: DVector::zeros(dof),
            frames: Frames::default(),
        };
        robot.update_frames();
        robot
    }

    /// Robot name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the frame the robot is expressed in.
    #[must_use]
    pub fn inertial_frame(&self) -> &str {
        &self.inertial_frame
    }

    /// Number of bodies, root included.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// All bodies, indexed by [`BodyId`].
    #[must_use]
    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    /// Get a body.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id.0)
    }

    /// Find a body by name.
    #[must_use]
    pub fn body_id(&self, name: &str) -> Option<BodyId> {
        self.bodies.iter().position(|b| b.name == name).map(BodyId)
    }

    /// All joints in topological order, indexed by [`JointId`].
    #[must_use]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// Get a joint.
    #[must_use]
    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id.0)
    }

    /// Find a joint by name.
    #[must_use]
    pub fn joint_id(&self, name: &str) -> Option<JointId> {
        self.joints.iter().position(|j| j.name == name).map(JointId)
    }

    /// Total number of velocity degrees of freedom.
    #[must_use]
    pub fn dof(&self) -> usize {
        self.velocities.len()
    }

    /// Pin or release a joint.
    ///
    /// Pinning also zeroes the joint velocity and acceleration.
    pub fn set_joint_pinned(&mut self, id: JointId, pinned: bool) -> Result<()> {
        let joint = self
            .joints
            .get_mut(id.0)
            .ok_or(SimError::InvalidJointId(id.0))?;
        joint.pinned = pinned;
        if pinned {
            let (offset, dof) = (joint.dof_offset, joint.dof());
            self.velocities.rows_mut(offset, dof).fill(0.0);
            self.accelerations.rows_mut(offset, dof).fill(0.0);
        }
        Ok(())
    }

    /// Set the configuration of a joint.
    pub fn set_joint_position(&mut self, id: JointId, position: JointPosition) -> Result<()> {
        let joint = self
            .joints
            .get_mut(id.0)
            .ok_or(SimError::InvalidJointId(id.0))?;
        if !position.matches(&joint.kind) {
            return Err(SimError::invalid_config(format!(
                "position does not match the {} joint {}",
                joint.kind.joint_type(),
                joint.name
            )));
        }
        joint.position = position;
        Ok(())
    }

    pub(crate) fn joint_position_mut(&mut self, id: JointId) -> Option<&mut JointPosition> {
        self.joints.get_mut(id.0).map(|j| &mut j.position)
    }

    /// Velocity coordinates of a joint.
    #[must_use]
    pub fn joint_velocity(&self, id: JointId) -> Option<DVectorView<'_, f64>> {
        let joint = self.joints.get(id.0)?;
        Some(self.velocities.rows(joint.dof_offset, joint.dof()))
    }

    /// Set the velocity coordinates of a joint.
    pub fn set_joint_velocity(&mut self, id: JointId, qd: &[f64]) -> Result<()> {
        let (offset, dof) = self.dof_range(id, qd.len())?;
        self.velocities.rows_mut(offset, dof).copy_from_slice(qd);
        Ok(())
    }

    /// Acceleration coordinates of a joint.
    #[must_use]
    pub fn joint_acceleration(&self, id: JointId) -> Option<DVectorView<'_, f64>> {
        let joint = self.joints.get(id.0)?;
        Some(self.accelerations.rows(joint.dof_offset, joint.dof()))
    }

    /// Set the effort of a joint.
    pub fn set_joint_effort(&mut self, id: JointId, tau: &[f64]) -> Result<()> {
        let (offset, dof) = self.dof_range(id, tau.len())?;
        self.efforts.rows_mut(offset, dof).copy_from_slice(tau);
        Ok(())
    }

    fn dof_range(&self, id: JointId, len: usize) -> Result<(usize, usize)> {
        let joint = self.joints.get(id.0).ok_or(SimError::InvalidJointId(id.0))?;
        if joint.dof() != len {
            return Err(SimError::invalid_config(format!(
                "joint {} has {} DoF, got {len} values",
                joint.name,
                joint.dof()
            )));
        }
        Ok((joint.dof_offset, len))
    }

    /// All velocity coordinates.
    #[must_use]
    pub fn velocities(&self) -> &DVector<f64> {
        &self.velocities
    }

    /// Mutable velocity coordinates.
    pub fn velocities_mut(&mut self) -> &mut DVector<f64> {
        &mut self.velocities
    }

    /// All acceleration coordinates.
    #[must_use]
    pub fn accelerations(&self) -> &DVector<f64> {
        &self.accelerations
    }

    /// Mutable acceleration coordinates.
    pub fn accelerations_mut(&mut self) -> &mut DVector<f64> {
        &mut self.accelerations
    }

    /// All effort coordinates.
    #[must_use]
    pub fn efforts(&self) -> &DVector<f64> {
        &self.efforts
    }

    /// Mutable effort coordinates.
    pub fn efforts_mut(&mut self) -> &mut DVector<f64> {
        &mut self.efforts
    }

    /// Efforts plus the passive damping and friction of single-DoF joints.
    #[must_use]
    pub fn effective_efforts(&self) -> DVector<f64> {
        let mut tau = self.efforts.clone();
        for joint in &self.joints {
            if let Some(params) = joint.kind.one_dof() {
                let qd = self.velocities[joint.dof_offset];
                tau[joint.dof_offset] += params.passive_effort(qd);
            }
        }
        tau
    }

    /// Whether two bodies are directly connected by a joint.
    #[must_use]
    pub fn are_adjacent(&self, a: BodyId, b: BodyId) -> bool {
        let parent_of = |body: BodyId| {
            self.bodies
                .get(body.0)
                .and_then(|b| b.parent_joint)
                .map(|j| self.joints[j.0].parent)
        };
        parent_of(a) == Some(b) || parent_of(b) == Some(a)
    }

    /// Recompute the cached world-frame kinematics from the joint state.
    pub fn update_frames(&mut self) {
        let n = self.bodies.len();
        let frames = &mut self.frames;
        frames.body_poses.resize(n, Pose::identity());
        frames.body_velocities.resize(n, SpatialVector::zeros());
        frames.body_inertias.resize(n, Matrix6::zeros());
        frames
            .motion_subspaces
            .resize(self.joints.len(), Matrix6xX::zeros(0));
        frames
            .velocity_product
            .resize(self.joints.len(), SpatialVector::zeros());

        frames.body_poses[0] = Pose::identity();
        frames.body_velocities[0] = SpatialVector::zeros();
        frames.body_inertias[0] = body_inertia(&self.bodies[0].mass_properties, &Pose::identity());

        for (index, joint) in self.joints.iter().enumerate() {
            let parent = joint.parent.0;
            let child = joint.child.0;

            let joint_frame = frames.body_poses[parent].compose(&joint.transform_to_parent);
            let child_pose = joint_frame.compose(&joint.joint_transform());
            let s = joint.motion_subspace(&joint_frame, &child_pose);

            let qd = self.velocities.as_slice();
            let qd = &qd[joint.dof_offset..joint.dof_offset + joint.dof()];
            let (parent_fixed, child_fixed) = joint.split_joint_velocity(&s, qd);

            let parent_velocity = frames.body_velocities[parent];
            let child_velocity = parent_velocity + parent_fixed + child_fixed;

            frames.velocity_product[index] = spatial_cross_motion(&parent_velocity, &parent_fixed)
                + spatial_cross_motion(&child_velocity, &child_fixed);
            frames.body_poses[child] = child_pose;
            frames.body_velocities[child] = child_velocity;
            frames.body_inertias[child] =
                body_inertia(&self.bodies[child].mass_properties, &child_pose);
            frames.motion_subspaces[index] = s;
        }
    }

    /// World pose of a body frame.
    #[must_use]
    pub fn body_pose(&self, id: BodyId) -> Pose {
        self.frames.body_poses.get(id.0).copied().unwrap_or_default()
    }

    /// Spatial velocity of a body (world frame, about the world origin).
    #[must_use]
    pub fn body_velocity(&self, id: BodyId) -> SpatialVector {
        self.frames
            .body_velocities
            .get(id.0)
            .copied()
            .unwrap_or_else(SpatialVector::zeros)
    }

    /// Twist of a body frame: angular velocity and velocity of its origin.
    #[must_use]
    pub fn body_twist(&self, id: BodyId) -> Twist {
        let v = self.body_velocity(id);
        let origin = self.body_pose(id).position;
        Twist::new(velocity_at_point(&v, &origin), angular_part(&v))
    }

    /// World-frame spatial inertia of a body about the world origin.
    #[must_use]
    pub fn body_spatial_inertia(&self, id: BodyId) -> Matrix6<f64> {
        self.frames
            .body_inertias
            .get(id.0)
            .copied()
            .unwrap_or_else(Matrix6::zeros)
    }

    /// World position of a body's center of mass.
    #[must_use]
    pub fn body_center_of_mass(&self, id: BodyId) -> Point3<f64> {
        let com = self
            .bodies
            .get(id.0)
            .map_or_else(Vector3::zeros, |b| b.mass_properties.center_of_mass);
        self.body_pose(id).transform_point(&Point3::from(com))
    }

    /// World-frame motion subspace of a joint.
    #[must_use]
    pub fn motion_subspace(&self, id: JointId) -> Option<&Matrix6xX<f64>> {
        self.frames.motion_subspaces.get(id.0)
    }

    /// Velocity-product acceleration `Ṡ q̇` of a joint.
    #[must_use]
    pub(crate) fn velocity_product(&self, id: JointId) -> SpatialVector {
        self.frames
            .velocity_product
            .get(id.0)
            .copied()
            .unwrap_or_else(SpatialVector::zeros)
    }

    /// Total kinetic energy.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        self.frames
            .body_inertias
            .iter()
            .zip(&self.frames.body_velocities)
            .map(|(inertia, v)| kinetic_energy(inertia, v))
            .sum()
    }

    /// Spatial momentum about the world origin: `[angular; linear]`.
    #[must_use]
    pub fn spatial_momentum(&self) -> SpatialVector {
        self.frames
            .body_inertias
            .iter()
            .zip(&self.frames.body_velocities)
            .map(|(inertia, v)| inertia * v)
            .sum()
    }

    /// Total linear momentum.
    #[must_use]
    pub fn linear_momentum(&self) -> Vector3<f64> {
        linear_part(&self.spatial_momentum())
    }

    /// Check the joint state for `NaN` or `Inf`.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.velocities.iter().all(|v| v.is_finite())
            && self.accelerations.iter().all(|a| a.is_finite())
            && self.joints.iter().all(|j| j.position.is_finite())
    }
}

fn body_inertia(mass_properties: &MassProperties, pose: &Pose) -> Matrix6<f64> {
    let rotation = pose.rotation.to_rotation_matrix();
    let r = rotation.matrix();
    let com = pose.transform_point(&Point3::from(mass_properties.center_of_mass));
    let inertia_world = r * mass_properties.inertia * r.transpose();
    spatial_inertia(mass_properties.mass, &com, &inertia_world)
}
