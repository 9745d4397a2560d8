//! Fallible construction of a [`Robot`].

use smallvec::SmallVec;
use sim_types::{BodyId, JointId, MassProperties, Pose, Result, SimError, WORLD_FRAME};

use super::{Joint, JointKind, RigidBody, Robot};

/// Builds a robot tree one body at a time.
///
/// Every body is attached to an existing parent, so the resulting joint list
/// is topologically sorted by construction.
///
/// # Example
///
/// ```
/// use sim_core::multibody::{JointKind, RobotBuilder};
/// use sim_types::{BodyId, MassProperties, Pose};
///
/// let mut builder = RobotBuilder::new("ball");
/// let ball = builder
///     .add_body(
///         BodyId::ROOT,
///         "root_joint",
///         JointKind::Floating,
///         Pose::identity(),
///         "ball",
///         MassProperties::sphere(1.0, 0.1),
///     )
///     .unwrap();
/// let robot = builder.build();
///
/// assert_eq!(ball, BodyId::new(1));
/// assert_eq!(robot.dof(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct RobotBuilder {
    name: String,
    inertial_frame: String,
    bodies: Vec<RigidBody>,
    joints: Vec<Joint>,
    dof: usize,
}

impl RobotBuilder {
    /// Start a robot whose root body is fixed to the world frame.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            bodies: vec![RigidBody {
                name: format!("{name}_root"),
                mass_properties: MassProperties::massless(),
                parent_joint: None,
                child_joints: SmallVec::new(),
            }],
            name,
            inertial_frame: WORLD_FRAME.to_string(),
            joints: Vec::new(),
            dof: 0,
        }
    }

    /// Express the robot in another inertial frame.
    #[must_use]
    pub fn inertial_frame(mut self, frame: impl Into<String>) -> Self {
        self.inertial_frame = frame.into();
        self
    }

    /// Attach a new body to `parent` through a joint.
    ///
    /// Returns the id of the new body. Single-DoF axes are normalized; a zero
    /// or non-finite axis is rejected.
    pub fn add_body(
        &mut self,
        parent: BodyId,
        joint_name: impl Into<String>,
        mut kind: JointKind,
        transform_to_parent: Pose,
        body_name: impl Into<String>,
        mass_properties: MassProperties,
    ) -> Result<BodyId> {
        let joint_name = joint_name.into();
        if parent.0 >= self.bodies.len() {
            return Err(SimError::InvalidBodyId(parent.0));
        }

        if let JointKind::Revolute(params) | JointKind::Prismatic(params) = &mut kind {
            let norm = params.axis.norm();
            if !norm.is_finite() || norm < 1e-12 {
                return Err(SimError::InvalidJointAxis { joint_name });
            }
            params.axis /= norm;
        }

        if !transform_to_parent.is_finite() {
            return Err(SimError::invalid_config(format!(
                "joint {joint_name} has a non-finite transform"
            )));
        }

        let joint_id = JointId(self.joints.len());
        let child = BodyId(self.bodies.len());
        let dof = kind.dof();

        self.bodies[parent.0].child_joints.push(joint_id);
        self.bodies.push(RigidBody {
            name: body_name.into(),
            mass_properties,
            parent_joint: Some(joint_id),
            child_joints: SmallVec::new(),
        });
        self.joints.push(Joint {
            name: joint_name,
            position: kind.zero_position(),
            kind,
            parent,
            child,
            transform_to_parent,
            dof_offset: self.dof,
            pinned: false,
        });
        self.dof += dof;

        Ok(child)
    }

    /// Finish the robot and compute its initial frames.
    #[must_use]
    pub fn build(self) -> Robot {
        Robot::from_parts(self.name, self.inertial_frame, self.bodies, self.joints)
    }
}
