//! Joint payloads of the kinematic tree.
//!
//! Joint variants form a closed set, so every per-joint algorithm (frames,
//! motion subspace, integration) is an exhaustive `match`.

use nalgebra::{Matrix6xX, Point3, UnitQuaternion, Vector3};
use sim_types::{BodyId, JointLimits, JointType, Pose};

use crate::dynamics::spatial::{SpatialVector, skew, spatial};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of a revolute or prismatic joint.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OneDofJoint {
    /// Unit axis, in the joint frame.
    pub axis: Vector3<f64>,
    /// Position, velocity and effort limits.
    pub limits: JointLimits,
    /// Viscous damping coefficient.
    pub damping: f64,
    /// Coulomb friction magnitude.
    pub friction: f64,
}

impl OneDofJoint {
    /// Unlimited, undamped joint about/along `axis`.
    #[must_use]
    pub fn new(axis: Vector3<f64>) -> Self {
        Self {
            axis,
            limits: JointLimits::unlimited(),
            damping: 0.0,
            friction: 0.0,
        }
    }

    /// Set the position limits.
    #[must_use]
    pub fn with_position_limits(mut self, lower: f64, upper: f64) -> Self {
        self.limits.position_min = lower;
        self.limits.position_max = upper;
        self
    }

    /// Set all limits.
    #[must_use]
    pub fn with_limits(mut self, limits: JointLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the viscous damping.
    #[must_use]
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Set the Coulomb friction.
    #[must_use]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = friction;
        self
    }

    /// Passive effort from damping and friction at velocity `qd`.
    #[must_use]
    pub fn passive_effort(&self, qd: f64) -> f64 {
        let friction = if qd > 0.0 {
            -self.friction
        } else if qd < 0.0 {
            self.friction
        } else {
            0.0
        };
        -self.damping * qd + friction
    }
}

/// Joint variants and their static parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointKind {
    /// Rotation about a fixed axis.
    Revolute(OneDofJoint),
    /// Translation along a fixed axis.
    Prismatic(OneDofJoint),
    /// Pitch about Y plus translation in the XZ plane of the joint frame.
    ///
    /// Velocity coordinates are `[pitch rate, x rate, z rate]`, with the
    /// translation rates expressed in the joint frame.
    Planar,
    /// Free rotation; velocity is the angular velocity in the child frame.
    Spherical,
    /// Free motion; velocity is `[ω; v]` of the child origin in the child frame.
    Floating,
    /// Rigid attachment.
    Fixed,
}

impl JointKind {
    /// Revolute joint about `axis`.
    #[must_use]
    pub fn revolute(axis: Vector3<f64>) -> Self {
        Self::Revolute(OneDofJoint::new(axis))
    }

    /// Prismatic joint along `axis`.
    #[must_use]
    pub fn prismatic(axis: Vector3<f64>) -> Self {
        Self::Prismatic(OneDofJoint::new(axis))
    }

    /// Pure-data tag of this joint.
    #[must_use]
    pub fn joint_type(&self) -> JointType {
        match self {
            Self::Revolute(_) => JointType::Revolute,
            Self::Prismatic(_) => JointType::Prismatic,
            Self::Planar => JointType::Planar,
            Self::Spherical => JointType::Spherical,
            Self::Floating => JointType::Floating,
            Self::Fixed => JointType::Fixed,
        }
    }

    /// Number of velocity degrees of freedom.
    #[must_use]
    pub fn dof(&self) -> usize {
        self.joint_type().dof()
    }

    /// Parameters of a single-DoF joint.
    #[must_use]
    pub fn one_dof(&self) -> Option<&OneDofJoint> {
        match self {
            Self::Revolute(joint) | Self::Prismatic(joint) => Some(joint),
            _ => None,
        }
    }

    /// Zero configuration of this joint.
    #[must_use]
    pub fn zero_position(&self) -> JointPosition {
        match self {
            Self::Revolute(_) | Self::Prismatic(_) => JointPosition::OneDof(0.0),
            Self::Planar => JointPosition::Planar {
                pitch: 0.0,
                x: 0.0,
                z: 0.0,
            },
            Self::Spherical => JointPosition::Spherical(UnitQuaternion::identity()),
            Self::Floating => JointPosition::Floating(Pose::identity()),
            Self::Fixed => JointPosition::Fixed,
        }
    }
}

/// Configuration of a joint.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointPosition {
    /// Angle or displacement of a single-DoF joint.
    OneDof(f64),
    /// Pitch angle and in-plane translation.
    Planar {
        /// Rotation about the joint Y axis.
        pitch: f64,
        /// Translation along the joint X axis.
        x: f64,
        /// Translation along the joint Z axis.
        z: f64,
    },
    /// Orientation of the child relative to the joint frame.
    Spherical(UnitQuaternion<f64>),
    /// Pose of the child relative to the joint frame.
    Floating(Pose),
    /// No configuration.
    Fixed,
}

impl JointPosition {
    /// Whether this configuration belongs to `kind`.
    #[must_use]
    pub fn matches(&self, kind: &JointKind) -> bool {
        matches!(
            (self, kind),
            (Self::OneDof(_), JointKind::Revolute(_) | JointKind::Prismatic(_))
                | (Self::Planar { .. }, JointKind::Planar)
                | (Self::Spherical(_), JointKind::Spherical)
                | (Self::Floating(_), JointKind::Floating)
                | (Self::Fixed, JointKind::Fixed)
        )
    }

    /// Scalar position of a single-DoF joint.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::OneDof(q) => Some(*q),
            _ => None,
        }
    }

    /// Check for `NaN` or `Inf`.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::OneDof(q) => q.is_finite(),
            Self::Planar { pitch, x, z } => pitch.is_finite() && x.is_finite() && z.is_finite(),
            Self::Spherical(rotation) => rotation.coords.iter().all(|c| c.is_finite()),
            Self::Floating(pose) => pose.is_finite(),
            Self::Fixed => true,
        }
    }
}

/// A joint connecting `parent` to `child`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Joint {
    /// Joint name.
    pub name: String,
    /// Joint variant and parameters.
    pub kind: JointKind,
    /// Predecessor body.
    pub parent: BodyId,
    /// Successor body.
    pub child: BodyId,
    /// Pose of the joint frame in the parent body frame.
    pub transform_to_parent: Pose,
    /// Index of the first velocity coordinate of this joint in the robot vectors.
    pub dof_offset: usize,
    /// A pinned joint holds its configuration: zero velocity and acceleration.
    pub pinned: bool,
    pub(crate) position: JointPosition,
}

impl Joint {
    /// Current configuration.
    #[must_use]
    pub fn position(&self) -> &JointPosition {
        &self.position
    }

    /// Number of velocity degrees of freedom.
    #[must_use]
    pub fn dof(&self) -> usize {
        self.kind.dof()
    }

    /// Number of degrees of freedom exposed to the solvers this tick.
    #[must_use]
    pub fn active_dof(&self) -> usize {
        if self.pinned { 0 } else { self.dof() }
    }

    /// Pose of the child relative to the joint frame.
    #[must_use]
    pub fn joint_transform(&self) -> Pose {
        match (&self.kind, &self.position) {
            (JointKind::Revolute(joint), JointPosition::OneDof(q)) => Pose::from_position_rotation(
                Point3::origin(),
                UnitQuaternion::from_scaled_axis(joint.axis * *q),
            ),
            (JointKind::Prismatic(joint), JointPosition::OneDof(q)) => {
                Pose::from_position(Point3::from(joint.axis * *q))
            }
            (JointKind::Planar, JointPosition::Planar { pitch, x, z }) => {
                Pose::from_position_rotation(
                    Point3::new(*x, 0.0, *z),
                    UnitQuaternion::from_scaled_axis(Vector3::y() * *pitch),
                )
            }
            (JointKind::Spherical, JointPosition::Spherical(rotation)) => {
                Pose::from_position_rotation(Point3::origin(), *rotation)
            }
            (JointKind::Floating, JointPosition::Floating(pose)) => *pose,
            _ => Pose::identity(),
        }
    }

    /// World-frame motion subspace of this joint.
    ///
    /// `joint_frame` is the world pose of the joint frame, `child` the world
    /// pose of the child body.
    pub(crate) fn motion_subspace(&self, joint_frame: &Pose, child: &Pose) -> Matrix6xX<f64> {
        let origin = child.position.coords;
        let mut s = Matrix6xX::zeros(self.dof());
        match &self.kind {
            JointKind::Revolute(joint) => {
                let axis = joint_frame.rotation * joint.axis;
                s.set_column(0, &spatial(&axis, &origin.cross(&axis)));
            }
            JointKind::Prismatic(joint) => {
                let axis = joint_frame.rotation * joint.axis;
                s.set_column(0, &spatial(&Vector3::zeros(), &axis));
            }
            JointKind::Planar => {
                let y = joint_frame.rotation * Vector3::y();
                s.set_column(0, &spatial(&y, &origin.cross(&y)));
                s.set_column(
                    1,
                    &spatial(&Vector3::zeros(), &(joint_frame.rotation * Vector3::x())),
                );
                s.set_column(
                    2,
                    &spatial(&Vector3::zeros(), &(joint_frame.rotation * Vector3::z())),
                );
            }
            JointKind::Spherical => {
                let rotation = child.rotation.to_rotation_matrix();
                let r = rotation.matrix();
                let o_r = skew(&origin) * r;
                s.fixed_view_mut::<3, 3>(0, 0).copy_from(r);
                s.fixed_view_mut::<3, 3>(3, 0).copy_from(&o_r);
            }
            JointKind::Floating => {
                let rotation = child.rotation.to_rotation_matrix();
                let r = rotation.matrix();
                let o_r = skew(&origin) * r;
                s.fixed_view_mut::<3, 3>(0, 0).copy_from(r);
                s.fixed_view_mut::<3, 3>(3, 0).copy_from(&o_r);
                s.fixed_view_mut::<3, 3>(3, 3).copy_from(r);
            }
            JointKind::Fixed => {}
        }
        s
    }

    /// Split of the joint velocity into the part whose subspace moves with the
    /// parent and the part whose subspace moves with the child.
    ///
    /// Only the planar joint has parent-fixed columns (its translations).
    pub(crate) fn split_joint_velocity(
        &self,
        s: &Matrix6xX<f64>,
        qd: &[f64],
    ) -> (SpatialVector, SpatialVector) {
        match self.kind {
            JointKind::Planar => {
                let parent_fixed = s.column(1) * qd[1] + s.column(2) * qd[2];
                let child_fixed = s.column(0) * qd[0];
                (parent_fixed, child_fixed)
            }
            _ => {
                let mut child_fixed = SpatialVector::zeros();
                for (k, qd_k) in qd.iter().enumerate() {
                    child_fixed += s.column(k) * *qd_k;
                }
                (SpatialVector::zeros(), child_fixed)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn joint(kind: JointKind) -> Joint {
        Joint {
            name: "j".into(),
            position: kind.zero_position(),
            kind,
            parent: BodyId::ROOT,
            child: BodyId::new(1),
            transform_to_parent: Pose::identity(),
            dof_offset: 0,
            pinned: false,
        }
    }

    #[test]
    fn test_passive_effort() {
        let params = OneDofJoint::new(Vector3::z()).with_damping(2.0).with_friction(0.5);
        assert_relative_eq!(params.passive_effort(1.0), -2.5);
        assert_relative_eq!(params.passive_effort(-1.0), 2.5);
        assert_relative_eq!(params.passive_effort(0.0), 0.0);
    }

    #[test]
    fn test_position_matches_kind() {
        assert!(JointPosition::OneDof(0.0).matches(&JointKind::revolute(Vector3::z())));
        assert!(!JointPosition::Fixed.matches(&JointKind::Floating));
        assert!(JointKind::Planar.zero_position().matches(&JointKind::Planar));
    }

    #[test]
    fn test_revolute_transform() {
        let mut j = joint(JointKind::revolute(Vector3::z()));
        j.position = JointPosition::OneDof(std::f64::consts::FRAC_PI_2);
        let pose = j.joint_transform();
        assert_relative_eq!(pose.transform_vector(&Vector3::x()), Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_revolute_subspace_off_origin() {
        let j = joint(JointKind::revolute(Vector3::z()));
        let child = Pose::from_position(Point3::new(1.0, 0.0, 0.0));
        let s = j.motion_subspace(&child, &child);
        // Rotation about a vertical line through (1, 0, 0): world origin moves along -y.
        assert_relative_eq!(s[(2, 0)], 1.0);
        assert_relative_eq!(s[(4, 0)], -1.0);
    }

    #[test]
    fn test_floating_subspace_dimensions() {
        let j = joint(JointKind::Floating);
        let s = j.motion_subspace(&Pose::identity(), &Pose::identity());
        assert_eq!(s.ncols(), 6);
        assert_relative_eq!(s.fixed_view::<6, 6>(0, 0).into_owned(), nalgebra::Matrix6::identity());
    }
}
