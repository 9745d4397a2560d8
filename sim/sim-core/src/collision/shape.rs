//! Collision shapes and collidables.

use nalgebra::{Point3, Vector3};
use sim_types::{BodyId, Pose};

use super::broad_phase::{Aabb, BroadPhaseProxy};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Half-size used for the unbounded directions of a half-space.
const LARGE: f64 = 1e6;

/// Primitive collision geometry, expressed in the collidable frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CollisionShape {
    /// Sphere centered at the origin.
    Sphere {
        /// Radius.
        radius: f64,
    },
    /// Box centered at the origin.
    Box {
        /// Half-size along each local axis.
        half_extents: Vector3<f64>,
    },
    /// Capsule along the local Z axis.
    Capsule {
        /// Half-length of the core segment.
        half_length: f64,
        /// Radius.
        radius: f64,
    },
    /// Solid below the local XY plane; the outward normal is local +Z.
    HalfSpace,
}

impl CollisionShape {
    /// Sphere shape.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Sphere { radius }
    }

    /// Box shape.
    #[must_use]
    pub fn box_shape(half_extents: Vector3<f64>) -> Self {
        Self::Box { half_extents }
    }

    /// Capsule shape.
    #[must_use]
    pub fn capsule(half_length: f64, radius: f64) -> Self {
        Self::Capsule {
            half_length,
            radius,
        }
    }

    /// World bounding box of the shape placed at `pose`.
    #[must_use]
    pub fn aabb(&self, pose: &Pose) -> Aabb {
        let center = pose.position;
        match self {
            Self::Sphere { radius } => Aabb::from_center(center, Vector3::repeat(*radius)),
            Self::Box { half_extents } => {
                let rotation = pose.rotation.to_rotation_matrix();
                let mut corners = [Point3::origin(); 8];
                for (k, corner) in corners.iter_mut().enumerate() {
                    let local = box_corner(half_extents, k);
                    *corner = center + rotation * local;
                }
                Aabb::from_points(corners)
            }
            Self::Capsule {
                half_length,
                radius,
            } => {
                let axis = pose.rotation * Vector3::new(0.0, 0.0, *half_length);
                Aabb::from_points([center + axis, center - axis]).expanded(*radius)
            }
            Self::HalfSpace => {
                let normal = pose.rotation * Vector3::z();
                let mut min = Point3::new(-LARGE, -LARGE, -LARGE);
                let mut max = Point3::new(LARGE, LARGE, LARGE);
                // Axis-aligned half-spaces are bounded on their normal axis.
                for axis in 0..3 {
                    if normal[axis] > 1.0 - 1e-9 {
                        max[axis] = center[axis];
                    } else if normal[axis] < -1.0 + 1e-9 {
                        min[axis] = center[axis];
                    }
                }
                Aabb::new(min, max)
            }
        }
    }
}

/// Corner `k` (0..8) of a box with the given half-extents.
pub(crate) fn box_corner(half_extents: &Vector3<f64>, k: usize) -> Vector3<f64> {
    let sign = |bit: usize| if k & bit == 0 { -1.0 } else { 1.0 };
    Vector3::new(
        sign(1) * half_extents.x,
        sign(2) * half_extents.y,
        sign(4) * half_extents.z,
    )
}

/// A shape attached to a robot body, or to the static environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Collidable {
    /// Name for diagnostics.
    pub name: String,
    /// Geometry.
    pub shape: CollisionShape,
    /// Pose of the shape in the body frame, or in the world for the environment.
    pub local_pose: Pose,
    body: Option<BodyId>,
    world_pose: Pose,
    aabb: Aabb,
}

impl Collidable {
    /// Shape attached to a robot body. Call [`Collidable::update`] before use.
    #[must_use]
    pub fn attached(
        name: impl Into<String>,
        body: BodyId,
        shape: CollisionShape,
        local_pose: Pose,
    ) -> Self {
        Self {
            name: name.into(),
            shape,
            local_pose,
            body: Some(body),
            world_pose: local_pose,
            aabb: shape.aabb(&local_pose),
        }
    }

    /// Static environment shape at a fixed world pose.
    #[must_use]
    pub fn environment(name: impl Into<String>, shape: CollisionShape, pose: Pose) -> Self {
        Self {
            name: name.into(),
            shape,
            local_pose: pose,
            body: None,
            world_pose: pose,
            aabb: shape.aabb(&pose),
        }
    }

    /// Horizontal ground at height `z`.
    #[must_use]
    pub fn ground(z: f64) -> Self {
        Self::environment(
            "ground",
            CollisionShape::HalfSpace,
            Pose::from_position(Point3::new(0.0, 0.0, z)),
        )
    }

    /// Body the shape is attached to, `None` for the environment.
    #[must_use]
    pub fn body(&self) -> Option<BodyId> {
        self.body
    }

    /// Whether the shape cannot move.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.body.is_none_or(|body| body.is_root())
    }

    /// World pose used by the last detection.
    #[must_use]
    pub fn world_pose(&self) -> &Pose {
        &self.world_pose
    }

    /// World bounding box used by the last detection.
    #[must_use]
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Place the shape with its body at `body_pose`.
    pub fn update(&mut self, body_pose: &Pose) {
        if self.body.is_some() {
            self.world_pose = body_pose.compose(&self.local_pose);
            self.aabb = self.shape.aabb(&self.world_pose);
        }
    }

    /// Broad-phase view of the shape.
    #[must_use]
    pub fn proxy(&self) -> BroadPhaseProxy {
        BroadPhaseProxy::new(self.aabb, self.is_static())
    }
}
