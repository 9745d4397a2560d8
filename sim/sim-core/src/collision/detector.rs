//! Collision detection across robots and the static environment.
//!
//! Detection runs on the collidables at their *predicted* poses (see
//! [`ImpulseBasedRobot::update_collidables`]), so a contact is reported as
//! soon as the next step would bring two shapes within the penetration
//! threshold.

use nalgebra::{Point3, Vector3};
use sim_types::{BodyId, RobotId};

use super::broad_phase::{BroadPhase, BroadPhaseProxy, SweepAndPrune};
use super::narrow_phase::collide;
use super::shape::Collidable;
use crate::dynamics::spatial::velocity_at_point;
use crate::robot::ImpulseBasedRobot;

/// A body taking part in a collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactBody {
    /// Robot owning the body.
    pub robot: RobotId,
    /// Body within the robot.
    pub body: BodyId,
}

/// One contact between body A and either body B or the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionResult {
    /// First body; always a moving robot body.
    pub body_a: ContactBody,
    /// Second body, `None` for the static environment.
    pub body_b: Option<ContactBody>,
    /// Contact point on A, world frame.
    pub point_on_a: Point3<f64>,
    /// Contact point on B, world frame.
    pub point_on_b: Point3<f64>,
    /// Unit normal from B toward A.
    pub normal: Vector3<f64>,
    /// Surface distance at the predicted poses, negative when penetrating.
    pub signed_distance: f64,
    /// Current velocity of the point on A relative to the point on B.
    pub relative_velocity: Vector3<f64>,
}

impl CollisionResult {
    /// Penetration depth, zero when separated.
    #[must_use]
    pub fn penetration(&self) -> f64 {
        (-self.signed_distance).max(0.0)
    }

    /// Relative velocity along the normal, negative when closing.
    #[must_use]
    pub fn normal_velocity(&self) -> f64 {
        self.relative_velocity.dot(&self.normal)
    }

    /// Relative velocity in the tangent plane.
    #[must_use]
    pub fn tangential_velocity(&self) -> Vector3<f64> {
        self.relative_velocity - self.normal * self.normal_velocity()
    }

    /// Robots touched by the contact, A first.
    pub fn robots(&self) -> impl Iterator<Item = RobotId> + '_ {
        std::iter::once(self.body_a.robot).chain(
            self.body_b
                .map(|b| b.robot)
                .filter(|&robot| robot != self.body_a.robot),
        )
    }

    /// Whether both sides belong to the same robot.
    #[must_use]
    pub fn is_self_collision(&self) -> bool {
        self.body_b.is_some_and(|b| b.robot == self.body_a.robot)
    }
}

/// Detects contacts between robots and the environment.
pub trait CollisionDetector {
    /// Append every contact closer than `minimum_penetration` to `results`.
    ///
    /// Robot collidables must already sit at their predicted poses.
    fn detect_collisions(
        &mut self,
        robots: &[ImpulseBasedRobot],
        environment: &[Collidable],
        minimum_penetration: f64,
        results: &mut Vec<CollisionResult>,
    );
}

#[derive(Debug, Clone, Copy)]
struct Owner {
    robot: Option<RobotId>,
    index: usize,
}

/// Sweep-and-prune broad phase followed by the analytic narrow phase.
///
/// Pairs on the same body, and pairs on bodies joined directly by a joint,
/// are never tested.
#[derive(Debug, Clone, Default)]
pub struct SimpleCollisionDetection {
    broad_phase: SweepAndPrune,
    proxies: Vec<BroadPhaseProxy>,
    owners: Vec<Owner>,
}

impl SimpleCollisionDetection {
    /// Detector with no broad-phase margin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Detector whose broad phase inflates boxes by `margin`.
    #[must_use]
    pub fn with_margin(margin: f64) -> Self {
        Self {
            broad_phase: SweepAndPrune::new().with_margin(margin),
            ..Self::default()
        }
    }

    fn collidable<'a>(
        owner: Owner,
        robots: &'a [ImpulseBasedRobot],
        environment: &'a [Collidable],
    ) -> Option<&'a Collidable> {
        match owner.robot {
            Some(robot) => robots.get(robot.0)?.collidables().get(owner.index),
            None => environment.get(owner.index),
        }
    }
}

impl CollisionDetector for SimpleCollisionDetection {
    fn detect_collisions(
        &mut self,
        robots: &[ImpulseBasedRobot],
        environment: &[Collidable],
        minimum_penetration: f64,
        results: &mut Vec<CollisionResult>,
    ) {
        // Boxes grow by half the threshold each, so pairs closer than the
        // threshold still overlap in the broad phase.
        let slack = 0.5 * minimum_penetration.max(0.0);
        let inflated = |collidable: &Collidable| {
            let mut proxy = collidable.proxy();
            proxy.aabb = proxy.aabb.expanded(slack);
            proxy
        };
        self.proxies.clear();
        self.owners.clear();
        for (r, robot) in robots.iter().enumerate() {
            for (index, collidable) in robot.collidables().iter().enumerate() {
                self.proxies.push(inflated(collidable));
                self.owners.push(Owner {
                    robot: Some(RobotId(r)),
                    index,
                });
            }
        }
        for (index, collidable) in environment.iter().enumerate() {
            self.proxies.push(inflated(collidable));
            self.owners.push(Owner { robot: None, index });
        }

        let pairs = self.broad_phase.find_potential_pairs(&self.proxies);
        let before = results.len();

        for (i, j) in pairs {
            let (mut owner_a, mut owner_b) = (self.owners[i], self.owners[j]);
            // A is always a moving robot body.
            if self.proxies[i].is_static {
                std::mem::swap(&mut owner_a, &mut owner_b);
            }
            let Some(robot_a) = owner_a.robot else {
                continue;
            };
            let (Some(a), Some(b)) = (
                Self::collidable(owner_a, robots, environment),
                Self::collidable(owner_b, robots, environment),
            ) else {
                continue;
            };
            let Some(body_a) = a.body() else { continue };

            let body_b = match (owner_b.robot, b.body()) {
                (Some(robot_b), Some(body)) => Some(ContactBody { robot: robot_b, body }),
                _ => None,
            };
            if let Some(other) = body_b {
                if other.robot == robot_a
                    && (other.body == body_a
                        || robots[robot_a.0].robot().are_adjacent(body_a, other.body))
                {
                    continue;
                }
            }

            for contact in collide(&a.shape, a.world_pose(), &b.shape, b.world_pose()) {
                if contact.signed_distance >= minimum_penetration {
                    continue;
                }
                let velocity_a = velocity_at_point(
                    &robots[robot_a.0].robot().body_velocity(body_a),
                    &contact.point_on_a,
                );
                let velocity_b = body_b.map_or_else(Vector3::zeros, |other| {
                    velocity_at_point(
                        &robots[other.robot.0].robot().body_velocity(other.body),
                        &contact.point_on_b,
                    )
                });
                results.push(CollisionResult {
                    body_a: ContactBody {
                        robot: robot_a,
                        body: body_a,
                    },
                    body_b,
                    point_on_a: contact.point_on_a,
                    point_on_b: contact.point_on_b,
                    normal: contact.normal,
                    signed_distance: contact.signed_distance,
                    relative_velocity: velocity_a - velocity_b,
                });
            }
        }

        tracing::trace!(
            proxies = self.proxies.len(),
            contacts = results.len() - before,
            "collision detection"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::collision::CollisionShape;
    use crate::multibody::{JointKind, RobotBuilder};
    use sim_types::{JointId, MassProperties, Pose};

    fn ball_at(z: f64) -> ImpulseBasedRobot {
        let mut builder = RobotBuilder::new("ball");
        let body = builder
            .add_body(
                BodyId::ROOT,
                "float",
                JointKind::Floating,
                Pose::identity(),
                "ball",
                MassProperties::sphere(1.0, 0.1),
            )
            .unwrap();
        let mut robot = builder.build();
        robot
            .set_joint_position(
                JointId::new(0),
                crate::multibody::JointPosition::Floating(Pose::from_position(Point3::new(
                    0.0, 0.0, z,
                ))),
            )
            .unwrap();
        robot.update_frames();
        let mut robot = ImpulseBasedRobot::new(robot);
        robot
            .add_collidable(Collidable::attached(
                "ball",
                body,
                CollisionShape::sphere(0.1),
                Pose::identity(),
            ))
            .unwrap();
        robot
    }

    #[test]
    fn test_ball_touching_ground() {
        let robots = [ball_at(0.09)];
        let mut results = Vec::new();
        SimpleCollisionDetection::new().detect_collisions(
            &robots,
            &[Collidable::ground(0.0)],
            5e-5,
            &mut results,
        );
        assert_eq!(results.len(), 1);
        let contact = &results[0];
        assert!(contact.body_b.is_none());
        assert!((contact.penetration() - 0.01).abs() < 1e-12);
        assert!((contact.normal - Vector3::z()).norm() < 1e-12);
    }

    #[test]
    fn test_separated_ball_not_reported() {
        let robots = [ball_at(0.5)];
        let mut results = Vec::new();
        SimpleCollisionDetection::new().detect_collisions(
            &robots,
            &[Collidable::ground(0.0)],
            5e-5,
            &mut results,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_two_robots_collide() {
        let robots = [ball_at(1.0), ball_at(1.15)];
        let mut results = Vec::new();
        SimpleCollisionDetection::new().detect_collisions(&robots, &[], 5e-5, &mut results);
        assert_eq!(results.len(), 1);
        let contact = &results[0];
        assert_eq!(contact.robots().count(), 2);
        assert!(!contact.is_self_collision());
        assert!((contact.signed_distance + 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_gap_below_threshold_is_reported() {
        // Balls 2e-5 apart: their boxes do not touch, the threshold is 5e-5.
        let robots = [ball_at(1.0), ball_at(1.20002)];
        let mut results = Vec::new();
        SimpleCollisionDetection::new().detect_collisions(&robots, &[], 5e-5, &mut results);
        assert_eq!(results.len(), 1);
        assert!((results[0].signed_distance - 2e-5).abs() < 1e-12);

        results.clear();
        SimpleCollisionDetection::new().detect_collisions(&robots, &[], 1e-5, &mut results);
        assert!(results.is_empty());
    }

    #[test]
    fn test_adjacent_links_skipped() {
        let mut builder = RobotBuilder::new("arm");
        let upper = builder
            .add_body(
                BodyId::ROOT,
                "shoulder",
                JointKind::revolute(Vector3::y()),
                Pose::identity(),
                "upper",
                MassProperties::sphere(1.0, 0.1),
            )
            .unwrap();
        let lower = builder
            .add_body(
                upper,
                "elbow",
                JointKind::revolute(Vector3::y()),
                Pose::from_position(Point3::new(0.0, 0.0, -0.15)),
                "lower",
                MassProperties::sphere(1.0, 0.1),
            )
            .unwrap();
        let mut robot = ImpulseBasedRobot::new(builder.build());
        for (name, body) in [("upper", upper), ("lower", lower)] {
            robot
                .add_collidable(Collidable::attached(
                    name,
                    body,
                    CollisionShape::sphere(0.1),
                    Pose::identity(),
                ))
                .unwrap();
        }
        let mut results = Vec::new();
        SimpleCollisionDetection::new().detect_collisions(&[robot], &[], 5e-5, &mut results);
        assert!(results.is_empty());
    }
}
