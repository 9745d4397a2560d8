//! Collision groups: robots that interact through contact this tick.
//!
//! Every robot owns exactly one root body, so the "two bodies interact" graph
//! can be built over robots directly. Each collision links the robots of its
//! two bodies; a collision with the static environment touches only one
//! robot. The connected components are found with a union-find:
//!
//! 1. Each robot starts in its own set
//! 2. For each collision, union the sets of its robots
//! 3. Collect the sets that received at least one collision
//!
//! Time complexity: O(n × α(n)) ≈ O(n) where α is the inverse Ackermann function.
//!
//! # Example
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use sim_constraint::CollisionGrouping;
//! use sim_core::{CollisionResult, ContactBody};
//! use sim_types::{BodyId, RobotId};
//!
//! let touch = |a: usize, b: Option<usize>| CollisionResult {
//!     body_a: ContactBody { robot: RobotId::new(a), body: BodyId::new(1) },
//!     body_b: b.map(|b| ContactBody { robot: RobotId::new(b), body: BodyId::new(1) }),
//!     point_on_a: Point3::origin(),
//!     point_on_b: Point3::origin(),
//!     normal: Vector3::z(),
//!     signed_distance: 0.0,
//!     relative_velocity: Vector3::zeros(),
//! };
//!
//! // Robots 0 and 1 touch; robot 2 rests on the ground; robot 3 is free.
//! let collisions = [touch(0, Some(1)), touch(2, None)];
//! let mut grouping = CollisionGrouping::default();
//! grouping.build(4, &collisions);
//!
//! assert_eq!(grouping.groups().len(), 2);
//! assert_eq!(grouping.ungrouped_robots(), vec![RobotId::new(3)]);
//! ```

use sim_core::CollisionResult;
use sim_types::RobotId;

/// A maximal set of robots connected by this tick's collisions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiRobotCollisionGroup {
    /// Robots in the group, sorted by id.
    pub robots: Vec<RobotId>,

    /// The group's collisions, in detection order.
    pub collisions: Vec<CollisionResult>,
}

impl MultiRobotCollisionGroup {
    /// Number of robots in this group.
    #[must_use]
    pub fn num_robots(&self) -> usize {
        self.robots.len()
    }

    /// Number of collisions in this group.
    #[must_use]
    pub fn num_collisions(&self) -> usize {
        self.collisions.len()
    }

    /// Check if this group contains a specific robot.
    #[must_use]
    pub fn contains_robot(&self, robot: RobotId) -> bool {
        self.robots.binary_search(&robot).is_ok()
    }
}

/// Union-find over robots, reused from tick to tick.
#[derive(Debug, Clone, Default)]
pub struct CollisionGrouping {
    parent: Vec<usize>,
    rank: Vec<usize>,
    group_of_root: Vec<Option<usize>>,
    touched: Vec<bool>,
    /// Group storage; only the first `group_count` entries are live.
    groups: Vec<MultiRobotCollisionGroup>,
    group_count: usize,
    ungrouped: Vec<RobotId>,
}

impl CollisionGrouping {
    /// Group `collisions` among `robot_count` robots.
    ///
    /// Groups are ordered by their lowest robot id. Collisions naming a robot
    /// outside `0..robot_count` are ignored.
    pub fn build(&mut self, robot_count: usize, collisions: &[CollisionResult]) -> &[MultiRobotCollisionGroup] {
        self.parent.clear();
        self.parent.extend(0..robot_count);
        self.rank.clear();
        self.rank.resize(robot_count, 0);
        for group in &mut self.groups {
            group.robots.clear();
            group.collisions.clear();
        }
        self.group_count = 0;

        let in_range = |c: &CollisionResult| c.robots().all(|r| r.0 < robot_count);
        for collision in collisions.iter().filter(|c| in_range(c)) {
            if let Some(b) = collision.body_b {
                self.union(collision.body_a.robot.0, b.robot.0);
            }
        }

        self.touched.clear();
        self.touched.resize(robot_count, false);
        for collision in collisions.iter().filter(|c| in_range(c)) {
            for robot in collision.robots() {
                self.touched[robot.0] = true;
            }
        }

        self.group_of_root.clear();
        self.group_of_root.resize(robot_count, None);
        self.ungrouped.clear();
        for robot in 0..robot_count {
            if !self.touched[robot] {
                self.ungrouped.push(RobotId::new(robot));
                continue;
            }
            let root = self.find(robot);
            let index = match self.group_of_root[root] {
                Some(index) => index,
                None => self.next_group(root),
            };
            self.groups[index].robots.push(RobotId::new(robot));
        }

        for collision in collisions.iter().filter(|c| in_range(c)) {
            let root = self.find(collision.body_a.robot.0);
            if let Some(index) = self.group_of_root[root] {
                self.groups[index].collisions.push(collision.clone());
            }
        }

        self.groups()
    }

    /// Groups from the last [`build`](Self::build).
    #[must_use]
    pub fn groups(&self) -> &[MultiRobotCollisionGroup] {
        &self.groups[..self.group_count]
    }

    /// Robots not in any group after the last [`build`](Self::build), by id.
    #[must_use]
    pub fn ungrouped_robots(&self) -> &[RobotId] {
        &self.ungrouped
    }

    /// Claim the next group slot for `root`, reusing a cleared one if any.
    fn next_group(&mut self, root: usize) -> usize {
        let index = self.group_count;
        if index == self.groups.len() {
            self.groups.push(MultiRobotCollisionGroup::default());
        }
        self.group_count += 1;
        self.group_of_root[root] = Some(index);
        index
    }

    /// Find with path compression.
    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = x;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    /// Union by rank.
    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
    }
}
