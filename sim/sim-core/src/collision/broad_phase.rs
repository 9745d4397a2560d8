//! Broad-phase collision detection using Sweep-and-Prune (SAP).
//!
//! The broad phase works on bounding boxes only. It projects every box on the
//! axis with the largest spread, sorts the intervals by their minimum endpoint
//! and sweeps them to find overlaps, then confirms each candidate on all three
//! axes. Pairs of static proxies are never reported.
//!
//! # Example
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use sim_core::collision::{Aabb, BroadPhase, BroadPhaseProxy, SweepAndPrune};
//!
//! let proxies = [
//!     BroadPhaseProxy::new(Aabb::from_center(Point3::origin(), Vector3::repeat(1.0)), false),
//!     BroadPhaseProxy::new(Aabb::from_center(Point3::new(1.5, 0.0, 0.0), Vector3::repeat(1.0)), false),
//! ];
//!
//! let mut sap = SweepAndPrune::new();
//! assert_eq!(sap.find_potential_pairs(&proxies), vec![(0, 1)]);
//! ```

use nalgebra::{Point3, Vector3};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest box containing every point.
    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = Point3<f64>>) -> Self {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min = min.inf(&p);
            max = max.sup(&p);
        }
        Self { min, max }
    }

    /// Check if this AABB overlaps with another AABB.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: self.min - Vector3::repeat(margin),
            max: self.max + Vector3::repeat(margin),
        }
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Get the minimum value along a specific axis.
    #[must_use]
    pub fn min_on_axis(&self, axis: Axis) -> f64 {
        self.min[axis.index()]
    }

    /// Get the maximum value along a specific axis.
    #[must_use]
    pub fn max_on_axis(&self, axis: Axis) -> f64 {
        self.max[axis.index()]
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point3::origin(), Point3::origin())
    }
}

/// Coordinate axis for sweep direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// X-axis.
    X,
    /// Y-axis.
    Y,
    /// Z-axis.
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// What the broad phase sees of a collidable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BroadPhaseProxy {
    /// World bounding box.
    pub aabb: Aabb,
    /// Static proxies never pair with each other.
    pub is_static: bool,
}

impl BroadPhaseProxy {
    /// Create a proxy.
    #[must_use]
    pub const fn new(aabb: Aabb, is_static: bool) -> Self {
        Self { aabb, is_static }
    }
}

/// Trait for broad-phase collision detection algorithms.
pub trait BroadPhase {
    /// Index pairs `(i, j)`, `i < j`, of proxies whose boxes overlap.
    fn find_potential_pairs(&mut self, proxies: &[BroadPhaseProxy]) -> Vec<(usize, usize)>;
}

/// Sweep-and-Prune (Sort-and-Sweep) broad-phase algorithm.
#[derive(Debug, Clone, Default)]
pub struct SweepAndPrune {
    intervals: Vec<Interval>,
    sweep_axis: Option<Axis>,
    margin: f64,
}

#[derive(Debug, Clone, Copy)]
struct Interval {
    index: usize,
    min: f64,
    max: f64,
}

impl SweepAndPrune {
    /// Create a new sweep-and-prune broad phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand every box by `margin` before testing.
    #[must_use]
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Axis used by the last sweep.
    #[must_use]
    pub fn sweep_axis(&self) -> Option<Axis> {
        self.sweep_axis
    }

    /// Pick the axis with the largest spread of box centers, ignoring static
    /// proxies (terrain boxes are huge and would dominate).
    fn choose_sweep_axis(proxies: &[BroadPhaseProxy]) -> Axis {
        let centers = proxies
            .iter()
            .filter(|p| !p.is_static)
            .map(|p| p.aabb.center());
        let spread = Aabb::from_points(centers);
        let extent = spread.max - spread.min;
        if !extent.iter().all(|e| e.is_finite()) {
            return Axis::X;
        }
        if extent.x >= extent.y && extent.x >= extent.z {
            Axis::X
        } else if extent.y >= extent.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }
}

impl BroadPhase for SweepAndPrune {
    fn find_potential_pairs(&mut self, proxies: &[BroadPhaseProxy]) -> Vec<(usize, usize)> {
        let axis = Self::choose_sweep_axis(proxies);
        self.sweep_axis = Some(axis);

        let margin = self.margin;
        self.intervals.clear();
        self.intervals
            .extend(proxies.iter().enumerate().map(|(index, proxy)| {
                let aabb = proxy.aabb.expanded(margin);
                Interval {
                    index,
                    min: aabb.min_on_axis(axis),
                    max: aabb.max_on_axis(axis),
                }
            }));
        self.intervals.sort_by(|a, b| a.min.total_cmp(&b.min));

        let mut pairs = Vec::new();
        for (i, interval_i) in self.intervals.iter().enumerate() {
            for interval_j in &self.intervals[i + 1..] {
                if interval_j.min > interval_i.max {
                    break;
                }
                let (a, b) = (&proxies[interval_i.index], &proxies[interval_j.index]);
                if a.is_static && b.is_static {
                    continue;
                }
                if a.aabb.expanded(margin).overlaps(&b.aabb.expanded(margin)) {
                    let (lo, hi) = if interval_i.index < interval_j.index {
                        (interval_i.index, interval_j.index)
                    } else {
                        (interval_j.index, interval_i.index)
                    };
                    pairs.push((lo, hi));
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }
}

/// O(n²) broad phase for small scenes and cross-checking.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForce;

impl BroadPhase for BruteForce {
    fn find_potential_pairs(&mut self, proxies: &[BroadPhaseProxy]) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, a) in proxies.iter().enumerate() {
            for (j, b) in proxies.iter().enumerate().skip(i + 1) {
                if !(a.is_static && b.is_static) && a.aabb.overlaps(&b.aabb) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn sphere(x: f64, y: f64, radius: f64) -> BroadPhaseProxy {
        BroadPhaseProxy::new(
            Aabb::from_center(Point3::new(x, y, 0.0), Vector3::repeat(radius)),
            false,
        )
    }

    fn ground() -> BroadPhaseProxy {
        BroadPhaseProxy::new(
            Aabb::new(Point3::new(-1e6, -1e6, -1.0), Point3::new(1e6, 1e6, 0.0)),
            true,
        )
    }

    #[test]
    fn test_aabb_overlaps() {
        let a = Aabb::from_center(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::from_center(Point3::new(1.5, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let c = Aabb::from_center(Point3::new(5.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));

        assert!(a.overlaps(&b), "a and b should overlap");
        assert!(b.overlaps(&a), "overlap should be symmetric");
        assert!(!a.overlaps(&c), "a and c should not overlap");
    }

    #[test]
    fn test_aabb_expanded() {
        let aabb = Aabb::from_center(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let expanded = aabb.expanded(0.5);

        assert_eq!(expanded.min.x, -1.5);
        assert_eq!(expanded.max.x, 1.5);
    }

    #[test]
    fn test_sweep_and_prune_no_overlap() {
        let mut sap = SweepAndPrune::new();
        assert!(sap.find_potential_pairs(&[sphere(0.0, 0.0, 1.0), sphere(5.0, 0.0, 1.0)]).is_empty());
    }

    #[test]
    fn test_sweep_and_prune_skips_static_static() {
        let mut sap = SweepAndPrune::new();
        let pairs = sap.find_potential_pairs(&[ground(), ground()]);
        assert!(pairs.is_empty(), "static-static pairs should be skipped");
    }

    #[test]
    fn test_sweep_and_prune_includes_static_dynamic() {
        let mut sap = SweepAndPrune::new();
        let pairs = sap.find_potential_pairs(&[ground(), sphere(0.0, 0.0, 1.0)]);
        assert_eq!(pairs, vec![(0, 1)], "static-dynamic pairs should be included");
    }

    #[test]
    fn test_sweep_axis_follows_spread() {
        let mut sap = SweepAndPrune::new();
        sap.find_potential_pairs(&[sphere(0.0, 0.0, 0.1), sphere(0.0, 8.0, 0.1), ground()]);
        assert_eq!(sap.sweep_axis(), Some(Axis::Y));
    }

    #[test]
    fn test_brute_force_matches_sap() {
        let proxies = [
            sphere(0.0, 0.0, 1.0),
            sphere(1.5, 0.0, 1.0),
            sphere(0.0, 1.5, 1.0),
            sphere(5.0, 0.0, 1.0),
            ground(),
        ];
        let sap_pairs = SweepAndPrune::new().find_potential_pairs(&proxies);
        let mut brute_pairs = BruteForce.find_potential_pairs(&proxies);
        brute_pairs.sort_unstable();
        assert_eq!(sap_pairs, brute_pairs);
    }

    #[test]
    fn test_margin_expands_detection() {
        let proxies = [sphere(0.0, 0.0, 1.0), sphere(2.2, 0.0, 1.0)];
        assert!(SweepAndPrune::new().find_potential_pairs(&proxies).is_empty());
        let pairs = SweepAndPrune::new().with_margin(0.2).find_potential_pairs(&proxies);
        assert_eq!(pairs.len(), 1);
    }
}
