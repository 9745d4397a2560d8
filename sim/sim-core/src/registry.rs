//! Per-tick accumulators of wrenches and impulses keyed by rigid body.
//!
//! Registries are flat arrays indexed by [`BodyId`]: every body has exactly one
//! slot, repeated additions accumulate, and [`SpatialRegistry::reset`] clears
//! the values without releasing storage.

use std::fmt;
use std::marker::PhantomData;

use nalgebra::{Point3, Vector3};
use sim_types::BodyId;

use crate::dynamics::spatial::{SpatialVector, force_at_point};

/// Marker for registries holding wrenches (force rate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wrench;

/// Marker for registries holding impulses (integrated force).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impulse;

/// Flat spatial-force accumulator, one slot per body.
///
/// Values are `[moment; force]` about the world origin, world frame.
pub struct SpatialRegistry<K> {
    values: Vec<SpatialVector>,
    touched: Vec<bool>,
    _kind: PhantomData<K>,
}

/// External wrenches applied before forward dynamics.
pub type RigidBodyWrenchRegistry = SpatialRegistry<Wrench>;

/// Impulses committed by constraint calculators.
pub type RigidBodyImpulseRegistry = SpatialRegistry<Impulse>;

impl<K> SpatialRegistry<K> {
    /// Registry with one zeroed slot per body.
    #[must_use]
    pub fn new(body_count: usize) -> Self {
        Self {
            values: vec![SpatialVector::zeros(); body_count],
            touched: vec![false; body_count],
            _kind: PhantomData,
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the registry has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Zero every slot.
    pub fn reset(&mut self) {
        self.values.fill(SpatialVector::zeros());
        self.touched.fill(false);
    }

    /// Accumulate a spatial value on a body. Unknown bodies are ignored.
    pub fn add(&mut self, body: BodyId, value: &SpatialVector) {
        if let Some(slot) = self.values.get_mut(body.0) {
            *slot += value;
            self.touched[body.0] = true;
        }
    }

    /// Accumulate a pure force applied at a world point.
    pub fn add_at_point(&mut self, body: BodyId, force: &Vector3<f64>, point: &Point3<f64>) {
        self.add(body, &force_at_point(&Vector3::zeros(), force, point));
    }

    /// Accumulated value of a body, zero if nothing was added.
    #[must_use]
    pub fn get(&self, body: BodyId) -> SpatialVector {
        self.values
            .get(body.0)
            .copied()
            .unwrap_or_else(SpatialVector::zeros)
    }

    /// Whether anything was added to a body since the last reset.
    #[must_use]
    pub fn contains(&self, body: BodyId) -> bool {
        self.touched.get(body.0).copied().unwrap_or(false)
    }

    /// Bodies with an entry and their accumulated values.
    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &SpatialVector)> {
        self.values
            .iter()
            .enumerate()
            .filter(|(index, _)| self.touched[*index])
            .map(|(index, value)| (BodyId(index), value))
    }
}

impl<K> Clone for SpatialRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            touched: self.touched.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for SpatialRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::spatial::{angular_part, linear_part};
    use approx::assert_relative_eq;

    #[test]
    fn test_additions_accumulate() {
        let mut registry = RigidBodyWrenchRegistry::new(3);
        registry.add_at_point(BodyId::new(1), &Vector3::x(), &Point3::new(0.0, 0.0, 1.0));
        registry.add_at_point(BodyId::new(1), &Vector3::x(), &Point3::new(0.0, 0.0, -1.0));

        let total = registry.get(BodyId::new(1));
        assert_relative_eq!(linear_part(&total), Vector3::new(2.0, 0.0, 0.0));
        // Opposite lever arms cancel the moment.
        assert_relative_eq!(angular_part(&total), Vector3::zeros());
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn test_reset_keeps_slots() {
        let mut registry = RigidBodyImpulseRegistry::new(2);
        registry.add(BodyId::new(0), &SpatialVector::repeat(1.0));
        registry.reset();

        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(BodyId::new(0)));
        assert_relative_eq!(registry.get(BodyId::new(0)).norm(), 0.0);
    }

    #[test]
    fn test_unknown_body_ignored() {
        let mut registry = RigidBodyImpulseRegistry::new(1);
        registry.add(BodyId::new(5), &SpatialVector::repeat(1.0));
        assert_eq!(registry.iter().count(), 0);
    }
}
