//! Impulse-based constraint calculators and their shared twist bookkeeping.
//!
//! Constraints in one collision group are solved one at a time (per-contact
//! iteration). Each calculator owns a set of *targets*: rigid bodies whose
//! velocity it reads, or joint velocity coordinates it constrains. Every target
//! becomes a slot in the [`DeltaTwistRegistry`]. A calculator publishes the
//! velocity change its impulse causes at every slot owned by the *other*
//! calculators, and reads back its own slots to see the combined effect of
//! everyone else.
//!
//! ```text
//! calculator j, update_inertia:   R_j,s = response of slot s to unit impulses of j
//! calculator j, twist modifiers:  slot s += R_j,s · (λ_j - λ_j,published)
//! calculator i, update_impulse:   v_i = v_i,free + Σ own slots
//! ```

use std::ops::Range;

use nalgebra::{DMatrix, DVector};
use smallvec::SmallVec;
use sim_types::{BodyId, RobotId};

use crate::dynamics::{ImpulseResponse, SpatialVector};
use crate::registry::RigidBodyImpulseRegistry;
use crate::robot::ImpulseBasedRobot;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Something a constraint calculator reads or acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstraintTarget {
    /// Spatial velocity of a rigid body.
    RigidBody {
        /// Owning robot.
        robot: RobotId,
        /// Body within the robot.
        body: BodyId,
    },
    /// A single joint velocity coordinate.
    JointDof {
        /// Owning robot.
        robot: RobotId,
        /// Index into the robot's velocity vector.
        dof: usize,
    },
}

impl ConstraintTarget {
    /// Robot the target belongs to.
    #[must_use]
    pub fn robot(&self) -> RobotId {
        match self {
            Self::RigidBody { robot, .. } | Self::JointDof { robot, .. } => *robot,
        }
    }

    /// Number of scalars needed to store a velocity change of the target.
    #[must_use]
    pub fn dim(&self) -> usize {
        match self {
            Self::RigidBody { .. } => 6,
            Self::JointDof { .. } => 1,
        }
    }

    /// Velocity change of this target inside a robot response.
    fn extract(&self, response: &ImpulseResponse) -> DVector<f64> {
        match self {
            Self::RigidBody { body, .. } => {
                DVector::from_column_slice(response.body_velocity_change(*body).as_slice())
            }
            Self::JointDof { dof, .. } => DVector::from_element(
                1,
                response
                    .joint_velocity_change()
                    .get(*dof)
                    .copied()
                    .unwrap_or(0.0),
            ),
        }
    }
}

/// A registered target and where its value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwistSlot {
    /// Index of the calculator that owns the slot.
    pub owner: usize,
    /// What the slot measures.
    pub target: ConstraintTarget,
    offset: usize,
}

impl TwistSlot {
    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.target.dim()
    }
}

/// Velocity changes injected into each calculator by the others.
///
/// Storage is a flat `f64` array: 6 values per rigid-body slot, 1 per joint
/// slot. [`DeltaTwistRegistry::clear`] drops the slots and keeps the capacity.
#[derive(Debug, Clone, Default)]
pub struct DeltaTwistRegistry {
    slots: Vec<TwistSlot>,
    values: Vec<f64>,
}

impl DeltaTwistRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every slot.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.values.clear();
    }

    /// Zero the values of every slot, keeping the slots.
    pub fn reset_values(&mut self) {
        self.values.fill(0.0);
    }

    /// Register a target owned by calculator `owner`. Returns the slot index.
    pub fn register(&mut self, owner: usize, target: ConstraintTarget) -> usize {
        let offset = self.values.len();
        self.values.resize(offset + target.dim(), 0.0);
        self.slots.push(TwistSlot {
            owner,
            target,
            offset,
        });
        self.slots.len() - 1
    }

    /// All registered slots.
    #[must_use]
    pub fn slots(&self) -> &[TwistSlot] {
        &self.slots
    }

    /// Number of registered slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current value of a slot.
    #[must_use]
    pub fn value(&self, slot: usize) -> &[f64] {
        match self.slots.get(slot) {
            Some(s) => &self.values[s.range()],
            None => &[],
        }
    }

    /// Spatial velocity change accumulated in a rigid-body slot.
    #[must_use]
    pub fn rigid_body_delta(&self, slot: usize) -> SpatialVector {
        let value = self.value(slot);
        if value.len() == 6 {
            SpatialVector::from_column_slice(value)
        } else {
            SpatialVector::zeros()
        }
    }

    /// Joint velocity change accumulated in a joint slot.
    #[must_use]
    pub fn joint_delta(&self, slot: usize) -> f64 {
        self.value(slot).first().copied().unwrap_or(0.0)
    }

    /// Add to a slot's value.
    pub fn add(&mut self, slot: usize, delta: &DVector<f64>) {
        if let Some(s) = self.slots.get(slot) {
            for (value, d) in self.values[s.range()].iter_mut().zip(delta.iter()) {
                *value += d;
            }
        }
    }

    /// Add `matrix * x` to a slot's value.
    pub fn add_product(&mut self, slot: usize, matrix: &DMatrix<f64>, x: &DVector<f64>) {
        if matrix.ncols() != x.len() {
            return;
        }
        if let Some(s) = self.slots.get(slot) {
            for (row, value) in self.values[s.range()].iter_mut().enumerate().take(matrix.nrows()) {
                *value += (0..x.len()).map(|col| matrix[(row, col)] * x[col]).sum::<f64>();
            }
        }
    }
}

/// Response of the other calculators' slots to one calculator's impulse.
///
/// One matrix per coupled slot, `slot dim × impulse dim`. Matrices are kept
/// across [`clear`](Self::clear) and reused by the next recording.
#[derive(Debug, Clone, Default)]
pub struct TwistCoupling {
    entries: Vec<(usize, DMatrix<f64>)>,
    count: usize,
}

impl TwistCoupling {
    /// Forget all couplings.
    pub fn clear(&mut self) {
        self.count = 0;
    }

    /// Record column `column` of the coupling from one robot's response to a
    /// unit impulse component.
    ///
    /// Only slots of other owners in `robot` are recorded.
    pub fn record(
        &mut self,
        owner: usize,
        registry: &DeltaTwistRegistry,
        robot: RobotId,
        response: &ImpulseResponse,
        column: usize,
        impulse_dim: usize,
    ) {
        for (slot_index, slot) in registry.slots().iter().enumerate() {
            if slot.owner == owner || slot.target.robot() != robot {
                continue;
            }
            let delta = slot.target.extract(response);
            let existing = self.entries[..self.count].iter().position(|(s, _)| *s == slot_index);
            let position = match existing {
                Some(position) => position,
                None => self.claim(slot_index, slot.target.dim(), impulse_dim),
            };
            self.entries[position].1.set_column(column, &delta);
        }
    }

    /// Take the next entry for `slot`, zeroed and shaped `rows × cols`.
    fn claim(&mut self, slot: usize, rows: usize, cols: usize) -> usize {
        let index = self.count;
        match self.entries.get_mut(index) {
            Some((entry_slot, matrix)) => {
                *entry_slot = slot;
                if matrix.shape() != (rows, cols) {
                    matrix.resize_mut(rows, cols, 0.0);
                }
                matrix.fill(0.0);
            }
            None => self.entries.push((slot, DMatrix::zeros(rows, cols))),
        }
        self.count += 1;
        index
    }

    /// Publish the effect of an impulse change into the coupled slots.
    pub fn publish(&self, registry: &mut DeltaTwistRegistry, impulse_change: &DVector<f64>) {
        for (slot, matrix) in &self.entries[..self.count] {
            registry.add_product(*slot, matrix, impulse_change);
        }
    }

    /// Number of coupled slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether nothing is coupled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A constraint solved with impulses inside one collision group.
///
/// The driver calls, in order: [`initialize`](Self::initialize),
/// [`register_targets`](Self::register_targets),
/// [`update_inertia`](Self::update_inertia), then either
/// [`compute_impulse`](Self::compute_impulse) once or repeated
/// [`update_impulse`](Self::update_impulse) /
/// [`update_twist_modifiers`](Self::update_twist_modifiers) passes, and finally
/// [`finalize_impulse`](Self::finalize_impulse).
pub trait ImpulseBasedConstraintCalculator {
    /// Predict the target velocities without this constraint's impulse.
    fn initialize(&mut self, dt: f64, robots: &[ImpulseBasedRobot]);

    /// Register this calculator's targets as slots owned by `owner`.
    fn register_targets(&mut self, owner: usize, registry: &mut DeltaTwistRegistry);

    /// Compute the apparent inertia at the constraint and the coupling to the
    /// slots of the other calculators.
    fn update_inertia(&mut self, robots: &[ImpulseBasedRobot], registry: &DeltaTwistRegistry);

    /// Solve the constraint on its own, no relaxation.
    fn compute_impulse(&mut self, dt: f64, registry: &DeltaTwistRegistry);

    /// One relaxed solve given the current contributions of the others.
    fn update_impulse(&mut self, dt: f64, alpha: f64, verbose: bool, registry: &DeltaTwistRegistry);

    /// Publish the change of this calculator's impulse into the others' slots.
    fn update_twist_modifiers(&mut self, registry: &mut DeltaTwistRegistry);

    /// Commit the impulse and the resulting joint velocity changes.
    fn finalize_impulse(&mut self);

    /// Magnitude of the impulse change in the last update.
    fn impulse_update(&self) -> f64;

    /// Magnitude of the constrained velocity change in the last update.
    fn velocity_update(&self) -> f64;

    /// Whether the constraint currently applies a non-zero impulse.
    fn is_constraint_active(&self) -> bool;

    /// Whether the constrained velocity is still approaching with this
    /// calculator's impulse and the others' current contributions applied.
    fn is_closing(&self, registry: &DeltaTwistRegistry) -> bool;

    /// Robots touched by this constraint.
    fn robots(&self) -> SmallVec<[RobotId; 2]>;

    /// Joint velocity change of `robot` due to the finalized impulse.
    fn joint_velocity_change(&self, robot: RobotId) -> Option<&DVector<f64>>;

    /// Add the finalized body impulses acting on `robot` to `registry`.
    fn write_impulses(&self, robot: RobotId, registry: &mut RigidBodyImpulseRegistry);
}
