//! Per-contact iteration over one collision group.
//!
//! Every constraint of the group (one contact calculator per collision, then
//! one joint-limit calculator per robot) is solved in turn, seeing the
//! velocity changes the others currently cause through the shared
//! [`DeltaTwistRegistry`]. Passes repeat until the impulses settle:
//!
//! ```text
//! α ← 1
//! repeat
//!     for each calculator c, in order:
//!         c.update_impulse(dt, α)      // reads the others' slots
//!         c.update_twist_modifiers()    // publishes Δλ_c into the others' slots
//!     α ← α_min + γ · (α - α_min)
//! until max |Δλ| < tol and max |Δv| < tol
//! ```
//!
//! The processing order is insertion order and is part of the result.

use std::fmt;

use sim_contact::{ContactParameters, SingleContactImpulseCalculator};
use sim_core::constraint::{DeltaTwistRegistry, ImpulseBasedConstraintCalculator};
use sim_core::{CalculatorPool, CollisionResult, ImpulseBasedRobot, PoolHandle};
use sim_types::{RobotId, SolverConfig};

use crate::islands::MultiRobotCollisionGroup;
use crate::limits::{ConstraintParameters, RobotJointLimitImpulseBasedCalculator};

/// Stage reached by [`MultiContactImpulseCalculator::compute_impulses`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MultiContactStep {
    /// Entered `compute_impulses`.
    Start,
    /// Every calculator predicted its free velocities.
    Initialize,
    /// Joint-limit calculators without an active limit were dropped.
    FilterCalculators {
        /// Number of calculators removed.
        removed: usize,
    },
    /// Apparent inertias and couplings are ready.
    ComputeInertia,
    /// One SOR pass finished.
    SolverPass {
        /// Pass number, starting at 1.
        iteration: usize,
        /// Relaxation factor used by the pass.
        alpha: f64,
        /// Largest impulse change of the pass.
        max_impulse_update: f64,
        /// Largest constrained-velocity change of the pass.
        max_velocity_update: f64,
        /// Calculators with a non-zero impulse after the pass.
        active_calculators: usize,
    },
    /// Impulses are committed.
    Finalize {
        /// Whether the iteration settled within its budget.
        converged: bool,
    },
}

/// Observer of the solver's progress.
pub trait MultiContactStepListener {
    /// Called once per reached step.
    fn on_step(&mut self, step: &MultiContactStep);
}

impl<F: FnMut(&MultiContactStep)> MultiContactStepListener for F {
    fn on_step(&mut self, step: &MultiContactStep) {
        self(step);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CalculatorRef {
    Contact(PoolHandle),
    Limit(PoolHandle),
}

fn resolve<'a>(
    contacts: &'a mut CalculatorPool<SingleContactImpulseCalculator>,
    limits: &'a mut CalculatorPool<RobotJointLimitImpulseBasedCalculator>,
    calculator: CalculatorRef,
) -> Option<&'a mut dyn ImpulseBasedConstraintCalculator> {
    match calculator {
        CalculatorRef::Contact(handle) => contacts
            .get_mut(handle)
            .map(|c| c as &mut dyn ImpulseBasedConstraintCalculator),
        CalculatorRef::Limit(handle) => limits
            .get_mut(handle)
            .map(|c| c as &mut dyn ImpulseBasedConstraintCalculator),
    }
}

fn resolve_ref<'a>(
    contacts: &'a CalculatorPool<SingleContactImpulseCalculator>,
    limits: &'a CalculatorPool<RobotJointLimitImpulseBasedCalculator>,
    calculator: CalculatorRef,
) -> Option<&'a dyn ImpulseBasedConstraintCalculator> {
    match calculator {
        CalculatorRef::Contact(handle) => contacts
            .get(handle)
            .map(|c| c as &dyn ImpulseBasedConstraintCalculator),
        CalculatorRef::Limit(handle) => limits
            .get(handle)
            .map(|c| c as &dyn ImpulseBasedConstraintCalculator),
    }
}

/// Solves all contacts and joint limits of one collision group together.
pub struct MultiContactImpulseCalculator {
    config: SolverConfig,
    contact_parameters: ContactParameters,
    constraint_parameters: ConstraintParameters,

    contacts: CalculatorPool<SingleContactImpulseCalculator>,
    limits: CalculatorPool<RobotJointLimitImpulseBasedCalculator>,
    calculators: Vec<CalculatorRef>,
    registry: DeltaTwistRegistry,
    robots: Vec<RobotId>,

    iterations: usize,
    converged: bool,
    max_impulse_update: f64,
    max_velocity_update: f64,
    warned_non_convergence: bool,
    verbose: bool,
    listener: Option<Box<dyn MultiContactStepListener>>,
}

impl fmt::Debug for MultiContactImpulseCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiContactImpulseCalculator")
            .field("config", &self.config)
            .field("calculators", &self.calculators.len())
            .field("robots", &self.robots)
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

impl Default for MultiContactImpulseCalculator {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl MultiContactImpulseCalculator {
    /// Solver with the given configuration.
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            contact_parameters: ContactParameters::default(),
            constraint_parameters: ConstraintParameters::default(),
            contacts: CalculatorPool::new(),
            limits: CalculatorPool::new(),
            calculators: Vec::new(),
            registry: DeltaTwistRegistry::new(),
            robots: Vec::new(),
            iterations: 0,
            converged: false,
            max_impulse_update: 0.0,
            max_velocity_update: 0.0,
            warned_non_convergence: false,
            verbose: false,
            listener: None,
        }
    }

    /// Solver configuration.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Replace the solver configuration.
    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    /// Set the convergence tolerance.
    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.config.tolerance = tolerance;
    }

    /// Set the pass budget.
    pub fn set_max_number_of_iterations(&mut self, max_iterations: usize) {
        self.config.max_iterations = max_iterations;
    }

    /// Set the lower bound of the relaxation factor.
    pub fn set_alpha_min(&mut self, alpha_min: f64) {
        self.config.alpha_min = alpha_min;
    }

    /// Set the relaxation decay rate.
    pub fn set_gamma(&mut self, gamma: f64) {
        self.config.gamma = gamma;
    }

    /// Set the closing-velocity tolerance of every contact.
    pub fn set_single_contact_tolerance(&mut self, tolerance: f64) {
        self.config.single_contact_tolerance = tolerance;
    }

    /// Enable or disable the independent fallback.
    pub fn set_solve_contacts_independently_on_failure(&mut self, enabled: bool) {
        self.config.solve_contacts_independently_on_failure = enabled;
    }

    /// Contact parameters used by [`configure`](Self::configure).
    pub fn set_contact_parameters(&mut self, parameters: ContactParameters) {
        self.contact_parameters = parameters;
    }

    /// Parameters of the joint-limit calculators.
    pub fn set_constraint_parameters(&mut self, parameters: ConstraintParameters) {
        self.constraint_parameters = parameters;
    }

    /// Log every calculator update at debug level.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Install a progress observer.
    pub fn set_listener(&mut self, listener: impl MultiContactStepListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Remove the progress observer.
    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    /// Build the calculators of `group` with the default contact parameters.
    pub fn configure(&mut self, group: &MultiRobotCollisionGroup) {
        let parameters = self.contact_parameters;
        self.configure_with(group, |_| parameters);
    }

    /// Build the calculators of `group`, choosing the contact parameters of each
    /// collision with `contact_parameters`.
    pub fn configure_with(
        &mut self,
        group: &MultiRobotCollisionGroup,
        contact_parameters: impl Fn(&CollisionResult) -> ContactParameters,
    ) {
        self.contacts.clear();
        self.limits.clear();
        self.calculators.clear();
        self.registry.clear();
        self.robots.clear();
        self.robots.extend_from_slice(&group.robots);
        self.iterations = 0;
        self.converged = false;

        let tolerance = self.config.single_contact_tolerance;
        for collision in &group.collisions {
            let (handle, calculator) = self
                .contacts
                .next_available(SingleContactImpulseCalculator::default);
            calculator.set_contact_parameters(contact_parameters(collision));
            calculator.set_tolerance(tolerance);
            calculator.set_collision(collision.clone());
            self.calculators.push(CalculatorRef::Contact(handle));
        }

        let constraint_parameters = self.constraint_parameters;
        for &robot in &group.robots {
            let (handle, calculator) = self.limits.next_available(|| {
                RobotJointLimitImpulseBasedCalculator::new(robot, constraint_parameters)
            });
            calculator.reset(robot, constraint_parameters);
            self.calculators.push(CalculatorRef::Limit(handle));
        }
    }

    fn notify(&mut self, step: MultiContactStep) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_step(&step);
        }
    }

    /// Solve the configured group. Returns the smaller of the last pass's
    /// impulse and velocity residuals, 0 when no iteration was needed.
    pub fn compute_impulses(&mut self, dt: f64, robots: &[ImpulseBasedRobot]) -> f64 {
        self.notify(MultiContactStep::Start);
        self.iterations = 0;
        self.converged = false;
        self.max_impulse_update = 0.0;
        self.max_velocity_update = 0.0;

        for &calculator in &self.calculators {
            if let Some(c) = resolve(&mut self.contacts, &mut self.limits, calculator) {
                c.initialize(dt, robots);
            }
        }
        self.notify(MultiContactStep::Initialize);

        let before = self.calculators.len();
        let limits = &self.limits;
        self.calculators.retain(|calculator| match calculator {
            CalculatorRef::Contact(_) => true,
            CalculatorRef::Limit(handle) => limits
                .get(*handle)
                .is_some_and(|c| !c.active_limits().is_empty()),
        });
        let removed = before - self.calculators.len();
        self.notify(MultiContactStep::FilterCalculators { removed });

        self.registry.clear();
        for (owner, &calculator) in self.calculators.iter().enumerate() {
            if let Some(c) = resolve(&mut self.contacts, &mut self.limits, calculator) {
                c.register_targets(owner, &mut self.registry);
            }
        }
        for &calculator in &self.calculators {
            if let Some(c) = resolve(&mut self.contacts, &mut self.limits, calculator) {
                c.update_inertia(robots, &self.registry);
            }
        }
        self.notify(MultiContactStep::ComputeInertia);

        match self.calculators.len() {
            0 => {
                self.converged = true;
                self.notify(MultiContactStep::Finalize { converged: true });
                return 0.0;
            }
            1 => {
                let calculator = self.calculators[0];
                if let Some(c) = resolve(&mut self.contacts, &mut self.limits, calculator) {
                    c.compute_impulse(dt, &self.registry);
                    c.finalize_impulse();
                }
                self.converged = true;
                self.notify(MultiContactStep::Finalize { converged: true });
                return 0.0;
            }
            _ => {}
        }

        let mut alpha = 1.0;
        loop {
            let mut max_impulse_update: f64 = 0.0;
            let mut max_velocity_update: f64 = 0.0;
            let mut active_calculators = 0;

            for &calculator in &self.calculators {
                let Some(c) = resolve(&mut self.contacts, &mut self.limits, calculator) else {
                    continue;
                };
                c.update_impulse(dt, alpha, self.verbose, &self.registry);
                c.update_twist_modifiers(&mut self.registry);
                max_impulse_update = max_impulse_update.max(c.impulse_update());
                max_velocity_update = max_velocity_update.max(c.velocity_update());
                if c.is_constraint_active() {
                    active_calculators += 1;
                }
            }

            self.iterations += 1;
            self.max_impulse_update = max_impulse_update;
            self.max_velocity_update = max_velocity_update;
            tracing::trace!(
                iteration = self.iterations,
                alpha,
                max_impulse_update,
                max_velocity_update,
                active_calculators,
                "SOR pass"
            );
            self.notify(MultiContactStep::SolverPass {
                iteration: self.iterations,
                alpha,
                max_impulse_update,
                max_velocity_update,
                active_calculators,
            });

            // A constraint solved early in the first pass may start closing
            // again once later ones act, so closing is re-evaluated here.
            if self.iterations == 1 && self.engaged_calculators() <= 1 {
                self.converged = true;
                break;
            }
            if max_impulse_update <= self.config.tolerance
                && max_velocity_update <= self.config.tolerance
            {
                self.converged = true;
                break;
            }

            alpha = self.config.decay_alpha(alpha);

            if self.iterations > self.config.max_iterations {
                if !self.warned_non_convergence {
                    self.warned_non_convergence = true;
                    tracing::warn!(
                        iterations = self.iterations,
                        max_impulse_update,
                        max_velocity_update,
                        calculators = self.calculators.len(),
                        "multi-contact solver did not converge"
                    );
                }
                break;
            }
        }

        let converged = self.converged;
        if !converged && self.config.solve_contacts_independently_on_failure {
            self.registry.reset_values();
            for &calculator in &self.calculators {
                if let Some(c) = resolve(&mut self.contacts, &mut self.limits, calculator) {
                    c.compute_impulse(dt, &self.registry);
                    c.finalize_impulse();
                }
            }
        } else {
            for &calculator in &self.calculators {
                if let Some(c) = resolve(&mut self.contacts, &mut self.limits, calculator) {
                    c.finalize_impulse();
                }
            }
        }
        self.notify(MultiContactStep::Finalize { converged });

        self.max_impulse_update.min(self.max_velocity_update)
    }

    /// Calculators pushing or still closing against the current registry.
    fn engaged_calculators(&self) -> usize {
        self.calculators
            .iter()
            .filter_map(|&c| resolve_ref(&self.contacts, &self.limits, c))
            .filter(|c| c.is_constraint_active() || c.is_closing(&self.registry))
            .count()
    }

    fn active_calculators(&self) -> impl Iterator<Item = &dyn ImpulseBasedConstraintCalculator> {
        self.calculators
            .iter()
            .filter_map(|&c| resolve_ref(&self.contacts, &self.limits, c))
            .filter(|c| c.is_constraint_active())
    }

    /// Add every active calculator's joint velocity change to its robots.
    pub fn write_joint_delta_velocities(&self, robots: &mut [ImpulseBasedRobot]) {
        for calculator in self.active_calculators() {
            for robot in calculator.robots() {
                let (Some(change), Some(target)) =
                    (calculator.joint_velocity_change(robot), robots.get_mut(robot.0))
                else {
                    continue;
                };
                target.add_joint_velocity_change(change);
            }
        }
    }

    /// Add every active calculator's body impulses to its robots' registries.
    pub fn write_impulses(&self, robots: &mut [ImpulseBasedRobot]) {
        for calculator in self.active_calculators() {
            for robot in calculator.robots() {
                if let Some(target) = robots.get_mut(robot.0) {
                    calculator.write_impulses(robot, target.impulses_mut());
                }
            }
        }
    }

    /// Whether the last solve settled before the pass budget ran out.
    #[must_use]
    pub fn has_converged(&self) -> bool {
        self.converged
    }

    /// Number of SOR passes of the last solve.
    #[must_use]
    pub fn number_of_iterations(&self) -> usize {
        self.iterations
    }

    /// Number of calculators taking part in the solve.
    #[must_use]
    pub fn calculator_count(&self) -> usize {
        self.calculators.len()
    }

    /// Robots of the configured group.
    #[must_use]
    pub fn robots(&self) -> &[RobotId] {
        &self.robots
    }

    /// Contact calculators of the configured group, in order.
    pub fn contact_calculators(&self) -> impl Iterator<Item = &SingleContactImpulseCalculator> {
        self.calculators.iter().filter_map(|c| match c {
            CalculatorRef::Contact(handle) => self.contacts.get(*handle),
            CalculatorRef::Limit(_) => None,
        })
    }

    /// Joint-limit calculators still taking part in the solve.
    pub fn joint_limit_calculators(
        &self,
    ) -> impl Iterator<Item = &RobotJointLimitImpulseBasedCalculator> {
        self.calculators.iter().filter_map(|c| match c {
            CalculatorRef::Limit(handle) => self.limits.get(*handle),
            CalculatorRef::Contact(_) => None,
        })
    }
}
