//! Projected Gauss-Seidel (PGS) for small dense LCPs.
//!
//! Solves the linear complementarity problem
//!
//! ```text
//! w = A · λ + b
//! λ ≥ 0,  w ≥ 0,  λᵢ · wᵢ = 0
//! ```
//!
//! by sweeping the rows in order and projecting each multiplier onto `λᵢ ≥ 0`:
//!
//! ```text
//! λᵢ ← max(0, λᵢ - ω · (Aᵢ · λ + bᵢ) / Aᵢᵢ)
//! ```
//!
//! With `A` the joint-space inverse inertia of a set of joint limits, `λ` the
//! limit impulses and `b` the velocity error, this is exactly the unilateral
//! limit problem. Rows with a non-positive diagonal cannot be acted on and keep
//! a zero multiplier.

use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the PGS solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PgsConfig {
    /// Maximum number of sweeps.
    pub max_iterations: usize,

    /// Stop once no multiplier moves by more than this.
    pub tolerance: f64,

    /// Successive over-relaxation factor ω.
    /// - 1.0: Standard Gauss-Seidel
    /// - < 1.0: Under-relaxation (more stable)
    /// - > 1.0: Over-relaxation (faster convergence if stable, up to ~1.9)
    pub sor_factor: f64,

    /// Added to every diagonal entry.
    pub regularization: f64,
}

impl Default for PgsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-14,
            sor_factor: 1.0,
            regularization: 0.0,
        }
    }
}

/// Outcome of a PGS solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PgsResult {
    /// Sweeps performed.
    pub iterations: usize,
    /// Largest multiplier change in the last sweep.
    pub residual: f64,
    /// Whether `residual` dropped below the tolerance.
    pub converged: bool,
}

/// Dense projected Gauss-Seidel solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectedGaussSeidel {
    config: PgsConfig,
}

impl ProjectedGaussSeidel {
    /// Solver with the given configuration.
    #[must_use]
    pub fn new(config: PgsConfig) -> Self {
        Self { config }
    }

    /// Solver configuration.
    #[must_use]
    pub fn config(&self) -> &PgsConfig {
        &self.config
    }

    /// Solve the LCP in place, warm-started from the incoming `lambda`.
    ///
    /// `lambda` is resized to the problem size if needed.
    pub fn solve(&self, a: &DMatrix<f64>, b: &DVector<f64>, lambda: &mut DVector<f64>) -> PgsResult {
        let n = b.len();
        if lambda.len() != n {
            *lambda = DVector::zeros(n);
        }
        if n == 0 {
            return PgsResult {
                iterations: 0,
                residual: 0.0,
                converged: true,
            };
        }

        let mut residual = 0.0;
        for iteration in 1..=self.config.max_iterations {
            residual = 0.0;
            for i in 0..n {
                let diagonal = a[(i, i)] + self.config.regularization;
                if diagonal <= 0.0 {
                    lambda[i] = 0.0;
                    continue;
                }
                let w = (0..n).map(|j| a[(i, j)] * lambda[j]).sum::<f64>() + b[i];
                let updated = (lambda[i] - self.config.sor_factor * w / diagonal).max(0.0);
                residual = f64::max(residual, (updated - lambda[i]).abs());
                lambda[i] = updated;
            }
            if residual <= self.config.tolerance {
                return PgsResult {
                    iterations: iteration,
                    residual,
                    converged: true,
                };
            }
        }

        PgsResult {
            iterations: self.config.max_iterations,
            residual,
            converged: false,
        }
    }
}
