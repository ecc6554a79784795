//! Constrained least-squares density fitting.
//!
//! Minimizes `xᵀMx − 2bᵀx` subject to `Cx = t` by solving the bordered
//! (KKT) system
//!
//! ```text
//! [ M+εI  Cᵀ ] [x]   [b]
//! [ C     0  ] [λ] = [t]
//! ```
//!
//! with a symmetric-indefinite LDLᵀ factorization. The same factorization
//! handles the unconstrained normal equations.

mod constraints;
mod ldlt;
#[cfg(test)]
mod tests;

pub use constraints::{ConstraintMode, ConstraintSet, LinearConstraint};
pub use ldlt::{Pivot, SymmetricFactorization};

use crate::adapter::IntegralBundle;
use crate::error::{DensityError, DensityResult};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    /// Tikhonov shift ε added to the metric diagonal.
    pub ridge: f64,
    /// A pivot at or below `pivot_tolerance * max|A_ij|` means the system is
    /// numerically singular.
    pub pivot_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            ridge: 0.0,
            pivot_tolerance: DEFAULT_PIVOT_TOLERANCE,
        }
    }
}

/// Raw solution of one KKT system.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub coefficients: DVector<f64>,
    pub multipliers: DVector<f64>,
    /// `xᵀ(M+εI)x − 2bᵀx` at the optimum.
    pub objective: f64,
    pub constraint_violation: f64,
    pub smallest_pivot: f64,
}

/// Fitted coefficients of one molecule and the diagnostics of the fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub molecule_id: String,
    pub basis_name: String,
    pub constraint_mode: ConstraintMode,
    pub ridge: f64,
    pub coefficients: DVector<f64>,
    pub multipliers: DVector<f64>,
    pub objective: f64,
    /// `⟨ρ−ρ̃|ρ−ρ̃⟩`, only when the backend knows `⟨ρ|ρ⟩`.
    pub residual: Option<f64>,
    pub constraint_violation: f64,
    pub smallest_pivot: f64,
}

impl FitResult {
    /// Fit error used to rank bases: the residual if known, else the objective.
    pub fn quality(&self) -> f64 {
        self.residual.unwrap_or(self.objective)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConstrainedSolver {
    options: SolverOptions,
}

impl ConstrainedSolver {
    pub fn new(options: SolverOptions) -> DensityResult<Self> {
        if !(options.ridge.is_finite() && options.ridge >= 0.0) {
            return Err(DensityError::Configuration(format!(
                "ridge must be a non-negative number, got {}",
                options.ridge
            )));
        }
        if !(options.pivot_tolerance.is_finite() && options.pivot_tolerance >= 0.0) {
            return Err(DensityError::Configuration(format!(
                "pivot tolerance must be a non-negative number, got {}",
                options.pivot_tolerance
            )));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Solve the fitting problem for a plain metric/target pair.
    pub fn solve(
        &self,
        metric: &DMatrix<f64>,
        target: &DVector<f64>,
        constraints: &ConstraintSet,
    ) -> DensityResult<Solution> {
        let n = target.len();
        if metric.nrows() != n || metric.ncols() != n {
            return Err(DensityError::dimension(
                format!("metric of a {}x{} fitting system", metric.nrows(), metric.ncols()),
                n,
                metric.nrows().max(metric.ncols()),
            ));
        }
        if constraints.dimension() != n {
            return Err(DensityError::Configuration(format!(
                "constraints are defined for {} unknowns but the metric has {}",
                constraints.dimension(),
                n
            )));
        }

        let k = constraints.len();
        let c = constraints.matrix();
        let t = constraints.targets();
        let ridge = self.options.ridge;

        let mut kkt = DMatrix::zeros(n + k, n + k);
        kkt.view_mut((0, 0), (n, n)).copy_from(metric);
        for i in 0..n {
            kkt[(i, i)] += ridge;
        }
        if k > 0 {
            kkt.view_mut((n, 0), (k, n)).copy_from(&c);
            kkt.view_mut((0, n), (n, k)).copy_from(&c.transpose());
        }

        let mut rhs = DVector::zeros(n + k);
        rhs.rows_mut(0, n).copy_from(target);
        rhs.rows_mut(n, k).copy_from(&t);

        let factorization = SymmetricFactorization::new(&kkt);
        let smallest_pivot = factorization.smallest_pivot();
        let threshold = self.options.pivot_tolerance * kkt.amax();
        if !(smallest_pivot > threshold) {
            return Err(DensityError::IllConditionedFit {
                smallest_pivot,
                threshold,
            });
        }

        let (_, negative, _) = factorization.inertia();
        if negative != k {
            return Err(DensityError::IndefiniteMetric { negative, expected: k });
        }

        let solution = factorization.solve(&rhs);
        let coefficients = solution.rows(0, n).into_owned();
        let multipliers = solution.rows(n, k).into_owned();

        // At the stationary point xᵀ(M+εI)x = bᵀx − λᵀCx = bᵀx − λᵀt.
        let objective = -target.dot(&coefficients) - multipliers.dot(&t);
        let constraint_violation = constraints.violation(&coefficients);

        debug!(
            "Solved {}x{} fitting system: objective {:.10}, smallest pivot {:.3e}, violation {:.3e}",
            n + k,
            n + k,
            objective,
            smallest_pivot,
            constraint_violation
        );

        Ok(Solution {
            coefficients,
            multipliers,
            objective,
            constraint_violation,
            smallest_pivot,
        })
    }

    /// Fit the density described by `bundle`.
    pub fn fit(&self, bundle: &IntegralBundle, constraints: &ConstraintSet) -> DensityResult<FitResult> {
        let solution = self.solve(&bundle.metric, &bundle.target, constraints)?;
        let ridge = self.options.ridge;
        let residual = bundle.self_interaction.map(|self_interaction| {
            self_interaction + solution.objective - ridge * solution.coefficients.norm_squared()
        });

        Ok(FitResult {
            molecule_id: bundle.molecule_id.clone(),
            basis_name: bundle.basis_name.clone(),
            constraint_mode: constraints.mode(),
            ridge,
            coefficients: solution.coefficients,
            multipliers: solution.multipliers,
            objective: solution.objective,
            residual,
            constraint_violation: solution.constraint_violation,
            smallest_pivot: solution.smallest_pivot,
        })
    }
}
