//! Linear equality constraints `C x = t` on the fitted coefficients.

use crate::adapter::IntegralBundle;
use crate::error::{DensityError, DensityResult};
use basis::Molecule;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Populations are compared against the electron count to this tolerance.
const POPULATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintMode {
    #[default]
    None,
    /// Total fitted charge equals the electron count.
    GlobalCharge,
    /// Each atom's block of coefficients carries that atom's population.
    PerAtomCharge,
}

impl fmt::Display for ConstraintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintMode::None => "none",
            ConstraintMode::GlobalCharge => "global_charge",
            ConstraintMode::PerAtomCharge => "per_atom_charge",
        };
        f.write_str(name)
    }
}

impl FromStr for ConstraintMode {
    type Err = DensityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(ConstraintMode::None),
            "global_charge" | "global" => Ok(ConstraintMode::GlobalCharge),
            "per_atom_charge" | "per_atom" => Ok(ConstraintMode::PerAtomCharge),
            other => Err(DensityError::Configuration(format!(
                "unknown constraint mode '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub label: String,
    pub coefficients: DVector<f64>,
    pub target: f64,
}

/// A validated set of constraint rows, all of length `dimension`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet {
    mode: ConstraintMode,
    dimension: usize,
    rows: Vec<LinearConstraint>,
}

impl ConstraintSet {
    pub fn none(dimension: usize) -> Self {
        Self {
            mode: ConstraintMode::None,
            dimension,
            rows: Vec::new(),
        }
    }

    pub fn new(mode: ConstraintMode, dimension: usize, rows: Vec<LinearConstraint>) -> DensityResult<Self> {
        for row in &rows {
            if row.coefficients.len() != dimension {
                return Err(DensityError::Configuration(format!(
                    "constraint '{}' has {} coefficients for {} unknowns",
                    row.label,
                    row.coefficients.len(),
                    dimension
                )));
            }
            if !row.target.is_finite() || row.coefficients.iter().any(|c| !c.is_finite()) {
                return Err(DensityError::Configuration(format!(
                    "constraint '{}' contains non-finite values",
                    row.label
                )));
            }
        }
        Ok(Self { mode, dimension, rows })
    }

    /// Constraints of `mode` for a molecule, built from the data in its bundle.
    pub fn for_bundle(mode: ConstraintMode, molecule: &Molecule, bundle: &IntegralBundle) -> DensityResult<Self> {
        let n = bundle.dimension();
        if mode == ConstraintMode::None {
            return Ok(Self::none(n));
        }

        let charges = bundle.charges.as_ref().ok_or_else(|| {
            DensityError::backend(molecule.id(), format!("{} constraint needs a charge vector", mode))
        })?;

        match mode {
            ConstraintMode::None => Ok(Self::none(n)),
            ConstraintMode::GlobalCharge => {
                let row = LinearConstraint {
                    label: "total charge".to_string(),
                    coefficients: charges.clone(),
                    target: molecule.electron_count() as f64,
                };
                Self::new(mode, n, vec![row])
            }
            ConstraintMode::PerAtomCharge => {
                let populations = bundle.atomic_populations.as_ref().ok_or_else(|| {
                    DensityError::backend(molecule.id(), "per-atom constraint needs atomic populations")
                })?;

                let total: f64 = populations.iter().sum();
                let electrons = molecule.electron_count() as f64;
                if (total - electrons).abs() > POPULATION_TOLERANCE {
                    warn!(
                        "Atomic populations of {} sum to {:.8}, but the molecule has {} electrons",
                        molecule.id(),
                        total,
                        electrons
                    );
                }

                let mut rows = Vec::with_capacity(populations.len());
                for (atom, (range, &population)) in bundle.atom_ranges.iter().zip(populations).enumerate() {
                    if range.is_empty() {
                        return Err(DensityError::Configuration(format!(
                            "atom {} of {} has no auxiliary functions in '{}'",
                            atom,
                            molecule.id(),
                            bundle.basis_name
                        )));
                    }
                    let mut coefficients = DVector::zeros(n);
                    coefficients
                        .rows_mut(range.start, range.len())
                        .copy_from(&charges.rows(range.start, range.len()));
                    rows.push(LinearConstraint {
                        label: format!("atom {} charge", atom),
                        coefficients,
                        target: population,
                    });
                }
                Self::new(mode, n, rows)
            }
        }
    }

    pub fn mode(&self) -> ConstraintMode {
        self.mode
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[LinearConstraint] {
        &self.rows
    }

    /// C as a `k x n` matrix.
    pub fn matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.rows.len(), self.dimension, |i, j| self.rows[i].coefficients[j])
    }

    pub fn targets(&self) -> DVector<f64> {
        DVector::from_iterator(self.rows.len(), self.rows.iter().map(|r| r.target))
    }

    /// max_i |c_i · x - t_i|
    pub fn violation(&self, x: &DVector<f64>) -> f64 {
        self.rows
            .iter()
            .map(|row| (row.coefficients.dot(x) - row.target).abs())
            .fold(0.0, f64::max)
    }
}
