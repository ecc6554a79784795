//! Representations computed from a fitted density.
//!
//! Each [`PostProcessor`] turns one molecule's fit (plus whatever extra
//! quantities it asks the backend for) into a flat [`FeatureRecord`].

mod basis_opt;
pub mod dori;
mod hirshfeld;
mod spahm;

pub use basis_opt::BasisObjective;
pub use hirshfeld::{hirshfeld_charges, DEFAULT_CHARGE_TOLERANCE};
pub use spahm::{atomic_spahm, molecular_spahm, SpahmGuess};

use crate::backend::IntegralBackend;
use crate::error::{DensityError, DensityResult};
use crate::solver::FitResult;
use basis::{BasisRegistry, Molecule};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_SPECTRUM_LENGTH: usize = 32;

fn default_length() -> usize {
    DEFAULT_SPECTRUM_LENGTH
}

/// Feature producers, selected by their method name in the job file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum PostProcessor {
    #[serde(rename = "coeff")]
    DensityCoefficients,
    #[serde(rename = "spahm")]
    AtomicSpahm {
        #[serde(default = "default_length")]
        length: usize,
    },
    #[serde(rename = "spahm_mol")]
    MolecularSpahm {
        #[serde(default)]
        guess: SpahmGuess,
        #[serde(default = "default_length")]
        length: usize,
    },
    #[serde(rename = "hirshfeld")]
    Hirshfeld,
}

impl PostProcessor {
    pub fn method(&self) -> &'static str {
        match self {
            PostProcessor::DensityCoefficients => "coeff",
            PostProcessor::AtomicSpahm { .. } => "spahm",
            PostProcessor::MolecularSpahm { .. } => "spahm_mol",
            PostProcessor::Hirshfeld => "hirshfeld",
        }
    }

    /// Whether the primary (orbital) basis must be registered.
    pub fn needs_primary_basis(&self) -> bool {
        matches!(
            self,
            PostProcessor::AtomicSpahm { .. } | PostProcessor::MolecularSpahm { .. }
        )
    }

    /// Spectrum length of SPAHM variants.
    pub fn spectrum_length(&self) -> Option<usize> {
        match *self {
            PostProcessor::AtomicSpahm { length } | PostProcessor::MolecularSpahm { length, .. } => Some(length),
            _ => None,
        }
    }

    /// Replace the spectrum length of SPAHM variants.
    pub fn with_length(self, length: usize) -> Self {
        match self {
            PostProcessor::AtomicSpahm { .. } => PostProcessor::AtomicSpahm { length },
            PostProcessor::MolecularSpahm { guess, .. } => PostProcessor::MolecularSpahm { guess, length },
            other => other,
        }
    }

    pub fn apply<B: IntegralBackend + ?Sized>(&self, context: &FeatureContext<'_, B>) -> DensityResult<FeatureRecord> {
        let values = match *self {
            PostProcessor::DensityCoefficients => context.fit.coefficients.iter().copied().collect(),
            PostProcessor::AtomicSpahm { length } => {
                atomic_spahm(context.backend, context.registry, context.molecule, length)?
            }
            PostProcessor::MolecularSpahm { guess, length } => {
                molecular_spahm(context.backend, context.registry, context.molecule, guess, length)?
            }
            PostProcessor::Hirshfeld => hirshfeld_charges(
                context.backend,
                context.registry,
                context.molecule,
                context.fit,
                context.charge_tolerance,
            )?,
        };
        Ok(FeatureRecord::new(self.method(), values))
    }
}

impl fmt::Display for PostProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// Parses the method names used on the command line, e.g. `spahm_mol`.
/// Spectrum lengths take their default and can be overridden separately.
impl FromStr for PostProcessor {
    type Err = DensityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let length = DEFAULT_SPECTRUM_LENGTH;
        match s.trim().to_ascii_lowercase().as_str() {
            "coeff" | "coefficients" => Ok(PostProcessor::DensityCoefficients),
            "spahm" => Ok(PostProcessor::AtomicSpahm { length }),
            "spahm_mol" => Ok(PostProcessor::MolecularSpahm {
                guess: SpahmGuess::default(),
                length,
            }),
            "hirshfeld" => Ok(PostProcessor::Hirshfeld),
            other => Err(DensityError::Configuration(format!(
                "unknown post-processor '{}'",
                other
            ))),
        }
    }
}

/// Each method owns one `{method}_{index}` column group, so a method may
/// appear only once per run.
pub fn check_distinct_methods(processors: &[PostProcessor]) -> DensityResult<()> {
    let mut seen = HashSet::new();
    for processor in processors {
        if !seen.insert(processor.method()) {
            return Err(DensityError::Configuration(format!(
                "post-processor '{}' is listed more than once",
                processor.method()
            )));
        }
    }
    Ok(())
}

/// What a post-processor can see of one molecule.
pub struct FeatureContext<'a, B: IntegralBackend + ?Sized> {
    pub backend: &'a B,
    pub registry: &'a BasisRegistry,
    pub molecule: &'a Molecule,
    pub fit: &'a FitResult,
    pub charge_tolerance: f64,
}

/// One method's features for one molecule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub method: String,
    pub values: Vec<f64>,
}

impl FeatureRecord {
    pub fn new(method: &str, values: Vec<f64>) -> Self {
        Self {
            method: method.to_string(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn column_name(&self, index: usize) -> String {
        format!("{}_{}", self.method, index)
    }

    pub fn column_names(&self) -> Vec<String> {
        (0..self.values.len()).map(|i| self.column_name(i)).collect()
    }
}

/// Zero-pad or truncate `values` to exactly `length` entries.
pub(crate) fn fit_to_length(mut values: Vec<f64>, length: usize) -> Vec<f64> {
    values.resize(length, 0.0);
    values
}

/// Stable descending sort.
pub(crate) fn sort_descending(values: &mut [f64]) {
    values.sort_by(|a, b| b.total_cmp(a));
}
