//! Error taxonomy of the fitting pipeline.

use basis::{BasisParseError, MoleculeError, UnknownBasisError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification used when reporting failed molecules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownBasis,
    Backend,
    IllConditionedFit,
    IndefiniteMetric,
    DimensionMismatch,
    Configuration,
    Input,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnknownBasis => "unknown_basis",
            ErrorKind::Backend => "backend",
            ErrorKind::IllConditionedFit => "ill_conditioned_fit",
            ErrorKind::IndefiniteMetric => "indefinite_metric",
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Input => "input",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DensityError {
    #[error(transparent)]
    UnknownBasis(#[from] UnknownBasisError),

    #[error("backend error for molecule '{molecule}': {message}")]
    Backend { molecule: String, message: String },

    #[error("fitting system is numerically singular: smallest pivot {smallest_pivot:.3e} <= threshold {threshold:.3e}")]
    IllConditionedFit { smallest_pivot: f64, threshold: f64 },

    #[error("metric matrix is not positive semi-definite: {negative} negative pivots, expected {expected}")]
    IndefiniteMetric { negative: usize, expected: usize },

    #[error("{context}: expected dimension {expected}, found {found}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    BasisParse(#[from] BasisParseError),

    #[error(transparent)]
    Molecule(#[from] MoleculeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),
}

impl DensityError {
    pub fn backend(molecule: &str, message: impl Into<String>) -> Self {
        DensityError::Backend {
            molecule: molecule.to_string(),
            message: message.into(),
        }
    }

    pub fn dimension(context: impl Into<String>, expected: usize, found: usize) -> Self {
        DensityError::DimensionMismatch {
            context: context.into(),
            expected,
            found,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DensityError::UnknownBasis(_) => ErrorKind::UnknownBasis,
            DensityError::Backend { .. } => ErrorKind::Backend,
            DensityError::IllConditionedFit { .. } => ErrorKind::IllConditionedFit,
            DensityError::IndefiniteMetric { .. } => ErrorKind::IndefiniteMetric,
            DensityError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            DensityError::Configuration(_) => ErrorKind::Configuration,
            DensityError::BasisParse(_)
            | DensityError::Molecule(_)
            | DensityError::Io(_)
            | DensityError::Json(_)
            | DensityError::Yaml(_) => ErrorKind::Input,
        }
    }

    /// Fatal errors describe a setup mistake shared by every molecule and
    /// abort a batch; the rest are confined to the molecule that raised them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Backend
                | ErrorKind::IllConditionedFit
                | ErrorKind::IndefiniteMetric
                | ErrorKind::DimensionMismatch
        )
    }
}

pub type DensityResult<T> = Result<T, DensityError>;
