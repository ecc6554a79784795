//! Error types of the basis crate.

use thiserror::Error;

/// Raised when an (element, basis) pair has no registered definition.
///
/// This is a configuration error: it affects every molecule containing the
/// element, so callers are expected to abort rather than retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no '{basis}' basis registered for element {element}")]
pub struct UnknownBasisError {
    pub element: String,
    pub basis: String,
}

impl UnknownBasisError {
    pub fn new(element: impl Into<String>, basis: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            basis: basis.into(),
        }
    }
}

/// Errors produced while reading a basis-set definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BasisParseError {
    #[error("line {line}: unknown element symbol '{symbol}'")]
    UnknownElement { line: usize, symbol: String },

    #[error("line {line}: unsupported shell label '{label}'")]
    UnknownShell { line: usize, label: String },

    #[error("line {line}: cannot parse '{token}' as a number")]
    BadNumber { line: usize, token: String },

    #[error("line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: primitive row outside of a shell block")]
    OrphanRow { line: usize },

    #[error("line {line}: shell block without primitives")]
    EmptyShell { line: usize },

    #[error("invalid shell: {0}")]
    InvalidShell(String),

    #[error("no shell definitions found")]
    Empty,

    #[error("JSON error: {0}")]
    Json(String),
}

/// Errors raised while building a [`crate::Molecule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoleculeError {
    #[error("unknown element symbol '{0}'")]
    UnknownElement(String),

    #[error("molecule '{0}' has no atoms")]
    Empty(String),

    #[error("spin multiplicity must be at least 1")]
    InvalidMultiplicity,

    #[error("charge leaves {0} electrons")]
    NegativeElectrons(i64),

    #[error("{electrons} electrons cannot have spin multiplicity {multiplicity}")]
    ParityMismatch { electrons: i64, multiplicity: usize },
}
