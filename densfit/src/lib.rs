//! Density fitting and SPAHM featurization.
//!
//! Molecules flow through [`adapter::IntegralAdapter`] (integrals from an
//! [`backend::IntegralBackend`]), [`solver::ConstrainedSolver`] (fitted
//! coefficients) and [`repr::PostProcessor`]s (feature vectors), driven in
//! parallel by [`batch::BatchOrchestrator`].

pub mod adapter;
pub mod app;
pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod io;
pub mod repr;
pub mod solver;
pub mod table;


pub use adapter::{IntegralAdapter, IntegralBundle};
pub use backend::{IntegralBackend, PrecomputedBackend};
pub use batch::{BatchOrchestrator, BatchReport, BatchSummary, FailedMolecule};
pub use error::{DensityError, DensityResult, ErrorKind};
pub use repr::{BasisObjective, FeatureRecord, PostProcessor, SpahmGuess};
pub use solver::{ConstrainedSolver, ConstraintMode, ConstraintSet, FitResult, SolverOptions};
pub use table::{FeatureTable, OutputFormat};
