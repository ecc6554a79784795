//! Batch Orchestrator: fit and featurize many molecules in parallel.

use crate::adapter::IntegralAdapter;
use crate::backend::IntegralBackend;
use crate::error::{DensityError, DensityResult, ErrorKind};
use crate::repr::{check_distinct_methods, FeatureContext, FeatureRecord, PostProcessor, DEFAULT_CHARGE_TOLERANCE};
use crate::solver::{ConstrainedSolver, ConstraintMode, ConstraintSet, FitResult};
use crate::table::FeatureTable;
use basis::Molecule;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// A molecule whose pipeline failed, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedMolecule {
    pub molecule_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Fit and features of one molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeFeatures {
    pub molecule_id: String,
    pub fit: FitResult,
    pub records: Vec<FeatureRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoleculeOutcome {
    Completed(MoleculeFeatures),
    Failed(FailedMolecule),
}

impl MoleculeOutcome {
    pub fn molecule_id(&self) -> &str {
        match self {
            MoleculeOutcome::Completed(features) => &features.molecule_id,
            MoleculeOutcome::Failed(failure) => &failure.molecule_id,
        }
    }
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub methods: Vec<&'static str>,
    pub outcomes: Vec<MoleculeOutcome>,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let succeeded = self
            .outcomes
            .iter()
            .filter(|o| matches!(o, MoleculeOutcome::Completed(_)))
            .count();
        BatchSummary {
            succeeded,
            failed: self.outcomes.len() - succeeded,
        }
    }

    pub fn completed(&self) -> impl Iterator<Item = &MoleculeFeatures> {
        self.outcomes.iter().filter_map(|o| match o {
            MoleculeOutcome::Completed(features) => Some(features),
            MoleculeOutcome::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailedMolecule> {
        self.outcomes.iter().filter_map(|o| match o {
            MoleculeOutcome::Failed(failure) => Some(failure),
            MoleculeOutcome::Completed(_) => None,
        })
    }

    pub fn table(&self) -> FeatureTable {
        let rows = self.outcomes.iter().map(|outcome| match outcome {
            MoleculeOutcome::Completed(features) => (features.molecule_id.as_str(), Some(features.records.as_slice())),
            MoleculeOutcome::Failed(failure) => (failure.molecule_id.as_str(), None),
        });
        FeatureTable::from_records(&self.methods, rows, self.failures().cloned().collect())
    }
}

/// Runs adapter, solver and post-processors for every molecule.
pub struct BatchOrchestrator<B: IntegralBackend> {
    adapter: IntegralAdapter<B>,
    solver: ConstrainedSolver,
    constraint_mode: ConstraintMode,
    charge_tolerance: f64,
}

impl<B: IntegralBackend> BatchOrchestrator<B> {
    pub fn new(adapter: IntegralAdapter<B>, solver: ConstrainedSolver, constraint_mode: ConstraintMode) -> Self {
        Self {
            adapter,
            solver,
            constraint_mode,
            charge_tolerance: DEFAULT_CHARGE_TOLERANCE,
        }
    }

    pub fn with_charge_tolerance(mut self, tolerance: f64) -> Self {
        self.charge_tolerance = tolerance;
        self
    }

    pub fn adapter(&self) -> &IntegralAdapter<B> {
        &self.adapter
    }

    /// Reject the batch up front if any molecule names a basis the registry
    /// cannot cover, or if molecule ids collide.
    pub fn check_inputs(&self, molecules: &[Molecule], processors: &[PostProcessor]) -> DensityResult<()> {
        check_distinct_methods(processors)?;
        let registry = self.adapter.registry();
        let needs_primary = processors.iter().any(PostProcessor::needs_primary_basis);
        let mut seen = HashSet::new();
        for molecule in molecules {
            if !seen.insert(molecule.id()) {
                return Err(DensityError::Configuration(format!(
                    "molecule id '{}' appears more than once",
                    molecule.id()
                )));
            }
            registry.check_molecule(molecule, molecule.auxiliary_basis())?;
            if needs_primary {
                registry.check_molecule(molecule, molecule.primary_basis())?;
            }
        }
        Ok(())
    }

    /// Fit one molecule and apply every post-processor to it.
    pub fn process(&self, molecule: &Molecule, processors: &[PostProcessor]) -> DensityResult<MoleculeFeatures> {
        let backend = self.adapter.backend();
        let density = backend.density_matrix(molecule)?;
        let bundle = self
            .adapter
            .compute_bundle(molecule, molecule.auxiliary_basis(), &density)?;
        let constraints = ConstraintSet::for_bundle(self.constraint_mode, molecule, &bundle)?;
        let fit = self.solver.fit(&bundle, &constraints)?;

        let context = FeatureContext {
            backend: backend.as_ref(),
            registry: self.adapter.registry().as_ref(),
            molecule,
            fit: &fit,
            charge_tolerance: self.charge_tolerance,
        };
        let records = processors
            .iter()
            .map(|processor| processor.apply(&context))
            .collect::<DensityResult<Vec<_>>>()?;

        Ok(MoleculeFeatures {
            molecule_id: molecule.id().to_string(),
            fit,
            records,
        })
    }

    pub fn run(&self, molecules: &[Molecule], processors: &[PostProcessor]) -> DensityResult<BatchReport> {
        self.check_inputs(molecules, processors)?;
        info!(
            "Processing {} molecules with {} post-processors ({} constraints, ridge {:e})",
            molecules.len(),
            processors.len(),
            self.constraint_mode,
            self.solver.options().ridge
        );

        let results: Vec<DensityResult<MoleculeFeatures>> = molecules
            .par_iter()
            .map(|molecule| self.process(molecule, processors))
            .collect();

        let mut outcomes = Vec::with_capacity(results.len());
        for (molecule, result) in molecules.iter().zip(results) {
            match result {
                Ok(features) => outcomes.push(MoleculeOutcome::Completed(features)),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("Molecule {} failed ({}): {}", molecule.id(), err.kind(), err);
                    outcomes.push(MoleculeOutcome::Failed(FailedMolecule {
                        molecule_id: molecule.id().to_string(),
                        kind: err.kind(),
                        message: err.to_string(),
                    }));
                }
            }
        }

        let report = BatchReport {
            methods: processors.iter().map(PostProcessor::method).collect(),
            outcomes,
        };
        let summary = report.summary();
        info!(
            "Batch finished: {} succeeded, {} failed",
            summary.succeeded, summary.failed
        );
        Ok(report)
    }
}
