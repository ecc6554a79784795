//! Fit-quality objective for auxiliary basis optimization.

use crate::adapter::{IntegralAdapter, DEFAULT_SYMMETRY_TOLERANCE};
use crate::backend::IntegralBackend;
use crate::error::DensityResult;
use crate::solver::{ConstrainedSolver, ConstraintMode, ConstraintSet};
use basis::{BasisRegistry, BasisSpec, Molecule};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Scores candidate auxiliary bases by how well they fit the densities of
/// a fixed evaluation set.
pub struct BasisObjective<B: IntegralBackend> {
    backend: Arc<B>,
    registry: Arc<BasisRegistry>,
    molecules: Vec<Molecule>,
    solver: ConstrainedSolver,
    constraint_mode: ConstraintMode,
    symmetry_tolerance: f64,
    evaluations: AtomicUsize,
}

impl<B: IntegralBackend> BasisObjective<B> {
    pub fn new(
        backend: Arc<B>,
        registry: Arc<BasisRegistry>,
        molecules: Vec<Molecule>,
        solver: ConstrainedSolver,
        constraint_mode: ConstraintMode,
    ) -> Self {
        Self {
            backend,
            registry,
            molecules,
            solver,
            constraint_mode,
            symmetry_tolerance: DEFAULT_SYMMETRY_TOLERANCE,
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn with_symmetry_tolerance(mut self, tolerance: f64) -> Self {
        self.symmetry_tolerance = tolerance;
        self
    }

    pub fn molecules(&self) -> &[Molecule] {
        &self.molecules
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Sum of fit qualities over the evaluation set with `candidate` as the
    /// auxiliary basis. Lower is better.
    pub fn evaluate(&self, candidate: &[BasisSpec]) -> DensityResult<f64> {
        let name = format!("candidate-{}", self.evaluations());
        self.evaluate_as(&name, candidate)
    }

    /// Like [`Self::evaluate`], registering the candidate under `name`, for
    /// backends that look integrals up by basis name.
    pub fn evaluate_as(&self, name: &str, candidate: &[BasisSpec]) -> DensityResult<f64> {
        let index = self.evaluations.fetch_add(1, Ordering::Relaxed);
        let registry = self.registry.with_basis(name, candidate.iter().cloned());
        let adapter = IntegralAdapter::new(Arc::clone(&self.backend), Arc::new(registry))
            .with_symmetry_tolerance(self.symmetry_tolerance);

        let mut total = 0.0;
        for molecule in &self.molecules {
            let density = self.backend.density_matrix(molecule)?;
            let bundle = adapter.compute_bundle(molecule, name, &density)?;
            let constraints = ConstraintSet::for_bundle(self.constraint_mode, molecule, &bundle)?;
            let fit = self.solver.fit(&bundle, &constraints)?;
            total += fit.quality();
        }
        info!(
            "Basis candidate {} ({}) scored {:.10} over {} molecules",
            index,
            name,
            total,
            self.molecules.len()
        );
        Ok(total)
    }
}
