//! Integral Adapter: the single point of contact with the backend.
//!
//! Requests metric, target and constraint data for one molecule, checks
//! every tensor against the basis registry and hands out immutable
//! [`IntegralBundle`]s, optionally cached.

use crate::backend::{check_finite, IntegralBackend};
use crate::error::{DensityError, DensityResult};
use basis::{BasisRegistry, Molecule, ResolvedBasis};
use nalgebra::{DMatrix, DVector};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Default relative tolerance for |M_ij - M_ji| / max|M|.
pub const DEFAULT_SYMMETRY_TOLERANCE: f64 = 1e-8;

/// Everything the solver needs for one (molecule, auxiliary basis) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegralBundle {
    pub molecule_id: String,
    pub basis_name: String,
    pub metric: DMatrix<f64>,
    pub target: DVector<f64>,
    pub charges: Option<DVector<f64>>,
    pub atomic_populations: Option<Vec<f64>>,
    pub self_interaction: Option<f64>,
    pub atom_ranges: Vec<Range<usize>>,
}

impl IntegralBundle {
    pub fn dimension(&self) -> usize {
        self.target.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BundleKey {
    molecule_id: String,
    basis_name: String,
    fingerprint: u64,
}

/// Hash of the molecule contents and the density bits, so that a changed
/// geometry, charge state or density never hits a stale entry.
fn fingerprint(molecule: &Molecule, density: &DMatrix<f64>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for atom in molecule.atoms() {
        atom.atomic_number.hash(&mut hasher);
        for x in atom.position.iter() {
            x.to_bits().hash(&mut hasher);
        }
    }
    molecule.charge().hash(&mut hasher);
    molecule.multiplicity().hash(&mut hasher);
    molecule.primary_basis().hash(&mut hasher);
    density.shape().hash(&mut hasher);
    for x in density.iter() {
        x.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

pub struct IntegralAdapter<B: IntegralBackend> {
    backend: Arc<B>,
    registry: Arc<BasisRegistry>,
    symmetry_tolerance: f64,
    cache: Option<Mutex<HashMap<BundleKey, Arc<IntegralBundle>>>>,
}

impl<B: IntegralBackend> IntegralAdapter<B> {
    pub fn new(backend: Arc<B>, registry: Arc<BasisRegistry>) -> Self {
        Self {
            backend,
            registry,
            symmetry_tolerance: DEFAULT_SYMMETRY_TOLERANCE,
            cache: None,
        }
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    pub fn with_symmetry_tolerance(mut self, tolerance: f64) -> Self {
        self.symmetry_tolerance = tolerance;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn registry(&self) -> &Arc<BasisRegistry> {
        &self.registry
    }

    pub fn cached_bundles(&self) -> usize {
        self.cache
            .as_ref()
            .map(|cache| cache.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    /// Fetch and validate the fitting integrals of `molecule` in `basis_name`.
    pub fn compute_bundle(
        &self,
        molecule: &Molecule,
        basis_name: &str,
        density: &DMatrix<f64>,
    ) -> DensityResult<Arc<IntegralBundle>> {
        let resolved = self.registry.resolve(molecule, basis_name)?;

        let key = BundleKey {
            molecule_id: molecule.id().to_string(),
            basis_name: resolved.name.clone(),
            fingerprint: fingerprint(molecule, density),
        };
        if let Some(cache) = &self.cache {
            let guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(bundle) = guard.get(&key) {
                debug!("Reusing cached integrals for {} / {}", key.molecule_id, key.basis_name);
                return Ok(Arc::clone(bundle));
            }
        }

        let bundle = Arc::new(self.request(molecule, &resolved, density)?);

        if let Some(cache) = &self.cache {
            let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
            // Another worker may have raced us; keep the first entry.
            let entry = guard.entry(key).or_insert_with(|| Arc::clone(&bundle));
            return Ok(Arc::clone(entry));
        }
        Ok(bundle)
    }

    fn request(
        &self,
        molecule: &Molecule,
        resolved: &ResolvedBasis,
        density: &DMatrix<f64>,
    ) -> DensityResult<IntegralBundle> {
        let id = molecule.id();
        let n = resolved.dimension();
        info!(
            "Requesting {} integrals for {} ({} auxiliary functions)",
            resolved.name, id, n
        );

        if !density.is_square() {
            return Err(DensityError::backend(
                id,
                format!("density matrix is {}x{}", density.nrows(), density.ncols()),
            ));
        }

        let metric = self.backend.auxiliary_metric(molecule, resolved)?;
        if metric.nrows() != n || metric.ncols() != n {
            return Err(DensityError::backend(
                id,
                format!(
                    "metric is {}x{} but basis '{}' has {} functions",
                    metric.nrows(),
                    metric.ncols(),
                    resolved.name,
                    n
                ),
            ));
        }
        check_finite(id, "metric", metric.iter())?;
        self.check_symmetric(id, &metric)?;

        let target = self.backend.density_target(molecule, resolved, density)?;
        check_length(id, "target vector", n, target.len())?;
        check_finite(id, "target vector", target.iter())?;

        let charges = self.backend.charge_vector(molecule, resolved)?;
        if let Some(q) = &charges {
            check_length(id, "charge vector", n, q.len())?;
            check_finite(id, "charge vector", q.iter())?;
        }

        let atomic_populations = self.backend.atomic_populations(molecule, density)?;
        if let Some(pops) = &atomic_populations {
            check_length(id, "atomic populations", molecule.num_atoms(), pops.len())?;
            check_finite(id, "atomic populations", pops.iter())?;
        }

        let self_interaction = self.backend.density_self_interaction(molecule, density)?;
        if let Some(value) = &self_interaction {
            check_finite(id, "density self interaction", std::iter::once(value))?;
        }

        Ok(IntegralBundle {
            molecule_id: id.to_string(),
            basis_name: resolved.name.clone(),
            metric,
            target,
            charges,
            atomic_populations,
            self_interaction,
            atom_ranges: resolved.ranges.clone(),
        })
    }

    fn check_symmetric(&self, id: &str, metric: &DMatrix<f64>) -> DensityResult<()> {
        let scale = metric.amax().max(f64::MIN_POSITIVE);
        let n = metric.nrows();
        let mut worst = 0.0_f64;
        for i in 0..n {
            for j in 0..i {
                worst = worst.max((metric[(i, j)] - metric[(j, i)]).abs());
            }
        }
        if worst / scale > self.symmetry_tolerance {
            return Err(DensityError::backend(
                id,
                format!(
                    "metric is not symmetric (max asymmetry {:.3e}, tolerance {:.1e})",
                    worst, self.symmetry_tolerance
                ),
            ));
        }
        Ok(())
    }
}

fn check_length(id: &str, what: &str, expected: usize, found: usize) -> DensityResult<()> {
    if expected != found {
        return Err(DensityError::backend(
            id,
            format!("{} has length {}, expected {}", what, found, expected),
        ));
    }
    Ok(())
}
