//! Backend serving integrals dumped to JSON by an external SCF run.
//!
//! One file per molecule, `<dir>/<molecule id>.json`. Auxiliary-basis data
//! is stored per basis name so the same dump can feed several fits.

use super::{unsupported, AuxiliaryDerivatives, IntegralBackend, QuadratureGrid};
use crate::error::{DensityError, DensityResult};
use basis::{Molecule, ResolvedBasis};
use nalgebra::{DMatrix, DVector, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Integrals of one molecule as written by the SCF driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegralDump {
    pub density_matrix: Vec<Vec<f64>>,
    #[serde(default)]
    pub converged: Option<bool>,
    #[serde(default)]
    pub self_interaction: Option<f64>,
    #[serde(default)]
    pub atomic_populations: Option<Vec<f64>>,
    #[serde(default)]
    pub auxiliary: HashMap<String, AuxiliaryDump>,
    #[serde(default)]
    pub atomic_hamiltonians: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub core_hamiltonian: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub overlap: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub grid: Option<GridDump>,
}

/// Quantities tied to one auxiliary basis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuxiliaryDump {
    pub metric: Vec<Vec<f64>>,
    /// `(mu nu | P)` indexed as `[P][mu][nu]`.
    pub three_center: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub charges: Option<Vec<f64>>,
    /// Function values on the stored grid, `[point][P]`.
    #[serde(default)]
    pub grid_values: Option<Vec<Vec<f64>>>,
    /// Gradient components x, y, z, each `[point][P]`.
    #[serde(default)]
    pub grid_gradient: Option<Vec<Vec<Vec<f64>>>>,
    /// Hessian components xx, xy, xz, yy, yz, zz, each `[point][P]`.
    #[serde(default)]
    pub grid_hessian: Option<Vec<Vec<Vec<f64>>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridDump {
    pub points: Vec<[f64; 3]>,
    pub weights: Vec<f64>,
    /// Free-atom densities, `[point][atom]`.
    pub reference_densities: Vec<Vec<f64>>,
}

/// Reads dumps lazily from a directory and keeps the parsed ones in memory.
pub struct PrecomputedBackend {
    dir: Option<PathBuf>,
    dumps: Mutex<HashMap<String, Arc<IntegralDump>>>,
}

impl PrecomputedBackend {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            dumps: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            dir: None,
            dumps: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, molecule_id: &str, mut dump: IntegralDump) {
        dump.auxiliary = dump
            .auxiliary
            .into_iter()
            .map(|(name, aux)| (name.to_lowercase(), aux))
            .collect();
        self.lock().insert(molecule_id.to_string(), Arc::new(dump));
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<IntegralDump>>> {
        self.dumps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dump(&self, molecule: &Molecule) -> DensityResult<Arc<IntegralDump>> {
        if let Some(dump) = self.lock().get(molecule.id()) {
            return Ok(Arc::clone(dump));
        }
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| DensityError::backend(molecule.id(), "no integrals available"))?;
        let path = dir.join(format!("{}.json", molecule.id()));
        debug!("Reading integrals for {} from {}", molecule.id(), path.display());
        let text = fs::read_to_string(&path).map_err(|e| {
            DensityError::backend(molecule.id(), format!("cannot read {}: {}", path.display(), e))
        })?;
        let dump: IntegralDump = serde_json::from_str(&text).map_err(|e| {
            DensityError::backend(molecule.id(), format!("malformed {}: {}", path.display(), e))
        })?;
        self.insert(molecule.id(), dump);
        self.lock()
            .get(molecule.id())
            .cloned()
            .ok_or_else(|| DensityError::backend(molecule.id(), "integral cache lost an entry"))
    }

    fn auxiliary<'a>(
        &self,
        dump: &'a IntegralDump,
        molecule: &Molecule,
        basis: &ResolvedBasis,
    ) -> DensityResult<&'a AuxiliaryDump> {
        dump.auxiliary.get(&basis.name).ok_or_else(|| {
            DensityError::backend(molecule.id(), format!("no integrals for auxiliary basis '{}'", basis.name))
        })
    }

    fn stored_grid(&self, dump: &IntegralDump, molecule: &Molecule) -> DensityResult<GridDump> {
        dump.grid
            .clone()
            .ok_or_else(|| unsupported(molecule, "a quadrature grid"))
    }

    /// The dump only knows its own grid; any other set of points is refused.
    fn check_points(&self, dump: &IntegralDump, molecule: &Molecule, points: &[Vector3<f64>]) -> DensityResult<()> {
        let grid = self.stored_grid(dump, molecule)?;
        let same = grid.points.len() == points.len()
            && grid
                .points
                .iter()
                .zip(points)
                .all(|(stored, p)| stored[0] == p.x && stored[1] == p.y && stored[2] == p.z);
        if same {
            Ok(())
        } else {
            Err(DensityError::backend(
                molecule.id(),
                "precomputed integrals can only be evaluated on the stored grid",
            ))
        }
    }
}

/// Dense matrix from row-major nested vectors, rejecting ragged input.
pub(crate) fn matrix_from_rows(rows: &[Vec<f64>], what: &str, molecule: &Molecule) -> DensityResult<DMatrix<f64>> {
    let nrows = rows.len();
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != ncols) {
        return Err(DensityError::backend(
            molecule.id(),
            format!("{} row {} has {} entries, expected {}", what, i, row.len(), ncols),
        ));
    }
    Ok(DMatrix::from_fn(nrows, ncols, |i, j| rows[i][j]))
}

impl IntegralBackend for PrecomputedBackend {
    fn density_matrix(&self, molecule: &Molecule) -> DensityResult<DMatrix<f64>> {
        let dump = self.dump(molecule)?;
        if dump.converged == Some(false) {
            return Err(DensityError::backend(molecule.id(), "SCF calculation did not converge"));
        }
        matrix_from_rows(&dump.density_matrix, "density matrix", molecule)
    }

    fn auxiliary_metric(&self, molecule: &Molecule, basis: &ResolvedBasis) -> DensityResult<DMatrix<f64>> {
        let dump = self.dump(molecule)?;
        let aux = self.auxiliary(&dump, molecule, basis)?;
        matrix_from_rows(&aux.metric, "metric", molecule)
    }

    fn density_target(
        &self,
        molecule: &Molecule,
        basis: &ResolvedBasis,
        density: &DMatrix<f64>,
    ) -> DensityResult<DVector<f64>> {
        let dump = self.dump(molecule)?;
        let aux = self.auxiliary(&dump, molecule, basis)?;

        let values = aux
            .three_center
            .par_iter()
            .enumerate()
            .map(|(p, slice)| {
                let block = matrix_from_rows(slice, &format!("three-center slice {}", p), molecule)?;
                if block.shape() != density.shape() {
                    return Err(DensityError::backend(
                        molecule.id(),
                        format!(
                            "three-center slice {} is {:?}, density matrix is {:?}",
                            p,
                            block.shape(),
                            density.shape()
                        ),
                    ));
                }
                Ok(block.dot(density))
            })
            .collect::<DensityResult<Vec<f64>>>()?;
        Ok(DVector::from_vec(values))
    }

    fn charge_vector(&self, molecule: &Molecule, basis: &ResolvedBasis) -> DensityResult<Option<DVector<f64>>> {
        let dump = self.dump(molecule)?;
        let aux = self.auxiliary(&dump, molecule, basis)?;
        Ok(aux.charges.clone().map(DVector::from_vec))
    }

    fn atomic_populations(&self, molecule: &Molecule, _density: &DMatrix<f64>) -> DensityResult<Option<Vec<f64>>> {
        Ok(self.dump(molecule)?.atomic_populations.clone())
    }

    fn density_self_interaction(&self, molecule: &Molecule, _density: &DMatrix<f64>) -> DensityResult<Option<f64>> {
        Ok(self.dump(molecule)?.self_interaction)
    }

    fn atomic_hamiltonian(&self, molecule: &Molecule, atom_index: usize) -> DensityResult<DMatrix<f64>> {
        let dump = self.dump(molecule)?;
        let rows = dump
            .atomic_hamiltonians
            .get(atom_index)
            .ok_or_else(|| unsupported(molecule, &format!("a Hamiltonian for atom {}", atom_index)))?;
        matrix_from_rows(rows, "atomic Hamiltonian", molecule)
    }

    fn core_hamiltonian(&self, molecule: &Molecule) -> DensityResult<DMatrix<f64>> {
        let dump = self.dump(molecule)?;
        let rows = dump
            .core_hamiltonian
            .as_ref()
            .ok_or_else(|| unsupported(molecule, "a core Hamiltonian"))?;
        matrix_from_rows(rows, "core Hamiltonian", molecule)
    }

    fn orbital_overlap(&self, molecule: &Molecule) -> DensityResult<DMatrix<f64>> {
        let dump = self.dump(molecule)?;
        let rows = dump
            .overlap
            .as_ref()
            .ok_or_else(|| unsupported(molecule, "an orbital overlap matrix"))?;
        matrix_from_rows(rows, "overlap", molecule)
    }

    fn quadrature_grid(&self, molecule: &Molecule) -> DensityResult<QuadratureGrid> {
        let dump = self.dump(molecule)?;
        let grid = self.stored_grid(&dump, molecule)?;
        let points = grid
            .points
            .iter()
            .map(|p| Vector3::new(p[0], p[1], p[2]))
            .collect();
        QuadratureGrid::new(points, DVector::from_vec(grid.weights))
    }

    fn evaluate_auxiliary(
        &self,
        molecule: &Molecule,
        basis: &ResolvedBasis,
        points: &[Vector3<f64>],
    ) -> DensityResult<DMatrix<f64>> {
        let dump = self.dump(molecule)?;
        self.check_points(&dump, molecule, points)?;
        let aux = self.auxiliary(&dump, molecule, basis)?;
        let rows = aux
            .grid_values
            .as_ref()
            .ok_or_else(|| unsupported(molecule, "auxiliary function values"))?;
        matrix_from_rows(rows, "auxiliary grid values", molecule)
    }

    fn reference_densities(&self, molecule: &Molecule, points: &[Vector3<f64>]) -> DensityResult<DMatrix<f64>> {
        let dump = self.dump(molecule)?;
        self.check_points(&dump, molecule, points)?;
        let grid = self.stored_grid(&dump, molecule)?;
        matrix_from_rows(&grid.reference_densities, "reference densities", molecule)
    }

    fn evaluate_auxiliary_derivatives(
        &self,
        molecule: &Molecule,
        basis: &ResolvedBasis,
        points: &[Vector3<f64>],
    ) -> DensityResult<AuxiliaryDerivatives> {
        let values = self.evaluate_auxiliary(molecule, basis, points)?;
        let dump = self.dump(molecule)?;
        let aux = self.auxiliary(&dump, molecule, basis)?;
        let (Some(gradient), Some(hessian)) = (aux.grid_gradient.as_ref(), aux.grid_hessian.as_ref()) else {
            return Err(unsupported(molecule, "auxiliary function derivatives"));
        };
        if gradient.len() != 3 || hessian.len() != 6 {
            return Err(DensityError::backend(
                molecule.id(),
                "derivative dumps need 3 gradient and 6 Hessian components",
            ));
        }
        let component = |rows: &Vec<Vec<f64>>| matrix_from_rows(rows, "auxiliary derivatives", molecule);
        Ok(AuxiliaryDerivatives {
            values,
            gradient: [component(&gradient[0])?, component(&gradient[1])?, component(&gradient[2])?],
            hessian: [
                component(&hessian[0])?,
                component(&hessian[1])?,
                component(&hessian[2])?,
                component(&hessian[3])?,
                component(&hessian[4])?,
                component(&hessian[5])?,
            ],
        })
    }
}
