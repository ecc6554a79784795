//! Interface to the quantum-chemistry program that owns the integrals.
//!
//! Everything the pipeline needs from an SCF/DFT code goes through
//! [`IntegralBackend`]. Implementations are treated as pure functions of
//! their inputs; the [`crate::adapter::IntegralAdapter`] validates what they
//! return before anything downstream sees it.

mod precomputed;
#[cfg(test)]
mod tests;

pub use precomputed::{AuxiliaryDump, GridDump, IntegralDump, PrecomputedBackend};

use crate::error::{DensityError, DensityResult};
use basis::{Molecule, ResolvedBasis};
use nalgebra::{DMatrix, DVector, Vector3};

/// Integration points and weights covering the molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureGrid {
    pub points: Vec<Vector3<f64>>,
    pub weights: DVector<f64>,
}

impl QuadratureGrid {
    pub fn new(points: Vec<Vector3<f64>>, weights: DVector<f64>) -> DensityResult<Self> {
        if points.len() != weights.len() {
            return Err(DensityError::dimension(
                "quadrature grid weights",
                points.len(),
                weights.len(),
            ));
        }
        Ok(Self { points, weights })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Auxiliary functions and their first and second derivatives on a grid.
///
/// Every matrix is `ngrid x nfunctions`. Hessian components are stored in
/// the order xx, xy, xz, yy, yz, zz.
#[derive(Debug, Clone)]
pub struct AuxiliaryDerivatives {
    pub values: DMatrix<f64>,
    pub gradient: [DMatrix<f64>; 3],
    pub hessian: [DMatrix<f64>; 6],
}

pub(crate) fn unsupported(molecule: &Molecule, what: &str) -> DensityError {
    DensityError::backend(molecule.id(), format!("backend does not provide {}", what))
}

/// Backend tensors must be finite before anything is computed from them.
pub(crate) fn check_finite<'a>(
    molecule: &str,
    what: &str,
    values: impl IntoIterator<Item = &'a f64>,
) -> DensityResult<()> {
    if values.into_iter().any(|x| !x.is_finite()) {
        return Err(DensityError::backend(molecule, format!("{} contains non-finite values", what)));
    }
    Ok(())
}

/// Source of one- and two-electron quantities for a molecule.
///
/// Methods returning `Option` describe data that only some workflows need;
/// the defaults report it as unavailable.
pub trait IntegralBackend: Send + Sync {
    /// Converged density matrix in the primary (orbital) basis.
    fn density_matrix(&self, molecule: &Molecule) -> DensityResult<DMatrix<f64>>;

    /// Gram matrix of the auxiliary functions under the fitting metric.
    fn auxiliary_metric(&self, molecule: &Molecule, basis: &ResolvedBasis) -> DensityResult<DMatrix<f64>>;

    /// Projection of the density onto each auxiliary function.
    fn density_target(
        &self,
        molecule: &Molecule,
        basis: &ResolvedBasis,
        density: &DMatrix<f64>,
    ) -> DensityResult<DVector<f64>>;

    /// Integral of each auxiliary function over space.
    fn charge_vector(&self, _molecule: &Molecule, _basis: &ResolvedBasis) -> DensityResult<Option<DVector<f64>>> {
        Ok(None)
    }

    /// Reference electron populations per atom, used by per-atom constraints.
    fn atomic_populations(&self, _molecule: &Molecule, _density: &DMatrix<f64>) -> DensityResult<Option<Vec<f64>>> {
        Ok(None)
    }

    /// Self interaction of the exact density under the fitting metric.
    fn density_self_interaction(&self, _molecule: &Molecule, _density: &DMatrix<f64>) -> DensityResult<Option<f64>> {
        Ok(None)
    }

    /// Approximate one-electron Hamiltonian of one atom, orthogonal basis.
    fn atomic_hamiltonian(&self, molecule: &Molecule, _atom_index: usize) -> DensityResult<DMatrix<f64>> {
        Err(unsupported(molecule, "atomic Hamiltonians"))
    }

    /// Core Hamiltonian (kinetic + nuclear attraction) in the primary basis.
    fn core_hamiltonian(&self, molecule: &Molecule) -> DensityResult<DMatrix<f64>> {
        Err(unsupported(molecule, "a core Hamiltonian"))
    }

    /// Overlap matrix of the primary basis.
    fn orbital_overlap(&self, molecule: &Molecule) -> DensityResult<DMatrix<f64>> {
        Err(unsupported(molecule, "an orbital overlap matrix"))
    }

    fn quadrature_grid(&self, molecule: &Molecule) -> DensityResult<QuadratureGrid> {
        Err(unsupported(molecule, "a quadrature grid"))
    }

    /// Auxiliary functions evaluated at `points` (`npoints x nfunctions`).
    fn evaluate_auxiliary(
        &self,
        molecule: &Molecule,
        _basis: &ResolvedBasis,
        _points: &[Vector3<f64>],
    ) -> DensityResult<DMatrix<f64>> {
        Err(unsupported(molecule, "auxiliary function values"))
    }

    /// Spherical free-atom densities at `points` (`npoints x natoms`).
    fn reference_densities(&self, molecule: &Molecule, _points: &[Vector3<f64>]) -> DensityResult<DMatrix<f64>> {
        Err(unsupported(molecule, "reference atomic densities"))
    }

    fn evaluate_auxiliary_derivatives(
        &self,
        molecule: &Molecule,
        _basis: &ResolvedBasis,
        _points: &[Vector3<f64>],
    ) -> DensityResult<AuxiliaryDerivatives> {
        Err(unsupported(molecule, "auxiliary function derivatives"))
    }
}
