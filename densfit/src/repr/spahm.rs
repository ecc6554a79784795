//! Spectrum of Approximated Hamiltonian Matrices (SPAHM).

use super::{fit_to_length, sort_descending};
use crate::backend::{check_finite, IntegralBackend};
use crate::error::{DensityError, DensityResult};
use basis::{BasisRegistry, Molecule};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Generalized Wolfsberg–Helmholz constant (J. Chem. Phys. 20, 837).
const GWH_K: f64 = 1.75;
/// Overlap eigenvalues below this are treated as linear dependencies.
const OVERLAP_THRESHOLD: f64 = 1e-10;

/// Guess Hamiltonian used by the molecular representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpahmGuess {
    #[default]
    Core,
    Gwh,
}

impl fmt::Display for SpahmGuess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpahmGuess::Core => f.write_str("core"),
            SpahmGuess::Gwh => f.write_str("gwh"),
        }
    }
}

impl FromStr for SpahmGuess {
    type Err = DensityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "core" | "hcore" => Ok(SpahmGuess::Core),
            "gwh" => Ok(SpahmGuess::Gwh),
            other => Err(DensityError::Configuration(format!("unknown SPAHM guess '{}'", other))),
        }
    }
}

fn check_square(matrix: &DMatrix<f64>, side: usize, context: impl FnOnce() -> String) -> DensityResult<()> {
    if matrix.nrows() != side || matrix.ncols() != side {
        let found = if matrix.nrows() != side { matrix.nrows() } else { matrix.ncols() };
        return Err(DensityError::dimension(context(), side, found));
    }
    Ok(())
}

fn symmetrized(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    (matrix + matrix.transpose()) * 0.5
}

/// Eigenvalue spectra of the per-atom Hamiltonians, each sorted descending
/// and fitted to `length`, concatenated in atom order.
pub fn atomic_spahm<B: IntegralBackend + ?Sized>(
    backend: &B,
    registry: &BasisRegistry,
    molecule: &Molecule,
    length: usize,
) -> DensityResult<Vec<f64>> {
    let mut features = Vec::with_capacity(length * molecule.num_atoms());
    for (index, atom) in molecule.atoms().iter().enumerate() {
        let expected = registry.function_count(&atom.symbol, molecule.primary_basis())?;
        let hamiltonian = backend.atomic_hamiltonian(molecule, index)?;
        check_square(&hamiltonian, expected, || {
            format!(
                "atomic Hamiltonian of atom {} ({}) in {}",
                index,
                atom.symbol,
                molecule.id()
            )
        })?;
        check_finite(molecule.id(), "atomic Hamiltonian", hamiltonian.iter())?;

        let mut eigenvalues: Vec<f64> = symmetrized(&hamiltonian).symmetric_eigenvalues().iter().copied().collect();
        sort_descending(&mut eigenvalues);
        features.extend(fit_to_length(eigenvalues, length));
    }
    Ok(features)
}

/// Apply the chosen guess to the core Hamiltonian.
pub(crate) fn guess_hamiltonian(guess: SpahmGuess, core: &DMatrix<f64>, overlap: &DMatrix<f64>) -> DMatrix<f64> {
    match guess {
        SpahmGuess::Core => core.clone(),
        SpahmGuess::Gwh => {
            let n = core.nrows();
            DMatrix::from_fn(n, n, |i, j| {
                if i == j {
                    core[(i, i)]
                } else {
                    0.5 * GWH_K * (core[(i, i)] + core[(j, j)]) * overlap[(i, j)]
                }
            })
        }
    }
}

/// Eigenvalues of `H C = S C e` in ascending order, through symmetric
/// orthogonalization with linear dependencies dropped.
pub(crate) fn generalized_eigenvalues(hamiltonian: &DMatrix<f64>, overlap: &DMatrix<f64>) -> Vec<f64> {
    let eigen = symmetrized(overlap).symmetric_eigen();
    let kept: Vec<usize> = (0..eigen.eigenvalues.len())
        .filter(|&i| eigen.eigenvalues[i] > OVERLAP_THRESHOLD)
        .collect();
    let n = overlap.nrows();
    let x = DMatrix::from_fn(n, kept.len(), |i, j| {
        let k = kept[j];
        eigen.eigenvectors[(i, k)] / eigen.eigenvalues[k].sqrt()
    });
    let orthogonal = x.transpose() * symmetrized(hamiltonian) * &x;
    let mut values: Vec<f64> = symmetrized(&orthogonal).symmetric_eigenvalues().iter().copied().collect();
    values.sort_by(f64::total_cmp);
    values
}

/// Occupied orbital energies of a guess Hamiltonian: the alpha channel,
/// then the beta channel for open shells, each sorted descending and
/// fitted to `length`.
pub fn molecular_spahm<B: IntegralBackend + ?Sized>(
    backend: &B,
    registry: &BasisRegistry,
    molecule: &Molecule,
    guess: SpahmGuess,
    length: usize,
) -> DensityResult<Vec<f64>> {
    let n = registry.dimension(molecule, molecule.primary_basis())?;
    let core = backend.core_hamiltonian(molecule)?;
    check_square(&core, n, || format!("core Hamiltonian of {}", molecule.id()))?;
    let overlap = backend.orbital_overlap(molecule)?;
    check_square(&overlap, n, || format!("orbital overlap of {}", molecule.id()))?;
    check_finite(molecule.id(), "core Hamiltonian", core.iter())?;
    check_finite(molecule.id(), "orbital overlap", overlap.iter())?;

    let hamiltonian = guess_hamiltonian(guess, &core, &overlap);
    let energies = generalized_eigenvalues(&hamiltonian, &overlap);

    let (alpha, beta) = molecule.alpha_beta_counts();
    if alpha > energies.len() {
        return Err(DensityError::backend(
            molecule.id(),
            format!(
                "{} occupied orbitals requested but the basis spans only {}",
                alpha,
                energies.len()
            ),
        ));
    }
    debug!(
        "{} guess for {}: {} orbitals, {} alpha / {} beta occupied",
        guess,
        molecule.id(),
        energies.len(),
        alpha,
        beta
    );

    let channel = |count: usize| {
        let mut occupied = energies[..count].to_vec();
        sort_descending(&mut occupied);
        fit_to_length(occupied, length)
    };

    let mut features = channel(alpha);
    if molecule.multiplicity() > 1 {
        features.extend(channel(beta));
    }
    Ok(features)
}
