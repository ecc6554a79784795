//! Hirshfeld partial charges of the fitted density.

use crate::backend::{check_finite, IntegralBackend};
use crate::error::{DensityError, DensityResult};
use crate::solver::FitResult;
use basis::{BasisRegistry, Molecule};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{debug, warn};

pub const DEFAULT_CHARGE_TOLERANCE: f64 = 1e-6;
/// Promolecule densities below this count as vanishing.
const PROMOLECULE_FLOOR: f64 = 1e-14;

/// Partition `density` over atoms with stockholder weights built from the
/// reference atomic densities, and integrate each share with `weights`.
///
/// Where the promolecule vanishes the point is shared equally.
pub(crate) fn partition_populations(
    weights: &DVector<f64>,
    density: &DVector<f64>,
    reference: &DMatrix<f64>,
) -> Vec<f64> {
    let natm = reference.ncols();
    let promolecule: Vec<f64> = reference.row_iter().map(|row| row.sum()).collect();

    (0..natm)
        .into_par_iter()
        .map(|a| {
            promolecule
                .iter()
                .enumerate()
                .map(|(g, &pro)| {
                    let share = if pro < PROMOLECULE_FLOOR {
                        1.0 / natm as f64
                    } else {
                        reference[(g, a)] / pro
                    };
                    weights[g] * share * density[g]
                })
                .sum::<f64>()
        })
        .collect()
}

/// `q_A = Z_A − ∫ w_A(r) ρ_fit(r) dr` for every atom, in atom order.
pub fn hirshfeld_charges<B: IntegralBackend + ?Sized>(
    backend: &B,
    registry: &BasisRegistry,
    molecule: &Molecule,
    fit: &FitResult,
    charge_tolerance: f64,
) -> DensityResult<Vec<f64>> {
    let resolved = registry.resolve(molecule, &fit.basis_name)?;
    if resolved.dimension() != fit.coefficients.len() {
        return Err(DensityError::dimension(
            format!("fitted coefficients of {}", molecule.id()),
            resolved.dimension(),
            fit.coefficients.len(),
        ));
    }

    let grid = backend.quadrature_grid(molecule)?;
    let values = backend.evaluate_auxiliary(molecule, &resolved, &grid.points)?;
    if values.nrows() != grid.len() || values.ncols() != resolved.dimension() {
        let (expected, found) = if values.nrows() != grid.len() {
            (grid.len(), values.nrows())
        } else {
            (resolved.dimension(), values.ncols())
        };
        return Err(DensityError::dimension(
            format!("auxiliary functions on the grid of {}", molecule.id()),
            expected,
            found,
        ));
    }
    let reference = backend.reference_densities(molecule, &grid.points)?;
    if reference.nrows() != grid.len() || reference.ncols() != molecule.num_atoms() {
        let (expected, found) = if reference.nrows() != grid.len() {
            (grid.len(), reference.nrows())
        } else {
            (molecule.num_atoms(), reference.ncols())
        };
        return Err(DensityError::dimension(
            format!("reference densities of {}", molecule.id()),
            expected,
            found,
        ));
    }

    check_finite(molecule.id(), "quadrature weights", grid.weights.iter())?;
    check_finite(molecule.id(), "auxiliary grid values", values.iter())?;
    check_finite(molecule.id(), "reference densities", reference.iter())?;

    let density = &values * &fit.coefficients;
    let populations = partition_populations(&grid.weights, &density, &reference);

    let charges: Vec<f64> = molecule
        .atoms()
        .iter()
        .zip(&populations)
        .map(|(atom, population)| atom.atomic_number as f64 - population)
        .collect();

    let total: f64 = charges.iter().sum();
    let drift = (total - molecule.charge() as f64).abs();
    if drift > charge_tolerance {
        warn!(
            "Hirshfeld charges of {} sum to {:.8} instead of {} (drift {:.3e})",
            molecule.id(),
            total,
            molecule.charge(),
            drift
        );
    } else {
        debug!("Hirshfeld charges of {}: {:?}", molecule.id(), charges);
    }
    Ok(charges)
}
