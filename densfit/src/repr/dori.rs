//! Density overlap regions indicator (DORI) of a fitted density.
//!
//! `γ = θ / (1 + θ)` with `θ = |∇(k²)|² / |k|⁶` and `k = ∇ρ / ρ`
//! (J. Chem. Theory Comput. 10, 3745).

use crate::backend::{check_finite, AuxiliaryDerivatives, IntegralBackend};
use crate::error::{DensityError, DensityResult};
use crate::solver::FitResult;
use basis::{BasisRegistry, Molecule};
use nalgebra::{DVector, Matrix3, Vector3};
use rayon::prelude::*;
use serde::Serialize;

/// Points with |ρ| below this get γ = 0.
pub const DEFAULT_DENSITY_THRESHOLD: f64 = 1e-4;

/// Density, gradient and Hessian at a set of points.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityDerivatives {
    pub density: Vec<f64>,
    pub gradient: Vec<Vector3<f64>>,
    pub hessian: Vec<Matrix3<f64>>,
}

impl DensityDerivatives {
    /// Contract auxiliary function derivatives with fitted coefficients.
    pub fn from_coefficients(aux: &AuxiliaryDerivatives, coefficients: &DVector<f64>) -> DensityResult<Self> {
        let n = coefficients.len();
        let npoints = aux.values.nrows();
        let blocks = std::iter::once(&aux.values)
            .chain(aux.gradient.iter())
            .chain(aux.hessian.iter());
        for block in blocks {
            if block.ncols() != n {
                return Err(DensityError::dimension("auxiliary derivative columns", n, block.ncols()));
            }
            if block.nrows() != npoints {
                return Err(DensityError::dimension("auxiliary derivative rows", npoints, block.nrows()));
            }
        }

        let density = &aux.values * coefficients;
        let grad: Vec<DVector<f64>> = aux.gradient.iter().map(|g| g * coefficients).collect();
        let hess: Vec<DVector<f64>> = aux.hessian.iter().map(|h| h * coefficients).collect();

        let gradient = (0..npoints)
            .map(|p| Vector3::new(grad[0][p], grad[1][p], grad[2][p]))
            .collect();
        let hessian = (0..npoints)
            .map(|p| {
                let (xx, xy, xz, yy, yz, zz) = (hess[0][p], hess[1][p], hess[2][p], hess[3][p], hess[4][p], hess[5][p]);
                Matrix3::new(xx, xy, xz, xy, yy, yz, xz, yz, zz)
            })
            .collect();

        Ok(Self {
            density: density.iter().copied().collect(),
            gradient,
            hessian,
        })
    }

    pub fn len(&self) -> usize {
        self.density.len()
    }

    pub fn is_empty(&self) -> bool {
        self.density.is_empty()
    }
}

fn dori_at(rho: f64, gradient: &Vector3<f64>, hessian: &Matrix3<f64>, eps: f64) -> f64 {
    if rho.abs() < eps {
        return 0.0;
    }
    let k = gradient / rho;
    let k2 = k.norm_squared();
    let h = hessian / rho - k * k.transpose();
    let dk2 = 2.0 * h * k;
    let numerator = dk2.norm_squared();
    let denominator = numerator + k2.powi(3);
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

pub fn compute_dori(derivatives: &DensityDerivatives, eps: f64) -> Vec<f64> {
    (0..derivatives.len())
        .into_par_iter()
        .map(|p| {
            dori_at(
                derivatives.density[p],
                &derivatives.gradient[p],
                &derivatives.hessian[p],
                eps,
            )
        })
        .collect()
}

/// ρ signed by the middle eigenvalue of its Hessian; zero where ρ < eps.
pub fn compute_s2rho(derivatives: &DensityDerivatives, eps: f64) -> Vec<f64> {
    derivatives
        .density
        .iter()
        .zip(&derivatives.hessian)
        .map(|(&rho, hessian)| {
            if rho < eps {
                return 0.0;
            }
            let mut eigenvalues: Vec<f64> = hessian.symmetric_eigenvalues().iter().copied().collect();
            eigenvalues.sort_by(f64::total_cmp);
            rho.copysign(eigenvalues[1])
        })
        .collect()
}

/// DORI and sign(λ₂)ρ of a fitted density on the backend's grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoriField {
    pub points: Vec<Vector3<f64>>,
    pub dori: Vec<f64>,
    pub s2rho: Vec<f64>,
}

pub fn dori_field<B: IntegralBackend + ?Sized>(
    backend: &B,
    registry: &BasisRegistry,
    molecule: &Molecule,
    fit: &FitResult,
    eps: f64,
) -> DensityResult<DoriField> {
    let resolved = registry.resolve(molecule, &fit.basis_name)?;
    let grid = backend.quadrature_grid(molecule)?;
    let aux = backend.evaluate_auxiliary_derivatives(molecule, &resolved, &grid.points)?;
    let components = std::iter::once(&aux.values)
        .chain(aux.gradient.iter())
        .chain(aux.hessian.iter());
    check_finite(molecule.id(), "auxiliary derivatives", components.flat_map(|m| m.iter()))?;
    let derivatives = DensityDerivatives::from_coefficients(&aux, &fit.coefficients)?;
    if derivatives.len() != grid.len() {
        return Err(DensityError::dimension(
            format!("density derivatives on the grid of {}", molecule.id()),
            grid.len(),
            derivatives.len(),
        ));
    }
    Ok(DoriField {
        dori: compute_dori(&derivatives, eps),
        s2rho: compute_s2rho(&derivatives, eps),
        points: grid.points,
    })
}
