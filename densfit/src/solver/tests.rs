use super::{ConstrainedSolver, ConstraintMode, ConstraintSet, LinearConstraint, SolverOptions};
use crate::adapter::IntegralBundle;
use crate::error::DensityError;
use basis::{Atom, Molecule};
use nalgebra::{DMatrix, DVector, Vector3};

fn diagonal_problem() -> (DMatrix<f64>, DVector<f64>) {
    (
        DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 1.0]),
        DVector::from_vec(vec![4.0, 2.0]),
    )
}

fn sum_constraint(total: f64) -> ConstraintSet {
    let row = LinearConstraint {
        label: "sum".to_string(),
        coefficients: DVector::from_vec(vec![1.0, 1.0]),
        target: total,
    };
    ConstraintSet::new(ConstraintMode::GlobalCharge, 2, vec![row]).unwrap()
}

fn bundle(metric: DMatrix<f64>, target: DVector<f64>, self_interaction: Option<f64>) -> IntegralBundle {
    let n = target.len();
    IntegralBundle {
        molecule_id: "test".to_string(),
        basis_name: "aux".to_string(),
        metric,
        target,
        charges: None,
        atomic_populations: None,
        self_interaction,
        atom_ranges: vec![0..n],
    }
}

fn hydrogen_molecule() -> Molecule {
    let atoms = vec![
        Atom::new("H", Vector3::new(0.0, 0.0, 0.0)).unwrap(),
        Atom::new("H", Vector3::new(0.0, 0.0, 1.4)).unwrap(),
    ];
    Molecule::new("h2", atoms, 0, 1, "sto-3g", "aux").unwrap()
}

#[test]
fn test_unconstrained_diagonal_fit() {
    let (metric, target) = diagonal_problem();
    let solver = ConstrainedSolver::default();
    let solution = solver.solve(&metric, &target, &ConstraintSet::none(2)).unwrap();

    assert!((solution.coefficients[0] - 2.0).abs() < 1e-12);
    assert!((solution.coefficients[1] - 2.0).abs() < 1e-12);
    assert!((solution.objective + 12.0).abs() < 1e-12);
    assert_eq!(solution.multipliers.len(), 0);
    assert!((&metric * &solution.coefficients - &target).norm() < 1e-12);
}

#[test]
fn test_residual_uses_self_interaction() {
    let (metric, target) = diagonal_problem();
    let solver = ConstrainedSolver::default();

    let known = solver.fit(&bundle(metric.clone(), target.clone(), Some(16.0)), &ConstraintSet::none(2)).unwrap();
    assert!((known.residual.unwrap() - 4.0).abs() < 1e-12);
    assert!((known.quality() - 4.0).abs() < 1e-12);

    let unknown = solver.fit(&bundle(metric, target, None), &ConstraintSet::none(2)).unwrap();
    assert!(unknown.residual.is_none());
    assert!((unknown.quality() + 12.0).abs() < 1e-12);
}

#[test]
fn test_equality_constrained_fit() {
    let (metric, target) = diagonal_problem();
    let solver = ConstrainedSolver::default();
    let solution = solver.solve(&metric, &target, &sum_constraint(5.0)).unwrap();

    let x = &solution.coefficients;
    assert!((x[0] + x[1] - 5.0).abs() < 1e-10);
    assert!((x[0] - 7.0 / 3.0).abs() < 1e-12);
    assert!((x[1] - 8.0 / 3.0).abs() < 1e-12);
    assert!((solution.multipliers[0] + 2.0 / 3.0).abs() < 1e-12);
    assert!(solution.constraint_violation < 1e-10);

    // Objective recomputed from (M, b, x) agrees with the KKT shortcut.
    let direct = x.dot(&(&metric * x)) - 2.0 * target.dot(x);
    assert!((direct - solution.objective).abs() < 1e-10);
    assert!((solution.objective + 34.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_several_constraints_are_satisfied() {
    let n = 6;
    let metric = DMatrix::from_fn(n, n, |i, j| (-((i as f64) - (j as f64)).powi(2) / 4.0).exp() + if i == j { 0.5 } else { 0.0 });
    let target = DVector::from_fn(n, |i, _| 1.0 + 0.1 * i as f64);
    let rows = vec![
        LinearConstraint {
            label: "first half".to_string(),
            coefficients: DVector::from_vec(vec![1.0, 2.0, 1.0, 0.0, 0.0, 0.0]),
            target: 3.0,
        },
        LinearConstraint {
            label: "second half".to_string(),
            coefficients: DVector::from_vec(vec![0.0, 0.0, 0.0, 1.0, 0.5, 1.0]),
            target: -1.0,
        },
    ];
    let constraints = ConstraintSet::new(ConstraintMode::PerAtomCharge, n, rows).unwrap();
    let solution = ConstrainedSolver::default().solve(&metric, &target, &constraints).unwrap();

    let c = constraints.matrix();
    assert!((&c * &solution.coefficients - constraints.targets()).amax() < 1e-10);
    // Stationarity: M x + Cᵀ λ = b
    let stationarity = &metric * &solution.coefficients + c.transpose() * &solution.multipliers - &target;
    assert!(stationarity.amax() < 1e-10);
}

#[test]
fn test_singular_metric_is_ill_conditioned() {
    let metric = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
    let target = DVector::from_vec(vec![1.0, 1.0]);
    let err = ConstrainedSolver::default()
        .solve(&metric, &target, &ConstraintSet::none(2))
        .unwrap_err();
    match err {
        DensityError::IllConditionedFit { smallest_pivot, threshold } => {
            assert!(smallest_pivot <= threshold);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_ridge_regularizes_singular_metric() {
    let metric = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
    let target = DVector::from_vec(vec![1.0, 1.0]);
    let options = SolverOptions {
        ridge: 1e-3,
        ..SolverOptions::default()
    };
    let solution = ConstrainedSolver::new(options)
        .unwrap()
        .solve(&metric, &target, &ConstraintSet::none(2))
        .unwrap();
    // (M + εI) x = b has the symmetric solution x_i = 1 / (2 + ε).
    let expected = 1.0 / 2.001;
    assert!((solution.coefficients[0] - expected).abs() < 1e-10);
    assert!((solution.coefficients[1] - expected).abs() < 1e-10);
}

#[test]
fn test_negative_ridge_is_rejected() {
    let options = SolverOptions {
        ridge: -1.0,
        ..SolverOptions::default()
    };
    let err = ConstrainedSolver::new(options).unwrap_err();
    assert!(matches!(err, DensityError::Configuration(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_indefinite_metric_is_detected() {
    let metric = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]);
    let target = DVector::from_vec(vec![1.0, 1.0]);
    let err = ConstrainedSolver::default()
        .solve(&metric, &target, &ConstraintSet::none(2))
        .unwrap_err();
    assert!(matches!(err, DensityError::IndefiniteMetric { negative: 1, expected: 0 }));
    assert!(!err.is_fatal());
}

#[test]
fn test_constraint_dimension_mismatch() {
    let row = LinearConstraint {
        label: "short".to_string(),
        coefficients: DVector::from_vec(vec![1.0]),
        target: 1.0,
    };
    let err = ConstraintSet::new(ConstraintMode::GlobalCharge, 2, vec![row]).unwrap_err();
    assert!(matches!(err, DensityError::Configuration(_)));

    let (metric, target) = diagonal_problem();
    let err = ConstrainedSolver::default()
        .solve(&metric, &target, &ConstraintSet::none(3))
        .unwrap_err();
    assert!(matches!(err, DensityError::Configuration(_)));
}

#[test]
fn test_solution_is_deterministic() {
    let (metric, target) = diagonal_problem();
    let solver = ConstrainedSolver::default();
    let a = solver.solve(&metric, &target, &sum_constraint(5.0)).unwrap();
    let b = solver.solve(&metric, &target, &sum_constraint(5.0)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_global_charge_constraint_from_bundle() {
    let molecule = hydrogen_molecule();
    let mut data = bundle(
        DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 2.0]),
        DVector::from_vec(vec![1.0, 1.0]),
        None,
    );

    let err = ConstraintSet::for_bundle(ConstraintMode::GlobalCharge, &molecule, &data).unwrap_err();
    assert!(matches!(err, DensityError::Backend { .. }));

    data.charges = Some(DVector::from_vec(vec![0.8, 0.8]));
    let constraints = ConstraintSet::for_bundle(ConstraintMode::GlobalCharge, &molecule, &data).unwrap();
    assert_eq!(constraints.len(), 1);
    assert_eq!(constraints.targets()[0], 2.0);

    let fit = ConstrainedSolver::default().fit(&data, &constraints).unwrap();
    let charge = data.charges.as_ref().unwrap().dot(&fit.coefficients);
    assert!((charge - 2.0).abs() < 1e-10);
    assert_eq!(fit.constraint_mode, ConstraintMode::GlobalCharge);
}

#[test]
fn test_per_atom_constraint_masks_charge_vector() {
    let molecule = hydrogen_molecule();
    let mut data = bundle(DMatrix::identity(4, 4), DVector::from_vec(vec![0.3, 0.2, 0.4, 0.1]), None);
    data.atom_ranges = vec![0..2, 2..4];
    data.charges = Some(DVector::from_vec(vec![1.0, 0.5, 1.0, 0.5]));
    data.atomic_populations = Some(vec![0.9, 1.1]);

    let constraints = ConstraintSet::for_bundle(ConstraintMode::PerAtomCharge, &molecule, &data).unwrap();
    let c = constraints.matrix();
    assert_eq!(c.shape(), (2, 4));
    assert_eq!(c.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.5, 0.0, 0.0]);
    assert_eq!(c.row(1).iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0, 1.0, 0.5]);

    let fit = ConstrainedSolver::default().fit(&data, &constraints).unwrap();
    assert!(fit.constraint_violation < 1e-10);
    assert_eq!(fit.multipliers.len(), 2);
}

#[test]
fn test_constraint_mode_parsing() {
    assert_eq!("global-charge".parse::<ConstraintMode>().unwrap(), ConstraintMode::GlobalCharge);
    assert_eq!("PER_ATOM_CHARGE".parse::<ConstraintMode>().unwrap(), ConstraintMode::PerAtomCharge);
    assert_eq!(ConstraintMode::None.to_string(), "none");
    assert!("both".parse::<ConstraintMode>().is_err());
}
