use super::{AuxiliaryDump, GridDump, IntegralBackend, IntegralDump, PrecomputedBackend};
use crate::error::DensityError;
use basis::{Atom, BasisRegistry, BasisSpec, Harmonics, Molecule, ResolvedBasis, Shell};
use nalgebra::{DMatrix, Vector3};
use std::collections::HashMap;
use std::fs;

fn hydrogen(id: &str) -> Molecule {
    let atoms = vec![
        Atom::new("H", Vector3::new(0.0, 0.0, 0.0)).unwrap(),
        Atom::new("H", Vector3::new(0.0, 0.0, 1.4)).unwrap(),
    ];
    Molecule::new(id, atoms, 0, 1, "sto-3g", "aux").unwrap()
}

fn resolved(molecule: &Molecule) -> ResolvedBasis {
    let mut registry = BasisRegistry::new();
    let spec = BasisSpec::new("H", vec![Shell::primitive(0, 1.0).unwrap()], Harmonics::Spherical).unwrap();
    registry.register("aux", spec);
    registry.resolve(molecule, "aux").unwrap()
}

fn dump() -> IntegralDump {
    let mut auxiliary = HashMap::new();
    auxiliary.insert(
        "AUX".to_string(),
        AuxiliaryDump {
            metric: vec![vec![2.0, 0.5], vec![0.5, 2.0]],
            three_center: vec![
                vec![vec![1.0, 0.2], vec![0.2, 0.0]],
                vec![vec![0.0, 0.2], vec![0.2, 1.0]],
            ],
            charges: Some(vec![1.0, 1.0]),
            grid_values: Some(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
            ..AuxiliaryDump::default()
        },
    );
    IntegralDump {
        density_matrix: vec![vec![0.6, 0.6], vec![0.6, 0.6]],
        converged: Some(true),
        self_interaction: Some(1.5),
        atomic_populations: Some(vec![1.0, 1.0]),
        auxiliary,
        grid: Some(GridDump {
            points: vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.4]],
            weights: vec![1.0, 1.0],
            reference_densities: vec![vec![1.0, 0.1], vec![0.1, 1.0]],
        }),
        ..IntegralDump::default()
    }
}

#[test]
fn test_reads_dump_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("h2.json"), serde_json::to_string(&dump()).unwrap()).unwrap();
    let backend = PrecomputedBackend::from_dir(dir.path());
    let molecule = hydrogen("h2");
    let basis = resolved(&molecule);

    let density = backend.density_matrix(&molecule).unwrap();
    assert_eq!(density, DMatrix::from_element(2, 2, 0.6));

    let metric = backend.auxiliary_metric(&molecule, &basis).unwrap();
    assert_eq!(metric[(0, 1)], 0.5);

    // b_P = Σ D_μν (μν|P) = 0.6 + 2·0.6·0.2
    let target = backend.density_target(&molecule, &basis, &density).unwrap();
    assert!((target[0] - 0.84).abs() < 1e-12);
    assert!((target[1] - 0.84).abs() < 1e-12);

    assert_eq!(backend.charge_vector(&molecule, &basis).unwrap().unwrap().len(), 2);
    assert_eq!(backend.density_self_interaction(&molecule, &density).unwrap(), Some(1.5));
    assert_eq!(backend.atomic_populations(&molecule, &density).unwrap(), Some(vec![1.0, 1.0]));
}

#[test]
fn test_missing_file_and_unconverged_scf() {
    let dir = tempfile::tempdir().unwrap();
    let backend = PrecomputedBackend::from_dir(dir.path());
    let err = backend.density_matrix(&hydrogen("absent")).unwrap_err();
    assert!(matches!(err, DensityError::Backend { .. }));

    let unconverged = IntegralDump {
        converged: Some(false),
        ..dump()
    };
    backend.insert("h2", unconverged);
    let err = backend.density_matrix(&hydrogen("h2")).unwrap_err();
    assert!(err.to_string().contains("did not converge"));
    assert!(!err.is_fatal());
}

#[test]
fn test_ragged_and_missing_data() {
    let backend = PrecomputedBackend::in_memory();
    let mut ragged = dump();
    ragged.density_matrix = vec![vec![1.0, 0.0], vec![0.0]];
    backend.insert("h2", ragged);
    let molecule = hydrogen("h2");
    assert!(matches!(
        backend.density_matrix(&molecule).unwrap_err(),
        DensityError::Backend { .. }
    ));

    let basis = resolved(&molecule);
    assert!(backend.core_hamiltonian(&molecule).is_err());
    assert!(backend.atomic_hamiltonian(&molecule, 0).is_err());
    assert!(backend.evaluate_auxiliary_derivatives(&molecule, &basis, &[]).is_err());

    let other = hydrogen("other");
    assert!(backend.auxiliary_metric(&other, &basis).is_err());
}

#[test]
fn test_grid_data_only_on_stored_points() {
    let backend = PrecomputedBackend::in_memory();
    backend.insert("h2", dump());
    let molecule = hydrogen("h2");
    let basis = resolved(&molecule);

    let grid = backend.quadrature_grid(&molecule).unwrap();
    assert_eq!(grid.len(), 2);
    let values = backend.evaluate_auxiliary(&molecule, &basis, &grid.points).unwrap();
    assert_eq!(values.shape(), (2, 2));
    let reference = backend.reference_densities(&molecule, &grid.points).unwrap();
    assert_eq!(reference[(1, 0)], 0.1);

    let shifted = vec![Vector3::new(0.1, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.4)];
    assert!(backend.evaluate_auxiliary(&molecule, &basis, &shifted).is_err());
}
