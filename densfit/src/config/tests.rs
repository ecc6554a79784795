use super::{Args, Config};
use crate::error::DensityError;
use crate::repr::{PostProcessor, SpahmGuess};
use crate::solver::ConstraintMode;
use crate::table::OutputFormat;

const JOB: &str = r#"
basis_name: def2-universal-jkfit
primary_basis: sto-3g
fitting:
  ridge: 1.0e-8
  constraint_mode: global_charge
features:
  post_processors:
    - method: coeff
    - method: spahm
      length: 6
    - method: hirshfeld
  spahm_spectrum_length: 12
output:
  format: json
molecules:
  - id: h2
    geometry:
      - element: H
        coords: [0.0, 0.0, 0.0]
      - element: H
        coords: [0.0, 0.0, 1.4]
  - id: water
    xyz: water.xyz
    auxiliary_basis: cc-pvdz-jkfit
"#;

fn parsed() -> Config {
    serde_yml::from_str::<Config>(JOB).unwrap().with_defaults()
}

#[test]
fn test_defaults_fill_missing_values() {
    let config = parsed();
    let fitting = config.fitting();
    assert_eq!(fitting.ridge, Some(1.0e-8));
    assert_eq!(fitting.constraint_mode, Some(ConstraintMode::GlobalCharge));
    assert_eq!(fitting.pivot_tolerance, Some(1e-12));
    assert_eq!(fitting.symmetry_tolerance, Some(1e-8));
    assert_eq!(fitting.cache_bundles, Some(true));

    let features = config.features();
    assert_eq!(features.charge_tolerance, Some(1e-6));
    assert_eq!(
        features.processors(),
        vec![
            PostProcessor::DensityCoefficients,
            PostProcessor::AtomicSpahm { length: 12 },
            PostProcessor::Hirshfeld,
        ]
    );

    let output = config.output();
    assert_eq!(output.path.as_deref(), Some("features.csv"));
    assert_eq!(output.format, Some(OutputFormat::Json));
    assert_eq!(config.integrals_dir.as_deref(), Some("integrals"));
    assert_eq!(config.basis_library().fetch_remote, Some(false));
    config.validate().unwrap();
}

#[test]
fn test_command_line_overrides() {
    let args = Args {
        basis_name: Some("weigend".to_string()),
        ridge: Some(0.5),
        constraint_mode: Some("per_atom_charge".to_string()),
        post_processors: vec!["spahm_mol".to_string()],
        spahm_length: Some(4),
        format: Some("csv".to_string()),
        no_cache: true,
        fetch_basis: true,
        ..Args::default()
    };
    let mut config = parsed();
    config.features.as_mut().unwrap().spahm_guess = Some(SpahmGuess::Gwh);
    let config = config.apply_overrides(&args).unwrap();

    assert_eq!(config.basis_name.as_deref(), Some("weigend"));
    assert!(config.molecules.iter().all(|m| m.auxiliary_basis.is_none()));
    let fitting = config.fitting();
    assert_eq!(fitting.ridge, Some(0.5));
    assert_eq!(fitting.constraint_mode, Some(ConstraintMode::PerAtomCharge));
    assert_eq!(fitting.cache_bundles, Some(false));
    assert_eq!(
        config.features().processors(),
        vec![PostProcessor::MolecularSpahm {
            guess: SpahmGuess::Gwh,
            length: 4
        }]
    );
    assert_eq!(config.output().format, Some(OutputFormat::Csv));
    assert_eq!(config.basis_library().fetch_remote, Some(true));
}

#[test]
fn test_bad_override_values() {
    let args = Args {
        constraint_mode: Some("loose".to_string()),
        ..Args::default()
    };
    assert!(matches!(
        parsed().apply_overrides(&args),
        Err(DensityError::Configuration(_))
    ));

    let args = Args {
        post_processors: vec!["mulliken".to_string()],
        ..Args::default()
    };
    assert!(parsed().apply_overrides(&args).is_err());
}

#[test]
fn test_validation_rejects_negative_ridge() {
    let args = Args {
        ridge: Some(-1e-3),
        ..Args::default()
    };
    let config = parsed().apply_overrides(&args).unwrap();
    assert!(matches!(config.validate(), Err(DensityError::Configuration(_))));
}

#[test]
fn test_validation_requires_molecules_and_basis() {
    let empty = Config::default().with_defaults();
    assert!(empty.validate().is_err());

    let mut config = parsed();
    config.basis_name = None;
    // h2 relies on the global basis name.
    assert!(config.validate().is_err());
}

const SPAHM_ONLY: &str = r#"
basis_name: def2-universal-jkfit
features:
  post_processors:
    - method: spahm
      length: 6
    - method: spahm_mol
      guess: gwh
molecules:
  - id: h2
    geometry:
      - element: H
        coords: [0.0, 0.0, 0.0]
      - element: H
        coords: [0.0, 0.0, 1.4]
"#;

#[test]
fn test_entry_lengths_kept_without_global_length() {
    let config = serde_yml::from_str::<Config>(SPAHM_ONLY).unwrap().with_defaults();
    assert_eq!(config.features().spahm_spectrum_length, None);
    assert_eq!(
        config.features().processors(),
        vec![
            PostProcessor::AtomicSpahm { length: 6 },
            PostProcessor::MolecularSpahm {
                guess: SpahmGuess::Gwh,
                length: 32
            },
        ]
    );
    config.validate().unwrap();
}

#[test]
fn test_validation_rejects_repeated_methods() {
    let text = SPAHM_ONLY.replace("method: spahm_mol", "method: spahm");
    let config = serde_yml::from_str::<Config>(&text).unwrap().with_defaults();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, DensityError::Configuration(_)));
    assert!(err.to_string().contains("more than once"));
}

#[test]
fn test_validation_rejects_zero_entry_length() {
    let text = SPAHM_ONLY.replace("length: 6", "length: 0");
    let config = serde_yml::from_str::<Config>(&text).unwrap().with_defaults();
    assert!(matches!(config.validate(), Err(DensityError::Configuration(_))));
}
