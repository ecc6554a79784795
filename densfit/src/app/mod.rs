//! Job driver behind the command-line interface.

use crate::adapter::{IntegralAdapter, DEFAULT_SYMMETRY_TOLERANCE};
use crate::backend::PrecomputedBackend;
use crate::batch::BatchOrchestrator;
use crate::config::{Args, Config};
use crate::io::{build_molecules, load_registry, report_batch, setup_output, write_dori_fields, BasisRequest};
use crate::repr::{BasisObjective, PostProcessor};
use crate::solver::ConstrainedSolver;
use basis::{BasisRegistry, BasisSpec, Molecule};
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct FitApplication {
    args: Args,
    config: Config,
}

impl FitApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args)?;
        Ok(Self { args, config })
    }

    pub fn new(args: Args, config: Config) -> Self {
        Self { args, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref());
        info!("Configuration loaded:\n{:?}", self.config);

        let molecules = build_molecules(&self.config)?;
        let fitting = self.config.fitting();
        let features = self.config.features();
        let processors = features.processors();

        let solver = ConstrainedSolver::new(fitting.solver_options())?;
        let constraint_mode = fitting.constraint_mode.unwrap_or_default();
        let integrals_dir = self.config.integrals_dir.clone().unwrap_or_else(|| "integrals".to_string());
        let backend = Arc::new(PrecomputedBackend::from_dir(&integrals_dir));
        let symmetry_tolerance = fitting.symmetry_tolerance.unwrap_or(DEFAULT_SYMMETRY_TOLERANCE);

        if let Some(candidate_path) = &self.args.evaluate_basis {
            let candidate = BasisSpec::load_all_from_file(Path::new(candidate_path))
                .wrap_err_with(|| format!("Unable to load candidate basis: {}", candidate_path))?;
            // Integral dumps must carry the candidate under its file stem.
            let name = Path::new(candidate_path)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "candidate".to_string());
            let objective = BasisObjective::new(
                backend,
                Arc::new(BasisRegistry::new()),
                molecules,
                solver,
                constraint_mode,
            )
            .with_symmetry_tolerance(symmetry_tolerance);
            let score = objective.evaluate_as(&name, &candidate)?;
            info!("Candidate basis {} scored {:.12}", candidate_path, score);
            println!("{:.12}", score);
            return Ok(());
        }

        let registry = load_registry(&self.config.basis_library(), &basis_requests(&molecules, &processors))?;
        let adapter = IntegralAdapter::new(backend, Arc::new(registry))
            .with_cache(fitting.cache_bundles.unwrap_or(true))
            .with_symmetry_tolerance(symmetry_tolerance);
        let mut orchestrator = BatchOrchestrator::new(adapter, solver, constraint_mode);
        if let Some(tolerance) = features.charge_tolerance {
            orchestrator = orchestrator.with_charge_tolerance(tolerance);
        }

        let report = orchestrator.run(&molecules, &processors)?;

        let output = self.config.output();
        let path = output.path.unwrap_or_else(|| "features.csv".to_string());
        report_batch(&report, Path::new(&path), output.format.unwrap_or_default())?;

        if let Some(dir) = &output.dori_dir {
            let adapter = orchestrator.adapter();
            write_dori_fields(
                &report,
                &molecules,
                adapter.backend().as_ref(),
                adapter.registry().as_ref(),
                Path::new(dir),
            )?;
        }
        Ok(())
    }
}

/// Every (basis, element) pair the molecules need: auxiliary bases always,
/// primary bases only when a post-processor works in the orbital basis.
fn basis_requests(molecules: &[Molecule], processors: &[PostProcessor]) -> Vec<BasisRequest> {
    let needs_primary = processors.iter().any(PostProcessor::needs_primary_basis);
    let mut requests: BTreeMap<String, BasisRequest> = BTreeMap::new();
    let mut add = |name: &str, molecule: &Molecule| {
        let request = requests.entry(name.to_lowercase()).or_insert_with(|| BasisRequest {
            name: name.to_lowercase(),
            elements: Default::default(),
        });
        request
            .elements
            .extend(molecule.elements().into_iter().map(str::to_string));
    };
    for molecule in molecules {
        add(molecule.auxiliary_basis(), molecule);
        if needs_primary {
            add(molecule.primary_basis(), molecule);
        }
    }
    requests.into_values().collect()
}

pub fn load_config(args: &Args) -> Result<Config> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults()
        .apply_overrides(args)?;
    config.validate()?;

    Ok(config)
}
