//! Configuration management for density fitting jobs
//!
//! YAML job files are deserialized into [`Config`], missing values are
//! filled by `with_defaults`, command-line overrides are applied and the
//! result is validated before any molecule is touched.

mod args;
#[cfg(test)]
mod tests;

pub use args::Args;

use crate::adapter::DEFAULT_SYMMETRY_TOLERANCE;
use crate::error::{DensityError, DensityResult};
use crate::repr::{check_distinct_methods, PostProcessor, SpahmGuess, DEFAULT_CHARGE_TOLERANCE};
use crate::solver::{ConstraintMode, SolverOptions, DEFAULT_PIVOT_TOLERANCE};
use crate::table::OutputFormat;
use basis::Harmonics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main configuration structure for a fitting job
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Auxiliary basis used by molecules that do not name their own.
    pub basis_name: Option<String>,
    /// Orbital basis used by molecules that do not name their own.
    pub primary_basis: Option<String>,
    pub basis_library: Option<BasisLibraryParams>,
    pub integrals_dir: Option<String>,
    pub fitting: Option<FittingParams>,
    pub features: Option<FeatureParams>,
    pub output: Option<OutputParams>,
    #[serde(default)]
    pub molecules: Vec<MoleculeEntry>,
}

/// Where basis-set definitions come from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasisLibraryParams {
    /// Directory of `<basis>.<element>.nwchem` files.
    pub dir: Option<String>,
    /// Whole-basis NWChem files keyed by basis name.
    pub files: Option<HashMap<String, String>>,
    pub fetch_remote: Option<bool>,
    pub harmonics: Option<Harmonics>,
}

impl Default for BasisLibraryParams {
    fn default() -> Self {
        BasisLibraryParams {
            dir: Some("basis".to_string()),
            files: Some(HashMap::new()),
            fetch_remote: Some(false),
            harmonics: Some(Harmonics::Spherical),
        }
    }
}

impl BasisLibraryParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.dir.is_none() {
            self.dir = defaults.dir;
        }
        if self.files.is_none() {
            self.files = defaults.files;
        }
        if self.fetch_remote.is_none() {
            self.fetch_remote = defaults.fetch_remote;
        }
        if self.harmonics.is_none() {
            self.harmonics = defaults.harmonics;
        }
        self
    }
}

/// Solver parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FittingParams {
    pub ridge: Option<f64>,
    pub constraint_mode: Option<ConstraintMode>,
    pub pivot_tolerance: Option<f64>,
    pub symmetry_tolerance: Option<f64>,
    pub cache_bundles: Option<bool>,
}

impl Default for FittingParams {
    fn default() -> Self {
        FittingParams {
            ridge: Some(0.0),
            constraint_mode: Some(ConstraintMode::None),
            pivot_tolerance: Some(DEFAULT_PIVOT_TOLERANCE),
            symmetry_tolerance: Some(DEFAULT_SYMMETRY_TOLERANCE),
            cache_bundles: Some(true),
        }
    }
}

impl FittingParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.ridge.is_none() {
            self.ridge = defaults.ridge;
        }
        if self.constraint_mode.is_none() {
            self.constraint_mode = defaults.constraint_mode;
        }
        if self.pivot_tolerance.is_none() {
            self.pivot_tolerance = defaults.pivot_tolerance;
        }
        if self.symmetry_tolerance.is_none() {
            self.symmetry_tolerance = defaults.symmetry_tolerance;
        }
        if self.cache_bundles.is_none() {
            self.cache_bundles = defaults.cache_bundles;
        }
        self
    }

    pub fn solver_options(&self) -> SolverOptions {
        let defaults = SolverOptions::default();
        SolverOptions {
            ridge: self.ridge.unwrap_or(defaults.ridge),
            pivot_tolerance: self.pivot_tolerance.unwrap_or(defaults.pivot_tolerance),
        }
    }
}

/// Post-processing parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureParams {
    pub post_processors: Option<Vec<PostProcessor>>,
    /// When set, replaces the length of every SPAHM post-processor;
    /// otherwise each entry keeps its own `length`.
    pub spahm_spectrum_length: Option<usize>,
    /// Guess used by `spahm_mol` entries given on the command line.
    pub spahm_guess: Option<SpahmGuess>,
    pub charge_tolerance: Option<f64>,
}

impl Default for FeatureParams {
    fn default() -> Self {
        FeatureParams {
            post_processors: Some(vec![PostProcessor::DensityCoefficients]),
            spahm_spectrum_length: None,
            spahm_guess: Some(SpahmGuess::Core),
            charge_tolerance: Some(DEFAULT_CHARGE_TOLERANCE),
        }
    }
}

impl FeatureParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.post_processors.is_none() {
            self.post_processors = defaults.post_processors;
        }
        if self.spahm_guess.is_none() {
            self.spahm_guess = defaults.spahm_guess;
        }
        if self.charge_tolerance.is_none() {
            self.charge_tolerance = defaults.charge_tolerance;
        }
        self
    }

    /// Post-processors with the configured spectrum length applied.
    pub fn processors(&self) -> Vec<PostProcessor> {
        let processors = self.post_processors.clone().unwrap_or_default();
        match self.spahm_spectrum_length {
            Some(length) => processors.into_iter().map(|p| p.with_length(length)).collect(),
            None => processors,
        }
    }
}

/// Feature table destination
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputParams {
    pub path: Option<String>,
    pub format: Option<OutputFormat>,
    /// Write DORI and sign(λ₂)ρ fields of every fitted molecule here.
    #[serde(default)]
    pub dori_dir: Option<String>,
}

impl Default for OutputParams {
    fn default() -> Self {
        OutputParams {
            path: Some("features.csv".to_string()),
            format: Some(OutputFormat::Csv),
            dori_dir: None,
        }
    }
}

impl OutputParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.path.is_none() {
            self.path = defaults.path;
        }
        if self.format.is_none() {
            self.format = defaults.format;
        }
        self
    }
}

/// One input structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MoleculeEntry {
    pub id: String,
    pub charge: Option<i32>,
    pub multiplicity: Option<usize>,
    pub primary_basis: Option<String>,
    pub auxiliary_basis: Option<String>,
    /// Inline geometry in Bohr.
    pub geometry: Option<Vec<AtomEntry>>,
    /// XYZ file in Ångström, used when `geometry` is absent.
    pub xyz: Option<String>,
}

/// Atomic position configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AtomEntry {
    pub element: String,
    pub coords: [f64; 3],
}

impl Config {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        self.basis_library = Some(self.basis_library.unwrap_or_default().with_defaults());
        self.fitting = Some(self.fitting.unwrap_or_default().with_defaults());
        self.features = Some(self.features.unwrap_or_default().with_defaults());
        self.output = Some(self.output.unwrap_or_default().with_defaults());
        if self.integrals_dir.is_none() {
            self.integrals_dir = Some("integrals".to_string());
        }
        self
    }

    /// Overlay command-line overrides on top of the file values.
    pub fn apply_overrides(mut self, args: &Args) -> DensityResult<Self> {
        if let Some(name) = &args.basis_name {
            self.basis_name = Some(name.clone());
            for entry in &mut self.molecules {
                entry.auxiliary_basis = None;
            }
        }
        if let Some(dir) = &args.integrals_dir {
            self.integrals_dir = Some(dir.clone());
        }

        let fitting = self.fitting.get_or_insert_with(FittingParams::default);
        if let Some(ridge) = args.ridge {
            fitting.ridge = Some(ridge);
        }
        if let Some(mode) = &args.constraint_mode {
            fitting.constraint_mode = Some(mode.parse()?);
        }
        if args.no_cache {
            fitting.cache_bundles = Some(false);
        }

        let features = self.features.get_or_insert_with(FeatureParams::default);
        if !args.post_processors.is_empty() {
            let guess = features.spahm_guess.unwrap_or_default();
            let processors = args
                .post_processors
                .iter()
                .map(|name| {
                    name.parse::<PostProcessor>().map(|p| match p {
                        PostProcessor::MolecularSpahm { length, .. } => PostProcessor::MolecularSpahm { guess, length },
                        other => other,
                    })
                })
                .collect::<DensityResult<Vec<_>>>()?;
            features.post_processors = Some(processors);
        }
        if let Some(length) = args.spahm_length {
            features.spahm_spectrum_length = Some(length);
        }

        let output = self.output.get_or_insert_with(OutputParams::default);
        if let Some(path) = &args.features {
            output.path = Some(path.clone());
        }
        if let Some(format) = &args.format {
            output.format = Some(format.parse()?);
        }
        if let Some(dir) = &args.dori_dir {
            output.dori_dir = Some(dir.clone());
        }

        let library = self.basis_library.get_or_insert_with(BasisLibraryParams::default);
        if args.fetch_basis {
            library.fetch_remote = Some(true);
        }
        Ok(self)
    }

    pub fn fitting(&self) -> FittingParams {
        self.fitting.clone().unwrap_or_default().with_defaults()
    }

    pub fn features(&self) -> FeatureParams {
        self.features.clone().unwrap_or_default().with_defaults()
    }

    pub fn output(&self) -> OutputParams {
        self.output.clone().unwrap_or_default().with_defaults()
    }

    pub fn basis_library(&self) -> BasisLibraryParams {
        self.basis_library.clone().unwrap_or_default().with_defaults()
    }

    /// Reject values no job can run with.
    pub fn validate(&self) -> DensityResult<()> {
        let fitting = self.fitting();
        let options = fitting.solver_options();
        if !(options.ridge.is_finite() && options.ridge >= 0.0) {
            return Err(DensityError::Configuration(format!(
                "ridge must be a non-negative number, got {}",
                options.ridge
            )));
        }
        for (name, value) in [
            ("pivot_tolerance", fitting.pivot_tolerance),
            ("symmetry_tolerance", fitting.symmetry_tolerance),
            ("charge_tolerance", self.features().charge_tolerance),
        ] {
            if let Some(value) = value {
                if !(value.is_finite() && value >= 0.0) {
                    return Err(DensityError::Configuration(format!(
                        "{} must be a non-negative number, got {}",
                        name, value
                    )));
                }
            }
        }
        let features = self.features();
        if features.spahm_spectrum_length == Some(0) {
            return Err(DensityError::Configuration(
                "spahm_spectrum_length must be positive".to_string(),
            ));
        }
        let processors = features.processors();
        if let Some(processor) = processors.iter().find(|p| p.spectrum_length() == Some(0)) {
            return Err(DensityError::Configuration(format!(
                "post-processor '{}' needs a positive length",
                processor
            )));
        }
        check_distinct_methods(&processors)?;

        if self.molecules.is_empty() {
            return Err(DensityError::Configuration("no molecules given".to_string()));
        }
        for entry in &self.molecules {
            if entry.auxiliary_basis.is_none() && self.basis_name.is_none() {
                return Err(DensityError::Configuration(format!(
                    "molecule '{}' has no auxiliary basis and no basis_name is set",
                    entry.id
                )));
            }
            if entry.geometry.is_none() && entry.xyz.is_none() {
                return Err(DensityError::Configuration(format!(
                    "molecule '{}' needs either a geometry or an xyz file",
                    entry.id
                )));
            }
        }
        Ok(())
    }
}
