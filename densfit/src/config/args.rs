//! Command-line argument parsing for density fitting jobs

use clap::Parser;

/// Density fitting and SPAHM featurization with YAML configuration
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override the auxiliary basis of every molecule
    #[arg(short, long)]
    pub basis_name: Option<String>,

    /// Override the ridge (Tikhonov) regularization, must be >= 0
    #[arg(long)]
    pub ridge: Option<f64>,

    /// Override the constraint mode (none, global_charge, per_atom_charge)
    #[arg(long)]
    pub constraint_mode: Option<String>,

    /// Override the SPAHM spectrum length
    #[arg(long)]
    pub spahm_length: Option<usize>,

    /// Post-processors to run (coeff, spahm, spahm_mol, hirshfeld); repeatable
    #[arg(short, long = "post-processor")]
    pub post_processors: Vec<String>,

    /// Directory holding per-molecule integral dumps
    #[arg(long)]
    pub integrals_dir: Option<String>,

    /// Override the feature table path
    #[arg(short, long)]
    pub features: Option<String>,

    /// Feature table format (csv or json)
    #[arg(long)]
    pub format: Option<String>,

    /// Directory for per-molecule DORI fields (JSON)
    #[arg(long)]
    pub dori_dir: Option<String>,

    /// Fetch missing basis sets from Basis Set Exchange
    #[arg(long)]
    pub fetch_basis: bool,

    /// Disable the integral bundle cache
    #[arg(long)]
    pub no_cache: bool,

    /// Score a candidate auxiliary basis (JSON list of element bases) instead of featurizing
    #[arg(long)]
    pub evaluate_basis: Option<String>,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,
}
