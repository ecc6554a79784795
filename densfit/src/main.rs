//! Density fitting command-line interface.
//!
//! Reads a YAML job file, fits every molecule's density in an auxiliary
//! basis and writes the requested feature table.

use color_eyre::eyre::Result;
use densfit::app::FitApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    FitApplication::from_cli()?.run()
}
