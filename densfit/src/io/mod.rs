//! Input/Output operations for fitting jobs
//!
//! This module handles logging setup, basis set loading and molecule input.

mod basis_loader;
mod molecules;
mod output;

pub use basis_loader::{fetch_basis, load_registry, BasisRequest};
pub use molecules::{build_molecules, parse_xyz, ANGSTROM_TO_BOHR};
pub use output::{report_batch, setup_output, write_dori_fields};
