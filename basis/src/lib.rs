//! Basis-set bookkeeping for density fitting.
//!
//! Holds the per-element shell definitions of orbital and auxiliary basis
//! sets, the registry that lays them out over a molecule, and the immutable
//! molecule descriptor the rest of the workspace is keyed on.

pub mod error;
pub mod molecule;
pub mod nwchem;
pub mod registry;
pub mod shell;

#[cfg(test)]
mod nwchem_test;
#[cfg(test)]
mod registry_test;

pub use error::{BasisParseError, MoleculeError, UnknownBasisError};
pub use molecule::{Atom, Molecule};
pub use nwchem::parse_nwchem;
pub use registry::{BasisRegistry, ResolvedBasis};
pub use shell::{BasisSpec, Harmonics, Shell};
