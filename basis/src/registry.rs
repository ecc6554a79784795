//! Registry of basis-set definitions and their layout over a molecule.

use crate::error::{BasisParseError, UnknownBasisError};
use crate::molecule::Molecule;
use crate::nwchem::parse_nwchem;
use crate::shell::{BasisSpec, Harmonics, Shell};
use itertools::Itertools;
use periodic_table_on_an_enum::Element;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Per-element basis definitions keyed by basis name.
///
/// Names are case-insensitive. The registry is populated up front and then
/// only read, so it can be shared between worker threads behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct BasisRegistry {
    bases: HashMap<String, HashMap<u32, Arc<BasisSpec>>>,
}

/// A basis laid out over the atoms of one molecule.
#[derive(Debug, Clone)]
pub struct ResolvedBasis {
    pub name: String,
    pub atoms: Vec<Arc<BasisSpec>>,
    pub ranges: Vec<Range<usize>>,
}

impl ResolvedBasis {
    pub fn dimension(&self) -> usize {
        self.ranges.last().map(|r| r.end).unwrap_or(0)
    }

    /// Index of the atom owning basis function `index`.
    pub fn atom_of(&self, index: usize) -> Option<usize> {
        self.ranges.iter().position(|r| r.contains(&index))
    }

    /// Angular momentum of every function, in function order.
    pub fn function_angular_momenta(&self) -> Vec<u32> {
        self.atoms
            .iter()
            .flat_map(|spec| spec.function_angular_momenta())
            .collect()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn atomic_number(element: &str, basis_name: &str) -> Result<u32, UnknownBasisError> {
    Element::from_symbol(element)
        .map(|e| e.get_atomic_number() as u32)
        .ok_or_else(|| UnknownBasisError::new(element, basis_name))
}

impl BasisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the definition of one element.
    pub fn register(&mut self, basis_name: &str, spec: BasisSpec) {
        debug!(
            "Registering {} {} for {}",
            basis_name,
            spec.contraction_pattern(),
            spec.symbol
        );
        self.bases
            .entry(normalize_name(basis_name))
            .or_default()
            .insert(spec.atomic_number, Arc::new(spec));
    }

    /// Parse NWChem text and register every element it defines.
    /// Returns the number of elements registered.
    pub fn register_nwchem(
        &mut self,
        basis_name: &str,
        text: &str,
        harmonics: Harmonics,
    ) -> Result<usize, BasisParseError> {
        let specs = parse_nwchem(text, harmonics)?;
        let count = specs.len();
        for spec in specs {
            self.register(basis_name, spec);
        }
        Ok(count)
    }

    /// Copy of this registry with extra definitions under `basis_name`.
    pub fn with_basis(&self, basis_name: &str, specs: impl IntoIterator<Item = BasisSpec>) -> Self {
        let mut registry = self.clone();
        for spec in specs {
            registry.register(basis_name, spec);
        }
        registry
    }

    pub fn contains(&self, basis_name: &str) -> bool {
        self.bases.contains_key(&normalize_name(basis_name))
    }

    pub fn basis_names(&self) -> Vec<&str> {
        self.bases.keys().map(String::as_str).sorted().collect()
    }

    /// Element symbols available for `basis_name`, sorted by atomic number.
    pub fn elements_for(&self, basis_name: &str) -> Vec<&str> {
        self.bases
            .get(&normalize_name(basis_name))
            .map(|per_element| {
                per_element
                    .values()
                    .sorted_by_key(|spec| spec.atomic_number)
                    .map(|spec| spec.symbol.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn spec(&self, element: &str, basis_name: &str) -> Result<&Arc<BasisSpec>, UnknownBasisError> {
        let z = atomic_number(element, basis_name)?;
        self.bases
            .get(&normalize_name(basis_name))
            .and_then(|per_element| per_element.get(&z))
            .ok_or_else(|| UnknownBasisError::new(element, basis_name))
    }

    pub fn shells_for(&self, element: &str, basis_name: &str) -> Result<&[Shell], UnknownBasisError> {
        self.spec(element, basis_name).map(|spec| spec.shells.as_slice())
    }

    pub fn function_count(&self, element: &str, basis_name: &str) -> Result<usize, UnknownBasisError> {
        self.spec(element, basis_name).map(|spec| spec.function_count())
    }

    /// Total number of basis functions over all atoms of `molecule`.
    pub fn dimension(&self, molecule: &Molecule, basis_name: &str) -> Result<usize, UnknownBasisError> {
        molecule
            .atoms()
            .iter()
            .map(|atom| self.function_count(&atom.symbol, basis_name))
            .sum()
    }

    /// Contiguous function ranges owned by each atom, in atom order.
    pub fn atom_index_ranges(
        &self,
        molecule: &Molecule,
        basis_name: &str,
    ) -> Result<Vec<Range<usize>>, UnknownBasisError> {
        let mut start = 0;
        molecule
            .atoms()
            .iter()
            .map(|atom| {
                let count = self.function_count(&atom.symbol, basis_name)?;
                let range = start..start + count;
                start += count;
                Ok(range)
            })
            .collect()
    }

    pub fn resolve(&self, molecule: &Molecule, basis_name: &str) -> Result<ResolvedBasis, UnknownBasisError> {
        let atoms = molecule
            .atoms()
            .iter()
            .map(|atom| self.spec(&atom.symbol, basis_name).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let ranges = self.atom_index_ranges(molecule, basis_name)?;
        Ok(ResolvedBasis {
            name: normalize_name(basis_name),
            atoms,
            ranges,
        })
    }

    /// Fails on the first element of `molecule` missing from `basis_name`.
    pub fn check_molecule(&self, molecule: &Molecule, basis_name: &str) -> Result<(), UnknownBasisError> {
        molecule
            .elements()
            .into_iter()
            .try_for_each(|symbol| self.spec(symbol, basis_name).map(|_| ()))
    }
}
