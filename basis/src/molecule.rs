//! Immutable molecule descriptor shared by every stage of the pipeline.

use crate::error::MoleculeError;
use nalgebra::Vector3;
use periodic_table_on_an_enum::Element;
use serde::{Deserialize, Serialize};

/// A nucleus: element and position in Bohr.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub symbol: String,
    pub atomic_number: u32,
    pub position: Vector3<f64>,
}

impl Atom {
    pub fn new(symbol: &str, position: Vector3<f64>) -> Result<Self, MoleculeError> {
        let element = Element::from_symbol(symbol)
            .ok_or_else(|| MoleculeError::UnknownElement(symbol.to_string()))?;
        Ok(Self {
            symbol: element.get_symbol().to_string(),
            atomic_number: element.get_atomic_number() as u32,
            position,
        })
    }
}

/// Geometry, charge state and basis choices of one input structure.
///
/// Built once per structure and never mutated; pipelines borrow it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Molecule {
    id: String,
    atoms: Vec<Atom>,
    charge: i32,
    multiplicity: usize,
    primary_basis: String,
    auxiliary_basis: String,
}

impl Molecule {
    pub fn new(
        id: impl Into<String>,
        atoms: Vec<Atom>,
        charge: i32,
        multiplicity: usize,
        primary_basis: impl Into<String>,
        auxiliary_basis: impl Into<String>,
    ) -> Result<Self, MoleculeError> {
        let id = id.into();
        if atoms.is_empty() {
            return Err(MoleculeError::Empty(id));
        }
        if multiplicity == 0 {
            return Err(MoleculeError::InvalidMultiplicity);
        }

        let nuclear: i64 = atoms.iter().map(|a| a.atomic_number as i64).sum();
        let electrons = nuclear - charge as i64;
        if electrons < 0 {
            return Err(MoleculeError::NegativeElectrons(electrons));
        }
        let unpaired = multiplicity as i64 - 1;
        if unpaired > electrons || (electrons - unpaired) % 2 != 0 {
            return Err(MoleculeError::ParityMismatch {
                electrons,
                multiplicity,
            });
        }

        Ok(Self {
            id,
            atoms,
            charge,
            multiplicity,
            primary_basis: primary_basis.into(),
            auxiliary_basis: auxiliary_basis.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    pub fn multiplicity(&self) -> usize {
        self.multiplicity
    }

    pub fn primary_basis(&self) -> &str {
        &self.primary_basis
    }

    pub fn auxiliary_basis(&self) -> &str {
        &self.auxiliary_basis
    }

    pub fn nuclear_charge(&self) -> u32 {
        self.atoms.iter().map(|a| a.atomic_number).sum()
    }

    pub fn electron_count(&self) -> usize {
        (self.nuclear_charge() as i64 - self.charge as i64) as usize
    }

    /// Numbers of alpha and beta electrons (alpha takes the unpaired ones).
    pub fn alpha_beta_counts(&self) -> (usize, usize) {
        let electrons = self.electron_count();
        let unpaired = self.multiplicity - 1;
        let beta = (electrons - unpaired) / 2;
        (beta + unpaired, beta)
    }

    /// Sorted list of the distinct element symbols.
    pub fn elements(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.atoms.iter().map(|a| a.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water_atoms() -> Vec<Atom> {
        vec![
            Atom::new("O", Vector3::new(0.0, 0.0, 0.0)).unwrap(),
            Atom::new("H", Vector3::new(0.0, 1.43, 1.11)).unwrap(),
            Atom::new("H", Vector3::new(0.0, -1.43, 1.11)).unwrap(),
        ]
    }

    #[test]
    fn test_electron_counts() {
        let water = Molecule::new("h2o", water_atoms(), 0, 1, "sto-3g", "def2-svp-jkfit").unwrap();
        assert_eq!(water.electron_count(), 10);
        assert_eq!(water.alpha_beta_counts(), (5, 5));
        assert_eq!(water.elements(), vec!["H", "O"]);

        let cation = Molecule::new("h2o+", water_atoms(), 1, 2, "sto-3g", "def2-svp-jkfit").unwrap();
        assert_eq!(cation.electron_count(), 9);
        assert_eq!(cation.alpha_beta_counts(), (5, 4));
    }

    #[test]
    fn test_rejects_inconsistent_spin() {
        let err = Molecule::new("h2o", water_atoms(), 0, 2, "sto-3g", "aux").unwrap_err();
        assert!(matches!(err, MoleculeError::ParityMismatch { electrons: 10, .. }));
    }

    #[test]
    fn test_rejects_unknown_element_and_empty() {
        assert!(Atom::new("Xx", Vector3::zeros()).is_err());
        assert_eq!(
            Molecule::new("none", Vec::new(), 0, 1, "a", "b").unwrap_err(),
            MoleculeError::Empty("none".to_string())
        );
    }
}
