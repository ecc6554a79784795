//! Molecule input: inline geometries and XYZ files.

use crate::config::{Config, MoleculeEntry};
use basis::{Atom, Molecule};
use color_eyre::eyre::{eyre, Result, WrapErr};
use nalgebra::Vector3;
use std::fs;
use tracing::info;

/// 1 Å in Bohr.
pub const ANGSTROM_TO_BOHR: f64 = 1.0 / 0.529_177_210_903;

/// Atoms of an XYZ file (count line, comment line, `El x y z` rows in Å),
/// converted to Bohr.
pub fn parse_xyz(text: &str) -> Result<Vec<Atom>> {
    let mut lines = text.lines();
    let count: usize = lines
        .next()
        .ok_or_else(|| eyre!("empty XYZ input"))?
        .trim()
        .parse()
        .wrap_err("first XYZ line must be the atom count")?;
    lines.next();

    let mut atoms = Vec::with_capacity(count);
    for (index, line) in lines.filter(|l| !l.trim().is_empty()).take(count).enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            return Err(eyre!("XYZ atom {} has {} fields, expected 4", index + 1, tokens.len()));
        }
        let mut coords = [0.0; 3];
        for (slot, token) in coords.iter_mut().zip(&tokens[1..4]) {
            *slot = token
                .parse::<f64>()
                .wrap_err_with(|| format!("bad coordinate '{}' for XYZ atom {}", token, index + 1))?;
        }
        let position = Vector3::from(coords) * ANGSTROM_TO_BOHR;
        atoms.push(Atom::new(tokens[0], position)?);
    }
    if atoms.len() != count {
        return Err(eyre!("XYZ header announces {} atoms but {} were found", count, atoms.len()));
    }
    Ok(atoms)
}

fn entry_atoms(entry: &MoleculeEntry) -> Result<Vec<Atom>> {
    if let Some(geometry) = &entry.geometry {
        return geometry
            .iter()
            .map(|atom| Atom::new(&atom.element, Vector3::from(atom.coords)).map_err(Into::into))
            .collect();
    }
    let path = entry
        .xyz
        .as_ref()
        .ok_or_else(|| eyre!("molecule '{}' needs either a geometry or an xyz file", entry.id))?;
    let text = fs::read_to_string(path).wrap_err_with(|| format!("Unable to read XYZ file: {}", path))?;
    parse_xyz(&text).wrap_err_with(|| format!("Invalid XYZ file: {}", path))
}

/// Build the molecules listed in the job file, in order.
pub fn build_molecules(config: &Config) -> Result<Vec<Molecule>> {
    info!("\nPreparing {} molecules...", config.molecules.len());
    config
        .molecules
        .iter()
        .map(|entry| {
            let atoms = entry_atoms(entry)?;
            let primary = entry
                .primary_basis
                .clone()
                .or_else(|| config.primary_basis.clone())
                .unwrap_or_else(|| "sto-3g".to_string());
            let auxiliary = entry
                .auxiliary_basis
                .clone()
                .or_else(|| config.basis_name.clone())
                .ok_or_else(|| eyre!("molecule '{}' has no auxiliary basis", entry.id))?;
            let molecule = Molecule::new(
                entry.id.clone(),
                atoms,
                entry.charge.unwrap_or(0),
                entry.multiplicity.unwrap_or(1),
                primary,
                auxiliary,
            )
            .wrap_err_with(|| format!("Invalid molecule '{}'", entry.id))?;
            Ok(molecule)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_xyz_converts_to_bohr() {
        let text = "3\nwater\nO 0.0 0.0 0.0\nH 0.0 0.757 0.587\nH 0.0 -0.757 0.587\n";
        let atoms = parse_xyz(text).unwrap();
        assert_eq!(atoms.len(), 3);
        assert_eq!(atoms[0].atomic_number, 8);
        assert!((atoms[1].position.y - 0.757 * ANGSTROM_TO_BOHR).abs() < 1e-12);
        assert!((atoms[1].position.y - 1.430_522).abs() < 1e-5);
    }

    #[test]
    fn test_parse_xyz_rejects_truncated_input() {
        assert!(parse_xyz("2\n\nH 0 0 0\n").is_err());
        assert!(parse_xyz("1\n\nH 0 0\n").is_err());
        assert!(parse_xyz("one\n").is_err());
    }
}
