//! Contracted shells and per-element basis definitions.

use crate::error::BasisParseError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Labels used by NWChem and most basis-set libraries, indexed by l.
pub const ANGULAR_LABELS: [char; 7] = ['S', 'P', 'D', 'F', 'G', 'H', 'I'];

/// How the functions of a shell with angular momentum l are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Harmonics {
    /// Real solid harmonics, 2l+1 functions per shell.
    #[default]
    Spherical,
    /// Cartesian monomials, (l+1)(l+2)/2 functions per shell.
    Cartesian,
}

impl Harmonics {
    pub fn functions_per_shell(self, l: u32) -> usize {
        let l = l as usize;
        match self {
            Harmonics::Spherical => 2 * l + 1,
            Harmonics::Cartesian => (l + 1) * (l + 2) / 2,
        }
    }
}

/// A contracted shell: one angular momentum, a set of primitive exponents
/// and the matching contraction coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shell {
    pub l: u32,
    pub exponents: Vec<f64>,
    pub coefficients: Vec<f64>,
}

impl Shell {
    pub fn new(l: u32, exponents: Vec<f64>, coefficients: Vec<f64>) -> Result<Self, BasisParseError> {
        if exponents.is_empty() {
            return Err(BasisParseError::InvalidShell(
                "a shell needs at least one primitive".to_string(),
            ));
        }
        if exponents.len() != coefficients.len() {
            return Err(BasisParseError::InvalidShell(format!(
                "{} exponents but {} coefficients",
                exponents.len(),
                coefficients.len()
            )));
        }
        if let Some(bad) = exponents.iter().find(|a| !(a.is_finite() && **a > 0.0)) {
            return Err(BasisParseError::InvalidShell(format!(
                "exponent {} is not a positive number",
                bad
            )));
        }
        if (l as usize) >= ANGULAR_LABELS.len() {
            return Err(BasisParseError::InvalidShell(format!(
                "angular momentum {} is not supported",
                l
            )));
        }
        Ok(Self {
            l,
            exponents,
            coefficients,
        })
    }

    /// Convenience constructor for an uncontracted shell.
    pub fn primitive(l: u32, exponent: f64) -> Result<Self, BasisParseError> {
        Self::new(l, vec![exponent], vec![1.0])
    }

    pub fn label(&self) -> char {
        ANGULAR_LABELS[self.l as usize]
    }

    pub fn num_primitives(&self) -> usize {
        self.exponents.len()
    }

    pub fn function_count(&self, harmonics: Harmonics) -> usize {
        harmonics.functions_per_shell(self.l)
    }
}

/// All shells of one element in one basis set, in library order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisSpec {
    pub symbol: String,
    pub atomic_number: u32,
    #[serde(default)]
    pub harmonics: Harmonics,
    pub shells: Vec<Shell>,
}

impl BasisSpec {
    pub fn new(symbol: &str, shells: Vec<Shell>, harmonics: Harmonics) -> Result<Self, BasisParseError> {
        let element = periodic_table_on_an_enum::Element::from_symbol(symbol).ok_or_else(|| {
            BasisParseError::UnknownElement {
                line: 0,
                symbol: symbol.to_string(),
            }
        })?;
        Ok(Self {
            symbol: element.get_symbol().to_string(),
            atomic_number: element.get_atomic_number() as u32,
            harmonics,
            shells,
        })
    }

    /// Number of basis functions this element contributes.
    pub fn function_count(&self) -> usize {
        self.shells
            .iter()
            .map(|shell| shell.function_count(self.harmonics))
            .sum()
    }

    /// Angular momentum of every function, in function order.
    pub fn function_angular_momenta(&self) -> Vec<u32> {
        self.shells
            .iter()
            .flat_map(|shell| std::iter::repeat(shell.l).take(shell.function_count(self.harmonics)))
            .collect()
    }

    pub fn max_angular_momentum(&self) -> Option<u32> {
        self.shells.iter().map(|shell| shell.l).max()
    }

    /// Compact description such as `[3s2p1d]`.
    pub fn contraction_pattern(&self) -> String {
        let mut counts = [0usize; ANGULAR_LABELS.len()];
        for shell in &self.shells {
            counts[shell.l as usize] += 1;
        }
        let body: String = counts
            .iter()
            .zip(ANGULAR_LABELS.iter())
            .filter(|(count, _)| **count > 0)
            .map(|(count, label)| format!("{}{}", count, label.to_ascii_lowercase()))
            .collect();
        format!("[{}]", body)
    }

    /// Re-check a definition that did not come through [`BasisSpec::new`],
    /// e.g. one deserialized from disk.
    pub fn validated(self) -> Result<Self, BasisParseError> {
        let shells = self
            .shells
            .into_iter()
            .map(|shell| Shell::new(shell.l, shell.exponents, shell.coefficients))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(&self.symbol, shells, self.harmonics)
    }

    pub fn to_json(&self) -> Result<String, BasisParseError> {
        serde_json::to_string_pretty(self).map_err(|e| BasisParseError::Json(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, BasisParseError> {
        let spec: BasisSpec =
            serde_json::from_str(text).map_err(|e| BasisParseError::Json(e.to_string()))?;
        spec.validated()
    }

    /// Load a list of element definitions stored as a JSON array.
    pub fn load_all_from_file(path: &Path) -> Result<Vec<Self>, BasisParseError> {
        let text = fs::read_to_string(path)
            .map_err(|e| BasisParseError::Json(format!("{}: {}", path.display(), e)))?;
        let raw: Vec<BasisSpec> =
            serde_json::from_str(&text).map_err(|e| BasisParseError::Json(e.to_string()))?;
        raw.into_iter().map(BasisSpec::validated).collect()
    }
}
