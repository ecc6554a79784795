//! Reader for basis sets in NWChem format.
//!
//! Example of the accepted layout (as served by the Basis Set Exchange):
//!
//! ```text
//! BASIS "ao basis" SPHERICAL PRINT
//! #BASIS SET: (4s,1p) -> [2s,1p]
//! H    S
//!      13.0100000              0.0196850
//!       1.9620000              0.1379770
//!       0.4446000              0.4781480
//! H    S
//!       0.1220000              1.0000000
//! H    P
//!       0.7270000              1.0000000
//! END
//! ```
//!
//! `SP` blocks carry an S and a P column sharing the same exponents and are
//! split into two shells. Blocks with several coefficient columns describe
//! general contractions and yield one shell per column.

use crate::error::BasisParseError;
use crate::shell::{BasisSpec, Harmonics, Shell, ANGULAR_LABELS};
use periodic_table_on_an_enum::Element;

struct Block<'a> {
    element: usize,
    label: &'a str,
    header_line: usize,
    rows: Vec<(usize, &'a str)>,
}

/// Parse every element definition found in `input`, keeping the order in
/// which elements first appear. A `BASIS ... CARTESIAN|SPHERICAL` header
/// overrides `default_harmonics`.
pub fn parse_nwchem(input: &str, default_harmonics: Harmonics) -> Result<Vec<BasisSpec>, BasisParseError> {
    let mut harmonics = default_harmonics;
    let mut elements: Vec<(Element, Vec<Shell>)> = Vec::new();
    let mut current: Option<Block> = None;

    for (index, raw) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let keyword = tokens[0].to_ascii_uppercase();
        if keyword == "BASIS" {
            if let Some(block) = current.take() {
                flush_block(block, &mut elements)?;
            }
            for token in &tokens[1..] {
                match token.to_ascii_uppercase().as_str() {
                    "CARTESIAN" => harmonics = Harmonics::Cartesian,
                    "SPHERICAL" => harmonics = Harmonics::Spherical,
                    _ => {}
                }
            }
            continue;
        }
        if keyword == "END" {
            if let Some(block) = current.take() {
                flush_block(block, &mut elements)?;
            }
            continue;
        }

        if tokens[0].chars().all(char::is_alphabetic) {
            if tokens.len() < 2 {
                return Err(BasisParseError::UnknownShell {
                    line: line_no,
                    label: String::new(),
                });
            }
            let element = Element::from_symbol(&normalize_symbol(tokens[0])).ok_or_else(|| {
                BasisParseError::UnknownElement {
                    line: line_no,
                    symbol: tokens[0].to_string(),
                }
            })?;
            if let Some(block) = current.take() {
                flush_block(block, &mut elements)?;
            }
            let label = tokens[1];
            if shell_momenta(label).is_none() {
                return Err(BasisParseError::UnknownShell {
                    line: line_no,
                    label: label.to_string(),
                });
            }
            let position = elements
                .iter()
                .position(|(known, _)| known.get_atomic_number() == element.get_atomic_number());
            let slot = match position {
                Some(slot) => slot,
                None => {
                    elements.push((element, Vec::new()));
                    elements.len() - 1
                }
            };
            current = Some(Block {
                element: slot,
                label,
                header_line: line_no,
                rows: Vec::new(),
            });
            continue;
        }

        match current.as_mut() {
            Some(block) => block.rows.push((line_no, line)),
            None => return Err(BasisParseError::OrphanRow { line: line_no }),
        }
    }

    if let Some(block) = current.take() {
        flush_block(block, &mut elements)?;
    }
    if elements.is_empty() {
        return Err(BasisParseError::Empty);
    }

    elements
        .into_iter()
        .map(|(element, shells)| BasisSpec::new(element.get_symbol(), shells, harmonics))
        .collect()
}

/// Angular momenta described by a block label; `SP` (or `L`) gives two.
fn shell_momenta(label: &str) -> Option<Vec<u32>> {
    let upper = label.to_ascii_uppercase();
    if upper == "SP" || upper == "L" {
        return Some(vec![0, 1]);
    }
    let mut chars = upper.chars();
    let first = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    ANGULAR_LABELS
        .iter()
        .position(|&c| c == first)
        .map(|l| vec![l as u32])
}

fn normalize_symbol(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

fn parse_number(token: &str, line: usize) -> Result<f64, BasisParseError> {
    token
        .replace(['D', 'd'], "E")
        .parse::<f64>()
        .map_err(|_| BasisParseError::BadNumber {
            line,
            token: token.to_string(),
        })
}

fn flush_block(block: Block, elements: &mut [(Element, Vec<Shell>)]) -> Result<(), BasisParseError> {
    if block.rows.is_empty() {
        return Err(BasisParseError::EmptyShell {
            line: block.header_line,
        });
    }
    let momenta = shell_momenta(block.label).ok_or_else(|| BasisParseError::UnknownShell {
        line: block.header_line,
        label: block.label.to_string(),
    })?;
    let combined = momenta.len() > 1;

    let mut exponents = Vec::with_capacity(block.rows.len());
    let mut columns: Vec<Vec<f64>> = Vec::new();
    for (line, row) in &block.rows {
        let values = row
            .split_whitespace()
            .map(|token| parse_number(token, *line))
            .collect::<Result<Vec<_>, _>>()?;
        let width = values.len() - 1;
        if columns.is_empty() {
            let expected = if combined { momenta.len() } else { width.max(1) };
            if width != expected || width == 0 {
                return Err(BasisParseError::ColumnCount {
                    line: *line,
                    expected: expected + 1,
                    found: values.len(),
                });
            }
            columns = vec![Vec::with_capacity(block.rows.len()); width];
        } else if width != columns.len() {
            return Err(BasisParseError::ColumnCount {
                line: *line,
                expected: columns.len() + 1,
                found: values.len(),
            });
        }
        exponents.push(values[0]);
        for (column, value) in columns.iter_mut().zip(&values[1..]) {
            column.push(*value);
        }
    }

    let shells = &mut elements[block.element].1;
    if combined {
        for (l, coefficients) in momenta.into_iter().zip(columns) {
            shells.push(Shell::new(l, exponents.clone(), coefficients)?);
        }
    } else {
        for coefficients in columns {
            shells.push(Shell::new(momenta[0], exponents.clone(), coefficients)?);
        }
    }
    Ok(())
}
