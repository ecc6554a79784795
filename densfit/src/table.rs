//! Tabular output of a batch: one row per molecule, `{method}_{index}`
//! columns.

use crate::batch::FailedMolecule;
use crate::error::DensityResult;
use crate::repr::FeatureRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Csv => f.write_str("csv"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = crate::error::DensityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(crate::error::DensityError::Configuration(format!(
                "unknown output format '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub molecule_id: String,
    /// One cell per table column; `None` where the molecule has no value.
    pub cells: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
    pub failures: Vec<FailedMolecule>,
}

impl FeatureTable {
    /// Lay out per-molecule records. Each method gets as many columns as its
    /// longest record; methods appear in `methods` order.
    pub fn from_records<'a>(
        methods: &[&str],
        molecules: impl IntoIterator<Item = (&'a str, Option<&'a [FeatureRecord]>)>,
        failures: Vec<FailedMolecule>,
    ) -> Self {
        let molecules: Vec<_> = molecules.into_iter().collect();

        let widths: Vec<usize> = methods
            .iter()
            .map(|method| {
                molecules
                    .iter()
                    .filter_map(|(_, records)| *records)
                    .flat_map(|records| records.iter().filter(|r| r.method == *method))
                    .map(FeatureRecord::len)
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let columns = methods
            .iter()
            .zip(&widths)
            .flat_map(|(method, &width)| (0..width).map(move |i| format!("{}_{}", method, i)))
            .collect();

        let rows = molecules
            .iter()
            .map(|(id, records)| {
                let mut cells = Vec::new();
                for (method, &width) in methods.iter().zip(&widths) {
                    let values = (*records)
                        .and_then(|records| records.iter().find(|r| r.method == *method))
                        .map(|r| r.values.as_slice())
                        .unwrap_or(&[]);
                    cells.extend((0..width).map(|i| values.get(i).copied()));
                }
                FeatureRow {
                    molecule_id: id.to_string(),
                    cells,
                }
            })
            .collect();

        Self {
            columns,
            rows,
            failures,
        }
    }

    pub fn row(&self, molecule_id: &str) -> Option<&FeatureRow> {
        self.rows.iter().find(|row| row.molecule_id == molecule_id)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// CSV with a `molecule_id` header column; missing cells are left empty.
    pub fn write_csv<W: Write>(&self, writer: &mut W) -> DensityResult<()> {
        write!(writer, "molecule_id")?;
        for column in &self.columns {
            write!(writer, ",{}", column)?;
        }
        writeln!(writer)?;

        for row in &self.rows {
            write!(writer, "{}", csv_field(&row.molecule_id))?;
            for cell in &row.cells {
                match cell {
                    Some(value) => write!(writer, ",{}", value)?,
                    None => write!(writer, ",")?,
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    pub fn write_json<W: Write>(&self, writer: &mut W) -> DensityResult<()> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writeln!(writer)?;
        Ok(())
    }

    pub fn write_to_path(&self, path: &Path, format: OutputFormat) -> DensityResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        match format {
            OutputFormat::Csv => self.write_csv(&mut writer)?,
            OutputFormat::Json => self.write_json(&mut writer)?,
        }
        writer.flush()?;
        Ok(())
    }
}

fn csv_field(text: &str) -> String {
    if text.contains(|c: char| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}
