//! Logging setup and batch reporting

use crate::backend::IntegralBackend;
use crate::batch::BatchReport;
use crate::repr::dori::{dori_field, DEFAULT_DENSITY_THRESHOLD};
use crate::table::{FeatureTable, OutputFormat};
use basis::{BasisRegistry, Molecule};
use color_eyre::eyre::{Result, WrapErr};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::time::SystemTime as StdSystemTime;
use tracing::{info, warn};
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt,
    util::SubscriberInitExt, Registry,
};

/// Custom time formatter that shows only seconds
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let duration = StdSystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        let total_seconds = duration.as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Send log records to `log_path`, or to stdout when no path is given.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn setup_output(log_path: Option<&String>) {
    match log_path {
        Some(path) => match File::create(path) {
            Ok(log) => {
                let file_layer = layer()
                    .with_writer(log)
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false);
                let _ = Registry::default().with(file_layer).try_init();
                info!("Log written to: {}", path);
            }
            Err(err) => eprintln!("Could not create log file {}: {}", path, err),
        },
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            let _ = Registry::default().with(stdout_layer).try_init();
        }
    }
}

/// Log the outcome of a batch and write its feature table.
pub fn report_batch(report: &BatchReport, path: &Path, format: OutputFormat) -> Result<FeatureTable> {
    let summary = report.summary();
    info!("\nFitted {} molecules, {} failed", summary.succeeded, summary.failed);

    for features in report.completed() {
        let fit = &features.fit;
        match fit.residual {
            Some(residual) => info!(
                "  {:<16} objective {:+.10}  residual {:.3e}  violation {:.1e}",
                features.molecule_id, fit.objective, residual, fit.constraint_violation
            ),
            None => info!(
                "  {:<16} objective {:+.10}  violation {:.1e}",
                features.molecule_id, fit.objective, fit.constraint_violation
            ),
        }
    }
    for failure in report.failures() {
        warn!("  {:<16} FAILED [{}] {}", failure.molecule_id, failure.kind, failure.message);
    }

    let table = report.table();
    table
        .write_to_path(path, format)
        .wrap_err_with(|| format!("Unable to write feature table: {}", path.display()))?;
    info!(
        "Wrote {} rows x {} feature columns to {} ({})",
        table.rows.len(),
        table.columns.len(),
        path.display(),
        format
    );
    Ok(table)
}

/// Write `<dir>/<molecule id>.dori.json` for every fitted molecule.
///
/// Molecules whose backend cannot supply derivatives on a grid are skipped
/// with a warning. Returns the number of files written.
pub fn write_dori_fields<B: IntegralBackend + ?Sized>(
    report: &BatchReport,
    molecules: &[Molecule],
    backend: &B,
    registry: &BasisRegistry,
    dir: &Path,
) -> Result<usize> {
    fs::create_dir_all(dir).wrap_err_with(|| format!("Unable to create DORI directory: {}", dir.display()))?;
    let by_id: HashMap<&str, &Molecule> = molecules.iter().map(|m| (m.id(), m)).collect();

    let mut written = 0;
    for features in report.completed() {
        let Some(molecule) = by_id.get(features.molecule_id.as_str()) else {
            continue;
        };
        let field = match dori_field(backend, registry, molecule, &features.fit, DEFAULT_DENSITY_THRESHOLD) {
            Ok(field) => field,
            Err(err) => {
                warn!("  {:<16} no DORI field: {}", features.molecule_id, err);
                continue;
            }
        };
        let path = dir.join(format!("{}.dori.json", features.molecule_id));
        let file = File::create(&path).wrap_err_with(|| format!("Unable to write {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &field)
            .wrap_err_with(|| format!("Unable to write {}", path.display()))?;
        written += 1;
    }
    info!("Wrote {} DORI fields to {}", written, dir.display());
    Ok(written)
}
