use std::path::{Path, PathBuf};

use tracing::info;

use super::pdf::{layout, PageGeometry};
use super::{json, DiagnosticReport};
use crate::config::{ExportFormat, REPORT_FILE_PREFIX};
use crate::error::DiagnosticsError;

/// Write the requested report documents into `dir`, returning their paths.
pub fn write_report(
    report: &DiagnosticReport,
    dir: &Path,
    format: ExportFormat,
) -> Result<Vec<PathBuf>, DiagnosticsError> {
    std::fs::create_dir_all(dir)?;
    let stem = format!(
        "{}-{}",
        REPORT_FILE_PREFIX,
        report.timestamp.format("%Y%m%d-%H%M%S")
    );
    let mut written = Vec::new();

    if format.wants_json() {
        let path = dir.join(format!("{}.json", stem));
        std::fs::write(&path, json::encode(report)?)?;
        info!("Wrote JSON report to {:?}", path);
        written.push(path);
    }

    if format.wants_pdf() {
        let path = dir.join(format!("{}.pdf", stem));
        let document = layout(report, PageGeometry::default());
        std::fs::write(&path, document.to_pdf())?;
        info!("Wrote PDF report to {:?} ({} pages)", path, document.pages.len());
        written.push(path);
    }

    Ok(written)
}
