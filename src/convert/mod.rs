//! Statement file conversion.
//!
//! Downloaded statements arrive as a spreadsheet and a PDF document per
//! billing month; both are converted to markdown files next to the source so
//! the dashboard and the insights prompt work from one text format.

mod document;
mod spreadsheet;

pub use document::{document_charge_totals, scan_charge_totals};
pub use spreadsheet::{sheet_charge_totals, CHARGE_AMOUNT_COLUMN};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::models::{StatementFile, StatementKind};

/// Convert one downloaded statement to markdown, written next to the source.
///
/// Returns the path of the markdown file.
pub fn to_markdown(file: &StatementFile) -> Result<PathBuf> {
    let content = match file.kind {
        StatementKind::Spreadsheet => spreadsheet::convert_spreadsheet(&file.path)?,
        StatementKind::Document => document::convert_document(&file.path)?,
    };

    let out_path = file.markdown_path();
    std::fs::write(&out_path, content)
        .with_context(|| format!("Failed to write markdown file: {}", out_path.display()))?;

    info!(path = %out_path.display(), "Markdown file saved");
    Ok(out_path)
}

/// Convert a file by path, classifying it by extension.
pub fn convert_path(path: &Path) -> Result<PathBuf> {
    let file = StatementFile::from_path(path)
        .with_context(|| format!("Unsupported statement file: {}", path.display()))?;
    to_markdown(&file)
}
