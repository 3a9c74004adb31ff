//! Statement document (PDF) conversion.
//!
//! The issuer's statement letter prints one charge-summary block per currency
//! section. The block's first line names the charge ("חיובים ... בתאריך ...")
//! and the total lands two lines below it, as a bare number with thousands
//! separators.

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::warn;

/// Convert the document to a markdown file holding its extracted text.
///
/// The dashboard ignores these files; they exist so every downloaded artifact
/// has a text rendition next to it.
pub fn convert_document(path: &Path) -> Result<String> {
    let text = extract_text(path)?;

    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("statement");

    Ok(format!("# {title}\n\n```\n{}\n```\n", text.trim()))
}

/// Extract the charge totals printed in a statement document, in document
/// order (one per currency section).
pub fn document_charge_totals(path: &Path) -> Result<Vec<Decimal>> {
    let text = extract_text(path)?;
    Ok(scan_charge_totals(&text))
}

fn extract_text(path: &Path) -> Result<String> {
    pdf_extract::extract_text(path)
        .with_context(|| format!("Failed to extract text from {}", path.display()))
}

/// Scan extracted statement text for charge-summary totals.
///
/// A line containing both "חיובים" and "בתאריך" marks a summary block; the
/// total is two lines further down. Blocks whose total doesn't parse are
/// skipped with a warning.
pub fn scan_charge_totals(text: &str) -> Vec<Decimal> {
    let lines: Vec<&str> = text.lines().collect();
    let mut totals = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !(line.contains("חיובים") && line.contains("בתאריך")) {
            continue;
        }
        let Some(sum_line) = lines.get(i + 2) else {
            warn!(line = i, "Charge summary block truncated at end of document");
            continue;
        };
        let cleaned = sum_line.replace(',', "").replace('₪', "");
        match cleaned.trim().parse::<Decimal>() {
            Ok(total) => totals.push(total),
            Err(_) => {
                warn!(value = %sum_line.trim(), "Unparseable charge total, skipping block");
            }
        }
    }

    totals
}
