//! Spreadsheet statement conversion.
//!
//! The portal's export is an `.xlsx` with two sheets: domestic charges first,
//! foreign/FX charges second. Each sheet has a few preamble rows before the
//! actual header row.

use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::markdown::{render_table, COL_PURCHASE_DATE, DOMESTIC_HEADING, FOREIGN_HEADING};

/// Zero-based index of the charged-amount column in the export.
pub const CHARGE_AMOUNT_COLUMN: usize = 5;

/// Rows carrying this marker are per-sheet totals.
const TOTALS_MARKER: &str = "סך הכל";

/// Convert the spreadsheet's first two sheets into a markdown document.
pub fn convert_spreadsheet(path: &Path) -> Result<String> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open spreadsheet: {}", path.display()))?;

    let sheet_names = workbook.sheet_names().to_owned();
    let headings = [DOMESTIC_HEADING, FOREIGN_HEADING];

    let mut out = String::new();
    for (idx, name) in sheet_names.iter().take(2).enumerate() {
        let range = workbook
            .worksheet_range(name)
            .with_context(|| format!("Failed to read sheet {name:?}"))?;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();

        let Some(header_idx) = find_header_row(&rows) else {
            warn!(sheet = %name, "No header row found, skipping sheet");
            continue;
        };

        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(headings[idx]);
        out.push_str("\n\n");

        let headers = rows[header_idx].clone();
        let data: Vec<Vec<String>> = rows[header_idx + 1..].to_vec();
        out.push_str(&render_table(&headers, &data));
    }

    if out.is_empty() {
        anyhow::bail!(
            "Spreadsheet {} has no recognizable transaction sheets",
            path.display()
        );
    }

    Ok(out)
}

/// Sum the charged-amount column per sheet, rounded to 2 decimal places.
///
/// Non-numeric cells (preamble text, blank rows) are skipped, as are the
/// per-sheet totals rows, so the result is the sum of the actual charges.
pub fn sheet_charge_totals(path: &Path) -> Result<Vec<Decimal>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open spreadsheet: {}", path.display()))?;

    let sheet_names = workbook.sheet_names().to_owned();
    let mut totals = Vec::new();

    for name in sheet_names.iter().take(2) {
        let range = workbook
            .worksheet_range(name)
            .with_context(|| format!("Failed to read sheet {name:?}"))?;

        let mut sum = Decimal::ZERO;
        for row in range.rows() {
            if row.iter().any(|cell| {
                matches!(cell, Data::String(s) if s.contains(TOTALS_MARKER))
            }) {
                continue;
            }
            let Some(cell) = row.get(CHARGE_AMOUNT_COLUMN) else {
                continue;
            };
            if let Some(amount) = cell_to_decimal(cell) {
                sum += amount;
            }
        }

        let rounded = sum.round_dp(2);
        debug!(sheet = %name, total = %rounded, "Sheet charge total");
        totals.push(rounded);
    }

    Ok(totals)
}

fn find_header_row(rows: &[Vec<String>]) -> Option<usize> {
    rows.iter()
        .position(|row| row.iter().any(|cell| cell == COL_PURCHASE_DATE))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => format!("{f}"),
        Data::Int(i) => format!("{i}"),
        Data::Bool(b) => b.to_string(),
        Data::Error(_) => String::new(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(dt) => dt.format("%d-%m-%Y").to_string(),
            None => format!("{}", dt.as_f64()),
        },
        Data::DateTimeIso(s) => s.trim().to_string(),
        Data::DurationIso(s) => s.trim().to_string(),
    }
}

fn cell_to_decimal(cell: &Data) -> Option<Decimal> {
    match cell {
        Data::Float(f) => Decimal::from_f64(*f).map(|d| d.round_dp(4)),
        Data::Int(i) => Some(Decimal::from(*i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn header_row_is_found_past_preamble() {
        let rows = vec![
            vec!["פירוט עסקאות לכרטיס".to_string()],
            vec![String::new()],
            vec![COL_PURCHASE_DATE.to_string(), "שם בית העסק".to_string()],
        ];
        assert_eq!(find_header_row(&rows), Some(2));
        assert_eq!(find_header_row(&rows[..2]), None);
    }

    #[test]
    fn float_cells_become_decimals() {
        assert_eq!(
            cell_to_decimal(&Data::Float(182.4)),
            Some(Decimal::from_str("182.4").unwrap())
        );
        assert_eq!(cell_to_decimal(&Data::Int(250)), Some(Decimal::from(250)));
        assert_eq!(cell_to_decimal(&Data::String("182.4".to_string())), None);
        assert_eq!(cell_to_decimal(&Data::Empty), None);
    }

    #[test]
    fn string_cells_are_trimmed() {
        assert_eq!(
            cell_to_string(&Data::String("  בית קפה ".to_string())),
            "בית קפה"
        );
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
