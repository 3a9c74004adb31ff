//! The markdown statement-table format.
//!
//! Converted statements are markdown documents with one pipe table per
//! currency section. This module owns the format in both directions: the
//! converter renders tables through it, and the dashboard parses them back
//! into typed [`Transaction`]s.

use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::models::{CurrencySection, Transaction};

/// Section headings. The parser splits on the foreign heading, so the
/// converter and parser must agree on it exactly.
pub const DOMESTIC_HEADING: &str = "## פירוט עסקאות";
pub const FOREIGN_HEADING: &str = "## עסקאות חו\"ל ומט\"ח";

/// Column labels as the portal's spreadsheet export names them.
pub const COL_PURCHASE_DATE: &str = "תאריך עסקה";
pub const COL_MERCHANT: &str = "שם בית העסק";
pub const COL_CATEGORY: &str = "קטגוריה";
pub const COL_KIND: &str = "סוג עסקה";
pub const COL_AMOUNT: &str = "סכום חיוב";
pub const COL_CHARGE_DATE: &str = "תאריך חיוב";
pub const COL_CARD: &str = "4 ספרות אחרונות של כרטיס האשראי";

/// Rows carrying this marker are per-sheet totals, not transactions.
const TOTALS_MARKER: &str = "סך הכל";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("No transaction table header found in section {0:?}")]
    MissingHeader(&'static str),
}

/// Render a markdown pipe table.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    out.push_str("| ");
    out.push_str(&headers.join(" | "));
    out.push_str(" |\n");

    out.push('|');
    for _ in headers {
        out.push_str(" --- |");
    }
    out.push('\n');

    for row in rows {
        out.push_str("| ");
        out.push_str(&row.join(" | "));
        out.push_str(" |\n");
    }
    out
}

/// Parse one statement document into transactions.
///
/// Rows with an unparseable date or amount are dropped with a warning; a
/// section without a recognizable header row is an error.
pub fn parse_statement(content: &str) -> Result<Vec<Transaction>, ParseError> {
    let (domestic, foreign) = match content.split_once(FOREIGN_HEADING) {
        Some((before, after)) => (before, Some(after)),
        None => (content, None),
    };

    let mut transactions = parse_section(domestic, CurrencySection::Domestic)?;
    if let Some(foreign) = foreign {
        transactions.extend(parse_section(foreign, CurrencySection::Foreign)?);
    }
    Ok(transactions)
}

fn parse_section(
    section: &str,
    currency: CurrencySection,
) -> Result<Vec<Transaction>, ParseError> {
    let lines: Vec<&str> = section
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let header_idx = lines
        .iter()
        .position(|l| l.contains('|') && l.contains(COL_PURCHASE_DATE))
        .ok_or(ParseError::MissingHeader(currency.as_str()))?;

    let headers = split_row(lines[header_idx]);

    let mut transactions = Vec::new();
    for line in &lines[header_idx + 1..] {
        if !line.contains('|') || line.contains(TOTALS_MARKER) {
            continue;
        }
        if is_separator_row(line) {
            continue;
        }

        let values = split_row(line);
        if values.len() != headers.len() {
            debug!(
                expected = headers.len(),
                got = values.len(),
                "Skipping row with mismatched cell count"
            );
            continue;
        }

        let cell = |name: &str| -> Option<&str> {
            headers
                .iter()
                .position(|h| h == name)
                .map(|i| values[i].as_str())
        };

        let Some(purchase_raw) = cell(COL_PURCHASE_DATE) else {
            continue;
        };
        let Some(amount_raw) = cell(COL_AMOUNT) else {
            continue;
        };

        let Some(purchase_date) = parse_date(purchase_raw) else {
            warn!(value = purchase_raw, "Skipping row with bad purchase date");
            continue;
        };
        let Some(amount) = parse_amount(amount_raw) else {
            warn!(value = amount_raw, "Skipping row with bad amount");
            continue;
        };

        let charge_date = cell(COL_CHARGE_DATE).and_then(parse_date);
        let merchant = cell(COL_MERCHANT).unwrap_or_default().to_string();

        transactions.push(Transaction::from_row(
            purchase_date,
            charge_date,
            merchant,
            cell(COL_CATEGORY).map(str::to_string).filter(|s| !s.is_empty()),
            cell(COL_KIND).map(str::to_string).filter(|s| !s.is_empty()),
            amount,
            cell(COL_CARD).map(str::to_string).filter(|s| !s.is_empty()),
            currency,
        ));
    }

    Ok(transactions)
}

fn split_row(line: &str) -> Vec<String> {
    line.split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_separator_row(line: &str) -> bool {
    let cells = split_row(line);
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| c.chars().all(|ch| ch == '-' || ch == ':'))
}

/// Strip the currency symbol and thousands separators, then parse.
fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned = raw.replace('₪', "").replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "NaN" {
        return None;
    }
    cleaned.parse().ok()
}

/// Dates appear as `DD-MM-YYYY` in the spreadsheet export and as ISO
/// datetimes when the cell carried a real Excel date.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "NaN" {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%d-%m-%Y")
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date())
        })
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// List the statement markdown files in a directory, sorted by name.
///
/// Demo mode restricts the listing to the bundled demo files.
pub fn statement_files(dir: &Path, demo: bool) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let marker = if demo { "demo_expenses" } else { "transactions" };

    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("Failed to read data dir {}: {e}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().and_then(|e| e.to_str()) == Some("md")
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| stem.contains(marker))
        })
        .collect();
    files.sort();

    debug!(count = files.len(), "Found statement markdown files");
    Ok(files)
}

/// Load every statement markdown file in a directory.
///
/// Per-file parse failures are logged and skipped so one bad download
/// doesn't blank the dashboard.
pub fn load_transactions(dir: &Path, demo: bool) -> anyhow::Result<Vec<Transaction>> {
    let files = statement_files(dir, demo)?;

    let mut transactions = Vec::new();
    for path in files {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read statement file");
                continue;
            }
        };
        match parse_statement(&content) {
            Ok(parsed) => {
                debug!(path = %path.display(), rows = parsed.len(), "Parsed statement file");
                transactions.extend(parsed);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse statement file");
            }
        }
    }

    Ok(transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_statement() -> String {
        format!(
            "{DOMESTIC_HEADING}\n\
             \n\
             | {COL_PURCHASE_DATE} | {COL_MERCHANT} | {COL_CATEGORY} | {COL_KIND} | {COL_AMOUNT} | {COL_CHARGE_DATE} | {COL_CARD} |\n\
             | --- | --- | --- | --- | --- | --- | --- |\n\
             | 03-12-2024 | סופר השכונה | מזון | רגילה | ₪182.40 | 02-01-2025 | 1234 |\n\
             | 15-12-2024 | תחנת דלק | רכב | רגילה | 250.00 | 02-01-2025 | 1234 |\n\
             | {TOTALS_MARKER} |  |  |  | ₪432.40 |  |  |\n\
             \n\
             {FOREIGN_HEADING}\n\
             \n\
             | {COL_PURCHASE_DATE} | {COL_MERCHANT} | {COL_CATEGORY} | {COL_KIND} | {COL_AMOUNT} | {COL_CHARGE_DATE} | {COL_CARD} |\n\
             | --- | --- | --- | --- | --- | --- | --- |\n\
             | 20-12-2024 | Online Store | קניות | רגילה | 99.90 | 02-01-2025 | 1234 |\n"
        )
    }

    #[test]
    fn parses_both_sections() {
        let txns = parse_statement(&sample_statement()).unwrap();
        assert_eq!(txns.len(), 3);

        let domestic: Vec<_> = txns
            .iter()
            .filter(|t| t.section == CurrencySection::Domestic)
            .collect();
        assert_eq!(domestic.len(), 2);
        assert_eq!(domestic[0].merchant, "סופר השכונה");
        assert_eq!(domestic[0].amount, Decimal::from_str("182.40").unwrap());
        assert_eq!(
            domestic[0].purchase_date,
            NaiveDate::from_ymd_opt(2024, 12, 3).unwrap()
        );
        assert_eq!(
            domestic[0].charge_date,
            Some(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap())
        );

        let foreign: Vec<_> = txns
            .iter()
            .filter(|t| t.section == CurrencySection::Foreign)
            .collect();
        assert_eq!(foreign.len(), 1);
        assert_eq!(foreign[0].merchant, "Online Store");
    }

    #[test]
    fn totals_rows_are_not_transactions() {
        let txns = parse_statement(&sample_statement()).unwrap();
        assert!(txns
            .iter()
            .all(|t| t.amount != Decimal::from_str("432.40").unwrap()));
    }

    #[test]
    fn rows_with_bad_dates_are_dropped() {
        let content = format!(
            "| {COL_PURCHASE_DATE} | {COL_MERCHANT} | {COL_AMOUNT} |\n\
             | --- | --- | --- |\n\
             | NaN | חנות | 10.00 |\n\
             | 01-12-2024 | חנות | 20.00 |\n"
        );
        let txns = parse_statement(&content).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, Decimal::from_str("20.00").unwrap());
    }

    #[test]
    fn rows_with_bad_amounts_are_dropped() {
        let content = format!(
            "| {COL_PURCHASE_DATE} | {COL_MERCHANT} | {COL_AMOUNT} |\n\
             | --- | --- | --- |\n\
             | 01-12-2024 | חנות | NaN |\n"
        );
        let txns = parse_statement(&content).unwrap();
        assert!(txns.is_empty());
    }

    #[test]
    fn iso_datetime_dates_parse() {
        let content = format!(
            "| {COL_PURCHASE_DATE} | {COL_MERCHANT} | {COL_AMOUNT} |\n\
             | --- | --- | --- |\n\
             | 2024-12-03 00:00:00 | חנות | 15.50 |\n"
        );
        let txns = parse_statement(&content).unwrap();
        assert_eq!(
            txns[0].purchase_date,
            NaiveDate::from_ymd_opt(2024, 12, 3).unwrap()
        );
    }

    #[test]
    fn missing_header_is_an_error() {
        assert!(parse_statement("no tables here").is_err());
    }

    #[test]
    fn render_table_roundtrips_through_parser() {
        let headers: Vec<String> = [COL_PURCHASE_DATE, COL_MERCHANT, COL_AMOUNT]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![vec![
            "05-11-2024".to_string(),
            "בית קפה".to_string(),
            "34.00".to_string(),
        ]];
        let rendered = render_table(&headers, &rows);

        let txns = parse_statement(&rendered).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].merchant, "בית קפה");
    }
}
