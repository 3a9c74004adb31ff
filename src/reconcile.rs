//! Statement reconciliation.
//!
//! Every closed billing month is downloaded twice: as a spreadsheet and as
//! the issuer's statement document. The two are produced by different backend
//! systems, so comparing their per-section charge totals catches truncated
//! exports and silently missing rows. Section order differs between the two
//! formats, so totals are compared sorted.

use std::path::PathBuf;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::convert::{document_charge_totals, sheet_charge_totals};
use crate::models::{BillingMonth, StatementFile, StatementKind};

/// Totals within this distance count as equal. The two formats round
/// independently, so exact equality is too strict.
pub fn default_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// One document total against its spreadsheet counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionComparison {
    pub document_total: Decimal,
    pub spreadsheet_total: Option<Decimal>,
    pub matched: bool,
}

impl SectionComparison {
    pub fn delta(&self) -> Option<Decimal> {
        self.spreadsheet_total
            .map(|s| (self.document_total - s).abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// Every section total matched within tolerance.
    Matched,
    /// At least one section total disagreed.
    Mismatched,
    /// No spreadsheet was downloaded for this document's month.
    MissingCounterpart,
    /// One of the files could not be read or its totals extracted.
    Unreadable,
}

/// Reconciliation outcome for one statement document.
#[derive(Debug, Clone)]
pub struct MonthReconciliation {
    pub month: Option<BillingMonth>,
    pub document: PathBuf,
    pub spreadsheet: Option<PathBuf>,
    pub comparisons: Vec<SectionComparison>,
    pub status: ReconcileStatus,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub months: Vec<MonthReconciliation>,
}

impl ReconcileReport {
    pub fn all_matched(&self) -> bool {
        self.months
            .iter()
            .all(|m| m.status == ReconcileStatus::Matched)
    }
}

/// Compare document totals against spreadsheet totals within a tolerance.
///
/// Both lists are sorted ascending first; each document total is then paired
/// with the spreadsheet total at the same rank. A document total past the end
/// of the spreadsheet list has no counterpart and cannot match.
pub fn compare_totals(
    mut document: Vec<Decimal>,
    mut spreadsheet: Vec<Decimal>,
    tolerance: Decimal,
) -> Vec<SectionComparison> {
    document.sort();
    spreadsheet.sort();

    document
        .into_iter()
        .enumerate()
        .map(|(i, doc_total)| match spreadsheet.get(i) {
            Some(&sheet_total) => SectionComparison {
                document_total: doc_total,
                spreadsheet_total: Some(sheet_total),
                matched: (doc_total - sheet_total).abs() <= tolerance,
            },
            None => SectionComparison {
                document_total: doc_total,
                spreadsheet_total: None,
                matched: false,
            },
        })
        .collect()
}

/// Reconcile a set of downloaded statement files.
///
/// Future-month spreadsheets hold partial data and are excluded. Files that
/// cannot be read are reported as such and the run continues.
pub fn reconcile_downloads(files: &[StatementFile], tolerance: Decimal) -> ReconcileReport {
    let documents: Vec<&StatementFile> = files
        .iter()
        .filter(|f| f.kind == StatementKind::Document && !f.future)
        .collect();
    let spreadsheets: Vec<&StatementFile> = files
        .iter()
        .filter(|f| f.kind == StatementKind::Spreadsheet && !f.future)
        .collect();

    let mut report = ReconcileReport::default();

    for document in documents {
        report.months.push(reconcile_document(
            document,
            &spreadsheets,
            tolerance,
        ));
    }

    for entry in &report.months {
        match entry.status {
            ReconcileStatus::Matched => {
                info!(document = %entry.document.display(), "Totals match");
            }
            ReconcileStatus::Mismatched => {
                for cmp in entry.comparisons.iter().filter(|c| !c.matched) {
                    warn!(
                        document = %entry.document.display(),
                        document_total = %cmp.document_total,
                        spreadsheet_total = ?cmp.spreadsheet_total,
                        "Totals differ"
                    );
                }
            }
            ReconcileStatus::MissingCounterpart => {
                warn!(document = %entry.document.display(), "No spreadsheet for this month");
            }
            ReconcileStatus::Unreadable => {
                warn!(document = %entry.document.display(), "Could not extract totals");
            }
        }
    }

    report
}

fn reconcile_document(
    document: &StatementFile,
    spreadsheets: &[&StatementFile],
    tolerance: Decimal,
) -> MonthReconciliation {
    let base = MonthReconciliation {
        month: document.month,
        document: document.path.clone(),
        spreadsheet: None,
        comparisons: Vec::new(),
        status: ReconcileStatus::MissingCounterpart,
    };

    let Some(month) = document.month else {
        warn!(path = %document.path.display(), "Document filename has no month label");
        return base;
    };

    let matching: Vec<&&StatementFile> = spreadsheets
        .iter()
        .filter(|s| s.month == Some(month))
        .collect();
    let Some(spreadsheet) = matching.first() else {
        return base;
    };
    if matching.len() > 1 {
        warn!(month = %month, "Multiple spreadsheets for month, using the first");
    }

    let doc_totals = match document_charge_totals(&document.path) {
        Ok(totals) => totals,
        Err(e) => {
            warn!(path = %document.path.display(), error = %e, "Failed to read document totals");
            return MonthReconciliation {
                status: ReconcileStatus::Unreadable,
                spreadsheet: Some(spreadsheet.path.clone()),
                ..base
            };
        }
    };

    let sheet_totals = match sheet_charge_totals(&spreadsheet.path) {
        Ok(totals) => totals,
        Err(e) => {
            warn!(path = %spreadsheet.path.display(), error = %e, "Failed to read spreadsheet totals");
            return MonthReconciliation {
                status: ReconcileStatus::Unreadable,
                spreadsheet: Some(spreadsheet.path.clone()),
                ..base
            };
        }
    };

    let comparisons = compare_totals(doc_totals, sheet_totals, tolerance);
    let status = if comparisons.iter().all(|c| c.matched) {
        ReconcileStatus::Matched
    } else {
        ReconcileStatus::Mismatched
    };

    MonthReconciliation {
        spreadsheet: Some(spreadsheet.path.clone()),
        comparisons,
        status,
        ..base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn equal_totals_match() {
        let cmps = compare_totals(
            vec![dec("5432.10"), dec("99.90")],
            vec![dec("99.90"), dec("5432.10")],
            default_tolerance(),
        );
        assert_eq!(cmps.len(), 2);
        assert!(cmps.iter().all(|c| c.matched));
    }

    #[test]
    fn totals_within_tolerance_match() {
        let cmps = compare_totals(
            vec![dec("100.00")],
            vec![dec("100.01")],
            default_tolerance(),
        );
        assert!(cmps[0].matched);
        assert_eq!(cmps[0].delta(), Some(dec("0.01")));
    }

    #[test]
    fn totals_past_tolerance_mismatch() {
        let cmps = compare_totals(
            vec![dec("100.00")],
            vec![dec("100.02")],
            default_tolerance(),
        );
        assert!(!cmps[0].matched);
    }

    #[test]
    fn comparison_is_order_insensitive() {
        // Section order differs between the two formats.
        let cmps = compare_totals(
            vec![dec("99.90"), dec("5432.10")],
            vec![dec("5432.10"), dec("99.90")],
            default_tolerance(),
        );
        assert!(cmps.iter().all(|c| c.matched));
    }

    #[test]
    fn extra_document_total_has_no_counterpart() {
        let cmps = compare_totals(
            vec![dec("100.00"), dec("200.00")],
            vec![dec("100.00")],
            default_tolerance(),
        );
        assert!(cmps[0].matched);
        assert!(!cmps[1].matched);
        assert_eq!(cmps[1].spreadsheet_total, None);
        assert_eq!(cmps[1].delta(), None);
    }

    #[test]
    fn empty_inputs_compare_to_nothing() {
        assert!(compare_totals(Vec::new(), Vec::new(), default_tolerance()).is_empty());
    }
}
