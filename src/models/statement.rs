use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::BillingMonth;

/// The two statement formats the portal exports for every billing month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// The transaction spreadsheet (`.xlsx`).
    Spreadsheet,
    /// The issuer's statement letter (`.pdf`).
    Document,
}

impl StatementKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "xlsx" => Some(StatementKind::Spreadsheet),
            "pdf" => Some(StatementKind::Document),
            _ => None,
        }
    }
}

/// The currency split both statement formats share: the domestic sheet/table
/// and the foreign-currency one. Totals reconcile per section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencySection {
    Domestic,
    Foreign,
}

impl CurrencySection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CurrencySection::Domestic => "domestic",
            CurrencySection::Foreign => "foreign",
        }
    }
}

/// One downloaded statement artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementFile {
    pub path: PathBuf,
    pub kind: StatementKind,
    /// Billing month embedded in the filename, when present.
    pub month: Option<BillingMonth>,
    /// True for positive month offsets. The portal serves partial data for
    /// months that have not closed, so these are excluded from reconciliation.
    pub future: bool,
}

impl StatementFile {
    /// Classify a downloaded file by its name alone.
    ///
    /// Returns `None` for extensions the pipeline does not handle.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = StatementKind::from_path(&path)?;
        let stem = path.file_stem()?.to_str()?;
        Some(Self {
            kind,
            month: BillingMonth::find_in(stem),
            future: stem.contains("future"),
            path,
        })
    }

    /// The markdown output path for this file.
    pub fn markdown_path(&self) -> PathBuf {
        self.path.with_extension("md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_spreadsheet_with_month() {
        let file = StatementFile::from_path("data/transactions_2024-12.xlsx").unwrap();
        assert_eq!(file.kind, StatementKind::Spreadsheet);
        assert_eq!(file.month, Some(BillingMonth::new(2024, 12).unwrap()));
        assert!(!file.future);
        assert_eq!(
            file.markdown_path(),
            PathBuf::from("data/transactions_2024-12.md")
        );
    }

    #[test]
    fn classifies_document() {
        let file = StatementFile::from_path("data/2024-11.pdf").unwrap();
        assert_eq!(file.kind, StatementKind::Document);
        assert_eq!(file.month, Some(BillingMonth::new(2024, 11).unwrap()));
    }

    #[test]
    fn flags_future_downloads() {
        let file = StatementFile::from_path("data/transactions_2025-02_future.xlsx").unwrap();
        assert!(file.future);
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(StatementFile::from_path("data/notes.txt").is_none());
        assert!(StatementFile::from_path("data/transactions_2024-12.md").is_none());
    }
}
