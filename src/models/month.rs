use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Month names as the portal's date picker renders them.
const HEBREW_MONTHS: [(&str, u32); 12] = [
    ("ינואר", 1),
    ("פברואר", 2),
    ("מרץ", 3),
    ("אפריל", 4),
    ("מאי", 5),
    ("יוני", 6),
    ("יולי", 7),
    ("אוגוסט", 8),
    ("ספטמבר", 9),
    ("אוקטובר", 10),
    ("נובמבר", 11),
    ("דצמבר", 12),
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MonthError {
    #[error("Invalid month number {0}: expected 1-12")]
    OutOfRange(u32),
    #[error("Unrecognized month label: {0:?}")]
    BadLabel(String),
}

/// A billing period as the portal labels it, e.g. `2024-12`.
///
/// Statement filenames embed this label, and reconciliation pairs files by it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BillingMonth {
    pub year: i32,
    pub month: u32,
}

impl BillingMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, MonthError> {
        if !(1..=12).contains(&month) {
            return Err(MonthError::OutOfRange(month));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse the portal's month-picker label, e.g. `"דצמבר 2024"`.
    pub fn from_portal_label(label: &str) -> Result<Self, MonthError> {
        let mut parts = label.split_whitespace();
        let (Some(name), Some(year)) = (parts.next(), parts.next()) else {
            return Err(MonthError::BadLabel(label.to_string()));
        };
        let month = HEBREW_MONTHS
            .iter()
            .find(|(heb, _)| *heb == name)
            .map(|(_, num)| *num)
            .ok_or_else(|| MonthError::BadLabel(label.to_string()))?;
        let year: i32 = year
            .parse()
            .map_err(|_| MonthError::BadLabel(label.to_string()))?;
        Self::new(year, month)
    }

    /// Find a `YYYY-MM` label embedded anywhere in a filename stem.
    pub fn find_in(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        for start in 0..bytes.len().saturating_sub(6) {
            if !text.is_char_boundary(start) {
                continue;
            }
            let window = &text[start..];
            if !window.is_char_boundary(7) {
                continue;
            }
            let candidate = &window[..7];
            if let Ok(month) = candidate.parse::<BillingMonth>() {
                // Reject when the match is part of a longer digit run.
                let before_digit = start > 0 && bytes[start - 1].is_ascii_digit();
                let after_digit = bytes
                    .get(start + 7)
                    .is_some_and(|b| b.is_ascii_digit());
                if !before_digit && !after_digit {
                    return Some(month);
                }
            }
        }
        None
    }

    /// Shift by a signed number of months, crossing year boundaries as needed.
    pub fn offset(self, months: i32) -> Self {
        let zero_based = self.year * 12 + (self.month as i32 - 1) + months;
        Self {
            year: zero_based.div_euclid(12),
            month: zero_based.rem_euclid(12) as u32 + 1,
        }
    }

    /// The `YYYY-MM` form used in filenames.
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// The `M/YYYY` form the dashboard uses for its month filter.
    pub fn filter_label(&self) -> String {
        format!("{}/{}", self.month, self.year)
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for BillingMonth {
    type Err = MonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((year, month)) = s.split_once('-') else {
            return Err(MonthError::BadLabel(s.to_string()));
        };
        if year.len() != 4 || month.len() != 2 {
            return Err(MonthError::BadLabel(s.to_string()));
        }
        let year: i32 = year
            .parse()
            .map_err(|_| MonthError::BadLabel(s.to_string()))?;
        let month: u32 = month
            .parse()
            .map_err(|_| MonthError::BadLabel(s.to_string()))?;
        Self::new(year, month)
    }
}
