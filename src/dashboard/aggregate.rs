//! Dashboard aggregation.
//!
//! Pure functions over the parsed transaction list; the HTTP handlers are
//! thin wrappers around these so everything here is testable without a
//! server.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{BillingMonth, Transaction};

/// Bucket for rows whose category column was empty.
const UNCATEGORIZED: &str = "ללא קטגוריה";

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total: Decimal,
    pub transaction_count: usize,
    /// Available month-filter values, newest first.
    pub months: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotal {
    pub month: String,
    pub total: Decimal,
    /// Absolute change vs the previous month, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,
    /// Change vs the previous month in percent, one decimal place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<Decimal>,
}

/// Keep only transactions charged in the given `M/YYYY` month. `None` keeps
/// everything.
pub fn filter_by_month<'a>(
    transactions: &'a [Transaction],
    month: Option<&str>,
) -> Vec<&'a Transaction> {
    match month {
        None | Some("") => transactions.iter().collect(),
        Some(label) => transactions
            .iter()
            .filter(|t| t.charge_month().filter_label() == label)
            .collect(),
    }
}

pub fn summary(all: &[Transaction], filtered: &[&Transaction]) -> Summary {
    let mut months: Vec<BillingMonth> = all.iter().map(|t| t.charge_month()).collect();
    months.sort();
    months.dedup();
    months.reverse();

    Summary {
        total: filtered.iter().map(|t| t.amount).sum(),
        transaction_count: filtered.len(),
        months: months.iter().map(BillingMonth::filter_label).collect(),
    }
}

/// Per-category totals, smallest first, dropping categories below
/// `min_amount`.
pub fn categories(transactions: &[&Transaction], min_amount: Decimal) -> Vec<CategoryTotal> {
    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    for t in transactions {
        let category = t
            .category
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        *by_category.entry(category).or_default() += t.amount;
    }

    let mut totals: Vec<CategoryTotal> = by_category
        .into_iter()
        .filter(|(_, total)| *total >= min_amount)
        .map(|(category, total)| CategoryTotal { category, total })
        .collect();
    totals.sort_by(|a, b| a.total.cmp(&b.total));
    totals
}

/// Per-month totals in chronological order, with month-over-month change.
pub fn months(transactions: &[Transaction]) -> Vec<MonthTotal> {
    let mut by_month: BTreeMap<BillingMonth, Decimal> = BTreeMap::new();
    for t in transactions {
        *by_month.entry(t.charge_month()).or_default() += t.amount;
    }

    let mut out: Vec<MonthTotal> = Vec::with_capacity(by_month.len());
    let mut previous: Option<Decimal> = None;
    for (month, total) in by_month {
        let change = previous.map(|p| total - p);
        let change_pct = match previous {
            Some(p) if !p.is_zero() => Some(((total - p) / p * Decimal::from(100)).round_dp(1)),
            _ => None,
        };
        out.push(MonthTotal {
            month: month.filter_label(),
            total,
            change,
            change_pct,
        });
        previous = Some(total);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CurrencySection;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn tx(charge: &str, category: Option<&str>, amount: &str) -> Transaction {
        let charge_date = NaiveDate::parse_from_str(charge, "%Y-%m-%d").unwrap();
        Transaction::from_row(
            charge_date,
            Some(charge_date),
            "חנות",
            category.map(str::to_string),
            None,
            Decimal::from_str(amount).unwrap(),
            None,
            CurrencySection::Domestic,
        )
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx("2024-11-02", Some("מזון"), "100.00"),
            tx("2024-11-15", Some("רכב"), "250.00"),
            tx("2024-12-02", Some("מזון"), "80.00"),
            tx("2024-12-20", None, "20.00"),
        ]
    }

    #[test]
    fn summary_lists_months_newest_first() {
        let all = sample();
        let filtered = filter_by_month(&all, None);
        let s = summary(&all, &filtered);

        assert_eq!(s.transaction_count, 4);
        assert_eq!(s.total, Decimal::from_str("450.00").unwrap());
        assert_eq!(s.months, vec!["12/2024", "11/2024"]);
    }

    #[test]
    fn month_filter_narrows_the_set() {
        let all = sample();
        let filtered = filter_by_month(&all, Some("12/2024"));
        assert_eq!(filtered.len(), 2);

        let s = summary(&all, &filtered);
        assert_eq!(s.total, Decimal::from_str("100.00").unwrap());
        // Filter options always cover the full data set.
        assert_eq!(s.months.len(), 2);
    }

    #[test]
    fn categories_sort_ascending_and_bucket_uncategorized() {
        let all = sample();
        let filtered = filter_by_month(&all, None);
        let cats = categories(&filtered, Decimal::ZERO);

        assert_eq!(cats.len(), 3);
        assert_eq!(cats[0].category, UNCATEGORIZED);
        assert_eq!(cats[0].total, Decimal::from_str("20.00").unwrap());
        assert_eq!(cats[2].category, "רכב");
    }

    #[test]
    fn categories_respect_min_amount() {
        let all = sample();
        let filtered = filter_by_month(&all, None);
        let cats = categories(&filtered, Decimal::from(100));

        assert_eq!(cats.len(), 2);
        assert!(cats.iter().all(|c| c.total >= Decimal::from(100)));
    }

    #[test]
    fn months_are_chronological_with_change() {
        let m = months(&sample());
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].month, "11/2024");
        assert_eq!(m[0].change, None);
        assert_eq!(m[1].month, "12/2024");
        assert_eq!(m[1].change, Some(Decimal::from_str("-250.00").unwrap()));
        assert_eq!(m[1].change_pct, Some(Decimal::from_str("-71.4").unwrap()));
    }

    #[test]
    fn empty_input_produces_empty_aggregates() {
        let all: Vec<Transaction> = Vec::new();
        let filtered = filter_by_month(&all, None);
        let s = summary(&all, &filtered);
        assert_eq!(s.transaction_count, 0);
        assert!(s.months.is_empty());
        assert!(categories(&filtered, Decimal::ZERO).is_empty());
        assert!(months(&all).is_empty());
    }
}
