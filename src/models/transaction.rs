use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{BillingMonth, CurrencySection, Id};

/// A single card charge parsed from a statement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Id,
    /// Date the purchase was made.
    pub purchase_date: NaiveDate,
    /// Date the card was charged. Missing for some pending rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_date: Option<NaiveDate>,
    pub merchant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The issuer's transaction-type column (installments, standing order, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Charged amount in the statement's billing currency.
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_last4: Option<String>,
    pub section: CurrencySection,
}

impl Transaction {
    /// Build a transaction with a deterministic id derived from the row's
    /// identifying fields, so re-parsing a statement never duplicates rows.
    #[allow(clippy::too_many_arguments)]
    pub fn from_row(
        purchase_date: NaiveDate,
        charge_date: Option<NaiveDate>,
        merchant: impl Into<String>,
        category: Option<String>,
        kind: Option<String>,
        amount: Decimal,
        card_last4: Option<String>,
        section: CurrencySection,
    ) -> Self {
        let merchant = merchant.into();
        let id = Id::from_row(&format!(
            "{purchase_date}|{merchant}|{amount}|{}|{}",
            charge_date.map(|d| d.to_string()).unwrap_or_default(),
            card_last4.as_deref().unwrap_or_default(),
        ));
        Self {
            id,
            purchase_date,
            charge_date,
            merchant,
            category,
            kind,
            amount,
            card_last4,
            section,
        }
    }

    /// The billing month this charge lands in: the charge date when known,
    /// otherwise the purchase date.
    pub fn charge_month(&self) -> BillingMonth {
        BillingMonth::from_date(self.charge_date.unwrap_or(self.purchase_date))
    }
}
