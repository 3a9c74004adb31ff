mod id;
mod month;
mod statement;
mod transaction;

pub use id::{Id, IdError};
pub use month::{BillingMonth, MonthError};
pub use statement::{CurrencySection, StatementFile, StatementKind};
pub use transaction::Transaction;
