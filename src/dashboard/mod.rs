//! Local HTTP dashboard.
//!
//! Serves a small JSON API over the parsed transactions plus one embedded
//! HTML page that renders it. All computation happens in [`aggregate`]; the
//! handlers only filter and serialize.

pub mod aggregate;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::Transaction;

use self::aggregate::{CategoryTotal, MonthTotal, Summary};

#[derive(Clone)]
pub struct DashboardState {
    transactions: Arc<Vec<Transaction>>,
}

impl DashboardState {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            transactions: Arc::new(transactions),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FilterQuery {
    /// `M/YYYY` charge-month label; absent means all months.
    pub month: Option<String>,
    /// Minimum category total to include, for the categories endpoint.
    pub min_amount: Option<Decimal>,
}

/// Transaction row as the dashboard table renders it.
#[derive(Debug, Serialize)]
struct TransactionRow {
    date: String,
    merchant: String,
    category: Option<String>,
    kind: Option<String>,
    amount: Decimal,
    charge_date: Option<String>,
    card: Option<String>,
    section: String,
    month: String,
}

impl From<&Transaction> for TransactionRow {
    fn from(t: &Transaction) -> Self {
        Self {
            date: t.purchase_date.format("%d-%m-%Y").to_string(),
            merchant: t.merchant.clone(),
            category: t.category.clone(),
            kind: t.kind.clone(),
            amount: t.amount,
            charge_date: t.charge_date.map(|d| d.format("%d-%m-%Y").to_string()),
            card: t.card_last4.clone(),
            section: t.section.as_str().to_string(),
            month: t.charge_month().filter_label(),
        }
    }
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/summary", get(summary))
        .route("/api/categories", get(categories))
        .route("/api/months", get(months))
        .route("/api/transactions", get(transactions))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the dashboard until the process is stopped.
pub async fn serve(listen: &str, transactions: Vec<Transaction>) -> Result<()> {
    let state = DashboardState::new(transactions);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind dashboard address {listen}"))?;

    info!(addr = %listener.local_addr()?, "Dashboard listening");
    axum::serve(listener, app)
        .await
        .context("Dashboard server failed")
}

async fn index() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

async fn summary(
    State(state): State<DashboardState>,
    Query(query): Query<FilterQuery>,
) -> Json<Summary> {
    let filtered = aggregate::filter_by_month(&state.transactions, query.month.as_deref());
    Json(aggregate::summary(&state.transactions, &filtered))
}

async fn categories(
    State(state): State<DashboardState>,
    Query(query): Query<FilterQuery>,
) -> Json<Vec<CategoryTotal>> {
    let filtered = aggregate::filter_by_month(&state.transactions, query.month.as_deref());
    let min_amount = query.min_amount.unwrap_or(Decimal::ZERO);
    Json(aggregate::categories(&filtered, min_amount))
}

async fn months(State(state): State<DashboardState>) -> Json<Vec<MonthTotal>> {
    Json(aggregate::months(&state.transactions))
}

async fn transactions(
    State(state): State<DashboardState>,
    Query(query): Query<FilterQuery>,
) -> Json<Vec<TransactionRow>> {
    let filtered = aggregate::filter_by_month(&state.transactions, query.month.as_deref());
    Json(filtered.into_iter().map(TransactionRow::from).collect())
}
