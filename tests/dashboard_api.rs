use cardkeep::dashboard::{router, DashboardState};
use cardkeep::models::{CurrencySection, Transaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

fn tx(charge: &str, merchant: &str, category: &str, amount: &str) -> Transaction {
    let charge_date = NaiveDate::parse_from_str(charge, "%Y-%m-%d").unwrap();
    Transaction::from_row(
        charge_date,
        Some(charge_date),
        merchant,
        Some(category.to_string()),
        None,
        Decimal::from_str(amount).unwrap(),
        Some("1234".to_string()),
        CurrencySection::Domestic,
    )
}

async fn spawn_dashboard(transactions: Vec<Transaction>) -> String {
    let app = router(DashboardState::new(transactions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn sample() -> Vec<Transaction> {
    vec![
        tx("2024-11-02", "סופר השכונה", "מזון", "100.00"),
        tx("2024-12-02", "תחנת דלק", "רכב", "250.00"),
        tx("2024-12-15", "בית קפה", "מסעדות", "34.00"),
    ]
}

#[tokio::test]
async fn summary_reflects_month_filter() {
    let base = spawn_dashboard(sample()).await;
    let client = reqwest::Client::new();

    let all: serde_json::Value = client
        .get(format!("{base}/api/summary"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all["transaction_count"], 3);
    assert_eq!(all["months"], serde_json::json!(["12/2024", "11/2024"]));

    let december: serde_json::Value = client
        .get(format!("{base}/api/summary?month=12/2024"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(december["transaction_count"], 2);
    assert_eq!(december["total"], "284.00");
}

#[tokio::test]
async fn categories_endpoint_sorts_and_filters() {
    let base = spawn_dashboard(sample()).await;
    let client = reqwest::Client::new();

    let categories: serde_json::Value = client
        .get(format!("{base}/api/categories?min_amount=50"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let rows = categories.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["category"], "מזון");
    assert_eq!(rows[1]["category"], "רכב");
}

#[tokio::test]
async fn months_endpoint_reports_change() {
    let base = spawn_dashboard(sample()).await;
    let client = reqwest::Client::new();

    let months: serde_json::Value = client
        .get(format!("{base}/api/months"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let rows = months.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["month"], "11/2024");
    assert!(rows[0].get("change_pct").is_none());
    assert_eq!(rows[1]["month"], "12/2024");
    assert_eq!(rows[1]["change_pct"], "184.0");
}

#[tokio::test]
async fn transactions_endpoint_renders_rows() {
    let base = spawn_dashboard(sample()).await;
    let client = reqwest::Client::new();

    let rows: serde_json::Value = client
        .get(format!("{base}/api/transactions?month=11/2024"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["merchant"], "סופר השכונה");
    assert_eq!(rows[0]["date"], "02-11-2024");
    assert_eq!(rows[0]["card"], "1234");
    assert_eq!(rows[0]["month"], "11/2024");
}

#[tokio::test]
async fn index_serves_the_embedded_page() {
    let base = spawn_dashboard(Vec::new()).await;

    let body = reqwest::get(format!("{base}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("Expenses Dashboard"));
}
