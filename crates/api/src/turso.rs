//! Turso (libSQL over HTTP) trade history ledger.
//!
//! Every liquidation attempt is appended to a single `trade_history` table:
//! - Table is created on first use (`CREATE TABLE IF NOT EXISTS`)
//! - Inserts return the new row id when the server reports one
//! - Reads return the most recent rows, newest first

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS trade_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    market_title TEXT,
    token_id TEXT,
    outcome TEXT,
    action TEXT,
    entry_price REAL,
    exit_price REAL,
    shares REAL,
    loss_percentage REAL,
    order_id TEXT,
    status TEXT
)";

const INSERT_TRADE_SQL: &str = "INSERT INTO trade_history
    (timestamp, market_title, token_id, outcome, action, entry_price, exit_price, shares, loss_percentage, order_id, status)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const RECENT_TRADES_SQL: &str = "SELECT * FROM trade_history ORDER BY timestamp DESC LIMIT ?";

/// Kind of trade recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    #[serde(rename = "STOP_LOSS")]
    StopLoss,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::StopLoss => "STOP_LOSS",
        }
    }
}

/// Final status of a recorded trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Success,
    Failed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Success => "SUCCESS",
            TradeStatus::Failed => "FAILED",
        }
    }
}

/// Ledger entry written after a liquidation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub market_title: String,
    pub token_id: String,
    pub outcome: String,
    pub action: TradeAction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub shares: f64,
    pub loss_percentage: f64,
    pub order_id: Option<String>,
    pub status: TradeStatus,
}

impl TradeRecord {
    /// Positional parameters for the insert statement. Values travel as text.
    fn params(&self) -> Vec<Value> {
        vec![
            Value::String(self.timestamp.to_rfc3339()),
            Value::String(self.market_title.clone()),
            Value::String(self.token_id.clone()),
            Value::String(self.outcome.clone()),
            Value::String(self.action.as_str().to_string()),
            Value::String(self.entry_price.to_string()),
            Value::String(self.exit_price.to_string()),
            Value::String(self.shares.to_string()),
            Value::String(self.loss_percentage.to_string()),
            self.order_id.clone().map(Value::String).unwrap_or(Value::Null),
            Value::String(self.status.as_str().to_string()),
        ]
    }
}

/// Row read back from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrade {
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub id: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub market_title: Option<String>,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub entry_price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub exit_price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub shares: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub loss_percentage: Option<f64>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Append-only store for liquidation attempts.
#[async_trait]
pub trait TradeLedger: Send + Sync + Debug {
    /// Create the backing table if needed.
    async fn ensure_schema(&self) -> Result<()>;

    /// Append a record, returning the new row id if the store reports one.
    async fn record_trade(&self, record: &TradeRecord) -> Result<Option<i64>>;

    /// Most recent `limit` records, newest first.
    async fn recent_trades(&self, limit: usize) -> Result<Vec<StoredTrade>>;
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    results: Option<ResultSet>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultSet {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    last_insert_rowid: Option<i64>,
}

/// Turso HTTP client.
pub struct TursoLedger {
    client: reqwest::Client,
    url: String,
    auth_token: String,
    schema_ready: AtomicBool,
}

impl Debug for TursoLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TursoLedger")
            .field("url", &self.url)
            .field("schema_ready", &self.schema_ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TursoLedger {
    /// Create a ledger for `database_url`. `libsql://` URLs are served over `https://`.
    pub fn new(database_url: &str, auth_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: http_url(database_url),
            auth_token: auth_token.into(),
            schema_ready: AtomicBool::new(false),
        }
    }

    /// HTTP endpoint in use.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<ResultSet> {
        let body = serde_json::json!({
            "statements": [{ "q": sql, "params": params }]
        });

        let response = self
            .client
            .post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await
            .context("Turso request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Turso returned HTTP {}: {}", status.as_u16(), text);
        }

        let results: Vec<StatementResult> = response
            .json()
            .await
            .context("Failed to decode Turso response")?;

        first_result(results)
    }
}

#[async_trait]
impl TradeLedger for TursoLedger {
    async fn ensure_schema(&self) -> Result<()> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        self.execute(CREATE_TABLE_SQL, Vec::new()).await?;
        self.schema_ready.store(true, Ordering::Release);
        info!("Trade history table ready");
        Ok(())
    }

    #[instrument(skip(self, record), fields(token_id = %record.token_id, status = record.status.as_str()))]
    async fn record_trade(&self, record: &TradeRecord) -> Result<Option<i64>> {
        self.ensure_schema().await?;
        let result = self.execute(INSERT_TRADE_SQL, record.params()).await?;
        debug!(row_id = ?result.last_insert_rowid, "Trade recorded");
        Ok(result.last_insert_rowid)
    }

    async fn recent_trades(&self, limit: usize) -> Result<Vec<StoredTrade>> {
        self.ensure_schema().await?;
        let result = self
            .execute(RECENT_TRADES_SQL, vec![Value::String(limit.to_string())])
            .await?;
        rows_to_trades(result)
    }
}

fn http_url(database_url: &str) -> String {
    match database_url.strip_prefix("libsql://") {
        Some(rest) => format!("https://{}", rest),
        None => database_url.to_string(),
    }
}

fn first_result(results: Vec<StatementResult>) -> Result<ResultSet> {
    let first = results
        .into_iter()
        .next()
        .context("Turso returned no statement results")?;

    if let Some(error) = first.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        anyhow::bail!("Turso statement failed: {}", message);
    }

    Ok(first.results.unwrap_or_default())
}

fn rows_to_trades(result: ResultSet) -> Result<Vec<StoredTrade>> {
    result
        .rows
        .into_iter()
        .map(|row| {
            let object: serde_json::Map<String, Value> =
                result.columns.iter().cloned().zip(row).collect();
            serde_json::from_value(Value::Object(object)).context("Malformed trade_history row")
        })
        .collect()
}

fn deserialize_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(f64),
    }

    match Option::<StringOrNumber>::deserialize(deserializer)? {
        Some(StringOrNumber::String(s)) if s.is_empty() => Ok(None),
        Some(StringOrNumber::String(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        Some(StringOrNumber::Number(n)) => Ok(Some(n)),
        None => Ok(None),
    }
}

fn deserialize_optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    match Option::<StringOrNumber>::deserialize(deserializer)? {
        Some(StringOrNumber::String(s)) if s.is_empty() => Ok(None),
        Some(StringOrNumber::String(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        Some(StringOrNumber::Number(n)) => Ok(Some(n)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> TradeRecord {
        TradeRecord {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            market_title: "Will it rain?".to_string(),
            token_id: "7132".to_string(),
            outcome: "Yes".to_string(),
            action: TradeAction::StopLoss,
            entry_price: 0.5,
            exit_price: 0.44,
            shares: 10.0,
            loss_percentage: 12.0,
            order_id: None,
            status: TradeStatus::Failed,
        }
    }

    #[test]
    fn test_libsql_url_rewrite() {
        assert_eq!(http_url("libsql://db-org.turso.io"), "https://db-org.turso.io");
        assert_eq!(http_url("https://db-org.turso.io"), "https://db-org.turso.io");
        assert_eq!(TursoLedger::new("libsql://db-org.turso.io", "t").url(), "https://db-org.turso.io");
    }

    #[test]
    fn test_insert_params() {
        let params = record().params();
        assert_eq!(params.len(), 11);
        assert_eq!(params[0], Value::String("2026-03-01T12:00:00+00:00".to_string()));
        assert_eq!(params[4], Value::String("STOP_LOSS".to_string()));
        assert_eq!(params[5], Value::String("0.5".to_string()));
        assert_eq!(params[9], Value::Null);
        assert_eq!(params[10], Value::String("FAILED".to_string()));
    }

    #[test]
    fn test_insert_result_row_id() {
        let body = r#"[{"results": {"columns": [], "rows": [], "rows_read": 0, "last_insert_rowid": "17"}}]"#;
        let results: Vec<StatementResult> = serde_json::from_str(body).unwrap();
        let set = first_result(results).unwrap();
        assert_eq!(set.last_insert_rowid, Some(17));
    }

    #[test]
    fn test_statement_error() {
        let body = r#"[{"error": {"message": "no such table: trade_history"}}]"#;
        let results: Vec<StatementResult> = serde_json::from_str(body).unwrap();
        let err = first_result(results).unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn test_rows_to_trades() {
        let body = r#"[{"results": {
            "columns": ["id", "timestamp", "market_title", "token_id", "outcome", "action",
                        "entry_price", "exit_price", "shares", "loss_percentage", "order_id", "status"],
            "rows": [
                [2, "2026-03-02T00:00:00+00:00", "B", "t2", "No", "STOP_LOSS", 0.6, 0.5, 5.0, 16.67, "0xabc", "SUCCESS"],
                [1, "2026-03-01T00:00:00+00:00", "A", "t1", "Yes", "STOP_LOSS", "0.5", "0.44", "10", "12", null, "FAILED"]
            ]
        }}]"#;
        let results: Vec<StatementResult> = serde_json::from_str(body).unwrap();
        let trades = rows_to_trades(first_result(results).unwrap()).unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].id, Some(2));
        assert_eq!(trades[0].order_id.as_deref(), Some("0xabc"));
        assert_eq!(trades[1].entry_price, Some(0.5));
        assert_eq!(trades[1].order_id, None);
        assert_eq!(trades[1].status.as_deref(), Some("FAILED"));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&TradeStatus::Success).unwrap(), "\"SUCCESS\"");
        assert_eq!(serde_json::to_string(&TradeAction::StopLoss).unwrap(), "\"STOP_LOSS\"");
    }
}
