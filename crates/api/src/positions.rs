//! Polymarket Data API client for position snapshots.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Default Data API endpoint.
pub const DATA_API_URL: &str = "https://data-api.polymarket.com";

/// Positions returned per request (largest holdings first).
const POSITION_LIMIT: &str = "10";

/// Default request timeout for snapshot fetches.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A holding as reported by the venue.
///
/// Numeric fields arrive either as JSON numbers or numeric strings. Missing,
/// null or empty values decode to `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Outcome token id
    #[serde(rename = "asset", default, deserialize_with = "deserialize_text")]
    pub asset_id: String,
    /// Market title
    #[serde(rename = "title", default, deserialize_with = "deserialize_text")]
    pub market_title: String,
    /// Outcome label ("Yes", "No", ...)
    #[serde(rename = "outcome", default, deserialize_with = "deserialize_text")]
    pub outcome: String,
    /// Average entry price (0..1)
    #[serde(rename = "avgPrice", default, deserialize_with = "deserialize_f64")]
    pub entry_price: f64,
    /// Current mark price (0..1), 0 when the market is resolved or untradeable
    #[serde(rename = "curPrice", default, deserialize_with = "deserialize_f64")]
    pub current_price: f64,
    /// Shares held
    #[serde(default, deserialize_with = "deserialize_f64")]
    pub size: f64,
}

impl Position {
    /// Whether both prices are usable for stop-loss evaluation.
    pub fn is_monitorable(&self) -> bool {
        self.entry_price > 0.0 && self.current_price > 0.0
    }
}

/// Snapshot fetch failure, classified for the monitor's retry policy.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("position API returned HTTP {0}")]
    Status(u16),

    #[error("malformed position snapshot: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Timeouts, connection failures and non-2xx statuses are retried with backoff.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::Malformed(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e)
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Network(e)
        }
    }
}

/// Source of position snapshots for the monitored wallet.
#[async_trait]
pub trait PositionSource: Send + Sync + Debug {
    /// Fetch the current snapshot, in venue order.
    async fn fetch_positions(&self) -> Result<Vec<Position>, FetchError>;
}

/// Data API client bound to a single funder wallet.
#[derive(Debug, Clone)]
pub struct DataApiClient {
    client: reqwest::Client,
    base_url: String,
    user: String,
    size_threshold: f64,
    timeout: Duration,
}

impl DataApiClient {
    /// Create a client for `user`, ignoring holdings below `size_threshold` shares.
    pub fn new(user: impl Into<String>, size_threshold: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DATA_API_URL.to_string(),
            user: user.into(),
            size_threshold,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl PositionSource for DataApiClient {
    #[instrument(skip(self), fields(user = %self.user))]
    async fn fetch_positions(&self) -> Result<Vec<Position>, FetchError> {
        let url = format!("{}/positions", self.base_url);
        let threshold = self.size_threshold.to_string();

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .query(&[
                ("user", self.user.as_str()),
                ("sizeThreshold", threshold.as_str()),
                ("sortBy", "TOKENS"),
                ("sortDirection", "DESC"),
                ("limit", POSITION_LIMIT),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let positions = parse_positions(&body)?;

        debug!(count = positions.len(), "Fetched position snapshot");
        Ok(positions)
    }
}

/// Decode a raw `/positions` response body.
pub fn parse_positions(body: &str) -> Result<Vec<Position>, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))
}

fn deserialize_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
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
        Some(StringOrNumber::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(0.0)
            } else {
                s.parse().map_err(serde::de::Error::custom)
            }
        }
        Some(StringOrNumber::Number(n)) => Ok(n),
        None => Ok(0.0),
    }
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_strings() {
        let body = r#"[{
            "asset": "7132",
            "title": "Will it rain?",
            "outcome": "Yes",
            "avgPrice": "0.55",
            "curPrice": 0.5,
            "size": "12.5"
        }]"#;

        let positions = parse_positions(body).unwrap();
        assert_eq!(positions.len(), 1);

        let p = &positions[0];
        assert_eq!(p.asset_id, "7132");
        assert_eq!(p.market_title, "Will it rain?");
        assert_eq!(p.outcome, "Yes");
        assert!((p.entry_price - 0.55).abs() < 1e-12);
        assert!((p.current_price - 0.5).abs() < 1e-12);
        assert!((p.size - 12.5).abs() < 1e-12);
        assert!(p.is_monitorable());
    }

    #[test]
    fn test_missing_and_empty_fields_default_to_zero() {
        let body = r#"[
            {"asset": "a", "avgPrice": 0.4, "curPrice": ""},
            {"asset": "b", "avgPrice": null, "curPrice": 0.3, "title": null}
        ]"#;

        let positions = parse_positions(body).unwrap();
        assert_eq!(positions[0].current_price, 0.0);
        assert_eq!(positions[0].size, 0.0);
        assert!(!positions[0].is_monitorable());

        assert_eq!(positions[1].entry_price, 0.0);
        assert_eq!(positions[1].market_title, "");
        assert!(!positions[1].is_monitorable());
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(parse_positions("[]").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_body() {
        let err = parse_positions(r#"{"error": "bad"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
        assert!(!err.is_transient());

        let err = parse_positions(r#"[{"asset": "a", "avgPrice": "abc"}]"#).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn test_status_is_transient() {
        assert!(FetchError::Status(502).is_transient());
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_fetch_positions() {
        let client = DataApiClient::new("0x0000000000000000000000000000000000000000", 1.0);
        let positions = client.fetch_positions().await.unwrap();
        assert!(positions.len() <= 10);
    }
}
