//! Polymarket CLOB trading client.
//!
//! Submits fill-or-kill market sells signed by the wallet key. API credentials
//! are derived per signature mode on first use and cached for the process
//! lifetime; a credential rejection evicts the cached entry.

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::auth::{l1_headers, l2_headers, ApiCredentials, AuthHeaders, SignatureType};
use crate::order::{
    build_sell_order, market_sell_price, new_salt, sell_amounts, sign_order, OrderBook, PostOrder,
    RoundConfig, SignedOrder,
};

/// Default CLOB endpoint.
pub const CLOB_HOST: &str = "https://clob.polymarket.com";

/// Polygon mainnet.
pub const POLYGON_CHAIN_ID: u64 = 137;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Order submission failure, classified by what the caller can do about it.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The venue rejected the order signature; another signature mode may work.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("no orderbook exists for token: {0}")]
    NoOrderbook(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("order rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("signing failed: {0}")]
    Signing(#[from] alloy::signers::Error),
}

impl SubmitError {
    /// Classify an error response by status code and body text.
    pub fn from_response(status: u16, body: &str) -> Self {
        let text = body.to_lowercase();
        let message = body.trim().to_string();

        if text.contains("invalid signature") {
            SubmitError::InvalidSignature(message)
        } else if text.contains("no orderbook exists") || status == 404 {
            SubmitError::NoOrderbook(message)
        } else if status == 401 || text.contains("unauthorized") || text.contains("invalid api key") {
            SubmitError::Unauthorized(message)
        } else {
            SubmitError::Rejected { status, message }
        }
    }
}

/// Venue response to an order post.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OrderResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(rename = "orderID", alias = "orderId", alias = "order_id", default)]
    pub order_id: Option<String>,
    #[serde(rename = "errorMsg", default)]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl OrderResponse {
    /// Order id, if the venue assigned a non-empty one.
    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Submits market sells for outcome tokens.
#[async_trait]
pub trait OrderSubmitter: Send + Sync + Debug {
    /// Post a fill-or-kill sell of `size` shares of `token_id` under `mode`.
    async fn submit_market_sell(
        &self,
        token_id: &str,
        size: f64,
        mode: SignatureType,
    ) -> Result<OrderResponse, SubmitError>;
}

#[derive(Debug, Deserialize)]
struct NegRiskResponse {
    neg_risk: bool,
}

/// CLOB client bound to one wallet key and funder.
pub struct ClobClient {
    client: reqwest::Client,
    host: String,
    chain_id: u64,
    signer: PrivateKeySigner,
    funder: Address,
    credentials: RwLock<HashMap<SignatureType, ApiCredentials>>,
}

impl Debug for ClobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClobClient")
            .field("host", &self.host)
            .field("chain_id", &self.chain_id)
            .field("signer", &self.signer.address())
            .field("funder", &self.funder)
            .finish_non_exhaustive()
    }
}

impl ClobClient {
    /// Create a client from a hex private key (with or without `0x`).
    pub fn new(private_key: &str, funder: Address, chain_id: u64) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid wallet private key: {}", e))?;

        info!(
            signer = %signer.address(),
            funder = %funder,
            chain_id,
            "CLOB client initialized"
        );

        Ok(Self {
            client: reqwest::Client::new(),
            host: CLOB_HOST.to_string(),
            chain_id,
            signer,
            funder,
            credentials: RwLock::new(HashMap::new()),
        })
    }

    /// Point the client at a different endpoint.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim_end_matches('/').to_string();
        self
    }

    /// Address of the signing key.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Funder (proxy) wallet address.
    pub fn funder(&self) -> Address {
        self.funder
    }

    /// API credentials for `mode`, derived on first use.
    #[instrument(skip(self))]
    pub async fn credentials(&self, mode: SignatureType) -> Result<ApiCredentials, SubmitError> {
        let cached = self.credentials.read().get(&mode).cloned();
        if let Some(creds) = cached {
            return Ok(creds);
        }

        let creds = match self.request_credentials(reqwest::Method::GET, "/auth/derive-api-key").await {
            Ok(creds) => creds,
            Err(e) => {
                debug!(error = %e, "Derive failed, creating new API key");
                self.request_credentials(reqwest::Method::POST, "/auth/api-key").await?
            }
        };

        info!(%mode, api_key = %creds.api_key, "API credentials ready");
        self.credentials.write().insert(mode, creds.clone());
        Ok(creds)
    }

    async fn request_credentials(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<ApiCredentials, SubmitError> {
        let headers = l1_headers(&self.signer, self.chain_id, unix_now(), 0).await?;
        let url = format!("{}{}", self.host, path);
        let request = with_headers(self.client.request(method, &url), headers);

        let response = request.timeout(REQUEST_TIMEOUT).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SubmitError::from_response(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| SubmitError::Unauthorized(format!("malformed credentials: {}", e)))
    }

    /// Current order book for `token_id`.
    pub async fn order_book(&self, token_id: &str) -> Result<OrderBook, SubmitError> {
        let url = format!("{}/book", self.host);
        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SubmitError::from_response(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| SubmitError::Rejected {
            status: status.as_u16(),
            message: format!("malformed order book: {}", e),
        })
    }

    /// Whether `token_id` settles on the neg-risk exchange.
    pub async fn neg_risk(&self, token_id: &str) -> Result<bool, SubmitError> {
        let url = format!("{}/neg-risk", self.host);
        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SubmitError::from_response(status.as_u16(), &body));
        }

        parse_neg_risk(status.as_u16(), &body)
    }

    async fn post_order(&self, body: &PostOrder, creds: &ApiCredentials) -> Result<OrderResponse, SubmitError> {
        let path = "/order";
        let payload = serde_json::to_string(body).map_err(|e| SubmitError::InvalidOrder(e.to_string()))?;
        let headers = l2_headers(self.address(), creds, unix_now(), "POST", path, Some(&payload))
            .map_err(|e| SubmitError::Unauthorized(e.to_string()))?;

        let url = format!("{}{}", self.host, path);
        let request = with_headers(self.client.post(&url), headers)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(REQUEST_TIMEOUT)
            .body(payload);

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SubmitError::from_response(status.as_u16(), &text));
        }

        parse_order_response(&text).map_err(|e| SubmitError::Rejected {
            status: status.as_u16(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl OrderSubmitter for ClobClient {
    #[instrument(skip(self), fields(signer = %self.signer.address()))]
    async fn submit_market_sell(
        &self,
        token_id: &str,
        size: f64,
        mode: SignatureType,
    ) -> Result<OrderResponse, SubmitError> {
        if size <= 0.0 {
            return Err(SubmitError::InvalidOrder(format!("size must be positive, got {}", size)));
        }
        let token = token_id
            .parse::<U256>()
            .map_err(|e| SubmitError::InvalidOrder(format!("bad token id {}: {}", token_id, e)))?;

        let creds = self.credentials(mode).await?;
        let book = self.order_book(token_id).await?;
        let price = market_sell_price(&book.bids, size).ok_or_else(|| SubmitError::Rejected {
            status: 0,
            message: format!("not enough bid liquidity to fill {} shares", size),
        })?;
        let neg_risk = self.neg_risk(token_id).await?;

        let (maker_amount, taker_amount) = sell_amounts(size, price, RoundConfig::for_tick(book.tick_size));
        let salt = new_salt();
        let order = build_sell_order(self.address(), self.funder, mode, token, maker_amount, taker_amount, salt);
        let signature = sign_order(&self.signer, &order, self.chain_id, neg_risk).await?;

        debug!(
            %mode,
            price,
            neg_risk,
            maker_amount = %maker_amount,
            taker_amount = %taker_amount,
            "Posting FOK market sell"
        );

        let body = PostOrder {
            order: SignedOrder::new(&order, salt, signature),
            owner: creds.api_key.clone(),
            order_type: "FOK",
        };

        match self.post_order(&body, &creds).await {
            Err(SubmitError::Unauthorized(message)) => {
                warn!(%mode, "Credentials rejected, evicting cache entry");
                self.credentials.write().remove(&mode);
                Err(SubmitError::Unauthorized(message))
            }
            other => other,
        }
    }
}

/// Decode a `/order` response body.
pub fn parse_order_response(body: &str) -> Result<OrderResponse> {
    serde_json::from_str(body).context("Malformed order response")
}

/// Decode a `/neg-risk` body. The exchange domain depends on it, so it is never guessed.
fn parse_neg_risk(status: u16, body: &str) -> Result<bool, SubmitError> {
    serde_json::from_str::<NegRiskResponse>(body)
        .map(|r| r.neg_risk)
        .map_err(|e| SubmitError::Rejected {
            status,
            message: format!("malformed neg-risk response: {}", e),
        })
}

fn with_headers(request: reqwest::RequestBuilder, headers: AuthHeaders) -> reqwest::RequestBuilder {
    headers
        .into_iter()
        .fold(request, |request, (name, value)| request.header(name, value))
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_classify_invalid_signature() {
        let err = SubmitError::from_response(400, r#"{"error":"invalid signature"}"#);
        assert!(matches!(err, SubmitError::InvalidSignature(_)));
    }

    #[test]
    fn test_classify_no_orderbook() {
        let err = SubmitError::from_response(400, "No orderbook exists for the requested token id");
        assert!(matches!(err, SubmitError::NoOrderbook(_)));

        let err = SubmitError::from_response(404, "not found");
        assert!(matches!(err, SubmitError::NoOrderbook(_)));
    }

    #[test]
    fn test_classify_unauthorized() {
        assert!(matches!(SubmitError::from_response(401, "nope"), SubmitError::Unauthorized(_)));
        assert!(matches!(
            SubmitError::from_response(400, r#"{"error":"Invalid api key"}"#),
            SubmitError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_classify_other() {
        match SubmitError::from_response(400, "order couldn't be fully filled") {
            SubmitError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("fully filled"));
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_parse_neg_risk() {
        assert!(parse_neg_risk(200, r#"{"neg_risk": true}"#).unwrap());
        assert!(!parse_neg_risk(200, r#"{"neg_risk": false}"#).unwrap());

        for body in ["<html>gateway</html>", "{}", r#"{"neg_risk": "maybe"}"#] {
            match parse_neg_risk(200, body) {
                Err(SubmitError::Rejected { status, message }) => {
                    assert_eq!(status, 200);
                    assert!(message.starts_with("malformed neg-risk response"));
                }
                other => panic!("expected Rejected for {:?}, got {:?}", body, other),
            }
        }
    }

    #[test]
    fn test_parse_order_response() {
        let ok = parse_order_response(r#"{"success": true, "errorMsg": "", "orderID": "0xabc", "status": "matched"}"#).unwrap();
        assert_eq!(ok.success, Some(true));
        assert_eq!(ok.order_id(), Some("0xabc"));

        let failed = parse_order_response(r#"{"success": false, "errorMsg": "not enough balance", "orderID": ""}"#).unwrap();
        assert_eq!(failed.success, Some(false));
        assert_eq!(failed.order_id(), None);
        assert_eq!(failed.error_msg.as_deref(), Some("not enough balance"));

        let alt = parse_order_response(r#"{"order_id": "123"}"#).unwrap();
        assert_eq!(alt.order_id(), Some("123"));
    }

    #[test]
    fn test_new_client() {
        let client = ClobClient::new(TEST_KEY, Address::repeat_byte(0x22), POLYGON_CHAIN_ID)
            .unwrap()
            .with_host("http://localhost:8080/");
        assert_eq!(client.host, "http://localhost:8080");
        assert_eq!(
            client.address().to_checksum(None),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        assert_eq!(client.funder(), Address::repeat_byte(0x22));
        assert!(ClobClient::new("0xnot-a-key", Address::ZERO, POLYGON_CHAIN_ID).is_err());
    }

    #[tokio::test]
    async fn test_rejects_non_positive_size() {
        let client = ClobClient::new(TEST_KEY, Address::ZERO, POLYGON_CHAIN_ID).unwrap();
        let err = client
            .submit_market_sell("1", 0.0, SignatureType::PolyGnosisSafe)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidOrder(_)));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_order_book() {
        let client = ClobClient::new(TEST_KEY, Address::ZERO, POLYGON_CHAIN_ID).unwrap();
        let err = client.order_book("1").await.unwrap_err();
        assert!(matches!(err, SubmitError::NoOrderbook(_)));
    }
}
