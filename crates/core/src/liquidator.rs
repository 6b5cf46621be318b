//! Liquidation executor: market-sells a position with signature-mode escalation.
//!
//! When the venue rejects an order signature, the sell is retried under the
//! next signature mode in a fixed order (Safe proxy, direct key, legacy proxy),
//! starting from the configured mode. Each mode is tried at most once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use stoploss_chain::{OrderResponse, OrderSubmitter, SignatureType, SubmitError};

/// Order in which signature modes are tried after a signature rejection.
pub const ESCALATION_ORDER: [SignatureType; 3] = [
    SignatureType::PolyGnosisSafe,
    SignatureType::Eoa,
    SignatureType::PolyProxy,
];

/// Outcome of a liquidation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationOutcome {
    pub success: bool,
    pub order_id: Option<String>,
    pub error: Option<String>,
    /// Rounded size actually submitted
    pub shares: f64,
    /// Signature modes tried, in order
    pub attempts: Vec<SignatureType>,
}

impl LiquidationOutcome {
    fn failed(error: impl Into<String>, shares: f64, attempts: Vec<SignatureType>) -> Self {
        Self {
            success: false,
            order_id: None,
            error: Some(error.into()),
            shares,
            attempts,
        }
    }

    fn from_response(response: OrderResponse, shares: f64, attempts: Vec<SignatureType>) -> Self {
        let order_id = response.order_id().map(str::to_string);
        let success = response.success != Some(false) && order_id.is_some();
        let error = if success {
            None
        } else {
            Some(
                response
                    .error_msg
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            )
        };

        Self {
            success,
            order_id,
            error,
            shares,
            attempts,
        }
    }
}

/// Modes to try, starting at `start` and following the escalation order.
pub fn escalation_path(start: SignatureType) -> Vec<SignatureType> {
    let offset = ESCALATION_ORDER
        .iter()
        .position(|m| *m == start)
        .unwrap_or(0);
    ESCALATION_ORDER
        .iter()
        .cycle()
        .skip(offset)
        .take(ESCALATION_ORDER.len())
        .copied()
        .collect()
}

/// Round a share count to the venue's two-decimal size precision.
pub fn round_shares(size: f64) -> f64 {
    (size * 100.0).round() / 100.0
}

/// Liquidation executor.
#[derive(Debug, Clone)]
pub struct Liquidator {
    submitter: Arc<dyn OrderSubmitter>,
    start_mode: SignatureType,
}

impl Liquidator {
    /// Create a liquidator starting from the default (Safe proxy) mode.
    pub fn new(submitter: Arc<dyn OrderSubmitter>) -> Self {
        Self {
            submitter,
            start_mode: SignatureType::default(),
        }
    }

    /// Set the first signature mode tried.
    pub fn with_start_mode(mut self, mode: SignatureType) -> Self {
        self.start_mode = mode;
        self
    }

    /// First signature mode tried.
    pub fn start_mode(&self) -> SignatureType {
        self.start_mode
    }

    /// Market-sell `size` shares of `asset_id`.
    ///
    /// Signature rejections, missing orderbooks and credential failures become
    /// failed outcomes. Any other submission error is returned to the caller.
    #[instrument(skip(self))]
    pub async fn liquidate(&self, asset_id: &str, size: f64) -> Result<LiquidationOutcome, SubmitError> {
        let shares = round_shares(size);
        if shares <= 0.0 {
            warn!(size, "Size too small to sell");
            return Ok(LiquidationOutcome::failed("size too small", shares, Vec::new()));
        }

        let started = Instant::now();
        let mut tried: HashSet<SignatureType> = HashSet::new();
        let mut attempts = Vec::new();
        let mut last_rejection = String::new();

        for mode in escalation_path(self.start_mode) {
            if !tried.insert(mode) {
                continue;
            }
            attempts.push(mode);

            match self.submitter.submit_market_sell(asset_id, shares, mode).await {
                Ok(response) => {
                    let outcome = LiquidationOutcome::from_response(response, shares, attempts);
                    info!(
                        %mode,
                        success = outcome.success,
                        order_id = ?outcome.order_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Market sell submitted"
                    );
                    return Ok(outcome);
                }
                Err(SubmitError::InvalidSignature(message)) => {
                    warn!(%mode, error = %message, "Signature rejected, escalating");
                    last_rejection = message;
                }
                Err(SubmitError::NoOrderbook(message)) => {
                    warn!(%mode, error = %message, "No orderbook for market");
                    return Ok(LiquidationOutcome::failed(
                        "No active orderbook for this market",
                        shares,
                        attempts,
                    ));
                }
                Err(SubmitError::Unauthorized(message)) => {
                    warn!(%mode, error = %message, "Authentication failed");
                    return Ok(LiquidationOutcome::failed(
                        format!("Authentication failed: {}", message),
                        shares,
                        attempts,
                    ));
                }
                Err(other) => return Err(other),
            }
        }

        warn!(attempts = attempts.len(), "All signature modes rejected");
        Ok(LiquidationOutcome::failed(
            format!("Signature failed: {}", last_rejection),
            shares,
            attempts,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays scripted results and records each call.
    #[derive(Debug, Default)]
    struct ScriptedSubmitter {
        script: Mutex<VecDeque<Result<OrderResponse, SubmitError>>>,
        calls: Mutex<Vec<(String, f64, SignatureType)>>,
    }

    impl ScriptedSubmitter {
        fn new(script: Vec<Result<OrderResponse, SubmitError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn modes(&self) -> Vec<SignatureType> {
            self.calls.lock().iter().map(|(_, _, m)| *m).collect()
        }
    }

    #[async_trait]
    impl OrderSubmitter for ScriptedSubmitter {
        async fn submit_market_sell(
            &self,
            token_id: &str,
            size: f64,
            mode: SignatureType,
        ) -> Result<OrderResponse, SubmitError> {
            self.calls.lock().push((token_id.to_string(), size, mode));
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(SubmitError::InvalidOrder("script exhausted".to_string())))
        }
    }

    fn filled(id: &str) -> Result<OrderResponse, SubmitError> {
        Ok(OrderResponse {
            success: Some(true),
            order_id: Some(id.to_string()),
            ..Default::default()
        })
    }

    fn bad_signature() -> Result<OrderResponse, SubmitError> {
        Err(SubmitError::InvalidSignature("invalid signature".to_string()))
    }

    #[test]
    fn test_escalation_path() {
        use SignatureType::*;
        assert_eq!(escalation_path(PolyGnosisSafe), vec![PolyGnosisSafe, Eoa, PolyProxy]);
        assert_eq!(escalation_path(Eoa), vec![Eoa, PolyProxy, PolyGnosisSafe]);
        assert_eq!(escalation_path(PolyProxy), vec![PolyProxy, PolyGnosisSafe, Eoa]);
    }

    #[test]
    fn test_round_shares() {
        assert_eq!(round_shares(10.456), 10.46);
        assert_eq!(round_shares(0.004), 0.0);
        assert_eq!(round_shares(25.0), 25.0);
    }

    #[tokio::test]
    async fn test_size_too_small_makes_no_call() {
        let submitter = ScriptedSubmitter::new(vec![filled("x")]);
        let liquidator = Liquidator::new(submitter.clone());

        let outcome = liquidator.liquidate("A", 0.004).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("size too small"));
        assert!(submitter.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_success_first_mode() {
        let submitter = ScriptedSubmitter::new(vec![filled("0xabc")]);
        let liquidator = Liquidator::new(submitter.clone());

        let outcome = liquidator.liquidate("A", 10.456).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.order_id.as_deref(), Some("0xabc"));
        assert_eq!(outcome.shares, 10.46);

        let calls = submitter.calls.lock().clone();
        assert_eq!(calls, vec![("A".to_string(), 10.46, SignatureType::PolyGnosisSafe)]);
    }

    #[tokio::test]
    async fn test_escalates_on_signature_rejection() {
        let submitter = ScriptedSubmitter::new(vec![bad_signature(), filled("0xdef")]);
        let liquidator = Liquidator::new(submitter.clone());

        let outcome = liquidator.liquidate("A", 5.0).await.unwrap();
        assert!(outcome.success);
        assert_eq!(submitter.modes(), vec![SignatureType::PolyGnosisSafe, SignatureType::Eoa]);
        assert_eq!(outcome.attempts, submitter.modes());
    }

    #[tokio::test]
    async fn test_exhaustion_after_three_distinct_modes() {
        let submitter = ScriptedSubmitter::new(vec![bad_signature(), bad_signature(), bad_signature(), filled("never")]);
        let liquidator = Liquidator::new(submitter.clone());

        let outcome = liquidator.liquidate("A", 5.0).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap_or_default().starts_with("Signature failed"));

        let modes = submitter.modes();
        assert_eq!(modes, vec![SignatureType::PolyGnosisSafe, SignatureType::Eoa, SignatureType::PolyProxy]);
        let distinct: HashSet<_> = modes.iter().collect();
        assert_eq!(distinct.len(), modes.len());
    }

    #[tokio::test]
    async fn test_escalation_from_configured_mode() {
        let submitter = ScriptedSubmitter::new(vec![bad_signature(), filled("ok")]);
        let liquidator = Liquidator::new(submitter.clone()).with_start_mode(SignatureType::Eoa);
        assert_eq!(liquidator.start_mode(), SignatureType::Eoa);

        liquidator.liquidate("A", 5.0).await.unwrap();
        assert_eq!(submitter.modes(), vec![SignatureType::Eoa, SignatureType::PolyProxy]);
    }

    #[tokio::test]
    async fn test_no_orderbook_does_not_escalate() {
        let submitter = ScriptedSubmitter::new(vec![Err(SubmitError::NoOrderbook("404".to_string()))]);
        let liquidator = Liquidator::new(submitter.clone());

        let outcome = liquidator.liquidate("A", 5.0).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("No active orderbook for this market"));
        assert_eq!(submitter.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_does_not_escalate() {
        let submitter = ScriptedSubmitter::new(vec![Err(SubmitError::Unauthorized("Invalid api key".to_string()))]);
        let liquidator = Liquidator::new(submitter.clone());

        let outcome = liquidator.liquidate("A", 5.0).await.unwrap();
        assert_eq!(outcome.error.as_deref(), Some("Authentication failed: Invalid api key"));
        assert_eq!(submitter.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let submitter = ScriptedSubmitter::new(vec![Err(SubmitError::Rejected {
            status: 500,
            message: "internal".to_string(),
        })]);
        let liquidator = Liquidator::new(submitter.clone());

        let err = liquidator.liquidate("A", 5.0).await.unwrap_err();
        assert!(matches!(err, SubmitError::Rejected { status: 500, .. }));
        assert_eq!(submitter.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_response_without_order_id_is_failure() {
        let submitter = ScriptedSubmitter::new(vec![Ok(OrderResponse {
            success: Some(true),
            order_id: Some(String::new()),
            ..Default::default()
        })]);
        let outcome = Liquidator::new(submitter).liquidate("A", 5.0).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Unknown error"));
    }

    #[tokio::test]
    async fn test_empty_response_is_failure() {
        let submitter = ScriptedSubmitter::new(vec![Ok(OrderResponse::default())]);
        let outcome = Liquidator::new(submitter.clone()).liquidate("A", 5.0).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.order_id, None);
        assert_eq!(outcome.error.as_deref(), Some("Unknown error"));
        assert_eq!(submitter.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_failure_with_order_id() {
        let submitter = ScriptedSubmitter::new(vec![Ok(OrderResponse {
            success: Some(false),
            order_id: Some("0x1".to_string()),
            error_msg: Some("not enough balance".to_string()),
            ..Default::default()
        })]);
        let outcome = Liquidator::new(submitter).liquidate("A", 5.0).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.order_id.as_deref(), Some("0x1"));
        assert_eq!(outcome.error.as_deref(), Some("not enough balance"));
    }
}
