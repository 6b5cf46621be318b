//! Trade journal over an optional ledger.
//!
//! Writes are best-effort and never fail the caller. History reads report errors.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use stoploss_api::{StoredTrade, TradeLedger, TradeRecord};

/// Wraps the trade ledger for the monitor and the `history` command.
#[derive(Debug, Clone, Default)]
pub struct TradeJournal {
    ledger: Option<Arc<dyn TradeLedger>>,
}

impl TradeJournal {
    pub fn new(ledger: Option<Arc<dyn TradeLedger>>) -> Self {
        Self { ledger }
    }

    /// Check the ledger and create its table. Returns whether it is usable.
    pub async fn ensure_ready(&self) -> bool {
        let Some(ledger) = &self.ledger else {
            warn!("Database: not configured");
            return false;
        };

        match ledger.ensure_schema().await {
            Ok(()) => {
                info!("Database: Connected successfully");
                true
            }
            Err(e) => {
                warn!(error = %e, "Database: Connection failed");
                warn!("Continuing without database logging...");
                false
            }
        }
    }

    /// Append a record, returning the row id when the ledger reports one.
    pub async fn record(&self, record: &TradeRecord) -> Option<i64> {
        let ledger = self.ledger.as_ref()?;
        match ledger.record_trade(record).await {
            Ok(Some(id)) => {
                info!(trade_id = id, "Trade logged to database");
                Some(id)
            }
            Ok(None) => {
                warn!("Trade logged but no ID returned");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to log trade to database");
                None
            }
        }
    }

    /// Most recent records, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<StoredTrade>> {
        let Some(ledger) = &self.ledger else {
            anyhow::bail!("Trade ledger is not configured");
        };
        ledger.recent_trades(limit).await
    }
}
