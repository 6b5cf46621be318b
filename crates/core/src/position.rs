//! In-memory snapshot of the single watched position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trigger::{self, TriggerResult};
use stoploss_api::Position;

const UNKNOWN_MARKET: &str = "Unknown";

/// The position currently under stop-loss watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    /// Outcome token id
    pub asset_id: String,
    /// Market title
    pub market_title: String,
    /// Outcome label
    pub outcome: String,
    /// Average entry price
    pub entry_price: f64,
    /// Last observed price
    pub last_price: f64,
    /// Last observed size (shares)
    pub size: f64,
    /// When tracking began
    pub tracked_since: DateTime<Utc>,
    /// Last refresh from a snapshot
    pub last_updated: DateTime<Utc>,
}

impl TrackedPosition {
    /// Start tracking a venue position.
    pub fn from_position(position: &Position) -> Self {
        let now = Utc::now();
        let market_title = if position.market_title.is_empty() {
            UNKNOWN_MARKET.to_string()
        } else {
            position.market_title.clone()
        };

        Self {
            asset_id: position.asset_id.clone(),
            market_title,
            outcome: position.outcome.clone(),
            entry_price: position.entry_price,
            last_price: position.current_price,
            size: position.size,
            tracked_since: now,
            last_updated: now,
        }
    }

    /// Refresh prices and size from a newer snapshot of the same asset.
    pub fn refresh(&mut self, position: &Position) {
        debug_assert_eq!(self.asset_id, position.asset_id);
        self.entry_price = position.entry_price;
        self.last_price = position.current_price;
        self.size = position.size;
        if !position.market_title.is_empty() {
            self.market_title = position.market_title.clone();
        }
        if !position.outcome.is_empty() {
            self.outcome = position.outcome.clone();
        }
        self.last_updated = Utc::now();
    }

    /// Evaluate the stop-loss rule at the last observed price.
    pub fn evaluate(&self, threshold_pct: f64) -> TriggerResult {
        trigger::evaluate(self.entry_price, self.last_price, threshold_pct)
    }

    /// Unrealized P/L percentage at the last observed price.
    pub fn pnl_pct(&self) -> f64 {
        if self.entry_price > 0.0 {
            (self.last_price - self.entry_price) / self.entry_price * 100.0
        } else {
            0.0
        }
    }

    /// Price at which the stop-loss fires.
    pub fn trigger_price(&self, threshold_pct: f64) -> f64 {
        trigger::trigger_price(self.entry_price, threshold_pct)
    }

    /// Title truncated for the one-line status log.
    pub fn short_title(&self, max_chars: usize) -> String {
        self.market_title.chars().take(max_chars).collect()
    }
}
