//! Stop-loss trigger evaluation.
//!
//! Pure arithmetic on entry price, current price and threshold. A negative
//! drop means the position is in profit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of evaluating a position against its stop-loss threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerResult {
    /// Whether the position should be liquidated
    pub should_trigger: bool,
    /// Signed percentage drop from entry (negative = profit)
    pub drop_pct: f64,
}

/// Per-cycle status of the tracked position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Drop has reached the threshold
    StopLossHit,
    /// Below entry, above the threshold
    InLoss,
    /// At or above entry
    InProfit,
}

impl PositionStatus {
    pub fn classify(drop_pct: f64, threshold_pct: f64) -> Self {
        if drop_pct >= threshold_pct {
            Self::StopLossHit
        } else if drop_pct > 0.0 {
            Self::InLoss
        } else {
            Self::InProfit
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::StopLossHit => "STOP-LOSS HIT!",
            Self::InLoss => "IN LOSS",
            Self::InProfit => "IN PROFIT",
        };
        f.write_str(label)
    }
}

/// Evaluate the stop-loss rule.
///
/// A non-positive entry price never triggers. The threshold boundary is inclusive.
pub fn evaluate(entry_price: f64, current_price: f64, threshold_pct: f64) -> TriggerResult {
    if entry_price <= 0.0 {
        return TriggerResult {
            should_trigger: false,
            drop_pct: 0.0,
        };
    }

    let drop_pct = (entry_price - current_price) / entry_price * 100.0;
    TriggerResult {
        should_trigger: drop_pct >= threshold_pct,
        drop_pct,
    }
}

/// Price at which the stop-loss fires.
#[inline]
pub fn trigger_price(entry_price: f64, threshold_pct: f64) -> f64 {
    entry_price * (1.0 - threshold_pct / 100.0)
}
