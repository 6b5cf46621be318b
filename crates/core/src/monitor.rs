//! Stop-loss monitoring loop.
//!
//! One cooperative loop owns all state. Each cycle:
//! - fetches a position snapshot
//! - feeds it to the single-slot tracker and reports lifecycle changes
//! - logs a status line and evaluates the stop-loss trigger
//! - liquidates, journals and reports when the trigger fires
//!
//! Cycles never overlap, so at most one liquidation is in flight. Network
//! failures back off linearly up to a cap; after `max_network_retries`
//! consecutive failures the operator is alerted once per streak.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::config::{BotConfig, MonitoringConfig, StopLossConfig};
use crate::journal::TradeJournal;
use crate::liquidator::Liquidator;
use crate::notify::NotificationSink;
use crate::position::TrackedPosition;
use crate::position_tracker::{CloseReason, PositionTracker, TrackerEvent};
use crate::trigger::PositionStatus;
use stoploss_api::{FetchError, PositionSource, TradeAction, TradeRecord, TradeStatus};
use stoploss_chain::SubmitError;

const STATUS_TITLE_CHARS: usize = 35;
const RULE: &str = "============================================================";

/// Where the loop is in the position lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No tracked position
    Idle,
    /// A position is held and watched
    Tracking,
    /// Trigger fired, executor running
    Liquidating,
}

/// Cycle failure, classified for the loop's recovery policy.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// The monitoring loop and its collaborators.
#[derive(Debug)]
pub struct Monitor {
    source: Arc<dyn PositionSource>,
    liquidator: Liquidator,
    sink: NotificationSink,
    journal: TradeJournal,
    stop_loss: StopLossConfig,
    monitoring: MonitoringConfig,
    tracker: PositionTracker,
    phase: Phase,
    network_failures: u32,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn PositionSource>,
        liquidator: Liquidator,
        sink: NotificationSink,
        journal: TradeJournal,
        config: &BotConfig,
    ) -> Self {
        Self {
            source,
            liquidator,
            sink,
            journal,
            stop_loss: config.stop_loss.clone(),
            monitoring: config.monitoring.clone(),
            tracker: PositionTracker::new(),
            phase: Phase::Idle,
            network_failures: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    /// Consecutive network-class fetch failures in the current streak.
    pub fn network_failures(&self) -> u32 {
        self.network_failures
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.startup().await;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = self.step().await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("{}", RULE);
        info!("Bot stopped by user (Ctrl+C)");
        info!("{}", RULE);
        self.sink.stopped().await;
        Ok(())
    }

    /// Startup banner, ledger check and start notification.
    pub async fn startup(&self) {
        info!("{}", RULE);
        info!("POLYMARKET STOP-LOSS BOT");
        info!("{}", RULE);
        info!("Stop-Loss Threshold: {}%", self.stop_loss.percentage);
        info!("Poll Interval: {} seconds", self.monitoring.poll_interval().as_secs_f64());
        info!("Signature Mode: {}", self.liquidator.start_mode());
        self.journal.ensure_ready().await;
        info!("{}", RULE);
        self.sink.started(self.stop_loss.percentage).await;
    }

    /// Run one cycle and apply the recovery policy. Returns the delay before the next cycle.
    pub async fn step(&mut self) -> Duration {
        match self.cycle().await {
            Ok(()) => self.monitoring.poll_interval(),
            Err(MonitorError::Fetch(e)) if e.is_transient() => {
                self.network_failures = self.network_failures.saturating_add(1);
                let attempt = self.network_failures;

                if matches!(e, FetchError::Timeout(_)) {
                    warn!(attempt, error = %e, "Request timeout");
                } else {
                    error!(attempt, error = %e, "Network error");
                }

                if attempt == self.monitoring.max_network_retries {
                    self.sink.error(&format!("Network issues: {}", e)).await;
                }
                self.monitoring.backoff(attempt)
            }
            Err(e) => {
                error!(error = %e, "Unexpected error");
                if self.phase == Phase::Liquidating {
                    self.phase = Phase::Tracking;
                }
                self.sink.error(&e.to_string()).await;
                self.monitoring.poll_interval()
            }
        }
    }

    /// One fetch, classify, evaluate and (maybe) liquidate pass.
    #[instrument(skip(self), fields(phase = ?self.phase))]
    pub async fn cycle(&mut self) -> Result<(), MonitorError> {
        let snapshot = self.source.fetch_positions().await?;
        self.network_failures = 0;

        let position = match self.tracker.observe(&snapshot) {
            TrackerEvent::Idle(CloseReason::PositionClosed) => {
                info!("Waiting for positions...");
                self.phase = Phase::Idle;
                return Ok(());
            }
            TrackerEvent::Idle(CloseReason::MarketResolved) => {
                info!("No active positions with valid prices (markets may be resolved)");
                self.phase = Phase::Idle;
                return Ok(());
            }
            TrackerEvent::Closed { position, reason } => {
                info!("{}", RULE);
                info!(asset = %position.asset_id, %reason, "POSITION CLOSED");
                info!("{}", RULE);
                self.sink.position_closed(&position, reason).await;
                self.phase = Phase::Idle;
                return Ok(());
            }
            TrackerEvent::Opened { position, .. } => {
                self.log_new_position(&position);
                self.sink.new_position(&position, self.stop_loss.percentage).await;
                self.phase = Phase::Tracking;
                position
            }
            TrackerEvent::Refreshed(position) => {
                self.phase = Phase::Tracking;
                position
            }
        };

        let threshold = self.stop_loss.percentage;
        let result = position.evaluate(threshold);
        info!(
            "[{}] {} | {} | Entry: {:.4} | Now: {:.4} | P/L: {:.2}%",
            PositionStatus::classify(result.drop_pct, threshold),
            position.short_title(STATUS_TITLE_CHARS),
            position.outcome,
            position.entry_price,
            position.last_price,
            -result.drop_pct,
        );

        if result.should_trigger {
            self.liquidate(&position, result.drop_pct).await?;
        }
        Ok(())
    }

    async fn liquidate(&mut self, position: &TrackedPosition, drop_pct: f64) -> Result<(), MonitorError> {
        self.phase = Phase::Liquidating;
        warn!("{}", RULE);
        warn!("STOP-LOSS TRIGGERED!");
        warn!(
            "Price dropped {:.2}% (threshold: {}%)",
            drop_pct, self.stop_loss.percentage
        );
        warn!("Closing position: {:.2} shares at market price", position.size);
        warn!("{}", RULE);

        let outcome = match self.liquidator.liquidate(&position.asset_id, position.size).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.phase = Phase::Tracking;
                return Err(e.into());
            }
        };

        let status = if outcome.success {
            TradeStatus::Success
        } else {
            TradeStatus::Failed
        };
        info!(
            success = outcome.success,
            order_id = ?outcome.order_id,
            status = status.as_str(),
            "Order result"
        );

        let record = TradeRecord {
            timestamp: Utc::now(),
            market_title: position.market_title.clone(),
            token_id: position.asset_id.clone(),
            outcome: position.outcome.clone(),
            action: TradeAction::StopLoss,
            entry_price: position.entry_price,
            exit_price: position.last_price,
            shares: position.size,
            loss_percentage: drop_pct,
            order_id: outcome.order_id.clone(),
            status,
        };
        self.journal.record(&record).await;
        self.sink.stop_loss(position, drop_pct, &outcome).await;

        if outcome.success {
            info!(order_id = ?outcome.order_id, "Position closed successfully!");
            self.tracker.clear();
            self.phase = Phase::Idle;
        } else {
            let message = outcome.error.as_deref().unwrap_or("Unknown error");
            error!(error = %message, "Failed to close position");
            self.sink.error(&format!("Failed to close position: {}", message)).await;
            self.phase = Phase::Tracking;
        }
        Ok(())
    }

    fn log_new_position(&self, position: &TrackedPosition) {
        let threshold = self.stop_loss.percentage;
        info!("{}", RULE);
        info!("NEW POSITION DETECTED!");
        info!("Market: {}", position.market_title);
        info!("Outcome: {}", position.outcome);
        info!("Entry Price: {:.4}", position.entry_price);
        info!("Position Size: {:.2} shares", position.size);
        info!(
            "Stop-Loss will trigger at: {:.4} ({}% drop)",
            position.trigger_price(threshold),
            threshold
        );
        info!("{}", RULE);
    }
}
