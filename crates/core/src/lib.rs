//! Stop-loss engine.
//!
//! This crate provides the core monitoring functionality:
//! - Trigger evaluation against entry price and threshold
//! - Single-slot position tracking across snapshots
//! - Market-sell liquidation with signature-mode escalation
//! - Best-effort operator notifications and trade journaling
//! - The monitoring loop with network backoff and shutdown
//!
//! Adapters for the venue, chat and ledger live in `stoploss-api` and
//! `stoploss-chain`; this crate only sees them through traits.

pub mod config;
mod journal;
mod liquidator;
mod monitor;
mod notify;
mod position;
mod position_tracker;
pub mod trigger;

pub use config::{BotConfig, Credentials};
pub use journal::TradeJournal;
pub use liquidator::{escalation_path, round_shares, LiquidationOutcome, Liquidator, ESCALATION_ORDER};
pub use monitor::{Monitor, MonitorError, Phase};
pub use notify::{CloseResult, NotificationSink};
pub use position::TrackedPosition;
pub use position_tracker::{classify, CloseReason, PositionTracker, SnapshotClass, TrackerEvent};
pub use trigger::{PositionStatus, TriggerResult};
