//! Polymarket stop-loss API clients for external services.
//!
//! This crate provides HTTP clients for:
//! - Polymarket Data API: position snapshots for the funder wallet
//! - Telegram: operator chat notifications
//! - Turso: trade history ledger over libSQL HTTP

mod positions;
mod telegram;
mod turso;

pub use positions::{parse_positions, DataApiClient, FetchError, Position, PositionSource, DATA_API_URL};
pub use telegram::{Notifier, TelegramNotifier, TELEGRAM_API_URL};
pub use turso::{StoredTrade, TradeAction, TradeLedger, TradeRecord, TradeStatus, TursoLedger};
