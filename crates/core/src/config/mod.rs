//! Configuration system for the stop-loss bot.
//!
//! This module provides:
//! - Bot runtime configuration (threshold, timing, trading, notifications, logging)
//! - Loading from TOML with environment overrides
//! - Secrets and wallet identity from the environment

mod bot;
mod loader;

pub use bot::{
    BotConfig, LoggingConfig, MonitoringConfig, StopLossConfig, TelegramConfig, TradingConfig,
};
pub use loader::{env, ConfigSource, Credentials, TelegramCredentials, TursoCredentials};
