//! Runtime configuration for the stop-loss bot.
//!
//! Every field has a default, so a missing or partial config file is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use stoploss_chain::{SignatureType, CLOB_HOST, POLYGON_CHAIN_ID};

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Stop-loss threshold and position filtering
    #[serde(default)]
    pub stop_loss: StopLossConfig,

    /// Poll cadence and network retry policy
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Order submission settings
    #[serde(default)]
    pub trading: TradingConfig,

    /// Chat notification toggles
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Stop-loss parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLossConfig {
    /// Loss percentage (vs. entry) at which the position is sold
    #[serde(default = "default_percentage")]
    pub percentage: f64,

    /// Positions smaller than this many shares are ignored by the position API
    #[serde(default = "default_min_position_size")]
    pub min_position_size: f64,
}

fn default_percentage() -> f64 {
    10.0
}
fn default_min_position_size() -> f64 {
    1.0
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            percentage: default_percentage(),
            min_position_size: default_min_position_size(),
        }
    }
}

/// Monitoring loop timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Delay between polls (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub position_poll_interval_ms: u64,

    /// Position API request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Consecutive network failures before the operator is alerted
    #[serde(default = "default_max_network_retries")]
    pub max_network_retries: u32,

    /// Backoff step per consecutive failure (seconds)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Backoff ceiling (seconds)
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_secs: u64,
}

fn default_poll_interval() -> u64 {
    30_000
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_network_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    5
}
fn default_max_retry_delay() -> u64 {
    60
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            position_poll_interval_ms: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            max_network_retries: default_max_network_retries(),
            retry_delay_secs: default_retry_delay(),
            max_retry_delay_secs: default_max_retry_delay(),
        }
    }
}

impl MonitoringConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff after `failures` consecutive network failures.
    pub fn backoff(&self, failures: u32) -> Duration {
        let secs = self
            .retry_delay_secs
            .saturating_mul(u64::from(failures))
            .min(self.max_retry_delay_secs);
        Duration::from_secs(secs)
    }
}

/// Order submission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    /// CLOB endpoint
    #[serde(default = "default_clob_host")]
    pub clob_host: String,

    /// EVM chain id for order signing
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// First signature mode tried when liquidating
    #[serde(default)]
    pub signature_type: SignatureType,
}

fn default_clob_host() -> String {
    CLOB_HOST.to_string()
}
fn default_chain_id() -> u64 {
    POLYGON_CHAIN_ID
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            clob_host: default_clob_host(),
            chain_id: default_chain_id(),
            signature_type: SignatureType::default(),
        }
    }
}

/// Telegram notification toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Master switch
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub notify_on_start: bool,

    #[serde(default = "default_true")]
    pub notify_on_stop_loss: bool,

    #[serde(default = "default_true")]
    pub notify_on_error: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_on_start: true,
            notify_on_stop_loss: true,
            notify_on_error: true,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Rotating log file written alongside the console; empty disables it
    #[serde(default = "default_log_file")]
    pub file: String,

    /// Size at which the log file is rotated
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    /// Rotated files kept (`bot.log.1` is the newest)
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_file() -> String {
    "logs/bot.log".to_string()
}
fn default_max_size_mb() -> u64 {
    10
}
fn default_backup_count() -> usize {
    5
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
            max_size_mb: default_max_size_mb(),
            backup_count: default_backup_count(),
        }
    }
}

impl LoggingConfig {
    /// Log file path, if file logging is enabled.
    pub fn log_file(&self) -> Option<&str> {
        let file = self.file.trim();
        (!file.is_empty()).then_some(file)
    }

    /// Rotation threshold in bytes.
    pub fn max_bytes(&self) -> usize {
        usize::try_from(self.max_size_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

impl BotConfig {
    /// Reject values the monitor cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.stop_loss.percentage > 0.0 && self.stop_loss.percentage <= 100.0) {
            anyhow::bail!(
                "stop_loss.percentage must be in (0, 100], got {}",
                self.stop_loss.percentage
            );
        }
        if self.stop_loss.min_position_size < 0.0 {
            anyhow::bail!(
                "stop_loss.min_position_size must be non-negative, got {}",
                self.stop_loss.min_position_size
            );
        }
        if self.monitoring.position_poll_interval_ms == 0 {
            anyhow::bail!("monitoring.position_poll_interval_ms must be positive");
        }
        if self.monitoring.max_network_retries == 0 {
            anyhow::bail!("monitoring.max_network_retries must be positive");
        }
        if self.logging.log_file().is_some() {
            if self.logging.max_size_mb == 0 {
                anyhow::bail!("logging.max_size_mb must be positive");
            }
            if self.logging.backup_count == 0 {
                anyhow::bail!("logging.backup_count must be positive");
            }
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(
            threshold_pct = self.stop_loss.percentage,
            min_position_size = self.stop_loss.min_position_size,
            "Stop-loss parameters"
        );
        tracing::info!(
            poll_interval_ms = self.monitoring.position_poll_interval_ms,
            request_timeout_secs = self.monitoring.request_timeout_secs,
            max_network_retries = self.monitoring.max_network_retries,
            retry_delay_secs = self.monitoring.retry_delay_secs,
            max_retry_delay_secs = self.monitoring.max_retry_delay_secs,
            "Monitoring timing"
        );
        tracing::info!(
            clob_host = %self.trading.clob_host,
            chain_id = self.trading.chain_id,
            signature_type = %self.trading.signature_type,
            "Trading parameters"
        );
        tracing::info!(
            enabled = self.telegram.enabled,
            on_start = self.telegram.notify_on_start,
            on_stop_loss = self.telegram.notify_on_stop_loss,
            on_error = self.telegram.notify_on_error,
            "Telegram toggles"
        );
    }
}
