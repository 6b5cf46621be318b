//! Configuration loading: TOML file, environment overrides and secrets.
//!
//! Load order:
//! - Built-in defaults
//! - TOML file (path from `--config`, `BOT_CONFIG`, or `config.toml`); absent file keeps defaults
//! - Environment overrides (`POSITION_POLL_INTERVAL_MS`)
//! - Validation
//!
//! Secrets never live in the file; they are read from the environment.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use stoploss_chain::Address;
use tracing::{info, warn};

use super::BotConfig;

/// Environment variable names.
pub mod env {
    pub const BOT_CONFIG: &str = "BOT_CONFIG";
    pub const POSITION_POLL_INTERVAL_MS: &str = "POSITION_POLL_INTERVAL_MS";
    pub const WALLET_PRIVATE_KEY: &str = "POLYMARKET_WALLET_PRIVATE_KEY";
    pub const FUNDER_ADDRESS: &str = "POLYMARKET_FUNDER_ADDRESS";
    pub const TURSO_DATABASE_URL: &str = "TURSO_DATABASE_URL";
    pub const TURSO_AUTH_TOKEN: &str = "TURSO_AUTH_TOKEN";
    pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
    pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
}

const DEFAULT_CONFIG_PATH: &str = "config.toml";

impl BotConfig {
    /// Parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    /// Load defaults, the config file, and environment overrides, then validate.
    ///
    /// Runs before logging is set up, so the caller logs the returned source.
    pub fn load(explicit_path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        Self::load_with(explicit_path, |name| std::env::var(name).ok())
    }

    /// [`BotConfig::load`] with environment reads routed through `lookup`.
    pub fn load_with<F>(explicit_path: Option<&Path>, lookup: F) -> Result<(Self, ConfigSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = config_path(explicit_path, &lookup);

        let (mut config, source) = if path.exists() {
            (Self::from_file(&path)?, ConfigSource::File(path))
        } else if explicit_path.is_some() {
            anyhow::bail!("Config file {:?} not found", path);
        } else {
            (Self::default(), ConfigSource::Defaults(path))
        };

        config.apply_env_overrides(&lookup)?;
        config.validate()?;
        Ok((config, source))
    }

    /// Apply environment overrides from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env::POSITION_POLL_INTERVAL_MS) {
            self.monitoring.position_poll_interval_ms = value.trim().parse().with_context(|| {
                format!("{} must be an integer, got {:?}", env::POSITION_POLL_INTERVAL_MS, value)
            })?;
        }
        Ok(())
    }
}

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// No file at this default path; built-in defaults used
    Defaults(PathBuf),
}

impl ConfigSource {
    /// Log where the configuration came from.
    pub fn log(&self) {
        match self {
            Self::File(path) => info!(path = %path.display(), "Loaded config file"),
            Self::Defaults(path) => info!(path = %path.display(), "No config file found, using defaults"),
        }
    }
}

fn config_path<F>(explicit: Option<&Path>, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .map(Path::to_path_buf)
        .or_else(|| lookup(env::BOT_CONFIG).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Turso connection settings.
#[derive(Clone)]
pub struct TursoCredentials {
    pub database_url: String,
    pub auth_token: String,
}

impl TursoCredentials {
    /// Read the ledger settings from the process environment.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Both the database URL and the auth token must be present and non-blank.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Some(Self {
            database_url: get(env::TURSO_DATABASE_URL)?,
            auth_token: get(env::TURSO_AUTH_TOKEN)?,
        })
    }
}

/// Telegram bot settings.
#[derive(Clone)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: i64,
}

/// Secrets and wallet identity read from the environment.
#[derive(Clone)]
pub struct Credentials {
    /// Hex private key of the signing wallet
    pub private_key: String,
    /// Wallet holding the positions (proxy wallet for proxy signature modes)
    pub funder: Address,
    /// Trade ledger; absent disables persistence
    pub turso: Option<TursoCredentials>,
    /// Chat notifications; absent disables them
    pub telegram: Option<TelegramCredentials>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("funder", &self.funder)
            .field("turso", &self.turso.as_ref().map(|t| t.database_url.as_str()))
            .field("telegram", &self.telegram.as_ref().map(|t| t.chat_id))
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials via `lookup`. Wallet key and funder are required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let private_key = get(env::WALLET_PRIVATE_KEY)
            .ok_or_else(|| anyhow::anyhow!("Missing env var: {}", env::WALLET_PRIVATE_KEY))?;
        let funder = get(env::FUNDER_ADDRESS)
            .ok_or_else(|| anyhow::anyhow!("Missing env var: {}", env::FUNDER_ADDRESS))?
            .parse::<Address>()
            .map_err(|e| anyhow::anyhow!("Invalid address for {}: {}", env::FUNDER_ADDRESS, e))?;

        let turso = TursoCredentials::from_lookup(&lookup);

        let telegram = match (get(env::TELEGRAM_BOT_TOKEN), get(env::TELEGRAM_CHAT_ID)) {
            (Some(bot_token), Some(chat_id)) => match chat_id.parse::<i64>() {
                Ok(chat_id) => Some(TelegramCredentials { bot_token, chat_id }),
                Err(e) => {
                    warn!(error = %e, "Invalid {}, Telegram disabled", env::TELEGRAM_CHAT_ID);
                    None
                }
            },
            _ => None,
        };

        Ok(Self {
            private_key,
            funder,
            turso,
            telegram,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const FUNDER: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn test_poll_interval_override() {
        let mut config = BotConfig::default();
        config
            .apply_env_overrides(lookup(&[(env::POSITION_POLL_INTERVAL_MS, "5000")]))
            .unwrap();
        assert_eq!(config.monitoring.position_poll_interval_ms, 5000);

        let mut config = BotConfig::default();
        assert!(config
            .apply_env_overrides(lookup(&[(env::POSITION_POLL_INTERVAL_MS, "fast")]))
            .is_err());
    }

    #[test]
    fn test_config_path_precedence() {
        let explicit = PathBuf::from("a.toml");
        assert_eq!(
            config_path(Some(&explicit), lookup(&[(env::BOT_CONFIG, "b.toml")])),
            explicit
        );
        assert_eq!(
            config_path(None, lookup(&[(env::BOT_CONFIG, "b.toml")])),
            PathBuf::from("b.toml")
        );
        assert_eq!(config_path(None, lookup(&[])), PathBuf::from("config.toml"));
    }

    #[test]
    fn test_load_reports_source() {
        let missing = std::env::temp_dir().join(format!("stoploss-missing-{}.toml", std::process::id()));
        let missing_str = missing.to_string_lossy().to_string();

        let (config, source) =
            BotConfig::load_with(None, lookup(&[(env::BOT_CONFIG, missing_str.as_str())])).unwrap();
        assert_eq!(config, BotConfig::default());
        assert_eq!(source, ConfigSource::Defaults(missing.clone()));

        assert!(BotConfig::load_with(Some(&missing), lookup(&[])).is_err());

        let path = std::env::temp_dir().join(format!("stoploss-load-{}.toml", std::process::id()));
        std::fs::write(&path, "[stop_loss]\npercentage = 12.0\n").unwrap();
        let (config, source) = BotConfig::load_with(
            Some(&path),
            lookup(&[(env::POSITION_POLL_INTERVAL_MS, "2000")]),
        )
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(source, ConfigSource::File(path));
        assert_eq!(config.stop_loss.percentage, 12.0);
        assert_eq!(config.monitoring.position_poll_interval_ms, 2000);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("stoploss-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[stop_loss]\npercentage = 7.5\n").unwrap();

        let config = BotConfig::from_file(&path).unwrap();
        assert_eq!(config.stop_loss.percentage, 7.5);

        std::fs::remove_file(&path).unwrap();
        assert!(BotConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_missing_required_credentials() {
        let err = Credentials::from_lookup(lookup(&[(env::FUNDER_ADDRESS, FUNDER)])).unwrap_err();
        assert!(err.to_string().contains(env::WALLET_PRIVATE_KEY));

        let err = Credentials::from_lookup(lookup(&[(env::WALLET_PRIVATE_KEY, "0x01")])).unwrap_err();
        assert!(err.to_string().contains(env::FUNDER_ADDRESS));

        let err = Credentials::from_lookup(lookup(&[
            (env::WALLET_PRIVATE_KEY, "0x01"),
            (env::FUNDER_ADDRESS, "not-an-address"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("Invalid address"));
    }

    #[test]
    fn test_optional_services() {
        let creds = Credentials::from_lookup(lookup(&[
            (env::WALLET_PRIVATE_KEY, "0x01"),
            (env::FUNDER_ADDRESS, FUNDER),
            (env::TURSO_DATABASE_URL, "libsql://db.turso.io"),
            (env::TELEGRAM_BOT_TOKEN, "123:abc"),
            (env::TELEGRAM_CHAT_ID, "-100200"),
        ]))
        .unwrap();

        assert!(creds.turso.is_none(), "ledger needs both url and token");
        assert_eq!(creds.telegram.as_ref().map(|t| t.chat_id), Some(-100200));
        assert!(!format!("{:?}", creds).contains("123:abc"));

        let creds = Credentials::from_lookup(lookup(&[
            (env::WALLET_PRIVATE_KEY, "0x01"),
            (env::FUNDER_ADDRESS, FUNDER),
            (env::TELEGRAM_BOT_TOKEN, "123:abc"),
            (env::TELEGRAM_CHAT_ID, "not-a-number"),
        ]))
        .unwrap();
        assert!(creds.telegram.is_none());
    }
}
