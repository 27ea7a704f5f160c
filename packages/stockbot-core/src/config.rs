//! Runtime configuration loaded from TOML with environment overrides.

use crate::types::AccountId;
use crate::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at the config file.
pub const CONFIG_FILE_ENV: &str = "STOCKBOT_CONFIG";
/// Environment variable overriding `ledger_path`.
pub const LEDGER_FILE_ENV: &str = "STOCKBOT_LEDGER_FILE";
/// Environment variable overriding `quote.api_key`.
pub const API_KEY_ENV: &str = "ALPHA_VANTAGE_API_KEY";

/// Top-level configuration.
///
/// Every field has a default, so an empty or missing file is valid:
///
/// ```toml
/// starting_cash = "10000.00"
/// admin_ids = [12345]
/// session_ttl_secs = 900
///
/// [quote]
/// api_key = "demo"
///
/// [broadcast]
/// max_rate_limit_retries = 10
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Cash credited to a newly created account
    pub starting_cash: Decimal,
    /// Ledger file; `None` resolves to `~/.stockbot/ledger.json`
    pub ledger_path: Option<PathBuf>,
    /// Accounts allowed to use administrative commands
    pub admin_ids: Vec<AccountId>,
    /// Idle time after which a conversation session is considered stale
    pub session_ttl_secs: u64,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
    pub quote: QuoteConfig,
    pub broadcast: BroadcastConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            starting_cash: Decimal::new(10_000_00, 2),
            ledger_path: None,
            admin_ids: Vec::new(),
            session_ttl_secs: 900,
            log_filter: "info".to_string(),
            quote: QuoteConfig::default(),
            broadcast: BroadcastConfig::default(),
        }
    }
}

/// Quote source settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuoteConfig {
    pub api_key: String,
    pub base_url: String,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://www.alphavantage.co/query".to_string(),
        }
    }
}

/// Broadcast dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Rate-limit retries allowed per recipient before it is skipped
    pub max_rate_limit_retries: u32,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 10,
        }
    }
}

impl Config {
    /// Get the default config file path.
    ///
    /// Default path: `~/.stockbot/config.toml`
    /// Can be overridden with `STOCKBOT_CONFIG` environment variable.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var(CONFIG_FILE_ENV) {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".stockbot/config.toml"))
            .unwrap_or_else(|| PathBuf::from("stockbot.toml"))
    }

    /// Load from the default path and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&Self::default_path())?;
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific path. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(LEDGER_FILE_ENV).filter(|v| !v.is_empty()) {
            self.ledger_path = Some(PathBuf::from(path));
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.quote.api_key = key;
        }
    }

    /// Resolved ledger file location.
    pub fn ledger_path(&self) -> PathBuf {
        if let Some(path) = &self.ledger_path {
            return path.clone();
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".stockbot/ledger.json"))
            .unwrap_or_else(|| PathBuf::from("ledger.json"))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn is_admin(&self, account: AccountId) -> bool {
        self.admin_ids.contains(&account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.starting_cash, dec!(10000.00));
        assert_eq!(config.session_ttl(), Duration::from_secs(900));
        assert_eq!(config.broadcast.max_rate_limit_retries, 10);
        assert!(config.admin_ids.is_empty());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
starting_cash = "2500.50"
admin_ids = [1, 2]

[broadcast]
max_rate_limit_retries = 3
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.starting_cash, dec!(2500.50));
        assert!(config.is_admin(AccountId(2)));
        assert!(!config.is_admin(AccountId(3)));
        assert_eq!(config.broadcast.max_rate_limit_retries, 3);
        assert_eq!(config.quote, QuoteConfig::default());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "admin_ids = \"nope\"").unwrap();

        assert!(matches!(
            Config::load_from_path(&path),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (LEDGER_FILE_ENV, "/tmp/ledger.json"),
            (API_KEY_ENV, "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.ledger_path(), PathBuf::from("/tmp/ledger.json"));
        assert_eq!(config.quote.api_key, "secret");
    }

    #[test]
    fn test_empty_override_ignored() {
        let mut config = Config::default();
        config.quote.api_key = "kept".to_string();
        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config.quote.api_key, "kept");
        assert!(config.ledger_path.is_none());
    }
}
