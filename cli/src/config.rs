//! Client configuration.
//!
//! A TOML file is the base; command-line flags and `TALLY_*` environment
//! variables override individual fields.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tally_types::Address;
use tally_utils::LogFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no contract configured (set `contract` in the config file or pass --contract)")]
    MissingContract,

    #[error("no account configured (set `account` in the config file or pass --account)")]
    MissingAccount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Gateway URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Address of the voting contract.
    #[serde(default)]
    pub contract: Option<String>,

    /// Account the gateway signs writes as.
    #[serde(default)]
    pub account: Option<Address>,

    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_confirmation_poll_ms() -> u64 {
    1_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-field overrides from flags and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub contract: Option<String>,
    pub account: Option<Address>,
    pub confirmation_poll_ms: Option<u64>,
    pub log_format: Option<LogFormat>,
    pub log_level: Option<String>,
}

impl ClientConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Apply every override that is set.
    pub fn with_overrides(self, overrides: Overrides) -> Self {
        Self {
            endpoint: overrides.endpoint.unwrap_or(self.endpoint),
            contract: overrides.contract.or(self.contract),
            account: overrides.account.or(self.account),
            confirmation_poll_ms: overrides
                .confirmation_poll_ms
                .unwrap_or(self.confirmation_poll_ms),
            request_timeout_secs: self.request_timeout_secs,
            log_format: overrides.log_format.unwrap_or(self.log_format),
            log_level: overrides.log_level.unwrap_or(self.log_level),
        }
    }

    pub fn contract(&self) -> Result<&str, ConfigError> {
        self.contract.as_deref().ok_or(ConfigError::MissingContract)
    }

    pub fn account(&self) -> Result<Address, ConfigError> {
        self.account.ok_or(ConfigError::MissingAccount)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            contract: None,
            account: None,
            confirmation_poll_ms: default_confirmation_poll_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = ClientConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.endpoint, "http://127.0.0.1:8545");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(matches!(config.contract(), Err(ConfigError::MissingContract)));
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let toml = r#"
            contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
            account = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
            log_format = "json"
            confirmation_poll_ms = 250
        "#;
        let config = ClientConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(
            config.account().unwrap().to_string(),
            "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"
        );
    }

    #[test]
    fn malformed_account_is_a_parse_error() {
        let err = ClientConfig::from_toml_str(r#"account = "0x1234""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let base = ClientConfig::from_toml_str(
            r#"
            endpoint = "http://gateway:8545"
            contract = "0xabc"
            log_level = "warn"
        "#,
        )
        .unwrap();
        let config = base.with_overrides(Overrides {
            contract: Some("0xdef".into()),
            log_level: Some("debug".into()),
            ..Overrides::default()
        });
        assert_eq!(config.endpoint, "http://gateway:8545");
        assert_eq!(config.contract().unwrap(), "0xdef");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "endpoint = \"http://10.0.0.2:8545\"").unwrap();
        let config = ClientConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.endpoint, "http://10.0.0.2:8545");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ClientConfig::from_toml_file(Path::new("/nonexistent/tally.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
