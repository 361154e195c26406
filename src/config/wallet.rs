use std::time::Duration;

use crate::config::helpers::{optional_env, parse_optional_env, require_positive};
use crate::error::ConfigError;
use crate::settings::Settings;

/// Local wallet endpoint (Frame and similar wallets listen here).
pub const DEFAULT_WALLET_RPC_URL: &str = "http://127.0.0.1:1248";

/// Wallet provider connection settings.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub rpc_url: String,
    pub rpc_timeout: Duration,
    /// How often the watcher polls accounts and network, and how often a
    /// pending receipt is re-checked.
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

impl WalletConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let rpc_url = optional_env("STEPLEDGER_WALLET_RPC_URL")?
            .or_else(|| settings.wallet_rpc_url.clone())
            .unwrap_or_else(|| DEFAULT_WALLET_RPC_URL.to_string());
        let parsed = url::Url::parse(&rpc_url).map_err(|e| ConfigError::InvalidValue {
            key: "STEPLEDGER_WALLET_RPC_URL".to_string(),
            message: format!("must be a valid URL: {e}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "STEPLEDGER_WALLET_RPC_URL".to_string(),
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let rpc_timeout_ms = require_positive(
            "STEPLEDGER_RPC_TIMEOUT_MS",
            parse_optional_env("STEPLEDGER_RPC_TIMEOUT_MS", "a positive integer")?
                .unwrap_or(15_000),
        )?;
        let poll_interval_ms = require_positive(
            "STEPLEDGER_POLL_INTERVAL_MS",
            parse_optional_env("STEPLEDGER_POLL_INTERVAL_MS", "a positive integer")?
                .unwrap_or(2_000),
        )?;
        let confirmation_timeout_secs = require_positive(
            "STEPLEDGER_CONFIRMATION_TIMEOUT_SECS",
            parse_optional_env("STEPLEDGER_CONFIRMATION_TIMEOUT_SECS", "a positive integer")?
                .unwrap_or(300),
        )?;

        Ok(Self {
            rpc_url,
            rpc_timeout: Duration::from_millis(rpc_timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
            confirmation_timeout: Duration::from_secs(confirmation_timeout_secs),
        })
    }
}
