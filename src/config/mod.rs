//! Configuration for stepledger.
//!
//! Settings are loaded with priority: env var > config.json > default.
//! Env vars may also come from `./.env` and `~/.stepledger/.env` (loaded via
//! dotenvy early in startup, see `bootstrap`).

pub(crate) mod helpers;
mod ledger;
mod wallet;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::settings::Settings;

pub use self::ledger::{AbiFile, ContractDirectory, FALLBACK_CONTRACT_ADDRESS, LedgerConfig};
pub use self::wallet::{DEFAULT_WALLET_RPC_URL, WalletConfig};

/// Main configuration for a session.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: PathBuf,
    pub wallet: WalletConfig,
    pub ledger: LedgerConfig,
    pub indexer: IndexerConfig,
    pub resume: ResumeConfig,
}

/// Transaction-history indexer settings.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub etherscan_api_key: Option<SecretString>,
    pub timeout: Duration,
}

impl IndexerConfig {
    pub(crate) fn resolve(settings: &Settings, timeout: Duration) -> Result<Self, ConfigError> {
        let etherscan_api_key = helpers::optional_env("ETHERSCAN_API_KEY")?
            .or_else(|| settings.etherscan_key().map(str::to_string))
            .map(SecretString::from);
        Ok(Self {
            etherscan_api_key,
            timeout,
        })
    }
}

/// Where the last-connected-account hint lives.
#[derive(Debug, Clone)]
pub struct ResumeConfig {
    pub path: PathBuf,
}

impl ResumeConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let path = helpers::optional_env("STEPLEDGER_RESUME_PATH")?
            .map(PathBuf::from)
            .unwrap_or_else(crate::session::default_resume_path);
        Ok(Self { path })
    }
}

impl Config {
    /// Load configuration from the environment and the settings file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings_path = helpers::optional_env("STEPLEDGER_SETTINGS_PATH")?
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_path);
        let settings = Settings::load_from(&settings_path);
        Self::resolve(settings_path, &settings)
    }

    /// Build config from already-loaded settings, applying env overrides.
    pub fn resolve(settings_path: PathBuf, settings: &Settings) -> Result<Self, ConfigError> {
        let wallet = WalletConfig::resolve(settings)?;
        let indexer = IndexerConfig::resolve(settings, wallet.rpc_timeout)?;
        Ok(Self {
            settings_path,
            ledger: LedgerConfig::resolve(settings)?,
            indexer,
            resume: ResumeConfig::resolve()?,
            wallet,
        })
    }
}
