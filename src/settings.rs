//! User settings persistence.
//!
//! Stores deployment settings in ~/.stepledger/config.json.
//! Settings are loaded with env var > config.json > default priority.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Ledger deployment entry for one chain.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractEntry {
    /// Ledger contract address. Older files call it `gradebook`.
    #[serde(default, alias = "gradebook")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ApiKeys {
    #[serde(default)]
    pub etherscan: Option<String>,
}

/// User settings persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Ledger deployments keyed by decimal chain id.
    #[serde(default)]
    pub contracts: HashMap<String, ContractEntry>,

    #[serde(default)]
    pub etherscan_api_key: Option<String>,

    #[serde(default)]
    pub api_keys: ApiKeys,

    /// Wallet JSON-RPC endpoint.
    #[serde(default)]
    pub wallet_rpc_url: Option<String>,

    /// Network submissions must happen on.
    #[serde(default)]
    pub chain_id: Option<u64>,

    #[serde(default)]
    pub total_steps: Option<usize>,

    /// Interface description file (`{ "abi": [...], "address": "0x..." }`).
    #[serde(default, alias = "contractAbiPath")]
    pub abi_path: Option<String>,
}

impl Settings {
    /// Get the default settings file path (~/.stepledger/config.json).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".stepledger")
            .join("config.json")
    }

    /// Load settings from disk, returning default if not found.
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path. Missing or invalid files fall back
    /// to defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid settings file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Contract address configured for a chain, if any.
    pub fn contract_address(&self, chain_id: u64) -> Option<&str> {
        self.contracts
            .get(&chain_id.to_string())
            .and_then(|entry| entry.address.as_deref())
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }

    /// Etherscan key from either supported location.
    pub fn etherscan_key(&self) -> Option<&str> {
        self.etherscan_api_key
            .as_deref()
            .or(self.api_keys.etherscan.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Contract addresses for every chain whose key parses as a chain id.
    pub fn contract_addresses(&self) -> Vec<(u64, &str)> {
        let mut out: Vec<(u64, &str)> = self
            .contracts
            .keys()
            .filter_map(|key| key.parse::<u64>().ok())
            .filter_map(|id| self.contract_address(id).map(|addr| (id, addr)))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parses_legacy_gradebook_key() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "contracts": {
                    "11155111": { "gradebook": "0xdd63024953ad565748493F6B48a54E4886809667" },
                    "1": { "address": "0x0000000000000000000000000000000000000001" },
                    "mainnet": { "address": "0x0000000000000000000000000000000000000002" }
                },
                "apiKeys": { "etherscan": "abc" }
            }"#,
        )
        .unwrap();

        assert_eq!(
            settings.contract_address(11_155_111),
            Some("0xdd63024953ad565748493F6B48a54E4886809667")
        );
        assert_eq!(settings.contract_addresses().len(), 2);
        assert_eq!(settings.etherscan_key(), Some("abc"));
    }

    #[test]
    fn test_top_level_etherscan_key_wins() {
        let settings: Settings = serde_json::from_str(
            r#"{ "etherscanApiKey": "top", "apiKeys": { "etherscan": "nested" } }"#,
        )
        .unwrap();
        assert_eq!(settings.etherscan_key(), Some("top"));
    }

    #[test]
    fn test_load_missing_or_invalid_file_is_default() {
        let dir = tempdir().unwrap();
        assert_eq!(Settings::load_from(&dir.path().join("nope.json")), Settings::default());

        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "chainId": 1, "totalSteps": 12, "walletRpcUrl": "http://localhost:8545" }"#)
            .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.chain_id, Some(1));
        assert_eq!(settings.total_steps, Some(12));
        assert_eq!(settings.wallet_rpc_url.as_deref(), Some("http://localhost:8545"));
    }

    #[test]
    fn test_default_path() {
        let path = Settings::default_path();
        assert!(path.ends_with(".stepledger/config.json"));
    }
}
