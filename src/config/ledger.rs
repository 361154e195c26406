use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;
use crate::ledger::{ContractInfo, DEFAULT_TOTAL_STEPS, LedgerAbi};
use crate::settings::Settings;
use crate::types::Address;
use crate::wallet::ChainDefinition;
use crate::wallet::chains::{SEPOLIA, chain_definition};

/// Ledger deployment used when nothing else names one.
pub const FALLBACK_CONTRACT_ADDRESS: &str = "0xdd63024953ad565748493F6B48a54E4886809667";

const MAX_TOTAL_STEPS: usize = 255;

/// Contents of an interface description file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbiFile {
    pub abi: Option<LedgerAbi>,
    pub address: Option<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAbiFile {
    #[serde(default)]
    abi: Option<Value>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
}

impl AbiFile {
    pub fn parse(data: &str) -> Result<Self, ConfigError> {
        let raw: RawAbiFile = serde_json::from_str(data)
            .map_err(|e| ConfigError::ParseError(format!("ABI file: {e}")))?;
        let abi = raw
            .abi
            .as_ref()
            .map(LedgerAbi::from_json)
            .transpose()
            .map_err(|e| ConfigError::ParseError(format!("ABI file: {e}")))?;
        let address = raw
            .address
            .or(raw.contract_address)
            .map(|a| parse_address("abi.address", &a))
            .transpose()?;
        Ok(Self { abi, address })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::parse(&data)
    }
}

fn parse_address(key: &str, raw: &str) -> Result<Address, ConfigError> {
    raw.parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("must be a 20-byte hex address: {e}"),
    })
}

/// Resolves which deployment and interface description to use per chain.
///
/// Address priority: env override > settings entry for the chain > ABI file
/// address > built-in fallback. The ABI file's interface wins over the
/// built-in one whenever it has one.
#[derive(Debug, Clone)]
pub struct ContractDirectory {
    override_address: Option<Address>,
    by_chain: HashMap<u64, Address>,
    abi_file: AbiFile,
    total_steps: usize,
}

impl ContractDirectory {
    pub fn new(total_steps: usize) -> Self {
        Self {
            override_address: None,
            by_chain: HashMap::new(),
            abi_file: AbiFile::default(),
            total_steps,
        }
    }

    pub fn with_override(mut self, address: Address) -> Self {
        self.override_address = Some(address);
        self
    }

    pub fn with_chain(mut self, chain_id: u64, address: Address) -> Self {
        self.by_chain.insert(chain_id, address);
        self
    }

    pub fn with_abi_file(mut self, abi_file: AbiFile) -> Self {
        self.abi_file = abi_file;
        self
    }

    pub fn contract_for(&self, chain_id: u64) -> ContractInfo {
        let address = self
            .override_address
            .or_else(|| self.by_chain.get(&chain_id).copied())
            .or(self.abi_file.address)
            .unwrap_or_else(fallback_address);
        let abi = self
            .abi_file
            .abi
            .clone()
            .unwrap_or_else(|| LedgerAbi::builtin(self.total_steps));
        ContractInfo {
            chain_id,
            address,
            abi,
        }
    }
}

fn fallback_address() -> Address {
    FALLBACK_CONTRACT_ADDRESS.parse().unwrap_or(Address::ZERO)
}

/// Ledger and target-network configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub chain: ChainDefinition,
    pub total_steps: usize,
    pub abi_path: Option<PathBuf>,
    pub contracts: ContractDirectory,
}

impl LedgerConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let chain_id = parse_optional_env::<u64>("STEPLEDGER_CHAIN_ID", "a chain id")?
            .or(settings.chain_id)
            .unwrap_or(SEPOLIA.chain_id);
        let chain = *chain_definition(chain_id).ok_or_else(|| ConfigError::InvalidValue {
            key: "STEPLEDGER_CHAIN_ID".to_string(),
            message: format!("no network definition for chain {chain_id}"),
        })?;

        let total_steps = parse_optional_env::<usize>("STEPLEDGER_TOTAL_STEPS", "an integer")?
            .or(settings.total_steps)
            .unwrap_or(DEFAULT_TOTAL_STEPS);
        if !(1..=MAX_TOTAL_STEPS).contains(&total_steps) {
            return Err(ConfigError::InvalidValue {
                key: "STEPLEDGER_TOTAL_STEPS".to_string(),
                message: format!("must be between 1 and {MAX_TOTAL_STEPS}, got {total_steps}"),
            });
        }

        let abi_path = optional_env("STEPLEDGER_ABI_PATH")?
            .or_else(|| settings.abi_path.clone())
            .map(PathBuf::from);
        let abi_file = match &abi_path {
            Some(path) => AbiFile::load(path).map_err(|e| ConfigError::InvalidValue {
                key: "STEPLEDGER_ABI_PATH".to_string(),
                message: format!("{}: {}", path.display(), e),
            })?,
            None => AbiFile::default(),
        };

        let mut contracts = ContractDirectory::new(total_steps).with_abi_file(abi_file);
        for (id, raw) in settings.contract_addresses() {
            contracts = contracts.with_chain(id, parse_address(&format!("contracts.{id}"), raw)?);
        }
        if let Some(raw) = optional_env("STEPLEDGER_CONTRACT_ADDRESS")? {
            contracts = contracts.with_override(parse_address("STEPLEDGER_CONTRACT_ADDRESS", &raw)?);
        }

        Ok(Self {
            chain,
            total_steps,
            abi_path,
            contracts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    #[test]
    fn test_address_priority() {
        let directory = ContractDirectory::new(10)
            .with_chain(11_155_111, addr(2))
            .with_abi_file(AbiFile {
                abi: None,
                address: Some(addr(3)),
            });
        assert_eq!(directory.contract_for(11_155_111).address, addr(2));
        assert_eq!(directory.contract_for(1).address, addr(3));

        let directory = directory.with_override(addr(1));
        assert_eq!(directory.contract_for(11_155_111).address, addr(1));
    }

    #[test]
    fn test_builtin_fallback() {
        let info = ContractDirectory::new(4).contract_for(11_155_111);
        assert_eq!(
            info.address.to_lower_hex(),
            FALLBACK_CONTRACT_ADDRESS.to_lowercase()
        );
        assert!(info.abi.function("submitStep4").is_some());
        assert!(info.abi.function("submitStep5").is_none());
    }

    #[test]
    fn test_abi_file_accepts_contract_address_and_human_readable_abi() {
        let file = AbiFile::parse(
            r#"{
                "contractAddress": "0x0000000000000000000000000000000000000009",
                "abi": ["function currentStep(address wallet) view returns (uint8)"]
            }"#,
        )
        .unwrap();
        let expected: Address = "0x0000000000000000000000000000000000000009".parse().unwrap();
        assert_eq!(file.address, Some(expected));
        let abi = file.abi.unwrap();
        assert_eq!(abi.len(), 1);
        assert!(abi.function("currentStep").is_some());
    }

    #[test]
    fn test_abi_file_rejects_bad_address() {
        let err = AbiFile::parse(r#"{ "address": "0x1234" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
