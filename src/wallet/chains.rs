//! Networks the session knows how to register with a wallet.

use serde::Serialize;
use serde_json::{Value, json};

use crate::types::{TxHash, to_quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Everything `wallet_addEthereumChain` needs to register a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainDefinition {
    pub chain_id: u64,
    pub name: &'static str,
    pub native_currency: NativeCurrency,
    pub rpc_urls: &'static [&'static str],
    pub explorer_url: &'static str,
}

pub const MAINNET: ChainDefinition = ChainDefinition {
    chain_id: 1,
    name: "Ethereum Mainnet",
    native_currency: NativeCurrency {
        name: "Ether",
        symbol: "ETH",
        decimals: 18,
    },
    rpc_urls: &["https://cloudflare-eth.com"],
    explorer_url: "https://etherscan.io",
};

pub const SEPOLIA: ChainDefinition = ChainDefinition {
    chain_id: 11_155_111,
    name: "Sepolia",
    native_currency: NativeCurrency {
        name: "Sepolia ETH",
        symbol: "ETH",
        decimals: 18,
    },
    rpc_urls: &["https://rpc.sepolia.org", "https://1rpc.io/sepolia"],
    explorer_url: "https://sepolia.etherscan.io",
};

const KNOWN_CHAINS: [ChainDefinition; 2] = [MAINNET, SEPOLIA];

pub fn chain_definition(chain_id: u64) -> Option<&'static ChainDefinition> {
    KNOWN_CHAINS.iter().find(|c| c.chain_id == chain_id)
}

/// Display name for a network id.
pub fn network_name(chain_id: u64) -> String {
    chain_definition(chain_id)
        .map(|c| c.name.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Explorer link for a transaction, falling back to the mainnet explorer.
pub fn explorer_tx_url(chain_id: u64, hash: &TxHash) -> String {
    let base = chain_definition(chain_id)
        .map(|c| c.explorer_url)
        .unwrap_or(MAINNET.explorer_url);
    format!("{}/tx/{}", base, hash)
}

impl ChainDefinition {
    /// Parameter object for `wallet_addEthereumChain`.
    pub fn add_chain_params(&self) -> Value {
        json!({
            "chainId": to_quantity(u128::from(self.chain_id)),
            "chainName": self.name,
            "nativeCurrency": self.native_currency,
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": [self.explorer_url],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sepolia_add_params_use_hex_chain_id() {
        let params = SEPOLIA.add_chain_params();
        assert_eq!(params["chainId"], "0xaa36a7");
        assert_eq!(params["chainName"], "Sepolia");
        assert_eq!(params["nativeCurrency"]["decimals"], 18);
        assert_eq!(params["rpcUrls"][1], "https://1rpc.io/sepolia");
        assert_eq!(params["blockExplorerUrls"][0], "https://sepolia.etherscan.io");
    }

    #[test]
    fn explorer_links() {
        let hash = TxHash([0xab; 32]);
        assert_eq!(
            explorer_tx_url(11_155_111, &hash),
            format!("https://sepolia.etherscan.io/tx/0x{}", "ab".repeat(32))
        );
        assert!(explorer_tx_url(137, &hash).starts_with("https://etherscan.io/tx/"));
    }

    #[test]
    fn unknown_network_name() {
        assert_eq!(network_name(11_155_111), "Sepolia");
        assert_eq!(network_name(31337), "Unknown");
    }
}
