//! Wallet provider seam: identity, network control and transaction signing.

pub mod chains;
mod rpc;
mod watcher;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProviderError;
use crate::types::{Address, TxHash};

pub use self::chains::{ChainDefinition, SEPOLIA, explorer_tx_url, network_name};
pub use self::rpc::JsonRpcWallet;
pub use self::watcher::{ProviderWatcher, WatchState};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Network {
    pub id: u64,
    pub name: String,
}

impl Network {
    pub fn from_id(id: u64) -> Self {
        Self {
            id,
            name: network_name(id),
        }
    }
}

/// The (account, network) viewpoint of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identity {
    pub account: Address,
    pub network: Network,
}

/// Change notifications emitted by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Capabilities consumed from the wallet. Key custody stays in the wallet;
/// `send_transaction` asks it to sign and broadcast.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompt the user to authorize accounts.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Accounts already authorized, without prompting.
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError>;

    async fn chain_id(&self) -> Result<u64, ProviderError>;

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError>;

    async fn add_chain(&self, chain: &ChainDefinition) -> Result<(), ProviderError>;

    /// Native balance in wei.
    async fn balance(&self, account: Address) -> Result<u128, ProviderError>;

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<TxHash, ProviderError>;

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, ProviderError>;
}

/// Format a wei amount as ETH with trailing zeros trimmed.
pub fn format_ether(wei: u128) -> String {
    const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;
    let whole = wei / WEI_PER_ETH;
    let frac = wei % WEI_PER_ETH;
    let frac = format!("{:018}", frac);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, frac)
    }
}
