//! Wallet provider over an EIP-1193 style JSON-RPC endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ProviderError;
use crate::rpc::{JsonRpcClient, RpcFailure};
use crate::types::{Address, TxHash, parse_quantity, to_quantity};
use crate::wallet::{ChainDefinition, TransactionReceipt, TransactionRequest, WalletProvider};

pub struct JsonRpcWallet {
    client: Arc<JsonRpcClient>,
    poll_interval: Duration,
    confirmation_timeout: Duration,
}

impl JsonRpcWallet {
    pub fn new(
        client: Arc<JsonRpcClient>,
        poll_interval: Duration,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            client,
            poll_interval,
            confirmation_timeout,
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.client
            .call(method, params)
            .await
            .map_err(|e| provider_error(method, e))
    }

    async fn request_accounts_via(&self, method: &str) -> Result<Vec<Address>, ProviderError> {
        let value = self.request(method, json!([])).await?;
        parse_accounts(method, &value)
    }
}

fn provider_error(method: &str, failure: RpcFailure) -> ProviderError {
    match failure {
        RpcFailure::Transport(reason) => ProviderError::Transport {
            method: method.to_string(),
            reason,
        },
        RpcFailure::Error { code, message, .. } => ProviderError::from_rpc(method, code, message),
        RpcFailure::Decode(reason) => ProviderError::InvalidResponse {
            method: method.to_string(),
            reason,
        },
    }
}

fn invalid(method: &str, reason: impl Into<String>) -> ProviderError {
    ProviderError::InvalidResponse {
        method: method.to_string(),
        reason: reason.into(),
    }
}

fn parse_accounts(method: &str, value: &Value) -> Result<Vec<Address>, ProviderError> {
    let entries = value
        .as_array()
        .ok_or_else(|| invalid(method, format!("expected account array, got {}", value)))?;
    entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .ok_or_else(|| invalid(method, "account is not a string"))?
                .parse::<Address>()
                .map_err(|e| invalid(method, e.to_string()))
        })
        .collect()
}

fn parse_quantity_value(method: &str, value: &Value) -> Result<u128, ProviderError> {
    value
        .as_str()
        .and_then(parse_quantity)
        .ok_or_else(|| invalid(method, format!("expected hex quantity, got {}", value)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

fn parse_receipt(value: Value) -> Result<Option<TransactionReceipt>, ProviderError> {
    const METHOD: &str = "eth_getTransactionReceipt";
    if value.is_null() {
        return Ok(None);
    }
    let raw: RawReceipt =
        serde_json::from_value(value).map_err(|e| invalid(METHOD, e.to_string()))?;
    let hash = raw
        .transaction_hash
        .parse::<TxHash>()
        .map_err(|e| invalid(METHOD, e.to_string()))?;
    let block_number = raw
        .block_number
        .as_deref()
        .and_then(parse_quantity)
        .and_then(|n| u64::try_from(n).ok());
    // Pre-Byzantium receipts carry no status; treat them as successful.
    let success = raw
        .status
        .as_deref()
        .and_then(parse_quantity)
        .map(|s| s == 1)
        .unwrap_or(true);
    Ok(Some(TransactionReceipt {
        hash,
        block_number,
        success,
    }))
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let accounts = self.request_accounts_via("eth_requestAccounts").await?;
        if accounts.is_empty() {
            return Err(ProviderError::NoAccount);
        }
        Ok(accounts)
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.request_accounts_via("eth_accounts").await
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        const METHOD: &str = "eth_chainId";
        let value = self.request(METHOD, json!([])).await?;
        let id = parse_quantity_value(METHOD, &value)?;
        u64::try_from(id).map_err(|_| invalid(METHOD, "chain id out of range"))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": to_quantity(u128::from(chain_id)) }]),
        )
        .await?;
        Ok(())
    }

    async fn add_chain(&self, chain: &ChainDefinition) -> Result<(), ProviderError> {
        self.request("wallet_addEthereumChain", json!([chain.add_chain_params()]))
            .await?;
        Ok(())
    }

    async fn balance(&self, account: Address) -> Result<u128, ProviderError> {
        const METHOD: &str = "eth_getBalance";
        let value = self
            .request(METHOD, json!([account.to_lower_hex(), "latest"]))
            .await?;
        parse_quantity_value(METHOD, &value)
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<TxHash, ProviderError> {
        const METHOD: &str = "eth_sendTransaction";
        let value = self
            .request(
                METHOD,
                json!([{
                    "from": tx.from.to_lower_hex(),
                    "to": tx.to.to_lower_hex(),
                    "data": format!("0x{}", hex::encode(&tx.data)),
                }]),
            )
            .await?;
        value
            .as_str()
            .ok_or_else(|| invalid(METHOD, "transaction hash is not a string"))?
            .parse()
            .map_err(|e: crate::types::HexValueError| invalid(METHOD, e.to_string()))
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, ProviderError> {
        let poll = async {
            loop {
                let value = self
                    .request("eth_getTransactionReceipt", json!([hash.to_string()]))
                    .await?;
                if let Some(receipt) = parse_receipt(value)? {
                    return Ok(receipt);
                }
                tracing::trace!(%hash, "Receipt not yet available");
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        tokio::time::timeout(self.confirmation_timeout, poll)
            .await
            .map_err(|_| ProviderError::Timeout {
                what: format!("receipt for {}", hash),
                timeout: self.confirmation_timeout,
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rejection_code_maps_to_rejection() {
        let err = provider_error(
            "eth_sendTransaction",
            RpcFailure::Error {
                code: 4001,
                message: "User denied transaction signature".to_string(),
                data: None,
            },
        );
        assert!(err.is_user_rejection());
    }

    #[test]
    fn accounts_parse_and_reject_garbage() {
        let value = json!(["0xdd63024953ad565748493f6b48a54e4886809667"]);
        let accounts = parse_accounts("eth_accounts", &value).unwrap();
        assert_eq!(accounts.len(), 1);

        assert!(parse_accounts("eth_accounts", &json!("0x01")).is_err());
        assert!(parse_accounts("eth_accounts", &json!(["nope"])).is_err());
    }

    #[test]
    fn pending_receipt_is_none() {
        assert!(parse_receipt(Value::Null).unwrap().is_none());
    }

    #[test]
    fn receipt_status_drives_success() {
        let hash = format!("0x{}", "11".repeat(32));
        let ok = parse_receipt(json!({
            "transactionHash": hash,
            "blockNumber": "0x10",
            "status": "0x1"
        }))
        .unwrap()
        .unwrap();
        assert!(ok.success);
        assert_eq!(ok.block_number, Some(16));

        let reverted = parse_receipt(json!({
            "transactionHash": hash,
            "blockNumber": "0x10",
            "status": "0x0"
        }))
        .unwrap()
        .unwrap();
        assert!(!reverted.success);
    }
}
