//! Ledger access through `eth_call` against a JSON-RPC endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::config::ContractDirectory;
use crate::error::LedgerCallError;
use crate::ledger::abi::{LedgerAbi, Token, saturating_uint_word};
use crate::ledger::interface::{ContractInfo, LedgerConnector, LedgerInterface};
use crate::rpc::{JsonRpcClient, RpcFailure};
use crate::types::Address;

pub struct RpcLedger {
    client: Arc<JsonRpcClient>,
    info: ContractInfo,
}

impl RpcLedger {
    pub fn new(client: Arc<JsonRpcClient>, info: ContractInfo) -> Self {
        Self { client, info }
    }
}

fn call_error(method: &str, failure: RpcFailure) -> LedgerCallError {
    match failure {
        RpcFailure::Transport(reason) => LedgerCallError::Transport {
            method: method.to_string(),
            reason,
        },
        RpcFailure::Error {
            code,
            message,
            data,
        } if is_execution_revert(code, &message, data.as_ref()) => LedgerCallError::Reverted {
            method: method.to_string(),
            reason: format!("{} ({})", message, code),
        },
        // Rate limits, internal errors and the like say nothing about the contract.
        RpcFailure::Error { code, message, .. } => LedgerCallError::Transport {
            method: method.to_string(),
            reason: format!("node error {}: {}", code, message),
        },
        RpcFailure::Decode(reason) => LedgerCallError::Decode {
            method: method.to_string(),
            reason,
        },
    }
}

/// Code 3 is the standard revert code; older nodes answer -32000 with a
/// revert message or attach the revert data.
fn is_execution_revert(code: i64, message: &str, data: Option<&Value>) -> bool {
    code == 3
        || data.is_some_and(|d| !d.is_null())
        || message.to_ascii_lowercase().contains("revert")
}

/// Decode an `eth_call` result into a single integer word.
fn decode_call_result(method: &str, result: &Value) -> Result<u64, LedgerCallError> {
    let decode = |reason: String| LedgerCallError::Decode {
        method: method.to_string(),
        reason,
    };
    let raw = result
        .as_str()
        .ok_or_else(|| decode(format!("expected hex string, got {}", result)))?;
    let body = raw.strip_prefix("0x").unwrap_or(raw);
    if body.is_empty() {
        // Calls to a missing function on a contract without a fallback
        // come back as empty data rather than an error.
        return Err(decode("empty return data".to_string()));
    }
    let bytes = hex::decode(body).map_err(|e| decode(e.to_string()))?;
    saturating_uint_word(&bytes).map_err(|e| decode(e.to_string()))
}

#[async_trait]
impl LedgerInterface for RpcLedger {
    fn address(&self) -> Address {
        self.info.address
    }

    fn chain_id(&self) -> u64 {
        self.info.chain_id
    }

    fn abi(&self) -> &LedgerAbi {
        &self.info.abi
    }

    async fn read_uint(&self, method: &str, args: &[Token]) -> Result<u64, LedgerCallError> {
        let function = self
            .info
            .abi
            .function(method)
            .ok_or_else(|| LedgerCallError::NotDescribed {
                method: method.to_string(),
            })?;
        let data = function.encode_call(args)?;

        let params = json!([
            {
                "to": self.info.address.to_lower_hex(),
                "data": format!("0x{}", hex::encode(&data)),
            },
            "latest"
        ]);
        let result = self
            .client
            .call("eth_call", params)
            .await
            .map_err(|e| call_error(method, e))?;
        decode_call_result(method, &result)
    }
}

/// Connects to whichever deployment the contract directory names for a chain.
pub struct RpcLedgerConnector {
    client: Arc<JsonRpcClient>,
    directory: ContractDirectory,
}

impl RpcLedgerConnector {
    pub fn new(client: Arc<JsonRpcClient>, directory: ContractDirectory) -> Self {
        Self { client, directory }
    }
}

impl LedgerConnector for RpcLedgerConnector {
    fn connect(&self, chain_id: u64) -> Arc<dyn LedgerInterface> {
        let info = self.directory.contract_for(chain_id);
        tracing::debug!(
            chain_id,
            address = %info.address,
            functions = info.abi.len(),
            "Connected ledger interface"
        );
        Arc::new(RpcLedger::new(Arc::clone(&self.client), info))
    }
}
