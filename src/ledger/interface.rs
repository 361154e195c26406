use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::LedgerCallError;
use crate::ledger::abi::{LedgerAbi, Token};
use crate::types::Address;

/// A read method the prober confirmed against a live ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MethodRef(&'static str);

impl MethodRef {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Address and interface description of a ledger deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    pub chain_id: u64,
    pub address: Address,
    pub abi: LedgerAbi,
}

/// Handle onto one ledger deployment.
///
/// Nothing about the method surface is guaranteed: `describes` only says the
/// interface description lists a method, and a listed read may still revert.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
    fn address(&self) -> Address;

    fn chain_id(&self) -> u64;

    fn abi(&self) -> &LedgerAbi;

    fn describes(&self, method: &str) -> bool {
        self.abi().function(method).is_some()
    }

    /// Call a read-only method that returns a single unsigned integer.
    async fn read_uint(&self, method: &str, args: &[Token]) -> Result<u64, LedgerCallError>;

    /// Encode calldata for a mutating method.
    fn encode_write(&self, method: &str, args: &[Token]) -> Result<Vec<u8>, LedgerCallError> {
        let function = self
            .abi()
            .function(method)
            .ok_or_else(|| LedgerCallError::NotDescribed {
                method: method.to_string(),
            })?;
        Ok(function.encode_call(args)?)
    }
}

/// Builds ledger handles for a network. Called again whenever the network
/// changes, which is what invalidates a capability profile.
pub trait LedgerConnector: Send + Sync {
    fn connect(&self, chain_id: u64) -> Arc<dyn LedgerInterface>;
}
