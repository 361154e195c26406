//! Approval evidence: corroborate approved steps against transaction history.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::IndexerError;
use crate::ledger::abi::approve_step_number;
use crate::ledger::{LedgerAbi, LedgerInterface, StatusVector, Token};
use crate::types::{Address, TxHash};
use crate::wallet::{Identity, explorer_tx_url};

/// One transaction as reported by a history indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedTransaction {
    pub hash: TxHash,
    pub block_number: u64,
    pub transaction_index: u64,
    pub to: Option<Address>,
    pub input: Vec<u8>,
    pub failed: bool,
}

/// Transaction-history feed for a contract.
#[async_trait]
pub trait TransactionHistory: Send + Sync {
    async fn transactions_to(
        &self,
        chain_id: u64,
        contract: Address,
    ) -> Result<Vec<IndexedTransaction>, IndexerError>;

    fn explorer_tx_url(&self, chain_id: u64, hash: &TxHash) -> String {
        explorer_tx_url(chain_id, hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidenceRef {
    pub hash: TxHash,
    pub url: String,
}

/// Step number (1-based) to the transaction that approved it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ApprovalEvidence(BTreeMap<usize, EvidenceRef>);

impl ApprovalEvidence {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, step: usize) -> Option<&EvidenceRef> {
        self.0.get(&step)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pick the latest `approveStep{N}(account)` call per step.
///
/// Transactions are ordered by (block, index) first, so a later approval of
/// the same step always overwrites an earlier one.
pub fn latest_approvals(
    transactions: &[IndexedTransaction],
    abi: &LedgerAbi,
    contract: Address,
    account: Address,
    total_steps: usize,
) -> BTreeMap<usize, TxHash> {
    let mut ordered: Vec<&IndexedTransaction> = transactions.iter().collect();
    ordered.sort_by_key(|tx| (tx.block_number, tx.transaction_index));

    let mut latest = BTreeMap::new();
    for tx in ordered {
        if tx.failed || tx.to != Some(contract) {
            continue;
        }
        let Some(function) = abi.by_selector(&tx.input) else {
            continue;
        };
        let Some(step) = approve_step_number(&function.name) else {
            continue;
        };
        if step == 0 || step > total_steps {
            continue;
        }
        let Ok(args) = function.decode_inputs(&tx.input) else {
            continue;
        };
        if args.first().and_then(Token::as_address) == Some(account) {
            latest.insert(step, tx.hash);
        }
    }
    latest
}

/// Best-effort annotation of the approved steps in `vector`.
///
/// Any failure yields empty evidence; the vector never depends on it.
pub async fn annotate(
    history: &dyn TransactionHistory,
    vector: &StatusVector,
    identity: &Identity,
    ledger: &dyn LedgerInterface,
) -> ApprovalEvidence {
    let approved = vector.approved_steps();
    if approved.is_empty() {
        return ApprovalEvidence::empty();
    }

    let chain_id = identity.network.id;
    let transactions = match history.transactions_to(chain_id, ledger.address()).await {
        Ok(transactions) => transactions,
        Err(e) => {
            tracing::debug!(chain_id, "Approval evidence unavailable: {}", e);
            return ApprovalEvidence::empty();
        }
    };

    let latest = latest_approvals(
        &transactions,
        ledger.abi(),
        ledger.address(),
        identity.account,
        vector.len(),
    );
    let entries = approved
        .into_iter()
        .filter_map(|step| {
            latest.get(&step).map(|hash| {
                let url = history.explorer_tx_url(chain_id, hash);
                (step, EvidenceRef { hash: *hash, url })
            })
        })
        .collect();
    ApprovalEvidence(entries)
}
