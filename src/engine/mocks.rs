//! In-memory wallet, ledger and indexer doubles for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::engine::evidence::{IndexedTransaction, TransactionHistory};
use crate::error::{IndexerError, LedgerCallError, ProviderError};
use crate::ledger::abi::approve_method_name;
use crate::ledger::{LedgerAbi, LedgerInterface, Token};
use crate::types::{Address, TxHash};
use crate::wallet::{
    ChainDefinition, Identity, Network, TransactionReceipt, TransactionRequest, WalletProvider,
};

pub fn identity(byte: u8, chain_id: u64) -> Identity {
    Identity {
        account: Address([byte; 20]),
        network: Network::from_id(chain_id),
    }
}

#[derive(Debug, Clone, Copy)]
enum Reply {
    Value(u64),
    Revert,
    Transport,
}

struct LedgerState {
    replies: HashMap<String, Reply>,
    per_step: Option<Vec<Reply>>,
    fallback: Reply,
    per_step_fails_after_probe: bool,
}

pub struct MockLedger {
    address: Address,
    abi: LedgerAbi,
    state: Mutex<LedgerState>,
    reads: AtomicUsize,
}

pub struct MockLedgerBuilder {
    abi: LedgerAbi,
    replies: HashMap<String, Reply>,
    per_step: Option<Vec<Reply>>,
    fallback: Reply,
}

impl MockLedgerBuilder {
    pub fn read(mut self, method: &str, value: u64) -> Self {
        self.replies.insert(method.to_string(), Reply::Value(value));
        self
    }

    pub fn revert(mut self, method: &str) -> Self {
        self.replies.insert(method.to_string(), Reply::Revert);
        self
    }

    /// Per-step status replies for steps 1..; `None` reverts.
    pub fn per_step(mut self, values: Vec<Option<u64>>) -> Self {
        self.per_step = Some(
            values
                .into_iter()
                .map(|v| v.map(Reply::Value).unwrap_or(Reply::Revert))
                .collect(),
        );
        self
    }

    pub fn offline(mut self) -> Self {
        self.replies.clear();
        self.per_step = None;
        self.fallback = Reply::Transport;
        self
    }

    pub fn abi(mut self, abi: LedgerAbi) -> Self {
        self.abi = abi;
        self
    }

    pub fn build(self) -> MockLedger {
        MockLedger {
            address: Address([0xdd; 20]),
            abi: self.abi,
            state: Mutex::new(LedgerState {
                replies: self.replies,
                per_step: self.per_step,
                fallback: self.fallback,
                per_step_fails_after_probe: false,
            }),
            reads: AtomicUsize::new(0),
        }
    }
}

impl MockLedger {
    pub fn builder() -> MockLedgerBuilder {
        MockLedgerBuilder {
            abi: LedgerAbi::builtin(10),
            replies: HashMap::new(),
            per_step: None,
            fallback: Reply::Revert,
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn go_offline(&self) {
        let mut state = self.state.lock().unwrap();
        state.replies.clear();
        state.per_step = None;
        state.fallback = Reply::Transport;
    }

    /// Let the capability probe (step 1) succeed, then fail every later
    /// per-step read.
    pub fn fail_per_step_after_probe(&self) {
        self.state.lock().unwrap().per_step_fails_after_probe = true;
    }

    fn reply_for(&self, method: &str, args: &[Token]) -> Reply {
        let mut state = self.state.lock().unwrap();
        if method == "getStepStatus"
            && let Some(per_step) = state.per_step.clone()
        {
            let step = match args.get(1) {
                Some(Token::Uint(step)) => *step as usize,
                _ => return Reply::Revert,
            };
            if state.per_step_fails_after_probe {
                // The first call is the probe; everything afterwards fails.
                state.per_step = Some(vec![Reply::Revert; per_step.len()]);
                return per_step.first().copied().unwrap_or(Reply::Revert);
            }
            return per_step
                .get(step.wrapping_sub(1))
                .copied()
                .unwrap_or(Reply::Revert);
        }
        state.replies.get(method).copied().unwrap_or(state.fallback)
    }
}

#[async_trait]
impl LedgerInterface for MockLedger {
    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> u64 {
        11_155_111
    }

    fn abi(&self) -> &LedgerAbi {
        &self.abi
    }

    async fn read_uint(&self, method: &str, args: &[Token]) -> Result<u64, LedgerCallError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.reply_for(method, args) {
            Reply::Value(v) => Ok(v),
            Reply::Revert => Err(LedgerCallError::Reverted {
                method: method.to_string(),
                reason: "execution reverted".to_string(),
            }),
            Reply::Transport => Err(LedgerCallError::Transport {
                method: method.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SwitchReply {
    Ok,
    UnknownChain,
    Rejected,
}

#[derive(Debug, Clone, Copy)]
pub enum SendReply {
    Ok,
    Rejected,
    Reverts,
    /// Broadcasts, then never yields a receipt.
    Stalls,
}

struct WalletState {
    chain_id: u64,
    accounts: Vec<Address>,
    switch_script: Vec<SwitchReply>,
    send: SendReply,
    calls: Vec<&'static str>,
    sent: Vec<TransactionRequest>,
}

pub struct MockWallet {
    state: Mutex<WalletState>,
}

impl MockWallet {
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: Mutex::new(WalletState {
                chain_id,
                accounts: vec![Address([1; 20])],
                switch_script: Vec::new(),
                send: SendReply::Ok,
                calls: Vec::new(),
                sent: Vec::new(),
            }),
        }
    }

    pub fn script_switch(&self, replies: Vec<SwitchReply>) {
        self.state.lock().unwrap().switch_script = replies;
    }

    pub fn script_send(&self, reply: SendReply) {
        self.state.lock().unwrap().send = reply;
    }

    /// Mutating wallet calls made so far.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.state.lock().unwrap().chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("wallet_switchEthereumChain");
        let reply = if state.switch_script.is_empty() {
            SwitchReply::Ok
        } else {
            state.switch_script.remove(0)
        };
        match reply {
            SwitchReply::Ok => {
                state.chain_id = chain_id;
                Ok(())
            }
            SwitchReply::UnknownChain => Err(ProviderError::from_rpc(
                "wallet_switchEthereumChain",
                ProviderError::UNRECOGNIZED_CHAIN_CODE,
                "Unrecognized chain ID",
            )),
            SwitchReply::Rejected => Err(ProviderError::from_rpc(
                "wallet_switchEthereumChain",
                ProviderError::USER_REJECTED_CODE,
                "User rejected the request.",
            )),
        }
    }

    async fn add_chain(&self, _chain: &ChainDefinition) -> Result<(), ProviderError> {
        self.state.lock().unwrap().calls.push("wallet_addEthereumChain");
        Ok(())
    }

    async fn balance(&self, _account: Address) -> Result<u128, ProviderError> {
        Ok(0)
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<TxHash, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("eth_sendTransaction");
        match state.send {
            SendReply::Rejected => Err(ProviderError::from_rpc(
                "eth_sendTransaction",
                ProviderError::USER_REJECTED_CODE,
                "User denied transaction signature",
            )),
            SendReply::Ok | SendReply::Reverts | SendReply::Stalls => {
                state.sent.push(tx.clone());
                Ok(TxHash([state.sent.len() as u8; 32]))
            }
        }
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, ProviderError> {
        let send = self.state.lock().unwrap().send;
        if matches!(send, SendReply::Stalls) {
            std::future::pending::<()>().await;
        }
        Ok(TransactionReceipt {
            hash,
            block_number: Some(1),
            success: !matches!(send, SendReply::Reverts),
        })
    }
}

/// Build an `approveStep{step}(account)` transaction to `ledger`.
pub fn approve_tx(
    ledger: &MockLedger,
    step: usize,
    account: Address,
    block_number: u64,
    hash_byte: u8,
) -> IndexedTransaction {
    // Steps outside the ABI still get well-formed calldata with a made-up selector.
    let input = match ledger.abi().function(&approve_method_name(step)) {
        Some(function) => function.encode_call(&[Token::Address(account)]).unwrap(),
        None => {
            let mut data = vec![0xde, 0xad, 0xbe, 0xef];
            data.extend_from_slice(&account.to_word());
            data
        }
    };
    IndexedTransaction {
        hash: TxHash([hash_byte; 32]),
        block_number,
        transaction_index: 0,
        to: Some(ledger.address()),
        input,
        failed: false,
    }
}

pub struct MockHistory {
    transactions: Option<Vec<IndexedTransaction>>,
    fetches: AtomicUsize,
}

impl MockHistory {
    pub fn with(transactions: Vec<IndexedTransaction>) -> Self {
        Self {
            transactions: Some(transactions),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            transactions: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionHistory for MockHistory {
    async fn transactions_to(
        &self,
        chain_id: u64,
        _contract: Address,
    ) -> Result<Vec<IndexedTransaction>, IndexerError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.transactions
            .clone()
            .ok_or(IndexerError::UnsupportedChain { chain_id })
    }
}
