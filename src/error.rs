//! Error types for stepledger.

use std::time::Duration;

use serde::Serialize;

use crate::types::TxHash;

/// Top-level error type for the session engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Wallet provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerCallError),

    #[error("ABI error: {0}")]
    Abi(#[from] AbiError),

    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Indexer error: {0}")]
    Indexer(#[from] IndexerError),

    #[error("Resume hint error: {0}")]
    Resume(#[from] ResumeError),
}

/// Failure taxonomy shared by every surface that reports errors to a user.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransportFailure,
    CapabilityAbsent,
    NetworkMismatch,
    UnsupportedOperation,
    UserRejected,
    EvidenceUnavailable,
    Internal,
}

impl FailureKind {
    /// Whether the presentation layer should show this failure at all.
    pub fn is_user_visible(self) -> bool {
        !matches!(self, Self::CapabilityAbsent | Self::EvidenceUnavailable)
    }
}

/// Structured error payload handed to presenters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorSurface {
    pub kind: FailureKind,
    pub code: &'static str,
    pub retryable: bool,
    pub user_visible: bool,
    pub message: String,
}

impl ErrorSurface {
    fn new(kind: FailureKind, code: &'static str, retryable: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            retryable,
            user_visible: kind.is_user_visible(),
            message: message.into(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by (or while talking to) the wallet provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Wallet provider unreachable during {method}: {reason}")]
    Transport { method: String, reason: String },

    #[error("User rejected {method}")]
    UserRejected { method: String },

    #[error("Wallet returned error {code} for {method}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("Invalid response for {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("Wallet did not authorize any account")]
    NoAccount,

    #[error("Transaction {hash} reverted")]
    Reverted { hash: TxHash },

    #[error("Timed out waiting for {what} after {timeout:?}")]
    Timeout { what: String, timeout: Duration },
}

impl ProviderError {
    /// EIP-1193 "user rejected request".
    pub const USER_REJECTED_CODE: i64 = 4001;
    /// EIP-3326 "unrecognized chain id".
    pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;
    /// Generic JSON-RPC internal error; some wallets use it for unknown chains.
    pub const INTERNAL_ERROR_CODE: i64 = -32603;

    /// Classify a JSON-RPC error object returned by the wallet.
    pub fn from_rpc(method: &str, code: i64, message: impl Into<String>) -> Self {
        if code == Self::USER_REJECTED_CODE {
            return Self::UserRejected {
                method: method.to_string(),
            };
        }
        Self::Rpc {
            method: method.to_string(),
            code,
            message: message.into(),
        }
    }

    /// Whether the wallet is telling us it does not know the requested chain.
    pub fn is_unrecognized_chain(&self) -> bool {
        matches!(
            self,
            Self::Rpc { code, .. }
                if *code == Self::UNRECOGNIZED_CHAIN_CODE || *code == Self::INTERNAL_ERROR_CODE
        )
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::UserRejected { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

/// Errors from a single ledger read or write encoding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerCallError {
    #[error("Method {method} is not part of the ledger interface")]
    NotDescribed { method: String },

    #[error("Call to {method} reverted: {reason}")]
    Reverted { method: String, reason: String },

    #[error("Ledger transport failure calling {method}: {reason}")]
    Transport { method: String, reason: String },

    #[error("Undecodable return from {method}: {reason}")]
    Decode { method: String, reason: String },

    #[error(transparent)]
    Abi(#[from] AbiError),
}

impl LedgerCallError {
    /// Transport failures are the only read errors that say anything about
    /// reachability; everything else means "this method is not there".
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// ABI descriptor and codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    #[error("Invalid function signature '{0}'")]
    InvalidSignature(String),

    #[error("Unsupported ABI type '{0}'")]
    UnsupportedType(String),

    #[error("Function {function} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("Argument {index} of {function} does not match type {expected}")]
    ArgumentType {
        function: String,
        index: usize,
        expected: String,
    },

    #[error("Data truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("Value does not fit in 64 bits")]
    Overflow,
}

/// Status reconciliation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconcileError {
    #[error("Ledger unavailable: {reason}")]
    RemoteUnavailable { reason: String },
}

/// Submission (write path) errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("A submission for step {step} is already in progress")]
    AlreadyInProgress { step: usize },

    #[error("Step {step} is outside 1..={total}")]
    InvalidStep { step: usize, total: usize },

    #[error("No active session")]
    NotConnected,

    #[error("Connected to network {observed}, submissions require network {target}")]
    NetworkMismatch { observed: u64, target: u64 },

    #[error("Ledger does not support {method}")]
    UnsupportedOperation { method: String },

    #[error("Transaction was rejected in the wallet")]
    UserRejected,

    #[error("Submission failed: {reason}")]
    TransportFailure { reason: String },
}

/// Transaction-history indexer errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("Indexer does not cover chain {chain_id}")]
    UnsupportedChain { chain_id: u64 },

    #[error("Indexer API error: {message}")]
    Api { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resume hint persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable resume hint: {0}")]
    Parse(String),
}

impl SubmitError {
    fn to_error_surface(&self) -> ErrorSurface {
        match self {
            Self::AlreadyInProgress { .. } => ErrorSurface::new(
                FailureKind::Internal,
                "submit.already_in_progress",
                true,
                self.to_string(),
            ),
            Self::InvalidStep { .. } => ErrorSurface::new(
                FailureKind::UnsupportedOperation,
                "submit.invalid_step",
                false,
                self.to_string(),
            ),
            Self::NotConnected => ErrorSurface::new(
                FailureKind::TransportFailure,
                "session.not_connected",
                true,
                self.to_string(),
            ),
            Self::NetworkMismatch { .. } => ErrorSurface::new(
                FailureKind::NetworkMismatch,
                "network.mismatch",
                true,
                self.to_string(),
            ),
            Self::UnsupportedOperation { .. } => ErrorSurface::new(
                FailureKind::UnsupportedOperation,
                "ledger.unsupported_operation",
                false,
                self.to_string(),
            ),
            Self::UserRejected => ErrorSurface::new(
                FailureKind::UserRejected,
                "wallet.user_rejected",
                true,
                self.to_string(),
            ),
            Self::TransportFailure { .. } => ErrorSurface::new(
                FailureKind::TransportFailure,
                "submit.transport_failure",
                true,
                self.to_string(),
            ),
        }
    }
}

impl Error {
    /// Map any engine error into the presentation taxonomy.
    pub fn to_error_surface(&self) -> ErrorSurface {
        match self {
            Self::Submit(err) => err.to_error_surface(),
            Self::Provider(err) => match err {
                ProviderError::UserRejected { .. } => ErrorSurface::new(
                    FailureKind::UserRejected,
                    "wallet.user_rejected",
                    true,
                    err.to_string(),
                ),
                ProviderError::NoAccount => ErrorSurface::new(
                    FailureKind::UserRejected,
                    "wallet.no_account",
                    true,
                    err.to_string(),
                ),
                ProviderError::Transport { .. } | ProviderError::Timeout { .. } => {
                    ErrorSurface::new(
                        FailureKind::TransportFailure,
                        "wallet.transport",
                        true,
                        err.to_string(),
                    )
                }
                ProviderError::Rpc { .. }
                | ProviderError::InvalidResponse { .. }
                | ProviderError::Reverted { .. } => ErrorSurface::new(
                    FailureKind::TransportFailure,
                    "wallet.request_failed",
                    true,
                    err.to_string(),
                ),
            },
            Self::Ledger(err) if err.is_transport() => ErrorSurface::new(
                FailureKind::TransportFailure,
                "ledger.transport",
                true,
                err.to_string(),
            ),
            Self::Ledger(err) => ErrorSurface::new(
                FailureKind::CapabilityAbsent,
                "ledger.capability_absent",
                false,
                err.to_string(),
            ),
            Self::Reconcile(err) => ErrorSurface::new(
                FailureKind::TransportFailure,
                "ledger.unavailable",
                true,
                err.to_string(),
            ),
            Self::Indexer(err) => ErrorSurface::new(
                FailureKind::EvidenceUnavailable,
                "evidence.unavailable",
                true,
                err.to_string(),
            ),
            Self::Config(_) | Self::Abi(_) | Self::Resume(_) => ErrorSurface::new(
                FailureKind::Internal,
                "runtime.unclassified",
                false,
                self.to_string(),
            ),
        }
    }
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
