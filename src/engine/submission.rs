//! Submission coordinator: the guarded write path for advancing one step.

use std::sync::Mutex;

use serde::Serialize;

use crate::engine::guard::{NetworkGuard, SwitchOutcome, SwitchPrompt};
use crate::error::{LedgerCallError, ProviderError, SubmitError};
use crate::ledger::LedgerInterface;
use crate::ledger::abi::submit_method_name;
use crate::types::TxHash;
use crate::wallet::{Identity, TransactionRequest, WalletProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    #[default]
    Idle,
    AwaitingNetwork,
    AwaitingSignature,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

impl SubmissionState {
    /// States in which a new attempt may start.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Confirmed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SubmissionAttempt {
    /// 1-based step; zero while idle.
    pub step: usize,
    pub state: SubmissionState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmed {
    pub step: usize,
    pub hash: TxHash,
    pub block_number: Option<u64>,
}

/// Everything one submission needs, read fresh from the session at call time.
pub struct SubmitRequest<'a> {
    pub step: usize,
    pub total_steps: usize,
    pub identity: &'a Identity,
    pub wallet: &'a dyn WalletProvider,
    /// Ledger deployment on the guard's target network.
    pub ledger: &'a dyn LedgerInterface,
    pub guard: &'a NetworkGuard,
    /// `None` when nobody can be asked; a mismatch then fails immediately.
    pub prompt: Option<&'a dyn SwitchPrompt>,
}

/// Owns the single in-flight [`SubmissionAttempt`] of a session.
#[derive(Debug, Default)]
pub struct SubmissionCoordinator {
    attempt: Mutex<SubmissionAttempt>,
}

impl SubmissionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt(&self) -> SubmissionAttempt {
        match self.attempt.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, step: usize, state: SubmissionState) {
        let mut guard = match self.attempt.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::debug!(step, ?state, "Submission state");
        *guard = SubmissionAttempt { step, state };
    }

    /// Claim the attempt slot without awaiting anything.
    fn try_begin(&self, step: usize) -> Result<AttemptSlot<'_>, SubmitError> {
        let mut guard = match self.attempt.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !guard.state.is_settled() {
            return Err(SubmitError::AlreadyInProgress { step: guard.step });
        }
        *guard = SubmissionAttempt {
            step,
            state: SubmissionState::AwaitingNetwork,
        };
        Ok(AttemptSlot {
            coordinator: self,
            step,
            settled: false,
        })
    }

    /// Drive one submission to confirmation.
    ///
    /// A second call while an attempt is in flight is rejected before any
    /// provider call. Every failure leaves the attempt `Failed`, which is
    /// re-armable; nothing is retried and nothing is persisted.
    pub async fn submit(&self, request: SubmitRequest<'_>) -> Result<Confirmed, SubmitError> {
        let step = request.step;
        if step == 0 || step > request.total_steps {
            return Err(SubmitError::InvalidStep {
                step,
                total: request.total_steps,
            });
        }
        let slot = self.try_begin(step)?;

        let result = self.run(&request).await;
        match &result {
            Ok(confirmed) => {
                tracing::info!(step, hash = %confirmed.hash, "Submission confirmed");
                slot.settle(SubmissionState::Confirmed);
            }
            Err(e) => {
                tracing::warn!(step, "Submission failed: {}", e);
                slot.settle(SubmissionState::Failed);
            }
        }
        result
    }

    async fn run(&self, request: &SubmitRequest<'_>) -> Result<Confirmed, SubmitError> {
        let step = request.step;
        let target = request.guard.target().chain_id;

        self.ensure_network(request, target).await?;

        let method = submit_method_name(step);
        if !request.ledger.describes(&method) {
            return Err(SubmitError::UnsupportedOperation { method });
        }
        let data = request
            .ledger
            .encode_write(&method, &[])
            .map_err(|e| match e {
                LedgerCallError::NotDescribed { method } => {
                    SubmitError::UnsupportedOperation { method }
                }
                other => SubmitError::TransportFailure {
                    reason: other.to_string(),
                },
            })?;

        self.set_state(step, SubmissionState::AwaitingSignature);
        let tx = TransactionRequest {
            from: request.identity.account,
            to: request.ledger.address(),
            data,
        };
        let hash = request
            .wallet
            .send_transaction(&tx)
            .await
            .map_err(write_error)?;

        self.set_state(step, SubmissionState::AwaitingConfirmation);
        tracing::info!(step, %hash, "Submission broadcast; awaiting confirmation");
        let receipt = request
            .wallet
            .wait_for_receipt(hash)
            .await
            .map_err(write_error)?;
        if !receipt.success {
            return Err(write_error(ProviderError::Reverted { hash }));
        }

        Ok(Confirmed {
            step,
            hash,
            block_number: receipt.block_number,
        })
    }

    async fn ensure_network(
        &self,
        request: &SubmitRequest<'_>,
        target: u64,
    ) -> Result<(), SubmitError> {
        let observed = request.identity.network.id;
        if observed == target {
            return Ok(());
        }
        let mismatch = SubmitError::NetworkMismatch { observed, target };
        let Some(prompt) = request.prompt else {
            return Err(mismatch);
        };

        match request
            .guard
            .negotiate_switch(request.wallet, prompt, &request.identity.network)
            .await
        {
            SwitchOutcome::AlreadyOnTarget => Ok(()),
            SwitchOutcome::Switched => {
                // Trust the wallet's reported network, not the switch reply.
                let now = request.wallet.chain_id().await.map_err(write_error)?;
                if now == target {
                    Ok(())
                } else {
                    Err(SubmitError::NetworkMismatch {
                        observed: now,
                        target,
                    })
                }
            }
            SwitchOutcome::Declined | SwitchOutcome::Failed(_) => Err(mismatch),
        }
    }
}

/// Holds the claimed attempt; an attempt dropped before it settles is
/// recorded as `Failed` so the slot re-arms.
struct AttemptSlot<'a> {
    coordinator: &'a SubmissionCoordinator,
    step: usize,
    settled: bool,
}

impl AttemptSlot<'_> {
    fn settle(mut self, state: SubmissionState) {
        self.coordinator.set_state(self.step, state);
        self.settled = true;
    }
}

impl Drop for AttemptSlot<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(step = self.step, "Submission abandoned before it settled");
            self.coordinator
                .set_state(self.step, SubmissionState::Failed);
        }
    }
}

fn write_error(err: ProviderError) -> SubmitError {
    if err.is_user_rejection() {
        SubmitError::UserRejected
    } else {
        SubmitError::TransportFailure {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::guard::FixedAnswer;
    use crate::engine::mocks::{MockLedger, MockWallet, SendReply, SwitchReply, identity};
    use crate::ledger::LedgerAbi;
    use crate::wallet::SEPOLIA;

    const SEPOLIA_ID: u64 = 11_155_111;

    fn request<'a>(
        step: usize,
        id: &'a Identity,
        wallet: &'a MockWallet,
        ledger: &'a MockLedger,
        guard: &'a NetworkGuard,
        prompt: Option<&'a dyn SwitchPrompt>,
    ) -> SubmitRequest<'a> {
        SubmitRequest {
            step,
            total_steps: 10,
            identity: id,
            wallet,
            ledger,
            guard,
            prompt,
        }
    }

    #[tokio::test]
    async fn confirmed_submission_walks_all_states() {
        let id = identity(1, SEPOLIA_ID);
        let wallet = MockWallet::new(SEPOLIA_ID);
        let ledger = MockLedger::builder().build();
        let guard = NetworkGuard::new(SEPOLIA);
        let coordinator = SubmissionCoordinator::new();

        let confirmed = coordinator
            .submit(request(3, &id, &wallet, &ledger, &guard, None))
            .await
            .unwrap();

        assert_eq!(confirmed.step, 3);
        assert_eq!(
            coordinator.attempt(),
            SubmissionAttempt {
                step: 3,
                state: SubmissionState::Confirmed
            }
        );
        let sent = wallet.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, ledger.address());
        assert_eq!(sent[0].data.len(), 4);
    }

    #[tokio::test]
    async fn mismatch_without_prompt_fails_before_any_call() {
        let id = identity(1, 1);
        let wallet = MockWallet::new(1);
        let ledger = MockLedger::builder().build();
        let guard = NetworkGuard::new(SEPOLIA);
        let coordinator = SubmissionCoordinator::new();

        let err = coordinator
            .submit(request(1, &id, &wallet, &ledger, &guard, None))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SubmitError::NetworkMismatch {
                observed: 1,
                target: SEPOLIA_ID
            }
        );
        assert!(wallet.calls().is_empty());
        assert_eq!(ledger.read_count(), 0);
        assert_eq!(coordinator.attempt().state, SubmissionState::Failed);
    }

    #[tokio::test]
    async fn declined_switch_is_network_mismatch() {
        let id = identity(1, 1);
        let wallet = MockWallet::new(1);
        let ledger = MockLedger::builder().build();
        let guard = NetworkGuard::new(SEPOLIA);
        let coordinator = SubmissionCoordinator::new();
        let decline = FixedAnswer(false);

        let err = coordinator
            .submit(request(1, &id, &wallet, &ledger, &guard, Some(&decline)))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::NetworkMismatch { .. }));
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test]
    async fn accepted_switch_proceeds_to_write() {
        let id = identity(1, 1);
        let wallet = MockWallet::new(1);
        wallet.script_switch(vec![SwitchReply::Ok]);
        let ledger = MockLedger::builder().build();
        let guard = NetworkGuard::new(SEPOLIA);
        let coordinator = SubmissionCoordinator::new();
        let accept = FixedAnswer(true);

        coordinator
            .submit(request(2, &id, &wallet, &ledger, &guard, Some(&accept)))
            .await
            .unwrap();
        assert_eq!(wallet.sent().len(), 1);
    }

    #[tokio::test]
    async fn missing_write_method_is_unsupported() {
        let id = identity(1, SEPOLIA_ID);
        let wallet = MockWallet::new(SEPOLIA_ID);
        let ledger = MockLedger::builder()
            .abi(LedgerAbi::from_fragments(["function submitStep1()"]))
            .build();
        let guard = NetworkGuard::new(SEPOLIA);
        let coordinator = SubmissionCoordinator::new();

        let err = coordinator
            .submit(request(2, &id, &wallet, &ledger, &guard, None))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmitError::UnsupportedOperation {
                method: "submitStep2".to_string()
            }
        );
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test]
    async fn wallet_rejection_rearms() {
        let id = identity(1, SEPOLIA_ID);
        let wallet = MockWallet::new(SEPOLIA_ID);
        wallet.script_send(SendReply::Rejected);
        let ledger = MockLedger::builder().build();
        let guard = NetworkGuard::new(SEPOLIA);
        let coordinator = SubmissionCoordinator::new();

        let err = coordinator
            .submit(request(1, &id, &wallet, &ledger, &guard, None))
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::UserRejected);
        assert!(coordinator.attempt().state.is_settled());

        // Re-armed: the next attempt goes through.
        wallet.script_send(SendReply::Ok);
        assert!(
            coordinator
                .submit(request(1, &id, &wallet, &ledger, &guard, None))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn reverted_receipt_is_transport_failure() {
        let id = identity(1, SEPOLIA_ID);
        let wallet = MockWallet::new(SEPOLIA_ID);
        wallet.script_send(SendReply::Reverts);
        let ledger = MockLedger::builder().build();
        let guard = NetworkGuard::new(SEPOLIA);
        let coordinator = SubmissionCoordinator::new();

        let err = coordinator
            .submit(request(1, &id, &wallet, &ledger, &guard, None))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::TransportFailure { .. }));
    }

    #[tokio::test]
    async fn out_of_range_step_is_rejected() {
        let id = identity(1, SEPOLIA_ID);
        let wallet = MockWallet::new(SEPOLIA_ID);
        let ledger = MockLedger::builder().build();
        let guard = NetworkGuard::new(SEPOLIA);
        let coordinator = SubmissionCoordinator::new();

        let err = coordinator
            .submit(request(11, &id, &wallet, &ledger, &guard, None))
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::InvalidStep { step: 11, total: 10 });
        assert_eq!(coordinator.attempt().state, SubmissionState::Idle);
    }

    #[tokio::test]
    async fn abandoned_submission_rearms() {
        let id = identity(1, SEPOLIA_ID);
        let wallet = MockWallet::new(SEPOLIA_ID);
        wallet.script_send(SendReply::Stalls);
        let ledger = MockLedger::builder().build();
        let guard = NetworkGuard::new(SEPOLIA);
        let coordinator = SubmissionCoordinator::new();

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            coordinator.submit(request(1, &id, &wallet, &ledger, &guard, None)),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(
            coordinator.attempt(),
            SubmissionAttempt {
                step: 1,
                state: SubmissionState::Failed
            }
        );

        wallet.script_send(SendReply::Ok);
        let confirmed = coordinator
            .submit(request(1, &id, &wallet, &ledger, &guard, None))
            .await
            .unwrap();
        assert_eq!(confirmed.step, 1);
        assert_eq!(wallet.sent().len(), 2);
    }

    #[tokio::test]
    async fn second_submission_while_in_flight_is_rejected() {
        let coordinator = SubmissionCoordinator::new();
        coordinator.set_state(4, SubmissionState::AwaitingConfirmation);

        let id = identity(1, SEPOLIA_ID);
        let wallet = MockWallet::new(SEPOLIA_ID);
        let ledger = MockLedger::builder().build();
        let guard = NetworkGuard::new(SEPOLIA);

        let err = coordinator
            .submit(request(5, &id, &wallet, &ledger, &guard, None))
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::AlreadyInProgress { step: 4 });
        assert!(wallet.calls().is_empty());
        // The in-flight attempt is untouched.
        assert_eq!(coordinator.attempt().step, 4);
    }
}
