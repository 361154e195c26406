//! Network/session guard: connection state and network-switch negotiation.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProviderError;
use crate::wallet::{ChainDefinition, Network, WalletProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GuardState {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        network_ok: bool,
    },
}

/// Asks the user whether to switch networks.
#[async_trait]
pub trait SwitchPrompt: Send + Sync {
    async fn confirm_switch(&self, observed: &Network, target: &ChainDefinition) -> bool;
}

/// Answers every switch prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl SwitchPrompt for FixedAnswer {
    async fn confirm_switch(&self, _observed: &Network, _target: &ChainDefinition) -> bool {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum SwitchOutcome {
    AlreadyOnTarget,
    Switched,
    /// The user said no, either at the prompt or in the wallet.
    Declined,
    Failed(ProviderError),
}

impl SwitchOutcome {
    pub fn is_on_target(&self) -> bool {
        matches!(self, Self::AlreadyOnTarget | Self::Switched)
    }
}

fn declined_or_failed(err: ProviderError) -> SwitchOutcome {
    if err.is_user_rejection() {
        SwitchOutcome::Declined
    } else {
        SwitchOutcome::Failed(err)
    }
}

/// Tracks connection state against a required target network.
#[derive(Debug, Clone)]
pub struct NetworkGuard {
    target: ChainDefinition,
    state: GuardState,
}

impl NetworkGuard {
    pub fn new(target: ChainDefinition) -> Self {
        Self {
            target,
            state: GuardState::Disconnected,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn target(&self) -> &ChainDefinition {
        &self.target
    }

    pub fn network_ok(&self) -> bool {
        matches!(self.state, GuardState::Connected { network_ok: true })
    }

    pub fn begin_connect(&mut self) {
        self.state = GuardState::Connecting;
    }

    /// Record an authorized connection on `observed_chain`; returns whether
    /// it is the target network.
    pub fn connected(&mut self, observed_chain: u64) -> bool {
        let network_ok = observed_chain == self.target.chain_id;
        self.state = GuardState::Connected { network_ok };
        network_ok
    }

    pub fn disconnect(&mut self) {
        self.state = GuardState::Disconnected;
    }

    /// Offer to move the wallet onto the target network.
    ///
    /// An unknown-chain answer registers the chain definition and retries
    /// the switch once. Never fatal: every failure is reported as an outcome
    /// and the guard can offer again later.
    pub async fn negotiate_switch(
        &self,
        wallet: &dyn WalletProvider,
        prompt: &dyn SwitchPrompt,
        observed: &Network,
    ) -> SwitchOutcome {
        if observed.id == self.target.chain_id {
            return SwitchOutcome::AlreadyOnTarget;
        }
        if !prompt.confirm_switch(observed, &self.target).await {
            tracing::info!(observed = observed.id, "Network switch declined");
            return SwitchOutcome::Declined;
        }

        let target_id = self.target.chain_id;
        match wallet.switch_chain(target_id).await {
            Ok(()) => {
                tracing::info!(target_id, "Wallet switched network");
                SwitchOutcome::Switched
            }
            Err(err) if err.is_unrecognized_chain() => {
                tracing::info!(target_id, "Wallet does not know the network; registering it");
                if let Err(add_err) = wallet.add_chain(&self.target).await {
                    tracing::warn!("Failed to add network: {}", add_err);
                    return declined_or_failed(add_err);
                }
                match wallet.switch_chain(target_id).await {
                    Ok(()) => SwitchOutcome::Switched,
                    Err(retry_err) => {
                        tracing::warn!("Switch failed after registering network: {}", retry_err);
                        declined_or_failed(retry_err)
                    }
                }
            }
            Err(err) => {
                tracing::warn!("Failed to switch network: {}", err);
                declined_or_failed(err)
            }
        }
    }
}
