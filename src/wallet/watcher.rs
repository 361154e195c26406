//! Turns a polled provider into a stream of change notifications.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ProviderError;
use crate::session::SessionEvent;
use crate::types::Address;
use crate::wallet::{ProviderEvent, WalletProvider};

/// Last observed provider state, diffed against each new observation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchState {
    accounts: Option<Vec<Address>>,
    chain_id: Option<u64>,
    disconnected: bool,
}

impl WatchState {
    /// Seed with what the session already knows so the first poll only
    /// reports real changes.
    pub fn seeded(accounts: Vec<Address>, chain_id: u64) -> Self {
        Self {
            accounts: Some(accounts),
            chain_id: Some(chain_id),
            disconnected: false,
        }
    }

    pub fn observe(
        &mut self,
        observation: Result<(Vec<Address>, u64), ProviderError>,
    ) -> Vec<ProviderEvent> {
        let mut events = Vec::new();
        match observation {
            Ok((accounts, chain_id)) => {
                let recovered = std::mem::take(&mut self.disconnected);
                if recovered || self.accounts.as_ref().is_some_and(|a| *a != accounts) {
                    events.push(ProviderEvent::AccountsChanged(accounts.clone()));
                }
                if !recovered && self.chain_id.is_some_and(|c| c != chain_id) {
                    events.push(ProviderEvent::ChainChanged(chain_id));
                }
                self.accounts = Some(accounts);
                self.chain_id = Some(chain_id);
            }
            Err(e) if e.is_transport() => {
                if !self.disconnected {
                    tracing::warn!("Wallet provider unreachable: {}", e);
                    self.disconnected = true;
                    events.push(ProviderEvent::Disconnected);
                }
            }
            Err(e) => {
                tracing::debug!("Ignoring provider poll error: {}", e);
            }
        }
        events
    }
}

/// Polls accounts and network and forwards changes to the session loop.
pub struct ProviderWatcher {
    provider: Arc<dyn WalletProvider>,
    interval: Duration,
    state: WatchState,
}

impl ProviderWatcher {
    pub fn new(provider: Arc<dyn WalletProvider>, interval: Duration, state: WatchState) -> Self {
        Self {
            provider,
            interval,
            state,
        }
    }

    async fn poll(&self) -> Result<(Vec<Address>, u64), ProviderError> {
        let (accounts, chain_id) =
            tokio::join!(self.provider.accounts(), self.provider.chain_id());
        Ok((accounts?, chain_id?))
    }

    /// Run until the session side of the channel is dropped.
    pub fn spawn(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let observation = self.poll().await;
                for event in self.state.observe(observation) {
                    tracing::debug!(?event, "Provider change detected");
                    if events.send(SessionEvent::Provider(event)).is_err() {
                        return;
                    }
                }
            }
        })
    }
}
