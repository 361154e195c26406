//! Session lifecycle.
//!
//! A [`Session`] owns the current identity and drives the engine passes
//! (probe, reconcile, annotate, submit) against it. Every pass is tagged with
//! the identity it started under; a result whose tag is no longer current when
//! it completes is dropped instead of applied.

mod resume;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};

use crate::engine::{
    self, ApprovalEvidence, CapabilityProfile, Confirmed, GuardState, NetworkGuard,
    Reconciliation, StatusReconciler, SubmissionAttempt, SubmissionCoordinator, SubmitRequest,
    SwitchOutcome, SwitchPrompt, TransactionHistory,
};
use crate::error::{Error, ErrorSurface, ProviderError, SubmitError};
use crate::ledger::{LedgerConnector, LedgerInterface, StatusVector};
use crate::types::Address;
use crate::wallet::{ChainDefinition, Identity, Network, ProviderEvent, WalletProvider};

pub use self::resume::{FileResumeStore, ResumeHint, ResumeHintStore, default_resume_path};

/// Input to the session event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Provider(ProviderEvent),
    Refresh,
    Shutdown,
}

/// The identity a pass started under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityTag {
    pub generation: u64,
    pub identity: Identity,
}

/// What happened to one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Applied,
    /// The identity changed while the pass was in flight; nothing applied.
    Stale,
    NotConnected,
    /// Connected on a network other than the target; nothing was read.
    WrongNetwork,
    /// The ledger did not answer at all.
    Unavailable,
}

/// Everything a presenter needs to render the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub guard: GuardState,
    pub target: Network,
    pub total_steps: usize,
    pub identity: Option<Identity>,
    pub balance_wei: Option<u128>,
    /// Carries the monotonically merged vector.
    pub reconciliation: Option<Reconciliation>,
    pub evidence: ApprovalEvidence,
    pub submission: SubmissionAttempt,
    pub error: Option<ErrorSurface>,
}

impl SessionSnapshot {
    fn empty(target: &ChainDefinition, total_steps: usize) -> Self {
        Self {
            guard: GuardState::Disconnected,
            target: Network::from_id(target.chain_id),
            total_steps,
            identity: None,
            balance_wei: None,
            reconciliation: None,
            evidence: ApprovalEvidence::empty(),
            submission: SubmissionAttempt::default(),
            error: None,
        }
    }

    pub fn vector(&self) -> Option<&StatusVector> {
        self.reconciliation.as_ref().map(|r| &r.vector)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.guard, GuardState::Connected { .. })
    }

    fn clear_status(&mut self) {
        self.balance_wei = None;
        self.reconciliation = None;
        self.evidence = ApprovalEvidence::empty();
        self.error = None;
    }
}

/// Renders snapshots. Called after every applied change.
pub trait Presenter: Send + Sync {
    fn render(&self, snapshot: &SessionSnapshot);
}

/// Mutable session state. Every field is derived from the current identity
/// and reset when it changes.
pub struct SessionContext {
    generation: u64,
    guard: NetworkGuard,
    identity: Option<Identity>,
    ledger: Option<Arc<dyn LedgerInterface>>,
    profile: Option<CapabilityProfile>,
    last_vector: Option<StatusVector>,
    snapshot: SessionSnapshot,
}

impl SessionContext {
    fn new(target: ChainDefinition, total_steps: usize) -> Self {
        Self {
            generation: 0,
            guard: NetworkGuard::new(target),
            identity: None,
            ledger: None,
            profile: None,
            last_vector: None,
            snapshot: SessionSnapshot::empty(&target, total_steps),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn guard(&self) -> &NetworkGuard {
        &self.guard
    }

    pub fn tag(&self) -> Option<IdentityTag> {
        self.identity.clone().map(|identity| IdentityTag {
            generation: self.generation,
            identity,
        })
    }

    pub fn is_current(&self, tag: &IdentityTag) -> bool {
        self.generation == tag.generation && self.identity.as_ref() == Some(&tag.identity)
    }

    /// Adopt (account, chain) as the identity. Returns whether it changed.
    ///
    /// Any change bumps the generation and drops cached status; a network
    /// change also drops the ledger handle and its capability profile.
    fn establish(&mut self, account: Address, chain_id: u64) -> bool {
        self.guard.connected(chain_id);
        let identity = Identity {
            account,
            network: Network::from_id(chain_id),
        };
        if self.identity.as_ref() == Some(&identity) {
            return false;
        }

        let network_changed = self
            .identity
            .as_ref()
            .is_none_or(|current| current.network.id != chain_id);
        if network_changed {
            self.ledger = None;
            self.profile = None;
        }
        self.generation += 1;
        self.last_vector = None;
        self.identity = Some(identity);
        self.snapshot.clear_status();
        tracing::debug!(generation = self.generation, %account, chain_id, "Identity established");
        true
    }

    fn teardown(&mut self) {
        self.generation += 1;
        self.identity = None;
        self.ledger = None;
        self.profile = None;
        self.last_vector = None;
        self.guard.disconnect();
        self.snapshot.clear_status();
    }

    fn restamp(&mut self, submission: SubmissionAttempt) {
        self.snapshot.guard = self.guard.state();
        self.snapshot.identity = self.identity.clone();
        self.snapshot.submission = submission;
    }
}

/// Collaborators a session talks to.
pub struct SessionDeps {
    pub wallet: Arc<dyn WalletProvider>,
    pub ledgers: Arc<dyn LedgerConnector>,
    pub history: Arc<dyn TransactionHistory>,
    pub resume: Arc<dyn ResumeHintStore>,
    pub presenter: Arc<dyn Presenter>,
}

/// One wallet session against one target network.
pub struct Session {
    deps: SessionDeps,
    target: ChainDefinition,
    reconciler: StatusReconciler,
    prompt: Option<Arc<dyn SwitchPrompt>>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    coordinator: SubmissionCoordinator,
    context: RwLock<SessionContext>,
}

impl Session {
    pub fn new(deps: SessionDeps, target: ChainDefinition, total_steps: usize) -> Self {
        Self {
            deps,
            target,
            reconciler: StatusReconciler::new(total_steps),
            prompt: None,
            events: None,
            coordinator: SubmissionCoordinator::new(),
            context: RwLock::new(SessionContext::new(target, total_steps)),
        }
    }

    /// Allow the session to offer network switches.
    pub fn with_prompt(mut self, prompt: Arc<dyn SwitchPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Route post-submission refreshes through the event loop.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn target(&self) -> &ChainDefinition {
        &self.target
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let mut ctx = self.context.write().await;
        ctx.restamp(self.coordinator.attempt());
        ctx.snapshot.clone()
    }

    pub async fn tag(&self) -> Option<IdentityTag> {
        self.context.read().await.tag()
    }

    async fn publish(&self, apply: impl FnOnce(&mut SessionContext)) -> SessionSnapshot {
        let snapshot = {
            let mut ctx = self.context.write().await;
            apply(&mut ctx);
            ctx.restamp(self.coordinator.attempt());
            ctx.snapshot.clone()
        };
        self.deps.presenter.render(&snapshot);
        snapshot
    }

    /// Ask the wallet for an account and start a session.
    ///
    /// When the wallet is on the wrong network and a prompt is configured,
    /// a switch is offered once; declining leaves the session connected with
    /// the network flagged.
    pub async fn connect(&self) -> Result<SessionSnapshot, Error> {
        self.context.write().await.guard.begin_connect();

        let (account, chain_id) = match self.authorize().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!("Wallet connection failed: {}", err);
                let surface = Error::from(err.clone()).to_error_surface();
                self.publish(|ctx| {
                    ctx.guard.disconnect();
                    ctx.snapshot.error = Some(surface);
                })
                .await;
                return Err(err.into());
            }
        };
        tracing::info!(%account, chain_id, "Wallet connected");

        self.adopt(account, chain_id).await;
        self.remember(account).await;
        self.offer_switch(account, chain_id).await;
        self.refresh().await;
        Ok(self.snapshot().await)
    }

    async fn authorize(&self) -> Result<(Address, u64), ProviderError> {
        let accounts = self.deps.wallet.request_accounts().await?;
        let account = accounts.first().copied().ok_or(ProviderError::NoAccount)?;
        let chain_id = self.deps.wallet.chain_id().await?;
        Ok((account, chain_id))
    }

    /// Silently restore the last session if the wallet still authorizes the
    /// remembered account. Never prompts.
    pub async fn try_resume(&self) -> Result<bool, Error> {
        let Some(hint) = self.deps.resume.load().await else {
            return Ok(false);
        };
        let accounts = self.deps.wallet.accounts().await?;
        if !accounts.contains(&hint.account) {
            tracing::info!(account = %hint.account, "Remembered account is no longer authorized");
            self.forget().await;
            return Ok(false);
        }
        let chain_id = self.deps.wallet.chain_id().await?;
        tracing::info!(account = %hint.account, chain_id, "Resuming session");

        self.adopt(hint.account, chain_id).await;
        self.refresh().await;
        Ok(true)
    }

    async fn adopt(&self, account: Address, chain_id: u64) -> bool {
        self.context.write().await.establish(account, chain_id)
    }

    async fn remember(&self, account: Address) {
        if let Err(e) = self.deps.resume.save(account).await {
            tracing::warn!("Failed to save resume hint: {}", e);
        }
    }

    async fn forget(&self) {
        if let Err(e) = self.deps.resume.clear().await {
            tracing::warn!("Failed to clear resume hint: {}", e);
        }
    }

    async fn offer_switch(&self, account: Address, chain_id: u64) {
        let Some(prompt) = self.prompt.as_deref() else {
            return;
        };
        let guard = self.context.read().await.guard.clone();
        if guard.network_ok() {
            return;
        }

        let observed = Network::from_id(chain_id);
        match guard
            .negotiate_switch(self.deps.wallet.as_ref(), prompt, &observed)
            .await
        {
            SwitchOutcome::Switched => match self.deps.wallet.chain_id().await {
                Ok(now) => {
                    self.adopt(account, now).await;
                }
                Err(e) => tracing::warn!("Could not confirm network after switch: {}", e),
            },
            SwitchOutcome::Failed(err) => {
                let surface = Error::from(err).to_error_surface();
                self.context.write().await.snapshot.error = Some(surface);
            }
            SwitchOutcome::AlreadyOnTarget | SwitchOutcome::Declined => {}
        }
    }

    /// Run one reconciliation pass for the current identity.
    pub async fn refresh(&self) -> PassOutcome {
        let (tag, ledger, profile, previous) = {
            let mut ctx = self.context.write().await;
            let Some(tag) = ctx.tag() else {
                return PassOutcome::NotConnected;
            };
            if !ctx.guard.network_ok() {
                drop(ctx);
                return self.refresh_wrong_network(tag).await;
            }
            let chain_id = tag.identity.network.id;
            let ledger = ctx
                .ledger
                .get_or_insert_with(|| self.deps.ledgers.connect(chain_id))
                .clone();
            (tag, ledger, ctx.profile, ctx.last_vector.clone())
        };

        let profile = match profile {
            Some(profile) => profile,
            None => {
                let profile = engine::resolve(ledger.as_ref(), tag.identity.account).await;
                let mut ctx = self.context.write().await;
                if ctx.is_current(&tag) {
                    ctx.profile = Some(profile);
                }
                profile
            }
        };

        let (computed, balance) = tokio::join!(
            self.reconciler
                .compute(ledger.as_ref(), &tag.identity, &profile),
            self.deps.wallet.balance(tag.identity.account),
        );
        let balance = balance
            .inspect_err(|e| tracing::debug!("Balance unavailable: {}", e))
            .ok();

        let reconciliation = match computed {
            Ok(reconciliation) => reconciliation,
            Err(err) => {
                tracing::warn!(chain_id = tag.identity.network.id, "{}", err);
                let surface = Error::from(err).to_error_surface();
                let mut stale = false;
                self.publish(|ctx| {
                    if !ctx.is_current(&tag) {
                        stale = true;
                        return;
                    }
                    // Rebuild the handle and re-probe on the next pass.
                    ctx.ledger = None;
                    ctx.profile = None;
                    ctx.snapshot.balance_wei = balance;
                    ctx.snapshot.reconciliation = None;
                    ctx.snapshot.evidence = ApprovalEvidence::empty();
                    ctx.snapshot.error = Some(surface);
                })
                .await;
                return if stale {
                    PassOutcome::Stale
                } else {
                    PassOutcome::Unavailable
                };
            }
        };

        let preview = match &previous {
            Some(prev) => reconciliation.vector.merge_monotonic(prev),
            None => reconciliation.vector.clone(),
        };
        let evidence = engine::annotate(
            self.deps.history.as_ref(),
            &preview,
            &tag.identity,
            ledger.as_ref(),
        )
        .await;

        let snapshot = {
            let mut ctx = self.context.write().await;
            if !ctx.is_current(&tag) {
                tracing::debug!(
                    generation = tag.generation,
                    current = ctx.generation,
                    "Dropping stale reconciliation pass"
                );
                return PassOutcome::Stale;
            }
            let vector = match &ctx.last_vector {
                Some(prev) => reconciliation.vector.merge_monotonic(prev),
                None => reconciliation.vector.clone(),
            };
            ctx.last_vector = Some(vector.clone());
            ctx.snapshot.balance_wei = balance;
            ctx.snapshot.reconciliation = Some(Reconciliation {
                vector,
                ..reconciliation
            });
            ctx.snapshot.evidence = evidence;
            ctx.snapshot.error = None;
            ctx.restamp(self.coordinator.attempt());
            ctx.snapshot.clone()
        };
        self.deps.presenter.render(&snapshot);
        PassOutcome::Applied
    }

    async fn refresh_wrong_network(&self, tag: IdentityTag) -> PassOutcome {
        let balance = self
            .deps
            .wallet
            .balance(tag.identity.account)
            .await
            .inspect_err(|e| tracing::debug!("Balance unavailable: {}", e))
            .ok();
        let mut stale = false;
        self.publish(|ctx| {
            if !ctx.is_current(&tag) {
                stale = true;
                return;
            }
            ctx.snapshot.balance_wei = balance;
            ctx.snapshot.reconciliation = None;
            ctx.snapshot.evidence = ApprovalEvidence::empty();
        })
        .await;
        if stale {
            PassOutcome::Stale
        } else {
            PassOutcome::WrongNetwork
        }
    }

    /// React to one event.
    pub async fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Refresh => {
                self.refresh().await;
            }
            SessionEvent::Shutdown => {}
            SessionEvent::Provider(ProviderEvent::AccountsChanged(accounts)) => {
                let Some(&account) = accounts.first() else {
                    tracing::info!("Wallet revoked all accounts");
                    self.end(true).await;
                    return;
                };
                let current = self.context.read().await.identity.clone();
                let chain_id = match current {
                    Some(current) => current.network.id,
                    // Accounts came back after the provider dropped out.
                    None => match self.deps.wallet.chain_id().await {
                        Ok(chain_id) => chain_id,
                        Err(e) => {
                            tracing::warn!("Cannot re-establish session: {}", e);
                            return;
                        }
                    },
                };
                if self.adopt(account, chain_id).await {
                    tracing::info!(%account, chain_id, "Account changed");
                    self.remember(account).await;
                }
                self.refresh().await;
            }
            SessionEvent::Provider(ProviderEvent::ChainChanged(chain_id)) => {
                let current = self.context.read().await.identity.clone();
                let Some(current) = current else {
                    return;
                };
                if self.adopt(current.account, chain_id).await {
                    tracing::info!(chain_id, "Network changed");
                }
                self.refresh().await;
            }
            SessionEvent::Provider(ProviderEvent::Disconnected) => {
                tracing::info!("Wallet provider disconnected");
                self.end(false).await;
            }
        }
    }

    async fn end(&self, forget: bool) {
        self.publish(|ctx| ctx.teardown()).await;
        if forget {
            self.forget().await;
        }
    }

    /// End the session and drop the resume hint.
    pub async fn disconnect(&self) {
        tracing::info!("Disconnecting session");
        self.end(true).await;
    }

    /// Submit one step through the coordinator.
    ///
    /// A confirmed submission triggers a refresh: through the event loop
    /// when one is attached, inline otherwise.
    pub async fn submit(&self, step: usize) -> Result<Confirmed, Error> {
        let (identity, guard, ledger) = {
            let ctx = self.context.read().await;
            let Some(identity) = ctx.identity.clone() else {
                return Err(SubmitError::NotConnected.into());
            };
            let ledger = match &ctx.ledger {
                Some(ledger) if identity.network.id == self.target.chain_id => ledger.clone(),
                _ => self.deps.ledgers.connect(self.target.chain_id),
            };
            (identity, ctx.guard.clone(), ledger)
        };

        let request = SubmitRequest {
            step,
            total_steps: self.reconciler.total_steps(),
            identity: &identity,
            wallet: self.deps.wallet.as_ref(),
            ledger: ledger.as_ref(),
            guard: &guard,
            prompt: self.prompt.as_deref(),
        };
        let result = self.coordinator.submit(request).await;

        if identity.network.id != self.target.chain_id {
            self.follow_switch(&identity, &result).await;
        }

        match result {
            Ok(confirmed) => {
                self.publish(|ctx| ctx.snapshot.error = None).await;
                self.request_refresh().await;
                Ok(confirmed)
            }
            Err(err) => {
                let err = Error::from(err);
                let surface = err.to_error_surface();
                self.publish(|ctx| ctx.snapshot.error = Some(surface)).await;
                Err(err)
            }
        }
    }

    /// Adopt the network a submission left the wallet on. Only outcomes
    /// reached past a negotiated switch touch the provider.
    async fn follow_switch(&self, identity: &Identity, result: &Result<Confirmed, SubmitError>) {
        let now = match result {
            Err(SubmitError::NetworkMismatch { observed, .. }) => {
                if *observed == identity.network.id {
                    return;
                }
                *observed
            }
            Ok(_)
            | Err(SubmitError::UserRejected)
            | Err(SubmitError::TransportFailure { .. })
            | Err(SubmitError::UnsupportedOperation { .. }) => {
                match self.deps.wallet.chain_id().await {
                    Ok(now) => now,
                    Err(e) => {
                        tracing::warn!("Could not confirm network after switch: {}", e);
                        return;
                    }
                }
            }
            Err(_) => return,
        };
        if now != identity.network.id {
            self.adopt(identity.account, now).await;
        }
    }

    async fn request_refresh(&self) {
        if let Some(events) = &self.events
            && events.send(SessionEvent::Refresh).is_ok()
        {
            return;
        }
        self.refresh().await;
    }

    /// Process events until `Shutdown` or until every sender is gone.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if event == SessionEvent::Shutdown {
                break;
            }
            self.handle_event(event).await;
        }
        tracing::debug!("Session event loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::SEPOLIA;

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    #[test]
    fn establishing_a_new_identity_bumps_the_generation() {
        let mut ctx = SessionContext::new(SEPOLIA, 10);
        assert!(ctx.tag().is_none());

        assert!(ctx.establish(addr(1), 11_155_111));
        let first = ctx.tag().unwrap();
        assert!(ctx.is_current(&first));
        assert!(ctx.guard().network_ok());

        // Same identity again is not a change.
        assert!(!ctx.establish(addr(1), 11_155_111));
        assert!(ctx.is_current(&first));

        assert!(ctx.establish(addr(2), 11_155_111));
        assert!(!ctx.is_current(&first));
        assert_eq!(ctx.generation(), 2);
    }

    #[test]
    fn account_change_clears_status_and_network_change_clears_profile() {
        let mut ctx = SessionContext::new(SEPOLIA, 3);
        ctx.establish(addr(1), 11_155_111);
        ctx.profile = Some(CapabilityProfile {
            read_position: engine::Capability::Unresolved,
            read_completed_count: engine::Capability::Unresolved,
            read_per_step_status: engine::Capability::Unresolved,
            reachable: true,
        });
        ctx.last_vector = Some(StatusVector::pending(3));

        ctx.establish(addr(2), 11_155_111);
        assert!(ctx.last_vector.is_none());
        assert!(ctx.profile.is_some());

        ctx.establish(addr(2), 1);
        assert!(ctx.profile.is_none());
        assert!(!ctx.guard().network_ok());
    }

    #[test]
    fn teardown_invalidates_in_flight_tags() {
        let mut ctx = SessionContext::new(SEPOLIA, 10);
        ctx.establish(addr(1), 11_155_111);
        let tag = ctx.tag().unwrap();

        ctx.teardown();
        assert!(!ctx.is_current(&tag));
        assert_eq!(ctx.guard().state(), GuardState::Disconnected);

        // Reconnecting as the same identity still does not revive the old tag.
        ctx.establish(addr(1), 11_155_111);
        assert!(!ctx.is_current(&tag));
    }
}
