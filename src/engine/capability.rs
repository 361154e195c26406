//! Capability probing: which read methods a ledger deployment actually answers.

use serde::Serialize;

use crate::ledger::abi::{COMPLETED_CANDIDATES, PER_STEP_CANDIDATES, POSITION_CANDIDATES};
use crate::ledger::{LedgerInterface, MethodRef, Token};
use crate::types::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "state", content = "method", rename_all = "snake_case")]
pub enum Capability {
    Resolved(MethodRef),
    Unresolved,
}

impl Capability {
    pub fn method(&self) -> Option<MethodRef> {
        match self {
            Self::Resolved(method) => Some(*method),
            Self::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Resolved read surface of one ledger interface handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapabilityProfile {
    pub read_position: Capability,
    pub read_completed_count: Capability,
    pub read_per_step_status: Capability,
    /// False when every probe that was attempted failed at the transport
    /// level, meaning unresolved slots say nothing about the ledger itself.
    pub reachable: bool,
}

impl CapabilityProfile {
    pub fn has_aggregate(&self) -> bool {
        self.read_position.is_resolved() || self.read_completed_count.is_resolved()
    }
}

#[derive(Debug, Default)]
struct ProbeOutcome {
    capability: Option<MethodRef>,
    attempts: usize,
    transport_failures: usize,
}

async fn probe_operation(
    ledger: &dyn LedgerInterface,
    candidates: &[&'static str],
    args: &[Token],
) -> ProbeOutcome {
    let mut outcome = ProbeOutcome::default();
    for name in candidates {
        if !ledger.describes(name) {
            continue;
        }
        outcome.attempts += 1;
        match ledger.read_uint(name, args).await {
            Ok(_) => {
                outcome.capability = Some(MethodRef::new(name));
                return outcome;
            }
            Err(e) => {
                if e.is_transport() {
                    outcome.transport_failures += 1;
                }
                tracing::debug!(method = *name, "Capability probe failed: {}", e);
            }
        }
    }
    outcome
}

fn into_capability(outcome: &ProbeOutcome, operation: &str) -> Capability {
    match outcome.capability {
        Some(method) => Capability::Resolved(method),
        None => {
            tracing::debug!(operation, "No candidate resolved; using fallback");
            Capability::Unresolved
        }
    }
}

/// Probe the ranked candidates for each read operation against a live ledger.
///
/// Operations are probed concurrently; candidates within one operation are
/// tried in priority order and the first success wins. Never fails.
pub async fn resolve(ledger: &dyn LedgerInterface, probe_account: Address) -> CapabilityProfile {
    let account_arg = [Token::Address(probe_account)];
    let per_step_args = [Token::Address(probe_account), Token::Uint(1)];

    let (position, completed, per_step) = tokio::join!(
        probe_operation(ledger, &POSITION_CANDIDATES, &account_arg),
        probe_operation(ledger, &COMPLETED_CANDIDATES, &account_arg),
        probe_operation(ledger, &PER_STEP_CANDIDATES, &per_step_args),
    );

    let outcomes = [&position, &completed, &per_step];
    let attempts: usize = outcomes.iter().map(|o| o.attempts).sum();
    let transport_failures: usize = outcomes.iter().map(|o| o.transport_failures).sum();
    let reachable = attempts == 0 || transport_failures < attempts;

    let profile = CapabilityProfile {
        read_position: into_capability(&position, "read_position"),
        read_completed_count: into_capability(&completed, "read_completed_count"),
        read_per_step_status: into_capability(&per_step, "read_per_step_status"),
        reachable,
    };
    tracing::info!(
        ledger = %ledger.address(),
        position = ?profile.read_position.method().map(|m| m.name()),
        completed = ?profile.read_completed_count.method().map(|m| m.name()),
        per_step = ?profile.read_per_step_status.method().map(|m| m.name()),
        reachable,
        "Resolved ledger capabilities"
    );
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mocks::MockLedger;

    fn account() -> Address {
        Address([7; 20])
    }

    #[tokio::test]
    async fn prefers_get_form_over_bare_form() {
        let ledger = MockLedger::builder()
            .read("getCurrentStep", 3)
            .read("currentStep", 9)
            .build();
        let profile = resolve(&ledger, account()).await;
        assert_eq!(profile.read_position, Capability::Resolved(MethodRef::new("getCurrentStep")));
    }

    #[tokio::test]
    async fn falls_back_to_bare_form_when_get_form_reverts() {
        let ledger = MockLedger::builder()
            .revert("getCurrentStep")
            .read("currentStep", 2)
            .revert("getCompletedSteps")
            .revert("completedSteps")
            .build();
        let profile = resolve(&ledger, account()).await;

        assert_eq!(profile.read_position, Capability::Resolved(MethodRef::new("currentStep")));
        assert_eq!(profile.read_completed_count, Capability::Unresolved);
        assert_eq!(profile.read_per_step_status, Capability::Unresolved);
        assert!(profile.reachable);
    }

    #[tokio::test]
    async fn all_transport_failures_mark_unreachable() {
        let ledger = MockLedger::builder().offline().build();
        let profile = resolve(&ledger, account()).await;

        assert!(!profile.reachable);
        assert!(!profile.has_aggregate());
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let ledger = MockLedger::builder()
            .read("completedSteps", 4)
            .per_step(vec![Some(2), Some(1), None])
            .build();
        let first = resolve(&ledger, account()).await;
        let second = resolve(&ledger, account()).await;
        assert_eq!(first, second);
    }
}
