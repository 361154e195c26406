//! Status reconciliation: turn whatever the ledger answers into a status vector.

use futures::future::join_all;
use serde::Serialize;

use crate::engine::capability::{Capability, CapabilityProfile};
use crate::error::{LedgerCallError, ReconcileError};
use crate::ledger::{LedgerInterface, StatusVector, StepStatus, Token};
use crate::types::Address;
use crate::wallet::Identity;

/// Where the vector in a [`Reconciliation`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorSource {
    PerStep,
    Aggregate,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub vector: StatusVector,
    pub source: VectorSource,
    /// Raw current position, when a position read succeeded.
    pub position: Option<u64>,
    /// Completed count after inference from the position, clamped to the
    /// step count, when either aggregate read succeeded.
    pub completed: Option<u64>,
}

#[derive(Default)]
struct ReadTally {
    attempts: usize,
    transport_failures: usize,
    last_transport: Option<String>,
}

impl ReadTally {
    fn record<T>(&mut self, result: &Result<T, LedgerCallError>) {
        self.attempts += 1;
        if let Err(e) = result
            && e.is_transport()
        {
            self.transport_failures += 1;
            self.last_transport = Some(e.to_string());
        }
    }

    fn all_transport(&self) -> bool {
        self.attempts > 0 && self.transport_failures == self.attempts
    }
}

async fn read_optional(
    ledger: &dyn LedgerInterface,
    capability: Capability,
    account: Address,
) -> Option<Result<u64, LedgerCallError>> {
    let method = capability.method()?;
    Some(ledger.read_uint(method.name(), &[Token::Address(account)]).await)
}

/// Computes status vectors for a fixed step count.
#[derive(Debug, Clone, Copy)]
pub struct StatusReconciler {
    total_steps: usize,
}

impl StatusReconciler {
    pub fn new(total_steps: usize) -> Self {
        Self { total_steps }
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Compute the raw status vector for `identity`.
    ///
    /// Per-step results win whenever at least one slot resolved; otherwise
    /// the vector is synthesized from the aggregate counters. Individual read
    /// failures never abort the pass. Fails only when every read attempt was
    /// a transport failure.
    pub async fn compute(
        &self,
        ledger: &dyn LedgerInterface,
        identity: &Identity,
        profile: &CapabilityProfile,
    ) -> Result<Reconciliation, ReconcileError> {
        if !profile.reachable {
            return Err(ReconcileError::RemoteUnavailable {
                reason: "ledger did not answer any capability probe".to_string(),
            });
        }

        let account = identity.account;
        let per_step = async {
            let Some(method) = profile.read_per_step_status.method() else {
                return Vec::new();
            };
            let queries = (1..=self.total_steps).map(|step| async move {
                ledger
                    .read_uint(
                        method.name(),
                        &[Token::Address(account), Token::Uint(step as u64)],
                    )
                    .await
            });
            join_all(queries).await
        };

        let (per_step, position, completed) = tokio::join!(
            per_step,
            read_optional(ledger, profile.read_position, account),
            read_optional(ledger, profile.read_completed_count, account),
        );

        let mut tally = ReadTally::default();
        per_step.iter().for_each(|r| tally.record(r));
        for result in [&position, &completed].into_iter().flatten() {
            tally.record(result);
        }
        if tally.all_transport() {
            return Err(ReconcileError::RemoteUnavailable {
                reason: tally
                    .last_transport
                    .unwrap_or_else(|| "all ledger reads failed".to_string()),
            });
        }

        let position = position.and_then(Result::ok);
        let completed_raw = completed.and_then(Result::ok);
        let total = self.total_steps as u64;

        // A zero completed count is indistinguishable from an unsupported
        // one, so both fall back to "everything before the current step".
        let inferred_completed = match completed_raw.unwrap_or(0) {
            0 => position.unwrap_or(0).saturating_sub(1),
            n => n,
        };
        let completed = (position.is_some() || completed_raw.is_some())
            .then(|| inferred_completed.min(total));

        let per_step_values: Vec<Option<u64>> =
            per_step.into_iter().map(Result::ok).collect();
        if per_step_values.iter().any(Option::is_some) {
            let statuses = per_step_values
                .iter()
                .map(|v| v.map(StepStatus::from_ordinal_clamped).unwrap_or_default())
                .collect();
            return Ok(Reconciliation {
                vector: StatusVector::from_statuses(statuses),
                source: VectorSource::PerStep,
                position,
                completed,
            });
        }

        if profile.read_per_step_status.is_resolved() {
            tracing::debug!(
                account = %account,
                "Every per-step status read failed; inferring from aggregates"
            );
        }
        Ok(Reconciliation {
            vector: StatusVector::from_aggregate(
                self.total_steps,
                inferred_completed,
                position.unwrap_or(0),
            ),
            source: VectorSource::Aggregate,
            position,
            completed,
        })
    }
}
