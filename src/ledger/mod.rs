//! The remote step ledger: status model, interface description and access.

pub mod abi;
mod interface;
mod rpc;

use serde::Serialize;

pub use self::abi::{AbiType, FunctionSignature, LedgerAbi, Token};
pub use self::interface::{ContractInfo, LedgerConnector, LedgerInterface, MethodRef};
pub use self::rpc::{RpcLedger, RpcLedgerConnector};

/// Step count used when nothing else is configured.
pub const DEFAULT_TOTAL_STEPS: usize = 10;

/// Lifecycle of a single ledger step. Ordered `Pending < Submitted < Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Submitted,
    Approved,
}

impl StepStatus {
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Submitted => 1,
            Self::Approved => 2,
        }
    }

    /// Map a raw ledger value into the status range, clamping anything above 2.
    pub fn from_ordinal_clamped(raw: u64) -> Self {
        match raw {
            0 => Self::Pending,
            1 => Self::Submitted,
            _ => Self::Approved,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Submitted => "Submitted",
            Self::Approved => "Approved",
        }
    }
}

/// One status per step, index `i` holding ledger step `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatusVector(Vec<StepStatus>);

impl StatusVector {
    pub fn pending(total: usize) -> Self {
        Self(vec![StepStatus::Pending; total])
    }

    pub fn from_statuses(statuses: Vec<StepStatus>) -> Self {
        Self(statuses)
    }

    /// Synthesize a vector from aggregate counters.
    ///
    /// Both counters are clamped to `[0, total]`. Steps numbered up to
    /// `completed` are approved; the step at `position` is submitted unless
    /// it is already covered by `completed`.
    pub fn from_aggregate(total: usize, completed: u64, position: u64) -> Self {
        let completed = completed.min(total as u64) as usize;
        let position = position.min(total as u64) as usize;

        let statuses = (1..=total)
            .map(|step| {
                if step <= completed {
                    StepStatus::Approved
                } else if step == position {
                    StepStatus::Submitted
                } else {
                    StepStatus::Pending
                }
            })
            .collect();
        Self(statuses)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Status of a 1-based step.
    pub fn get(&self, step: usize) -> Option<StepStatus> {
        step.checked_sub(1).and_then(|i| self.0.get(i).copied())
    }

    pub fn as_slice(&self) -> &[StepStatus] {
        &self.0
    }

    /// 1-based numbers of every approved step.
    pub fn approved_steps(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == StepStatus::Approved)
            .map(|(i, _)| i + 1)
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.0.iter().filter(|s| **s == StepStatus::Approved).count()
    }

    /// Element-wise maximum against an earlier observation for the same
    /// account, so no step ever moves backward within one session.
    pub fn merge_monotonic(&self, previous: &StatusVector) -> StatusVector {
        let merged = self
            .0
            .iter()
            .enumerate()
            .map(|(i, current)| match previous.0.get(i) {
                Some(prev) => (*current).max(*prev),
                None => *current,
            })
            .collect();
        StatusVector(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use StepStatus::{Approved as A, Pending as P, Submitted as S};

    #[test]
    fn aggregate_vector_for_typical_progress() {
        let v = StatusVector::from_aggregate(10, 4, 5);
        assert_eq!(v.as_slice(), &[A, A, A, A, S, P, P, P, P, P]);
    }

    #[test]
    fn aggregate_counters_are_clamped() {
        let v = StatusVector::from_aggregate(3, 99, 200);
        assert_eq!(v.as_slice(), &[A, A, A]);

        let v = StatusVector::from_aggregate(3, 0, 7);
        assert_eq!(v.as_slice(), &[P, P, S]);
    }

    #[test]
    fn aggregate_position_inside_completed_stays_approved() {
        let v = StatusVector::from_aggregate(5, 3, 2);
        assert_eq!(v.as_slice(), &[A, A, A, P, P]);
    }

    #[test]
    fn aggregate_property_over_full_range() {
        let n = 6usize;
        for c in 0..=n as u64 {
            for p in 0..=n as u64 {
                let v = StatusVector::from_aggregate(n, c, p);
                for (i, status) in v.as_slice().iter().enumerate() {
                    let expected = if (i as u64) < c {
                        A
                    } else if p >= 1 && i as u64 == p - 1 {
                        S
                    } else {
                        P
                    };
                    assert_eq!(*status, expected, "c={c} p={p} i={i}");
                }
            }
        }
    }

    #[test]
    fn ordinal_clamping() {
        assert_eq!(StepStatus::from_ordinal_clamped(0), P);
        assert_eq!(StepStatus::from_ordinal_clamped(1), S);
        assert_eq!(StepStatus::from_ordinal_clamped(2), A);
        assert_eq!(StepStatus::from_ordinal_clamped(250), A);
        assert!(P < S && S < A);
    }

    #[test]
    fn merge_never_regresses() {
        let previous = StatusVector::from_statuses(vec![A, S, P]);
        let current = StatusVector::from_statuses(vec![P, A, P]);
        assert_eq!(current.merge_monotonic(&previous).as_slice(), &[A, A, P]);
    }

    #[test]
    fn one_based_lookup() {
        let v = StatusVector::from_statuses(vec![A, S]);
        assert_eq!(v.get(0), None);
        assert_eq!(v.get(1), Some(A));
        assert_eq!(v.get(2), Some(S));
        assert_eq!(v.get(3), None);
        assert_eq!(v.approved_steps(), vec![1]);
    }
}
