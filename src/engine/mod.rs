//! Reconciliation engine: capability probing, status reconciliation, the
//! network guard, the submission write path and approval evidence.

pub mod capability;
pub mod evidence;
pub mod guard;
pub mod reconciler;
pub mod submission;

#[cfg(test)]
pub(crate) mod mocks;

pub use self::capability::{Capability, CapabilityProfile, resolve};
pub use self::evidence::{
    ApprovalEvidence, EvidenceRef, IndexedTransaction, TransactionHistory, annotate,
};
pub use self::guard::{FixedAnswer, GuardState, NetworkGuard, SwitchOutcome, SwitchPrompt};
pub use self::reconciler::{Reconciliation, StatusReconciler, VectorSource};
pub use self::submission::{
    Confirmed, SubmissionAttempt, SubmissionCoordinator, SubmissionState, SubmitRequest,
};
