//! Presentation model derived from a [`SessionSnapshot`], plus the terminal
//! presenter used by the CLI.

use serde::Serialize;

use crate::engine::{EvidenceRef, SubmissionAttempt};
use crate::error::ErrorSurface;
use crate::ledger::{StatusVector, StepStatus};
use crate::session::{Presenter, SessionSnapshot};
use crate::types::Address;
use crate::wallet::format_ether;

/// Guidance shown next to a step that is waiting to be graded.
pub const SUBMITTED_NOTE: &str = "Your submission has been received. Be sure you've submitted your Google Form as well! It may take up to three weeks for your submission to be graded, please be patient. Also note that your submissions will not necessarily be graded in order.";

/// First 10 characters of the checksummed address followed by "...".
pub fn mask_address(address: &Address) -> String {
    let full = address.to_checksum();
    format!("{}...", &full[..10])
}

/// Two uppercase characters used as an avatar placeholder.
pub fn avatar_seed(address: &Address) -> String {
    address.to_lower_hex()[2..4].to_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
}

impl ProgressSummary {
    pub fn new(completed: u64, total: usize) -> Self {
        let completed = completed.min(total as u64) as usize;
        let percent = if total == 0 {
            0
        } else {
            (completed as f64 * 100.0 / total as f64).round() as u32
        };
        Self {
            completed,
            total,
            percent,
        }
    }

    pub fn text(&self) -> String {
        format!("{} of {} assignments complete.", self.completed, self.total)
    }
}

/// The step the user is working on: the reported position when there is
/// one in range, otherwise the first step that is not yet approved.
pub fn current_step(position: Option<u64>, vector: &StatusVector) -> Option<usize> {
    if let Some(position) = position
        && (1..=vector.len() as u64).contains(&position)
    {
        return Some(position as usize);
    }
    vector
        .as_slice()
        .iter()
        .position(|s| *s != StepStatus::Approved)
        .map(|i| i + 1)
}

/// Whether `step` may be submitted: it is pending and either the first step
/// or directly after an approved one.
pub fn can_submit(vector: &StatusVector, step: usize) -> bool {
    if vector.get(step) != Some(StepStatus::Pending) {
        return false;
    }
    step == 1 || vector.get(step - 1) == Some(StepStatus::Approved)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub text: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRow {
    pub step: usize,
    pub status: StepStatus,
    pub label: &'static str,
    pub submittable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountView {
    pub address: String,
    pub masked: String,
    pub avatar: String,
    pub network: String,
    pub network_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewModel {
    pub connected: bool,
    pub account: Option<AccountView>,
    pub badge: Option<Badge>,
    pub network_hint: Option<String>,
    pub progress: Option<ProgressSummary>,
    pub steps: Vec<StepRow>,
    pub submission: SubmissionAttempt,
    pub error: Option<ErrorSurface>,
}

impl ViewModel {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let network_ok = matches!(
            snapshot.guard,
            crate::engine::GuardState::Connected { network_ok: true }
        );
        let account = snapshot.identity.as_ref().map(|identity| AccountView {
            address: identity.account.to_checksum(),
            masked: mask_address(&identity.account),
            avatar: avatar_seed(&identity.account),
            network: identity.network.name.clone(),
            network_ok,
            balance: snapshot
                .balance_wei
                .map(|wei| format!("{} ETH", format_ether(wei))),
        });
        let network_hint = (snapshot.identity.is_some() && !network_ok)
            .then(|| format!("Switch to {} to load current step", snapshot.target.name));

        let mut badge = None;
        let mut progress = None;
        let mut steps = Vec::new();
        if let (Some(identity), Some(reconciliation)) =
            (&snapshot.identity, &snapshot.reconciliation)
        {
            let vector = &reconciliation.vector;
            let current = current_step(reconciliation.position, vector);
            badge = current.map(|step| Badge {
                text: step.to_string(),
                title: format!("Current step for {}", mask_address(&identity.account)),
            });
            let completed = reconciliation
                .completed
                .unwrap_or(vector.completed_count() as u64);
            progress = Some(ProgressSummary::new(completed, snapshot.total_steps));
            steps = vector
                .as_slice()
                .iter()
                .enumerate()
                .map(|(i, status)| {
                    let step = i + 1;
                    StepRow {
                        step,
                        status: *status,
                        label: status.label(),
                        submittable: current == Some(step) && can_submit(vector, step),
                        note: (*status == StepStatus::Submitted).then_some(SUBMITTED_NOTE),
                        evidence: (*status == StepStatus::Approved)
                            .then(|| snapshot.evidence.get(step).cloned())
                            .flatten(),
                    }
                })
                .collect();
        }

        Self {
            connected: snapshot.is_connected(),
            account,
            badge,
            network_hint,
            progress,
            steps,
            submission: snapshot.submission,
            error: snapshot.error.clone().filter(|e| e.user_visible),
        }
    }

    /// Plain-text rendering for terminals.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let Some(account) = &self.account else {
            out.push_str("Not connected.\n");
            if let Some(error) = &self.error {
                out.push_str(&format!("Error: {}\n", error.message));
            }
            return out;
        };

        out.push_str(&format!("[{}] {}\n", account.avatar, account.masked));
        out.push_str(&format!("  Address: {}\n", account.address));
        out.push_str(&format!("  Network: {}\n", account.network));
        if let Some(balance) = &account.balance {
            out.push_str(&format!("  Balance: {}\n", balance));
        }
        if let Some(hint) = &self.network_hint {
            out.push_str(&format!("\n{}\n", hint));
        }
        if let Some(badge) = &self.badge {
            out.push_str(&format!("\n{}: {}\n", badge.title, badge.text));
        }
        if let Some(progress) = &self.progress {
            out.push_str(&format!("{} ({}%)\n", progress.text(), progress.percent));
        }
        if !self.steps.is_empty() {
            out.push('\n');
        }
        for row in &self.steps {
            out.push_str(&format!("  {:>3}  {:<9}", row.step, row.label));
            if row.submittable {
                out.push_str("  ready to submit");
            }
            if let Some(evidence) = &row.evidence {
                out.push_str(&format!("  View tx: {}", evidence.url));
            }
            out.push('\n');
            if let Some(note) = row.note {
                out.push_str(&format!("       {}\n", note));
            }
        }
        if !self.submission.state.is_settled() {
            out.push_str(&format!(
                "\nSubmitting step {}: {:?}\n",
                self.submission.step, self.submission.state
            ));
        }
        if let Some(error) = &self.error {
            out.push_str(&format!("\nError: {}\n", error.message));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Prints every rendered snapshot to stdout.
#[derive(Debug, Clone, Copy)]
pub struct TerminalPresenter {
    format: OutputFormat,
}

impl TerminalPresenter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl Presenter for TerminalPresenter {
    fn render(&self, snapshot: &SessionSnapshot) {
        let view = ViewModel::from_snapshot(snapshot);
        match self.format {
            OutputFormat::Text => println!("{}", view.to_text()),
            OutputFormat::Json => match serde_json::to_string(&view) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to serialize view: {}", e),
            },
        }
    }
}
