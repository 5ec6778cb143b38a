//! Scripted server-side copies.

use bytes::Bytes;
use jiff::Timestamp;
use nimbus_core::copy::{CopyOperationState, CopyStatus};
use url::Url;

/// How copies accepted by the mock service progress.
///
/// Each attribute fetch of the destination counts as one poll. Once
/// `polls_until_terminal` polls have been observed, the copy switches to
/// `outcome`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCopyPlan {
    /// `None` keeps the copy pending forever.
    pub polls_until_terminal: Option<u32>,
    pub outcome: CopyStatus,
    /// Overrides the reported total size; defaults to the source length.
    pub total_bytes: Option<u64>,
    pub description: Option<String>,
}

impl Default for MockCopyPlan {
    fn default() -> Self {
        Self::succeed_after(1)
    }
}

impl MockCopyPlan {
    pub fn succeed_after(polls: u32) -> Self {
        Self {
            polls_until_terminal: Some(polls),
            outcome: CopyStatus::Success,
            total_bytes: None,
            description: None,
        }
    }

    pub fn fail_after(polls: u32, description: impl Into<String>) -> Self {
        Self {
            polls_until_terminal: Some(polls),
            outcome: CopyStatus::Failed,
            total_bytes: None,
            description: Some(description.into()),
        }
    }

    pub fn abort_after(polls: u32, description: impl Into<String>) -> Self {
        Self {
            outcome: CopyStatus::Aborted,
            ..Self::fail_after(polls, description)
        }
    }

    pub fn never_finish() -> Self {
        Self {
            polls_until_terminal: None,
            outcome: CopyStatus::Pending,
            total_bytes: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_total_bytes(mut self, total_bytes: u64) -> Self {
        self.total_bytes = Some(total_bytes);
        self
    }
}

/// A copy in flight on a destination blob.
#[derive(Debug, Clone)]
pub(crate) struct TrackedCopy {
    pub state: CopyOperationState,
    plan: MockCopyPlan,
    payload: Bytes,
    polls: u32,
}

impl TrackedCopy {
    pub fn start(source: Url, payload: Bytes, plan: MockCopyPlan) -> Self {
        let mut state = CopyOperationState::pending(new_copy_id());
        state.source = Some(source);
        state.bytes_copied = Some(0);
        state.total_bytes = Some(plan.total_bytes.unwrap_or(payload.len() as u64));

        Self {
            state,
            plan,
            payload,
            polls: 0,
        }
    }

    /// Replaces the copy with a fresh one from the same source.
    pub fn supersede(&mut self) {
        self.state.copy_id = new_copy_id();
        self.state.status = CopyStatus::Pending;
        self.state.bytes_copied = Some(0);
        self.state.completion_time = None;
        self.state.status_description = None;
        self.polls = 0;
    }

    /// Records one poll. Returns the copied payload when the copy has just
    /// completed successfully.
    pub fn advance(&mut self, now: Timestamp) -> Option<Bytes> {
        if self.state.is_terminal() {
            return None;
        }

        self.polls += 1;
        let target = self.plan.polls_until_terminal?;

        let total = self.state.total_bytes.unwrap_or_default();
        if self.polls < target {
            self.state.bytes_copied = Some(total * u64::from(self.polls) / u64::from(target));
            return None;
        }

        self.state.status = self.plan.outcome;
        self.state.completion_time = Some(now);
        self.state.status_description = self.plan.description.clone();
        match self.plan.outcome {
            CopyStatus::Success => {
                self.state.bytes_copied = Some(total);
                Some(self.payload.clone())
            }
            _ => None,
        }
    }
}

fn new_copy_id() -> String {
    uuid::Uuid::new_v4().hyphenated().to_string()
}
