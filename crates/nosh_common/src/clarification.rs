//! Pending clarification record and lifecycle state machine.
//!
//! A user has at most one pending clarification at a time. The lifecycle is
//! an explicit state machine rather than a "has pending" flag: `None` and
//! `Pending` are the resting states, and every way out of `Pending`
//! (resolved, expired, cancelled) collapses straight back to `None` once
//! the record is removed from the store.

use crate::analysis::{AnalysisResult, UncertaintyAssessment};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A stored, time-bounded request awaiting the user's follow-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingClarification {
    pub user_id: i64,
    /// The uncertain analysis we are waiting to improve (source = Initial).
    pub original_analysis: AnalysisResult,
    /// Copy of the original uncertainty, kept for prompt construction.
    pub uncertainty: UncertaintyAssessment,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingClarification {
    pub fn new(user_id: i64, original_analysis: AnalysisResult, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let uncertainty = original_analysis.uncertainty.clone();
        Self {
            user_id,
            original_analysis,
            uncertainty,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// Single expiry test shared by lazy eviction and the eager sweep.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Time left before expiry, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Resting state of a user's clarification lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationState {
    None,
    Pending,
}

/// Terminal outcome of a pending clarification. Each one is transient: the
/// record is removed and the state returns to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationOutcome {
    Resolved,
    Expired,
    Cancelled,
}

/// Events that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarificationEvent {
    UncertainInitial,
    ConfidentInitial,
    ClarificationReply,
    Expiry,
    Cancel,
}

/// Result of applying an event to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to a new resting state (record created or nothing to do).
    Stay(ClarificationState),
    /// Leave `Pending` with the given outcome; the record is removed and
    /// the resting state is `None` again.
    Finish(ClarificationOutcome),
    /// The event does not apply in this state.
    Invalid,
}

/// The lifecycle transition table from the design. Pure: callers perform
/// the store mutations the transition implies.
pub fn transition(state: ClarificationState, event: ClarificationEvent) -> Transition {
    use ClarificationEvent::*;
    use ClarificationState::*;

    match (state, event) {
        (None, UncertainInitial) => Transition::Stay(Pending),
        (None, ConfidentInitial) => Transition::Stay(None),
        (None, Cancel) => Transition::Stay(None),
        (Pending, ClarificationReply) => Transition::Finish(ClarificationOutcome::Resolved),
        (Pending, Expiry) => Transition::Finish(ClarificationOutcome::Expired),
        (Pending, Cancel) => Transition::Finish(ClarificationOutcome::Cancelled),
        // A new analysis while pending is router policy, not an automatic
        // transition.
        (Pending, UncertainInitial) | (Pending, ConfidentInitial) => Transition::Invalid,
        (None, ClarificationReply) | (None, Expiry) => Transition::Invalid,
    }
}

/// Read-only report for the `status` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusReport {
    None,
    Pending {
        uncertain_items: Vec<String>,
        /// Whole seconds until expiry.
        expires_in_secs: i64,
    },
}

/// Report for the `cancel` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReport {
    Cancelled,
    NothingToCancel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisPayload, AnalysisResult};

    fn sample_pending(ttl_hours: i64) -> PendingClarification {
        let analysis = AnalysisResult::initial(
            AnalysisPayload::default(),
            UncertaintyAssessment::uncertain(vec!["soup".into()], vec![], 0.5),
        );
        PendingClarification::new(7, analysis, Duration::hours(ttl_hours))
    }

    #[test]
    fn test_expiry_is_monotonic_around_deadline() {
        let pending = sample_pending(24);
        let just_before = pending.expires_at - Duration::seconds(1);
        let at_deadline = pending.expires_at;
        let after = pending.expires_at + Duration::seconds(1);

        assert!(!pending.is_expired_at(just_before));
        assert!(pending.is_expired_at(at_deadline));
        assert!(pending.is_expired_at(after));
    }

    #[test]
    fn test_record_copies_uncertainty() {
        let pending = sample_pending(24);
        assert_eq!(pending.uncertainty, pending.original_analysis.uncertainty);
        assert_eq!(pending.uncertainty.uncertain_items, vec!["soup"]);
    }

    #[test]
    fn test_remaining_clamps_at_zero() {
        let pending = sample_pending(24);
        let late = pending.expires_at + Duration::hours(2);
        assert_eq!(pending.remaining(late), Duration::zero());
    }

    #[test]
    fn test_transitions_match_table() {
        use ClarificationEvent::*;
        use ClarificationState::*;

        assert_eq!(
            transition(None, UncertainInitial),
            Transition::Stay(Pending)
        );
        assert_eq!(transition(None, ConfidentInitial), Transition::Stay(None));
        assert_eq!(
            transition(Pending, ClarificationReply),
            Transition::Finish(ClarificationOutcome::Resolved)
        );
        assert_eq!(
            transition(Pending, Expiry),
            Transition::Finish(ClarificationOutcome::Expired)
        );
        assert_eq!(
            transition(Pending, Cancel),
            Transition::Finish(ClarificationOutcome::Cancelled)
        );
        // Cancel with nothing pending is a no-op, not an error.
        assert_eq!(transition(None, Cancel), Transition::Stay(None));
        assert_eq!(transition(None, Expiry), Transition::Invalid);
    }
}
