//! Message handlers: the surface the chat transport drives.
//!
//! Handlers for different users run concurrently; handlers for the same
//! user are serialized with a per-user lock held across the whole
//! route-analyze-persist sequence. That closes the race where two
//! near-simultaneous messages from one user both read "no pending record"
//! and both create one.

use crate::analyzer::FoodAnalyzer;
use crate::merge::merge;
use crate::router::{needs_clarification, route, RouteDecision};
use crate::store::ClarificationStore;
use chrono::Utc;
use nosh_common::clarification::{
    transition, CancelReport, ClarificationEvent, ClarificationOutcome, ClarificationState,
    StatusReport, Transition,
};
use nosh_common::ipc::IncomingMessage;
use nosh_common::{
    AnalysisResult, ClarificationConfig, NoshError, PendingClarification, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const RETRY_MESSAGE: &str =
    "Sorry, I could not analyze that right now. Please try again in a moment.";
const SAVE_FAILED_MESSAGE: &str =
    "Sorry, I could not save your entry just now. Please resend it in a moment.";
const EXPIRED_NOTICE: &str =
    "Your clarification window expired, so I analyzed this as a new entry.\n\n";

pub struct Handlers {
    store: Arc<ClarificationStore>,
    analyzer: Arc<dyn FoodAnalyzer>,
    config: ClarificationConfig,
    user_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl Handlers {
    pub fn new(
        store: Arc<ClarificationStore>,
        analyzer: Arc<dyn FoodAnalyzer>,
        config: ClarificationConfig,
    ) -> Self {
        Self {
            store,
            analyzer,
            config,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// One lock per user, created on first contact.
    async fn user_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Handle one inbound food message and produce the outbound text.
    pub async fn handle_incoming(&self, user_id: i64, message: &IncomingMessage) -> String {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let decision = match route(&self.store, user_id).await {
            Ok(decision) => decision,
            Err(e) => {
                error!("Routing failed for user {}: {}", user_id, e);
                return RETRY_MESSAGE.to_string();
            }
        };

        match decision {
            RouteDecision::TreatAsInitial { expired_notice } => {
                let reply = self.run_initial(user_id, message).await;
                if expired_notice {
                    format!("{}{}", EXPIRED_NOTICE, reply)
                } else {
                    reply
                }
            }
            RouteDecision::TreatAsClarification(pending) => {
                self.run_clarification(user_id, message, pending).await
            }
            RouteDecision::Rejected(reason) => {
                warn!("Rejected message from user {}: {}", user_id, reason);
                reason
            }
        }
    }

    /// Fresh analysis path: confident results are confirmed outright,
    /// uncertain ones open a pending clarification.
    async fn run_initial(&self, user_id: i64, message: &IncomingMessage) -> String {
        let analysis = match self.analyzer.analyze(message, None).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Initial analysis failed for user {}: {}", user_id, e);
                return RETRY_MESSAGE.to_string();
            }
        };

        let event = if needs_clarification(&analysis.uncertainty, self.config.trust_threshold) {
            ClarificationEvent::UncertainInitial
        } else {
            ClarificationEvent::ConfidentInitial
        };

        match transition(ClarificationState::None, event) {
            Transition::Stay(ClarificationState::Pending) => {
                self.open_pending(user_id, analysis).await
            }
            Transition::Stay(ClarificationState::None) => confirmation_text(&analysis),
            _ => {
                // The table has no other outcome for the None state.
                error!("Unexpected lifecycle transition for user {}", user_id);
                RETRY_MESSAGE.to_string()
            }
        }
    }

    async fn open_pending(&self, user_id: i64, analysis: AnalysisResult) -> String {
        let prompt = clarification_prompt(&analysis);
        let record = PendingClarification::new(user_id, analysis, self.ttl());

        match self.store.put(record).await {
            Ok(()) => {
                info!("Opened pending clarification for user {}", user_id);
                prompt
            }
            // Deterministic conflict policy: never overwrite; repeat the
            // prompt for the record that won.
            Err(NoshError::Conflict(_)) => match self.store.peek(user_id).await {
                Some(existing) => clarification_prompt(&existing.original_analysis),
                None => RETRY_MESSAGE.to_string(),
            },
            Err(e) => {
                error!("Could not persist clarification for user {}: {}", user_id, e);
                SAVE_FAILED_MESSAGE.to_string()
            }
        }
    }

    /// Clarification path: analyze with the stored uncertainty as context,
    /// merge, and resolve the record. An analyzer failure leaves the
    /// pending record untouched so the user can retry.
    async fn run_clarification(
        &self,
        user_id: i64,
        message: &IncomingMessage,
        pending: PendingClarification,
    ) -> String {
        let clarification = match self
            .analyzer
            .analyze(message, Some(&pending.uncertainty))
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Clarification analysis failed for user {}: {}", user_id, e);
                return RETRY_MESSAGE.to_string();
            }
        };

        let merged = merge(&pending.original_analysis, &clarification);

        match transition(ClarificationState::Pending, ClarificationEvent::ClarificationReply) {
            Transition::Finish(ClarificationOutcome::Resolved) => {}
            other => {
                error!("Unexpected lifecycle transition {:?} for user {}", other, user_id);
                return RETRY_MESSAGE.to_string();
            }
        }

        if let Err(e) = self.store.remove(user_id).await {
            // The merge is not visible until the record is gone; leave
            // state as it was and ask for a retry.
            error!("Could not resolve clarification for user {}: {}", user_id, e);
            return SAVE_FAILED_MESSAGE.to_string();
        }
        info!("Resolved clarification for user {}", user_id);

        if merged.uncertainty.has_uncertainty && self.config.reclarify {
            // Multi-round policy: the combined result becomes the new
            // original and the user is asked again.
            return self.open_pending(user_id, merged).await;
        }

        confirmation_text(&merged)
    }

    /// `status` command: read-only.
    pub async fn handle_status(&self, user_id: i64) -> StatusReport {
        match self.store.peek(user_id).await {
            None => StatusReport::None,
            Some(record) => StatusReport::Pending {
                uncertain_items: record.uncertainty.uncertain_items.clone(),
                expires_in_secs: record.remaining(Utc::now()).num_seconds(),
            },
        }
    }

    /// `cancel` command: drops the pending record if one is live.
    pub async fn handle_cancel(&self, user_id: i64) -> Result<CancelReport> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let state = match self.store.peek(user_id).await {
            Some(_) => ClarificationState::Pending,
            None => ClarificationState::None,
        };

        match transition(state, ClarificationEvent::Cancel) {
            Transition::Finish(ClarificationOutcome::Cancelled) => {
                if self.store.remove(user_id).await? {
                    info!("Cancelled pending clarification for user {}", user_id);
                    Ok(CancelReport::Cancelled)
                } else {
                    Ok(CancelReport::NothingToCancel)
                }
            }
            _ => Ok(CancelReport::NothingToCancel),
        }
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.config.ttl_hours)
    }
}

/// Confirmation text for a stored result, per-item lines plus totals.
fn confirmation_text(analysis: &AnalysisResult) -> String {
    let mut text = String::from("🍽️ Food analysis complete!\n\n");
    for item in &analysis.payload.food_items {
        match &item.quantity {
            Some(quantity) => text.push_str(&format!("• {} ({})\n", item.name, quantity)),
            None => text.push_str(&format!("• {}\n", item.name)),
        }
        text.push_str(&format!(
            "   {:.0} kcal, {:.1}g protein, {:.1}g carbs, {:.1}g fat\n",
            item.nutrition.calories, item.nutrition.protein, item.nutrition.carbs, item.nutrition.fat
        ));
    }
    let total = &analysis.payload.total_nutrition;
    text.push_str(&format!(
        "\nTotal: {:.0} kcal, {:.1}g protein, {:.1}g carbs, {:.1}g fat",
        total.calories, total.protein, total.carbs, total.fat
    ));

    if analysis.uncertainty.has_uncertainty {
        text.push_str(&format!(
            "\n\nStill not fully sure about: {}",
            analysis.uncertainty.uncertain_items.join(", ")
        ));
    }
    text
}

/// Prompt asking the user to clarify the flagged items.
fn clarification_prompt(analysis: &AnalysisResult) -> String {
    let uncertainty = &analysis.uncertainty;
    let mut text = String::from("🤔 I need a little more detail before I log this.\n\n");
    for (idx, item) in uncertainty.uncertain_items.iter().enumerate() {
        match uncertainty.uncertainty_reasons.get(idx) {
            Some(reason) => text.push_str(&format!("• {} — {}\n", item, reason)),
            None => text.push_str(&format!("• {}\n", item)),
        }
    }
    text.push_str(
        "\nReply with more detail about these items, or send `cancel` to discard this entry.",
    );
    text
}
