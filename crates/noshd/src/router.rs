//! Routing an inbound message against the clarification lifecycle.
//!
//! Expiry is checked and the stale record evicted before the decision is
//! made, so a message arriving a tick after expiry can never merge against
//! a dead record.

use crate::store::{ClarificationStore, Lookup};
use nosh_common::{PendingClarification, Result, UncertaintyAssessment};

/// How an inbound message should be handled.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Run a normal initial analysis. `expired_notice` is set when a
    /// pending record was just evicted and the user should be told.
    TreatAsInitial { expired_notice: bool },
    /// A live pending record exists: analyze in clarification context,
    /// merge, and resolve.
    TreatAsClarification(PendingClarification),
    /// Reserved for future policy (rate limiting etc.). Not constructed
    /// anywhere today.
    #[allow(dead_code)]
    Rejected(String),
}

/// Decide the path for a user's next message.
pub async fn route(store: &ClarificationStore, user_id: i64) -> Result<RouteDecision> {
    match store.lookup(user_id).await? {
        Lookup::Missing => Ok(RouteDecision::TreatAsInitial {
            expired_notice: false,
        }),
        Lookup::Expired => Ok(RouteDecision::TreatAsInitial {
            expired_notice: true,
        }),
        Lookup::Active(record) => Ok(RouteDecision::TreatAsClarification(record)),
    }
}

/// Whether an initial analysis needs a clarification round. The analyzer
/// is expected to keep `has_uncertainty` and the trust threshold in
/// agreement, but a low score alone is enough to ask.
pub fn needs_clarification(assessment: &UncertaintyAssessment, trust_threshold: f64) -> bool {
    assessment.has_uncertainty || assessment.confidence_score < trust_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySink;
    use chrono::Duration;
    use nosh_common::{AnalysisPayload, AnalysisResult, FoodItem};
    use std::sync::Arc;

    fn store() -> ClarificationStore {
        ClarificationStore::open(Arc::new(MemorySink::new()))
    }

    fn pending(user_id: i64, ttl: Duration) -> PendingClarification {
        let analysis = AnalysisResult::initial(
            AnalysisPayload::new(vec![FoodItem::new("stew")]),
            UncertaintyAssessment::uncertain(vec!["stew".into()], vec![], 0.5),
        );
        PendingClarification::new(user_id, analysis, ttl)
    }

    #[tokio::test]
    async fn test_no_record_routes_initial() {
        let store = store();
        assert_eq!(
            route(&store, 1).await.unwrap(),
            RouteDecision::TreatAsInitial {
                expired_notice: false
            }
        );
    }

    #[tokio::test]
    async fn test_live_record_routes_clarification() {
        let store = store();
        store.put(pending(1, Duration::hours(24))).await.unwrap();

        match route(&store, 1).await.unwrap() {
            RouteDecision::TreatAsClarification(record) => assert_eq!(record.user_id, 1),
            other => panic!("expected clarification route, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_record_evicts_before_decision() {
        let store = store();
        store.put(pending(1, Duration::seconds(-1))).await.unwrap();

        assert_eq!(
            route(&store, 1).await.unwrap(),
            RouteDecision::TreatAsInitial {
                expired_notice: true
            }
        );
        // Eviction happened before the decision; the record is gone.
        assert_eq!(store.len().await, 0);
        assert_eq!(
            route(&store, 1).await.unwrap(),
            RouteDecision::TreatAsInitial {
                expired_notice: false
            }
        );
    }

    #[test]
    fn test_needs_clarification_threshold() {
        assert!(needs_clarification(
            &UncertaintyAssessment::uncertain(vec!["x".into()], vec![], 0.9),
            0.7
        ));
        assert!(needs_clarification(
            &UncertaintyAssessment::confident(0.5),
            0.7
        ));
        assert!(!needs_clarification(
            &UncertaintyAssessment::confident(0.9),
            0.7
        ));
    }
}
