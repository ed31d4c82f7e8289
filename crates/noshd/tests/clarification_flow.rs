//! End-to-end clarification flow against a real state file.

use chrono::Duration;
use noshd::analyzer::ScriptedAnalyzer;
use noshd::handlers::Handlers;
use noshd::store::{ClarificationStore, FileSink, MemorySink};
use nosh_common::clarification::{PendingClarification, StatusReport};
use nosh_common::ipc::{IncomingMessage, PayloadKind};
use nosh_common::{
    AnalysisPayload, AnalysisResult, ClarificationConfig, FoodItem, NoshError, NutritionInfo,
    UncertaintyAssessment,
};
use std::sync::Arc;

fn message(content: &str) -> IncomingMessage {
    IncomingMessage {
        kind: PayloadKind::Text,
        content: content.to_string(),
    }
}

fn uncertain_initial() -> AnalysisResult {
    AnalysisResult::initial(
        AnalysisPayload::new(vec![FoodItem::new("pasta dish").with_nutrition(NutritionInfo {
            calories: 400.0,
            protein: 12.0,
            carbs: 60.0,
            fat: 10.0,
        })]),
        UncertaintyAssessment::uncertain(
            vec!["pasta dish".to_string()],
            vec!["sauce not visible".to_string()],
            0.4,
        ),
    )
}

fn resolving_clarification() -> AnalysisResult {
    AnalysisResult::clarification(
        AnalysisPayload::new(vec![FoodItem::new("pasta dish")
            .with_quantity("1 plate carbonara")
            .with_nutrition(NutritionInfo {
                calories: 650.0,
                protein: 22.0,
                carbs: 62.0,
                fat: 28.0,
            })]),
        UncertaintyAssessment::confident(0.9),
    )
}

fn confident_initial() -> AnalysisResult {
    AnalysisResult::initial(
        AnalysisPayload::new(vec![FoodItem::new("banana").with_nutrition(NutritionInfo {
            calories: 105.0,
            protein: 1.3,
            carbs: 27.0,
            fat: 0.4,
        })]),
        UncertaintyAssessment::confident(0.95),
    )
}

#[tokio::test]
async fn pending_record_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pending_clarifications.json");

    {
        let store = Arc::new(ClarificationStore::open(Arc::new(FileSink::new(&path))));
        let handlers = Handlers::new(
            store,
            Arc::new(ScriptedAnalyzer::new(vec![Ok(uncertain_initial())])),
            ClarificationConfig::default(),
        );
        handlers.handle_incoming(7, &message("some pasta")).await;
        assert!(matches!(
            handlers.handle_status(7).await,
            StatusReport::Pending { .. }
        ));
    }

    // Fresh process over the same state file picks the record back up and
    // the clarification resolves it.
    let store = Arc::new(ClarificationStore::open(Arc::new(FileSink::new(&path))));
    let handlers = Handlers::new(
        store,
        Arc::new(ScriptedAnalyzer::new(vec![Ok(resolving_clarification())])),
        ClarificationConfig::default(),
    );

    match handlers.handle_status(7).await {
        StatusReport::Pending { uncertain_items, .. } => {
            assert_eq!(uncertain_items, vec!["pasta dish"]);
        }
        other => panic!("expected pending after reload, got {:?}", other),
    }

    let reply = handlers.handle_incoming(7, &message("it was carbonara")).await;
    assert!(reply.contains("Food analysis complete"));
    assert!(reply.contains("650"));
    assert_eq!(handlers.handle_status(7).await, StatusReport::None);
}

#[tokio::test]
async fn late_clarification_is_treated_as_new_analysis() {
    // Scenario C: the follow-up arrives after the TTL elapsed.
    let store = Arc::new(ClarificationStore::open(Arc::new(MemorySink::new())));

    // Plant an already-expired record, as if the daemon slept past the TTL.
    let expired = PendingClarification::new(7, uncertain_initial(), Duration::seconds(-10));
    store.put(expired).await.unwrap();

    let handlers = Handlers::new(
        store.clone(),
        Arc::new(ScriptedAnalyzer::new(vec![Ok(confident_initial())])),
        ClarificationConfig::default(),
    );

    let reply = handlers.handle_incoming(7, &message("it was carbonara")).await;
    // Evicted first, then analyzed fresh; no merge with the stale record.
    assert!(reply.contains("clarification window expired"));
    assert!(reply.contains("banana"));
    assert!(!reply.contains("pasta"));
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn concurrent_messages_from_one_user_leave_one_record() {
    // Scenario E: two near-simultaneous uncertain messages. The per-user
    // lock serializes them; the second one runs as a clarification against
    // the record the first created, fails, and leaves that record alone.
    let store = Arc::new(ClarificationStore::open(Arc::new(MemorySink::new())));
    let handlers = Arc::new(Handlers::new(
        store.clone(),
        Arc::new(ScriptedAnalyzer::new(vec![
            Ok(uncertain_initial()),
            Err(NoshError::Analysis("model offline".into())),
        ])),
        ClarificationConfig::default(),
    ));

    let first = {
        let handlers = handlers.clone();
        tokio::spawn(async move { handlers.handle_incoming(7, &message("some pasta")).await })
    };
    let second = {
        let handlers = handlers.clone();
        tokio::spawn(async move { handlers.handle_incoming(7, &message("pasta again")).await })
    };

    let (a, b) = (first.await.unwrap(), second.await.unwrap());

    assert_eq!(store.len().await, 1);
    assert!(matches!(
        handlers.handle_status(7).await,
        StatusReport::Pending { .. }
    ));
    // One reply is the clarification prompt, the other the retry notice.
    let replies = format!("{}\n{}", a, b);
    assert!(replies.contains("more detail"));
    assert!(replies.contains("try again"));
}

#[tokio::test]
async fn concurrent_store_puts_conflict() {
    // The at-most-one invariant holds even without the handler lock.
    let store = Arc::new(ClarificationStore::open(Arc::new(MemorySink::new())));

    let make_record =
        || PendingClarification::new(7, uncertain_initial(), Duration::hours(24));

    let first = {
        let store = store.clone();
        let record = make_record();
        tokio::spawn(async move { store.put(record).await })
    };
    let second = {
        let store = store.clone();
        let record = make_record();
        tokio::spawn(async move { store.put(record).await })
    };

    let results = vec![first.await.unwrap(), second.await.unwrap()];
    let ok_count = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(NoshError::Conflict(7))))
        .count();

    assert_eq!(ok_count, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(store.len().await, 1);
}
