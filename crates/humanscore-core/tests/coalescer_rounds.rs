use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use humanscore_core::{CoalescerConfig, PipelineError, StepCoalescer};
use humanscore_schema::{QuestionType, SessionRecord, StepEvent};
use humanscore_store::{InMemorySessionStore, SessionStore, StoreError};

fn step(session: &str, n: u32) -> StepEvent {
    StepEvent {
        session_id: session.into(),
        step_number: n,
        question_type: QuestionType::FreeText,
        question: Some(format!("question {n}")),
        user_response: format!("{session} answer {n}"),
        response_time_ms: 1_500,
        timestamp: Utc::now(),
    }
}

/// Counts writes and fails every write for one session.
struct FlakyStore {
    inner: InMemorySessionStore,
    poisoned: Option<&'static str>,
    updates: AtomicUsize,
}

impl FlakyStore {
    fn new(poisoned: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemorySessionStore::new(),
            poisoned,
            updates: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.inner.get(session_id).await
    }

    async fn update(&self, session_id: &str, record: &SessionRecord) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.poisoned == Some(session_id) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.update(session_id, record).await
    }
}

/// Every read fails as if the stored record were unreadable.
struct CorruptStore;

#[async_trait]
impl SessionStore for CorruptStore {
    async fn get(&self, _session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Err(StoreError::Serialization("expected value at line 1 column 1".into()))
    }

    async fn update(&self, _session_id: &str, _record: &SessionRecord) -> Result<(), StoreError> {
        Ok(())
    }
}

fn slow_timer() -> CoalescerConfig {
    CoalescerConfig {
        flush_threshold: 3,
        flush_delay_ms: 60_000,
        dedupe_by_step: false,
    }
}

#[tokio::test]
async fn fifteen_events_flush_in_five_rounds_of_three() {
    let store = FlakyStore::new(None);
    let coalescer = StepCoalescer::new(store.clone(), slow_timer());

    let submits = (1..=15).map(|n| coalescer.submit("s1", step("s1", n)));
    let results = join_all(submits).await;

    assert_eq!(results.len(), 15);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(coalescer.rounds(), 5);
    assert_eq!(store.updates.load(Ordering::SeqCst), 5);

    let record = store.require("s1").await.unwrap();
    let numbers: Vec<u32> = record.steps.iter().map(|s| s.step_number).collect();
    assert_eq!(numbers, (1..=15).collect::<Vec<_>>());
    assert_eq!(record.meta.step_count, 15);
    assert_eq!(record.meta.total_response_time_ms, 15 * 1_500);
}

#[tokio::test]
async fn round_appends_to_existing_steps() {
    let store = FlakyStore::new(None);
    let mut existing = SessionRecord::new("s1");
    existing.merge_steps(&[step("s1", 1), step("s1", 2)], false);
    store.update("s1", &existing).await.unwrap();

    let coalescer = StepCoalescer::new(store.clone(), slow_timer());
    let handles = [
        coalescer.enqueue("s1", step("s1", 3)).unwrap(),
        coalescer.enqueue("s1", step("s1", 4)).unwrap(),
    ];
    assert_eq!(coalescer.flush_now().await, 2);
    for handle in handles {
        handle.wait().await.unwrap();
    }

    let record = store.require("s1").await.unwrap();
    let before: Vec<&StepEvent> = existing.steps.iter().collect();
    let after: Vec<&StepEvent> = record.steps.iter().take(2).collect();
    assert_eq!(before, after);
    assert_eq!(record.steps[2].step_number, 3);
    assert_eq!(record.steps[3].step_number, 4);
    assert_eq!(record.steps_completed, 4);
}

#[tokio::test]
async fn failing_session_does_not_affect_others_in_the_round() {
    let store = FlakyStore::new(Some("broken"));
    let coalescer = StepCoalescer::new(
        store.clone(),
        CoalescerConfig {
            flush_threshold: 4,
            ..slow_timer()
        },
    );

    let results = join_all([
        coalescer.submit("broken", step("broken", 1)),
        coalescer.submit("healthy", step("healthy", 1)),
        coalescer.submit("broken", step("broken", 2)),
        coalescer.submit("healthy", step("healthy", 2)),
    ])
    .await;

    assert!(matches!(results[0], Err(PipelineError::Store(_))));
    assert!(matches!(results[2], Err(PipelineError::Store(_))));
    assert!(results[1].is_ok());
    assert!(results[3].is_ok());
    assert!(results[0].as_ref().unwrap_err().is_retryable());

    assert_eq!(coalescer.rounds(), 1);
    assert!(store.get("broken").await.unwrap().is_none());
    assert_eq!(store.require("healthy").await.unwrap().steps.len(), 2);
}

#[tokio::test]
async fn every_handle_resolves_exactly_once_across_rounds() {
    let store = Arc::new(InMemorySessionStore::new());
    let coalescer = StepCoalescer::new(store.clone(), slow_timer());

    let mut handles = Vec::new();
    for n in 1..=7 {
        let session = if n % 2 == 0 { "even" } else { "odd" };
        handles.push(coalescer.enqueue(session, step(session, n)).unwrap());
    }
    assert_eq!(coalescer.pending_len(), 1);
    coalescer.flush_now().await;
    assert_eq!(coalescer.pending_len(), 0);

    let outcomes = join_all(handles.into_iter().map(|h| h.wait())).await;
    assert!(outcomes.iter().all(|r| r.is_ok()));
    assert_eq!(coalescer.rounds(), 3);

    let odd = store.require("odd").await.unwrap();
    let even = store.require("even").await.unwrap();
    assert_eq!(odd.steps.len() + even.steps.len(), 7);
}

#[tokio::test]
async fn handles_receive_the_store_error_variant() {
    let coalescer = StepCoalescer::new(Arc::new(CorruptStore), slow_timer());

    let results = join_all([
        coalescer.submit("s1", step("s1", 1)),
        coalescer.submit("s1", step("s1", 2)),
        coalescer.submit("s1", step("s1", 3)),
    ])
    .await;

    for result in &results {
        assert!(matches!(
            result,
            Err(PipelineError::Store(StoreError::Serialization(m))) if m.contains("line 1")
        ));
    }
}
