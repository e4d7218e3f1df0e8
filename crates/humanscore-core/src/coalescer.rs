//! Step ingestion coalescer.
//!
//! Callers submit one `StepEvent` at a time; events pile up in a shared
//! pending batch and are written in rounds. A round starts when the batch
//! reaches `flush_threshold`, when the debounce timer armed by the first
//! event of the batch fires, or on `flush_now`. Each round groups its events
//! by session and performs one read-merge-write per session, concurrently.
//!
//! Taken batches are queued to a single flush worker so rounds touching the
//! same session never interleave their read-merge-write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use humanscore_schema::{SessionRecord, StepEvent};
use humanscore_store::{SessionStore, StoreError};
use tokio::sync::{mpsc, oneshot};

use crate::config::CoalescerConfig;
use crate::error::{PipelineError, Result};
use crate::prompts::{FAST_RESPONSE_MS, SLOW_RESPONSE_MS};

struct PendingEntry {
    session_id: String,
    event: StepEvent,
    done: oneshot::Sender<Result<()>>,
}

#[derive(Default)]
struct PendingBatch {
    entries: Vec<PendingEntry>,
    timer_armed: bool,
    /// Bumped on every take; a timer armed for an older generation is stale.
    generation: u64,
}

impl PendingBatch {
    fn take(&mut self) -> Vec<PendingEntry> {
        self.timer_armed = false;
        self.generation += 1;
        std::mem::take(&mut self.entries)
    }
}

struct FlushJob {
    entries: Vec<PendingEntry>,
    /// Set by `flush_now`; receives the number of events written.
    drained: Option<oneshot::Sender<usize>>,
}

struct Shared {
    config: CoalescerConfig,
    pending: Mutex<PendingBatch>,
    jobs: mpsc::UnboundedSender<FlushJob>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PendingBatch> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Swaps the batch for an empty one and queues it. Called with the lock
    /// held so jobs reach the worker in take order.
    fn dispatch(&self, batch: &mut PendingBatch, drained: Option<oneshot::Sender<usize>>) {
        let entries = batch.take();
        if entries.is_empty() && drained.is_none() {
            return;
        }
        if self.jobs.send(FlushJob { entries, drained }).is_err() {
            tracing::error!("step flush worker has stopped; pending steps dropped");
        }
    }
}

/// Resolves once the event's round has been written.
pub struct PendingSubmit {
    rx: oneshot::Receiver<Result<()>>,
}

impl PendingSubmit {
    pub async fn wait(self) -> Result<()> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::Dropped),
        }
    }
}

#[derive(Clone)]
pub struct StepCoalescer {
    shared: Arc<Shared>,
    rounds: Arc<AtomicU64>,
}

impl StepCoalescer {
    /// Spawns the flush worker, so this must run inside a tokio runtime.
    pub fn new(store: Arc<dyn SessionStore>, config: CoalescerConfig) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let rounds = Arc::new(AtomicU64::new(0));
        let worker = FlushWorker {
            store,
            dedupe_by_step: config.dedupe_by_step,
            rounds: Arc::clone(&rounds),
        };
        tokio::spawn(worker.run(rx));

        Self {
            shared: Arc::new(Shared {
                config,
                pending: Mutex::new(PendingBatch::default()),
                jobs,
            }),
            rounds,
        }
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.shared.config
    }

    /// Enqueues `event` and waits for its round to be written.
    pub async fn submit(&self, session_id: &str, event: StepEvent) -> Result<()> {
        self.enqueue(session_id, event)?.wait().await
    }

    /// Enqueues `event` and returns a handle for its outcome. Invalid events
    /// are rejected here and never enter the batch.
    pub fn enqueue(&self, session_id: &str, event: StepEvent) -> Result<PendingSubmit> {
        validate(session_id, &event)?;
        flag_suspicious_timing(&event);

        let (done, rx) = oneshot::channel();
        tracing::debug!(
            session_id,
            step = event.step_number,
            "step queued for persistence"
        );

        let arm = {
            let mut batch = self.shared.lock();
            batch.entries.push(PendingEntry {
                session_id: session_id.to_string(),
                event,
                done,
            });
            if batch.entries.len() >= self.shared.config.flush_threshold {
                self.shared.dispatch(&mut batch, None);
                None
            } else if !batch.timer_armed {
                batch.timer_armed = true;
                Some(batch.generation)
            } else {
                None
            }
        };

        if let Some(generation) = arm {
            let shared = Arc::clone(&self.shared);
            let delay = self.shared.config.flush_delay();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut batch = shared.lock();
                if batch.generation == generation {
                    shared.dispatch(&mut batch, None);
                }
            });
        }

        Ok(PendingSubmit { rx })
    }

    /// Flushes whatever is pending and waits until every earlier round has
    /// been written too. Returns the number of events in this round.
    pub async fn flush_now(&self) -> usize {
        let (drained, rx) = oneshot::channel();
        {
            let mut batch = self.shared.lock();
            self.shared.dispatch(&mut batch, Some(drained));
        }
        rx.await.unwrap_or(0)
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    /// Non-empty rounds written so far.
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::SeqCst)
    }
}

fn validate(session_id: &str, event: &StepEvent) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(PipelineError::validation("session id is empty"));
    }
    if event.session_id != session_id {
        return Err(PipelineError::validation(format!(
            "event belongs to session {:?}, submitted for {:?}",
            event.session_id, session_id
        )));
    }
    if event.step_number == 0 {
        return Err(PipelineError::validation("step number must be at least 1"));
    }
    if event.user_response.trim().is_empty() {
        return Err(PipelineError::validation(format!(
            "step {} has an empty response",
            event.step_number
        )));
    }
    Ok(())
}

fn flag_suspicious_timing(event: &StepEvent) {
    if event.response_time_ms < FAST_RESPONSE_MS || event.response_time_ms > SLOW_RESPONSE_MS {
        tracing::warn!(
            session_id = %event.session_id,
            step = event.step_number,
            response_time_ms = event.response_time_ms,
            "suspicious response time"
        );
    }
}

struct FlushWorker {
    store: Arc<dyn SessionStore>,
    dedupe_by_step: bool,
    rounds: Arc<AtomicU64>,
}

impl FlushWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<FlushJob>) {
        while let Some(job) = rx.recv().await {
            let written = self.flush_round(job.entries).await;
            if let Some(drained) = job.drained {
                let _ = drained.send(written);
            }
        }
        tracing::debug!("step flush worker stopped");
    }

    async fn flush_round(&self, entries: Vec<PendingEntry>) -> usize {
        if entries.is_empty() {
            return 0;
        }
        let round = self.rounds.fetch_add(1, Ordering::SeqCst) + 1;
        let total = entries.len();

        let mut order = Vec::new();
        let mut groups: HashMap<String, Vec<PendingEntry>> = HashMap::new();
        for entry in entries {
            let session_id = entry.session_id.clone();
            if !groups.contains_key(&session_id) {
                order.push(session_id.clone());
            }
            groups.entry(session_id).or_default().push(entry);
        }

        let sessions = order.len();
        let flushes = order.into_iter().filter_map(|session_id| {
            let group = groups.remove(&session_id)?;
            Some(self.flush_group(session_id, group))
        });
        join_all(flushes).await;

        tracing::info!(round, sessions, events = total, "step batch flushed");
        total
    }

    async fn flush_group(&self, session_id: String, entries: Vec<PendingEntry>) {
        let events: Vec<StepEvent> = entries.iter().map(|e| e.event.clone()).collect();
        match self.persist(&session_id, &events).await {
            Ok(appended) => {
                tracing::debug!(
                    session_id = %session_id,
                    appended,
                    skipped = events.len() - appended,
                    "session steps merged"
                );
                for entry in entries {
                    let _ = entry.done.send(Ok(()));
                }
            }
            Err(err) => {
                tracing::error!(
                    session_id = %session_id,
                    events = events.len(),
                    "session flush failed: {err}"
                );
                for entry in entries {
                    let _ = entry.done.send(Err(PipelineError::Store(err.clone())));
                }
            }
        }
    }

    async fn persist(
        &self,
        session_id: &str,
        events: &[StepEvent],
    ) -> std::result::Result<usize, StoreError> {
        let mut record = self
            .store
            .get(session_id)
            .await?
            .unwrap_or_else(|| SessionRecord::new(session_id));
        let appended = record.merge_steps(events, self.dedupe_by_step);
        self.store.update(session_id, &record).await?;
        Ok(appended)
    }
}
