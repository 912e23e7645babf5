//! The crawl queue
//!
//! Targets are validated and prioritized on submission, then drained in
//! batches: each batch is dispatched concurrently (one task per target),
//! awaited as a whole, and followed by the inter-batch delay. Batches never
//! overlap, even between a drain stream and the background worker. A stop
//! request takes effect at the next batch boundary.
//!
//! A batch is settled by its own task, so dropping a drain stream mid-batch
//! still accounts for every target it popped.

use crate::config::QueueConfig;
use crate::fetch::{ErrorKind, FetchController, FetchSession, SurfaceFactory};
use crate::queue::adapter::{AdapterError, AdapterRegistry, ContentItem, Provenance};
use crate::queue::frontier::Frontier;
use crate::queue::target::{CrawlTarget, Rejection, RejectionReason, ValidationReport};
use crate::url::{ContentKind, PriorityWeights, SourceKind};
use async_stream::stream;
use chrono::Utc;
use futures::future::join_all;
use futures::Stream;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedMutexGuard};

/// Batch shape of a drain
#[derive(Debug, Clone)]
pub struct DrainOptions {
    /// Targets in flight at once
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for DrainOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            inter_batch_delay: config.inter_batch_delay(),
        }
    }
}

/// Final result of one target
#[derive(Debug, Clone, Serialize)]
pub struct TargetResult {
    pub target: CrawlTarget,
    pub success: bool,
    pub content_item: Option<ContentItem>,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    pub processing_time_ms: u64,
}

impl TargetResult {
    fn failure(target: CrawlTarget, error: &AdapterError, processing_time_ms: u64) -> Self {
        Self {
            target,
            success: false,
            content_item: None,
            error_kind: Some(error.kind()),
            message: Some(error.to_string()),
            processing_time_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OutcomeCounts {
    pub succeeded: u64,
    pub failed: u64,
}

impl OutcomeCounts {
    fn record(&mut self, success: bool) {
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Snapshot of queue activity
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub by_source: BTreeMap<SourceKind, OutcomeCounts>,
    pub by_content: BTreeMap<ContentKind, OutcomeCounts>,
    pub average_processing_ms: f64,
    pub worker_running: bool,

    /// Background results not yet taken
    pub completed_buffered: usize,
}

#[derive(Default)]
struct QueueState {
    frontier: Frontier,

    /// Normalized URLs of pending and in-flight targets
    known: HashSet<String>,
    in_flight: usize,
    next_sequence: u64,
    processed: u64,
    succeeded: u64,
    failed: u64,
    total_processing_ms: u64,
    by_source: BTreeMap<SourceKind, OutcomeCounts>,
    by_content: BTreeMap<ContentKind, OutcomeCounts>,
    completed: Vec<TargetResult>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    adapters: Arc<AdapterRegistry>,
    controller: Arc<FetchController>,
    surfaces: Arc<dyn SurfaceFactory>,
    weights: PriorityWeights,
    options: DrainOptions,
    stop: AtomicBool,
    worker_running: AtomicBool,

    /// Drain streams alive on this queue
    active_drains: AtomicUsize,

    /// Held from popping a batch until it has settled
    batch_gate: Arc<AsyncMutex<()>>,
    idle: Notify,
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears a stop request unless another consumer is still running
    fn restart(&self, other_drains: usize) {
        if other_drains == 0 && !self.worker_running.load(Ordering::SeqCst) {
            self.stop.store(false, Ordering::SeqCst);
        }
    }

    fn record(&self, results: &[TargetResult]) {
        let mut state = self.lock();
        for result in results {
            state.in_flight = state.in_flight.saturating_sub(1);
            state.known.remove(result.target.key());
            state.processed += 1;
            state.total_processing_ms += result.processing_time_ms;
            if result.success {
                state.succeeded += 1;
            } else {
                state.failed += 1;
            }
            state
                .by_source
                .entry(result.target.source_kind)
                .or_default()
                .record(result.success);
            state
                .by_content
                .entry(result.target.content_kind)
                .or_default()
                .record(result.success);
        }
    }
}

/// Marks a drain stream as alive until dropped
struct ActiveDrain(Arc<QueueInner>);

impl ActiveDrain {
    fn begin(inner: &Arc<QueueInner>) -> Self {
        let others = inner.active_drains.fetch_add(1, Ordering::SeqCst);
        inner.restart(others);
        Self(Arc::clone(inner))
    }
}

impl Drop for ActiveDrain {
    fn drop(&mut self) {
        self.0.active_drains.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Validates, prioritizes and drains crawl targets
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct CrawlQueue {
    inner: Arc<QueueInner>,
}

impl CrawlQueue {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        controller: Arc<FetchController>,
        surfaces: Arc<dyn SurfaceFactory>,
        config: &QueueConfig,
    ) -> Self {
        let weights = PriorityWeights {
            source: config.source_weights.clone(),
            content: config.content_weights.clone(),
        };

        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                adapters,
                controller,
                surfaces,
                weights,
                options: DrainOptions::from(config),
                stop: AtomicBool::new(false),
                worker_running: AtomicBool::new(false),
                active_drains: AtomicUsize::new(0),
                batch_gate: Arc::new(AsyncMutex::new(())),
                idle: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.lock()
    }

    /// Drain options from the queue configuration
    pub fn default_options(&self) -> DrainOptions {
        self.inner.options.clone()
    }

    /// Validates raw inputs and queues the accepted ones
    ///
    /// Never fails as a whole: every input ends up either accepted or
    /// rejected with a reason.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let report = queue.submit(["https://x.com/a", "https://x.com/a", "not-a-url"]);
    /// assert_eq!(report.accepted_count(), 1);
    /// assert_eq!(report.rejected_count(), 2);
    /// ```
    pub fn submit<I, S>(&self, raw_inputs: I) -> ValidationReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = ValidationReport::default();
        let mut state = self.lock();

        for raw in raw_inputs {
            let raw = raw.as_ref();
            let sequence = state.next_sequence;

            let prepared = CrawlTarget::prepare(raw, &self.inner.weights, sequence).and_then(|target| {
                if !self.inner.adapters.supports(target.source_kind) {
                    Err(RejectionReason::UnsupportedSource)
                } else if state.known.contains(target.key()) {
                    Err(RejectionReason::Duplicate)
                } else {
                    Ok(target)
                }
            });

            match prepared {
                Ok(target) => {
                    state.next_sequence += 1;
                    state.known.insert(target.key().to_string());
                    state.frontier.push(target.clone());
                    report.accepted.push(target);
                }
                Err(reason) => {
                    tracing::debug!("Rejected '{}': {}", raw, reason);
                    report.rejected.push(Rejection {
                        raw_input: raw.to_string(),
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            "Submitted {} targets: {} accepted, {} rejected",
            report.accepted_count() + report.rejected_count(),
            report.accepted_count(),
            report.rejected_count()
        );
        report
    }

    /// Drains pending targets batch by batch
    ///
    /// Results of a batch are yielded in dispatch order once the whole batch
    /// has settled. The stream ends when the queue is empty or a stop was
    /// requested. A stop is only cleared here when no other drain and no
    /// background worker is running.
    pub fn drain(&self, options: DrainOptions) -> impl Stream<Item = TargetResult> + Send + 'static {
        let queue = self.clone();
        let active = ActiveDrain::begin(&queue.inner);

        stream! {
            let _active = active;
            let batch_size = options.batch_size.max(1);
            let mut batch_number = 0usize;

            loop {
                if queue.inner.stop.load(Ordering::SeqCst) {
                    tracing::info!("Drain stopped after {} batches", batch_number);
                    break;
                }

                let Some((gate, batch)) = queue.take_batch(batch_size).await else {
                    break;
                };

                batch_number += 1;
                let results = queue.dispatch_batch(gate, batch_number, batch).await;
                for result in results {
                    yield result;
                }

                if queue.pending() > 0 && !queue.inner.stop.load(Ordering::SeqCst) {
                    tokio::time::sleep(options.inter_batch_delay).await;
                }
            }
        }
    }

    /// Queues inputs and makes sure the background worker is running
    ///
    /// The worker starts on the first submission with accepted targets and
    /// stops by itself once the queue is empty. Its results are buffered for
    /// [`take_completed`](Self::take_completed).
    pub fn enqueue_async<I, S>(&self, raw_inputs: I) -> ValidationReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let report = self.submit(raw_inputs);

        if report.accepted_count() > 0 {
            if self.inner.active_drains.load(Ordering::SeqCst) == 0 {
                self.inner.stop.store(false, Ordering::SeqCst);
            }
            self.ensure_worker();
        }

        report
    }

    fn ensure_worker(&self) {
        if self.inner.worker_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            queue.worker_loop().await;
        });
    }

    async fn worker_loop(&self) {
        tracing::debug!("Queue worker started");
        let options = self.inner.options.clone();
        let mut batch_number = 0usize;

        loop {
            if self.inner.stop.load(Ordering::SeqCst) {
                tracing::info!("Queue worker stopped");
                break;
            }

            let Some((gate, batch)) = self.take_batch(options.batch_size).await else {
                self.inner.worker_running.store(false, Ordering::SeqCst);

                // A submission may have slipped in after the empty check
                if self.pending() > 0 && !self.inner.worker_running.swap(true, Ordering::SeqCst) {
                    continue;
                }

                tracing::debug!("Queue worker idle");
                self.inner.idle.notify_waiters();
                return;
            };

            batch_number += 1;
            let results = self.dispatch_batch(gate, batch_number, batch).await;
            self.lock().completed.extend(results);

            if self.pending() > 0 {
                tokio::time::sleep(options.inter_batch_delay).await;
            }
        }

        self.inner.worker_running.store(false, Ordering::SeqCst);
        self.inner.idle.notify_waiters();
    }

    /// Waits until the background worker has stopped
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.inner.worker_running.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    /// Requests a stop at the next batch boundary
    ///
    /// In-flight targets finish normally; pending targets stay queued.
    pub fn stop(&self) {
        tracing::info!("Queue stop requested");
        self.inner.stop.store(true, Ordering::SeqCst);
    }

    /// Drops every pending target and returns how many were removed
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.frontier.drain_all();
        for target in &removed {
            state.known.remove(target.key());
        }

        tracing::info!("Cleared {} pending targets", removed.len());
        removed.len()
    }

    pub fn pending(&self) -> usize {
        self.lock().frontier.len()
    }

    /// Takes the results buffered by the background worker
    pub fn take_completed(&self) -> Vec<TargetResult> {
        std::mem::take(&mut self.lock().completed)
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            pending: state.frontier.len(),
            in_flight: state.in_flight,
            processed: state.processed,
            succeeded: state.succeeded,
            failed: state.failed,
            by_source: state.by_source.clone(),
            by_content: state.by_content.clone(),
            average_processing_ms: if state.processed == 0 {
                0.0
            } else {
                state.total_processing_ms as f64 / state.processed as f64
            },
            worker_running: self.inner.worker_running.load(Ordering::SeqCst),
            completed_buffered: state.completed.len(),
        }
    }

    /// Pops the next batch once no other batch is in flight
    ///
    /// `None` when the queue is empty or a stop arrived while waiting.
    async fn take_batch(&self, size: usize) -> Option<(OwnedMutexGuard<()>, Vec<CrawlTarget>)> {
        let gate = Arc::clone(&self.inner.batch_gate).lock_owned().await;
        if self.inner.stop.load(Ordering::SeqCst) {
            return None;
        }

        let mut state = self.lock();
        let batch = state.frontier.pop_batch(size);
        if batch.is_empty() {
            return None;
        }
        state.in_flight += batch.len();
        drop(state);

        Some((gate, batch))
    }

    /// Runs one batch concurrently and waits for every target to settle
    ///
    /// The batch is settled and recorded by a task of its own, which keeps
    /// the gate until then.
    async fn dispatch_batch(
        &self,
        gate: OwnedMutexGuard<()>,
        batch_number: usize,
        batch: Vec<CrawlTarget>,
    ) -> Vec<TargetResult> {
        let settling = tokio::spawn(settle_batch(Arc::clone(&self.inner), gate, batch_number, batch));

        match settling.await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("Batch {} did not settle: {}", batch_number, e);
                Vec::new()
            }
        }
    }
}

async fn settle_batch(
    inner: Arc<QueueInner>,
    _gate: OwnedMutexGuard<()>,
    batch_number: usize,
    batch: Vec<CrawlTarget>,
) -> Vec<TargetResult> {
    let size = batch.len();
    tracing::info!("Dispatching batch {} ({} targets)", batch_number, size);

    let handles: Vec<_> = batch
        .iter()
        .cloned()
        .map(|target| {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move { process_target(&inner, target).await })
        })
        .collect();

    let joined = join_all(handles).await;

    let results: Vec<TargetResult> = batch
        .into_iter()
        .zip(joined)
        .map(|(target, joined)| match joined {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Task for {} did not complete: {}", target.normalized_url, e);
                TargetResult {
                    target,
                    success: false,
                    content_item: None,
                    error_kind: Some(ErrorKind::NetworkError),
                    message: Some(format!("task did not complete: {}", e)),
                    processing_time_ms: 0,
                }
            }
        })
        .collect();

    inner.record(&results);

    let succeeded = results.iter().filter(|result| result.success).count();
    tracing::info!(
        "Batch {} settled: {} succeeded, {} failed",
        batch_number,
        succeeded,
        size - succeeded
    );
    results
}

/// Fetches one target through its source adapter in a fresh session
async fn process_target(inner: &QueueInner, target: CrawlTarget) -> TargetResult {
    let started = Instant::now();

    let Some(adapter) = inner.adapters.get(target.source_kind) else {
        let error = AdapterError::Unregistered(target.source_kind);
        return TargetResult::failure(target, &error, 0);
    };

    let mut session = FetchSession::new(Arc::clone(&inner.controller), inner.surfaces.create());
    let result = adapter.fetch(&target, &mut session).await;
    drop(session);

    let processing_time_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(mut item) => {
            item.provenance = Some(Provenance {
                collected_at: Utc::now(),
                source_kind: target.source_kind,
                processing_time_ms,
                original_url: target.raw_input.clone(),
                normalized_url: target.normalized_url.to_string(),
            });
            tracing::debug!("Collected {} via {}", target.normalized_url, adapter.name());

            TargetResult {
                target,
                success: true,
                content_item: Some(item),
                error_kind: None,
                message: None,
                processing_time_ms,
            }
        }
        Err(e) => {
            tracing::warn!("Target {} failed: {}", target.normalized_url, e);
            TargetResult::failure(target, &e, processing_time_ms)
        }
    }
}
