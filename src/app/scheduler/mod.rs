// Scheduler - Sequences queued files through the process supervisor

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::errors::CompressionError;
use crate::domain::model::{CompressionConfig, CompressionStatus, Outcome, VideoFile, VideoFileId};
use crate::domain::rules::Transition;
use crate::engine::{JobHandle, ProcessSupervisor};
use crate::utils::path::PathUtils;

const EVENT_CAPACITY: usize = 1024;

/// Queue limits and retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Engine runs in flight at once
    pub max_concurrent: usize,
    /// Automatic retries per item, for retryable failures only
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            max_retries: 0,
        }
    }
}

/// Change notifications for presentation layers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// An item was added or changed status; carries a snapshot
    StatusChanged { file: VideoFile },
    Progress { id: VideoFileId, progress: f64 },
    /// A failed item goes back to pending for another attempt
    RetryScheduled {
        id: VideoFileId,
        /// Runs started so far
        attempts: u32,
        error: CompressionError,
    },
    Removed { id: VideoFileId },
    /// `run` returned
    RunFinished { summary: BatchSummary },
}

/// Result of [`Scheduler::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Added,
    /// A terminal item was reset to pending
    Requeued,
    /// The item is already pending or running
    AlreadyQueued,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("no queue item with id {0}")]
    NotFound(VideoFileId),
    #[error("item {0} is being compressed")]
    Active(VideoFileId),
    #[error("item {0} has not finished yet")]
    NotFinished(VideoFileId),
}

/// Counts per state and byte totals over the queue
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub pending: usize,
    pub compressing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Original bytes of completed items
    pub original_bytes: u64,
    /// Output bytes of completed items
    pub compressed_bytes: u64,
    /// Negative when outputs grew
    pub bytes_saved: i64,
}

impl BatchSummary {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a VideoFile>) -> Self {
        let mut summary = BatchSummary::default();
        for file in items {
            summary.total += 1;
            match file.status() {
                CompressionStatus::Pending => summary.pending += 1,
                CompressionStatus::Compressing => summary.compressing += 1,
                CompressionStatus::Failed(_) => summary.failed += 1,
                CompressionStatus::Cancelled => summary.cancelled += 1,
                CompressionStatus::Completed => {
                    summary.completed += 1;
                    if let Some(compressed) = file.compressed_size() {
                        summary.original_bytes += file.original_size();
                        summary.compressed_bytes += compressed;
                    }
                }
            }
        }
        summary.bytes_saved = summary.original_bytes as i64 - summary.compressed_bytes as i64;
        summary
    }

    /// Overall size reduction in percent over completed items
    pub fn compression_ratio(&self) -> Option<f64> {
        (self.original_bytes > 0)
            .then(|| (1.0 - self.compressed_bytes as f64 / self.original_bytes as f64) * 100.0)
    }
}

/// FIFO job queue driving files through the supervisor.
///
/// Cheap to clone; clones share the queue. All status changes happen under
/// one lock and are announced on the event channel in the order they apply.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    supervisor: Arc<ProcessSupervisor>,
    compression: CompressionConfig,
    config: SchedulerConfig,
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    wakeup: Notify,
    /// Stop token of the run in progress; `None` while idle
    stop: Mutex<Option<CancellationToken>>,
}

#[derive(Default)]
struct QueueState {
    /// Every item, in enqueue order
    items: Vec<VideoFile>,
    /// Dispatch order of pending items
    pending: VecDeque<VideoFileId>,
    /// Dequeued, engine not launched yet
    starting: HashSet<VideoFileId>,
    /// Cancel requests that arrived while starting
    cancel_on_start: HashSet<VideoFileId>,
    active: HashMap<VideoFileId, JobHandle>,
    /// Output path reserved by each item, unique across the queue
    outputs: HashMap<VideoFileId, PathBuf>,
}

impl QueueState {
    fn item(&self, id: VideoFileId) -> Option<&VideoFile> {
        self.items.iter().find(|file| file.id() == id)
    }

    fn item_mut(&mut self, id: VideoFileId) -> Option<&mut VideoFile> {
        self.items.iter_mut().find(|file| file.id() == id)
    }

    /// Reserve an output path for `file` that no other item writes to or
    /// reads from, numbering the name when the plain one is taken
    fn claim_output(&mut self, file: &VideoFile, config: &CompressionConfig) -> PathBuf {
        let mut n = 0;
        let mut output = PathUtils::output_path(file.source(), config);
        while self.is_output_taken(&output) {
            n += 1;
            output = PathUtils::numbered_output_path(file.source(), config, n);
        }
        if n > 0 {
            info!(file_id = %file.id(), output = %output.display(), "Output name already taken, numbering it");
        }
        self.outputs.insert(file.id(), output.clone());
        output
    }

    fn is_output_taken(&self, output: &Path) -> bool {
        self.outputs.values().any(|claimed| claimed == output)
            || self
                .items
                .iter()
                .any(|item| item.source().local_path() == Some(output))
    }
}

impl Scheduler {
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        compression: CompressionConfig,
        config: SchedulerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                supervisor,
                compression,
                config: SchedulerConfig {
                    max_concurrent: config.max_concurrent.max(1),
                    ..config
                },
                state: Mutex::new(QueueState::default()),
                events,
                wakeup: Notify::new(),
                stop: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn compression_config(&self) -> &CompressionConfig {
        &self.inner.compression
    }

    /// Receive queue events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Add a file. A terminal item with the same id is reset to pending; a
    /// live one is left alone.
    pub fn enqueue(&self, file: VideoFile) -> Enqueued {
        let id = file.id();
        let result = {
            let mut state = self.state();
            match state.item(id).map(|existing| existing.status().is_terminal()) {
                Some(true) => {
                    self.requeue_locked(&mut state, id);
                    Enqueued::Requeued
                }
                Some(false) => Enqueued::AlreadyQueued,
                None => {
                    let output = state.claim_output(&file, &self.inner.compression);
                    debug!(file_id = %id, name = %file.name(), output = %output.display(), "Enqueued");
                    self.emit(QueueEvent::StatusChanged { file: file.clone() });
                    state.items.push(file);
                    state.pending.push_back(id);
                    Enqueued::Added
                }
            }
        };
        if result != Enqueued::AlreadyQueued {
            self.inner.wakeup.notify_one();
        }
        result
    }

    /// Put a terminal item back in the queue
    pub fn retry(&self, id: VideoFileId) -> Result<(), QueueError> {
        {
            let mut state = self.state();
            let file = state.item(id).ok_or(QueueError::NotFound(id))?;
            if !file.status().is_terminal() {
                return Err(QueueError::NotFinished(id));
            }
            self.requeue_locked(&mut state, id);
        }
        self.inner.wakeup.notify_one();
        Ok(())
    }

    /// Cancel one item: running items are stopped, pending ones are cancelled
    /// without starting. Returns whether anything changed.
    pub fn cancel(&self, id: VideoFileId) -> bool {
        let mut state = self.state();
        self.cancel_locked(&mut state, id)
    }

    /// Cancel whatever is running now
    pub fn cancel_current(&self) -> usize {
        let mut state = self.state();
        self.cancel_running_locked(&mut state)
    }

    /// Cancel running and pending items alike
    pub fn cancel_all(&self) -> usize {
        let mut state = self.state();
        let mut cancelled = self.cancel_running_locked(&mut state);
        let pending: Vec<VideoFileId> = state.pending.iter().copied().collect();
        for id in pending {
            if self.cancel_locked(&mut state, id) {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Remove an item that is not running
    pub fn remove(&self, id: VideoFileId) -> Result<VideoFile, QueueError> {
        let mut state = self.state();
        if state.active.contains_key(&id) || state.starting.contains(&id) {
            return Err(QueueError::Active(id));
        }
        let index = state
            .items
            .iter()
            .position(|file| file.id() == id)
            .ok_or(QueueError::NotFound(id))?;
        let file = state.items.remove(index);
        state.pending.retain(|pending| *pending != id);
        state.outputs.remove(&id);
        self.emit(QueueEvent::Removed { id });
        Ok(file)
    }

    pub fn snapshot(&self) -> Vec<VideoFile> {
        self.state().items.clone()
    }

    pub fn get(&self, id: VideoFileId) -> Option<VideoFile> {
        self.state().item(id).cloned()
    }

    /// Where the item's compressed file is written
    pub fn output_path(&self, id: VideoFileId) -> Option<PathBuf> {
        self.state().outputs.get(&id).cloned()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_items(&self.state().items)
    }

    pub fn is_running(&self) -> bool {
        self.stop_slot().is_some()
    }

    /// Ask a running `run` to halt: active items are cancelled, pending items
    /// stay pending. No effect when nothing is running.
    pub fn stop(&self) {
        if let Some(token) = self.stop_slot().as_ref() {
            info!("Stop requested");
            token.cancel();
        }
    }

    /// Drive the queue until no pending item is left or `stop` is called.
    ///
    /// When this returns no item is compressing. Concurrent calls return
    /// immediately with the current summary.
    pub async fn run(&self) -> BatchSummary {
        let stop = {
            let mut slot = self.stop_slot();
            if slot.is_some() {
                None
            } else {
                let token = CancellationToken::new();
                *slot = Some(token.clone());
                Some(token)
            }
        };
        let Some(stop) = stop else {
            warn!("Scheduler is already running");
            return self.summary();
        };
        info!(
            max_concurrent = self.inner.config.max_concurrent,
            max_retries = self.inner.config.max_retries,
            "Scheduler started"
        );

        let mut workers = JoinSet::new();
        let mut stopping = false;
        loop {
            while !stop.is_cancelled() && workers.len() < self.inner.config.max_concurrent {
                let Some(id) = self.dequeue() else { break };
                let worker = self.clone();
                let stop = stop.clone();
                workers.spawn(async move { worker.process(id, stop).await });
            }

            if workers.is_empty() && (stop.is_cancelled() || !self.has_pending()) {
                break;
            }

            tokio::select! {
                joined = workers.join_next(), if !workers.is_empty() => {
                    if let Some(Err(err)) = joined {
                        error!(error = %err, "Compression worker panicked");
                    }
                }
                _ = stop.cancelled(), if !stopping => {
                    stopping = true;
                    let cancelled = self.cancel_current();
                    info!(cancelled, "Stopping scheduler");
                }
                _ = self.inner.wakeup.notified() => {}
            }
        }

        *self.stop_slot() = None;
        let summary = self.summary();
        info!(
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            pending = summary.pending,
            bytes_saved = summary.bytes_saved,
            "Scheduler finished"
        );
        self.emit(QueueEvent::RunFinished {
            summary: summary.clone(),
        });
        summary
    }

    /// One item from dequeue to its final state, including automatic retries
    async fn process(&self, id: VideoFileId, stop: CancellationToken) {
        let mut retries_used = 0u32;
        loop {
            let Some((file, output)) = self.job(id) else { return };
            let retry_allowed =
                || retries_used < self.inner.config.max_retries && !stop.is_cancelled();

            let started = self
                .inner
                .supervisor
                .start_with_output(&file, &self.inner.compression, output)
                .await;
            let handle = match started {
                Ok(handle) => handle,
                Err(error) => {
                    warn!(file_id = %id, error = %error, "Compression could not start");
                    if self.fail_before_start(id, error, retry_allowed()) {
                        retries_used += 1;
                        continue;
                    }
                    return;
                }
            };

            if self.activate(id, &handle) || stop.is_cancelled() {
                handle.cancel();
            }

            let mut progress = handle.progress();
            while let Some(fraction) = progress.next().await {
                self.record_progress(id, fraction);
            }

            let outcome = handle.await_termination().await;
            if self.finish(id, outcome, retry_allowed()) {
                retries_used += 1;
                continue;
            }
            return;
        }
    }

    fn job(&self, id: VideoFileId) -> Option<(VideoFile, PathBuf)> {
        let state = self.state();
        let file = state.item(id)?.clone();
        let output = state.outputs.get(&id)?.clone();
        Some((file, output))
    }

    fn dequeue(&self) -> Option<VideoFileId> {
        let mut state = self.state();
        while let Some(id) = state.pending.pop_front() {
            if matches!(state.item(id).map(VideoFile::status), Some(CompressionStatus::Pending)) {
                state.starting.insert(id);
                return Some(id);
            }
        }
        None
    }

    fn has_pending(&self) -> bool {
        !self.state().pending.is_empty()
    }

    /// Mark a launched item compressing. Returns whether it must be cancelled
    /// right away because a cancel arrived while it was starting.
    fn activate(&self, id: VideoFileId, handle: &JobHandle) -> bool {
        let mut state = self.state();
        state.starting.remove(&id);
        let cancel = state.cancel_on_start.remove(&id);
        state.active.insert(id, handle.clone());
        self.apply_locked(&mut state, id, Transition::Start);
        cancel
    }

    fn record_progress(&self, id: VideoFileId, fraction: f64) {
        let mut state = self.state();
        let Some(file) = state.item_mut(id) else { return };
        if file.status() != &CompressionStatus::Compressing {
            return;
        }
        let before = file.progress();
        if file.apply(Transition::Progress(fraction)).is_ok() && file.progress() > before {
            self.emit(QueueEvent::Progress {
                id,
                progress: file.progress(),
            });
        }
    }

    /// Record the outcome of a run; returns whether the item was put back
    /// for another attempt
    fn finish(&self, id: VideoFileId, outcome: Outcome, retry_allowed: bool) -> bool {
        let mut state = self.state();
        state.active.remove(&id);
        state.cancel_on_start.remove(&id);
        self.apply_locked(&mut state, id, outcome.to_transition());

        match outcome {
            Outcome::Failed { error } if retry_allowed && error.is_retryable() => {
                self.retry_locked(&mut state, id, error);
                true
            }
            _ => false,
        }
    }

    /// Pre-flight failure: the item goes straight from pending to failed,
    /// or to cancelled if a cancel came in meanwhile
    fn fail_before_start(&self, id: VideoFileId, error: CompressionError, retry_allowed: bool) -> bool {
        let mut state = self.state();
        state.starting.remove(&id);
        if state.cancel_on_start.remove(&id) {
            self.apply_locked(&mut state, id, Transition::Cancel);
            return false;
        }

        let retry = retry_allowed && error.is_retryable();
        self.apply_locked(&mut state, id, Transition::Fail(error.clone()));
        if retry {
            self.retry_locked(&mut state, id, error);
        }
        retry
    }

    /// Failed → pending, kept by the current worker
    fn retry_locked(&self, state: &mut QueueState, id: VideoFileId, error: CompressionError) {
        let attempts = state.item(id).map(VideoFile::attempts).unwrap_or_default();
        info!(file_id = %id, attempts, kind = %error.kind(), "Retrying after failure");
        self.emit(QueueEvent::RetryScheduled { id, attempts, error });
        self.apply_locked(state, id, Transition::Reset);
        state.starting.insert(id);
    }

    fn requeue_locked(&self, state: &mut QueueState, id: VideoFileId) {
        self.apply_locked(state, id, Transition::Reset);
        state.pending.retain(|pending| *pending != id);
        state.pending.push_back(id);
    }

    fn cancel_locked(&self, state: &mut QueueState, id: VideoFileId) -> bool {
        if let Some(handle) = state.active.get(&id) {
            return handle.cancel();
        }
        if state.starting.contains(&id) {
            return state.cancel_on_start.insert(id);
        }
        if state.pending.contains(&id) {
            state.pending.retain(|pending| *pending != id);
            self.apply_locked(state, id, Transition::Cancel);
            return true;
        }
        false
    }

    fn cancel_running_locked(&self, state: &mut QueueState) -> usize {
        let mut cancelled = state.active.values().filter(|handle| handle.cancel()).count();
        let starting: Vec<VideoFileId> = state.starting.iter().copied().collect();
        for id in starting {
            if state.cancel_on_start.insert(id) {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Apply a transition and announce the new status
    fn apply_locked(&self, state: &mut QueueState, id: VideoFileId, transition: Transition) {
        let Some(file) = state.item_mut(id) else {
            warn!(file_id = %id, "Transition for an unknown item");
            return;
        };
        match file.apply(transition) {
            Ok(()) => {
                debug!(file_id = %id, status = %file.status(), "Status changed");
                self.emit(QueueEvent::StatusChanged { file: file.clone() });
            }
            Err(err) => error!(file_id = %id, error = %err, "Rejected status transition"),
        }
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.inner.stop.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
