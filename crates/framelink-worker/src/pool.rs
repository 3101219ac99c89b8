//! Worker pool: selection, correlation, failure isolation and replacement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use framelink_frame::{FrameConfig, RawFrame};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::error::{Result, WorkerError};
use crate::message::{BufferStats, RequestId, RequestKind, ResponseKind, WorkerId, WorkerRequest};
use crate::parser::{ExtractorParser, ParserFactory};
use crate::stats::{Counters, PoolStats};
use crate::worker::{self, WorkerEvent};

/// Lifecycle state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
    Error,
}

/// Point-in-time view of one worker.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    pub state: WorkerState,
    pub pending: usize,
    pub idle_for: Duration,
}

/// Notifications published by the pool.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Initialized { workers: usize },
    WorkerFailed { worker: WorkerId, message: String },
    WorkerReplaced { old: WorkerId, new: WorkerId },
    ProcessingError { message: String },
}

type Reply = oneshot::Sender<Result<ResponseKind>>;

struct WorkerInstance {
    id: WorkerId,
    state: WorkerState,
    last_used: Instant,
    pending: HashMap<RequestId, Reply>,
    requests: mpsc::UnboundedSender<WorkerRequest>,
}

impl WorkerInstance {
    /// Rejects every pending request. Dropping the instance closes the
    /// request channel, which stops the thread once it is idle.
    fn reject_pending(&mut self, err: &WorkerError) {
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(err.clone()));
        }
    }
}

#[derive(Default)]
struct PoolState {
    workers: Vec<WorkerInstance>,
    load_balance_index: usize,
    counters: Counters,
    frame_config: Option<FrameConfig>,
}

impl PoolState {
    fn position(&self, worker: WorkerId) -> Option<usize> {
        self.workers.iter().position(|w| w.id == worker)
    }

    /// First idle worker, else round-robin over workers not in error.
    fn select_worker(&mut self) -> Option<WorkerId> {
        if let Some(w) = self.workers.iter().find(|w| w.state == WorkerState::Idle) {
            return Some(w.id);
        }
        let len = self.workers.len();
        for _ in 0..len {
            self.load_balance_index = (self.load_balance_index + 1) % len;
            let w = &self.workers[self.load_balance_index];
            if w.state != WorkerState::Error {
                return Some(w.id);
            }
        }
        None
    }
}

struct PoolInner {
    state: Mutex<PoolState>,
    factory: ParserFactory,
    request_timeout: Duration,
    threaded: AtomicBool,
    destroyed: AtomicBool,
    next_request: AtomicU64,
    next_worker: AtomicU64,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PoolEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Pool of parser workers.
///
/// Cloning is cheap; clones share the same workers.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.worker_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl WorkerPool {
    /// Creates a pool of [`ExtractorParser`] workers.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::with_factory(config, ExtractorParser::factory())
    }

    /// Creates a pool whose workers run parsers built by `factory`.
    ///
    /// Fails with [`WorkerError::NoRuntime`] outside a tokio runtime; no
    /// worker is started in that case.
    pub fn with_factory(config: PoolConfig, factory: ParserFactory) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| WorkerError::NoRuntime)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                frame_config: config.frame_config.clone(),
                ..PoolState::default()
            }),
            factory,
            request_timeout: config.request_timeout,
            threaded: AtomicBool::new(config.threaded_extraction),
            destroyed: AtomicBool::new(false),
            next_request: AtomicU64::new(0),
            next_worker: AtomicU64::new(0),
            events_tx,
            subscribers: Mutex::new(Vec::new()),
            pump: Mutex::new(None),
        });

        {
            let mut state = inner.state.lock();
            for _ in 0..config.max_workers {
                if let Some(instance) = inner.spawn_worker(state.frame_config.clone()) {
                    state.workers.push(instance);
                }
            }
            state.counters.active_workers = state.workers.len();
            info!(
                workers = state.workers.len(),
                requested = config.max_workers,
                "worker pool initialized"
            );
        }

        let pump = runtime.spawn(pump(Arc::downgrade(&inner), events_rx));
        *inner.pump.lock() = Some(pump);

        Ok(Self { inner })
    }

    /// Subscribes to pool events. `Initialized` is delivered immediately.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PoolEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(PoolEvent::Initialized {
            workers: self.worker_count(),
        });
        self.inner.subscribers.lock().push(tx);
        rx
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.inner.state.lock().workers.len()
    }

    pub fn threaded_extraction(&self) -> bool {
        self.inner.threaded.load(Ordering::SeqCst)
    }

    pub fn set_threaded_extraction(&self, enabled: bool) {
        self.inner.threaded.store(enabled, Ordering::SeqCst);
    }

    /// Parses one chunk on a selected worker.
    ///
    /// A worker found with a closed request channel is replaced and the
    /// chunk goes to the next selected worker once.
    ///
    /// Dropping the returned future before it resolves abandons the chunk:
    /// the worker still parses it, then clears its buffer.
    pub async fn process_data(&self, data: Bytes) -> Result<Vec<RawFrame>> {
        self.ensure_alive()?;
        let started = Instant::now();
        let mut worker = self.select_worker()?;
        let mut response = self
            .send_request(worker, RequestKind::ProcessData(data.clone()))
            .await;
        if let Err(WorkerError::Disconnected(dead)) = response {
            debug!(worker = %dead, "retrying chunk on another worker");
            worker = self.select_worker()?;
            response = self
                .send_request(worker, RequestKind::ProcessData(data))
                .await;
        }

        let result = match response {
            Ok(ResponseKind::FrameProcessed(frames)) => {
                self.inner
                    .state
                    .lock()
                    .counters
                    .record_processing_time(started.elapsed());
                Ok(frames)
            }
            Ok(other) => Err(WorkerError::UnexpectedResponse {
                worker,
                response: other.label(),
            }),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            if !err.is_pool_destroyed() {
                self.inner.publish(PoolEvent::ProcessingError {
                    message: err.to_string(),
                });
            }
        }
        result
    }

    /// Splits `chunks` into one group per worker and processes the groups
    /// concurrently, each group in order. Failed chunks are logged and
    /// skipped.
    pub async fn process_batch(&self, chunks: Vec<Bytes>) -> Result<Vec<RawFrame>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_alive()?;

        let per_group = chunks.len().div_ceil(self.worker_count().max(1));
        let groups = chunks.chunks(per_group).map(|group| async move {
            let mut frames = Vec::new();
            for data in group {
                match self.process_data(data.clone()).await {
                    Ok(mut out) => frames.append(&mut out),
                    Err(err) => warn!(error = %err, "batch chunk failed"),
                }
            }
            frames
        });

        Ok(join_all(groups).await.into_iter().flatten().collect())
    }

    /// Sends `config` to every worker. Workers spawned later start with it.
    pub async fn configure(&self, config: FrameConfig) -> Result<()> {
        self.ensure_alive()?;
        self.inner.state.lock().frame_config = Some(config.clone());
        self.broadcast(
            || RequestKind::Configure(config.clone()),
            |kind| matches!(kind, ResponseKind::Configured),
        )
        .await
        .map(|_| ())
    }

    /// Clears every worker's buffer.
    pub async fn reset_workers(&self) -> Result<()> {
        self.ensure_alive()?;
        self.broadcast(
            || RequestKind::Reset,
            |kind| matches!(kind, ResponseKind::Reset),
        )
        .await
        .map(|_| ())
    }

    /// Collects buffer statistics from every worker that answers.
    pub async fn worker_buffer_stats(&self) -> Result<Vec<(WorkerId, BufferStats)>> {
        self.ensure_alive()?;
        let workers = self.worker_ids();
        let results = join_all(
            workers
                .iter()
                .map(|&w| self.send_request(w, RequestKind::GetStats)),
        )
        .await;

        let mut stats = Vec::with_capacity(workers.len());
        for (worker, result) in workers.into_iter().zip(results) {
            match result {
                Ok(ResponseKind::Stats(s)) => stats.push((worker, s)),
                Ok(other) => debug!(%worker, response = other.label(), "unexpected stats reply"),
                Err(err) => debug!(%worker, error = %err, "stats request failed"),
            }
        }
        Ok(stats)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        let count = |s: WorkerState| state.workers.iter().filter(|w| w.state == s).count();
        PoolStats {
            total_requests: state.counters.total_requests,
            completed_requests: state.counters.completed_requests,
            error_requests: state.counters.error_requests,
            average_processing_time: state.counters.average_processing_time,
            active_workers: state.counters.active_workers,
            worker_count: state.workers.len(),
            idle_workers: count(WorkerState::Idle),
            busy_workers: count(WorkerState::Busy),
            error_workers: count(WorkerState::Error),
            pending_requests: state.workers.iter().map(|w| w.pending.len()).sum(),
            threaded_extraction: self.threaded_extraction(),
        }
    }

    pub fn workers(&self) -> Vec<WorkerSnapshot> {
        let state = self.inner.state.lock();
        state
            .workers
            .iter()
            .map(|w| WorkerSnapshot {
                id: w.id,
                state: w.state,
                pending: w.pending.len(),
                idle_for: w.last_used.elapsed(),
            })
            .collect()
    }

    /// Rejects all pending requests with [`WorkerError::PoolDestroyed`] and
    /// stops every worker. Idempotent.
    ///
    /// A worker blocked inside its parser finishes that call before its
    /// thread exits; its answer is discarded.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let workers = {
            let mut state = self.inner.state.lock();
            state.counters.active_workers = 0;
            std::mem::take(&mut state.workers)
        };
        let count = workers.len();
        for mut instance in workers {
            instance.reject_pending(&WorkerError::PoolDestroyed);
        }

        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
        self.inner.subscribers.lock().clear();
        info!(workers = count, "worker pool destroyed");
    }

    fn select_worker(&self) -> Result<WorkerId> {
        self.inner
            .state
            .lock()
            .select_worker()
            .ok_or(WorkerError::NoAvailableWorkers)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(WorkerError::PoolDestroyed)
        } else {
            Ok(())
        }
    }

    fn worker_ids(&self) -> Vec<WorkerId> {
        self.inner.state.lock().workers.iter().map(|w| w.id).collect()
    }

    async fn broadcast(
        &self,
        request: impl Fn() -> RequestKind,
        accept: impl Fn(&ResponseKind) -> bool,
    ) -> Result<Vec<WorkerId>> {
        let workers = self.worker_ids();
        let label = request().label();
        let results = join_all(workers.iter().map(|&w| self.send_request(w, request()))).await;

        let mut failed = Vec::new();
        for (worker, result) in workers.iter().zip(results) {
            match result {
                Ok(kind) if accept(&kind) => {}
                Ok(kind) => {
                    warn!(%worker, response = kind.label(), "{label} rejected");
                    failed.push(*worker);
                }
                Err(WorkerError::PoolDestroyed) => return Err(WorkerError::PoolDestroyed),
                Err(err) => {
                    warn!(%worker, error = %err, "{label} failed");
                    failed.push(*worker);
                }
            }
        }

        if failed.is_empty() {
            Ok(workers)
        } else {
            Err(WorkerError::BroadcastFailed {
                request: label,
                failed,
            })
        }
    }

    async fn send_request(&self, worker: WorkerId, kind: RequestKind) -> Result<ResponseKind> {
        let id = RequestId::new(self.inner.next_request.fetch_add(1, Ordering::SeqCst) + 1);
        let label = kind.label();
        let buffered = matches!(kind, RequestKind::ProcessData(_));
        let (reply_tx, reply_rx) = oneshot::channel();

        let sent = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let idx = state
                .position(worker)
                .ok_or(WorkerError::WorkerNotFound(worker))?;
            let instance = &mut state.workers[idx];
            let sent = instance.requests.send(WorkerRequest { id, kind }).is_ok();
            if sent {
                instance.pending.insert(id, reply_tx);
                instance.state = WorkerState::Busy;
                state.counters.total_requests += 1;
            }
            sent
        };
        if !sent {
            // The thread is gone without reporting it.
            self.inner
                .replace_worker(worker, "request channel closed".to_string());
            return Err(WorkerError::Disconnected(worker));
        }

        // Also runs when the caller drops this future early.
        let _cleanup = PendingCleanup {
            inner: &self.inner,
            worker,
            id,
            buffered,
        };

        let timeout = self.inner.request_timeout;
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            // Reply dropped without an answer: the pool went away.
            Ok(Err(_)) => Err(WorkerError::PoolDestroyed),
            Err(_) => {
                warn!(%worker, request = %id, "{label} timed out");
                Err(WorkerError::Timeout {
                    request: label,
                    after: timeout,
                })
            }
        }
    }
}

/// Removes a correlation entry once its caller stops waiting.
///
/// An entry still present at that point was abandoned. If the request fed
/// the worker's buffer, a reset is queued behind it so the abandoned bytes
/// do not leak into the worker's next frame.
struct PendingCleanup<'a> {
    inner: &'a PoolInner,
    worker: WorkerId,
    id: RequestId,
    buffered: bool,
}

impl Drop for PendingCleanup<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        let Some(idx) = state.position(self.worker) else {
            return;
        };
        let instance = &mut state.workers[idx];
        if instance.pending.remove(&self.id).is_none() || !self.buffered {
            return;
        }
        let id = RequestId::new(self.inner.next_request.fetch_add(1, Ordering::SeqCst) + 1);
        if instance
            .requests
            .send(WorkerRequest {
                id,
                kind: RequestKind::Reset,
            })
            .is_ok()
        {
            debug!(worker = %self.worker, abandoned = %self.id, "worker buffer reset queued");
        }
    }
}

impl PoolInner {
    fn spawn_worker(&self, frame_config: Option<FrameConfig>) -> Option<WorkerInstance> {
        let id = WorkerId(self.next_worker.fetch_add(1, Ordering::SeqCst) + 1);
        match worker::spawn(id, &self.factory, frame_config, self.events_tx.clone()) {
            Ok(thread) => {
                debug!(worker = %id, "worker spawned");
                // Detached; the thread exits when its request channel closes.
                drop(thread.handle);
                Some(WorkerInstance {
                    id,
                    state: WorkerState::Idle,
                    last_used: Instant::now(),
                    pending: HashMap::new(),
                    requests: thread.requests,
                })
            }
            Err(err) => {
                error!(worker = %id, error = %err, "failed to spawn worker thread");
                None
            }
        }
    }

    fn publish(&self, event: PoolEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn handle_event(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::Response { worker, response } => {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                let Some(idx) = state.position(worker) else {
                    debug!(%worker, request = %response.id, "response from retired worker discarded");
                    return;
                };
                let instance = &mut state.workers[idx];
                instance.state = WorkerState::Idle;
                instance.last_used = Instant::now();

                let Some(reply) = instance.pending.remove(&response.id) else {
                    debug!(%worker, request = %response.id, "late response discarded");
                    return;
                };
                let result = match response.kind {
                    ResponseKind::Error(message) => {
                        state.counters.error_requests += 1;
                        Err(WorkerError::Processing { worker, message })
                    }
                    kind => {
                        state.counters.completed_requests += 1;
                        Ok(kind)
                    }
                };
                let _ = reply.send(result);
            }
            WorkerEvent::Failed { worker, message } => {
                self.replace_worker(worker, message);
            }
            WorkerEvent::Exited { worker, code } => {
                // Workers that failed or were retired are already gone.
                if self.state.lock().position(worker).is_some() {
                    self.replace_worker(worker, format!("worker exited with code {code}"));
                }
            }
        }
    }

    /// Removes a failed worker, rejects its pending requests and spawns a
    /// replacement at the same position.
    fn replace_worker(&self, worker: WorkerId, message: String) {
        let replaced = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(idx) = state.position(worker) else {
                return;
            };
            error!(%worker, error = %message, "worker failed");

            let mut failed = state.workers.remove(idx);
            failed.state = WorkerState::Error;
            state.counters.error_requests += 1;
            failed.reject_pending(&WorkerError::WorkerFailed {
                worker,
                message: message.clone(),
            });
            drop(failed);

            let replacement = if self.destroyed.load(Ordering::SeqCst) {
                None
            } else {
                self.spawn_worker(state.frame_config.clone())
            };
            let replaced = replacement.map(|instance| {
                let id = instance.id;
                state.workers.insert(idx, instance);
                id
            });
            state.counters.active_workers = state.workers.len();
            replaced
        };

        self.publish(PoolEvent::WorkerFailed { worker, message });
        if let Some(new) = replaced {
            info!(old = %worker, %new, "worker replaced");
            self.publish(PoolEvent::WorkerReplaced { old: worker, new });
        }
    }
}

async fn pump(pool: Weak<PoolInner>, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = pool.upgrade() else {
            break;
        };
        inner.handle_event(event);
    }
}
