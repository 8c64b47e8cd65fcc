//! Worker pool: one polling loop per worker, bounded by a semaphore.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use basis_core::CorrelationId;

use crate::methods::{ExecContext, MethodRegistry};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobHistory, Worker};

/// Histories are pruned at most this often per worker.
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Per-worker counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub claimed: u64,
    pub done: u64,
    pub failed: u64,
}

#[derive(Debug)]
struct WorkerHandle {
    spec: Worker,
    semaphore: Arc<Semaphore>,
    stats: Arc<Mutex<WorkerStats>>,
    task: JoinHandle<()>,
}

/// Runtime state of one worker, as reported to clients.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    #[serde(flatten)]
    pub spec: Worker,
    pub available_threads: usize,
    pub stats: WorkerStats,
}

/// Owns the worker loops. Created once at startup inside a tokio runtime.
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    methods: Arc<MethodRegistry>,
    defaults: Worker,
    workers: RwLock<HashMap<String, WorkerHandle>>,
    shutdown: watch::Sender<bool>,
    runtime: tokio::runtime::Handle,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.worker_names())
            .finish()
    }
}

impl WorkerPool {
    /// Must be called from within a tokio runtime. Histories left `running`
    /// by a previous process are marked aborted.
    pub fn new(
        store: Arc<dyn JobStore>,
        methods: Arc<MethodRegistry>,
        defaults: Worker,
    ) -> Result<Self, JobStoreError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| JobStoreError::Storage(format!("worker pool needs a tokio runtime: {e}")))?;
        let aborted = store.abort_running()?;
        if aborted > 0 {
            warn!(aborted, "marked interrupted jobs as aborted");
        }
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            store,
            methods,
            defaults,
            workers: RwLock::new(HashMap::new()),
            shutdown,
            runtime,
        })
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Start the loop of `spec`. A worker that is already running keeps its
    /// current settings.
    pub fn start_worker(&self, spec: Worker) {
        let mut workers = self.workers.write().unwrap_or_else(|p| p.into_inner());
        if workers.contains_key(&spec.name) {
            return;
        }
        let semaphore = Arc::new(Semaphore::new(spec.max_threads));
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let state = LoopState {
            spec: spec.clone(),
            store: self.store.clone(),
            methods: self.methods.clone(),
            semaphore: semaphore.clone(),
            stats: stats.clone(),
            runtime: self.runtime.clone(),
        };
        let task = self.runtime.spawn(worker_loop(state, self.shutdown.subscribe()));
        info!(
            worker = %spec.name,
            max_threads = spec.max_threads,
            pause_ms = spec.pause_time.as_millis() as u64,
            "worker started"
        );
        workers.insert(
            spec.name.clone(),
            WorkerHandle {
                spec,
                semaphore,
                stats,
                task,
            },
        );
    }

    /// Queue `model.method(params)` on `worker`, starting the worker with
    /// default settings if it does not exist yet.
    pub fn enqueue(
        &self,
        worker: &str,
        model: &str,
        method: &str,
        params: Value,
    ) -> Result<JobHistory, JobStoreError> {
        if !self.has_worker(worker) {
            let spec = Worker {
                name: worker.to_string(),
                ..self.defaults.clone()
            };
            self.start_worker(spec);
        }
        let history = self.store.enqueue(Job::new(worker, model, method, params))?;
        debug!(worker, job = %history.uuid, model, method, "job queued");
        Ok(history)
    }

    pub fn requeue(&self, uuid: CorrelationId) -> Result<JobHistory, JobStoreError> {
        let job = self.store.requeue(uuid)?;
        if !self.has_worker(&job.worker) {
            self.start_worker(Worker {
                name: job.worker.clone(),
                ..self.defaults.clone()
            });
        }
        info!(worker = %job.worker, job = %uuid, "job requeued");
        self.store.history(uuid)?.ok_or(JobStoreError::NotFound(uuid))
    }

    pub fn cancel(&self, uuid: CorrelationId) -> Result<JobHistory, JobStoreError> {
        let history = self.store.cancel(uuid)?;
        info!(worker = %history.worker, job = %uuid, "job cancelled");
        Ok(history)
    }

    pub fn has_worker(&self, name: &str) -> bool {
        self.workers
            .read()
            .map(|w| w.contains_key(name))
            .unwrap_or(false)
    }

    pub fn worker_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .workers
            .read()
            .map(|w| w.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn status(&self, name: &str) -> Option<WorkerStatus> {
        let workers = self.workers.read().ok()?;
        let handle = workers.get(name)?;
        Some(WorkerStatus {
            spec: handle.spec.clone(),
            available_threads: handle.semaphore.available_permits(),
            stats: handle
                .stats
                .lock()
                .map(|s| s.clone())
                .unwrap_or_default(),
        })
    }

    /// Stop every loop. Jobs already executing run to completion on their
    /// own; they are not awaited.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        info!(workers = self.worker_names().len(), "worker pool shutting down");
    }

    /// Whether every loop task has exited.
    pub fn is_stopped(&self) -> bool {
        self.workers
            .read()
            .map(|w| w.values().all(|h| h.task.is_finished()))
            .unwrap_or(true)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

struct LoopState {
    spec: Worker,
    store: Arc<dyn JobStore>,
    methods: Arc<MethodRegistry>,
    semaphore: Arc<Semaphore>,
    stats: Arc<Mutex<WorkerStats>>,
    runtime: tokio::runtime::Handle,
}

async fn worker_loop(state: LoopState, mut shutdown: watch::Receiver<bool>) {
    let name = state.spec.name.clone();
    let mut last_prune: Option<Instant> = None;
    debug!(worker = %name, "worker loop running");

    loop {
        if *shutdown.borrow() {
            break;
        }
        if last_prune.is_none_or(|at| at.elapsed() >= PRUNE_INTERVAL) {
            prune(&state);
            last_prune = Some(Instant::now());
        }

        if let Ok(permit) = state.semaphore.clone().try_acquire_owned() {
            match state.store.claim_next(&name) {
                Ok(Some(job)) => {
                    execute(&state, job, permit);
                    continue;
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    error!(worker = %name, error = %e, "failed to claim job");
                    drop(permit);
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(state.spec.pause_time) => {}
            _ = shutdown.changed() => {}
        }
    }

    info!(worker = %name, "worker stopped");
}

fn prune(state: &LoopState) {
    let Some(cutoff) = state.spec.history_retention.cutoff(Utc::now()) else {
        return;
    };
    match state.store.prune_histories(&state.spec.name, cutoff) {
        Ok(0) => {}
        Ok(pruned) => info!(worker = %state.spec.name, pruned, "pruned job history"),
        Err(e) => warn!(worker = %state.spec.name, error = %e, "history pruning failed"),
    }
}

/// Run a claimed job. The permit is released when the job ends, whatever
/// the outcome.
fn execute(state: &LoopState, job: Job, permit: OwnedSemaphorePermit) {
    let worker = state.spec.name.clone();
    let uuid = job.uuid;
    bump(&state.stats, |s| s.claimed += 1);
    if let Err(e) = state.store.mark_running(uuid, Utc::now()) {
        warn!(worker = %worker, job = %uuid, error = %e, "could not mark job running");
    }

    let entry = match state.methods.resolve(&job.model, &job.method) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(worker = %worker, job = %uuid, error = %e, "job target not found");
            drop(permit);
            finish(&*state.store, &state.stats, &worker, uuid, Err(e.to_string()));
            return;
        }
    };

    let store = state.store.clone();
    let stats = state.stats.clone();
    state.runtime.spawn(async move {
        let params = job.params;
        let outcome = tokio::task::spawn_blocking(move || {
            entry.invoke(&ExecContext::superuser(), params)
        })
        .await;
        let result = match outcome {
            Ok(Ok(value)) => Ok(output_text(&value)),
            Ok(Err(e)) => Err(e.to_string()),
            Err(join) => Err(panic_text(join)),
        };
        drop(permit);
        finish(&*store, &stats, &worker, uuid, result);
    });
}

fn finish(
    store: &dyn JobStore,
    stats: &Mutex<WorkerStats>,
    worker: &str,
    uuid: CorrelationId,
    result: Result<String, String>,
) {
    let now = Utc::now();
    let recorded = match result {
        Ok(output) => {
            bump(stats, |s| s.done += 1);
            debug!(worker, job = %uuid, "job done");
            store.mark_done(uuid, output, now)
        }
        Err(message) => {
            bump(stats, |s| s.failed += 1);
            warn!(worker, job = %uuid, error = %message, "job failed");
            store.mark_failed(uuid, &message, now)
        }
    };
    if let Err(e) = recorded {
        error!(worker, job = %uuid, error = %e, "could not record job result");
    }
}

fn bump(stats: &Mutex<WorkerStats>, f: impl FnOnce(&mut WorkerStats)) {
    if let Ok(mut s) = stats.lock() {
        f(&mut s);
    }
}

fn output_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn panic_text(join: tokio::task::JoinError) -> String {
    if !join.is_panic() {
        return join.to_string();
    }
    let payload = join.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use basis_auth::{AccessKind, SecurityRegistry};
    use basis_core::DomainError;
    use serde_json::json;

    use crate::jobs::{HistoryRetention, InMemoryJobStore, JobStatus, MAIN_WORKER};
    use crate::methods::MethodError;

    fn fast(name: &str, threads: usize) -> Worker {
        Worker::new(name)
            .with_max_threads(threads)
            .with_pause_time(Duration::from_millis(5))
    }

    fn registry(configure: impl FnOnce(&mut MethodRegistry)) -> Arc<MethodRegistry> {
        let mut registry = MethodRegistry::new(Arc::new(SecurityRegistry::new()));
        registry.register("Echo", "echo", AccessKind::Read, |_ctx, params| Ok(params));
        registry.register("Echo", "fail", AccessKind::Read, |_ctx, _params| {
            Err(MethodError::Domain(DomainError::validation(
                "no luck\n----------\nat echo.rs:1",
            )))
        });
        registry.register("Echo", "panic", AccessKind::Read, |_ctx, _params| {
            panic!("kaboom")
        });
        registry.register("Echo", "whoami", AccessKind::Read, |ctx, _params| {
            Ok(json!(ctx.uid))
        });
        configure(&mut registry);
        Arc::new(registry)
    }

    fn pool(methods: Arc<MethodRegistry>) -> (WorkerPool, Arc<InMemoryJobStore>) {
        let store = InMemoryJobStore::arc();
        let pool = WorkerPool::new(store.clone(), methods, fast("default", 1)).unwrap();
        (pool, store)
    }

    async fn wait_final(store: &InMemoryJobStore, uuid: CorrelationId) -> JobHistory {
        for _ in 0..400 {
            if let Some(h) = store.history(uuid).unwrap() {
                if h.status.is_final() {
                    return h;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {uuid} did not finish");
    }

    #[tokio::test]
    async fn successful_job_records_output() {
        let (pool, store) = pool(registry(|_| {}));
        pool.start_worker(fast(MAIN_WORKER, 2));
        let queued = pool.enqueue(MAIN_WORKER, "Echo", "echo", json!("hello")).unwrap();
        let done = wait_final(&store, queued.uuid).await;
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.output.as_deref(), Some("hello"));
        assert!(done.started_at.is_some() && done.returned_at.is_some());

        let whoami = pool.enqueue(MAIN_WORKER, "Echo", "whoami", Value::Null).unwrap();
        assert_eq!(wait_final(&store, whoami.uuid).await.output.as_deref(), Some("1"));
        pool.shutdown();
    }

    #[tokio::test]
    async fn unknown_model_fails_without_leaking_a_permit() {
        let (pool, store) = pool(registry(|_| {}));
        pool.start_worker(fast(MAIN_WORKER, 1));
        let missing = pool.enqueue(MAIN_WORKER, "Ghost", "haunt", json!({})).unwrap();
        let failed = wait_final(&store, missing.uuid).await;
        assert_eq!(failed.status, JobStatus::Fail);
        assert!(failed.exception.unwrap().contains("Ghost"));

        // The single slot is free again: the next job runs.
        let next = pool.enqueue(MAIN_WORKER, "Echo", "echo", json!(1)).unwrap();
        assert_eq!(wait_final(&store, next.uuid).await.status, JobStatus::Done);
        assert_eq!(pool.status(MAIN_WORKER).unwrap().available_threads, 1);
        pool.shutdown();
    }

    #[tokio::test]
    async fn errors_and_panics_are_captured() {
        let (pool, store) = pool(registry(|_| {}));
        pool.start_worker(fast(MAIN_WORKER, 1));
        let failing = pool.enqueue(MAIN_WORKER, "Echo", "fail", Value::Null).unwrap();
        let panicking = pool.enqueue(MAIN_WORKER, "Echo", "panic", Value::Null).unwrap();

        let failed = wait_final(&store, failing.uuid).await;
        assert_eq!(failed.status, JobStatus::Fail);
        assert_eq!(failed.exception.as_deref(), Some("validation failed: no luck"));

        let panicked = wait_final(&store, panicking.uuid).await;
        assert_eq!(panicked.status, JobStatus::Fail);
        assert_eq!(panicked.exception.as_deref(), Some("panic: kaboom"));

        let status = pool.status(MAIN_WORKER).unwrap();
        assert_eq!(status.stats.failed, 2);
        assert_eq!(status.available_threads, 1);
        pool.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_max_threads() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());
        let methods = registry(move |reg| {
            reg.register("Echo", "slow", AccessKind::Read, move |_ctx, _params| {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            });
        });
        let (pool, store) = pool(methods);
        pool.start_worker(fast("Batch", 2));
        let queued: Vec<_> = (0..8)
            .map(|_| pool.enqueue("Batch", "Echo", "slow", Value::Null).unwrap())
            .collect();
        for job in &queued {
            assert_eq!(wait_final(&store, job.uuid).await.status, JobStatus::Done);
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        pool.shutdown();
    }

    #[tokio::test]
    async fn enqueue_on_unknown_worker_creates_it() {
        let (pool, store) = pool(registry(|_| {}));
        assert!(!pool.has_worker("Reports"));
        let job = pool.enqueue("Reports", "Echo", "echo", json!(2)).unwrap();
        assert!(pool.has_worker("Reports"));
        assert_eq!(wait_final(&store, job.uuid).await.status, JobStatus::Done);
        assert_eq!(pool.status("Reports").unwrap().spec.max_threads, 1);
        pool.shutdown();
    }

    #[tokio::test]
    async fn failed_job_can_be_requeued_manually() {
        let (pool, store) = pool(registry(|_| {}));
        pool.start_worker(fast(MAIN_WORKER, 1));
        let job = pool.enqueue(MAIN_WORKER, "Echo", "fail", Value::Null).unwrap();
        assert_eq!(wait_final(&store, job.uuid).await.status, JobStatus::Fail);

        // Nothing retries on its own.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.history(job.uuid).unwrap().unwrap().status, JobStatus::Fail);

        let requeued = pool.requeue(job.uuid).unwrap();
        assert_eq!(requeued.status, JobStatus::Pending);
        assert_eq!(wait_final(&store, job.uuid).await.status, JobStatus::Fail);
        assert_eq!(pool.status(MAIN_WORKER).unwrap().stats.claimed, 2);
        pool.shutdown();
    }

    #[tokio::test]
    async fn running_histories_are_aborted_on_start() {
        let store = InMemoryJobStore::arc();
        let job = Job::new(MAIN_WORKER, "Echo", "echo", Value::Null);
        let uuid = job.uuid;
        store.enqueue(job).unwrap();
        store.claim_next(MAIN_WORKER).unwrap();
        store.mark_running(uuid, Utc::now()).unwrap();

        let _pool = WorkerPool::new(store.clone(), registry(|_| {}), fast("d", 1)).unwrap();
        assert_eq!(store.history(uuid).unwrap().unwrap().status, JobStatus::Abort);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loops() {
        let (pool, _store) = pool(registry(|_| {}));
        pool.start_worker(fast(MAIN_WORKER, 1));
        pool.start_worker(fast("Other", 1));
        pool.shutdown();
        for _ in 0..200 {
            if pool.is_stopped() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(pool.is_stopped());
    }

    #[tokio::test]
    async fn retention_prunes_old_histories() {
        let store = InMemoryJobStore::arc();
        let job = Job::new("Short", "Echo", "echo", Value::Null);
        let uuid = job.uuid;
        store.enqueue(job).unwrap();
        store.claim_next("Short").unwrap();
        store
            .mark_done(uuid, "old".into(), Utc::now() - chrono::Duration::days(10))
            .unwrap();

        let pool = WorkerPool::new(store.clone(), registry(|_| {}), fast("d", 1)).unwrap();
        pool.start_worker(fast("Short", 1).with_retention(HistoryRetention::Days(3)));
        for _ in 0..200 {
            if store.history(uuid).unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(store.history(uuid).unwrap().is_none());
        pool.shutdown();
    }
}
