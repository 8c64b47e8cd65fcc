//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use basis_core::CorrelationId;

use super::types::{Job, JobHistory, JobStatus};

/// Job store abstraction.
///
/// A job and its history row are created together; claiming a job removes it
/// while the history row stays behind.
pub trait JobStore: Send + Sync {
    /// Queue a job and create its pending history row.
    fn enqueue(&self, job: Job) -> Result<JobHistory, JobStoreError>;

    /// Atomically take the oldest pending job of `worker`.
    fn claim_next(&self, worker: &str) -> Result<Option<Job>, JobStoreError>;

    fn history(&self, uuid: CorrelationId) -> Result<Option<JobHistory>, JobStoreError>;

    /// Histories, newest first.
    fn list_histories(
        &self,
        worker: Option<&str>,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<JobHistory>, JobStoreError>;

    /// Jobs still waiting, oldest first.
    fn pending_jobs(&self, worker: Option<&str>) -> Result<Vec<Job>, JobStoreError>;

    fn mark_running(&self, uuid: CorrelationId, at: DateTime<Utc>) -> Result<(), JobStoreError>;

    fn mark_done(&self, uuid: CorrelationId, output: String, at: DateTime<Utc>) -> Result<(), JobStoreError>;

    fn mark_failed(&self, uuid: CorrelationId, error: &str, at: DateTime<Utc>) -> Result<(), JobStoreError>;

    /// Queue a finished job again.
    fn requeue(&self, uuid: CorrelationId) -> Result<Job, JobStoreError>;

    /// Drop a job that has not started yet.
    fn cancel(&self, uuid: CorrelationId) -> Result<JobHistory, JobStoreError>;

    /// Mark rows left `running` by a previous process as aborted.
    fn abort_running(&self) -> Result<usize, JobStoreError>;

    /// Delete finished rows of `worker` that ended before `before`.
    fn prune_histories(&self, worker: &str, before: DateTime<Utc>) -> Result<usize, JobStoreError>;

    fn stats(&self, worker: Option<&str>) -> Result<JobStats, JobStoreError>;
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobHistory, JobStoreError> {
        (**self).enqueue(job)
    }

    fn claim_next(&self, worker: &str) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(worker)
    }

    fn history(&self, uuid: CorrelationId) -> Result<Option<JobHistory>, JobStoreError> {
        (**self).history(uuid)
    }

    fn list_histories(
        &self,
        worker: Option<&str>,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<JobHistory>, JobStoreError> {
        (**self).list_histories(worker, status, limit)
    }

    fn pending_jobs(&self, worker: Option<&str>) -> Result<Vec<Job>, JobStoreError> {
        (**self).pending_jobs(worker)
    }

    fn mark_running(&self, uuid: CorrelationId, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        (**self).mark_running(uuid, at)
    }

    fn mark_done(&self, uuid: CorrelationId, output: String, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        (**self).mark_done(uuid, output, at)
    }

    fn mark_failed(&self, uuid: CorrelationId, error: &str, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        (**self).mark_failed(uuid, error, at)
    }

    fn requeue(&self, uuid: CorrelationId) -> Result<Job, JobStoreError> {
        (**self).requeue(uuid)
    }

    fn cancel(&self, uuid: CorrelationId) -> Result<JobHistory, JobStoreError> {
        (**self).cancel(uuid)
    }

    fn abort_running(&self) -> Result<usize, JobStoreError> {
        (**self).abort_running()
    }

    fn prune_histories(&self, worker: &str, before: DateTime<Utc>) -> Result<usize, JobStoreError> {
        (**self).prune_histories(worker, before)
    }

    fn stats(&self, worker: Option<&str>) -> Result<JobStats, JobStoreError> {
        (**self).stats(worker)
    }
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(CorrelationId),
    #[error("job already exists: {0}")]
    AlreadyExists(CorrelationId),
    #[error("job {uuid} is {status}")]
    InvalidState { uuid: CorrelationId, status: JobStatus },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Counts of history rows per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub aborted: usize,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<CorrelationId, Job>,
    histories: HashMap<CorrelationId, JobHistory>,
}

/// In-memory job store. Jobs and histories share one lock so that
/// enqueue and claim are atomic.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, JobStoreError> {
        self.inner
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))
    }

    fn update_history(
        &self,
        uuid: CorrelationId,
        change: impl FnOnce(&mut JobHistory),
    ) -> Result<(), JobStoreError> {
        let mut inner = self.write()?;
        let history = inner
            .histories
            .get_mut(&uuid)
            .ok_or(JobStoreError::NotFound(uuid))?;
        change(history);
        Ok(())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobHistory, JobStoreError> {
        let mut inner = self.write()?;
        if inner.histories.contains_key(&job.uuid) {
            return Err(JobStoreError::AlreadyExists(job.uuid));
        }
        let history = JobHistory::pending(&job);
        inner.histories.insert(job.uuid, history.clone());
        inner.jobs.insert(job.uuid, job);
        Ok(history)
    }

    fn claim_next(&self, worker: &str) -> Result<Option<Job>, JobStoreError> {
        let mut inner = self.write()?;
        let next = inner
            .jobs
            .values()
            .filter(|j| j.worker == worker)
            .min_by_key(|j| (j.created_at, *j.uuid.as_uuid()))
            .map(|j| j.uuid);
        Ok(next.and_then(|uuid| inner.jobs.remove(&uuid)))
    }

    fn history(&self, uuid: CorrelationId) -> Result<Option<JobHistory>, JobStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;
        Ok(inner.histories.get(&uuid).cloned())
    }

    fn list_histories(
        &self,
        worker: Option<&str>,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<JobHistory>, JobStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;
        let mut rows: Vec<JobHistory> = inner
            .histories
            .values()
            .filter(|h| worker.is_none_or(|w| h.worker == w))
            .filter(|h| status.is_none_or(|s| h.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        rows.truncate(limit);
        Ok(rows)
    }

    fn pending_jobs(&self, worker: Option<&str>) -> Result<Vec<Job>, JobStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| worker.is_none_or(|w| j.worker == w))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    fn mark_running(&self, uuid: CorrelationId, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        self.update_history(uuid, |h| h.mark_running(at))
    }

    fn mark_done(&self, uuid: CorrelationId, output: String, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        self.update_history(uuid, |h| h.mark_done(output, at))
    }

    fn mark_failed(&self, uuid: CorrelationId, error: &str, at: DateTime<Utc>) -> Result<(), JobStoreError> {
        self.update_history(uuid, |h| h.mark_failed(error, at))
    }

    fn requeue(&self, uuid: CorrelationId) -> Result<Job, JobStoreError> {
        let mut inner = self.write()?;
        let now = Utc::now();
        let history = inner
            .histories
            .get_mut(&uuid)
            .ok_or(JobStoreError::NotFound(uuid))?;
        if !history.status.is_final() {
            return Err(JobStoreError::InvalidState {
                uuid,
                status: history.status,
            });
        }
        history.reset(now);
        let job = history.to_job(now);
        inner.jobs.insert(uuid, job.clone());
        Ok(job)
    }

    fn cancel(&self, uuid: CorrelationId) -> Result<JobHistory, JobStoreError> {
        let mut inner = self.write()?;
        let status = inner
            .histories
            .get(&uuid)
            .map(|h| h.status)
            .ok_or(JobStoreError::NotFound(uuid))?;
        if status != JobStatus::Pending || inner.jobs.remove(&uuid).is_none() {
            return Err(JobStoreError::InvalidState { uuid, status });
        }
        let history = inner
            .histories
            .get_mut(&uuid)
            .ok_or(JobStoreError::NotFound(uuid))?;
        history.status = JobStatus::Cancel;
        history.returned_at = Some(Utc::now());
        Ok(history.clone())
    }

    fn abort_running(&self) -> Result<usize, JobStoreError> {
        let mut inner = self.write()?;
        let now = Utc::now();
        let mut aborted = 0;
        for history in inner
            .histories
            .values_mut()
            .filter(|h| h.status == JobStatus::Running)
        {
            history.status = JobStatus::Abort;
            history.returned_at = Some(now);
            aborted += 1;
        }
        Ok(aborted)
    }

    fn prune_histories(&self, worker: &str, before: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let mut inner = self.write()?;
        let count = inner.histories.len();
        inner.histories.retain(|_, h| {
            !(h.worker == worker && h.status.is_final() && h.finished_at() < before)
        });
        Ok(count - inner.histories.len())
    }

    fn stats(&self, worker: Option<&str>) -> Result<JobStats, JobStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))?;
        let mut stats = JobStats::default();
        for history in inner
            .histories
            .values()
            .filter(|h| worker.is_none_or(|w| h.worker == w))
        {
            match history.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Fail => stats.failed += 1,
                JobStatus::Cancel => stats.cancelled += 1,
                JobStatus::Abort => stats.aborted += 1,
            }
        }
        Ok(stats)
    }
}
