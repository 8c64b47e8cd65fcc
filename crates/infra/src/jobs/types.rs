//! Core job types: workers, queued jobs and their history rows.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use basis_core::CorrelationId;

/// Name of the worker created at boot.
pub const MAIN_WORKER: &str = "Main";

/// Separates a user-facing error message from the trace appended after it.
pub const STACK_TRACE_DELIMITER: &str = "\n----------\n";

/// How long finished history rows are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRetention {
    #[default]
    Forever,
    Days(u32),
}

impl HistoryRetention {
    /// Cut-off before which finished rows may be pruned.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            HistoryRetention::Forever => None,
            HistoryRetention::Days(days) => Some(now - chrono::Duration::days(i64::from(*days))),
        }
    }
}

/// A named queue with its own concurrency limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub name: String,
    pub max_threads: usize,
    /// Idle delay between polls.
    pub pause_time: Duration,
    #[serde(default)]
    pub history_retention: HistoryRetention,
}

impl Worker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_threads: 1,
            pause_time: Duration::from_millis(500),
            history_retention: HistoryRetention::Forever,
        }
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    pub fn with_pause_time(mut self, pause_time: Duration) -> Self {
        self.pause_time = pause_time;
        self
    }

    pub fn with_retention(mut self, retention: HistoryRetention) -> Self {
        self.history_retention = retention;
        self
    }
}

/// Status of a job, as recorded in its history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Fail,
    Cancel,
    /// Was running when the previous process stopped.
    Abort,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Fail => "fail",
            JobStatus::Cancel => "cancel",
            JobStatus::Abort => "abort",
        }
    }

    /// No further transition happens without a requeue.
    pub fn is_final(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued call of `model.method(params)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub uuid: CorrelationId,
    pub worker: String,
    pub model: String,
    pub method: String,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        worker: impl Into<String>,
        model: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            uuid: CorrelationId::new(),
            worker: worker.into(),
            model: model.into(),
            method: method.into(),
            params,
            created_at: Utc::now(),
        }
    }
}

/// Record of a job's lifecycle. Outlives the job itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHistory {
    pub uuid: CorrelationId,
    pub worker: String,
    pub model: String,
    pub method: String,
    pub params: serde_json::Value,
    pub status: JobStatus,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub exception: Option<String>,
}

impl JobHistory {
    pub fn pending(job: &Job) -> Self {
        Self {
            uuid: job.uuid,
            worker: job.worker.clone(),
            model: job.model.clone(),
            method: job.method.clone(),
            params: job.params.clone(),
            status: JobStatus::Pending,
            queued_at: job.created_at,
            started_at: None,
            returned_at: None,
            output: None,
            exception: None,
        }
    }

    pub fn mark_running(&mut self, at: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.started_at = Some(at);
    }

    pub fn mark_done(&mut self, output: String, at: DateTime<Utc>) {
        self.status = JobStatus::Done;
        self.output = Some(output);
        self.returned_at = Some(at);
    }

    pub fn mark_failed(&mut self, error: &str, at: DateTime<Utc>) {
        self.status = JobStatus::Fail;
        self.exception = Some(error_text(error).to_string());
        self.returned_at = Some(at);
    }

    /// Job rebuilt from this row, queued now.
    pub fn to_job(&self, at: DateTime<Utc>) -> Job {
        Job {
            uuid: self.uuid,
            worker: self.worker.clone(),
            model: self.model.clone(),
            method: self.method.clone(),
            params: self.params.clone(),
            created_at: at,
        }
    }

    /// Reset for a requeue.
    pub fn reset(&mut self, at: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.queued_at = at;
        self.started_at = None;
        self.returned_at = None;
        self.output = None;
        self.exception = None;
    }

    /// Timestamp used for retention.
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.returned_at.unwrap_or(self.queued_at)
    }
}

/// Message part of an error, without the trace after the delimiter.
pub fn error_text(error: &str) -> &str {
    error
        .split_once(STACK_TRACE_DELIMITER)
        .map(|(message, _)| message)
        .unwrap_or(error)
}
