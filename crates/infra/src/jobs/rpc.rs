//! `JobHistory` and `Worker` methods exposed to clients.
//!
//! The pool needs the finished method registry, and these methods need the
//! pool, so they reach it through a [`PoolSlot`] bound after startup.

use std::sync::{Arc, OnceLock, Weak};

use serde_json::{Map, Value, json};

use basis_auth::AccessKind;
use basis_core::{CorrelationId, DomainError};

use crate::methods::{MethodError, MethodRegistry, Params, to_json};
use crate::table::{project, select_rows};

use super::pool::WorkerPool;
use super::store::{JobStore, JobStoreError};
use super::types::JobHistory;

pub const JOB_HISTORY_MODEL: &str = "JobHistory";
pub const WORKER_MODEL: &str = "Worker";

/// Late-bound handle on the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolSlot(Arc<OnceLock<Weak<WorkerPool>>>);

impl PoolSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the slot at `pool`. Only the first call has an effect.
    pub fn bind(&self, pool: &Arc<WorkerPool>) {
        let _ = self.0.set(Arc::downgrade(pool));
    }

    pub fn get(&self) -> Result<Arc<WorkerPool>, MethodError> {
        self.0
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| DomainError::conflict("the worker pool is not running").into())
    }
}

impl From<JobStoreError> for MethodError {
    fn from(value: JobStoreError) -> Self {
        let err = match value {
            JobStoreError::NotFound(uuid) => DomainError::not_found(format!("job {uuid}")),
            JobStoreError::InvalidState { uuid, status } => {
                DomainError::validation(format!("job {uuid} is {status}"))
            }
            JobStoreError::AlreadyExists(uuid) => DomainError::conflict(format!("job {uuid} already exists")),
            JobStoreError::Storage(msg) => DomainError::conflict(msg),
        };
        MethodError::Domain(err)
    }
}

fn history_row(history: &JobHistory) -> Result<Map<String, Value>, MethodError> {
    match to_json(history)? {
        Value::Object(mut row) => {
            row.insert("id".to_string(), json!(history.uuid));
            row.insert(
                "display_name".to_string(),
                json!(format!("{}.{}", history.model, history.method)),
            );
            Ok(row)
        }
        _ => Err(DomainError::invariant("job history is not an object").into()),
    }
}

fn uuids(params: &Params) -> Result<Vec<CorrelationId>, MethodError> {
    match params.get(0, "ids") {
        Some(Value::Array(_)) => params.required(0, "ids"),
        Some(_) => Ok(vec![params.required(0, "ids")?]),
        None => Err(MethodError::invalid("missing argument 'ids'")),
    }
}

/// Register the job history and worker methods.
pub fn register(registry: &mut MethodRegistry, store: Arc<dyn JobStore>, pool: PoolSlot) {
    let s = store.clone();
    registry.register(JOB_HISTORY_MODEL, "search_read", AccessKind::Read, move |_ctx, params| {
        let params = Params::from_value(params);
        let domain = params.domain(0, "domain")?;
        let fields: Vec<String> = params.optional(1, "fields")?.unwrap_or_default();
        let options = params.search_options(2)?;
        let rows = s
            .list_histories(None, None, usize::MAX)?
            .iter()
            .map(history_row)
            .collect::<Result<Vec<_>, _>>()?;
        let rows = select_rows(rows, &domain, &options)?;
        Ok(json!(rows.into_iter().map(|r| project(r, &fields)).collect::<Vec<_>>()))
    });

    let s = store.clone();
    registry.register(JOB_HISTORY_MODEL, "search_count", AccessKind::Read, move |_ctx, params| {
        let domain = Params::from_value(params).domain(0, "domain")?;
        let mut count = 0;
        for history in s.list_histories(None, None, usize::MAX)? {
            if domain.matches(&history_row(&history)?) {
                count += 1;
            }
        }
        Ok(json!(count))
    });

    let s = store.clone();
    registry.register(JOB_HISTORY_MODEL, "read", AccessKind::Read, move |_ctx, params| {
        let params = Params::from_value(params);
        let fields: Vec<String> = params.optional(1, "fields")?.unwrap_or_default();
        let mut rows = Vec::new();
        for uuid in uuids(&params)? {
            if let Some(history) = s.history(uuid)? {
                rows.push(project(history_row(&history)?, &fields));
            }
        }
        Ok(json!(rows))
    });

    let slot = pool.clone();
    registry.register(JOB_HISTORY_MODEL, "requeue", AccessKind::Write, move |_ctx, params| {
        let pool = slot.get()?;
        let mut requeued = Vec::new();
        for uuid in uuids(&Params::from_value(params))? {
            requeued.push(pool.requeue(uuid)?.uuid);
        }
        Ok(json!(requeued))
    });

    let slot = pool.clone();
    registry.register(JOB_HISTORY_MODEL, "cancel", AccessKind::Write, move |_ctx, params| {
        let pool = slot.get()?;
        for uuid in uuids(&Params::from_value(params))? {
            pool.cancel(uuid)?;
        }
        Ok(json!(true))
    });

    let s = store;
    registry.register(JOB_HISTORY_MODEL, "stats", AccessKind::Read, move |_ctx, params| {
        let worker: Option<String> = Params::from_value(params).optional(0, "worker")?;
        to_json(&s.stats(worker.as_deref())?)
    });

    let slot = pool.clone();
    registry.register(WORKER_MODEL, "search_read", AccessKind::Read, move |_ctx, _params| {
        let pool = slot.get()?;
        let statuses: Vec<_> = pool
            .worker_names()
            .iter()
            .filter_map(|name| pool.status(name))
            .collect();
        to_json(&statuses)
    });

    let slot = pool;
    registry.register(WORKER_MODEL, "enqueue", AccessKind::Create, move |_ctx, params| {
        let params = Params::from_value(params);
        let worker: String = params.required(0, "worker")?;
        let model: String = params.required(1, "model")?;
        let method: String = params.required(2, "method")?;
        let job_params: Value = params.optional(3, "params")?.unwrap_or(Value::Null);
        let history = slot.get()?.enqueue(&worker, &model, &method, job_params)?;
        Ok(json!(history.uuid))
    });
}
