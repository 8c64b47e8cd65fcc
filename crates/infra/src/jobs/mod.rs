//! Background jobs: named workers polling a shared job store.
//!
//! ## Components
//!
//! - `Job` / `JobHistory`: a queued call and the record of its lifecycle
//! - `JobStore`: persistence for both (in-memory here)
//! - `WorkerPool`: one loop per `Worker`, bounded by `max_threads`
//! - `rpc`: the `JobHistory` / `Worker` client methods
//!
//! Failed jobs stay failed; `requeue` is always a manual step.

pub mod pool;
pub mod rpc;
pub mod store;
pub mod types;

pub use pool::{WorkerPool, WorkerStats, WorkerStatus};
pub use rpc::{JOB_HISTORY_MODEL, PoolSlot, WORKER_MODEL};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    HistoryRetention, Job, JobHistory, JobStatus, MAIN_WORKER, STACK_TRACE_DELIMITER, Worker,
    error_text,
};
