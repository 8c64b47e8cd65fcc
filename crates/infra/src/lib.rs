//! Infrastructure layer: typed tables, the method registry, the worker pool
//! and the base models wired on top of them.

pub mod actions;
pub mod attachments;
pub mod base;
pub mod config;
pub mod filters;
pub mod jobs;
pub mod methods;
pub mod table;
pub mod translations;

pub use actions::WindowAction;
pub use attachments::{Attachment, AttachmentStore, AttachmentType};
pub use base::{BaseModels, SeedOptions, TableUsers};
pub use config::{AppConfig, ConfigError, Environment, LogStyle};
pub use filters::Filter;
pub use jobs::{InMemoryJobStore, JobStore, JobStoreError, WorkerPool};
pub use methods::{ExecContext, MethodError, MethodRegistry, MethodResult, Params};
pub use table::{SearchOptions, Table};
pub use translations::{Translation, TranslationKind};
