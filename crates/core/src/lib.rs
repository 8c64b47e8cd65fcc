//! `basis-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod hierarchy;
pub mod id;
pub mod model;

pub use error::{DomainError, DomainResult};
pub use hierarchy::Hierarchy;
pub use id::{CorrelationId, RecordId};
pub use model::Model;
