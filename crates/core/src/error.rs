//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Business-rule failures raised by models and services. The web layer turns
/// these into user-visible RPC errors; the worker pool stores them in the job
/// history instead of propagating them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (malformed input, SQL-like constraint).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record, model or method does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. a job in the wrong state).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Login or password did not match.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// A parent/child hierarchy would contain a cycle.
    #[error("recursion detected: {0}")]
    RecursionDetected(String),

    /// Attempt to mutate protected data outside its owning process.
    #[error("security violation: {0}")]
    SecurityViolation(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn recursion(msg: impl Into<String>) -> Self {
        Self::RecursionDetected(msg.into())
    }

    pub fn security(msg: impl Into<String>) -> Self {
        Self::SecurityViolation(msg.into())
    }

    /// Short machine-readable name, used as the RPC error `name`.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
            DomainError::InvalidCredentials => "access_denied",
            DomainError::RecursionDetected(_) => "recursion_error",
            DomainError::SecurityViolation(_) => "security_violation",
            DomainError::Unauthorized => "access_error",
        }
    }
}
