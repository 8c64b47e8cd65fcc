use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use basis_core::RecordId;

/// Lifetime of a web session without activity.
pub const SESSION_LIFETIME_DAYS: i64 = 7;

/// What a session cookie resolves to once the server has looked it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub uid: RecordId,
    pub login: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    pub fn issue(uid: RecordId, login: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uid,
            login: login.into(),
            issued_at: now,
            expires_at: now + Duration::days(SESSION_LIFETIME_DAYS),
        }
    }

    /// Push the expiry forward after activity.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.expires_at = now + Duration::days(SESSION_LIFETIME_DAYS);
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session has expired")]
    Expired,

    #[error("session not yet valid (issued_at is in the future)")]
    NotYetValid,
}

pub fn validate_session(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), SessionError> {
    if now < claims.issued_at {
        return Err(SessionError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(SessionError::Expired);
    }
    Ok(())
}
