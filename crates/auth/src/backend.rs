//! Authentication backends.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use basis_core::{DomainError, RecordId};

use crate::password::{hash_password, verify_password};
use crate::user::User;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown login, inactive user or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthError> for DomainError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => DomainError::InvalidCredentials,
            AuthError::Unavailable(msg) => DomainError::conflict(msg),
        }
    }
}

/// Request details passed along with a login attempt.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

/// Pluggable login check, chosen at process start.
pub trait AuthBackend: Send + Sync {
    fn authenticate(&self, login: &str, secret: &str, ctx: &AuthContext) -> Result<RecordId, AuthError>;
}

impl<B> AuthBackend for Arc<B>
where
    B: AuthBackend + ?Sized,
{
    fn authenticate(&self, login: &str, secret: &str, ctx: &AuthContext) -> Result<RecordId, AuthError> {
        (**self).authenticate(login, secret, ctx)
    }
}

/// Lookup of users by login, implemented over the user table.
pub trait UserDirectory: Send + Sync {
    fn find_by_login(&self, login: &str) -> Option<User>;
}

impl<D> UserDirectory for Arc<D>
where
    D: UserDirectory + ?Sized,
{
    fn find_by_login(&self, login: &str) -> Option<User> {
        (**self).find_by_login(login)
    }
}

/// Password hashes keyed by user id.
#[derive(Debug, Default)]
pub struct CredentialStore {
    inner: RwLock<HashMap<RecordId, String>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_password(&self, uid: RecordId, secret: &str) {
        let hash = hash_password(secret);
        if let Ok(mut map) = self.inner.write() {
            map.insert(uid, hash);
        }
    }

    pub fn remove(&self, uid: RecordId) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&uid);
        }
    }

    pub fn verify(&self, uid: RecordId, secret: &str) -> bool {
        let Ok(map) = self.inner.read() else {
            return false;
        };
        map.get(&uid).is_some_and(|stored| verify_password(secret, stored))
    }

    pub fn has_password(&self, uid: RecordId) -> bool {
        self.inner.read().map(|m| m.contains_key(&uid)).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRecord {
    pub uid: RecordId,
    pub at: DateTime<Utc>,
    pub remote_addr: Option<String>,
}

/// Append-only login history.
#[derive(Debug, Default)]
pub struct LoginLog {
    inner: RwLock<Vec<LoginRecord>>,
}

impl LoginLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: LoginRecord) {
        if let Ok(mut log) = self.inner.write() {
            log.push(record);
        }
    }

    pub fn for_user(&self, uid: RecordId) -> Vec<LoginRecord> {
        match self.inner.read() {
            Ok(log) => log.iter().filter(|r| r.uid == uid).cloned().collect(),
            Err(_) => vec![],
        }
    }

    pub fn last_login(&self, uid: RecordId) -> Option<DateTime<Utc>> {
        self.inner
            .read()
            .ok()?
            .iter()
            .rev()
            .find(|r| r.uid == uid)
            .map(|r| r.at)
    }
}

/// Checks the stored password hash and logs successful logins.
pub struct PasswordAuthBackend<D> {
    users: D,
    credentials: Arc<CredentialStore>,
    log: Arc<LoginLog>,
}

impl<D: UserDirectory> PasswordAuthBackend<D> {
    pub fn new(users: D, credentials: Arc<CredentialStore>, log: Arc<LoginLog>) -> Self {
        Self {
            users,
            credentials,
            log,
        }
    }
}

impl<D: UserDirectory> AuthBackend for PasswordAuthBackend<D> {
    fn authenticate(&self, login: &str, secret: &str, ctx: &AuthContext) -> Result<RecordId, AuthError> {
        let user = self
            .users
            .find_by_login(login)
            .filter(|u| u.active)
            .ok_or(AuthError::InvalidCredentials)?;
        if !self.credentials.verify(user.id, secret) {
            tracing::info!(login, "login failed");
            return Err(AuthError::InvalidCredentials);
        }
        self.log.record(LoginRecord {
            uid: user.id,
            at: Utc::now(),
            remote_addr: ctx.remote_addr.clone(),
        });
        tracing::info!(login, uid = %user.id, "login successful");
        Ok(user.id)
    }
}
