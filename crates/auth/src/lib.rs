//! `basis-auth`: users, security groups, access rules and login backends.
//!
//! Decoupled from HTTP and from table storage: the web layer supplies a
//! [`UserDirectory`] over its user table.

pub mod authorize;
pub mod backend;
pub mod claims;
pub mod group;
pub mod password;
pub mod permissions;
pub mod sync;
pub mod user;

pub use authorize::{AccessDecision, AuthzError, SUPERUSER_ID, SecurityRegistry};
pub use backend::{
    AuthBackend, AuthContext, AuthError, CredentialStore, LoginLog, LoginRecord, PasswordAuthBackend,
    UserDirectory,
};
pub use claims::{SessionClaims, SessionError, validate_session};
pub use group::{Group, GroupDefinition, GroupRef};
pub use password::{hash_password, verify_password};
pub use permissions::{AccessKind, AccessRule};
pub use sync::{GroupTable, ReloadSummary, reload_groups};
pub use user::User;
