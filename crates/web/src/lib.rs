//! Web backend: login, sessions and JSON-RPC access to the model methods.

pub mod app;
pub mod context;
pub mod middleware;
