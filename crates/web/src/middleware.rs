use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::context::SessionContext;

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Clone)]
pub struct SessionState {
    pub services: Arc<AppServices>,
}

/// Resolve the session cookie into a [`SessionContext`]; 401 without one.
pub async fn session_middleware(
    State(state): State<SessionState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(sid) = session_cookie(req.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "session_expired", "no session cookie");
    };
    let Some(claims) = state.services.sessions.resolve(sid, Utc::now()) else {
        return json_error(StatusCode::UNAUTHORIZED, "session_expired", "session expired or unknown");
    };

    let ctx = SessionContext::new(sid, claims.uid, claims.login);
    req.extensions_mut().insert(ctx);

    next.run(req).await
}

/// Value of the `session_id` cookie, if any.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for a freshly opened session.
pub fn session_set_cookie(sid: &str) -> String {
    format!("{SESSION_COOKIE}={sid}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value that clears the session cookie.
pub fn session_clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
