use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::{IntoResponse, Response}};
use serde_json::json;

use basis_auth::group::GROUP_SYSTEM;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::SessionContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Worker pool state, for administrators.
pub async fn workers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<SessionContext>,
) -> Response {
    if !services.models.security.has_group(session.uid(), &GROUP_SYSTEM) {
        return errors::json_error(StatusCode::FORBIDDEN, "access_error", "administrators only");
    }
    let workers: Vec<_> = services
        .pool
        .worker_names()
        .iter()
        .filter_map(|name| services.pool.status(name))
        .collect();
    Json(json!({
        "stopped": services.pool.is_stopped(),
        "workers": workers,
    }))
    .into_response()
}
