use std::sync::Arc;

use axum::{Json, Router, extract::Extension, response::Response, routing::post};
use serde_json::json;

use crate::app::dto::{ActionLoadParams, RpcRequest};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::SessionContext;

pub fn router() -> Router {
    Router::new().route("/load", post(load))
}

/// Resolve an action by numeric id or external id.
pub async fn load(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<SessionContext>,
    Json(request): Json<RpcRequest<ActionLoadParams>>,
) -> Response {
    let params = request.params;
    let ctx = services.exec_context(session.uid(), params.context.as_ref());
    match services
        .methods
        .call(&ctx, "Action", "load", json!({ "action_id": params.action_id }))
    {
        Ok(action) => errors::rpc_result(request.id, action),
        Err(err) => errors::method_error_to_response(request.id, err),
    }
}
