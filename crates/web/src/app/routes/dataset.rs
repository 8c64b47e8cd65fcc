use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    response::Response,
    routing::post,
};
use serde_json::{Map, Value, json};
use tracing::info;

use basis_infra::{MethodError, Params};

use crate::app::dto::{CallKwParams, RpcRequest, SearchReadParams};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::SessionContext;

pub fn router() -> Router {
    Router::new()
        .route("/call_kw", post(call_kw))
        .route("/call_kw/*path", post(call_kw))
        .route("/search_read", post(search_read))
}

/// Run `model.method(*args, **kwargs)` as the session user.
pub async fn call_kw(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<SessionContext>,
    Json(request): Json<RpcRequest<CallKwParams>>,
) -> Response {
    let mut params = request.params;
    let client = params.client_context();
    let ctx = services.exec_context(session.uid(), client.as_ref());
    let call = Params::new(params.args, params.kwargs);

    match services
        .methods
        .call(&ctx, &params.model, &params.method, call.to_value())
    {
        Ok(result) => {
            if params.model == "User" && params.method == "unlink" {
                for uid in call.ids(0, "ids").unwrap_or_default() {
                    let closed = services.sessions.close_user(uid);
                    if closed > 0 {
                        info!(uid = %uid, closed, "closed sessions of deleted user");
                    }
                }
            }
            errors::rpc_result(request.id, result)
        }
        Err(err) => errors::method_error_to_response(request.id, err),
    }
}

/// `search_read` plus the total count, as the list views need it.
pub async fn search_read(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<SessionContext>,
    Json(request): Json<RpcRequest<SearchReadParams>>,
) -> Response {
    let params = request.params;
    let ctx = services.exec_context(session.uid(), params.context.as_ref());
    let domain = match params.domain {
        Value::Null => json!([]),
        domain => domain,
    };

    let mut kwargs = Map::new();
    kwargs.insert("domain".into(), domain.clone());
    kwargs.insert("fields".into(), json!(params.fields));
    kwargs.insert("offset".into(), json!(params.offset));
    kwargs.insert("limit".into(), json!(params.limit));
    kwargs.insert("order".into(), json!(params.sort));

    let records = match services
        .methods
        .call(&ctx, &params.model, "search_read", Value::Object(kwargs))
    {
        Ok(records) => records,
        Err(err) => return errors::method_error_to_response(request.id, err),
    };
    let fetched = records.as_array().map(Vec::len).unwrap_or(0);

    let length = match services
        .methods
        .call(&ctx, &params.model, "search_count", json!({ "domain": domain }))
    {
        Ok(count) => count,
        Err(MethodError::UnknownMethod { .. }) => json!(params.offset + fetched),
        Err(err) => return errors::method_error_to_response(request.id, err),
    };

    errors::rpc_result(request.id, json!({ "length": length, "records": records }))
}
