use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{Value, json};

use basis_infra::MethodError;

/// JSON-RPC error code used for every server-side failure.
pub const RPC_SERVER_ERROR: i64 = 200;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Successful JSON-RPC reply.
pub fn rpc_result(id: Value, result: Value) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result,
        })),
    )
        .into_response()
}

/// Failed JSON-RPC reply. Sent with HTTP 200; the client reads `error`.
pub fn rpc_error(id: Value, name: &str, message: impl Into<String>) -> axum::response::Response {
    let message = message.into();
    (
        StatusCode::OK,
        Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": RPC_SERVER_ERROR,
                "message": "Server Error",
                "data": {
                    "name": name,
                    "message": message,
                },
            },
        })),
    )
        .into_response()
}

pub fn method_error_to_response(id: Value, err: MethodError) -> axum::response::Response {
    match &err {
        MethodError::Domain(basis_core::DomainError::InvariantViolation(_)) => {
            tracing::error!(error = %err, "method failed");
        }
        _ => tracing::debug!(error = %err, kind = err.kind(), "method refused"),
    }
    rpc_error(id, err.kind(), err.to_string())
}
