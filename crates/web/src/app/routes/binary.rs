use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};

use basis_auth::{AccessKind, SUPERUSER_ID};
use basis_core::RecordId;
use basis_infra::{Attachment, AttachmentType};

use crate::app::dto::ContentQuery;
use crate::app::errors::json_error;
use crate::app::services::AppServices;
use crate::context::SessionContext;

pub fn router() -> Router {
    Router::new()
        .route("/web/image/:model/:id/:field", get(image))
        .route("/web/content/:id", get(content))
}

/// Binary field `field` of `model` record `id`, stored as an attachment.
pub async fn image(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<SessionContext>,
    Path((model, id, field)): Path<(String, i64, String)>,
) -> Response {
    if let Err(resp) = check_read(&services, session.uid(), &model) {
        return resp;
    }
    let Some(attachment) = services
        .models
        .attachments
        .find_field(&model, RecordId::new(id), &field)
    else {
        return json_error(StatusCode::NOT_FOUND, "not_found", format!("no {field} on {model} {id}"));
    };
    serve(&services, attachment, false)
}

/// Attachment `id`: its content, or a redirect for URL attachments.
pub async fn content(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<i64>,
    Query(query): Query<ContentQuery>,
) -> Response {
    let Ok(attachment) = services.models.attachments.get(RecordId::new(id)) else {
        return json_error(StatusCode::NOT_FOUND, "not_found", format!("attachment {id}"));
    };
    if !attachment.public {
        if let Err(resp) = check_read(&services, session.uid(), "Attachment") {
            return resp;
        }
    }
    serve(&services, attachment, query.download.unwrap_or(false))
}

fn check_read(services: &AppServices, uid: RecordId, model: &str) -> Result<(), Response> {
    if uid == SUPERUSER_ID {
        return Ok(());
    }
    let security = &services.models.security;
    security
        .check_access(uid, "Attachment", AccessKind::Read)
        .and_then(|_| security.check_access(uid, model, AccessKind::Read))
        .map_err(|e| json_error(StatusCode::FORBIDDEN, "access_error", e.to_string()))
}

fn serve(services: &AppServices, attachment: Attachment, download: bool) -> Response {
    if attachment.kind == AttachmentType::Url {
        return match attachment.url.as_deref() {
            Some(url) => Redirect::to(url).into_response(),
            None => json_error(StatusCode::NOT_FOUND, "not_found", "attachment has no url"),
        };
    }
    let body = match services.models.attachments.content(attachment.id) {
        Ok(body) => body,
        Err(e) => return json_error(StatusCode::NOT_FOUND, "not_found", e.to_string()),
    };
    let mimetype = attachment
        .mimetype
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!(
        "{}; filename=\"{}\"",
        if download { "attachment" } else { "inline" },
        attachment.name.replace('"', "")
    );
    (
        [
            (header::CONTENT_TYPE, mimetype),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body.as_slice().to_vec(),
    )
        .into_response()
}
