//! Web application wiring (Axum router + service wiring).
//!
//! - `services.rs`: base models, method registry, worker pool, sessions
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: JSON-RPC envelopes and request params
//! - `errors.rs`: JSON-RPC and plain JSON error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};

use basis_infra::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build services and the full HTTP router (entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config)?);
    Ok(build_router(services, config))
}

/// Router over already built services.
pub fn build_router(services: Arc<services::AppServices>, config: &AppConfig) -> Router {
    let session_state = middleware::SessionState {
        services: services.clone(),
    };

    // Session routes: require a live `session_id` cookie.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        session_state,
        middleware::session_middleware,
    ));

    let mut app = Router::new()
        .route("/web/health", get(routes::system::health))
        .merge(routes::public_router())
        .merge(protected);

    if let Some(dir) = &config.static_dir {
        tracing::info!(dir = %dir.display(), "serving static files");
        app = app.nest_service("/web/static", ServeDir::new(dir));
    }

    app.layer(Extension(services))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
