use axum::{Router, routing::get};

pub mod action;
pub mod binary;
pub mod dataset;
pub mod session;
pub mod system;

pub use session::public_router;

/// Router for every endpoint that needs a session.
pub fn router() -> Router {
    Router::new()
        .route(
            "/web/session/get_session_info",
            axum::routing::post(session::get_session_info),
        )
        .route("/web/workers", get(system::workers))
        .nest("/web/dataset", dataset::router())
        .nest("/web/action", action::router())
        .merge(binary::router())
}
