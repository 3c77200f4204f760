//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`, plus an unversioned `/health`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Chat streaming
        .route("/chat", post(handlers::chat::stream_chat))
        // Sessions
        .route("/sessions", get(handlers::session::list_sessions))
        .route("/sessions/last", get(handlers::session::last_session))
        .route(
            "/sessions/{id}",
            get(handlers::session::get_session).delete(handlers::session::delete_session),
        )
        .route("/sessions/{id}/history", get(handlers::session::get_history))
        .route("/sessions/{id}/title", put(handlers::session::edit_title))
        .route(
            "/sessions/{id}/title/generate",
            post(handlers::session::generate_title),
        )
        .route("/sessions/{id}/lock", put(handlers::session::lock_session))
        .route("/sessions/{id}/limited", get(handlers::session::is_limited))
        // Backend model
        .route(
            "/model",
            get(handlers::model::get_model).put(handlers::model::switch_model),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
