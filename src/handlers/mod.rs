pub mod analyze;
pub mod page;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::state::AppState;

async fn health() -> &'static str {
    "ok"
}

pub fn create_router(state: AppState, upload_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(analyze::index))
        .route("/analyze", post(analyze::analyze))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(upload_limit_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
