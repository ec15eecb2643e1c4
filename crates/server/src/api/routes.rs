use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::{handlers, middleware::metrics_middleware, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let storage = &state.config().storage;
    let url_prefix = storage.url_prefix.trim_end_matches('/').to_string();
    let results = ServeDir::new(&storage.static_dir);

    Router::new()
        // Job sessions; `/predict` is the path older clients connect to
        .route("/detect", get(ws::ws_handler))
        .route("/predict", get(ws::ws_handler))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Transcoded results, read-only
        .nest_service(&url_prefix, results)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
