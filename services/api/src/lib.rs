pub mod config;
pub mod deepgram_adapter;
pub mod routes;
pub mod state;
pub mod ws;

use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the application router.
///
/// * `/ws` carries one conversation session per connection.
/// * `/`, `/analyze-text` and `/analyze-image` are plain HTTP.
pub fn app(state: Arc<AppState>) -> Router {
    // Permissive so a separately hosted frontend can connect.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/", get(routes::root))
        .route("/analyze-text", post(routes::analyze_text))
        .route("/analyze-image", post(routes::analyze_image))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
