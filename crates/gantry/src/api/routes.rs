//! Route table.

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use log::warn;
use tower_http::cors::CorsLayer;

use super::state::AppState;
use super::terminal;

/// Build the API router. The caller nests this under its path prefix.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.auth.allowed_origins());

    Router::new()
        .route("/healthz", get(health))
        .route("/terminal/ws", get(terminal::cluster_terminal_ws))
        .route("/nodes/{node}/terminal/ws", get(terminal::node_terminal_ws))
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
