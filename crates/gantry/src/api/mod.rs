//! HTTP/WebSocket API layer.

mod routes;
mod state;
mod terminal;

pub use routes::create_router;
pub use state::AppState;
