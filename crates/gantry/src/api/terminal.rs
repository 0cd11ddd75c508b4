//! Terminal WebSocket handlers.

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::StreamExt;
use gantry_protocol::SetupMessage;
use log::warn;

use crate::auth::CurrentUser;
use crate::error::SessionError;
use crate::terminal::{ProgressSink, TerminalSession, TerminalTarget, WsProgress};

use super::state::AppState;

/// Open an interactive cluster terminal.
pub async fn cluster_terminal_ws(
    State(state): State<AppState>,
    user: CurrentUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(state, user, TerminalTarget::Cluster, socket))
}

/// Open an interactive shell on a node.
pub async fn node_terminal_ws(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(node): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(state, user, TerminalTarget::Node(node), socket))
}

async fn handle_session(
    state: AppState,
    user: CurrentUser,
    target: TerminalTarget,
    socket: WebSocket,
) {
    // Admission: abort before anything is created. No cleanup is needed and
    // none runs.
    if !user.is_admin() {
        warn!("denied terminal session for non-admin user {}", user.id());
        let (writer, _reader) = socket.split();
        let mut sink = WsProgress::new(writer);
        sink.send(SetupMessage::error(SessionError::Unauthorized.to_string()))
            .await;
        return;
    }

    let identity = user.key().to_string();
    TerminalSession::new(Arc::clone(&state.cluster), state.params, target, identity)
        .run(socket)
        .await;
}
