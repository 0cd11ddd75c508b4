//! Terminal session lifecycle.
//!
//! A session runs in its own task for the lifetime of one WebSocket
//! connection: privilege bootstrap, workload provisioning, readiness wait
//! with streamed progress, interactive attach, and unconditional cleanup.

mod attach;
mod bootstrap;
mod names;
mod reaper;
mod session;

pub use bootstrap::{ADMIN_SERVICE_ACCOUNT, ensure_admin_service_account};
pub use names::{node_shell_pod_name, terminal_pod_name};
pub use reaper::ResourceReaper;
pub use session::{
    SessionParams, TerminalSession, TerminalTarget, WaitOutcome, build_node_shell_pod,
    build_terminal_pod, wait_for_pod_ready,
};

use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use gantry_protocol::SetupMessage;
use log::warn;

/// Label selecting every resource belonging to one session.
pub const SESSION_LABEL_KEY: &str = "gantry.io/terminal-session";

/// Component label applied to everything this module creates.
pub const COMPONENT_LABEL_KEY: &str = "gantry.io/component";

const MANAGED_BY_KEY: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY_VALUE: &str = "gantry";

/// Labels shared by the privilege objects and all session workloads.
pub(crate) fn managed_labels(component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_KEY.to_string(), MANAGED_BY_VALUE.to_string()),
        (COMPONENT_LABEL_KEY.to_string(), component.to_string()),
    ])
}

/// Outbound channel for setup-phase progress envelopes.
///
/// Send failures are logged and swallowed: by the time a send fails the
/// client is usually gone, and the session will notice through its
/// cancellation signal.
#[async_trait]
pub trait ProgressSink: Send {
    async fn send(&mut self, msg: SetupMessage);
}

/// [`ProgressSink`] writing JSON envelopes to the WebSocket.
pub struct WsProgress {
    writer: SplitSink<WebSocket, Message>,
}

impl WsProgress {
    pub fn new(writer: SplitSink<WebSocket, Message>) -> Self {
        Self { writer }
    }

    /// Recover the raw writer for the interactive phase.
    pub fn into_inner(self) -> SplitSink<WebSocket, Message> {
        self.writer
    }
}

#[async_trait]
impl ProgressSink for WsProgress {
    async fn send(&mut self, msg: SetupMessage) {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(err) => {
                warn!("failed to serialize setup message: {err}");
                return;
            }
        };
        if let Err(err) = self.writer.send(Message::Text(json.into())).await {
            warn!("failed to send setup message: {err}");
        }
    }
}
