//! Session orchestration: provisioning, readiness, attach, cleanup.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use futures::stream::SplitStream;
use gantry_protocol::SetupMessage;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterApi, Container, ObjectMeta, Pod, PodSpec, SecurityContext};
use crate::config::GantryConfig;
use crate::error::{SessionError, SessionResult};

use super::bootstrap::{ADMIN_SERVICE_ACCOUNT, ensure_admin_service_account};
use super::reaper::ResourceReaper;
use super::{ProgressSink, SESSION_LABEL_KEY, WsProgress, managed_labels, names};

/// Container name inside every session workload.
const SHELL_CONTAINER: &str = "shell";

/// Per-session settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub namespace: String,
    pub kubectl_binary: String,
    pub terminal_image: String,
    pub node_shell_image: String,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl SessionParams {
    pub fn from_config(config: &GantryConfig) -> Self {
        Self {
            namespace: config.cluster.namespace.clone(),
            kubectl_binary: config.cluster.kubectl_binary.clone(),
            terminal_image: config.terminal.image.clone(),
            node_shell_image: config.terminal.node_image.clone(),
            ready_timeout: Duration::from_secs(config.terminal.ready_timeout_secs),
            poll_interval: Duration::from_secs(config.terminal.poll_interval_secs),
        }
    }
}

/// What the session attaches to.
#[derive(Debug, Clone)]
pub enum TerminalTarget {
    /// A throwaway admin shell with cluster-wide privileges.
    Cluster,
    /// A host shell on the named node.
    Node(String),
}

/// How a readiness wait concluded, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    /// The governing context was canceled first; nothing further was sent.
    Canceled,
}

/// Build the workload manifest for a cluster terminal session.
pub fn build_terminal_pod(params: &SessionParams, session_id: &str) -> Pod {
    let mut labels = managed_labels("cluster-terminal");
    labels.insert(SESSION_LABEL_KEY.to_string(), session_id.to_string());

    Pod {
        api_version: "v1".to_string(),
        kind: "Pod".to_string(),
        metadata: ObjectMeta {
            name: session_id.to_string(),
            namespace: Some(params.namespace.clone()),
            labels,
        },
        spec: PodSpec {
            restart_policy: Some("Never".to_string()),
            service_account_name: Some(ADMIN_SERVICE_ACCOUNT.to_string()),
            automount_service_account_token: Some(true),
            hostname: Some("gantry".to_string()),
            termination_grace_period_seconds: Some(0),
            containers: vec![Container {
                name: SHELL_CONTAINER.to_string(),
                image: params.terminal_image.clone(),
                image_pull_policy: Some("IfNotPresent".to_string()),
                stdin: Some(true),
                stdin_once: Some(true),
                tty: Some(true),
                command: vec!["bash".to_string(), "-c".to_string(), "exec bash".to_string()],
                security_context: None,
            }],
            ..PodSpec::default()
        },
        status: None,
    }
}

/// Build the workload manifest for a node shell session: pinned to the node,
/// entering the host namespaces via nsenter.
pub fn build_node_shell_pod(params: &SessionParams, session_id: &str, node_name: &str) -> Pod {
    let mut labels = managed_labels("node-shell");
    labels.insert(SESSION_LABEL_KEY.to_string(), session_id.to_string());

    Pod {
        api_version: "v1".to_string(),
        kind: "Pod".to_string(),
        metadata: ObjectMeta {
            name: session_id.to_string(),
            namespace: Some(params.namespace.clone()),
            labels,
        },
        spec: PodSpec {
            restart_policy: Some("Never".to_string()),
            termination_grace_period_seconds: Some(0),
            node_name: Some(node_name.to_string()),
            host_pid: Some(true),
            host_network: Some(true),
            containers: vec![Container {
                name: SHELL_CONTAINER.to_string(),
                image: params.node_shell_image.clone(),
                image_pull_policy: Some("IfNotPresent".to_string()),
                stdin: Some(true),
                stdin_once: Some(true),
                tty: Some(true),
                command: vec![
                    "nsenter".to_string(),
                    "-t".to_string(),
                    "1".to_string(),
                    "-m".to_string(),
                    "-u".to_string(),
                    "-i".to_string(),
                    "-n".to_string(),
                    "-p".to_string(),
                    "--".to_string(),
                    "sh".to_string(),
                    "-l".to_string(),
                ],
                security_context: Some(SecurityContext {
                    privileged: Some(true),
                }),
            }],
            ..PodSpec::default()
        },
        status: None,
    }
}

/// Poll the workload until it is ready, the deadline passes, or the session
/// is canceled.
///
/// Emits one `info` envelope on entry, one `stdout` heartbeat per observed
/// status, and exactly one terminal envelope unless the wait is canceled, in
/// which case nothing further is sent. Transient fetch errors are retried on
/// the next tick. With `fail_on_exit`, a workload that runs to completion
/// before becoming ready fails the wait immediately (node shells exit this
/// way when nsenter cannot start).
pub async fn wait_for_pod_ready(
    cluster: &dyn ClusterApi,
    sink: &mut dyn ProgressSink,
    namespace: &str,
    name: &str,
    poll_interval: Duration,
    ready_timeout: Duration,
    fail_on_exit: bool,
    cancel: &CancellationToken,
) -> SessionResult<WaitOutcome> {
    sink.send(SetupMessage::info(format!(
        "waiting for terminal workload {name} to become ready"
    )))
    .await;

    let deadline = tokio::time::sleep(ready_timeout);
    tokio::pin!(deadline);

    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_observed: Option<Pod> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return Ok(WaitOutcome::Canceled);
            }
            _ = &mut deadline => {
                let diagnostic = timeout_diagnostic(last_observed.as_ref(), name);
                sink.send(SetupMessage::error(diagnostic)).await;
                return Err(SessionError::ReadyTimeout {
                    name: name.to_string(),
                });
            }
            _ = ticker.tick() => {
                let pod = match cluster.get_pod(namespace, name).await {
                    Ok(pod) => pod,
                    Err(err) => {
                        debug!("transient status fetch for {name} failed: {err}");
                        continue;
                    }
                };

                // The caller may have gone away while the fetch was in
                // flight; nothing further may be sent after that.
                if cancel.is_cancelled() {
                    return Ok(WaitOutcome::Canceled);
                }

                sink.send(SetupMessage::stdout(".")).await;

                if pod.is_ready() {
                    sink.send(SetupMessage::info("terminal workload ready")).await;
                    return Ok(WaitOutcome::Ready);
                }

                if fail_on_exit && pod.is_finished() {
                    let diagnostic = pod.error_message().unwrap_or_else(|| {
                        format!("workload {name} exited before becoming ready")
                    });
                    sink.send(SetupMessage::error(diagnostic)).await;
                    return Err(SessionError::NeverReady {
                        name: name.to_string(),
                    });
                }

                last_observed = Some(pod);
            }
        }
    }
}

fn timeout_diagnostic(last_observed: Option<&Pod>, name: &str) -> String {
    match last_observed {
        Some(pod) => pod
            .error_message()
            .unwrap_or_else(|| format!("workload {name} did not become ready in time")),
        None => format!("could not observe workload {name}"),
    }
}

/// One caller's terminal session, from admission hand-off through cleanup.
///
/// The session owns its WebSocket for its entire lifetime and runs on the
/// connection's task; nothing here is shared across sessions.
pub struct TerminalSession {
    cluster: Arc<dyn ClusterApi>,
    params: SessionParams,
    target: TerminalTarget,
    identity: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TerminalSession {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        params: SessionParams,
        target: TerminalTarget,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            params,
            target,
            identity: identity.into(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Drive the session to completion. Errors terminate the session and are
    /// reported to the caller as envelopes; cleanup runs on every path.
    pub async fn run(self, socket: WebSocket) {
        let (writer, reader) = socket.split();
        let mut sink = WsProgress::new(writer);

        if let Err(err) = ensure_admin_service_account(self.cluster.as_ref(), &self.params.namespace).await
        {
            let err = SessionError::Bootstrap(err);
            error!("terminal session for {}: {err}", self.identity);
            sink.send(SetupMessage::error(err.to_string())).await;
            return;
        }

        let session_id = match &self.target {
            TerminalTarget::Cluster => names::terminal_pod_name(&self.identity),
            TerminalTarget::Node(node) => names::node_shell_pod_name(node),
        };
        info!("starting terminal session {session_id} for {}", self.identity);

        // Governs every suspension point below; canceled when the caller's
        // connection goes away or the session task finishes.
        let cancel = CancellationToken::new();
        let _cancel_on_exit = cancel.clone().drop_guard();

        let (input_tx, input_rx) = mpsc::channel::<Vec<u8>>(64);
        tokio::spawn(pump_client_input(reader, input_tx, cancel.clone()));

        // Armed before the first create call: cleanup covers partial
        // provisioning and every exit path from here on.
        let reaper = ResourceReaper::arm(
            Arc::clone(&self.cluster),
            self.params.namespace.clone(),
            session_id.clone(),
        );

        let pod = match &self.target {
            TerminalTarget::Cluster => build_terminal_pod(&self.params, &session_id),
            TerminalTarget::Node(node) => build_node_shell_pod(&self.params, &session_id, node),
        };

        if let Err(err) = self.cluster.create_pod(&pod).await {
            let err = SessionError::Provision(err);
            error!("terminal session {session_id}: {err}");
            sink.send(SetupMessage::error(err.to_string())).await;
            reaper.run().await;
            return;
        }

        let fail_on_exit = matches!(self.target, TerminalTarget::Node(_));
        let wait = wait_for_pod_ready(
            self.cluster.as_ref(),
            &mut sink,
            &self.params.namespace,
            &session_id,
            self.params.poll_interval,
            self.params.ready_timeout,
            fail_on_exit,
            &cancel,
        )
        .await;

        match wait {
            Ok(WaitOutcome::Ready) => {
                let writer = sink.into_inner();
                if let Err(err) = attach_session(&self.params, &session_id, writer, input_rx, &cancel).await
                {
                    error!("terminal session {session_id}: {err}");
                }
            }
            Ok(WaitOutcome::Canceled) => {
                debug!("terminal session {session_id} canceled before ready");
            }
            Err(err) => {
                warn!("terminal session {session_id}: {err}");
            }
        }

        reaper.run().await;

        let elapsed = chrono::Utc::now() - self.created_at;
        info!(
            "terminal session {session_id} ended after {}s",
            elapsed.num_seconds()
        );
    }
}

async fn attach_session(
    params: &SessionParams,
    session_id: &str,
    writer: futures::stream::SplitSink<WebSocket, Message>,
    input_rx: mpsc::Receiver<Vec<u8>>,
    cancel: &CancellationToken,
) -> SessionResult<()> {
    super::attach::run(
        &params.kubectl_binary,
        &params.namespace,
        session_id,
        SHELL_CONTAINER,
        writer,
        input_rx,
        cancel,
    )
    .await
}

/// Forward client frames into the session and cancel it when the connection
/// closes. Runs for the whole session; during setup the forwarded bytes are
/// buffered for the attach phase.
async fn pump_client_input(
    mut reader: SplitStream<WebSocket>,
    input: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Binary(data)) => {
                if input.send(data.to_vec()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Text(text)) => {
                if input.send(text.as_bytes().to_vec()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
    cancel.cancel();
}
