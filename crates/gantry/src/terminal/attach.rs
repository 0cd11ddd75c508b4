//! Interactive stream bridge.
//!
//! Once a workload is ready the session hands its socket to this relay,
//! which pipes bytes in both directions between the caller and the
//! workload's interactive process via `kubectl attach`. The bridge never
//! inspects or transforms the stream.

use std::process::Stdio;

use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use futures::stream::SplitSink;
use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{SessionError, SessionResult};

/// Relay bytes between the client socket and the workload's shell until
/// either side closes or the session is canceled.
pub async fn run(
    kubectl_binary: &str,
    namespace: &str,
    pod_name: &str,
    container: &str,
    mut writer: SplitSink<WebSocket, Message>,
    mut input_rx: mpsc::Receiver<Vec<u8>>,
    cancel: &CancellationToken,
) -> SessionResult<()> {
    let mut child = Command::new(kubectl_binary)
        .args([
            "attach", pod_name, "-n", namespace, "-c", container, "-i", "-t", "-q",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SessionError::Stream(format!("failed to start attach: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| SessionError::Stream("attach stdin unavailable".to_string()))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| SessionError::Stream("attach stdout unavailable".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| SessionError::Stream("attach stderr unavailable".to_string()))?;

    // Drained separately so attach failures can be reported after exit.
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        buf
    });

    let client_to_shell = async {
        while let Some(bytes) = input_rx.recv().await {
            stdin.write_all(&bytes).await?;
            stdin.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    };

    let shell_to_client = async {
        let mut buf = [0u8; 4096];
        loop {
            let n = stdout
                .read(&mut buf)
                .await
                .map_err(|e| e.to_string())?;
            if n == 0 {
                break;
            }
            writer
                .send(Message::Binary(buf[..n].to_vec().into()))
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok::<(), String>(())
    };

    let result = tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        res = client_to_shell => res.map_err(|e| SessionError::Stream(e.to_string())),
        res = shell_to_client => res.map_err(SessionError::Stream),
    };

    // The relay is over either way; reclaim the child before reporting.
    let _ = child.kill().await;

    let stderr_text = stderr_task.await.unwrap_or_default();
    let stderr_text = stderr_text.trim();
    if !stderr_text.is_empty() {
        debug!("attach to {pod_name} stderr: {stderr_text}");
    }

    result?;

    // A canceled session is a graceful abort; otherwise attach complaints
    // mean the relay never worked.
    if !cancel.is_cancelled() && !stderr_text.is_empty() {
        return Err(SessionError::Stream(stderr_text.to_string()));
    }

    Ok(())
}
