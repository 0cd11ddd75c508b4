//! Guaranteed session cleanup.

use std::sync::Arc;

use log::{info, warn};

use crate::cluster::ClusterApi;

use super::SESSION_LABEL_KEY;

/// Deletes everything a session created, exactly once, on every exit path.
///
/// Arm the reaper before the first create call and invoke [`run`] when the
/// session ends. If the owning task unwinds without reaching `run` (panic,
/// runtime teardown of the future), `Drop` spawns the same deletion instead.
/// The shared privilege objects are never touched; deletion is scoped to the
/// session's correlation label.
///
/// [`run`]: ResourceReaper::run
pub struct ResourceReaper {
    cluster: Arc<dyn ClusterApi>,
    namespace: String,
    session_id: String,
    armed: bool,
}

impl ResourceReaper {
    pub fn arm(cluster: Arc<dyn ClusterApi>, namespace: String, session_id: String) -> Self {
        Self {
            cluster,
            namespace,
            session_id,
            armed: true,
        }
    }

    /// Delete the session's workloads. Failures are logged, never surfaced,
    /// and never block the caller's channel from closing.
    pub async fn run(mut self) {
        self.armed = false;
        info!("cleaning up terminal workload {}", self.session_id);
        reap(&*self.cluster, &self.namespace, &self.session_id).await;
    }
}

impl Drop for ResourceReaper {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let cluster = Arc::clone(&self.cluster);
        let namespace = std::mem::take(&mut self.namespace);
        let session_id = std::mem::take(&mut self.session_id);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    info!("cleaning up terminal workload {session_id}");
                    reap(&*cluster, &namespace, &session_id).await;
                });
            }
            Err(_) => {
                warn!("no runtime available to clean up terminal workload {session_id}");
            }
        }
    }
}

async fn reap(cluster: &dyn ClusterApi, namespace: &str, session_id: &str) {
    if let Err(err) = cluster
        .delete_pods_by_label(namespace, SESSION_LABEL_KEY, session_id)
        .await
    {
        warn!("failed to clean up terminal workload {session_id}: {err}");
    }
}
