//! Shared privilege bootstrap.
//!
//! Every session runs under one shared, maximally privileged service
//! account. The account and its cluster-admin binding are created lazily and
//! idempotently; they are never deleted.

use crate::cluster::{ClusterApi, ClusterResult, ClusterRoleBinding, ServiceAccount};

use super::managed_labels;

/// Name of the shared service account and its binding.
pub const ADMIN_SERVICE_ACCOUNT: &str = "gantry-terminal-admin";

const COMPONENT: &str = "cluster-terminal";

/// Ensure the shared admin service account and cluster-admin binding exist.
///
/// "Already exists" is success, which makes this safe under concurrent
/// invocation from any number of sessions or server instances: the cluster's
/// create-uniqueness guarantee replaces in-process locking. Any other error
/// aborts the session before a workload is created.
pub async fn ensure_admin_service_account(
    cluster: &dyn ClusterApi,
    namespace: &str,
) -> ClusterResult<()> {
    let labels = managed_labels(COMPONENT);

    let sa = ServiceAccount::new(ADMIN_SERVICE_ACCOUNT, namespace, labels.clone());
    match cluster.create_service_account(&sa).await {
        Ok(()) => {}
        Err(err) if err.is_already_exists() => {}
        Err(err) => return Err(err),
    }

    let crb = ClusterRoleBinding::cluster_admin(
        ADMIN_SERVICE_ACCOUNT,
        ADMIN_SERVICE_ACCOUNT,
        namespace,
        labels,
    );
    match cluster.create_cluster_role_binding(&crb).await {
        Ok(()) => {}
        Err(err) if err.is_already_exists() => {}
        Err(err) => return Err(err),
    }

    Ok(())
}
