//! Cluster access module.
//!
//! Provides an async interface to the cluster control plane via the kubectl
//! CLI. Everything the rest of the server needs from the cluster goes through
//! the [`ClusterApi`] trait so tests can substitute an in-memory fake.

mod error;
mod objects;

pub use error::{ClusterError, ClusterResult};
pub use objects::{
    ClusterRoleBinding, Container, ContainerState, ContainerStateDetail, ContainerStatus,
    ObjectMeta, Pod, PodCondition, PodSpec, PodStatus, RoleRef, SecurityContext, ServiceAccount,
    Subject,
};

use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Validate a resource name, namespace, or label value before it is passed
/// to the CLI. Generated names already satisfy this; the check guards
/// against injection through configured values.
fn validate_name(value: &str) -> ClusterResult<()> {
    if value.is_empty() {
        return Err(ClusterError::InvalidInput("name cannot be empty".to_string()));
    }

    if value.len() > 253 {
        return Err(ClusterError::InvalidInput(
            "name exceeds maximum length".to_string(),
        ));
    }

    let valid_chars =
        |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.';
    if !value.chars().all(valid_chars) {
        return Err(ClusterError::InvalidInput(format!(
            "name '{}' contains invalid characters",
            value
        )));
    }

    Ok(())
}

/// Validate a label key (may carry a DNS-style prefix with a slash).
fn validate_label_key(key: &str) -> ClusterResult<()> {
    if key.is_empty() || key.len() > 317 {
        return Err(ClusterError::InvalidInput("invalid label key".to_string()));
    }

    let valid_chars = |c: char| {
        c.is_ascii_lowercase()
            || c.is_ascii_uppercase()
            || c.is_ascii_digit()
            || c == '-'
            || c == '.'
            || c == '/'
            || c == '_'
    };
    if !key.chars().all(valid_chars) {
        return Err(ClusterError::InvalidInput(format!(
            "label key '{}' contains invalid characters",
            key
        )));
    }

    Ok(())
}

/// Cluster operations consumed by the terminal lifecycle.
///
/// Create calls surface "already exists" as a distinguishable error so
/// idempotent callers can ignore it.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn create_service_account(&self, sa: &ServiceAccount) -> ClusterResult<()>;
    async fn create_cluster_role_binding(&self, crb: &ClusterRoleBinding) -> ClusterResult<()>;
    async fn create_pod(&self, pod: &Pod) -> ClusterResult<()>;
    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<Pod>;

    /// Delete all pods in `namespace` carrying the label `key=value`,
    /// cascading owned objects in the background without waiting for
    /// propagation.
    async fn delete_pods_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> ClusterResult<()>;
}

/// Cluster client backed by the kubectl binary.
#[derive(Debug, Clone)]
pub struct KubectlCluster {
    binary: String,
}

impl Default for KubectlCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl KubectlCluster {
    pub fn new() -> Self {
        Self {
            binary: "kubectl".to_string(),
        }
    }

    /// Create a client with a custom kubectl path.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run `kubectl create -f -` with the manifest on stdin.
    async fn create_object<T: Serialize>(&self, kind: &str, name: &str, obj: &T) -> ClusterResult<()> {
        let manifest = serde_json::to_vec(obj).map_err(|e| ClusterError::ParseError(e.to_string()))?;

        let mut child = Command::new(&self.binary)
            .args(["create", "-f", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ClusterError::CommandFailed {
                command: "create".to_string(),
                message: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&manifest).await?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ClusterError::CommandFailed {
                command: "create".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(map_create_failure(kind, name, &stderr));
        }

        debug!("created {} {}", kind, name);
        Ok(())
    }
}

/// Map a failed create to a typed error, distinguishing "already exists".
fn map_create_failure(kind: &str, name: &str, stderr: &str) -> ClusterError {
    if stderr.contains("AlreadyExists") || stderr.contains("already exists") {
        return ClusterError::AlreadyExists {
            kind: kind.to_string(),
            name: name.to_string(),
        };
    }
    ClusterError::CommandFailed {
        command: "create".to_string(),
        message: stderr.trim().to_string(),
    }
}

/// Map a failed get to a typed error, distinguishing "not found".
fn map_get_failure(kind: &str, name: &str, stderr: &str) -> ClusterError {
    if stderr.contains("NotFound") || stderr.contains("not found") {
        return ClusterError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        };
    }
    ClusterError::CommandFailed {
        command: "get".to_string(),
        message: stderr.trim().to_string(),
    }
}

/// Arguments for a label-scoped background delete.
fn delete_pods_args(namespace: &str, key: &str, value: &str) -> Vec<String> {
    vec![
        "delete".to_string(),
        "pods".to_string(),
        "-n".to_string(),
        namespace.to_string(),
        "-l".to_string(),
        format!("{}={}", key, value),
        "--cascade=background".to_string(),
        "--wait=false".to_string(),
        "--ignore-not-found".to_string(),
    ]
}

#[async_trait]
impl ClusterApi for KubectlCluster {
    async fn create_service_account(&self, sa: &ServiceAccount) -> ClusterResult<()> {
        validate_name(&sa.metadata.name)?;
        self.create_object("ServiceAccount", &sa.metadata.name, sa).await
    }

    async fn create_cluster_role_binding(&self, crb: &ClusterRoleBinding) -> ClusterResult<()> {
        validate_name(&crb.metadata.name)?;
        self.create_object("ClusterRoleBinding", &crb.metadata.name, crb).await
    }

    async fn create_pod(&self, pod: &Pod) -> ClusterResult<()> {
        validate_name(&pod.metadata.name)?;
        self.create_object("Pod", &pod.metadata.name, pod).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> ClusterResult<Pod> {
        validate_name(namespace)?;
        validate_name(name)?;

        let output = Command::new(&self.binary)
            .args(["get", "pod", name, "-n", namespace, "-o", "json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ClusterError::CommandFailed {
                command: "get".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(map_get_failure("Pod", name, &stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(&stdout).map_err(|e| ClusterError::ParseError(e.to_string()))
    }

    async fn delete_pods_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> ClusterResult<()> {
        validate_name(namespace)?;
        validate_label_key(key)?;
        validate_name(value)?;

        let output = Command::new(&self.binary)
            .args(delete_pods_args(namespace, key, value))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ClusterError::CommandFailed {
                command: "delete".to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClusterError::CommandFailed {
                command: "delete".to_string(),
                message: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_accepts_dns_labels() {
        assert!(validate_name("gantry-terminal-alice-x7k2p").is_ok());
        assert!(validate_name("gantry-system").is_ok());
        assert!(validate_name("node-1.internal").is_ok());
    }

    #[test]
    fn validate_name_rejects_injection_attempts() {
        assert!(validate_name("").is_err());
        assert!(validate_name("name; rm -rf /").is_err());
        assert!(validate_name("UPPER").is_err());
        assert!(validate_name("with space").is_err());
        assert!(validate_name(&"a".repeat(254)).is_err());
    }

    #[test]
    fn validate_label_key_accepts_prefixed_keys() {
        assert!(validate_label_key("gantry.io/terminal-session").is_ok());
        assert!(validate_label_key("app.kubernetes.io/managed-by").is_ok());
        assert!(validate_label_key("bad key").is_err());
    }

    #[test]
    fn create_failure_mapping_distinguishes_already_exists() {
        let err = map_create_failure(
            "ServiceAccount",
            "gantry-terminal-admin",
            "Error from server (AlreadyExists): serviceaccounts \"gantry-terminal-admin\" already exists\n",
        );
        assert!(err.is_already_exists());

        let err = map_create_failure("Pod", "x", "Error from server (Forbidden): pods is forbidden");
        assert!(!err.is_already_exists());
    }

    #[test]
    fn get_failure_mapping_distinguishes_not_found() {
        let err = map_get_failure(
            "Pod",
            "gone",
            "Error from server (NotFound): pods \"gone\" not found\n",
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_args_scope_by_label_and_run_in_background() {
        let args = delete_pods_args("gantry-system", "gantry.io/terminal-session", "sess-1");
        assert!(args.contains(&"-l".to_string()));
        assert!(args.contains(&"gantry.io/terminal-session=sess-1".to_string()));
        assert!(args.contains(&"--cascade=background".to_string()));
        assert!(args.contains(&"--wait=false".to_string()));
        assert!(args.contains(&"--ignore-not-found".to_string()));
    }
}
