//! Test utilities and common setup.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gantry_protocol::SetupMessage;
use tokio_util::sync::CancellationToken;

use gantry::cluster::{
    ClusterApi, ClusterError, ClusterResult, ClusterRoleBinding, ContainerState,
    ContainerStateDetail, ContainerStatus, ObjectMeta, Pod, PodCondition, PodSpec, PodStatus,
    ServiceAccount,
};
use gantry::terminal::{ProgressSink, SESSION_LABEL_KEY};

/// One recorded cluster operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CreateServiceAccount(String),
    CreateClusterRoleBinding(String),
    CreatePod {
        name: String,
        session_label: Option<String>,
    },
    GetPod(String),
    DeletePodsByLabel {
        namespace: String,
        key: String,
        value: String,
    },
}

#[derive(Default)]
struct Inner {
    ops: Vec<Op>,
    existing: HashSet<String>,
    pod_results: VecDeque<Result<Pod, ()>>,
    fail_service_account: Option<String>,
    fail_create_pod: Option<String>,
    fail_delete: bool,
    get_pod_calls: u32,
    cancel_after: Option<(u32, CancellationToken)>,
}

/// In-memory [`ClusterApi`] recording every operation.
///
/// `get_pod` pops scripted results; the final scripted result repeats
/// forever. An empty script behaves as "not found".
#[derive(Default)]
pub struct FakeCluster {
    inner: Mutex<Inner>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.inner.lock().unwrap().ops.clone()
    }

    pub fn push_pod(&self, pod: Pod) {
        self.inner.lock().unwrap().pod_results.push_back(Ok(pod));
    }

    pub fn push_not_found(&self) {
        self.inner.lock().unwrap().pod_results.push_back(Err(()));
    }

    pub fn fail_service_account(&self, message: &str) {
        self.inner.lock().unwrap().fail_service_account = Some(message.to_string());
    }

    pub fn fail_create_pod(&self, message: &str) {
        self.inner.lock().unwrap().fail_create_pod = Some(message.to_string());
    }

    pub fn fail_delete(&self) {
        self.inner.lock().unwrap().fail_delete = true;
    }

    /// Cancel `token` from within the nth `get_pod` call, emulating a caller
    /// that disconnects mid-poll.
    pub fn cancel_after_polls(&self, polls: u32, token: CancellationToken) {
        self.inner.lock().unwrap().cancel_after = Some((polls, token));
    }

    pub fn delete_ops(&self) -> Vec<Op> {
        self.ops()
            .into_iter()
            .filter(|op| matches!(op, Op::DeletePodsByLabel { .. }))
            .collect()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn create_service_account(&self, sa: &ServiceAccount) -> ClusterResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .ops
            .push(Op::CreateServiceAccount(sa.metadata.name.clone()));

        if let Some(message) = &inner.fail_service_account {
            return Err(ClusterError::CommandFailed {
                command: "create".to_string(),
                message: message.clone(),
            });
        }

        let key = format!("sa/{}", sa.metadata.name);
        if !inner.existing.insert(key) {
            return Err(ClusterError::AlreadyExists {
                kind: "ServiceAccount".to_string(),
                name: sa.metadata.name.clone(),
            });
        }
        Ok(())
    }

    async fn create_cluster_role_binding(&self, crb: &ClusterRoleBinding) -> ClusterResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .ops
            .push(Op::CreateClusterRoleBinding(crb.metadata.name.clone()));

        let key = format!("crb/{}", crb.metadata.name);
        if !inner.existing.insert(key) {
            return Err(ClusterError::AlreadyExists {
                kind: "ClusterRoleBinding".to_string(),
                name: crb.metadata.name.clone(),
            });
        }
        Ok(())
    }

    async fn create_pod(&self, pod: &Pod) -> ClusterResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(Op::CreatePod {
            name: pod.metadata.name.clone(),
            session_label: pod.metadata.labels.get(SESSION_LABEL_KEY).cloned(),
        });

        if let Some(message) = &inner.fail_create_pod {
            return Err(ClusterError::CommandFailed {
                command: "create".to_string(),
                message: message.clone(),
            });
        }
        Ok(())
    }

    async fn get_pod(&self, _namespace: &str, name: &str) -> ClusterResult<Pod> {
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(Op::GetPod(name.to_string()));
        inner.get_pod_calls += 1;

        if let Some((polls, token)) = &inner.cancel_after
            && inner.get_pod_calls >= *polls
        {
            token.cancel();
        }

        let result = if inner.pod_results.len() > 1 {
            inner.pod_results.pop_front()
        } else {
            inner.pod_results.front().cloned()
        };

        match result {
            Some(Ok(pod)) => Ok(pod),
            _ => Err(ClusterError::NotFound {
                kind: "Pod".to_string(),
                name: name.to_string(),
            }),
        }
    }

    async fn delete_pods_by_label(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> ClusterResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(Op::DeletePodsByLabel {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });

        if inner.fail_delete {
            return Err(ClusterError::CommandFailed {
                command: "delete".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

/// [`ProgressSink`] capturing envelopes for assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<SetupMessage>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<SetupMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn send(&mut self, msg: SetupMessage) {
        self.messages.lock().unwrap().push(msg);
    }
}

// ============================================================================
// Pod builders
// ============================================================================

fn base_pod(name: &str) -> Pod {
    Pod {
        api_version: "v1".to_string(),
        kind: "Pod".to_string(),
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: Some("gantry-system".to_string()),
            labels: Default::default(),
        },
        spec: PodSpec::default(),
        status: None,
    }
}

/// A pod that is running and ready.
pub fn ready_pod(name: &str) -> Pod {
    let mut pod = base_pod(name);
    pod.status = Some(PodStatus {
        phase: Some("Running".to_string()),
        conditions: vec![PodCondition {
            condition_type: "Ready".to_string(),
            status: "True".to_string(),
        }],
        container_statuses: vec![],
    });
    pod
}

/// A pod stuck pending with a waiting diagnostic.
pub fn waiting_pod(name: &str, reason: &str, message: &str) -> Pod {
    let mut pod = base_pod(name);
    pod.status = Some(PodStatus {
        phase: Some("Pending".to_string()),
        conditions: vec![],
        container_statuses: vec![ContainerStatus {
            name: "shell".to_string(),
            state: Some(ContainerState {
                waiting: Some(ContainerStateDetail {
                    reason: Some(reason.to_string()),
                    message: Some(message.to_string()),
                }),
                terminated: None,
            }),
        }],
    });
    pod
}

/// A pod that ran to completion and failed.
pub fn failed_pod(name: &str, message: &str) -> Pod {
    let mut pod = base_pod(name);
    pod.status = Some(PodStatus {
        phase: Some("Failed".to_string()),
        conditions: vec![],
        container_statuses: vec![ContainerStatus {
            name: "shell".to_string(),
            state: Some(ContainerState {
                waiting: None,
                terminated: Some(ContainerStateDetail {
                    reason: Some("Error".to_string()),
                    message: Some(message.to_string()),
                }),
            }),
        }],
    });
    pod
}
