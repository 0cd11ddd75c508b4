//! Server configuration.
//!
//! Loaded from an optional TOML file layered with `GANTRY_`-prefixed
//! environment variables (`GANTRY_CLUSTER__NAMESPACE=...`).

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub terminal: TerminalConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8440,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Namespace holding all per-session workloads.
    pub namespace: String,
    /// Path to the kubectl binary.
    pub kubectl_binary: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: "gantry-system".to_string(),
            kubectl_binary: "kubectl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Image for cluster terminal workloads.
    pub image: String,
    /// Image for node shell workloads.
    pub node_image: String,
    /// Seconds to wait for a workload to become ready.
    pub ready_timeout_secs: u64,
    /// Seconds between readiness polls.
    pub poll_interval_secs: u64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            image: "bitnami/kubectl:latest".to_string(),
            node_image: "alpine:3.20".to_string(),
            ready_timeout_secs: 60,
            poll_interval_secs: 2,
        }
    }
}

impl GantryConfig {
    /// Load configuration, layering file and environment sources.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        let built = builder
            .add_source(Environment::with_prefix("GANTRY").separator("__"))
            .build()
            .context("loading configuration")?;

        built
            .try_deserialize()
            .context("deserializing configuration")
    }
}
