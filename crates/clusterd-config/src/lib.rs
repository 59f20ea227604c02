//! Configuration loading for the cluster daemon.
//!
//! Hierarchical configuration from multiple sources:
//! 1. Environment variables (`CLUSTERD_*` prefix)
//! 2. `clusterd.local.toml` (gitignored, local overrides)
//! 3. `clusterd.toml` (git-tracked, per-member config)
//! 4. `~/.config/clusterd/config.toml` (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
pub mod paths;

pub use error::ConfigError;
pub use loader::load;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub scheduler: SchedulerConfig,
    pub placement: PlacementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// This member's name as shown in the cluster member list.
    pub name: String,
    /// This member's replica identity, unique across the cluster. It
    /// doubles as the member id, so two daemons sharing a replica id
    /// would fight over the same roster entry.
    pub replica_id: u64,
    pub data_dir: PathBuf,
    pub rest_address: String,
    pub cluster_address: String,
    pub debug_address: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "clusterd".to_string(),
            replica_id: 1,
            data_dir: PathBuf::from(".clusterd/data"),
            rest_address: "127.0.0.1:8443".to_string(),
            cluster_address: "127.0.0.1:8444".to_string(),
            debug_address: None,
        }
    }
}

/// Cluster-membership tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub max_voters: u32,
    pub max_standby: u32,
    pub offline_threshold_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_voters: 3,
            max_standby: 2,
            offline_threshold_secs: 20,
        }
    }
}

impl ClusterConfig {
    pub const MIN_OFFLINE_THRESHOLD_SECS: u64 = 10;

    /// Heartbeat cadence: `offline_threshold / 4`, clamped to `[2, 10]`
    /// seconds.
    pub fn heartbeat_interval_secs(&self) -> u64 {
        (self.offline_threshold_secs / 4).clamp(2, 10)
    }

    /// Validates the membership tunables at configuration time rather
    /// than silently coercing them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.offline_threshold_secs < Self::MIN_OFFLINE_THRESHOLD_SECS {
            return Err(ConfigError::ValidationError(format!(
                "cluster.offline_threshold_secs must be >= {}",
                Self::MIN_OFFLINE_THRESHOLD_SECS
            )));
        }
        if self.offline_threshold_secs < 4 * self.heartbeat_interval_secs() {
            return Err(ConfigError::ValidationError(
                "cluster.offline_threshold_secs must be at least 4x the heartbeat interval"
                    .to_string(),
            ));
        }
        if self.max_voters == 0 {
            return Err(ConfigError::ValidationError(
                "cluster.max_voters must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Instance-placement scheduler mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerMode {
    All,
    Manual,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub instance: SchedulerMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            instance: SchedulerMode::All,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub scriptlet_path: Option<PathBuf>,
    pub scriptlet_timeout_secs: u64,
    pub scriptlet_max_steps: u64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            scriptlet_path: None,
            scriptlet_timeout_secs: 5,
            scriptlet_max_steps: 1_000_000,
        }
    }
}

impl DaemonConfig {
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        loader::load(&cwd)
    }

    pub fn load_from_dir(data_dir: impl AsRef<Path>) -> Result<Self> {
        loader::load(data_dir.as_ref())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.replica_id == 0 {
            return Err(ConfigError::ValidationError(
                "server.replica_id must be at least 1".to_string(),
            ));
        }
        self.cluster.validate()
    }

    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();
        if self.server.data_dir.is_relative() {
            self.server.data_dir = base.join(&self.server.data_dir);
        }
    }
}
