//! Node configuration
//!
//! Loaded once at startup from a JSON file; every field has a default so an
//! empty object `{}` describes a standalone node on 127.0.0.1:6379.

use crate::aof::{AofConfig, SyncPolicy};
use crate::cluster::{ClusterConfig, PoolConfig, DEFAULT_REPLICAS};
use crate::database::DEFAULT_DATABASES;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Client listener address
    pub bind: String,

    /// Address other members use to reach this node; `bind` when unset
    pub self_addr: Option<String>,

    /// Other cluster members; empty means standalone
    pub peers: Vec<String>,

    /// Number of databases (0 means the default)
    pub databases: usize,

    /// Log write commands to the append-only file
    pub append_only: bool,

    pub append_filename: PathBuf,

    /// `always`, `everysec` or `no`
    pub append_fsync: SyncPolicy,

    /// Peer connections borrowed at once, per peer
    pub pool_max_active: usize,

    /// Idle peer connections kept, per peer
    pub pool_max_idle: usize,

    /// Peer connect and reply timeout
    pub peer_timeout_ms: u64,

    /// Logging level, overridden by RUST_LOG
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:6379".to_string(),
            self_addr: None,
            peers: Vec::new(),
            databases: DEFAULT_DATABASES,
            append_only: false,
            append_filename: PathBuf::from("appendonly.aof"),
            append_fsync: SyncPolicy::default(),
            pool_max_active: 16,
            pool_max_idle: 8,
            peer_timeout_ms: 3000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Read a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Whether this node runs as a cluster member
    pub fn is_cluster(&self) -> bool {
        !self.peers.is_empty()
    }

    pub fn self_addr(&self) -> &str {
        self.self_addr.as_deref().unwrap_or(&self.bind)
    }

    pub fn aof(&self) -> AofConfig {
        AofConfig {
            path: self.append_filename.clone(),
            sync_policy: self.append_fsync,
            enabled: self.append_only,
        }
    }

    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            max_active: self.pool_max_active,
            max_idle: self.pool_max_idle,
        }
    }

    pub fn cluster(&self) -> ClusterConfig {
        ClusterConfig {
            self_addr: self.self_addr().to_string(),
            peers: self.peers.clone(),
            replicas: DEFAULT_REPLICAS,
            pool: self.pool(),
            peer_timeout: Duration::from_millis(self.peer_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.bind, "127.0.0.1:6379");
        assert_eq!(config.self_addr(), "127.0.0.1:6379");
        assert_eq!(config.databases, 16);
        assert!(!config.is_cluster());
        assert!(!config.aof().enabled);
        assert_eq!(config.aof().sync_policy, SyncPolicy::EverySecond);
    }

    #[test]
    fn test_cluster_fields() {
        let config = Config::from_json(
            r#"{
                "bind": "0.0.0.0:7001",
                "self_addr": "10.0.0.1:7001",
                "peers": ["10.0.0.2:7001", "10.0.0.3:7001"],
                "append_only": true,
                "append_fsync": "always",
                "peer_timeout_ms": 500
            }"#,
        )
        .unwrap();

        assert!(config.is_cluster());
        let cluster = config.cluster();
        assert_eq!(cluster.self_addr, "10.0.0.1:7001");
        assert_eq!(cluster.peers.len(), 2);
        assert_eq!(cluster.peer_timeout, Duration::from_millis(500));
        assert_eq!(config.aof().sync_policy, SyncPolicy::Always);
        assert!(config.aof().enabled);
    }

    #[test]
    fn test_bad_fsync_rejected() {
        assert!(Config::from_json(r#"{"append_fsync": "sometimes"}"#).is_err());
    }
}
