//! # Configuration
//!
//! The named options from the external interface table, realized as a plain
//! struct with a [`Default`] impl matching every stated default. Loading this
//! struct from environment variables or a file is the outer service's job —
//! this crate contributes the struct and its defaults, plus a small
//! `from_env` convenience constructor for the demo CLI; the core engine
//! itself never touches the environment.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: "echodb".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemtableConfig {
    /// Rotation threshold in bytes.
    pub bytes: usize,
    /// Number of immutable memtables that triggers a flush.
    pub max_immutable: usize,
}

impl Default for MemtableConfig {
    fn default() -> Self {
        Self {
            bytes: 64 * 1024 * 1024,
            max_immutable: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CachePolicy {
    Lru,
    TwoChoice,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    pub bytes: usize,
    pub policy: CachePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bytes: 256 * 1024 * 1024,
            policy: CachePolicy::Lru,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WalConfig {
    pub flush_interval_secs: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self { flush_interval_secs: 5 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompactionConfig {
    pub interval_secs: u64,
    pub l0_trigger: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10 * 60,
            l0_trigger: 4,
        }
    }
}

/// The follower-convergence sweep: how often a node re-lists the object
/// store for tables it didn't write itself (§4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub interval_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub interval_secs: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { interval_secs: 5 * 60 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LeaseConfig {
    pub duration_secs: u64,
    pub heartbeat_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            duration_secs: 30,
            heartbeat_secs: 10,
        }
    }
}

/// Top-level configuration for an EchoDB core instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EchoConfig {
    pub store: StoreConfig,
    pub memtable: MemtableConfig,
    pub cache: CacheConfig,
    pub wal: WalConfig,
    pub compaction: CompactionConfig,
    pub discovery: DiscoveryConfig,
    pub checkpoint: CheckpointConfig,
    pub lease: LeaseConfig,
    /// Stable identity for this process in the leader protocol.
    pub node_id: String,
    /// If true, this node becomes leader unconditionally (single-node mode, §4.9).
    pub designated_leader: bool,
}

impl EchoConfig {
    /// Reads configuration from environment variables, falling back to
    /// defaults for anything unset. A thin convenience for the demo CLI —
    /// the core crate never calls this itself.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.node_id = env_or("ECHODB_NODE_ID", &cfg.node_id_or_random());
        cfg.store.bucket = env_or("ECHODB_BUCKET", &cfg.store.bucket);
        cfg.store.region = env_or("ECHODB_REGION", &cfg.store.region);
        cfg.store.endpoint = std::env::var("ECHODB_ENDPOINT").ok();
        cfg.memtable.bytes = env_parse("ECHODB_MEMTABLE_BYTES", cfg.memtable.bytes);
        cfg.memtable.max_immutable = env_parse("ECHODB_MAX_IMMUTABLE", cfg.memtable.max_immutable);
        cfg.wal.flush_interval_secs =
            env_parse("ECHODB_WAL_FLUSH_SECS", cfg.wal.flush_interval_secs);
        cfg.compaction.interval_secs =
            env_parse("ECHODB_COMPACTION_INTERVAL_SECS", cfg.compaction.interval_secs);
        cfg.compaction.l0_trigger = env_parse("ECHODB_L0_TRIGGER", cfg.compaction.l0_trigger);
        cfg.discovery.interval_secs =
            env_parse("ECHODB_DISCOVERY_INTERVAL_SECS", cfg.discovery.interval_secs);
        cfg.checkpoint.interval_secs =
            env_parse("ECHODB_CHECKPOINT_INTERVAL_SECS", cfg.checkpoint.interval_secs);
        cfg.lease.duration_secs = env_parse("ECHODB_LEASE_DURATION_SECS", cfg.lease.duration_secs);
        cfg.lease.heartbeat_secs =
            env_parse("ECHODB_LEASE_HEARTBEAT_SECS", cfg.lease.heartbeat_secs);
        cfg.designated_leader = env_or("ECHODB_DESIGNATED_LEADER", "false")
            .parse()
            .unwrap_or(false);
        cfg
    }

    fn node_id_or_random(&self) -> String {
        format!("node-{}", std::process::id())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EchoConfig::default();
        assert_eq!(cfg.memtable.bytes, 64 * 1024 * 1024);
        assert_eq!(cfg.memtable.max_immutable, 3);
        assert_eq!(cfg.cache.bytes, 256 * 1024 * 1024);
        assert_eq!(cfg.wal.flush_interval_secs, 5);
        assert_eq!(cfg.compaction.interval_secs, 600);
        assert_eq!(cfg.discovery.interval_secs, 10);
        assert_eq!(cfg.checkpoint.interval_secs, 300);
        assert_eq!(cfg.lease.duration_secs, 30);
        assert_eq!(cfg.lease.heartbeat_secs, 10);
    }
}
