//! Node Registry Configuration
//!
//! Configurable parameters for the registry, its scoring policy and the
//! health scheduler. Default values favour slow, steady re-probing over
//! aggressive churn.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::RegistryError;
use crate::types::PeerNode;

/// Persistence backend for node records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// RocksDB under the data directory
    Rocksdb,

    /// Volatile in-memory map
    Memory,
}

/// Main configuration for the node registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    // === Storage ===

    /// Backend used to persist node records
    pub store: StoreBackend,

    // === Scheduling ===

    /// Interval between health check cycles (seconds)
    pub check_interval_secs: u64,

    /// Maximum records pulled per cycle
    pub batch_size: usize,

    /// Maximum probes in flight at once
    pub max_concurrent_probes: usize,

    /// Timeout for a single probe (seconds)
    pub probe_timeout_secs: u64,

    /// Base re-probe interval, doubled per consecutive failure (seconds)
    pub backoff_base_secs: u64,

    /// Cap on the backoff exponent
    pub backoff_cap_exponent: u32,

    // === Scoring ===

    /// Score increase for a successful check
    pub success_reward: i32,

    /// Score decrease per consecutive failure for a failed check
    pub failure_penalty: i32,

    /// Maximum node score
    pub max_score: i32,

    /// Minimum node score
    pub min_score: i32,

    /// Records with more consecutive failures are left out of bootstrap sets
    pub dead_threshold: u32,

    // === Bootstrap ===

    /// Default number of peers handed out for bootstrap
    pub bootstrap_set_size: usize,

    /// Node URLs probed once at start-up
    pub seed_nodes: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            // Storage
            store: StoreBackend::Rocksdb,

            // Scheduling
            check_interval_secs: 30,
            batch_size: 64,
            max_concurrent_probes: 16,
            probe_timeout_secs: 5,
            backoff_base_secs: 60,
            backoff_cap_exponent: 6,  // ~64 minutes between probes at worst

            // Scoring
            success_reward: 1,
            failure_penalty: 1,
            max_score: 100,
            min_score: -1000,
            dead_threshold: 0,

            // Bootstrap
            bootstrap_set_size: 25,
            seed_nodes: vec![],
        }
    }
}

impl RegistryConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_store(mut self, store: Option<StoreBackend>) -> Self {
        if let Some(store) = store {
            self.store = store;
        }
        self
    }

    pub fn with_check_interval(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.check_interval_secs = secs;
        }
        self
    }

    pub fn with_batch_size(mut self, size: Option<usize>) -> Self {
        if let Some(size) = size {
            self.batch_size = size;
        }
        self
    }

    pub fn with_max_concurrent_probes(mut self, n: Option<usize>) -> Self {
        if let Some(n) = n {
            self.max_concurrent_probes = n;
        }
        self
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    /// Parse the configured seed node URLs
    pub fn seed_peers(&self) -> Result<Vec<PeerNode>, RegistryError> {
        self.seed_nodes.iter().map(|url| url.parse()).collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.check_interval_secs == 0 {
            anyhow::bail!("check_interval_secs must be greater than 0");
        }

        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        if self.max_concurrent_probes == 0 {
            anyhow::bail!("max_concurrent_probes must be greater than 0");
        }

        if self.probe_timeout_secs == 0 {
            anyhow::bail!("probe_timeout_secs must be greater than 0");
        }

        if self.backoff_cap_exponent > 20 {
            anyhow::bail!(
                "backoff_cap_exponent ({}) must not exceed 20",
                self.backoff_cap_exponent
            );
        }

        if self.success_reward <= 0 || self.failure_penalty <= 0 {
            anyhow::bail!(
                "success_reward ({}) and failure_penalty ({}) must be positive",
                self.success_reward,
                self.failure_penalty
            );
        }

        // New nodes start at 1, which must sit inside the score bounds
        if self.min_score >= 1 || self.max_score < 1 {
            anyhow::bail!(
                "score bounds [{}, {}] must contain the initial score 1",
                self.min_score,
                self.max_score
            );
        }

        if let Err(e) = self.seed_peers() {
            anyhow::bail!("invalid seed node: {}", e);
        }

        Ok(())
    }
}
