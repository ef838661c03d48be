//! Node Store
//!
//! Persistence abstraction for node records. The registry only talks to a
//! [`NodeStore`]; the backing engine is chosen at start-up.
//!
//! Two ordered queries drive the rest of the system:
//! - [`NodeStore::update_batch`]: oldest-checked records first, the
//!   scheduler's work queue
//! - [`NodeStore::bootstrap_set`]: best healthy peers, handed to fresh
//!   discovery walks

mod memory;
mod rocks;

pub use memory::MemoryNodeStore;
pub use rocks::RocksNodeStore;

use async_trait::async_trait;
use std::cmp::Ordering;

use crate::error::StoreError;
use crate::types::{NodeId, NodeRecord, PeerNode};

/// Persistence contract for node records
///
/// `upsert` is a full replace keyed by id. Read-modify-write sequences are
/// serialized per id by the registry, not by the store.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetch a record, `StoreError::NotFound` if the id was never stored
    async fn lookup(&self, id: &NodeId) -> Result<NodeRecord, StoreError>;

    /// Cheap existence check
    async fn exists(&self, id: &NodeId) -> Result<bool, StoreError>;

    /// Insert or fully replace a record
    async fn upsert(&self, record: &NodeRecord) -> Result<(), StoreError>;

    /// Up to `limit` records in ascending `last_check` order, never-checked first
    async fn update_batch(&self, limit: usize) -> Result<Vec<NodeRecord>, StoreError>;

    /// Up to `limit` healthy peers, best score first
    async fn bootstrap_set(
        &self,
        limit: usize,
        dead_threshold: u32,
    ) -> Result<Vec<PeerNode>, StoreError>;

    /// Snapshot of every stored record
    async fn all(&self) -> Result<Vec<NodeRecord>, StoreError>;

    /// Aggregate counters over the stored records
    async fn stats(&self, dead_threshold: u32) -> Result<StoreStats, StoreError> {
        Ok(StoreStats::from_records(&self.all().await?, dead_threshold))
    }

    /// Persist buffered writes
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Summary of the stored population
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    /// Total records
    pub total: usize,

    /// Records whose last check succeeded
    pub healthy: usize,

    /// Records past the dead threshold
    pub dead: usize,

    /// Highest score in the store
    pub best_score: Option<i32>,
}

impl StoreStats {
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a NodeRecord>,
        dead_threshold: u32,
    ) -> Self {
        let mut stats = StoreStats::default();
        for record in records {
            stats.total += 1;
            if record.check_failure_count == 0 {
                stats.healthy += 1;
            }
            if record.is_dead(dead_threshold) {
                stats.dead += 1;
            }
            stats.best_score = Some(stats.best_score.map_or(record.score, |s| s.max(record.score)));
        }
        stats
    }
}

/// Scheduler order: oldest `last_check` first, `None` before any timestamp
pub(crate) fn check_order(a: &NodeRecord, b: &NodeRecord) -> Ordering {
    a.last_check.cmp(&b.last_check).then_with(|| a.id.cmp(&b.id))
}

/// Bootstrap order: highest score, then most recent response
pub(crate) fn bootstrap_order(a: &NodeRecord, b: &NodeRecord) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.last_response.cmp(&a.last_response))
        .then_with(|| a.id.cmp(&b.id))
}

/// Pick the bootstrap set from a full scan of records
pub(crate) fn select_bootstrap<'a>(
    records: impl IntoIterator<Item = &'a NodeRecord>,
    limit: usize,
    dead_threshold: u32,
) -> Vec<PeerNode> {
    let mut eligible: Vec<&NodeRecord> = records
        .into_iter()
        .filter(|r| !r.is_dead(dead_threshold))
        .collect();
    eligible.sort_by(|a, b| bootstrap_order(a, b));
    eligible.into_iter().take(limit).map(NodeRecord::peer).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, TimeZone, Utc};
    use std::net::{IpAddr, Ipv4Addr};

    use crate::types::{Endpoint, NodeId, NodeRecord, PeerNode};

    pub fn node(n: u8) -> PeerNode {
        let mut id = [0u8; 32];
        id[0] = n;
        PeerNode::new(
            NodeId(id),
            Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)), 30333, Some(30334)),
        )
    }

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub fn record(n: u8, score: i32, failures: u32, last_check: Option<i64>) -> NodeRecord {
        let mut record = NodeRecord::unchecked(node(n), score);
        record.check_failure_count = failures;
        record.first_response = last_check.map(|_| at(0));
        record.last_response = last_check.map(|t| at(t.saturating_sub(failures as i64)));
        record.last_check = last_check.map(at);
        record
    }
}
