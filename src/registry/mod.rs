//! Node Health Registry
//!
//! Tracks liveness of peers in the discovery network. Every check outcome
//! funnels through [`NodeRegistry::confirm_check`] or
//! [`NodeRegistry::fail_check`], which read, transition and persist a record
//! under a per-id lock so concurrent probes never lose an update.

pub mod scoring;

pub use scoring::{BackoffPolicy, ScoringPolicy, INITIAL_SCORE};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::{NodeStore, StoreStats};
use crate::types::{ConfirmOutcome, NodeId, NodeRecord, PeerNode};

/// Number of lock stripes for per-id read-modify-write
const LOCK_STRIPES: usize = 64;

/// Peer registry over an injected [`NodeStore`]
pub struct NodeRegistry {
    /// Backing store
    store: Arc<dyn NodeStore>,

    /// Transition rules
    policy: ScoringPolicy,

    /// Striped locks keyed by node id
    locks: Vec<Mutex<()>>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn NodeStore>, policy: ScoringPolicy) -> Self {
        Self {
            store,
            policy,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Node ids are hashes, so the leading bytes spread evenly over stripes
    async fn lock(&self, id: &NodeId) -> MutexGuard<'_, ()> {
        let stripe = usize::from(u16::from_be_bytes([id.0[0], id.0[1]])) % self.locks.len();
        self.locks[stripe].lock().await
    }

    /// Register a successful contact with `node`
    ///
    /// Unknown nodes are created with the initial score; known nodes are
    /// rewarded and move to the node's current endpoint.
    pub async fn confirm_check(
        &self,
        node: &PeerNode,
        now: DateTime<Utc>,
    ) -> Result<ConfirmOutcome, StoreError> {
        let _guard = self.lock(&node.id).await;

        match self.store.lookup(&node.id).await {
            Ok(mut record) => {
                self.policy.on_success(&mut record, node, now);
                self.store.upsert(&record).await?;
                debug!("✅ Node {} confirmed (score={})", node.id.short(), record.score);
                Ok(ConfirmOutcome::Known)
            }
            Err(StoreError::NotFound(_)) => {
                let record = self.policy.discovered(node, now);
                self.store.upsert(&record).await?;
                info!("🆕 Discovered node {} at {}", node.id.short(), node.endpoint);
                Ok(ConfirmOutcome::Discovered)
            }
            Err(e) => Err(e),
        }
    }

    /// Register a failed contact attempt with node `id`
    ///
    /// Failing an unknown node is a no-op.
    pub async fn fail_check(&self, id: &NodeId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let _guard = self.lock(id).await;

        let mut record = match self.store.lookup(id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        self.policy.on_failure(&mut record, now);
        self.store.upsert(&record).await?;

        debug!(
            "❌ Node {} failed check #{} (score={})",
            id.short(),
            record.check_failure_count,
            record.score
        );

        Ok(())
    }

    /// Fetch the record of a node, `StoreError::NotFound` if never seen
    pub async fn lookup(&self, id: &NodeId) -> Result<NodeRecord, StoreError> {
        self.store.lookup(id).await
    }

    /// Whether the node has ever been confirmed
    ///
    /// An unreachable store reports the node as unknown.
    pub async fn is_known(&self, id: &NodeId) -> bool {
        match self.store.exists(id).await {
            Ok(known) => known,
            Err(e) => {
                warn!("Existence check for {} failed: {}", id.short(), e);
                false
            }
        }
    }

    /// Best healthy peers to seed a new discovery walk
    pub async fn bootstrap_set(&self, limit: usize) -> Result<Vec<PeerNode>, StoreError> {
        self.store.bootstrap_set(limit, self.policy.dead_threshold).await
    }

    /// Oldest-checked records, the scheduler's work queue
    pub async fn update_batch(&self, limit: usize) -> Result<Vec<NodeRecord>, StoreError> {
        self.store.update_batch(limit).await
    }

    /// Bulk import of records (full replace per id)
    pub async fn import(&self, records: &[NodeRecord]) -> Result<usize, StoreError> {
        for record in records {
            let _guard = self.lock(&record.id).await;
            self.store.upsert(record).await?;
        }

        info!("📥 Imported {} node records", records.len());
        Ok(records.len())
    }

    /// Every stored record
    pub async fn export(&self) -> Result<Vec<NodeRecord>, StoreError> {
        self.store.all().await
    }

    /// Aggregate statistics
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.store.stats(self.policy.dead_threshold).await
    }

    /// Persist buffered writes
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.store.flush().await
    }
}
