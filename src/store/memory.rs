//! In-memory node store
//!
//! Volatile backend for tests and throwaway runs. Same ordering semantics
//! as the RocksDB store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{check_order, select_bootstrap, NodeStore};
use crate::error::StoreError;
use crate::types::{NodeId, NodeRecord, PeerNode};

/// Node store backed by a `HashMap`
#[derive(Default)]
pub struct MemoryNodeStore {
    records: RwLock<HashMap<NodeId, NodeRecord>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn lookup(&self, id: &NodeId) -> Result<NodeRecord, StoreError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    async fn exists(&self, id: &NodeId) -> Result<bool, StoreError> {
        Ok(self.records.read().await.contains_key(id))
    }

    async fn upsert(&self, record: &NodeRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_batch(&self, limit: usize) -> Result<Vec<NodeRecord>, StoreError> {
        let records = self.records.read().await;
        let mut batch: Vec<&NodeRecord> = records.values().collect();
        batch.sort_by(|a, b| check_order(a, b));
        Ok(batch.into_iter().take(limit).cloned().collect())
    }

    async fn bootstrap_set(
        &self,
        limit: usize,
        dead_threshold: u32,
    ) -> Result<Vec<PeerNode>, StoreError> {
        let records = self.records.read().await;
        Ok(select_bootstrap(records.values(), limit, dead_threshold))
    }

    async fn all(&self) -> Result<Vec<NodeRecord>, StoreError> {
        let records = self.records.read().await;
        let mut all: Vec<NodeRecord> = records.values().cloned().collect();
        all.sort_by(check_order);
        Ok(all)
    }
}
