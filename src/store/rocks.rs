//! Node Store (RocksDB)
//!
//! Persistent storage for node records. Survives restarts so the registry
//! keeps its health history.
//!
//! ## Layout
//!
//! ```text
//! node:<id>                     -> bincode(NodeRecord)
//! chk:<last_check millis BE, sign bit flipped><id> -> ()   (never-checked = 0)
//! ```
//!
//! The `chk:` index makes the scheduler query a forward prefix scan.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::{select_bootstrap, NodeStore};
use crate::error::StoreError;
use crate::types::{NodeId, NodeRecord, PeerNode};

/// Key prefixes for different data types
const PREFIX_NODE: &[u8] = b"node:";
const PREFIX_CHECK: &[u8] = b"chk:";

/// Width of the timestamp part of a check index key
const CHECK_TS_LEN: usize = 8;

/// Node store backed by RocksDB
pub struct RocksNodeStore {
    /// RocksDB instance
    db: DB,

    /// Serializes index maintenance across upserts
    write_lock: Mutex<()>,
}

impl RocksNodeStore {
    /// Open or create a node store at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(100);
        opts.set_keep_log_file_num(3);

        let db = DB::open(&opts, path)?;
        let store = Self {
            db,
            write_lock: Mutex::new(()),
        };

        info!("📦 Opened node store at {:?} ({} records)", path, store.count()?);

        Ok(store)
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        for item in self.db.iterator(IteratorMode::From(PREFIX_NODE, Direction::Forward)) {
            let (key, _) = item?;
            if !key.starts_with(PREFIX_NODE) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    fn get_record(&self, id: &NodeId) -> Result<Option<NodeRecord>, StoreError> {
        match self.db.get_pinned(node_key(id))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn write_record(&self, record: &NodeRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let key = node_key(&record.id);
        let mut batch = WriteBatch::default();

        // Drop the previous index entry; an undecodable old value leaves a
        // stale entry that readers skip
        if let Some(old) = self.db.get_pinned(&key)? {
            match bincode::deserialize::<NodeRecord>(&old) {
                Ok(old) => batch.delete(check_key(&old)),
                Err(e) => warn!("Replacing undecodable record {}: {}", record.id.short(), e),
            }
        }

        batch.put(check_key(record), b"");
        batch.put(&key, bincode::serialize(record)?);
        self.db.write(batch)?;

        Ok(())
    }

    fn scan_checks(&self, limit: usize) -> Result<Vec<NodeRecord>, StoreError> {
        let mut batch = Vec::with_capacity(limit.min(1024));
        let mut seen = HashSet::new();

        if limit == 0 {
            return Ok(batch);
        }

        for item in self.db.iterator(IteratorMode::From(PREFIX_CHECK, Direction::Forward)) {
            let (key, _) = item?;
            if !key.starts_with(PREFIX_CHECK) {
                break;
            }

            let Some(id) = id_from_check_key(&key) else {
                warn!("Skipping malformed check index key");
                continue;
            };

            if !seen.insert(id) {
                continue;
            }

            let Some(record) = self.get_record(&id)? else {
                debug!("Index entry for missing record {}", id.short());
                continue;
            };

            // A concurrent upsert moved the record further along the index
            if check_key(&record).as_slice() != &*key {
                seen.remove(&id);
                continue;
            }

            batch.push(record);
            if batch.len() >= limit {
                break;
            }
        }

        Ok(batch)
    }

    fn scan_records(&self) -> Result<Vec<NodeRecord>, StoreError> {
        let mut records = Vec::new();

        for item in self.db.iterator(IteratorMode::From(PREFIX_NODE, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(PREFIX_NODE) {
                break;
            }

            match bincode::deserialize::<NodeRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping undecodable node record: {}", e),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl NodeStore for RocksNodeStore {
    async fn lookup(&self, id: &NodeId) -> Result<NodeRecord, StoreError> {
        self.get_record(id)?.ok_or(StoreError::NotFound(*id))
    }

    async fn exists(&self, id: &NodeId) -> Result<bool, StoreError> {
        Ok(self.db.get_pinned(node_key(id))?.is_some())
    }

    async fn upsert(&self, record: &NodeRecord) -> Result<(), StoreError> {
        self.write_record(record)
    }

    async fn update_batch(&self, limit: usize) -> Result<Vec<NodeRecord>, StoreError> {
        self.scan_checks(limit)
    }

    async fn bootstrap_set(
        &self,
        limit: usize,
        dead_threshold: u32,
    ) -> Result<Vec<PeerNode>, StoreError> {
        let records = self.scan_records()?;
        Ok(select_bootstrap(&records, limit, dead_threshold))
    }

    async fn all(&self) -> Result<Vec<NodeRecord>, StoreError> {
        self.scan_records()
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Create storage key for a node record
fn node_key(id: &NodeId) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_NODE.len() + NodeId::LEN);
    key.extend_from_slice(PREFIX_NODE);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Create check index key for a node record
fn check_key(record: &NodeRecord) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_CHECK.len() + CHECK_TS_LEN + NodeId::LEN);
    key.extend_from_slice(PREFIX_CHECK);
    key.extend_from_slice(&check_millis(record.last_check).to_be_bytes());
    key.extend_from_slice(record.id.as_bytes());
    key
}

/// Millis with the sign bit flipped so byte order matches time order,
/// pre-epoch included. 0 is reserved for never-checked records.
fn check_millis(ts: Option<DateTime<Utc>>) -> u64 {
    ts.map_or(0, |t| (t.timestamp_millis() as u64) ^ (1u64 << 63))
}

fn id_from_check_key(key: &[u8]) -> Option<NodeId> {
    let raw = key.get(PREFIX_CHECK.len() + CHECK_TS_LEN..)?;
    let bytes: [u8; 32] = raw.try_into().ok()?;
    Some(NodeId(bytes))
}
