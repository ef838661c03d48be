//! Error types for the node registry

use std::time::Duration;

use crate::types::NodeId;

/// Errors raised by a [`NodeStore`](crate::store::NodeStore) backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The id has never been stored
    #[error("Unknown network node: {0}")]
    NotFound(NodeId),

    /// Transient I/O failure in the persistence layer
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded
    #[error("Record codec failed: {0}")]
    Codec(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// Reasons a peer check can fail
///
/// All variants count as a single failure for scoring.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("Peer unreachable: {0}")]
    Unreachable(String),
}

/// Errors surfaced by the registry API
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid node URL: {0}")]
    InvalidNodeUrl(String),

    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}
