//! KratOs Node Registry
//!
//! Health registry for peer nodes found by network discovery. Every probe
//! outcome is folded into a per-node record (score, failure streak,
//! response timestamps) so the network can answer three questions:
//!
//! - is this node known? ([`NodeRegistry::is_known`])
//! - which nodes should a newcomer bootstrap from? ([`NodeRegistry::bootstrap_set`])
//! - what do we know about this node? ([`NodeRegistry::lookup`])
//!
//! The [`HealthScheduler`] keeps records fresh by re-probing the
//! least-recently-checked nodes on a fixed interval.

pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod prober;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod types;

pub use config::{RegistryConfig, StoreBackend};
pub use error::{ProbeError, RegistryError, StoreError};
pub use prober::{Prober, TcpProber};
pub use registry::{BackoffPolicy, NodeRegistry, ScoringPolicy};
pub use scheduler::{CycleReport, HealthScheduler, SchedulerConfig};
pub use store::{MemoryNodeStore, NodeStore, RocksNodeStore, StoreStats};
pub use types::{ConfirmOutcome, Endpoint, NodeId, NodeRecord, PeerNode};
