//! Core types for the node health registry
//!
//! A peer is identified by a [`NodeId`] derived from its Ed25519 public key
//! and reached at an [`Endpoint`]. The registry persists one [`NodeRecord`]
//! per id and mutates it on every confirmed or failed check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::crypto;
use crate::error::RegistryError;

/// URL scheme carrying the peer's public key
pub const ENODE_SCHEME: &str = "enode://";

/// URL scheme carrying the derived node id
pub const NODE_SCHEME: &str = "node://";

/// Default discovery port for KratOs nodes
pub const DEFAULT_DISCOVERY_PORT: u16 = 30333;

// =============================================================================
// NODE IDENTITY
// =============================================================================

/// Stable peer identity (Blake3 hash of the peer's Ed25519 public key)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub const LEN: usize = 32;

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex prefix for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short())
    }
}

impl FromStr for NodeId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| RegistryError::InvalidNodeId(e.to_string()))?;
        if bytes.len() != Self::LEN {
            return Err(RegistryError::InvalidNodeId(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(NodeId(arr))
    }
}

impl Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex::encode(self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// NETWORK ENDPOINT
// =============================================================================

/// Network address of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// IP address
    pub ip: IpAddr,

    /// Discovery (UDP) port
    pub udp_port: u16,

    /// Session (TCP) port, if advertised
    pub tcp_port: Option<u16>,
}

impl Endpoint {
    pub fn new(ip: IpAddr, udp_port: u16, tcp_port: Option<u16>) -> Self {
        Self { ip, udp_port, tcp_port }
    }

    /// Address to dial for a TCP liveness check
    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.tcp_port.unwrap_or(self.udp_port))
    }

    /// Discovery address
    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.udp_port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.udp_addr())?;
        if let Some(tcp) = self.tcp_port {
            write!(f, "?tcp={}", tcp)?;
        }
        Ok(())
    }
}

// =============================================================================
// PEER NODE (id + endpoint)
// =============================================================================

/// A peer as observed by a discovery walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerNode {
    pub id: NodeId,
    pub endpoint: Endpoint,
}

impl PeerNode {
    pub fn new(id: NodeId, endpoint: Endpoint) -> Self {
        Self { id, endpoint }
    }

    /// Parse `enode://<pubkey>@ip:tcp[?discport=udp]`
    fn parse_enode(rest: &str) -> Result<Self, RegistryError> {
        let (key_hex, host) = split_url(rest)?;
        let public_key = crypto::parse_public_key(key_hex)?;
        let (addr, query) = split_query(host);
        let addr = parse_socket_addr(addr)?;

        let udp_port = match query_param(query, "discport") {
            Some(p) => parse_port(p)?,
            None => addr.port(),
        };

        Ok(Self {
            id: crypto::derive_node_id(&public_key),
            endpoint: Endpoint::new(addr.ip(), udp_port, Some(addr.port())),
        })
    }

    /// Parse `node://<id>@ip:udp[?tcp=port]`
    fn parse_node(rest: &str) -> Result<Self, RegistryError> {
        let (id_hex, host) = split_url(rest)?;
        let id: NodeId = id_hex.parse()?;
        let (addr, query) = split_query(host);
        let addr = parse_socket_addr(addr)?;

        let tcp_port = query_param(query, "tcp").map(parse_port).transpose()?;

        Ok(Self {
            id,
            endpoint: Endpoint::new(addr.ip(), addr.port(), tcp_port),
        })
    }
}

impl FromStr for PeerNode {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix(ENODE_SCHEME) {
            Self::parse_enode(rest)
        } else if let Some(rest) = s.strip_prefix(NODE_SCHEME) {
            Self::parse_node(rest)
        } else {
            Err(RegistryError::InvalidNodeUrl(format!("unknown scheme: {}", s)))
        }
    }
}

impl fmt::Display for PeerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}@{}", NODE_SCHEME, self.id, self.endpoint)
    }
}

fn split_url(rest: &str) -> Result<(&str, &str), RegistryError> {
    rest.split_once('@')
        .ok_or_else(|| RegistryError::InvalidNodeUrl(format!("missing '@' in {}", rest)))
}

fn split_query(host: &str) -> (&str, Option<&str>) {
    match host.split_once('?') {
        Some((addr, query)) => (addr, Some(query)),
        None => (host, None),
    }
}

fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn parse_socket_addr(addr: &str) -> Result<SocketAddr, RegistryError> {
    addr.parse()
        .map_err(|e| RegistryError::InvalidNodeUrl(format!("bad address {}: {}", addr, e)))
}

fn parse_port(port: &str) -> Result<u16, RegistryError> {
    port.parse()
        .map_err(|e| RegistryError::InvalidNodeUrl(format!("bad port {}: {}", port, e)))
}

// =============================================================================
// NODE RECORD
// =============================================================================

/// Persisted health state of one peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Peer identity, unique key of the store
    pub id: NodeId,

    /// Last observed endpoint
    pub endpoint: Endpoint,

    /// Reputation score (may go negative)
    pub score: i32,

    /// Consecutive failed checks since the last success
    pub check_failure_count: u32,

    /// First successful check
    pub first_response: Option<DateTime<Utc>>,

    /// Most recent successful check
    pub last_response: Option<DateTime<Utc>>,

    /// Most recent check attempt, success or failure
    pub last_check: Option<DateTime<Utc>>,
}

impl NodeRecord {
    /// A record that has never been checked (bulk import path)
    pub fn unchecked(node: PeerNode, score: i32) -> Self {
        Self {
            id: node.id,
            endpoint: node.endpoint,
            score,
            check_failure_count: 0,
            first_response: None,
            last_response: None,
            last_check: None,
        }
    }

    pub fn peer(&self) -> PeerNode {
        PeerNode::new(self.id, self.endpoint)
    }

    /// Dead records are kept for history but never handed out for bootstrap
    pub fn is_dead(&self, dead_threshold: u32) -> bool {
        self.check_failure_count > dead_threshold
    }

    /// Timestamps are ordered `first_response <= last_response <= last_check`
    pub fn timestamps_consistent(&self) -> bool {
        let ordered = |a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>| match (a, b) {
            (Some(a), Some(b)) => a <= b,
            _ => true,
        };
        ordered(self.first_response, self.last_response)
            && ordered(self.last_response, self.last_check)
    }
}

/// Result of a successful confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The peer was not in the store and a record was created
    Discovered,

    /// The peer was already known and its record was updated
    Known,
}
