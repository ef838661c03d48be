//! Node identity derivation
//!
//! Peers are identified by their Ed25519 public key. The registry keys
//! records on a Blake3 hash of that key so ids have a fixed, uniform layout
//! regardless of how the key was advertised.

use ed25519_dalek::{VerifyingKey, PUBLIC_KEY_LENGTH};

use crate::error::RegistryError;
use crate::types::NodeId;

/// Domain separation prefix for node id derivation
const DOMAIN_NODE_ID: &[u8] = b"KRATOS_NODE_ID_V1:";

/// Derive the stable node id from a peer's public key
pub fn derive_node_id(public_key: &VerifyingKey) -> NodeId {
    NodeId(hash(&domain_separate(DOMAIN_NODE_ID, public_key.as_bytes())))
}

/// Parse a hex-encoded Ed25519 public key
pub fn parse_public_key(hex_str: &str) -> Result<VerifyingKey, RegistryError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| RegistryError::InvalidPublicKey(e.to_string()))?;

    if bytes.len() != PUBLIC_KEY_LENGTH {
        return Err(RegistryError::InvalidPublicKey(format!(
            "expected {} bytes, got {}",
            PUBLIC_KEY_LENGTH,
            bytes.len()
        )));
    }

    let mut key = [0u8; PUBLIC_KEY_LENGTH];
    key.copy_from_slice(&bytes);

    VerifyingKey::from_bytes(&key).map_err(|e| RegistryError::InvalidPublicKey(e.to_string()))
}

// =============================================================================
// HELPERS
// =============================================================================

/// Apply domain separation so ids never collide with other key hashes
fn domain_separate(domain: &[u8], data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(domain.len() + data.len());
    result.extend_from_slice(domain);
    result.extend_from_slice(data);
    result
}

/// Compute Blake3 hash
fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}
