//! Peer Probing
//!
//! The registry never speaks the discovery wire protocol itself. A
//! [`Prober`] contacts a peer and reports whether it answered; the default
//! [`TcpProber`] treats an accepted TCP connection as proof of life.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::error::ProbeError;
use crate::types::Endpoint;

/// Peer contact capability
#[async_trait]
pub trait Prober: Send + Sync {
    /// Contact the peer at `endpoint`, giving up after `timeout`
    async fn check(&self, endpoint: &Endpoint, timeout: Duration) -> Result<(), ProbeError>;
}

/// Liveness check by TCP connect
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn check(&self, endpoint: &Endpoint, timeout: Duration) -> Result<(), ProbeError> {
        let addr = endpoint.tcp_addr();

        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                Err(ProbeError::Refused(e.to_string()))
            }
            Ok(Err(e)) => Err(ProbeError::Unreachable(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }
}
