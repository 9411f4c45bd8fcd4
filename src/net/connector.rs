//! Backend dialing.
//!
//! # Responsibilities
//! - Open a TCP connection to a compute node
//! - Run the liveness probe used by the health sweep and by mark-up
//!
//! Credentials, when the probe needs them, belong to the connector
//! implementation rather than to the pool.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::resilience::timeouts::with_timeout;

/// Capability to reach compute nodes.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a fresh connection to `addr`.
    async fn connect(&self, addr: &str) -> io::Result<TcpStream>;

    /// Check that `addr` is reachable and answering.
    async fn probe(&self, addr: &str) -> io::Result<()>;
}

/// Plain TCP connector with dial and probe deadlines.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    probe_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            probe_timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &str) -> io::Result<TcpStream> {
        let stream = with_timeout(self.connect_timeout, "connect", TcpStream::connect(addr)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn probe(&self, addr: &str) -> io::Result<()> {
        with_timeout(self.probe_timeout, "probe", TcpStream::connect(addr))
            .await
            .map(drop)
    }
}
