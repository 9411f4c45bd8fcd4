//! Routed connection handles.
//!
//! # Responsibilities
//! - Hand the caller a connection to the selected backend
//! - Keep the backend's in-use count accurate for the life of the handle
//! - Return pooled streams to the backend's idle stack on drop

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpStream;

use crate::error::{Result, RouterError};
use crate::load_balancer::backend::SharedBackend;
use crate::net::connector::Connector;

/// Relaxed ordering is enough; ids only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a routed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How the handle reaches its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnKind {
    /// The proxy itself serves the query; no socket.
    Local,
    /// Reused (or freshly dialed) from the backend's idle stack.
    Pooled,
    /// Fresh connection that is closed, not pooled, on drop.
    Dedicated,
}

impl ConnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnKind::Local => "local",
            ConnKind::Pooled => "pooled",
            ConnKind::Dedicated => "dedicated",
        }
    }
}

/// A connection checked out from a backend.
///
/// The backend's in-use count is held for as long as the handle lives.
#[derive(Debug)]
pub struct BackendConn {
    id: ConnectionId,
    backend: SharedBackend,
    kind: ConnKind,
    stream: Option<TcpStream>,
}

impl BackendConn {
    fn checked_out(backend: SharedBackend, kind: ConnKind, stream: Option<TcpStream>) -> Self {
        backend.inc_connections();
        let conn = Self {
            id: ConnectionId::new(),
            backend,
            kind,
            stream,
        };
        tracing::trace!(
            connection_id = %conn.id,
            backend = %conn.backend.addr(),
            kind = conn.kind.as_str(),
            "Connection checked out"
        );
        conn
    }

    /// Pass-through handle for the local compute sentinel.
    pub(crate) fn local(backend: SharedBackend) -> Self {
        Self::checked_out(backend, ConnKind::Local, None)
    }

    /// Fresh connection owned by this handle alone.
    pub(crate) async fn dedicated(backend: SharedBackend, connector: &dyn Connector) -> Result<Self> {
        let stream = dial(&backend, connector).await?;
        Ok(Self::checked_out(backend, ConnKind::Dedicated, Some(stream)))
    }

    /// Idle connection from the backend, dialing when none is idle.
    pub(crate) async fn pooled(backend: SharedBackend, connector: &dyn Connector) -> Result<Self> {
        let stream = match backend.pop_idle() {
            Some(stream) => stream,
            None => dial(&backend, connector).await?,
        };
        Ok(Self::checked_out(backend, ConnKind::Pooled, Some(stream)))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn kind(&self) -> ConnKind {
        self.kind
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn is_local(&self) -> bool {
        self.kind == ConnKind::Local
    }

    pub fn stream_mut(&mut self) -> Option<&mut TcpStream> {
        self.stream.as_mut()
    }

    /// Detach the stream; it will not be returned to the idle stack.
    pub fn into_stream(mut self) -> Option<TcpStream> {
        self.stream.take()
    }
}

impl Drop for BackendConn {
    fn drop(&mut self) {
        if self.kind == ConnKind::Pooled {
            if let Some(stream) = self.stream.take() {
                self.backend.push_idle(stream);
            }
        }
        self.backend.dec_connections();
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}

async fn dial(backend: &SharedBackend, connector: &dyn Connector) -> Result<TcpStream> {
    connector
        .connect(backend.addr())
        .await
        .map_err(|source| RouterError::DialFailed {
            addr: backend.addr().to_string(),
            source,
        })
}
