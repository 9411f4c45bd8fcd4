//! Network plumbing between the router and compute nodes.
//!
//! # Data Flow
//! ```text
//! Cluster::get_connection
//!     → Connector::connect (fresh dial)   or   Backend idle stack
//!     → BackendConn (holds the in-use count until dropped)
//! ```

pub mod connection;
pub mod connector;

pub use connection::{BackendConn, ConnKind, ConnectionId};
pub use connector::{Connector, TcpConnector};
