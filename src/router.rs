//! Entry point for the client-facing dispatch loop.

use std::sync::Arc;

use crate::admission::limiter::{Token, TokenLimiter};
use crate::autoscale::counter::LoadCounter;
use crate::cluster::Cluster;
use crate::error::Result;
use crate::load_balancer::backend::WorkloadClass;
use crate::net::connection::BackendConn;

/// Admission, accounting and backend selection in one call.
#[derive(Debug, Clone)]
pub struct Router {
    limiter: TokenLimiter,
    cluster: Arc<Cluster>,
    counter: Arc<LoadCounter>,
}

/// A query holding its admission token and backend connection.
///
/// Dropping it returns the connection first, then the token.
#[derive(Debug)]
pub struct RoutedQuery {
    conn: BackendConn,
    _token: Token,
}

impl RoutedQuery {
    pub fn connection(&self) -> &BackendConn {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut BackendConn {
        &mut self.conn
    }
}

impl Router {
    pub fn new(limiter: TokenLimiter, cluster: Arc<Cluster>, counter: Arc<LoadCounter>) -> Self {
        Self {
            limiter,
            cluster,
            counter,
        }
    }

    pub fn limiter(&self) -> &TokenLimiter {
        &self.limiter
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// Route a transactional query of the given cost.
    pub async fn route(&self, cost: i64) -> Result<RoutedQuery> {
        self.route_class(WorkloadClass::Transactional, cost).await
    }

    pub async fn route_class(&self, class: WorkloadClass, cost: i64) -> Result<RoutedQuery> {
        let token = self.limiter.acquire().await;
        self.counter.record_query();
        let conn = self.cluster.get_connection_for(class, cost).await?;
        Ok(RoutedQuery { conn, _token: token })
    }
}
