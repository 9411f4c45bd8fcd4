//! Bounded concurrency for query execution.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::observability::metrics;

/// Counting semaphore that issues at most `capacity` tokens.
#[derive(Debug, Clone)]
pub struct TokenLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TokenLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a token. Waiters are served in FIFO order.
    pub async fn acquire(&self) -> Token {
        let start = Instant::now();
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("token semaphore is never closed");
        metrics::record_token_acquired(start.elapsed());
        Token { _permit: permit }
    }

    /// Take a token only if one is free right now.
    pub fn try_acquire(&self) -> Option<Token> {
        let permit = self.permits.clone().try_acquire_owned().ok()?;
        metrics::record_token_acquired(std::time::Duration::ZERO);
        Some(Token { _permit: permit })
    }

    /// Return a token. Equivalent to dropping it.
    pub fn release(&self, token: Token) {
        drop(token);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }
}

/// An admission ticket; the slot is released when the token drops.
#[derive(Debug)]
pub struct Token {
    _permit: OwnedSemaphorePermit,
}

impl Drop for Token {
    fn drop(&mut self) {
        metrics::record_token_released();
    }
}
