//! Bounded concurrency gate for outstanding task publishes.
//!
//! A [`Limiter`] hands out at most `N` [`Ticket`]s at a time. Acquiring
//! waits in FIFO order until capacity is free. A ticket returns its
//! capacity on the first call to [`Ticket::done`] (or when the last handle
//! to it is dropped); later calls are no-ops, so cleanup paths that race
//! to release the same ticket cannot inflate the pool past `N`.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

/// Fixed-capacity gate over concurrent operations.
#[derive(Debug, Clone)]
pub struct Limiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl Limiter {
    /// Create a limiter with `max_concurrent` tokens. A capacity of zero is
    /// raised to one so acquiring can never deadlock.
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens not currently held by any ticket.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait until a token is free and take it.
    pub async fn acquire(&self) -> Arc<Ticket> {
        // The semaphore is owned by the limiter and never closed.
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!("Limiter semaphore closed; running without a token");
                None
            }
        };
        Arc::new(Ticket {
            permit: Mutex::new(permit),
        })
    }

    /// Wait for a token, then run `job` with it.
    ///
    /// The job owns releasing the ticket. It may hand the ticket to work it
    /// spawns, in which case capacity stays taken after `execute` returns.
    pub async fn execute<F, Fut>(&self, job: F) -> Fut::Output
    where
        F: FnOnce(Arc<Ticket>) -> Fut,
        Fut: Future,
    {
        let ticket = self.acquire().await;
        job(ticket).await
    }

    /// Return a ticket's token to the pool. Equivalent to [`Ticket::done`].
    pub fn done(&self, ticket: &Ticket) {
        ticket.done();
    }

    /// Wait until every outstanding ticket has been released.
    pub async fn drain(&self) {
        let all = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        if let Ok(permits) = self.permits.acquire_many(all).await {
            drop(permits);
        }
    }
}

/// One unit of a [`Limiter`]'s capacity.
#[derive(Debug)]
pub struct Ticket {
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

impl Ticket {
    /// Release the token. Only the first call has an effect.
    pub fn done(&self) {
        let permit = match self.permit.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(permit);
    }

    /// Whether the token is still held.
    pub fn is_held(&self) -> bool {
        match self.permit.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }
}
