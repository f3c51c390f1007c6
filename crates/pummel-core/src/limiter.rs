use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Permit count standing in for "no limit". Large enough to never gate a
/// realistic run, finite so in-flight growth stays bounded.
pub const UNBOUNDED_PERMITS: usize = 1_000_000;

/// Bounded admission gate for in-flight requests.
///
/// At most `capacity` permits are ever held at once. Permits are RAII:
/// dropping the returned guard releases the slot on every exit path.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// `capacity == 0` requests no limit and maps to [`UNBOUNDED_PERMITS`].
    pub fn new(capacity: u32) -> Self {
        let capacity = if capacity == 0 {
            UNBOUNDED_PERMITS
        } else {
            capacity as usize
        };
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Suspend until a slot is free.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        // The semaphore is never closed, so acquisition cannot fail.
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed")
    }
}
