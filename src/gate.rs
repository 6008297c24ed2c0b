use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate bounding how many holders may be active at once.
///
/// Permits are owned and release their slot when dropped, so a permit can be
/// moved into a task and released wherever that task finishes with it.
#[derive(Debug, Clone)]
pub struct Gate {
    name: &'static str,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

/// A held slot of a [`Gate`]. Dropping it frees the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl Gate {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait until a slot is free and take it.
    ///
    /// Returns None only if the gate was closed.
    pub async fn acquire(&self) -> Option<GatePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_are_counted() {
        let gate = Gate::new("test", 2);
        assert_eq!(gate.available(), 2);

        let first = gate.acquire().await.unwrap();
        let second = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);
        assert_eq!(gate.capacity(), 2);
        assert_eq!(gate.name(), "test");

        drop(first);
        assert_eq!(gate.available(), 1);
        drop(second);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let gate = Gate::new("test", 1);
        let held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.acquire().await.is_some() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_permit_moves_across_tasks() {
        let gate = Gate::new("test", 1);
        let permit = gate.acquire().await.unwrap();

        tokio::spawn(async move {
            drop(permit);
        })
        .await
        .unwrap();

        assert_eq!(gate.available(), 1);
    }
}
