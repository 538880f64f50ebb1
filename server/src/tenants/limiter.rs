//! Per-tenant concurrency limiter for link-preview fetches.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Default number of simultaneous preview fetches per tenant.
pub const DEFAULT_FETCH_LIMIT: usize = 20;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterError {
    /// The caller's deadline passed before a slot freed up.
    #[error("Deadline elapsed while waiting for a fetch slot")]
    DeadlineElapsed,
    /// The tenant was evicted while the caller was waiting.
    #[error("Tenant limiter closed")]
    Closed,
}

/// Bounded counting resource for one tenant.
///
/// Permits are released when the returned guard is dropped.
#[derive(Debug, Clone)]
pub struct TenantLimiter {
    slots: Arc<Semaphore>,
    ceiling: usize,
}

impl TenantLimiter {
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            slots: Arc::new(Semaphore::new(ceiling)),
            ceiling,
        }
    }

    /// Wait for a free slot until `deadline`.
    ///
    /// A waiter that gives up does not consume a slot.
    pub async fn acquire(&self, deadline: Instant) -> Result<OwnedSemaphorePermit, LimiterError> {
        match tokio::time::timeout_at(deadline, Arc::clone(&self.slots).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(LimiterError::Closed),
            Err(_) => Err(LimiterError::DeadlineElapsed),
        }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Fail all current and future waiters.
    pub fn close(&self) {
        self.slots.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn in_ms(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[tokio::test]
    async fn test_admits_up_to_ceiling() {
        let limiter = TenantLimiter::new(2);
        let _a = limiter.acquire(in_ms(50)).await.unwrap();
        let _b = limiter.acquire(in_ms(50)).await.unwrap();
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test]
    async fn test_extra_waiter_times_out_without_consuming() {
        let limiter = TenantLimiter::new(1);
        let held = limiter.acquire(in_ms(50)).await.unwrap();

        let result = limiter.acquire(in_ms(30)).await;
        assert_eq!(result.unwrap_err(), LimiterError::DeadlineElapsed);

        drop(held);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_waiter_proceeds_when_slot_frees() {
        let limiter = TenantLimiter::new(1);
        let held = limiter.acquire(in_ms(50)).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(in_ms(1_000)).await.is_ok() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let limiter = TenantLimiter::new(1);
        let _held = limiter.acquire(in_ms(50)).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire(in_ms(1_000)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        limiter.close();

        assert_eq!(waiter.await.unwrap().unwrap_err(), LimiterError::Closed);
    }

    #[test]
    fn test_zero_ceiling_is_clamped() {
        assert_eq!(TenantLimiter::new(0).ceiling(), 1);
    }
}
