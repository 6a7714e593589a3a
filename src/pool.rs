use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::browser::BrowserContext;

#[derive(Debug, thiserror::Error)]
#[error("session pool is shut down")]
pub struct PoolClosed;

#[derive(Default)]
struct SlotStats {
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

/// One shared browsing context plus a bound on how many tabs it may have open.
pub struct SessionPool<B> {
    browser: B,
    slots: Arc<Semaphore>,
    capacity: usize,
    stats: Arc<SlotStats>,
}

/// Capacity token for one open tab; released when dropped.
pub struct TabSlot {
    _permit: OwnedSemaphorePermit,
    stats: Arc<SlotStats>,
}

impl TabSlot {
    pub fn release(self) {}
}

impl Drop for TabSlot {
    fn drop(&mut self) {
        self.stats.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<B: BrowserContext> SessionPool<B> {
    pub fn new(browser: B, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            browser,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            stats: Arc::new(SlotStats::default()),
        }
    }

    pub async fn acquire(&self) -> Result<TabSlot, PoolClosed> {
        let permit = self.slots.clone().acquire_owned().await.map_err(|_| PoolClosed)?;
        let now = self.stats.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(now, Ordering::SeqCst);
        debug!("tab slot acquired ({}/{})", now, self.capacity);
        Ok(TabSlot {
            _permit: permit,
            stats: self.stats.clone(),
        })
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.stats.in_use.load(Ordering::SeqCst)
    }

    /// Most slots ever held at once.
    pub fn peak(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }

    /// Stops handing out slots; waiters get [`PoolClosed`].
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_browser::FakeBrowser;
    use std::time::Duration;

    #[tokio::test]
    async fn slots_are_bounded_and_released() {
        let pool = SessionPool::new(FakeBrowser::new(), 2);
        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.in_use(), 2);

        let third = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(third.is_err(), "third slot must wait");

        a.release();
        assert_eq!(pool.in_use(), 1);
        let _c = tokio::time::timeout(Duration::from_millis(200), pool.acquire())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pool.peak(), 2);
    }

    #[tokio::test]
    async fn closed_pool_refuses_slots() {
        let pool = SessionPool::new(FakeBrowser::new(), 1);
        pool.close();
        assert!(pool.is_closed());
        assert!(pool.acquire().await.is_err());
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped() {
        let pool = SessionPool::new(FakeBrowser::new(), 0);
        assert_eq!(pool.capacity(), 1);
        assert!(pool.acquire().await.is_ok());
    }
}
