//! Admission control shared by all workers of a batch: a token-bucket rate
//! limiter plus a concurrency cap, with an active-request counter for the
//! progress display.

use std::cmp;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Size of the rate bucket. Refills that would overflow are dropped, so a
/// long idle stretch buys at most this much burst.
const RATE_BUCKET_CAPACITY: usize = 50;

/// Shared request governor. One instance per batch; dropped with it.
pub struct RequestGovernor {
    rate_slots: Arc<Semaphore>,
    concurrency: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    refiller: JoinHandle<()>,
}

impl RequestGovernor {
    /// Starts the refill task immediately. `cancel` stops the refiller and
    /// unblocks any pending admissions.
    pub fn new(requests_per_sec: f64, max_concurrency: usize, cancel: CancellationToken) -> Self {
        let initial = cmp::min(RATE_BUCKET_CAPACITY, requests_per_sec.ceil() as usize);
        let rate_slots = Arc::new(Semaphore::new(initial));
        let concurrency = Arc::new(Semaphore::new(max_concurrency));

        let refill_period = Duration::from_secs_f64(1.0 / requests_per_sec);
        let refiller = tokio::spawn({
            let slots = Arc::clone(&rate_slots);
            async move {
                // First refill one period out; the initial burst is already
                // in the bucket.
                let mut tick = tokio::time::interval_at(
                    tokio::time::Instant::now() + refill_period,
                    refill_period,
                );
                tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tick.tick() => {
                            if slots.available_permits() < RATE_BUCKET_CAPACITY {
                                slots.add_permits(1);
                            }
                        }
                    }
                }
            }
        });

        Self {
            rate_slots,
            concurrency,
            active: Arc::new(AtomicUsize::new(0)),
            refiller,
        }
    }

    /// Waits for one rate slot (consumed) and one concurrency permit (held
    /// for the lifetime of the returned guard). Returns `None` when the
    /// batch is cancelled while waiting.
    pub async fn admit(&self, cancel: &CancellationToken) -> Option<RequestPermit> {
        let rate = tokio::select! {
            _ = cancel.cancelled() => return None,
            permit = self.rate_slots.acquire() => permit.ok()?,
        };
        rate.forget();

        let concurrency = tokio::select! {
            _ = cancel.cancelled() => return None,
            permit = Arc::clone(&self.concurrency).acquire_owned() => permit.ok()?,
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        Some(RequestPermit {
            _concurrency: concurrency,
            active: Arc::clone(&self.active),
        })
    }

    /// In-flight request count, for the reporter.
    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for RequestGovernor {
    fn drop(&mut self) {
        self.refiller.abort();
    }
}

/// Held across one HTTP call; releases the concurrency permit and decrements
/// the active counter on drop.
pub struct RequestPermit {
    _concurrency: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for RequestPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_track_the_active_counter() {
        let cancel = CancellationToken::new();
        let governor = RequestGovernor::new(100.0, 2, cancel.clone());

        let first = governor.admit(&cancel).await.unwrap();
        let second = governor.admit(&cancel).await.unwrap();
        assert_eq!(governor.active_requests(), 2);

        drop(first);
        assert_eq!(governor.active_requests(), 1);
        drop(second);
        assert_eq!(governor.active_requests(), 0);
    }

    #[tokio::test]
    async fn concurrency_cap_blocks_the_extra_worker() {
        let cancel = CancellationToken::new();
        let governor = Arc::new(RequestGovernor::new(1000.0, 1, cancel.clone()));

        let held = governor.admit(&cancel).await.unwrap();
        let waiter = {
            let governor = Arc::clone(&governor);
            let cancel = cancel.clone();
            tokio::spawn(async move { governor.admit(&cancel).await.is_some() })
        };

        // The second admit cannot proceed while the permit is held.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn cancellation_unblocks_waiting_admissions() {
        let cancel = CancellationToken::new();
        let governor = Arc::new(RequestGovernor::new(1000.0, 1, cancel.clone()));

        let _held = governor.admit(&cancel).await.unwrap();
        let waiter = {
            let governor = Arc::clone(&governor);
            let cancel = cancel.clone();
            tokio::spawn(async move { governor.admit(&cancel).await.is_none() })
        };

        cancel.cancel();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_slots_refill_over_time() {
        let cancel = CancellationToken::new();
        // 10 req/s with an initial bucket of 10.
        let governor = RequestGovernor::new(10.0, 100, cancel.clone());

        for _ in 0..10 {
            assert!(governor.admit(&cancel).await.is_some());
        }

        // Bucket drained; the next admit needs a refill tick (100 ms).
        let pending = governor.admit(&cancel);
        tokio::pin!(pending);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), &mut pending)
                .await
                .is_err()
        );
        let permit = tokio::time::timeout(Duration::from_millis(500), &mut pending)
            .await
            .expect("refill should arrive within half a second");
        assert!(permit.is_some());
    }
}
