use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::metrics::counters::Counters;
use crate::queue::RequestSender;
use crate::shutdown::Shutdown;
use crate::types::{BookingRequest, UserId};

/// Single producer: enqueues `1..=total_users` in increasing order, then
/// closes the queue by dropping its sender.
pub struct Dispatcher {
    total_users: u64,
    /// Optional random pause before each enqueue.
    jitter: Option<RangeInclusive<Duration>>,
    counters: Counters,
}

impl Dispatcher {
    pub fn new(
        total_users: u64,
        jitter: Option<RangeInclusive<Duration>>,
        counters: Counters,
    ) -> Self {
        Self {
            total_users,
            jitter,
            counters,
        }
    }

    /// Returns the number of requests enqueued. Less than `total_users` only
    /// when cancelled or when every worker has gone away.
    pub async fn run(self, tx: RequestSender, mut shutdown: Shutdown) -> u64 {
        info!(component = "dispatcher", event = "startup", total_users = self.total_users);

        let mut dispatched = 0u64;

        for user_id in user_ids(self.total_users) {
            if shutdown.is_triggered() {
                warn!(
                    component = "dispatcher",
                    dispatched, "cancelled; no further requests enqueued"
                );
                break;
            }

            if let Some(delay) = self.next_delay() {
                tokio::select! {
                    biased;
                    _ = shutdown.triggered() => {
                        warn!(
                            component = "dispatcher",
                            dispatched, "cancelled during dispatch delay"
                        );
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if tx.send(BookingRequest { user_id }).await.is_err() {
                warn!(component = "dispatcher", user_id, "request queue closed; stopping");
                break;
            }

            dispatched += 1;
            Counters::incr(&self.counters.requests_dispatched);
            debug!(user_id, "request enqueued");
        }

        // Dropping the sender here is the "no more input" signal.
        drop(tx);

        info!(component = "dispatcher", event = "shutdown", dispatched, "request queue closed");
        dispatched
    }

    fn next_delay(&self) -> Option<Duration> {
        let range = self.jitter.as_ref()?;
        if range.start() == range.end() {
            return Some(*range.start());
        }
        let (lo, hi) = (range.start().as_millis() as u64, range.end().as_millis() as u64);
        let ms = rand::thread_rng().gen_range(lo..=hi);
        Some(Duration::from_millis(ms))
    }
}

/// Users that a full dispatch would enqueue, in order.
pub fn user_ids(total_users: u64) -> impl Iterator<Item = UserId> {
    1..=total_users
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue;

    async fn drain(rx: queue::RequestReceiver) -> Vec<UserId> {
        let mut out = Vec::new();
        while let Some(req) = rx.recv().await {
            out.push(req.user_id);
        }
        out
    }

    #[tokio::test]
    async fn enqueues_every_user_in_order_then_closes() {
        let counters = Counters::default();
        let (tx, rx) = queue::bounded(10);

        let n = Dispatcher::new(10, None, counters.clone())
            .run(tx, Shutdown::never())
            .await;

        assert_eq!(n, 10);
        assert_eq!(drain(rx).await, user_ids(10).collect::<Vec<_>>());
        assert_eq!(counters.snapshot().requests_dispatched, 10);
    }

    #[tokio::test]
    async fn zero_users_closes_immediately() {
        let (tx, rx) = queue::bounded(1);
        let n = Dispatcher::new(0, None, Counters::default())
            .run(tx, Shutdown::never())
            .await;
        assert_eq!(n, 0);
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test]
    async fn cancelled_dispatcher_enqueues_nothing() {
        let (shutdown, trigger) = Shutdown::new();
        trigger.send(true).unwrap();

        let (tx, rx) = queue::bounded(5);
        let n = Dispatcher::new(5, None, Counters::default())
            .run(tx, shutdown)
            .await;

        assert_eq!(n, 0);
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn jitter_delays_each_enqueue() {
        let (tx, rx) = queue::bounded(3);
        let jitter = Duration::from_millis(100)..=Duration::from_millis(100);

        let start = tokio::time::Instant::now();
        let n = Dispatcher::new(3, Some(jitter), Counters::default())
            .run(tx, Shutdown::never())
            .await;

        assert_eq!(n, 3);
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(drain(rx).await, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_jitter_sleep() {
        let (shutdown, trigger) = Shutdown::new();
        let (tx, rx) = queue::bounded(100);
        let jitter = Duration::from_millis(10)..=Duration::from_millis(20);

        let handle =
            tokio::spawn(Dispatcher::new(100, Some(jitter), Counters::default()).run(tx, shutdown));

        tokio::time::sleep(Duration::from_millis(55)).await;
        trigger.send(true).unwrap();

        let n = handle.await.unwrap();
        assert!(n >= 2 && n < 100, "dispatched {n}");
        assert_eq!(drain(rx).await.len() as u64, n);
    }
}
