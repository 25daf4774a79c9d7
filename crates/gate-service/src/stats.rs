//! Per-subscriber usage counters.
//!
//! Every statistics subscriber owns an accumulator counting calls by method
//! and by consumer since that subscriber's own last reset. `record` bumps
//! every live accumulator under one lock, so a snapshot never observes a
//! call counted by method but not yet by consumer.

use std::collections::HashMap;

use proto_gen::gate::Stat;
use tokio::sync::Mutex;
use tracing::debug;

use crate::arena::{SubscriberArena, SubscriberId};
use crate::broadcast::now_nanos;
use crate::observability::metrics;

/// Feed label used for metrics and logs.
pub const STATS_FEED: &str = "statistics";

/// Point-in-time copy of one accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatSnapshot {
    /// When the snapshot was taken, nanoseconds since the Unix epoch.
    pub timestamp: i64,
    /// When the counted window started (subscription or last reset).
    pub since: i64,
    pub by_method: HashMap<String, u64>,
    pub by_consumer: HashMap<String, u64>,
}

impl StatSnapshot {
    /// Number of calls counted in this window.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.by_method.values().sum()
    }
}

impl From<StatSnapshot> for Stat {
    fn from(snapshot: StatSnapshot) -> Self {
        Stat {
            timestamp: snapshot.timestamp,
            by_method: snapshot.by_method,
            by_consumer: snapshot.by_consumer,
        }
    }
}

#[derive(Debug)]
struct StatAccumulator {
    since: i64,
    by_method: HashMap<String, u64>,
    by_consumer: HashMap<String, u64>,
}

impl StatAccumulator {
    fn new() -> Self {
        Self {
            since: now_nanos(),
            by_method: HashMap::new(),
            by_consumer: HashMap::new(),
        }
    }
}

/// Live set of statistics accumulators.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    accumulators: Mutex<SubscriberArena<StatAccumulator>>,
}

impl StatsAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a zeroed accumulator.
    pub async fn subscribe(&self) -> SubscriberId {
        let mut accumulators = self.accumulators.lock().await;
        let id = accumulators.insert(StatAccumulator::new());
        metrics::set_feed_subscribers(STATS_FEED, accumulators.len());
        drop(accumulators);

        debug!(target: "gate.stats", subscriber_id = %id, "Stats subscriber added");
        id
    }

    /// Count one call against every live accumulator.
    pub async fn record(&self, consumer: &str, method: &str) {
        let mut accumulators = self.accumulators.lock().await;
        for acc in accumulators.values_mut() {
            *acc.by_method.entry(method.to_string()).or_insert(0) += 1;
            *acc.by_consumer.entry(consumer.to_string()).or_insert(0) += 1;
        }
    }

    /// Copy of one accumulator's counts, stamped with the current time.
    /// The accumulator itself is left untouched.
    pub async fn snapshot(&self, id: SubscriberId) -> Option<StatSnapshot> {
        let accumulators = self.accumulators.lock().await;
        let acc = accumulators.get(id)?;
        Some(StatSnapshot {
            timestamp: now_nanos(),
            since: acc.since,
            by_method: acc.by_method.clone(),
            by_consumer: acc.by_consumer.clone(),
        })
    }

    /// Zero one accumulator; others keep their totals.
    /// Returns `false` for an unknown id.
    pub async fn reset(&self, id: SubscriberId) -> bool {
        let mut accumulators = self.accumulators.lock().await;
        match accumulators.get_mut(id) {
            Some(acc) => {
                *acc = StatAccumulator::new();
                true
            }
            None => false,
        }
    }

    /// Remove an accumulator. Returns `false` if it was already gone.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut accumulators = self.accumulators.lock().await;
        let removed = accumulators.remove(id).is_some();
        metrics::set_feed_subscribers(STATS_FEED, accumulators.len());
        drop(accumulators);

        if removed {
            debug!(target: "gate.stats", subscriber_id = %id, "Stats subscriber removed");
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.accumulators.lock().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const CHECK: &str = "/gate.Biz/Check";
    const ADD: &str = "/gate.Biz/Add";

    #[tokio::test]
    async fn test_new_subscriber_starts_zeroed() {
        let stats = StatsAggregator::new();
        stats.record("alice", CHECK).await;

        let id = stats.subscribe().await;
        let snapshot = stats.snapshot(id).await.unwrap();

        assert_eq!(snapshot.total(), 0);
        assert!(snapshot.by_method.is_empty());
        assert!(snapshot.by_consumer.is_empty());
    }

    #[tokio::test]
    async fn test_record_updates_every_accumulator() {
        let stats = StatsAggregator::new();
        let a = stats.subscribe().await;
        let b = stats.subscribe().await;

        stats.record("alice", CHECK).await;
        stats.record("alice", ADD).await;
        stats.record("bob", CHECK).await;

        for id in [a, b] {
            let snapshot = stats.snapshot(id).await.unwrap();
            assert_eq!(snapshot.by_method.get(CHECK), Some(&2));
            assert_eq!(snapshot.by_method.get(ADD), Some(&1));
            assert_eq!(snapshot.by_consumer.get("alice"), Some(&2));
            assert_eq!(snapshot.by_consumer.get("bob"), Some(&1));
            assert_eq!(snapshot.total(), 3);
        }
    }

    #[tokio::test]
    async fn test_snapshot_does_not_mutate() {
        let stats = StatsAggregator::new();
        let id = stats.subscribe().await;
        stats.record("alice", CHECK).await;

        let first = stats.snapshot(id).await.unwrap();
        let second = stats.snapshot(id).await.unwrap();

        assert_eq!(first.by_method, second.by_method);
        assert_eq!(first.by_consumer, second.by_consumer);
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn test_reset_only_touches_one_subscriber() {
        let stats = StatsAggregator::new();
        let fast = stats.subscribe().await;
        let slow = stats.subscribe().await;

        for _ in 0..3 {
            stats.record("alice", CHECK).await;
        }
        assert!(stats.reset(fast).await);
        stats.record("alice", CHECK).await;

        assert_eq!(stats.snapshot(fast).await.unwrap().total(), 1);
        assert_eq!(stats.snapshot(slow).await.unwrap().total(), 4);
    }

    #[tokio::test]
    async fn test_reset_moves_window_start() {
        let stats = StatsAggregator::new();
        let id = stats.subscribe().await;
        let before = stats.snapshot(id).await.unwrap().since;

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        stats.reset(id).await;

        assert!(stats.snapshot(id).await.unwrap().since > before);
    }

    #[tokio::test]
    async fn test_unknown_and_removed_ids() {
        let stats = StatsAggregator::new();
        let id = stats.subscribe().await;

        assert!(stats.unsubscribe(id).await);
        assert!(!stats.unsubscribe(id).await);
        assert!(!stats.reset(id).await);
        assert!(stats.snapshot(id).await.is_none());

        // Removed accumulators no longer receive counts, and a new
        // subscriber never inherits the old id.
        stats.record("alice", CHECK).await;
        let next = stats.subscribe().await;
        assert_ne!(next, id);
        assert_eq!(stats.subscriber_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_record_no_lost_updates_or_torn_reads() {
        let stats = Arc::new(StatsAggregator::new());
        let steady = stats.subscribe().await;
        let churned = stats.subscribe().await;

        let mut writers = Vec::new();
        for worker in 0..8 {
            let stats = Arc::clone(&stats);
            writers.push(tokio::spawn(async move {
                let consumer = format!("consumer-{worker}");
                for _ in 0..250 {
                    stats.record(&consumer, CHECK).await;
                }
            }));
        }

        let reader = {
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                for _ in 0..200 {
                    let snapshot = stats.snapshot(churned).await.unwrap();
                    let by_consumer: u64 = snapshot.by_consumer.values().sum();
                    assert_eq!(snapshot.total(), by_consumer, "torn snapshot");
                    stats.reset(churned).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        for writer in writers {
            writer.await.unwrap();
        }
        reader.await.unwrap();

        let snapshot = stats.snapshot(steady).await.unwrap();
        assert_eq!(snapshot.total(), 8 * 250);
        assert_eq!(snapshot.by_consumer.len(), 8);
        assert!(snapshot.by_consumer.values().all(|count| *count == 250));
    }

    #[test]
    fn test_snapshot_conversion() {
        let snapshot = StatSnapshot {
            timestamp: 5,
            since: 1,
            by_method: HashMap::from([(CHECK.to_string(), 2)]),
            by_consumer: HashMap::from([("alice".to_string(), 2)]),
        };
        let wire: Stat = snapshot.into();
        assert_eq!(wire.timestamp, 5);
        assert_eq!(wire.by_method.get(CHECK), Some(&2));
        assert_eq!(wire.by_consumer.get("alice"), Some(&2));
    }
}
