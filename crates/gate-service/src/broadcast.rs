//! Call-notification fan-out to live log subscribers.
//!
//! `publish` holds the subscriber lock for the whole fan-out and hands the
//! event to every subscriber before returning. Under
//! [`DeliveryPolicy::Blocking`] a subscriber that stops reading therefore
//! stalls every publisher, and with it the request path that called
//! `publish`. [`DeliveryPolicy::DisconnectOnOverflow`] trades that stall for
//! dropping the slow subscriber.
//!
//! Subscribers whose receiving side has gone away are pruned during
//! `publish`; feeds also remove themselves with [`EventBroadcaster::unsubscribe`]
//! when their stream ends.

use std::time::Instant;

use chrono::Utc;
use proto_gen::gate::Event;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::arena::{SubscriberArena, SubscriberId};
use crate::observability::metrics;

/// Feed label used for metrics and logs.
pub const LOG_FEED: &str = "logging";

/// How `publish` treats a subscriber whose queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Wait until the subscriber accepts the event.
    #[default]
    Blocking,
    /// Remove the subscriber instead of waiting.
    DisconnectOnOverflow,
}

/// One authorized call, as seen by log subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub consumer: String,
    /// Fully-qualified method path.
    pub method: String,
    /// Caller network address.
    pub host: String,
}

impl CallEvent {
    /// Build an event stamped with the current wall-clock time.
    pub fn now(
        consumer: impl Into<String>,
        method: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: now_nanos(),
            consumer: consumer.into(),
            method: method.into(),
            host: host.into(),
        }
    }
}

impl From<CallEvent> for Event {
    fn from(event: CallEvent) -> Self {
        Event {
            timestamp: event.timestamp,
            consumer: event.consumer,
            method: event.method,
            host: event.host,
        }
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub(crate) fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Receiving side of one log subscriber.
#[derive(Debug)]
pub struct LogSubscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<CallEvent>,
}

impl LogSubscription {
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the broadcaster has
    /// dropped this subscriber.
    pub async fn recv(&mut self) -> Option<CallEvent> {
        self.receiver.recv().await
    }

    /// Take an already-queued event without waiting.
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<CallEvent> {
        self.receiver.try_recv().ok()
    }

    /// Stop receiving and deregister.
    ///
    /// The receiver is closed before the lock is taken, so a publisher
    /// blocked on this subscriber's queue is released rather than holding
    /// the lock against us.
    pub async fn close(self, broadcaster: &EventBroadcaster) {
        let Self { id, receiver } = self;
        drop(receiver);
        broadcaster.unsubscribe(id).await;
    }
}

/// Fan-out of call events to every live log subscriber.
#[derive(Debug)]
pub struct EventBroadcaster {
    policy: DeliveryPolicy,
    queue_capacity: usize,
    subscribers: Mutex<SubscriberArena<mpsc::Sender<CallEvent>>>,
}

impl EventBroadcaster {
    /// Create a broadcaster. `queue_capacity` is clamped to at least one.
    #[must_use]
    pub fn new(policy: DeliveryPolicy, queue_capacity: usize) -> Self {
        Self {
            policy,
            queue_capacity: queue_capacity.max(1),
            subscribers: Mutex::new(SubscriberArena::default()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Register a new subscriber.
    pub async fn subscribe(&self) -> LogSubscription {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);

        let mut subscribers = self.subscribers.lock().await;
        let id = subscribers.insert(sender);
        metrics::set_feed_subscribers(LOG_FEED, subscribers.len());
        drop(subscribers);

        debug!(target: "gate.broadcast", subscriber_id = %id, "Log subscriber added");
        LogSubscription { id, receiver }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock().await;
        let removed = subscribers.remove(id).is_some();
        metrics::set_feed_subscribers(LOG_FEED, subscribers.len());
        drop(subscribers);

        if removed {
            debug!(target: "gate.broadcast", subscriber_id = %id, "Log subscriber removed");
        }
        removed
    }

    /// Deliver `event` to every registered subscriber.
    ///
    /// Returns the number of subscribers that accepted the event. The lock
    /// is held until every subscriber has been served.
    pub async fn publish(&self, event: &CallEvent) -> usize {
        let started = Instant::now();
        let mut subscribers = self.subscribers.lock().await;

        let mut delivered = 0;
        let mut dropped: Vec<(SubscriberId, &'static str)> = Vec::new();

        for (id, sender) in subscribers.iter() {
            let outcome = match self.policy {
                DeliveryPolicy::Blocking => sender
                    .send(event.clone())
                    .await
                    .map_err(|_| "closed"),
                DeliveryPolicy::DisconnectOnOverflow => {
                    sender.try_send(event.clone()).map_err(|e| match e {
                        TrySendError::Full(_) => "overflow",
                        TrySendError::Closed(_) => "closed",
                    })
                }
            };

            match outcome {
                Ok(()) => delivered += 1,
                Err(reason) => dropped.push((id, reason)),
            }
        }

        for (id, reason) in dropped {
            subscribers.remove(id);
            metrics::record_subscriber_dropped(LOG_FEED, reason);
            if reason == "overflow" {
                warn!(
                    target: "gate.broadcast",
                    subscriber_id = %id,
                    "Log subscriber queue full, disconnecting"
                );
            } else {
                debug!(
                    target: "gate.broadcast",
                    subscriber_id = %id,
                    "Log subscriber gone, pruning"
                );
            }
        }
        metrics::set_feed_subscribers(LOG_FEED, subscribers.len());
        drop(subscribers);

        metrics::record_event_published(delivered, started.elapsed());
        delivered
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DeliveryPolicy::Blocking, 1)
    }
}
