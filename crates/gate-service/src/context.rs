//! Shared gate state.
//!
//! One [`GateContext`] is built per server and handed by `Arc` to the
//! interceptor pipeline and to both RPC groups. It owns the access list
//! and both subscriber collections; the logger set and the stat set each
//! carry their own lock.

use tokio_util::sync::CancellationToken;

use crate::acl::AccessList;
use crate::broadcast::{DeliveryPolicy, EventBroadcaster};
use crate::config::{Config, DEFAULT_FEED_BUFFER, DEFAULT_LOG_QUEUE_CAPACITY};
use crate::stats::StatsAggregator;

/// Tuning for the admin feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOptions {
    pub log_delivery: DeliveryPolicy,
    pub log_queue_capacity: usize,
    pub feed_buffer: usize,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            log_delivery: DeliveryPolicy::Blocking,
            log_queue_capacity: DEFAULT_LOG_QUEUE_CAPACITY,
            feed_buffer: DEFAULT_FEED_BUFFER,
        }
    }
}

impl From<&Config> for GateOptions {
    fn from(config: &Config) -> Self {
        Self {
            log_delivery: config.log_delivery,
            log_queue_capacity: config.log_queue_capacity,
            feed_buffer: config.feed_buffer,
        }
    }
}

#[derive(Debug)]
pub struct GateContext {
    acl: AccessList,
    broadcaster: EventBroadcaster,
    stats: StatsAggregator,
    feed_buffer: usize,
    shutdown: CancellationToken,
}

impl GateContext {
    #[must_use]
    pub fn new(acl: AccessList, options: GateOptions, shutdown: CancellationToken) -> Self {
        Self {
            acl,
            broadcaster: EventBroadcaster::new(options.log_delivery, options.log_queue_capacity),
            stats: StatsAggregator::new(),
            feed_buffer: options.feed_buffer.max(1),
            shutdown,
        }
    }

    pub fn acl(&self) -> &AccessList {
        &self.acl
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    /// Buffer between a feed pump and its response stream.
    pub fn feed_buffer(&self) -> usize {
        self.feed_buffer
    }

    /// Cancelled when the server starts draining; open feeds end on it.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}
