//! Pump tasks behind the admin streams.
//!
//! Each open `Logging` or `Statistics` stream gets one spawned pump that
//! moves data from its subscription into the response channel. A pump ends
//! when the client goes away, when a send fails, or when the server starts
//! draining, and it always deregisters its subscription on the way out.

use std::sync::Arc;
use std::time::Duration;

use proto_gen::gate::{Event, Stat};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tonic::Status;
use tracing::{debug, info};

use crate::arena::SubscriberId;
use crate::broadcast::LogSubscription;
use crate::context::GateContext;

/// Forward call events to one `Logging` stream.
pub async fn run_log_feed(
    ctx: Arc<GateContext>,
    mut subscription: LogSubscription,
    tx: mpsc::Sender<Result<Event, Status>>,
) {
    let id = subscription.id();
    debug!(target: "gate.feeds", subscriber_id = %id, "Log feed started");

    loop {
        let event = tokio::select! {
            () = ctx.shutdown().cancelled() => break,
            () = tx.closed() => break,
            event = subscription.recv() => event,
        };

        let Some(event) = event else {
            // The broadcaster dropped us under DisconnectOnOverflow.
            info!(
                target: "gate.feeds",
                subscriber_id = %id,
                "Log subscriber disconnected for falling behind"
            );
            tokio::select! {
                () = ctx.shutdown().cancelled() => {}
                _ = tx.send(Err(Status::resource_exhausted("log subscriber fell behind"))) => {}
            }
            break;
        };

        let sent = tokio::select! {
            () = ctx.shutdown().cancelled() => false,
            result = tx.send(Ok(event.into())) => result.is_ok(),
        };
        if !sent {
            break;
        }
    }

    subscription.close(ctx.broadcaster()).await;
    debug!(target: "gate.feeds", subscriber_id = %id, "Log feed ended");
}

/// Deliver a statistics snapshot to one `Statistics` stream every `every`.
///
/// The first snapshot is taken one full interval after the feed starts.
/// The accumulator is reset only after a snapshot has been handed to the
/// stream. `every` must be non-zero; the `Statistics` handler rejects zero
/// before spawning the feed.
pub async fn run_stats_feed(
    ctx: Arc<GateContext>,
    id: SubscriberId,
    every: Duration,
    tx: mpsc::Sender<Result<Stat, Status>>,
) {
    debug!(
        target: "gate.feeds",
        subscriber_id = %id,
        interval_secs = every.as_secs(),
        "Stats feed started"
    );

    let mut ticker = time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = ctx.shutdown().cancelled() => break,
            () = tx.closed() => break,
            _ = ticker.tick() => {}
        }

        let Some(snapshot) = ctx.stats().snapshot(id).await else {
            break;
        };

        let sent = tokio::select! {
            () = ctx.shutdown().cancelled() => false,
            result = tx.send(Ok(snapshot.into())) => result.is_ok(),
        };
        if !sent {
            break;
        }

        ctx.stats().reset(id).await;
    }

    ctx.stats().unsubscribe(id).await;
    debug!(target: "gate.feeds", subscriber_id = %id, "Stats feed ended");
}
