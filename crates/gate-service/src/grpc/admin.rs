//! `gate.Admin` service: live call log and periodic statistics.
//!
//! Both RPCs are server-streaming. The handler registers a subscription,
//! spawns a pump from [`crate::feeds`] and returns the receiving end of the
//! pump's channel as the response stream. Admin calls are admitted by the
//! same pipeline as every other call, so opening a feed is itself counted
//! and broadcast.

use std::sync::Arc;
use std::time::Duration;

use proto_gen::gate::admin_server::Admin;
use proto_gen::gate::{Event, Nothing, Stat, StatInterval};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{info, instrument};

use crate::context::GateContext;
use crate::errors::GateError;
use crate::feeds::{run_log_feed, run_stats_feed};

pub struct AdminService {
    ctx: Arc<GateContext>,
}

impl AdminService {
    pub fn new(ctx: Arc<GateContext>) -> Self {
        Self { ctx }
    }

    /// Reject a zero interval.
    fn validate_interval(interval: &StatInterval) -> Result<Duration, GateError> {
        if interval.interval_seconds == 0 {
            return Err(GateError::InvalidArgument(
                "interval_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(Duration::from_secs(interval.interval_seconds))
    }
}

#[tonic::async_trait]
impl Admin for AdminService {
    type LoggingStream = ReceiverStream<Result<Event, Status>>;
    type StatisticsStream = ReceiverStream<Result<Stat, Status>>;

    #[instrument(skip_all, name = "gate.admin.logging")]
    async fn logging(
        &self,
        _request: Request<Nothing>,
    ) -> Result<Response<Self::LoggingStream>, Status> {
        let subscription = self.ctx.broadcaster().subscribe().await;
        info!(
            target: "gate.admin",
            subscriber_id = %subscription.id(),
            "Logging stream opened"
        );

        let (tx, rx) = mpsc::channel(self.ctx.feed_buffer());
        tokio::spawn(run_log_feed(Arc::clone(&self.ctx), subscription, tx));

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    #[instrument(skip_all, name = "gate.admin.statistics")]
    async fn statistics(
        &self,
        request: Request<StatInterval>,
    ) -> Result<Response<Self::StatisticsStream>, Status> {
        let every = Self::validate_interval(request.get_ref())?;

        let id = self.ctx.stats().subscribe().await;
        info!(
            target: "gate.admin",
            subscriber_id = %id,
            interval_secs = every.as_secs(),
            "Statistics stream opened"
        );

        let (tx, rx) = mpsc::channel(self.ctx.feed_buffer());
        tokio::spawn(run_stats_feed(Arc::clone(&self.ctx), id, every, tx));

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
