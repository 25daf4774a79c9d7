//! Call pipeline applied to every gRPC call.
//!
//! Each call, unary or streaming, is admitted in order:
//!
//! 1. authorize the `consumer` metadata against the access list
//! 2. identify the caller's peer address
//! 3. publish a [`CallEvent`] to log subscribers
//! 4. count the call in every statistics accumulator
//!
//! and only then handed to the wrapped service. The handler's response and
//! errors are passed back untouched. The outcome is logged once the response
//! body finishes, which for server-streaming calls is when the stream ends.
//!
//! A call that fails steps 1 or 2 never reaches steps 3 and 4, so rejected
//! calls produce no event and no counter change. Paths outside
//! [`REGISTERED_METHODS`](super::REGISTERED_METHODS) skip the pipeline
//! entirely and go straight to the router, which answers `Unimplemented`.
//!
//! # Security
//!
//! The consumer label is caller-supplied and unverified. Rejections carry the
//! rejected consumer label and nothing else.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use tonic::body::BoxBody;
use tonic::metadata::MetadataMap;
use tonic::transport::server::TcpConnectInfo;
use tonic::{Code, Status};
use tower::{Layer, Service};
use tracing::{debug, info, instrument};

use crate::acl::AccessList;
use crate::broadcast::CallEvent;
use crate::context::GateContext;
use crate::errors::GateError;
use crate::grpc::is_registered;
use crate::observability::metrics;

/// Metadata key carrying the caller identity.
pub const CONSUMER_METADATA_KEY: &str = "consumer";

const GRPC_STATUS_HEADER: &str = "grpc-status";

/// A call that passed the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub consumer: String,
    pub method: String,
    pub peer: String,
}

/// Read the consumer label from call metadata.
///
/// A missing metadata container is an environment fault (`Internal`); a
/// missing, empty or non-ASCII consumer is `Unauthenticated`.
pub fn extract_consumer(metadata: Option<&MetadataMap>) -> Result<String, GateError> {
    let metadata = metadata.ok_or_else(|| {
        tracing::warn!(target: "gate.pipeline", "Call metadata unavailable");
        GateError::Internal("call metadata unavailable".to_string())
    })?;

    let consumer = metadata
        .get(CONSUMER_METADATA_KEY)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            debug!(target: "gate.pipeline", "Missing consumer metadata");
            GateError::Unauthenticated("no consumer from you".to_string())
        })?;

    Ok(consumer.to_string())
}

/// Step 1: the consumer must be present and allowed to call `method`.
pub fn authorize(
    acl: &AccessList,
    metadata: Option<&MetadataMap>,
    method: &str,
) -> Result<String, GateError> {
    let consumer = extract_consumer(metadata)?;

    if !acl.is_allowed(&consumer, method) {
        debug!(
            target: "gate.pipeline",
            consumer = %consumer,
            method = %method,
            "Consumer not permitted"
        );
        return Err(GateError::Unauthenticated(format!(
            "no rights for '{consumer}'"
        )));
    }

    Ok(consumer)
}

/// Step 2: resolve who is calling and from where.
pub fn identify(
    metadata: Option<&MetadataMap>,
    peer: Option<SocketAddr>,
) -> Result<(String, String), GateError> {
    let consumer = extract_consumer(metadata)?;
    let peer = peer.ok_or_else(|| {
        tracing::warn!(target: "gate.pipeline", "Peer address unavailable");
        GateError::Internal("peer address unavailable".to_string())
    })?;
    Ok((consumer, peer.to_string()))
}

/// Run steps 1-4 for one call.
#[instrument(skip_all, name = "gate.pipeline.admit", fields(method = %method))]
pub async fn admit(
    ctx: &GateContext,
    metadata: Option<&MetadataMap>,
    method: &str,
    peer: Option<SocketAddr>,
) -> Result<Admission, GateError> {
    authorize(ctx.acl(), metadata, method)?;
    let (consumer, peer) = identify(metadata, peer)?;

    let event = CallEvent::now(consumer.as_str(), method, peer.as_str());
    ctx.broadcaster().publish(&event).await;
    ctx.stats().record(&consumer, method).await;

    Ok(Admission {
        consumer,
        method: method.to_string(),
        peer,
    })
}

/// Tower layer installing the call pipeline in front of every service.
#[derive(Clone)]
pub struct CallPipelineLayer {
    ctx: Arc<GateContext>,
}

impl CallPipelineLayer {
    pub fn new(ctx: Arc<GateContext>) -> Self {
        Self { ctx }
    }
}

impl<S> Layer<S> for CallPipelineLayer {
    type Service = CallPipelineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallPipelineService {
            inner,
            ctx: Arc::clone(&self.ctx),
        }
    }
}

/// Tower service running the pipeline around the wrapped gRPC routes.
#[derive(Clone)]
pub struct CallPipelineService<S> {
    inner: S,
    ctx: Arc<GateContext>,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for CallPipelineService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        // Take the service that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let ctx = Arc::clone(&self.ctx);

        Box::pin(async move {
            let started = Instant::now();
            let method = req.uri().path().to_string();
            if !is_registered(&method) {
                debug!(target: "gate.pipeline", method = %method, "Unregistered method");
                return inner.call(req).await;
            }

            let metadata = MetadataMap::from_headers(req.headers().clone());
            let peer = req
                .extensions()
                .get::<TcpConnectInfo>()
                .and_then(TcpConnectInfo::remote_addr);

            let admission = match admit(&ctx, Some(&metadata), &method, peer).await {
                Ok(admission) => admission,
                Err(err) => {
                    let status = err.to_status();
                    info!(
                        target: "gate.pipeline",
                        method = %method,
                        code = ?status.code(),
                        error = %err,
                        "Call rejected"
                    );
                    metrics::record_call(&method, status.code(), started.elapsed());
                    return Ok(status.into_http());
                }
            };

            let response = inner.call(req).await?;

            let mut outcome = CallOutcome::new(admission, started);
            outcome.observe(response.headers());
            Ok(response.map(|body| tonic::body::boxed(OutcomeBody { inner: body, outcome })))
        })
    }
}

/// Completion record for one admitted call; logged when dropped.
#[derive(Debug)]
struct CallOutcome {
    admission: Admission,
    started: Instant,
    code: Option<Code>,
}

impl CallOutcome {
    fn new(admission: Admission, started: Instant) -> Self {
        Self {
            admission,
            started,
            code: None,
        }
    }

    /// Pick up `grpc-status` from response headers (trailers-only
    /// responses) or from trailers.
    fn observe(&mut self, headers: &http::HeaderMap) {
        if let Some(value) = headers.get(GRPC_STATUS_HEADER) {
            self.code = Some(Code::from_bytes(value.as_bytes()));
        }
    }
}

impl Drop for CallOutcome {
    fn drop(&mut self) {
        // No status seen means the body was dropped before it finished,
        // i.e. the caller went away.
        let code = self.code.unwrap_or(Code::Cancelled);
        let elapsed = self.started.elapsed();

        info!(
            target: "gate.pipeline",
            method = %self.admission.method,
            consumer = %self.admission.consumer,
            peer = %self.admission.peer,
            code = ?code,
            elapsed_ms = elapsed.as_millis(),
            "Call completed"
        );
        metrics::record_call(&self.admission.method, code, elapsed);
    }
}

/// Response body wrapper that watches for the final gRPC status.
struct OutcomeBody {
    inner: BoxBody,
    outcome: CallOutcome,
}

impl Body for OutcomeBody {
    type Data = Bytes;
    type Error = Status;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(trailers) = frame.trailers_ref() {
                    this.outcome.observe(trailers);
                }
            }
            Poll::Ready(Some(Err(status))) => {
                this.outcome.code = Some(status.code());
            }
            _ => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
