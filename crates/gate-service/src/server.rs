//! Gate lifecycle: load the access list, bind, serve, drain.

use std::net::SocketAddr;
use std::sync::Arc;

use proto_gen::gate::admin_server::AdminServer;
use proto_gen::gate::biz_server::BizServer;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{error, info, instrument};

use crate::acl::AccessList;
use crate::context::{GateContext, GateOptions};
use crate::errors::GateError;
use crate::grpc::{AdminService, BizService, CallPipelineLayer};

/// Handle to a gate that is accepting calls.
#[derive(Debug)]
pub struct RunningGate {
    local_addr: SocketAddr,
    context: Arc<GateContext>,
    handle: JoinHandle<Result<(), GateError>>,
}

impl RunningGate {
    /// Address the listener actually bound, useful with port 0.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn context(&self) -> &Arc<GateContext> {
        &self.context
    }

    /// Wait for the serve task to finish. It finishes after the start
    /// token is cancelled and in-flight calls have drained.
    pub async fn wait(self) -> Result<(), GateError> {
        self.handle
            .await
            .map_err(|e| GateError::Transport(format!("serve task failed: {e}")))?
    }
}

/// Start the gate with default feed tuning.
///
/// # Errors
///
/// See [`start_with_options`].
pub async fn start(
    cancel: CancellationToken,
    address: &str,
    acl_json: &str,
) -> Result<RunningGate, GateError> {
    start_with_options(cancel, address, acl_json, GateOptions::default()).await
}

/// Parse the access list, bind `address` and serve both RPC groups behind
/// the call pipeline until `cancel` fires.
///
/// Returns once the listener is bound; serving continues on a spawned task.
///
/// # Errors
///
/// - `GateError::AclParse` if `acl_json` is not a valid access list; nothing
///   is bound in that case.
/// - `GateError::Bind` if the address cannot be bound.
#[instrument(skip_all, name = "gate.server.start", fields(address = %address))]
pub async fn start_with_options(
    cancel: CancellationToken,
    address: &str,
    acl_json: &str,
    options: GateOptions,
) -> Result<RunningGate, GateError> {
    let acl = AccessList::load(acl_json).map_err(|e| {
        error!(target: "gate.server", error = %e, "Failed to load access list");
        e
    })?;
    let mut consumers: Vec<&str> = acl.consumers().collect();
    consumers.sort_unstable();
    info!(
        target: "gate.server",
        consumer_count = consumers.len(),
        consumers = ?consumers,
        "Access list loaded"
    );

    let listener = TcpListener::bind(address).await.map_err(|source| {
        error!(target: "gate.server", error = %source, "Failed to bind listener");
        GateError::Bind {
            addr: address.to_string(),
            source,
        }
    })?;
    let local_addr = listener.local_addr().map_err(|source| GateError::Bind {
        addr: address.to_string(),
        source,
    })?;

    let context = Arc::new(GateContext::new(acl, options, cancel.child_token()));
    let incoming = TcpListenerStream::new(listener);

    let server = Server::builder()
        .layer(CallPipelineLayer::new(Arc::clone(&context)))
        .add_service(AdminServer::new(AdminService::new(Arc::clone(&context))))
        .add_service(BizServer::new(BizService))
        .serve_with_incoming_shutdown(incoming, async move {
            cancel.cancelled().await;
            info!(target: "gate.server", "Shutdown requested, draining calls");
        });

    let handle = tokio::spawn(async move {
        server.await.map_err(|e| {
            error!(target: "gate.server", error = %e, "gRPC server failed");
            GateError::Transport(e.to_string())
        })?;
        info!(target: "gate.server", "gRPC server stopped");
        Ok(())
    });

    info!(
        target: "gate.server",
        local_addr = %local_addr,
        delivery = ?options.log_delivery,
        "Call Gate listening"
    );

    Ok(RunningGate {
        local_addr,
        context,
        handle,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const ACL: &str = r#"{"alice": ["/gate.Biz/Check"]}"#;

    #[tokio::test]
    async fn test_start_rejects_malformed_acl() {
        let err = start(CancellationToken::new(), "127.0.0.1:0", "{not json")
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::AclParse(_)));
    }

    #[tokio::test]
    async fn test_start_reports_bind_failure() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = taken.local_addr().unwrap().to_string();

        let err = start(CancellationToken::new(), &address, ACL)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, GateError::Bind { addr, .. } if *addr == address),
            "expected bind error, got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_start_and_cancel() {
        let cancel = CancellationToken::new();
        let gate = start(cancel.clone(), "127.0.0.1:0", ACL).await.unwrap();

        assert_ne!(gate.local_addr().port(), 0);
        assert_eq!(gate.context().acl().len(), 1);
        assert!(!gate.context().shutdown().is_cancelled());

        cancel.cancel();
        assert!(gate.context().shutdown().is_cancelled());
        gate.wait().await.unwrap();
    }
}
