//! Test server harness for end-to-end testing
//!
//! Provides `TestGateServer` for spawning real gate instances in tests.

use std::net::SocketAddr;
use std::sync::Arc;

use gate_service::context::{GateContext, GateOptions};
use gate_service::grpc::CONSUMER_METADATA_KEY;
use gate_service::server::{self, RunningGate};
use proto_gen::gate::admin_client::AdminClient;
use proto_gen::gate::biz_client::BizClient;
use tokio_util::sync::CancellationToken;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};

/// `Biz` client that sends a fixed consumer label.
pub type GateBizClient = BizClient<InterceptedService<Channel, ConsumerInterceptor>>;

/// `Admin` client that sends a fixed consumer label.
pub type GateAdminClient = AdminClient<InterceptedService<Channel, ConsumerInterceptor>>;

/// Client interceptor stamping every request with a `consumer` label.
///
/// `None` sends no label at all, for exercising the unauthenticated path.
#[derive(Clone, Debug)]
pub struct ConsumerInterceptor {
    consumer: Option<MetadataValue<Ascii>>,
}

impl ConsumerInterceptor {
    /// # Errors
    ///
    /// Returns an error if `consumer` is not a valid ASCII metadata value.
    pub fn new(consumer: Option<&str>) -> Result<Self, anyhow::Error> {
        let consumer = consumer
            .map(MetadataValue::<Ascii>::try_from)
            .transpose()
            .map_err(|e| anyhow::anyhow!("Invalid consumer label: {}", e))?;
        Ok(Self { consumer })
    }
}

impl Interceptor for ConsumerInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(consumer) = &self.consumer {
            request
                .metadata_mut()
                .insert(CONSUMER_METADATA_KEY, consumer.clone());
        }
        Ok(request)
    }
}

/// Test harness for spawning a Call Gate in end-to-end tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_denied_call() -> anyhow::Result<()> {
///     let server = TestGateServer::spawn(r#"{"alice": ["/gate.Biz/Check"]}"#).await?;
///     let mut biz = server.biz_client(Some("alice")).await?;
///
///     let status = biz.test(Nothing::default()).await.unwrap_err();
///     assert_eq!(status.code(), tonic::Code::Unauthenticated);
///     Ok(())
/// }
/// ```
pub struct TestGateServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    gate: Option<RunningGate>,
}

impl TestGateServer {
    /// Spawn a gate on a random local port with default options.
    pub async fn spawn(acl_json: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with_options(acl_json, GateOptions::default()).await
    }

    /// Spawn a gate on a random local port.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Serve both RPC groups behind the call pipeline in the background
    pub async fn spawn_with_options(
        acl_json: &str,
        options: GateOptions,
    ) -> Result<Self, anyhow::Error> {
        let cancel = CancellationToken::new();
        let gate = server::start_with_options(cancel.clone(), "127.0.0.1:0", acl_json, options)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start test gate: {}", e))?;

        Ok(Self {
            addr: gate.local_addr(),
            cancel,
            gate: Some(gate),
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared state of the running gate.
    pub fn context(&self) -> Option<&Arc<GateContext>> {
        self.gate.as_ref().map(RunningGate::context)
    }

    /// Open a fresh channel to the gate.
    pub async fn channel(&self) -> Result<Channel, anyhow::Error> {
        Channel::from_shared(self.url())
            .map_err(|e| anyhow::anyhow!("Invalid gate URL: {}", e))?
            .connect()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to gate: {}", e))
    }

    /// `Biz` client on its own connection, sending `consumer`.
    pub async fn biz_client(&self, consumer: Option<&str>) -> Result<GateBizClient, anyhow::Error> {
        let interceptor = ConsumerInterceptor::new(consumer)?;
        Ok(BizClient::with_interceptor(self.channel().await?, interceptor))
    }

    /// `Admin` client on its own connection, sending `consumer`.
    pub async fn admin_client(
        &self,
        consumer: Option<&str>,
    ) -> Result<GateAdminClient, anyhow::Error> {
        let interceptor = ConsumerInterceptor::new(consumer)?;
        Ok(AdminClient::with_interceptor(self.channel().await?, interceptor))
    }

    /// Cancel the gate and wait for it to drain.
    pub async fn shutdown(mut self) -> Result<(), anyhow::Error> {
        self.cancel.cancel();
        match self.gate.take() {
            Some(gate) => gate
                .wait()
                .await
                .map_err(|e| anyhow::anyhow!("Gate stopped with error: {}", e)),
            None => Ok(()),
        }
    }
}

impl Drop for TestGateServer {
    fn drop(&mut self) {
        // Stop accepting calls and end open feeds when the test completes.
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACL: &str = r#"{"alice": ["/gate.Biz/Check"]}"#;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestGateServer::spawn(ACL).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.addr().port() > 0);
        assert_eq!(server.context().unwrap().acl().len(), 1);

        server.shutdown().await
    }

    #[test]
    fn test_interceptor_attaches_consumer() -> Result<(), anyhow::Error> {
        let mut with = ConsumerInterceptor::new(Some("alice"))?;
        let request = with.call(Request::new(()))?;
        let consumer = request.metadata().get(CONSUMER_METADATA_KEY).unwrap();
        assert_eq!(consumer.to_str().unwrap(), "alice");

        let mut without = ConsumerInterceptor::new(None)?;
        let request = without.call(Request::new(()))?;
        assert!(request.metadata().get(CONSUMER_METADATA_KEY).is_none());
        Ok(())
    }

    #[test]
    fn test_interceptor_rejects_non_ascii_label() {
        assert!(ConsumerInterceptor::new(Some("al\nice")).is_err());
    }
}
