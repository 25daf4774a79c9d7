//! End-to-end tests for the call pipeline.
//!
//! Spins up a real gate on a random port and drives it with tonic clients
//! that attach `consumer` metadata, observing side effects through a live
//! `Logging` stream and in-process stats accumulators.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use gate_test_utils::{Nothing, TestGateServer};
use tonic::Code;

const CHECK: &str = "/gate.Biz/Check";
const ADD: &str = "/gate.Biz/Add";
const TEST: &str = "/gate.Biz/Test";
const LOGGING: &str = "/gate.Admin/Logging";

const ACL: &str = r#"{
    "alice": ["/gate.Biz/Check", "/gate.Biz/Add"],
    "ops": ["/gate.Admin/Logging", "/gate.Admin/Statistics"]
}"#;

#[tokio::test]
async fn test_allowed_call_is_logged_and_counted() -> Result<()> {
    let server = TestGateServer::spawn(ACL).await?;
    let stats = server.context().unwrap().stats();
    let accumulator = stats.subscribe().await;

    let mut admin = server.admin_client(Some("ops")).await?;
    let mut log = admin.logging(Nothing::default()).await?.into_inner();

    let mut biz = server.biz_client(Some("alice")).await?;
    biz.check(Nothing::default()).await?;

    let event = log.message().await?.unwrap();
    assert_eq!(event.consumer, "alice");
    assert_eq!(event.method, CHECK);
    assert!(event.host.starts_with("127.0.0.1:"), "host: {}", event.host);
    assert!(event.timestamp > 0);

    let snapshot = stats.snapshot(accumulator).await.unwrap();
    assert_eq!(snapshot.by_method.get(CHECK), Some(&1));
    assert_eq!(snapshot.by_consumer.get("alice"), Some(&1));

    server.shutdown().await
}

#[tokio::test]
async fn test_denied_call_has_no_side_effects() -> Result<()> {
    let server = TestGateServer::spawn(ACL).await?;
    let stats = server.context().unwrap().stats();

    let mut admin = server.admin_client(Some("ops")).await?;
    let mut log = admin.logging(Nothing::default()).await?.into_inner();
    let accumulator = stats.subscribe().await;

    let mut biz = server.biz_client(Some("alice")).await?;
    let status = biz.test(Nothing::default()).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert!(status.message().contains("alice"), "message: {}", status.message());

    // The next event the logger sees is the follow-up call, not the denied one.
    biz.add(Nothing::default()).await?;
    let event = log.message().await?.unwrap();
    assert_eq!(event.method, ADD);

    let snapshot = stats.snapshot(accumulator).await.unwrap();
    assert_eq!(snapshot.by_method.get(TEST), None);
    assert_eq!(snapshot.by_method.get(ADD), Some(&1));
    assert_eq!(snapshot.total(), 1);

    server.shutdown().await
}

#[tokio::test]
async fn test_missing_consumer_is_unauthenticated_everywhere() -> Result<()> {
    let server = TestGateServer::spawn(ACL).await?;
    let accumulator = server.context().unwrap().stats().subscribe().await;

    let mut biz = server.biz_client(None).await?;
    for status in [
        biz.check(Nothing::default()).await.unwrap_err(),
        biz.add(Nothing::default()).await.unwrap_err(),
        biz.test(Nothing::default()).await.unwrap_err(),
    ] {
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    let mut admin = server.admin_client(None).await?;
    let status = admin.logging(Nothing::default()).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let snapshot = server
        .context()
        .unwrap()
        .stats()
        .snapshot(accumulator)
        .await
        .unwrap();
    assert_eq!(snapshot.total(), 0);
    assert_eq!(server.context().unwrap().broadcaster().subscriber_count().await, 0);

    server.shutdown().await
}

#[tokio::test]
async fn test_unknown_consumer_is_denied() -> Result<()> {
    let server = TestGateServer::spawn(ACL).await?;

    let mut biz = server.biz_client(Some("mallory")).await?;
    let status = biz.check(Nothing::default()).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert!(status.message().contains("mallory"));

    server.shutdown().await
}

#[tokio::test]
async fn test_any_wildcard_pattern_grants_every_method() -> Result<()> {
    // The prefix before `*` is not consulted: any wildcard is blanket access.
    let server = TestGateServer::spawn(r#"{"wild": ["/unrelated/prefix*"]}"#).await?;

    let mut biz = server.biz_client(Some("wild")).await?;
    biz.check(Nothing::default()).await?;
    biz.add(Nothing::default()).await?;
    biz.test(Nothing::default()).await?;

    let mut admin = server.admin_client(Some("wild")).await?;
    admin.logging(Nothing::default()).await?;

    server.shutdown().await
}

#[tokio::test]
async fn test_admin_calls_pass_through_the_pipeline() -> Result<()> {
    let server = TestGateServer::spawn(ACL).await?;

    let mut first_admin = server.admin_client(Some("ops")).await?;
    let mut first = first_admin.logging(Nothing::default()).await?.into_inner();

    // Opening a second feed is itself a call the first logger sees.
    let mut second_admin = server.admin_client(Some("ops")).await?;
    let _second = second_admin.logging(Nothing::default()).await?.into_inner();

    let event = first.message().await?.unwrap();
    assert_eq!(event.method, LOGGING);
    assert_eq!(event.consumer, "ops");

    // alice has no admin rights.
    let mut alice_admin = server.admin_client(Some("alice")).await?;
    let status = alice_admin.logging(Nothing::default()).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    server.shutdown().await
}

#[tokio::test]
async fn test_every_logger_receives_every_event() -> Result<()> {
    let server = TestGateServer::spawn(ACL).await?;

    let mut admin = server.admin_client(Some("ops")).await?;
    let mut loggers = Vec::new();
    for _ in 0..3 {
        loggers.push(admin.logging(Nothing::default()).await?.into_inner());
    }
    assert_eq!(server.context().unwrap().broadcaster().subscriber_count().await, 3);

    let mut biz = server.biz_client(Some("alice")).await?;
    biz.check(Nothing::default()).await?;

    for log in &mut loggers {
        // Skip the open events of loggers registered after this one.
        let event = loop {
            let event = log.message().await?.unwrap();
            if event.method != LOGGING {
                break event;
            }
        };
        assert_eq!(event.method, CHECK);
        assert_eq!(event.consumer, "alice");
    }

    server.shutdown().await
}

#[tokio::test]
async fn test_closing_logging_stream_unsubscribes() -> Result<()> {
    let server = TestGateServer::spawn(ACL).await?;
    let broadcaster = server.context().unwrap().broadcaster();

    let mut admin = server.admin_client(Some("ops")).await?;
    let log = admin.logging(Nothing::default()).await?.into_inner();
    assert_eq!(broadcaster.subscriber_count().await, 1);

    drop(log);

    // The pump notices the closed stream asynchronously.
    let mut remaining = broadcaster.subscriber_count().await;
    for _ in 0..50 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        remaining = broadcaster.subscriber_count().await;
    }
    assert_eq!(remaining, 0);

    server.shutdown().await
}

#[tokio::test]
async fn test_unregistered_method_has_no_side_effects() -> Result<()> {
    let server = TestGateServer::spawn(r#"{"wild": ["/gate.Biz/*"]}"#).await?;
    let stats = server.context().unwrap().stats();
    let accumulator = stats.subscribe().await;

    let mut grpc = tonic::client::Grpc::new(server.channel().await?);
    grpc.ready().await?;

    let mut request = tonic::Request::new(Nothing::default());
    request
        .metadata_mut()
        .insert(gate_service::grpc::CONSUMER_METADATA_KEY, "wild".parse()?);
    let status = grpc
        .unary(
            request,
            http::uri::PathAndQuery::from_static("/gate.Biz/DoesNotExist"),
            tonic::codec::ProstCodec::<Nothing, Nothing>::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);

    let snapshot = stats.snapshot(accumulator).await.unwrap();
    assert!(snapshot.by_method.is_empty(), "{:?}", snapshot.by_method);
    assert_eq!(snapshot.total(), 0);

    server.shutdown().await
}
