//! # Gate Test Utilities
//!
//! Shared test utilities for the Call Gate service.
//!
//! This crate provides:
//! - Server test harness (`TestGateServer` for end-to-end tests)
//! - Clients that attach `consumer` metadata (`ConsumerInterceptor`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gate_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestGateServer::spawn(r#"{"alice": ["/gate.Biz/Check"]}"#).await?;
//!     let mut biz = server.biz_client(Some("alice")).await?;
//!
//!     biz.check(Nothing::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod server_harness;

// Re-export commonly used items
pub use proto_gen::gate::{Event, Nothing, Stat, StatInterval};
pub use server_harness::*;
