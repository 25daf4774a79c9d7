//! Call Gate Service Library
//!
//! A small gRPC gateway that sits in front of a handful of business
//! endpoints and, for every incoming call:
//!
//! - authorizes the caller-supplied `consumer` label against a JSON access list
//! - broadcasts a call notification to every live `Logging` subscriber
//! - counts the call in every live `Statistics` subscriber's accumulator
//!
//! before handing the call to its handler.
//!
//! # Architecture
//!
//! ```text
//! tonic Server
//! └── CallPipelineLayer (authorize, identify, notify, count)
//!     ├── Admin: Logging / Statistics streams
//!     │   └── one pump task per open stream (feeds)
//!     └── Biz: Check / Add / Test
//!
//! GateContext (one per server, shared by Arc)
//! ├── AccessList
//! ├── EventBroadcaster  (logger lock)
//! └── StatsAggregator   (stats lock)
//! ```
//!
//! # Modules
//!
//! - [`acl`] - Access list parsing and matching
//! - [`broadcast`] - Call notification fan-out
//! - [`stats`] - Per-subscriber usage counters
//! - [`feeds`] - Pump tasks behind the admin streams
//! - [`grpc`] - Call pipeline and RPC handlers
//! - [`server`] - Startup and graceful drain
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types and their gRPC status mapping

pub mod acl;
pub mod arena;
pub mod broadcast;
pub mod config;
pub mod context;
pub mod errors;
pub mod feeds;
pub mod grpc;
pub mod observability;
pub mod server;
pub mod stats;
