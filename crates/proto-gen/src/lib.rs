//! Wire types and generated gRPC stubs for the Call Gate.
//!
//! Message structs are declared here and are the source of truth for the
//! wire layout (`proto/gate.proto` is a hand-kept copy for other clients).
//! The `Admin` and `Biz` service modules are generated by `build.rs`.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)] // Generated code has various doc formatting

// Re-export prost traits for convenience
pub use prost::Message;

pub mod gate {
    //! The `gate` protobuf package.

    use std::collections::HashMap;

    /// Notification of one authorized call.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Event {
        /// Nanoseconds since the Unix epoch.
        #[prost(int64, tag = "1")]
        pub timestamp: i64,
        #[prost(string, tag = "2")]
        pub consumer: String,
        /// Fully-qualified method path, e.g. `/gate.Biz/Check`.
        #[prost(string, tag = "3")]
        pub method: String,
        /// Caller network address.
        #[prost(string, tag = "4")]
        pub host: String,
    }

    /// Call counts accumulated since the subscriber's previous snapshot.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Stat {
        #[prost(int64, tag = "1")]
        pub timestamp: i64,
        #[prost(map = "string, uint64", tag = "2")]
        pub by_method: HashMap<String, u64>,
        #[prost(map = "string, uint64", tag = "3")]
        pub by_consumer: HashMap<String, u64>,
    }

    #[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
    pub struct StatInterval {
        #[prost(uint64, tag = "1")]
        pub interval_seconds: u64,
    }

    /// Empty payload used by the business stubs.
    #[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
    pub struct Nothing {
        #[prost(bool, tag = "1")]
        pub dummy: bool,
    }

    include!(concat!(env!("OUT_DIR"), "/gate.Admin.rs"));
    include!(concat!(env!("OUT_DIR"), "/gate.Biz.rs"));
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::gate::{Event, Stat};
    use super::Message;

    #[test]
    fn test_event_wire_layout_matches_contract() {
        let event = Event {
            timestamp: 42,
            consumer: "alice".to_string(),
            method: "/gate.Biz/Check".to_string(),
            host: "127.0.0.1:5000".to_string(),
        };

        let bytes = event.encode_to_vec();
        // Field 1, varint wire type
        assert_eq!(bytes.first(), Some(&0x08));

        let decoded = Event::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_empty_stat_encodes_to_nothing() {
        let stat = Stat::default();
        assert!(stat.encode_to_vec().is_empty());
    }
}
