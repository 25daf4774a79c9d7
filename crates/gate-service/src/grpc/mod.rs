//! gRPC surface of the gate.
//!
//! [`pipeline`] admits every call; [`admin`] and [`biz`] are the two RPC
//! groups behind it.

pub mod admin;
pub mod biz;
pub mod pipeline;

pub use admin::AdminService;
pub use biz::BizService;
pub use pipeline::{CallPipelineLayer, CONSUMER_METADATA_KEY};

/// Full paths of every method the gate serves.
pub const REGISTERED_METHODS: [&str; 5] = [
    "/gate.Admin/Logging",
    "/gate.Admin/Statistics",
    "/gate.Biz/Check",
    "/gate.Biz/Add",
    "/gate.Biz/Test",
];

/// Whether `path` names one of [`REGISTERED_METHODS`].
pub fn is_registered(path: &str) -> bool {
    REGISTERED_METHODS.contains(&path)
}
