//! Call Gate error types.
//!
//! Errors map to gRPC status codes for callers. Internal details are logged
//! server-side but never exposed across the RPC boundary.

use thiserror::Error;
use tonic::Status;

use crate::acl::AclError;
use crate::config::ConfigError;

/// Call Gate error type.
///
/// Maps to gRPC status codes:
/// - `Unauthenticated`: `UNAUTHENTICATED`
/// - `InvalidArgument`: `INVALID_ARGUMENT`
/// - `Internal`, `Transport`, `Bind`, `AclParse`, `Config`: `INTERNAL`
#[derive(Debug, Error)]
pub enum GateError {
    /// The access list payload could not be parsed.
    #[error("Access list error: {0}")]
    AclParse(#[from] AclError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The listen address could not be bound.
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The gRPC transport failed while serving.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The caller did not present an acceptable consumer identity.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The request carried an unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Runtime environment fault (missing metadata, unresolvable peer).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            GateError::Unauthenticated(msg) | GateError::InvalidArgument(msg) => msg.clone(),
            GateError::AclParse(_)
            | GateError::Config(_)
            | GateError::Bind { .. }
            | GateError::Transport(_)
            | GateError::Internal(_) => "internal error".to_string(),
        }
    }

    /// Converts the error into the `Status` returned to the caller.
    pub fn to_status(&self) -> Status {
        let message = self.client_message();
        match self {
            GateError::Unauthenticated(_) => Status::unauthenticated(message),
            GateError::InvalidArgument(_) => Status::invalid_argument(message),
            GateError::AclParse(_)
            | GateError::Config(_)
            | GateError::Bind { .. }
            | GateError::Transport(_)
            | GateError::Internal(_) => Status::internal(message),
        }
    }
}

impl From<GateError> for Status {
    fn from(err: GateError) -> Self {
        err.to_status()
    }
}
