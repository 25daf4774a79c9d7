//! Call Gate configuration.
//!
//! Configuration is loaded from environment variables. The access-list
//! payload is redacted in Debug output.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

use crate::broadcast::DeliveryPolicy;

/// Default gRPC bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:50061";

/// Default per-subscriber event queue depth. A depth of one keeps the
/// hand-off close to a rendezvous: `publish` waits for each reader.
pub const DEFAULT_LOG_QUEUE_CAPACITY: usize = 1;

/// Default buffer between a feed pump task and its gRPC response stream.
pub const DEFAULT_FEED_BUFFER: usize = 16;

/// Where the access-list JSON comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum AclSource {
    /// Inline JSON from `GATE_ACL`.
    Inline(String),
    /// A file named by `GATE_ACL_PATH`.
    File(PathBuf),
}

impl AclSource {
    /// Read the access-list payload.
    pub fn read(&self) -> Result<String, ConfigError> {
        match self {
            AclSource::Inline(json) => Ok(json.clone()),
            AclSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "GATE_ACL_PATH {} could not be read: {e}",
                    path.display()
                ))
            }),
        }
    }
}

impl fmt::Debug for AclSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclSource::Inline(_) => f.write_str("Inline([REDACTED])"),
            AclSource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Call Gate configuration.
#[derive(Clone)]
pub struct Config {
    /// gRPC bind address (default: "0.0.0.0:50061").
    pub bind_address: String,

    /// Access-list payload source.
    pub acl_source: AclSource,

    /// How `publish` treats a subscriber whose queue is full.
    pub log_delivery: DeliveryPolicy,

    /// Per-subscriber event queue depth.
    pub log_queue_capacity: usize,

    /// Buffer between feed pump tasks and the response stream.
    pub feed_buffer: usize,

    /// Prometheus exporter listen address, if metrics are exported.
    pub metrics_bind_address: Option<SocketAddr>,

    /// Emit logs as JSON lines.
    pub log_json: bool,
}

/// Custom Debug implementation that redacts the inline access list.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("acl_source", &self.acl_source)
            .field("log_delivery", &self.log_delivery)
            .field("log_queue_capacity", &self.log_queue_capacity)
            .field("feed_buffer", &self.feed_buffer)
            .field("metrics_bind_address", &self.metrics_bind_address)
            .field("log_json", &self.log_json)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("GATE_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let acl_source = match (vars.get("GATE_ACL"), vars.get("GATE_ACL_PATH")) {
            (Some(json), _) => AclSource::Inline(json.clone()),
            (None, Some(path)) => AclSource::File(PathBuf::from(path)),
            (None, None) => return Err(ConfigError::MissingEnvVar("GATE_ACL".to_string())),
        };

        let log_delivery = match vars.get("GATE_LOG_DELIVERY").map(String::as_str) {
            None | Some("blocking") => DeliveryPolicy::Blocking,
            Some("disconnect") => DeliveryPolicy::DisconnectOnOverflow,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "GATE_LOG_DELIVERY must be 'blocking' or 'disconnect', got '{other}'"
                )))
            }
        };

        let log_queue_capacity = parse_positive(
            vars,
            "GATE_LOG_QUEUE_CAPACITY",
            DEFAULT_LOG_QUEUE_CAPACITY,
        )?;
        let feed_buffer = parse_positive(vars, "GATE_FEED_BUFFER", DEFAULT_FEED_BUFFER)?;

        let metrics_bind_address = vars
            .get("GATE_METRICS_BIND_ADDRESS")
            .map(|value| {
                value.parse::<SocketAddr>().map_err(|e| {
                    ConfigError::InvalidValue(format!(
                        "GATE_METRICS_BIND_ADDRESS must be a socket address: {e}"
                    ))
                })
            })
            .transpose()?;

        let log_json = match vars.get("GATE_LOG_JSON").map(String::as_str) {
            None | Some("false" | "0") => false,
            Some("true" | "1") => true,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "GATE_LOG_JSON must be a boolean, got '{other}'"
                )))
            }
        };

        Ok(Config {
            bind_address,
            acl_source,
            log_delivery,
            log_queue_capacity,
            feed_buffer,
            metrics_bind_address,
            log_json,
        })
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(raw) = vars.get(key) else {
        return Ok(default);
    };

    let value = raw.parse::<usize>().map_err(|e| {
        ConfigError::InvalidValue(format!("{key} must be a positive integer: {e}"))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidValue(format!(
            "{key} must be greater than zero"
        )));
    }

    Ok(value)
}
