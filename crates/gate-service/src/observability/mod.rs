//! Observability for the gate service.
//!
//! Structured logging goes through `tracing`; counters and histograms go
//! through the `metrics` facade and are exported in Prometheus text format
//! when a metrics listener is configured.

pub mod metrics;
