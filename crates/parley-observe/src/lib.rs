//! Observability for Parley: structured logging and optional OpenTelemetry
//! span export.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, shutdown_tracing};
