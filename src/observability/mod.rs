//! Metrics and structured logging.
//!
//! Logging uses the `tracing` crate; the subscriber is installed in `main`
//! with an `EnvFilter`. Metrics are exposed through a Prometheus exporter on
//! its own listener.

pub mod metrics;
