//! Prometheus metrics backend for astra containers.
//!
//! [`PrometheusMetrics`] implements [`astra_core::MetricsBackend`]; inject it through
//! `BuildContext::with_metrics` for lifecycle metrics and `CommandContext::with_metrics`
//! for command metrics.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use astra_core::{BuildContext, InMemoryDiscovery};
//! use astra_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let ctx = BuildContext::new(Arc::new(InMemoryDiscovery::new()))
//!     .with_metrics(Arc::new(metrics.clone()));
//!
//! // Serve `metrics.render()?` from the application's own `/metrics` route.
//! # let _ = ctx;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `astra_lifecycle_transitions_total{component, state}` - Counter
//! - `astra_commands_submitted_total{component}` - Counter
//! - `astra_commands_completed_total{component, outcome}` - Counter
//! - `astra_command_duration_seconds{component}` - Histogram
//!
//! ## HTTP Server
//! This crate does NOT provide an HTTP server for the `/metrics` endpoint.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
