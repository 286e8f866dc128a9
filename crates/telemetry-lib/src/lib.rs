//! Synthetic infrastructure telemetry library
//!
//! This crate provides the core functionality for:
//! - Metric series synthesis with periodicity and injected anomalies
//! - Threshold-driven log derivation
//! - Concurrent batched ingestion into a time-series store
//! - Entity catalog loading and CSV export
//! - Observability

pub mod catalog;
pub mod error;
pub mod export;
pub mod generator;
pub mod ingest;
pub mod logs;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod sink;

pub use catalog::{CatalogConfig, EntityCatalog, JsonGraphCatalog};
pub use error::{CatalogError, PipelineError, RunError, SinkError};
pub use models::*;
pub use observability::{render_metrics, SimMetrics, StructuredLogger};
pub use orchestrator::{Orchestrator, RunOptions, RunReport};
