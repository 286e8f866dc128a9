//! Time-series sink abstraction
//!
//! The ingestion pipeline talks to the store only through these traits.
//! A connector opens connections; each connection is owned by one worker
//! at a time.

mod influx;
mod point;

pub use influx::{InfluxConfig, InfluxConnection, InfluxConnector};
pub use point::{FieldValue, Point, Precision, LOG_MEASUREMENT};

use crate::error::SinkError;
use async_trait::async_trait;

/// Opens connections to a time-series store
#[async_trait]
pub trait SinkConnector: Send + Sync {
    /// Open and verify a new connection
    async fn connect(&self) -> Result<Box<dyn SinkConnection>, SinkError>;

    /// Human-readable endpoint, for logs
    fn endpoint(&self) -> String;
}

/// A single connection to the store
#[async_trait]
pub trait SinkConnection: Send {
    /// Write every point or fail as a whole
    ///
    /// Writes must tolerate replays: the store keeps the last value per
    /// timestamp and tag set.
    async fn write_batch(&mut self, points: &[Point]) -> Result<(), SinkError>;

    /// Returns true if the connection can serve further writes
    async fn health_check(&mut self) -> bool;

    /// Push out anything buffered on the client side
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Release the connection; later calls are no-ops
    async fn close(&mut self) -> Result<(), SinkError>;
}
