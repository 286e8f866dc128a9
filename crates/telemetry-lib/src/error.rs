//! Error types shared across the generator and ingestion pipeline

use thiserror::Error;

/// Errors raised by a time-series sink connection
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("no sink connection available")]
    PoolExhausted,

    #[error("sink rejected credentials (status {0})")]
    Unauthorized(u16),

    #[error("sink rejected payload as malformed: {0}")]
    MalformedPayload(String),

    #[error("sink server error (status {status}): {body}")]
    Server { status: u16, body: String },

    #[error("sink rejected write (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("connection already closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

impl SinkError {
    /// Returns true if the failed write should be retried
    ///
    /// Timeouts, connection faults, pool exhaustion and server-side errors are
    /// transient. Unclassified errors are transient only when their message
    /// names a timeout or connection problem.
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Timeout(_)
            | SinkError::Connection(_)
            | SinkError::PoolExhausted
            | SinkError::Server { .. } => true,
            SinkError::Unauthorized(_)
            | SinkError::MalformedPayload(_)
            | SinkError::Rejected { .. }
            | SinkError::Closed => false,
            SinkError::Other(message) => {
                let lower = message.to_lowercase();
                lower.contains("timeout") || lower.contains("connection")
            }
        }
    }

    /// Returns true if the connection that produced this error should be replaced
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            SinkError::Timeout(_) | SinkError::Connection(_) | SinkError::Closed
        )
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SinkError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            SinkError::Connection(e.to_string())
        } else {
            SinkError::Other(e.to_string())
        }
    }
}

/// Errors raised while loading entities from the topology catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown entity category: {0}")]
    UnknownCategory(String),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Errors that abort an ingestion pipeline before any batch is written
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("time-series sink unreachable: {0}")]
    SinkUnreachable(String),

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

/// Run-fatal errors surfaced by the orchestrator
#[derive(Debug, Error)]
pub enum RunError {
    #[error("entity catalog returned no entities")]
    NoEntities,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid time range: start {start} is not before end {end}")]
    InvalidTimeRange { start: String, end: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("CSV export failed: {0}")]
    Export(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SinkError::Timeout("read".into()).is_transient());
        assert!(SinkError::Connection("reset".into()).is_transient());
        assert!(SinkError::PoolExhausted.is_transient());
        assert!(SinkError::Server {
            status: 503,
            body: String::new()
        }
        .is_transient());

        assert!(!SinkError::Unauthorized(401).is_transient());
        assert!(!SinkError::MalformedPayload("bad line".into()).is_transient());
        assert!(!SinkError::Closed.is_transient());
    }

    #[test]
    fn test_message_based_classification() {
        assert!(SinkError::Other("Read Timeout while writing".into()).is_transient());
        assert!(SinkError::Other("Connection reset by peer".into()).is_transient());
        assert!(!SinkError::Other("field type conflict".into()).is_transient());
    }

    #[test]
    fn test_connection_fault() {
        assert!(SinkError::Connection("refused".into()).is_connection_fault());
        assert!(!SinkError::PoolExhausted.is_connection_fault());
        assert!(!SinkError::Unauthorized(403).is_connection_fault());
    }
}
