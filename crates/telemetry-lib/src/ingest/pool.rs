//! Bounded pool of sink connections with scoped checkout

use crate::error::{PipelineError, SinkError};
use crate::sink::{SinkConnection, SinkConnector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

struct IdleConnection {
    connection: Box<dyn SinkConnection>,
    /// Returned without validation; check health before reuse
    needs_check: bool,
}

struct PoolShared {
    connector: Arc<dyn SinkConnector>,
    idle: Mutex<Vec<IdleConnection>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl PoolShared {
    fn push_idle(&self, connection: Box<dyn SinkConnection>, needs_check: bool) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(IdleConnection {
                connection,
                needs_check,
            });
    }

    fn pop_idle(&self) -> Option<IdleConnection> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }
}

/// Fixed-size pool of connections, one slot per worker
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
    size: usize,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Open `size` connections up front
    ///
    /// Fails only when not a single connection can be established. Slots that
    /// fail to connect here are filled lazily on checkout.
    pub async fn warm(
        connector: Arc<dyn SinkConnector>,
        size: usize,
        acquire_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        if size == 0 {
            return Err(PipelineError::InvalidConfig(
                "connection pool size must be at least 1".into(),
            ));
        }

        let mut opened = Vec::with_capacity(size);
        let mut last_error = None;

        for slot in 0..size {
            match connector.connect().await {
                Ok(connection) => opened.push(IdleConnection {
                    connection,
                    needs_check: false,
                }),
                Err(e) => {
                    warn!(
                        slot = slot,
                        error = %e,
                        endpoint = %connector.endpoint(),
                        "Failed to open sink connection"
                    );
                    last_error = Some(e);
                }
            }
        }

        if opened.is_empty() {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no connection attempted".into());
            return Err(PipelineError::SinkUnreachable(format!(
                "{}: {reason}",
                connector.endpoint()
            )));
        }

        info!(
            endpoint = %connector.endpoint(),
            opened = opened.len(),
            size = size,
            "Connection pool ready"
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                connector,
                idle: Mutex::new(opened),
                permits: Arc::new(Semaphore::new(size)),
                closed: AtomicBool::new(false),
            }),
            size,
            acquire_timeout,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle_count(&self) -> usize {
        self.shared
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check out a healthy connection
    ///
    /// Connections returned without validation are health-checked first and
    /// discarded when unhealthy. An empty slot is filled with a new connection.
    pub async fn acquire(&self) -> Result<PooledConnection, SinkError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.shared.permits).acquire_owned(),
        )
        .await
        .map_err(|_| SinkError::PoolExhausted)?
        .map_err(|_| SinkError::Closed)?;

        while let Some(mut idle) = self.shared.pop_idle() {
            if idle.needs_check && !idle.connection.health_check().await {
                debug!("Discarding unhealthy pooled connection");
                let _ = idle.connection.close().await;
                continue;
            }
            return Ok(PooledConnection::new(
                idle.connection,
                Arc::clone(&self.shared),
                permit,
            ));
        }

        let connection = self.shared.connector.connect().await?;
        Ok(PooledConnection::new(
            connection,
            Arc::clone(&self.shared),
            permit,
        ))
    }

    /// Flush and close every idle connection; later calls are no-ops
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.permits.close();

        let mut closed = 0usize;
        while let Some(mut idle) = self.shared.pop_idle() {
            if let Err(e) = idle.connection.flush().await {
                warn!(error = %e, "Failed to flush connection before close");
            }
            if let Err(e) = idle.connection.close().await {
                warn!(error = %e, "Failed to close connection");
            }
            closed += 1;
        }

        debug!(closed = closed, "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// A checked-out connection; goes back to the pool when dropped
pub struct PooledConnection {
    connection: Option<Box<dyn SinkConnection>>,
    shared: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(
        connection: Box<dyn SinkConnection>,
        shared: Arc<PoolShared>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            connection: Some(connection),
            shared,
            _permit: permit,
        }
    }

    /// Access the underlying connection
    pub fn connection(&mut self) -> Result<&mut (dyn SinkConnection + 'static), SinkError> {
        self.connection.as_deref_mut().ok_or(SinkError::Closed)
    }

    /// Swap in a freshly opened connection after a connection fault
    pub async fn replace(&mut self) -> Result<(), SinkError> {
        let fresh = self.shared.connector.connect().await?;
        if let Some(mut old) = self.connection.replace(fresh) {
            let _ = old.close().await;
        }
        Ok(())
    }

    /// Validate and return the connection to the pool
    pub async fn release(mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        if self.shared.closed.load(Ordering::Acquire) {
            let _ = connection.flush().await;
            let _ = connection.close().await;
            return;
        }

        if connection.health_check().await {
            self.shared.push_idle(connection, false);
        } else {
            warn!("Connection failed health check on release, discarding");
            let _ = connection.close().await;
        }
    }

    /// Close the connection instead of returning it
    pub async fn discard(mut self) {
        if let Some(mut connection) = self.connection.take() {
            let _ = connection.close().await;
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // Reached when release/discard was skipped; validate on next checkout
        if let Some(connection) = self.connection.take() {
            if !self.shared.closed.load(Ordering::Acquire) {
                self.shared.push_idle(connection, true);
            }
        }
    }
}
