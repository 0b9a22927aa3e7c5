//! Stub pool and raw data sources.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use pooled_datasource::{Config, ConnectionPool, DataSource, LogWriter, OwnedLifecycle};
use thiserror::Error;

use crate::probe::{Probe, SourceKind};

/// Errors raised by [`StubPool`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StubError {
    /// The configuration names no registered probe.
    #[error("no probe registered for pool name {0:?}")]
    UnknownProbe(Option<String>),

    /// Construction failure injected by the probe.
    #[error("injected construction failure")]
    BuildRefused,

    /// Checkout failure injected by the probe.
    #[error("connection is not available, request timed out")]
    Exhausted,

    /// The pool was shut down.
    #[error("pool has been shut down")]
    Closed,
}

/// Handle returned by [`StubPool::get_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubConnection {
    /// Name of the pool that produced the connection.
    pub pool_name: String,
    /// Which construction of that pool produced it.
    pub generation: usize,
}

/// A pool that records everything it is asked to do in its [`Probe`].
pub struct StubPool {
    probe: Arc<Probe>,
    generation: usize,
    closed: AtomicBool,
    source: Option<Box<dyn DataSource>>,
}

impl std::fmt::Debug for StubPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubPool")
            .field("name", &self.probe.name())
            .field("generation", &self.generation)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl ConnectionPool for StubPool {
    type Connection = StubConnection;
    type Error = StubError;

    fn build(config: &Config) -> Result<Self, StubError> {
        let probe = config
            .pool_name
            .as_deref()
            .and_then(Probe::lookup)
            .ok_or_else(|| StubError::UnknownProbe(config.pool_name.clone()))?;

        std::thread::sleep(probe.build_delay());

        if probe.take_build_failure() {
            tracing::debug!(pool = probe.name(), "refusing construction");
            return Err(StubError::BuildRefused);
        }

        let source: Option<Box<dyn DataSource>> = match probe.source() {
            SourceKind::None => None,
            SourceKind::External => Some(Box::new(StubDataSource::new())),
            SourceKind::Driver => Some(Box::new(DriverDataSource::new(Arc::clone(&probe)))),
        };

        let generation = probe.record_construction(config);

        Ok(Self {
            probe,
            generation,
            closed: AtomicBool::new(false),
            source,
        })
    }

    fn get_connection(&self) -> Result<StubConnection, StubError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StubError::Closed);
        }

        if self.probe.take_checkout_failure() {
            return Err(StubError::Exhausted);
        }

        self.probe.record_checkout();
        Ok(StubConnection {
            pool_name: self.probe.name().to_string(),
            generation: self.generation,
        })
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        std::thread::sleep(self.probe.shutdown_delay());
        self.probe.record_shutdown();
    }

    fn data_source(&self) -> Option<&dyn DataSource> {
        self.source.as_deref()
    }
}

/// A raw data source supplied from outside the pool.
#[derive(Default)]
pub struct StubDataSource {
    log_writer: Mutex<Option<LogWriter>>,
}

impl StubDataSource {
    /// Create a source with no log writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataSource for StubDataSource {
    fn log_writer(&self) -> Option<LogWriter> {
        self.log_writer.lock().clone()
    }

    fn set_log_writer(&self, writer: Option<LogWriter>) {
        *self.log_writer.lock() = writer;
    }
}

/// A raw data source built from driver parameters, which must be shut down
/// along with its pool.
pub struct DriverDataSource {
    probe: Arc<Probe>,
    log_writer: Mutex<Option<LogWriter>>,
}

impl DriverDataSource {
    /// Create a driver source reporting teardowns to `probe`.
    #[must_use]
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            probe,
            log_writer: Mutex::new(None),
        }
    }
}

impl DataSource for DriverDataSource {
    fn log_writer(&self) -> Option<LogWriter> {
        self.log_writer.lock().clone()
    }

    fn set_log_writer(&self, writer: Option<LogWriter>) {
        *self.log_writer.lock() = writer;
    }

    fn owned_lifecycle(&self) -> Option<&dyn OwnedLifecycle> {
        Some(self as &dyn OwnedLifecycle)
    }
}

impl OwnedLifecycle for DriverDataSource {
    fn shutdown(&self) {
        self.probe.record_driver_shutdown();
    }
}
