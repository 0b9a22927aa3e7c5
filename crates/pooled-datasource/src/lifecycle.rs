//! Raw data source capabilities.
//!
//! A pool usually creates its connections from a raw data source. Some of
//! those sources are handed to the pool by the application; others are built
//! internally from a URL and credentials and own resources of their own (a
//! driver registration, background threads). The latter advertise it through
//! [`DataSource::owned_lifecycle`] so the facade can tear them down without
//! knowing their concrete type.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

/// Shared diagnostic log sink.
pub type LogWriter = Arc<Mutex<dyn Write + Send>>;

/// A raw, non-pooled source of connections.
pub trait DataSource: Send + Sync {
    /// Current log writer, if one is set.
    fn log_writer(&self) -> Option<LogWriter>;

    /// Replace the log writer. `None` disables logging to a writer.
    fn set_log_writer(&self, writer: Option<LogWriter>);

    /// The lifecycle this source owns, if it must be torn down with the pool.
    fn owned_lifecycle(&self) -> Option<&dyn OwnedLifecycle> {
        None
    }
}

/// Resources owned by a raw data source that outlive a pool shutdown unless
/// released explicitly.
pub trait OwnedLifecycle: Send + Sync {
    /// Release the resources. May be called more than once.
    fn shutdown(&self);
}
