//! The connection pool contract.
//!
//! `PooledDataSource` does not pool anything itself. It builds exactly one
//! [`ConnectionPool`] and forwards acquisition to it. Connection creation,
//! health checks, eviction and borrowing all live behind this trait.

use std::fmt;

use crate::config::Config;
use crate::lifecycle::DataSource;

/// A connection pool that a [`PooledDataSource`](crate::PooledDataSource) can build and drive.
///
/// # Example
///
/// ```rust,ignore
/// use pooled_datasource::{Config, ConnectionPool, DataSource};
///
/// #[derive(Debug)]
/// struct MyPool { /* ... */ }
///
/// impl ConnectionPool for MyPool {
///     type Connection = MyConnection;
///     type Error = MyError;
///
///     fn build(config: &Config) -> Result<Self, MyError> { /* ... */ }
///     fn get_connection(&self) -> Result<MyConnection, MyError> { /* ... */ }
///     fn shutdown(&self) { /* ... */ }
///     fn data_source(&self) -> Option<&dyn DataSource> { None }
/// }
/// ```
pub trait ConnectionPool: fmt::Debug + Send + Sync + Sized + 'static {
    /// Handle returned to callers.
    type Connection;

    /// Error raised by construction and acquisition.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Build the pool from a configuration snapshot.
    ///
    /// Called at most once per data source.
    fn build(config: &Config) -> Result<Self, Self::Error>;

    /// Acquire a connection. May block.
    fn get_connection(&self) -> Result<Self::Connection, Self::Error>;

    /// Tear the pool down.
    ///
    /// The data source calls this at most once, so implementations need not
    /// be idempotent.
    fn shutdown(&self);

    /// The raw data source new connections are created from, if any.
    fn data_source(&self) -> Option<&dyn DataSource>;
}
