//! # pooled-datasource
//!
//! A pooled data source facade with lazy, exactly-once pool construction and
//! idempotent shutdown.
//!
//! The facade owns no connections. It builds one [`ConnectionPool`] from a
//! [`Config`] and forwards every acquisition to it. What it adds is the
//! lifecycle around that pool:
//!
//! - Eager construction for the hot path, or lazy construction on first use
//! - Exactly one pool per data source, even with many concurrent first callers
//! - No lock on the initialization mutex once the pool is published
//! - Configuration sealed once the pool exists
//! - Idempotent, thread-safe shutdown that tears the pool down exactly once
//!
//! ## Example
//!
//! ```rust,ignore
//! use pooled_datasource::{Config, PooledDataSource};
//!
//! // Pool built up front
//! let ds = PooledDataSource::<MyPool>::with_config(
//!     Config::new()
//!         .url("postgres://localhost/app")
//!         .credentials("app", "secret")
//!         .max_connections(20),
//! )?;
//!
//! // Or configured later and built on first use
//! let lazy = PooledDataSource::<MyPool>::new();
//! lazy.configure(|c| c.max_connections = 20)?;
//!
//! let conn = lazy.get_connection()?;
//! // Use connection...
//!
//! lazy.close();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod datasource;
pub mod error;
pub mod lifecycle;
pub mod pool;

// Configuration
pub use config::Config;

// Error types
pub use error::{BoxError, ConfigError, Error, Result};

// Facade
pub use datasource::PooledDataSource;

// Collaborator contracts
pub use lifecycle::{DataSource, LogWriter, OwnedLifecycle};
pub use pool::ConnectionPool;
