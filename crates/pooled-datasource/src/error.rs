//! Error types for the pooled data source.

use thiserror::Error;

/// Boxed error raised by a [`ConnectionPool`](crate::ConnectionPool) implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias using the crate [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`PooledDataSource`](crate::PooledDataSource).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An operation was attempted after the data source was shut down.
    #[error("the datasource has been shutdown")]
    Shutdown,

    /// The operation is permanently unsupported.
    #[error("feature not supported: {feature}")]
    FeatureNotSupported {
        /// Name of the unsupported operation.
        feature: &'static str,
    },

    /// Building the connection pool failed.
    ///
    /// The data source stays uninitialized; the next call retries construction.
    #[error("failed to construct connection pool")]
    Construction(#[source] BoxError),

    /// The configuration was rejected.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    /// Configuration can no longer be changed.
    #[error("configuration is sealed: the pool has already been started or shut down")]
    Sealed,

    /// `unwrap_as` was asked for a type this data source does not wrap.
    #[error("datasource is not a wrapper for {type_name}")]
    NotAWrapper {
        /// Name of the requested type.
        type_name: &'static str,
    },

    /// Error raised by the connection pool, passed through unchanged.
    #[error(transparent)]
    Pool(BoxError),
}

impl Error {
    /// Returns `true` if this error means the data source is shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Returns the pool error, if this error came from the pool.
    #[must_use]
    pub fn pool_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Pool(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Errors from configuration parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A connection string segment was not `key=value`.
    #[error("invalid key-value: {0}")]
    InvalidKeyValue(String),

    /// A value could not be parsed for the given key.
    #[error("invalid {key}: {value}")]
    InvalidValue {
        /// Connection string key.
        key: &'static str,
        /// Offending value.
        value: String,
    },

    /// `max_connections` must be at least 1.
    #[error("max_connections must be at least 1")]
    ZeroMaxConnections,

    /// `min_connections` exceeds `max_connections`.
    #[error("min_connections ({min}) exceeds max_connections ({max})")]
    MinExceedsMax {
        /// Configured minimum.
        min: u32,
        /// Configured maximum.
        max: u32,
    },

    /// `connection_timeout` is below the accepted floor.
    #[error("connection_timeout must be at least {min_ms}ms, got {actual_ms}ms")]
    ConnectionTimeoutTooShort {
        /// Minimum accepted timeout in milliseconds.
        min_ms: u128,
        /// Configured timeout in milliseconds.
        actual_ms: u128,
    },

    /// The pool name is set but empty.
    #[error("pool_name must not be empty")]
    EmptyPoolName,
}
