//! # pooled-datasource-testing
//!
//! Test infrastructure for pooled-datasource.
//!
//! Provides a [`StubPool`] that implements
//! [`ConnectionPool`](pooled_datasource::ConnectionPool) and reports every
//! construction, checkout and teardown to a [`Probe`], plus raw data source
//! stubs with and without an owned lifecycle.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pooled_datasource::PooledDataSource;
//! use pooled_datasource_testing::{Probe, StubPool};
//!
//! let probe = Probe::register();
//! let ds = PooledDataSource::<StubPool>::new();
//! ds.set_config(probe.config())?;
//!
//! ds.get_connection()?;
//! assert_eq!(probe.constructions(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod probe;
pub mod stub;

pub use probe::{Probe, ProbeBuilder, SourceKind};
pub use stub::{DriverDataSource, StubConnection, StubDataSource, StubError, StubPool};
