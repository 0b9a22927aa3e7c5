//! The pooled data source facade.
//!
//! [`PooledDataSource`] hands out connections from a single
//! [`ConnectionPool`] that it builds itself, either up front
//! ([`PooledDataSource::with_config`]) or on the first call to
//! [`get_connection`](PooledDataSource::get_connection)
//! ([`PooledDataSource::new`]).

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lifecycle::LogWriter;
use crate::pool::ConnectionPool;

/// A pooled data source that builds its connection pool exactly once.
///
/// Two construction modes exist:
///
/// - [`with_config`](Self::with_config) builds the pool immediately. Every
///   [`get_connection`](Self::get_connection) goes straight to the pool with
///   no initialization check beyond a field read.
/// - [`new`](Self::new) defers the pool until the first `get_connection`.
///   Configuration is supplied through [`configure`](Self::configure) or
///   [`set_config`](Self::set_config) beforehand. Concurrent first callers
///   race on an instance-scoped mutex and exactly one of them builds the pool.
///   Once published, callers read it without touching that mutex.
///
/// Configuration is sealed once the pool exists. [`shutdown`](Self::shutdown)
/// is idempotent and safe to call from many threads; the pool is torn down
/// exactly once and every later `get_connection` fails with
/// [`Error::Shutdown`].
///
/// # Example
///
/// ```rust,ignore
/// use pooled_datasource::{Config, PooledDataSource};
///
/// let ds = PooledDataSource::<MyPool>::with_config(
///     Config::new().url("postgres://localhost/app").max_connections(20),
/// )?;
///
/// let conn = ds.get_connection()?;
/// // Use connection...
///
/// ds.shutdown();
/// assert!(ds.get_connection().unwrap_err().is_shutdown());
/// ```
pub struct PooledDataSource<P: ConnectionPool> {
    /// Pool built at construction time. Never changes afterwards.
    fast_path: Option<Arc<P>>,

    /// Pool published by the first caller, cleared on shutdown.
    pool: ArcSwapOption<P>,

    /// Pending configuration. The lock also serializes pool construction.
    init: Mutex<Config>,

    /// Set once, never reset.
    is_shutdown: AtomicBool,

    /// Stored for callers; not enforced here.
    login_timeout_secs: AtomicU64,
}

impl<P: ConnectionPool> PooledDataSource<P> {
    /// Create an unconfigured data source.
    ///
    /// The pool is built on the first [`get_connection`](Self::get_connection)
    /// from whatever configuration is set by then. Prefer
    /// [`with_config`](Self::with_config) when the configuration is known up
    /// front; it skips the lazy initialization check on every call.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fast_path: None,
            pool: ArcSwapOption::empty(),
            init: Mutex::new(Config::default()),
            is_shutdown: AtomicBool::new(false),
            login_timeout_secs: AtomicU64::new(0),
        }
    }

    /// Create a data source and build its pool immediately.
    ///
    /// Fails if the configuration is invalid or the pool cannot be built.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(build_pool::<P>(&config)?);

        Ok(Self {
            fast_path: Some(Arc::clone(&pool)),
            pool: ArcSwapOption::new(Some(pool)),
            init: Mutex::new(config),
            is_shutdown: AtomicBool::new(false),
            login_timeout_secs: AtomicU64::new(0),
        })
    }

    /// Get a connection from the pool, building the pool first if needed.
    ///
    /// Returns [`Error::Shutdown`] once [`shutdown`](Self::shutdown) has been
    /// called. Errors raised by the pool come back as [`Error::Pool`].
    pub fn get_connection(&self) -> Result<P::Connection> {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }

        if let Some(pool) = &self.fast_path {
            return delegate::<P>(pool);
        }

        let published = self.pool.load();
        if let Some(pool) = &*published {
            return delegate::<P>(pool);
        }
        drop(published);

        let pool = self.initialize()?;
        delegate::<P>(&pool)
    }

    /// Credentials are not supported per call; this logs a warning and calls
    /// [`get_connection`](Self::get_connection).
    ///
    /// The credentials are never passed to the pool.
    pub fn get_connection_with(&self, _username: &str, _password: &str) -> Result<P::Connection> {
        tracing::warn!(
            "get_connection() with username and password is not supported, calling get_connection() instead"
        );

        self.get_connection()
    }

    /// Slow path: build and publish the pool under the init lock.
    fn initialize(&self) -> Result<Arc<P>> {
        let config = self.init.lock();

        // Another caller may have published while we waited for the lock.
        if let Some(pool) = self.pool.load_full() {
            return Ok(pool);
        }

        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }

        tracing::debug!(
            pool_name = config.pool_name.as_deref(),
            "initializing connection pool on first use"
        );

        config.validate()?;
        let pool = Arc::new(build_pool::<P>(&config)?);
        self.pool.store(Some(Arc::clone(&pool)));

        Ok(pool)
    }

    /// Update the pending configuration.
    ///
    /// Returns [`Error::Sealed`] once the pool has been built or the data
    /// source has been shut down.
    pub fn configure<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.init.lock();
        if self.is_shutdown.load(Ordering::Acquire) || self.pool.load().is_some() {
            return Err(Error::Sealed);
        }

        f(&mut config);
        Ok(())
    }

    /// Replace the pending configuration. See [`configure`](Self::configure).
    pub fn set_config(&self, config: Config) -> Result<()> {
        self.configure(|pending| *pending = config)
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        self.init.lock().clone()
    }

    /// Shut down the data source and its pool.
    ///
    /// Only the first call tears the pool down; later and concurrent calls
    /// return without touching it. If the pool's raw data source owns a
    /// lifecycle of its own, that is released after the pool.
    ///
    /// Callers are serialized on the init lock, so an in-flight construction
    /// finishes first and no caller reaches the raw source before the pool
    /// teardown has completed.
    pub fn shutdown(&self) {
        let _init = self.init.lock();
        let already_shutdown = self.is_shutdown.swap(true, Ordering::SeqCst);

        let pool = if already_shutdown {
            self.fast_path.clone()
        } else {
            self.pool.swap(None)
        };

        let Some(pool) = pool else {
            tracing::debug!(already_shutdown, "datasource shut down with no pool to close");
            return;
        };

        if !already_shutdown {
            tracing::info!(pool = ?pool, "shutting down connection pool");
            pool.shutdown();
        }

        if let Some(lifecycle) = pool.data_source().and_then(|source| source.owned_lifecycle()) {
            lifecycle.shutdown();
        }
    }

    /// Synonym for [`shutdown`](Self::shutdown).
    pub fn close(&self) {
        self.shutdown();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    /// The pool currently serving connections, if one has been built and the
    /// data source is not shut down.
    #[must_use]
    pub fn pool(&self) -> Option<Arc<P>> {
        if self.is_shutdown() {
            return None;
        }
        self.fast_path.clone().or_else(|| self.pool.load_full())
    }

    /// The log writer of the pool's raw data source.
    #[must_use]
    pub fn log_writer(&self) -> Option<LogWriter> {
        self.pool()?.data_source()?.log_writer()
    }

    /// Set the log writer of the pool's raw data source.
    ///
    /// Ignored when no pool is active or it has no raw data source.
    pub fn set_log_writer(&self, writer: Option<LogWriter>) {
        match self.pool() {
            Some(pool) => {
                if let Some(source) = pool.data_source() {
                    source.set_log_writer(writer);
                }
            }
            None => tracing::debug!("no active pool, log writer not set"),
        }
    }

    /// Login timeout as last set. Not enforced by the data source.
    #[must_use]
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs.load(Ordering::Relaxed))
    }

    /// Store a login timeout, truncated to whole seconds.
    pub fn set_login_timeout(&self, timeout: Duration) {
        self.login_timeout_secs
            .store(timeout.as_secs(), Ordering::Relaxed);
    }

    /// Always fails with [`Error::FeatureNotSupported`].
    pub fn parent_logger(&self) -> Result<tracing::Dispatch> {
        Err(Error::FeatureNotSupported {
            feature: "parent_logger",
        })
    }

    /// Whether this data source can be viewed as `T`.
    #[must_use]
    pub fn is_wrapper_for<T: Any>(&self) -> bool {
        TypeId::of::<T>() == TypeId::of::<Self>()
    }

    /// View this data source as `T`.
    ///
    /// Fails with [`Error::NotAWrapper`] unless
    /// [`is_wrapper_for::<T>()`](Self::is_wrapper_for) holds.
    pub fn unwrap_as<T: Any>(&self) -> Result<&T> {
        (self as &dyn Any)
            .downcast_ref::<T>()
            .ok_or(Error::NotAWrapper {
                type_name: std::any::type_name::<T>(),
            })
    }
}

impl<P: ConnectionPool> Default for PooledDataSource<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ConnectionPool> fmt::Display for PooledDataSource<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pool() {
            Some(pool) => write!(f, "PooledDataSource ({pool:?})"),
            None => f.write_str("PooledDataSource (none)"),
        }
    }
}

impl<P: ConnectionPool> fmt::Debug for PooledDataSource<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledDataSource")
            .field("eager", &self.fast_path.is_some())
            .field("pool", &self.pool())
            .field("is_shutdown", &self.is_shutdown())
            .field("login_timeout", &self.login_timeout())
            .finish()
    }
}

fn build_pool<P: ConnectionPool>(config: &Config) -> Result<P> {
    let pool = P::build(config).map_err(|e| Error::Construction(Box::new(e)))?;

    tracing::info!(
        pool_name = config.pool_name.as_deref(),
        min = config.min_connections,
        max = config.max_connections,
        "connection pool created"
    );

    Ok(pool)
}

fn delegate<P: ConnectionPool>(pool: &P) -> Result<P::Connection> {
    tracing::trace!("acquiring connection from pool");
    pool.get_connection().map_err(|e| Error::Pool(Box::new(e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lifecycle::DataSource;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, mpsc};
    use std::thread;

    #[derive(Debug, Default)]
    struct Counters {
        built: AtomicUsize,
        shutdowns: AtomicUsize,
        failing_builds: AtomicUsize,
    }

    static COUNTERS: Mutex<BTreeMap<String, Arc<Counters>>> =
        parking_lot::const_mutex(BTreeMap::new());

    fn counters(name: &str) -> Arc<Counters> {
        Arc::clone(COUNTERS.lock().entry(name.to_string()).or_default())
    }

    #[derive(Debug, thiserror::Error)]
    #[error("refused to build")]
    struct Refused;

    #[derive(Debug)]
    struct TestPool {
        counters: Arc<Counters>,
    }

    impl ConnectionPool for TestPool {
        type Connection = usize;
        type Error = Refused;

        fn build(config: &Config) -> std::result::Result<Self, Refused> {
            let counters = counters(config.pool_name.as_deref().unwrap_or_default());
            thread::sleep(Duration::from_millis(5));

            let failing = counters.failing_builds.load(Ordering::SeqCst);
            if failing > 0 {
                counters.failing_builds.store(failing - 1, Ordering::SeqCst);
                return Err(Refused);
            }

            counters.built.fetch_add(1, Ordering::SeqCst);
            Ok(Self { counters })
        }

        fn get_connection(&self) -> std::result::Result<usize, Refused> {
            Ok(self.counters.built.load(Ordering::SeqCst))
        }

        fn shutdown(&self) {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        }

        fn data_source(&self) -> Option<&dyn DataSource> {
            None
        }
    }

    fn lazy(name: &str) -> PooledDataSource<TestPool> {
        let ds = PooledDataSource::new();
        ds.set_config(Config::new().pool_name(name)).unwrap();
        ds
    }

    #[test]
    fn test_lazy_builds_on_first_use_only() {
        let ds = lazy("lazy-first-use");
        let counters = counters("lazy-first-use");
        assert_eq!(counters.built.load(Ordering::SeqCst), 0);

        assert_eq!(ds.get_connection().unwrap(), 1);
        assert_eq!(ds.get_connection().unwrap(), 1);
        assert_eq!(counters.built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_callers_build_once() {
        let ds = lazy("lazy-concurrent");
        let barrier = Barrier::new(32);

        thread::scope(|s| {
            let handles: Vec<_> = (0..32)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        ds.get_connection()
                    })
                })
                .collect();

            for handle in handles {
                assert!(handle.join().unwrap().is_ok());
            }
        });

        assert_eq!(counters("lazy-concurrent").built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_eager_fast_path_never_takes_init_lock() {
        let ds = PooledDataSource::<TestPool>::with_config(Config::new().pool_name("eager-fast"))
            .unwrap();
        let ds = &ds;
        let (tx, rx) = mpsc::channel();

        let held = ds.init.lock();
        let received: Vec<_> = thread::scope(|s| {
            s.spawn(move || {
                for _ in 0..100 {
                    let _ = tx.send(ds.get_connection().is_ok());
                }
            });

            let received = (0..100)
                .map(|_| rx.recv_timeout(Duration::from_secs(5)))
                .collect();
            drop(held);
            received
        });

        assert!(received.into_iter().all(|r| r == Ok(true)));
        assert_eq!(counters("eager-fast").built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_published_pool_read_without_init_lock() {
        let ds = lazy("lazy-published");
        ds.get_connection().unwrap();
        let ds = &ds;
        let (tx, rx) = mpsc::channel();

        let held = ds.init.lock();
        let received = thread::scope(|s| {
            s.spawn(move || {
                let _ = tx.send(ds.get_connection().is_ok());
            });
            let received = rx.recv_timeout(Duration::from_secs(5));
            drop(held);
            received
        });

        assert_eq!(received, Ok(true));
    }

    #[test]
    fn test_published_pool_read_while_slot_is_rewritten() {
        let ds = lazy("lazy-rewritten");
        ds.get_connection().unwrap();
        let published = ds.pool().unwrap();
        let stop = AtomicBool::new(false);

        let served = thread::scope(|s| {
            s.spawn(|| {
                while !stop.load(Ordering::Acquire) {
                    ds.pool.store(Some(Arc::clone(&published)));
                }
            });

            let readers: Vec<_> = (0..4)
                .map(|_| s.spawn(|| (0..1_000).filter(|_| ds.get_connection().is_ok()).count()))
                .collect();
            let served: usize = readers.into_iter().map(|h| h.join().unwrap()).sum();
            stop.store(true, Ordering::Release);
            served
        });

        assert_eq!(served, 4_000);
        assert_eq!(counters("lazy-rewritten").built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_eager_pool_is_same_instance() {
        let ds = PooledDataSource::<TestPool>::with_config(Config::new().pool_name("eager-same"))
            .unwrap();
        let first = ds.pool().unwrap();
        let second = ds.pool().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_failed_construction_is_retried() {
        let counters = counters("lazy-retry");
        counters.failing_builds.store(1, Ordering::SeqCst);
        let ds = lazy("lazy-retry");

        let err = ds.get_connection().unwrap_err();
        assert!(matches!(err, Error::Construction(_)));
        assert!(ds.pool().is_none());

        assert!(ds.get_connection().is_ok());
        assert_eq!(counters.built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_config_leaves_pool_unbuilt() {
        let ds = PooledDataSource::<TestPool>::new();
        ds.configure(|c| {
            c.pool_name = Some("lazy-invalid".into());
            c.max_connections = 0;
        })
        .unwrap();

        assert!(matches!(ds.get_connection(), Err(Error::Config(_))));
        assert_eq!(counters("lazy-invalid").built.load(Ordering::SeqCst), 0);

        ds.configure(|c| c.max_connections = 4).unwrap();
        assert!(ds.get_connection().is_ok());
    }

    #[test]
    fn test_eager_construction_failure_is_returned() {
        counters("eager-fail").failing_builds.store(1, Ordering::SeqCst);
        let result = PooledDataSource::<TestPool>::with_config(Config::new().pool_name("eager-fail"));
        assert!(matches!(result, Err(Error::Construction(_))));
    }

    #[test]
    fn test_config_sealed_after_build() {
        let ds = lazy("lazy-sealed");
        ds.get_connection().unwrap();
        assert!(matches!(
            ds.configure(|c| c.max_connections = 99),
            Err(Error::Sealed)
        ));
        assert_eq!(ds.config().max_connections, 10);

        let eager =
            PooledDataSource::<TestPool>::with_config(Config::new().pool_name("eager-sealed"))
                .unwrap();
        assert!(matches!(eager.set_config(Config::new()), Err(Error::Sealed)));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let ds = lazy("shutdown-idempotent");
        ds.get_connection().unwrap();

        ds.shutdown();
        ds.shutdown();
        ds.close();

        assert_eq!(
            counters("shutdown-idempotent").shutdowns.load(Ordering::SeqCst),
            1
        );
        assert!(ds.is_shutdown());
        assert!(ds.pool().is_none());
    }

    #[test]
    fn test_concurrent_shutdown_tears_down_once() {
        let ds = PooledDataSource::<TestPool>::with_config(
            Config::new().pool_name("shutdown-concurrent"),
        )
        .unwrap();
        let barrier = Barrier::new(16);

        thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    barrier.wait();
                    ds.shutdown();
                });
            }
        });

        assert_eq!(
            counters("shutdown-concurrent").shutdowns.load(Ordering::SeqCst),
            1
        );
    }

    #[test]
    fn test_no_construction_after_shutdown() {
        let ds = lazy("shutdown-unbuilt");
        ds.shutdown();

        assert!(ds.get_connection().unwrap_err().is_shutdown());
        assert!(ds.get_connection_with("app", "secret").unwrap_err().is_shutdown());
        assert_eq!(counters("shutdown-unbuilt").built.load(Ordering::SeqCst), 0);
        assert!(matches!(ds.set_config(Config::new()), Err(Error::Sealed)));
    }

    #[test]
    fn test_login_timeout_is_stored() {
        let ds = PooledDataSource::<TestPool>::new();
        assert_eq!(ds.login_timeout(), Duration::ZERO);
        ds.set_login_timeout(Duration::from_secs(15));
        assert_eq!(ds.login_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_parent_logger_unsupported() {
        let ds = PooledDataSource::<TestPool>::new();
        assert!(matches!(
            ds.parent_logger(),
            Err(Error::FeatureNotSupported {
                feature: "parent_logger"
            })
        ));
    }

    #[test]
    fn test_wrapper_checks() {
        let ds = PooledDataSource::<TestPool>::new();
        assert!(ds.is_wrapper_for::<PooledDataSource<TestPool>>());
        assert!(!ds.is_wrapper_for::<TestPool>());
        assert!(ds.unwrap_as::<PooledDataSource<TestPool>>().is_ok());
        assert!(matches!(
            ds.unwrap_as::<String>(),
            Err(Error::NotAWrapper { .. })
        ));
    }

    #[test]
    fn test_display_names_pool() {
        let ds = lazy("display");
        assert_eq!(ds.to_string(), "PooledDataSource (none)");

        ds.get_connection().unwrap();
        assert!(ds.to_string().starts_with("PooledDataSource (TestPool"));

        ds.shutdown();
        assert_eq!(ds.to_string(), "PooledDataSource (none)");
    }
}
