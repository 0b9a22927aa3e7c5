//! Per-test instrumentation shared between a test and the stub pool it drives.
//!
//! [`ConnectionPool::build`](pooled_datasource::ConnectionPool::build) is an
//! associated function, so a stub has no handle a test could hand it. Instead
//! each test registers a [`Probe`] and puts its name in the configuration as
//! the pool name; the stub looks the probe up while building.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pooled_datasource::Config;

static PROBES: Mutex<BTreeMap<String, Arc<Probe>>> = parking_lot::const_mutex(BTreeMap::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Which raw data source a stub pool creates connections from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// No raw data source.
    #[default]
    None,
    /// A source supplied by the application; owns no lifecycle.
    External,
    /// A source built internally from driver parameters; owns a lifecycle.
    Driver,
}

/// Counters and knobs for one stub pool.
#[derive(Debug)]
pub struct Probe {
    name: String,
    source: SourceKind,
    build_delay: Duration,
    shutdown_delay: Duration,
    constructions: AtomicUsize,
    checkouts: AtomicUsize,
    shutdowns: AtomicUsize,
    driver_shutdowns: AtomicUsize,
    early_driver_shutdowns: AtomicUsize,
    failing_builds: AtomicUsize,
    failing_checkouts: AtomicUsize,
    last_config: Mutex<Option<Config>>,
}

impl Probe {
    /// Register a probe with no raw data source and no build delay.
    pub fn register() -> Arc<Self> {
        Self::builder().register()
    }

    /// Start configuring a probe.
    #[must_use]
    pub fn builder() -> ProbeBuilder {
        ProbeBuilder::default()
    }

    /// Look up a registered probe by name.
    pub fn lookup(name: &str) -> Option<Arc<Self>> {
        PROBES.lock().get(name).cloned()
    }

    /// Name of this probe; also the pool name the stub expects.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A valid configuration that routes the stub pool to this probe.
    #[must_use]
    pub fn config(&self) -> Config {
        Config::new().pool_name(self.name.clone())
    }

    /// Make the next `count` pool constructions fail.
    pub fn fail_builds(&self, count: usize) {
        self.failing_builds.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` checkouts fail.
    pub fn fail_checkouts(&self, count: usize) {
        self.failing_checkouts.store(count, Ordering::SeqCst);
    }

    /// Number of pools built.
    #[must_use]
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Number of successful checkouts.
    #[must_use]
    pub fn checkouts(&self) -> usize {
        self.checkouts.load(Ordering::SeqCst)
    }

    /// Number of pool teardowns.
    #[must_use]
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Number of driver source teardowns.
    #[must_use]
    pub fn driver_shutdowns(&self) -> usize {
        self.driver_shutdowns.load(Ordering::SeqCst)
    }

    /// Number of driver source teardowns that ran before any pool teardown
    /// had completed.
    #[must_use]
    pub fn driver_shutdowns_before_pool(&self) -> usize {
        self.early_driver_shutdowns.load(Ordering::SeqCst)
    }

    /// The configuration the last pool was built from.
    #[must_use]
    pub fn last_config(&self) -> Option<Config> {
        self.last_config.lock().clone()
    }

    pub(crate) fn source(&self) -> SourceKind {
        self.source
    }

    pub(crate) fn build_delay(&self) -> Duration {
        self.build_delay
    }

    pub(crate) fn shutdown_delay(&self) -> Duration {
        self.shutdown_delay
    }

    pub(crate) fn take_build_failure(&self) -> bool {
        take_one(&self.failing_builds)
    }

    pub(crate) fn take_checkout_failure(&self) -> bool {
        take_one(&self.failing_checkouts)
    }

    pub(crate) fn record_construction(&self, config: &Config) -> usize {
        *self.last_config.lock() = Some(config.clone());
        self.constructions.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_checkout(&self) {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_driver_shutdown(&self) {
        if self.shutdowns() == 0 {
            self.early_driver_shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        self.driver_shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Builder for a [`Probe`].
#[derive(Debug, Default)]
pub struct ProbeBuilder {
    source: SourceKind,
    build_delay: Duration,
    shutdown_delay: Duration,
}

impl ProbeBuilder {
    /// Choose the raw data source the stub pool creates.
    #[must_use]
    pub fn source(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }

    /// Sleep this long inside every pool construction.
    #[must_use]
    pub fn build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    /// Sleep this long inside every pool teardown, before it is recorded.
    #[must_use]
    pub fn shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    /// Register the probe under a fresh name.
    pub fn register(self) -> Arc<Probe> {
        let name = format!("stub-pool-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed));
        let probe = Arc::new(Probe {
            name: name.clone(),
            source: self.source,
            build_delay: self.build_delay,
            shutdown_delay: self.shutdown_delay,
            constructions: AtomicUsize::new(0),
            checkouts: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            driver_shutdowns: AtomicUsize::new(0),
            early_driver_shutdowns: AtomicUsize::new(0),
            failing_builds: AtomicUsize::new(0),
            failing_checkouts: AtomicUsize::new(0),
            last_config: Mutex::new(None),
        });

        PROBES.lock().insert(name, Arc::clone(&probe));
        probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_probe_is_found_by_name() {
        let probe = Probe::register();
        let found = Probe::lookup(probe.name());
        assert!(found.is_some_and(|p| Arc::ptr_eq(&p, &probe)));
        assert_eq!(probe.config().pool_name.as_deref(), Some(probe.name()));
    }

    #[test]
    fn test_driver_shutdown_before_pool_is_flagged() {
        let probe = Probe::register();
        probe.record_driver_shutdown();
        probe.record_shutdown();
        probe.record_driver_shutdown();
        assert_eq!(probe.driver_shutdowns(), 2);
        assert_eq!(probe.driver_shutdowns_before_pool(), 1);
    }

    #[test]
    fn test_failures_are_consumed() {
        let probe = Probe::register();
        probe.fail_builds(2);
        assert!(probe.take_build_failure());
        assert!(probe.take_build_failure());
        assert!(!probe.take_build_failure());
    }
}
