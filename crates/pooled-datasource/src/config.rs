//! Pool configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// Smallest connection timeout a pool accepts.
pub const MIN_CONNECTION_TIMEOUT: Duration = Duration::from_millis(250);

/// Settings handed to a [`ConnectionPool`](crate::ConnectionPool) when it is built.
///
/// A `PooledDataSource` hands the pool a snapshot of this value exactly once.
/// After that the configuration is sealed.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Pool name, used in log output.
    pub pool_name: Option<String>,

    /// Connection URL understood by the pool's driver.
    pub url: Option<String>,

    /// Username for new connections.
    pub username: Option<String>,

    /// Password for new connections.
    pub password: Option<String>,

    /// Minimum number of idle connections to maintain.
    pub min_connections: u32,

    /// Maximum number of connections.
    pub max_connections: u32,

    /// How long a caller waits for a connection.
    pub connection_timeout: Duration,

    /// How long a connection may sit idle before retirement.
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection.
    pub max_lifetime: Duration,

    /// Default auto-commit mode of new connections.
    pub auto_commit: bool,

    /// Default read-only mode of new connections.
    pub read_only: bool,

    /// Extra driver properties, passed through untouched.
    pub properties: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_name: None,
            url: None,
            username: None,
            password: None,
            min_connections: 1,
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            auto_commit: true,
            read_only: false,
            properties: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `key=value;` connection string into configuration.
    ///
    /// ```text
    /// Url=postgres://db/app;User=app;Password=secret;Max Connections=20;
    /// ```
    ///
    /// Keys are case-insensitive. Unrecognized keys are kept in
    /// [`Config::properties`] for the driver.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidKeyValue(part.to_string()))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "pool name" | "poolname" | "name" => {
                    config.pool_name = Some(value.to_string());
                }
                "url" | "jdbcurl" | "data source" => {
                    config.url = Some(value.to_string());
                }
                "user" | "user id" | "uid" | "username" => {
                    config.username = Some(value.to_string());
                }
                "password" | "pwd" => {
                    config.password = Some(value.to_string());
                }
                "min connections" | "minimum idle" | "minidle" => {
                    config.min_connections = parse_value("min connections", value)?;
                }
                "max connections" | "maximum pool size" | "maxpoolsize" => {
                    config.max_connections = parse_value("max connections", value)?;
                }
                "connection timeout" | "connect timeout" => {
                    config.connection_timeout =
                        Duration::from_millis(parse_value("connection timeout", value)?);
                }
                "idle timeout" => {
                    config.idle_timeout = Duration::from_millis(parse_value("idle timeout", value)?);
                }
                "max lifetime" => {
                    config.max_lifetime = Duration::from_millis(parse_value("max lifetime", value)?);
                }
                "auto commit" | "autocommit" => {
                    config.auto_commit = parse_bool("auto commit", value)?;
                }
                "read only" | "readonly" => {
                    config.read_only = parse_bool("read only", value)?;
                }
                _ => {
                    tracing::debug!(
                        key = key,
                        "passing unknown connection string option through as a driver property"
                    );
                    config.properties.insert(key, value.to_string());
                }
            }
        }

        Ok(config)
    }

    /// Check the configuration for values no pool can honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroMaxConnections);
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::MinExceedsMax {
                min: self.min_connections,
                max: self.max_connections,
            });
        }

        if self.connection_timeout < MIN_CONNECTION_TIMEOUT {
            return Err(ConfigError::ConnectionTimeoutTooShort {
                min_ms: MIN_CONNECTION_TIMEOUT.as_millis(),
                actual_ms: self.connection_timeout.as_millis(),
            });
        }

        if self.pool_name.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::EmptyPoolName);
        }

        Ok(())
    }

    /// Set the pool name.
    #[must_use]
    pub fn pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = Some(name.into());
        self
    }

    /// Set the connection URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the username and password used for new connections.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the minimum number of idle connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Set the default auto-commit mode.
    #[must_use]
    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = enabled;
        self
    }

    /// Set the default read-only mode.
    #[must_use]
    pub fn read_only(mut self, enabled: bool) -> Self {
        self.read_only = enabled;
        self
    }

    /// Add a driver property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("pool_name", &self.pool_name)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .field("connection_timeout", &self.connection_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_lifetime", &self.max_lifetime)
            .field("auto_commit", &self.auto_commit)
            .field("read_only", &self.read_only)
            .field("properties", &self.properties)
            .finish()
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") || value == "1" {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("no") || value == "0"
    {
        Ok(false)
    } else {
        Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
    }
}
