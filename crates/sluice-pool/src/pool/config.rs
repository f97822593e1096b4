//! Pool configuration types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_core::{ConnectTarget, Result, SluiceError};

pub(crate) const DEFAULT_INIT_POOL_SIZE: usize = 10;
pub(crate) const DEFAULT_MAX_POOL_SIZE: usize = 1024;
pub(crate) const DEFAULT_EVICTION_INTERVAL_MS: u64 = 1_000;
pub(crate) const DEFAULT_RETRY_INTERVAL_MS: u64 = 50;

/// Configuration for a connection pool
///
/// Holds the driver identity, the connection target and credentials, and
/// the sizing and timing policy of the pool. A config is never mutated once
/// the pool has been started; [`PoolManager`](super::PoolManager) validates
/// it on construction.
#[derive(Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Name of the driver used to open connections
    #[serde(alias = "driverName")]
    driver: String,
    /// Connection string passed to the driver
    url: String,
    /// Username passed to the driver
    username: String,
    /// Password passed to the driver
    #[serde(alias = "userpwd")]
    password: String,
    /// Number of connections opened at init and kept for the pool's lifetime
    #[serde(default = "default_init_pool_size", alias = "initPoolSize")]
    init_pool_size: usize,
    /// Hard ceiling on core + overflow connections
    #[serde(default = "default_max_pool_size", alias = "maxPoolSize")]
    max_pool_size: usize,
    /// Seconds an overflow connection may stay idle before it is evicted
    #[serde(default, alias = "maxIdleTime")]
    max_idle_secs: u64,
    /// Period of the eviction task in milliseconds
    #[serde(default = "default_eviction_interval_ms", alias = "evictionIntervalMs")]
    eviction_interval_ms: u64,
    /// Default deadline for `acquire` in milliseconds (None waits forever)
    #[serde(default, alias = "acquireTimeoutMs")]
    acquire_timeout_ms: Option<u64>,
    /// Upper bound between two re-scans while waiting on a saturated pool
    #[serde(default = "default_retry_interval_ms", alias = "retryIntervalMs")]
    retry_interval_ms: u64,
}

fn default_init_pool_size() -> usize {
    DEFAULT_INIT_POOL_SIZE
}

fn default_max_pool_size() -> usize {
    DEFAULT_MAX_POOL_SIZE
}

fn default_eviction_interval_ms() -> u64 {
    DEFAULT_EVICTION_INTERVAL_MS
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

impl PoolConfig {
    /// Create a configuration for the given driver and target with default sizing
    ///
    /// Defaults:
    /// - init_pool_size: 10
    /// - max_pool_size: 1024
    /// - max_idle_secs: 0
    /// - eviction_interval: 1 second
    /// - acquire_timeout: None (wait until a connection is released)
    /// - retry_interval: 50 milliseconds
    pub fn new(
        driver: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            url: url.into(),
            username: username.into(),
            password: password.into(),
            init_pool_size: DEFAULT_INIT_POOL_SIZE,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            max_idle_secs: 0,
            eviction_interval_ms: DEFAULT_EVICTION_INTERVAL_MS,
            acquire_timeout_ms: None,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
        }
    }

    /// Set the number of core connections
    pub fn with_init_pool_size(mut self, size: usize) -> Self {
        self.init_pool_size = size;
        self
    }

    /// Set the maximum number of connections
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the idle threshold for overflow connections, in seconds
    pub fn with_max_idle_secs(mut self, secs: u64) -> Self {
        self.max_idle_secs = secs;
        self
    }

    /// Set the eviction task period in milliseconds
    pub fn with_eviction_interval_ms(mut self, interval_ms: u64) -> Self {
        self.eviction_interval_ms = interval_ms;
        self
    }

    /// Set the default acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the longest pause between re-scans of a saturated pool
    pub fn with_retry_interval_ms(mut self, interval_ms: u64) -> Self {
        self.retry_interval_ms = interval_ms;
        self
    }

    /// Check the configuration, returning a [`SluiceError::Configuration`] on the first problem.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("driver", &self.driver), ("url", &self.url)] {
            if value.trim().is_empty() {
                return Err(SluiceError::Configuration(format!(
                    "{} must not be empty",
                    name
                )));
            }
        }
        if self.max_pool_size == 0 {
            return Err(SluiceError::Configuration(
                "max_pool_size must be greater than 0".into(),
            ));
        }
        if self.init_pool_size > self.max_pool_size {
            return Err(SluiceError::Configuration(format!(
                "init_pool_size ({}) cannot exceed max_pool_size ({})",
                self.init_pool_size, self.max_pool_size
            )));
        }
        if self.eviction_interval_ms == 0 {
            return Err(SluiceError::Configuration(
                "eviction_interval_ms must be greater than 0".into(),
            ));
        }
        if self.retry_interval_ms == 0 {
            return Err(SluiceError::Configuration(
                "retry_interval_ms must be greater than 0".into(),
            ));
        }
        if self.acquire_timeout_ms == Some(0) {
            return Err(SluiceError::Configuration(
                "acquire_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Get the driver name
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Get the connection string
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the password
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Build the target handed to the driver when opening a connection
    pub fn target(&self) -> ConnectTarget {
        ConnectTarget::new(&self.url, &self.username, &self.password)
    }

    /// Get the number of core connections
    pub fn init_pool_size(&self) -> usize {
        self.init_pool_size
    }

    /// Get the maximum number of connections
    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    /// Number of connections the overflow set may hold
    pub fn overflow_capacity(&self) -> usize {
        self.max_pool_size.saturating_sub(self.init_pool_size)
    }

    /// Get the idle threshold in seconds
    pub fn max_idle_secs(&self) -> u64 {
        self.max_idle_secs
    }

    /// Get the idle threshold as a Duration
    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    /// Get the eviction task period as a Duration
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }

    /// Get the default acquire timeout as a Duration if set
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    /// Get the re-scan interval as a Duration
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("init_pool_size", &self.init_pool_size)
            .field("max_pool_size", &self.max_pool_size)
            .field("max_idle_secs", &self.max_idle_secs)
            .field("eviction_interval_ms", &self.eviction_interval_ms)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .field("retry_interval_ms", &self.retry_interval_ms)
            .finish()
    }
}
