//! Error types for Sluice

use thiserror::Error;

/// Core error type for Sluice operations
#[derive(Error, Debug)]
pub enum SluiceError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to open connection to {url}: {source}")]
    ConnectionOpen {
        url: String,
        #[source]
        source: Box<SluiceError>,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Pool has not been initialized")]
    NotInitialized,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl SluiceError {
    /// Wrap a driver failure that happened while opening a physical connection.
    pub fn connection_open(url: impl Into<String>, source: SluiceError) -> Self {
        Self::ConnectionOpen {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error means the pool was shut down.
    pub fn is_pool_closed(&self) -> bool {
        matches!(self, Self::PoolClosed)
    }

    /// Whether this error means an acquire gave up waiting.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type alias for Sluice operations
pub type Result<T> = std::result::Result<T, SluiceError>;
