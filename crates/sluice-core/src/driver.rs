//! Database driver trait definition

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Connection, Result};

/// Where and as whom a driver should connect.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Connection string understood by the driver
    pub url: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl ConnectTarget {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A database driver able to open physical connections.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique name used to look the driver up (e.g., "postgres", "loopback")
    fn name(&self) -> &'static str;

    /// Open a new physical connection
    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn Connection>>;
}
