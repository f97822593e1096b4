//! Physical connection trait

use crate::Result;
use async_trait::async_trait;

/// A physical database connection handed out by a driver.
///
/// The pool treats implementations as opaque: it only opens them through a
/// [`DatabaseDriver`](crate::DatabaseDriver) and closes them when they are
/// evicted or the pool shuts down.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgres", "loopback")
    fn driver_name(&self) -> &str;

    /// Execute a statement and return the number of affected rows
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
