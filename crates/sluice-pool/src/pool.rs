//! Connection pooling for database connections
//!
//! The pool keeps a fixed core set of connections plus an overflow set that
//! grows on demand up to the configured maximum. Overflow connections that sit
//! idle too long are closed by a background eviction task.
//!
//! # Example
//!
//! ```ignore
//! use sluice_pool::pool::{PoolConfig, PoolManager};
//!
//! let config = PoolConfig::new("postgres", "postgres://localhost/app", "app", "secret")
//!     .with_init_pool_size(5)
//!     .with_max_pool_size(20)
//!     .with_max_idle_secs(300);
//!
//! let pool = PoolManager::open(config, driver).await?;
//! let conn = pool.acquire().await?;
//! conn.execute("SELECT 1").await?;
//! conn.release()?;
//! ```

mod config;
mod connection;
mod eviction;
mod guard;
mod ids;
mod loader;
mod manager;
mod stats;


pub use config::PoolConfig;
pub use connection::{ConnectionRole, ConnectionState, PooledConnection};
pub use guard::PoolGuard;
pub use ids::IdAllocator;
pub use manager::PoolManager;
pub use stats::PoolStats;
