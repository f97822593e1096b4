//! Sluice Pool - Client-side database connection pooling
//!
//! This crate owns the pool engine: configuration, connection bookkeeping,
//! the acquisition algorithm and idle eviction.

pub mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use pool::{
    ConnectionRole, ConnectionState, IdAllocator, PoolConfig, PoolGuard, PoolManager, PoolStats,
    PooledConnection,
};
pub use sluice_core::{Result, SluiceError};
