//! Sluice Core - Core abstractions shared by the pool and its drivers
//!
//! This crate defines:
//!
//! - `DatabaseDriver` - Trait for opening physical connections
//! - `Connection` - Trait for a physical database connection
//! - `DriverRegistry` - Lookup of drivers by name
//! - `SluiceError` - The error type used across the workspace

mod connection;
mod driver;
mod error;
mod registry;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use registry::*;
