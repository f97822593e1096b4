//! In-process driver used by the demo harness

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sluice_core::{ConnectTarget, Connection, DatabaseDriver, Result, SluiceError};

/// Driver whose connections live entirely in memory.
///
/// Connecting sleeps for `connect_latency` to stand in for a network handshake.
#[derive(Debug)]
pub struct LoopbackDriver {
    connect_latency: Duration,
}

impl LoopbackDriver {
    pub const NAME: &'static str = "loopback";

    pub fn new(connect_latency: Duration) -> Self {
        Self { connect_latency }
    }
}

#[async_trait]
impl DatabaseDriver for LoopbackDriver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn connect(&self, target: &ConnectTarget) -> Result<Arc<dyn Connection>> {
        if !target.url.starts_with("loopback:") {
            return Err(SluiceError::Driver(format!(
                "loopback driver cannot open {}",
                target.url
            )));
        }
        tokio::time::sleep(self.connect_latency).await;
        Ok(Arc::new(LoopbackConnection::default()))
    }
}

#[derive(Debug, Default)]
struct LoopbackConnection {
    statements: AtomicU64,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for LoopbackConnection {
    fn driver_name(&self) -> &str {
        LoopbackDriver::NAME
    }

    async fn execute(&self, _sql: &str) -> Result<u64> {
        if self.is_closed() {
            return Err(SluiceError::Connection("connection is closed".into()));
        }
        Ok(self.statements.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
