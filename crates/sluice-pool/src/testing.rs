//! Mock driver for pool tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sluice_core::{ConnectTarget, Connection, DatabaseDriver, Result, SluiceError};

/// Counters shared by a mock driver and every connection it opened
#[derive(Default)]
pub(crate) struct MockCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    double_closes: AtomicUsize,
}

pub(crate) struct MockConnection {
    counters: Arc<MockCounters>,
    closed: AtomicBool,
    fail_close: bool,
    close_delay: Duration,
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, _sql: &str) -> Result<u64> {
        if self.is_closed() {
            return Err(SluiceError::Connection("connection is closed".into()));
        }
        Ok(0)
    }

    async fn close(&self) -> Result<()> {
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        if self.closed.swap(true, Ordering::SeqCst) {
            self.counters.double_closes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail_close {
            return Err(SluiceError::Connection("close failed".into()));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Driver that opens in-memory connections and counts opens and closes
pub(crate) struct MockDriver {
    counters: Arc<MockCounters>,
    failing_connects: AtomicUsize,
    fail_after: AtomicUsize,
    fail_close: AtomicBool,
    close_delay_ms: AtomicU64,
    connect_delay_ms: AtomicU64,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            counters: Arc::default(),
            failing_connects: AtomicUsize::new(0),
            fail_after: AtomicUsize::new(usize::MAX),
            fail_close: AtomicBool::new(false),
            close_delay_ms: AtomicU64::new(0),
            connect_delay_ms: AtomicU64::new(0),
        }
    }
}

impl MockDriver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail one connect once `n` connections have been opened in total
    pub(crate) fn fail_connects_after(&self, n: usize) {
        self.fail_after.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` connect calls fail
    pub(crate) fn fail_next_connects(&self, n: usize) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Make connections opened from now on fail to close
    pub(crate) fn fail_closes(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    /// Make connections opened from now on take `delay` to close
    pub(crate) fn slow_closes(&self, delay: Duration) {
        self.close_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make every connect take `delay`
    pub(crate) fn slow_connects(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn double_closes(&self) -> usize {
        self.counters.double_closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, _target: &ConnectTarget) -> Result<Arc<dyn Connection>> {
        let delay = Duration::from_millis(self.connect_delay_ms.load(Ordering::SeqCst));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let should_fail = self
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
            || self
                .fail_after
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    (self.opened() >= n).then_some(usize::MAX)
                })
                .is_ok();
        if should_fail {
            return Err(SluiceError::Driver("connection refused".into()));
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection {
            counters: Arc::clone(&self.counters),
            closed: AtomicBool::new(false),
            fail_close: self.fail_close.load(Ordering::SeqCst),
            close_delay: Duration::from_millis(self.close_delay_ms.load(Ordering::SeqCst)),
        }))
    }
}
