//! sluice - exercise a connection pool from the command line
//!
//! Opens a pool against the in-process loopback driver, runs concurrent
//! workers that acquire, hold and release connections, then prints the final
//! pool statistics as JSON.

mod logging;
mod loopback;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use sluice_core::DriverRegistry;
use sluice_pool::{PoolConfig, PoolManager};

use crate::loopback::LoopbackDriver;

#[derive(Debug, Parser)]
#[command(name = "sluice", version, about = "Run concurrent workers against a connection pool")]
struct Cli {
    /// Pool configuration file (.properties, .toml or .json)
    #[arg(short, long, env = "SLUICE_CONFIG")]
    config: Option<PathBuf>,

    /// Connection URL, used when no config file is given
    #[arg(long, default_value = "loopback://demo")]
    url: String,

    /// Core connections opened at startup
    #[arg(long, default_value_t = 4)]
    init_size: usize,

    /// Maximum number of live connections
    #[arg(long, default_value_t = 16)]
    max_size: usize,

    /// Seconds an overflow connection may sit idle before eviction
    #[arg(long, default_value_t = 1)]
    max_idle_secs: u64,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 32)]
    workers: usize,

    /// Acquire/release cycles per worker
    #[arg(short, long, default_value_t = 10)]
    iterations: usize,

    /// How long each worker holds a connection, in milliseconds
    #[arg(long, default_value_t = 20)]
    hold_ms: u64,

    /// Simulated connect latency, in milliseconds
    #[arg(long, default_value_t = 5)]
    connect_latency_ms: u64,

    /// Seconds to wait after the workers finish, letting idle overflow connections expire
    #[arg(long, default_value_t = 0)]
    linger_secs: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn pool_config(&self) -> anyhow::Result<PoolConfig> {
        match &self.config {
            Some(path) => PoolConfig::load(path)
                .with_context(|| format!("failed to load pool config from {}", path.display())),
            None => Ok(PoolConfig::new(LoopbackDriver::NAME, &self.url, "sluice", "")
                .with_init_pool_size(self.init_size)
                .with_max_pool_size(self.max_size)
                .with_max_idle_secs(self.max_idle_secs)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(if cli.verbose {
        logging::LoggingConfig::verbose()
    } else {
        logging::LoggingConfig::default()
    })?;

    let config = cli.pool_config()?;
    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(LoopbackDriver::new(Duration::from_millis(
        cli.connect_latency_ms,
    ))));

    let pool = Arc::new(PoolManager::from_registry(config, &registry)?);
    pool.init().await.context("failed to initialize pool")?;

    let started = Instant::now();
    let hold = Duration::from_millis(cli.hold_ms);
    let mut workers = Vec::with_capacity(cli.workers);
    for worker in 0..cli.workers {
        let pool = Arc::clone(&pool);
        let iterations = cli.iterations;
        workers.push(tokio::spawn(async move {
            for _ in 0..iterations {
                let conn = pool.acquire().await?;
                conn.execute("SELECT 1").await?;
                tokio::time::sleep(hold).await;
                tracing::trace!(worker, connection_id = conn.id(), "releasing connection");
                conn.release()?;
            }
            anyhow::Ok(())
        }));
    }
    for worker in workers {
        worker.await??;
    }
    tracing::info!(
        workers = cli.workers,
        iterations = cli.iterations,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "workers finished"
    );

    if cli.linger_secs > 0 {
        tokio::time::sleep(Duration::from_secs(cli.linger_secs)).await;
    }

    let stats = pool.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    pool.shutdown().await?;
    Ok(())
}
