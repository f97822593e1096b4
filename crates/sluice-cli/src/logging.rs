//! Logging setup for the sluice binary
//!
//! Console output only; `RUST_LOG` takes precedence over the default filter.

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Whether to include file/line information in logs
    pub include_location: bool,

    /// Whether to log span creation and close (for timing the instrumented pool calls)
    pub enable_spans: bool,

    /// Default log level filter
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: "warn,sluice=info,sluice_pool=info,sluice_core=info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration used with `--verbose`
    pub fn verbose() -> Self {
        Self {
            include_location: true,
            enable_spans: true,
            default_filter: "info,sluice=debug,sluice_pool=debug,sluice_core=debug".to_string(),
        }
    }
}

/// Install the global subscriber
pub fn init(config: LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    // NEW fires once when the span is created; ENTER would fire on every async re-poll.
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()?;

    tracing::debug!(filter = %config.default_filter, "Logging system initialized");
    Ok(())
}
