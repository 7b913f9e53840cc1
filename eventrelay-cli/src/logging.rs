//! Process-wide tracing subscriber.

use anyhow::Result;
use eventrelay::{LogFormat, LogLevel};
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// JSON subscriber on stderr used until the configured one is installed, so
/// startup failures are still structured records.
pub fn bootstrap() -> impl Subscriber + Send + Sync {
    bootstrap_with(std::io::stderr)
}

fn bootstrap_with<W>(writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt()
        .json()
        .with_current_span(false)
        .with_max_level(LevelFilter::INFO)
        .with_writer(writer)
        .finish()
}

/// Install the global subscriber from `logLevel` / `logFormat`.
///
/// `RUST_LOG`, when set, refines the configured level.
pub fn init(level: LogLevel, format: LogFormat) -> Result<()> {
    let json = (format == LogFormat::Json).then(|| fmt::layer().json().with_target(true).with_current_span(false));
    let pretty = (format == LogFormat::Pretty).then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter(level))
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| anyhow::anyhow!("cannot install log subscriber: {e}"))
}

fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.as_filter().into())
        .from_env_lossy()
}
