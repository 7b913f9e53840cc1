//! eventrelay - ship cluster events to receivers
//!
//! # Usage
//!
//! ```bash
//! eventrelay --conf config.yaml
//! eventrelay --conf /etc/eventrelay/config.yaml --metrics-address 127.0.0.1:9100
//! ```

mod logging;
mod run;

use clap::Parser;
use eventrelay::{Config, ConfigError};
use std::fmt::Display;
use std::path::PathBuf;
use tracing::error;

/// Watch cluster events and route them to receivers
#[derive(Parser, Debug)]
#[command(name = "eventrelay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// The config path file
    #[arg(long, default_value = "config.yaml")]
    conf: PathBuf,

    /// The address to listen on for HTTP requests
    #[arg(long, default_value = ":2112")]
    metrics_address: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // JSON on stderr until the configured subscriber takes over.
    let bootstrap = tracing::subscriber::set_default(logging::bootstrap());

    let mut config = match Config::load(&cli.conf) {
        Ok(config) => config,
        Err(err @ ConfigError::Read { .. }) => fatal(err, "cannot read config file"),
        Err(err) => fatal(err, "cannot parse config to YAML"),
    };
    let level = config.log_level().unwrap_or_else(|err| fatal(err, "Invalid log level"));
    let format = config.log_format().unwrap_or_else(|err| fatal(err, "Invalid log format"));
    if let Err(err) = logging::init(level, format) {
        fatal(format!("{err:#}"), "cannot set up logging");
    }
    drop(bootstrap);

    if let Err(err) = config.validate() {
        fatal(err, "config validation failed");
    }

    if let Err(err) = run::run(config, &cli.metrics_address).await {
        fatal(format!("{err:#}"), "eventrelay failed");
    }
}

/// Log one structured error record and exit with status 1.
fn fatal(err: impl Display, message: &str) -> ! {
    error!(error = %err, "{message}");
    std::process::exit(1);
}
