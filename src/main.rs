//! framekv server binary.
//!
//! Loads configuration, initializes logging and runs the event loop until
//! it fails or the process is terminated.

use framekv::{server, Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        max_message = config.max_message,
        max_args = config.max_args,
        max_connections = config.max_connections,
        "Starting framekv server"
    );

    if let Err(e) = server::run(&config) {
        error!(error = %e, "Server stopped");
        return Err(e);
    }
    Ok(())
}
