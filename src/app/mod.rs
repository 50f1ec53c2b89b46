pub mod config;
pub mod logging;
pub mod service;

pub use config::{Config, ConfigError, LogLevel};
pub use logging::{LoggingError, init_logging};
pub use service::{OutboundService, ServiceError, ShutdownHandle};

use crate::domain::WorkerMessage;
use crate::sender::HttpDispatcher;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Relay newline-delimited JSON worker messages from stdin to the orchestrator
/// until stdin closes or a shutdown signal arrives.
pub async fn run(config: Config) -> Result<(), ServiceError> {
    init_logging(config.log_level, config.log_json)?;

    info!("Starting worker-outbound-buffer v{}", crate::VERSION);
    info!(
        "Configuration: endpoint={}, max_buffer_weight={}, max_bulk_weight={}, retries={}x{}ms",
        config.orchestrator_endpoint,
        config.max_buffer_weight,
        config.max_bulk_weight,
        config.retry_number,
        config.retry_delay_ms
    );

    let outbound = OutboundService::<WorkerMessage, HttpDispatcher>::with_http(&config)?;
    let buffer = outbound.buffer();
    let shutdown = outbound.start();
    let token = shutdown.token();

    tokio::spawn({
        let token = token.clone();
        async move {
            service::shutdown_signal().await;
            token.cancel();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            biased;
            () = token.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Input closed");
                break;
            }
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<WorkerMessage>(&line) {
            Ok(message) => {
                if let Err(e) = buffer.put_until_cancelled(vec![message], &token).await {
                    warn!("Message not buffered: {}", e);
                    break;
                }
            }
            Err(e) => warn!("Skipping malformed message: {}", e),
        }
    }

    shutdown.shutdown(SHUTDOWN_TIMEOUT).await
}


pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // clap renders --help and --version through its error path
    let mut config = match Config::from_args(std::env::args()) {
        Err(ConfigError::ArgError(e)) => e.exit(),
        other => other?,
    };
    if let Some(config_file) = config.config_file.clone() {
        eprintln!("Loading configuration from file: {}", config_file.display());
        config = Config::from_file(config_file)?;
    }
    run(config).await?;
    Ok(())
}
