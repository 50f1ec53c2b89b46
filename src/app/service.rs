use super::config::{Config, ConfigError};
use super::logging::LoggingError;
use crate::batch::{AssemblerConfig, BulkAssembler};
use crate::buffer::{BufferConfig, BufferError, OutboundBuffer};
use crate::domain::Message;
use crate::reliability::{DispatchMetrics, RecoveryManager, RetryConfig, RetryTemplate};
use crate::sender::{DispatchError, Dispatcher, HttpDispatcher};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Logging error: {0}")]
    LoggingError(#[from] LoggingError),
    #[error("Buffer error: {0}")]
    BufferError(#[from] BufferError),
    #[error("Dispatcher error: {0}")]
    DispatchError(#[from] DispatchError),
    #[error("Drain task failed: {0}")]
    TaskFailed(String),
    #[error("Shutdown timeout exceeded after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Buffer, assembler and recovery coordinator wired together.
///
/// Producers obtain the buffer through [`OutboundService::buffer`]; `start`
/// spawns the single drain loop that feeds the assembler.
pub struct OutboundService<M, D> {
    buffer: Arc<OutboundBuffer<M>>,
    assembler: Arc<BulkAssembler<M, D>>,
    recovery: Arc<RecoveryManager>,
    metrics: Arc<DispatchMetrics>,
}

impl<M: Message, D: Dispatcher<M> + 'static> OutboundService<M, D> {
    pub fn new(
        buffer_config: BufferConfig,
        assembler_config: AssemblerConfig,
        retry_config: RetryConfig,
        dispatcher: D,
    ) -> Result<Self, ServiceError> {
        let metrics = Arc::new(DispatchMetrics::new());
        let buffer = Arc::new(OutboundBuffer::new(buffer_config)?.with_metrics(metrics.clone()));

        let recovery = Arc::new(RecoveryManager::new().with_metrics(metrics.clone()));
        recovery.register(buffer.clone());

        let retry = RetryTemplate::new(retry_config).with_metrics(metrics.clone());
        let assembler = Arc::new(
            BulkAssembler::new(assembler_config, dispatcher, retry, recovery.clone())
                .with_metrics(metrics.clone()),
        );

        Ok(Self {
            buffer,
            assembler,
            recovery,
            metrics,
        })
    }

    pub fn from_config(config: &Config, dispatcher: D) -> Result<Self, ServiceError> {
        Self::new(
            config.buffer_config(),
            config.assembler_config(),
            config.retry_config(),
            dispatcher,
        )
    }

    pub fn buffer(&self) -> Arc<OutboundBuffer<M>> {
        self.buffer.clone()
    }

    pub fn recovery(&self) -> Arc<RecoveryManager> {
        self.recovery.clone()
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        self.metrics.clone()
    }

    /// Spawn the drain loop on the current tokio runtime.
    pub fn start(&self) -> ShutdownHandle {
        let token = CancellationToken::new();
        let handle = tokio::spawn(drain_loop(
            self.buffer.clone(),
            self.assembler.clone(),
            token.clone(),
        ));
        info!(
            "Outbound service started (max buffer weight {})",
            self.buffer.max_weight()
        );
        ShutdownHandle { token, handle }
    }
}

impl<M: Message + Serialize> OutboundService<M, HttpDispatcher> {
    /// Service posting bulks to the configured orchestrator endpoint.
    pub fn with_http(config: &Config) -> Result<Self, ServiceError> {
        let dispatcher = HttpDispatcher::new(config.http_dispatcher_config())?;
        Self::from_config(config, dispatcher)
    }
}

async fn drain_loop<M: Message, D: Dispatcher<M>>(
    buffer: Arc<OutboundBuffer<M>>,
    assembler: Arc<BulkAssembler<M, D>>,
    token: CancellationToken,
) {
    while let Some(snapshot) = buffer.drain_until_cancelled(&token).await {
        let report = assembler.process_snapshot(snapshot).await;
        debug!(
            entries = report.entries,
            messages_in = report.messages_in,
            messages_dispatched = report.messages_dispatched,
            bulks = report.bulks_dispatched,
            abandoned = report.abandoned,
            "Snapshot processed"
        );
    }

    // Whatever was admitted before cancellation still gets one delivery attempt
    if let Some(snapshot) = buffer.try_drain() {
        info!("Flushing {} remaining buffer entries", snapshot.len());
        let report = assembler.process_snapshot(snapshot).await;
        if report.abandoned {
            warn!("Final flush abandoned undelivered messages");
        }
    }

    info!("Outbound drain loop stopped");
}

/// Controls a running drain loop.
#[derive(Debug)]
pub struct ShutdownHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ShutdownHandle {
    /// Token cancelled on shutdown; producers can pass it to
    /// `put_until_cancelled`.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop draining, flush what is buffered and wait for the loop to exit.
    /// The loop is aborted if it does not finish within `timeout`.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<(), ServiceError> {
        info!("Initiating graceful shutdown...");
        self.token.cancel();

        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(())) => {
                info!("Graceful shutdown completed");
                Ok(())
            }
            Ok(Err(e)) => Err(ServiceError::TaskFailed(e.to_string())),
            Err(_) => {
                error!("Shutdown timeout exceeded, aborting drain loop");
                self.handle.abort();
                Err(ServiceError::ShutdownTimeout(timeout))
            }
        }
    }

}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT, initiating graceful shutdown"),
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for SIGINT: {}", e);
    }
}
