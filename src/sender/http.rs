use super::DispatchError;
use super::serialization::BulkSerializer;
use crate::batch::Bulk;
use crate::domain::Message;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_ORCHESTRATOR_ENDPOINT: &str = "http://orchestrator:8080/v1/bulks";

#[derive(Debug, Clone)]
pub struct HttpDispatcherConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub user_agent: String,
    pub enable_compression: bool,
    /// Bodies smaller than this are sent uncompressed.
    pub compression_threshold_bytes: usize,
}

impl Default for HttpDispatcherConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ORCHESTRATOR_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            user_agent: format!("worker-outbound-buffer/{}", env!("CARGO_PKG_VERSION")),
            enable_compression: false,
            compression_threshold_bytes: 1024,
        }
    }
}

/// Posts each bulk to the orchestrator as one JSON document.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
    endpoint: Url,
    config: HttpDispatcherConfig,
    serializer: BulkSerializer,
}

impl HttpDispatcher {
    pub fn new(config: HttpDispatcherConfig) -> Result<Self, DispatchError> {
        let endpoint: Url = config.endpoint.parse().map_err(|e| {
            DispatchError::InvalidConfiguration(format!(
                "Invalid endpoint URL '{}': {}",
                config.endpoint, e
            ))
        })?;

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DispatchError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            config,
            serializer: BulkSerializer::new(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn config(&self) -> &HttpDispatcherConfig {
        &self.config
    }

    async fn send<M: Serialize>(&self, bulk: &Bulk<M>) -> Result<(), DispatchError> {
        let body = self.serializer.serialize(bulk)?;
        let compress =
            self.config.enable_compression && body.len() >= self.config.compression_threshold_bytes;

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header("x-bulk-id", bulk.id())
            .header("x-bulk-weight", bulk.weight().to_string())
            .header("x-bulk-size", bulk.len().to_string());

        let body = if compress {
            let raw = body.len();
            let compressed = self.serializer.compress(&body)?;
            debug!("Compressed bulk {} from {} to {} bytes", bulk.id(), raw, compressed.len());
            request = request.header(CONTENT_ENCODING, "gzip");
            compressed
        } else {
            body
        };

        let start = Instant::now();
        let response = tokio::time::timeout(self.config.timeout, request.body(body).send())
            .await
            .map_err(|_| DispatchError::Timeout(self.config.timeout))??;

        let status = response.status();
        if status.is_success() {
            debug!(
                "Bulk {} delivered in {:?} (HTTP {})",
                bulk.id(),
                start.elapsed(),
                status.as_u16()
            );
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        warn!("Bulk {} rejected with HTTP {}", bulk.id(), status.as_u16());
        Err(DispatchError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

impl<M: Message + Serialize> super::Dispatcher<M> for HttpDispatcher {
    async fn dispatch(&self, bulk: &Bulk<M>) -> Result<(), DispatchError> {
        self.send(bulk).await
    }
}
