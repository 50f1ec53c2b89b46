use super::metrics::DispatchMetrics;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);

#[derive(Error, Debug)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("Maximum retry attempts exceeded ({attempts}): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_source(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Pause between two consecutive attempts. Constant, no backoff.
    #[serde(with = "duration_millis")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Runs an action under a fixed-count, fixed-delay retry policy.
#[derive(Debug, Clone)]
pub struct RetryTemplate {
    config: RetryConfig,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl RetryTemplate {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Call `action` until it succeeds or `max_attempts` calls have failed.
    ///
    /// The delay is slept between attempts only, never after the last one.
    /// A configured attempt count of 0 still runs the action once.
    pub async fn retry<T, E, F, Fut>(&self, mut action: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match action().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Action succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= max_attempts => {
                    error!(
                        "Action failed on final attempt {}/{}: {}",
                        attempt, max_attempts, e
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, max_attempts, e, self.config.delay
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry_attempt();
                    }
                    tokio::time::sleep(self.config.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
