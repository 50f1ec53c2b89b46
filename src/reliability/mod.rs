pub mod metrics;
pub mod recovery;
pub mod retry;

#[cfg(feature = "metrics")]
pub use metrics::PrometheusExporter;
pub use metrics::{DispatchMetrics, MetricsError, MetricsSnapshot};
pub use recovery::{RecoveryListener, RecoveryManager, RecoveryTrigger};
pub use retry::{RetryConfig, RetryError, RetryTemplate};
