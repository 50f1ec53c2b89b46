use super::metrics::DispatchMetrics;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// A component that can reset its own state during a recovery episode.
pub trait RecoveryListener: Send + Sync {
    fn name(&self) -> &str {
        "unnamed"
    }

    fn do_recovery(&self);
}

/// Entry point used to escalate an unrecoverable failure.
///
/// Fire-and-forget from the caller's side: the implementation decides how the
/// episode is sequenced.
pub trait RecoveryTrigger: Send + Sync {
    fn trigger_recovery(&self);
}

/// Recovery coordinator running every registered listener on each episode.
pub struct RecoveryManager {
    listeners: RwLock<Vec<Arc<dyn RecoveryListener>>>,
    in_recovery: AtomicBool,
    episodes: AtomicU64,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            in_recovery: AtomicBool::new(false),
            episodes: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn register(&self, listener: Arc<dyn RecoveryListener>) {
        debug!("Registering recovery listener '{}'", listener.name());
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn in_recovery(&self) -> bool {
        self.in_recovery.load(Ordering::Acquire)
    }

    /// Completed and running episodes since creation.
    pub fn episodes(&self) -> u64 {
        self.episodes.load(Ordering::Relaxed)
    }

    /// Run one recovery episode. A trigger arriving while an episode is
    /// already running is absorbed by it.
    pub fn do_recovery(&self) {
        if self.in_recovery.swap(true, Ordering::AcqRel) {
            warn!("Recovery already in progress, ignoring trigger");
            return;
        }
        let _episode = EpisodeGuard(&self.in_recovery);

        let episode = self.episodes.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_recovery();
        }

        // Listeners run without the registry lock held
        let listeners = self.listeners.read().clone();
        info!(
            episode,
            listeners = listeners.len(),
            "Starting worker recovery"
        );

        for listener in &listeners {
            debug!("Recovering '{}'", listener.name());
            listener.do_recovery();
        }

        info!(episode, "Worker recovery completed");
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryTrigger for RecoveryManager {
    fn trigger_recovery(&self) {
        self.do_recovery();
    }
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("listeners", &self.listener_count())
            .field("in_recovery", &self.in_recovery())
            .field("episodes", &self.episodes())
            .finish()
    }
}

struct EpisodeGuard<'a>(&'a AtomicBool);

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
