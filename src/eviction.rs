//! Background unloading of idle models

use crate::models::ModelRegistry;
use std::sync::Arc;
use tokio::time::{Duration, interval};

/// Periodically unloads models nobody has used for a while
pub struct IdleEvictor {
    registry: Arc<ModelRegistry>,
    idle_threshold: Duration,
    check_interval: Duration,
}

impl IdleEvictor {
    pub fn new(registry: Arc<ModelRegistry>, idle_threshold_secs: u64, check_interval_secs: u64) -> Self {
        Self {
            registry,
            idle_threshold: Duration::from_secs(idle_threshold_secs),
            check_interval: Duration::from_secs(check_interval_secs),
        }
    }

    /// Start the eviction loop
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.check_interval);
        // The first tick completes immediately
        ticker.tick().await;

        tracing::info!(
            idle_threshold_secs = self.idle_threshold.as_secs(),
            interval_secs = self.check_interval.as_secs(),
            "Idle model eviction started"
        );

        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// One eviction pass; returns the unloaded model ids
    pub async fn sweep(&self) -> Vec<String> {
        let evicted = self.registry.evict_idle(self.idle_threshold).await;
        if !evicted.is_empty() {
            tracing::info!(
                evicted = ?evicted,
                remaining = self.registry.loaded_count(),
                "Idle models unloaded"
            );
        }
        evicted
    }
}
