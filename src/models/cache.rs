//! Loaded-pipeline cache
//!
//! One slot per catalog entry. A slot is either empty or holds exactly one
//! pipeline; loading and unloading take the slot's write lock, inference
//! holds a read lease for the whole call. Idle eviction only ever tries the
//! write lock, so a model with a call in flight is skipped rather than
//! waited on.

use crate::pipeline::QaPipeline;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedRwLockReadGuard, RwLock};

type PipelineCell = Option<Arc<dyn QaPipeline>>;

/// When a loaded pipeline may be dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvictionPolicy {
    /// Unused for longer than this means evictable; `None` keeps everything
    pub idle_threshold: Option<Duration>,
}

impl EvictionPolicy {
    pub fn idle_for(threshold: Duration) -> Self {
        Self {
            idle_threshold: Some(threshold),
        }
    }

    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_expired(&self, idle: Duration) -> bool {
        self.idle_threshold.is_some_and(|threshold| idle > threshold)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SlotStats {
    loaded_at: Option<Instant>,
    last_used_at: Option<Instant>,
    last_used: Option<DateTime<Utc>>,
}

struct Slot {
    cell: Arc<RwLock<PipelineCell>>,
    /// Mirrors `cell.is_some()` so listings never wait on a lock
    loaded: AtomicBool,
    stats: Mutex<SlotStats>,
}

impl Slot {
    fn new() -> Self {
        Self {
            cell: Arc::new(RwLock::new(None)),
            loaded: AtomicBool::new(false),
            stats: Mutex::new(SlotStats::default()),
        }
    }
}

/// Shared access to a loaded pipeline
///
/// While any lease is alive the pipeline cannot be unloaded.
pub struct PipelineLease {
    model_id: String,
    pipeline: Arc<dyn QaPipeline>,
    _guard: OwnedRwLockReadGuard<PipelineCell>,
}

impl PipelineLease {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn pipeline(&self) -> &dyn QaPipeline {
        self.pipeline.as_ref()
    }
}

impl std::fmt::Debug for PipelineLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLease")
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

/// Usage snapshot for one slot
#[derive(Debug, Clone, Copy)]
pub struct SlotUsage {
    pub is_loaded: bool,
    pub last_used: Option<DateTime<Utc>>,
}

pub struct PipelineCache {
    slots: HashMap<String, Slot>,
}

impl PipelineCache {
    /// Create empty slots for every known model
    pub fn new<I, S>(model_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            slots: model_ids
                .into_iter()
                .map(|id| (id.into(), Slot::new()))
                .collect(),
        }
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.slots.contains_key(model_id)
    }

    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.slots
            .get(model_id)
            .is_some_and(|slot| slot.loaded.load(Ordering::Acquire))
    }

    pub fn loaded_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.loaded.load(Ordering::Acquire))
            .count()
    }

    pub async fn usage(&self, model_id: &str) -> Option<SlotUsage> {
        let slot = self.slots.get(model_id)?;
        let stats = slot.stats.lock().await;
        Some(SlotUsage {
            is_loaded: slot.loaded.load(Ordering::Acquire),
            last_used: stats.last_used,
        })
    }

    /// Load the pipeline for `model_id` unless it is already present
    ///
    /// Concurrent callers for the same model queue on the slot's write lock,
    /// so `load` runs at most once per empty slot. Returns `Ok(None)` when the
    /// model is not in the cache, `Ok(Some(true))` when this call loaded it.
    pub async fn get_or_load<F, Fut, E>(&self, model_id: &str, load: F) -> Result<Option<bool>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn QaPipeline>, E>>,
    {
        let Some(slot) = self.slots.get(model_id) else {
            return Ok(None);
        };

        if slot.loaded.load(Ordering::Acquire) {
            return Ok(Some(false));
        }

        let mut cell = slot.cell.write().await;
        if cell.is_some() {
            return Ok(Some(false));
        }

        let pipeline = load().await?;
        *cell = Some(pipeline);
        slot.loaded.store(true, Ordering::Release);

        let mut stats = slot.stats.lock().await;
        stats.loaded_at = Some(Instant::now());
        stats.last_used_at = None;

        Ok(Some(true))
    }

    /// Take a read lease on a loaded pipeline; `None` if the slot is empty
    pub async fn lease(&self, model_id: &str) -> Option<PipelineLease> {
        let slot = self.slots.get(model_id)?;
        let guard = slot.cell.clone().read_owned().await;
        let pipeline = guard.as_ref()?.clone();
        Some(PipelineLease {
            model_id: model_id.to_string(),
            pipeline,
            _guard: guard,
        })
    }

    /// Record a successful inference
    pub async fn touch(&self, model_id: &str) {
        if let Some(slot) = self.slots.get(model_id) {
            let mut stats = slot.stats.lock().await;
            stats.last_used_at = Some(Instant::now());
            stats.last_used = Some(Utc::now());
        }
    }

    /// Drop every pipeline the policy considers expired at `now`
    ///
    /// Idle time counts from the last inference, or from load time for a
    /// model that has never answered. Slots with an active lease are left
    /// alone. Returns the evicted model ids.
    pub async fn evict_expired(&self, policy: &EvictionPolicy, now: Instant) -> Vec<String> {
        let mut evicted = Vec::new();

        for (model_id, slot) in &self.slots {
            if !slot.loaded.load(Ordering::Acquire) {
                continue;
            }

            let idle = {
                let stats = slot.stats.lock().await;
                match stats.last_used_at.or(stats.loaded_at) {
                    Some(since) => now.saturating_duration_since(since),
                    None => continue,
                }
            };

            if !policy.is_expired(idle) {
                continue;
            }

            let Ok(mut cell) = slot.cell.try_write() else {
                tracing::debug!(model_id = %model_id, "Skipping eviction, model in use");
                continue;
            };

            if cell.take().is_some() {
                slot.loaded.store(false, Ordering::Release);
                let mut stats = slot.stats.lock().await;
                stats.loaded_at = None;
                stats.last_used_at = None;
                tracing::info!(
                    model_id = %model_id,
                    idle_secs = idle.as_secs(),
                    "Evicted idle model"
                );
                evicted.push(model_id.clone());
            }
        }

        evicted
    }

    /// Unload one model, waiting for in-flight calls to finish
    pub async fn unload(&self, model_id: &str) -> bool {
        let Some(slot) = self.slots.get(model_id) else {
            return false;
        };

        let mut cell = slot.cell.write().await;
        let was_loaded = cell.take().is_some();
        slot.loaded.store(false, Ordering::Release);

        let mut stats = slot.stats.lock().await;
        stats.loaded_at = None;
        stats.last_used_at = None;

        was_loaded
    }

    /// Unload everything
    pub async fn clear(&self) -> usize {
        let mut count = 0;
        for model_id in self.slots.keys() {
            if self.unload(model_id).await {
                count += 1;
            }
        }
        count
    }
}
