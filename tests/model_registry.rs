//! Model registry integration tests
//!
//! Exercises lazy loading, concurrent access and idle eviction through the
//! public API with a slow stub loader standing in for model weights.

use async_trait::async_trait;
use qa_server::{
    IdleEvictor, QaError,
    config::{ModelSpec, ServerConfig},
    device::ComputeDevice,
    models::{LoadError, ModelRegistry, PipelineLoader},
    pipeline::{InferenceError, QaPipeline, SpanAnswer},
    qa::QaService,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Echoes the whole context as the answer
struct Echo;

impl QaPipeline for Echo {
    fn infer(&self, _question: &str, context: &str) -> Result<SpanAnswer, InferenceError> {
        Ok(SpanAnswer {
            answer: context.to_string(),
            score: 0.5,
            start: 0,
            end: context.len(),
        })
    }
}

/// Loader that takes a while and counts loads per call
struct SlowLoader {
    delay: Duration,
    loads: AtomicUsize,
}

impl SlowLoader {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            loads: AtomicUsize::new(0),
        }
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineLoader for SlowLoader {
    async fn load(
        &self,
        _spec: &ModelSpec,
        _device: ComputeDevice,
    ) -> Result<Arc<dyn QaPipeline>, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Arc::new(Echo))
    }
}

fn create_registry(loader: Arc<SlowLoader>) -> Arc<ModelRegistry> {
    Arc::new(
        ModelRegistry::with_models(
            vec![
                ModelSpec::new("alpha-qa", "Alpha"),
                ModelSpec::new("beta-qa", "Beta"),
            ],
            "alpha-qa".to_string(),
            loader,
            ComputeDevice::Cpu,
        )
        .expect("Failed to build registry"),
    )
}

#[tokio::test]
async fn test_loaded_flag_follows_ensure_loaded() {
    let loader = Arc::new(SlowLoader::new(Duration::from_millis(5)));
    let registry = create_registry(loader.clone());

    assert!(!registry.is_loaded("alpha-qa"));
    assert_eq!(registry.loaded_count(), 0);

    registry.ensure_loaded("alpha-qa").await.unwrap();

    assert!(registry.is_loaded("alpha-qa"));
    assert!(!registry.is_loaded("beta-qa"));
    assert_eq!(registry.loaded_count(), 1);

    // Already loaded: no second load
    registry.ensure_loaded("alpha-qa").await.unwrap();
    assert_eq!(loader.loads(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ensure_loaded_loads_once() {
    let loader = Arc::new(SlowLoader::new(Duration::from_millis(50)));
    let registry = create_registry(loader.clone());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.ensure_loaded("beta-qa").await })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.expect("task panicked").expect("load failed");
    }

    assert_eq!(loader.loads(), 1);
    assert!(registry.is_loaded("beta-qa"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_answers_share_one_load() {
    let loader = Arc::new(SlowLoader::new(Duration::from_millis(20)));
    let registry = create_registry(loader.clone());
    let qa = QaService::new(registry.clone());

    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let qa = qa.clone();
            tokio::spawn(async move {
                qa.answer("Which?", &format!("context number {i}"), None)
                    .await
            })
        })
        .collect();

    for (i, result) in futures::future::join_all(tasks).await.into_iter().enumerate() {
        let answer = result.expect("task panicked").expect("answer failed");
        assert_eq!(answer.answer, format!("context number {i}"));
        assert_eq!(answer.model_used, "alpha-qa");
    }

    assert_eq!(loader.loads(), 1);
}

#[tokio::test]
async fn test_unknown_model_never_loads() {
    let loader = Arc::new(SlowLoader::new(Duration::from_millis(1)));
    let registry = create_registry(loader.clone());

    let err = registry.ensure_loaded("gamma-qa").await.unwrap_err();
    assert!(matches!(err, QaError::UnknownModel(ref id) if id == "gamma-qa"));

    let err = QaService::new(registry.clone())
        .answer("q", "ctx", Some("gamma"))
        .await
        .unwrap_err();
    assert!(matches!(err, QaError::UnknownModel(_)));

    assert_eq!(loader.loads(), 0);
    assert_eq!(registry.loaded_count(), 0);
}

#[tokio::test]
async fn test_eviction_skips_model_with_inflight_inference() {
    let loader = Arc::new(SlowLoader::new(Duration::from_millis(1)));
    let registry = create_registry(loader.clone());

    let lease = registry.acquire("alpha-qa").await.unwrap();
    assert_eq!(lease.model_id(), "alpha-qa");
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Idle long enough, but the lease pins it
    let evicted = registry.evict_idle(Duration::from_millis(5)).await;
    assert!(evicted.is_empty());
    assert!(registry.is_loaded("alpha-qa"));

    // The pinned pipeline is still usable
    let span = lease.pipeline().infer("q", "still here").unwrap();
    assert_eq!(span.answer, "still here");
    drop(lease);

    let evicted = registry.evict_idle(Duration::from_millis(5)).await;
    assert_eq!(evicted, vec!["alpha-qa".to_string()]);
    assert!(!registry.is_loaded("alpha-qa"));

    // Next use reloads transparently
    registry.acquire("alpha-qa").await.unwrap();
    assert_eq!(loader.loads(), 2);
}

#[tokio::test]
async fn test_recently_used_model_survives_sweep() {
    let loader = Arc::new(SlowLoader::new(Duration::from_millis(1)));
    let registry = create_registry(loader);

    registry.ensure_loaded("alpha-qa").await.unwrap();
    registry.ensure_loaded("beta-qa").await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    registry.touch("beta-qa").await;

    let evicted = registry.evict_idle(Duration::from_millis(40)).await;
    assert_eq!(evicted, vec!["alpha-qa".to_string()]);
    assert!(registry.is_loaded("beta-qa"));

    tokio::time::sleep(Duration::from_millis(5)).await;
    let evictor = IdleEvictor::new(registry.clone(), 0, 1);
    let swept = evictor.sweep().await;
    assert_eq!(swept, vec!["beta-qa".to_string()]);
    assert_eq!(registry.loaded_count(), 0);
}

#[tokio::test]
async fn test_shutdown_unloads_everything() {
    let loader = Arc::new(SlowLoader::new(Duration::from_millis(1)));
    let registry = create_registry(loader);

    registry.ensure_loaded("alpha-qa").await.unwrap();
    registry.ensure_loaded("beta-qa").await.unwrap();
    assert_eq!(registry.loaded_count(), 2);

    registry.shutdown().await;

    assert_eq!(registry.loaded_count(), 0);
    let models = registry.list().await;
    assert!(models.iter().all(|m| !m.is_loaded));
}

#[tokio::test]
async fn test_registry_from_default_config() {
    let config = ServerConfig::default();
    let loader = Arc::new(SlowLoader::new(Duration::from_millis(1)));
    let registry = ModelRegistry::new(&config, loader, ComputeDevice::Cpu).unwrap();

    let models = registry.list().await;
    assert_eq!(models.len(), config.models.len());
    assert_eq!(registry.default_model(), config.default_model);
    assert!(models.iter().any(|m| m.model_id == config.default_model));
    assert!(models.iter().all(|m| !m.description.is_empty()));
}

#[tokio::test]
async fn test_default_model_must_be_registered() {
    let loader = Arc::new(SlowLoader::new(Duration::from_millis(1)));
    let result = ModelRegistry::with_models(
        vec![ModelSpec::new("alpha-qa", "Alpha")],
        "missing-qa".to_string(),
        loader,
        ComputeDevice::Cpu,
    );
    assert!(result.is_err());
}
