//! Engine facade: builder wiring, submission, session bookkeeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use muninn::{
    AnalysisBackend, BackendClass, BackendDescriptor, BackendLoader, BackendRegistry,
    CapabilityTier, Complexity, Engine, MemoryProfile, MuninnError, Muninn, OptimizationSettings,
    Result, StaticMetrics,
};

struct TierEchoBackend {
    id: String,
}

#[async_trait]
impl AnalysisBackend for TierEchoBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, _prompt: &str) -> Result<String> {
        Ok(format!("served by {}", self.id))
    }
}

struct EchoLoader {
    loads: AtomicUsize,
}

impl EchoLoader {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            loads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BackendLoader for EchoLoader {
    async fn load(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn AnalysisBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TierEchoBackend {
            id: descriptor.id.clone(),
        }))
    }
}

fn tiered_registry() -> BackendRegistry {
    BackendRegistry::new(vec![
        BackendDescriptor::new("low", CapabilityTier::Low, 512, BackendClass::Local, 256),
        BackendDescriptor::new(
            "medium",
            CapabilityTier::Medium,
            1024,
            BackendClass::Local,
            4096,
        ),
        BackendDescriptor::new("high", CapabilityTier::High, 2048, BackendClass::Local, 8192),
        BackendDescriptor::new(
            "cloud",
            CapabilityTier::High,
            0,
            BackendClass::Remote,
            30_000,
        ),
    ])
    .unwrap()
}

fn engine() -> Engine {
    Muninn::builder()
        .registry(tiered_registry())
        .host_metrics(Arc::new(StaticMetrics::new(MemoryProfile::new(
            16_384, 8192, 8,
        ))))
        .loader(EchoLoader::new())
        .settings(OptimizationSettings::default())
        .build()
        .unwrap()
}

#[tokio::test]
async fn submit_serves_and_reports_the_backend() {
    let engine = engine();
    let reply = engine
        .submit("what is the mean age", Some(Complexity::Low))
        .await
        .unwrap();
    assert_eq!(reply.backend_id, "low");
    assert_eq!(reply.text, "served by low");
}

#[tokio::test]
async fn missing_hint_is_inferred_from_the_prompt() {
    let engine = engine();

    // "regression" triggers the high-complexity heuristic
    let reply = engine
        .submit("run regression modeling on the cohort", None)
        .await
        .unwrap();
    assert_eq!(reply.backend_id, "high");

    // Plain lookup stays on the cheapest backend
    let reply = engine.submit("what is the median", None).await.unwrap();
    assert_eq!(reply.backend_id, "low");
}

#[tokio::test]
async fn submissions_are_counted_in_the_session() {
    let engine = engine();
    engine.submit("a", None).await.unwrap();
    engine.submit("b", None).await.unwrap();
    engine.record_file_ingested();

    let session = engine.session();
    assert_eq!(session.message_count, 2);
    assert_eq!(session.file_count, 1);
}

#[tokio::test]
async fn long_prompt_is_truncated_for_a_tight_backend() {
    let engine = engine();
    // "low" accepts 256 chars; this prompt is far over
    let prompt = format!("User: {}", "w".repeat(2000));
    let reply = engine.submit(&prompt, Some(Complexity::Low)).await.unwrap();
    assert_eq!(reply.backend_id, "low");
    assert!(reply.truncated);
}

#[tokio::test]
async fn free_memory_drops_warm_handles() {
    let engine = engine();
    engine.submit("a", Some(Complexity::Low)).await.unwrap();
    assert!(engine.cache().is_warm("low"));

    assert_eq!(engine.free_memory(), 1);
    assert!(!engine.cache().is_warm("low"));
}

#[test]
fn builder_without_cloud_or_loader_is_rejected() {
    let result = Muninn::builder()
        .settings(OptimizationSettings::default())
        .build();
    assert!(matches!(result, Err(MuninnError::Configuration(_))));
}

#[test]
fn builder_rejects_invalid_settings() {
    let settings = OptimizationSettings {
        memory_pressure_threshold_pct: 250.0,
        ..Default::default()
    };
    let result = Muninn::builder()
        .loader(EchoLoader::new())
        .settings(settings)
        .build();
    assert!(matches!(result, Err(MuninnError::Configuration(_))));
}

#[tokio::test]
async fn independent_engines_do_not_share_cache_state() {
    let a = engine();
    let b = engine();

    a.submit("x", Some(Complexity::Low)).await.unwrap();
    assert!(a.cache().is_warm("low"));
    assert!(!b.cache().is_warm("low"));
}
