//! Routing scenarios: memory-aware selection, fallback chain, aggregate
//! failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use muninn::{
    AnalysisBackend, BackendCache, BackendClass, BackendDescriptor, BackendLoader,
    BackendRegistry, CacheConfig, CapabilityTier, Complexity, InferenceRouter, MemoryProfile,
    MuninnError, OptimizationSettings, Result, StaticMetrics,
};

// ============================================================================
// Mock backends and loader
// ============================================================================

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    FailInvoke,
    Hang,
}

struct ScriptedBackend {
    id: String,
    behavior: Behavior,
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, _prompt: &str) -> Result<String> {
        match self.behavior {
            Behavior::Succeed => Ok(format!("answer from {}", self.id)),
            Behavior::FailInvoke => Err(MuninnError::Backend {
                backend: self.id.clone(),
                message: "model crashed".to_string(),
            }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok("too late".to_string())
            }
        }
    }
}

struct ScriptedLoader {
    behaviors: HashMap<String, Behavior>,
    loads: AtomicUsize,
}

impl ScriptedLoader {
    fn new(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
        Arc::new(Self {
            behaviors: behaviors
                .iter()
                .map(|(id, b)| (id.to_string(), *b))
                .collect(),
            loads: AtomicUsize::new(0),
        })
    }

    fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendLoader for ScriptedLoader {
    async fn load(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn AnalysisBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let behavior = *self
            .behaviors
            .get(&descriptor.id)
            .unwrap_or(&Behavior::Succeed);
        Ok(Arc::new(ScriptedBackend {
            id: descriptor.id.clone(),
            behavior,
        }))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Scenario catalog: locals costing 512/2048/4096 MB plus the
/// zero-cost remote.
fn scenario_registry() -> Arc<BackendRegistry> {
    Arc::new(
        BackendRegistry::new(vec![
            BackendDescriptor::new("small", CapabilityTier::Low, 512, BackendClass::Local, 4096),
            BackendDescriptor::new(
                "medium",
                CapabilityTier::Medium,
                2048,
                BackendClass::Local,
                8192,
            ),
            BackendDescriptor::new(
                "large",
                CapabilityTier::High,
                4096,
                BackendClass::Local,
                16384,
            ),
            BackendDescriptor::new(
                "remote",
                CapabilityTier::High,
                0,
                BackendClass::Remote,
                30_000,
            ),
        ])
        .unwrap(),
    )
}

fn router_with(
    registry: Arc<BackendRegistry>,
    loader: Arc<ScriptedLoader>,
    available_mb: u64,
    settings: OptimizationSettings,
) -> InferenceRouter {
    let host = Arc::new(StaticMetrics::new(MemoryProfile::new(8192, available_mb, 8)));
    let settings = Arc::new(settings);
    let cache = Arc::new(BackendCache::new(
        registry.clone(),
        host.clone(),
        loader,
        CacheConfig::from_settings(&settings),
    ));
    InferenceRouter::new(registry, cache, host, settings)
}

fn default_settings() -> OptimizationSettings {
    OptimizationSettings::default()
}

// ============================================================================
// Scenario A/B: memory-aware selection
// ============================================================================

#[tokio::test]
async fn scenario_a_selects_cheapest_affordable_backend() {
    let loader = ScriptedLoader::new(&[]);
    let router = router_with(scenario_registry(), loader.clone(), 1000, default_settings());

    let outcome = router.route("x", Some(Complexity::Low)).await.unwrap();
    assert_eq!(outcome.backend_id, "small");
    // Only the 512 MB backend was ever loaded
    assert_eq!(loader.load_count(), 1);
}

#[tokio::test]
async fn scenario_b_no_affordable_local_falls_to_remote() {
    let loader = ScriptedLoader::new(&[]);
    let router = router_with(scenario_registry(), loader.clone(), 100, default_settings());

    let outcome = router.route("x", Some(Complexity::Low)).await.unwrap();
    assert_eq!(outcome.backend_id, "remote");
    assert_eq!(loader.load_count(), 1);
}

#[tokio::test]
async fn metrics_failure_degrades_to_remote() {
    struct BrokenMetrics;
    impl muninn::HostMetrics for BrokenMetrics {
        fn sample(&self) -> Result<MemoryProfile> {
            Err(MuninnError::MetricsUnavailable("no /proc".to_string()))
        }
    }

    let registry = scenario_registry();
    let loader = ScriptedLoader::new(&[]);
    let settings = Arc::new(default_settings());
    let host = Arc::new(BrokenMetrics);
    let cache = Arc::new(BackendCache::new(
        registry.clone(),
        host.clone(),
        loader,
        CacheConfig::from_settings(&settings),
    ));
    let router = InferenceRouter::new(registry, cache, host, settings);

    // Zero assumed memory skips every local candidate
    let outcome = router.route("x", Some(Complexity::Low)).await.unwrap();
    assert_eq!(outcome.backend_id, "remote");
}

// ============================================================================
// Fallback chain
// ============================================================================

#[tokio::test]
async fn invocation_failures_advance_the_chain_in_order() {
    let loader = ScriptedLoader::new(&[
        ("small", Behavior::FailInvoke),
        ("medium", Behavior::FailInvoke),
        ("large", Behavior::Succeed),
    ]);
    let router = router_with(scenario_registry(), loader.clone(), 8000, default_settings());

    let outcome = router.route("x", Some(Complexity::Low)).await.unwrap();
    assert_eq!(outcome.backend_id, "large");
    assert_eq!(loader.load_count(), 3);
}

#[tokio::test]
async fn chain_terminates_at_remote() {
    let loader = ScriptedLoader::new(&[
        ("small", Behavior::FailInvoke),
        ("medium", Behavior::FailInvoke),
        ("large", Behavior::FailInvoke),
    ]);
    let router = router_with(scenario_registry(), loader.clone(), 8000, default_settings());

    let outcome = router.route("x", Some(Complexity::Low)).await.unwrap();
    assert_eq!(outcome.backend_id, "remote");
}

#[tokio::test]
async fn aggregate_error_names_every_attempted_backend() {
    let loader = ScriptedLoader::new(&[
        ("small", Behavior::FailInvoke),
        ("medium", Behavior::FailInvoke),
        ("large", Behavior::FailInvoke),
        ("remote", Behavior::FailInvoke),
    ]);
    let router = router_with(scenario_registry(), loader.clone(), 8000, default_settings());

    let err = router.route("x", Some(Complexity::Low)).await.unwrap_err();
    match err {
        MuninnError::AllBackendsFailed { attempts } => {
            let ids: Vec<_> = attempts.iter().map(|a| a.backend_id.as_str()).collect();
            assert_eq!(ids, vec!["small", "medium", "large", "remote"]);
        }
        other => panic!("expected AllBackendsFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn unaffordable_candidates_appear_in_the_aggregate_error() {
    let loader = ScriptedLoader::new(&[("remote", Behavior::FailInvoke)]);
    let router = router_with(scenario_registry(), loader.clone(), 100, default_settings());

    let err = router.route("x", Some(Complexity::Low)).await.unwrap_err();
    match err {
        MuninnError::AllBackendsFailed { attempts } => {
            assert_eq!(attempts.len(), 4);
            assert!(attempts[0].reason.contains("MB available"));
        }
        other => panic!("expected AllBackendsFailed, got {other:?}"),
    }
    // Skipped candidates were never loaded; only remote was
    assert_eq!(loader.load_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_is_treated_as_invocation_failure() {
    let loader = ScriptedLoader::new(&[("small", Behavior::Hang)]);
    let settings = OptimizationSettings {
        request_timeout_seconds: 1,
        ..Default::default()
    };
    let router = router_with(scenario_registry(), loader.clone(), 1000, settings);

    let outcome = router.route("x", Some(Complexity::Low)).await.unwrap();
    // small hung past the deadline; medium/large are unaffordable at
    // 1000 MB, so the remote serves
    assert_eq!(outcome.backend_id, "remote");
}

// ============================================================================
// Tier handling
// ============================================================================

#[tokio::test]
async fn higher_tier_hint_skips_low_tier_locals() {
    let loader = ScriptedLoader::new(&[]);
    let router = router_with(scenario_registry(), loader.clone(), 8000, default_settings());

    let outcome = router.route("x", Some(Complexity::High)).await.unwrap();
    assert_eq!(outcome.backend_id, "large");
}

#[tokio::test]
async fn tier_without_local_candidates_falls_to_remote() {
    let registry = Arc::new(
        BackendRegistry::new(vec![
            BackendDescriptor::new(
                "only-low",
                CapabilityTier::Low,
                512,
                BackendClass::Local,
                4096,
            ),
            BackendDescriptor::new(
                "remote",
                CapabilityTier::High,
                0,
                BackendClass::Remote,
                30_000,
            ),
        ])
        .unwrap(),
    );
    let loader = ScriptedLoader::new(&[]);
    let router = router_with(registry, loader.clone(), 8000, default_settings());

    let outcome = router.route("x", Some(Complexity::High)).await.unwrap();
    assert_eq!(outcome.backend_id, "remote");
}

#[tokio::test]
async fn empty_prompt_still_goes_through_selection() {
    let loader = ScriptedLoader::new(&[]);
    let router = router_with(scenario_registry(), loader.clone(), 8000, default_settings());

    let outcome = router.route("", Some(Complexity::Low)).await.unwrap();
    assert_eq!(outcome.backend_id, "small");
    assert!(!outcome.truncated);
}

// ============================================================================
// Cache interplay
// ============================================================================

#[tokio::test]
async fn second_request_reuses_the_warm_backend() {
    let loader = ScriptedLoader::new(&[]);
    let router = router_with(scenario_registry(), loader.clone(), 8000, default_settings());

    let first = router.route("x", Some(Complexity::Low)).await.unwrap();
    let second = router.route("y", Some(Complexity::Low)).await.unwrap();

    assert_eq!(first.backend_id, second.backend_id);
    assert_eq!(loader.load_count(), 1);
}

#[tokio::test]
async fn oversized_prompt_is_truncated_for_the_selected_backend() {
    let loader = ScriptedLoader::new(&[]);
    let router = router_with(scenario_registry(), loader.clone(), 8000, default_settings());

    let prompt = format!("User: {}", "x".repeat(10_000));
    let outcome = router.route(&prompt, Some(Complexity::Low)).await.unwrap();
    assert_eq!(outcome.backend_id, "small");
    assert!(outcome.truncated);
}
