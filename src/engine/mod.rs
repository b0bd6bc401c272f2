//! Engine facade: the surface a request source talks to.

mod builder;

pub use builder::{Muninn, MuninnBuilder};

use std::sync::Arc;

use tracing::instrument;

use crate::cache::BackendCache;
use crate::host::HostMetrics;
use crate::registry::BackendRegistry;
use crate::router::{Complexity, InferenceRouter, RouteOutcome};
use crate::scheduler::{AdaptiveScheduler, SchedulerHandle};
use crate::session::{InteractionKind, SessionSnapshot, SessionTracker};
use crate::{OptimizationSettings, Result};

/// One assembled routing engine.
///
/// Holds no ambient globals: registry, cache, session and scheduler are
/// explicit instances, so tests and embedders can run several engines
/// side by side.
pub struct Engine {
    registry: Arc<BackendRegistry>,
    cache: Arc<BackendCache>,
    session: Arc<SessionTracker>,
    host: Arc<dyn HostMetrics>,
    settings: Arc<OptimizationSettings>,
    router: InferenceRouter,
    reclaim_hint: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        registry: Arc<BackendRegistry>,
        cache: Arc<BackendCache>,
        session: Arc<SessionTracker>,
        host: Arc<dyn HostMetrics>,
        settings: Arc<OptimizationSettings>,
        reclaim_hint: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Self {
        let router = InferenceRouter::new(
            registry.clone(),
            cache.clone(),
            host.clone(),
            settings.clone(),
        );
        Self {
            registry,
            cache,
            session,
            host,
            settings,
            router,
            reclaim_hint,
        }
    }

    /// Route one request.
    ///
    /// Without a hint the complexity is inferred from the prompt text.
    /// Either succeeds — possibly via a lower-capability or remote
    /// backend, transparently — or fails once with an aggregate error
    /// naming every attempted backend.
    #[instrument(skip(self, prompt_text))]
    pub async fn submit(
        &self,
        prompt_text: &str,
        hint: Option<Complexity>,
    ) -> Result<RouteOutcome> {
        self.session.record_interaction(InteractionKind::Message);
        let hint = hint.unwrap_or_else(|| Complexity::infer(prompt_text));
        self.router.route(prompt_text, Some(hint)).await
    }

    /// Record a dataset/file handed to the surrounding system, for
    /// session bookkeeping only.
    pub fn record_file_ingested(&self) {
        self.session.record_interaction(InteractionKind::FileUpload);
    }

    /// Explicitly drop every warm handle. Returns how many were freed.
    pub fn free_memory(&self) -> usize {
        self.cache.clear()
    }

    /// Start the maintenance scheduler on the current runtime.
    ///
    /// The returned handle carries the shutdown signal and the advisory
    /// event channel; dropping it stops the loop at its next wakeup.
    pub fn spawn_scheduler(&self) -> SchedulerHandle {
        let hint = self.reclaim_hint.clone().map(|f| {
            Box::new(move || f()) as Box<dyn Fn() + Send + Sync>
        });
        AdaptiveScheduler::spawn(
            self.session.clone(),
            self.cache.clone(),
            self.host.clone(),
            self.settings.clone(),
            hint,
        )
    }

    /// Current session counters.
    pub fn session(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// The backend catalog this engine routes over.
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// The warm-handle cache (for diagnostics).
    pub fn cache(&self) -> &BackendCache {
        &self.cache
    }
}
