//! Builder for assembling engine instances.

use std::sync::Arc;

use super::Engine;
use crate::backends::{BackendLoader, CloudConfig, DEFAULT_OLLAMA_URL, HttpBackendLoader};
use crate::cache::{BackendCache, CacheConfig};
use crate::host::{HostMetrics, SystemMetrics};
use crate::registry::BackendRegistry;
use crate::session::SessionTracker;
use crate::{MuninnError, OptimizationSettings, Result};

/// Main entry point for creating engine instances.
pub struct Muninn;

impl Muninn {
    /// Create a new builder for configuring the engine.
    pub fn builder() -> MuninnBuilder {
        MuninnBuilder::new()
    }
}

/// Builder for configuring engine instances.
///
/// Every collaborator can be substituted; what is not provided falls
/// back to production wiring (system metrics, HTTP loader, the default
/// catalog, settings from file + environment).
pub struct MuninnBuilder {
    settings: Option<OptimizationSettings>,
    registry: Option<BackendRegistry>,
    host: Option<Arc<dyn HostMetrics>>,
    loader: Option<Arc<dyn BackendLoader>>,
    ollama_url: Option<String>,
    cloud: Option<CloudConfig>,
    reclaim_hint: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl MuninnBuilder {
    pub fn new() -> Self {
        Self {
            settings: None,
            registry: None,
            host: None,
            loader: None,
            ollama_url: None,
            cloud: None,
            reclaim_hint: None,
        }
    }

    /// Use explicit settings instead of file + environment resolution.
    pub fn settings(mut self, settings: OptimizationSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Route over a custom backend catalog.
    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Substitute the host metrics provider.
    pub fn host_metrics(mut self, host: Arc<dyn HostMetrics>) -> Self {
        self.host = Some(host);
        self
    }

    /// Substitute the backend loader (tests, exotic runtimes).
    pub fn loader(mut self, loader: Arc<dyn BackendLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Local model server URL (default: `http://localhost:11434`).
    pub fn ollama_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = Some(url.into());
        self
    }

    /// Remote analysis service connection.
    pub fn cloud(mut self, config: CloudConfig) -> Self {
        self.cloud = Some(config);
        self
    }

    /// Best-effort host memory reclamation hook, fired on the deep
    /// cleanup path. Skipping this is a no-op, never an error.
    pub fn reclaim_hint(mut self, hint: impl Fn() + Send + Sync + 'static) -> Self {
        self.reclaim_hint = Some(Arc::new(hint));
        self
    }

    /// Assemble the engine.
    pub fn build(self) -> Result<Engine> {
        let settings = match self.settings {
            Some(s) => {
                s.validate()?;
                s
            }
            None => OptimizationSettings::load(None)?,
        };
        let settings = Arc::new(settings);

        let registry = Arc::new(match self.registry {
            Some(r) => r,
            None => BackendRegistry::with_default_catalog(),
        });

        let host: Arc<dyn HostMetrics> = match self.host {
            Some(h) => h,
            None => Arc::new(SystemMetrics::new()),
        };

        let loader: Arc<dyn BackendLoader> = match self.loader {
            Some(l) => l,
            None => {
                let cloud = self.cloud.ok_or_else(|| {
                    MuninnError::Configuration(
                        "remote fallback requires cloud configuration (or a custom loader)"
                            .to_string(),
                    )
                })?;
                let ollama_url = self
                    .ollama_url
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
                Arc::new(HttpBackendLoader::new(ollama_url, cloud))
            }
        };

        let cache = Arc::new(BackendCache::new(
            registry.clone(),
            host.clone(),
            loader,
            CacheConfig::from_settings(&settings),
        ));
        let session = Arc::new(SessionTracker::new());

        Ok(Engine::new(
            registry,
            cache,
            session,
            host,
            settings,
            self.reclaim_hint,
        ))
    }
}

impl Default for MuninnBuilder {
    fn default() -> Self {
        Self::new()
    }
}
