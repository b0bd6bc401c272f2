//! Default loader: local models via the Ollama server, the remote
//! fallback via the cloud service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{AnalysisBackend, BackendLoader, CloudBackend, CloudConfig, OllamaBackend};
use crate::Result;
use crate::registry::{BackendClass, BackendDescriptor};

/// Loader used by the engine in production wiring.
///
/// Local descriptors get an [`OllamaBackend`] that is warmed (weights
/// paged in) before the handle is returned; remote descriptors get a
/// [`CloudBackend`], whose "load" is free. One shared HTTP client keeps
/// a persistent connection pool across backends.
pub struct HttpBackendLoader {
    ollama_base_url: String,
    cloud: CloudConfig,
    http: reqwest::Client,
}

impl HttpBackendLoader {
    pub fn new(ollama_base_url: impl Into<String>, cloud: CloudConfig) -> Self {
        Self {
            ollama_base_url: ollama_base_url.into(),
            cloud,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl BackendLoader for HttpBackendLoader {
    async fn load(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn AnalysisBackend>> {
        match descriptor.class {
            BackendClass::Local => {
                debug!(backend = %descriptor.id, cost_mb = descriptor.memory_cost_mb, "warming local backend");
                let backend = OllamaBackend::new(
                    descriptor.id.clone(),
                    self.ollama_base_url.clone(),
                    self.http.clone(),
                );
                backend.warm_up().await?;
                Ok(Arc::new(backend))
            }
            BackendClass::Remote => {
                debug!(backend = %descriptor.id, "binding remote backend");
                Ok(Arc::new(CloudBackend::new(
                    descriptor.id.clone(),
                    self.cloud.clone(),
                    self.http.clone(),
                )))
            }
        }
    }
}
