//! Analysis backend implementations and seams.
//!
//! Every selectable inference target — local model process or remote API —
//! implements the one [`AnalysisBackend`] capability interface, so the
//! router only ever deals in descriptors and handles, never in
//! environment checks. [`BackendLoader`] is the seam through which the
//! cache materialises warm handles; tests substitute counting loaders to
//! observe load deduplication.

mod loader;
mod local;
mod remote;

pub use loader::HttpBackendLoader;
pub use local::{DEFAULT_OLLAMA_URL, OllamaBackend};
pub use remote::{CloudBackend, CloudConfig};

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::registry::BackendDescriptor;

/// Uniform invocation interface over one backend.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// The backend id this handle serves.
    fn id(&self) -> &str;

    /// Execute one optimized prompt and return the result text.
    ///
    /// Fails with `BackendUnavailable`, `BackendTimeout`, or `Backend`;
    /// the router treats all three as "try the next candidate".
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

/// Materialises a warm, ready-to-invoke handle for a descriptor.
///
/// Called by the cache exactly once per cold backend regardless of how
/// many requests are waiting; every call is an observable load.
#[async_trait]
pub trait BackendLoader: Send + Sync {
    async fn load(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn AnalysisBackend>>;
}
