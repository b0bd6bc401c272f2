//! Muninn - adaptive, memory-aware inference routing and cache engine
//!
//! Given a text request, muninn selects among local model backends of
//! increasing capability and memory cost plus one remote fallback,
//! keeps recently used local backends warm in a capacity-bounded cache,
//! shrinks oversized prompts to the chosen backend's limits, and runs a
//! self-tuning maintenance scheduler that relaxes its cadence as the
//! session ages.
//!
//! # Example
//!
//! ```rust,no_run
//! use muninn::{CloudConfig, Complexity, Muninn};
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let engine = Muninn::builder()
//!         .cloud(CloudConfig {
//!             base_url: "https://analysis.example.com".to_string(),
//!             api_key: Some("sk-your-key".to_string()),
//!         })
//!         .build()?;
//!
//!     let scheduler = engine.spawn_scheduler();
//!
//!     let reply = engine
//!         .submit("Compare blood pressure between treatment groups", Some(Complexity::Medium))
//!         .await?;
//!     println!("{} (served by {})", reply.text, reply.backend_id);
//!
//!     scheduler.stop().await;
//!     Ok(())
//! }
//! ```

pub mod backends;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod prompt;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod telemetry;

// Re-export main types at crate root
pub use config::OptimizationSettings;
pub use engine::{Engine, Muninn, MuninnBuilder};
pub use error::{BackendAttempt, MuninnError, Result};

// Re-export the seams and their production implementations
pub use backends::{
    AnalysisBackend, BackendLoader, CloudBackend, CloudConfig, HttpBackendLoader, OllamaBackend,
};
pub use cache::{BackendCache, CacheConfig};
pub use host::{HostMetrics, MemoryProfile, StaticMetrics, SystemMetrics};
pub use registry::{BackendClass, BackendDescriptor, BackendRegistry, CapabilityTier};
pub use router::{Complexity, InferenceRouter, RouteOutcome};
pub use scheduler::{AdaptiveScheduler, SchedulerEvent, SchedulerHandle, SchedulerPhase};
pub use session::{InteractionKind, SessionSnapshot, SessionTracker};
