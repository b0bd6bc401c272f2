//! Inference routing with a memory-aware fallback chain.
//!
//! For one request the router walks the registry's candidates in order
//! (cheapest capable local backend first, remote last) and returns the
//! first successful invocation. Everything below it recovers locally:
//! a failed host sample degrades to "no memory available", an
//! unaffordable candidate is skipped before acquisition, and any
//! backend failure or timeout advances the chain. Only when every
//! candidate including the remote fallback has failed does the caller
//! see an error, and that error lists every attempt.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::cache::BackendCache;
use crate::config::OptimizationSettings;
use crate::host::{HostMetrics, MemoryProfile};
use crate::prompt;
use crate::registry::{BackendClass, BackendRegistry, CapabilityTier};
use crate::telemetry;
use crate::{BackendAttempt, MuninnError, Result};

/// Request complexity hint, mapped one-to-one onto the minimum
/// capability tier a candidate must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    /// Keyword heuristic used when a request arrives without a hint:
    /// modelling vocabulary implies a capable backend, analytic
    /// vocabulary a mid-tier one, anything else the cheapest.
    pub fn infer(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        const HIGH: &[&str] = &["machine learning", "regression", "correlation matrix"];
        const MEDIUM: &[&str] = &["analysis", "compare", "statistical"];
        if HIGH.iter().any(|kw| lower.contains(kw)) {
            Complexity::High
        } else if MEDIUM.iter().any(|kw| lower.contains(kw)) {
            Complexity::Medium
        } else {
            Complexity::Low
        }
    }

    fn min_tier(self) -> CapabilityTier {
        match self {
            Complexity::Low => CapabilityTier::Low,
            Complexity::Medium => CapabilityTier::Medium,
            Complexity::High => CapabilityTier::High,
        }
    }
}

/// A successfully routed request.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    /// Result text from the backend that served the request.
    pub text: String,
    /// Which backend served it (possibly a lower tier or the remote
    /// fallback than the hint asked for).
    pub backend_id: String,
    /// Whether the prompt was shrunk to fit the backend's limit.
    pub truncated: bool,
}

/// The decision core: candidate selection, acquisition, invocation,
/// and multi-tier fallback.
pub struct InferenceRouter {
    registry: Arc<BackendRegistry>,
    cache: Arc<BackendCache>,
    host: Arc<dyn HostMetrics>,
    settings: Arc<OptimizationSettings>,
}

impl InferenceRouter {
    pub fn new(
        registry: Arc<BackendRegistry>,
        cache: Arc<BackendCache>,
        host: Arc<dyn HostMetrics>,
        settings: Arc<OptimizationSettings>,
    ) -> Self {
        Self {
            registry,
            cache,
            host,
            settings,
        }
    }

    /// Route one request to the cheapest capable backend.
    ///
    /// `hint` defaults to [`Complexity::Low`] when absent. An empty
    /// prompt goes through the same selection as any other.
    #[instrument(skip(self, prompt_text), fields(hint = ?hint))]
    pub async fn route(
        &self,
        prompt_text: &str,
        hint: Option<Complexity>,
    ) -> Result<RouteOutcome> {
        let start = Instant::now();
        let profile = self.sample_degraded();
        let min_tier = hint.unwrap_or(Complexity::Low).min_tier();
        let candidates = self.registry.candidates(min_tier);

        let mut attempts: Vec<BackendAttempt> = Vec::with_capacity(candidates.len());
        for descriptor in candidates {
            // Cheap pre-filter: skip candidates that cannot fit before
            // paying for an acquire. Remote costs zero and never skips.
            if descriptor.class == BackendClass::Local
                && descriptor.memory_cost_mb > profile.available_mb
            {
                debug!(
                    backend = %descriptor.id,
                    cost_mb = descriptor.memory_cost_mb,
                    available_mb = profile.available_mb,
                    "skipping candidate, over available memory"
                );
                attempts.push(BackendAttempt {
                    backend_id: descriptor.id.clone(),
                    reason: format!(
                        "needs {} MB, {} MB available",
                        descriptor.memory_cost_mb, profile.available_mb
                    ),
                });
                continue;
            }

            let backend = match self.cache.acquire(&descriptor.id).await {
                Ok(backend) => backend,
                Err(e) => {
                    self.record_fallback(&descriptor.id);
                    attempts.push(BackendAttempt {
                        backend_id: descriptor.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let optimized = prompt::optimize(prompt_text, descriptor, &self.settings);
            let truncated = matches!(optimized, Cow::Owned(_));
            if truncated {
                metrics::counter!(telemetry::PROMPTS_TRUNCATED_TOTAL,
                    "backend" => descriptor.id.clone())
                .increment(1);
            }

            let deadline = self.settings.request_timeout();
            let invoked = tokio::time::timeout(deadline, backend.invoke(&optimized)).await;
            match invoked {
                Ok(Ok(text)) => {
                    Self::record_request(&descriptor.id, start, true);
                    debug!(backend = %descriptor.id, "request served");
                    return Ok(RouteOutcome {
                        text,
                        backend_id: descriptor.id.clone(),
                        truncated,
                    });
                }
                Ok(Err(e)) => {
                    warn!(backend = %descriptor.id, error = %e, "invocation failed, trying next candidate");
                    self.record_fallback(&descriptor.id);
                    attempts.push(BackendAttempt {
                        backend_id: descriptor.id.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    let e = MuninnError::BackendTimeout {
                        backend: descriptor.id.clone(),
                        after: deadline,
                    };
                    warn!(backend = %descriptor.id, error = %e, "invocation timed out, trying next candidate");
                    self.record_fallback(&descriptor.id);
                    attempts.push(BackendAttempt {
                        backend_id: descriptor.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Self::record_request("none", start, false);
        Err(MuninnError::AllBackendsFailed { attempts })
    }

    /// Sample host memory, degrading to an exhausted profile on failure
    /// so that selection falls through to the remote backend.
    fn sample_degraded(&self) -> MemoryProfile {
        match self.host.sample() {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "host metrics unavailable, assuming no free memory");
                MemoryProfile::exhausted()
            }
        }
    }

    fn record_fallback(&self, backend_id: &str) {
        metrics::counter!(telemetry::FALLBACKS_TOTAL, "backend" => backend_id.to_owned())
            .increment(1);
    }

    fn record_request(backend: &str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "backend" => backend.to_owned(), "status" => status)
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "backend" => backend.to_owned())
        .record(start.elapsed().as_secs_f64());
    }
}
