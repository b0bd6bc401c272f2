//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `backend` — backend id (e.g. "tinyllama", "gemini-1.5-flash")
//! - `status` — outcome: "ok" or "error"
//! - `cause` — eviction cause: "ttl" | "pressure" | "clear"

/// Total requests routed through the engine.
///
/// Labels: `backend` (the backend that served it, or "none"), `status`.
pub const REQUESTS_TOTAL: &str = "muninn_requests_total";

/// End-to-end routing duration in seconds, including fallback attempts.
///
/// Labels: `backend`.
pub const REQUEST_DURATION_SECONDS: &str = "muninn_request_duration_seconds";

/// Total fallback advances (a candidate failed and the next was tried).
///
/// Labels: `backend` (the candidate that failed).
pub const FALLBACKS_TOTAL: &str = "muninn_fallbacks_total";

/// Total warm-handle cache hits.
///
/// Labels: `backend`.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total warm-handle cache misses (a load was required).
///
/// Labels: `backend`.
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total cache evictions.
///
/// Labels: `backend`, `cause` ("ttl" | "pressure" | "clear").
pub const CACHE_EVICTIONS_TOTAL: &str = "muninn_cache_evictions_total";

/// Total backend load operations actually performed.
///
/// Labels: `backend`, `status` ("ok" | "error").
pub const BACKEND_LOADS_TOTAL: &str = "muninn_backend_loads_total";

/// Total prompts shrunk by the optimizer.
///
/// Labels: `backend`.
pub const PROMPTS_TRUNCATED_TOTAL: &str = "muninn_prompts_truncated_total";
