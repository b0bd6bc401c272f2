//! Warm backend handle cache.
//!
//! The cache owns the lifecycle of every warm handle: it admits loads
//! against a memory budget, deduplicates concurrent loads of the same
//! backend, expires idle entries by TTL, and sheds least-recently-used
//! entries under memory pressure. It is the only mutable shared state in
//! the engine; all mutation goes through its synchronized operations.
//!
//! # At-most-one-load
//!
//! A cold `acquire` installs a `Loading` slot carrying a
//! `tokio::sync::watch` receiver before the load starts. Concurrent
//! callers for the same id find that slot and wait on the same channel;
//! exactly one load runs per backend id no matter how many requests
//! arrive. A failed load is broadcast to every waiter and never retried
//! internally — retry policy belongs to the router's fallback chain.
//!
//! # Locking
//!
//! The slot map lock is held only to read or mutate the map, never
//! across a load or any network call, so eviction sweeps from the
//! scheduler cannot stall behind a slow model load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::backends::{AnalysisBackend, BackendLoader};
use crate::config::OptimizationSettings;
use crate::host::{HostMetrics, MemoryProfile};
use crate::registry::BackendRegistry;
use crate::telemetry;
use crate::{MuninnError, Result};

/// Cache tunables, extracted from [`OptimizationSettings`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false, every acquire loads fresh and nothing is stored.
    pub enabled: bool,
    /// Idle age after which a ready entry is expired.
    pub ttl: Duration,
    /// Used-memory percentage that triggers pressure eviction.
    pub pressure_threshold_pct: f64,
    /// Fraction of available memory the cache may claim.
    pub headroom_pct: f64,
}

impl CacheConfig {
    pub fn from_settings(settings: &OptimizationSettings) -> Self {
        Self {
            enabled: settings.enable_caching,
            ttl: settings.cache_ttl(),
            pressure_threshold_pct: settings.memory_pressure_threshold_pct,
            headroom_pct: settings.cache_headroom_pct,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_settings(&OptimizationSettings::default())
    }
}

/// Broadcast value for one in-flight load: `None` while running, then
/// `Some(Ok(()))` ("re-read the map") or `Some(Err(reason))`.
type LoadOutcome = Option<std::result::Result<(), String>>;

struct ReadyEntry {
    backend: Arc<dyn AnalysisBackend>,
    loaded_at: Instant,
    last_used_at: Instant,
    size_mb: u64,
}

enum Slot {
    Loading {
        done: watch::Receiver<LoadOutcome>,
        size_mb: u64,
        /// Identifies the owning load so a completion cannot clobber a
        /// slot that `clear` removed and a later load re-created.
        token: u64,
    },
    Ready(ReadyEntry),
}

impl Slot {
    fn size_mb(&self) -> u64 {
        match self {
            Slot::Loading { size_mb, .. } => *size_mb,
            Slot::Ready(entry) => entry.size_mb,
        }
    }
}

enum Plan {
    Hit(Arc<dyn AnalysisBackend>),
    Wait(watch::Receiver<LoadOutcome>),
    Load,
}

/// Capacity-bounded cache of warm backend handles.
pub struct BackendCache {
    registry: Arc<BackendRegistry>,
    host: Arc<dyn HostMetrics>,
    loader: Arc<dyn BackendLoader>,
    config: CacheConfig,
    slots: Mutex<HashMap<String, Slot>>,
    next_token: AtomicU64,
}

impl BackendCache {
    pub fn new(
        registry: Arc<BackendRegistry>,
        host: Arc<dyn HostMetrics>,
        loader: Arc<dyn BackendLoader>,
        config: CacheConfig,
    ) -> Self {
        Self {
            registry,
            host,
            loader,
            config,
            slots: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// Return a ready handle for `backend_id`, loading it if necessary.
    ///
    /// A warm unexpired entry returns immediately with its
    /// `last_used_at` bumped. A load already in flight for the same id
    /// is awaited rather than duplicated. A cold backend is admitted
    /// only if current usage plus its cost stays inside the memory
    /// budget; otherwise [`MuninnError::InsufficientMemory`] is returned
    /// without any load being attempted.
    #[instrument(skip(self), fields(backend = %backend_id))]
    pub async fn acquire(&self, backend_id: &str) -> Result<Arc<dyn AnalysisBackend>> {
        let descriptor = self.registry.get(backend_id)?.clone();

        if !self.config.enabled {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "backend" => descriptor.id.clone())
                .increment(1);
            return self.run_load_uncached(&descriptor).await;
        }

        loop {
            let plan = {
                let mut slots = self.slots.lock().expect("cache lock poisoned");
                match slots.get_mut(backend_id) {
                    Some(Slot::Ready(entry)) => {
                        if entry.last_used_at.elapsed() > self.config.ttl {
                            // Stale entry is never a hit; reload below
                            slots.remove(backend_id);
                            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL,
                                "backend" => backend_id.to_owned(), "cause" => "ttl")
                            .increment(1);
                            Plan::Load
                        } else {
                            entry.last_used_at = Instant::now();
                            Plan::Hit(entry.backend.clone())
                        }
                    }
                    Some(Slot::Loading { done, .. }) => Plan::Wait(done.clone()),
                    None => Plan::Load,
                }
            };

            match plan {
                Plan::Hit(backend) => {
                    metrics::counter!(telemetry::CACHE_HITS_TOTAL,
                        "backend" => backend_id.to_owned())
                    .increment(1);
                    return Ok(backend);
                }
                Plan::Wait(mut done) => {
                    let outcome = done
                        .wait_for(|o| o.is_some())
                        .await
                        .map(|value| (*value).clone().expect("guarded by wait_for"));
                    match outcome {
                        Ok(result) => match result {
                            // Promoted; loop to pick up the ready entry
                            Ok(()) => continue,
                            Err(reason) => {
                                return Err(MuninnError::CacheLoadFailed {
                                    backend: backend_id.to_string(),
                                    reason,
                                });
                            }
                        },
                        Err(_) => {
                            // Loader dropped without completing (its future
                            // was cancelled). Remove the orphaned slot so
                            // the next acquire can start over.
                            let mut slots = self.slots.lock().expect("cache lock poisoned");
                            if let Some(Slot::Loading { done: current, .. }) =
                                slots.get(backend_id)
                                && current.same_channel(&done)
                            {
                                slots.remove(backend_id);
                            }
                            return Err(MuninnError::CacheLoadFailed {
                                backend: backend_id.to_string(),
                                reason: "load abandoned".to_string(),
                            });
                        }
                    }
                }
                Plan::Load => match self.start_load(&descriptor).await? {
                    Some(backend) => return Ok(backend),
                    // Lost the insert race to another caller; re-check
                    None => continue,
                },
            }
        }
    }

    /// Admit and run one load. Returns `Ok(None)` if another caller
    /// installed a slot first (the caller should re-check the map).
    async fn start_load(
        &self,
        descriptor: &crate::registry::BackendDescriptor,
    ) -> Result<Option<Arc<dyn AnalysisBackend>>> {
        let budget_mb = self.budget_mb();
        let cost = descriptor.memory_cost_mb;

        let (done_tx, token) = {
            let mut slots = self.slots.lock().expect("cache lock poisoned");
            if slots.contains_key(&descriptor.id) {
                return Ok(None);
            }
            let usage: u64 = slots.values().map(Slot::size_mb).sum();
            if usage + cost > budget_mb {
                return Err(MuninnError::InsufficientMemory {
                    backend: descriptor.id.clone(),
                    required_mb: cost,
                    available_mb: budget_mb.saturating_sub(usage),
                });
            }
            let (tx, rx) = watch::channel(None);
            let token = self.next_token.fetch_add(1, Ordering::Relaxed);
            slots.insert(
                descriptor.id.clone(),
                Slot::Loading {
                    done: rx,
                    size_mb: cost,
                    token,
                },
            );
            (tx, token)
        };

        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "backend" => descriptor.id.clone())
            .increment(1);

        let loaded = self.loader.load(descriptor).await;
        let now = Instant::now();
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        let still_ours = matches!(
            slots.get(&descriptor.id),
            Some(Slot::Loading { token: t, .. }) if *t == token
        );

        match loaded {
            Ok(backend) => {
                if still_ours {
                    slots.insert(
                        descriptor.id.clone(),
                        Slot::Ready(ReadyEntry {
                            backend: backend.clone(),
                            loaded_at: now,
                            last_used_at: now,
                            size_mb: cost,
                        }),
                    );
                }
                drop(slots);
                let _ = done_tx.send(Some(Ok(())));
                metrics::counter!(telemetry::BACKEND_LOADS_TOTAL,
                    "backend" => descriptor.id.clone(), "status" => "ok")
                .increment(1);
                debug!(backend = %descriptor.id, cost_mb = cost, "backend loaded");
                Ok(Some(backend))
            }
            Err(e) => {
                if still_ours {
                    slots.remove(&descriptor.id);
                }
                drop(slots);
                let reason = e.to_string();
                let _ = done_tx.send(Some(Err(reason.clone())));
                metrics::counter!(telemetry::BACKEND_LOADS_TOTAL,
                    "backend" => descriptor.id.clone(), "status" => "error")
                .increment(1);
                Err(MuninnError::CacheLoadFailed {
                    backend: descriptor.id.clone(),
                    reason,
                })
            }
        }
    }

    /// Load without touching the map (caching disabled).
    async fn run_load_uncached(
        &self,
        descriptor: &crate::registry::BackendDescriptor,
    ) -> Result<Arc<dyn AnalysisBackend>> {
        match self.loader.load(descriptor).await {
            Ok(backend) => {
                metrics::counter!(telemetry::BACKEND_LOADS_TOTAL,
                    "backend" => descriptor.id.clone(), "status" => "ok")
                .increment(1);
                Ok(backend)
            }
            Err(e) => {
                metrics::counter!(telemetry::BACKEND_LOADS_TOTAL,
                    "backend" => descriptor.id.clone(), "status" => "error")
                .increment(1);
                Err(MuninnError::CacheLoadFailed {
                    backend: descriptor.id.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Current memory budget for resident handles.
    ///
    /// Sampled fresh; a failed sample admits nothing new (the remote
    /// fallback costs zero and still passes).
    fn budget_mb(&self) -> u64 {
        let profile = match self.host.sample() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "host sample failed, cache admits nothing");
                MemoryProfile::exhausted()
            }
        };
        (profile.available_mb as f64 * self.config.headroom_pct / 100.0) as u64
    }

    /// Remove every ready entry idle longer than the TTL. Returns the
    /// number evicted. In-flight loads are untouched.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        let ttl = self.config.ttl;
        let before = slots.len();
        slots.retain(|id, slot| match slot {
            Slot::Loading { .. } => true,
            Slot::Ready(entry) => {
                let keep = now.saturating_duration_since(entry.last_used_at) <= ttl;
                if !keep {
                    metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL,
                        "backend" => id.clone(), "cause" => "ttl")
                    .increment(1);
                }
                keep
            }
        });
        before - slots.len()
    }

    /// Shed least-recently-used entries while measured usage sits above
    /// the pressure threshold, keeping at least one resident entry.
    /// Returns the number evicted.
    pub fn evict_under_pressure(&self, profile: &MemoryProfile) -> usize {
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        let threshold = self.config.pressure_threshold_pct;
        let total = profile.total_mb as f64;
        let mut used = profile.used_mb() as f64;
        let mut evicted = 0;

        loop {
            let pct = if total == 0.0 {
                100.0
            } else {
                used / total * 100.0
            };
            if pct <= threshold {
                break;
            }

            let ready: Vec<(&String, &ReadyEntry)> = slots
                .iter()
                .filter_map(|(id, slot)| match slot {
                    Slot::Ready(entry) => Some((id, entry)),
                    Slot::Loading { .. } => None,
                })
                .collect();
            if ready.len() <= 1 {
                break;
            }

            let victim = ready
                .into_iter()
                .min_by_key(|(_, entry)| entry.last_used_at)
                .map(|(id, entry)| (id.clone(), entry.size_mb))
                .expect("ready list checked non-empty");

            debug!(backend = %victim.0, freed_mb = victim.1, "pressure eviction");
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL,
                "backend" => victim.0.clone(), "cause" => "pressure")
            .increment(1);
            slots.remove(&victim.0);
            used -= victim.1 as f64;
            evicted += 1;
        }
        evicted
    }

    /// Unconditionally drop every entry (explicit "free memory").
    /// In-flight loads complete but their results are not retained.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        let count = slots.len();
        for id in slots.keys() {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL,
                "backend" => id.clone(), "cause" => "clear")
            .increment(1);
        }
        slots.clear();
        count
    }

    /// Megabytes claimed by resident and in-flight entries.
    pub fn usage_mb(&self) -> u64 {
        let slots = self.slots.lock().expect("cache lock poisoned");
        slots.values().map(Slot::size_mb).sum()
    }

    /// Number of entries, in-flight loads included.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a ready (warm) handle exists for this id.
    pub fn is_warm(&self, backend_id: &str) -> bool {
        let slots = self.slots.lock().expect("cache lock poisoned");
        matches!(slots.get(backend_id), Some(Slot::Ready(_)))
    }

    /// When the warm handle for this id was loaded, if any.
    pub fn loaded_at(&self, backend_id: &str) -> Option<Instant> {
        let slots = self.slots.lock().expect("cache lock poisoned");
        match slots.get(backend_id) {
            Some(Slot::Ready(entry)) => Some(entry.loaded_at),
            _ => None,
        }
    }
}
