//! Self-tuning maintenance scheduler.
//!
//! One background task sweeps the cache on a tick whose interval is a
//! function of session age: young sessions are polled at the configured
//! floor, settled sessions at the midpoint, long-running sessions at the
//! ceiling. The interval is recomputed at the start of every tick from
//! elapsed time — a single ticker, not a chain of self-rescheduling
//! timers — so long sessions shed monitoring overhead instead of
//! accumulating it.
//!
//! Ticks never raise errors: a failed host sample or sweep is logged and
//! the loop continues. Shutdown is signalled through a watch channel and
//! lands between ticks, leaving no partial eviction state behind.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::BackendCache;
use crate::config::OptimizationSettings;
use crate::host::HostMetrics;
use crate::session::SessionTracker;

/// Session-age phases. Sessions only age, so phases advance forward and
/// never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchedulerPhase {
    /// Session younger than 30 minutes; tick at the floor interval.
    Active,
    /// Between 30 minutes and 2 hours; tick at the midpoint.
    Settled,
    /// Past 2 hours; tick at the ceiling.
    LongRunning,
}

const SETTLED_AFTER: Duration = Duration::from_secs(30 * 60);
const LONG_RUNNING_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

impl SchedulerPhase {
    /// Phase for a given session age.
    pub fn for_elapsed(elapsed: Duration) -> Self {
        if elapsed >= LONG_RUNNING_AFTER {
            SchedulerPhase::LongRunning
        } else if elapsed >= SETTLED_AFTER {
            SchedulerPhase::Settled
        } else {
            SchedulerPhase::Active
        }
    }
}

/// Tick interval for a phase, always within `[floor, ceiling]` and
/// non-decreasing as the session ages.
pub fn tick_interval(phase: SchedulerPhase, floor: Duration, ceiling: Duration) -> Duration {
    match phase {
        SchedulerPhase::Active => floor,
        SchedulerPhase::Settled => (floor + ceiling) / 2,
        SchedulerPhase::LongRunning => ceiling,
    }
}

/// Advisory notifications emitted by the scheduler. Never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// The session has run past the configured warning threshold; a
    /// reset is recommended. Emitted at most once per session.
    LongSessionAdvisory { elapsed: Duration },
}

/// Optional best-effort host memory reclamation hint, fired on the deep
/// cleanup path. Absence is a no-op, never an error.
pub type ReclaimHint = Box<dyn Fn() + Send + Sync>;

/// Background maintenance loop over the cache, paced by session age.
pub struct AdaptiveScheduler {
    session: Arc<SessionTracker>,
    cache: Arc<BackendCache>,
    host: Arc<dyn HostMetrics>,
    settings: Arc<OptimizationSettings>,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    shutdown: watch::Receiver<bool>,
    reclaim_hint: Option<ReclaimHint>,
    advisory_sent: bool,
    ticks: u64,
}

/// Handle returned by [`AdaptiveScheduler::spawn`].
pub struct SchedulerHandle {
    /// Signals the loop to stop at the next opportunity.
    pub shutdown: watch::Sender<bool>,
    /// Receives one-time advisories.
    pub events: mpsc::UnboundedReceiver<SchedulerEvent>,
    /// The background task itself.
    pub task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl AdaptiveScheduler {
    /// Spawn the maintenance loop on the current runtime.
    pub fn spawn(
        session: Arc<SessionTracker>,
        cache: Arc<BackendCache>,
        host: Arc<dyn HostMetrics>,
        settings: Arc<OptimizationSettings>,
        reclaim_hint: Option<ReclaimHint>,
    ) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let scheduler = AdaptiveScheduler {
            session,
            cache,
            host,
            settings,
            events: event_tx,
            shutdown: shutdown_rx,
            reclaim_hint,
            advisory_sent: false,
            ticks: 0,
        };
        let task = tokio::spawn(scheduler.run());

        SchedulerHandle {
            shutdown: shutdown_tx,
            events: event_rx,
            task,
        }
    }

    async fn run(mut self) {
        info!("maintenance scheduler started");
        loop {
            // Recompute the interval from current session age before
            // every sleep; phases only ever advance.
            let elapsed = self.session.elapsed();
            let phase = SchedulerPhase::for_elapsed(elapsed);
            let interval = tick_interval(
                phase,
                self.settings.interval_floor(),
                self.settings.interval_ceiling(),
            );

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = self.shutdown.changed() => {
                    match changed {
                        Ok(()) if *self.shutdown.borrow() => break,
                        Ok(()) => {}
                        // Every handle dropped; nobody can signal us anymore
                        Err(_) => break,
                    }
                }
            }

            self.ticks += 1;
            self.tick(phase);
        }
        info!(ticks = self.ticks, "maintenance scheduler stopped");
    }

    /// One maintenance pass. Failures are logged and skipped; the loop
    /// never dies from a bad tick.
    fn tick(&mut self, phase: SchedulerPhase) {
        let expired = self.cache.evict_expired(Instant::now());
        if expired > 0 {
            debug!(expired, "ttl sweep evicted entries");
        }

        if self.ticks % self.settings.deep_cleanup_tick_multiplier == 0 {
            self.deep_cleanup();
        }

        self.maybe_send_advisory(phase);
    }

    /// Deep cleanup: pressure sweep against a fresh host sample, then
    /// the optional reclaim hint.
    fn deep_cleanup(&self) {
        match self.host.sample() {
            Ok(profile) => {
                let evicted = self.cache.evict_under_pressure(&profile);
                if evicted > 0 {
                    debug!(
                        evicted,
                        used_pct = profile.used_pct(),
                        "pressure sweep evicted entries"
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "host sample failed, skipping pressure sweep");
            }
        }

        if let Some(hint) = &self.reclaim_hint {
            hint();
        }
    }

    fn maybe_send_advisory(&mut self, phase: SchedulerPhase) {
        if self.advisory_sent || phase != SchedulerPhase::LongRunning {
            return;
        }
        let elapsed = self.session.elapsed();
        if elapsed >= self.settings.long_session_warning() {
            info!(?elapsed, "session past warning threshold, recommending reset");
            let _ = self
                .events
                .send(SchedulerEvent::LongSessionAdvisory { elapsed });
            self.advisory_sent = true;
        }
    }
}
