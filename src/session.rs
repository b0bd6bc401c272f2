//! Working-session bookkeeping.
//!
//! One [`SessionTracker`] lives for the life of an engine. The scheduler
//! reads elapsed time from it to pace maintenance; nothing else depends
//! on it. State is never persisted.

use std::sync::RwLock;
use std::time::{Duration, Instant};

/// What kind of interaction is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// A routed text request.
    Message,
    /// A dataset/file handed to the surrounding system.
    FileUpload,
}

/// Counters for one working session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSnapshot {
    pub started_at: Instant,
    pub message_count: u64,
    pub file_count: u64,
    pub last_activity_at: Instant,
}

#[derive(Debug)]
struct SessionState {
    started_at: Instant,
    /// Added to the measured age; non-zero only in tests that need a
    /// late-session tracker without waiting hours.
    age_offset: Duration,
    message_count: u64,
    file_count: u64,
    last_activity_at: Instant,
}

/// Tracks interactions and elapsed time for one session.
///
/// The tracker is the sole mutator of its state; the scheduler and any
/// diagnostics only read snapshots.
#[derive(Debug)]
pub struct SessionTracker {
    state: RwLock<SessionState>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::aged_by(Duration::ZERO)
    }

    /// Tracker that reports its session as already `offset` old.
    pub(crate) fn aged_by(offset: Duration) -> Self {
        let now = Instant::now();
        Self {
            state: RwLock::new(SessionState {
                started_at: now,
                age_offset: offset,
                message_count: 0,
                file_count: 0,
                last_activity_at: now,
            }),
        }
    }

    /// Record one interaction and refresh the activity timestamp.
    pub fn record_interaction(&self, kind: InteractionKind) {
        let mut state = self.state.write().expect("session lock poisoned");
        match kind {
            InteractionKind::Message => state.message_count += 1,
            InteractionKind::FileUpload => state.file_count += 1,
        }
        state.last_activity_at = Instant::now();
    }

    /// Time since the session started.
    pub fn elapsed(&self) -> Duration {
        let state = self.state.read().expect("session lock poisoned");
        state.started_at.elapsed() + state.age_offset
    }

    /// Duration elapsed since an arbitrary instant, clamped at zero.
    pub fn elapsed_since(&self, t: Instant) -> Duration {
        Instant::now().saturating_duration_since(t)
    }

    /// Read-only copy of the current counters.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().expect("session lock poisoned");
        SessionSnapshot {
            started_at: state.started_at,
            message_count: state.message_count,
            file_count: state.file_count,
            last_activity_at: state.last_activity_at,
        }
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
