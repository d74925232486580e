//! Focus session timer engine.
//!
//! The timer engine is a wall-clock-based state machine. It does not use
//! internal threads and never reads the clock itself: every command takes the
//! current epoch time in milliseconds, so `tick` is a pure function of
//! `(state, now)`. A wake source is expected to call `tick()` about once per
//! second, but the engine never assumes that; progress is always computed from
//! the wall-clock delta since the last applied tick, so coalesced or skipped
//! wake-ups lose nothing.
//!
//! ## State Transitions
//!
//! ```text
//! Idle | Paused | Expired --start--> Running --pause--> Paused
//! Running --tick reaches 0--> Expired --(re-arm)--> Idle
//! ```
//!
//! Expiry re-arms the countdown to the full session duration and leaves the
//! engine stopped; it does not restart on its own.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::events::{timestamp, Event};
use crate::storage::records::SessionRecord;

/// Default session length: 25 minutes.
pub const DEFAULT_SESSION_MS: u64 = 25 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    /// Transient: the countdown reached zero during the current tick.
    Expired,
}

/// Core timer engine.
///
/// Invariant: `0 <= time_left_ms <= session_ms`.
#[derive(Debug, Clone)]
pub struct TimerEngine {
    state: TimerState,
    session_ms: u64,
    time_left_ms: u64,
    /// Wall-clock time (epoch ms) of the last applied delta.
    last_tick_ms: u64,
    completed_sessions: u64,
    /// Throttle for per-tick persistence.
    persist_interval_ms: u64,
    last_persisted_ms: Option<u64>,
}

impl TimerEngine {
    /// Create an idle engine armed with `session_ms`.
    pub fn new(session_ms: u64, now_ms: u64) -> Self {
        Self {
            state: TimerState::Idle,
            session_ms,
            time_left_ms: session_ms,
            last_tick_ms: now_ms,
            completed_sessions: 0,
            persist_interval_ms: 10_000,
            last_persisted_ms: None,
        }
    }

    /// Rebuild an engine from a persisted snapshot.
    ///
    /// A snapshot taken while running stays running, and keeps its
    /// `last_update_time`, so the first tick after a restart charges the full
    /// downtime. `time_left_ms` is clamped into range and a persisted
    /// `Expired` (never written by this engine) is treated as `Idle`.
    pub fn restore(record: &SessionRecord) -> Self {
        let session_ms = record.session_time_ms.max(1);
        let state = match record.state {
            TimerState::Expired => TimerState::Idle,
            other => other,
        };
        Self {
            state,
            session_ms,
            time_left_ms: record.time_left_ms.min(session_ms),
            last_tick_ms: record.last_update_time,
            completed_sessions: record.number_of_sessions,
            persist_interval_ms: 10_000,
            last_persisted_ms: Some(record.last_update_time),
        }
    }

    pub fn with_persist_interval(mut self, interval_ms: u64) -> Self {
        self.persist_interval_ms = interval_ms;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn time_left(&self) -> u64 {
        self.time_left_ms
    }

    pub fn session_duration(&self) -> u64 {
        self.session_ms
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick_ms
    }

    pub fn completed_sessions(&self) -> u64 {
        self.completed_sessions
    }

    /// Snapshot for persistence.
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            session_time_ms: self.session_ms,
            time_left_ms: self.time_left_ms,
            last_update_time: self.last_tick_ms,
            number_of_sessions: self.completed_sessions,
            state: self.state,
        }
    }

    /// Whether a tick at `now_ms` should be written through to the store.
    pub fn persist_due(&self, now_ms: u64) -> bool {
        match self.last_persisted_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.persist_interval_ms,
            None => true,
        }
    }

    pub fn mark_persisted(&mut self, now_ms: u64) {
        self.last_persisted_ms = Some(now_ms);
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self, now_ms: u64) -> Option<Event> {
        match self.state {
            TimerState::Idle | TimerState::Paused | TimerState::Expired => {
                self.state = TimerState::Running;
                self.last_tick_ms = now_ms;
                tracing::debug!(remaining_ms = self.time_left_ms, "timer started");
                Some(Event::TimerStarted {
                    remaining_ms: self.time_left_ms,
                    at: timestamp(now_ms),
                })
            }
            TimerState::Running => None,
        }
    }

    /// Pause a running timer. Elapsed time up to `now_ms` is charged first,
    /// so pausing after the deadline reports the expiry instead.
    pub fn pause(&mut self, now_ms: u64) -> Option<Event> {
        if self.state != TimerState::Running {
            return None;
        }
        if let Some(expired) = self.tick(now_ms) {
            return Some(expired);
        }
        self.state = TimerState::Paused;
        tracing::debug!(remaining_ms = self.time_left_ms, "timer paused");
        Some(Event::TimerPaused {
            remaining_ms: self.time_left_ms,
            at: timestamp(now_ms),
        })
    }

    pub fn toggle(&mut self, now_ms: u64) -> Option<Event> {
        if self.is_running() {
            self.pause(now_ms)
        } else {
            self.start(now_ms)
        }
    }

    /// Re-arm to the full duration. The running/paused state is unchanged.
    pub fn reset(&mut self, now_ms: u64) -> Event {
        self.time_left_ms = self.session_ms;
        self.last_tick_ms = now_ms;
        Event::TimerReset {
            session_ms: self.session_ms,
            at: timestamp(now_ms),
        }
    }

    /// Change the session length and re-arm.
    pub fn set_session_duration(
        &mut self,
        minutes: u64,
        now_ms: u64,
    ) -> Result<Event, ValidationError> {
        let session_ms = minutes
            .checked_mul(60 * 1000)
            .filter(|ms| *ms > 0)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "minutes".into(),
                message: format!("{minutes} is not a usable session length"),
            })?;
        self.session_ms = session_ms;
        self.reset(now_ms);
        tracing::info!(session_ms, "session duration changed");
        Ok(Event::SessionDurationChanged {
            session_ms,
            at: timestamp(now_ms),
        })
    }

    /// Apply the wall-clock delta since the last tick.
    ///
    /// Returns `Some(Event::SessionExpired)` when the countdown reaches zero,
    /// after which the engine is `Idle` with the full duration re-armed.
    pub fn tick(&mut self, now_ms: u64) -> Option<Event> {
        if self.state != TimerState::Running {
            return None;
        }
        // A clock that stepped backwards contributes nothing.
        let delta = now_ms.saturating_sub(self.last_tick_ms);
        self.time_left_ms = self.time_left_ms.saturating_sub(delta);
        self.last_tick_ms = now_ms;

        if self.time_left_ms > 0 {
            return None;
        }

        self.state = TimerState::Expired;
        self.completed_sessions += 1;
        tracing::info!(completed = self.completed_sessions, "focus session expired");
        self.reset(now_ms);
        self.state = TimerState::Idle;
        Some(Event::SessionExpired {
            completed_sessions: self.completed_sessions,
            at: timestamp(now_ms),
        })
    }
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_MS, 0)
    }
}
