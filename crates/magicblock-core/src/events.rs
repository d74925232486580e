use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::BoxId;

/// Every state change in the system produces an Event.
/// The orchestrator logs them; callers may forward them to a UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        session_ms: u64,
        at: DateTime<Utc>,
    },
    /// Countdown reached zero; the engine re-armed and stopped.
    SessionExpired {
        completed_sessions: u64,
        at: DateTime<Utc>,
    },
    SessionDurationChanged {
        session_ms: u64,
        at: DateTime<Utc>,
    },
    QuestionServed {
        dataset: String,
        from_box: BoxId,
        item: usize,
        at: DateTime<Utc>,
    },
    ItemRegraded {
        dataset: String,
        item: usize,
        from_box: BoxId,
        to_box: BoxId,
        correct: bool,
        at: DateTime<Utc>,
    },
    NavigationIntercepted {
        domain: String,
        at: DateTime<Utc>,
    },
}

/// Convert epoch milliseconds into a UTC timestamp, clamping out-of-range values.
pub fn timestamp(epoch_ms: u64) -> DateTime<Utc> {
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}
