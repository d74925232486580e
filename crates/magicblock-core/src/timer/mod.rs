mod clock;
mod engine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{TimerEngine, TimerState, DEFAULT_SESSION_MS};
