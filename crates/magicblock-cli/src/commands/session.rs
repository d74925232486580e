use clap::Subcommand;
use magicblock_core::Request;

use super::{dispatch, CliResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start the countdown
    Start,
    /// Pause the countdown
    Pause,
    /// Start if stopped, pause if running
    Toggle,
    /// Re-arm to the full session length
    Reset,
    /// Print the timer state as JSON
    Status,
    /// Change the session length and re-arm
    SetDuration {
        /// Session length in minutes
        minutes: u64,
    },
}

pub async fn run(action: SessionAction) -> CliResult {
    let request = match action {
        SessionAction::Start => Request::Start,
        SessionAction::Pause => Request::Pause,
        SessionAction::Toggle => Request::Toggle,
        SessionAction::Reset => Request::Reset,
        SessionAction::Status => Request::Status,
        SessionAction::SetDuration { minutes } => Request::UpdateSessionTime { minutes },
    };
    dispatch(request).await
}
