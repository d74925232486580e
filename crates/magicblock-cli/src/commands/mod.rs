//! Subcommand implementations.
//!
//! One-shot commands rehydrate the orchestrator from the data directory,
//! apply a single protocol request, and print the response.

pub mod answer;
pub mod completions;
pub mod config;
pub mod dataset;
pub mod gate;
pub mod navigate;
pub mod serve;
pub mod session;

use std::error::Error;
use std::sync::Arc;

use magicblock_core::{
    Config, Database, GateOrchestrator, GitHubRawSource, Request, Response, Status, SystemClock,
};

pub type CliResult = Result<(), Box<dyn Error>>;

/// Build an orchestrator over the on-disk store and configuration.
pub fn open_orchestrator() -> Result<GateOrchestrator, Box<dyn Error>> {
    let config = Config::load()?;
    let store = Database::open()?;
    let source = GitHubRawSource::from_config(&config.content)?;
    let orchestrator = GateOrchestrator::load(
        Box::new(store),
        config,
        Arc::new(source),
        Arc::new(SystemClock),
    )?;
    Ok(orchestrator)
}

/// Apply `request` and print the response.
pub async fn dispatch(request: Request) -> CliResult {
    let mut orchestrator = open_orchestrator()?;
    let response = orchestrator.handle_inline(request).await;
    print_response(&response)
}

/// Print `response` as pretty JSON. An `error` status fails the command.
pub fn print_response(response: &Response) -> CliResult {
    println!("{}", serde_json::to_string_pretty(response)?);
    if response.status == Status::Error {
        let message = response.message.clone().unwrap_or_else(|| "request failed".into());
        return Err(message.into());
    }
    Ok(())
}
