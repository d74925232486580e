use clap::Subcommand;
use magicblock_core::Request;

use super::{dispatch, CliResult};

#[derive(Subcommand)]
pub enum GateAction {
    /// Block a domain (URL or bare host)
    Add { url: String },
    /// Unblock a domain
    Remove { url: String },
    /// Check whether a URL is blocked
    Check { url: String },
    /// List blocked domains
    List,
}

pub async fn run(action: GateAction) -> CliResult {
    let request = match action {
        GateAction::Add { url } => Request::AddDomain { url },
        GateAction::Remove { url } => Request::RemoveDomain { url },
        GateAction::Check { url } => Request::IsBlocked { url },
        GateAction::List => Request::ListDomains,
    };
    dispatch(request).await
}
