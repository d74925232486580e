//! Long-running mode: JSON requests on stdin, one response line each on
//! stdout.

use magicblock_core::{GateService, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{open_orchestrator, CliResult};

pub async fn run() -> CliResult {
    let mut orchestrator = open_orchestrator()?;
    match orchestrator.bootstrap_default_dataset().await {
        Ok(Some(id)) => tracing::info!(dataset = %id, "imported default dataset"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "could not import default dataset"),
    }

    let (client, handle) = GateService::spawn(orchestrator);
    tracing::info!("serving requests on stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str(line) {
            Ok(value) => client.request_json(value).await,
            Err(e) => Response::error(format!("Invalid JSON: {e}")),
        };
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    drop(client);
    handle.await?;
    tracing::info!("stdin closed, shutting down");
    Ok(())
}
