//! Single-task request service.
//!
//! [`GateService::spawn`] moves a [`GateOrchestrator`] onto its own tokio
//! task. Requests, timer ticks and fetch completions all arrive over one
//! channel and are applied one at a time, so the orchestrator never needs a
//! lock. Question fetches run on separate tasks; until one reports back,
//! `dataset.getQuestion` answers `loading`.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::orchestrator::{Dispatch, FetchOutcome, GateOrchestrator, Request, Response, Status};

const CHANNEL_CAPACITY: usize = 64;

enum Command {
    Request {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    Tick,
    FetchDone(FetchOutcome),
}

pub struct GateService;

impl GateService {
    /// Start the service and its ticker on the current runtime.
    ///
    /// The task ends once every [`GateClient`] has been dropped and hands the
    /// orchestrator back through the join handle.
    pub fn spawn(orchestrator: GateOrchestrator) -> (GateClient, JoinHandle<GateOrchestrator>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let config = orchestrator.config();
        let tick_period = Duration::from_millis(config.session.tick_interval_ms.max(1));
        let client = GateClient {
            tx: tx.clone(),
            retry_interval: Duration::from_millis(config.question.retry_interval_ms),
            retry_max_wait: Duration::from_millis(config.question.retry_max_wait_ms),
        };

        spawn_ticker(tx.downgrade(), tick_period);
        let handle = tokio::spawn(run(orchestrator, rx, tx.downgrade()));
        tracing::debug!(?tick_period, "gate service started");
        (client, handle)
    }
}

async fn run(
    mut orchestrator: GateOrchestrator,
    mut rx: mpsc::Receiver<Command>,
    tx: mpsc::WeakSender<Command>,
) -> GateOrchestrator {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Request { request, reply } => {
                let response = match orchestrator.handle(request).await {
                    Dispatch::Reply(response) => response,
                    Dispatch::Fetch(job) => {
                        if let Some(tx) = tx.upgrade() {
                            tokio::spawn(async move {
                                let outcome = job.run().await;
                                // The service may be gone; the result is moot then.
                                let _ = tx.send(Command::FetchDone(outcome)).await;
                            });
                        }
                        Response::loading()
                    }
                };
                // The caller may have stopped waiting.
                let _ = reply.send(response);
            }
            Command::Tick => {
                if let Err(e) = orchestrator.tick() {
                    tracing::warn!(error = %e, "failed to persist session on tick");
                }
            }
            Command::FetchDone(outcome) => {
                orchestrator.complete_fetch(outcome);
            }
        }
    }
    tracing::debug!("gate service stopped");
    orchestrator
}

fn spawn_ticker(tx: mpsc::WeakSender<Command>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let Some(tx) = tx.upgrade() else { break };
            if tx.send(Command::Tick).await.is_err() {
                break;
            }
        }
    });
}

/// Cloneable handle to a running [`GateService`].
#[derive(Clone)]
pub struct GateClient {
    tx: mpsc::Sender<Command>,
    retry_interval: Duration,
    retry_max_wait: Duration,
}

impl GateClient {
    pub async fn request(&self, request: Request) -> Response {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Command::Request { request, reply })
            .await
            .is_err()
        {
            return Response::error("Gate service is not running");
        }
        rx.await
            .unwrap_or_else(|_| Response::error("Gate service dropped the request"))
    }

    /// Decode and apply a raw JSON request.
    pub async fn request_json(&self, value: Value) -> Response {
        match Request::from_json(value) {
            Ok(request) => self.request(request).await,
            Err(response) => response,
        }
    }

    /// Report a completed navigation; true when it must be redirected.
    pub async fn navigate(&self, url: impl Into<String>, frame_id: i64) -> bool {
        let response = self
            .request(Request::NavigationCompleted {
                url: url.into(),
                frame_id,
            })
            .await;
        response
            .result
            .as_ref()
            .and_then(|r| r.get("intercept"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Ask for a question and poll while it is loading, giving up after
    /// `question.retry_max_wait_ms`.
    pub async fn question_with_retry(&self) -> Response {
        let deadline = Instant::now() + self.retry_max_wait;
        let mut response = self.request(Request::GetQuestion { is_retry: false }).await;
        while response.status == Status::Loading {
            if Instant::now() + self.retry_interval > deadline {
                return Response::failed("Timed out waiting for a question");
            }
            tokio::time::sleep(self.retry_interval).await;
            response = self.request(Request::GetQuestion { is_retry: true }).await;
        }
        response
    }
}
