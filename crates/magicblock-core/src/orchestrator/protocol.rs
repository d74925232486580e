//! JSON request/response protocol.
//!
//! A request is one object tagged by `action`; payload fields are camelCase:
//!
//! ```json
//! { "action": "gate.isBlocked", "url": "https://www.youtube.com/" }
//! { "action": "dataset.getQuestion", "isRetry": true }
//! ```
//!
//! Every request gets exactly one [`Response`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::{BoxId, DatasetId, DatasetMeta, ServedQuestion};
use crate::timer::TimerState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "session.getTimeLeft")]
    GetTimeLeft,
    #[serde(rename = "session.getSessionTime")]
    GetSessionTime,
    #[serde(rename = "session.updateSessionTime")]
    UpdateSessionTime { minutes: u64 },
    #[serde(rename = "session.start")]
    Start,
    #[serde(rename = "session.pause")]
    Pause,
    #[serde(rename = "session.toggle")]
    Toggle,
    #[serde(rename = "session.reset")]
    Reset,
    #[serde(rename = "session.isRunning")]
    IsRunning,
    #[serde(rename = "session.status")]
    Status,

    #[serde(rename = "gate.addDomain")]
    AddDomain { url: String },
    #[serde(rename = "gate.removeDomain")]
    RemoveDomain { url: String },
    #[serde(rename = "gate.isBlocked")]
    IsBlocked { url: String },
    #[serde(rename = "gate.listDomains")]
    ListDomains,

    #[serde(rename = "dataset.addDataset")]
    AddDataset {
        identity: DatasetId,
        meta: DatasetMeta,
    },
    #[serde(rename = "dataset.importDataset")]
    ImportDataset { identity: DatasetId },
    #[serde(rename = "dataset.removeDataset")]
    RemoveDataset { identity: DatasetId },
    #[serde(rename = "dataset.listDatasets")]
    ListDatasets,
    #[serde(rename = "dataset.getQuestion")]
    GetQuestion {
        #[serde(default, rename = "isRetry")]
        is_retry: bool,
    },

    #[serde(rename = "answer.correct")]
    AnswerCorrect,
    #[serde(rename = "answer.incorrect")]
    AnswerIncorrect,
    #[serde(rename = "answer.submit")]
    SubmitAnswer { answer: String },

    #[serde(rename = "navigation.completed")]
    NavigationCompleted {
        url: String,
        #[serde(default, rename = "frameId")]
        frame_id: i64,
    },
}

impl Request {
    /// Every action name the protocol understands.
    pub const ACTIONS: &'static [&'static str] = &[
        "session.getTimeLeft",
        "session.getSessionTime",
        "session.updateSessionTime",
        "session.start",
        "session.pause",
        "session.toggle",
        "session.reset",
        "session.isRunning",
        "session.status",
        "gate.addDomain",
        "gate.removeDomain",
        "gate.isBlocked",
        "gate.listDomains",
        "dataset.addDataset",
        "dataset.importDataset",
        "dataset.removeDataset",
        "dataset.listDatasets",
        "dataset.getQuestion",
        "answer.correct",
        "answer.incorrect",
        "answer.submit",
        "navigation.completed",
    ];

    /// Decode a request, distinguishing unknown actions from bad payloads.
    pub fn from_json(value: Value) -> Result<Self, Response> {
        let action = match value.get("action") {
            Some(Value::String(action)) => action.clone(),
            Some(other) => return Err(Response::error(format!("Unknown action: {other}"))),
            None => return Err(Response::error("Missing action")),
        };
        if !Self::ACTIONS.contains(&action.as_str()) {
            return Err(Response::error(format!("Unknown action: {action}")));
        }
        serde_json::from_value(value)
            .map_err(|e| Response::error(format!("Invalid payload for {action}: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    /// The request was understood but could not be satisfied.
    Failed,
    /// A question fetch is in flight; ask again shortly.
    Loading,
    /// The request itself was malformed or an internal operation failed.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn success<T: Serialize>(result: T) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => Self {
                status: Status::Success,
                result: Some(result),
                message: None,
            },
            Err(e) => Self::error(format!("Failed to encode result: {e}")),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            result: None,
            message: Some(message.into()),
        }
    }

    pub fn loading() -> Self {
        Self {
            status: Status::Loading,
            result: None,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            result: None,
            message: Some(message.into()),
        }
    }
}

/// A question as shown to the user. The expected answer stays server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub dataset: String,
    #[serde(rename = "box")]
    pub box_id: BoxId,
    pub item: usize,
    pub question: String,
}

impl From<&ServedQuestion> for QuestionView {
    fn from(served: &ServedQuestion) -> Self {
        Self {
            dataset: served.dataset.key(),
            box_id: served.pick.box_id,
            item: served.pick.item,
            question: served.item.question.clone(),
        }
    }
}

/// Result of `session.status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: TimerState,
    pub time_left_ms: u64,
    pub session_time_ms: u64,
    pub number_of_sessions: u64,
}

/// One row of `dataset.listDatasets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub username: String,
    pub repository: String,
    pub branch: String,
}

impl From<&DatasetId> for DatasetEntry {
    fn from(id: &DatasetId) -> Self {
        Self {
            username: id.username().to_string(),
            repository: id.repository().to_string(),
            branch: id.branch().to_string(),
        }
    }
}
