//! Versioned schemas for every persisted key.
//!
//! Records are written as `{ "version": N, "data": <record> }`. On load the
//! version is checked; a value without an envelope is handed to
//! [`Record::upgrade`], which understands the legacy unversioned layouts.
//! Anything else is rejected with [`StorageError::SchemaMismatch`].
//!
//! | Key | Record |
//! |---|---|
//! | `session-manager` | [`SessionRecord`] |
//! | `blockedDomains` | [`DomainListRecord`] |
//! | `dataset-manager` | [`DatasetIndexRecord`] |
//! | `<username>.<repository>.<branch>` | [`DatasetRecord`] |
//! | `pending-question` | [`PendingQuestionRecord`] |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Store;
use crate::dataset::{Boxes, DatasetMeta, Pick, QuizItem};
use crate::error::StorageError;
use crate::timer::TimerState;

pub const SESSION_KEY: &str = "session-manager";
pub const BLOCKED_DOMAINS_KEY: &str = "blockedDomains";
pub const DATASET_INDEX_KEY: &str = "dataset-manager";
pub const PENDING_QUESTION_KEY: &str = "pending-question";

/// A typed value stored under one key.
pub trait Record: Serialize + DeserializeOwned {
    /// Schema version written by this build.
    const VERSION: u32;

    /// Convert an unversioned legacy value into the current schema.
    fn upgrade(_legacy: Value) -> Option<Self> {
        None
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

/// Read and decode the record stored under `key`.
pub fn load<T: Record>(store: &dyn Store, key: &str) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
    })?;

    let envelope = value
        .as_object()
        .filter(|obj| obj.len() == 2 && obj.contains_key("data"))
        .and_then(|obj| obj.get("version"))
        .map(|v| v.as_u64());

    match envelope {
        Some(Some(version)) if version == u64::from(T::VERSION) => {
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            serde_json::from_value(data)
                .map(Some)
                .map_err(|e| StorageError::Corrupt {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        Some(found) => Err(StorageError::SchemaMismatch {
            key: key.to_string(),
            found: found.and_then(|v| u32::try_from(v).ok()),
            expected: T::VERSION,
        }),
        None => match T::upgrade(value) {
            Some(record) => {
                tracing::info!(key, "upgraded legacy record");
                Ok(Some(record))
            }
            None => Err(StorageError::SchemaMismatch {
                key: key.to_string(),
                found: None,
                expected: T::VERSION,
            }),
        },
    }
}

/// Encode `record` and write it under `key`.
pub fn save<T: Record>(store: &dyn Store, key: &str, record: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string(&EnvelopeRef {
        version: T::VERSION,
        data: record,
    })
    .map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &json)
}

/// Persisted focus session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_time_ms: u64,
    pub time_left_ms: u64,
    /// Wall-clock time (epoch ms) of the last applied delta.
    pub last_update_time: u64,
    pub number_of_sessions: u64,
    pub state: TimerState,
}

impl Record for SessionRecord {
    const VERSION: u32 = 1;

    fn upgrade(legacy: Value) -> Option<Self> {
        // {sessionTime, timeLeft, lastUpdateTime, numberOfSession}, never running.
        let obj = legacy.as_object()?;
        let session_time_ms = obj.get("sessionTime")?.as_u64()?;
        let time_left_ms = obj
            .get("timeLeft")
            .and_then(Value::as_u64)
            .unwrap_or(session_time_ms);
        Some(Self {
            session_time_ms,
            time_left_ms,
            last_update_time: obj.get("lastUpdateTime").and_then(Value::as_u64).unwrap_or(0),
            number_of_sessions: obj
                .get("numberOfSession")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            state: TimerState::Idle,
        })
    }
}

/// Persisted block list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainListRecord(pub Vec<String>);

impl Record for DomainListRecord {
    const VERSION: u32 = 1;

    fn upgrade(legacy: Value) -> Option<Self> {
        serde_json::from_value(legacy).ok().map(Self)
    }
}

/// Persisted list of registered dataset keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetIndexRecord(pub Vec<String>);

impl Record for DatasetIndexRecord {
    const VERSION: u32 = 1;

    fn upgrade(legacy: Value) -> Option<Self> {
        serde_json::from_value(legacy).ok().map(Self)
    }
}

/// Persisted dataset, including its Leitner boxes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRecord {
    pub username: String,
    pub repository: String,
    pub branch: String,
    pub meta: DatasetMeta,
    pub boxes: Boxes,
    #[serde(default)]
    pub interval_counter: u32,
}

impl Record for DatasetRecord {
    const VERSION: u32 = 1;
}

/// The served question that has not yet released the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuestionRecord {
    pub dataset: String,
    pub pick: Pick,
    pub item: QuizItem,
    /// Already re-filed by a wrong answer; only a retry remains.
    #[serde(default)]
    pub graded: bool,
}

impl Record for PendingQuestionRecord {
    const VERSION: u32 = 1;
}
