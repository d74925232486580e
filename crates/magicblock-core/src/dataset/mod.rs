//! Question datasets and their Leitner scheduling.
//!
//! A dataset is a remote question source identified by
//! `(username, repository, branch)`. Its items are referred to by index and
//! distributed over three mastery boxes; see [`leitner`] for the scheduling
//! rules and [`registry`] for how datasets are chosen.

pub mod leitner;
pub mod registry;

pub use leitner::{BoxId, Boxes, Dataset, Pick, Regrade};
pub use registry::{DatasetRegistry, PlannedQuestion, ServedQuestion};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identity of a dataset: one branch of one GitHub repository.
///
/// Serialized as the dotted key `<username>.<repository>.<branch>`, so none
/// of the components may contain a dot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId {
    username: String,
    repository: String,
    branch: String,
}

impl DatasetId {
    pub fn new(
        username: impl Into<String>,
        repository: impl Into<String>,
        branch: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let id = Self {
            username: username.into(),
            repository: repository.into(),
            branch: branch.into(),
        };
        let valid = [&id.username, &id.repository, &id.branch]
            .iter()
            .all(|part| !part.is_empty() && !part.contains('.') && !part.contains('/'));
        if valid {
            Ok(id)
        } else {
            Err(ValidationError::InvalidDatasetId(id.key()))
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The dotted key this dataset is stored under.
    pub fn key(&self) -> String {
        format!("{}.{}.{}", self.username, self.repository, self.branch)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.username, self.repository, self.branch)
    }
}

impl FromStr for DatasetId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [username, repository, branch] => Self::new(*username, *repository, *branch),
            _ => Err(ValidationError::InvalidDatasetId(s.to_string())),
        }
    }
}

impl TryFrom<String> for DatasetId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatasetId> for String {
    fn from(id: DatasetId) -> Self {
        id.key()
    }
}

/// Dataset metadata, as published in the source's `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DatasetMeta {
    /// Number of items; item indices are `0..length`.
    pub length: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<String>,
}

impl DatasetMeta {
    /// Minimal metadata for a dataset of `length` items.
    pub fn with_length(length: usize) -> Self {
        Self {
            length,
            ..Self::default()
        }
    }
}

/// One question item, as published at `data/{index}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    /// Earlier revisions of the format called this field `solution`.
    #[serde(alias = "solution")]
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_id_parses_dotted_key() {
        let id: DatasetId = "buxr.data.master".parse().unwrap();
        assert_eq!(id.username(), "buxr");
        assert_eq!(id.repository(), "data");
        assert_eq!(id.branch(), "master");
        assert_eq!(id.key(), "buxr.data.master");
    }

    #[test]
    fn dataset_id_rejects_wrong_arity_and_empty_parts() {
        assert!("buxr.data".parse::<DatasetId>().is_err());
        assert!("a.b.c.d".parse::<DatasetId>().is_err());
        assert!("buxr..master".parse::<DatasetId>().is_err());
        assert!(DatasetId::new("a/b", "c", "d").is_err());
    }

    #[test]
    fn dataset_id_serializes_as_key() {
        let id = DatasetId::new("u", "r", "b").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u.r.b\"");
        let back: DatasetId = serde_json::from_str("\"u.r.b\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn quiz_item_accepts_legacy_solution_field() {
        let item: QuizItem = serde_json::from_str(
            r#"{"question":"2+2?","solution":"4","difficulty":"EASY"}"#,
        )
        .unwrap();
        assert_eq!(item.answer, "4");
    }

    #[test]
    fn meta_reads_index_json_shape() {
        let meta: DatasetMeta = serde_json::from_str(
            r#"{"length":10,"type":"string","name":"Sample","author":"J","description":"d","email":"x@y.z"}"#,
        )
        .unwrap();
        assert_eq!(meta.length, 10);
        assert_eq!(meta.kind.as_deref(), Some("string"));
        assert_eq!(meta.email.as_deref(), Some("x@y.z"));
        assert!(meta.discord.is_none());
    }
}
