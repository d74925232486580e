//! Where question content comes from.
//!
//! Datasets only store item indices; the question text is fetched on demand
//! from a [`ContentSource`]. The production source reads raw files from a
//! GitHub repository, and [`MemorySource`] serves fixed content for tests and
//! offline use.

mod github;
mod memory;

pub use github::GitHubRawSource;
pub use memory::MemorySource;

use async_trait::async_trait;

use crate::dataset::{DatasetId, DatasetMeta, QuizItem};
use crate::error::FetchError;

/// A read-only source of dataset metadata and question items.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the dataset's `index.json`.
    async fn fetch_meta(&self, id: &DatasetId) -> Result<DatasetMeta, FetchError>;

    /// Fetch item `index` of the dataset.
    async fn fetch_item(&self, id: &DatasetId, index: usize) -> Result<QuizItem, FetchError>;
}
