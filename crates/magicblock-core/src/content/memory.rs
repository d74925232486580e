use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::ContentSource;
use crate::dataset::{DatasetId, DatasetMeta, QuizItem};
use crate::error::FetchError;

/// Content held in memory. Unknown datasets and items report
/// [`FetchError::Missing`].
#[derive(Debug, Default)]
pub struct MemorySource {
    metas: Mutex<HashMap<DatasetId, DatasetMeta>>,
    items: Mutex<HashMap<(DatasetId, usize), QuizItem>>,
    item_fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_meta(&self, id: &DatasetId, meta: DatasetMeta) {
        if let Ok(mut metas) = self.metas.lock() {
            metas.insert(id.clone(), meta);
        }
    }

    pub fn insert_item(&self, id: &DatasetId, index: usize, item: QuizItem) {
        if let Ok(mut items) = self.items.lock() {
            items.insert((id.clone(), index), item);
        }
    }

    /// Publish `items` under `id` with metadata sized to match.
    pub fn insert_dataset(&self, id: &DatasetId, items: Vec<QuizItem>) {
        self.insert_meta(id, DatasetMeta::with_length(items.len()));
        for (index, item) in items.into_iter().enumerate() {
            self.insert_item(id, index, item);
        }
    }

    /// Number of `fetch_item` calls served so far, successful or not.
    pub fn item_fetches(&self) -> usize {
        self.item_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn fetch_meta(&self, id: &DatasetId) -> Result<DatasetMeta, FetchError> {
        self.metas
            .lock()
            .ok()
            .and_then(|metas| metas.get(id).cloned())
            .ok_or_else(|| FetchError::Missing(format!("{id}/index.json")))
    }

    async fn fetch_item(&self, id: &DatasetId, index: usize) -> Result<QuizItem, FetchError> {
        self.item_fetches.fetch_add(1, Ordering::SeqCst);
        self.items
            .lock()
            .ok()
            .and_then(|items| items.get(&(id.clone(), index)).cloned())
            .ok_or_else(|| FetchError::Missing(format!("{id}/data/{index}.json")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_inserted_content_and_reports_missing() {
        let id: DatasetId = "u.r.b".parse().unwrap();
        let source = MemorySource::new();
        source.insert_dataset(
            &id,
            vec![QuizItem {
                question: "q".into(),
                answer: "a".into(),
            }],
        );

        assert_eq!(source.fetch_meta(&id).await.unwrap().length, 1);
        assert_eq!(source.fetch_item(&id, 0).await.unwrap().answer, "a");
        assert!(matches!(
            source.fetch_item(&id, 1).await,
            Err(FetchError::Missing(_))
        ));
        assert_eq!(source.item_fetches(), 2);
    }
}
