//! The set of registered datasets.
//!
//! The registry picks one dataset uniformly at random for every question and
//! remembers which one produced the last served item so that the following
//! grade reaches the right boxes.

use std::collections::BTreeMap;

use rand::seq::IteratorRandom;
use rand::Rng;
use serde::Serialize;

use super::{Dataset, DatasetId, DatasetMeta, Pick, QuizItem, Regrade};
use crate::error::{QuizError, StorageError};
use crate::storage::records::{self, DatasetIndexRecord, DatasetRecord, DATASET_INDEX_KEY};
use crate::storage::{SchedulerConfig, Store};

/// A dataset and item chosen for dispatch, not yet fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuestion {
    pub dataset: DatasetId,
    pub pick: Pick,
}

/// A question that was fetched and is now awaiting a grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServedQuestion {
    pub dataset: DatasetId,
    pub pick: Pick,
    pub item: QuizItem,
}

#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<DatasetId, Dataset>,
    current: Option<DatasetId>,
    cadence: SchedulerConfig,
}

impl DatasetRegistry {
    pub fn new(cadence: SchedulerConfig) -> Self {
        Self {
            datasets: BTreeMap::new(),
            current: None,
            cadence,
        }
    }

    /// Rehydrate every dataset listed in the persisted index.
    ///
    /// Records that fail to decode or violate item conservation are skipped
    /// with a warning; only store I/O failures are returned.
    pub fn load(store: &dyn Store, cadence: SchedulerConfig) -> Result<Self, StorageError> {
        let mut registry = Self::new(cadence);

        let keys = match records::load::<DatasetIndexRecord>(store, DATASET_INDEX_KEY) {
            Ok(index) => index.map(|r| r.0).unwrap_or_default(),
            Err(e @ (StorageError::SchemaMismatch { .. } | StorageError::Corrupt { .. })) => {
                tracing::warn!(error = %e, "ignoring unreadable dataset index");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        for key in keys {
            let id: DatasetId = match key.parse() {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(%key, error = %e, "skipping malformed dataset key");
                    continue;
                }
            };
            let record = match records::load::<DatasetRecord>(store, &key) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::warn!(%key, "dataset listed in index but not stored");
                    continue;
                }
                Err(e @ (StorageError::SchemaMismatch { .. } | StorageError::Corrupt { .. })) => {
                    tracing::warn!(%key, error = %e, "skipping unreadable dataset");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match Dataset::from_record(record, registry.cadence.clone()) {
                Ok(dataset) if dataset.id() == &id => {
                    registry.datasets.insert(id, dataset);
                }
                Ok(dataset) => {
                    tracing::warn!(%key, stored = %dataset.id(), "dataset record under wrong key");
                }
                Err(e) => tracing::warn!(%key, error = %e, "skipping invalid dataset"),
            }
        }

        tracing::debug!(count = registry.datasets.len(), "datasets loaded");
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn get(&self, id: &DatasetId) -> Option<&Dataset> {
        self.datasets.get(id)
    }

    /// Dataset that produced the last served question.
    pub fn current(&self) -> Option<&DatasetId> {
        self.current.as_ref()
    }

    /// Identities of every registered dataset.
    pub fn list(&self) -> Vec<DatasetId> {
        self.datasets.keys().cloned().collect()
    }

    /// Register a fresh dataset with every item in box one, replacing any
    /// dataset with the same identity.
    pub fn add(
        &mut self,
        store: &dyn Store,
        id: DatasetId,
        meta: DatasetMeta,
    ) -> Result<(), StorageError> {
        let dataset = Dataset::new(id.clone(), meta, self.cadence.clone());
        if self.current.as_ref() == Some(&id) {
            self.current = None;
        }
        self.datasets.insert(id.clone(), dataset);
        tracing::info!(dataset = %id, "dataset added");
        self.save_index(store)?;
        self.save_dataset(store, &id)
    }

    /// Unregister a dataset. Its own record is left in the store.
    pub fn remove(&mut self, store: &dyn Store, id: &DatasetId) -> Result<bool, StorageError> {
        if self.datasets.remove(id).is_none() {
            return Ok(false);
        }
        if self.current.as_ref() == Some(id) {
            self.current = None;
        }
        tracing::info!(dataset = %id, "dataset removed");
        self.save_index(store)?;
        Ok(true)
    }

    /// Choose a dataset uniformly at random and plan its next item.
    pub fn plan_next<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<PlannedQuestion, QuizError> {
        let id = self
            .datasets
            .keys()
            .choose(rng)
            .cloned()
            .ok_or(QuizError::NoDatasets)?;
        let dataset = self
            .datasets
            .get_mut(&id)
            .ok_or_else(|| QuizError::UnknownDataset(id.key()))?;
        let pick = dataset.plan_next(rng)?;
        Ok(PlannedQuestion { dataset: id, pick })
    }

    /// Mark a planned question as served once its content is in hand.
    ///
    /// Returns false if the dataset was removed in the meantime.
    pub fn commit(
        &mut self,
        store: &dyn Store,
        planned: &PlannedQuestion,
    ) -> Result<bool, StorageError> {
        let Some(dataset) = self.datasets.get_mut(&planned.dataset) else {
            return Ok(false);
        };
        dataset.commit_served(planned.pick);
        self.current = Some(planned.dataset.clone());
        self.save_dataset(store, &planned.dataset)?;
        Ok(true)
    }

    /// Grade the last served question. A no-op when nothing is pending.
    pub fn grade(
        &mut self,
        store: &dyn Store,
        correct: bool,
    ) -> Result<Option<Regrade>, StorageError> {
        let Some(id) = self.current.take() else {
            return Ok(None);
        };
        let Some(dataset) = self.datasets.get_mut(&id) else {
            return Ok(None);
        };
        let Some(regrade) = dataset.grade(correct) else {
            return Ok(None);
        };
        self.save_dataset(store, &id)?;
        Ok(Some(regrade))
    }

    fn save_index(&self, store: &dyn Store) -> Result<(), StorageError> {
        let keys = self.datasets.keys().map(DatasetId::key).collect();
        records::save(store, DATASET_INDEX_KEY, &DatasetIndexRecord(keys))
    }

    fn save_dataset(&self, store: &dyn Store, id: &DatasetId) -> Result<(), StorageError> {
        match self.datasets.get(id) {
            Some(dataset) => records::save(store, &id.key(), &dataset.record()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentSource, MemorySource};
    use crate::storage::MemoryStore;
    use rand::SeedableRng;
    use rand_pcg::Mcg128Xsl64;

    fn id(name: &str) -> DatasetId {
        DatasetId::new("user", name, "main").unwrap()
    }

    fn numbered(count: usize) -> Vec<QuizItem> {
        (0..count)
            .map(|i| QuizItem {
                question: format!("question {i}"),
                answer: format!("answer {i}"),
            })
            .collect()
    }

    /// Plan, fetch and commit one question, the way the orchestrator does.
    async fn serve(
        registry: &mut DatasetRegistry,
        store: &MemoryStore,
        source: &MemorySource,
        rng: &mut Mcg128Xsl64,
    ) -> Option<ServedQuestion> {
        let planned = registry.plan_next(rng).ok()?;
        let item = source
            .fetch_item(&planned.dataset, planned.pick.item)
            .await
            .ok()?;
        assert!(registry.commit(store, &planned).unwrap());
        Some(ServedQuestion {
            dataset: planned.dataset,
            pick: planned.pick,
            item,
        })
    }

    #[test]
    fn empty_registry_has_no_datasets() {
        let mut registry = DatasetRegistry::default();
        let mut rng = Mcg128Xsl64::seed_from_u64(0);
        assert!(matches!(registry.plan_next(&mut rng), Err(QuizError::NoDatasets)));
    }

    #[test]
    fn add_persists_index_and_record() {
        let store = MemoryStore::new();
        let mut registry = DatasetRegistry::default();
        registry.add(&store, id("a"), DatasetMeta::with_length(3)).unwrap();

        let reloaded = DatasetRegistry::load(&store, SchedulerConfig::default()).unwrap();
        assert_eq!(reloaded.list(), vec![id("a")]);
        assert_eq!(reloaded.get(&id("a")).unwrap().boxes().one, vec![0, 1, 2]);
    }

    #[test]
    fn remove_updates_index_only() {
        let store = MemoryStore::new();
        let mut registry = DatasetRegistry::default();
        registry.add(&store, id("a"), DatasetMeta::with_length(1)).unwrap();
        registry.add(&store, id("b"), DatasetMeta::with_length(1)).unwrap();
        assert!(registry.remove(&store, &id("a")).unwrap());
        assert!(!registry.remove(&store, &id("a")).unwrap());

        let reloaded = DatasetRegistry::load(&store, SchedulerConfig::default()).unwrap();
        assert_eq!(reloaded.list(), vec![id("b")]);
        assert!(store.get("user.a.main").unwrap().is_some());
    }

    #[test]
    fn load_skips_invalid_records() {
        let store = MemoryStore::new();
        let mut registry = DatasetRegistry::default();
        registry.add(&store, id("a"), DatasetMeta::with_length(2)).unwrap();
        registry.add(&store, id("b"), DatasetMeta::with_length(2)).unwrap();
        store.set("user.b.main", r#"{"version":1,"data":{"broken":true}}"#).unwrap();

        let reloaded = DatasetRegistry::load(&store, SchedulerConfig::default()).unwrap();
        assert_eq!(reloaded.list(), vec![id("a")]);
    }

    #[test]
    fn grade_without_dispatch_is_noop() {
        let store = MemoryStore::new();
        let mut registry = DatasetRegistry::default();
        registry.add(&store, id("a"), DatasetMeta::with_length(2)).unwrap();
        assert!(registry.grade(&store, true).unwrap().is_none());
    }

    #[tokio::test]
    async fn served_question_routes_grade_to_serving_dataset() {
        let store = MemoryStore::new();
        let source = MemorySource::new();
        source.insert_dataset(&id("a"), numbered(3));
        source.insert_dataset(&id("b"), numbered(3));

        let mut registry = DatasetRegistry::default();
        registry.add(&store, id("a"), DatasetMeta::with_length(3)).unwrap();
        registry.add(&store, id("b"), DatasetMeta::with_length(3)).unwrap();

        let mut rng = Mcg128Xsl64::seed_from_u64(11);
        let served = serve(&mut registry, &store, &source, &mut rng).await.unwrap();
        assert_eq!(registry.current(), Some(&served.dataset));

        let regrade = registry.grade(&store, true).unwrap().unwrap();
        assert_eq!(regrade.item, served.pick.item);
        let boxes = registry.get(&served.dataset).unwrap().boxes();
        assert_eq!(boxes.two, vec![served.pick.item]);
        assert!(registry.current().is_none());
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_linkage() {
        let store = MemoryStore::new();
        let source = MemorySource::new();
        source.insert_dataset(&id("a"), numbered(1));

        let mut registry = DatasetRegistry::default();
        registry.add(&store, id("a"), DatasetMeta::with_length(2)).unwrap();
        let mut rng = Mcg128Xsl64::seed_from_u64(5);

        // Item 1 has no content, item 0 does; dispatch until item 0 is served.
        let served = loop {
            if let Some(served) = serve(&mut registry, &store, &source, &mut rng).await {
                break served;
            }
        };
        assert_eq!(served.pick.item, 0);

        // Keep asking until a fetch fails; the pending item must survive.
        loop {
            if serve(&mut registry, &store, &source, &mut rng).await.is_none() {
                break;
            }
        }
        let dataset = registry.get(&id("a")).unwrap();
        assert_eq!(dataset.last_served().map(|p| p.item), Some(0));
        assert_eq!(registry.current(), Some(&id("a")));
        assert_eq!(dataset.boxes().len(), 2);
    }
}
