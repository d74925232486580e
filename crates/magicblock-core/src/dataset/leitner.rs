//! Leitner scheduling for a single dataset.
//!
//! Items live in exactly one of three boxes (`one` = least mastered). Every
//! dispatch advances a one-based cyclic interval counter; when the counter
//! lands on the configured box-3 period and box 3 has items, a box-3 item is
//! served, likewise for box 2, and otherwise box 1 is used. Grading moves the
//! last served item up one box on a correct answer and down one box on a
//! wrong one.
//!
//! The boxes always partition `0..meta.length`: no item is lost, duplicated
//! or present in two boxes.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{DatasetId, DatasetMeta};
use crate::error::{QuizError, ValidationError};
use crate::storage::records::DatasetRecord;
use crate::storage::SchedulerConfig;

/// One of the three mastery boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxId {
    One,
    Two,
    Three,
}

impl BoxId {
    pub const ALL: [BoxId; 3] = [BoxId::One, BoxId::Two, BoxId::Three];

    pub fn promoted(self) -> Self {
        match self {
            BoxId::One => BoxId::Two,
            BoxId::Two | BoxId::Three => BoxId::Three,
        }
    }

    pub fn demoted(self) -> Self {
        match self {
            BoxId::One | BoxId::Two => BoxId::One,
            BoxId::Three => BoxId::Two,
        }
    }
}

/// The three boxes of item indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Boxes {
    pub one: Vec<usize>,
    pub two: Vec<usize>,
    pub three: Vec<usize>,
}

impl Boxes {
    /// All of `0..item_count` in box one.
    pub fn seeded(item_count: usize) -> Self {
        Self {
            one: (0..item_count).collect(),
            two: Vec::new(),
            three: Vec::new(),
        }
    }

    pub fn get(&self, id: BoxId) -> &[usize] {
        match id {
            BoxId::One => &self.one,
            BoxId::Two => &self.two,
            BoxId::Three => &self.three,
        }
    }

    fn get_mut(&mut self, id: BoxId) -> &mut Vec<usize> {
        match id {
            BoxId::One => &mut self.one,
            BoxId::Two => &mut self.two,
            BoxId::Three => &mut self.three,
        }
    }

    /// Total number of items across the boxes.
    pub fn len(&self) -> usize {
        self.one.len() + self.two.len() + self.three.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The box currently holding `item`.
    pub fn locate(&self, item: usize) -> Option<BoxId> {
        BoxId::ALL
            .into_iter()
            .find(|id| self.get(*id).contains(&item))
    }

    /// Whether the boxes partition exactly `0..item_count`.
    pub fn is_partition_of(&self, item_count: usize) -> bool {
        if self.len() != item_count {
            return false;
        }
        let mut seen = vec![false; item_count];
        for item in self.one.iter().chain(&self.two).chain(&self.three) {
            match seen.get_mut(*item) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }

    /// Move `item` from `from` to the back of `to`. Returns false (and
    /// changes nothing) if `item` is not in `from`.
    fn move_item(&mut self, item: usize, from: BoxId, to: BoxId) -> bool {
        let source = self.get_mut(from);
        let Some(pos) = source.iter().position(|i| *i == item) else {
            return false;
        };
        source.remove(pos);
        self.get_mut(to).push(item);
        true
    }
}

/// An item chosen for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pick {
    pub box_id: BoxId,
    pub item: usize,
}

/// Outcome of grading the last served item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Regrade {
    pub item: usize,
    pub from_box: BoxId,
    pub to_box: BoxId,
    pub correct: bool,
}

/// A dataset and its scheduling state.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: DatasetId,
    meta: DatasetMeta,
    boxes: Boxes,
    interval_counter: u32,
    cadence: SchedulerConfig,
    last_served: Option<Pick>,
}

impl Dataset {
    /// A fresh dataset with every item in box one.
    pub fn new(id: DatasetId, meta: DatasetMeta, cadence: SchedulerConfig) -> Self {
        let boxes = Boxes::seeded(meta.length);
        Self {
            id,
            meta,
            boxes,
            interval_counter: 0,
            cadence,
            last_served: None,
        }
    }

    /// Rebuild from a persisted record, rejecting boxes that don't partition
    /// the item range.
    pub fn from_record(
        record: DatasetRecord,
        cadence: SchedulerConfig,
    ) -> Result<Self, ValidationError> {
        let id = DatasetId::new(record.username, record.repository, record.branch)?;
        if !record.boxes.is_partition_of(record.meta.length) {
            return Err(ValidationError::InvalidValue {
                field: format!("{id}.boxes"),
                message: format!(
                    "boxes do not partition 0..{} ({} items filed)",
                    record.meta.length,
                    record.boxes.len()
                ),
            });
        }
        Ok(Self {
            id,
            meta: record.meta,
            boxes: record.boxes,
            interval_counter: record.interval_counter,
            cadence,
            last_served: None,
        })
    }

    pub fn record(&self) -> DatasetRecord {
        DatasetRecord {
            username: self.id.username().to_string(),
            repository: self.id.repository().to_string(),
            branch: self.id.branch().to_string(),
            meta: self.meta.clone(),
            boxes: self.boxes.clone(),
            interval_counter: self.interval_counter,
        }
    }

    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn boxes(&self) -> &Boxes {
        &self.boxes
    }

    pub fn interval_counter(&self) -> u32 {
        self.interval_counter
    }

    pub fn last_served(&self) -> Option<Pick> {
        self.last_served
    }

    /// Advance the interval counter and choose the next item.
    ///
    /// Does not touch the boxes or `last_served`; the pick only becomes
    /// gradable once [`commit_served`](Self::commit_served) is called after
    /// its content was fetched.
    pub fn plan_next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Pick, QuizError> {
        if self.boxes.is_empty() {
            return Err(QuizError::NoItems(self.id.key()));
        }

        let cycle = self.cadence.cycle_length.max(1);
        self.interval_counter = self.interval_counter % cycle + 1;
        let counter = self.interval_counter;

        let target = if counter == self.cadence.box3_period && !self.boxes.three.is_empty() {
            BoxId::Three
        } else if counter == self.cadence.box2_period && !self.boxes.two.is_empty() {
            BoxId::Two
        } else {
            BoxId::One
        };

        // Box one can run dry once everything has been promoted.
        let box_id = std::iter::once(target)
            .chain(BoxId::ALL)
            .find(|id| !self.boxes.get(*id).is_empty())
            .ok_or_else(|| QuizError::NoItems(self.id.key()))?;

        let item = *self
            .boxes
            .get(box_id)
            .choose(rng)
            .ok_or_else(|| QuizError::NoItems(self.id.key()))?;

        tracing::debug!(dataset = %self.id, counter, ?box_id, item, "planned next item");
        Ok(Pick { box_id, item })
    }

    /// Record `pick` as the item awaiting a grade, replacing any earlier one.
    pub fn commit_served(&mut self, pick: Pick) {
        self.last_served = Some(pick);
    }

    /// Re-file the last served item. Without a pending item this is a no-op.
    pub fn grade(&mut self, correct: bool) -> Option<Regrade> {
        let pick = self.last_served.take()?;
        // The item may have been re-filed since dispatch; trust the boxes.
        let from_box = self.boxes.locate(pick.item)?;
        let to_box = if correct {
            from_box.promoted()
        } else {
            from_box.demoted()
        };
        if from_box != to_box && !self.boxes.move_item(pick.item, from_box, to_box) {
            return None;
        }
        tracing::debug!(dataset = %self.id, item = pick.item, ?from_box, ?to_box, "item re-filed");
        Some(Regrade {
            item: pick.item,
            from_box,
            to_box,
            correct,
        })
    }
}
