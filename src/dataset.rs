//! Ordered, id-keyed collection of activity records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::ActivityRecord;

/// Records in stored order with at most one entry per activity id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<ActivityRecord>,
    index: HashMap<u64, usize>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records, keeping the first occurrence of each id.
    pub fn from_records(records: impl IntoIterator<Item = ActivityRecord>) -> Self {
        let mut dataset = Self::new();
        for record in records {
            dataset.insert_if_absent(record);
        }
        dataset
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: u64) -> Option<&ActivityRecord> {
        self.index.get(&id).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut ActivityRecord> {
        match self.index.get(&id) {
            Some(&i) => Some(&mut self.records[i]),
            None => None,
        }
    }

    /// Append a record unless its id is already present. Returns true if inserted.
    pub fn insert_if_absent(&mut self, record: ActivityRecord) -> bool {
        let id = record.id();
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id, self.records.len());
        self.records.push(record);
        true
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ActivityRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    /// Ids in stored order.
    pub fn ids(&self) -> Vec<u64> {
        self.records.iter().map(ActivityRecord::id).collect()
    }

    /// Most recent `start_date` across all records.
    pub fn latest_start_date(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.summary.start_date).max()
    }

    /// Cutoff for the next list fetch: latest start as Unix seconds, or 0 for "all history".
    pub fn fetch_cutoff(&self) -> i64 {
        self.latest_start_date().map_or(0, |d| d.timestamp())
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a ActivityRecord;
    type IntoIter = std::slice::Iter<'a, ActivityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for Dataset {
    type Item = ActivityRecord;
    type IntoIter = std::vec::IntoIter<ActivityRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl FromIterator<ActivityRecord> for Dataset {
    fn from_iter<I: IntoIterator<Item = ActivityRecord>>(iter: I) -> Self {
        Self::from_records(iter)
    }
}
