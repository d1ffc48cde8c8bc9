//! FILENAME: core/bom-facts/src/record.rs
//! PURPOSE: Flat fact records and the table that owns them.
//! CONTEXT: A record is a field-name -> scalar mapping. Records are immutable
//! once loaded; the pivot engine borrows the table read-only and refers to
//! records by their position.

use std::borrow::Cow;
use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::value::FactValue;

/// One row of the fact table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactRecord {
    fields: FxHashMap<String, FactValue>,
}

impl FactRecord {
    pub fn new() -> Self {
        FactRecord {
            fields: FxHashMap::default(),
        }
    }

    /// Builder-style insert, used by loaders and test fixtures.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FactValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FactValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FactValue> {
        self.fields.get(field)
    }

    /// The join key stored under `field`, or `None` when the field is absent
    /// or empty.
    pub fn key_of(&self, field: &str) -> Option<Cow<'_, str>> {
        match self.fields.get(field) {
            None | Some(FactValue::Empty) => None,
            Some(value) => Some(value.as_key()),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FactValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for FactRecord
where
    K: Into<String>,
    V: Into<FactValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = FactRecord::new();
        for (field, value) in iter {
            record.insert(field, value);
        }
        record
    }
}

/// The loaded fact table. Record positions are stable for the table's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactTable {
    records: Vec<FactRecord>,
}

impl FactTable {
    pub fn new() -> Self {
        FactTable {
            records: Vec::new(),
        }
    }

    pub fn from_records(records: Vec<FactRecord>) -> Self {
        FactTable { records }
    }

    /// Reserves capacity for expected record count.
    pub fn reserve(&mut self, record_count: usize) {
        self.records.reserve(record_count);
    }

    pub fn push(&mut self, record: FactRecord) {
        self.records.push(record);
    }

    pub fn get(&self, index: usize) -> Option<&FactRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[FactRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FactRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All field names that appear in at least one record, sorted.
    pub fn field_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .records
            .iter()
            .flat_map(|r| r.fields.keys().map(String::as_str))
            .collect();
        names.into_iter().map(str::to_string).collect()
    }
}

impl FromIterator<FactRecord> for FactTable {
    fn from_iter<I: IntoIterator<Item = FactRecord>>(iter: I) -> Self {
        FactTable {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FactTable {
    type Item = &'a FactRecord;
    type IntoIter = std::slice::Iter<'a, FactRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
