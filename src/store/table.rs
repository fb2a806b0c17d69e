//! Tables and record matching
//!
//! A table owns its record sequence behind its own mutex. Every read and
//! every write of the sequence happens while that mutex is held, which
//! totally orders operations against a single table.

use crate::store::image::TableImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Column name → value. Keys outside the declared columns are kept as-is.
pub type Record = BTreeMap<String, String>;

/// Conjunction of exact-match key/value pairs
pub type Conditions = BTreeMap<String, String>;

/// Key/value pairs written into every matched record
pub type Patch = BTreeMap<String, String>;

/// Where a table's declared columns came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaOrigin {
    /// Created through an explicit create-table call
    #[default]
    Declared,
    /// Created on the fly by a replicated mutation
    Inferred,
}

/// Does `record` satisfy every condition? A condition key missing from the
/// record never matches; empty conditions match everything.
pub fn matches(record: &Record, conditions: &Conditions) -> bool {
    conditions
        .iter()
        .all(|(key, expected)| record.get(key) == Some(expected))
}

#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    origin: SchemaOrigin,
    records: Mutex<Vec<Record>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>, origin: SchemaOrigin) -> Self {
        Self::with_records(name, columns, origin, Vec::new())
    }

    pub fn with_records(
        name: impl Into<String>,
        columns: Vec<String>,
        origin: SchemaOrigin,
        records: Vec<Record>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            origin,
            records: Mutex::new(records),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared columns. Metadata only, never enforced on records.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn origin(&self) -> SchemaOrigin {
        self.origin
    }

    // A panic while holding the lock cannot leave the Vec half-written, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record. No deduplication.
    pub fn append(&self, record: Record) {
        self.lock().push(record);
    }

    /// Copy of the records in insertion order, cut to the first `limit`
    /// records when `limit` is positive and below the record count.
    pub fn records(&self, limit: Option<usize>) -> Vec<Record> {
        let records = self.lock();
        match limit {
            Some(limit) if limit > 0 && limit < records.len() => records[..limit].to_vec(),
            _ => records.clone(),
        }
    }

    /// Apply `patch` to every matching record; returns how many matched.
    pub fn update_where(&self, conditions: &Conditions, patch: &Patch) -> usize {
        let mut records = self.lock();
        let mut updated = 0;
        for record in records.iter_mut().filter(|r| matches(r, conditions)) {
            for (key, value) in patch {
                record.insert(key.clone(), value.clone());
            }
            updated += 1;
        }
        updated
    }

    /// Remove every matching record, keeping the rest in their original
    /// order; returns how many were removed.
    pub fn delete_where(&self, conditions: &Conditions) -> usize {
        let mut records = self.lock();
        let (removed, kept): (Vec<Record>, Vec<Record>) = std::mem::take(&mut *records)
            .into_iter()
            .partition(|r| matches(r, conditions));
        *records = kept;
        removed.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn image(&self) -> TableImage {
        TableImage {
            name: self.name.clone(),
            columns: self.columns.clone(),
            origin: self.origin,
            records: self.records(None),
        }
    }
}

impl From<TableImage> for Table {
    fn from(image: TableImage) -> Self {
        Table::with_records(image.name, image.columns, image.origin, image.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_conjunction_matching() {
        let conditions = rec(&[("a", "1"), ("b", "2")]);

        assert!(matches(&rec(&[("a", "1"), ("b", "2")]), &conditions));
        assert!(matches(&rec(&[("a", "1"), ("b", "2"), ("c", "x")]), &conditions));
        assert!(!matches(&rec(&[("a", "1")]), &conditions));
        assert!(!matches(&rec(&[("a", "1"), ("b", "3")]), &conditions));
        assert!(!matches(&rec(&[]), &conditions));
    }

    #[test]
    fn test_absent_key_never_matches_empty_value() {
        let conditions = rec(&[("a", "")]);
        assert!(!matches(&rec(&[("b", "1")]), &conditions));
        assert!(matches(&rec(&[("a", "")]), &conditions));
    }

    #[test]
    fn test_empty_conditions_match_all() {
        let table = Table::new("t", vec![], SchemaOrigin::Declared);
        table.append(rec(&[("x", "1")]));
        table.append(rec(&[]));

        assert_eq!(table.update_where(&Conditions::new(), &rec(&[("y", "2")])), 2);
        assert!(table.records(None).iter().all(|r| r["y"] == "2"));
        assert_eq!(table.delete_where(&Conditions::new()), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_limit_truncation() {
        let table = Table::new("t", vec!["n".into()], SchemaOrigin::Declared);
        for i in 0..5 {
            table.append(rec(&[("n", i.to_string().as_str())]));
        }

        let first_two = table.records(Some(2));
        assert_eq!(first_two, vec![rec(&[("n", "0")]), rec(&[("n", "1")])]);
        assert_eq!(table.records(Some(5)).len(), 5);
        assert_eq!(table.records(Some(50)).len(), 5);
        assert_eq!(table.records(Some(0)).len(), 5);
        assert_eq!(table.records(None).len(), 5);
    }

    #[test]
    fn test_delete_keeps_order_of_survivors() {
        let table = Table::new("t", vec![], SchemaOrigin::Declared);
        for (id, kind) in [("1", "a"), ("2", "b"), ("3", "a"), ("4", "b")] {
            table.append(rec(&[("id", id), ("kind", kind)]));
        }

        assert_eq!(table.delete_where(&rec(&[("kind", "a")])), 2);
        let ids: Vec<_> = table.records(None).into_iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec!["2", "4"]);
    }

    #[test]
    fn test_update_adds_missing_keys() {
        let table = Table::new("t", vec![], SchemaOrigin::Declared);
        table.append(rec(&[("id", "1")]));

        assert_eq!(table.update_where(&rec(&[("id", "1")]), &rec(&[("note", "hi")])), 1);
        assert_eq!(table.records(None)[0]["note"], "hi");
    }
}
