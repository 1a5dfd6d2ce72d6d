use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{ArchiveError, Result};
use crate::record::{IndexRow, Record, RecordId};

/// Fields the collection keeps a sorted order for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Subject,
    Author,
    Timestamp,
    Id,
}

impl SortField {
    pub const ALL: [SortField; 4] = [SortField::Subject, SortField::Author, SortField::Timestamp, SortField::Id];

    pub fn name(self) -> &'static str {
        match self {
            SortField::Subject => "subject",
            SortField::Author => "author",
            SortField::Timestamp => "timestamp",
            SortField::Id => "id",
        }
    }

    /// The value this field sorts `record` by.
    pub fn value(self, record: &Record) -> SortValue {
        match self {
            SortField::Subject => SortValue::Text(record.subject.clone()),
            SortField::Author => SortValue::Text(record.author.clone()),
            SortField::Timestamp => SortValue::Number(record.timestamp),
            SortField::Id => SortValue::Number(i64::from(record.id)),
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "subject" => Ok(SortField::Subject),
            "author" | "shortdisplayauthor" => Ok(SortField::Author),
            "timestamp" | "date" => Ok(SortField::Timestamp),
            "id" => Ok(SortField::Id),
            other => Err(format!("unknown sort field '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SortValue {
    Number(i64),
    Text(String),
}

#[derive(Debug, Default)]
struct FieldOrder {
    ascending: Vec<usize>,
    descending: Vec<usize>,
}

/// All records of a corpus snapshot, addressable by id and viewable in the
/// order of any [`SortField`]. Filled once, read-only afterwards.
#[derive(Debug, Default)]
pub struct IndexedCollection {
    records: Vec<Record>,
    by_id: HashMap<RecordId, usize>,
    orders: HashMap<SortField, FieldOrder>,
    loaded: bool,
}

impl IndexedCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from index rows in corpus order.
    pub fn from_rows(rows: Vec<IndexRow>) -> Result<Self> {
        let mut collection = Self::new();
        collection.insert_all(Record::from_rows(rows))?;
        Ok(collection)
    }

    /// Bulk-load every record. Only one load per collection is allowed.
    pub fn insert_all(&mut self, records: Vec<Record>) -> Result<()> {
        if self.loaded {
            return Err(ArchiveError::AlreadyLoaded);
        }

        let mut by_id = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if record.id == 0 {
                return Err(ArchiveError::InvalidRecordId(record.id));
            }
            if by_id.insert(record.id, pos).is_some() {
                return Err(ArchiveError::DuplicateId(record.id));
            }
        }

        let orders = SortField::ALL
            .iter()
            .map(|&field| (field, build_order(&records, field)))
            .collect();

        self.records = records;
        self.by_id = by_id;
        self.orders = orders;
        self.loaded = true;
        tracing::info!(records = self.records.len(), "collection loaded");
        Ok(())
    }

    pub fn find_by_id(&self, id: RecordId) -> Option<&Record> {
        self.by_id.get(&id).map(|&pos| &self.records[pos])
    }

    /// All records ordered by `field`; equal keys keep insertion order.
    pub fn sorted_view(&self, field: SortField, descending: bool) -> SortedView<'_> {
        let order = self.orders.get(&field).map(|o| {
            if descending {
                o.descending.as_slice()
            } else {
                o.ascending.as_slice()
            }
        });
        SortedView {
            records: &self.records,
            order,
        }
    }

    /// All records in insertion order.
    pub fn insertion_view(&self) -> SortedView<'_> {
        SortedView {
            records: &self.records,
            order: None,
        }
    }

    pub fn last_id(&self) -> Option<RecordId> {
        self.records.iter().map(|r| r.id).max()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum Key {
    Number(i64),
    Text(String),
}

fn sort_key(record: &Record, field: SortField) -> Key {
    match field.value(record) {
        SortValue::Number(n) => Key::Number(n),
        SortValue::Text(s) => Key::Text(s.to_lowercase()),
    }
}

fn build_order(records: &[Record], field: SortField) -> FieldOrder {
    let keys: Vec<Key> = records.iter().map(|r| sort_key(r, field)).collect();
    let mut ascending: Vec<usize> = (0..records.len()).collect();
    ascending.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
    let mut descending: Vec<usize> = (0..records.len()).collect();
    descending.sort_by(|&a, &b| keys[b].cmp(&keys[a]));
    FieldOrder { ascending, descending }
}

/// Borrowed ordered view over the whole collection.
#[derive(Debug, Clone, Copy)]
pub struct SortedView<'a> {
    records: &'a [Record],
    order: Option<&'a [usize]>,
}

impl<'a> SortedView<'a> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&'a Record> {
        match self.order {
            Some(order) => order.get(pos).map(|&i| &self.records[i]),
            None => self.records.get(pos),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Record> + 'a {
        let records = self.records;
        let order = self.order;
        (0..records.len()).map(move |pos| match order {
            Some(order) => &records[order[pos]],
            None => &records[pos],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<IndexRow> {
        vec![
            IndexRow { id: 1, subject: "beta".into(), author_name: "Zed".into(), timestamp: 30, ..Default::default() },
            IndexRow { id: 2, subject: "Alpha".into(), author_name: "amy".into(), timestamp: 10, ..Default::default() },
            IndexRow { id: 3, subject: "alpha".into(), author_name: "Bob".into(), timestamp: 30, ..Default::default() },
        ]
    }

    fn ids(view: SortedView<'_>) -> Vec<RecordId> {
        view.iter().map(|r| r.id).collect()
    }

    #[test]
    fn text_sorts_ignore_case_and_ties_keep_insertion_order() {
        let c = IndexedCollection::from_rows(rows()).unwrap();
        assert_eq!(ids(c.sorted_view(SortField::Subject, false)), vec![2, 3, 1]);
        assert_eq!(ids(c.sorted_view(SortField::Subject, true)), vec![1, 2, 3]);
        assert_eq!(ids(c.sorted_view(SortField::Author, false)), vec![2, 3, 1]);
    }

    #[test]
    fn numeric_sorts() {
        let c = IndexedCollection::from_rows(rows()).unwrap();
        assert_eq!(ids(c.sorted_view(SortField::Timestamp, false)), vec![2, 1, 3]);
        assert_eq!(ids(c.sorted_view(SortField::Timestamp, true)), vec![1, 3, 2]);
        assert_eq!(ids(c.sorted_view(SortField::Id, true)), vec![3, 2, 1]);
        assert_eq!(c.sorted_view(SortField::Id, true).get(0).map(|r| r.id), Some(3));
    }

    #[test]
    fn lookup_and_last_id() {
        let c = IndexedCollection::from_rows(rows()).unwrap();
        assert_eq!(c.find_by_id(2).map(|r| r.subject.as_str()), Some("Alpha"));
        assert!(c.find_by_id(9).is_none());
        assert_eq!(c.last_id(), Some(3));
        assert_eq!(ids(c.insertion_view()), vec![1, 2, 3]);
    }

    #[test]
    fn second_load_and_duplicates_are_rejected() {
        let mut c = IndexedCollection::from_rows(rows()).unwrap();
        assert!(matches!(c.insert_all(vec![]), Err(ArchiveError::AlreadyLoaded)));

        let mut dup = rows();
        dup[2].id = 1;
        assert!(matches!(IndexedCollection::from_rows(dup), Err(ArchiveError::DuplicateId(1))));
    }
}
