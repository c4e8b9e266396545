//! Typed record collections.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{RecordError, Result};
use crate::matcher::Predicate;
use crate::record::Record;
use crate::registry::ClassRef;

/// Ordered sequence of records, all of the base type or its descendants.
#[derive(Clone)]
pub struct Collection {
    base: ClassRef,
    records: Vec<Record>,
}

impl Collection {
    pub fn new(base: ClassRef) -> Self {
        Self {
            base,
            records: Vec::new(),
        }
    }

    pub fn from_records(base: ClassRef, records: impl IntoIterator<Item = Record>) -> Result<Self> {
        let mut collection = Self::new(base);
        for record in records {
            collection.push(record)?;
        }
        Ok(collection)
    }

    pub fn base(&self) -> &ClassRef {
        &self.base
    }

    pub(crate) fn check_type(&self, record: &Record) -> Result<()> {
        if record.is_a(&self.base) {
            Ok(())
        } else {
            Err(RecordError::TypeMismatch {
                expected: self.base.name().to_string(),
                found: format!("{record:?}"),
            })
        }
    }

    /// Append a record.
    pub fn push(&mut self, record: Record) -> Result<()> {
        self.check_type(&record)?;
        self.records.push(record);
        Ok(())
    }

    /// Construct a record of the base type (or the subtype named by the
    /// payload's `type`) and append it.
    pub fn build(&mut self, attributes: &Map<String, Value>) -> Result<&mut Record> {
        let record = self.base.new_record(attributes)?;
        self.push(record)?;
        let last = self.records.len() - 1;
        Ok(&mut self.records[last])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Record> {
        self.records.iter_mut()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }

    pub fn get(&self, idx: usize) -> Option<&Record> {
        self.records.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Record> {
        self.records.get_mut(idx)
    }

    pub fn exists(&self, predicate: &Predicate<'_>) -> bool {
        self.records.iter().any(|r| predicate.matches(r))
    }

    pub fn find_by(&self, predicate: &Predicate<'_>) -> Option<&Record> {
        self.records.iter().find(|r| predicate.matches(r))
    }

    pub fn position(&self, predicate: &Predicate<'_>) -> Option<usize> {
        self.records.iter().position(|r| predicate.matches(r))
    }

    /// First record matching `attributes`, or a new one built from them.
    pub fn find_or_initialize_by(&mut self, attributes: &Map<String, Value>) -> Result<&mut Record> {
        let predicate = Predicate::from_attributes(attributes);
        match self.position(&predicate) {
            Some(idx) => Ok(&mut self.records[idx]),
            None => self.build(attributes),
        }
    }

    /// Keep only records for which `f` returns `true`.
    pub fn retain(&mut self, f: impl FnMut(&Record) -> bool) -> &mut Self {
        self.records.retain(f);
        self
    }

    /// Remove records matching `predicate`, returning how many were removed.
    pub fn remove_matching(&mut self, predicate: &Predicate<'_>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !predicate.matches(r));
        before - self.records.len()
    }

    /// Copy of the records for which `f` returns `true`.
    pub fn select(&self, mut f: impl FnMut(&Record) -> bool) -> Collection {
        Collection {
            base: self.base.clone(),
            records: self.records.iter().filter(|r| f(r)).cloned().collect(),
        }
    }

    pub fn reject(&self, mut f: impl FnMut(&Record) -> bool) -> Collection {
        self.select(|r| !f(r))
    }

    pub fn sort_by(&mut self, compare: impl FnMut(&Record, &Record) -> Ordering) -> &mut Self {
        self.records.sort_by(compare);
        self
    }

    pub fn sort_by_key<K: Ord>(&mut self, f: impl FnMut(&Record) -> K) -> &mut Self {
        self.records.sort_by_key(f);
        self
    }

    pub fn sorted_by_key<K: Ord>(&self, f: impl FnMut(&Record) -> K) -> Collection {
        let mut copy = self.clone();
        copy.sort_by_key(f);
        copy
    }

    pub fn as_json(&self) -> Value {
        Value::Array(self.records.iter().map(Record::as_json).collect())
    }
}

/// Collections compare their records in order; the base type is ignored.
impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.records).finish()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

impl Index<usize> for Collection {
    type Output = Record;

    fn index(&self, idx: usize) -> &Record {
        &self.records[idx]
    }
}

impl IndexMut<usize> for Collection {
    fn index_mut(&mut self, idx: usize) -> &mut Record {
        &mut self.records[idx]
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for Collection {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::Declare;
    use crate::registry::Registry;
    use nested_types::AttrKind;
    use serde_json::json;

    fn setup() -> (ClassRef, ClassRef) {
        let mut builder = Registry::builder();
        builder
            .define("Bar", |c| {
                c.attribute("id", AttrKind::Integer)
                    .attribute("name", AttrKind::String);
            })
            .define("Other", |_| {});
        let registry = builder.build().unwrap();
        (registry.class("Bar").unwrap(), registry.class("Other").unwrap())
    }

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn push_type_checks() {
        let (bar, other) = setup();
        let mut collection = Collection::new(bar.clone());
        collection.push(bar.build(json!({"id": 1})).unwrap()).unwrap();
        let err = collection.push(other.build(json!({})).unwrap()).unwrap_err();
        assert!(matches!(err, RecordError::TypeMismatch { expected, .. } if expected == "Bar"));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn find_or_initialize_reuses_matches() {
        let (bar, _) = setup();
        let mut collection = Collection::new(bar);
        collection.build(&attrs(json!({"id": 1, "name": "a"}))).unwrap();

        let found = collection.find_or_initialize_by(&attrs(json!({"id": 1}))).unwrap();
        assert_eq!(found.read("name"), Some(&json!("a")));
        assert_eq!(collection.len(), 1);

        collection.find_or_initialize_by(&attrs(json!({"id": 2}))).unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn filtering_and_sorting() {
        let (bar, _) = setup();
        let records = [3, 1, 2].map(|id| bar.build(json!({"id": id})).unwrap());
        let mut collection = Collection::from_records(bar, records).unwrap();

        collection.sort_by_key(|r| r.read("id").and_then(Value::as_i64));
        assert_eq!(collection.as_json(), json!([{"id": 1, "name": null}, {"id": 2, "name": null}, {"id": 3, "name": null}]));

        let odd = collection.select(|r| r.read("id").and_then(Value::as_i64).is_some_and(|id| id % 2 == 1));
        assert_eq!(odd.len(), 2);
        assert_eq!(collection.reject(|r| r.query("name")).len(), 3);

        let removed = collection.remove_matching(&Predicate::new().one_of("id", vec![json!(1), json!(3)]));
        assert_eq!(removed, 2);
        assert_eq!(collection.first().and_then(|r| r.read("id")), Some(&json!(2)));
    }
}
