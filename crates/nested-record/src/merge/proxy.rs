use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::association::AssociationSetup;
use crate::collection::Collection;
use crate::error::Result;
use crate::matcher::Predicate;
use crate::record::Record;
use crate::registry::ClassRef;

/// Mutable handle to one collection association.
///
/// Insertions through the proxy run the identity guard, so a record whose
/// key is already present is refused with
/// [`RecordError::PrimaryKey`](crate::RecordError::PrimaryKey).
pub struct CollectionProxy<'a> {
    collection: &'a mut Collection,
    owner: ClassRef,
    setup: Arc<AssociationSetup>,
}

impl<'a> CollectionProxy<'a> {
    pub(crate) fn new(collection: &'a mut Collection, owner: ClassRef, setup: Arc<AssociationSetup>) -> Self {
        Self {
            collection,
            owner,
            setup,
        }
    }

    pub fn collection(&self) -> &Collection {
        &*self.collection
    }

    pub fn setup(&self) -> &AssociationSetup {
        &self.setup
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    fn ensure_unique(&self, record: &Record) -> Result<()> {
        match self.setup.check_for_record(&self.owner, record) {
            Some(check) => check.enforce(&*self.collection, record),
            None => Ok(()),
        }
    }

    /// Append a record after type and identity checks.
    pub fn push(&mut self, record: Record) -> Result<()> {
        self.collection.check_type(&record)?;
        self.ensure_unique(&record)?;
        self.collection.push(record)
    }

    /// Construct a record from `attributes` and append it.
    pub fn build(&mut self, attributes: &Map<String, Value>) -> Result<&mut Record> {
        let record = self.collection.base().new_record(attributes)?;
        self.push(record)?;
        let last = self.collection.len() - 1;
        Ok(&mut self.collection[last])
    }

    /// First record matching `attributes`, or a new one built from them.
    pub fn find_or_initialize_by(&mut self, attributes: &Map<String, Value>) -> Result<&mut Record> {
        match self.collection.position(&Predicate::from_attributes(attributes)) {
            Some(idx) => Ok(&mut self.collection[idx]),
            None => self.build(attributes),
        }
    }

    /// Assign `attributes` to the first record matching `predicate`.
    ///
    /// The updated record must not take the identity of another record; on
    /// failure the collection is unchanged. Returns `None` when nothing
    /// matches.
    pub fn update_by(
        &mut self,
        predicate: &Predicate<'_>,
        attributes: &Map<String, Value>,
    ) -> Result<Option<&Record>> {
        let Some(idx) = self.collection.position(predicate) else {
            return Ok(None);
        };
        let mut updated = self.collection[idx].clone();
        updated.assign(attributes)?;
        if let Some(check) = self.setup.check_for_record(&self.owner, &updated) {
            let key = check.key_for_record(&updated);
            let taken = key.predicate();
            let collides = self
                .collection
                .iter()
                .enumerate()
                .any(|(i, other)| i != idx && other.matches(&taken));
            if collides {
                return Err(key.violation());
            }
        }
        self.collection[idx] = updated;
        Ok(Some(&self.collection[idx]))
    }

    pub fn retain(&mut self, f: impl FnMut(&Record) -> bool) -> &mut Self {
        self.collection.retain(f);
        self
    }

    pub fn remove_matching(&mut self, predicate: &Predicate<'_>) -> usize {
        self.collection.remove_matching(predicate)
    }

    pub fn sort_by(&mut self, compare: impl FnMut(&Record, &Record) -> Ordering) -> &mut Self {
        self.collection.sort_by(compare);
        self
    }

    pub fn sort_by_key<K: Ord>(&mut self, f: impl FnMut(&Record) -> K) -> &mut Self {
        self.collection.sort_by_key(f);
        self
    }

    pub fn clear(&mut self) {
        self.collection.clear();
    }
}
