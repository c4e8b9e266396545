//! Association merge engine.
//!
//! Per-association operations on a [`Record`], parameterized by association
//! name:
//!
//! | operation | one | many |
//! |-----------|-----|------|
//! | read | [`Record::one`] | [`Record::many`] |
//! | write (type-checked) | [`Record::set_one`] | [`Record::set_many`] |
//! | bulk write | [`Record::write_attributes`] | [`Record::write_attributes`] |
//! | build | [`Record::build_one`], [`Record::one_or_build`] | [`Record::proxy`] |
//!
//! Bulk writes follow the association's strategy. `rewrite` replaces the
//! value wholesale; `upsert` updates records matched by identity and appends
//! the rest. Every install into a collection runs the identity guard.

mod many;
mod one;
mod proxy;

pub use proxy::CollectionProxy;

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::association::{AssociationSetup, Cardinality, ATTRIBUTES_SUFFIX};
use crate::codec::{ManyCodec, OneCodec, TextCodec};
use crate::collection::Collection;
use crate::declare::WriterStrategy;
use crate::error::{RecordError, Result};
use crate::record::{Field, Record};

impl Record {
    fn association_setup(&self, name: &str, cardinality: Option<Cardinality>) -> Result<Arc<AssociationSetup>> {
        self.class()
            .association(name)
            .filter(|setup| cardinality.map_or(true, |c| setup.cardinality() == c))
            .cloned()
            .ok_or_else(|| self.unknown_association(name))
    }

    fn unknown_association(&self, name: &str) -> RecordError {
        RecordError::UnknownAssociation {
            class: self.class().name().to_string(),
            name: name.to_string(),
        }
    }

    /// Association holding `name` when `name` is a nested accessor of an
    /// inline record rather than a field of this record.
    fn delegated_holder(&self, name: &str) -> Option<String> {
        if self.field(name).is_some() {
            return None;
        }
        self.class().def().delegations.get(name).cloned()
    }

    /// Current value of a single-record association.
    pub fn one(&self, name: &str) -> Result<Option<&Record>> {
        match self.field(name) {
            Some(Field::One(record)) => Ok(record.as_deref()),
            None => match self.delegated_holder(name) {
                Some(holder) => match self.one(&holder)? {
                    Some(inner) => inner.one(name),
                    None => Ok(None),
                },
                None => Err(self.unknown_association(name)),
            },
            _ => Err(self.unknown_association(name)),
        }
    }

    pub fn one_mut(&mut self, name: &str) -> Result<Option<&mut Record>> {
        if let Some(holder) = self.delegated_holder(name) {
            return self.one_or_build(&holder)?.one_mut(name);
        }
        let setup = self.association_setup(name, Some(Cardinality::One))?;
        one::slot(self, &setup).map(|record| record.as_deref_mut())
    }

    /// Current value of a collection association.
    ///
    /// A nested accessor whose holder record is absent has no collection to
    /// read and reports [`RecordError::UnknownAssociation`].
    pub fn many(&self, name: &str) -> Result<&Collection> {
        match self.field(name) {
            Some(Field::Many(collection)) => Ok(collection),
            None => match self.delegated_holder(name) {
                Some(holder) => match self.one(&holder)? {
                    Some(inner) => inner.many(name),
                    None => Err(self.unknown_association(name)),
                },
                None => Err(self.unknown_association(name)),
            },
            _ => Err(self.unknown_association(name)),
        }
    }

    /// Replace a single-record association. The record must be an instance
    /// of the association's record type.
    pub fn set_one(&mut self, name: &str, record: Option<Record>) -> Result<()> {
        if let Some(holder) = self.delegated_holder(name) {
            return self.one_or_build(&holder)?.set_one(name, record);
        }
        let setup = self.association_setup(name, Some(Cardinality::One))?;
        one::write(self, &setup, record)
    }

    /// Replace a collection association. Every record is type-checked and
    /// the identity guard runs over the new collection; on failure the
    /// previous value is kept.
    pub fn set_many(&mut self, name: &str, records: impl IntoIterator<Item = Record>) -> Result<()> {
        if let Some(holder) = self.delegated_holder(name) {
            return self.one_or_build(&holder)?.set_many(name, records);
        }
        let setup = self.association_setup(name, Some(Cardinality::Many))?;
        many::write(self, &setup, records)
    }

    /// Construct a fresh record for a single-record association.
    pub fn build_one(&mut self, name: &str, attributes: &Map<String, Value>) -> Result<&mut Record> {
        if let Some(holder) = self.delegated_holder(name) {
            return self.one_or_build(&holder)?.build_one(name, attributes);
        }
        let setup = self.association_setup(name, Some(Cardinality::One))?;
        one::build(self, &setup, attributes)
    }

    /// The current record of a single-record association, built from
    /// defaults if absent.
    pub fn one_or_build(&mut self, name: &str) -> Result<&mut Record> {
        if let Some(holder) = self.delegated_holder(name) {
            return self.one_or_build(&holder)?.one_or_build(name);
        }
        let setup = self.association_setup(name, Some(Cardinality::One))?;
        one::get_or_build(self, &setup)
    }

    /// Bulk attributes writer (`<name>_attributes`), merging with the
    /// association's configured strategy.
    pub fn write_attributes(&mut self, name: &str, payload: &Value) -> Result<()> {
        if let Some(holder) = self.delegated_holder(name) {
            return self.one_or_build(&holder)?.write_attributes(name, payload);
        }
        let setup = self.association_setup(name, None)?;
        match setup.strategy() {
            Some(strategy) => self.merge(&setup, strategy, payload),
            None => Err(RecordError::UnknownAttribute {
                class: self.class().name().to_string(),
                attribute: format!("{name}{ATTRIBUTES_SUFFIX}"),
            }),
        }
    }

    /// Replace the association value with records built from `payload`.
    pub fn rewrite_attributes(&mut self, name: &str, payload: &Value) -> Result<()> {
        if let Some(holder) = self.delegated_holder(name) {
            return self.one_or_build(&holder)?.rewrite_attributes(name, payload);
        }
        let setup = self.association_setup(name, None)?;
        self.merge(&setup, WriterStrategy::Rewrite, payload)
    }

    /// Update records matched by identity and append the rest.
    pub fn upsert_attributes(&mut self, name: &str, payload: &Value) -> Result<()> {
        if let Some(holder) = self.delegated_holder(name) {
            return self.one_or_build(&holder)?.upsert_attributes(name, payload);
        }
        let setup = self.association_setup(name, None)?;
        self.merge(&setup, WriterStrategy::Upsert, payload)
    }

    fn merge(&mut self, setup: &AssociationSetup, strategy: WriterStrategy, payload: &Value) -> Result<()> {
        match (setup.cardinality(), strategy) {
            (Cardinality::One, WriterStrategy::Rewrite) => one::rewrite(self, setup, payload),
            (Cardinality::One, WriterStrategy::Upsert) => one::upsert(self, setup, payload),
            (Cardinality::Many, WriterStrategy::Rewrite) => many::rewrite(self, setup, payload),
            (Cardinality::Many, WriterStrategy::Upsert) => many::upsert(self, setup, payload),
        }
    }

    /// Guarded handle to a collection association.
    pub fn proxy(&mut self, name: &str) -> Result<CollectionProxy<'_>> {
        if let Some(holder) = self.delegated_holder(name) {
            return self.one_or_build(&holder)?.proxy(name);
        }
        let setup = self.association_setup(name, Some(Cardinality::Many))?;
        let owner = self.class().clone();
        let collection = many::slot(self, &setup)?;
        Ok(CollectionProxy::new(collection, owner, setup))
    }

    /// Text stored in the association's column. An absent single record
    /// stores no text.
    pub fn dump_association(&self, name: &str) -> Result<Option<String>> {
        let setup = self.association_setup(name, None)?;
        let record_class = setup.record_class(self.class());
        match self.field(name) {
            Some(Field::One(record)) => Ok(TextCodec::new(OneCodec::new(record_class))
                .encode_text(&record.as_deref().cloned())),
            Some(Field::Many(collection)) => {
                Ok(TextCodec::new(ManyCodec::new(record_class)).encode_text(collection))
            }
            _ => Err(self.unknown_association(name)),
        }
    }

    /// Load the association from column text. Stored documents are trusted:
    /// scalars are deserialized by kind, no writers and no identity guard.
    pub fn load_association(&mut self, name: &str, text: &str) -> Result<()> {
        let setup = self.association_setup(name, None)?;
        let record_class = setup.record_class(self.class());
        match setup.cardinality() {
            Cardinality::One => {
                let record = TextCodec::new(OneCodec::new(record_class)).decode_text(text)?;
                *one::slot(self, &setup)? = record.map(Box::new);
            }
            Cardinality::Many => {
                let collection = TextCodec::new(ManyCodec::new(record_class)).decode_text(text)?;
                *many::slot(self, &setup)? = collection;
            }
        }
        Ok(())
    }
}
