//! Resolved association metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::declare::{AttributesWriter, WriterStrategy};
use crate::error::Result;
use crate::identity::PrimaryKeyCheck;
use crate::record::Record;
use crate::registry::{ClassId, ClassRef};
use crate::resolve::discriminant;

/// Suffix of bulk attributes writer names (`bars_attributes`).
pub const ATTRIBUTES_SUFFIX: &str = "_attributes";

/// Whether an association holds a single record or a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// An association after its record type has been resolved.
#[derive(Debug)]
pub struct AssociationSetup {
    pub(crate) name: String,
    pub(crate) owner: ClassId,
    pub(crate) cardinality: Cardinality,
    pub(crate) record_class: ClassId,
    pub(crate) writer: AttributesWriter,
    pub(crate) primary_key: Option<Vec<String>>,
    pub(crate) default: Option<Value>,
}

impl AssociationSetup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// The declared record type, in the registry of `any`.
    pub fn record_class(&self, any: &ClassRef) -> ClassRef {
        any.with_id(self.record_class)
    }

    /// The declaring type, in the registry of `any`.
    pub fn owner(&self, any: &ClassRef) -> ClassRef {
        any.with_id(self.owner)
    }

    /// Strategy of the bulk writer, or `None` when the writer is disabled.
    pub fn strategy(&self) -> Option<WriterStrategy> {
        match &self.writer {
            AttributesWriter::Enabled { strategy, .. } => Some(*strategy),
            AttributesWriter::Disabled => None,
        }
    }

    /// Name of the bulk writer (`<name>_attributes`), if enabled.
    pub fn attributes_writer_name(&self) -> Option<String> {
        self.strategy()
            .map(|_| format!("{}{ATTRIBUTES_SUFFIX}", self.name))
    }

    pub fn primary_key(&self) -> Option<&[String]> {
        self.primary_key.as_deref()
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns `true` if the writer's `reject_if` predicate skips `payload`.
    pub fn rejects(&self, payload: &Map<String, Value>) -> bool {
        match &self.writer {
            AttributesWriter::Enabled {
                reject_if: Some(reject_if),
                ..
            } => reject_if.rejects(payload),
            _ => false,
        }
    }

    /// Identity check for a raw payload.
    ///
    /// An association-level key applies to the declared record type as-is.
    /// Otherwise the payload's discriminant picks the concrete type and the
    /// nearest key declared along its ancestry applies.
    pub fn check_for_payload(
        &self,
        any: &ClassRef,
        payload: &Map<String, Value>,
    ) -> Result<Option<PrimaryKeyCheck>> {
        let base = self.record_class(any);
        if let Some(attributes) = &self.primary_key {
            return Ok(Some(PrimaryKeyCheck::new(base, attributes.clone())));
        }
        let concrete = base.find_subtype(discriminant(payload).as_deref())?;
        Ok(concrete
            .inherited_primary_key()
            .map(|attributes| attributes.to_vec())
            .map(|attributes| PrimaryKeyCheck::new(concrete.clone(), attributes)))
    }

    /// Identity check for a live record.
    pub fn check_for_record(&self, any: &ClassRef, record: &Record) -> Option<PrimaryKeyCheck> {
        if let Some(attributes) = &self.primary_key {
            return Some(PrimaryKeyCheck::new(self.record_class(any), attributes.clone()));
        }
        let concrete = record.class();
        concrete
            .inherited_primary_key()
            .map(|attributes| PrimaryKeyCheck::new(concrete.clone(), attributes.to_vec()))
    }
}
