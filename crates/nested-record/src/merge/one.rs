//! Writers of single-record associations.

use serde_json::{Map, Value};
use tracing::debug;

use crate::association::AssociationSetup;
use crate::error::{RecordError, Result};
use crate::record::{attributes_of, Field, Record};

pub(crate) fn slot<'a>(
    owner: &'a mut Record,
    setup: &AssociationSetup,
) -> Result<&'a mut Option<Box<Record>>> {
    let class = owner.class().name().to_string();
    match owner.field_mut(setup.name()) {
        Some(Field::One(record)) => Ok(record),
        _ => Err(RecordError::UnknownAssociation {
            class,
            name: setup.name().to_string(),
        }),
    }
}

/// Install `record` after checking it is an instance of the record type.
pub(crate) fn write(owner: &mut Record, setup: &AssociationSetup, record: Option<Record>) -> Result<()> {
    if let Some(record) = &record {
        let expected = setup.record_class(owner.class());
        if !record.is_a(&expected) {
            return Err(RecordError::TypeMismatch {
                expected: expected.name().to_string(),
                found: format!("{record:?}"),
            });
        }
    }
    *slot(owner, setup)? = record.map(Box::new);
    Ok(())
}

/// Construct a record from `attributes` and install it.
pub(crate) fn build<'a>(
    owner: &'a mut Record,
    setup: &AssociationSetup,
    attributes: &Map<String, Value>,
) -> Result<&'a mut Record> {
    let record = setup.record_class(owner.class()).new_record(attributes)?;
    write(owner, setup, Some(record))?;
    existing(owner, setup)
}

fn existing<'a>(owner: &'a mut Record, setup: &AssociationSetup) -> Result<&'a mut Record> {
    let class = owner.class().name().to_string();
    slot(owner, setup)?
        .as_deref_mut()
        .ok_or_else(|| RecordError::UnknownAssociation {
            class,
            name: setup.name().to_string(),
        })
}

/// Replace the value with a record built from `payload`.
pub(crate) fn rewrite(owner: &mut Record, setup: &AssociationSetup, payload: &Value) -> Result<()> {
    let empty = Map::new();
    let attributes = attributes_of(payload, &empty, setup.name())?;
    debug!(association = setup.name(), "rewriting record");
    build(owner, setup, attributes).map(|_| ())
}

/// Assign `payload` to the current record, building one if there is none.
pub(crate) fn upsert(owner: &mut Record, setup: &AssociationSetup, payload: &Value) -> Result<()> {
    let empty = Map::new();
    let attributes = attributes_of(payload, &empty, setup.name())?;
    if let Some(current) = slot(owner, setup)? {
        debug!(association = setup.name(), "updating record in place");
        return current.assign(attributes);
    }
    debug!(association = setup.name(), "building record");
    build(owner, setup, attributes).map(|_| ())
}

/// The current record, built from defaults if there is none.
pub(crate) fn get_or_build<'a>(owner: &'a mut Record, setup: &AssociationSetup) -> Result<&'a mut Record> {
    if slot(owner, setup)?.is_none() {
        return build(owner, setup, &Map::new());
    }
    existing(owner, setup)
}
