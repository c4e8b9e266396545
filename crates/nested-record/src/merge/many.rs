//! Writers of collection associations.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::association::AssociationSetup;
use crate::codec::payload_items;
use crate::collection::Collection;
use crate::error::{RecordError, Result};
use crate::identity::PrimaryKeyCheck;
use crate::record::{Field, Record};
use crate::registry::{ClassId, ClassRef};

/// Identity guard over a whole collection. Checks are computed once per
/// concrete type.
pub(crate) fn guard(owner: &ClassRef, setup: &AssociationSetup, collection: &Collection) -> Result<()> {
    let mut checks: HashMap<ClassId, Option<PrimaryKeyCheck>> = HashMap::new();
    for record in collection {
        let check = checks
            .entry(record.class().id())
            .or_insert_with(|| setup.check_for_record(owner, record));
        if let Some(check) = check {
            check.enforce(collection, record)?;
        }
    }
    Ok(())
}

pub(crate) fn slot<'a>(owner: &'a mut Record, setup: &AssociationSetup) -> Result<&'a mut Collection> {
    let class = owner.class().name().to_string();
    match owner.field_mut(setup.name()) {
        Some(Field::Many(collection)) => Ok(collection),
        _ => Err(RecordError::UnknownAssociation {
            class,
            name: setup.name().to_string(),
        }),
    }
}

/// Install `records` as the association value after type and identity
/// checks. The previous value is kept on failure.
pub(crate) fn write(
    owner: &mut Record,
    setup: &AssociationSetup,
    records: impl IntoIterator<Item = Record>,
) -> Result<()> {
    let collection = Collection::from_records(setup.record_class(owner.class()), records)?;
    guard(owner.class(), setup, &collection)?;
    *slot(owner, setup)? = collection;
    Ok(())
}

/// Replace the collection with records built from `payload`.
pub(crate) fn rewrite(owner: &mut Record, setup: &AssociationSetup, payload: &Value) -> Result<()> {
    let base = setup.record_class(owner.class());
    let mut records = Vec::new();
    let mut rejected = 0usize;
    for attributes in payload_items(payload)? {
        if setup.rejects(attributes) {
            rejected += 1;
            continue;
        }
        records.push(base.new_record(attributes)?);
    }
    debug!(
        association = setup.name(),
        records = records.len(),
        rejected,
        "rewriting collection"
    );
    write(owner, setup, records)
}

/// Merge `payload` into the collection: records matched by identity are
/// updated in place, the rest are appended.
pub(crate) fn upsert(owner: &mut Record, setup: &AssociationSetup, payload: &Value) -> Result<()> {
    let items = payload_items(payload)?;
    let owner_class = owner.class().clone();
    let mut working = slot(owner, setup)?.clone();
    let (mut updated, mut appended, mut rejected) = (0usize, 0usize, 0usize);

    for attributes in items {
        if setup.rejects(attributes) {
            rejected += 1;
            continue;
        }
        let check = setup.check_for_payload(&owner_class, attributes)?.ok_or_else(|| {
            RecordError::Configuration(
                "You should specify a primary_key when using :upsert strategy".into(),
            )
        })?;
        let key = check.key_for_payload(attributes);
        match working.position(&key.predicate()) {
            Some(idx) => {
                if let Some(existing) = working.get_mut(idx) {
                    existing.assign(attributes)?;
                }
                updated += 1;
            }
            None => {
                working.build(attributes)?;
                appended += 1;
            }
        }
    }

    debug!(
        association = setup.name(),
        updated,
        appended,
        rejected,
        "upserted collection"
    );
    *slot(owner, setup)? = working;
    Ok(())
}
