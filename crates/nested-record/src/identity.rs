//! Record identity and the primary-key guard.
//!
//! A [`PrimaryKeyCheck`] pairs a type with its identity attributes. Two
//! records of a collection collide when both are instances of the check's
//! type and agree on every identity attribute.

use std::fmt;

use serde_json::{Map, Value};

use crate::collection::Collection;
use crate::error::{RecordError, Result};
use crate::matcher::Predicate;
use crate::record::Record;
use crate::registry::ClassRef;

/// Identity attributes of a type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrimaryKeyCheck {
    class: ClassRef,
    attributes: Vec<String>,
}

/// Identity values of one record or payload under a [`PrimaryKeyCheck`].
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityKey {
    class: ClassRef,
    values: Vec<(String, Value)>,
}

impl PrimaryKeyCheck {
    pub fn new(class: ClassRef, attributes: Vec<String>) -> Self {
        Self { class, attributes }
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn key_for_record(&self, record: &Record) -> IdentityKey {
        IdentityKey {
            class: self.class.clone(),
            values: self
                .attributes
                .iter()
                .map(|name| (name.clone(), record.read(name).cloned().unwrap_or(Value::Null)))
                .collect(),
        }
    }

    /// Key of a raw payload, with values cast by the attributes' declared
    /// kinds so `"1"` and `1` identify the same integer key.
    pub fn key_for_payload(&self, payload: &Map<String, Value>) -> IdentityKey {
        IdentityKey {
            class: self.class.clone(),
            values: self
                .attributes
                .iter()
                .map(|name| {
                    let raw = payload.get(name).unwrap_or(&Value::Null);
                    let value = self
                        .class
                        .attribute_kind(name)
                        .map_or_else(|| raw.clone(), |kind| kind.cast(raw));
                    (name.clone(), value)
                })
                .collect(),
        }
    }

    /// Fail if a record of `collection` other than `record` shares its key.
    pub fn enforce(&self, collection: &Collection, record: &Record) -> Result<()> {
        if !record.is_a(&self.class) {
            return Ok(());
        }
        let key = self.key_for_record(record);
        let predicate = key.predicate().not_identical_to(record);
        if collection.exists(&predicate) {
            return Err(key.violation());
        }
        Ok(())
    }
}

impl IdentityKey {
    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().map(|(_, value)| value)
    }

    /// Predicate matching records of the key's type with equal values.
    pub fn predicate<'a>(&self) -> Predicate<'a> {
        self.values.iter().fold(
            Predicate::new().is_a(self.class.clone()),
            |predicate, (name, value)| predicate.eq(name, value.clone()),
        )
    }

    pub(crate) fn violation(&self) -> RecordError {
        RecordError::PrimaryKey {
            class: self.class.name().to_string(),
            key: self.to_string(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.class.name())?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::Declare;
    use crate::registry::Registry;
    use nested_types::AttrKind;
    use serde_json::json;

    #[test]
    fn payload_keys_are_cast() {
        let mut builder = Registry::builder();
        builder.define("Bar", |c| {
            c.attribute("id", AttrKind::Integer)
                .attribute("scope", AttrKind::String)
                .primary_key(["id", "scope"]);
        });
        let registry = builder.build().unwrap();
        let bar = registry.class("Bar").unwrap();
        let check = PrimaryKeyCheck::new(bar.clone(), vec!["id".into(), "scope".into()]);

        let payload = json!({"id": "1", "scope": "a"});
        let key = check.key_for_payload(payload.as_object().unwrap());
        assert_eq!(key.values().cloned().collect::<Vec<_>>(), [json!(1), json!("a")]);
        assert_eq!(key.to_string(), r#"Bar(id: 1, scope: "a")"#);

        let record = bar.build(json!({"id": 1, "scope": "a"})).unwrap();
        assert_eq!(check.key_for_record(&record), key);
        assert!(record.matches(&key.predicate()));
    }

    #[test]
    fn enforce_ignores_the_record_itself() {
        let mut builder = Registry::builder();
        builder.define("Bar", |c| {
            c.attribute("id", AttrKind::Integer);
        });
        let registry = builder.build().unwrap();
        let bar = registry.class("Bar").unwrap();
        let check = PrimaryKeyCheck::new(bar.clone(), vec!["id".into()]);

        let collection =
            Collection::from_records(bar.clone(), [bar.build(json!({"id": 1})).unwrap()]).unwrap();
        let inside = collection.first().unwrap();
        assert!(check.enforce(&collection, inside).is_ok());

        let twin = bar.build(json!({"id": 1})).unwrap();
        assert!(matches!(
            check.enforce(&collection, &twin),
            Err(RecordError::PrimaryKey { .. })
        ));
    }
}
