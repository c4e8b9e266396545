//! Record instances.
//!
//! A [`Record`] holds one value per declared field of its concrete type:
//! scalar attributes, single-record associations and collections. Records
//! are created two ways:
//!
//! - **construction** ([`ClassRef::new_record`]) casts user input, routes
//!   association payloads through the writers and fills the discriminant;
//! - **instantiation** ([`ClassRef::instantiate`]) decodes a trusted stored
//!   document, deserializing scalars by kind, without writers or identity
//!   checks.

use std::collections::BTreeMap;
use std::fmt;

use nested_types::is_blank;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::trace;

use crate::association::{AssociationSetup, Cardinality, ATTRIBUTES_SUFFIX};
use crate::codec::{Codec, ManyCodec, OneCodec};
use crate::collection::Collection;
use crate::error::{RecordError, Result};
use crate::matcher::Predicate;
use crate::registry::{ClassRef, Slot, TYPE_ATTRIBUTE};
use crate::resolve::discriminant;
use crate::validation::ValidationErrors;

/// Stored value of one field.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Value(Value),
    One(Option<Box<Record>>),
    Many(Collection),
}

/// An instance of a record type.
#[derive(Clone)]
pub struct Record {
    class: ClassRef,
    fields: Vec<Field>,
    transient: BTreeMap<String, Value>,
}

/// Interpret a raw value as an attributes map. `null` is an empty map.
pub(crate) fn attributes_of<'a>(
    value: &'a Value,
    empty: &'a Map<String, Value>,
    expected: &str,
) -> Result<&'a Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(empty),
        other => Err(RecordError::Cast {
            expected: expected.to_string(),
            found: other.to_string(),
        }),
    }
}

impl ClassRef {
    /// Construct a record from user input.
    ///
    /// A `type` key selects the concrete type within this hierarchy. Scalar
    /// values are cast by their declared kind, association values go through
    /// the association writers, `<name>_attributes` keys through the bulk
    /// writers.
    pub fn new_record(&self, attributes: &Map<String, Value>) -> Result<Record> {
        let class = if self.is_local_subtype() {
            self.clone()
        } else {
            self.find_subtype(discriminant(attributes).as_deref())?
        };
        let mut record = Record::blank(&class)?;
        record.assign(attributes)?;
        if class.is_deep_inherited() && !attributes.contains_key(TYPE_ATTRIBUTE) {
            record.store_type(class.instance_type());
        }
        record.run_hooks()?;
        Ok(record)
    }

    /// [`new_record`](Self::new_record) from a JSON value; `null` builds a
    /// record with defaults only.
    pub fn build(&self, attributes: Value) -> Result<Record> {
        let empty = Map::new();
        let map = attributes_of(&attributes, &empty, self.name())?;
        self.new_record(map)
    }

    /// Instantiate a record from a stored document.
    ///
    /// Scalar values are deserialized by their declared kind; association
    /// values are decoded without writers and unknown keys are ignored.
    pub fn instantiate(&self, attributes: &Map<String, Value>) -> Result<Record> {
        let class = if self.is_local_subtype() {
            self.clone()
        } else {
            self.find_subtype(discriminant(attributes).as_deref())?
        };
        let mut record = Record::blank(&class)?;
        let def = class.def();
        for (key, value) in attributes {
            let Some((idx, field)) = def.field(key) else {
                trace!(class = class.name(), key = key.as_str(), "ignoring unknown stored key");
                continue;
            };
            record.fields[idx] = match &field.slot {
                Slot::Attribute(attr) => Field::Value(attr.kind.cast(value)),
                Slot::Association(setup) => decode_association(&class, setup, value)?,
            };
        }
        record.run_hooks()?;
        Ok(record)
    }
}

fn decode_association(class: &ClassRef, setup: &AssociationSetup, raw: &Value) -> Result<Field> {
    let record_class = setup.record_class(class);
    Ok(match setup.cardinality() {
        Cardinality::One => Field::One(OneCodec::new(record_class).decode(raw)?.map(Box::new)),
        Cardinality::Many => Field::Many(ManyCodec::new(record_class).decode(raw)?),
    })
}

fn cast_association(class: &ClassRef, setup: &AssociationSetup, raw: &Value) -> Result<Field> {
    let record_class = setup.record_class(class);
    Ok(match setup.cardinality() {
        Cardinality::One => Field::One(OneCodec::new(record_class).cast(raw)?.map(Box::new)),
        Cardinality::Many => Field::Many(ManyCodec::new(record_class).cast(raw)?),
    })
}

impl Record {
    /// A record of exactly `class` holding default values.
    pub(crate) fn blank(class: &ClassRef) -> Result<Self> {
        let def = class.def();
        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            fields.push(match &field.slot {
                Slot::Attribute(attr) => Field::Value(attr.initial_value()),
                Slot::Association(setup) => match setup.default() {
                    Some(default) => cast_association(class, setup, default)?,
                    None => match setup.cardinality() {
                        Cardinality::One => Field::One(None),
                        Cardinality::Many => Field::Many(Collection::new(setup.record_class(class))),
                    },
                },
            });
        }
        Ok(Self {
            class: class.clone(),
            fields,
            transient: BTreeMap::new(),
        })
    }

    fn run_hooks(&mut self) -> Result<()> {
        let hooks = self.class.def().hooks.clone();
        for hook in &hooks {
            hook.call(self)?;
        }
        Ok(())
    }

    fn store_type(&mut self, instance_type: &str) {
        if let Some((idx, _)) = self.class.def().field(TYPE_ATTRIBUTE) {
            self.fields[idx] = Field::Value(Value::String(instance_type.to_string()));
        }
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    /// Stored discriminant.
    pub fn type_name(&self) -> Option<&str> {
        self.read(TYPE_ATTRIBUTE).and_then(Value::as_str)
    }

    /// Raw field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.class
            .def()
            .field(name)
            .map(|(idx, _)| &self.fields[idx])
    }

    pub(crate) fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        let idx = self.class.def().field(name).map(|(idx, _)| idx)?;
        self.fields.get_mut(idx)
    }

    /// Value of a scalar attribute, transient attribute or delegated
    /// accessor.
    pub fn read(&self, name: &str) -> Option<&Value> {
        let def = self.class.def();
        if let Some((idx, _)) = def.field(name) {
            return match &self.fields[idx] {
                Field::Value(value) => Some(value),
                _ => None,
            };
        }
        if let Some(value) = self.transient.get(name) {
            return Some(value);
        }
        let holder = def.delegations.get(name)?;
        match self.field(holder)? {
            Field::One(Some(inner)) => inner.read(name),
            _ => None,
        }
    }

    /// Whether the attribute holds a non-blank value.
    pub fn query(&self, name: &str) -> bool {
        self.read(name).is_some_and(|value| !is_blank(value))
    }

    /// Assign one attribute, association or bulk writer by name.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let class = self.class.clone();
        let def = class.def();

        if let Some((idx, field)) = def.field(name) {
            return match &field.slot {
                Slot::Attribute(attr) => {
                    self.fields[idx] = Field::Value(attr.kind.cast(&value));
                    Ok(())
                }
                Slot::Association(setup) => self.assign_association(setup, &value),
            };
        }

        if let Some(setup) = name
            .strip_suffix(ATTRIBUTES_SUFFIX)
            .and_then(|association| def.association(association))
        {
            if setup.strategy().is_some() {
                return self.write_attributes(setup.name(), &value);
            }
        }

        if def.is_transient(name) {
            self.transient.insert(name.to_string(), value);
            return Ok(());
        }

        if let Some(holder) = def.delegations.get(name) {
            return self.one_or_build(holder)?.set(name, value);
        }

        if name == TYPE_ATTRIBUTE {
            return Ok(());
        }

        Err(RecordError::UnknownAttribute {
            class: class.name().to_string(),
            attribute: name.to_string(),
        })
    }

    /// Assign every key of `attributes` in order.
    pub fn assign(&mut self, attributes: &Map<String, Value>) -> Result<()> {
        for (name, value) in attributes {
            self.set(name, value.clone())?;
        }
        Ok(())
    }

    /// Decode a raw association value and install it through the writer.
    fn assign_association(&mut self, setup: &AssociationSetup, raw: &Value) -> Result<()> {
        let record_class = setup.record_class(&self.class);
        match setup.cardinality() {
            Cardinality::One => {
                let record = OneCodec::new(record_class).cast(raw)?;
                self.set_one(setup.name(), record)
            }
            Cardinality::Many => {
                let collection = ManyCodec::new(record_class).cast(raw)?;
                self.set_many(setup.name(), collection)
            }
        }
    }

    pub fn is_a(&self, class: &ClassRef) -> bool {
        self.class.is_subclass_of(class)
    }

    pub fn is_instance_of(&self, class: &ClassRef) -> bool {
        self.class == *class
    }

    pub fn matches(&self, predicate: &Predicate<'_>) -> bool {
        predicate.matches(self)
    }

    /// Stored attributes as a map; transient attributes are left out.
    pub fn to_map(&self) -> Map<String, Value> {
        self.class
            .def()
            .fields
            .iter()
            .zip(&self.fields)
            .map(|(def, field)| {
                let value = match field {
                    Field::Value(value) => value.clone(),
                    Field::One(record) => record.as_ref().map_or(Value::Null, |r| r.as_json()),
                    Field::Many(collection) => collection.as_json(),
                };
                (def.name.clone(), value)
            })
            .collect()
    }

    pub fn as_json(&self) -> Value {
        Value::Object(self.to_map())
    }

    /// Run the type's validators and those of every nested record.
    ///
    /// Errors of nested records are keyed `<association>.<attribute>` and
    /// `<association>[<index>].<attribute>`.
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        let def = self.class.def();
        for validator in &def.validators {
            validator.check(self, &mut errors);
        }
        for (field_def, field) in def.fields.iter().zip(&self.fields) {
            match field {
                Field::One(Some(record)) => {
                    errors.absorb(&field_def.name, record.validate());
                }
                Field::Many(collection) => {
                    for (idx, record) in collection.iter().enumerate() {
                        errors.absorb(&format!("{}[{idx}]", field_def.name), record.validate());
                    }
                }
                _ => {}
            }
        }
        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// Records are equal when they hold the same attributes with the same
/// values; their types are not compared.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.class.field_names().eq(other.class.field_names()) && self.fields == other.fields
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.class.name());
        for (def, field) in self.class.def().fields.iter().zip(&self.fields) {
            match field {
                Field::Value(value) => s.field(&def.name, value),
                Field::One(record) => s.field(&def.name, record),
                Field::Many(collection) => s.field(&def.name, collection),
            };
        }
        s.finish()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.as_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::declare::{AttributeDecl, Concern, Declare};
    use crate::registry::Registry;
    use nested_types::AttrKind;
    use serde_json::json;

    fn registry() -> Arc<Registry> {
        let timestamps = Concern::new(|c| {
            c.attribute("created_at", AttrKind::DateTime);
        });
        let mut builder = Registry::builder();
        builder
            .define("Shape", |c| {
                c.attribute("id", AttrKind::Integer)
                    .attribute_with(AttributeDecl::new("color", AttrKind::String).default_value(json!("black")))
                    .attribute("visible", AttrKind::Boolean)
                    .transient("selected")
                    .include(&timestamps)
                    .validates_presence("id");
            })
            .define_subclass("Circle", "Shape", |c| {
                c.attribute("radius", AttrKind::Float)
                    .validates_inclusion("color", vec![json!("black"), json!("red")]);
            })
            .define("Drawing", |c| {
                c.has_one("frame", |a| {
                    a.class_name("Shape");
                })
                .has_many("shapes", |_| {})
                .nested_accessors("meta", |c| {
                    c.attribute("author", AttrKind::String)
                        .attribute("pages", AttrKind::Integer);
                })
                .after_initialize(|record| {
                    if record.read("title").is_some_and(Value::is_null) {
                        record.set("title", json!("untitled"))?;
                    }
                    Ok(())
                })
                .attribute("title", AttrKind::String);
            });
        builder.build().unwrap()
    }

    #[test]
    fn construction_casts_and_fills_type() {
        let registry = registry();
        let shape = registry.class("Shape").unwrap();
        let circle = shape
            .build(json!({"type": "Circle", "id": "7", "radius": "2.5", "visible": "0"}))
            .unwrap();
        assert_eq!(circle.class().name(), "Circle");
        assert_eq!(circle.read("id"), Some(&json!(7)));
        assert_eq!(circle.read("radius"), Some(&json!(2.5)));
        assert_eq!(circle.read("visible"), Some(&json!(false)));
        assert_eq!(circle.read("color"), Some(&json!("black")));
        assert_eq!(circle.type_name(), Some("Circle"));

        let direct = registry.class("Circle").unwrap().build(json!({})).unwrap();
        assert_eq!(direct.type_name(), Some("Circle"));
    }

    #[test]
    fn base_type_has_no_discriminant_attribute() {
        let registry = registry();
        let shape = registry.class("Shape").unwrap().build(json!({"type": null, "id": 1})).unwrap();
        assert!(shape.field("type").is_none());
        assert!(!shape.as_json().as_object().unwrap().contains_key("type"));
    }

    #[test]
    fn unknown_attributes_rejected() {
        let registry = registry();
        let err = registry.class("Shape").unwrap().build(json!({"nope": 1})).unwrap_err();
        assert!(matches!(err, RecordError::UnknownAttribute { attribute, .. } if attribute == "nope"));
    }

    #[test]
    fn transient_attributes_are_not_serialized() {
        let registry = registry();
        let shape = registry.class("Shape").unwrap().build(json!({"selected": true})).unwrap();
        assert_eq!(shape.read("selected"), Some(&json!(true)));
        assert!(shape.query("selected"));
        assert!(!shape.as_json().as_object().unwrap().contains_key("selected"));
    }

    #[test]
    fn instantiate_deserializes_stored_values_by_kind() {
        let registry = registry();
        let stored = json!({"type": "Circle", "id": "7", "radius": 1.0, "legacy": true});
        let circle = registry
            .class("Shape")
            .unwrap()
            .instantiate(stored.as_object().unwrap())
            .unwrap();
        assert_eq!(circle.read("id"), Some(&json!(7)));
        assert_eq!(circle.type_name(), Some("Circle"));
        assert_eq!(circle.read("legacy"), None);
    }

    #[test]
    fn equality_ignores_type_but_not_values() {
        let registry = registry();
        let a = registry.class("Shape").unwrap().build(json!({"id": 1})).unwrap();
        let b = registry.class("Shape").unwrap().build(json!({"id": 1, "selected": true})).unwrap();
        let c = registry.class("Shape").unwrap().build(json!({"id": 2})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hooks_run_after_assignment() {
        let registry = registry();
        let drawing = registry.class("Drawing").unwrap();
        assert_eq!(drawing.build(json!({})).unwrap().read("title"), Some(&json!("untitled")));
        assert_eq!(
            drawing.build(json!({"title": "sketch"})).unwrap().read("title"),
            Some(&json!("sketch"))
        );
        let stored = json!({"title": null});
        let loaded = drawing.instantiate(stored.as_object().unwrap()).unwrap();
        assert_eq!(loaded.read("title"), Some(&json!("untitled")));
    }

    #[test]
    fn nested_accessors_delegate_to_inline_record() {
        let registry = registry();
        let drawing = registry.class("Drawing").unwrap();
        let mut record = drawing.build(json!({"author": "ann", "pages": "3"})).unwrap();
        assert_eq!(record.read("author"), Some(&json!("ann")));
        assert_eq!(record.as_json()["meta"], json!({"author": "ann", "pages": 3}));

        record.set("pages", json!(4)).unwrap();
        assert_eq!(record.one("meta").unwrap().unwrap().read("pages"), Some(&json!(4)));
    }

    #[test]
    fn associations_decode_from_construction_input() {
        let registry = registry();
        let drawing = registry
            .class("Drawing")
            .unwrap()
            .build(json!({
                "frame": {"type": "Circle", "id": 1},
                "shapes": [{"id": 2}, {"type": "Circle", "id": 3, "radius": 1.5}]
            }))
            .unwrap();
        assert_eq!(drawing.one("frame").unwrap().unwrap().class().name(), "Circle");
        let shapes = drawing.many("shapes").unwrap();
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes.get(1).unwrap().read("radius"), Some(&json!(1.5)));
    }

    #[test]
    fn validation_paths_include_positions() {
        let registry = registry();
        let drawing = registry
            .class("Drawing")
            .unwrap()
            .build(json!({
                "frame": {},
                "shapes": [{"id": 1}, {"type": "Circle", "color": "green"}]
            }))
            .unwrap();
        let errors = drawing.validate();
        assert_eq!(errors.get("frame.id"), ["can't be blank"]);
        assert_eq!(errors.get("shapes[1].id"), ["can't be blank"]);
        assert_eq!(errors.get("shapes[1].color"), ["is not included in the list"]);
        assert!(errors.get("shapes[0].id").is_empty());
        assert!(!drawing.is_valid());
    }

    #[test]
    fn concern_attributes_are_declared() {
        let registry = registry();
        let shape = registry
            .class("Shape")
            .unwrap()
            .build(json!({"created_at": "2024-05-01 10:00:00"}))
            .unwrap();
        assert_eq!(shape.read("created_at"), Some(&json!("2024-05-01T10:00:00Z")));
    }
}
