//! Conversion between association values and JSON.
//!
//! [`OneCodec`] and [`ManyCodec`] map between JSON values and records of an
//! association's record type. `decode` instantiates stored documents,
//! deserializing scalars by kind; `cast` constructs records from user input. [`TextCodec`] wraps either one
//! for the textual column representation, where unparsable text decodes as
//! the empty value.

use serde_json::{Map, Value};
use tracing::warn;

use crate::collection::Collection;
use crate::error::{RecordError, Result};
use crate::record::Record;
use crate::registry::ClassRef;

/// Encoding and decoding of one association value.
pub trait Codec {
    type Value;

    /// Decode a stored JSON value.
    fn decode(&self, raw: &Value) -> Result<Self::Value>;

    /// Encode into JSON.
    fn encode(&self, value: &Self::Value) -> Value;
}

/// Payload objects of a collection input: an array of objects, or an object
/// of objects ordered by key. Keys order numerically when they are all
/// integers. `null` is an empty batch.
pub(crate) fn payload_items(raw: &Value) -> Result<Vec<&Map<String, Value>>> {
    let items: Vec<&Value> = match raw {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            if entries.iter().all(|(key, _)| key.parse::<i64>().is_ok()) {
                entries.sort_by_key(|(key, _)| key.parse::<i64>().unwrap_or_default());
            }
            entries.into_iter().map(|(_, value)| value).collect()
        }
        other => return Err(cast_error("an array of objects", other)),
    };
    items
        .into_iter()
        .map(|item| item.as_object().ok_or_else(|| cast_error("an object", item)))
        .collect()
}

fn cast_error(expected: &str, found: &Value) -> RecordError {
    RecordError::Cast {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// Codec for single-record associations.
#[derive(Clone, Debug)]
pub struct OneCodec {
    class: ClassRef,
}

impl OneCodec {
    pub fn new(class: ClassRef) -> Self {
        Self { class }
    }

    /// Construct a record from user input; `null` is no record.
    pub fn cast(&self, raw: &Value) -> Result<Option<Record>> {
        match raw {
            Value::Null => Ok(None),
            Value::Object(attributes) => self.class.new_record(attributes).map(Some),
            other => Err(cast_error(self.class.name(), other)),
        }
    }
}

impl Codec for OneCodec {
    type Value = Option<Record>;

    fn decode(&self, raw: &Value) -> Result<Option<Record>> {
        match raw {
            Value::Null => Ok(None),
            Value::Object(attributes) => self.class.instantiate(attributes).map(Some),
            other => Err(cast_error(self.class.name(), other)),
        }
    }

    fn encode(&self, value: &Option<Record>) -> Value {
        value.as_ref().map_or(Value::Null, Record::as_json)
    }
}

/// Codec for collection associations.
#[derive(Clone, Debug)]
pub struct ManyCodec {
    class: ClassRef,
}

impl ManyCodec {
    pub fn new(class: ClassRef) -> Self {
        Self { class }
    }

    /// Construct a collection from user input.
    pub fn cast(&self, raw: &Value) -> Result<Collection> {
        let mut collection = Collection::new(self.class.clone());
        for attributes in payload_items(raw)? {
            collection.build(attributes)?;
        }
        Ok(collection)
    }
}

impl Codec for ManyCodec {
    type Value = Collection;

    fn decode(&self, raw: &Value) -> Result<Collection> {
        let mut collection = Collection::new(self.class.clone());
        match raw {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    let attributes = item
                        .as_object()
                        .ok_or_else(|| cast_error(self.class.name(), item))?;
                    collection.push(self.class.instantiate(attributes)?)?;
                }
            }
            other => return Err(cast_error("an array of objects", other)),
        }
        Ok(collection)
    }

    fn encode(&self, value: &Collection) -> Value {
        value.as_json()
    }
}

/// Textual column representation over a JSON codec.
#[derive(Clone, Debug)]
pub struct TextCodec<C> {
    inner: C,
}

impl<C: Codec> TextCodec<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Decode stored text. Text that is not JSON decodes like `null`.
    pub fn decode_text(&self, text: &str) -> Result<C::Value> {
        match serde_json::from_str::<Value>(text) {
            Ok(raw) => self.inner.decode(&raw),
            Err(err) => {
                warn!(error = %err, "stored association text is not valid JSON; decoding as empty");
                self.inner.decode(&Value::Null)
            }
        }
    }

    /// Encode to text; an absent value is stored as no text at all.
    pub fn encode_text(&self, value: &C::Value) -> Option<String> {
        match self.inner.encode(value) {
            Value::Null => None,
            json => Some(json.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::declare::{Declare, SubtypeOptions};
    use crate::registry::Registry;
    use nested_types::AttrKind;
    use proptest::prelude::*;
    use serde_json::json;

    fn registry() -> Arc<Registry> {
        let mut builder = Registry::builder();
        builder
            .define("Shape", |c| {
                c.attribute("id", AttrKind::Integer)
                    .subtypes(SubtypeOptions::new().underscored());
            })
            .define_subclass("Circle", "Shape", |c| {
                c.attribute("radius", AttrKind::Float);
            })
            .define_subclass("Square", "Shape", |c| {
                c.attribute("side", AttrKind::Float);
            });
        builder.build().unwrap()
    }

    #[test]
    fn one_codec_null_and_shapes() {
        let codec = OneCodec::new(registry().class("Shape").unwrap());
        assert!(codec.decode(&Value::Null).unwrap().is_none());
        assert!(matches!(codec.decode(&json!([1])), Err(RecordError::Cast { .. })));

        let circle = codec.decode(&json!({"type": "circle", "radius": 2.0})).unwrap().unwrap();
        assert_eq!(circle.class().name(), "Circle");
        assert_eq!(codec.encode(&Some(circle)), json!({"id": null, "type": "circle", "radius": 2.0}));
        assert_eq!(codec.encode(&None), Value::Null);
    }

    #[test]
    fn many_codec_decodes_subtypes() {
        let codec = ManyCodec::new(registry().class("Shape").unwrap());
        assert!(codec.decode(&Value::Null).unwrap().is_empty());
        let collection = codec
            .decode(&json!([{"type": "circle", "id": 1}, {"type": "square", "id": 2}, {"id": 3}]))
            .unwrap();
        let names: Vec<&str> = collection.iter().map(|r| r.class().name()).collect();
        assert_eq!(names, ["Circle", "Square", "Shape"]);
        assert!(matches!(
            codec.decode(&json!([{"type": "triangle"}])),
            Err(RecordError::InvalidType { .. })
        ));
    }

    #[test]
    fn many_codec_casts_keyed_payloads_in_numeric_order() {
        let codec = ManyCodec::new(registry().class("Shape").unwrap());
        let collection = codec
            .cast(&json!({"10": {"id": "3"}, "2": {"id": "2"}, "1": {"id": "1"}}))
            .unwrap();
        let ids: Vec<&Value> = collection.iter().filter_map(|r| r.read("id")).collect();
        assert_eq!(ids, [&json!(1), &json!(2), &json!(3)]);
    }

    #[test]
    fn text_codec_tolerates_malformed_text() {
        let shape = registry().class("Shape").unwrap();
        let many = TextCodec::new(ManyCodec::new(shape.clone()));
        assert!(many.decode_text("{not json").unwrap().is_empty());
        assert_eq!(many.encode_text(&Collection::new(shape.clone())).as_deref(), Some("[]"));

        let one = TextCodec::new(OneCodec::new(shape));
        assert!(one.decode_text("").unwrap().is_none());
        assert_eq!(one.encode_text(&None), None);
    }

    proptest! {
        #[test]
        fn encode_decode_preserves_documents(
            shapes in proptest::collection::vec((0usize..3, any::<i32>(), -1.0e6f64..1.0e6), 0..8)
        ) {
            let registry = registry();
            let codec = ManyCodec::new(registry.class("Shape").unwrap());
            let raw = Value::Array(
                shapes
                    .iter()
                    .map(|(kind, id, size)| match kind {
                        0 => json!({"id": id}),
                        1 => json!({"id": id, "type": "circle", "radius": size}),
                        _ => json!({"id": id, "type": "square", "side": size}),
                    })
                    .collect(),
            );
            let decoded = codec.decode(&raw).unwrap();
            prop_assert_eq!(&codec.encode(&decoded), &raw);
            let again = codec.decode(&codec.encode(&decoded)).unwrap();
            prop_assert_eq!(again, decoded);
        }
    }
}
