//! Validation errors and built-in validators.

use std::fmt;
use std::sync::Arc;

use nested_types::is_blank;
use serde_json::Value;

use crate::record::Record;

type ValidateFn = dyn Fn(&Record, &mut ValidationErrors) + Send + Sync;

/// Messages keyed by attribute path, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    entries: Vec<(String, Vec<String>)>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message; a message already present for `field` is not
    /// repeated.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        let message = message.into();
        match self.entries.iter_mut().find(|(name, _)| name == field) {
            Some((_, messages)) => {
                if !messages.contains(&message) {
                    messages.push(message);
                }
            }
            None => self.entries.push((field.to_string(), vec![message])),
        }
    }

    /// Messages recorded for `field`.
    pub fn get(&self, field: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, messages)| messages.as_slice())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of fields with errors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, messages)| (name.as_str(), messages.as_slice()))
    }

    /// `"<field> <message>"` for every message.
    pub fn full_messages(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(field, messages)| messages.iter().map(move |m| format!("{field} {m}")))
            .collect()
    }

    /// Merge errors of a nested record under `prefix` (`bars[0]`, `baz`).
    pub(crate) fn absorb(&mut self, prefix: &str, nested: ValidationErrors) {
        for (field, messages) in nested.entries {
            let path = format!("{prefix}.{field}");
            for message in messages {
                self.add(&path, message);
            }
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join(", "))
    }
}

/// A record validator.
#[derive(Clone)]
pub struct Validator(Arc<ValidateFn>);

impl Validator {
    pub fn new(f: impl Fn(&Record, &mut ValidationErrors) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Fails when the attribute is blank.
    pub fn presence(attribute: &str) -> Self {
        let attribute = attribute.to_string();
        Self::new(move |record, errors| {
            if record.read(&attribute).map_or(true, is_blank) {
                errors.add(&attribute, "can't be blank");
            }
        })
    }

    /// Fails when the attribute is not one of `allowed`.
    pub fn inclusion(attribute: &str, allowed: Vec<Value>) -> Self {
        let attribute = attribute.to_string();
        Self::new(move |record, errors| {
            let value = record.read(&attribute).unwrap_or(&Value::Null);
            if !allowed.contains(value) {
                errors.add(&attribute, "is not included in the list");
            }
        })
    }

    pub(crate) fn check(&self, record: &Record, errors: &mut ValidationErrors) {
        (self.0)(record, errors)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator(..)")
    }
}
