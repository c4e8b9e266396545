//! Record predicates.

use std::ptr;

use serde_json::{Map, Value};

use crate::record::Record;
use crate::registry::ClassRef;

/// Expected value of one attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Eq(Value),
    /// Matches any of the listed values.
    In(Vec<Value>),
}

impl Condition {
    fn holds(&self, actual: &Value) -> bool {
        match self {
            Self::Eq(expected) => actual == expected,
            Self::In(allowed) => allowed.contains(actual),
        }
    }
}

/// A conjunction of conditions over one record.
///
/// Attribute conditions compare stored values; attributes a record does not
/// have read as `null`. Type conditions test the record's concrete type, and
/// `not_identical_to` excludes one specific instance.
#[derive(Clone, Debug, Default)]
pub struct Predicate<'a> {
    conditions: Vec<(String, Condition)>,
    is_a: Option<ClassRef>,
    instance_of: Option<ClassRef>,
    not_identical: Option<&'a Record>,
}

impl<'a> Predicate<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicate from an attributes map; array values mean membership.
    pub fn from_attributes(attributes: &Map<String, Value>) -> Self {
        let mut predicate = Self::new();
        for (name, value) in attributes {
            predicate = match value {
                Value::Array(values) => predicate.one_of(name, values.clone()),
                other => predicate.eq(name, other.clone()),
            };
        }
        predicate
    }

    pub fn eq(mut self, attribute: &str, value: Value) -> Self {
        self.conditions
            .push((attribute.to_string(), Condition::Eq(value)));
        self
    }

    pub fn one_of(mut self, attribute: &str, values: Vec<Value>) -> Self {
        self.conditions
            .push((attribute.to_string(), Condition::In(values)));
        self
    }

    pub fn is_a(mut self, class: ClassRef) -> Self {
        self.is_a = Some(class);
        self
    }

    pub fn instance_of(mut self, class: ClassRef) -> Self {
        self.instance_of = Some(class);
        self
    }

    pub fn not_identical_to(mut self, record: &'a Record) -> Self {
        self.not_identical = Some(record);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if self.is_a.as_ref().is_some_and(|class| !record.is_a(class)) {
            return false;
        }
        if self
            .instance_of
            .as_ref()
            .is_some_and(|class| !record.is_instance_of(class))
        {
            return false;
        }
        if self.not_identical.is_some_and(|other| ptr::eq(other, record)) {
            return false;
        }
        self.conditions.iter().all(|(name, condition)| {
            condition.holds(record.read(name).unwrap_or(&Value::Null))
        })
    }
}
