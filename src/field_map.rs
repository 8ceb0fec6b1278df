use std::collections::hash_map::{self, HashMap};

use serde::Serialize;
use serde_json::Value;

/// The value of a body field: one string, or an ordered sequence of strings for
/// fields that accept more than one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multiple(Vec<String>),
}

impl FieldValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            FieldValue::Single(value) => Some(value.as_str()),
            FieldValue::Multiple(_) => None,
        }
    }

    /// All values in order; a single value is a one-element slice.
    pub fn values(&self) -> &[String] {
        match self {
            FieldValue::Single(value) => std::slice::from_ref(value),
            FieldValue::Multiple(values) => values.as_slice(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Single(value) => Value::String(value.clone()),
            FieldValue::Multiple(values) => Value::Array(values.iter().cloned().map(Value::String).collect()),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            FieldValue::Multiple(values) => values.push(value),
            FieldValue::Single(prev) => {
                let prev = std::mem::take(prev);
                *self = FieldValue::Multiple(vec![prev, value]);
            }
        }
    }
}

/// The request's logical body, built up from the scalar fields and file names of a
/// multipart stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldMap {
    fields: HashMap<String, FieldValue>,
}

impl FieldMap {
    pub fn new() -> FieldMap {
        FieldMap::default()
    }

    /// Records a scalar field value: appended when the field takes multiple values,
    /// otherwise the latest value wins.
    pub fn collect<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V, multiple: bool) {
        if multiple {
            self.push(name, value);
        } else {
            self.fields.insert(name.into(), FieldValue::Single(value.into()));
        }
    }

    /// Appends a value to a field, turning it into a sequence.
    pub fn push<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        match self.fields.entry(name.into()) {
            hash_map::Entry::Occupied(mut entry) => entry.get_mut().push(value.into()),
            hash_map::Entry::Vacant(entry) => {
                entry.insert(FieldValue::Multiple(vec![value.into()]));
            }
        }
    }

    pub fn insert<N: Into<String>>(&mut self, name: N, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, FieldValue> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, FieldValue> {
        self.fields
    }
}

impl<'a> IntoIterator for &'a FieldMap {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = hash_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
