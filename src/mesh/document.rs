//! Safe navigation over schema-less configuration documents.
//!
//! Routing objects arrive as arbitrarily nested maps whose fields may be absent or carry an
//! unexpected type. Every accessor here collapses both cases into `None` (or an empty
//! iterator) so callers treat them uniformly as "no match at this branch".

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub type Document = JsonValue;

const EMPTY: &[JsonValue] = &[];

pub trait DocumentExt {
    /// Field lookup that only succeeds on objects.
    fn field(&self, key: &str) -> Option<&JsonValue>;

    /// Presence-only check; the value may be anything, including `null`.
    fn contains(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    fn str_at(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(JsonValue::as_str)
    }

    fn object_at(&self, key: &str) -> Option<&JsonValue> {
        self.field(key).filter(|value| value.is_object())
    }

    /// Elements of an array field; absent or non-array fields yield nothing.
    fn seq_at(&self, key: &str) -> std::slice::Iter<'_, JsonValue> {
        match self.field(key) {
            Some(JsonValue::Array(items)) => items.iter(),
            _ => EMPTY.iter(),
        }
    }

    /// Object elements of an array field, skipping anything that is not an object.
    fn objects_at(&self, key: &str) -> Box<dyn Iterator<Item = &JsonValue> + '_> {
        Box::new(self.seq_at(key).filter(|item| item.is_object()))
    }

    /// String elements of an array field. `None` when the field is absent or not an array.
    fn string_list_at(&self, key: &str) -> Option<Vec<String>> {
        match self.field(key) {
            Some(JsonValue::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        }
    }

    /// String-valued entries of an object field; non-string values are dropped.
    fn string_map_at(&self, key: &str) -> Option<BTreeMap<String, String>> {
        match self.field(key) {
            Some(JsonValue::Object(map)) => Some(
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl DocumentExt for JsonValue {
    fn field(&self, key: &str) -> Option<&JsonValue> {
        match self {
            JsonValue::Object(map) => map.get(key),
            _ => None,
        }
    }
}
