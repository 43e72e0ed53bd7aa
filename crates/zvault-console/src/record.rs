//! Client-side resource records.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Attribute bag of a record: field name to JSON value, in payload order.
pub type Attributes = Map<String, Value>;

/// A resource as the client model layer sees it.
///
/// `id` is unique within `kind`. Records built by the normalizer are
/// persisted (`is_new == false`); records created through
/// [`RecordStore::create_record`](crate::RecordStore::create_record) stay
/// pending until saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub kind: String,
    pub id: String,
    pub attributes: Attributes,
    pub is_new: bool,
    /// Attribute name to wire name, for fields the kind's case translation
    /// cannot reproduce on its own.
    #[serde(skip)]
    pub wire_names: HashMap<String, String>,
}

impl Record {
    /// A persisted record.
    pub fn new(kind: impl Into<String>, id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes,
            is_new: false,
            wire_names: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_wire_names(mut self, wire_names: HashMap<String, String>) -> Self {
        self.wire_names = wire_names;
        self
    }

    /// Look up an attribute.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    /// Look up a string attribute.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.attributes.get(field).and_then(Value::as_str)
    }

    /// Flatten into a single JSON object with `id` first.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut out = Map::with_capacity(self.attributes.len().saturating_add(1));
        out.insert("id".to_owned(), Value::String(self.id.clone()));
        for (k, v) in &self.attributes {
            if k != "id" {
                out.insert(k.clone(), v.clone());
            }
        }
        Value::Object(out)
    }
}
