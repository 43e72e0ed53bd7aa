//! Payload normalization.
//!
//! Two envelope shapes come back from the API:
//!
//! - **flat**: `{ "data": { .. }, "warnings": .., "lease_id": .. }`. The
//!   `data` object is lifted onto the top level next to its siblings.
//! - **keyed list**: `{ "data": { "keys": [..], "key_info": { key: { .. } } } }`.
//!   One record per key, in key order.
//!
//! Anything that claims to be a keyed list but breaks its contract is a
//! [`ClientError::DataShape`]; no partial list is ever returned.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;
use crate::record::{Attributes, Record};
use crate::resource::ResourceKind;

/// Top-level response fields that describe the response, not the resource.
pub const RESPONSE_METADATA: &[&str] = &[
    "request_id",
    "lease_id",
    "lease_duration",
    "renewable",
    "wrap_info",
    "warnings",
    "auth",
    "mount_type",
];

/// Field-name translation between wire and record attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldCase {
    /// Attribute names are the wire names.
    #[default]
    Preserve,
    /// `snake_case` on the wire, `camelCase` in attributes.
    Camel,
}

impl FieldCase {
    fn to_attribute(self, wire: &str) -> String {
        match self {
            Self::Preserve => wire.to_owned(),
            Self::Camel => snake_to_camel(wire),
        }
    }

    fn to_wire(self, attribute: &str) -> String {
        match self {
            Self::Preserve => attribute.to_owned(),
            Self::Camel => camel_to_snake(attribute),
        }
    }
}

/// Result of normalizing one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Single(Record),
    List(Vec<Record>),
}

impl Normalized {
    /// Records in order; a single record becomes a one-element list.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Single(record) => vec![record],
            Self::List(records) => records,
        }
    }
}

/// Normalize a payload of either shape.
///
/// # Errors
///
/// Returns [`ClientError::DataShape`] when the payload breaks its envelope.
pub fn normalize(kind: &ResourceKind, id: Option<&str>, payload: Value) -> Result<Normalized, ClientError> {
    if is_list_envelope(&payload) {
        normalize_list(kind, payload).map(Normalized::List)
    } else {
        normalize_single(kind, id, payload).map(Normalized::Single)
    }
}

/// Whether the payload carries `data.keys`.
#[must_use]
pub fn is_list_envelope(payload: &Value) -> bool {
    payload
        .get("data")
        .and_then(|data| data.get("keys"))
        .is_some()
}

/// Normalize a keyed list envelope.
///
/// A payload without `key_info` yields records with no attributes. A
/// present `key_info` must cover every key.
///
/// # Errors
///
/// Returns [`ClientError::DataShape`] if `data.keys` is not a list of
/// strings, or `key_info` is present but lacks a key or holds a non-object.
pub fn normalize_list(kind: &ResourceKind, payload: Value) -> Result<Vec<Record>, ClientError> {
    let Value::Object(mut top) = payload else {
        return Err(ClientError::shape("payload is not an object"));
    };
    let Some(Value::Object(mut data)) = top.remove("data") else {
        return Err(ClientError::shape("list payload has no data object"));
    };
    let Some(Value::Array(keys)) = data.remove("keys") else {
        return Err(ClientError::shape("data.keys is not a list"));
    };
    let mut key_info = match data.remove("key_info") {
        None | Some(Value::Null) => None,
        Some(Value::Object(info)) => Some(info),
        Some(_) => return Err(ClientError::shape("data.key_info is not an object")),
    };

    let mut records = Vec::with_capacity(keys.len());
    for (index, key) in keys.into_iter().enumerate() {
        let Value::String(key) = key else {
            return Err(ClientError::shape(format!("data.keys[{index}] is not a string")));
        };
        let attributes = match key_info.as_mut() {
            None => Attributes::new(),
            Some(info) => match info.remove(&key) {
                Some(Value::Object(entry)) => entry,
                Some(_) => {
                    return Err(ClientError::shape(format!(
                        "data.key_info entry for '{key}' is not an object"
                    )));
                }
                None => {
                    return Err(ClientError::shape(format!(
                        "key '{key}' is missing from data.key_info"
                    )));
                }
            },
        };
        let (attributes, wire_names) = translate(attributes, kind.field_case);
        records.push(Record::new(kind.name.as_str(), key, attributes).with_wire_names(wire_names));
    }
    Ok(records)
}

/// Normalize a flat envelope into one record.
///
/// Fields of `data` are merged next to the top-level siblings; on a name
/// clash the sibling keeps its value. The id is `id` if given, else the
/// kind's identifying attribute, else an `id` field; singleton kinds fall
/// back to the kind name.
///
/// # Errors
///
/// Returns [`ClientError::DataShape`] if the payload or its `data` is not an
/// object, or no id can be determined.
pub fn normalize_single(kind: &ResourceKind, id: Option<&str>, payload: Value) -> Result<Record, ClientError> {
    let Value::Object(mut top) = payload else {
        return Err(ClientError::shape("payload is not an object"));
    };
    match top.remove("data") {
        None | Some(Value::Null) => {}
        Some(Value::Object(data)) => {
            for (field, value) in data {
                if top.contains_key(&field) {
                    debug!(kind = %kind.name, field = %field, "data field shadowed by response sibling");
                    continue;
                }
                top.insert(field, value);
            }
        }
        Some(_) => return Err(ClientError::shape("data is not an object")),
    }

    let id = id
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .or_else(|| string_field(&top, &kind.id_attribute))
        .or_else(|| string_field(&top, "id"))
        .or_else(|| kind.singleton.then(|| kind.name.clone()))
        .ok_or_else(|| {
            ClientError::shape(format!(
                "no '{}' or 'id' in payload for '{}'",
                kind.id_attribute, kind.name
            ))
        })?;

    let (attributes, wire_names) = translate(top, kind.field_case);
    Ok(Record::new(kind.name.as_str(), id, attributes).with_wire_names(wire_names))
}

/// Wire representation of a record: all attributes, wire-cased.
///
/// Fields that came off the wire are written back under the exact name
/// they arrived with.
#[must_use]
pub fn serialize_record(kind: &ResourceKind, record: &Record) -> Value {
    let mut out = Attributes::with_capacity(record.attributes.len());
    for (field, value) in &record.attributes {
        let wire = match record.wire_names.get(field) {
            Some(name) => name.clone(),
            None => kind.field_case.to_wire(field),
        };
        out.insert(wire, value.clone());
    }
    Value::Object(out)
}

/// Request body for create/update: like [`serialize_record`] without
/// response metadata or path template parameters.
#[must_use]
pub fn serialize_record_for_write(kind: &ResourceKind, record: &Record) -> Value {
    let params = kind.template_params();
    let Value::Object(mut out) = serialize_record(kind, record) else {
        return Value::Object(Attributes::new());
    };
    out.retain(|field, _| {
        !RESPONSE_METADATA.contains(&field.as_str()) && !params.contains(&field.as_str())
    });
    Value::Object(out)
}

/// Rename wire fields to attribute names.
///
/// A field is renamed only when the rename reverses exactly and does not
/// land on another wire field of the same object. Every other field keeps
/// its wire name, and is listed in the returned map when `to_wire` would
/// not give that name back.
fn translate(attributes: Attributes, case: FieldCase) -> (Attributes, HashMap<String, String>) {
    let mut wire_names = HashMap::new();
    if case == FieldCase::Preserve {
        return (attributes, wire_names);
    }

    let mut out = Attributes::with_capacity(attributes.len());
    for (wire, value) in &attributes {
        let renamed = case.to_attribute(wire);
        let reversible = case.to_wire(&renamed) == *wire;
        let field = if reversible && (renamed == *wire || !attributes.contains_key(&renamed)) {
            renamed
        } else {
            if case.to_wire(wire) != *wire {
                wire_names.insert(wire.clone(), wire.clone());
            }
            wire.clone()
        };
        out.insert(field, value.clone());
    }
    (out, wire_names)
}

fn string_field(object: &Attributes, field: &str) -> Option<String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// `max_path_length` → `maxPathLength`.
#[must_use]
pub fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for (i, ch) in name.chars().enumerate() {
        if ch == '_' && i > 0 {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    if upper_next {
        out.push('_');
    }
    out
}

/// `maxPathLength` → `max_path_length`.
#[must_use]
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len().saturating_add(4));
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
