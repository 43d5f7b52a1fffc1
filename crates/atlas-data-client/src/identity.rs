//! Mapping between the store's `_id` field and the public `id` field.

use crate::types::Document;
use serde_json::{Map, Value};

pub const STORE_ID_FIELD: &str = "_id";
pub const PUBLIC_ID_FIELD: &str = "id";
pub const OBJECT_ID_KEY: &str = "$oid";

/// Renames `_id` to `id` on a document read from the store.
///
/// Documents without `_id` pass through unchanged. An extended-JSON `{"$oid": "..."}` identity
/// is unwrapped to its hex string.
pub fn to_public(mut document: Document) -> Document {
    if let Some(store_id) = document.remove(STORE_ID_FIELD) {
        document.insert(PUBLIC_ID_FIELD.to_string(), unwrap_object_id(store_id));
    }
    document
}

/// Filter matching the document whose `_id` is the object id `id`.
pub fn to_store_filter(id: &str) -> Document {
    let mut filter = Map::new();
    filter.insert(STORE_ID_FIELD.to_string(), object_id_ref(id));
    filter
}

/// `{"$oid": id}`, the store's object-id reference shape.
pub fn object_id_ref(id: &str) -> Value {
    let mut reference = Map::new();
    reference.insert(OBJECT_ID_KEY.to_string(), Value::String(id.to_string()));
    Value::Object(reference)
}

/// Reads an identity reported by the store, as a plain string or an `$oid` reference.
pub fn identity_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(reference) if reference.len() == 1 => reference
            .get(OBJECT_ID_KEY)
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn unwrap_object_id(value: Value) -> Value {
    match value {
        Value::Object(mut reference) if reference.len() == 1 => {
            match reference.remove(OBJECT_ID_KEY) {
                Some(Value::String(id)) => Value::String(id),
                Some(other) => {
                    reference.insert(OBJECT_ID_KEY.to_string(), other);
                    Value::Object(reference)
                }
                None => Value::Object(reference),
            }
        }
        other => other,
    }
}
