// ── JSON flattening ──
//
// Decomposes a JSON object into leaf writes at `.`-separated paths.
// Objects recurse; everything else is a leaf. String fields that carry an
// encoded JSON object or array (the cloud's `settings`/`value` fields) are
// decoded first. Arrays are opaque leaves stored as their JSON text.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::namespace;
use crate::store::{ObjectMeta, StateStore, StateValue, ValueKind};

/// One leaf write produced by [`flatten`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeWrite {
    pub path: String,
    pub value: StateValue,
    pub kind: ValueKind,
}

/// Flatten a JSON object under `base`.
///
/// The root must be an object (or a string encoding one); anything else is
/// a [`CoreError::DataFormat`] and produces no writes.
pub fn flatten(base: &str, value: &Value) -> Result<Vec<NodeWrite>, CoreError> {
    let root = expand_embedded(value);
    let Value::Object(map) = root.as_ref() else {
        return Err(CoreError::DataFormat {
            message: format!("cannot flatten a non-object payload under `{base}`"),
        });
    };

    let mut writes = Vec::new();
    flatten_into(base, map, &mut writes);
    Ok(writes)
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, out: &mut Vec<NodeWrite>) {
    for (key, value) in map {
        let path = namespace::join(prefix, key);
        match expand_embedded(value).as_ref() {
            Value::Object(inner) => flatten_into(&path, inner, out),
            leaf => out.push(leaf_write(path, leaf)),
        }
    }
}

/// Decode a string that holds a JSON object or array. Scalar-looking
/// strings (`"42"`, `"true"`) stay strings so a node's type does not
/// depend on the text a user typed into the vendor app.
pub fn expand_embedded(value: &Value) -> Cow<'_, Value> {
    if let Value::String(text) = value {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed @ (Value::Object(_) | Value::Array(_))) =
                serde_json::from_str::<Value>(text)
            {
                return Cow::Owned(parsed);
            }
        }
    }
    Cow::Borrowed(value)
}

fn leaf_write(path: String, value: &Value) -> NodeWrite {
    let (value, kind) = match value {
        Value::Null => (StateValue::Null, ValueKind::Mixed),
        Value::Bool(b) => (StateValue::Bool(*b), ValueKind::Boolean),
        Value::Number(n) => (
            StateValue::Number(n.as_f64().unwrap_or_default()),
            ValueKind::Number,
        ),
        Value::String(s) => (StateValue::Text(s.clone()), ValueKind::String),
        Value::Array(_) | Value::Object(_) => (StateValue::Text(value.to_string()), ValueKind::Array),
    };
    NodeWrite { path, value, kind }
}

/// Materialize writes: create each node on first sight (type from the
/// first value), then overwrite its value with `ack = true`.
///
/// `writable` decides the writable flag for nodes created by this call.
pub async fn apply_writes(
    store: &dyn StateStore,
    writes: Vec<NodeWrite>,
    writable: impl Fn(&str) -> bool,
) -> Result<usize, CoreError> {
    let count = writes.len();
    for write in writes {
        let meta = ObjectMeta::state(
            namespace::leaf_name(&write.path),
            write.kind,
            writable(&write.path),
        );
        store.ensure_object(&write.path, meta).await?;
        store.set_state(&write.path, write.value, true).await?;
    }
    Ok(count)
}
