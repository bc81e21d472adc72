//! Success and error envelopes.
//!
//! Every tool response is exactly one of the two shapes: a success envelope
//! (`success: true` merged into the serialized payload) or an error envelope
//! (`success: false` plus the taxonomy fields). A response never carries both
//! a payload and an error.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ToolError;

/// Serialize a payload and merge `success: true` into its top-level object.
pub fn success_envelope<T: Serialize>(payload: &T) -> Value {
    let mut value = serde_json::to_value(payload).unwrap_or_else(|e| {
        json!({ "serialization_failure": e.to_string() })
    });
    if let Some(obj) = value.as_object_mut() {
        obj.insert("success".into(), Value::Bool(true));
    }
    value
}

/// Convert a `ToolError` into the error envelope shape.
pub fn error_envelope(err: &ToolError) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("success".into(), Value::Bool(false));
    obj.insert("error_kind".into(), Value::String(err.kind().into()));
    obj.insert("error_code".into(), json!(err.code()));
    obj.insert("message".into(), Value::String(err.to_string()));
    obj.insert(
        "recovery_suggestions".into(),
        json!(err.recovery_suggestions()),
    );

    match err {
        ToolError::NotFound { available_ids, .. } => {
            obj.insert("available_ids".into(), json!(available_ids));
        }
        ToolError::Infeasible {
            growth_rate,
            target_growth_rate,
            ..
        } => {
            obj.insert("growth_rate".into(), json!(growth_rate));
            obj.insert("target_growth_rate".into(), json!(target_growth_rate));
        }
        _ => {}
    }

    Value::Object(obj)
}
