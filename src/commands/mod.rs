//! Request handlers.
//!
//! Every handler takes the raw JSON arguments the host received (`arg0`,
//! sometimes `arg1` for the legacy `(id, fields)` tuple form), the database,
//! and the caller's session. Payloads are camelCase with snake_case aliases.
//!
//! Results of fallible operations come back as an envelope:
//! `{ "success": true, "data": ... }` on success, or
//! `{ "success": false, "code", "error", "errors"? }` for validation and
//! business-rule failures. Persistence failures are returned as `Err`.
//! Reports never fail and return their record directly.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::auth::{self, SessionContext};
use crate::error::{PosError, PosResult};

pub mod customers;
pub mod expenses;
pub mod menu;
pub mod reports;
pub mod settings;
pub mod stocks;
pub mod transactions;

/// Normalise a single argument: a bare string becomes `{ key: string }`.
pub(crate) fn payload_from(arg0: Option<Value>, key: &str) -> Value {
    match arg0 {
        Some(Value::String(s)) => {
            let mut obj = Map::new();
            obj.insert(key.to_string(), Value::String(s));
            Value::Object(obj)
        }
        Some(Value::Object(obj)) => Value::Object(obj),
        Some(v) => v,
        None => json!({}),
    }
}

/// Merge `(id, fields)` or `(fields, more_fields)` into one object.
pub(crate) fn merge_payload_args(arg0: Option<Value>, arg1: Option<Value>) -> Value {
    match (arg0, arg1) {
        (Some(Value::String(id)), Some(Value::Object(mut extra))) => {
            extra.insert("id".to_string(), Value::String(id));
            Value::Object(extra)
        }
        (Some(Value::Object(mut base)), Some(Value::Object(extra))) => {
            for (k, v) in extra {
                base.insert(k, v);
            }
            Value::Object(base)
        }
        (Some(v), _) => payload_from(Some(v), "id"),
        (None, Some(v)) => v,
        _ => json!({}),
    }
}

pub(crate) fn parse_payload<T: DeserializeOwned>(payload: Value, what: &str) -> Result<T, String> {
    serde_json::from_value(payload).map_err(|e| format!("Invalid {what} payload: {e}"))
}

/// Required id under any of `keys`.
pub(crate) fn require_id(payload: &Value, keys: &[&str], what: &str) -> Result<String, String> {
    crate::value_str(payload, keys).ok_or_else(|| format!("Missing {what} id"))
}

pub(crate) fn gate(session: Option<&SessionContext>, permission: &str) -> Result<(), String> {
    auth::require_permission(session, permission).map_err(String::from)
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize response: {e}"))
}

/// Wrap a domain result in the response envelope.
pub(crate) fn respond<T: Serialize>(result: PosResult<T>) -> Result<Value, String> {
    match result {
        Ok(data) => Ok(json!({ "success": true, "data": to_value(&data)? })),
        Err(err @ (PosError::Database(_) | PosError::Lock(_))) => Err(err.into()),
        Err(PosError::Validation(errors)) => {
            let message = PosError::Validation(errors.clone()).to_string();
            Ok(json!({
                "success": false,
                "code": "validation",
                "error": message,
                "errors": errors,
            }))
        }
        Err(err) => {
            warn!(code = err.code(), "Request rejected: {err}");
            Ok(json!({
                "success": false,
                "code": err.code(),
                "error": err.to_string(),
            }))
        }
    }
}
