use serde_json::Value;

use super::{gate, merge_payload_args, parse_payload, payload_from, require_id, respond, to_value};
use crate::auth::{self, SessionContext};
use crate::db::DbState;
use crate::ledger::{self, SaleInput};
use crate::value_str;

const ID_KEYS: &[&str] = &["id", "transactionId", "transaction_id"];

/// Accepts `{ items, customerId, ... }` or the cart array on its own.
fn parse_sale_payload(payload: Value) -> Result<SaleInput, String> {
    let payload = match payload {
        Value::Array(items) => serde_json::json!({ "items": items }),
        other => other,
    };
    parse_payload(payload, "sale")
}

pub fn transaction_create(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let input = parse_sale_payload(arg0.unwrap_or_else(|| serde_json::json!({})))?;
    respond(ledger::record_sale(db, session, &input).map(|id| serde_json::json!({ "id": id })))
}

/// Admin only; the ledger enforces the role.
pub fn transaction_update(
    arg0: Option<Value>,
    arg1: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let payload = merge_payload_args(arg0, arg1);
    let id = require_id(&payload, ID_KEYS, "transaction")?;
    let input = parse_sale_payload(payload)?;
    respond(ledger::revise_sale(db, session, &id, &input).map(|()| serde_json::json!({ "id": id })))
}

/// Admin only; the ledger enforces the role.
pub fn transaction_delete(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let id = require_id(&payload_from(arg0, "id"), ID_KEYS, "transaction")?;
    respond(ledger::void_sale(db, session, &id).map(|()| serde_json::json!({ "id": id })))
}

pub fn transaction_get(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::RECORD_SALE)?;
    let id = require_id(&payload_from(arg0, "id"), ID_KEYS, "transaction")?;
    respond(ledger::get_transaction(db, &id))
}

pub fn transaction_list(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::RECORD_SALE)?;
    let query = value_str(&payload_from(arg0, "query"), &["query", "q", "search"]).unwrap_or_default();
    respond(ledger::list_transactions(db, &query))
}

pub fn transaction_counts(db: &DbState, session: Option<&SessionContext>) -> Result<Value, String> {
    gate(session, auth::VIEW_REPORTS)?;
    to_value(&ledger::transaction_counts(db))
}
