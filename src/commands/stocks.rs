use serde::Deserialize;
use serde_json::Value;

use super::{gate, merge_payload_args, parse_payload, payload_from, require_id, respond, to_value};
use crate::auth::{self, SessionContext};
use crate::db::DbState;
use crate::stocks::{self, StockInput, StockStatus};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockListPayload {
    #[serde(default, alias = "q", alias = "search")]
    query: String,
    #[serde(default, alias = "stockStatus")]
    status: String,
}

fn parse_list_payload(arg0: Option<Value>) -> (String, Option<StockStatus>) {
    let payload = payload_from(arg0, "query");
    let parsed: StockListPayload = serde_json::from_value(payload).unwrap_or_default();
    // An empty or unrecognised status ("all", "semua") lists everything.
    (parsed.query.trim().to_string(), StockStatus::parse(&parsed.status))
}

const ID_KEYS: &[&str] = &["id", "stockId", "stock_id"];

pub fn stock_create(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let input: StockInput = parse_payload(payload_from(arg0, "name"), "stock")?;
    respond(stocks::create(db, &input))
}

pub fn stock_update(
    arg0: Option<Value>,
    arg1: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let payload = merge_payload_args(arg0, arg1);
    let id = require_id(&payload, ID_KEYS, "stock")?;
    let input: StockInput = parse_payload(payload, "stock update")?;
    respond(stocks::update(db, &id, &input))
}

pub fn stock_delete(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let id = require_id(&payload_from(arg0, "id"), ID_KEYS, "stock")?;
    respond(stocks::delete(db, &id).map(|()| serde_json::json!({ "id": id })))
}

pub fn stock_get(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let id = require_id(&payload_from(arg0, "id"), ID_KEYS, "stock")?;
    respond(stocks::get_by_id(db, &id))
}

pub fn stock_list(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let (query, status) = parse_list_payload(arg0);
    respond(stocks::list(db, &query, status))
}

pub fn stock_counts(db: &DbState, session: Option<&SessionContext>) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    to_value(&stocks::counts(db))
}

/// Ingredient picker for the recipe editor.
pub fn stock_picker(db: &DbState, session: Option<&SessionContext>) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    respond(stocks::picker(db))
}
