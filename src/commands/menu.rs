use serde_json::Value;

use super::{gate, merge_payload_args, parse_payload, payload_from, require_id, respond, to_value};
use crate::auth::{self, SessionContext};
use crate::db::DbState;
use crate::menu::{self, MenuInput};
use crate::value_str;

const ID_KEYS: &[&str] = &["id", "menuId", "menu_id"];

fn parse_query(arg0: Option<Value>) -> String {
    value_str(&payload_from(arg0, "query"), &["query", "q", "search"]).unwrap_or_default()
}

pub fn menu_create(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let input: MenuInput = parse_payload(payload_from(arg0, "name"), "menu")?;
    respond(menu::create(db, &input))
}

/// Replace a menu's fields and recipe; HPP is recomputed.
pub fn menu_update(
    arg0: Option<Value>,
    arg1: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let payload = merge_payload_args(arg0, arg1);
    let id = require_id(&payload, ID_KEYS, "menu")?;
    let input: MenuInput = parse_payload(payload, "menu update")?;
    respond(menu::update(db, &id, &input))
}

pub fn menu_delete(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let id = require_id(&payload_from(arg0, "id"), ID_KEYS, "menu")?;
    respond(menu::soft_delete(db, &id).map(|()| serde_json::json!({ "id": id })))
}

pub fn menu_get(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let id = require_id(&payload_from(arg0, "id"), ID_KEYS, "menu")?;
    respond(menu::get_by_id(db, &id))
}

pub fn menu_list(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    respond(menu::list(db, &parse_query(arg0)))
}

/// Menu grid for the sale screen.
pub fn menu_pos_options(db: &DbState, session: Option<&SessionContext>) -> Result<Value, String> {
    gate(session, auth::RECORD_SALE)?;
    respond(menu::pos_options(db))
}

pub fn menu_counts(db: &DbState, session: Option<&SessionContext>) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    to_value(&menu::counts(db))
}
