use serde::Deserialize;
use serde_json::{json, Value};

use super::{gate, merge_payload_args, parse_payload, payload_from, require_id, respond};
use crate::auth::{self, SessionContext};
use crate::db::DbState;
use crate::expenses::{self, ExpenseInput, EXPENSE_CATEGORIES, PAYMENT_METHODS};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseListPayload {
    #[serde(default, alias = "q", alias = "search")]
    query: String,
    #[serde(default)]
    category: Option<String>,
}

fn parse_list_payload(arg0: Option<Value>) -> ExpenseListPayload {
    let payload = payload_from(arg0, "query");
    let mut parsed: ExpenseListPayload = serde_json::from_value(payload).unwrap_or_default();
    parsed.query = parsed.query.trim().to_string();
    parsed
}

const ID_KEYS: &[&str] = &["id", "expenseId", "expense_id"];

pub fn expense_create(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_EXPENSES)?;
    let input: ExpenseInput = parse_payload(payload_from(arg0, "category"), "expense")?;
    respond(expenses::create(db, &input))
}

pub fn expense_update(
    arg0: Option<Value>,
    arg1: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_EXPENSES)?;
    let payload = merge_payload_args(arg0, arg1);
    let id = require_id(&payload, ID_KEYS, "expense")?;
    let input: ExpenseInput = parse_payload(payload, "expense update")?;
    respond(expenses::update(db, &id, &input))
}

pub fn expense_delete(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_EXPENSES)?;
    let id = require_id(&payload_from(arg0, "id"), ID_KEYS, "expense")?;
    respond(expenses::delete(db, &id).map(|()| json!({ "id": id })))
}

pub fn expense_get(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_EXPENSES)?;
    let id = require_id(&payload_from(arg0, "id"), ID_KEYS, "expense")?;
    respond(expenses::get_by_id(db, &id))
}

pub fn expense_list(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_EXPENSES)?;
    let payload = parse_list_payload(arg0);
    respond(expenses::list(db, &payload.query, payload.category.as_deref()))
}

/// Suggested categories and payment methods for the expense form.
pub fn expense_form_options(session: Option<&SessionContext>) -> Result<Value, String> {
    gate(session, auth::MANAGE_EXPENSES)?;
    Ok(json!({
        "categories": EXPENSE_CATEGORIES,
        "paymentMethods": PAYMENT_METHODS,
    }))
}

#[cfg(test)]
mod dto_tests {
    use super::*;
    use crate::db::test_state;

    #[test]
    fn parse_list_payload_reads_category() {
        let parsed = parse_list_payload(Some(json!({ "search": " token ", "category": "Listrik" })));
        assert_eq!(parsed.query, "token");
        assert_eq!(parsed.category.as_deref(), Some("Listrik"));
        assert!(parse_list_payload(None).category.is_none());
    }

    #[test]
    fn expense_handlers_accept_snake_case_fields() {
        let db = test_state();
        let staff = SessionContext::staff();
        let created = expense_create(
            Some(json!({
                "category": "Kemasan",
                "amount": 45000,
                "payment_method": "Transfer",
                "expense_date": "2025-04-02"
            })),
            &db,
            Some(&staff),
        )
        .unwrap();
        assert_eq!(created["success"], true);
        assert_eq!(created["data"]["paymentMethod"], "Transfer");

        let listed = expense_list(Some(json!({ "category": "all" })), &db, Some(&staff)).unwrap();
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);

        let options = expense_form_options(Some(&staff)).unwrap();
        assert_eq!(options["paymentMethods"][0], "Cash");
    }
}
