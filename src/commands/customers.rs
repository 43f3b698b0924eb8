use serde::Deserialize;
use serde_json::Value;

use super::{gate, merge_payload_args, parse_payload, payload_from, require_id, respond, to_value};
use crate::auth::{self, SessionContext};
use crate::customers::{self, CustomerInput, SortOrder};
use crate::db::DbState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerListPayload {
    #[serde(default, alias = "q", alias = "search", alias = "term")]
    query: String,
    #[serde(default, alias = "order")]
    sort: SortOrder,
}

fn parse_list_payload(arg0: Option<Value>) -> CustomerListPayload {
    let payload = payload_from(arg0, "query");
    let mut parsed: CustomerListPayload = serde_json::from_value(payload).unwrap_or_default();
    parsed.query = parsed.query.trim().to_string();
    parsed
}

const ID_KEYS: &[&str] = &["id", "customerId", "customer_id"];

pub fn customer_create(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let input: CustomerInput = parse_payload(payload_from(arg0, "name"), "customer")?;
    respond(customers::create(db, &input))
}

pub fn customer_update(
    arg0: Option<Value>,
    arg1: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let payload = merge_payload_args(arg0, arg1);
    let id = require_id(&payload, ID_KEYS, "customer")?;
    let input: CustomerInput = parse_payload(payload, "customer update")?;
    respond(customers::update(db, &id, &input))
}

pub fn customer_delete(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let id = require_id(&payload_from(arg0, "id"), ID_KEYS, "customer")?;
    respond(customers::delete(db, &id).map(|()| serde_json::json!({ "id": id })))
}

pub fn customer_get(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let id = require_id(&payload_from(arg0, "id"), ID_KEYS, "customer")?;
    respond(customers::get_by_id(db, &id))
}

pub fn customer_list(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::MANAGE_CATALOG)?;
    let payload = parse_list_payload(arg0);
    respond(customers::list(db, payload.sort, &payload.query))
}

/// Customer picker for the sale screen.
pub fn customer_options(db: &DbState, session: Option<&SessionContext>) -> Result<Value, String> {
    gate(session, auth::RECORD_SALE)?;
    respond(customers::options(db))
}

pub fn customer_status_counts(
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::VIEW_REPORTS)?;
    match customers::status_counts(db) {
        Ok(counts) => to_value(&counts),
        Err(e) => {
            tracing::error!("customer status counts failed: {e}");
            to_value(&customers::StatusCounts::default())
        }
    }
}

#[cfg(test)]
mod dto_tests {
    use super::*;
    use crate::db::test_state;
    use serde_json::json;

    #[test]
    fn parse_list_payload_supports_string_and_aliases() {
        let from_string = parse_list_payload(Some(json!("  dewi ")));
        assert_eq!(from_string.query, "dewi");
        assert_eq!(from_string.sort, SortOrder::Desc);

        let from_alias = parse_list_payload(Some(json!({ "q": "budi", "order": "asc" })));
        assert_eq!(from_alias.query, "budi");
        assert_eq!(from_alias.sort, SortOrder::Asc);

        let garbage = parse_list_payload(Some(json!({ "sort": "sideways" })));
        assert_eq!(garbage.query, "");
    }

    #[test]
    fn create_update_delete_round_trip_through_handlers() {
        let db = test_state();
        let staff = SessionContext::staff();

        let created = customer_create(
            Some(json!({ "name": "Dewi", "phoneNumber": "0812", "address": "Jl. Melati" })),
            &db,
            Some(&staff),
        )
        .unwrap();
        assert_eq!(created["success"], true);
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let duplicate = customer_create(
            Some(json!({ "name": "Lain", "phone": "0812", "address": "Jl. Mawar" })),
            &db,
            Some(&staff),
        )
        .unwrap();
        assert_eq!(duplicate["code"], "duplicate_phone");

        let updated = customer_update(
            Some(json!(id.clone())),
            Some(json!({ "name": "Dewi S", "phone": "0812", "address": "Jl. Melati 2" })),
            &db,
            Some(&staff),
        )
        .unwrap();
        assert_eq!(updated["data"]["name"], "Dewi S");

        let listed = customer_list(Some(json!("dewi")), &db, Some(&staff)).unwrap();
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);

        let deleted = customer_delete(Some(json!({ "customerId": id })), &db, Some(&staff)).unwrap();
        assert_eq!(deleted["success"], true);
    }

    #[test]
    fn handlers_require_a_session() {
        let db = test_state();
        assert!(customer_list(None, &db, None).is_err());
        assert!(customer_options(&db, None).is_err());
    }

    #[test]
    fn invalid_input_reports_field_errors() {
        let db = test_state();
        let res = customer_create(Some(json!({ "name": "" })), &db, Some(&SessionContext::admin())).unwrap();
        assert_eq!(res["success"], false);
        assert!(res["errors"]["phone"].is_array());
        assert!(res["errors"]["address"].is_array());
    }
}
