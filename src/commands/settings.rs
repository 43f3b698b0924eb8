use serde_json::Value;

use super::{gate, payload_from, respond};
use crate::auth::{self, SessionContext};
use crate::config::{self, StoreSettings};
use crate::db::DbState;
use crate::error::{PosError, PosResult};
use crate::{value_f64, value_str};

/// Store settings; any signed-in user may read them (the sale screen needs
/// the discount cap).
pub fn settings_get(db: &DbState, session: Option<&SessionContext>) -> Result<Value, String> {
    gate(session, auth::RECORD_SALE)?;
    respond(db.lock().map(|conn| StoreSettings::load(&conn)))
}

/// Update any of `discountMax` and `storeName`. Admin only.
pub fn settings_update(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    gate(session, auth::SYSTEM_SETTINGS)?;
    let payload = payload_from(arg0, "storeName");
    let discount_max = value_f64(&payload, &["discountMax", "discount_max"]);
    let store_name = value_str(&payload, &["storeName", "store_name"]);

    let result: PosResult<StoreSettings> = (|| {
        if discount_max.is_none() && store_name.is_none() {
            return Err(PosError::field("settings", "Tidak ada pengaturan yang diubah."));
        }
        let conn = db.lock()?;
        if let Some(value) = discount_max {
            config::set_discount_max(&conn, value)?;
        }
        if let Some(name) = store_name.as_deref() {
            config::set_store_name(&conn, name)?;
        }
        tracing::info!(?discount_max, ?store_name, "Store settings updated");
        Ok(StoreSettings::load(&conn))
    })();
    respond(result)
}
