//! Role-based authorization for back-office operations.
//!
//! Authentication itself happens in the host; requests arrive with a
//! `SessionContext` carrying the signed-in role. Anything without a
//! recognised role is treated as staff.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PosError, PosResult};

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

pub const RECORD_SALE: &str = "record_sale";
pub const MANAGE_CATALOG: &str = "manage_catalog";
pub const MANAGE_EXPENSES: &str = "manage_expenses";
pub const VIEW_REPORTS: &str = "view_reports";
pub const EDIT_TRANSACTION: &str = "edit_transaction";
pub const DELETE_TRANSACTION: &str = "delete_transaction";
pub const SYSTEM_SETTINGS: &str = "system_settings";

/// Permissions granted to administrators.
const ADMIN_PERMISSIONS: &[&str] = &[
    RECORD_SALE,
    MANAGE_CATALOG,
    MANAGE_EXPENSES,
    VIEW_REPORTS,
    EDIT_TRANSACTION,
    DELETE_TRANSACTION,
    SYSTEM_SETTINGS,
];

/// Permissions granted to regular staff.
const STAFF_PERMISSIONS: &[&str] = &[RECORD_SALE, MANAGE_CATALOG, MANAGE_EXPENSES, VIEW_REPORTS];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Deserialized leniently through [`Role::parse`], so hosts may send any
/// casing and unknown roles fall back to staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    /// Lenient parse: only an explicit `admin` grants admin.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Staff
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }

    pub fn permissions(self) -> &'static [&'static str] {
        match self {
            Role::Admin => ADMIN_PERMISSIONS,
            Role::Staff => STAFF_PERMISSIONS,
        }
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        Role::parse(&raw)
    }
}

/// Authenticated user context supplied by the host per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    #[serde(default, alias = "user_name", alias = "name")]
    pub user_name: Option<String>,
    pub role: Role,
}

impl SessionContext {
    pub fn new(user_name: Option<&str>, role: Role) -> Self {
        Self {
            user_name: user_name.map(str::to_string),
            role,
        }
    }

    pub fn admin() -> Self {
        Self::new(None, Role::Admin)
    }

    pub fn staff() -> Self {
        Self::new(None, Role::Staff)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.role.permissions().contains(&permission)
    }
}

/// Check that the caller holds `permission`. A missing session is refused.
pub fn require_permission(session: Option<&SessionContext>, permission: &str) -> PosResult<()> {
    match session {
        Some(ctx) if ctx.has_permission(permission) => Ok(()),
        Some(ctx) => {
            warn!(role = ctx.role.as_str(), permission, "Permission denied");
            Err(PosError::Forbidden(denied_message(permission)))
        }
        None => {
            warn!(permission, "Permission denied: no session");
            Err(PosError::Forbidden(denied_message(permission)))
        }
    }
}

fn denied_message(permission: &str) -> String {
    match permission {
        EDIT_TRANSACTION => "Hanya admin yang dapat mengedit transaksi.".into(),
        DELETE_TRANSACTION => "Hanya admin yang dapat menghapus transaksi.".into(),
        SYSTEM_SETTINGS => "Hanya admin yang dapat mengubah pengaturan.".into(),
        other => format!("izin '{other}' diperlukan."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_defaults_to_staff() {
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse(" ADMIN "), Role::Admin);
        assert_eq!(Role::parse("staff"), Role::Staff);
        assert_eq!(Role::parse("owner"), Role::Staff);
        assert_eq!(Role::parse(""), Role::Staff);
    }

    #[test]
    fn test_staff_cannot_edit_or_delete_transactions() {
        let staff = SessionContext::staff();
        assert!(staff.has_permission(RECORD_SALE));
        assert!(staff.has_permission(VIEW_REPORTS));
        assert!(matches!(
            require_permission(Some(&staff), EDIT_TRANSACTION),
            Err(PosError::Forbidden(_))
        ));
        assert!(matches!(
            require_permission(Some(&staff), DELETE_TRANSACTION),
            Err(PosError::Forbidden(_))
        ));
    }

    #[test]
    fn test_admin_has_everything() {
        let admin = SessionContext::admin();
        for perm in ADMIN_PERMISSIONS {
            assert!(require_permission(Some(&admin), perm).is_ok());
        }
    }

    #[test]
    fn test_missing_session_is_forbidden() {
        let err = require_permission(None, RECORD_SALE).unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[test]
    fn test_session_deserializes_from_host_payload() {
        let ctx: SessionContext =
            serde_json::from_value(serde_json::json!({ "user_name": "Rina", "role": "admin" }))
                .unwrap();
        assert_eq!(ctx.role, Role::Admin);
        assert_eq!(ctx.user_name.as_deref(), Some("Rina"));
    }

    #[test]
    fn test_session_role_is_parsed_leniently() {
        let upper: SessionContext =
            serde_json::from_value(serde_json::json!({ "role": " Admin " })).unwrap();
        assert_eq!(upper.role, Role::Admin);
        let unknown: SessionContext =
            serde_json::from_value(serde_json::json!({ "role": "owner" })).unwrap();
        assert_eq!(unknown.role, Role::Staff);
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), "admin");
    }
}
