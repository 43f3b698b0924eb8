//! Kedai POS back-office core.
//!
//! Customer records, ingredient stock, menus with recipes, sales, expenses
//! and the reports built on top of them, all over one local SQLite file.
//! A host (web server or desktop shell) authenticates the user, builds a
//! [`SessionContext`], and calls the handlers in [`commands`].

use anyhow::Context;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

pub mod auth;
pub mod commands;
pub mod config;
pub mod customers;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod expenses;
pub mod ledger;
pub mod logging;
pub mod menu;
pub mod reports;
pub mod stocks;
pub mod time;

pub use auth::{Role, SessionContext};
pub use config::AppConfig;
pub use db::DbState;
pub use error::{FieldErrors, PosError, PosResult};

pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_f64(v: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_f64()) {
            return Some(n);
        }
    }
    None
}

/// Integer field, also accepting numeric strings (`"2025"`).
pub(crate) fn value_i64(v: &serde_json::Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        match v.get(*key) {
            Some(serde_json::Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Some(i);
                }
            }
            Some(serde_json::Value::String(s)) => {
                if let Ok(i) = s.trim().parse::<i64>() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Open (and migrate) the database described by `config`.
pub fn bootstrap(config: &AppConfig) -> anyhow::Result<DbState> {
    let db = db::init(&config.data_dir, &config.db_file)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("opening database at {}", config.db_path().display()))?;
    Ok(db)
}

/// A running back office: the database plus the log writer guard.
pub struct App {
    pub config: AppConfig,
    pub db: DbState,
    _log_guard: WorkerGuard,
}

/// Install logging, then open the database. Keep the returned [`App`] alive
/// for the life of the process; dropping it flushes the log file.
pub fn start(config: AppConfig) -> anyhow::Result<App> {
    let log_guard = logging::init(&config).context("initializing logging")?;
    info!("Starting Kedai POS v{}", env!("CARGO_PKG_VERSION"));

    let db = bootstrap(&config)?;
    info!(data_dir = %config.data_dir.display(), "Back office ready");

    Ok(App {
        config,
        db,
        _log_guard: log_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_helpers_take_first_usable_key() {
        let v = json!({ "id": "  ", "customerId": " C-1 ", "year": "2025", "amount": 12.5 });
        assert_eq!(value_str(&v, &["id", "customerId"]), Some("C-1".to_string()));
        assert_eq!(value_str(&v, &["missing"]), None);
        assert_eq!(value_i64(&v, &["year"]), Some(2025));
        assert_eq!(value_i64(&v, &["amount"]), None);
        assert_eq!(value_f64(&v, &["amount"]), Some(12.5));
    }

    #[test]
    fn test_bootstrap_creates_and_migrates_database() {
        let dir = std::env::temp_dir().join(format!("kedai-pos-boot-{}", uuid::Uuid::new_v4()));
        let config = AppConfig::with_data_dir(&dir);

        let db = bootstrap(&config).expect("bootstrap should succeed");
        assert_eq!(db.db_path, config.db_path());
        assert!(config.db_path().exists());
        {
            let conn = db.lock().unwrap();
            let tables: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'transactions'",
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(tables, 1);
        }
        drop(db);

        // Reopening an existing file is a no-op migration.
        assert!(bootstrap(&config).is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
