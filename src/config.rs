//! Process configuration and runtime store settings.
//!
//! `AppConfig` is resolved once from the environment at startup.
//! `StoreSettings` live in the `local_settings` table so they can be changed
//! from the back office without a restart.

use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

use crate::db;
use crate::error::{PosError, PosResult};

pub const DATA_DIR_ENV: &str = "KEDAI_POS_DATA_DIR";
pub const LOG_DIR_ENV: &str = "KEDAI_POS_LOG_DIR";
pub const DEFAULT_LOG_FILTER: &str = "info,kedai_pos_lib=debug";
pub const DEFAULT_DB_FILE: &str = "kedai.db";
const APP_DIR_NAME: &str = "kedai-pos";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_filter: String,
    pub db_file: String,
}

impl AppConfig {
    /// Resolve directories and the log filter from the environment.
    pub fn from_env() -> Self {
        let data_dir = std::env::var(DATA_DIR_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let log_dir = std::env::var(LOG_DIR_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("logs"));

        let log_filter = std::env::var("RUST_LOG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            data_dir,
            log_dir,
            log_filter,
            db_file: DEFAULT_DB_FILE.to_string(),
        }
    }

    /// Config rooted at an explicit directory (tests, embedded hosts).
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            log_dir: data_dir.join("logs"),
            data_dir,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            db_file: DEFAULT_DB_FILE.to_string(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                .join(".local")
                .join("share")
        })
        .join(APP_DIR_NAME)
}

// ---------------------------------------------------------------------------
// Store settings (local_settings, category "general")
// ---------------------------------------------------------------------------

const SETTINGS_CATEGORY: &str = "general";
const DISCOUNT_MAX_KEY: &str = "discount_max";
const STORE_NAME_KEY: &str = "store_name";

pub const DEFAULT_DISCOUNT_MAX: f64 = 100.0;
pub const DEFAULT_STORE_NAME: &str = "Kedai";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    pub discount_max: f64,
    pub store_name: String,
}

impl StoreSettings {
    pub fn load(conn: &Connection) -> Self {
        Self {
            discount_max: discount_max(conn),
            store_name: db::get_setting(conn, SETTINGS_CATEGORY, STORE_NAME_KEY)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_STORE_NAME.to_string()),
        }
    }
}

/// Maximum allowed discount percentage. Unparseable values fall back to the default.
pub fn discount_max(conn: &Connection) -> f64 {
    match db::get_setting(conn, SETTINGS_CATEGORY, DISCOUNT_MAX_KEY) {
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v.min(100.0),
            _ => {
                warn!(value = %raw, "Invalid discount_max setting, using default");
                DEFAULT_DISCOUNT_MAX
            }
        },
        None => DEFAULT_DISCOUNT_MAX,
    }
}

pub fn set_discount_max(conn: &Connection, value: f64) -> PosResult<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(PosError::field(
            "discountMax",
            "Diskon maksimum harus antara 0 dan 100.",
        ));
    }
    db::set_setting(conn, SETTINGS_CATEGORY, DISCOUNT_MAX_KEY, &value.to_string())
}

pub fn set_store_name(conn: &Connection, name: &str) -> PosResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PosError::field("storeName", "Nama toko tidak boleh kosong."));
    }
    db::set_setting(conn, SETTINGS_CATEGORY, STORE_NAME_KEY, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(DATA_DIR_ENV);
        std::env::remove_var(LOG_DIR_ENV);
        std::env::remove_var("RUST_LOG");
    }

    #[test]
    #[serial]
    fn test_from_env_explicit_dirs() {
        clear_env();
        std::env::set_var(DATA_DIR_ENV, "/tmp/kedai-data");
        std::env::set_var(LOG_DIR_ENV, "/tmp/kedai-logs");
        std::env::set_var("RUST_LOG", "warn");

        let cfg = AppConfig::from_env();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/kedai-data"));
        assert_eq!(cfg.log_dir, PathBuf::from("/tmp/kedai-logs"));
        assert_eq!(cfg.log_filter, "warn");
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/kedai-data/kedai.db"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_log_dir_under_data_dir() {
        clear_env();
        std::env::set_var(DATA_DIR_ENV, "/srv/kedai");

        let cfg = AppConfig::from_env();
        assert_eq!(cfg.log_dir, PathBuf::from("/srv/kedai/logs"));
        assert_eq!(cfg.log_filter, DEFAULT_LOG_FILTER);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_falls_back_to_xdg() {
        clear_env();
        let prev_xdg = std::env::var("XDG_DATA_HOME").ok();
        std::env::set_var("XDG_DATA_HOME", "/home/kasir/.data");

        let cfg = AppConfig::from_env();
        assert_eq!(cfg.data_dir, PathBuf::from("/home/kasir/.data/kedai-pos"));

        match prev_xdg {
            Some(v) => std::env::set_var("XDG_DATA_HOME", v),
            None => std::env::remove_var("XDG_DATA_HOME"),
        }
    }

    #[test]
    fn test_store_settings_defaults() {
        let db = db::test_state();
        let conn = db.lock().unwrap();
        let settings = StoreSettings::load(&conn);
        assert_eq!(settings.discount_max, DEFAULT_DISCOUNT_MAX);
        assert_eq!(settings.store_name, DEFAULT_STORE_NAME);
    }

    #[test]
    fn test_store_settings_round_trip_and_validation() {
        let db = db::test_state();
        let conn = db.lock().unwrap();
        set_discount_max(&conn, 30.0).unwrap();
        set_store_name(&conn, "  Kopi Pagi ").unwrap();
        let settings = StoreSettings::load(&conn);
        assert_eq!(settings.discount_max, 30.0);
        assert_eq!(settings.store_name, "Kopi Pagi");

        assert!(matches!(
            set_discount_max(&conn, 120.0),
            Err(PosError::Validation(_))
        ));
        assert!(matches!(
            set_store_name(&conn, "   "),
            Err(PosError::Validation(_))
        ));
    }

    #[test]
    fn test_garbage_discount_max_uses_default() {
        let db = db::test_state();
        let conn = db.lock().unwrap();
        db::set_setting(&conn, "general", "discount_max", "banyak").unwrap();
        assert_eq!(discount_max(&conn), DEFAULT_DISCOUNT_MAX);
    }
}
