//! Error taxonomy shared by the ledger, the catalog modules and the
//! request handlers.
//!
//! Aggregators in `reports` never surface these; they log and fall back to
//! zero-valued defaults instead.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Per-field validation messages, keyed by the payload field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error.
    pub fn into_result(self) -> PosResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PosError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum PosError {
    #[error("Validasi gagal: {0}")]
    Validation(FieldErrors),

    #[error("Stok bahan '{ingredient}' tidak mencukupi.")]
    InsufficientStock { ingredient: String },

    #[error("Nomor HP ini sudah terdaftar. Gunakan nomor lain.")]
    DuplicatePhone,

    #[error("Pelanggan ini memiliki {count} transaksi. Tidak dapat dihapus.")]
    CustomerHasTransactions { count: i64 },

    #[error("Bahan ini masih dipakai di {menus} resep menu.")]
    StockInUse { menus: i64 },

    #[error("Akses ditolak: {0}")]
    Forbidden(String),

    #[error("Data tidak ditemukan: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned: {0}")]
    Lock(String),
}

pub type PosResult<T> = Result<T, PosError>;

impl PosError {
    /// Single-field validation failure.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        PosError::Validation(errors)
    }

    /// Stable machine-readable code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            PosError::Validation(_) => "validation",
            PosError::InsufficientStock { .. } => "insufficient_stock",
            PosError::DuplicatePhone => "duplicate_phone",
            PosError::CustomerHasTransactions { .. } => "customer_has_transactions",
            PosError::StockInUse { .. } => "stock_in_use",
            PosError::Forbidden(_) => "forbidden",
            PosError::NotFound(_) => "not_found",
            PosError::Database(_) | PosError::Lock(_) => "internal",
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for PosError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        PosError::Lock(err.to_string())
    }
}

impl From<PosError> for String {
    fn from(err: PosError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_display_and_lookup() {
        let mut errors = FieldErrors::new();
        errors.add("phone", "Nomor HP wajib diisi.");
        errors.add("name", "Nama tidak boleh kosong.");
        assert_eq!(
            errors.to_string(),
            "name: Nama tidak boleh kosong.; phone: Nomor HP wajib diisi."
        );
        assert_eq!(errors.get("phone").map(|m| m.len()), Some(1));
        assert!(errors.get("address").is_none());
    }

    #[test]
    fn test_empty_field_errors_is_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_insufficient_stock_message_names_ingredient() {
        let err = PosError::InsufficientStock {
            ingredient: "Susu".into(),
        };
        assert_eq!(err.code(), "insufficient_stock");
        let msg: String = err.into();
        assert!(msg.contains("'Susu'"));
    }
}
