//! Operating expenses (rent, utilities, raw material purchases, ...).

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::DbState;
use crate::error::{FieldErrors, PosError, PosResult};
use crate::time;

/// Suggested categories offered by the expense form. Category stays free text.
pub const EXPENSE_CATEGORIES: &[&str] = &[
    "Listrik",
    "Air",
    "Internet/Telepon",
    "Sewa Tempat",
    "Gaji Karyawan",
    "Belanja Bahan Baku",
    "Transportasi/Bensin",
    "Kebersihan",
    "Kemasan",
    "ATK",
    "Marketing",
    "Perbaikan",
    "Lain-lain",
];

pub const PAYMENT_METHODS: &[&str] = &["Cash", "Transfer", "Debit", "E-wallet"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub category: String,
    pub amount: f64,
    pub description: String,
    pub payment_method: String,
    pub expense_date: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseInput {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "payment_method")]
    pub payment_method: Option<String>,
    #[serde(default, alias = "expense_date", alias = "date")]
    pub expense_date: String,
}

struct ValidExpense {
    category: String,
    amount: f64,
    description: String,
    payment_method: String,
    expense_date: String,
}

impl ExpenseInput {
    fn validated(&self) -> PosResult<ValidExpense> {
        let mut errors = FieldErrors::new();
        let category = self.category.trim();
        if category.is_empty() {
            errors.add("category", "Kategori wajib diisi");
        }
        if !(self.amount.is_finite() && self.amount >= 0.0) {
            errors.add("amount", "Jumlah tidak boleh negatif");
        }
        let date = self.expense_date.trim();
        let parsed = if date.is_empty() {
            errors.add("expenseDate", "Tanggal wajib diisi");
            None
        } else {
            let parsed = time::parse_date(date);
            if parsed.is_none() {
                errors.add("expenseDate", "Format tanggal harus YYYY-MM-DD");
            }
            parsed
        };
        errors.into_result()?;

        Ok(ValidExpense {
            category: category.to_string(),
            amount: self.amount,
            description: self.description.as_deref().unwrap_or("").trim().to_string(),
            payment_method: self
                .payment_method
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_string(),
            expense_date: parsed
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        })
    }
}

const EXPENSE_COLUMNS: &str =
    "id, category, amount, description, payment_method, expense_date, created_at";

fn row_to_expense(row: &Row) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: row.get(0)?,
        category: row.get(1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        payment_method: row.get(4)?,
        expense_date: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn find(conn: &Connection, id: &str) -> PosResult<Option<Expense>> {
    let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_expense).optional()?)
}

pub fn create(db: &DbState, input: &ExpenseInput) -> PosResult<Expense> {
    let valid = input.validated()?;
    let conn = db.lock()?;
    let id = time::generate_id("EXP");
    let created_at = time::to_store_string(time::now_store());

    conn.execute(
        "INSERT INTO expenses (id, category, amount, description, payment_method, expense_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            valid.category,
            valid.amount,
            valid.description,
            valid.payment_method,
            valid.expense_date,
            created_at
        ],
    )?;

    info!(expense_id = %id, category = %valid.category, amount = valid.amount, "Expense recorded");
    find(&conn, &id)?.ok_or_else(|| PosError::NotFound(format!("pengeluaran {id}")))
}

pub fn update(db: &DbState, id: &str, input: &ExpenseInput) -> PosResult<Expense> {
    let valid = input.validated()?;
    let conn = db.lock()?;
    let changed = conn.execute(
        "UPDATE expenses
         SET category = ?1, amount = ?2, description = ?3, payment_method = ?4, expense_date = ?5
         WHERE id = ?6",
        params![
            valid.category,
            valid.amount,
            valid.description,
            valid.payment_method,
            valid.expense_date,
            id
        ],
    )?;
    if changed == 0 {
        return Err(PosError::NotFound(format!("pengeluaran {id}")));
    }
    info!(expense_id = %id, "Expense updated");
    find(&conn, id)?.ok_or_else(|| PosError::NotFound(format!("pengeluaran {id}")))
}

pub fn delete(db: &DbState, id: &str) -> PosResult<()> {
    let conn = db.lock()?;
    let removed = conn.execute("DELETE FROM expenses WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Err(PosError::NotFound(format!("pengeluaran {id}")));
    }
    info!(expense_id = %id, "Expense deleted");
    Ok(())
}

pub fn get_by_id(db: &DbState, id: &str) -> PosResult<Expense> {
    let conn = db.lock()?;
    find(&conn, id)?.ok_or_else(|| PosError::NotFound(format!("pengeluaran {id}")))
}

/// Expenses whose description or category matches `query`, newest first.
/// A `category` of `None` or `"all"` disables the category filter.
pub fn list(db: &DbState, query: &str, category: Option<&str>) -> PosResult<Vec<Expense>> {
    let conn = db.lock()?;
    let category = category
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"));
    let sql = format!(
        "SELECT {EXPENSE_COLUMNS} FROM expenses
         WHERE (description LIKE ?1 OR category LIKE ?1)
           AND (?2 IS NULL OR category = ?2)
         ORDER BY expense_date DESC, created_at DESC"
    );
    let pattern = format!("%{}%", query.trim());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![pattern, category], row_to_expense)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
