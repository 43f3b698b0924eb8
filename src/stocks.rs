//! Ingredient inventory.
//!
//! Manual edits go through here; sale-driven deductions and restorations
//! belong to the ledger.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::db::DbState;
use crate::error::{FieldErrors, PosError, PosResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockUnit {
    Gram,
    Ml,
    Pcs,
    Lembar,
}

impl StockUnit {
    pub const ALL: [StockUnit; 4] = [
        StockUnit::Gram,
        StockUnit::Ml,
        StockUnit::Pcs,
        StockUnit::Lembar,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gram" => Some(StockUnit::Gram),
            "ml" => Some(StockUnit::Ml),
            "pcs" => Some(StockUnit::Pcs),
            "lembar" => Some(StockUnit::Lembar),
            _ => None,
        }
    }

    /// `gram, ml, pcs, lembar`, for validation messages.
    pub fn choices() -> String {
        Self::ALL.map(Self::as_str).join(", ")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StockUnit::Gram => "gram",
            StockUnit::Ml => "ml",
            StockUnit::Pcs => "pcs",
            StockUnit::Lembar => "lembar",
        }
    }
}

/// Reorder status relative to `min_stock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Aman,
    Rendah,
    Kritis,
}

impl StockStatus {
    /// `kritis` below half the minimum, `rendah` from half up to the minimum
    /// inclusive, `aman` above it.
    pub fn classify(stock: f64, min_stock: f64) -> Self {
        if stock < min_stock * 0.5 {
            StockStatus::Kritis
        } else if stock <= min_stock {
            StockStatus::Rendah
        } else {
            StockStatus::Aman
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "aman" => Some(StockStatus::Aman),
            "rendah" => Some(StockStatus::Rendah),
            "kritis" => Some(StockStatus::Kritis),
            _ => None,
        }
    }

    fn sql_filter(self) -> &'static str {
        match self {
            StockStatus::Kritis => "AND stock < (min_stock * 0.5)",
            StockStatus::Rendah => "AND stock >= (min_stock * 0.5) AND stock <= min_stock",
            StockStatus::Aman => "AND stock > min_stock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub id: String,
    pub name: String,
    pub unit: StockUnit,
    pub stock: f64,
    pub min_stock: f64,
    pub cost_per_unit: f64,
    pub status: StockStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub stock: f64,
    #[serde(default, alias = "min_stock")]
    pub min_stock: f64,
    #[serde(default, alias = "cost_per_unit")]
    pub cost_per_unit: f64,
}

impl StockInput {
    fn validated(&self) -> PosResult<(String, StockUnit)> {
        let mut errors = FieldErrors::new();
        let name = self.name.trim();
        if name.is_empty() {
            errors.add("name", "Nama tidak boleh kosong.");
        }
        let unit = StockUnit::parse(&self.unit);
        if unit.is_none() {
            errors.add(
                "unit",
                format!("Satuan harus salah satu dari: {}.", StockUnit::choices()),
            );
        }
        if !(self.stock.is_finite() && self.stock >= 0.0) {
            errors.add("stock", "Stok tidak boleh negatif.");
        }
        if !(self.min_stock.is_finite() && self.min_stock >= 0.0) {
            errors.add("minStock", "Stok minimum tidak boleh negatif.");
        }
        if !(self.cost_per_unit.is_finite() && self.cost_per_unit >= 0.0) {
            errors.add("costPerUnit", "Harga per unit tidak boleh negatif.");
        }
        errors.into_result()?;

        match unit {
            Some(unit) => Ok((name.to_string(), unit)),
            None => Err(PosError::field("unit", "Satuan tidak valid.")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCounts {
    pub total_item: i64,
    pub kritis: i64,
    pub rendah: i64,
    pub aman: i64,
}

/// Compact row for the recipe editor's ingredient picker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockPick {
    pub id: String,
    pub name: String,
    pub unit: StockUnit,
    pub stock: f64,
}

const STOCK_COLUMNS: &str = "id, name, unit, stock, min_stock, cost_per_unit";

fn unit_from_row(row: &Row, idx: usize) -> rusqlite::Result<StockUnit> {
    let raw: String = row.get(idx)?;
    StockUnit::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown stock unit '{raw}'").into(),
        )
    })
}

fn row_to_stock(row: &Row) -> rusqlite::Result<Stock> {
    let stock: f64 = row.get(3)?;
    let min_stock: f64 = row.get(4)?;
    Ok(Stock {
        id: row.get(0)?,
        name: row.get(1)?,
        unit: unit_from_row(row, 2)?,
        stock,
        min_stock,
        cost_per_unit: row.get(5)?,
        status: StockStatus::classify(stock, min_stock),
    })
}

fn find(conn: &Connection, id: &str) -> PosResult<Option<Stock>> {
    let sql = format!("SELECT {STOCK_COLUMNS} FROM stocks WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_stock).optional()?)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

pub fn create(db: &DbState, input: &StockInput) -> PosResult<Stock> {
    let (name, unit) = input.validated()?;
    let conn = db.lock()?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO stocks (id, name, unit, stock, min_stock, cost_per_unit)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            name,
            unit.as_str(),
            input.stock,
            input.min_stock,
            input.cost_per_unit
        ],
    )?;
    info!(stock_id = %id, name = %name, "Stock created");
    find(&conn, &id)?.ok_or_else(|| PosError::NotFound(format!("stok {id}")))
}

/// Manual edit. Menu HPP values are not recomputed here; they refresh on the
/// next menu save.
pub fn update(db: &DbState, id: &str, input: &StockInput) -> PosResult<Stock> {
    let (name, unit) = input.validated()?;
    let conn = db.lock()?;
    let changed = conn.execute(
        "UPDATE stocks
         SET name = ?1, unit = ?2, stock = ?3, min_stock = ?4, cost_per_unit = ?5,
             updated_at = datetime('now')
         WHERE id = ?6",
        params![
            name,
            unit.as_str(),
            input.stock,
            input.min_stock,
            input.cost_per_unit,
            id
        ],
    )?;
    if changed == 0 {
        return Err(PosError::NotFound(format!("stok {id}")));
    }
    info!(stock_id = %id, "Stock updated");
    find(&conn, id)?.ok_or_else(|| PosError::NotFound(format!("stok {id}")))
}

/// Delete an ingredient no recipe refers to.
pub fn delete(db: &DbState, id: &str) -> PosResult<()> {
    let conn = db.lock()?;
    let menus: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT menu_id) FROM menu_recipes WHERE stock_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if menus > 0 {
        return Err(PosError::StockInUse { menus });
    }
    let removed = conn.execute("DELETE FROM stocks WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Err(PosError::NotFound(format!("stok {id}")));
    }
    info!(stock_id = %id, "Stock deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub fn get_by_id(db: &DbState, id: &str) -> PosResult<Stock> {
    let conn = db.lock()?;
    find(&conn, id)?.ok_or_else(|| PosError::NotFound(format!("stok {id}")))
}

pub fn list(db: &DbState, query: &str, status: Option<StockStatus>) -> PosResult<Vec<Stock>> {
    let conn = db.lock()?;
    let status_filter = status.map(StockStatus::sql_filter).unwrap_or("");
    let sql = format!(
        "SELECT {STOCK_COLUMNS} FROM stocks
         WHERE name LIKE ?1 {status_filter}
         ORDER BY name ASC"
    );
    let pattern = format!("%{}%", query.trim());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![pattern], row_to_stock)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Total and per-status counts. Degrades to zeros on failure.
pub fn counts(db: &DbState) -> StockCounts {
    match try_counts(db) {
        Ok(counts) => counts,
        Err(e) => {
            error!("stock counts failed: {e}");
            StockCounts::default()
        }
    }
}

fn try_counts(db: &DbState) -> PosResult<StockCounts> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare("SELECT stock, min_stock FROM stocks")?;
    let mut counts = StockCounts::default();
    for pair in stmt.query_map([], |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)))? {
        let (stock, min_stock) = pair?;
        counts.total_item += 1;
        match StockStatus::classify(stock, min_stock) {
            StockStatus::Kritis => counts.kritis += 1,
            StockStatus::Rendah => counts.rendah += 1,
            StockStatus::Aman => counts.aman += 1,
        }
    }
    Ok(counts)
}

pub fn picker(db: &DbState) -> PosResult<Vec<StockPick>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare("SELECT id, name, unit, stock FROM stocks ORDER BY name ASC")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StockPick {
                id: row.get(0)?,
                name: row.get(1)?,
                unit: unit_from_row(row, 2)?,
                stock: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
