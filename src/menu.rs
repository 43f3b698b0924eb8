//! Menu items and their recipes.
//!
//! `hpp` (cost of goods) is cached on the menu row and recomputed from the
//! current ingredient costs every time the menu is saved.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::db::{self, DbState};
use crate::error::{FieldErrors, PosError, PosResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeLineInput {
    #[serde(alias = "stock_id")]
    pub stock_id: String,
    #[serde(alias = "amountNeeded", alias = "amount_needed")]
    pub amount: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub recipes: Vec<RecipeLineInput>,
}

impl MenuInput {
    fn validate(&self) -> PosResult<()> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.add("name", "Nama menu wajib diisi");
        }
        if self.description.trim().is_empty() {
            errors.add("description", "Deskripsi wajib diisi");
        }
        if !(self.price.is_finite() && self.price >= 0.0) {
            errors.add("price", "Harga tidak boleh negatif");
        }
        for line in &self.recipes {
            if line.stock_id.trim().is_empty() {
                errors.add("recipes", "Bahan baku wajib dipilih");
            }
            if !(line.amount.is_finite() && line.amount > 0.0) {
                errors.add("recipes", "Jumlah bahan harus lebih dari 0");
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeLine {
    pub stock_id: String,
    pub stock_name: String,
    pub unit: String,
    pub amount_needed: f64,
    pub cost_per_unit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub hpp: f64,
    pub sold_count: i64,
    pub is_deleted: bool,
    pub recipes: Vec<RecipeLine>,
}

/// Entry for the POS menu grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuOption {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuCounts {
    pub total_menu: i64,
    pub total_sold: i64,
    pub best_seller: String,
}

impl MenuCounts {
    fn unavailable() -> Self {
        Self {
            total_menu: 0,
            total_sold: 0,
            best_seller: "-".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// HPP
// ---------------------------------------------------------------------------

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Cost of goods for `(amount_needed, cost_per_unit)` pairs, rounded to 2 decimals.
pub fn compute_hpp(lines: &[(f64, f64)]) -> f64 {
    round2(lines.iter().map(|(amount, cost)| amount * cost).sum())
}

/// HPP of a recipe at current ingredient prices. Unknown ingredients cost 0.
fn recipe_hpp(conn: &Connection, recipes: &[RecipeLineInput]) -> PosResult<f64> {
    let mut stmt = conn.prepare("SELECT cost_per_unit FROM stocks WHERE id = ?1")?;
    let mut pairs = Vec::with_capacity(recipes.len());
    for line in recipes {
        let cost: Option<f64> = stmt
            .query_row(params![line.stock_id.trim()], |row| row.get(0))
            .optional()?;
        if let Some(cost) = cost {
            pairs.push((line.amount, cost));
        }
    }
    let hpp = compute_hpp(&pairs);
    debug!(lines = recipes.len(), hpp, "Recipe HPP computed");
    Ok(hpp)
}

fn check_ingredients_exist(conn: &Connection, recipes: &[RecipeLineInput]) -> PosResult<()> {
    let mut errors = FieldErrors::new();
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM stocks WHERE id = ?1")?;
    for line in recipes {
        let found: i64 = stmt.query_row(params![line.stock_id.trim()], |row| row.get(0))?;
        if found == 0 {
            errors.add(
                "recipes",
                format!("Bahan baku '{}' tidak ditemukan", line.stock_id.trim()),
            );
        }
    }
    errors.into_result()
}

fn insert_recipes(conn: &Connection, menu_id: &str, recipes: &[RecipeLineInput]) -> PosResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO menu_recipes (menu_id, stock_id, amount_needed, position)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (position, line) in recipes.iter().enumerate() {
        stmt.execute(params![
            menu_id,
            line.stock_id.trim(),
            line.amount,
            position as i64
        ])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

pub fn create(db: &DbState, input: &MenuInput) -> PosResult<Menu> {
    input.validate()?;
    let conn = db.lock()?;
    let id = Uuid::new_v4().to_string();

    db::with_transaction(&conn, |tx| {
        check_ingredients_exist(tx, &input.recipes)?;
        let hpp = recipe_hpp(tx, &input.recipes)?;
        tx.execute(
            "INSERT INTO menus (id, name, description, price, hpp, sold_count, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
            params![
                id,
                input.name.trim(),
                input.description.trim(),
                input.price,
                hpp
            ],
        )?;
        insert_recipes(tx, &id, &input.recipes)?;
        Ok(())
    })?;

    info!(menu_id = %id, recipes = input.recipes.len(), "Menu created");
    find(&conn, &id)?.ok_or_else(|| PosError::NotFound(format!("menu {id}")))
}

/// Replace header and recipe together, recomputing HPP.
pub fn update(db: &DbState, id: &str, input: &MenuInput) -> PosResult<Menu> {
    input.validate()?;
    let conn = db.lock()?;

    db::with_transaction(&conn, |tx| {
        check_ingredients_exist(tx, &input.recipes)?;
        let hpp = recipe_hpp(tx, &input.recipes)?;
        let changed = tx.execute(
            "UPDATE menus
             SET name = ?1, description = ?2, price = ?3, hpp = ?4, updated_at = datetime('now')
             WHERE id = ?5",
            params![
                input.name.trim(),
                input.description.trim(),
                input.price,
                hpp,
                id
            ],
        )?;
        if changed == 0 {
            return Err(PosError::NotFound(format!("menu {id}")));
        }
        tx.execute("DELETE FROM menu_recipes WHERE menu_id = ?1", params![id])?;
        insert_recipes(tx, id, &input.recipes)?;
        Ok(())
    })?;

    info!(menu_id = %id, recipes = input.recipes.len(), "Menu updated");
    find(&conn, id)?.ok_or_else(|| PosError::NotFound(format!("menu {id}")))
}

/// Soft delete; sales history keeps pointing at the row.
pub fn soft_delete(db: &DbState, id: &str) -> PosResult<()> {
    let conn = db.lock()?;
    let changed = conn.execute(
        "UPDATE menus SET is_deleted = 1, updated_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;
    if changed == 0 {
        return Err(PosError::NotFound(format!("menu {id}")));
    }
    info!(menu_id = %id, "Menu deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

const MENU_COLUMNS: &str = "id, name, description, price, hpp, sold_count, is_deleted";

fn row_to_menu(row: &Row) -> rusqlite::Result<Menu> {
    Ok(Menu {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        hpp: row.get(4)?,
        sold_count: row.get(5)?,
        is_deleted: row.get::<_, i64>(6)? != 0,
        recipes: Vec::new(),
    })
}

fn row_to_recipe(row: &Row) -> rusqlite::Result<RecipeLine> {
    Ok(RecipeLine {
        stock_id: row.get(1)?,
        stock_name: row.get(2)?,
        unit: row.get(3)?,
        amount_needed: row.get(4)?,
        cost_per_unit: row.get(5)?,
    })
}

const RECIPE_SELECT: &str = "SELECT mr.menu_id, s.id, s.name, s.unit, mr.amount_needed, s.cost_per_unit
     FROM menu_recipes mr
     JOIN stocks s ON s.id = mr.stock_id";

fn recipes_for(conn: &Connection, menu_id: &str) -> PosResult<Vec<RecipeLine>> {
    let sql = format!("{RECIPE_SELECT} WHERE mr.menu_id = ?1 ORDER BY mr.position, mr.id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![menu_id], row_to_recipe)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn find(conn: &Connection, id: &str) -> PosResult<Option<Menu>> {
    let sql = format!("SELECT {MENU_COLUMNS} FROM menus WHERE id = ?1");
    let menu = conn.query_row(&sql, params![id], row_to_menu).optional()?;
    match menu {
        Some(mut menu) => {
            menu.recipes = recipes_for(conn, id)?;
            Ok(Some(menu))
        }
        None => Ok(None),
    }
}

pub fn get_by_id(db: &DbState, id: &str) -> PosResult<Menu> {
    let conn = db.lock()?;
    find(&conn, id)?.ok_or_else(|| PosError::NotFound(format!("menu {id}")))
}

/// Active menus matching `query` on name or description, best sellers first.
pub fn list(db: &DbState, query: &str) -> PosResult<Vec<Menu>> {
    let conn = db.lock()?;
    let pattern = format!("%{}%", query.trim());
    let sql = format!(
        "SELECT {MENU_COLUMNS} FROM menus
         WHERE is_deleted = 0 AND (name LIKE ?1 OR description LIKE ?1)
         ORDER BY sold_count DESC, name ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut menus = stmt
        .query_map(params![pattern], row_to_menu)?
        .collect::<Result<Vec<_>, _>>()?;

    let sql = format!(
        "{RECIPE_SELECT}
         JOIN menus m ON m.id = mr.menu_id
         WHERE m.is_deleted = 0
         ORDER BY mr.menu_id, mr.position, mr.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut by_menu: HashMap<String, Vec<RecipeLine>> = HashMap::new();
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row_to_recipe(row)?)))?;
    for row in rows {
        let (menu_id, line) = row?;
        by_menu.entry(menu_id).or_default().push(line);
    }
    for menu in &mut menus {
        menu.recipes = by_menu.remove(&menu.id).unwrap_or_default();
    }
    Ok(menus)
}

pub fn pos_options(db: &DbState) -> PosResult<Vec<MenuOption>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, price, description FROM menus WHERE is_deleted = 0 ORDER BY name ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MenuOption {
                id: row.get(0)?,
                name: row.get(1)?,
                price: row.get(2)?,
                description: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Menu card figures. Degrades to zeros and a `-` best seller on failure.
pub fn counts(db: &DbState) -> MenuCounts {
    match try_counts(db) {
        Ok(counts) => counts,
        Err(e) => {
            error!("menu counts failed: {e}");
            MenuCounts::unavailable()
        }
    }
}

fn try_counts(db: &DbState) -> PosResult<MenuCounts> {
    let conn = db.lock()?;
    let (total_menu, total_sold): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(sold_count), 0) FROM menus WHERE is_deleted = 0",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let top: Option<(String, i64)> = conn
        .query_row(
            "SELECT name, sold_count FROM menus WHERE is_deleted = 0
             ORDER BY sold_count DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let best_seller = match top {
        Some((name, sold)) if sold > 0 => name,
        _ => "Tidak ada".to_string(),
    };
    Ok(MenuCounts {
        total_menu,
        total_sold,
        best_seller,
    })
}
