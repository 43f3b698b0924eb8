//! Inventory ledger: sales and their side effects.
//!
//! A sale moves three sets of counters at once: ingredient stock (through
//! each menu's recipe), `menus.sold_count`, and the attached customer's
//! visit count and spend. Recording, revising and voiding a sale each run
//! inside one `BEGIN IMMEDIATE` scope, so either every counter moves or none
//! does.

use chrono::{DateTime, FixedOffset};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::auth::{self, SessionContext};
use crate::config;
use crate::customers;
use crate::db::{self, DbState};
use crate::error::{FieldErrors, PosError, PosResult};
use crate::time;

/// Float residue below zero that is rounded back to an empty stock instead of
/// rejecting the sale.
const STOCK_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One cart line: a menu, the unit price charged, and a quantity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    #[serde(alias = "id", alias = "menu_id")]
    pub menu_id: String,
    pub price: f64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleInput {
    #[serde(default, alias = "customer_id")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub items: Vec<SaleLine>,
    #[serde(default, alias = "total_amount")]
    pub total_amount: f64,
    #[serde(default)]
    pub ongkir: f64,
    #[serde(default, alias = "discount_percentage")]
    pub discount_percentage: f64,
    #[serde(default, alias = "discount_amount")]
    pub discount_amount: f64,
}

impl SaleInput {
    /// Attached customer, with blank ids meaning a guest sale.
    fn customer(&self) -> Option<&str> {
        self.customer_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    fn validate(&self, discount_max: f64) -> PosResult<()> {
        let mut errors = FieldErrors::new();

        if self.items.is_empty() {
            errors.add("items", "Keranjang belanja kosong.");
        }
        for line in &self.items {
            if line.menu_id.trim().is_empty() {
                errors.add("items", "Menu wajib dipilih.");
            }
            if line.quantity < 1 {
                errors.add("items", "Jumlah minimal 1.");
            }
            if !(line.price.is_finite() && line.price >= 0.0) {
                errors.add("items", "Harga tidak boleh negatif.");
            }
        }

        let non_negative = [
            ("totalAmount", self.total_amount, "Total tidak boleh negatif."),
            ("ongkir", self.ongkir, "Ongkir tidak boleh negatif."),
            (
                "discountAmount",
                self.discount_amount,
                "Potongan tidak boleh negatif.",
            ),
        ];
        for (field, value, message) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                errors.add(field, message);
            }
        }

        let pct = self.discount_percentage;
        if !(pct.is_finite() && pct >= 0.0) {
            errors.add("discountPercentage", "Diskon tidak boleh negatif.");
        } else if pct > discount_max {
            errors.add(
                "discountPercentage",
                format!("Diskon maksimal {discount_max}%."),
            );
        }

        errors.into_result()
    }
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItemDetail {
    pub menu_id: String,
    pub menu_name: String,
    pub quantity: i64,
    pub price: f64,
    pub subtotal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    pub id: String,
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub customer_phone: String,
    pub total_amount: f64,
    pub ongkir: f64,
    pub discount_percentage: f64,
    pub discount_amount: f64,
    pub date: String,
    pub items: Vec<TransactionItemDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub id: String,
    pub total_amount: f64,
    pub date: String,
    pub customer_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCounts {
    pub count: i64,
    pub total_revenue: f64,
}

// ---------------------------------------------------------------------------
// Counter movements
// ---------------------------------------------------------------------------

fn recipe_of(conn: &Connection, menu_id: &str) -> PosResult<Vec<(String, f64)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT stock_id, amount_needed FROM menu_recipes
         WHERE menu_id = ?1 ORDER BY position, id",
    )?;
    let rows = stmt
        .query_map(params![menu_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Bump sold counts and draw ingredients for every line. Fails on the first
/// ingredient that would go negative.
fn apply_lines(conn: &Connection, lines: &[SaleLine]) -> PosResult<()> {
    for line in lines {
        let menu_id = line.menu_id.trim();
        conn.execute(
            "UPDATE menus SET sold_count = sold_count + ?1 WHERE id = ?2",
            params![line.quantity, menu_id],
        )?;

        for (stock_id, amount_needed) in recipe_of(conn, menu_id)? {
            let needed = amount_needed * line.quantity as f64;
            conn.execute(
                "UPDATE stocks SET stock = stock - ?1, updated_at = datetime('now') WHERE id = ?2",
                params![needed, stock_id],
            )?;
            let (remaining, name): (f64, String) = conn.query_row(
                "SELECT stock, name FROM stocks WHERE id = ?1",
                params![stock_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            if remaining < -STOCK_EPSILON {
                warn!(ingredient = %name, remaining, "Insufficient stock");
                return Err(PosError::InsufficientStock { ingredient: name });
            }
            if remaining < 0.0 {
                conn.execute("UPDATE stocks SET stock = 0 WHERE id = ?1", params![stock_id])?;
            }
        }
    }
    Ok(())
}

/// Undo `apply_lines` for lines previously stored on a sale.
fn reverse_lines(conn: &Connection, lines: &[(String, i64)]) -> PosResult<()> {
    for (menu_id, quantity) in lines {
        conn.execute(
            "UPDATE menus SET sold_count = sold_count - ?1 WHERE id = ?2",
            params![quantity, menu_id],
        )?;
        for (stock_id, amount_needed) in recipe_of(conn, menu_id)? {
            conn.execute(
                "UPDATE stocks SET stock = stock + ?1, updated_at = datetime('now') WHERE id = ?2",
                params![amount_needed * *quantity as f64, stock_id],
            )?;
        }
    }
    Ok(())
}

fn credit_customer(conn: &Connection, customer_id: &str, total: f64) -> PosResult<()> {
    conn.execute(
        "UPDATE customers
         SET transaction_frequency = transaction_frequency + 1,
             total_spent = total_spent + ?1
         WHERE id = ?2",
        params![total, customer_id],
    )?;
    Ok(())
}

fn insert_items(conn: &Connection, transaction_id: &str, lines: &[SaleLine]) -> PosResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO transaction_items (transaction_id, menu_id, quantity, price_at_time, subtotal)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for line in lines {
        stmt.execute(params![
            transaction_id,
            line.menu_id.trim(),
            line.quantity,
            line.price,
            line.price * line.quantity as f64
        ])?;
    }
    Ok(())
}

/// Referenced menus must be live and the customer, when given, must exist.
/// Menus already on the sale being revised (`kept`) may have been retired
/// since.
fn check_references(conn: &Connection, input: &SaleInput, kept: &[(String, i64)]) -> PosResult<()> {
    let mut errors = FieldErrors::new();
    for line in &input.items {
        let menu_id = line.menu_id.trim();
        let live: Option<i64> = conn
            .query_row(
                "SELECT is_deleted FROM menus WHERE id = ?1",
                params![menu_id],
                |row| row.get(0),
            )
            .optional()?;
        match live {
            Some(0) => {}
            Some(_) if kept.iter().any(|(id, _)| id == menu_id) => {}
            Some(_) => errors.add("items", format!("Menu '{menu_id}' sudah dihapus.")),
            None => errors.add("items", format!("Menu '{menu_id}' tidak ditemukan.")),
        }
    }
    if let Some(customer_id) = input.customer() {
        if !customers::exists(conn, customer_id)? {
            errors.add("customerId", "Pelanggan tidak ditemukan.");
        }
    }
    errors.into_result()
}

struct StoredSale {
    customer_id: Option<String>,
    total_amount: f64,
    lines: Vec<(String, i64)>,
}

fn load_stored_sale(conn: &Connection, id: &str) -> PosResult<StoredSale> {
    let header: Option<(Option<String>, f64)> = conn
        .query_row(
            "SELECT customer_id, total_amount FROM transactions WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (customer_id, total_amount) =
        header.ok_or_else(|| PosError::NotFound(format!("transaksi {id}")))?;

    let mut stmt = conn.prepare(
        "SELECT menu_id, quantity FROM transaction_items WHERE transaction_id = ?1 ORDER BY id",
    )?;
    let lines = stmt
        .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StoredSale {
        customer_id,
        total_amount,
        lines,
    })
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Record a sale stamped with the current store time. Returns the new id.
pub fn record_sale(
    db: &DbState,
    session: Option<&SessionContext>,
    input: &SaleInput,
) -> PosResult<String> {
    record_sale_at(db, session, input, time::now_store())
}

/// Record a sale with an explicit timestamp (back-dated entry, imports).
pub fn record_sale_at(
    db: &DbState,
    session: Option<&SessionContext>,
    input: &SaleInput,
    at: DateTime<FixedOffset>,
) -> PosResult<String> {
    auth::require_permission(session, auth::RECORD_SALE)?;
    let conn = db.lock()?;
    input.validate(config::discount_max(&conn))?;

    let id = time::generate_id("TRX");
    let created_at = time::to_store_string(at);
    let customer_id = input.customer();

    db::with_transaction(&conn, |tx| {
        check_references(tx, input, &[])?;
        apply_lines(tx, &input.items)?;

        tx.execute(
            "INSERT INTO transactions
                (id, customer_id, total_amount, ongkir, discount_percentage, discount_amount, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                customer_id,
                input.total_amount,
                input.ongkir,
                input.discount_percentage,
                input.discount_amount,
                created_at
            ],
        )?;

        if let Some(customer_id) = customer_id {
            credit_customer(tx, customer_id, input.total_amount)?;
        }
        insert_items(tx, &id, &input.items)?;
        Ok(())
    })
    .map_err(|e| {
        warn!(error = %e, "Sale rejected");
        e
    })?;

    info!(
        transaction_id = %id,
        total = input.total_amount,
        lines = input.items.len(),
        customer = customer_id.unwrap_or("guest"),
        "Sale recorded"
    );
    Ok(id)
}

/// Replace a sale's lines, customer and amounts. Admin only.
///
/// The old sale is fully reversed before the new one is applied, all in one
/// scope; the original timestamp is kept.
pub fn revise_sale(
    db: &DbState,
    session: Option<&SessionContext>,
    id: &str,
    input: &SaleInput,
) -> PosResult<()> {
    auth::require_permission(session, auth::EDIT_TRANSACTION)?;
    let conn = db.lock()?;
    input.validate(config::discount_max(&conn))?;
    let new_customer = input.customer();

    db::with_transaction(&conn, |tx| {
        let old = load_stored_sale(tx, id)?;
        check_references(tx, input, &old.lines)?;

        reverse_lines(tx, &old.lines)?;
        if let Some(old_customer) = old.customer_id.as_deref() {
            tx.execute(
                "UPDATE customers
                 SET transaction_frequency = transaction_frequency - 1,
                     total_spent = total_spent - ?1
                 WHERE id = ?2",
                params![old.total_amount, old_customer],
            )?;
        }

        apply_lines(tx, &input.items)?;

        tx.execute(
            "UPDATE transactions
             SET customer_id = ?1, total_amount = ?2, ongkir = ?3,
                 discount_percentage = ?4, discount_amount = ?5
             WHERE id = ?6",
            params![
                new_customer,
                input.total_amount,
                input.ongkir,
                input.discount_percentage,
                input.discount_amount,
                id
            ],
        )?;
        if let Some(customer_id) = new_customer {
            credit_customer(tx, customer_id, input.total_amount)?;
        }

        tx.execute(
            "DELETE FROM transaction_items WHERE transaction_id = ?1",
            params![id],
        )?;
        insert_items(tx, id, &input.items)?;
        debug!(transaction_id = %id, old_lines = old.lines.len(), "Sale reversed and reapplied");
        Ok(())
    })
    .map_err(|e| {
        warn!(transaction_id = %id, error = %e, "Sale revision rejected");
        e
    })?;

    info!(transaction_id = %id, total = input.total_amount, "Sale revised");
    Ok(())
}

/// Reverse every effect of a sale and delete it. Admin only.
///
/// Customer counters are clamped at zero.
pub fn void_sale(db: &DbState, session: Option<&SessionContext>, id: &str) -> PosResult<()> {
    auth::require_permission(session, auth::DELETE_TRANSACTION)?;
    let conn = db.lock()?;

    db::with_transaction(&conn, |tx| {
        let old = load_stored_sale(tx, id)?;
        reverse_lines(tx, &old.lines)?;

        if let Some(customer_id) = old.customer_id.as_deref() {
            tx.execute(
                "UPDATE customers
                 SET transaction_frequency = MAX(0, transaction_frequency - 1),
                     total_spent = MAX(0, total_spent - ?1)
                 WHERE id = ?2",
                params![old.total_amount, customer_id],
            )?;
        }

        tx.execute(
            "DELETE FROM transaction_items WHERE transaction_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM transactions WHERE id = ?1", params![id])?;
        Ok(())
    })
    .map_err(|e| {
        warn!(transaction_id = %id, error = %e, "Void rejected");
        e
    })?;

    info!(transaction_id = %id, "Sale voided");
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub fn get_transaction(db: &DbState, id: &str) -> PosResult<TransactionDetail> {
    let conn = db.lock()?;
    let detail = conn
        .query_row(
            "SELECT t.id, t.customer_id, COALESCE(c.name, 'Guest'), COALESCE(c.phone, ''),
                    t.total_amount, t.ongkir, t.discount_percentage, t.discount_amount, t.created_at
             FROM transactions t
             LEFT JOIN customers c ON c.id = t.customer_id
             WHERE t.id = ?1",
            params![id],
            |row| {
                Ok(TransactionDetail {
                    id: row.get(0)?,
                    customer_id: row.get(1)?,
                    customer_name: row.get(2)?,
                    customer_phone: row.get(3)?,
                    total_amount: row.get(4)?,
                    ongkir: row.get(5)?,
                    discount_percentage: row.get(6)?,
                    discount_amount: row.get(7)?,
                    date: row.get(8)?,
                    items: Vec::new(),
                })
            },
        )
        .optional()?;
    let mut detail = detail.ok_or_else(|| PosError::NotFound(format!("transaksi {id}")))?;

    let mut stmt = conn.prepare(
        "SELECT ti.menu_id, m.name, ti.quantity, ti.price_at_time, ti.subtotal
         FROM transaction_items ti
         JOIN menus m ON m.id = ti.menu_id
         WHERE ti.transaction_id = ?1
         ORDER BY ti.id",
    )?;
    detail.items = stmt
        .query_map(params![id], |row| {
            Ok(TransactionItemDetail {
                menu_id: row.get(0)?,
                menu_name: row.get(1)?,
                quantity: row.get(2)?,
                price: row.get(3)?,
                subtotal: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(detail)
}

/// Sales whose id or customer name matches `query`, newest first.
pub fn list_transactions(db: &DbState, query: &str) -> PosResult<Vec<TransactionSummary>> {
    let conn = db.lock()?;
    let pattern = format!("%{}%", query.trim());
    let mut stmt = conn.prepare(
        "SELECT t.id, t.total_amount, t.created_at, COALESCE(c.name, 'Umum / Guest')
         FROM transactions t
         LEFT JOIN customers c ON c.id = t.customer_id
         WHERE t.id LIKE ?1 OR c.name LIKE ?1
         ORDER BY datetime(t.created_at) DESC, t.id DESC",
    )?;
    let rows = stmt
        .query_map(params![pattern], |row| {
            Ok(TransactionSummary {
                id: row.get(0)?,
                total_amount: row.get(1)?,
                date: row.get(2)?,
                customer_name: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Count and revenue over all sales. Degrades to zeros on failure.
pub fn transaction_counts(db: &DbState) -> TransactionCounts {
    let result = db.lock().and_then(|conn| {
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(total_amount), 0) FROM transactions",
            [],
            |row| {
                Ok(TransactionCounts {
                    count: row.get(0)?,
                    total_revenue: row.get(1)?,
                })
            },
        )
        .map_err(PosError::from)
    });
    match result {
        Ok(counts) => counts,
        Err(e) => {
            error!("transaction counts failed: {e}");
            TransactionCounts::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customers::{self, CustomerInput};
    use crate::db::test_state;
    use crate::menu::{self, MenuInput, RecipeLineInput};
    use crate::stocks::{self, StockInput};

    struct Fixture {
        db: DbState,
        kopi_id: String,
        susu_id: String,
        latte_id: String,
        americano_id: String,
        customer_id: String,
    }

    fn stock(db: &DbState, name: &str, qty: f64, cost: f64) -> String {
        stocks::create(
            db,
            &StockInput {
                name: name.into(),
                unit: "gram".into(),
                stock: qty,
                min_stock: 10.0,
                cost_per_unit: cost,
            },
        )
        .unwrap()
        .id
    }

    fn menu_with(db: &DbState, name: &str, price: f64, recipe: &[(&str, f64)]) -> String {
        menu::create(
            db,
            &MenuInput {
                name: name.into(),
                description: name.into(),
                price,
                recipes: recipe
                    .iter()
                    .map(|(stock_id, amount)| RecipeLineInput {
                        stock_id: stock_id.to_string(),
                        amount: *amount,
                    })
                    .collect(),
            },
        )
        .unwrap()
        .id
    }

    fn fixture() -> Fixture {
        let db = test_state();
        let kopi_id = stock(&db, "Kopi", 80.0, 10.0);
        let susu_id = stock(&db, "Susu", 1000.0, 2.0);
        let latte_id = menu_with(&db, "Latte", 25000.0, &[(&kopi_id, 20.0), (&susu_id, 150.0)]);
        let americano_id = menu_with(&db, "Americano", 20000.0, &[(&kopi_id, 50.0)]);
        let customer_id = customers::create(
            &db,
            &CustomerInput {
                name: "Dewi".into(),
                phone: "0812".into(),
                address: "Jl. Melati".into(),
            },
        )
        .unwrap()
        .id;
        Fixture {
            db,
            kopi_id,
            susu_id,
            latte_id,
            americano_id,
            customer_id,
        }
    }

    fn sale(customer: Option<&str>, lines: &[(&str, f64, i64)], total: f64) -> SaleInput {
        SaleInput {
            customer_id: customer.map(str::to_string),
            items: lines
                .iter()
                .map(|(menu_id, price, quantity)| SaleLine {
                    menu_id: menu_id.to_string(),
                    price: *price,
                    quantity: *quantity,
                })
                .collect(),
            total_amount: total,
            ..Default::default()
        }
    }

    fn stock_level(db: &DbState, id: &str) -> f64 {
        stocks::get_by_id(db, id).unwrap().stock
    }

    fn sold(db: &DbState, id: &str) -> i64 {
        menu::get_by_id(db, id).unwrap().sold_count
    }

    fn counters(db: &DbState, id: &str) -> (i64, f64) {
        let c = customers::get_by_id(db, id).unwrap();
        (c.transaction_frequency, c.total_spent)
    }

    #[test]
    fn test_record_sale_moves_every_counter() {
        let f = fixture();
        let staff = SessionContext::staff();
        let id = record_sale(
            &f.db,
            Some(&staff),
            &sale(Some(&f.customer_id), &[(&f.latte_id, 25000.0, 2)], 50000.0),
        )
        .unwrap();
        assert!(id.starts_with("TRX-"));

        assert_eq!(stock_level(&f.db, &f.kopi_id), 40.0);
        assert_eq!(stock_level(&f.db, &f.susu_id), 700.0);
        assert_eq!(sold(&f.db, &f.latte_id), 2);
        assert_eq!(counters(&f.db, &f.customer_id), (1, 50000.0));

        let detail = get_transaction(&f.db, &id).unwrap();
        assert_eq!(detail.customer_name, "Dewi");
        assert_eq!(detail.customer_phone, "0812");
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].subtotal, 50000.0);
        assert_eq!(detail.items[0].menu_name, "Latte");
        assert!(detail.date.ends_with("+07:00"));
    }

    #[test]
    fn test_insufficient_stock_aborts_everything() {
        let f = fixture();
        let staff = SessionContext::staff();
        // 2 x 50 g of coffee against 80 g on hand.
        let err = record_sale(
            &f.db,
            Some(&staff),
            &sale(
                Some(&f.customer_id),
                &[(&f.latte_id, 25000.0, 1), (&f.americano_id, 20000.0, 2)],
                65000.0,
            ),
        )
        .unwrap_err();

        match err {
            PosError::InsufficientStock { ingredient } => assert_eq!(ingredient, "Kopi"),
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(stock_level(&f.db, &f.kopi_id), 80.0);
        assert_eq!(stock_level(&f.db, &f.susu_id), 1000.0);
        assert_eq!(sold(&f.db, &f.latte_id), 0);
        assert_eq!(sold(&f.db, &f.americano_id), 0);
        assert_eq!(counters(&f.db, &f.customer_id), (0, 0.0));
        assert_eq!(transaction_counts(&f.db).count, 0);
    }

    #[test]
    fn test_two_americanos_against_80g_are_rejected() {
        let f = fixture();
        let staff = SessionContext::staff();
        // One 50 g recipe line, 2 units, 80 g on hand.
        let err = record_sale(
            &f.db,
            Some(&staff),
            &sale(None, &[(&f.americano_id, 20000.0, 2)], 40000.0),
        )
        .unwrap_err();
        assert!(
            matches!(&err, PosError::InsufficientStock { ingredient } if ingredient == "Kopi"),
            "got {err:?}"
        );
        assert_eq!(stock_level(&f.db, &f.kopi_id), 80.0);
        assert_eq!(sold(&f.db, &f.americano_id), 0);
        assert_eq!(transaction_counts(&f.db).count, 0);
    }

    #[test]
    fn test_float_residue_never_leaves_negative_stock() {
        let db = test_state();
        let gula = stock(&db, "Gula", 1.0, 1.0);
        let teh = menu_with(&db, "Teh Manis", 5000.0, &[(&gula, 1.000_000_000_5)]);
        record_sale(
            &db,
            Some(&SessionContext::staff()),
            &sale(None, &[(&teh, 5000.0, 1)], 5000.0),
        )
        .unwrap();
        let left = stock_level(&db, &gula);
        assert!(left >= 0.0, "stock went negative: {left}");
        assert_eq!(left, 0.0);
    }

    #[test]
    fn test_revise_keeps_lines_of_retired_menus() {
        let f = fixture();
        let admin = SessionContext::admin();
        let id = record_sale(
            &f.db,
            Some(&admin),
            &sale(None, &[(&f.americano_id, 20000.0, 1)], 20000.0),
        )
        .unwrap();
        menu::soft_delete(&f.db, &f.americano_id).unwrap();

        let mut revised = sale(Some(&f.customer_id), &[(&f.americano_id, 20000.0, 1)], 18000.0);
        revised.discount_percentage = 10.0;
        revise_sale(&f.db, Some(&admin), &id, &revised).unwrap();

        let detail = get_transaction(&f.db, &id).unwrap();
        assert_eq!(detail.customer_name, "Dewi");
        assert_eq!(detail.total_amount, 18000.0);
        assert_eq!(stock_level(&f.db, &f.kopi_id), 30.0);
        assert_eq!(counters(&f.db, &f.customer_id), (1, 18000.0));

        // A retired menu that was not on the sale still cannot be added.
        menu::soft_delete(&f.db, &f.latte_id).unwrap();
        let err = revise_sale(
            &f.db,
            Some(&admin),
            &id,
            &sale(
                Some(&f.customer_id),
                &[(&f.americano_id, 20000.0, 1), (&f.latte_id, 25000.0, 1)],
                45000.0,
            ),
        )
        .unwrap_err();
        assert_eq!(err.code(), "validation");
        assert_eq!(get_transaction(&f.db, &id).unwrap().total_amount, 18000.0);
    }

    #[test]
    fn test_record_then_void_restores_state() {
        let f = fixture();
        let staff = SessionContext::staff();
        let admin = SessionContext::admin();
        let id = record_sale(
            &f.db,
            Some(&staff),
            &sale(
                Some(&f.customer_id),
                &[(&f.latte_id, 25000.0, 1), (&f.americano_id, 20000.0, 1)],
                45000.0,
            ),
        )
        .unwrap();
        assert_eq!(stock_level(&f.db, &f.kopi_id), 10.0);

        void_sale(&f.db, Some(&admin), &id).unwrap();

        assert_eq!(stock_level(&f.db, &f.kopi_id), 80.0);
        assert_eq!(stock_level(&f.db, &f.susu_id), 1000.0);
        assert_eq!(sold(&f.db, &f.latte_id), 0);
        assert_eq!(sold(&f.db, &f.americano_id), 0);
        assert_eq!(counters(&f.db, &f.customer_id), (0, 0.0));
        assert!(matches!(
            get_transaction(&f.db, &id),
            Err(PosError::NotFound(_))
        ));
    }

    #[test]
    fn test_void_clamps_drifted_customer_counters() {
        let f = fixture();
        let id = record_sale(
            &f.db,
            Some(&SessionContext::staff()),
            &sale(Some(&f.customer_id), &[(&f.latte_id, 25000.0, 1)], 25000.0),
        )
        .unwrap();
        {
            let conn = f.db.lock().unwrap();
            conn.execute(
                "UPDATE customers SET transaction_frequency = 0, total_spent = 1000 WHERE id = ?1",
                params![f.customer_id],
            )
            .unwrap();
        }
        void_sale(&f.db, Some(&SessionContext::admin()), &id).unwrap();
        assert_eq!(counters(&f.db, &f.customer_id), (0, 0.0));
    }

    #[test]
    fn test_revise_reverses_then_reapplies() {
        let f = fixture();
        let id = record_sale(
            &f.db,
            Some(&SessionContext::staff()),
            &sale(Some(&f.customer_id), &[(&f.americano_id, 20000.0, 1)], 20000.0),
        )
        .unwrap();
        assert_eq!(stock_level(&f.db, &f.kopi_id), 30.0);

        // Swap to a guest sale of two lattes: needs 40 g, which only fits
        // once the americano's 50 g has been returned.
        revise_sale(
            &f.db,
            Some(&SessionContext::admin()),
            &id,
            &sale(None, &[(&f.latte_id, 24000.0, 2)], 48000.0),
        )
        .unwrap();

        assert_eq!(stock_level(&f.db, &f.kopi_id), 40.0);
        assert_eq!(stock_level(&f.db, &f.susu_id), 700.0);
        assert_eq!(sold(&f.db, &f.americano_id), 0);
        assert_eq!(sold(&f.db, &f.latte_id), 2);
        assert_eq!(counters(&f.db, &f.customer_id), (0, 0.0));

        let detail = get_transaction(&f.db, &id).unwrap();
        assert_eq!(detail.customer_id, None);
        assert_eq!(detail.customer_name, "Guest");
        assert_eq!(detail.total_amount, 48000.0);
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].price, 24000.0);
    }

    #[test]
    fn test_failed_revision_leaves_original_intact() {
        let f = fixture();
        let id = record_sale(
            &f.db,
            Some(&SessionContext::staff()),
            &sale(Some(&f.customer_id), &[(&f.latte_id, 25000.0, 1)], 25000.0),
        )
        .unwrap();

        let err = revise_sale(
            &f.db,
            Some(&SessionContext::admin()),
            &id,
            &sale(None, &[(&f.americano_id, 20000.0, 3)], 60000.0),
        )
        .unwrap_err();
        assert!(matches!(err, PosError::InsufficientStock { .. }));

        assert_eq!(stock_level(&f.db, &f.kopi_id), 60.0);
        assert_eq!(sold(&f.db, &f.latte_id), 1);
        assert_eq!(counters(&f.db, &f.customer_id), (1, 25000.0));
        assert_eq!(get_transaction(&f.db, &id).unwrap().items.len(), 1);
    }

    #[test]
    fn test_privileged_operations_require_admin() {
        let f = fixture();
        let staff = SessionContext::staff();
        let id = record_sale(
            &f.db,
            Some(&staff),
            &sale(None, &[(&f.latte_id, 25000.0, 1)], 25000.0),
        )
        .unwrap();

        assert!(matches!(
            void_sale(&f.db, Some(&staff), &id),
            Err(PosError::Forbidden(_))
        ));
        assert!(matches!(
            revise_sale(
                &f.db,
                None,
                &id,
                &sale(None, &[(&f.latte_id, 25000.0, 1)], 25000.0)
            ),
            Err(PosError::Forbidden(_))
        ));
        assert!(matches!(
            void_sale(&f.db, Some(&SessionContext::admin()), "TRX-missing"),
            Err(PosError::NotFound(_))
        ));
    }

    #[test]
    fn test_validation_before_persistence() {
        let f = fixture();
        let staff = SessionContext::staff();

        let empty = sale(None, &[], 0.0);
        assert!(matches!(
            record_sale(&f.db, Some(&staff), &empty),
            Err(PosError::Validation(_))
        ));

        let zero_qty = sale(None, &[(&f.latte_id, 25000.0, 0)], 0.0);
        assert!(matches!(
            record_sale(&f.db, Some(&staff), &zero_qty),
            Err(PosError::Validation(_))
        ));

        let unknown_customer = sale(Some("ghost"), &[(&f.latte_id, 25000.0, 1)], 25000.0);
        match record_sale(&f.db, Some(&staff), &unknown_customer) {
            Err(PosError::Validation(errors)) => assert!(errors.get("customerId").is_some()),
            other => panic!("expected validation error, got {other:?}"),
        }

        menu::soft_delete(&f.db, &f.americano_id).unwrap();
        let deleted_menu = sale(None, &[(&f.americano_id, 20000.0, 1)], 20000.0);
        assert!(matches!(
            record_sale(&f.db, Some(&staff), &deleted_menu),
            Err(PosError::Validation(_))
        ));

        assert_eq!(stock_level(&f.db, &f.kopi_id), 80.0);
        assert_eq!(transaction_counts(&f.db).count, 0);
    }

    #[test]
    fn test_discount_cap_from_settings() {
        let f = fixture();
        {
            let conn = f.db.lock().unwrap();
            config::set_discount_max(&conn, 20.0).unwrap();
        }
        let mut input = sale(None, &[(&f.latte_id, 25000.0, 1)], 20000.0);
        input.discount_percentage = 25.0;
        input.discount_amount = 5000.0;
        match record_sale(&f.db, Some(&SessionContext::staff()), &input) {
            Err(PosError::Validation(errors)) => {
                assert!(errors.get("discountPercentage").is_some())
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        input.discount_percentage = 20.0;
        let id = record_sale(&f.db, Some(&SessionContext::staff()), &input).unwrap();
        let detail = get_transaction(&f.db, &id).unwrap();
        assert_eq!(detail.discount_percentage, 20.0);
        assert_eq!(detail.discount_amount, 5000.0);
    }

    #[test]
    fn test_list_and_counts() {
        use chrono::TimeZone;

        let f = fixture();
        let staff = SessionContext::staff();
        let at = |h: u32| {
            time::store_offset()
                .with_ymd_and_hms(2025, 5, 1, h, 0, 0)
                .single()
                .unwrap()
        };
        let guest = record_sale_at(
            &f.db,
            Some(&staff),
            &sale(None, &[(&f.latte_id, 25000.0, 1)], 25000.0),
            at(9),
        )
        .unwrap();
        let named = record_sale_at(
            &f.db,
            Some(&staff),
            &sale(Some(&f.customer_id), &[(&f.latte_id, 25000.0, 1)], 30000.0),
            at(10),
        )
        .unwrap();

        let all = list_transactions(&f.db, "").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, named);
        assert_eq!(all[1].customer_name, "Umum / Guest");
        assert_eq!(all[1].id, guest);

        let dewi = list_transactions(&f.db, "dew").unwrap();
        assert_eq!(dewi.len(), 1);
        assert_eq!(dewi[0].id, named);

        let counts = transaction_counts(&f.db);
        assert_eq!(counts.count, 2);
        assert_eq!(counts.total_revenue, 55000.0);
    }
}
