//! Customer records.
//!
//! Counters (`transaction_frequency`, `total_spent`) are owned by the ledger;
//! this module only creates, edits and deletes the contact details.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::DbState;
use crate::error::{FieldErrors, PosError, PosResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub transaction_frequency: i64,
    pub total_spent: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "phoneNumber", alias = "phone_number")]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

impl CustomerInput {
    fn validated(&self) -> PosResult<(String, String, String)> {
        let name = self.name.trim();
        let phone = self.phone.trim();
        let address = self.address.trim();

        let mut errors = FieldErrors::new();
        if name.is_empty() {
            errors.add("name", "Nama tidak boleh kosong.");
        }
        if phone.is_empty() {
            errors.add("phone", "Nomor HP wajib diisi.");
        }
        if address.is_empty() {
            errors.add("address", "Alamat wajib diisi.");
        }
        errors.into_result()?;

        Ok((name.to_string(), phone.to_string(), address.to_string()))
    }
}

/// Loyalty tier derived from visit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    Hot,
    Warm,
    Cool,
    Cold,
}

impl CustomerStatus {
    pub fn from_frequency(frequency: i64) -> Self {
        if frequency >= 25 {
            CustomerStatus::Hot
        } else if frequency >= 15 {
            CustomerStatus::Warm
        } else if frequency >= 5 {
            CustomerStatus::Cool
        } else {
            CustomerStatus::Cold
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub hot: i64,
    pub warm: i64,
    pub cool: i64,
    pub cold: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Entry for the POS customer picker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOption {
    pub id: String,
    pub name: String,
    pub transaction_frequency: i64,
}

fn row_to_customer(row: &Row) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        address: row.get(3)?,
        transaction_frequency: row.get(4)?,
        total_spent: row.get(5)?,
    })
}

const CUSTOMER_COLUMNS: &str =
    "id, name, phone, address, transaction_frequency, total_spent";

fn phone_taken(conn: &Connection, phone: &str, except_id: Option<&str>) -> PosResult<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM customers WHERE phone = ?1 AND id != COALESCE(?2, '') LIMIT 1",
            params![phone, except_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn exists(conn: &Connection, id: &str) -> PosResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM customers WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

pub fn create(db: &DbState, input: &CustomerInput) -> PosResult<Customer> {
    let (name, phone, address) = input.validated()?;
    let conn = db.lock()?;

    if phone_taken(&conn, &phone, None)? {
        return Err(PosError::DuplicatePhone);
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO customers (id, name, phone, address, transaction_frequency, total_spent)
         VALUES (?1, ?2, ?3, ?4, 0, 0)",
        params![id, name, phone, address],
    )?;

    info!(customer_id = %id, "Customer created");
    Ok(Customer {
        id,
        name,
        phone,
        address,
        transaction_frequency: 0,
        total_spent: 0.0,
    })
}

pub fn update(db: &DbState, id: &str, input: &CustomerInput) -> PosResult<Customer> {
    let (name, phone, address) = input.validated()?;
    let conn = db.lock()?;

    if phone_taken(&conn, &phone, Some(id))? {
        return Err(PosError::DuplicatePhone);
    }

    let changed = conn.execute(
        "UPDATE customers SET name = ?1, phone = ?2, address = ?3 WHERE id = ?4",
        params![name, phone, address, id],
    )?;
    if changed == 0 {
        return Err(PosError::NotFound(format!("pelanggan {id}")));
    }

    info!(customer_id = %id, "Customer updated");
    find(&conn, id)?.ok_or_else(|| PosError::NotFound(format!("pelanggan {id}")))
}

/// Delete a customer with no transaction history.
pub fn delete(db: &DbState, id: &str) -> PosResult<()> {
    let conn = db.lock()?;

    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE customer_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if count > 0 {
        return Err(PosError::CustomerHasTransactions { count });
    }

    let removed = conn.execute("DELETE FROM customers WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Err(PosError::NotFound(format!("pelanggan {id}")));
    }
    info!(customer_id = %id, "Customer deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

fn find(conn: &Connection, id: &str) -> PosResult<Option<Customer>> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_customer).optional()?)
}

pub fn get_by_id(db: &DbState, id: &str) -> PosResult<Customer> {
    let conn = db.lock()?;
    find(&conn, id)?.ok_or_else(|| PosError::NotFound(format!("pelanggan {id}")))
}

/// Customers matching `query` on name, phone or address (case-insensitive),
/// ordered by visit count.
pub fn list(db: &DbState, order: SortOrder, query: &str) -> PosResult<Vec<Customer>> {
    let conn = db.lock()?;
    let direction = match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    let sql = format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers
         WHERE name LIKE ?1 OR phone LIKE ?1 OR address LIKE ?1
         ORDER BY transaction_frequency {direction}, name ASC"
    );
    let pattern = format!("%{}%", query.trim());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![pattern], row_to_customer)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn options(db: &DbState) -> PosResult<Vec<CustomerOption>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, transaction_frequency FROM customers ORDER BY name ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CustomerOption {
                id: row.get(0)?,
                name: row.get(1)?,
                transaction_frequency: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn status_counts(db: &DbState) -> PosResult<StatusCounts> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare("SELECT transaction_frequency FROM customers")?;
    let mut counts = StatusCounts::default();
    for frequency in stmt.query_map([], |row| row.get::<_, i64>(0))? {
        match CustomerStatus::from_frequency(frequency?) {
            CustomerStatus::Hot => counts.hot += 1,
            CustomerStatus::Warm => counts.warm += 1,
            CustomerStatus::Cool => counts.cool += 1,
            CustomerStatus::Cold => counts.cold += 1,
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_state;

    fn input(name: &str, phone: &str, address: &str) -> CustomerInput {
        CustomerInput {
            name: name.into(),
            phone: phone.into(),
            address: address.into(),
        }
    }

    #[test]
    fn test_create_trims_and_starts_counters_at_zero() {
        let db = test_state();
        let c = create(&db, &input("  Budi ", " 0812 ", " Jl. Mawar 1 ")).unwrap();
        assert_eq!(c.name, "Budi");
        assert_eq!(c.phone, "0812");
        assert_eq!(c.transaction_frequency, 0);
        assert_eq!(c.total_spent, 0.0);
        assert_eq!(get_by_id(&db, &c.id).unwrap(), c);
    }

    #[test]
    fn test_create_reports_every_missing_field() {
        let db = test_state();
        match create(&db, &input(" ", "", "")) {
            Err(PosError::Validation(errors)) => {
                assert!(errors.get("name").is_some());
                assert!(errors.get("phone").is_some());
                assert!(errors.get("address").is_some());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_phone_rejected_on_create_and_update() {
        let db = test_state();
        let a = create(&db, &input("A", "0811", "x")).unwrap();
        let b = create(&db, &input("B", "0822", "y")).unwrap();

        assert!(matches!(
            create(&db, &input("C", "0811", "z")),
            Err(PosError::DuplicatePhone)
        ));
        assert!(matches!(
            update(&db, &b.id, &input("B", "0811", "y")),
            Err(PosError::DuplicatePhone)
        ));
        // Keeping one's own number is fine.
        let same = update(&db, &a.id, &input("A2", "0811", "x2")).unwrap();
        assert_eq!(same.name, "A2");
    }

    #[test]
    fn test_delete_blocked_by_transactions() {
        let db = test_state();
        let c = create(&db, &input("Sari", "0833", "z")).unwrap();
        {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO transactions (id, customer_id, total_amount, created_at)
                 VALUES ('TRX-1', ?1, 10000, '2025-01-01T10:00:00+07:00')",
                params![c.id],
            )
            .unwrap();
        }
        match delete(&db, &c.id) {
            Err(PosError::CustomerHasTransactions { count }) => assert_eq!(count, 1),
            other => panic!("expected block, got {other:?}"),
        }

        let free = create(&db, &input("Tono", "0844", "q")).unwrap();
        delete(&db, &free.id).unwrap();
        assert!(matches!(get_by_id(&db, &free.id), Err(PosError::NotFound(_))));
    }

    #[test]
    fn test_list_search_and_sort() {
        let db = test_state();
        let a = create(&db, &input("Andi", "0801", "Bandung")).unwrap();
        let b = create(&db, &input("Bela", "0802", "Jakarta")).unwrap();
        {
            let conn = db.lock().unwrap();
            conn.execute(
                "UPDATE customers SET transaction_frequency = 7 WHERE id = ?1",
                params![b.id],
            )
            .unwrap();
        }

        let desc = list(&db, SortOrder::Desc, "").unwrap();
        assert_eq!(desc[0].id, b.id);
        let asc = list(&db, SortOrder::Asc, "").unwrap();
        assert_eq!(asc[0].id, a.id);

        let hits = list(&db, SortOrder::Desc, "bandung").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a.id);
    }

    #[test]
    fn test_status_thresholds_and_counts() {
        assert_eq!(CustomerStatus::from_frequency(25), CustomerStatus::Hot);
        assert_eq!(CustomerStatus::from_frequency(24), CustomerStatus::Warm);
        assert_eq!(CustomerStatus::from_frequency(15), CustomerStatus::Warm);
        assert_eq!(CustomerStatus::from_frequency(5), CustomerStatus::Cool);
        assert_eq!(CustomerStatus::from_frequency(4), CustomerStatus::Cold);

        let db = test_state();
        for (i, freq) in [30, 16, 6, 0, 1].iter().enumerate() {
            let c = create(&db, &input("X", &format!("09{i}"), "a")).unwrap();
            let conn = db.lock().unwrap();
            conn.execute(
                "UPDATE customers SET transaction_frequency = ?1 WHERE id = ?2",
                params![freq, c.id],
            )
            .unwrap();
        }
        let counts = status_counts(&db).unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                hot: 1,
                warm: 1,
                cool: 1,
                cold: 2
            }
        );
    }

    #[test]
    fn test_options_ordered_by_name() {
        let db = test_state();
        create(&db, &input("Zaki", "1", "a")).unwrap();
        create(&db, &input("Ayu", "2", "b")).unwrap();
        let opts = options(&db).unwrap();
        let names: Vec<&str> = opts.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Ayu", "Zaki"]);
    }
}
