//! Weekly home-screen figures: this week against last week.
//!
//! Weeks start on Monday of the store calendar.

use chrono::{DateTime, Duration, FixedOffset};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::db::DbState;
use crate::error::PosResult;
use crate::reports::{self, growth, TopCustomer, TopMenu};
use crate::time;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCards {
    pub revenue: f64,
    pub revenue_growth: f64,
    pub transactions: i64,
    pub tx_growth: f64,
    /// All registered customers, not only this week's.
    pub customers: i64,
    /// Growth of distinct customers served, week over week.
    pub customer_growth: f64,
    pub avg_tx: f64,
    pub avg_growth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayPoint {
    pub name: String,
    pub revenue: f64,
    pub transactions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyDashboard {
    pub cards: DashboardCards,
    pub charts: Vec<DayPoint>,
    pub top_menu: Vec<TopMenu>,
    pub top_customers: Vec<TopCustomer>,
}

impl WeeklyDashboard {
    fn zero() -> Self {
        Self {
            cards: DashboardCards::default(),
            charts: week_chart(&HashMap::new()),
            top_menu: Vec::new(),
            top_customers: Vec::new(),
        }
    }
}

/// Monday-first chart, keyed by `0 = Monday .. 6 = Sunday`.
fn week_chart(days: &HashMap<usize, (f64, i64)>) -> Vec<DayPoint> {
    time::DAY_LABELS
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let (revenue, transactions) = days.get(&i).copied().unwrap_or((0.0, 0));
            DayPoint {
                name: label.to_string(),
                revenue,
                transactions,
            }
        })
        .collect()
}

struct WeekTotals {
    revenue: f64,
    transactions: i64,
    customers: i64,
}

impl WeekTotals {
    fn avg(&self) -> f64 {
        if self.transactions > 0 {
            self.revenue / self.transactions as f64
        } else {
            0.0
        }
    }
}

const IN_RANGE: &str =
    "datetime(t.created_at, '+7 hours') >= ?1 AND datetime(t.created_at, '+7 hours') < ?2";

fn week_totals(conn: &Connection, from: &str, to: &str) -> PosResult<WeekTotals> {
    Ok(conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(t.total_amount), 0), COUNT(t.id), COUNT(DISTINCT t.customer_id)
             FROM transactions t
             WHERE {IN_RANGE}"
        ),
        params![from, to],
        |row| {
            Ok(WeekTotals {
                revenue: row.get(0)?,
                transactions: row.get(1)?,
                customers: row.get(2)?,
            })
        },
    )?)
}

fn daily_points(conn: &Connection, from: &str, to: &str) -> PosResult<Vec<DayPoint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT CAST(strftime('%w', t.created_at, '+7 hours') AS INTEGER) AS dow,
                COALESCE(SUM(t.total_amount), 0), COUNT(t.id)
         FROM transactions t
         WHERE {IN_RANGE}
         GROUP BY dow"
    ))?;
    let days = stmt
        .query_map(params![from, to], |row| {
            let sunday_first: i64 = row.get(0)?;
            Ok((((sunday_first + 6) % 7) as usize, (row.get(1)?, row.get(2)?)))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(week_chart(&days))
}

fn top_customers_by_counters(conn: &Connection) -> PosResult<Vec<TopCustomer>> {
    let mut stmt = conn.prepare(
        "SELECT name, transaction_frequency, total_spent
         FROM customers
         WHERE transaction_frequency > 0
         ORDER BY total_spent DESC, name
         LIMIT 5",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TopCustomer::new(row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Dashboard for the week containing `now`.
pub fn weekly_dashboard(db: &DbState, now: DateTime<FixedOffset>) -> WeeklyDashboard {
    let this_monday = time::week_start(now.date_naive());
    let this_week = time::sql_local_midnight(this_monday);
    let last_week = time::sql_local_midnight(this_monday - Duration::days(7));
    let next_week = time::sql_local_midnight(this_monday + Duration::days(7));

    reports::degrade("weekly_dashboard", db, WeeklyDashboard::zero, |conn| {
        let cur = week_totals(conn, &this_week, &next_week)?;
        let prev = week_totals(conn, &last_week, &this_week)?;
        let registered: i64 =
            conn.query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0))?;
        debug!(week = %this_monday, revenue = cur.revenue, transactions = cur.transactions, "Weekly dashboard loaded");

        Ok(WeeklyDashboard {
            cards: DashboardCards {
                revenue: cur.revenue,
                revenue_growth: growth(cur.revenue, prev.revenue),
                transactions: cur.transactions,
                tx_growth: growth(cur.transactions as f64, prev.transactions as f64),
                customers: registered,
                customer_growth: growth(cur.customers as f64, prev.customers as f64),
                avg_tx: cur.avg(),
                avg_growth: growth(cur.avg(), prev.avg()),
            },
            charts: daily_points(conn, &this_week, &next_week)?,
            top_menu: reports::load_top_menus(conn)?,
            top_customers: top_customers_by_counters(conn)?,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_state;
    use chrono::TimeZone;

    fn exec(db: &DbState, sql: &str) {
        db.lock().unwrap().execute_batch(sql).unwrap();
    }

    fn thursday() -> DateTime<FixedOffset> {
        // Thursday 12 June 2025; the week runs Mon 9 .. Sun 15.
        time::store_offset()
            .with_ymd_and_hms(2025, 6, 12, 15, 0, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn test_week_over_week_cards_and_chart() {
        let db = test_state();
        exec(
            &db,
            "INSERT INTO customers (id, name, phone, transaction_frequency, total_spent) VALUES
                ('a', 'Ani', '1', 3, 90000), ('b', 'Bayu', '2', 1, 120000), ('c', 'Cici', '3', 0, 0);
             INSERT INTO transactions (id, customer_id, total_amount, created_at) VALUES
                ('L1', 'a', 50000, '2025-06-03T10:00:00+07:00'),
                ('W1', 'a', 40000, '2025-06-09T08:00:00+07:00'),
                ('W2', 'b', 20000, '2025-06-09T00:30:00+07:00'),
                ('W3', NULL, 30000, '2025-06-15T23:00:00+07:00'),
                ('N1', NULL, 99999, '2025-06-16T00:10:00+07:00');",
        );

        let d = weekly_dashboard(&db, thursday());
        assert_eq!(d.cards.revenue, 90000.0);
        assert_eq!(d.cards.transactions, 3);
        assert_eq!(d.cards.revenue_growth, 80.0);
        assert_eq!(d.cards.tx_growth, 200.0);
        assert_eq!(d.cards.customers, 3);
        assert_eq!(d.cards.customer_growth, 100.0);
        assert_eq!(d.cards.avg_tx, 30000.0);
        assert_eq!(d.cards.avg_growth, -40.0);

        let names: Vec<&str> = d.charts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Sen", "Sel", "Rab", "Kam", "Jum", "Sab", "Min"]);
        assert_eq!(d.charts[0].revenue, 60000.0);
        assert_eq!(d.charts[0].transactions, 2);
        assert_eq!(d.charts[6].revenue, 30000.0);
        assert_eq!(d.charts[3].transactions, 0);

        let top: Vec<&str> = d.top_customers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(top, vec!["Bayu", "Ani"]);
        assert_eq!(d.top_customers[1].average_per_visit, 30000.0);
    }

    #[test]
    fn test_top_menu_excludes_deleted() {
        let db = test_state();
        exec(
            &db,
            "INSERT INTO menus (id, name, sold_count, is_deleted) VALUES
                ('m1', 'Es Teh', 40, 0), ('m2', 'Kopi Susu', 75, 0), ('m3', 'Lama', 500, 1);",
        );
        let d = weekly_dashboard(&db, thursday());
        let names: Vec<&str> = d.top_menu.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Kopi Susu", "Es Teh"]);
        assert_eq!(d.top_menu[0].sold_count, 75);
        assert_eq!(d.cards, DashboardCards::default());
    }

    #[test]
    fn test_failure_returns_zero_dashboard() {
        let db = test_state();
        exec(&db, "DROP TABLE transaction_items; DROP TABLE transactions;");
        let d = weekly_dashboard(&db, thursday());
        assert_eq!(d.cards, DashboardCards::default());
        assert_eq!(d.charts.len(), 7);
        assert!(d.charts.iter().all(|p| p.revenue == 0.0));
        assert!(d.top_menu.is_empty());
        assert!(d.top_customers.is_empty());
    }
}
