//! Financial aggregator: yearly reports over sales, recipes and expenses.
//!
//! Everything here is read-only. Each report takes the connection lock for
//! its own queries and, if anything fails, logs the error and returns a
//! zero-valued record of the same shape: monthly series are always 12
//! entries (Jan..Des), hourly series always 24 (00:00..23:00).
//!
//! Months, days and hours are store-local: stored `+07:00` timestamps are
//! shifted with `'+7 hours'` before `strftime` buckets them.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error};

use crate::db::DbState;
use crate::error::{PosError, PosResult};
use crate::stocks::StockStatus;
use crate::time;

const TX_YEAR: &str = "CAST(strftime('%Y', t.created_at, '+7 hours') AS INTEGER)";
const TX_MONTH: &str = "CAST(strftime('%m', t.created_at, '+7 hours') AS INTEGER)";
const TX_HOUR: &str = "CAST(strftime('%H', t.created_at, '+7 hours') AS INTEGER)";
const TX_LOCAL: &str = "datetime(t.created_at, '+7 hours')";
const EXP_YEAR: &str = "CAST(strftime('%Y', e.expense_date) AS INTEGER)";
const EXP_MONTH: &str = "CAST(strftime('%m', e.expense_date) AS INTEGER)";

/// Percentage change from `previous` to `current`. A zero baseline counts as
/// 100% growth when there is anything now, 0% otherwise.
pub fn growth(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous * 100.0
    }
}

fn margin(part: f64, revenue: f64) -> f64 {
    if revenue > 0.0 {
        part / revenue * 100.0
    } else {
        0.0
    }
}

fn average(total: f64, count: i64) -> f64 {
    if count > 0 {
        total / count as f64
    } else {
        0.0
    }
}

/// The year before `year`; out-of-range years fail so reports fall back.
fn previous_year(year: i32) -> PosResult<i32> {
    year.checked_sub(1)
        .ok_or_else(|| PosError::field("year", format!("Tahun {year} di luar jangkauan.")))
}

/// Run `body` under the connection lock, falling back on any failure.
pub(crate) fn degrade<T>(
    report: &str,
    db: &DbState,
    fallback: impl FnOnce() -> T,
    body: impl FnOnce(&Connection) -> PosResult<T>,
) -> T {
    match db.lock().and_then(|conn| body(&*conn)) {
        Ok(value) => value,
        Err(e) => {
            error!(report, "report query failed: {e}");
            fallback()
        }
    }
}

/// One entry per month, Jan..Des, looking up each month in `rows`.
fn twelve_months<R, T>(rows: &HashMap<u32, R>, build: impl Fn(String, Option<&R>) -> T) -> Vec<T> {
    (1..=12)
        .map(|month| build(time::month_label(month).to_string(), rows.get(&month)))
        .collect()
}

fn month_totals(conn: &Connection, sql: &str, year: i32) -> PosResult<HashMap<u32, f64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![year], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<HashMap<u32, f64>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Monthly series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    pub name: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCount {
    pub name: String,
    pub count: i64,
}

fn zero_totals() -> Vec<MonthlyTotal> {
    twelve_months(&HashMap::<u32, f64>::new(), |name, _| MonthlyTotal { name, total: 0.0 })
}

fn tx_revenue_by_month(conn: &Connection, year: i32) -> PosResult<HashMap<u32, f64>> {
    month_totals(
        conn,
        &format!(
            "SELECT {TX_MONTH} AS month, COALESCE(SUM(t.total_amount), 0)
             FROM transactions t
             WHERE {TX_YEAR} = ?1
             GROUP BY month"
        ),
        year,
    )
}

fn expense_by_month(conn: &Connection, year: i32) -> PosResult<HashMap<u32, f64>> {
    month_totals(
        conn,
        &format!(
            "SELECT {EXP_MONTH} AS month, COALESCE(SUM(e.amount), 0)
             FROM expenses e
             WHERE {EXP_YEAR} = ?1
             GROUP BY month"
        ),
        year,
    )
}

fn hpp_by_month(conn: &Connection, year: i32) -> PosResult<HashMap<u32, f64>> {
    month_totals(
        conn,
        &format!(
            "SELECT {TX_MONTH} AS month, COALESCE(SUM(ti.quantity * COALESCE(m.hpp, 0)), 0)
             FROM transaction_items ti
             JOIN transactions t ON t.id = ti.transaction_id
             JOIN menus m ON m.id = ti.menu_id
             WHERE {TX_YEAR} = ?1
             GROUP BY month"
        ),
        year,
    )
}

/// Revenue per month.
pub fn revenue_chart(db: &DbState, year: i32) -> Vec<MonthlyTotal> {
    degrade("revenue_chart", db, zero_totals, |conn| {
        let rows = tx_revenue_by_month(conn, year)?;
        Ok(twelve_months(&rows, |name, total| MonthlyTotal {
            name,
            total: total.copied().unwrap_or(0.0),
        }))
    })
}

/// Number of sales per month.
pub fn transaction_trend(db: &DbState, year: i32) -> Vec<MonthlyCount> {
    let zero = || {
        twelve_months(&HashMap::<u32, i64>::new(), |name, _| MonthlyCount { name, count: 0 })
    };
    degrade("transaction_trend", db, zero, |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_MONTH} AS month, COUNT(t.id)
             FROM transactions t
             WHERE {TX_YEAR} = ?1
             GROUP BY month"
        ))?;
        let rows = stmt
            .query_map(params![year], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<HashMap<u32, i64>, _>>()?;
        Ok(twelve_months(&rows, |name, count| MonthlyCount {
            name,
            count: count.copied().unwrap_or(0),
        }))
    })
}

/// Expense total per month.
pub fn monthly_expense(db: &DbState, year: i32) -> Vec<MonthlyTotal> {
    degrade("monthly_expense", db, zero_totals, |conn| {
        let rows = expense_by_month(conn, year)?;
        Ok(twelve_months(&rows, |name, total| MonthlyTotal {
            name,
            total: total.copied().unwrap_or(0.0),
        }))
    })
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_revenue: f64,
    pub revenue_growth: f64,
    pub total_transactions: i64,
    pub transaction_growth: f64,
    pub total_customers: i64,
    pub customer_growth: f64,
    pub avg_transaction: f64,
    pub avg_growth: f64,
    pub gross_profit: f64,
    pub gross_profit_growth: f64,
    pub profit_margin: f64,
    pub total_expense: f64,
    pub expense_growth: f64,
    pub net_income: f64,
    pub net_income_growth: f64,
    pub net_margin: f64,
    /// Same as `gross_profit`; kept for older dashboards.
    pub net_profit: f64,
    /// Same as `gross_profit_growth`.
    pub profit_growth: f64,
}

#[derive(Debug, Default)]
struct YearTotals {
    revenue: f64,
    transactions: i64,
    customers: i64,
    hpp: f64,
    expense: f64,
}

impl YearTotals {
    fn load(conn: &Connection, year: i32) -> PosResult<Self> {
        let (revenue, transactions, customers) = conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(t.total_amount), 0), COUNT(t.id), COUNT(DISTINCT t.customer_id)
                 FROM transactions t
                 WHERE {TX_YEAR} = ?1"
            ),
            params![year],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let hpp = conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(ti.quantity * COALESCE(m.hpp, 0)), 0)
                 FROM transaction_items ti
                 JOIN transactions t ON t.id = ti.transaction_id
                 JOIN menus m ON m.id = ti.menu_id
                 WHERE {TX_YEAR} = ?1"
            ),
            params![year],
            |row| row.get(0),
        )?;
        let expense = conn.query_row(
            &format!("SELECT COALESCE(SUM(e.amount), 0) FROM expenses e WHERE {EXP_YEAR} = ?1"),
            params![year],
            |row| row.get(0),
        )?;
        Ok(Self {
            revenue,
            transactions,
            customers,
            hpp,
            expense,
        })
    }

    fn gross_profit(&self) -> f64 {
        self.revenue - self.hpp
    }

    fn net_income(&self) -> f64 {
        self.revenue - self.hpp - self.expense
    }

    fn avg_transaction(&self) -> f64 {
        average(self.revenue, self.transactions)
    }
}

/// Year `year` against `year - 1`.
pub fn report_summary(db: &DbState, year: i32) -> ReportSummary {
    degrade("report_summary", db, ReportSummary::default, |conn| {
        let cur = YearTotals::load(conn, year)?;
        let prev = YearTotals::load(conn, previous_year(year)?)?;
        debug!(year, revenue = cur.revenue, transactions = cur.transactions, "Report summary loaded");

        let gross_profit = cur.gross_profit();
        let gross_profit_growth = growth(gross_profit, prev.gross_profit());
        let net_income = cur.net_income();

        Ok(ReportSummary {
            total_revenue: cur.revenue,
            revenue_growth: growth(cur.revenue, prev.revenue),
            total_transactions: cur.transactions,
            transaction_growth: growth(cur.transactions as f64, prev.transactions as f64),
            total_customers: cur.customers,
            customer_growth: growth(cur.customers as f64, prev.customers as f64),
            avg_transaction: cur.avg_transaction(),
            avg_growth: growth(cur.avg_transaction(), prev.avg_transaction()),
            gross_profit,
            gross_profit_growth,
            profit_margin: margin(gross_profit, cur.revenue),
            total_expense: cur.expense,
            expense_growth: growth(cur.expense, prev.expense),
            net_income,
            net_income_growth: growth(net_income, prev.net_income()),
            net_margin: margin(net_income, cur.revenue),
            net_profit: gross_profit,
            profit_growth: gross_profit_growth,
        })
    })
}

// ---------------------------------------------------------------------------
// Profit and cash flow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyProfit {
    pub name: String,
    pub revenue: f64,
    pub hpp: f64,
    pub profit: f64,
    pub margin: f64,
    pub transactions: i64,
}

fn profit_entry(name: String, revenue: f64, hpp: f64, transactions: i64) -> MonthlyProfit {
    let profit = revenue - hpp;
    MonthlyProfit {
        name,
        revenue,
        hpp,
        profit,
        margin: margin(profit, revenue),
        transactions,
    }
}

/// Revenue against cost of goods per month. HPP is summed per sale with a
/// correlated lookup of each line's current menu HPP.
pub fn monthly_profit(db: &DbState, year: i32) -> Vec<MonthlyProfit> {
    let zero = || {
        twelve_months(&HashMap::<u32, ()>::new(), |name, _| {
            profit_entry(name, 0.0, 0.0, 0)
        })
    };
    degrade("monthly_profit", db, zero, |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_MONTH} AS month,
                    COALESCE(SUM(t.total_amount), 0),
                    COALESCE(SUM(
                        (SELECT SUM(ti2.quantity * COALESCE(m2.hpp, 0))
                         FROM transaction_items ti2
                         JOIN menus m2 ON m2.id = ti2.menu_id
                         WHERE ti2.transaction_id = t.id)
                    ), 0),
                    COUNT(DISTINCT t.id)
             FROM transactions t
             WHERE {TX_YEAR} = ?1
             GROUP BY month"
        ))?;
        let rows = stmt
            .query_map(params![year], |row| {
                Ok((row.get::<_, u32>(0)?, (row.get(1)?, row.get(2)?, row.get(3)?)))
            })?
            .collect::<Result<HashMap<u32, (f64, f64, i64)>, _>>()?;
        Ok(twelve_months(&rows, |name, row| {
            let (revenue, hpp, transactions) = row.copied().unwrap_or((0.0, 0.0, 0));
            profit_entry(name, revenue, hpp, transactions)
        }))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowMonth {
    pub name: String,
    pub revenue: f64,
    pub expense: f64,
    pub hpp: f64,
    pub net_income: f64,
}

/// Revenue, expense and cost of goods per month.
pub fn cash_flow(db: &DbState, year: i32) -> Vec<CashFlowMonth> {
    let build = |revenue: &HashMap<u32, f64>, expense: &HashMap<u32, f64>, hpp: &HashMap<u32, f64>| {
        (1..=12u32)
            .map(|month| {
                let revenue = revenue.get(&month).copied().unwrap_or(0.0);
                let expense = expense.get(&month).copied().unwrap_or(0.0);
                let hpp = hpp.get(&month).copied().unwrap_or(0.0);
                CashFlowMonth {
                    name: time::month_label(month).to_string(),
                    revenue,
                    expense,
                    hpp,
                    net_income: revenue - hpp - expense,
                }
            })
            .collect::<Vec<_>>()
    };
    let empty = HashMap::new();
    degrade(
        "cash_flow",
        db,
        || build(&empty, &empty, &empty),
        |conn| {
            let revenue = tx_revenue_by_month(conn, year)?;
            let expense = expense_by_month(conn, year)?;
            let hpp = hpp_by_month(conn, year)?;
            Ok(build(&revenue, &expense, &hpp))
        },
    )
}

// ---------------------------------------------------------------------------
// Menus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuPerformance {
    pub name: String,
    pub sold: i64,
    pub revenue: f64,
    pub hpp: f64,
    pub profit: f64,
    pub margin: f64,
    pub avg_price: f64,
}

/// Live menus sold during `year`, best sellers first.
pub fn menu_analysis(db: &DbState, year: i32) -> Vec<MenuPerformance> {
    degrade("menu_analysis", db, Vec::new, |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT m.name,
                    SUM(ti.quantity) AS total_sold,
                    COALESCE(SUM(ti.subtotal), 0),
                    COALESCE(SUM(ti.quantity * COALESCE(m.hpp, 0)), 0),
                    COALESCE(AVG(ti.price_at_time), 0)
             FROM transaction_items ti
             JOIN menus m ON m.id = ti.menu_id
             JOIN transactions t ON t.id = ti.transaction_id
             WHERE {TX_YEAR} = ?1 AND m.is_deleted = 0
             GROUP BY m.id, m.name
             HAVING SUM(ti.quantity) > 0
             ORDER BY total_sold DESC, m.name"
        ))?;
        let rows = stmt
            .query_map(params![year], |row| {
                let revenue: f64 = row.get(2)?;
                let hpp: f64 = row.get(3)?;
                let profit = revenue - hpp;
                Ok(MenuPerformance {
                    name: row.get(0)?,
                    sold: row.get(1)?,
                    revenue,
                    hpp,
                    profit,
                    margin: margin(profit, revenue),
                    avg_price: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Grouping used by [`top_selling_by_period`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SellingPeriod {
    /// Store-local date, `YYYY-MM-DD`.
    Daily,
    /// Monday of the store-local week, `YYYY-MM-DD`.
    Weekly,
    /// Month number, `01`..`12`.
    #[default]
    Monthly,
}

impl SellingPeriod {
    /// Unknown values fall back to monthly.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => SellingPeriod::Daily,
            "weekly" => SellingPeriod::Weekly,
            _ => SellingPeriod::Monthly,
        }
    }

    fn sql_bucket(self) -> &'static str {
        match self {
            SellingPeriod::Daily => "date(t.created_at, '+7 hours')",
            SellingPeriod::Weekly => "date(t.created_at, '+7 hours', 'weekday 0', '-6 days')",
            SellingPeriod::Monthly => "strftime('%m', t.created_at, '+7 hours')",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSellingRow {
    pub period: String,
    pub menu_name: String,
    pub total_sold: i64,
    pub revenue: f64,
}

/// Units and revenue per menu within each period bucket, busiest first.
pub fn top_selling_by_period(db: &DbState, year: i32, period: SellingPeriod) -> Vec<TopSellingRow> {
    degrade("top_selling_by_period", db, Vec::new, |conn| {
        let bucket = period.sql_bucket();
        let mut stmt = conn.prepare(&format!(
            "SELECT {bucket} AS period, m.name,
                    SUM(ti.quantity) AS total_sold,
                    COALESCE(SUM(ti.subtotal), 0)
             FROM transaction_items ti
             JOIN menus m ON m.id = ti.menu_id
             JOIN transactions t ON t.id = ti.transaction_id
             WHERE {TX_YEAR} = ?1
             GROUP BY period, m.name
             ORDER BY period, total_sold DESC, m.name"
        ))?;
        let rows = stmt
            .query_map(params![year], |row| {
                Ok(TopSellingRow {
                    period: row.get(0)?,
                    menu_name: row.get(1)?,
                    total_sold: row.get(2)?,
                    revenue: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopMenu {
    pub name: String,
    pub sold_count: i64,
}

pub(crate) fn load_top_menus(conn: &Connection) -> PosResult<Vec<TopMenu>> {
    let mut stmt = conn.prepare(
        "SELECT name, sold_count FROM menus
         WHERE is_deleted = 0
         ORDER BY sold_count DESC, name
         LIMIT 5",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TopMenu {
                name: row.get(0)?,
                sold_count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Five best-selling live menus by lifetime count.
pub fn top_menus(db: &DbState) -> Vec<TopMenu> {
    degrade("top_menus", db, Vec::new, load_top_menus)
}

// ---------------------------------------------------------------------------
// Time of day
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakHour {
    pub hour: String,
    pub transactions: i64,
    pub revenue: f64,
}

fn twenty_four_hours(rows: &HashMap<u32, (i64, f64)>) -> Vec<PeakHour> {
    (0..24u32)
        .map(|hour| {
            let (transactions, revenue) = rows.get(&hour).copied().unwrap_or((0, 0.0));
            PeakHour {
                hour: format!("{hour:02}:00"),
                transactions,
                revenue,
            }
        })
        .collect()
}

/// Sales per store-local hour, optionally limited to one month.
pub fn peak_hours(db: &DbState, year: i32, month: Option<u32>) -> Vec<PeakHour> {
    degrade(
        "peak_hours",
        db,
        || twenty_four_hours(&HashMap::new()),
        |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TX_HOUR} AS hour, COUNT(t.id), COALESCE(SUM(t.total_amount), 0)
                 FROM transactions t
                 WHERE {TX_YEAR} = ?1 AND (?2 IS NULL OR {TX_MONTH} = ?2)
                 GROUP BY hour"
            ))?;
            let rows = stmt
                .query_map(params![year, month], |row| {
                    Ok((row.get::<_, u32>(0)?, (row.get(1)?, row.get(2)?)))
                })?
                .collect::<Result<HashMap<_, _>, _>>()?;
            Ok(twenty_four_hours(&rows))
        },
    )
}

// ---------------------------------------------------------------------------
// Customers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAov {
    pub name: String,
    pub aov: f64,
    pub orders: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerMetrics {
    pub retention_rate: f64,
    pub total_customers: i64,
    pub returning_customers: i64,
    pub new_customers: i64,
    #[serde(rename = "monthlyAOV")]
    pub monthly_aov: Vec<MonthlyAov>,
}

impl CustomerMetrics {
    fn zero() -> Self {
        Self {
            retention_rate: 0.0,
            total_customers: 0,
            returning_customers: 0,
            new_customers: 0,
            monthly_aov: twelve_months(&HashMap::<u32, ()>::new(), |name, _| MonthlyAov {
                name,
                aov: 0.0,
                orders: 0,
            }),
        }
    }
}

/// Retention of named customers into `year` and average order value per month.
///
/// A customer is active in a year if they have at least one sale in it, and
/// returning if also active the year before.
pub fn customer_metrics(db: &DbState, year: i32) -> CustomerMetrics {
    degrade("customer_metrics", db, CustomerMetrics::zero, |conn| {
        let active: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(DISTINCT t.customer_id) FROM transactions t
                 WHERE {TX_YEAR} = ?1 AND t.customer_id IS NOT NULL"
            ),
            params![year],
            |row| row.get(0),
        )?;
        let returning: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(DISTINCT t.customer_id) FROM transactions t
                 WHERE {TX_YEAR} = ?1 AND t.customer_id IS NOT NULL
                   AND EXISTS (
                       SELECT 1 FROM transactions p
                       WHERE p.customer_id = t.customer_id
                         AND CAST(strftime('%Y', p.created_at, '+7 hours') AS INTEGER) = ?2
                   )"
            ),
            params![year, previous_year(year)?],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_MONTH} AS month, COALESCE(AVG(t.total_amount), 0), COUNT(t.id)
             FROM transactions t
             WHERE {TX_YEAR} = ?1
             GROUP BY month"
        ))?;
        let rows = stmt
            .query_map(params![year], |row| {
                Ok((row.get::<_, u32>(0)?, (row.get(1)?, row.get(2)?)))
            })?
            .collect::<Result<HashMap<u32, (f64, i64)>, _>>()?;

        Ok(CustomerMetrics {
            retention_rate: if active > 0 {
                returning as f64 / active as f64 * 100.0
            } else {
                0.0
            },
            total_customers: active,
            returning_customers: returning,
            new_customers: active - returning,
            monthly_aov: twelve_months(&rows, |name, row| {
                let (aov, orders) = row.copied().unwrap_or((0.0, 0));
                MonthlyAov { name, aov, orders }
            }),
        })
    })
}

/// Window for [`top_customers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CustomerPeriod {
    #[default]
    AllTime,
    ThisMonth,
    ThisWeek,
}

impl CustomerPeriod {
    /// Unknown values fall back to all-time.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "this-month" | "this_month" => CustomerPeriod::ThisMonth,
            "this-week" | "this_week" => CustomerPeriod::ThisWeek,
            _ => CustomerPeriod::AllTime,
        }
    }

    /// First local day of the window, if bounded.
    fn since(self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            CustomerPeriod::AllTime => None,
            CustomerPeriod::ThisMonth => today.with_day(1),
            CustomerPeriod::ThisWeek => Some(time::week_start(today)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopCustomer {
    pub name: String,
    pub frequency: i64,
    pub total_spent: f64,
    pub average_per_visit: f64,
}

impl TopCustomer {
    pub(crate) fn new(name: String, frequency: i64, total_spent: f64) -> Self {
        Self {
            name,
            frequency,
            total_spent,
            average_per_visit: average(total_spent, frequency),
        }
    }
}

/// Five biggest spenders over the window, counted from the sales themselves.
pub fn top_customers(db: &DbState, period: CustomerPeriod) -> Vec<TopCustomer> {
    top_customers_at(db, period, time::now_store())
}

/// [`top_customers`] with the window anchored at `now`.
pub fn top_customers_at(
    db: &DbState,
    period: CustomerPeriod,
    now: DateTime<FixedOffset>,
) -> Vec<TopCustomer> {
    let since = period
        .since(now.date_naive())
        .map(time::sql_local_midnight);
    degrade("top_customers", db, Vec::new, |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT c.name, COUNT(t.id) AS frequency, COALESCE(SUM(t.total_amount), 0) AS spent
             FROM customers c
             JOIN transactions t ON t.customer_id = c.id
             WHERE ?1 IS NULL OR {TX_LOCAL} >= ?1
             GROUP BY c.id, c.name
             HAVING COUNT(t.id) > 0
             ORDER BY spent DESC
             LIMIT 5"
        ))?;
        let rows = stmt
            .query_map(params![since], |row| {
                Ok(TopCustomer::new(row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
    pub count: i64,
}

fn category_totals(conn: &Connection, filter: &str, args: &[&dyn rusqlite::ToSql]) -> PosResult<Vec<CategoryTotal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT e.category, COALESCE(SUM(e.amount), 0) AS total, COUNT(*)
         FROM expenses e
         WHERE {filter}
         GROUP BY e.category
         ORDER BY total DESC, e.category"
    ))?;
    let rows = stmt
        .query_map(args, |row| {
            Ok(CategoryTotal {
                category: row.get(0)?,
                total: row.get(1)?,
                count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Expense totals per category over `year`, largest first.
pub fn expense_by_category(db: &DbState, year: i32) -> Vec<CategoryTotal> {
    degrade("expense_by_category", db, Vec::new, |conn| {
        category_totals(conn, &format!("{EXP_YEAR} = ?1"), &[&year])
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseSummary {
    pub total: f64,
    pub count: i64,
    pub avg_per_day: f64,
    pub top_category: String,
    pub top_category_amount: f64,
    pub by_category: Vec<CategoryTotal>,
}

impl Default for ExpenseSummary {
    fn default() -> Self {
        Self {
            total: 0.0,
            count: 0,
            avg_per_day: 0.0,
            top_category: "-".into(),
            top_category_amount: 0.0,
            by_category: Vec::new(),
        }
    }
}

/// One month of expenses: totals, daily average over the calendar month, and
/// the category breakdown.
pub fn expense_summary(db: &DbState, year: i32, month: u32) -> ExpenseSummary {
    degrade("expense_summary", db, ExpenseSummary::default, |conn| {
        let by_category = category_totals(
            conn,
            &format!("{EXP_YEAR} = ?1 AND {EXP_MONTH} = ?2"),
            &[&year, &month],
        )?;
        let total: f64 = by_category.iter().map(|c| c.total).sum();
        let count: i64 = by_category.iter().map(|c| c.count).sum();
        let days = time::days_in_month(year, month).max(1);
        let (top_category, top_category_amount) = by_category
            .first()
            .map(|c| (c.category.clone(), c.total))
            .unwrap_or_else(|| ("-".to_string(), 0.0));

        Ok(ExpenseSummary {
            total,
            count,
            avg_per_day: total / days as f64,
            top_category,
            top_category_amount,
            by_category,
        })
    })
}

// ---------------------------------------------------------------------------
// Stock usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUsage {
    pub name: String,
    pub unit: String,
    pub total_used: f64,
    pub total_cost: f64,
    pub times_used: i64,
    pub current_stock: f64,
    pub min_stock: f64,
    pub stock_status: StockStatus,
}

/// Ingredient consumption implied by recipes of the sales in the window,
/// most expensive first. Uses today's recipes and unit costs.
pub fn stock_usage(db: &DbState, year: i32, month: Option<u32>) -> Vec<StockUsage> {
    degrade("stock_usage", db, Vec::new, |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT s.name, s.unit,
                    SUM(mr.amount_needed * ti.quantity),
                    SUM(mr.amount_needed * ti.quantity * s.cost_per_unit) AS total_cost,
                    COUNT(DISTINCT t.id),
                    s.stock, s.min_stock
             FROM stocks s
             JOIN menu_recipes mr ON mr.stock_id = s.id
             JOIN transaction_items ti ON ti.menu_id = mr.menu_id
             JOIN transactions t ON t.id = ti.transaction_id
             WHERE {TX_YEAR} = ?1 AND (?2 IS NULL OR {TX_MONTH} = ?2)
             GROUP BY s.id, s.name, s.unit, s.stock, s.min_stock
             ORDER BY total_cost DESC, s.name"
        ))?;
        let rows = stmt
            .query_map(params![year, month], |row| {
                let current_stock: f64 = row.get(5)?;
                let min_stock: f64 = row.get(6)?;
                Ok(StockUsage {
                    name: row.get(0)?,
                    unit: row.get(1)?,
                    total_used: row.get(2)?,
                    total_cost: row.get(3)?,
                    times_used: row.get(4)?,
                    current_stock,
                    min_stock,
                    stock_status: StockStatus::classify(current_stock, min_stock),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
