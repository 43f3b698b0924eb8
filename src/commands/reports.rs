use chrono::Datelike;
use serde_json::Value;

use super::{gate, payload_from, to_value};
use crate::auth::{self, SessionContext};
use crate::dashboard;
use crate::db::DbState;
use crate::reports::{self, CustomerPeriod, SellingPeriod};
use crate::{time, value_i64, value_str};

#[derive(Debug, Clone, PartialEq)]
struct ReportQuery {
    year: i32,
    month: Option<u32>,
    period: Option<String>,
}

/// `{ year, month?, period? }`, a bare year number, or nothing (current year).
/// Years outside 1..=9999 and months outside 1..=12 are ignored.
fn parse_report_query(arg0: Option<Value>) -> ReportQuery {
    let payload = match arg0 {
        Some(Value::Number(n)) => serde_json::json!({ "year": n }),
        other => payload_from(other, "period"),
    };
    let year = value_i64(&payload, &["year", "tahun"])
        .filter(|y| (1..=9999).contains(y))
        .and_then(|y| i32::try_from(y).ok())
        .unwrap_or_else(|| time::now_store().year());
    let month = value_i64(&payload, &["month", "bulan"])
        .filter(|m| (1..=12).contains(m))
        .map(|m| m as u32);
    let period = value_str(&payload, &["period", "periode"]);
    ReportQuery {
        year,
        month,
        period,
    }
}

fn report<T: serde::Serialize>(
    session: Option<&SessionContext>,
    build: impl FnOnce() -> T,
) -> Result<Value, String> {
    gate(session, auth::VIEW_REPORTS)?;
    to_value(&build())
}

pub fn report_summary(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::report_summary(db, q.year))
}

pub fn report_revenue_chart(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::revenue_chart(db, q.year))
}

pub fn report_transaction_trend(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::transaction_trend(db, q.year))
}

pub fn report_monthly_profit(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::monthly_profit(db, q.year))
}

pub fn report_menu_analysis(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::menu_analysis(db, q.year))
}

pub fn report_peak_hours(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::peak_hours(db, q.year, q.month))
}

pub fn report_customer_metrics(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::customer_metrics(db, q.year))
}

pub fn report_cash_flow(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::cash_flow(db, q.year))
}

pub fn report_expense_by_category(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::expense_by_category(db, q.year))
}

pub fn report_monthly_expense(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::monthly_expense(db, q.year))
}

/// Defaults to the current store month when none is given.
pub fn report_expense_summary(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    let month = q.month.unwrap_or_else(|| time::now_store().month());
    report(session, || reports::expense_summary(db, q.year, month))
}

pub fn report_stock_usage(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    report(session, || reports::stock_usage(db, q.year, q.month))
}

pub fn report_top_selling(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    let period = q
        .period
        .as_deref()
        .map(SellingPeriod::parse)
        .unwrap_or_default();
    report(session, || reports::top_selling_by_period(db, q.year, period))
}

pub fn report_top_menus(db: &DbState, session: Option<&SessionContext>) -> Result<Value, String> {
    report(session, || reports::top_menus(db))
}

pub fn report_top_customers(
    arg0: Option<Value>,
    db: &DbState,
    session: Option<&SessionContext>,
) -> Result<Value, String> {
    let q = parse_report_query(arg0);
    let period = q
        .period
        .as_deref()
        .map(CustomerPeriod::parse)
        .unwrap_or_default();
    report(session, || reports::top_customers(db, period))
}

pub fn dashboard_weekly(db: &DbState, session: Option<&SessionContext>) -> Result<Value, String> {
    report(session, || dashboard::weekly_dashboard(db, time::now_store()))
}
