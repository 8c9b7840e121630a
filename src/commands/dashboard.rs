use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};

use crate::models::{BillQuery, DashboardStats, Session};
use crate::services::state::AppState;

const RECENT_BILLS: usize = 5;
const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub async fn get_dashboard_stats(
    now: DateTime<Local>,
    session: &Session,
    state: &AppState,
) -> Result<DashboardStats> {
    let backend = state.backend()?;
    let year_start = start_of_year(now)?;

    let total_bills = backend.bills.count_bills(session).await?;
    let totals = backend.bills.bill_totals_since(session, year_start).await?;
    let recent_bills = backend
        .bills
        .list_bills(
            session,
            &BillQuery {
                created_since: None,
                limit: Some(RECENT_BILLS),
            },
        )
        .await?;

    let monthly_revenue = build_chart_series(&totals);
    Ok(DashboardStats {
        total_bills,
        revenue_year: totals.iter().map(|(total, _)| total).sum(),
        chart_months: MONTH_LABELS.iter().map(|m| m.to_string()).collect(),
        monthly_revenue,
        recent_bills,
    })
}

fn start_of_year(now: DateTime<Local>) -> Result<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(now.year(), 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|d| d.and_local_timezone(Local).earliest())
        .map(|d| d.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("Invalid date"))
}

/// Sums bill totals into calendar-month buckets, January first, using local time.
fn build_chart_series(totals: &[(f64, DateTime<Utc>)]) -> Vec<f64> {
    let mut months = vec![0.0; 12];
    for (total, created_at) in totals {
        let month = created_at.with_timezone(&Local).month0() as usize;
        months[month] += total;
    }
    months
}
