//! Read-model queries behind `GET /dashboard`.

use chrono::NaiveDate;
use crewdesk_core::CategoryCount;
use sqlx::PgPool;

use crate::daily_reports::ReportSummaryRow;
use crate::DbError;

const MONTHS_SHOWN: i64 = 6;
const TOP_CATEGORIES_SHOWN: i64 = 5;
const RECENT_PERSONAL: i64 = 5;
const RECENT_COMPANY: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, serde::Serialize)]
pub struct MonthCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PersonnelDashboard {
    pub total_reports: i64,
    pub current_month_reports: i64,
    pub monthly: Vec<MonthCount>,
    pub top_categories: Vec<CategoryCount>,
    pub recent_reports: Vec<ReportSummaryRow>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CompanyDashboard {
    pub active_personnel: i64,
    pub total_reports: i64,
    pub monthly: Vec<MonthCount>,
    pub recent_reports: Vec<ReportSummaryRow>,
}

#[derive(sqlx::FromRow)]
struct CategoryCountRow {
    name: String,
    count: i64,
}

/// Activity overview for one personnel member. `today` anchors the
/// current-month figure.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn personnel_dashboard(
    pool: &PgPool,
    personnel_id: i64,
    today: NaiveDate,
) -> Result<PersonnelDashboard, DbError> {
    let total_reports: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE personnel_id = $1")
            .bind(personnel_id)
            .fetch_one(pool)
            .await?;

    let current_month_reports: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reports \
         WHERE personnel_id = $1 \
           AND date_trunc('month', report_date) = date_trunc('month', $2::DATE)",
    )
    .bind(personnel_id)
    .bind(today)
    .fetch_one(pool)
    .await?;

    let monthly = sqlx::query_as::<_, MonthCount>(
        "SELECT to_char(report_date, 'YYYY-MM') AS month, COUNT(*) AS count \
         FROM reports WHERE personnel_id = $1 \
         GROUP BY month ORDER BY month DESC LIMIT $2",
    )
    .bind(personnel_id)
    .bind(MONTHS_SHOWN)
    .fetch_all(pool)
    .await?;

    let top_categories = sqlx::query_as::<_, CategoryCountRow>(
        "SELECT c.name, COUNT(DISTINCT ri.report_id) AS count \
         FROM categories c \
         JOIN report_item_categories ric ON ric.category_id = c.id \
         JOIN report_items ri ON ri.id = ric.item_id \
         JOIN reports r ON r.id = ri.report_id \
         WHERE r.personnel_id = $1 \
         GROUP BY c.id \
         ORDER BY count DESC, c.id \
         LIMIT $2",
    )
    .bind(personnel_id)
    .bind(TOP_CATEGORIES_SHOWN)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|r| CategoryCount {
        name: r.name,
        count: r.count,
    })
    .collect();

    let recent_reports = recent_reports(pool, Some(personnel_id), None, RECENT_PERSONAL).await?;

    Ok(PersonnelDashboard {
        total_reports,
        current_month_reports,
        monthly,
        top_categories,
        recent_reports,
    })
}

/// Company-wide overview shown to CEO-role holders.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn company_dashboard(
    pool: &PgPool,
    company_id: i64,
) -> Result<CompanyDashboard, DbError> {
    let active_personnel: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM personnel WHERE company_id = $1 AND is_active",
    )
    .bind(company_id)
    .fetch_one(pool)
    .await?;

    let total_reports: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reports r JOIN personnel p ON p.id = r.personnel_id \
         WHERE p.company_id = $1",
    )
    .bind(company_id)
    .fetch_one(pool)
    .await?;

    let monthly = sqlx::query_as::<_, MonthCount>(
        "SELECT to_char(r.report_date, 'YYYY-MM') AS month, COUNT(*) AS count \
         FROM reports r JOIN personnel p ON p.id = r.personnel_id \
         WHERE p.company_id = $1 \
         GROUP BY month ORDER BY month DESC LIMIT $2",
    )
    .bind(company_id)
    .bind(MONTHS_SHOWN)
    .fetch_all(pool)
    .await?;

    let recent_reports = recent_reports(pool, None, Some(company_id), RECENT_COMPANY).await?;

    Ok(CompanyDashboard {
        active_personnel,
        total_reports,
        monthly,
        recent_reports,
    })
}

async fn recent_reports(
    pool: &PgPool,
    personnel_id: Option<i64>,
    company_id: Option<i64>,
    limit: i64,
) -> Result<Vec<ReportSummaryRow>, DbError> {
    let rows = sqlx::query_as::<_, ReportSummaryRow>(
        "SELECT r.id, r.personnel_id, p.full_name, p.company_id, r.report_date, \
                (SELECT COUNT(*) FROM report_items ri WHERE ri.report_id = r.id) AS item_count \
         FROM reports r JOIN personnel p ON p.id = r.personnel_id \
         WHERE ($1::BIGINT IS NULL OR r.personnel_id = $1) \
           AND ($2::BIGINT IS NULL OR p.company_id = $2) \
         ORDER BY r.report_date DESC, r.id DESC \
         LIMIT $3",
    )
    .bind(personnel_id)
    .bind(company_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
