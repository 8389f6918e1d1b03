//! Database operations for daily activity reports: `reports`, `report_items`
//! and `report_item_categories`.

use std::collections::HashSet;

use chrono::NaiveDate;
use crewdesk_core::{Pagination, ValidationError};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ReportSummaryRow {
    pub id: i64,
    pub personnel_id: i64,
    pub full_name: String,
    pub company_id: i64,
    pub report_date: NaiveDate,
    pub item_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ReportItemRow {
    pub id: i64,
    pub position: i32,
    pub content: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: ReportSummaryRow,
    pub items: Vec<ReportItemRow>,
}

#[derive(Debug, Clone)]
pub struct NewReportItem {
    pub content: String,
    pub category_ids: Vec<i64>,
}

/// Optional filters for report listing. `company_id` restricts to reports
/// authored by personnel of that company.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFilters {
    pub personnel_id: Option<i64>,
    pub company_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert a report with its ordered items and item categories in one
/// transaction. Returns the report id.
///
/// # Errors
///
/// Returns [`DbError::Validation`] when an item references an unknown
/// category, or [`DbError::Sqlx`] on failure. A second report for the same
/// personnel and date is a unique violation.
pub async fn create_daily_report(
    pool: &PgPool,
    personnel_id: i64,
    report_date: NaiveDate,
    items: &[NewReportItem],
) -> Result<i64, DbError> {
    let wanted: HashSet<i64> = items
        .iter()
        .flat_map(|i| i.category_ids.iter().copied())
        .collect();
    let wanted: Vec<i64> = wanted.into_iter().collect();

    let mut tx = pool.begin().await?;

    let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE id = ANY($1)")
        .bind(&wanted)
        .fetch_one(&mut *tx)
        .await?;
    if usize::try_from(known).unwrap_or(0) != wanted.len() {
        return Err(ValidationError::new("items", "unknown category id").into());
    }

    let report_id: i64 = sqlx::query_scalar(
        "INSERT INTO reports (personnel_id, report_date) VALUES ($1, $2) RETURNING id",
    )
    .bind(personnel_id)
    .bind(report_date)
    .fetch_one(&mut *tx)
    .await?;

    for (position, item) in (0_i32..).zip(items) {
        let item_id: i64 = sqlx::query_scalar(
            "INSERT INTO report_items (report_id, position, content) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(report_id)
        .bind(position)
        .bind(&item.content)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO report_item_categories (item_id, category_id) \
             SELECT $1, UNNEST($2::BIGINT[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(item_id)
        .bind(&item.category_ids)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(report_id)
}

/// Delete a report, its items and their category tags atomically.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the report does not exist; nothing is
/// deleted in that case.
pub async fn delete_daily_report(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM report_item_categories \
         WHERE item_id IN (SELECT id FROM report_items WHERE report_id = $1)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM report_items WHERE report_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM reports WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// A page of reports, newest first, plus the total matching row count.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_daily_reports(
    pool: &PgPool,
    filters: ReportFilters,
    page: Pagination,
) -> Result<(Vec<ReportSummaryRow>, i64), DbError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reports r JOIN personnel p ON p.id = r.personnel_id \
         WHERE ($1::BIGINT IS NULL OR r.personnel_id = $1) \
           AND ($2::BIGINT IS NULL OR p.company_id = $2) \
           AND ($3::DATE IS NULL OR r.report_date >= $3) \
           AND ($4::DATE IS NULL OR r.report_date <= $4)",
    )
    .bind(filters.personnel_id)
    .bind(filters.company_id)
    .bind(filters.from)
    .bind(filters.to)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, ReportSummaryRow>(
        "SELECT r.id, r.personnel_id, p.full_name, p.company_id, r.report_date, \
                (SELECT COUNT(*) FROM report_items ri WHERE ri.report_id = r.id) AS item_count \
         FROM reports r JOIN personnel p ON p.id = r.personnel_id \
         WHERE ($1::BIGINT IS NULL OR r.personnel_id = $1) \
           AND ($2::BIGINT IS NULL OR p.company_id = $2) \
           AND ($3::DATE IS NULL OR r.report_date >= $3) \
           AND ($4::DATE IS NULL OR r.report_date <= $4) \
         ORDER BY r.report_date DESC, r.id DESC \
         LIMIT $5 OFFSET $6",
    )
    .bind(filters.personnel_id)
    .bind(filters.company_id)
    .bind(filters.from)
    .bind(filters.to)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((rows, total))
}

/// A report with its items in order, each carrying its category names.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the report does not exist.
pub async fn get_daily_report(pool: &PgPool, id: i64) -> Result<ReportDetail, DbError> {
    let report = sqlx::query_as::<_, ReportSummaryRow>(
        "SELECT r.id, r.personnel_id, p.full_name, p.company_id, r.report_date, \
                (SELECT COUNT(*) FROM report_items ri WHERE ri.report_id = r.id) AS item_count \
         FROM reports r JOIN personnel p ON p.id = r.personnel_id \
         WHERE r.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    let items = sqlx::query_as::<_, ReportItemRow>(
        "SELECT ri.id, ri.position, ri.content, \
                COALESCE(ARRAY_AGG(c.name ORDER BY c.name) FILTER (WHERE c.id IS NOT NULL), \
                         ARRAY[]::TEXT[]) AS categories \
         FROM report_items ri \
         LEFT JOIN report_item_categories ric ON ric.item_id = ri.id \
         LEFT JOIN categories c ON c.id = ric.category_id \
         WHERE ri.report_id = $1 \
         GROUP BY ri.id \
         ORDER BY ri.position, ri.id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(ReportDetail { report, items })
}
