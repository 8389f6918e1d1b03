//! Live report statistics and the cached-or-computed resolver used by coach
//! reports.

use crewdesk_core::{
    statistics::parse_snapshot, CategoryTally, DateRange, Statistics, StatisticsSnapshot,
};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

#[derive(sqlx::FromRow)]
struct TallyRow {
    id: i64,
    name: String,
    count: i64,
}

/// Aggregate a personnel member's reports over `range` from the live tables.
/// No matching reports yields zero counts and empty lists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn compute_statistics(
    pool: &PgPool,
    personnel_id: i64,
    range: DateRange,
) -> Result<StatisticsSnapshot, DbError> {
    let report_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reports \
         WHERE personnel_id = $1 AND report_date BETWEEN $2 AND $3",
    )
    .bind(personnel_id)
    .bind(range.date_from())
    .bind(range.date_to())
    .fetch_one(pool)
    .await?;

    let tallies: Vec<CategoryTally> = sqlx::query_as::<_, TallyRow>(
        "SELECT c.id, c.name, COUNT(*) AS count \
         FROM categories c \
         JOIN report_item_categories ric ON ric.category_id = c.id \
         JOIN report_items ri ON ri.id = ric.item_id \
         JOIN reports r ON r.id = ri.report_id \
         WHERE r.personnel_id = $1 AND r.report_date BETWEEN $2 AND $3 \
         GROUP BY c.id",
    )
    .bind(personnel_id)
    .bind(range.date_from())
    .bind(range.date_to())
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|r| CategoryTally {
        id: r.id,
        name: r.name,
        count: r.count,
    })
    .collect();

    Ok(StatisticsSnapshot::from_tallies(report_count, &tallies))
}

/// Return the stored snapshot verbatim when present, otherwise compute from
/// the live tables. A snapshot that does not parse is logged and recomputed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if live computation fails.
pub async fn resolve_statistics(
    pool: &PgPool,
    snapshot: Option<&Value>,
    personnel_id: i64,
    range: DateRange,
) -> Result<Statistics, DbError> {
    match parse_snapshot(snapshot) {
        Ok(Some(cached)) => return Ok(Statistics::Cached(cached)),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(personnel_id, error = %e, "ignoring malformed statistics snapshot");
        }
    }
    compute_statistics(pool, personnel_id, range)
        .await
        .map(Statistics::Computed)
}

/// Social reports of any page of `company_id` dated within `range`. Always
/// live.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn social_report_count(
    pool: &PgPool,
    company_id: i64,
    range: DateRange,
) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM social_reports sr \
         JOIN social_pages sp ON sp.id = sr.page_id \
         WHERE sp.company_id = $1 AND sr.report_date BETWEEN $2 AND $3",
    )
    .bind(company_id)
    .bind(range.date_from())
    .bind(range.date_to())
    .fetch_one(pool)
    .await?;
    Ok(count)
}
