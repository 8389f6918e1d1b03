//! Capability lookup for personnel callers and `coach_report_access` grants.

use chrono::{DateTime, Utc};
use crewdesk_core::Capabilities;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CoachReportGrantRow {
    pub id: i64,
    pub company_id: i64,
    pub personnel_id: i64,
    pub full_name: String,
    pub can_view: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RoleFlagsRow {
    company_id: i64,
    is_ceo: bool,
    is_active: bool,
}

/// The capability set of an active personnel member, or `None` when the
/// personnel does not exist, is inactive, or belongs to a different company
/// than `company_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn load_capabilities(
    pool: &PgPool,
    personnel_id: i64,
    company_id: i64,
) -> Result<Option<Capabilities>, DbError> {
    let flags = sqlx::query_as::<_, RoleFlagsRow>(
        "SELECT p.company_id, r.is_ceo, p.is_active \
         FROM personnel p JOIN roles r ON r.id = p.role_id \
         WHERE p.id = $1",
    )
    .bind(personnel_id)
    .fetch_optional(pool)
    .await?;

    let Some(flags) = flags else {
        return Ok(None);
    };
    if !flags.is_active || flags.company_id != company_id {
        return Ok(None);
    }

    let codes = sqlx::query_scalar::<_, String>(
        "SELECT pm.code \
         FROM personnel p \
         JOIN role_permissions rp ON rp.role_id = p.role_id \
         JOIN permissions pm ON pm.id = rp.permission_id \
         WHERE p.id = $1",
    )
    .bind(personnel_id)
    .fetch_all(pool)
    .await?;

    let companies = sqlx::query_scalar::<_, i64>(
        "SELECT company_id FROM coach_report_access \
         WHERE personnel_id = $1 AND can_view",
    )
    .bind(personnel_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(Capabilities::new(flags.is_ceo, codes, companies)))
}

/// Grants for a company, ordered by personnel name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_coach_report_grants(
    pool: &PgPool,
    company_id: i64,
) -> Result<Vec<CoachReportGrantRow>, DbError> {
    let rows = sqlx::query_as::<_, CoachReportGrantRow>(
        "SELECT a.id, a.company_id, a.personnel_id, p.full_name, a.can_view, a.created_at \
         FROM coach_report_access a \
         JOIN personnel p ON p.id = a.personnel_id \
         WHERE a.company_id = $1 \
         ORDER BY p.full_name, a.id",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Create or update the grant of `personnel_id` on `company_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails (including unknown ids).
pub async fn upsert_coach_report_grant(
    pool: &PgPool,
    company_id: i64,
    personnel_id: i64,
    can_view: bool,
) -> Result<CoachReportGrantRow, DbError> {
    let row = sqlx::query_as::<_, CoachReportGrantRow>(
        "WITH upserted AS ( \
             INSERT INTO coach_report_access (company_id, personnel_id, can_view) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (company_id, personnel_id) DO UPDATE SET can_view = EXCLUDED.can_view \
             RETURNING id, company_id, personnel_id, can_view, created_at \
         ) \
         SELECT u.id, u.company_id, u.personnel_id, p.full_name, u.can_view, u.created_at \
         FROM upserted u JOIN personnel p ON p.id = u.personnel_id",
    )
    .bind(company_id)
    .bind(personnel_id)
    .bind(can_view)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no such grant exists.
pub async fn delete_coach_report_grant(
    pool: &PgPool,
    company_id: i64,
    personnel_id: i64,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "DELETE FROM coach_report_access WHERE company_id = $1 AND personnel_id = $2",
    )
    .bind(company_id)
    .bind(personnel_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
