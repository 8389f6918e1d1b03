//! Database operations for `companies`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CompanyRow {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// All companies ordered by name. Inactive companies are included.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_companies(pool: &PgPool) -> Result<Vec<CompanyRow>, DbError> {
    let rows = sqlx::query_as::<_, CompanyRow>(
        "SELECT id, name, is_active, created_at FROM companies ORDER BY name, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no company has `id`.
pub async fn get_company(pool: &PgPool, id: i64) -> Result<CompanyRow, DbError> {
    sqlx::query_as::<_, CompanyRow>(
        "SELECT id, name, is_active, created_at FROM companies WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on failure; a duplicate name is a unique violation.
pub async fn create_company(pool: &PgPool, name: &str) -> Result<CompanyRow, DbError> {
    let row = sqlx::query_as::<_, CompanyRow>(
        "INSERT INTO companies (name) VALUES ($1) \
         RETURNING id, name, is_active, created_at",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Flip `is_active` and return the updated row.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no company has `id`.
pub async fn toggle_company(pool: &PgPool, id: i64) -> Result<CompanyRow, DbError> {
    sqlx::query_as::<_, CompanyRow>(
        "UPDATE companies SET is_active = NOT is_active WHERE id = $1 \
         RETURNING id, name, is_active, created_at",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
