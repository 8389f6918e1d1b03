//! Database operations for `roles`, `permissions` and `role_permissions`.

use std::collections::HashSet;

use crewdesk_core::{permissions, ValidationError};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct RoleRow {
    pub id: i64,
    pub name: String,
    pub is_ceo: bool,
    /// Permission codes granted to the role, sorted.
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct PermissionRow {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
}

/// Roles with their permission codes, ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_roles(pool: &PgPool) -> Result<Vec<RoleRow>, DbError> {
    let rows = sqlx::query_as::<_, RoleRow>(
        "SELECT r.id, r.name, r.is_ceo, \
                COALESCE(ARRAY_AGG(p.code ORDER BY p.code) FILTER (WHERE p.code IS NOT NULL), \
                         ARRAY[]::TEXT[]) AS permissions \
         FROM roles r \
         LEFT JOIN role_permissions rp ON rp.role_id = r.id \
         LEFT JOIN permissions p ON p.id = rp.permission_id \
         GROUP BY r.id \
         ORDER BY r.name, r.id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on failure; a duplicate name is a unique violation.
pub async fn create_role(pool: &PgPool, name: &str, is_ceo: bool) -> Result<RoleRow, DbError> {
    let row = sqlx::query_as::<_, RoleRow>(
        "INSERT INTO roles (name, is_ceo) VALUES ($1, $2) \
         RETURNING id, name, is_ceo, ARRAY[]::TEXT[] AS permissions",
    )
    .bind(name)
    .bind(is_ceo)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// The permission catalog as stored, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_permissions(pool: &PgPool) -> Result<Vec<PermissionRow>, DbError> {
    let rows = sqlx::query_as::<_, PermissionRow>(
        "SELECT id, code, name, description FROM permissions ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Replace the permission set of a role. Runs in one transaction; unknown
/// codes are rejected before anything is written.
///
/// # Errors
///
/// Returns [`DbError::Validation`] for an unknown code, [`DbError::NotFound`]
/// if the role does not exist, or [`DbError::Sqlx`] on failure.
pub async fn replace_role_permissions(
    pool: &PgPool,
    role_id: i64,
    codes: &[String],
) -> Result<Vec<String>, DbError> {
    if let Some(unknown) = codes.iter().find(|c| !permissions::is_known(c)) {
        return Err(ValidationError::new(
            "permissions",
            format!("unknown permission code '{unknown}'"),
        )
        .into());
    }
    let unique: HashSet<&str> = codes.iter().map(String::as_str).collect();
    let mut codes: Vec<String> = unique.into_iter().map(ToOwned::to_owned).collect();
    codes.sort();

    let mut tx = pool.begin().await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM roles WHERE id = $1 FOR UPDATE")
        .bind(role_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(DbError::NotFound);
    }

    sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
        .bind(role_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id) \
         SELECT $1, id FROM permissions WHERE code = ANY($2)",
    )
    .bind(role_id)
    .bind(&codes)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(codes)
}
