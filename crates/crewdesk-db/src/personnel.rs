//! Database operations for `personnel`.

use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct PersonnelRow {
    pub id: i64,
    pub company_id: i64,
    pub role_id: i64,
    pub role_name: String,
    pub is_ceo: bool,
    pub prefix: Option<String>,
    pub full_name: String,
    pub gender: String,
    pub email: String,
    pub mobile: String,
    pub username: String,
    pub is_active: bool,
    pub can_receive_reports: bool,
}

#[derive(Debug, Clone)]
pub struct NewPersonnel<'a> {
    pub company_id: i64,
    pub role_id: i64,
    pub prefix: Option<&'a str>,
    pub full_name: &'a str,
    pub gender: &'a str,
    pub email: &'a str,
    pub mobile: &'a str,
    pub username: &'a str,
    pub can_receive_reports: bool,
}

/// A candidate receiver of a coach report.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ReceiverRow {
    pub id: i64,
    pub full_name: String,
    pub is_ceo: bool,
}

const PERSONNEL_COLUMNS: &str = "p.id, p.company_id, p.role_id, r.name AS role_name, r.is_ceo, \
     p.prefix, p.full_name, p.gender, p.email, p.mobile, p.username, \
     p.is_active, p.can_receive_reports";

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_company_personnel(
    pool: &PgPool,
    company_id: i64,
) -> Result<Vec<PersonnelRow>, DbError> {
    let rows = sqlx::query_as::<_, PersonnelRow>(&format!(
        "SELECT {PERSONNEL_COLUMNS} \
         FROM personnel p JOIN roles r ON r.id = p.role_id \
         WHERE p.company_id = $1 \
         ORDER BY p.full_name, p.id"
    ))
    .bind(company_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no personnel has `id`.
pub async fn get_personnel(pool: &PgPool, id: i64) -> Result<PersonnelRow, DbError> {
    sqlx::query_as::<_, PersonnelRow>(&format!(
        "SELECT {PERSONNEL_COLUMNS} \
         FROM personnel p JOIN roles r ON r.id = p.role_id \
         WHERE p.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Insert a personnel record and return its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on failure; a duplicate username is a unique
/// violation.
pub async fn create_personnel(pool: &PgPool, new: &NewPersonnel<'_>) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO personnel \
         (company_id, role_id, prefix, full_name, gender, email, mobile, username, can_receive_reports) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING id",
    )
    .bind(new.company_id)
    .bind(new.role_id)
    .bind(new.prefix)
    .bind(new.full_name)
    .bind(new.gender)
    .bind(new.email)
    .bind(new.mobile)
    .bind(new.username)
    .bind(new.can_receive_reports)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Flip `is_active` and return the new value.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no personnel has `id`.
pub async fn toggle_personnel(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    sqlx::query_scalar::<_, bool>(
        "UPDATE personnel SET is_active = NOT is_active WHERE id = $1 RETURNING is_active",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Active personnel of a company who may receive a coach report, CEO-role
/// holders first, then by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_receivers(pool: &PgPool, company_id: i64) -> Result<Vec<ReceiverRow>, DbError> {
    let rows = sqlx::query_as::<_, ReceiverRow>(
        "SELECT p.id, p.full_name, r.is_ceo \
         FROM personnel p JOIN roles r ON r.id = p.role_id \
         WHERE p.company_id = $1 AND p.is_active \
         ORDER BY r.is_ceo DESC, p.full_name, p.id",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `(id, company_id)` pairs for those of `ids` that exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn personnel_company_ids(
    pool: &PgPool,
    ids: &[i64],
) -> Result<Vec<(i64, i64)>, DbError> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT id, company_id FROM personnel WHERE id = ANY($1) ORDER BY id",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
