//! Postgres persistence for crewdesk.
//!
//! Every module exposes plain async functions over a [`PgPool`] (or a
//! transaction) and returns row structs that derive `sqlx::FromRow`.

pub mod access;
pub mod categories;
pub mod coach_reports;
pub mod companies;
pub mod daily_reports;
pub mod dashboard;
pub mod personnel;
pub mod roles;
pub mod seed;
pub mod social;
pub mod social_reports;
pub mod statistics;

use std::time::Duration;

use crewdesk_core::{AppConfig, ValidationError};
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

// Relative to this crate's Cargo.toml.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

const UNIQUE_VIOLATION: &str = "23505";

/// Connection pool sizing, taken from [`AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// Postgres rejected a row that collides with a unique constraint.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }
}

/// Open a pool against `database_url`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

// A fresh database has no `_sqlx_migrations` table yet; that counts as zero.
async fn applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Apply pending migrations and return how many ran.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_migrations(pool).await;
    Ok(usize::try_from(after - before).unwrap_or(0))
}

/// Round-trip `SELECT 1` on the pool.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

/// [`ping`] with the failure wrapped in [`DbError`], for the health endpoint.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the database is unreachable.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await.map_err(DbError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!DbError::NotFound.is_unique_violation());
        assert!(!DbError::Sqlx(sqlx::Error::RowNotFound).is_unique_violation());
    }

    #[test]
    fn validation_errors_convert() {
        let err = DbError::from(ValidationError::new("name", "must not be blank"));
        assert!(matches!(err, DbError::Validation(ref v) if v.field == "name"));
    }
}
