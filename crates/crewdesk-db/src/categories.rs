//! Database operations for `categories`.

use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    /// Number of report items tagged with the category.
    pub usage_count: i64,
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT c.id, c.name, COUNT(ric.item_id) AS usage_count \
         FROM categories c \
         LEFT JOIN report_item_categories ric ON ric.category_id = c.id \
         GROUP BY c.id \
         ORDER BY c.name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on failure; a duplicate name is a unique violation.
pub async fn create_category(pool: &PgPool, name: &str) -> Result<CategoryRow, DbError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "INSERT INTO categories (name) VALUES ($1) \
         RETURNING id, name, 0::BIGINT AS usage_count",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Delete a category; item tags referencing it are removed by cascade.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no category has `id`.
pub async fn delete_category(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
