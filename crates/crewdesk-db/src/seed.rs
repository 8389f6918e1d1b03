use crewdesk_core::{permissions::CATALOG, SeedCatalog};
use sqlx::{PgConnection, PgPool};

use crate::DbError;

/// Counts of catalog entries written by [`seed_catalog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SeedSummary {
    pub permissions: usize,
    pub social_networks: usize,
    pub network_fields: usize,
    pub kpi_models: usize,
    pub companies: usize,
    pub categories: usize,
    pub admins: usize,
}

/// Upsert the reference catalog: the permission list, the CEO role holding
/// every permission, social networks with their fields, KPI models,
/// companies, categories and admin accounts.
///
/// Re-running with the same catalog changes nothing. All upserts run inside
/// a single transaction; if any operation fails the entire batch is rolled
/// back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_catalog(pool: &PgPool, catalog: &SeedCatalog) -> Result<SeedSummary, DbError> {
    let mut tx = pool.begin().await?;
    let mut summary = SeedSummary::default();

    for permission in CATALOG {
        sqlx::query(
            "INSERT INTO permissions (code, name, description) VALUES ($1, $2, $3) \
             ON CONFLICT (code) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 description = EXCLUDED.description",
        )
        .bind(permission.code)
        .bind(permission.name)
        .bind(permission.description)
        .execute(&mut *tx)
        .await?;
        summary.permissions += 1;
    }

    seed_ceo_role(&mut tx, &catalog.ceo_role).await?;

    for network in &catalog.social_networks {
        let network_id: i64 = sqlx::query_scalar(
            "INSERT INTO social_networks (name, icon) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET icon = EXCLUDED.icon \
             RETURNING id",
        )
        .bind(&network.name)
        .bind(&network.icon)
        .fetch_one(&mut *tx)
        .await?;
        summary.social_networks += 1;

        for (position, field) in network.fields.iter().enumerate() {
            let sort_order = i32::try_from(position).unwrap_or(i32::MAX);
            sqlx::query(
                "INSERT INTO social_network_fields \
                 (social_network_id, field_name, field_label, field_type, is_required, is_kpi, sort_order) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (social_network_id, field_name) DO UPDATE SET \
                     field_label = EXCLUDED.field_label, \
                     field_type = EXCLUDED.field_type, \
                     is_required = EXCLUDED.is_required, \
                     is_kpi = EXCLUDED.is_kpi, \
                     sort_order = EXCLUDED.sort_order",
            )
            .bind(network_id)
            .bind(&field.name)
            .bind(&field.label)
            .bind(&field.field_type)
            .bind(field.required)
            .bind(field.kpi)
            .bind(sort_order)
            .execute(&mut *tx)
            .await?;
            summary.network_fields += 1;
        }
    }

    for model in &catalog.kpi_models {
        sqlx::query(
            "INSERT INTO kpi_models (name, description, model_type) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO UPDATE SET \
                 description = EXCLUDED.description, \
                 model_type = EXCLUDED.model_type",
        )
        .bind(&model.name)
        .bind(&model.description)
        .bind(&model.model_type)
        .execute(&mut *tx)
        .await?;
        summary.kpi_models += 1;
    }

    for company in &catalog.companies {
        sqlx::query("INSERT INTO companies (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(company)
            .execute(&mut *tx)
            .await?;
        summary.companies += 1;
    }

    for category in &catalog.categories {
        sqlx::query("INSERT INTO categories (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(category)
            .execute(&mut *tx)
            .await?;
        summary.categories += 1;
    }

    for admin in &catalog.admins {
        sqlx::query(
            "INSERT INTO admin_users (username) VALUES ($1) ON CONFLICT (username) DO NOTHING",
        )
        .bind(&admin.username)
        .execute(&mut *tx)
        .await?;
        summary.admins += 1;
    }

    tx.commit().await?;
    Ok(summary)
}

/// The CEO role always holds every permission, including ones added to the
/// catalog after it was first seeded.
async fn seed_ceo_role(conn: &mut PgConnection, name: &str) -> Result<(), sqlx::Error> {
    let role_id: i64 = sqlx::query_scalar(
        "INSERT INTO roles (name, is_ceo) VALUES ($1, true) \
         ON CONFLICT (name) DO UPDATE SET is_ceo = true \
         RETURNING id",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id) \
         SELECT $1, id FROM permissions \
         ON CONFLICT DO NOTHING",
    )
    .bind(role_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
