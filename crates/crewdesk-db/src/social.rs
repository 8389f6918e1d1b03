//! Social networks, their metric field definitions, tracked pages, and the
//! KPI expectations attached to page fields.

use std::collections::HashMap;

use chrono::NaiveDate;
use crewdesk_core::{KpiDefinition, ValidationError};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct SocialNetworkRow {
    pub id: i64,
    pub name: String,
    pub icon: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct FieldRow {
    pub id: i64,
    pub social_network_id: i64,
    pub field_name: String,
    pub field_label: String,
    pub field_type: String,
    pub is_required: bool,
    pub is_kpi: bool,
    pub sort_order: i32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NetworkWithFields {
    #[serde(flatten)]
    pub network: SocialNetworkRow,
    pub fields: Vec<FieldRow>,
}

#[derive(Debug, Clone)]
pub struct NewField<'a> {
    pub field_name: &'a str,
    pub field_label: &'a str,
    pub field_type: &'a str,
    pub is_required: bool,
    pub is_kpi: bool,
    pub sort_order: i32,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct KpiModelRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub model_type: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct SocialPageRow {
    pub id: i64,
    pub company_id: i64,
    pub company_name: String,
    pub social_network_id: i64,
    pub network_name: String,
    pub page_name: String,
    pub page_url: String,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct PageFieldValueRow {
    pub field_id: i64,
    pub field_name: String,
    pub field_label: String,
    pub field_value: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SocialPageDetail {
    #[serde(flatten)]
    pub page: SocialPageRow,
    pub initial_values: Vec<PageFieldValueRow>,
}

#[derive(Debug, Clone)]
pub struct NewSocialPage<'a> {
    pub company_id: i64,
    pub social_network_id: i64,
    pub page_name: &'a str,
    pub page_url: &'a str,
    pub start_date: NaiveDate,
    /// Initial (baseline) values keyed by field id.
    pub initial_values: &'a HashMap<i64, String>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct PageKpiRow {
    pub id: i64,
    pub page_id: i64,
    pub field_id: i64,
    pub field_name: String,
    pub kpi_model_id: i64,
    pub model_name: String,
    pub model_type: String,
    pub related_field_id: Option<i64>,
    pub growth_value: Option<Decimal>,
    pub growth_kind: String,
    pub growth_period_days: Option<i32>,
    pub percentage_value: Option<Decimal>,
}

impl PageKpiRow {
    #[must_use]
    pub fn to_definition(&self) -> KpiDefinition {
        KpiDefinition {
            id: self.id,
            field_id: self.field_id,
            model_type: self.model_type.clone(),
            related_field_id: self.related_field_id,
            growth_value: self.growth_value,
            growth_kind: self.growth_kind.clone(),
            growth_period_days: self.growth_period_days,
            percentage_value: self.percentage_value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPageKpi {
    pub field_id: i64,
    pub kpi_model_id: i64,
    pub related_field_id: Option<i64>,
    pub growth_value: Option<Decimal>,
    pub growth_kind: String,
    pub growth_period_days: Option<i32>,
    pub percentage_value: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Networks, fields and models
// ---------------------------------------------------------------------------

/// Every network with its field definitions in display order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_networks_with_fields(pool: &PgPool) -> Result<Vec<NetworkWithFields>, DbError> {
    let networks = sqlx::query_as::<_, SocialNetworkRow>(
        "SELECT id, name, icon FROM social_networks ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let fields = sqlx::query_as::<_, FieldRow>(
        "SELECT id, social_network_id, field_name, field_label, field_type, \
                is_required, is_kpi, sort_order \
         FROM social_network_fields \
         ORDER BY social_network_id, sort_order, id",
    )
    .fetch_all(pool)
    .await?;

    let mut by_network: HashMap<i64, Vec<FieldRow>> = HashMap::new();
    for field in fields {
        by_network
            .entry(field.social_network_id)
            .or_default()
            .push(field);
    }

    Ok(networks
        .into_iter()
        .map(|network| NetworkWithFields {
            fields: by_network.remove(&network.id).unwrap_or_default(),
            network,
        })
        .collect())
}

/// Field definitions of one network in display order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_network_fields(
    pool: &PgPool,
    social_network_id: i64,
) -> Result<Vec<FieldRow>, DbError> {
    let rows = sqlx::query_as::<_, FieldRow>(
        "SELECT id, social_network_id, field_name, field_label, field_type, \
                is_required, is_kpi, sort_order \
         FROM social_network_fields \
         WHERE social_network_id = $1 \
         ORDER BY sort_order, id",
    )
    .bind(social_network_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on failure; a duplicate field name within the
/// network is a unique violation.
pub async fn create_network_field(
    pool: &PgPool,
    social_network_id: i64,
    field: &NewField<'_>,
) -> Result<FieldRow, DbError> {
    let row = sqlx::query_as::<_, FieldRow>(
        "INSERT INTO social_network_fields \
         (social_network_id, field_name, field_label, field_type, is_required, is_kpi, sort_order) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id, social_network_id, field_name, field_label, field_type, \
                   is_required, is_kpi, sort_order",
    )
    .bind(social_network_id)
    .bind(field.field_name)
    .bind(field.field_label)
    .bind(field.field_type)
    .bind(field.is_required)
    .bind(field.is_kpi)
    .bind(field.sort_order)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_kpi_models(pool: &PgPool) -> Result<Vec<KpiModelRow>, DbError> {
    let rows = sqlx::query_as::<_, KpiModelRow>(
        "SELECT id, name, description, model_type FROM kpi_models ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

const PAGE_COLUMNS: &str = "sp.id, sp.company_id, c.name AS company_name, sp.social_network_id, \
     sn.name AS network_name, sp.page_name, sp.page_url, sp.start_date";

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_company_pages(
    pool: &PgPool,
    company_id: i64,
) -> Result<Vec<SocialPageRow>, DbError> {
    let rows = sqlx::query_as::<_, SocialPageRow>(&format!(
        "SELECT {PAGE_COLUMNS} \
         FROM social_pages sp \
         JOIN companies c ON c.id = sp.company_id \
         JOIN social_networks sn ON sn.id = sp.social_network_id \
         WHERE sp.company_id = $1 \
         ORDER BY sp.page_name, sp.id"
    ))
    .bind(company_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the page does not exist.
pub async fn get_page(pool: &PgPool, id: i64) -> Result<SocialPageRow, DbError> {
    sqlx::query_as::<_, SocialPageRow>(&format!(
        "SELECT {PAGE_COLUMNS} \
         FROM social_pages sp \
         JOIN companies c ON c.id = sp.company_id \
         JOIN social_networks sn ON sn.id = sp.social_network_id \
         WHERE sp.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// The page with its initial field values.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the page does not exist.
pub async fn get_page_detail(pool: &PgPool, id: i64) -> Result<SocialPageDetail, DbError> {
    let page = get_page(pool, id).await?;
    let initial_values = sqlx::query_as::<_, PageFieldValueRow>(
        "SELECT f.id AS field_id, f.field_name, f.field_label, spf.field_value \
         FROM social_network_fields f \
         LEFT JOIN social_page_fields spf ON spf.field_id = f.id AND spf.page_id = $1 \
         WHERE f.social_network_id = $2 \
         ORDER BY f.sort_order, f.id",
    )
    .bind(id)
    .bind(page.social_network_id)
    .fetch_all(pool)
    .await?;
    Ok(SocialPageDetail {
        page,
        initial_values,
    })
}

/// Register a page and store its initial field values in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Validation`] when a value targets a field of another
/// network, or [`DbError::Sqlx`] on failure.
pub async fn create_page(pool: &PgPool, new: &NewSocialPage<'_>) -> Result<i64, DbError> {
    let fields = list_network_fields(pool, new.social_network_id).await?;
    if let Some(field_id) = new
        .initial_values
        .keys()
        .find(|id| !fields.iter().any(|f| f.id == **id))
    {
        return Err(ValidationError::new(
            "initial_values",
            format!("field {field_id} does not belong to this network"),
        )
        .into());
    }

    let mut tx = pool.begin().await?;

    let page_id: i64 = sqlx::query_scalar(
        "INSERT INTO social_pages (company_id, social_network_id, page_name, page_url, start_date) \
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(new.company_id)
    .bind(new.social_network_id)
    .bind(new.page_name)
    .bind(new.page_url)
    .bind(new.start_date)
    .fetch_one(&mut *tx)
    .await?;

    for (field_id, value) in new.initial_values {
        sqlx::query(
            "INSERT INTO social_page_fields (page_id, field_id, field_value) VALUES ($1, $2, $3)",
        )
        .bind(page_id)
        .bind(field_id)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(page_id)
}

/// Initial field values of a page keyed by field id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_baselines(pool: &PgPool, page_id: i64) -> Result<HashMap<i64, String>, DbError> {
    let rows = sqlx::query_as::<_, (i64, Option<String>)>(
        "SELECT field_id, field_value FROM social_page_fields WHERE page_id = $1",
    )
    .bind(page_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, value)| value.map(|v| (id, v)))
        .collect())
}

// ---------------------------------------------------------------------------
// Page KPIs
// ---------------------------------------------------------------------------

/// KPIs attached to a page, ordered by field display order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_page_kpis(pool: &PgPool, page_id: i64) -> Result<Vec<PageKpiRow>, DbError> {
    let rows = sqlx::query_as::<_, PageKpiRow>(
        "SELECT k.id, k.page_id, k.field_id, f.field_name, k.kpi_model_id, \
                m.name AS model_name, m.model_type, k.related_field_id, k.growth_value, \
                k.growth_kind, k.growth_period_days, k.percentage_value \
         FROM page_kpis k \
         JOIN social_network_fields f ON f.id = k.field_id \
         JOIN kpi_models m ON m.id = k.kpi_model_id \
         WHERE k.page_id = $1 \
         ORDER BY f.sort_order, k.id",
    )
    .bind(page_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Attach a KPI to a page field after checking that the fields belong to the
/// page's network and that exactly the model's own parameters are set.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown page, [`DbError::Validation`]
/// for invalid references or parameters, or [`DbError::Sqlx`] on failure.
pub async fn create_page_kpi(
    pool: &PgPool,
    page_id: i64,
    new: &NewPageKpi,
) -> Result<i64, DbError> {
    let page = get_page(pool, page_id).await?;
    let fields = list_network_fields(pool, page.social_network_id).await?;
    let belongs = |id: i64| fields.iter().any(|f| f.id == id);

    if !belongs(new.field_id) {
        return Err(ValidationError::new(
            "field_id",
            "field does not belong to the page's network",
        )
        .into());
    }
    if let Some(related) = new.related_field_id {
        if !belongs(related) {
            return Err(ValidationError::new(
                "related_field_id",
                "related field does not belong to the page's network",
            )
            .into());
        }
        if related == new.field_id {
            return Err(ValidationError::new(
                "related_field_id",
                "related field must differ from the scored field",
            )
            .into());
        }
    }

    let model_type: String = sqlx::query_scalar("SELECT model_type FROM kpi_models WHERE id = $1")
        .bind(new.kpi_model_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ValidationError::new("kpi_model_id", "unknown KPI model"))?;

    let definition = KpiDefinition {
        id: 0,
        field_id: new.field_id,
        model_type,
        related_field_id: new.related_field_id,
        growth_value: new.growth_value,
        growth_kind: new.growth_kind.clone(),
        growth_period_days: new.growth_period_days,
        percentage_value: new.percentage_value,
    };
    definition
        .strict_model()
        .map_err(|e| ValidationError::new("kpi", e.to_string()))?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO page_kpis \
         (page_id, field_id, kpi_model_id, related_field_id, growth_value, growth_kind, \
          growth_period_days, percentage_value) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
    )
    .bind(page_id)
    .bind(new.field_id)
    .bind(new.kpi_model_id)
    .bind(new.related_field_id)
    .bind(new.growth_value)
    .bind(&new.growth_kind)
    .bind(new.growth_period_days)
    .bind(new.percentage_value)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Returns the page id of the deleted KPI.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the KPI does not exist.
pub async fn delete_page_kpi(pool: &PgPool, id: i64) -> Result<i64, DbError> {
    sqlx::query_scalar::<_, i64>("DELETE FROM page_kpis WHERE id = $1 RETURNING page_id")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Company owning the page a KPI belongs to.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the KPI does not exist.
pub async fn page_kpi_company(pool: &PgPool, id: i64) -> Result<i64, DbError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT sp.company_id FROM page_kpis k JOIN social_pages sp ON sp.id = k.page_id \
         WHERE k.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
