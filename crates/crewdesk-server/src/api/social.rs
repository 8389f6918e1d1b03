//! Social networks, tracked pages and their KPI definitions.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use crewdesk_core::{kpi::GrowthKind, permissions, Action, Identity, ResourceOwner};
use crewdesk_db::social::{
    FieldRow, KpiModelRow, NetworkWithFields, NewField, NewPageKpi, NewSocialPage, PageKpiRow,
    SocialPageDetail, SocialPageRow,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    ensure, map_db_error, request_context, validation_error, ApiError, ApiResponse, AppState,
};

const FIELD_TYPES: [&str; 4] = ["text", "number", "date", "url"];

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateFieldRequest {
    pub field_name: String,
    pub field_label: String,
    pub field_type: String,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_kpi: bool,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreatePageRequest {
    pub company_id: i64,
    pub social_network_id: i64,
    pub page_name: String,
    pub page_url: String,
    pub start_date: NaiveDate,
    /// Baseline values keyed by field id.
    #[serde(default)]
    pub initial_values: HashMap<i64, String>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreatePageKpiRequest {
    pub field_id: i64,
    pub kpi_model_id: i64,
    pub related_field_id: Option<i64>,
    pub growth_value: Option<Decimal>,
    #[serde(default)]
    pub growth_kind: GrowthKind,
    pub growth_period_days: Option<i32>,
    pub percentage_value: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct CreatedId {
    pub id: i64,
}

async fn page_owner(
    state: &AppState,
    req_id: &RequestId,
    page_id: i64,
) -> Result<SocialPageRow, ApiError> {
    crewdesk_db::social::get_page(&state.pool, page_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))
}

// ---------------------------------------------------------------------------
// Networks, fields and models
// ---------------------------------------------------------------------------

pub(in crate::api) async fn list_networks(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<NetworkWithFields>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::VIEW_SOCIAL_NETWORKS), None)?;

    let rows = crewdesk_db::social::list_networks_with_fields(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

pub(in crate::api) async fn create_network_field(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(network_id): Path<i64>,
    Json(body): Json<CreateFieldRequest>,
) -> Result<(StatusCode, Json<ApiResponse<FieldRow>>), ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::ADD_SOCIAL_FIELD), None)?;
    let rid = &req_id.0;

    let field_name = body.field_name.trim();
    let field_label = body.field_label.trim();
    if field_name.is_empty() || field_label.is_empty() {
        return Err(validation_error(rid, "field_name and field_label are required"));
    }
    if !FIELD_TYPES.contains(&body.field_type.as_str()) {
        return Err(validation_error(
            rid,
            format!("field_type must be one of {}", FIELD_TYPES.join(", ")),
        ));
    }
    if body.is_kpi && body.field_type != "number" {
        return Err(validation_error(rid, "KPI fields must be of type 'number'"));
    }

    let networks = crewdesk_db::social::list_networks_with_fields(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !networks.iter().any(|n| n.network.id == network_id) {
        return Err(ApiError::new(rid.as_str(), "not_found", "social network not found"));
    }

    let field = NewField {
        field_name,
        field_label,
        field_type: &body.field_type,
        is_required: body.is_required,
        is_kpi: body.is_kpi,
        sort_order: body.sort_order,
    };
    let row = crewdesk_db::social::create_network_field(&state.pool, network_id, &field)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok((StatusCode::CREATED, ApiResponse::new(row, &req_id)))
}

pub(in crate::api) async fn list_kpi_models(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<KpiModelRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::VIEW_KPI_MODELS), None)?;

    let rows = crewdesk_db::social::list_kpi_models(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

pub(in crate::api) async fn list_company_pages(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(company_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<SocialPageRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::VIEW_SOCIAL_PAGES),
        Some(&ResourceOwner::company(company_id)),
    )?;

    let rows = crewdesk_db::social::list_company_pages(&state.pool, company_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

/// POST /api/v1/social-pages: register a page with its baseline values.
pub(in crate::api) async fn create_page(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreatePageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SocialPageDetail>>), ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::ADD_SOCIAL_PAGE),
        Some(&ResourceOwner::company(body.company_id)),
    )?;
    let rid = &req_id.0;

    let page_name = body.page_name.trim();
    let page_url = body.page_url.trim();
    if page_name.is_empty() || page_url.is_empty() {
        return Err(validation_error(rid, "page_name and page_url are required"));
    }

    let new = NewSocialPage {
        company_id: body.company_id,
        social_network_id: body.social_network_id,
        page_name,
        page_url,
        start_date: body.start_date,
        initial_values: &body.initial_values,
    };
    let id = crewdesk_db::social::create_page(&state.pool, &new)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let detail = crewdesk_db::social::get_page_detail(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(page_id = id, company_id = body.company_id, "social page created");
    Ok((StatusCode::CREATED, ApiResponse::new(detail, &req_id)))
}

pub(in crate::api) async fn get_page(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SocialPageDetail>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let detail = crewdesk_db::social::get_page_detail(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    ensure(
        &ctx,
        Action::Permission(permissions::VIEW_SOCIAL_PAGES),
        Some(&ResourceOwner::company(detail.page.company_id)),
    )?;
    Ok(ApiResponse::new(detail, &req_id))
}

// ---------------------------------------------------------------------------
// Page KPIs
// ---------------------------------------------------------------------------

pub(in crate::api) async fn list_page_kpis(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(page_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<PageKpiRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let page = page_owner(&state, &req_id, page_id).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::VIEW_PAGE_KPIS),
        Some(&ResourceOwner::company(page.company_id)),
    )?;

    let rows = crewdesk_db::social::list_page_kpis(&state.pool, page_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

pub(in crate::api) async fn create_page_kpi(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(page_id): Path<i64>,
    Json(body): Json<CreatePageKpiRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedId>>), ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let page = page_owner(&state, &req_id, page_id).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::ADD_PAGE_KPI),
        Some(&ResourceOwner::company(page.company_id)),
    )?;

    let new = NewPageKpi {
        field_id: body.field_id,
        kpi_model_id: body.kpi_model_id,
        related_field_id: body.related_field_id,
        growth_value: body.growth_value,
        growth_kind: body.growth_kind.as_str().to_owned(),
        growth_period_days: body.growth_period_days,
        percentage_value: body.percentage_value,
    };
    let id = crewdesk_db::social::create_page_kpi(&state.pool, page_id, &new)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(page_id, kpi_id = id, "page KPI created");
    Ok((StatusCode::CREATED, ApiResponse::new(CreatedId { id }, &req_id)))
}

pub(in crate::api) async fn delete_page_kpi(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let company_id = crewdesk_db::social::page_kpi_company(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    ensure(
        &ctx,
        Action::Permission(permissions::DELETE_PAGE_KPI),
        Some(&ResourceOwner::company(company_id)),
    )?;

    crewdesk_db::social::delete_page_kpi(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
pub(in crate::api) mod fixtures {
    use serde_json::json;

    /// Insert an Instagram-like network with a required numeric `followers`
    /// KPI field and a `growth_over_time` model. Returns `(network_id,
    /// field_id, model_id)`.
    pub(in crate::api) async fn seed_network(pool: &sqlx::PgPool) -> (i64, i64, i64) {
        let network_id: i64 = sqlx::query_scalar(
            "INSERT INTO social_networks (name, icon) VALUES ('Instagram', 'fab fa-instagram') \
             RETURNING id",
        )
        .fetch_one(pool)
        .await
        .expect("insert network");
        let field_id: i64 = sqlx::query_scalar(
            "INSERT INTO social_network_fields \
             (social_network_id, field_name, field_label, field_type, is_required, is_kpi) \
             VALUES ($1, 'followers', 'Followers', 'number', true, true) RETURNING id",
        )
        .bind(network_id)
        .fetch_one(pool)
        .await
        .expect("insert field");
        let model_id: i64 = sqlx::query_scalar(
            "INSERT INTO kpi_models (name, model_type) \
             VALUES ('Growth', 'growth_over_time') RETURNING id",
        )
        .fetch_one(pool)
        .await
        .expect("insert model");
        (network_id, field_id, model_id)
    }

    pub(in crate::api) fn page_body(
        company_id: i64,
        network_id: i64,
        field_id: i64,
    ) -> serde_json::Value {
        json!({
            "company_id": company_id,
            "social_network_id": network_id,
            "page_name": "acme.ig",
            "page_url": "https://instagram.com/acme",
            "start_date": "2024-01-01",
            "initial_values": { field_id.to_string(): "1000" }
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::fixtures::{page_body, seed_network};
    use crate::api::test_support::{call, seed_org, test_app, Caller};

    #[sqlx::test(migrations = "../../migrations")]
    async fn page_is_created_with_baseline_values(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let (network_id, field_id, _) = seed_network(&pool).await;

        let (status, json) = call(
            test_app(pool),
            Method::POST,
            "/api/v1/social-pages",
            Some(&Caller::admin()),
            Some(page_body(org.company_id, network_id, field_id)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["page_name"], "acme.ig");
        let values = json["data"]["initial_values"].as_array().expect("values");
        assert_eq!(values[0]["field_value"], "1000");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn growth_kpi_requires_a_positive_period(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let (network_id, field_id, model_id) = seed_network(&pool).await;
        let app = test_app(pool);
        let (_, page) = call(
            app.clone(),
            Method::POST,
            "/api/v1/social-pages",
            Some(&Caller::admin()),
            Some(page_body(org.company_id, network_id, field_id)),
        )
        .await;
        let uri = format!("/api/v1/social-pages/{}/kpis", page["data"]["id"]);

        let (status, _) = call(
            app.clone(),
            Method::POST,
            &uri,
            Some(&Caller::admin()),
            Some(json!({
                "field_id": field_id,
                "kpi_model_id": model_id,
                "growth_value": "100",
                "growth_period_days": 0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            app.clone(),
            Method::POST,
            &uri,
            Some(&Caller::admin()),
            Some(json!({
                "field_id": field_id,
                "kpi_model_id": model_id,
                "growth_value": "100",
                "growth_period_days": 30
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, json) = call(app, Method::GET, &uri, Some(&Caller::admin()), None).await;
        assert_eq!(json["data"][0]["growth_kind"], "absolute");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn kpi_field_must_be_numeric(pool: sqlx::PgPool) {
        let (network_id, _, _) = seed_network(&pool).await;
        let uri = format!("/api/v1/social-networks/{network_id}/fields");

        let (status, _) = call(
            test_app(pool),
            Method::POST,
            &uri,
            Some(&Caller::admin()),
            Some(json!({
                "field_name": "bio",
                "field_label": "Bio",
                "field_type": "text",
                "is_kpi": true
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn outsider_cannot_read_another_companys_page(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        crate::api::test_support::grant(&pool, org.staff_role_id, &["view_social_pages"]).await;
        let (network_id, field_id, _) = seed_network(&pool).await;
        let app = test_app(pool);
        let (_, page) = call(
            app.clone(),
            Method::POST,
            "/api/v1/social-pages",
            Some(&Caller::admin()),
            Some(page_body(org.company_id, network_id, field_id)),
        )
        .await;
        let uri = format!("/api/v1/social-pages/{}", page["data"]["id"]);

        let (status, _) = call(app.clone(), Method::GET, &uri, Some(&org.outsider()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(app, Method::GET, &uri, Some(&org.staff()), None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
