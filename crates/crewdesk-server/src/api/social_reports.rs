//! Social performance reports and their KPI scores.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use crewdesk_core::{permissions, Action, Identity, Pagination, ResourceOwner};
use crewdesk_db::social_reports::{
    ExpectedPerformance, ScoredReport, SocialReportDetail, SocialReportRow,
};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{
    ensure, map_db_error, request_context, ApiError, ApiResponse, AppState, PageQuery, Paginated,
};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateSocialReportRequest {
    pub report_date: NaiveDate,
    /// Submitted values keyed by field id.
    pub values: HashMap<i64, String>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct ExpectedQuery {
    /// Defaults to today.
    pub date: Option<NaiveDate>,
}

async fn page_company(
    state: &AppState,
    req_id: &RequestId,
    page_id: i64,
) -> Result<i64, ApiError> {
    crewdesk_db::social::get_page(&state.pool, page_id)
        .await
        .map(|page| page.company_id)
        .map_err(|e| map_db_error(req_id.0.clone(), &e))
}

async fn report_company(state: &AppState, req_id: &RequestId, id: i64) -> Result<i64, ApiError> {
    crewdesk_db::social_reports::social_report_company(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))
}

pub(in crate::api) async fn list_page_reports(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(page_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Paginated<SocialReportRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let company_id = page_company(&state, &req_id, page_id).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::VIEW_SOCIAL_REPORTS),
        Some(&ResourceOwner::company(company_id)),
    )?;

    let page = Pagination::new(query.page, state.page_size);
    let (rows, total) = crewdesk_db::social_reports::list_page_reports(&state.pool, page_id, page)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(Paginated::new(rows, page, total), &req_id))
}

/// POST /api/v1/social-pages/{id}/reports: store values and score every KPI.
///
/// Fields whose KPI cannot be scored are reported in the evaluation; only
/// missing required values or foreign fields reject the request.
pub(in crate::api) async fn create_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(page_id): Path<i64>,
    Json(body): Json<CreateSocialReportRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ScoredReport>>), ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let company_id = page_company(&state, &req_id, page_id).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::ADD_SOCIAL_REPORT),
        Some(&ResourceOwner::company(company_id)),
    )?;

    let scored = crewdesk_db::social_reports::create_social_report(
        &state.pool,
        page_id,
        ctx.identity.personnel_id(),
        body.report_date,
        &body.values,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if scored.evaluation.has_misconfigured() {
        tracing::warn!(
            request_id = %req_id.0,
            page_id,
            report_id = scored.report_id,
            "report stored with misconfigured KPIs"
        );
    }
    tracing::info!(page_id, report_id = scored.report_id, "social report created");
    Ok((StatusCode::CREATED, ApiResponse::new(scored, &req_id)))
}

pub(in crate::api) async fn get_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SocialReportDetail>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let detail = crewdesk_db::social_reports::get_social_report(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    ensure(
        &ctx,
        Action::Permission(permissions::VIEW_SOCIAL_REPORTS),
        Some(&ResourceOwner::company(detail.company_id)),
    )?;
    Ok(ApiResponse::new(detail, &req_id))
}

/// POST /api/v1/social-reports/{id}/rescore: recompute scores against the
/// page's current KPI definitions.
pub(in crate::api) async fn rescore_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ScoredReport>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let company_id = report_company(&state, &req_id, id).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::EDIT_SOCIAL_REPORT),
        Some(&ResourceOwner::company(company_id)),
    )?;

    let scored = crewdesk_db::social_reports::rescore_social_report(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(scored, &req_id))
}

pub(in crate::api) async fn delete_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let company_id = report_company(&state, &req_id, id).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::DELETE_SOCIAL_REPORT),
        Some(&ResourceOwner::company(company_id)),
    )?;

    crewdesk_db::social_reports::delete_social_report(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(report_id = id, "social report deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/social-pages/{id}/expected?date=: what every KPI expects on
/// a date.
pub(in crate::api) async fn expected_performance(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(page_id): Path<i64>,
    Query(query): Query<ExpectedQuery>,
) -> Result<Json<ApiResponse<Vec<ExpectedPerformance>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let company_id = page_company(&state, &req_id, page_id).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::VIEW_EXPECTED_PERFORMANCE),
        Some(&ResourceOwner::company(company_id)),
    )?;

    let on = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let rows = crewdesk_db::social_reports::expected_performance(&state.pool, page_id, on)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use crate::api::social::fixtures::{page_body, seed_network};
    use crate::api::test_support::{call, seed_org, test_app, Caller};

    fn decimal(value: &Value) -> Decimal {
        value.as_str().expect("decimal string").parse().expect("decimal")
    }

    /// A scored page: followers baseline 1000 from 2024-01-01, +100 per 30 days.
    async fn scored_page(
        app: &axum::Router,
        company_id: i64,
        pool: &sqlx::PgPool,
    ) -> (i64, i64) {
        let (network_id, field_id, model_id) = seed_network(pool).await;
        let (status, page) = call(
            app.clone(),
            Method::POST,
            "/api/v1/social-pages",
            Some(&Caller::admin()),
            Some(page_body(company_id, network_id, field_id)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let page_id = page["data"]["id"].as_i64().expect("page id");

        let (status, _) = call(
            app.clone(),
            Method::POST,
            &format!("/api/v1/social-pages/{page_id}/kpis"),
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
        (page_id, field_id)
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn report_is_scored_on_creation(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let app = test_app(pool.clone());
        let (page_id, field_id) = scored_page(&app, org.company_id, &pool).await;

        let (status, json) = call(
            app.clone(),
            Method::POST,
            &format!("/api/v1/social-pages/{page_id}/reports"),
            Some(&org.ceo()),
            Some(json!({
                "report_date": "2024-03-02",
                "values": { field_id.to_string(): "150" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(decimal(&json["data"]["average_score"]), Decimal::new(75, 1));

        let uri = format!("/api/v1/social-reports/{}", json["data"]["report_id"]);
        let (status, detail) = call(app, Method::GET, &uri, Some(&org.ceo()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            decimal(&detail["data"]["scores"][0]["expected_value"]),
            Decimal::from(200)
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn missing_required_value_is_rejected(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let app = test_app(pool.clone());
        let (page_id, _) = scored_page(&app, org.company_id, &pool).await;

        let (status, json) = call(
            app,
            Method::POST,
            &format!("/api/v1/social-pages/{page_id}/reports"),
            Some(&org.ceo()),
            Some(json!({ "report_date": "2024-03-02", "values": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn expected_performance_follows_the_growth_model(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let app = test_app(pool.clone());
        let (page_id, _) = scored_page(&app, org.company_id, &pool).await;

        let (status, json) = call(
            app,
            Method::GET,
            &format!("/api/v1/social-pages/{page_id}/expected?date=2024-03-02"),
            Some(&org.ceo()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decimal(&json["data"][0]["expected_value"]), Decimal::from(200));
        assert_eq!(json["data"][0]["error"], Value::Null);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn staff_without_permission_cannot_delete(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let app = test_app(pool.clone());
        let (page_id, field_id) = scored_page(&app, org.company_id, &pool).await;
        let (_, created) = call(
            app.clone(),
            Method::POST,
            &format!("/api/v1/social-pages/{page_id}/reports"),
            Some(&org.ceo()),
            Some(json!({
                "report_date": "2024-03-02",
                "values": { field_id.to_string(): "150" }
            })),
        )
        .await;
        let uri = format!("/api/v1/social-reports/{}", created["data"]["report_id"]);

        let (status, _) = call(app.clone(), Method::DELETE, &uri, Some(&org.staff()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(app.clone(), Method::DELETE, &uri, Some(&org.ceo()), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(app, Method::GET, &uri, Some(&org.ceo()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
