mod categories;
mod coach_reports;
mod daily_reports;
mod dashboard;
mod organization;
mod social;
mod social_reports;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use crewdesk_core::{
    authorize, AccessError, Action, Capabilities, Identity, Pagination, RequestContext,
    ResourceOwner,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    request_id, require_bearer_auth, require_identity, AuthState, RequestId, REQUEST_ID_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Rows per page on paginated list endpoints.
    pub page_size: u32,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

/// One page of a list endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl<T: Serialize> Paginated<T> {
    pub(crate) fn new(items: Vec<T>, pagination: Pagination, total: i64) -> Self {
        Self {
            items,
            page: pagination.page,
            per_page: pagination.per_page,
            total,
            total_pages: pagination.total_pages(total),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageQuery {
    pub page: Option<u32>,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn new(data: T, request_id: &RequestId) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id.0.clone()),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl ApiError {
    /// HTTP status for the error code; unknown codes are server errors.
    fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "validation_error" | "bad_request" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &crewdesk_db::DbError) -> ApiError {
    match error {
        crewdesk_db::DbError::NotFound => ApiError::new(request_id, "not_found", "record not found"),
        crewdesk_db::DbError::Validation(e) => {
            ApiError::new(request_id, "validation_error", e.to_string())
        }
        e if e.is_unique_violation() => {
            ApiError::new(request_id, "conflict", "a record with those values already exists")
        }
        e => {
            tracing::error!(request_id = %request_id, error = %e, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

pub(super) fn map_access_error(request_id: &str, error: &AccessError) -> ApiError {
    tracing::warn!(request_id, error = %error, "request denied");
    ApiError::new(request_id, "forbidden", error.to_string())
}

pub(super) fn validation_error(request_id: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(request_id, "validation_error", message)
}

/// Build the per-request context. Personnel capabilities are loaded fresh on
/// every request; a caller that is unknown, inactive, or claims another
/// company is rejected.
pub(super) async fn request_context(
    state: &AppState,
    req_id: &RequestId,
    identity: Identity,
) -> Result<RequestContext, ApiError> {
    let capabilities = match (identity.personnel_id(), identity.company_id) {
        (None, _) => Capabilities::default(),
        (Some(personnel_id), Some(company_id)) => {
            crewdesk_db::access::load_capabilities(&state.pool, personnel_id, company_id)
                .await
                .map_err(|e| map_db_error(req_id.0.clone(), &e))?
                .ok_or_else(|| {
                    ApiError::new(
                        &req_id.0,
                        "unauthorized",
                        "caller is not an active member of the company",
                    )
                })?
        }
        (Some(_), None) => {
            return Err(ApiError::new(
                &req_id.0,
                "unauthorized",
                "personnel identity requires a company",
            ))
        }
    };

    Ok(RequestContext {
        request_id: req_id.0.clone(),
        identity,
        capabilities,
    })
}

/// Run the capability check for `ctx`, mapping a denial to `forbidden`.
pub(super) fn ensure(
    ctx: &RequestContext,
    action: Action<'_>,
    owner: Option<&ResourceOwner>,
) -> Result<(), ApiError> {
    authorize(&ctx.identity, &ctx.capabilities, action, owner)
        .map_err(|e| map_access_error(&ctx.request_id, &e))
}

/// The company a personnel caller is scoped to, or `None` for admins.
pub(super) fn scoped_company(ctx: &RequestContext) -> Option<i64> {
    if ctx.identity.is_admin() {
        None
    } else {
        ctx.identity.company_id
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderName::from_static("x-user-type"),
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-company-id"),
        ])
}

fn protected_router(auth: AuthState) -> Router<AppState> {
    Router::new()
        // Organization
        .route(
            "/api/v1/companies",
            get(organization::list_companies).post(organization::create_company),
        )
        .route(
            "/api/v1/companies/{id}/toggle",
            post(organization::toggle_company),
        )
        .route(
            "/api/v1/roles",
            get(organization::list_roles).post(organization::create_role),
        )
        .route(
            "/api/v1/roles/{id}/permissions",
            put(organization::replace_role_permissions),
        )
        .route("/api/v1/permissions", get(organization::list_permissions))
        .route(
            "/api/v1/companies/{id}/personnel",
            get(organization::list_company_personnel),
        )
        .route("/api/v1/personnel", post(organization::create_personnel))
        .route(
            "/api/v1/personnel/{id}/toggle",
            post(organization::toggle_personnel),
        )
        .route(
            "/api/v1/companies/{id}/receivers",
            get(organization::list_receivers),
        )
        // Categories and daily reports
        .route(
            "/api/v1/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/api/v1/categories/{id}",
            axum::routing::delete(categories::delete_category),
        )
        .route(
            "/api/v1/reports",
            get(daily_reports::list_reports).post(daily_reports::create_report),
        )
        .route(
            "/api/v1/reports/{id}",
            get(daily_reports::get_report).delete(daily_reports::delete_report),
        )
        .route("/api/v1/dashboard", get(dashboard::get_dashboard))
        // Social networks, pages and KPIs
        .route("/api/v1/social-networks", get(social::list_networks))
        .route(
            "/api/v1/social-networks/{id}/fields",
            post(social::create_network_field),
        )
        .route("/api/v1/kpi-models", get(social::list_kpi_models))
        .route(
            "/api/v1/companies/{id}/social-pages",
            get(social::list_company_pages),
        )
        .route("/api/v1/social-pages", post(social::create_page))
        .route("/api/v1/social-pages/{id}", get(social::get_page))
        .route(
            "/api/v1/social-pages/{id}/kpis",
            get(social::list_page_kpis).post(social::create_page_kpi),
        )
        .route(
            "/api/v1/page-kpis/{id}",
            axum::routing::delete(social::delete_page_kpi),
        )
        // Social reports
        .route(
            "/api/v1/social-pages/{id}/reports",
            get(social_reports::list_page_reports).post(social_reports::create_report),
        )
        .route(
            "/api/v1/social-pages/{id}/expected",
            get(social_reports::expected_performance),
        )
        .route(
            "/api/v1/social-reports/{id}",
            get(social_reports::get_report).delete(social_reports::delete_report),
        )
        .route(
            "/api/v1/social-reports/{id}/rescore",
            post(social_reports::rescore_report),
        )
        // Coach reports
        .route(
            "/api/v1/coach-reports",
            get(coach_reports::list_coach_reports).post(coach_reports::create_coach_report),
        )
        .route(
            "/api/v1/coach-reports/{id}",
            get(coach_reports::get_coach_report)
                .put(coach_reports::update_coach_report)
                .delete(coach_reports::delete_coach_report),
        )
        .route(
            "/api/v1/companies/{id}/coach-report-access",
            get(coach_reports::list_access_grants),
        )
        .route(
            "/api/v1/companies/{id}/coach-report-access/{personnel_id}",
            put(coach_reports::upsert_access_grant).delete(coach_reports::delete_access_grant),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                ))
                .layer(axum::middleware::from_fn(require_identity)),
        )
}

pub fn build_app(state: AppState, auth: AuthState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let (status, data) = match crewdesk_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            HealthData {
                status: "ok",
                database: "ok",
            },
        ),
        Err(e) => {
            tracing::warn!(request_id = %req_id.0, error = %e, "database unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                HealthData {
                    status: "degraded",
                    database: "unavailable",
                },
            )
        }
    };
    (status, ApiResponse::new(data, &req_id))
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod tests {
    use super::test_support::{call, seed_org, test_app};
    use super::*;
    use axum::http::Method;

    #[test]
    fn error_codes_map_to_statuses() {
        let cases = [
            ("validation_error", StatusCode::BAD_REQUEST),
            ("unauthorized", StatusCode::UNAUTHORIZED),
            ("forbidden", StatusCode::FORBIDDEN),
            ("not_found", StatusCode::NOT_FOUND),
            ("conflict", StatusCode::CONFLICT),
            ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (code, expected) in cases {
            let response = ApiError::new("req-1", code, "msg").into_response();
            assert_eq!(response.status(), expected, "code {code}");
        }
    }

    #[test]
    fn db_not_found_maps_to_not_found_code() {
        let err = map_db_error("req-1".to_string(), &crewdesk_db::DbError::NotFound);
        assert_eq!(err.error.code, "not_found");
    }

    #[test]
    fn paginated_reports_total_pages() {
        let page = Paginated::new(vec![1, 2], Pagination::new(Some(2), 10), 21);
        let json = serde_json::to_value(&page).expect("serialize");
        assert_eq!(json["total_pages"], 3);
        assert_eq!(json["page"], 2);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn health_is_public(pool: sqlx::PgPool) {
        let (status, json) = call(test_app(pool), Method::GET, "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "ok");
        assert!(json["meta"]["request_id"].is_string());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn protected_route_requires_identity(pool: sqlx::PgPool) {
        let (status, json) = call(test_app(pool), Method::GET, "/api/v1/categories", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "unauthorized");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn inactive_personnel_is_unauthorized(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        sqlx::query("UPDATE personnel SET is_active = false WHERE id = $1")
            .bind(org.staff_id)
            .execute(&pool)
            .await
            .expect("deactivate");

        let (status, _) = call(
            test_app(pool),
            Method::GET,
            "/api/v1/categories",
            Some(&org.staff()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
