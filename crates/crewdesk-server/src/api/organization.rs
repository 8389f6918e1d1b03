//! Companies, roles, permissions and personnel.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use crewdesk_core::{permissions, Action, Identity, ResourceOwner};
use crewdesk_db::{
    companies::CompanyRow,
    personnel::{NewPersonnel, PersonnelRow, ReceiverRow},
    roles::{PermissionRow, RoleRow},
};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    ensure, map_db_error, request_context, scoped_company, validation_error, ApiError,
    ApiResponse, AppState,
};

const MAX_NAME_LEN: usize = 200;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateCompanyRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub is_ceo: bool,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct ReplacePermissionsRequest {
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreatePersonnelRequest {
    pub company_id: i64,
    pub role_id: i64,
    pub prefix: Option<String>,
    pub full_name: String,
    pub gender: String,
    pub email: String,
    pub mobile: String,
    pub username: String,
    #[serde(default)]
    pub can_receive_reports: bool,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct CreatedId {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct ToggledPersonnel {
    pub id: i64,
    pub is_active: bool,
}

fn require_name<'a>(req_id: &str, field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(validation_error(
            req_id,
            format!("{field} must be 1-{MAX_NAME_LEN} characters"),
        ));
    }
    Ok(trimmed)
}

// ---------------------------------------------------------------------------
// Companies
// ---------------------------------------------------------------------------

/// GET /api/v1/companies: admins see every company, personnel only their own.
pub(in crate::api) async fn list_companies(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<CompanyRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::VIEW_COMPANIES), None)?;

    let mut rows = crewdesk_db::companies::list_companies(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    if let Some(own) = scoped_company(&ctx) {
        rows.retain(|c| c.id == own);
    }
    Ok(ApiResponse::new(rows, &req_id))
}

pub(in crate::api) async fn create_company(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateCompanyRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CompanyRow>>), ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::ADD_COMPANY), None)?;
    let name = require_name(&req_id.0, "name", &body.name)?;

    let row = crewdesk_db::companies::create_company(&state.pool, name)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok((StatusCode::CREATED, ApiResponse::new(row, &req_id)))
}

pub(in crate::api) async fn toggle_company(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CompanyRow>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::TOGGLE_COMPANY),
        Some(&ResourceOwner::company(id)),
    )?;

    let row = crewdesk_db::companies::toggle_company(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(company_id = id, is_active = row.is_active, "company toggled");
    Ok(ApiResponse::new(row, &req_id))
}

// ---------------------------------------------------------------------------
// Roles and permissions
// ---------------------------------------------------------------------------

pub(in crate::api) async fn list_roles(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<RoleRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::VIEW_ROLES), None)?;

    let rows = crewdesk_db::roles::list_roles(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

pub(in crate::api) async fn create_role(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RoleRow>>), ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::ADD_ROLE), None)?;
    let name = require_name(&req_id.0, "name", &body.name)?;

    let row = crewdesk_db::roles::create_role(&state.pool, name, body.is_ceo)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok((StatusCode::CREATED, ApiResponse::new(row, &req_id)))
}

/// PUT /api/v1/roles/{id}/permissions: replace the role's permission set.
pub(in crate::api) async fn replace_role_permissions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<ReplacePermissionsRequest>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::MANAGE_PERMISSIONS), None)?;

    let codes = crewdesk_db::roles::replace_role_permissions(&state.pool, id, &body.permissions)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(role_id = id, count = codes.len(), "role permissions replaced");
    Ok(ApiResponse::new(codes, &req_id))
}

pub(in crate::api) async fn list_permissions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<PermissionRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::VIEW_ROLES), None)?;

    let rows = crewdesk_db::roles::list_permissions(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

// ---------------------------------------------------------------------------
// Personnel
// ---------------------------------------------------------------------------

pub(in crate::api) async fn list_company_personnel(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(company_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<PersonnelRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::VIEW_PERSONNEL),
        Some(&ResourceOwner::company(company_id)),
    )?;

    let rows = crewdesk_db::personnel::list_company_personnel(&state.pool, company_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

pub(in crate::api) async fn create_personnel(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreatePersonnelRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedId>>), ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(
        &ctx,
        Action::Permission(permissions::ADD_PERSONNEL),
        Some(&ResourceOwner::company(body.company_id)),
    )?;

    let rid = &req_id.0;
    let full_name = require_name(rid, "full_name", &body.full_name)?;
    let username = require_name(rid, "username", &body.username)?;
    if !matches!(body.gender.as_str(), "male" | "female") {
        return Err(validation_error(rid, "gender must be 'male' or 'female'"));
    }
    if !body.email.contains('@') {
        return Err(validation_error(rid, "email must be a valid address"));
    }
    if body.mobile.trim().is_empty() {
        return Err(validation_error(rid, "mobile is required"));
    }

    let new = NewPersonnel {
        company_id: body.company_id,
        role_id: body.role_id,
        prefix: body.prefix.as_deref().map(str::trim).filter(|p| !p.is_empty()),
        full_name,
        gender: &body.gender,
        email: body.email.trim(),
        mobile: body.mobile.trim(),
        username,
        can_receive_reports: body.can_receive_reports,
    };
    let id = crewdesk_db::personnel::create_personnel(&state.pool, &new)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    Ok((StatusCode::CREATED, ApiResponse::new(CreatedId { id }, &req_id)))
}

pub(in crate::api) async fn toggle_personnel(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ToggledPersonnel>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let target = crewdesk_db::personnel::get_personnel(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    ensure(
        &ctx,
        Action::Permission(permissions::TOGGLE_PERSONNEL),
        Some(&ResourceOwner::company(target.company_id)),
    )?;

    let is_active = crewdesk_db::personnel::toggle_personnel(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(ToggledPersonnel { id, is_active }, &req_id))
}

/// GET /api/v1/companies/{id}/receivers: candidate coach report receivers,
/// CEO-role holders first. Open to any identified caller.
pub(in crate::api) async fn list_receivers(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(company_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<ReceiverRow>>>, ApiError> {
    request_context(&state, &req_id, identity).await?;

    let rows = crewdesk_db::personnel::list_receivers(&state.pool, company_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::api::test_support::{call, grant, seed_org, test_app, Caller};

    #[sqlx::test(migrations = "../../migrations")]
    async fn admin_creates_company_and_duplicate_conflicts(pool: sqlx::PgPool) {
        let app = test_app(pool);
        let body = json!({ "name": "Initech" });

        let (status, json) = call(
            app.clone(),
            Method::POST,
            "/api/v1/companies",
            Some(&Caller::admin()),
            Some(body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["name"], "Initech");

        let (status, json) = call(
            app,
            Method::POST,
            "/api/v1/companies",
            Some(&Caller::admin()),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "conflict");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn personnel_without_permission_is_forbidden(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;

        let (status, json) = call(
            test_app(pool),
            Method::GET,
            "/api/v1/roles",
            Some(&org.staff()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "forbidden");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn personnel_see_only_their_company(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        grant(&pool, org.staff_role_id, &["view_companies", "view_personnel"]).await;
        let app = test_app(pool);

        let (status, json) =
            call(app.clone(), Method::GET, "/api/v1/companies", Some(&org.staff()), None).await;
        assert_eq!(status, StatusCode::OK);
        let companies = json["data"].as_array().expect("data array");
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0]["id"], org.company_id);

        let uri = format!("/api/v1/companies/{}/personnel", org.other_company_id);
        let (status, _) = call(app, Method::GET, &uri, Some(&org.staff()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn receivers_are_ceo_first(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let uri = format!("/api/v1/companies/{}/receivers", org.company_id);

        let (status, json) = call(test_app(pool), Method::GET, &uri, Some(&org.staff()), None).await;
        assert_eq!(status, StatusCode::OK);
        let receivers = json["data"].as_array().expect("data array");
        assert_eq!(receivers[0]["id"], org.ceo_id);
        assert_eq!(receivers[0]["is_ceo"], true);
        assert_eq!(receivers.len(), 3);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn unknown_permission_code_is_a_validation_error(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let uri = format!("/api/v1/roles/{}/permissions", org.staff_role_id);

        let (status, json) = call(
            test_app(pool),
            Method::PUT,
            &uri,
            Some(&Caller::admin()),
            Some(json!({ "permissions": ["view_companies", "launch_rockets"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_personnel_validates_gender(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;

        let (status, _) = call(
            test_app(pool),
            Method::POST,
            "/api/v1/personnel",
            Some(&Caller::admin()),
            Some(json!({
                "company_id": org.company_id,
                "role_id": org.staff_role_id,
                "full_name": "New Hire",
                "gender": "other",
                "email": "new@example.com",
                "mobile": "0912",
                "username": "new.hire"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
