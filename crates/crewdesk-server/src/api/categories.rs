use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use crewdesk_core::{permissions, Action, Identity};
use crewdesk_db::categories::CategoryRow;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{ensure, map_db_error, request_context, validation_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateCategoryRequest {
    pub name: String,
}

/// GET /api/v1/categories: every category with its usage count. Open to any
/// identified caller since report authors pick from this list.
pub(in crate::api) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<CategoryRow>>>, ApiError> {
    request_context(&state, &req_id, identity).await?;

    let rows = crewdesk_db::categories::list_categories(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

pub(in crate::api) async fn create_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CategoryRow>>), ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::ADD_CATEGORY), None)?;

    let name = body.name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(validation_error(&req_id.0, "name must be 1-100 characters"));
    }

    let row = crewdesk_db::categories::create_category(&state.pool, name)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok((StatusCode::CREATED, ApiResponse::new(row, &req_id)))
}

pub(in crate::api) async fn delete_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::DELETE_CATEGORY), None)?;

    crewdesk_db::categories::delete_category(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(StatusCode::NO_CONTENT)
}
