use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use crewdesk_core::{permissions, Action, Identity, ResourceOwner};
use crewdesk_db::dashboard::{CompanyDashboard, PersonnelDashboard};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{ensure, map_db_error, request_context, validation_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct DashboardQuery {
    /// Company to summarize; admins only.
    pub company_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(in crate::api) enum Dashboard {
    Personnel(PersonnelDashboard),
    Company(CompanyDashboard),
}

/// GET /api/v1/dashboard: CEO-role holders and admins get the company
/// overview, everyone else their own activity.
pub(in crate::api) async fn get_dashboard(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<ApiResponse<Dashboard>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;

    let dashboard = match (ctx.identity.personnel_id(), ctx.identity.company_id) {
        (Some(_), Some(company_id)) if ctx.capabilities.is_ceo => {
            ensure(
                &ctx,
                Action::Permission(permissions::VIEW_DASHBOARD),
                Some(&ResourceOwner::company(company_id)),
            )?;
            crewdesk_db::dashboard::company_dashboard(&state.pool, company_id)
                .await
                .map(Dashboard::Company)
        }
        (Some(personnel_id), _) => {
            let today = Utc::now().date_naive();
            crewdesk_db::dashboard::personnel_dashboard(&state.pool, personnel_id, today)
                .await
                .map(Dashboard::Personnel)
        }
        (None, own_company) => {
            let company_id = query.company_id.or(own_company).ok_or_else(|| {
                validation_error(&req_id.0, "company_id is required for administrators")
            })?;
            crewdesk_db::dashboard::company_dashboard(&state.pool, company_id)
                .await
                .map(Dashboard::Company)
        }
    }
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(dashboard, &req_id))
}
