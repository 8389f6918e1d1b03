//! Daily activity reports.
//!
//! Personnel write their own reports. Reading other people's reports needs
//! `view_daily_reports` and stays inside the caller's company; deleting them
//! needs `delete_daily_report`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use crewdesk_core::{permissions, Action, Identity, Pagination, RequestContext, ResourceOwner};
use crewdesk_db::daily_reports::{NewReportItem, ReportDetail, ReportFilters, ReportSummaryRow};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    ensure, map_db_error, request_context, scoped_company, validation_error, ApiError,
    ApiResponse, AppState, Paginated,
};

const MAX_ITEMS: usize = 50;

#[derive(Debug, Deserialize)]
pub(in crate::api) struct ReportItemRequest {
    pub content: String,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateReportRequest {
    /// Required for admins; personnel always report for themselves.
    pub personnel_id: Option<i64>,
    pub report_date: NaiveDate,
    pub items: Vec<ReportItemRequest>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct ReportListQuery {
    pub personnel_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct CreatedReport {
    pub id: i64,
}

/// Whether the caller may act on a report authored by `author_id` in
/// `company_id` without holding `code`.
fn ensure_owner_or(
    ctx: &RequestContext,
    code: &str,
    author_id: i64,
    company_id: i64,
) -> Result<(), ApiError> {
    if ctx.identity.personnel_id() == Some(author_id) {
        return Ok(());
    }
    ensure(
        ctx,
        Action::Permission(code),
        Some(&ResourceOwner::company(company_id)),
    )
}

pub(in crate::api) async fn create_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedReport>>), ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::Permission(permissions::ADD_DAILY_REPORT), None)?;
    let rid = &req_id.0;

    let personnel_id = match (ctx.identity.personnel_id(), body.personnel_id) {
        (Some(own), None) => own,
        (Some(own), Some(requested)) if own == requested => own,
        (Some(_), Some(_)) => {
            return Err(validation_error(rid, "personnel may only report for themselves"))
        }
        (None, Some(requested)) => requested,
        (None, None) => return Err(validation_error(rid, "personnel_id is required")),
    };

    if body.items.is_empty() || body.items.len() > MAX_ITEMS {
        return Err(validation_error(
            rid,
            format!("a report needs 1-{MAX_ITEMS} items"),
        ));
    }
    let items: Vec<NewReportItem> = body
        .items
        .into_iter()
        .map(|item| NewReportItem {
            content: item.content.trim().to_owned(),
            category_ids: item.category_ids,
        })
        .collect();
    if items.iter().any(|i| i.content.is_empty()) {
        return Err(validation_error(rid, "item content must not be empty"));
    }

    let id = crewdesk_db::daily_reports::create_daily_report(
        &state.pool,
        personnel_id,
        body.report_date,
        &items,
    )
    .await
    .map_err(|e| {
        if e.is_unique_violation() {
            ApiError::new(
                rid.as_str(),
                "conflict",
                format!("a report for {} already exists", body.report_date),
            )
        } else {
            map_db_error(rid.clone(), &e)
        }
    })?;

    tracing::info!(report_id = id, personnel_id, "daily report created");
    Ok((StatusCode::CREATED, ApiResponse::new(CreatedReport { id }, &req_id)))
}

/// GET /api/v1/reports: newest first. Personnel without
/// `view_daily_reports` only ever see their own reports.
pub(in crate::api) async fn list_reports(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<ApiResponse<Paginated<ReportSummaryRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;

    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(validation_error(&req_id.0, "from must not be after to"));
        }
    }

    let mut filters = ReportFilters {
        personnel_id: query.personnel_id,
        company_id: scoped_company(&ctx),
        from: query.from,
        to: query.to,
    };
    if let Some(own) = ctx.identity.personnel_id() {
        if !ctx.capabilities.has_permission(permissions::VIEW_DAILY_REPORTS) {
            filters.personnel_id = Some(own);
        }
    }

    let page = Pagination::new(query.page, state.page_size);
    let (rows, total) = crewdesk_db::daily_reports::list_daily_reports(&state.pool, filters, page)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(Paginated::new(rows, page, total), &req_id))
}

pub(in crate::api) async fn get_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ReportDetail>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let detail = crewdesk_db::daily_reports::get_daily_report(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    ensure_owner_or(
        &ctx,
        permissions::VIEW_DAILY_REPORTS,
        detail.report.personnel_id,
        detail.report.company_id,
    )?;
    Ok(ApiResponse::new(detail, &req_id))
}

pub(in crate::api) async fn delete_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let detail = crewdesk_db::daily_reports::get_daily_report(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    ensure_owner_or(
        &ctx,
        permissions::DELETE_DAILY_REPORT,
        detail.report.personnel_id,
        detail.report.company_id,
    )?;

    crewdesk_db::daily_reports::delete_daily_report(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(report_id = id, "daily report deleted");
    Ok(StatusCode::NO_CONTENT)
}
