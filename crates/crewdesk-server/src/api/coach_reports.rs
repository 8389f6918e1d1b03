//! Coach evaluation reports and the per-company visibility grants that gate
//! them.
//!
//! Statistics shown on a report come from the snapshot stored when it was
//! authored; reports without one fall back to live aggregation. The linked
//! social report count is always live.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use crewdesk_core::{
    coach_report_scope, Action, DateRange, Identity, Pagination, RequestContext, ResourceOwner,
    Statistics,
};
use crewdesk_db::access::CoachReportGrantRow;
use crewdesk_db::coach_reports::{
    CoachReportListRow, CoachReportRow, CoachReportUpdate, LinkedSocialReportRow, NewCoachReport,
    PersonnelEvaluation,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    ensure, map_db_error, request_context, validation_error, ApiError, ApiResponse, AppState,
    PageQuery, Paginated,
};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(in crate::api) struct EvaluationRequest {
    pub personnel_id: i64,
    pub coach_comment: Option<String>,
    pub coach_score: Option<Decimal>,
}

impl From<EvaluationRequest> for PersonnelEvaluation {
    fn from(req: EvaluationRequest) -> Self {
        Self {
            personnel_id: req.personnel_id,
            coach_comment: non_blank(req.coach_comment),
            coach_score: req.coach_score,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateCoachReportRequest {
    pub company_id: i64,
    /// Required for administrators; personnel always author as themselves.
    pub coach_id: Option<i64>,
    pub receiver_id: i64,
    pub report_date: NaiveDate,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub team_name: Option<String>,
    pub general_comments: Option<String>,
    pub evaluations: Vec<EvaluationRequest>,
    #[serde(default)]
    pub social_report_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct UpdateCoachReportRequest {
    pub team_name: Option<String>,
    pub general_comments: Option<String>,
    #[serde(default)]
    pub evaluations: Vec<EvaluationRequest>,
    #[serde(default)]
    pub social_report_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct GrantRequest {
    #[serde(default = "default_can_view")]
    pub can_view: bool,
}

fn default_can_view() -> bool {
    true
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(in crate::api) struct EvaluatedPersonnel {
    pub personnel_id: i64,
    pub full_name: String,
    pub coach_comment: Option<String>,
    pub coach_score: Option<Decimal>,
    #[serde(flatten)]
    pub statistics: Statistics,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct CoachReportDetail {
    pub id: i64,
    pub company_id: i64,
    pub company_name: String,
    pub coach_id: i64,
    pub coach_name: String,
    pub receiver_id: i64,
    pub receiver_name: String,
    pub report_date: NaiveDate,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub range_days: i64,
    pub team_name: Option<String>,
    pub general_comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub personnel: Vec<EvaluatedPersonnel>,
    pub social_report_count: i64,
    pub linked_social_reports: Vec<LinkedSocialReportRow>,
    pub can_edit: bool,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn author_of(row: &CoachReportRow) -> ResourceOwner {
    ResourceOwner::authored(row.company_id, row.coach_id)
}

fn can_edit(ctx: &RequestContext, row: &CoachReportRow) -> bool {
    ctx.identity.is_admin() || ctx.identity.personnel_id() == Some(row.coach_id)
}

async fn load_report(
    state: &AppState,
    req_id: &RequestId,
    id: i64,
) -> Result<CoachReportRow, ApiError> {
    crewdesk_db::coach_reports::get_coach_report(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))
}

/// Assemble the full view of an already authorized report.
async fn build_detail(
    state: &AppState,
    req_id: &RequestId,
    row: CoachReportRow,
    can_edit: bool,
) -> Result<CoachReportDetail, ApiError> {
    let rid = &req_id.0;
    let range = row.range().map_err(|e| {
        tracing::error!(
            request_id = %rid,
            report_id = row.id,
            error = %e,
            "stored range is invalid"
        );
        ApiError::new(rid.as_str(), "internal_error", "internal server error")
    })?;

    let evaluated = crewdesk_db::coach_reports::list_evaluated_personnel(&state.pool, &row)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let mut personnel = Vec::with_capacity(evaluated.len());
    for member in evaluated {
        let statistics = crewdesk_db::statistics::resolve_statistics(
            &state.pool,
            member.statistics_json.as_ref(),
            member.personnel_id,
            range,
        )
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
        personnel.push(EvaluatedPersonnel {
            personnel_id: member.personnel_id,
            full_name: member.full_name,
            coach_comment: member.coach_comment,
            coach_score: member.coach_score,
            statistics,
        });
    }

    let social_report_count =
        crewdesk_db::statistics::social_report_count(&state.pool, row.company_id, range)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?;
    let linked_social_reports =
        crewdesk_db::coach_reports::list_linked_social_reports(&state.pool, row.id)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(CoachReportDetail {
        id: row.id,
        company_id: row.company_id,
        company_name: row.company_name,
        coach_id: row.coach_id,
        coach_name: row.coach_name,
        receiver_id: row.receiver_id,
        receiver_name: row.receiver_name,
        report_date: row.report_date,
        date_from: row.date_from,
        date_to: row.date_to,
        range_days: range.days_inclusive(),
        team_name: row.team_name,
        general_comments: row.general_comments,
        created_at: row.created_at,
        personnel,
        social_report_count,
        linked_social_reports,
        can_edit,
    })
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// GET /api/v1/coach-reports: reports of the granted companies plus the
/// caller's own, newest first.
pub(in crate::api) async fn list_coach_reports(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Paginated<CoachReportListRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::ListCoachReports, None)?;

    let scope = coach_report_scope(&ctx.identity, &ctx.capabilities);
    let page = Pagination::new(query.page, state.page_size);
    let (rows, total) = crewdesk_db::coach_reports::list_coach_reports(&state.pool, &scope, page)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(Paginated::new(rows, page, total), &req_id))
}

pub(in crate::api) async fn get_coach_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CoachReportDetail>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let row = load_report(&state, &req_id, id).await?;
    ensure(&ctx, Action::ViewCoachReport, Some(&author_of(&row)))?;

    let editable = can_edit(&ctx, &row);
    let detail = build_detail(&state, &req_id, row, editable).await?;
    Ok(ApiResponse::new(detail, &req_id))
}

/// POST /api/v1/coach-reports: author a report. Statistics for every
/// evaluated member are captured now and never refreshed.
pub(in crate::api) async fn create_coach_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateCoachReportRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CoachReportDetail>>), ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(
        &ctx,
        Action::CreateCoachReport,
        Some(&ResourceOwner::company(body.company_id)),
    )?;
    let rid = &req_id.0;

    let coach_id = match (ctx.identity.personnel_id(), body.coach_id) {
        (Some(own), None) => own,
        (Some(own), Some(requested)) if own == requested => own,
        (Some(_), Some(_)) => {
            return Err(validation_error(rid, "personnel may only author as themselves"))
        }
        (None, Some(requested)) => requested,
        (None, None) => return Err(validation_error(rid, "coach_id is required")),
    };
    let range = DateRange::new(body.date_from, body.date_to)
        .map_err(|e| validation_error(rid, e.to_string()))?;
    if body.evaluations.is_empty() {
        return Err(validation_error(rid, "at least one personnel must be evaluated"));
    }

    let new = NewCoachReport {
        coach_id,
        company_id: body.company_id,
        receiver_id: body.receiver_id,
        report_date: body.report_date,
        range,
        team_name: non_blank(body.team_name),
        general_comments: non_blank(body.general_comments),
        evaluations: body.evaluations.into_iter().map(Into::into).collect(),
        social_report_ids: body.social_report_ids,
    };
    let id = crewdesk_db::coach_reports::create_coach_report(&state.pool, &new)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    tracing::info!(
        report_id = id,
        company_id = new.company_id,
        coach_id,
        evaluated = new.evaluations.len(),
        "coach report created"
    );

    let row = load_report(&state, &req_id, id).await?;
    let detail = build_detail(&state, &req_id, row, true).await?;
    Ok((StatusCode::CREATED, ApiResponse::new(detail, &req_id)))
}

/// PUT /api/v1/coach-reports/{id}: author or administrator only. Stored
/// statistics snapshots are left untouched.
pub(in crate::api) async fn update_coach_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCoachReportRequest>,
) -> Result<Json<ApiResponse<CoachReportDetail>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let row = load_report(&state, &req_id, id).await?;
    ensure(&ctx, Action::EditCoachReport, Some(&author_of(&row)))?;

    let update = CoachReportUpdate {
        team_name: non_blank(body.team_name),
        general_comments: non_blank(body.general_comments),
        evaluations: body.evaluations.into_iter().map(Into::into).collect(),
        social_report_ids: body.social_report_ids,
    };
    crewdesk_db::coach_reports::update_coach_report(&state.pool, id, &update)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(report_id = id, "coach report updated");

    let row = load_report(&state, &req_id, id).await?;
    let detail = build_detail(&state, &req_id, row, true).await?;
    Ok(ApiResponse::new(detail, &req_id))
}

pub(in crate::api) async fn delete_coach_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    let row = load_report(&state, &req_id, id).await?;
    ensure(&ctx, Action::DeleteCoachReport, Some(&author_of(&row)))?;

    crewdesk_db::coach_reports::delete_coach_report(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(report_id = id, "coach report deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Visibility grants
// ---------------------------------------------------------------------------

pub(in crate::api) async fn list_access_grants(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(company_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<CoachReportGrantRow>>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::ManageCoachReportAccess, None)?;

    let rows = crewdesk_db::access::list_coach_report_grants(&state.pool, company_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(rows, &req_id))
}

pub(in crate::api) async fn upsert_access_grant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path((company_id, personnel_id)): Path<(i64, i64)>,
    Json(body): Json<GrantRequest>,
) -> Result<Json<ApiResponse<CoachReportGrantRow>>, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::ManageCoachReportAccess, None)?;

    let row = crewdesk_db::access::upsert_coach_report_grant(
        &state.pool,
        company_id,
        personnel_id,
        body.can_view,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    tracing::info!(company_id, personnel_id, can_view = body.can_view, "coach report grant saved");
    Ok(ApiResponse::new(row, &req_id))
}

pub(in crate::api) async fn delete_access_grant(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path((company_id, personnel_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(&state, &req_id, identity).await?;
    ensure(&ctx, Action::ManageCoachReportAccess, None)?;

    crewdesk_db::access::delete_coach_report_grant(&state.pool, company_id, personnel_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use crate::api::test_support::{
        call, grant, grant_coach_access, seed_org, test_app, Caller, Org,
    };

    fn report_body(org: &Org) -> Value {
        json!({
            "company_id": org.company_id,
            "receiver_id": org.ceo_id,
            "report_date": "2024-03-31",
            "date_from": "2024-03-01",
            "date_to": "2024-03-31",
            "team_name": "Field team",
            "evaluations": [
                { "personnel_id": org.staff_id, "coach_comment": "Steady", "coach_score": "8" }
            ]
        })
    }

    /// Staff role may author coach reports; the coach files one about staff.
    async fn authored_report(pool: &sqlx::PgPool, org: &Org) -> (axum::Router, String) {
        grant(pool, org.staff_role_id, &["add_coach_report", "add_daily_report"]).await;
        let app = test_app(pool.clone());

        let (status, _) = call(
            app.clone(),
            Method::POST,
            "/api/v1/reports",
            Some(&org.staff()),
            Some(json!({ "report_date": "2024-03-05", "items": [{ "content": "Calls" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = call(
            app.clone(),
            Method::POST,
            "/api/v1/coach-reports",
            Some(&org.coach()),
            Some(report_body(org)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        let uri = format!("/api/v1/coach-reports/{}", json["data"]["id"]);
        (app, uri)
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn author_sees_snapshot_statistics(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let (app, uri) = authored_report(&pool, &org).await;

        // Reports filed after authoring do not change the snapshot.
        let (status, _) = call(
            app.clone(),
            Method::POST,
            "/api/v1/reports",
            Some(&org.staff()),
            Some(json!({ "report_date": "2024-03-06", "items": [{ "content": "More" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = call(app, Method::GET, &uri, Some(&org.coach()), None).await;
        assert_eq!(status, StatusCode::OK);
        let data = &json["data"];
        assert_eq!(data["range_days"], 31);
        assert_eq!(data["can_edit"], true);
        assert_eq!(data["personnel"][0]["source"], "cached");
        assert_eq!(data["personnel"][0]["statistics"]["report_count"], 1);
        assert_eq!(data["social_report_count"], 0);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn non_author_without_grant_is_denied(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let (app, uri) = authored_report(&pool, &org).await;

        let (status, _) = call(app.clone(), Method::GET, &uri, Some(&org.outsider()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(app, Method::GET, &uri, Some(&org.ceo()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn granted_viewer_cannot_edit(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let (app, uri) = authored_report(&pool, &org).await;
        grant_coach_access(&pool, org.company_id, org.ceo_id).await;

        let (status, json) = call(app.clone(), Method::GET, &uri, Some(&org.ceo()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["can_edit"], false);

        let (status, _) = call(
            app.clone(),
            Method::PUT,
            &uri,
            Some(&org.ceo()),
            Some(json!({ "team_name": "Renamed" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(app, Method::DELETE, &uri, Some(&org.ceo()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn author_updates_and_deletes(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let (app, uri) = authored_report(&pool, &org).await;

        let (status, json) = call(
            app.clone(),
            Method::PUT,
            &uri,
            Some(&org.coach()),
            Some(json!({
                "team_name": "Renamed",
                "evaluations": [{ "personnel_id": org.staff_id, "coach_score": "9.5" }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["team_name"], "Renamed");
        assert_eq!(json["data"]["personnel"][0]["coach_score"], "9.5");

        let (status, _) = call(app.clone(), Method::DELETE, &uri, Some(&org.coach()), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(app, Method::GET, &uri, Some(&Caller::admin()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn out_of_range_score_is_rejected(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        grant(&pool, org.staff_role_id, &["add_coach_report"]).await;
        let mut body = report_body(&org);
        body["evaluations"][0]["coach_score"] = json!("11");

        let (status, json) = call(
            test_app(pool),
            Method::POST,
            "/api/v1/coach-reports",
            Some(&org.coach()),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn reversed_range_is_rejected(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        grant(&pool, org.staff_role_id, &["add_coach_report"]).await;
        let mut body = report_body(&org);
        body["date_from"] = json!("2024-04-01");

        let (status, _) = call(
            test_app(pool),
            Method::POST,
            "/api/v1/coach-reports",
            Some(&org.coach()),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn listing_requires_a_grant_and_is_scoped(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let (app, _) = authored_report(&pool, &org).await;

        let (status, _) =
            call(app.clone(), Method::GET, "/api/v1/coach-reports", Some(&org.staff()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        grant_coach_access(&pool, org.other_company_id, org.outsider_id).await;
        let (status, json) = call(
            app.clone(),
            Method::GET,
            "/api/v1/coach-reports",
            Some(&org.outsider()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["total"], 0);

        grant_coach_access(&pool, org.company_id, org.ceo_id).await;
        let (_, json) =
            call(app, Method::GET, "/api/v1/coach-reports", Some(&org.ceo()), None).await;
        assert_eq!(json["data"]["total"], 1);
        assert_eq!(json["data"]["items"][0]["team_name"], "Field team");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn only_admins_manage_grants(pool: sqlx::PgPool) {
        let org = seed_org(&pool).await;
        let app = test_app(pool);
        let uri = format!(
            "/api/v1/companies/{}/coach-report-access/{}",
            org.company_id, org.staff_id
        );

        let (status, _) = call(
            app.clone(),
            Method::PUT,
            &uri,
            Some(&org.ceo()),
            Some(json!({ "can_view": true })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = call(
            app.clone(),
            Method::PUT,
            &uri,
            Some(&Caller::admin()),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["can_view"], true);

        let list = format!("/api/v1/companies/{}/coach-report-access", org.company_id);
        let (_, json) = call(app.clone(), Method::GET, &list, Some(&Caller::admin()), None).await;
        assert_eq!(json["data"].as_array().map(Vec::len), Some(1));

        let (status, _) = call(app, Method::DELETE, &uri, Some(&Caller::admin()), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
