//! Coach evaluation reports: the report header, per-personnel evaluation rows
//! with their statistics snapshots, and links to supporting social reports.
//!
//! Multi-statement writes run in a single transaction; a failure in any
//! statement rolls back every change of that call.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use crewdesk_core::{CoachReportScope, DateRange, Pagination, ValidationError};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};

use crate::statistics::compute_statistics;
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CoachReportListRow {
    pub id: i64,
    pub report_date: NaiveDate,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub company_id: i64,
    pub company_name: String,
    pub coach_id: i64,
    pub coach_name: String,
    pub personnel_name: String,
    pub receiver_name: String,
    pub team_name: Option<String>,
    pub coach_score: Option<Decimal>,
}

/// A `coach_reports` row with the names it references.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CoachReportRow {
    pub id: i64,
    pub coach_id: i64,
    pub coach_name: String,
    pub personnel_id: i64,
    pub receiver_id: i64,
    pub receiver_name: String,
    pub company_id: i64,
    pub company_name: String,
    pub report_date: NaiveDate,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub team_name: Option<String>,
    pub general_comments: Option<String>,
    pub coach_comment: Option<String>,
    pub coach_score: Option<Decimal>,
    pub statistics_json: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl CoachReportRow {
    /// The evaluated range. Rows always satisfy `date_from <= date_to`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the stored range is reversed.
    pub fn range(&self) -> Result<DateRange, ValidationError> {
        DateRange::new(self.date_from, self.date_to)
    }
}

/// One evaluated personnel member of a coach report.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EvaluatedPersonnelRow {
    pub personnel_id: i64,
    pub full_name: String,
    pub coach_comment: Option<String>,
    pub coach_score: Option<Decimal>,
    pub statistics_json: Option<Value>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct LinkedSocialReportRow {
    pub id: i64,
    pub page_id: i64,
    pub page_name: String,
    pub report_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct PersonnelEvaluation {
    pub personnel_id: i64,
    pub coach_comment: Option<String>,
    pub coach_score: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct NewCoachReport {
    pub coach_id: i64,
    pub company_id: i64,
    pub receiver_id: i64,
    pub report_date: NaiveDate,
    pub range: DateRange,
    pub team_name: Option<String>,
    pub general_comments: Option<String>,
    /// At least one; the first is mirrored onto the report header.
    pub evaluations: Vec<PersonnelEvaluation>,
    pub social_report_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct CoachReportUpdate {
    pub team_name: Option<String>,
    pub general_comments: Option<String>,
    pub evaluations: Vec<PersonnelEvaluation>,
    pub social_report_ids: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn validate_score(field: &str, score: Option<Decimal>) -> Result<(), ValidationError> {
    match score {
        Some(s) if s < Decimal::ZERO || s > Decimal::TEN => Err(ValidationError::new(
            field,
            format!("score must be between 0 and 10, got {s}"),
        )),
        _ => Ok(()),
    }
}

fn validate_evaluations(evaluations: &[PersonnelEvaluation]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for evaluation in evaluations {
        validate_score("coach_score", evaluation.coach_score)?;
        if !seen.insert(evaluation.personnel_id) {
            return Err(ValidationError::new(
                "evaluations",
                format!("personnel {} is evaluated twice", evaluation.personnel_id),
            ));
        }
    }
    Ok(())
}

/// Every id in `ids` must be a social report of a page owned by `company_id`.
async fn check_social_reports(
    pool: &PgPool,
    company_id: i64,
    ids: &[i64],
) -> Result<Vec<i64>, DbError> {
    let unique: HashSet<i64> = ids.iter().copied().collect();
    let mut unique: Vec<i64> = unique.into_iter().collect();
    unique.sort_unstable();

    let matching: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM social_reports sr \
         JOIN social_pages sp ON sp.id = sr.page_id \
         WHERE sr.id = ANY($1) AND sp.company_id = $2",
    )
    .bind(&unique)
    .bind(company_id)
    .fetch_one(pool)
    .await?;

    if usize::try_from(matching).unwrap_or(0) != unique.len() {
        return Err(ValidationError::new(
            "social_report_ids",
            "every linked social report must belong to the report's company",
        )
        .into());
    }
    Ok(unique)
}

async fn replace_links(
    conn: &mut PgConnection,
    coach_report_id: i64,
    social_report_ids: &[i64],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM coach_report_social_reports WHERE coach_report_id = $1")
        .bind(coach_report_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "INSERT INTO coach_report_social_reports (coach_report_id, social_report_id) \
         SELECT $1, UNNEST($2::BIGINT[])",
    )
    .bind(coach_report_id)
    .bind(social_report_ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// A page of coach reports visible under `scope`, newest report date first,
/// plus the total visible count.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_coach_reports(
    pool: &PgPool,
    scope: &CoachReportScope,
    page: Pagination,
) -> Result<(Vec<CoachReportListRow>, i64), DbError> {
    let (all, company_ids, author_id) = match scope {
        CoachReportScope::All => (true, Vec::new(), None),
        CoachReportScope::Limited {
            company_ids,
            author_id,
        } => (false, company_ids.clone(), Some(*author_id)),
    };

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM coach_reports cr \
         WHERE $1 OR cr.company_id = ANY($2) OR cr.coach_id = $3",
    )
    .bind(all)
    .bind(&company_ids)
    .bind(author_id)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, CoachReportListRow>(
        "SELECT cr.id, cr.report_date, cr.date_from, cr.date_to, cr.company_id, \
                c.name AS company_name, cr.coach_id, coach.full_name AS coach_name, \
                p.full_name AS personnel_name, recv.full_name AS receiver_name, \
                cr.team_name, cr.coach_score \
         FROM coach_reports cr \
         JOIN companies c ON c.id = cr.company_id \
         JOIN personnel coach ON coach.id = cr.coach_id \
         JOIN personnel p ON p.id = cr.personnel_id \
         JOIN personnel recv ON recv.id = cr.receiver_id \
         WHERE $1 OR cr.company_id = ANY($2) OR cr.coach_id = $3 \
         ORDER BY cr.report_date DESC, cr.id DESC \
         LIMIT $4 OFFSET $5",
    )
    .bind(all)
    .bind(&company_ids)
    .bind(author_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((rows, total))
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the report does not exist.
pub async fn get_coach_report(pool: &PgPool, id: i64) -> Result<CoachReportRow, DbError> {
    sqlx::query_as::<_, CoachReportRow>(
        "SELECT cr.id, cr.coach_id, coach.full_name AS coach_name, cr.personnel_id, \
                cr.receiver_id, recv.full_name AS receiver_name, cr.company_id, \
                c.name AS company_name, cr.report_date, cr.date_from, cr.date_to, \
                cr.team_name, cr.general_comments, cr.coach_comment, cr.coach_score, \
                cr.statistics_json, cr.created_at \
         FROM coach_reports cr \
         JOIN companies c ON c.id = cr.company_id \
         JOIN personnel coach ON coach.id = cr.coach_id \
         JOIN personnel recv ON recv.id = cr.receiver_id \
         WHERE cr.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Evaluated personnel of a report, by name. Reports written before
/// per-personnel rows existed fall back to the single personnel, comment,
/// score and snapshot stored on the header.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_evaluated_personnel(
    pool: &PgPool,
    report: &CoachReportRow,
) -> Result<Vec<EvaluatedPersonnelRow>, DbError> {
    let rows = sqlx::query_as::<_, EvaluatedPersonnelRow>(
        "SELECT crp.personnel_id, p.full_name, crp.coach_comment, crp.coach_score, \
                crp.statistics_json \
         FROM coach_report_personnel crp \
         JOIN personnel p ON p.id = crp.personnel_id \
         WHERE crp.coach_report_id = $1 \
         ORDER BY p.full_name, crp.personnel_id",
    )
    .bind(report.id)
    .fetch_all(pool)
    .await?;

    if !rows.is_empty() {
        return Ok(rows);
    }

    let legacy = sqlx::query_as::<_, EvaluatedPersonnelRow>(
        "SELECT cr.personnel_id, p.full_name, cr.coach_comment, cr.coach_score, \
                cr.statistics_json \
         FROM coach_reports cr JOIN personnel p ON p.id = cr.personnel_id \
         WHERE cr.id = $1",
    )
    .bind(report.id)
    .fetch_all(pool)
    .await?;
    Ok(legacy)
}

/// Social reports linked to a coach report, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_linked_social_reports(
    pool: &PgPool,
    coach_report_id: i64,
) -> Result<Vec<LinkedSocialReportRow>, DbError> {
    let rows = sqlx::query_as::<_, LinkedSocialReportRow>(
        "SELECT sr.id, sr.page_id, sp.page_name, sr.report_date \
         FROM coach_report_social_reports l \
         JOIN social_reports sr ON sr.id = l.social_report_id \
         JOIN social_pages sp ON sp.id = sr.page_id \
         WHERE l.coach_report_id = $1 \
         ORDER BY sr.report_date, sr.id",
    )
    .bind(coach_report_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Author a coach report.
///
/// A statistics snapshot is computed for each evaluated personnel member
/// before the transaction starts; the header, evaluation rows and social
/// report links are then written atomically. Snapshots are never refreshed
/// afterwards.
///
/// # Errors
///
/// Returns [`DbError::Validation`] for an empty or duplicated evaluation
/// list, out-of-range scores, personnel outside the company, or social
/// reports of another company. Returns [`DbError::Sqlx`] on failure.
pub async fn create_coach_report(pool: &PgPool, new: &NewCoachReport) -> Result<i64, DbError> {
    let Some(primary) = new.evaluations.first() else {
        return Err(ValidationError::new("evaluations", "at least one personnel is required").into());
    };
    validate_evaluations(&new.evaluations)?;

    let evaluated: Vec<i64> = new.evaluations.iter().map(|e| e.personnel_id).collect();
    let members = crate::personnel::personnel_company_ids(pool, &evaluated).await?;
    let all_in_company = members.len() == evaluated.len()
        && members.iter().all(|(_, company)| *company == new.company_id);
    if !all_in_company {
        return Err(ValidationError::new(
            "evaluations",
            "every evaluated personnel must belong to the report's company",
        )
        .into());
    }
    let links = check_social_reports(pool, new.company_id, &new.social_report_ids).await?;

    let mut snapshots = Vec::with_capacity(new.evaluations.len());
    for evaluation in &new.evaluations {
        let stats = compute_statistics(pool, evaluation.personnel_id, new.range).await?;
        snapshots.push(serde_json::to_value(stats).map_err(|e| {
            ValidationError::new("statistics", format!("cannot encode snapshot: {e}"))
        })?);
    }

    let mut tx = pool.begin().await?;

    let report_id: i64 = sqlx::query_scalar(
        "INSERT INTO coach_reports \
         (coach_id, personnel_id, receiver_id, company_id, report_date, date_from, date_to, \
          team_name, general_comments, coach_comment, coach_score, statistics_json) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING id",
    )
    .bind(new.coach_id)
    .bind(primary.personnel_id)
    .bind(new.receiver_id)
    .bind(new.company_id)
    .bind(new.report_date)
    .bind(new.range.date_from())
    .bind(new.range.date_to())
    .bind(&new.team_name)
    .bind(&new.general_comments)
    .bind(&primary.coach_comment)
    .bind(primary.coach_score)
    .bind(&snapshots[0])
    .fetch_one(&mut *tx)
    .await?;

    for (evaluation, snapshot) in new.evaluations.iter().zip(&snapshots) {
        sqlx::query(
            "INSERT INTO coach_report_personnel \
             (coach_report_id, personnel_id, coach_comment, coach_score, statistics_json) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(report_id)
        .bind(evaluation.personnel_id)
        .bind(&evaluation.coach_comment)
        .bind(evaluation.coach_score)
        .bind(snapshot)
        .execute(&mut *tx)
        .await?;
    }

    replace_links(&mut *tx, report_id, &links).await?;

    tx.commit().await?;
    Ok(report_id)
}

/// Replace the editable parts of a report: team name, general comments,
/// per-personnel comments and scores, and social report links. The set of
/// evaluated personnel and their snapshots stay as authored.
///
/// Concurrent updates are not coordinated; the last commit wins.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the report does not exist,
/// [`DbError::Validation`] for out-of-range scores, personnel not evaluated
/// by this report, or foreign social reports.
pub async fn update_coach_report(
    pool: &PgPool,
    id: i64,
    update: &CoachReportUpdate,
) -> Result<(), DbError> {
    validate_evaluations(&update.evaluations)?;
    let report = get_coach_report(pool, id).await?;
    let links = check_social_reports(pool, report.company_id, &update.social_report_ids).await?;

    let mut evaluated: HashSet<i64> = sqlx::query_scalar::<_, i64>(
        "SELECT personnel_id FROM coach_report_personnel WHERE coach_report_id = $1",
    )
    .bind(id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();
    evaluated.insert(report.personnel_id);

    if let Some(stranger) = update
        .evaluations
        .iter()
        .find(|e| !evaluated.contains(&e.personnel_id))
    {
        return Err(ValidationError::new(
            "evaluations",
            format!(
                "personnel {} is not evaluated by this report",
                stranger.personnel_id
            ),
        )
        .into());
    }

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE coach_reports SET team_name = $1, general_comments = $2 WHERE id = $3")
        .bind(&update.team_name)
        .bind(&update.general_comments)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    for evaluation in &update.evaluations {
        sqlx::query(
            "UPDATE coach_report_personnel SET coach_comment = $1, coach_score = $2 \
             WHERE coach_report_id = $3 AND personnel_id = $4",
        )
        .bind(&evaluation.coach_comment)
        .bind(evaluation.coach_score)
        .bind(id)
        .bind(evaluation.personnel_id)
        .execute(&mut *tx)
        .await?;

        if evaluation.personnel_id == report.personnel_id {
            sqlx::query(
                "UPDATE coach_reports SET coach_comment = $1, coach_score = $2 WHERE id = $3",
            )
            .bind(&evaluation.coach_comment)
            .bind(evaluation.coach_score)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
    }

    replace_links(&mut *tx, id, &links).await?;

    tx.commit().await?;
    Ok(())
}

/// Delete a report with its social report links and evaluation rows in one
/// transaction. Either everything is removed or nothing is.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the report does not exist, or
/// [`DbError::Sqlx`] if any statement fails (the transaction is rolled back).
pub async fn delete_coach_report(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM coach_report_social_reports WHERE coach_report_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM coach_report_personnel WHERE coach_report_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM coach_reports WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(())
}
