//! Periodic social page reports: stored field values and the KPI scores
//! derived from them.

use std::collections::HashMap;

use chrono::NaiveDate;
use crewdesk_core::{
    evaluate_report, kpi, FieldOutcome, KpiDefinition, Pagination, ReportEvaluation, ReportInput,
    ValidationError,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use crate::social::{get_page, list_network_fields, list_page_kpis, load_baselines};
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct SocialReportRow {
    pub id: i64,
    pub page_id: i64,
    pub creator_id: Option<i64>,
    pub creator_name: Option<String>,
    pub report_date: NaiveDate,
    pub average_score: Option<Decimal>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ReportValueRow {
    pub field_id: i64,
    pub field_name: String,
    pub field_label: String,
    pub field_value: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ScoreRow {
    pub field_id: i64,
    pub field_name: String,
    pub expected_value: Decimal,
    pub actual_value: Decimal,
    pub score: Decimal,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SocialReportDetail {
    #[serde(flatten)]
    pub report: SocialReportRow,
    pub company_id: i64,
    pub values: Vec<ReportValueRow>,
    pub scores: Vec<ScoreRow>,
}

/// Result of storing or rescoring one report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoredReport {
    pub report_id: i64,
    pub report_date: NaiveDate,
    pub evaluation: ReportEvaluation,
    pub average_score: Option<Decimal>,
}

/// Expected value of one KPI on a date. Exactly one of `expected_value`,
/// `unavailable` and `error` is set.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExpectedPerformance {
    pub kpi_id: i64,
    pub field_id: i64,
    pub field_name: String,
    pub model_type: String,
    pub expected_value: Option<Decimal>,
    pub unavailable: Option<kpi::UnscoredReason>,
    pub error: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ReportKeyRow {
    page_id: i64,
    report_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Scoring helpers
// ---------------------------------------------------------------------------

struct PageScoring {
    start_date: NaiveDate,
    kpis: Vec<KpiDefinition>,
    baselines: HashMap<i64, String>,
}

impl PageScoring {
    async fn load(pool: &PgPool, page_id: i64, start_date: NaiveDate) -> Result<Self, DbError> {
        let kpis = list_page_kpis(pool, page_id)
            .await?
            .iter()
            .map(crate::social::PageKpiRow::to_definition)
            .collect();
        let baselines = load_baselines(pool, page_id).await?;
        Ok(Self {
            start_date,
            kpis,
            baselines,
        })
    }

    fn evaluate(
        &self,
        page_id: i64,
        report_date: NaiveDate,
        values: &HashMap<i64, String>,
    ) -> ReportEvaluation {
        let evaluation = evaluate_report(
            &self.kpis,
            &ReportInput {
                start_date: self.start_date,
                report_date,
                values,
                baselines: &self.baselines,
            },
        );
        for outcome in &evaluation.outcomes {
            if let FieldOutcome::Misconfigured {
                kpi_id,
                field_id,
                error,
            } = outcome
            {
                tracing::warn!(
                    page_id,
                    kpi_id,
                    field_id,
                    error = %error,
                    "KPI is misconfigured; field left unscored"
                );
            }
        }
        evaluation
    }
}

async fn insert_values(
    conn: &mut PgConnection,
    report_id: i64,
    values: &HashMap<i64, String>,
) -> Result<(), sqlx::Error> {
    for (field_id, value) in values {
        sqlx::query(
            "INSERT INTO social_report_values (report_id, field_id, field_value) \
             VALUES ($1, $2, $3)",
        )
        .bind(report_id)
        .bind(field_id)
        .bind(value)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn replace_scores(
    conn: &mut PgConnection,
    report_id: i64,
    evaluation: &ReportEvaluation,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM report_scores WHERE report_id = $1")
        .bind(report_id)
        .execute(&mut *conn)
        .await?;

    for score in evaluation.scores() {
        sqlx::query(
            "INSERT INTO report_scores (report_id, field_id, expected_value, actual_value, score) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (report_id, field_id) DO UPDATE SET \
                 expected_value = EXCLUDED.expected_value, \
                 actual_value = EXCLUDED.actual_value, \
                 score = EXCLUDED.score",
        )
        .bind(report_id)
        .bind(score.field_id)
        .bind(score.expected_value)
        .bind(score.actual_value)
        .bind(score.score)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_values(pool: &PgPool, report_id: i64) -> Result<HashMap<i64, String>, DbError> {
    let rows = sqlx::query_as::<_, (i64, Option<String>)>(
        "SELECT field_id, field_value FROM social_report_values WHERE report_id = $1",
    )
    .bind(report_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, value)| value.map(|v| (id, v)))
        .collect())
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Store a report's field values and its KPI scores in one transaction.
///
/// Every value must target a field of the page's network and every required
/// field must have a non-blank value. Fields whose values cannot be scored
/// are reported in the returned evaluation rather than failing the write.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown page, [`DbError::Validation`]
/// for missing or foreign fields, or [`DbError::Sqlx`] on failure.
pub async fn create_social_report(
    pool: &PgPool,
    page_id: i64,
    creator_id: Option<i64>,
    report_date: NaiveDate,
    values: &HashMap<i64, String>,
) -> Result<ScoredReport, DbError> {
    let page = get_page(pool, page_id).await?;
    let fields = list_network_fields(pool, page.social_network_id).await?;

    if let Some(field_id) = values.keys().find(|id| !fields.iter().any(|f| f.id == **id)) {
        return Err(ValidationError::new(
            "values",
            format!("field {field_id} does not belong to this page"),
        )
        .into());
    }
    if let Some(missing) = fields.iter().find(|f| {
        f.is_required && values.get(&f.id).is_none_or(|v| v.trim().is_empty())
    }) {
        return Err(ValidationError::new(
            "values",
            format!("required field '{}' is missing", missing.field_name),
        )
        .into());
    }

    let scoring = PageScoring::load(pool, page_id, page.start_date).await?;
    let evaluation = scoring.evaluate(page_id, report_date, values);

    let mut tx = pool.begin().await?;

    let report_id: i64 = sqlx::query_scalar(
        "INSERT INTO social_reports (page_id, creator_id, report_date) \
         VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(page_id)
    .bind(creator_id)
    .bind(report_date)
    .fetch_one(&mut *tx)
    .await?;

    insert_values(&mut tx, report_id, values).await?;
    replace_scores(&mut tx, report_id, &evaluation).await?;

    tx.commit().await?;

    Ok(ScoredReport {
        report_id,
        report_date,
        average_score: evaluation.average_score(),
        evaluation,
    })
}

/// Recompute and replace the scores of one report atomically.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the report does not exist.
pub async fn rescore_social_report(pool: &PgPool, report_id: i64) -> Result<ScoredReport, DbError> {
    let key = sqlx::query_as::<_, ReportKeyRow>(
        "SELECT page_id, report_date FROM social_reports WHERE id = $1",
    )
    .bind(report_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    let page = get_page(pool, key.page_id).await?;
    let scoring = PageScoring::load(pool, key.page_id, page.start_date).await?;
    let values = load_values(pool, report_id).await?;
    let evaluation = scoring.evaluate(key.page_id, key.report_date, &values);

    let mut tx = pool.begin().await?;
    replace_scores(&mut tx, report_id, &evaluation).await?;
    tx.commit().await?;

    Ok(ScoredReport {
        report_id,
        report_date: key.report_date,
        average_score: evaluation.average_score(),
        evaluation,
    })
}

/// Recompute the scores of every report of a page. With `dry_run` nothing is
/// written. All reports are replaced in one transaction.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown page, or [`DbError::Sqlx`].
pub async fn rescore_page(
    pool: &PgPool,
    page_id: i64,
    dry_run: bool,
) -> Result<Vec<ScoredReport>, DbError> {
    let page = get_page(pool, page_id).await?;
    let scoring = PageScoring::load(pool, page_id, page.start_date).await?;

    let reports = sqlx::query_as::<_, (i64, NaiveDate)>(
        "SELECT id, report_date FROM social_reports WHERE page_id = $1 ORDER BY report_date, id",
    )
    .bind(page_id)
    .fetch_all(pool)
    .await?;

    let mut scored = Vec::with_capacity(reports.len());
    for (report_id, report_date) in reports {
        let values = load_values(pool, report_id).await?;
        let evaluation = scoring.evaluate(page_id, report_date, &values);
        scored.push(ScoredReport {
            report_id,
            report_date,
            average_score: evaluation.average_score(),
            evaluation,
        });
    }

    if !dry_run {
        let mut tx = pool.begin().await?;
        for report in &scored {
            replace_scores(&mut tx, report.report_id, &report.evaluation).await?;
        }
        tx.commit().await?;
    }

    Ok(scored)
}

/// Delete a report, its values, scores and coach-report links atomically.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the report does not exist.
pub async fn delete_social_report(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    for statement in [
        "DELETE FROM coach_report_social_reports WHERE social_report_id = $1",
        "DELETE FROM report_scores WHERE report_id = $1",
        "DELETE FROM social_report_values WHERE report_id = $1",
    ] {
        sqlx::query(statement).bind(id).execute(&mut *tx).await?;
    }

    let result = sqlx::query("DELETE FROM social_reports WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

const REPORT_COLUMNS: &str = "sr.id, sr.page_id, sr.creator_id, p.full_name AS creator_name, \
     sr.report_date, \
     (SELECT ROUND(AVG(rs.score), 1) FROM report_scores rs WHERE rs.report_id = sr.id) \
         AS average_score";

/// A page of a social page's reports, newest first, plus the total count.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_page_reports(
    pool: &PgPool,
    page_id: i64,
    page: Pagination,
) -> Result<(Vec<SocialReportRow>, i64), DbError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM social_reports WHERE page_id = $1")
        .bind(page_id)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, SocialReportRow>(&format!(
        "SELECT {REPORT_COLUMNS} \
         FROM social_reports sr LEFT JOIN personnel p ON p.id = sr.creator_id \
         WHERE sr.page_id = $1 \
         ORDER BY sr.report_date DESC, sr.id DESC \
         LIMIT $2 OFFSET $3"
    ))
    .bind(page_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((rows, total))
}

/// A report with its values, scores and average score.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the report does not exist.
pub async fn get_social_report(pool: &PgPool, id: i64) -> Result<SocialReportDetail, DbError> {
    let report = sqlx::query_as::<_, SocialReportRow>(&format!(
        "SELECT {REPORT_COLUMNS} \
         FROM social_reports sr LEFT JOIN personnel p ON p.id = sr.creator_id \
         WHERE sr.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    let company_id = social_report_company(pool, id).await?;

    let values = sqlx::query_as::<_, ReportValueRow>(
        "SELECT f.id AS field_id, f.field_name, f.field_label, v.field_value \
         FROM social_report_values v \
         JOIN social_network_fields f ON f.id = v.field_id \
         WHERE v.report_id = $1 \
         ORDER BY f.sort_order, f.id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let scores = sqlx::query_as::<_, ScoreRow>(
        "SELECT s.field_id, f.field_name, s.expected_value, s.actual_value, s.score \
         FROM report_scores s \
         JOIN social_network_fields f ON f.id = s.field_id \
         WHERE s.report_id = $1 \
         ORDER BY f.sort_order, f.id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(SocialReportDetail {
        report,
        company_id,
        values,
        scores,
    })
}

/// Company owning the page a report belongs to.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the report does not exist.
pub async fn social_report_company(pool: &PgPool, id: i64) -> Result<i64, DbError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT sp.company_id FROM social_reports sr \
         JOIN social_pages sp ON sp.id = sr.page_id WHERE sr.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Field values of the latest report of a page dated on or before `on`.
/// Empty when no such report exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn latest_values(
    pool: &PgPool,
    page_id: i64,
    on: NaiveDate,
) -> Result<HashMap<i64, String>, DbError> {
    let latest: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM social_reports WHERE page_id = $1 AND report_date <= $2 \
         ORDER BY report_date DESC, id DESC LIMIT 1",
    )
    .bind(page_id)
    .bind(on)
    .fetch_optional(pool)
    .await?;

    match latest {
        Some(report_id) => load_values(pool, report_id).await,
        None => Ok(HashMap::new()),
    }
}

/// Expected value of every KPI of a page on `on`, using the latest report
/// on or before that date for related-field values.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown page, or [`DbError::Sqlx`].
pub async fn expected_performance(
    pool: &PgPool,
    page_id: i64,
    on: NaiveDate,
) -> Result<Vec<ExpectedPerformance>, DbError> {
    let page = get_page(pool, page_id).await?;
    let kpis = list_page_kpis(pool, page_id).await?;
    let baselines = load_baselines(pool, page_id).await?;
    let values = latest_values(pool, page_id, on).await?;
    let input = ReportInput {
        start_date: page.start_date,
        report_date: on,
        values: &values,
        baselines: &baselines,
    };

    Ok(kpis
        .into_iter()
        .map(|row| {
            let outcome = row
                .to_definition()
                .model()
                .and_then(|model| kpi::expected_value(&model, row.field_id, &input));
            let (expected_value, unavailable, error) = match outcome {
                Ok(kpi::Expectation::Known(v)) => (Some(v.round_dp(2)), None, None),
                Ok(kpi::Expectation::Unavailable(reason)) => (None, Some(reason), None),
                Err(e) => (None, None, Some(e.to_string())),
            };
            ExpectedPerformance {
                kpi_id: row.id,
                field_id: row.field_id,
                field_name: row.field_name,
                model_type: row.model_type,
                expected_value,
                unavailable,
                error,
            }
        })
        .collect())
}
