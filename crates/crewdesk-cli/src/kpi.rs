//! `kpi` sub-commands.

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use crewdesk_core::FieldOutcome;
use crewdesk_db::social_reports::ScoredReport;

#[derive(Debug, Subcommand)]
pub enum KpiCommands {
    /// Recompute the scores of every report of a page
    Rescore {
        /// Social page id
        #[arg(long)]
        page: i64,
        /// Print the new scores without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show what each KPI of a page expects on a date
    Expected {
        /// Social page id
        #[arg(long)]
        page: i64,
        /// Date to evaluate (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

pub(crate) async fn run(pool: &sqlx::PgPool, command: KpiCommands) -> anyhow::Result<()> {
    match command {
        KpiCommands::Rescore { page, dry_run } => {
            let reports = crewdesk_db::social_reports::rescore_page(pool, page, dry_run).await?;
            for report in &reports {
                print_report(report);
            }
            let verb = if dry_run { "would rescore" } else { "rescored" };
            println!("{verb} {} report(s) of page {page}", reports.len());
        }
        KpiCommands::Expected { page, date } => {
            let on = date.unwrap_or_else(|| Utc::now().date_naive());
            let rows = crewdesk_db::social_reports::expected_performance(pool, page, on).await?;
            println!("expected performance of page {page} on {on}");
            for row in rows {
                let shown = match (row.expected_value, row.unavailable, row.error) {
                    (Some(value), _, _) => value.to_string(),
                    (None, Some(reason), _) => format!("unavailable ({reason:?})"),
                    (None, None, Some(error)) => format!("error: {error}"),
                    (None, None, None) => "-".to_string(),
                };
                println!("  {:<24} {:<20} {shown}", row.field_name, row.model_type);
            }
        }
    }
    Ok(())
}

fn print_report(report: &ScoredReport) {
    let average = report
        .average_score
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    println!("report {} ({}): average {average}", report.report_id, report.report_date);
    for outcome in &report.evaluation.outcomes {
        match outcome {
            FieldOutcome::Scored(s) => println!(
                "  field {}: actual {} expected {} score {}",
                s.field_id, s.actual_value, s.expected_value, s.score
            ),
            FieldOutcome::Unscored {
                field_id, reason, ..
            } => println!("  field {field_id}: unscored ({reason:?})"),
            FieldOutcome::Misconfigured {
                field_id, error, ..
            } => println!("  field {field_id}: misconfigured ({error})"),
        }
    }
}
