//! `stats` sub-commands.

use chrono::NaiveDate;
use clap::Subcommand;
use crewdesk_core::DateRange;

#[derive(Debug, Subcommand)]
pub enum StatsCommands {
    /// Aggregate one member's daily reports over an inclusive date range
    Show {
        /// Personnel id
        #[arg(long)]
        personnel: i64,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Print a readable summary instead of the snapshot JSON
        #[arg(long)]
        text: bool,
    },
}

pub(crate) async fn run(pool: &sqlx::PgPool, command: StatsCommands) -> anyhow::Result<()> {
    match command {
        StatsCommands::Show {
            personnel,
            from,
            to,
            text,
        } => {
            let range = DateRange::new(from, to)?;
            let snapshot =
                crewdesk_db::statistics::compute_statistics(pool, personnel, range).await?;
            if !text {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
                return Ok(());
            }

            println!(
                "personnel {personnel}, {from} to {to} ({} days)",
                range.days_inclusive()
            );
            println!("reports: {}", snapshot.report_count);
            println!("categories: {}", snapshot.categories.join(", "));
            for (rank, top) in snapshot.top_categories.iter().enumerate() {
                println!("  {}. {} ({})", rank + 1, top.name, top.count);
            }
        }
    }
    Ok(())
}
