//! `db` sub-commands: connectivity check, migrations and catalog seeding.

use std::path::PathBuf;

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Check that the database answers
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Upsert the permission catalog, CEO role, networks and KPI models
    Seed {
        /// Seed catalog file (defaults to CREWDESK_SEED_PATH)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &crewdesk_core::AppConfig,
    command: DbCommands,
) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            crewdesk_db::ping(pool).await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = crewdesk_db::run_migrations(pool).await?;
            println!("migrations up to date ({applied} applied)");
        }
        DbCommands::Seed { path } => {
            let path = path.unwrap_or_else(|| config.seed_path.clone());
            let catalog = crewdesk_core::load_catalog(&path)?;
            crewdesk_db::run_migrations(pool).await?;
            let summary = crewdesk_db::seed::seed_catalog(pool, &catalog).await?;
            tracing::info!(path = %path.display(), ?summary, "seed catalog applied");
            println!(
                "seeded {} permissions, {} networks ({} fields), {} KPI models, \
                 {} companies, {} categories, {} admins",
                summary.permissions,
                summary.social_networks,
                summary.network_fields,
                summary.kpi_models,
                summary.companies,
                summary.categories,
                summary.admins,
            );
        }
    }
    Ok(())
}
