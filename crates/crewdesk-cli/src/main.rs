mod db;
mod kpi;
mod stats;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::{db::DbCommands, kpi::KpiCommands, stats::StatsCommands};

#[derive(Debug, Parser)]
#[command(name = "crewdesk-cli")]
#[command(about = "crewdesk operations: migrations, seeding, KPI rescoring and statistics")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database connectivity, migrations and catalog seeding
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Social page KPI maintenance
    Kpi {
        #[command(subcommand)]
        command: KpiCommands,
    },
    /// Personnel activity statistics
    Stats {
        #[command(subcommand)]
        command: StatsCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("crewdesk-cli: run with --help to list commands");
        return Ok(());
    };

    let config = crewdesk_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = crewdesk_db::PoolConfig::from_app_config(&config);
    let pool = crewdesk_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => db::run(&pool, &config, command).await,
        Commands::Kpi { command } => kpi::run(&pool, command).await,
        Commands::Stats { command } => stats::run(&pool, command).await,
    }
}
