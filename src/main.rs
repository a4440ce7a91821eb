use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

fn redact_host(url: &str) -> String {
    url.split('@')
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("?")
        .to_string()
}

use pipeline_snapshot_service::{
    monitoring, service,
    types::{AppConfig, SnapshotKind},
};

#[derive(Parser, Debug)]
#[command(name = "pipeline-snapshot-service")]
#[command(about = "Sales pipeline snapshot scheduler and baseline comparison service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TriggerKind {
    Weekly,
    Monthly,
}

impl From<TriggerKind> for SnapshotKind {
    fn from(kind: TriggerKind) -> Self {
        match kind {
            TriggerKind::Weekly => SnapshotKind::WeeklyPresident,
            TriggerKind::Monthly => SnapshotKind::MonthlyTownhall,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompareKind {
    Weekly,
    Monthly,
    Custom,
}

impl From<CompareKind> for SnapshotKind {
    fn from(kind: CompareKind) -> Self {
        match kind {
            CompareKind::Weekly => SnapshotKind::WeeklyPresident,
            CompareKind::Monthly => SnapshotKind::MonthlyTownhall,
            CompareKind::Custom => SnapshotKind::Custom,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the snapshot scheduler service
    Run {},
    /// Create snapshots for today, bypassing calendar gating
    Snapshot {
        #[arg(long, value_enum)]
        kind: TriggerKind,
        #[arg(long)]
        description: Option<String>,
    },
    /// Resolve a baseline comparison and print it as JSON
    Compare {
        #[arg(long, value_enum)]
        kind: CompareKind,
        /// Account manager code; omit for the global rollup
        #[arg(long)]
        scope: Option<String>,
        /// Target date (YYYY-MM-DD); required for custom comparisons
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List stored snapshot dates for a scope and kind, newest first
    Dates {
        #[arg(long, value_enum)]
        kind: CompareKind,
        /// Account manager code; omit for the global rollup
        #[arg(long)]
        scope: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "pipeline_snapshot_service=debug,service=debug,info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(target: "service", "pipeline-snapshot-service starting");

    let cli = Cli::parse();
    tracing::debug!(target: "service", config = %cli.config, "loading config");

    let cfg = AppConfig::from_file(&cli.config)?;
    tracing::info!(
        target: "service",
        config = %cli.config,
        postgres_host = redact_host(&cfg.postgres.url),
        weekly_day = %cfg.scheduler.weekly_day,
        "config loaded"
    );

    match cli.command.unwrap_or(Commands::Run {}) {
        Commands::Run {} => {
            monitoring::logger::log_startup(&cfg);
            service::run_service(cfg).await?;
        }
        Commands::Snapshot { kind, description } => {
            let result = service::run_manual_trigger(&cfg, kind.into(), description).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Compare { kind, scope, date } => {
            let result = service::run_comparison(&cfg, kind.into(), scope, date).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Dates { kind, scope } => {
            let dates = service::run_available_dates(&cfg, kind.into(), scope).await?;
            println!("{}", serde_json::to_string_pretty(&dates)?);
        }
    }

    Ok(())
}
