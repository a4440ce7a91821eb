use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::compare::{self, ComparisonRequest, ComparisonResolver, ComparisonResult};
use crate::metrics::PgMetricsSource;
use crate::monitoring::dashboard;
use crate::scheduler::{RunResult, SnapshotScheduler};
use crate::storage::store::{PgSnapshotStore, SnapshotStore};
use crate::storage::create_pg_pool;
use crate::types::{AppConfig, SnapshotKind};

/// Entrypoint used by `main.rs` to start the long-running snapshot service.
///
/// This wires together storage, the live metrics source, the scheduler loop,
/// and monitoring. The loop only ends if the health listener fails to bind or
/// errors; individual snapshot runs never bring it down.
pub async fn run_service(cfg: AppConfig) -> anyhow::Result<()> {
    info!(target: "service", "run_service starting");

    // Periodic metrics snapshots for basic observability.
    dashboard::spawn_dashboard_task(Duration::from_secs(cfg.service.dashboard_period_secs.max(1)));

    info!(target: "service", "connecting to Postgres");
    let pool = create_pg_pool(&cfg.postgres).await?;
    info!(target: "service", "Postgres connected");

    let metrics_source = PgMetricsSource::new(pool.clone());
    let store = PgSnapshotStore::new(pool);
    let scheduler = SnapshotScheduler::new(cfg.scheduler.clone(), metrics_source, store)?;

    // A few missed poll ticks means the loop is stuck; report STALE.
    let max_staleness = Duration::from_secs(cfg.scheduler.poll_interval_secs.max(1) * 5);

    tokio::select! {
        _ = scheduler.run() => Ok(()),
        res = dashboard::serve_health(&cfg.service.health_addr, max_staleness) => res,
    }
}

/// One-shot manual snapshot trigger used by the CLI; bypasses calendar gating.
pub async fn run_manual_trigger(
    cfg: &AppConfig,
    kind: SnapshotKind,
    description: Option<String>,
) -> anyhow::Result<RunResult> {
    let pool = create_pg_pool(&cfg.postgres).await?;
    let scheduler = SnapshotScheduler::new(
        cfg.scheduler.clone(),
        PgMetricsSource::new(pool.clone()),
        PgSnapshotStore::new(pool),
    )?;
    let result = match kind {
        SnapshotKind::WeeklyPresident => scheduler.trigger_weekly(description).await?,
        SnapshotKind::MonthlyTownhall => scheduler.trigger_monthly(description).await?,
        SnapshotKind::Custom => {
            anyhow::bail!("manual triggers support the weekly and monthly kinds only")
        }
    };
    Ok(result)
}

/// One-shot comparison query used by the CLI.
pub async fn run_comparison(
    cfg: &AppConfig,
    kind: SnapshotKind,
    scope: Option<String>,
    date: Option<NaiveDate>,
) -> anyhow::Result<ComparisonResult> {
    let pool = create_pg_pool(&cfg.postgres).await?;
    let resolver = ComparisonResolver::new(
        PgMetricsSource::new(pool.clone()),
        PgSnapshotStore::new(pool),
    );

    let today = (Utc::now() + chrono::Duration::hours(cfg.scheduler.utc_offset_hours as i64))
        .date_naive();
    let requested_date = match date {
        Some(d) => d,
        None => compare::requested_date_for(kind, today)
            .ok_or_else(|| anyhow::anyhow!("custom comparisons require an explicit --date"))?,
    };

    let req = ComparisonRequest {
        scope,
        kind,
        requested_date,
    };
    Ok(resolver.resolve(&req, today).await?)
}

/// One-shot listing of stored snapshot dates for a (scope, kind) pair, newest
/// first; backs the dashboard's custom-comparison date picker.
pub async fn run_available_dates(
    cfg: &AppConfig,
    kind: SnapshotKind,
    scope: Option<String>,
) -> anyhow::Result<Vec<NaiveDate>> {
    let pool = create_pg_pool(&cfg.postgres).await?;
    let store = PgSnapshotStore::new(pool);
    Ok(store.available_dates(scope.as_deref(), kind).await?)
}
