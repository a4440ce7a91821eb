use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use futures::{stream, StreamExt};
use serde::Serialize;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::calendar;
use crate::metrics::{MetricsError, MetricsSource};
use crate::monitoring::metrics::METRICS;
use crate::storage::models::SnapshotMeta;
use crate::storage::store::SnapshotStore;
use crate::storage::StorageError;
use crate::types::{SchedulerConfig, SnapshotKind};

/// Actor recorded on rows written by scheduled batches.
const SCHEDULER_ACTOR: &str = "business-scheduler";
/// Actor recorded on rows written via the manual trigger entry points.
const MANUAL_ACTOR: &str = "manual-trigger";

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// One scope's failure inside a batch. `scope` is `None` when the global
/// rollup itself failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScopeError {
    pub scope: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub total_created: u32,
    pub scopes_processed: u32,
    pub kind: SnapshotKind,
    pub snapshot_date: NaiveDate,
}

/// Outcome of one `create_snapshots` batch.
#[derive(Clone, Debug, Serialize)]
pub struct RunResult {
    pub success: bool,
    pub errors: Vec<ScopeError>,
    pub summary: RunSummary,
}

/// Last observed run per kind; in-memory only, overwritten on every run.
#[derive(Clone, Debug, Serialize)]
pub struct RunStatus {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub errors: Vec<ScopeError>,
    pub summary: Option<RunSummary>,
    pub next_due: Option<NaiveDate>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub last_run: HashMap<SnapshotKind, RunStatus>,
    pub next_weekly_due: NaiveDate,
    pub next_townhall_due: NaiveDate,
}

/// Orchestrates periodic snapshot creation on the business meeting calendar.
///
/// One minute-interval loop re-derives the local calendar date each tick and
/// fires due triggers at most once per (trigger, day). The precise calendar
/// predicate (first Friday, second Friday) is checked inside the trigger
/// rather than trusted to the day-range that scheduled it.
pub struct SnapshotScheduler<M, S> {
    metrics: M,
    store: S,
    cfg: SchedulerConfig,
    weekly_day: Weekday,
    running: AtomicBool,
    last_run: RwLock<HashMap<SnapshotKind, RunStatus>>,
}

impl<M: MetricsSource, S: SnapshotStore> SnapshotScheduler<M, S> {
    pub fn new(cfg: SchedulerConfig, metrics: M, store: S) -> Result<Self, SchedulerError> {
        let weekly_day = cfg
            .weekly_day
            .parse::<Weekday>()
            .map_err(|_| SchedulerError::Config(format!("invalid weekly_day: {}", cfg.weekly_day)))?;
        Ok(Self {
            metrics,
            store,
            cfg,
            weekly_day,
            running: AtomicBool::new(false),
            last_run: RwLock::new(HashMap::new()),
        })
    }

    fn local_now(&self) -> NaiveDateTime {
        (Utc::now() + chrono::Duration::hours(self.cfg.utc_offset_hours as i64)).naive_utc()
    }

    pub fn local_today(&self) -> NaiveDate {
        self.local_now().date()
    }

    /// Run the scheduler loop indefinitely. Marking `running` is one-way in
    /// normal operation; a failed individual run never stops the loop.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(target: "scheduler", "snapshot scheduler already running");
            return;
        }

        info!(
            target: "scheduler",
            weekly_day = %self.cfg.weekly_day,
            weekly_at = format!("{:02}:{:02}", self.cfg.weekly_hour, self.cfg.weekly_minute),
            townhall_hour = self.cfg.townhall_hour,
            utc_offset_hours = self.cfg.utc_offset_hours,
            "snapshot scheduler started"
        );

        let mut fired: HashMap<&'static str, NaiveDate> = HashMap::new();
        let mut ticker = interval(Duration::from_secs(self.cfg.poll_interval_secs.max(1)));
        loop {
            ticker.tick().await;
            METRICS.heartbeat();
            let now = self.local_now();
            self.on_tick(now, &mut fired).await;
        }
    }

    async fn on_tick(&self, now: NaiveDateTime, fired: &mut HashMap<&'static str, NaiveDate>) {
        let today = now.date();
        let due = |hour: u32, minute: u32| {
            NaiveTime::from_hms_opt(hour, minute, 0)
                .map(|at| now.time() >= at)
                .unwrap_or(false)
        };

        if today.weekday() == self.weekly_day
            && due(self.cfg.weekly_hour, self.cfg.weekly_minute)
            && fired.get("weekly") != Some(&today)
        {
            fired.insert("weekly", today);
            self.weekly_tick(today).await;
        }

        if today.weekday() == Weekday::Fri && due(self.cfg.townhall_hour, 0) {
            if (1..=7).contains(&today.day()) && fired.get("townhall") != Some(&today) {
                fired.insert("townhall", today);
                self.townhall_tick(today).await;
            }
            if (8..=14).contains(&today.day()) && fired.get("second_friday") != Some(&today) {
                fired.insert("second_friday", today);
                self.second_friday_tick(today).await;
            }
        }
    }

    /// Weekly report trigger: snapshot dated today under `weekly_president`.
    pub async fn weekly_tick(&self, today: NaiveDate) {
        let description = format!("Weekly Report - {}", calendar::format_long(today));
        let outcome = self
            .create_snapshots(
                SnapshotKind::WeeklyPresident,
                today,
                &description,
                SCHEDULER_ACTOR,
                false,
            )
            .await;
        self.finish_run(
            SnapshotKind::WeeklyPresident,
            calendar::next_wednesday(today),
            &outcome,
        );
    }

    /// Townhall trigger for candidate first Fridays. The day-range schedule
    /// can match several days, so the exact predicate is re-checked here; a
    /// mismatch is a silent no-op, not an error.
    pub async fn townhall_tick(&self, today: NaiveDate) {
        if !calendar::is_first_friday(today) {
            debug!(
                target: "scheduler",
                %today,
                "not the first Friday of the month; townhall trigger is a no-op"
            );
            return;
        }
        self.run_townhall(today).await;
    }

    /// Second-Friday fallback: if the first-Friday townhall snapshot was never
    /// written (holiday, outage), run the full batch dated today. This is the
    /// only retry; a month that misses both Fridays gets no townhall snapshot.
    pub async fn second_friday_tick(&self, today: NaiveDate) {
        if !calendar::is_second_friday(today) {
            return;
        }
        let first_friday = calendar::first_friday_for(today);
        match self
            .store
            .has_snapshot(SnapshotKind::MonthlyTownhall, first_friday)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    target: "scheduler",
                    %today,
                    %first_friday,
                    "first Friday townhall snapshot missing; using second Friday"
                );
                self.run_townhall(today).await;
            }
            Err(err) => {
                warn!(
                    target: "scheduler",
                    error = %err,
                    %first_friday,
                    "could not check for first Friday snapshot; skipping fallback"
                );
            }
        }
    }

    async fn run_townhall(&self, today: NaiveDate) {
        let description = format!("Townhall Meeting - {}", calendar::format_long(today));
        let outcome = self
            .create_snapshots(
                SnapshotKind::MonthlyTownhall,
                today,
                &description,
                SCHEDULER_ACTOR,
                false,
            )
            .await;
        self.finish_run(
            SnapshotKind::MonthlyTownhall,
            calendar::next_townhall_friday(today),
            &outcome,
        );
    }

    /// Manual weekly trigger: bypasses calendar gating, snapshot dated today.
    pub async fn trigger_weekly(
        &self,
        description: Option<String>,
    ) -> Result<RunResult, SchedulerError> {
        let today = self.local_today();
        let description = description
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| format!("Manual Weekly Report - {today}"));
        info!(target: "scheduler", %today, "manual weekly trigger");
        let outcome = self
            .create_snapshots(
                SnapshotKind::WeeklyPresident,
                today,
                &description,
                MANUAL_ACTOR,
                true,
            )
            .await;
        self.finish_run(
            SnapshotKind::WeeklyPresident,
            calendar::next_wednesday(today),
            &outcome,
        );
        outcome
    }

    /// Manual townhall trigger: bypasses the first-Friday gate entirely.
    pub async fn trigger_monthly(
        &self,
        description: Option<String>,
    ) -> Result<RunResult, SchedulerError> {
        let today = self.local_today();
        let description = description
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| format!("Manual Townhall Meeting - {today}"));
        info!(target: "scheduler", %today, "manual townhall trigger");
        let outcome = self
            .create_snapshots(
                SnapshotKind::MonthlyTownhall,
                today,
                &description,
                MANUAL_ACTOR,
                true,
            )
            .await;
        self.finish_run(
            SnapshotKind::MonthlyTownhall,
            calendar::next_townhall_friday(today),
            &outcome,
        );
        outcome
    }

    /// Create the global snapshot plus one per active scope for (kind, date).
    ///
    /// Per-scope failures are collected, never fatal: one bad account manager
    /// must not block the global snapshot or the remaining managers. Only a
    /// scheduler-level failure (cannot enumerate scopes) propagates.
    pub async fn create_snapshots(
        &self,
        kind: SnapshotKind,
        date: NaiveDate,
        description: &str,
        created_by: &str,
        is_manual: bool,
    ) -> Result<RunResult, SchedulerError> {
        let run_id = Uuid::new_v4();
        info!(
            target: "scheduler",
            %run_id,
            kind = kind.as_str(),
            %date,
            "snapshot batch starting"
        );

        let meta = SnapshotMeta {
            is_manual,
            description: description.to_string(),
            created_by: created_by.to_string(),
        };

        let mut errors: Vec<ScopeError> = Vec::new();
        let mut total_created = 0u32;

        // Global rollup first. Its failure is recorded but independent of the
        // per-scope writes below.
        let global_outcome: Result<(), SchedulerError> = async {
            let record = self.metrics.metrics(None).await?;
            self.store.upsert(None, kind, date, &record, &meta).await?;
            Ok(())
        }
        .await;
        match global_outcome {
            Ok(()) => {
                total_created += 1;
                METRICS.record_snapshot_created("global", kind.as_str());
            }
            Err(err) => {
                warn!(
                    target: "scheduler",
                    %run_id,
                    error = %err,
                    "failed to create global snapshot"
                );
                METRICS.record_scope_failure("global", &err.to_string());
                errors.push(ScopeError {
                    scope: None,
                    message: err.to_string(),
                });
            }
        }

        let scopes = self.store.list_active_scopes().await?;
        let scopes_processed = scopes.len() as u32;

        let metrics = &self.metrics;
        let store = &self.store;
        let meta_ref = &meta;
        let outcomes: Vec<(String, Result<(), SchedulerError>)> =
            stream::iter(scopes.into_iter().map(|scope| async move {
                let outcome: Result<(), SchedulerError> = async {
                    let record = metrics.metrics(Some(&scope)).await?;
                    store
                        .upsert(Some(&scope), kind, date, &record, meta_ref)
                        .await?;
                    Ok(())
                }
                .await;
                (scope, outcome)
            }))
            .buffer_unordered(self.cfg.max_parallel_scopes.max(1))
            .collect()
            .await;

        for (scope, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    total_created += 1;
                    METRICS.record_snapshot_created(&scope, kind.as_str());
                }
                Err(err) => {
                    warn!(
                        target: "scheduler",
                        %run_id,
                        scope = %scope,
                        error = %err,
                        "failed to create scope snapshot"
                    );
                    METRICS.record_scope_failure(&scope, &err.to_string());
                    errors.push(ScopeError {
                        scope: Some(scope),
                        message: err.to_string(),
                    });
                }
            }
        }

        let result = RunResult {
            success: errors.is_empty(),
            errors,
            summary: RunSummary {
                total_created,
                scopes_processed,
                kind,
                snapshot_date: date,
            },
        };
        info!(
            target: "scheduler",
            %run_id,
            kind = kind.as_str(),
            total_created = result.summary.total_created,
            scopes_processed = result.summary.scopes_processed,
            failures = result.errors.len(),
            "snapshot batch finished"
        );
        Ok(result)
    }

    fn finish_run(
        &self,
        kind: SnapshotKind,
        next_due: NaiveDate,
        outcome: &Result<RunResult, SchedulerError>,
    ) {
        let status = match outcome {
            Ok(result) => RunStatus {
                success: result.success,
                timestamp: Utc::now(),
                errors: result.errors.clone(),
                summary: Some(result.summary.clone()),
                next_due: Some(next_due),
            },
            Err(err) => {
                warn!(
                    target: "scheduler",
                    kind = kind.as_str(),
                    error = %err,
                    "snapshot run failed at scheduler level"
                );
                RunStatus {
                    success: false,
                    timestamp: Utc::now(),
                    errors: vec![ScopeError {
                        scope: None,
                        message: err.to_string(),
                    }],
                    summary: None,
                    next_due: Some(next_due),
                }
            }
        };
        if let Ok(mut map) = self.last_run.write() {
            map.insert(kind, status);
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let today = self.local_today();
        let first_friday = calendar::first_friday_for(today);
        let next_townhall_due = if today <= first_friday {
            first_friday
        } else {
            calendar::next_townhall_friday(today)
        };
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            last_run: self
                .last_run
                .read()
                .map(|map| map.clone())
                .unwrap_or_default(),
            next_weekly_due: calendar::next_wednesday(today),
            next_townhall_due,
        }
    }
}
