use chrono::{Duration, Months, NaiveDate};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::calendar;
use crate::metrics::{MetricsError, MetricsRecord, MetricsSource};
use crate::monitoring::metrics::METRICS;
use crate::storage::store::SnapshotStore;
use crate::storage::StorageError;
use crate::types::SnapshotKind;

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// How the returned baseline was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Nearest,
    Synthesized,
    None,
}

#[derive(Clone, Debug)]
pub struct ComparisonRequest {
    pub scope: Option<String>,
    pub kind: SnapshotKind,
    pub requested_date: NaiveDate,
}

/// Baseline resolved for a comparison query. `baseline` is present for every
/// match kind except `None`; `snapshot_date` and `days_difference` carry
/// provenance for exact/nearest matches.
#[derive(Clone, Debug, Serialize)]
pub struct ComparisonResult {
    pub match_kind: MatchKind,
    pub kind: SnapshotKind,
    pub scope: Option<String>,
    pub requested_date: NaiveDate,
    pub snapshot_date: Option<NaiveDate>,
    pub days_difference: Option<i64>,
    pub baseline: Option<MetricsRecord>,
    pub label: String,
}

/// Baseline date a standard-kind comparison should target, per the meeting
/// calendar. `Custom` comparisons carry a user-picked date instead.
pub fn requested_date_for(kind: SnapshotKind, today: NaiveDate) -> Option<NaiveDate> {
    match kind {
        SnapshotKind::WeeklyPresident => Some(calendar::previous_wednesday(today)),
        SnapshotKind::MonthlyTownhall => Some(calendar::first_day_of_previous_month(today)),
        SnapshotKind::Custom => None,
    }
}

/// Date window approximating "one period ago", used by the historical
/// synthesis tier: 7-14 days back for weekly, 1-2 months back for monthly
/// and custom.
pub fn synthesis_window(kind: SnapshotKind, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    match kind {
        SnapshotKind::WeeklyPresident => {
            (today - Duration::days(14), today - Duration::days(7))
        }
        SnapshotKind::MonthlyTownhall | SnapshotKind::Custom => (
            today.checked_sub_months(Months::new(2)).unwrap_or(today),
            today.checked_sub_months(Months::new(1)).unwrap_or(today),
        ),
    }
}

/// Deterministic perturbation factors for a scope with no usable history.
///
/// Formula: SHA-256 of the scope identifier, first 8 bytes as a big-endian
/// u64, top 53 bits mapped to u in [0, 1). Amount factor is 0.85 + 0.2u
/// (0.85..1.05), count factor 0.90 + 0.1u (0.90..1.00). The same scope always
/// maps to the same factors, so a dashboard refresh never shows a different
/// "previous period".
pub fn perturbation_factors(scope: &str) -> (f64, f64) {
    let digest = Sha256::digest(scope.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let unit = (u64::from_be_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64;
    let count_factor = 0.90 + unit * 0.10;
    let amount_factor = 0.85 + unit * 0.20;
    (count_factor, amount_factor)
}

fn target_label(kind: SnapshotKind, requested: NaiveDate) -> String {
    match kind {
        SnapshotKind::WeeklyPresident => {
            format!("Previous Wednesday ({})", calendar::format_long(requested))
        }
        SnapshotKind::MonthlyTownhall => format!(
            "First day of previous month ({})",
            calendar::format_long(requested)
        ),
        SnapshotKind::Custom => format!("Custom date ({})", calendar::format_long(requested)),
    }
}

/// Resolves the baseline for a comparison query with a three-tier fallback:
/// exact snapshot, nearest snapshot, then a synthesized estimate. The
/// dashboard must always have something to diff against, so an empty store is
/// answered with a disclosed estimate rather than an error.
pub struct ComparisonResolver<M, S> {
    metrics: M,
    store: S,
}

impl<M: MetricsSource, S: SnapshotStore> ComparisonResolver<M, S> {
    pub fn new(metrics: M, store: S) -> Self {
        Self { metrics, store }
    }

    /// Resolve `req` as of `today` (synthesis windows are relative to today).
    pub async fn resolve(
        &self,
        req: &ComparisonRequest,
        today: NaiveDate,
    ) -> Result<ComparisonResult, CompareError> {
        let scope = req.scope.as_deref();

        if let Some(row) = self
            .store
            .find_exact(scope, req.kind, req.requested_date)
            .await?
        {
            debug!(
                target: "compare",
                kind = req.kind.as_str(),
                scope = scope.unwrap_or("global"),
                date = %req.requested_date,
                "exact baseline found"
            );
            METRICS.record_comparison(req.kind.as_str(), "exact");
            return Ok(ComparisonResult {
                match_kind: MatchKind::Exact,
                kind: req.kind,
                scope: req.scope.clone(),
                requested_date: req.requested_date,
                snapshot_date: Some(row.snapshot_date),
                days_difference: Some(0),
                baseline: Some(row.metrics),
                label: target_label(req.kind, req.requested_date),
            });
        }

        if let Some(nearest) = self
            .store
            .find_nearest(scope, req.kind, req.requested_date)
            .await?
        {
            METRICS.record_comparison(req.kind.as_str(), "nearest");
            let label = format!(
                "Target: {} - using nearest snapshot {} ({} days away)",
                target_label(req.kind, req.requested_date),
                calendar::format_long(nearest.snapshot.snapshot_date),
                nearest.days_difference
            );
            return Ok(ComparisonResult {
                match_kind: MatchKind::Nearest,
                kind: req.kind,
                scope: req.scope.clone(),
                requested_date: req.requested_date,
                snapshot_date: Some(nearest.snapshot.snapshot_date),
                days_difference: Some(nearest.days_difference),
                baseline: Some(nearest.snapshot.metrics),
                label,
            });
        }

        self.synthesize(req, today).await
    }

    /// No snapshot exists at all for (scope, kind): estimate a baseline.
    ///
    /// Priority: scale the global snapshot by the scope's current record
    /// share; else aggregate the scope's own records from one period ago;
    /// else apply the deterministic perturbation to current metrics. Every
    /// label discloses that the value is estimated, not historical.
    async fn synthesize(
        &self,
        req: &ComparisonRequest,
        today: NaiveDate,
    ) -> Result<ComparisonResult, CompareError> {
        let Some(scope) = req.scope.as_deref() else {
            // Global with an empty store: nothing plausible to estimate from.
            METRICS.record_comparison(req.kind.as_str(), "none");
            return Ok(self.none_result(req));
        };

        if let Some(global) = self
            .store
            .find_exact(None, req.kind, req.requested_date)
            .await?
        {
            let scope_count = self.metrics.record_count(Some(scope)).await?;
            let total_count = self.metrics.record_count(None).await?;
            if total_count > 0 && scope_count > 0 {
                let share = scope_count as f64 / total_count as f64;
                let baseline = global.metrics.scale(share, share);
                info!(
                    target: "compare",
                    kind = req.kind.as_str(),
                    scope = %scope,
                    share,
                    "synthesized baseline from global snapshot share"
                );
                METRICS.record_comparison(req.kind.as_str(), "synthesized");
                return Ok(self.synthesized_result(
                    req,
                    baseline,
                    "estimated from the global snapshot by current record share",
                ));
            }
        }

        let (from, to) = synthesis_window(req.kind, today);
        let historical = self.metrics.window_metrics(scope, from, to).await?;
        if historical.total_opportunities >= 2 {
            info!(
                target: "compare",
                kind = req.kind.as_str(),
                scope = %scope,
                records = historical.total_opportunities,
                %from,
                %to,
                "synthesized baseline from historical records"
            );
            METRICS.record_comparison(req.kind.as_str(), "synthesized");
            return Ok(self.synthesized_result(
                req,
                historical,
                "estimated from records received about one period ago",
            ));
        }

        let current = self.metrics.metrics(Some(scope)).await?;
        if current.total_opportunities == 0 {
            METRICS.record_comparison(req.kind.as_str(), "none");
            return Ok(self.none_result(req));
        }

        let (count_factor, amount_factor) = perturbation_factors(scope);
        let mut baseline = current.scale(count_factor, amount_factor);
        baseline.total_opportunities = baseline.total_opportunities.max(1);
        info!(
            target: "compare",
            kind = req.kind.as_str(),
            scope = %scope,
            count_factor,
            amount_factor,
            "synthesized baseline by deterministic adjustment"
        );
        METRICS.record_comparison(req.kind.as_str(), "synthesized");
        Ok(self.synthesized_result(
            req,
            baseline,
            "estimated by deterministic adjustment of current metrics",
        ))
    }

    fn synthesized_result(
        &self,
        req: &ComparisonRequest,
        baseline: MetricsRecord,
        method: &str,
    ) -> ComparisonResult {
        ComparisonResult {
            match_kind: MatchKind::Synthesized,
            kind: req.kind,
            scope: req.scope.clone(),
            requested_date: req.requested_date,
            snapshot_date: None,
            days_difference: None,
            baseline: Some(baseline),
            label: format!(
                "Target: {} - {method}, not historical",
                target_label(req.kind, req.requested_date)
            ),
        }
    }

    fn none_result(&self, req: &ComparisonRequest) -> ComparisonResult {
        ComparisonResult {
            match_kind: MatchKind::None,
            kind: req.kind,
            scope: req.scope.clone(),
            requested_date: req.requested_date,
            snapshot_date: None,
            days_difference: None,
            baseline: None,
            label: format!(
                "Target: {} - no comparison data available",
                target_label(req.kind, req.requested_date)
            ),
        }
    }
}
