use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::info;

/// Global metrics registry used across the service.
pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::default);

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[derive(Default)]
struct MetricsInner {
    snapshots_created: AtomicU64,
    scope_failures: AtomicU64,
    comparisons_resolved: AtomicU64,
    last_event_ts: AtomicU64,
}

/// Lightweight metrics handle backed by atomics so it can be cloned cheaply.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

impl Metrics {
    pub fn record_snapshot_created(&self, scope: &str, kind: &str) {
        self.inner.snapshots_created.fetch_add(1, Ordering::Relaxed);
        self.inner
            .last_event_ts
            .store(now_unix_secs(), Ordering::Relaxed);

        info!(
            target: "metrics",
            event = "snapshot_created",
            scope = %scope,
            kind = %kind,
            total_snapshots = self.inner.snapshots_created.load(Ordering::Relaxed),
            "snapshot created"
        );
    }

    pub fn record_scope_failure(&self, scope: &str, reason: &str) {
        self.inner.scope_failures.fetch_add(1, Ordering::Relaxed);
        self.inner
            .last_event_ts
            .store(now_unix_secs(), Ordering::Relaxed);

        info!(
            target: "metrics",
            event = "scope_failure",
            scope = %scope,
            reason = %reason,
            total_failures = self.inner.scope_failures.load(Ordering::Relaxed),
            "scope snapshot failed"
        );
    }

    pub fn record_comparison(&self, kind: &str, match_kind: &str) {
        self.inner
            .comparisons_resolved
            .fetch_add(1, Ordering::Relaxed);
        self.inner
            .last_event_ts
            .store(now_unix_secs(), Ordering::Relaxed);

        info!(
            target: "metrics",
            event = "comparison_resolved",
            kind = %kind,
            match_kind = %match_kind,
            total_comparisons = self.inner.comparisons_resolved.load(Ordering::Relaxed),
            "comparison resolved"
        );
    }

    pub fn heartbeat(&self) {
        self.inner
            .last_event_ts
            .store(now_unix_secs(), Ordering::Relaxed);
    }

    pub fn is_healthy(&self, max_staleness: Duration) -> bool {
        let last = self.inner.last_event_ts.load(Ordering::Relaxed);
        if last == 0 {
            // If we have never seen an event, treat as healthy immediately after startup.
            return true;
        }
        let now = now_unix_secs();
        now.saturating_sub(last) <= max_staleness.as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            snapshots_created: self.inner.snapshots_created.load(Ordering::Relaxed),
            scope_failures: self.inner.scope_failures.load(Ordering::Relaxed),
            comparisons_resolved: self.inner.comparisons_resolved.load(Ordering::Relaxed),
            last_event_ts: self.inner.last_event_ts.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view of current metrics used by dashboards and health checks.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub snapshots_created: u64,
    pub scope_failures: u64,
    pub comparisons_resolved: u64,
    pub last_event_ts: u64,
}

pub fn log_metrics_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        target: "metrics",
        event = "metrics_snapshot",
        snapshots_created = snapshot.snapshots_created,
        scope_failures = snapshot.scope_failures,
        comparisons_resolved = snapshot.comparisons_resolved,
        last_event_ts = snapshot.last_event_ts,
        "metrics snapshot"
    );
}
