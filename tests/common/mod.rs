#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use pipeline_snapshot_service::metrics::{MetricsError, MetricsRecord, MetricsSource};
use pipeline_snapshot_service::storage::models::{NearestSnapshot, SnapshotMeta, SnapshotRow};
use pipeline_snapshot_service::storage::store::SnapshotStore;
use pipeline_snapshot_service::storage::StorageError;
use pipeline_snapshot_service::types::SnapshotKind;

pub fn record(total: i64) -> MetricsRecord {
    MetricsRecord {
        total_opportunities: total,
        ..MetricsRecord::default()
    }
}

type Key = (Option<String>, SnapshotKind, NaiveDate);

#[derive(Default)]
struct StoreInner {
    rows: Mutex<HashMap<Key, SnapshotRow>>,
    scopes: Mutex<Vec<String>>,
    failing_upserts: Mutex<HashSet<Option<String>>>,
}

/// In-memory snapshot store with the same conflict semantics as the Postgres
/// one: one row per (scope, kind, date), updates keep the original created_at.
#[derive(Clone, Default)]
pub struct FakeStore {
    inner: Arc<StoreInner>,
}

impl FakeStore {
    pub fn with_scopes(scopes: &[&str]) -> Self {
        let store = Self::default();
        *store.inner.scopes.lock().unwrap() = scopes.iter().map(|s| s.to_string()).collect();
        store
    }

    pub fn fail_upserts_for(&self, scope: Option<&str>) {
        self.inner
            .failing_upserts
            .lock()
            .unwrap()
            .insert(scope.map(str::to_string));
    }

    pub fn seed(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        date: NaiveDate,
        metrics: MetricsRecord,
    ) {
        let row = make_row(
            scope,
            kind,
            date,
            metrics,
            &SnapshotMeta {
                is_manual: false,
                description: "seeded".to_string(),
                created_by: "test-setup".to_string(),
            },
        );
        self.inner
            .rows
            .lock()
            .unwrap()
            .insert((scope.map(str::to_string), kind, date), row);
    }

    pub fn row(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        date: NaiveDate,
    ) -> Option<SnapshotRow> {
        self.inner
            .rows
            .lock()
            .unwrap()
            .get(&(scope.map(str::to_string), kind, date))
            .cloned()
    }

    pub fn row_count(&self) -> usize {
        self.inner.rows.lock().unwrap().len()
    }
}

fn make_row(
    scope: Option<&str>,
    kind: SnapshotKind,
    date: NaiveDate,
    metrics: MetricsRecord,
    meta: &SnapshotMeta,
) -> SnapshotRow {
    SnapshotRow {
        scope: scope.map(str::to_string),
        snapshot_type: kind.as_str().to_string(),
        snapshot_date: date,
        metrics,
        is_manual: meta.is_manual,
        description: Some(meta.description.clone()),
        created_by: Some(meta.created_by.clone()),
        created_at: Utc::now(),
    }
}

impl SnapshotStore for FakeStore {
    async fn upsert(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        date: NaiveDate,
        record: &MetricsRecord,
        meta: &SnapshotMeta,
    ) -> Result<(), StorageError> {
        if self
            .inner
            .failing_upserts
            .lock()
            .unwrap()
            .contains(&scope.map(str::to_string))
        {
            return Err(StorageError::Write(format!(
                "injected upsert failure for {scope:?}"
            )));
        }
        let key = (scope.map(str::to_string), kind, date);
        let mut row = make_row(scope, kind, date, record.clone(), meta);
        let mut rows = self.inner.rows.lock().unwrap();
        if let Some(existing) = rows.get(&key) {
            row.created_at = existing.created_at;
        }
        rows.insert(key, row);
        Ok(())
    }

    async fn find_exact(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        date: NaiveDate,
    ) -> Result<Option<SnapshotRow>, StorageError> {
        Ok(self.row(scope, kind, date))
    }

    async fn find_nearest(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        target: NaiveDate,
    ) -> Result<Option<NearestSnapshot>, StorageError> {
        let rows = self.inner.rows.lock().unwrap();
        let nearest = rows
            .iter()
            .filter(|((s, k, _), _)| s.as_deref() == scope && *k == kind)
            .min_by_key(|((_, _, date), _)| ((*date - target).num_days().abs(), *date))
            .map(|(_, row)| NearestSnapshot {
                days_difference: (row.snapshot_date - target).num_days().abs(),
                snapshot: row.clone(),
            });
        Ok(nearest)
    }

    async fn list_active_scopes(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.inner.scopes.lock().unwrap().clone())
    }

    async fn has_snapshot(
        &self,
        kind: SnapshotKind,
        date: NaiveDate,
    ) -> Result<bool, StorageError> {
        Ok(self
            .inner
            .rows
            .lock()
            .unwrap()
            .contains_key(&(None, kind, date)))
    }

    async fn available_dates(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let rows = self.inner.rows.lock().unwrap();
        let mut dates: Vec<NaiveDate> = rows
            .keys()
            .filter(|(s, k, _)| s.as_deref() == scope && *k == kind)
            .map(|(_, _, date)| *date)
            .collect();
        dates.sort_by(|a, b| b.cmp(a));
        Ok(dates)
    }
}

#[derive(Default)]
struct MetricsInner {
    global: Mutex<MetricsRecord>,
    per_scope: Mutex<HashMap<String, MetricsRecord>>,
    windows: Mutex<HashMap<String, MetricsRecord>>,
    counts: Mutex<HashMap<Option<String>, i64>>,
    failing: Mutex<HashSet<Option<String>>>,
}

/// Canned metrics source. Unset scopes aggregate to all-zero records, the
/// same way an empty filtered query does.
#[derive(Clone, Default)]
pub struct FakeMetrics {
    inner: Arc<MetricsInner>,
}

impl FakeMetrics {
    pub fn set_global(&self, record: MetricsRecord) {
        *self.inner.global.lock().unwrap() = record;
    }

    pub fn set_scope(&self, scope: &str, record: MetricsRecord) {
        self.inner
            .per_scope
            .lock()
            .unwrap()
            .insert(scope.to_string(), record);
    }

    pub fn set_window(&self, scope: &str, record: MetricsRecord) {
        self.inner
            .windows
            .lock()
            .unwrap()
            .insert(scope.to_string(), record);
    }

    pub fn set_count(&self, scope: Option<&str>, count: i64) {
        self.inner
            .counts
            .lock()
            .unwrap()
            .insert(scope.map(str::to_string), count);
    }

    pub fn fail_metrics_for(&self, scope: Option<&str>) {
        self.inner
            .failing
            .lock()
            .unwrap()
            .insert(scope.map(str::to_string));
    }
}

impl MetricsSource for FakeMetrics {
    async fn metrics(&self, scope: Option<&str>) -> Result<MetricsRecord, MetricsError> {
        if self
            .inner
            .failing
            .lock()
            .unwrap()
            .contains(&scope.map(str::to_string))
        {
            return Err(MetricsError::Aggregation(format!(
                "injected aggregation failure for {scope:?}"
            )));
        }
        let record = match scope {
            None => self.inner.global.lock().unwrap().clone(),
            Some(code) => self
                .inner
                .per_scope
                .lock()
                .unwrap()
                .get(code)
                .cloned()
                .unwrap_or_default(),
        };
        Ok(record)
    }

    async fn record_count(&self, scope: Option<&str>) -> Result<i64, MetricsError> {
        if let Some(count) = self
            .inner
            .counts
            .lock()
            .unwrap()
            .get(&scope.map(str::to_string))
        {
            return Ok(*count);
        }
        Ok(self.metrics(scope).await?.total_opportunities)
    }

    async fn window_metrics(
        &self,
        scope: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<MetricsRecord, MetricsError> {
        Ok(self
            .inner
            .windows
            .lock()
            .unwrap()
            .get(scope)
            .cloned()
            .unwrap_or_default())
    }
}
