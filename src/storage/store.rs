use chrono::NaiveDate;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;

use crate::metrics::MetricsRecord;
use crate::storage::models::{NearestSnapshot, SnapshotMeta, SnapshotRow};
use crate::storage::{PgPool, StorageError};
use crate::types::SnapshotKind;

/// Keyed snapshot storage contract.
///
/// The uniqueness constraint on (scope, kind, date) is the serialization
/// point: `upsert` is idempotent per key and concurrent writes to the same
/// key resolve to last-write-wins at the store layer. The scheduler and
/// resolver are generic over this trait so tests can run against an
/// in-memory implementation.
#[allow(async_fn_in_trait)]
pub trait SnapshotStore {
    /// Insert or overwrite the snapshot for (scope, kind, date). Metric and
    /// meta fields are replaced on conflict; `created_at` of the original
    /// insert is left untouched.
    async fn upsert(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        date: NaiveDate,
        record: &MetricsRecord,
        meta: &SnapshotMeta,
    ) -> Result<(), StorageError>;

    async fn find_exact(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        date: NaiveDate,
    ) -> Result<Option<SnapshotRow>, StorageError>;

    /// Snapshot with the date closest to `target` for (scope, kind).
    /// Equidistant candidates resolve to the earlier date so repeated queries
    /// are deterministic and the baseline never silently jumps forward.
    async fn find_nearest(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        target: NaiveDate,
    ) -> Result<Option<NearestSnapshot>, StorageError>;

    /// Active, non-resigned account manager codes, ordered by code.
    async fn list_active_scopes(&self) -> Result<Vec<String>, StorageError>;

    /// Whether a global snapshot exists for (kind, date); used by the
    /// second-Friday townhall fallback.
    async fn has_snapshot(&self, kind: SnapshotKind, date: NaiveDate)
        -> Result<bool, StorageError>;

    /// Dates with stored snapshots for (scope, kind), newest first; feeds the
    /// dashboard's custom-comparison date picker.
    async fn available_dates(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
    ) -> Result<Vec<NaiveDate>, StorageError>;
}

const METRIC_COLS: &str = "\
    total_opportunities, submitted_count, submitted_amount, \
    op100_count, op100_amount, op90_count, op90_amount, \
    op60_count, op60_amount, op30_count, op30_amount, \
    lost_count, lost_amount, inactive_count, ongoing_count, \
    pending_count, declined_count, revised_count";

const METRIC_UPDATES: &str = "\
    total_opportunities = EXCLUDED.total_opportunities, \
    submitted_count = EXCLUDED.submitted_count, \
    submitted_amount = EXCLUDED.submitted_amount, \
    op100_count = EXCLUDED.op100_count, \
    op100_amount = EXCLUDED.op100_amount, \
    op90_count = EXCLUDED.op90_count, \
    op90_amount = EXCLUDED.op90_amount, \
    op60_count = EXCLUDED.op60_count, \
    op60_amount = EXCLUDED.op60_amount, \
    op30_count = EXCLUDED.op30_count, \
    op30_amount = EXCLUDED.op30_amount, \
    lost_count = EXCLUDED.lost_count, \
    lost_amount = EXCLUDED.lost_amount, \
    inactive_count = EXCLUDED.inactive_count, \
    ongoing_count = EXCLUDED.ongoing_count, \
    pending_count = EXCLUDED.pending_count, \
    declined_count = EXCLUDED.declined_count, \
    revised_count = EXCLUDED.revised_count, \
    is_manual = EXCLUDED.is_manual, \
    description = EXCLUDED.description, \
    created_by = EXCLUDED.created_by";

fn bind_metrics<'q>(
    q: Query<'q, Postgres, PgArguments>,
    m: &MetricsRecord,
) -> Query<'q, Postgres, PgArguments> {
    q.bind(m.total_opportunities)
        .bind(m.submitted_count)
        .bind(m.submitted_amount)
        .bind(m.op100_count)
        .bind(m.op100_amount)
        .bind(m.op90_count)
        .bind(m.op90_amount)
        .bind(m.op60_count)
        .bind(m.op60_amount)
        .bind(m.op30_count)
        .bind(m.op30_amount)
        .bind(m.lost_count)
        .bind(m.lost_amount)
        .bind(m.inactive_count)
        .bind(m.ongoing_count)
        .bind(m.pending_count)
        .bind(m.declined_count)
        .bind(m.revised_count)
}

/// Snapshot store backed by the `dashboard_snapshots` (global) and
/// `account_manager_snapshots` (per-scope) tables.
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn select_clause(scope_col: &str, table: &str) -> String {
        format!(
            "SELECT {scope_col} AS scope, snapshot_type, snapshot_date, {METRIC_COLS}, \
             is_manual, description, created_by, created_at FROM {table}"
        )
    }
}

impl SnapshotStore for PgSnapshotStore {
    async fn upsert(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        date: NaiveDate,
        record: &MetricsRecord,
        meta: &SnapshotMeta,
    ) -> Result<(), StorageError> {
        match scope {
            None => {
                let sql = format!(
                    "INSERT INTO dashboard_snapshots \
                     (snapshot_type, snapshot_date, {METRIC_COLS}, is_manual, description, created_by, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, CURRENT_TIMESTAMP) \
                     ON CONFLICT (snapshot_type, snapshot_date) DO UPDATE SET {METRIC_UPDATES}"
                );
                let q = sqlx::query(&sql).bind(kind.as_str()).bind(date);
                bind_metrics(q, record)
                    .bind(meta.is_manual)
                    .bind(&meta.description)
                    .bind(&meta.created_by)
                    .execute(&self.pool)
                    .await?;
            }
            Some(code) => {
                let sql = format!(
                    "INSERT INTO account_manager_snapshots \
                     (account_manager, snapshot_type, snapshot_date, {METRIC_COLS}, is_manual, description, created_by, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, CURRENT_TIMESTAMP) \
                     ON CONFLICT (account_manager, snapshot_type, snapshot_date) DO UPDATE SET {METRIC_UPDATES}"
                );
                let q = sqlx::query(&sql)
                    .bind(code)
                    .bind(kind.as_str())
                    .bind(date);
                bind_metrics(q, record)
                    .bind(meta.is_manual)
                    .bind(&meta.description)
                    .bind(&meta.created_by)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn find_exact(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        date: NaiveDate,
    ) -> Result<Option<SnapshotRow>, StorageError> {
        let row = match scope {
            None => {
                let sql = format!(
                    "{} WHERE snapshot_type = $1 AND snapshot_date = $2 \
                     ORDER BY created_at DESC LIMIT 1",
                    Self::select_clause("NULL::text", "dashboard_snapshots")
                );
                sqlx::query_as::<_, SnapshotRow>(&sql)
                    .bind(kind.as_str())
                    .bind(date)
                    .fetch_optional(&self.pool)
                    .await?
            }
            Some(code) => {
                let sql = format!(
                    "{} WHERE account_manager = $1 AND snapshot_type = $2 AND snapshot_date = $3 \
                     ORDER BY created_at DESC LIMIT 1",
                    Self::select_clause("account_manager", "account_manager_snapshots")
                );
                sqlx::query_as::<_, SnapshotRow>(&sql)
                    .bind(code)
                    .bind(kind.as_str())
                    .bind(date)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(row)
    }

    async fn find_nearest(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
        target: NaiveDate,
    ) -> Result<Option<NearestSnapshot>, StorageError> {
        // Ordering by (absolute gap, date asc) makes the earlier candidate win
        // ties.
        let row = match scope {
            None => {
                let sql = format!(
                    "{} WHERE snapshot_type = $1 \
                     ORDER BY ABS(snapshot_date - $2), snapshot_date ASC LIMIT 1",
                    Self::select_clause("NULL::text", "dashboard_snapshots")
                );
                sqlx::query_as::<_, SnapshotRow>(&sql)
                    .bind(kind.as_str())
                    .bind(target)
                    .fetch_optional(&self.pool)
                    .await?
            }
            Some(code) => {
                let sql = format!(
                    "{} WHERE account_manager = $1 AND snapshot_type = $2 \
                     ORDER BY ABS(snapshot_date - $3), snapshot_date ASC LIMIT 1",
                    Self::select_clause("account_manager", "account_manager_snapshots")
                );
                sqlx::query_as::<_, SnapshotRow>(&sql)
                    .bind(code)
                    .bind(kind.as_str())
                    .bind(target)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(row.map(|snapshot| {
            let days_difference = (snapshot.snapshot_date - target).num_days().abs();
            NearestSnapshot {
                snapshot,
                days_difference,
            }
        }))
    }

    async fn list_active_scopes(&self) -> Result<Vec<String>, StorageError> {
        let codes: Vec<String> = sqlx::query_scalar(
            "SELECT code FROM role_definitions \
             WHERE role_type = 'account_manager' AND is_active = TRUE AND is_resigned = FALSE \
             ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    async fn has_snapshot(
        &self,
        kind: SnapshotKind,
        date: NaiveDate,
    ) -> Result<bool, StorageError> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM dashboard_snapshots \
             WHERE snapshot_type = $1 AND snapshot_date = $2)",
        )
        .bind(kind.as_str())
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists.0)
    }

    async fn available_dates(
        &self,
        scope: Option<&str>,
        kind: SnapshotKind,
    ) -> Result<Vec<NaiveDate>, StorageError> {
        let dates: Vec<NaiveDate> = match scope {
            None => {
                sqlx::query_scalar(
                    "SELECT snapshot_date FROM dashboard_snapshots \
                     WHERE snapshot_type = $1 ORDER BY snapshot_date DESC",
                )
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            Some(code) => {
                sqlx::query_scalar(
                    "SELECT snapshot_date FROM account_manager_snapshots \
                     WHERE account_manager = $1 AND snapshot_type = $2 \
                     ORDER BY snapshot_date DESC",
                )
                .bind(code)
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(dates)
    }
}
