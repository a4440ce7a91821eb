use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::metrics::MetricsRecord;

/// Persisted snapshot row shared by the global and per-scope tables.
///
/// `scope` is `None` for rows from `dashboard_snapshots` and the account
/// manager code for rows from `account_manager_snapshots`; queries alias the
/// identity column so both tables deserialize into this one shape.
#[derive(Clone, Debug, Serialize, Deserialize, FromRow)]
pub struct SnapshotRow {
    pub scope: Option<String>,
    pub snapshot_type: String,
    pub snapshot_date: NaiveDate,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub metrics: MetricsRecord,
    pub is_manual: bool,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Non-metric fields written alongside a snapshot upsert.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub is_manual: bool,
    pub description: String,
    pub created_by: String,
}

/// Closest stored snapshot to a requested date, with the absolute day gap.
#[derive(Clone, Debug, Serialize)]
pub struct NearestSnapshot {
    pub snapshot: SnapshotRow,
    pub days_difference: i64,
}
