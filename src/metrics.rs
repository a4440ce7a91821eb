use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::storage::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("aggregation failed: {0}")]
    Aggregation(String),
}

/// Flat rollup of pipeline state at a moment in time.
///
/// Counts are non-negative; `submitted_count` is cumulative (each submitted
/// opportunity counts as 1 plus one per revision, so it can exceed the number
/// of submitted opportunities). Absent categories aggregate to 0 / 0.0, never
/// NULL.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MetricsRecord {
    pub total_opportunities: i64,
    pub submitted_count: i64,
    pub submitted_amount: f64,
    pub op100_count: i64,
    pub op100_amount: f64,
    pub op90_count: i64,
    pub op90_amount: f64,
    pub op60_count: i64,
    pub op60_amount: f64,
    pub op30_count: i64,
    pub op30_amount: f64,
    pub lost_count: i64,
    pub lost_amount: f64,
    pub inactive_count: i64,
    pub ongoing_count: i64,
    pub pending_count: i64,
    pub declined_count: i64,
    pub revised_count: i64,
}

impl MetricsRecord {
    /// Scale every field, rounding counts to the nearest integer and flooring
    /// both counts and amounts at zero. Used for share-based and perturbed
    /// baseline estimation.
    pub fn scale(&self, count_factor: f64, amount_factor: f64) -> MetricsRecord {
        fn count(v: i64, f: f64) -> i64 {
            ((v as f64 * f).round() as i64).max(0)
        }
        fn amount(v: f64, f: f64) -> f64 {
            (v * f).max(0.0)
        }
        MetricsRecord {
            total_opportunities: count(self.total_opportunities, count_factor),
            submitted_count: count(self.submitted_count, count_factor),
            submitted_amount: amount(self.submitted_amount, amount_factor),
            op100_count: count(self.op100_count, count_factor),
            op100_amount: amount(self.op100_amount, amount_factor),
            op90_count: count(self.op90_count, count_factor),
            op90_amount: amount(self.op90_amount, amount_factor),
            op60_count: count(self.op60_count, count_factor),
            op60_amount: amount(self.op60_amount, amount_factor),
            op30_count: count(self.op30_count, count_factor),
            op30_amount: amount(self.op30_amount, amount_factor),
            lost_count: count(self.lost_count, count_factor),
            lost_amount: amount(self.lost_amount, amount_factor),
            inactive_count: count(self.inactive_count, count_factor),
            ongoing_count: count(self.ongoing_count, count_factor),
            pending_count: count(self.pending_count, count_factor),
            declined_count: count(self.declined_count, count_factor),
            revised_count: count(self.revised_count, count_factor),
        }
    }
}

/// Aggregation capability over the live opportunities table.
///
/// `scope` is `None` for the global rollup or an account manager code for a
/// filtered one. The store and scheduler are generic over this trait so tests
/// can drive them with in-memory sources.
#[allow(async_fn_in_trait)]
pub trait MetricsSource {
    /// Current metrics for the given scope.
    async fn metrics(&self, scope: Option<&str>) -> Result<MetricsRecord, MetricsError>;

    /// Number of opportunity rows currently attributed to the scope; used for
    /// share-based baseline scaling.
    async fn record_count(&self, scope: Option<&str>) -> Result<i64, MetricsError>;

    /// Metrics aggregated over rows received inside `[from, to]` for one
    /// scope. `total_opportunities` on the result doubles as the contributing
    /// row count.
    async fn window_metrics(
        &self,
        scope: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<MetricsRecord, MetricsError>;
}

// Aggregate column list shared by all metric queries. Submitted is cumulative:
// On-Going -> Submitted (+1), Submitted -> Revision (no change),
// Revision -> Submitted (+1 per revision), hence 1 + rev per submitted row.
const METRIC_AGGREGATES: &str = "\
    COUNT(*)::bigint AS total_opportunities, \
    COALESCE(SUM(CASE WHEN status = 'Submitted' THEN 1 + COALESCE(rev, 0) END), 0)::bigint AS submitted_count, \
    COALESCE(SUM(CASE WHEN status = 'Submitted' THEN final_amt END), 0)::double precision AS submitted_amount, \
    COUNT(CASE WHEN opp_status = 'OP100' THEN 1 END)::bigint AS op100_count, \
    COALESCE(SUM(CASE WHEN opp_status = 'OP100' THEN final_amt END), 0)::double precision AS op100_amount, \
    COUNT(CASE WHEN opp_status = 'OP90' THEN 1 END)::bigint AS op90_count, \
    COALESCE(SUM(CASE WHEN opp_status = 'OP90' THEN final_amt END), 0)::double precision AS op90_amount, \
    COUNT(CASE WHEN opp_status = 'OP60' THEN 1 END)::bigint AS op60_count, \
    COALESCE(SUM(CASE WHEN opp_status = 'OP60' THEN final_amt END), 0)::double precision AS op60_amount, \
    COUNT(CASE WHEN opp_status = 'OP30' THEN 1 END)::bigint AS op30_count, \
    COALESCE(SUM(CASE WHEN opp_status = 'OP30' THEN final_amt END), 0)::double precision AS op30_amount, \
    COUNT(CASE WHEN opp_status = 'LOST' OR decision = 'Lost' THEN 1 END)::bigint AS lost_count, \
    COALESCE(SUM(CASE WHEN opp_status = 'LOST' OR decision = 'Lost' THEN final_amt END), 0)::double precision AS lost_amount, \
    COUNT(CASE WHEN opp_status = 'Inactive' THEN 1 END)::bigint AS inactive_count, \
    COUNT(CASE WHEN status = 'On-Going' THEN 1 END)::bigint AS ongoing_count, \
    COUNT(CASE WHEN decision = 'Pending' THEN 1 END)::bigint AS pending_count, \
    COUNT(CASE WHEN decision = 'Decline' THEN 1 END)::bigint AS declined_count, \
    COUNT(CASE WHEN opp_status = 'Revised' THEN 1 END)::bigint AS revised_count";

/// Metrics source backed by the `opps_monitoring` table in Postgres.
pub struct PgMetricsSource {
    pool: PgPool,
}

impl PgMetricsSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl MetricsSource for PgMetricsSource {
    async fn metrics(&self, scope: Option<&str>) -> Result<MetricsRecord, MetricsError> {
        let record = match scope {
            None => {
                let sql = format!("SELECT {METRIC_AGGREGATES} FROM opps_monitoring");
                sqlx::query_as::<_, MetricsRecord>(&sql)
                    .fetch_one(&self.pool)
                    .await?
            }
            Some(code) => {
                let sql = format!(
                    "SELECT {METRIC_AGGREGATES} FROM opps_monitoring WHERE account_mgr = $1"
                );
                sqlx::query_as::<_, MetricsRecord>(&sql)
                    .bind(code)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(record)
    }

    async fn record_count(&self, scope: Option<&str>) -> Result<i64, MetricsError> {
        let count: (i64,) = match scope {
            None => {
                sqlx::query_as("SELECT COUNT(*)::bigint FROM opps_monitoring")
                    .fetch_one(&self.pool)
                    .await?
            }
            Some(code) => {
                sqlx::query_as(
                    "SELECT COUNT(*)::bigint FROM opps_monitoring WHERE account_mgr = $1",
                )
                .bind(code)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count.0)
    }

    async fn window_metrics(
        &self,
        scope: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<MetricsRecord, MetricsError> {
        let sql = format!(
            "SELECT {METRIC_AGGREGATES} FROM opps_monitoring \
             WHERE account_mgr = $1 AND date_received BETWEEN $2 AND $3"
        );
        let record = sqlx::query_as::<_, MetricsRecord>(&sql)
            .bind(scope)
            .bind(from)
            .bind(to)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }
}
