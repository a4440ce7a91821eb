use std::fs;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Category of a snapshot, tied to the meeting it feeds.
///
/// `weekly_president` snapshots are compared against the previous Wednesday,
/// `monthly_townhall` against the first day of the previous month, and
/// `custom` against a user-picked date. The short `weekly`/`monthly` spellings
/// used by older dashboard endpoints are accepted on input.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    #[serde(alias = "weekly")]
    WeeklyPresident,
    #[serde(alias = "monthly")]
    MonthlyTownhall,
    Custom,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::WeeklyPresident => "weekly_president",
            SnapshotKind::MonthlyTownhall => "monthly_townhall",
            SnapshotKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
}

/// Scheduling knobs for the snapshot service.
///
/// The source deployment runs weekly snapshots every Monday at 13:30 and
/// townhall snapshots on the first Friday at 07:00, Manila time (UTC+8); the
/// defaults reproduce that.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed offset from UTC, in hours, used to derive the local calendar day.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// Day of week for the weekly report batch ("mon", "tue", ...).
    #[serde(default = "default_weekly_day")]
    pub weekly_day: String,
    #[serde(default = "default_weekly_hour")]
    pub weekly_hour: u32,
    #[serde(default = "default_weekly_minute")]
    pub weekly_minute: u32,
    /// Local hour at which the townhall triggers fire on candidate Fridays.
    #[serde(default = "default_townhall_hour")]
    pub townhall_hour: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound on concurrently aggregated scopes within one batch.
    #[serde(default = "default_max_parallel_scopes")]
    pub max_parallel_scopes: usize,
}

fn default_utc_offset_hours() -> i32 {
    8
}

fn default_weekly_day() -> String {
    "mon".to_string()
}

fn default_weekly_hour() -> u32 {
    13
}

fn default_weekly_minute() -> u32 {
    30
}

fn default_townhall_hour() -> u32 {
    7
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_max_parallel_scopes() -> usize {
    4
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset_hours(),
            weekly_day: default_weekly_day(),
            weekly_hour: default_weekly_hour(),
            weekly_minute: default_weekly_minute(),
            townhall_hour: default_townhall_hour(),
            poll_interval_secs: default_poll_interval_secs(),
            max_parallel_scopes: default_max_parallel_scopes(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_health_addr")]
    pub health_addr: String,
    #[serde(default = "default_dashboard_period_secs")]
    pub dashboard_period_secs: u64,
}

fn default_health_addr() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_dashboard_period_secs() -> u64 {
    60
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            health_addr: default_health_addr(),
            dashboard_period_secs: default_dashboard_period_secs(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

impl AppConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {path}"))?;
        let cfg: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to deserialize TOML config at {path}"))?;
        Ok(cfg)
    }
}
