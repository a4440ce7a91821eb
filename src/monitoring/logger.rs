use serde::Serialize;
use tracing::info;

use crate::types::AppConfig;

#[derive(Serialize)]
struct StartupLog<'a> {
    event: &'a str,
    weekly_day: &'a str,
    weekly_at: String,
    townhall_hour: u32,
    utc_offset_hours: i32,
    health_addr: &'a str,
}

pub fn log_startup(cfg: &AppConfig) {
    let payload = StartupLog {
        event: "startup",
        weekly_day: &cfg.scheduler.weekly_day,
        weekly_at: format!(
            "{:02}:{:02}",
            cfg.scheduler.weekly_hour, cfg.scheduler.weekly_minute
        ),
        townhall_hour: cfg.scheduler.townhall_hour,
        utc_offset_hours: cfg.scheduler.utc_offset_hours,
        health_addr: &cfg.service.health_addr,
    };
    info!(target: "service", startup = serde_json::to_string(&payload).unwrap_or_default().as_str());
}
