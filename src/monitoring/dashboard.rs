use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::time::interval;
use tracing::warn;

use crate::monitoring::metrics::{log_metrics_snapshot, METRICS};

/// Spawn a background task that periodically logs a compact metrics snapshot.
///
/// This provides a simple terminal "dashboard" when combined with `tracing`
/// JSON logs and `jq`/`grep` on the operator side.
pub fn spawn_dashboard_task(period: Duration) {
    let mut ticker = interval(period);
    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            let snapshot = METRICS.snapshot();
            log_metrics_snapshot(&snapshot);
        }
    });
}

/// Simple health-check TCP listener exposing an HTTP-style `/health` endpoint.
///
/// Scheduler failures are operator-facing only: this is the surface an
/// operator probes, while dashboard users never see them. Responds `OK` while
/// the scheduler loop has ticked recently, `STALE` otherwise.
pub async fn serve_health(addr: &str, max_staleness: Duration) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (mut socket, _) = listener.accept().await?;
        let mut buf = [0u8; 1024];

        // Best-effort read of the incoming request; we don't inspect the path
        // in detail but this keeps the interface roughly HTTP-compatible.
        let _ = socket.readable().await;
        let _ = socket.try_read(&mut buf);

        let healthy = METRICS.is_healthy(max_staleness);
        let body = if healthy { "OK" } else { "STALE" };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: text/plain\r\n\r\n{}",
            body.len(),
            body
        );

        // A probe that resets its connection mid-response must not take the
        // listener down with it. Only bind/accept failures end the task.
        if let Err(err) = socket.write_all(response.as_bytes()).await {
            warn!(target: "monitoring", error = %err, "health response write failed");
            continue;
        }
        if let Err(err) = socket.shutdown().await {
            warn!(target: "monitoring", error = %err, "health socket shutdown failed");
        }
    }
}
