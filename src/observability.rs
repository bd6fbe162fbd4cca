use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests. Labels: method, route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "chairbook_http_requests_total";

/// Histogram: HTTP latency in seconds. Labels: method, route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "chairbook_http_request_duration_seconds";

/// Counter: booking attempts. Labels: outcome (booked, conflict, rejected, error).
pub const BOOKINGS_TOTAL: &str = "chairbook_bookings_total";

/// Histogram: time spent inside `book()`, lock wait included.
pub const BOOKING_DURATION_SECONDS: &str = "chairbook_booking_duration_seconds";

/// Counter: settled confirmations. Labels: status (confirmed, cancelled_conflict).
pub const CONFIRMATIONS_TOTAL: &str = "chairbook_confirmations_total";

// ── Background work ─────────────────────────────────────────────

/// Counter: pending appointments moved to `expired` by the sweep.
pub const APPOINTMENTS_EXPIRED_TOTAL: &str = "chairbook_appointments_expired_total";

/// Counter: past blocks removed by cleanup.
pub const EXCEPTIONS_PURGED_TOTAL: &str = "chairbook_exceptions_purged_total";

// ── Journal ─────────────────────────────────────────────────────

/// Counter: events durably appended and applied.
pub const EVENTS_COMMITTED_TOTAL: &str = "chairbook_events_committed_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "chairbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "chairbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Axum middleware recording request count and latency per matched route.
pub async fn track_http(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    let elapsed = started.elapsed().as_secs_f64();
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "route" => route)
        .record(elapsed);
    response
}
