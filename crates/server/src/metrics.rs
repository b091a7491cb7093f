//! Prometheus metrics for the HTTP surface.
//!
//! Transport metrics live here; issuance, calling and display metrics come
//! from `tokenline_core::metrics` and are registered alongside them.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tokenline_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tokenline_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tokenline_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tokenline_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tokenline_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tokenline_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tokenline_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// Client fell behind the broadcast channel.
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tokenline_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Queue Metrics (collected dynamically)
// =============================================================================

pub static STATIONS_OPEN: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("tokenline_stations_open", "Number of open stations").unwrap()
});

pub static TICKETS_TODAY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tokenline_tickets_today",
        "Tickets recorded in the registry for the current day",
    )
    .unwrap()
});

pub static CALLS_TODAY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tokenline_calls_today",
        "Call records in the ledger for the current day",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let local: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(AUTH_FAILURES_TOTAL.clone()),
        Box::new(WS_CONNECTIONS_ACTIVE.clone()),
        Box::new(WS_CONNECTIONS_TOTAL.clone()),
        Box::new(WS_MESSAGES_SENT.clone()),
        Box::new(WS_LAG_EVENTS.clone()),
        Box::new(STATIONS_OPEN.clone()),
        Box::new(TICKETS_TODAY.clone()),
        Box::new(CALLS_TODAY.clone()),
    ];
    for metric in local {
        registry.register(metric).unwrap();
    }

    for metric in tokenline_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Refresh gauges that mirror current state before a scrape.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let open = state
        .hub()
        .states()
        .await
        .iter()
        .filter(|s| s.is_open)
        .count();
    STATIONS_OPEN.set(open as i64);

    let today = state.calendar().today();
    if let Ok(count) = state.registry().count_rows(today) {
        TICKETS_TODAY.set(i64::from(count));
    }
    if let Ok(read) = state.ledger().read(today) {
        CALLS_TODAY.set(read.snapshot.called_tokens.len() as i64);
    }
}

static STATION_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/stations/[^/]+").unwrap());

/// Normalize a path for metric labels. Station ids become `{id}`.
pub fn normalize_path(path: &str) -> String {
    STATION_SEGMENT
        .replace_all(path, "/stations/{id}")
        .into_owned()
}
