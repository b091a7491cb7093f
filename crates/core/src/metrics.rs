//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Issuance (tickets, failures, sequence conflicts, vouchers)
//! - Stations (calls, claim conflicts, empty queues)
//! - Display (aggregator polls, notifications, anomalies)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Issuance
// =============================================================================

/// Tickets durably recorded in the registry.
pub static TICKETS_ISSUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tokenline_tickets_issued_total", "Total tickets issued").unwrap()
});

/// Issuance attempts that did not produce a ticket, by reason.
pub static ISSUE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tokenline_issue_failures_total",
            "Total failed ticket issuances",
        ),
        &["reason"], // "validation", "registry", "contention"
    )
    .unwrap()
});

/// Appends rejected because another issuer took the sequence number first.
pub static SEQUENCE_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tokenline_sequence_conflicts_total",
        "Registry appends rejected as duplicate sequence numbers",
    )
    .unwrap()
});

/// Voucher generation results.
pub static VOUCHERS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tokenline_vouchers_total", "Voucher generation results"),
        &["result"], // "written", "failed"
    )
    .unwrap()
});

/// Last sequence number issued for the current day.
pub static CURRENT_SEQUENCE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tokenline_current_sequence",
        "Highest sequence number issued for the active day",
    )
    .unwrap()
});

/// Day rollovers observed by the sequence authority.
pub static DAY_ROLLOVERS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tokenline_day_rollovers_total", "Total day rollovers").unwrap()
});

// =============================================================================
// Stations
// =============================================================================

/// Tokens called, by station.
pub static TOKENS_CALLED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tokenline_tokens_called_total", "Total tokens called"),
        &["station"],
    )
    .unwrap()
});

/// Lost claim races, by station.
pub static CLAIM_CONFLICTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tokenline_claim_conflicts_total",
            "Ledger claims that lost a race and were retried",
        ),
        &["station"],
    )
    .unwrap()
});

/// `call_next` on a drained queue, by station.
pub static QUEUE_EMPTY: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tokenline_queue_empty_total",
            "Call attempts that found no uncalled ticket",
        ),
        &["station"],
    )
    .unwrap()
});

/// Ledger claim duration in seconds, by backend.
pub static CLAIM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tokenline_claim_duration_seconds",
            "Duration of atomic ledger claims",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["backend"],
    )
    .unwrap()
});

// =============================================================================
// Display
// =============================================================================

/// Aggregator polls, by result.
pub static AGGREGATOR_POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tokenline_aggregator_polls_total", "Total aggregator polls"),
        &["result"], // "ok", "error"
    )
    .unwrap()
});

/// Display notifications raised.
pub static NOTIFICATIONS_RAISED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tokenline_notifications_raised_total",
        "Display notifications raised on a station change",
    )
    .unwrap()
});

/// Tokens seen in more than one call record on the last poll.
pub static DUPLICATE_CALLS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "tokenline_duplicate_calls",
        "Tokens called more than once for the active day",
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Issuance
        Box::new(TICKETS_ISSUED.clone()),
        Box::new(ISSUE_FAILURES.clone()),
        Box::new(SEQUENCE_CONFLICTS.clone()),
        Box::new(VOUCHERS.clone()),
        Box::new(CURRENT_SEQUENCE.clone()),
        Box::new(DAY_ROLLOVERS.clone()),
        // Stations
        Box::new(TOKENS_CALLED.clone()),
        Box::new(CLAIM_CONFLICTS.clone()),
        Box::new(QUEUE_EMPTY.clone()),
        Box::new(CLAIM_DURATION.clone()),
        // Display
        Box::new(AGGREGATOR_POLLS.clone()),
        Box::new(NOTIFICATIONS_RAISED.clone()),
        Box::new(DUPLICATE_CALLS.clone()),
    ]
}
