//! Prometheus metrics for the presale relayer
//!
//! Registered in the default registry and exposed on `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

lazy_static! {
    // Cycle metrics
    pub static ref CYCLES: IntCounterVec = register_int_counter_vec!(
        "presale_relayer_cycles_total",
        "Poll cycles run, by outcome",
        &["outcome"]
    ).expect("constant metric name is valid");

    pub static ref SCAN_ERRORS: IntCounter = register_int_counter!(
        "presale_relayer_scan_errors_total",
        "Log API scans that failed"
    ).expect("constant metric name is valid");

    pub static ref EVENTS_SEEN: IntCounter = register_int_counter!(
        "presale_relayer_events_seen_total",
        "Presale transfer events returned by the log API"
    ).expect("constant metric name is valid");

    // Payout metrics
    pub static ref PAYOUTS: IntCounterVec = register_int_counter_vec!(
        "presale_relayer_payouts_total",
        "Payout attempts, by status",
        &["status"]
    ).expect("constant metric name is valid");

    pub static ref PAYOUTS_UNCONFIRMED: IntCounter = register_int_counter!(
        "presale_relayer_payouts_unconfirmed_total",
        "Payouts broadcast without a receipt; the retry may pay twice"
    ).expect("constant metric name is valid");

    pub static ref PERSIST_FAILURES: IntCounter = register_int_counter!(
        "presale_relayer_state_persist_failures_total",
        "State file writes that failed"
    ).expect("constant metric name is valid");

    // Progress
    pub static ref CURSOR: IntGauge = register_int_gauge!(
        "presale_relayer_cursor_block",
        "Last source block fully relayed"
    ).expect("constant metric name is valid");

    pub static ref DEDUP_SIZE: IntGauge = register_int_gauge!(
        "presale_relayer_processed_set_size",
        "Entries in the processed-transaction set"
    ).expect("constant metric name is valid");

    pub static ref CONSECUTIVE_FAILURES: IntGauge = register_int_gauge!(
        "presale_relayer_consecutive_failures",
        "Failed cycles since the last clean one"
    ).expect("constant metric name is valid");

    // Health metrics
    pub static ref UP: IntGauge = register_int_gauge!(
        "presale_relayer_up",
        "Whether the relayer is up and running"
    ).expect("constant metric name is valid");

    pub static ref LAST_SUCCESSFUL_POLL: IntGauge = register_int_gauge!(
        "presale_relayer_last_successful_poll_timestamp",
        "Unix timestamp of the last successful scan"
    ).expect("constant metric name is valid");
}

/// Record a finished cycle
pub fn record_cycle(outcome: &str) {
    CYCLES.with_label_values(&[outcome]).inc();
}

pub fn record_scan_error() {
    SCAN_ERRORS.inc();
}

/// Record a successful scan and the number of events it returned
pub fn record_scan(events: usize) {
    EVENTS_SEEN.inc_by(events as u64);
    LAST_SUCCESSFUL_POLL.set(chrono::Utc::now().timestamp());
}

/// Record a payout outcome: "paid", "skipped" or a failure kind
pub fn record_payout(status: &str) {
    PAYOUTS.with_label_values(&[status]).inc();
}

/// Record a payout that was broadcast but never confirmed
pub fn record_unconfirmed_payout() {
    PAYOUTS_UNCONFIRMED.inc();
}

pub fn record_persist_failure() {
    PERSIST_FAILURES.inc();
}

/// Update progress gauges after a cycle
pub fn set_progress(cursor: u64, processed: usize, consecutive_failures: u32) {
    CURSOR.set(i64::try_from(cursor).unwrap_or(i64::MAX));
    DEDUP_SIZE.set(processed as i64);
    CONSECUTIVE_FAILURES.set(i64::from(consecutive_failures));
}
