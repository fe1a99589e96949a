use actix_web::HttpResponse;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};

// Prometheus metrics for the chain scanner, labelled by blockchain key
lazy_static::lazy_static! {
    pub static ref BLOCKS_PROCESSED: IntCounterVec = register_int_counter_vec!(
        "ledgerbus_blocks_processed_total",
        "Blocks scanned without error",
        &["chain"]
    ).unwrap();

    pub static ref BLOCK_FAILURES: IntCounterVec = register_int_counter_vec!(
        "ledgerbus_block_failures_total",
        "Blocks whose processing failed and will be retried",
        &["chain"]
    ).unwrap();

    pub static ref DEPOSITS_FOUND: IntCounterVec = register_int_counter_vec!(
        "ledgerbus_deposit_entries_total",
        "Deposit entries upserted",
        &["chain"]
    ).unwrap();

    pub static ref WITHDRAWALS_CONFIRMED: IntCounterVec = register_int_counter_vec!(
        "ledgerbus_withdrawal_confirmations_total",
        "Withdrawal confirmation entries appended",
        &["chain"]
    ).unwrap();

    // Labelled by currency; the builder has no chain context
    pub static ref AMOUNTS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "ledgerbus_amounts_rejected_total",
        "Transfer entries dropped because the amount does not fit the ledger",
        &["currency"]
    ).unwrap();

    pub static ref CURSOR_HEIGHT: IntGaugeVec = register_int_gauge_vec!(
        "ledgerbus_cursor_height",
        "Last committed block height",
        &["chain"]
    ).unwrap();

    pub static ref BLOCK_PROCESS_TIME: HistogramVec = register_histogram_vec!(
        "ledgerbus_block_process_seconds",
        "Block processing time in seconds",
        &["chain"]
    ).unwrap();
}

// Handles GET /metrics requests to expose Prometheus metrics
pub async fn metrics() -> HttpResponse {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let encoded = encoder.encode_to_string(&metric_families).unwrap_or_default();
    HttpResponse::Ok().content_type("text/plain; version=0.0.4").body(encoded)
}
