use std::net::SocketAddr;
use tracing::{info, warn};

pub const PAGES_FETCHED_TOTAL: &str = "ord_indexer_pages_fetched_total";
pub const FETCH_ERRORS_TOTAL: &str = "ord_indexer_fetch_errors_total";
pub const FETCH_DURATION_SECONDS: &str = "ord_indexer_fetch_duration_seconds";
pub const INSCRIPTIONS_FETCHED_TOTAL: &str = "ord_indexer_inscriptions_fetched_total";
pub const BATCHES_APPLIED_TOTAL: &str = "ord_indexer_batches_applied_total";
pub const BATCHES_FAILED_TOTAL: &str = "ord_indexer_batches_failed_total";
pub const BATCH_SIZE: &str = "ord_indexer_batch_size";
pub const TRANSITIONS_TOTAL: &str = "ord_indexer_transitions_total";
pub const CHECKPOINT: &str = "ord_indexer_checkpoint";

/// Install the Prometheus exporter on the given port.
pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

pub fn record_page_fetch(kind: &'static str, duration_secs: f64, ok: bool) {
    ::metrics::histogram!(FETCH_DURATION_SECONDS, "page" => kind).record(duration_secs);
    if ok {
        ::metrics::counter!(PAGES_FETCHED_TOTAL, "page" => kind).increment(1);
    } else {
        ::metrics::counter!(FETCH_ERRORS_TOTAL, "page" => kind).increment(1);
    }
}

pub fn record_inscription_fetched() {
    ::metrics::counter!(INSCRIPTIONS_FETCHED_TOTAL).increment(1);
}

pub fn record_transition(kind: &'static str, outcome: &'static str) {
    ::metrics::counter!(TRANSITIONS_TOTAL, "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_batch(size: usize, ok: bool) {
    ::metrics::histogram!(BATCH_SIZE).record(size as f64);
    if ok {
        ::metrics::counter!(BATCHES_APPLIED_TOTAL).increment(1);
    } else {
        ::metrics::counter!(BATCHES_FAILED_TOTAL).increment(1);
    }
}

pub fn record_checkpoint(inscription_id: i64) {
    ::metrics::gauge!(CHECKPOINT).set(inscription_id as f64);
}
