/// Prometheus metrics for the asset service
///
/// Covers request traffic, the upload lifecycle, deletions and garbage
/// collection sweeps.

use crate::error::{StockroomError, StockroomResult};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, route, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "stockroom_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "stockroom_http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Asset Metrics ==========

    /// Upload descriptors issued, thumbnails included
    pub static ref UPLOAD_DESCRIPTORS_ISSUED: IntCounterVec = register_int_counter_vec!(
        "stockroom_upload_descriptors_issued_total",
        "Upload descriptors issued by file category",
        &["category"]
    )
    .unwrap();

    /// Uploads moved from pending to ready
    pub static ref UPLOADS_COMPLETED: IntCounter = register_int_counter!(
        "stockroom_uploads_completed_total",
        "Uploads marked ready"
    )
    .unwrap();

    /// Bytes accepted by the local upload endpoint
    pub static ref UPLOAD_BYTES: IntCounter = register_int_counter!(
        "stockroom_upload_bytes_total",
        "Bytes written through signed local uploads"
    )
    .unwrap();

    /// Asset rows deleted, by reason
    pub static ref ASSETS_DELETED: IntCounterVec = register_int_counter_vec!(
        "stockroom_assets_deleted_total",
        "Asset rows deleted",
        &["reason"]
    )
    .unwrap();

    /// Objects whose delete failed after their row was removed
    pub static ref ASSET_BLOB_DELETE_FAILURES: IntCounter = register_int_counter!(
        "stockroom_asset_blob_delete_failures_total",
        "Asset objects left in storage because deleting them failed"
    )
    .unwrap();

    /// Requests refused by the per-business rate limiter
    pub static ref RATE_LIMITED: IntCounterVec = register_int_counter_vec!(
        "stockroom_rate_limited_total",
        "Asset requests refused by the rate limiter",
        &["operation"]
    )
    .unwrap();

    // ========== GC Metrics ==========

    /// Garbage collection sweeps by outcome
    pub static ref GC_RUNS: IntCounterVec = register_int_counter_vec!(
        "stockroom_gc_runs_total",
        "Garbage collection sweeps",
        &["status"]
    )
    .unwrap();

    /// Garbage collection sweep duration in seconds
    pub static ref GC_DURATION: Histogram = register_histogram!(
        "stockroom_gc_duration_seconds",
        "Garbage collection sweep duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    )
    .unwrap();

    /// Unix time of the last finished sweep
    pub static ref GC_LAST_RUN: IntGauge = register_int_gauge!(
        "stockroom_gc_last_run_timestamp_seconds",
        "Unix time of the last finished garbage collection sweep"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> StockroomResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| StockroomError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| StockroomError::Internal(format!("Metrics are not UTF-8: {}", e)))
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}
