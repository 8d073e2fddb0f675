//! Process-wide metrics.
//!
//! Counters are registered through the `metrics` facade and exported in
//! Prometheus text format by the admin `/metrics` endpoint. Installation
//! happens once at startup; the returned handle is cheap to clone.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(
        "transfers_created_total",
        "Transfers accepted through the API"
    );
    metrics::describe_counter!(
        "transfers_processed_total",
        "Transfers included in an uploaded ACH file"
    );
    metrics::describe_counter!(
        "transfers_failed_total",
        "Transfers that failed deterministically at file construction"
    );
    metrics::describe_counter!("ach_files_uploaded_total", "ACH files uploaded");
    metrics::describe_counter!("ach_upload_errors_total", "Failed ACH file uploads");
    metrics::describe_counter!("ach_flush_errors_total", "Cutoff flushes that failed");
    metrics::describe_counter!(
        "transfer_publish_errors_total",
        "Accepted transfers that could not be published to the bus"
    );
    metrics::describe_counter!(
        "inbound_files_processed_total",
        "Inbound ACH files processed successfully"
    );
    metrics::describe_counter!(
        "inbound_parse_errors_total",
        "Inbound files that failed to parse"
    );
    metrics::describe_counter!("returns_matched_total", "Return entries matched to transfers");
    metrics::describe_counter!(
        "unmatched_returns_total",
        "Return entries with no matching transfer"
    );
    metrics::describe_counter!(
        "return_lookup_errors_total",
        "Return matches aborted by repository errors"
    );
    metrics::describe_counter!("correction_entries_total", "Notification-of-change entries");
    metrics::describe_counter!("prenote_entries_total", "Prenotification entries");

    Ok(handle)
}
