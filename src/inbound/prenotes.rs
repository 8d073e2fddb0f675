//! Prenotification handling: successful prenotes are informational only.

use crate::ach::records::EntryDetail;

#[derive(Default)]
pub struct PrenoteProcessor;

impl PrenoteProcessor {
    pub fn new() -> Self {
        PrenoteProcessor
    }

    pub fn process(&self, filename: &str, entry: &EntryDetail) {
        metrics::counter!("prenote_entries_total").increment(1);
        tracing::info!(
            filename = %filename,
            trace_number = %entry.trace_number,
            transaction_code = entry.transaction_code,
            "prenotification entry received"
        );
    }
}
