//! Notification-of-change (COR/NOC) handling.
//!
//! Change records are surfaced to operators through logs and metrics; they
//! are never applied automatically.

use crate::ach::records::{Addenda98, EntryDetail};

#[derive(Default)]
pub struct CorrectionProcessor;

impl CorrectionProcessor {
    pub fn new() -> Self {
        CorrectionProcessor
    }

    pub fn process(&self, filename: &str, entry: &EntryDetail, addenda: &Addenda98) {
        metrics::counter!("correction_entries_total").increment(1);
        tracing::info!(
            filename = %filename,
            change_code = %addenda.change_code,
            original_trace = %addenda.original_trace,
            corrected_data = %addenda.corrected_data,
            amount = entry.amount,
            "notification of change received"
        );
    }
}
