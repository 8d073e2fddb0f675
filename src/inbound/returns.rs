//! Matching inbound return entries back to originated transfers.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::ach::codes::lookup_return_code;
use crate::ach::records::{Addenda99, EntryDetail};
use crate::domain::TransferStatus;
use crate::notify::{Direction, EmailNotifier, Message};
use crate::ports::TransferRepository;

pub struct ReturnProcessor {
    repo: Arc<dyn TransferRepository>,
    notifier: Option<Arc<EmailNotifier>>,
}

impl ReturnProcessor {
    pub fn new(repo: Arc<dyn TransferRepository>, notifier: Option<Arc<EmailNotifier>>) -> Self {
        ReturnProcessor { repo, notifier }
    }

    /// Handles one return entry. Lookup failures are recorded but never fail
    /// the surrounding file.
    pub async fn process(
        &self,
        filename: &str,
        entry: &EntryDetail,
        addenda: &Addenda99,
        effective_entry_date: NaiveDate,
    ) {
        let trace_number = &addenda.original_trace;
        if lookup_return_code(&addenda.return_code).is_none() {
            tracing::warn!(
                filename = %filename,
                return_code = %addenda.return_code,
                "unrecognized return reason code, recording as-is"
            );
        }

        let transfer = match self
            .repo
            .lookup_transfer_from_return(entry.amount, trace_number, effective_entry_date)
            .await
        {
            Ok(Some(transfer)) => transfer,
            Ok(None) => {
                metrics::counter!("unmatched_returns_total").increment(1);
                tracing::warn!(
                    filename = %filename,
                    trace_number = %trace_number,
                    amount = entry.amount,
                    "no transfer matched inbound return"
                );
                return;
            }
            Err(err) => {
                metrics::counter!("return_lookup_errors_total").increment(1);
                tracing::error!(
                    filename = %filename,
                    trace_number = %trace_number,
                    error = %err,
                    "return lookup failed"
                );
                return;
            }
        };

        // the first recorded code wins; the repository refuses overwrites
        if let Err(err) = self
            .repo
            .save_return_code(&transfer.transfer_id, &addenda.return_code)
            .await
        {
            tracing::error!(transfer_id = %transfer.transfer_id, error = %err, "failed to record return code");
            return;
        }
        if let Err(err) = self
            .repo
            .update_transfer_status(&transfer.transfer_id, TransferStatus::Returned)
            .await
        {
            tracing::error!(transfer_id = %transfer.transfer_id, error = %err, "failed to mark transfer RETURNED");
            return;
        }

        metrics::counter!("returns_matched_total").increment(1);
        tracing::info!(
            transfer_id = %transfer.transfer_id,
            return_code = %addenda.return_code,
            trace_number = %trace_number,
            "transfer returned"
        );

        if let Some(notifier) = &self.notifier {
            let message = Message {
                direction: Direction::Download,
                filename: filename.to_string(),
                hostname: String::new(),
                file: None,
            };
            if let Err(err) = notifier.send(&message).await {
                tracing::warn!(error = %err, "return notification failed");
            }
        }
    }
}
