//! Fund-flow strategies decide how an accepted transfer becomes ACH files.
//!
//! The gateway runs as an originator at a financial institution, so funds
//! move in exactly one direction relative to the ODFI: outgoing credits are
//! debited from the institution's account without delay, and debits of a
//! remote account hold the pulled funds for a settlement period.

use chrono::{NaiveDate, Utc};

use crate::ach::builder::{build_file, BuildError, Options, Participant};
use crate::ach::effective_date::calculate_effective_entry_date;
use crate::ach::File;
use crate::config::OdfiConfig;
use crate::domain::Transfer;

#[derive(Debug, thiserror::Error)]
pub enum OriginationError {
    /// Both endpoints are within the ODFI; such moves belong in a ledger,
    /// not in a file sent anywhere.
    #[error("rejecting transfer between two accounts within {0}")]
    EndpointRejected(String),
    /// Neither endpoint belongs to the ODFI.
    #[error("rejecting third-party transfer between institutions we don't represent (source: {source_routing}, destination: {destination})")]
    ThirdPartyRejected { source_routing: String, destination: String },
    /// Debiting the source requires a verified customer.
    #[error("source customerID={customer_id} does not support debit with status {status:?}")]
    DebitNotAllowed {
        customer_id: String,
        status: crate::customers::CustomerStatus,
    },
    #[error("failed to create file for transferID={transfer_id}: {source}")]
    BuildFailed {
        transfer_id: String,
        #[source]
        source: BuildError,
    },
}

/// A closed set of origination strategies selected at startup.
pub trait Strategy: Send + Sync {
    /// Builds the outbound files for one transfer, returning the files
    /// paired with the trace numbers assigned to the transfer's entries.
    fn originate(
        &self,
        company_id: &str,
        xfer: &Transfer,
        source: &Participant,
        destination: &Participant,
        starting_sequence: u32,
    ) -> Result<(Vec<File>, Vec<String>), OriginationError>;
}

/// First-party fund flow: the ODFI must be on exactly one side of every
/// transfer, and a single file carries each one.
pub struct FirstParty {
    cfg: OdfiConfig,
}

impl FirstParty {
    pub fn new(cfg: OdfiConfig) -> Self {
        FirstParty { cfg }
    }

    fn effective_entry_date(&self, same_day: bool) -> NaiveDate {
        let now = Utc::now().with_timezone(&self.cfg.cutoffs.timezone);
        calculate_effective_entry_date(
            &self.cfg.cutoffs.windows,
            &self.cfg.cutoffs.holidays,
            now,
            same_day,
        )
    }
}

impl Strategy for FirstParty {
    fn originate(
        &self,
        company_id: &str,
        xfer: &Transfer,
        source: &Participant,
        destination: &Participant,
        starting_sequence: u32,
    ) -> Result<(Vec<File>, Vec<String>), OriginationError> {
        let src_routing = &source.account.routing_number;
        let dst_routing = &destination.account.routing_number;

        if src_routing == dst_routing {
            return Err(OriginationError::EndpointRejected(src_routing.clone()));
        }
        if *src_routing != self.cfg.routing_number && *dst_routing != self.cfg.routing_number {
            return Err(OriginationError::ThirdPartyRejected {
                source_routing: src_routing.clone(),
                destination: dst_routing.clone(),
            });
        }

        // Debiting the source requires that customer to be verified.
        if *dst_routing == self.cfg.routing_number && !source.customer.status.allows_debit() {
            return Err(OriginationError::DebitNotAllowed {
                customer_id: source.customer.customer_id.clone(),
                status: source.customer.status,
            });
        }

        let now_local = Utc::now().with_timezone(&self.cfg.cutoffs.timezone);
        let opts = Options {
            odfi_routing_number: self.cfg.routing_number.clone(),
            gateway: self.cfg.gateway.clone(),
            company_identification: company_id.to_string(),
            company_name: self.cfg.file_config.company_name.clone(),
            company_entry_description: self.cfg.file_config.company_descriptor.clone(),
            balance_entries: self.cfg.file_config.balance_entries,
            offset: self.cfg.file_config.offset.clone(),
            effective_entry_date: self.effective_entry_date(xfer.same_day),
            file_creation: now_local.naive_local(),
            starting_sequence,
        };

        let (file, traces) =
            build_file(&xfer.transfer_id, &opts, xfer, source, destination).map_err(|source| {
                OriginationError::BuildFailed {
                    transfer_id: xfer.transfer_id.clone(),
                    source,
                }
            })?;
        Ok((vec![file], traces))
    }
}
