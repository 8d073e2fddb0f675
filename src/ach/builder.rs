//! Builds a validated NACHA file for a single accepted transfer.

use chrono::{NaiveDate, NaiveDateTime};

use crate::customers::{Account, Customer};
use crate::domain::{AccountType, Transfer};

use super::codes::{transaction_code, EntryDirection, SecCode, UnsupportedTransaction};
use super::file::{service_class_for, AchError, Batch, File};
use super::records::{new_entry, BatchHeader, FileHeader};
use super::{aba8, numeric};

/// Minimum amount (in minor units) for which balancing offset entries are
/// emitted. Smaller transfers are assumed to be account-validation deposits.
pub const BALANCE_ENTRY_MINIMUM: i64 = 50;

/// The immediate origin/destination pair written into file headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gateway {
    pub origin: String,
    pub origin_name: String,
    pub destination: String,
    pub destination_name: String,
}

/// Internal account at the ODFI used to balance batches to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetAccount {
    pub routing_number: String,
    pub account_number: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub odfi_routing_number: String,
    pub gateway: Gateway,
    pub company_identification: String,
    pub company_name: String,
    pub company_entry_description: String,
    pub balance_entries: bool,
    pub offset: Option<OffsetAccount>,
    pub effective_entry_date: NaiveDate,
    /// Local wall clock in the cutoff timezone, stamped into the file header.
    pub file_creation: NaiveDateTime,
    /// First entry sequence to draw trace numbers from. Callers building
    /// several files for one upload pass a running counter so traces stay
    /// unique across batch flattening.
    pub starting_sequence: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedTransaction),
    #[error("balancing requested but no offset account is configured")]
    MissingOffsetAccount,
    #[error("constructed file failed validation: {0}")]
    Validation(#[from] AchError),
}

/// A resolved transfer endpoint: the stored account joined with the current
/// customer record and decrypted account number.
#[derive(Debug, Clone)]
pub struct Participant {
    pub customer: Customer,
    pub account: Account,
    pub account_number: String,
}

/// Trace numbers are the ODFI routing prefix followed by a seven-digit
/// entry sequence.
pub fn trace_number(odfi_routing_number: &str, sequence: u32) -> String {
    format!("{}{}", aba8(odfi_routing_number), numeric(i64::from(sequence), 7))
}

/// Constructs one file with one batch for the transfer. The entry detail
/// targets the counterparty (the non-ODFI side); when balancing is enabled
/// and the amount is large enough, a reversing entry against the offset
/// account nets the batch to zero.
///
/// Returns the file along with the trace numbers assigned, in entry order.
pub fn build_file(
    transfer_id: &str,
    opts: &Options,
    xfer: &Transfer,
    source: &Participant,
    destination: &Participant,
) -> Result<(File, Vec<String>), BuildError> {
    let odfi = &opts.odfi_routing_number;
    let debit_source = destination.account.routing_number == *odfi;

    let sec = if source.customer.customer_type.is_consumer()
        || destination.customer.customer_type.is_consumer()
    {
        SecCode::Ppd
    } else {
        SecCode::Ccd
    };

    let (counterparty, direction) = if debit_source {
        (source, EntryDirection::Debit)
    } else {
        (destination, EntryDirection::Credit)
    };

    let code = transaction_code(counterparty.account.account_type, direction, false)?;
    let mut sequence = opts.starting_sequence;
    let mut traces = Vec::new();

    let mut individual_id = transfer_id.to_string();
    individual_id.truncate(15);

    let first_trace = trace_number(odfi, sequence);
    traces.push(first_trace.clone());
    let mut entries = vec![new_entry(
        code.0,
        &counterparty.account.routing_number,
        &counterparty.account_number,
        xfer.amount.value,
        &individual_id,
        &counterparty.customer.display_name(),
        first_trace,
    )];

    let balance = opts.balance_entries && xfer.amount.value >= BALANCE_ENTRY_MINIMUM;
    if balance {
        let offset = opts.offset.as_ref().ok_or(BuildError::MissingOffsetAccount)?;
        let offset_direction = match direction {
            EntryDirection::Credit => EntryDirection::Debit,
            EntryDirection::Debit => EntryDirection::Credit,
        };
        let offset_code = transaction_code(offset.account_type, offset_direction, false)?;
        sequence += 1;
        let offset_trace = trace_number(odfi, sequence);
        traces.push(offset_trace.clone());
        entries.push(new_entry(
            offset_code.0,
            &offset.routing_number,
            &offset.account_number,
            xfer.amount.value,
            &individual_id,
            "OFFSET",
            offset_trace,
        ));
    }

    let any_debit = entries.iter().any(|e| e.is_debit());
    let any_credit = entries.iter().any(|e| e.is_credit());

    let mut description = opts.company_entry_description.clone();
    if description.is_empty() {
        description = xfer.description.clone();
    }
    description.truncate(10);

    let batch = Batch {
        header: BatchHeader {
            service_class_code: service_class_for(any_debit, any_credit),
            company_name: opts.company_name.clone(),
            company_discretionary_data: String::new(),
            company_identification: opts.company_identification.clone(),
            standard_entry_class: sec.as_str().to_string(),
            company_entry_description: description,
            company_descriptive_date: String::new(),
            effective_entry_date: opts.effective_entry_date,
            odfi_identification: aba8(odfi).to_string(),
            batch_number: 1,
        },
        entries,
    };

    let file = File {
        header: FileHeader {
            immediate_destination: opts.gateway.destination.clone(),
            immediate_origin: opts.gateway.origin.clone(),
            file_creation_date: opts.file_creation.date(),
            file_creation_time: opts.file_creation.time(),
            file_id_modifier: 'A',
            immediate_destination_name: opts.gateway.destination_name.clone(),
            immediate_origin_name: opts.gateway.origin_name.clone(),
            reference_code: String::new(),
        },
        batches: vec![batch],
    };

    file.validate()?;
    Ok((file, traces))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customers::{CustomerStatus, CustomerType};
    use crate::domain::{Amount, Endpoint, TransferStatus};
    use chrono::{NaiveTime, Utc};

    pub(crate) fn participant(
        routing: &str,
        account_number: &str,
        account_type: AccountType,
        customer_type: CustomerType,
    ) -> Participant {
        Participant {
            customer: Customer {
                customer_id: format!("cust-{routing}"),
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                customer_type,
                status: CustomerStatus::Verified,
            },
            account: Account {
                account_id: format!("acct-{routing}"),
                routing_number: routing.into(),
                account_type,
            },
            account_number: account_number.into(),
        }
    }

    fn transfer(value: i64) -> Transfer {
        Transfer {
            transfer_id: "a".repeat(40),
            organization: "org".into(),
            amount: Amount {
                currency: "USD".into(),
                value,
            },
            source: endpoint("221475786"),
            destination: endpoint("071000301"),
            description: "test payment".into(),
            status: TransferStatus::Pending,
            same_day: false,
            return_code: None,
            processed_at: None,
            created_at: Utc::now(),
            trace_numbers: Vec::new(),
        }
    }

    fn endpoint(routing: &str) -> Endpoint {
        Endpoint {
            customer_id: "cust".into(),
            account_id: "acct".into(),
            routing_number: routing.into(),
            account_number: "12345".into(),
            account_type: AccountType::Checking,
        }
    }

    fn options(balance: bool) -> Options {
        Options {
            odfi_routing_number: "221475786".into(),
            gateway: Gateway {
                origin: "221475786".into(),
                origin_name: "My Bank".into(),
                destination: "071000301".into(),
                destination_name: "Their Bank".into(),
            },
            company_identification: "MOOV".into(),
            company_name: "My Company".into(),
            company_entry_description: "PAYMENT".into(),
            balance_entries: balance,
            offset: Some(OffsetAccount {
                routing_number: "221475786".into(),
                account_number: "99887766".into(),
                account_type: AccountType::Checking,
            }),
            effective_entry_date: chrono::NaiveDate::from_ymd_opt(2021, 4, 20).unwrap(),
            file_creation: chrono::NaiveDate::from_ymd_opt(2021, 4, 19)
                .unwrap()
                .and_time(NaiveTime::from_hms_opt(16, 20, 0).unwrap()),
            starting_sequence: 1,
        }
    }

    #[test]
    fn credit_to_remote_account_with_offset() {
        let src = participant("221475786", "11111", AccountType::Checking, CustomerType::Individual);
        let dst = participant("071000301", "22222", AccountType::Checking, CustomerType::Individual);
        let (file, traces) = build_file("transfer-1", &options(true), &transfer(153), &src, &dst).unwrap();

        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0], "221475780000001");
        assert_eq!(traces[1], "221475780000002");

        let batch = &file.batches[0];
        assert_eq!(batch.header.standard_entry_class, "PPD");
        assert_eq!(batch.header.service_class_code, 200);
        assert_eq!(batch.entries.len(), 2);
        // main entry credits the remote side
        assert_eq!(batch.entries[0].transaction_code, 22);
        assert_eq!(batch.entries[0].rdfi_identification, "07100030");
        // offset debits the internal account, netting the batch to zero
        assert_eq!(batch.entries[1].transaction_code, 27);
        let control = batch.control();
        assert_eq!(control.total_credit, control.total_debit);
    }

    #[test]
    fn small_amounts_skip_the_offset() {
        let src = participant("221475786", "11111", AccountType::Checking, CustomerType::Individual);
        let dst = participant("071000301", "22222", AccountType::Checking, CustomerType::Individual);
        let (file, traces) = build_file("transfer-1", &options(true), &transfer(25), &src, &dst).unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(file.batches[0].entries.len(), 1);
    }

    #[test]
    fn debit_pulls_from_the_remote_source() {
        let src = participant("071000301", "11111", AccountType::Savings, CustomerType::Individual);
        let dst = participant("221475786", "22222", AccountType::Checking, CustomerType::Individual);
        let (file, _) = build_file("transfer-1", &options(false), &transfer(500), &src, &dst).unwrap();
        let entry = &file.batches[0].entries[0];
        assert_eq!(entry.transaction_code, 37);
        assert_eq!(entry.rdfi_identification, "07100030");
        assert_eq!(entry.dfi_account_number, "11111");
    }

    #[test]
    fn corporate_endpoints_use_ccd() {
        let src = participant("221475786", "11111", AccountType::Checking, CustomerType::Business);
        let dst = participant("071000301", "22222", AccountType::Checking, CustomerType::Business);
        let (file, _) = build_file("transfer-1", &options(false), &transfer(500), &src, &dst).unwrap();
        assert_eq!(file.batches[0].header.standard_entry_class, "CCD");
    }

    #[test]
    fn balancing_without_offset_account_fails() {
        let src = participant("221475786", "11111", AccountType::Checking, CustomerType::Individual);
        let dst = participant("071000301", "22222", AccountType::Checking, CustomerType::Individual);
        let mut opts = options(true);
        opts.offset = None;
        let err = build_file("transfer-1", &opts, &transfer(153), &src, &dst).unwrap_err();
        assert!(matches!(err, BuildError::MissingOffsetAccount));
    }

    #[test]
    fn built_files_round_trip() {
        let src = participant("221475786", "11111", AccountType::Checking, CustomerType::Individual);
        let dst = participant("071000301", "22222", AccountType::Checking, CustomerType::Individual);
        let (file, _) = build_file("transfer-1", &options(true), &transfer(153), &src, &dst).unwrap();
        let parsed = File::parse(&file.render()).unwrap();
        assert_eq!(parsed, file);
    }
}
