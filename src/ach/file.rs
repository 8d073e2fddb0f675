//! File and batch aggregates with rendering, parsing and validation.

use super::records::{
    Addenda, BatchControl, BatchHeader, EntryDetail, FileControl, FileHeader, RecordError,
};
use super::{valid_routing_number, BLOCKING_FACTOR, RECORD_LENGTH};

#[derive(Debug, thiserror::Error)]
pub enum AchError {
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("file contains no batches")]
    NoBatches,
    #[error("batch {0} contains no entries")]
    EmptyBatch(u32),
    #[error("batch {batch}: {message}")]
    BatchRule { batch: u32, message: String },
    #[error("entry {trace}: {message}")]
    EntryRule { trace: String, message: String },
    #[error("file control mismatch: {0}")]
    ControlMismatch(String),
    #[error("unexpected record ordering at line {0}")]
    Ordering(usize),
    #[error("invalid routing number {0}")]
    InvalidRoutingNumber(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub header: BatchHeader,
    pub entries: Vec<EntryDetail>,
}

impl Batch {
    /// Recomputes the control record from the batch contents.
    pub fn control(&self) -> BatchControl {
        let entry_addenda_count =
            self.entries.iter().map(|e| 1 + e.addenda.len() as u32).sum::<u32>();
        BatchControl {
            service_class_code: self.header.service_class_code,
            entry_addenda_count,
            entry_hash: entry_hash(&self.entries),
            total_debit: self.entries.iter().filter(|e| e.is_debit()).map(|e| e.amount).sum(),
            total_credit: self.entries.iter().filter(|e| e.is_credit()).map(|e| e.amount).sum(),
            company_identification: self.header.company_identification.clone(),
            odfi_identification: self.header.odfi_identification.clone(),
            batch_number: self.header.batch_number,
        }
    }

    fn validate(&self) -> Result<(), AchError> {
        if self.entries.is_empty() {
            return Err(AchError::EmptyBatch(self.header.batch_number));
        }
        let scc = self.header.service_class_code;
        let any_debit = self.entries.iter().any(|e| e.is_debit());
        let any_credit = self.entries.iter().any(|e| e.is_credit());
        let expected_scc = service_class_for(any_debit, any_credit);
        if scc != expected_scc {
            return Err(AchError::BatchRule {
                batch: self.header.batch_number,
                message: format!("service class {scc} does not match entries (want {expected_scc})"),
            });
        }

        let mut previous_trace: Option<&str> = None;
        for entry in &self.entries {
            if entry.is_prenote() {
                if entry.amount != 0 {
                    return Err(AchError::EntryRule {
                        trace: entry.trace_number.clone(),
                        message: "prenotification entries must carry a zero amount".into(),
                    });
                }
            } else if entry.amount <= 0 {
                return Err(AchError::EntryRule {
                    trace: entry.trace_number.clone(),
                    message: format!("non-positive amount {}", entry.amount),
                });
            }
            if !entry.trace_number.starts_with(self.header.odfi_identification.as_str()) {
                return Err(AchError::EntryRule {
                    trace: entry.trace_number.clone(),
                    message: "trace number does not begin with the ODFI identification".into(),
                });
            }
            if let Some(prev) = previous_trace {
                if entry.trace_number.as_str() <= prev {
                    return Err(AchError::EntryRule {
                        trace: entry.trace_number.clone(),
                        message: "trace numbers must ascend within a batch".into(),
                    });
                }
            }
            previous_trace = Some(&entry.trace_number);
        }
        Ok(())
    }
}

/// 200 for mixed entries, 220 for credits only, 225 for debits only.
pub fn service_class_for(any_debit: bool, any_credit: bool) -> u16 {
    match (any_debit, any_credit) {
        (true, false) => 225,
        (false, true) => 220,
        _ => 200,
    }
}

fn entry_hash(entries: &[EntryDetail]) -> i64 {
    let sum: i64 = entries.iter().map(|e| e.routing_prefix()).sum();
    // only the low ten digits are retained
    sum % 10_000_000_000
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub header: FileHeader,
    pub batches: Vec<Batch>,
}

impl File {
    /// Recomputes the file control record from the batches.
    pub fn control(&self) -> FileControl {
        let entry_addenda_count: u32 = self
            .batches
            .iter()
            .flat_map(|b| &b.entries)
            .map(|e| 1 + e.addenda.len() as u32)
            .sum();
        // header + control per batch, plus the two file records
        let record_count = 2
            + self.batches.len() as u32 * 2
            + entry_addenda_count;
        let block_count = record_count.div_ceil(BLOCKING_FACTOR as u32);
        FileControl {
            batch_count: self.batches.len() as u32,
            block_count,
            entry_addenda_count,
            entry_hash: self
                .batches
                .iter()
                .map(|b| entry_hash(&b.entries))
                .sum::<i64>()
                % 10_000_000_000,
            total_debit: self.batches.iter().map(|b| b.control().total_debit).sum(),
            total_credit: self.batches.iter().map(|b| b.control().total_credit).sum(),
        }
    }

    /// All trace numbers in file order.
    pub fn trace_numbers(&self) -> Vec<String> {
        self.batches
            .iter()
            .flat_map(|b| &b.entries)
            .map(|e| e.trace_number.clone())
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.batches.iter().map(|b| b.entries.len()).sum()
    }

    /// Renders the file as 94-character lines padded to ten-record blocks.
    pub fn render(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        lines.push(self.header.render());
        for batch in &self.batches {
            lines.push(batch.header.render());
            for entry in &batch.entries {
                lines.push(entry.render());
                for addenda in &entry.addenda {
                    lines.push(addenda.render());
                }
            }
            lines.push(batch.control().render());
        }
        lines.push(self.control().render());
        while lines.len() % BLOCKING_FACTOR != 0 {
            lines.push("9".repeat(RECORD_LENGTH));
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    pub fn render_bytes(&self) -> Vec<u8> {
        self.render().into_bytes()
    }

    /// Parses a rendered file. Block-filler lines of all nines are skipped.
    pub fn parse(contents: &str) -> Result<Self, AchError> {
        let mut header: Option<FileHeader> = None;
        let mut control: Option<FileControl> = None;
        let mut batches: Vec<Batch> = Vec::new();
        let mut current: Option<Batch> = None;

        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if line.len() != RECORD_LENGTH {
                return Err(RecordError::BadLength(line.len()).into());
            }
            match line.chars().next().unwrap_or(' ') {
                '1' => header = Some(FileHeader::parse(line)?),
                '5' => {
                    if let Some(batch) = current.take() {
                        batches.push(batch);
                    }
                    current = Some(Batch {
                        header: BatchHeader::parse(line)?,
                        entries: Vec::new(),
                    });
                }
                '6' => {
                    let batch = current.as_mut().ok_or(AchError::Ordering(lineno + 1))?;
                    batch.entries.push(EntryDetail::parse(line)?);
                }
                '7' => {
                    let entry = current
                        .as_mut()
                        .and_then(|b| b.entries.last_mut())
                        .ok_or(AchError::Ordering(lineno + 1))?;
                    entry.addenda.push(Addenda::parse(line)?);
                }
                '8' => {
                    let batch = current.take().ok_or(AchError::Ordering(lineno + 1))?;
                    let parsed = BatchControl::parse(line)?;
                    let computed = batch.control();
                    if parsed.entry_addenda_count != computed.entry_addenda_count
                        || parsed.entry_hash != computed.entry_hash
                        || parsed.total_debit != computed.total_debit
                        || parsed.total_credit != computed.total_credit
                    {
                        return Err(AchError::ControlMismatch(format!(
                            "batch {} control does not match its entries",
                            batch.header.batch_number
                        )));
                    }
                    batches.push(batch);
                }
                '9' => {
                    if line.chars().all(|c| c == '9') {
                        continue; // block filler
                    }
                    control = Some(FileControl::parse(line)?);
                }
                other => return Err(RecordError::UnexpectedType(other).into()),
            }
        }

        if let Some(batch) = current.take() {
            batches.push(batch);
        }
        let header = header.ok_or(AchError::Ordering(0))?;
        let file = File { header, batches };
        if let Some(parsed) = control {
            let computed = file.control();
            if parsed.entry_addenda_count != computed.entry_addenda_count
                || parsed.entry_hash != computed.entry_hash
                || parsed.total_debit != computed.total_debit
                || parsed.total_credit != computed.total_credit
                || parsed.batch_count != computed.batch_count
            {
                return Err(AchError::ControlMismatch(
                    "file control does not match batch totals".into(),
                ));
            }
        }
        Ok(file)
    }

    /// Applies the balancing and sequencing rules a receiving operator would.
    pub fn validate(&self) -> Result<(), AchError> {
        if self.batches.is_empty() {
            return Err(AchError::NoBatches);
        }
        for batch in &self.batches {
            batch.validate()?;
            for entry in &batch.entries {
                let routing = format!("{}{}", entry.rdfi_identification, entry.check_digit);
                if !valid_routing_number(&routing) {
                    return Err(AchError::InvalidRoutingNumber(routing));
                }
            }
        }
        let mut previous = 0u32;
        for batch in &self.batches {
            if batch.header.batch_number <= previous {
                return Err(AchError::BatchRule {
                    batch: batch.header.batch_number,
                    message: "batch numbers must ascend within a file".into(),
                });
            }
            previous = batch.header.batch_number;
        }
        Ok(())
    }

    /// Whether this file's batches indicate returned entries (addenda 99).
    pub fn is_return_file(&self) -> bool {
        self.batches
            .iter()
            .flat_map(|b| &b.entries)
            .flat_map(|e| &e.addenda)
            .any(|a| matches!(a, Addenda::Return(_)))
    }

    /// Whether this file carries notifications of change (addenda 98).
    pub fn has_corrections(&self) -> bool {
        self.batches
            .iter()
            .flat_map(|b| &b.entries)
            .flat_map(|e| &e.addenda)
            .any(|a| matches!(a, Addenda::Change(_)))
    }
}

/// Merges rendered-per-transfer files into one file per gateway pair,
/// coalescing batches that share `(SEC, service class, company, effective
/// date)` and renumbering what remains.
pub fn flatten(files: Vec<File>) -> Vec<File> {
    let mut merged: Vec<File> = Vec::new();
    for file in files {
        let slot = merged.iter_mut().find(|f| {
            f.header.immediate_origin == file.header.immediate_origin
                && f.header.immediate_destination == file.header.immediate_destination
        });
        match slot {
            Some(target) => {
                for batch in file.batches {
                    let existing = target
                        .batches
                        .iter_mut()
                        .find(|b| b.header.merge_key() == batch.header.merge_key());
                    match existing {
                        Some(b) => b.entries.extend(batch.entries),
                        None => target.batches.push(batch),
                    }
                }
            }
            None => merged.push(file),
        }
    }
    for file in &mut merged {
        for (i, batch) in file.batches.iter_mut().enumerate() {
            batch.header.batch_number = i as u32 + 1;
            let any_debit = batch.entries.iter().any(|e| e.is_debit());
            let any_credit = batch.entries.iter().any(|e| e.is_credit());
            batch.header.service_class_code = service_class_for(any_debit, any_credit);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ach::records::new_entry;
    use chrono::{NaiveDate, NaiveTime};

    fn file_with_amounts(amounts: &[i64]) -> File {
        let mut entries = Vec::new();
        for (i, amount) in amounts.iter().enumerate() {
            entries.push(new_entry(
                22,
                "071000301",
                "123456",
                *amount,
                &format!("transfer-{i}"),
                "Jane Doe",
                format!("22147578{:0>7}", i + 1),
            ));
        }
        File {
            header: FileHeader {
                immediate_destination: "071000301".into(),
                immediate_origin: "221475786".into(),
                file_creation_date: NaiveDate::from_ymd_opt(2021, 4, 19).unwrap(),
                file_creation_time: NaiveTime::from_hms_opt(16, 20, 0).unwrap(),
                file_id_modifier: 'A',
                immediate_destination_name: "Federal Reserve".into(),
                immediate_origin_name: "My Bank".into(),
                reference_code: String::new(),
            },
            batches: vec![Batch {
                header: BatchHeader {
                    service_class_code: 220,
                    company_name: "My Company".into(),
                    company_discretionary_data: String::new(),
                    company_identification: "MOOV".into(),
                    standard_entry_class: "PPD".into(),
                    company_entry_description: "PAYMENT".into(),
                    company_descriptive_date: String::new(),
                    effective_entry_date: NaiveDate::from_ymd_opt(2021, 4, 20).unwrap(),
                    odfi_identification: "22147578".into(),
                    batch_number: 1,
                },
                entries,
            }],
        }
    }

    #[test]
    fn render_pads_to_ten_record_blocks() {
        let file = file_with_amounts(&[153]);
        let rendered = file.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 10);
        assert!(lines.iter().all(|l| l.len() == 94));
        assert_eq!(lines[9], "9".repeat(94).as_str());
    }

    #[test]
    fn parse_render_round_trip() {
        let file = file_with_amounts(&[153, 275, 19]);
        let parsed = File::parse(&file.render()).unwrap();
        assert_eq!(parsed, file);
        parsed.validate().unwrap();
    }

    #[test]
    fn control_totals_sum_entries() {
        let file = file_with_amounts(&[100, 250]);
        let control = file.control();
        assert_eq!(control.total_credit, 350);
        assert_eq!(control.total_debit, 0);
        assert_eq!(control.entry_addenda_count, 2);
        assert_eq!(control.entry_hash, 2 * 7_100_030);
    }

    #[test]
    fn parse_rejects_tampered_batch_totals() {
        let file = file_with_amounts(&[153]);
        let rendered = file.render();
        // bump the batch control credit total without touching the entry
        let tampered = rendered.replace("000000000153MOOV", "000000000253MOOV");
        assert!(matches!(File::parse(&tampered), Err(AchError::ControlMismatch(_))));
    }

    #[test]
    fn validate_rejects_descending_traces() {
        let mut file = file_with_amounts(&[100, 200]);
        file.batches[0].entries[1].trace_number = "221475780000000".into();
        assert!(file.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_amount_live_entries() {
        let file = file_with_amounts(&[0]);
        assert!(file.validate().is_err());
    }

    #[test]
    fn flatten_coalesces_matching_batch_headers() {
        let a = file_with_amounts(&[100]);
        let mut b = file_with_amounts(&[200]);
        b.batches[0].entries[0].trace_number = "221475780000002".into();
        let merged = flatten(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].batches.len(), 1);
        assert_eq!(merged[0].batches[0].entries.len(), 2);
        merged[0].validate().unwrap();
    }

    #[test]
    fn flatten_keeps_distinct_effective_dates_apart() {
        let a = file_with_amounts(&[100]);
        let mut b = file_with_amounts(&[200]);
        b.batches[0].entries[0].trace_number = "221475780000002".into();
        b.batches[0].header.effective_entry_date = NaiveDate::from_ymd_opt(2021, 4, 21).unwrap();
        let merged = flatten(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].batches.len(), 2);
        assert_eq!(merged[0].batches[1].header.batch_number, 2);
    }
}
