//! Operator notifications for file movement and matched returns.

mod email;

pub use email::EmailNotifier;

use crate::ach::File;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl Direction {
    fn verb(&self) -> &'static str {
        match self {
            Direction::Upload => "uploaded",
            Direction::Download => "downloaded",
        }
    }
}

/// Counts and totals pulled out of a file for the message body.
#[derive(Debug, Clone, Default)]
pub struct FileSummary {
    pub batch_count: usize,
    pub entry_count: usize,
    pub debit_total: i64,
    pub credit_total: i64,
}

impl FileSummary {
    pub fn from_file(file: &File) -> Self {
        let control = file.control();
        FileSummary {
            batch_count: file.batches.len(),
            entry_count: file.entry_count(),
            debit_total: control.total_debit,
            credit_total: control.total_credit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub direction: Direction,
    pub filename: String,
    pub hostname: String,
    pub file: Option<FileSummary>,
}

fn dollars(minor_units: i64) -> f64 {
    minor_units as f64 / 100.0
}

fn render_body(company_name: &str, msg: &Message) -> String {
    let mut body = format!(
        "{} has {} {} with {}.\n",
        company_name,
        msg.direction.verb(),
        msg.filename,
        msg.hostname,
    );
    if let Some(summary) = &msg.file {
        body.push_str(&format!(
            "\nBatches: {}\nEntries: {}\nDebit total: ${:.2}\nCredit total: ${:.2}\n",
            summary.batch_count,
            summary.entry_count,
            dollars(summary.debit_total),
            dollars(summary.credit_total),
        ));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_totals_when_a_file_is_attached() {
        let msg = Message {
            direction: Direction::Upload,
            filename: "20210419-1620-221475786-1.ach".into(),
            hostname: "sftp.bank.example".into(),
            file: Some(FileSummary {
                batch_count: 1,
                entry_count: 2,
                debit_total: 153,
                credit_total: 153,
            }),
        };
        let body = render_body("Clearway", &msg);
        assert!(body.contains("Clearway has uploaded 20210419-1620-221475786-1.ach"));
        assert!(body.contains("Debit total: $1.53"));
        assert!(body.contains("Entries: 2"));
    }

    #[test]
    fn body_without_file_is_a_single_line() {
        let msg = Message {
            direction: Direction::Download,
            filename: "returns.ach".into(),
            hostname: "ftp.bank.example".into(),
            file: None,
        };
        let body = render_body("Clearway", &msg);
        assert_eq!(body.lines().count(), 1);
        assert!(body.contains("downloaded"));
    }
}
