//! Environment-backed configuration.
//!
//! Everything is read once at startup via `Config::from_env`. Values that
//! cannot be parsed are startup failures; the process never runs with a
//! partially understood configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use dotenvy::dotenv;

use crate::ach::builder::{Gateway, OffsetAccount};
use crate::domain::AccountType;
use crate::upload::filename_template::FilenameTemplate;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub admin_port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub customers_base_url: String,
    pub odfi: OdfiConfig,
    pub upload: UploadConfig,
    pub storage: StorageConfig,
    pub inbound: InboundConfig,
    pub pipeline: PipelineConfig,
    pub email: Option<EmailConfig>,
}

/// Identity of the originating institution and its file defaults.
#[derive(Debug, Clone)]
pub struct OdfiConfig {
    pub routing_number: String,
    pub gateway: Gateway,
    pub cutoffs: Cutoffs,
    pub file_config: FileConfig,
}

#[derive(Debug, Clone)]
pub struct Cutoffs {
    pub timezone: Tz,
    /// Local wall-clock deadlines, kept in ascending order.
    pub windows: Vec<NaiveTime>,
    pub holidays: Vec<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct FileConfig {
    pub company_identification: String,
    pub company_name: String,
    pub company_descriptor: String,
    pub balance_entries: bool,
    pub offset: Option<OffsetAccount>,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub kind: UploadKind,
    pub paths: RemotePaths,
    pub timeout: Duration,
    /// Where inbound downloads are copied before processing.
    pub local_directory: PathBuf,
    pub filename_template: FilenameTemplate,
    pub gpg: bool,
}

#[derive(Debug, Clone)]
pub enum UploadKind {
    Filesystem { root: PathBuf },
    Ftp { host: String, username: String, password: String },
    Sftp { host: String, username: String, password: String },
}

impl UploadKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            UploadKind::Filesystem { .. } => "filesystem",
            UploadKind::Ftp { .. } => "ftp",
            UploadKind::Sftp { .. } => "sftp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemotePaths {
    pub outbound: String,
    pub inbound: String,
    pub returns: String,
    pub reconciliation: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub keep_remote_files: bool,
    pub cleanup_local_directory: bool,
    pub remove_zero_byte_files_after: Duration,
}

#[derive(Debug, Clone)]
pub struct InboundConfig {
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub stream: StreamConfig,
    pub merge_dir: PathBuf,
    pub flatten_batches: bool,
}

#[derive(Debug, Clone)]
pub enum StreamConfig {
    InMem,
    Redis {
        url: String,
        stream: String,
        consumer_group: String,
    },
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
    pub company_name: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let routing_number =
            env::var("ODFI_ROUTING_NUMBER").context("ODFI_ROUTING_NUMBER must be set")?;
        if !matches!(routing_number.len(), 8 | 9)
            || !routing_number.chars().all(|c| c.is_ascii_digit())
        {
            bail!("ODFI_ROUTING_NUMBER must be 8 or 9 digits, got {routing_number:?}");
        }

        let timezone: Tz = var_or("ODFI_CUTOFF_TIMEZONE", "America/New_York")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid ODFI_CUTOFF_TIMEZONE: {e}"))?;

        let mut windows = parse_list(&var_or("ODFI_CUTOFF_WINDOWS", "16:20"), |raw| {
            NaiveTime::parse_from_str(raw, "%H:%M")
                .with_context(|| format!("invalid cutoff window {raw:?}"))
        })?;
        windows.sort();

        let holidays = parse_list(&var_or("ODFI_BANK_HOLIDAYS", ""), |raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .with_context(|| format!("invalid bank holiday {raw:?}"))
        })?;

        let offset = match env::var("ODFI_OFFSET_ACCOUNT_NUMBER") {
            Ok(account_number) => Some(OffsetAccount {
                routing_number: var_or("ODFI_OFFSET_ROUTING_NUMBER", &routing_number),
                account_number,
                account_type: parse_account_type(&var_or("ODFI_OFFSET_ACCOUNT_TYPE", "checking"))?,
            }),
            Err(_) => None,
        };

        let gateway = Gateway {
            origin: var_or("ODFI_GATEWAY_ORIGIN", &routing_number),
            origin_name: var_or("ODFI_GATEWAY_ORIGIN_NAME", ""),
            destination: var_or("ODFI_GATEWAY_DESTINATION", ""),
            destination_name: var_or("ODFI_GATEWAY_DESTINATION_NAME", ""),
        };

        let filename_template = FilenameTemplate::parse(&var_or(
            "ODFI_OUTBOUND_FILENAME_TEMPLATE",
            crate::upload::filename_template::DEFAULT_FILENAME_TEMPLATE,
        ))
        .map_err(|e| anyhow::anyhow!("invalid ODFI_OUTBOUND_FILENAME_TEMPLATE: {e}"))?;

        let upload_kind = match var_or("ODFI_UPLOAD_TYPE", "filesystem").as_str() {
            "filesystem" => UploadKind::Filesystem {
                root: PathBuf::from(var_or("ODFI_UPLOAD_ROOT", "./storage/remote")),
            },
            "ftp" => UploadKind::Ftp {
                host: env::var("ODFI_UPLOAD_HOST")
                    .context("ODFI_UPLOAD_HOST must be set for ftp")?,
                username: var_or("ODFI_UPLOAD_USERNAME", "anonymous"),
                password: var_or("ODFI_UPLOAD_PASSWORD", ""),
            },
            "sftp" => UploadKind::Sftp {
                host: env::var("ODFI_UPLOAD_HOST")
                    .context("ODFI_UPLOAD_HOST must be set for sftp")?,
                username: env::var("ODFI_UPLOAD_USERNAME")
                    .context("ODFI_UPLOAD_USERNAME must be set for sftp")?,
                password: var_or("ODFI_UPLOAD_PASSWORD", ""),
            },
            other => bail!("unknown ODFI_UPLOAD_TYPE {other:?}"),
        };

        let stream = match var_or("PIPELINE_STREAM", "inmem").as_str() {
            "inmem" => StreamConfig::InMem,
            "redis" => StreamConfig::Redis {
                url: env::var("REDIS_URL").context("REDIS_URL must be set for the redis stream")?,
                stream: var_or("PIPELINE_STREAM_KEY", "clearway:transfers"),
                consumer_group: var_or("PIPELINE_CONSUMER_GROUP", "aggregator"),
            },
            other => bail!("unknown PIPELINE_STREAM {other:?}"),
        };

        let email = match env::var("EMAIL_SMTP_HOST") {
            Ok(smtp_host) => Some(EmailConfig {
                smtp_host,
                smtp_port: var_or("EMAIL_SMTP_PORT", "587")
                    .parse()
                    .context("EMAIL_SMTP_PORT")?,
                username: var_or("EMAIL_USERNAME", ""),
                password: var_or("EMAIL_PASSWORD", ""),
                from: env::var("EMAIL_FROM")
                    .context("EMAIL_FROM must be set with EMAIL_SMTP_HOST")?,
                to: parse_list(&var_or("EMAIL_TO", ""), |raw| Ok(raw.to_string()))?,
                company_name: var_or("EMAIL_COMPANY_NAME", "Clearway"),
            }),
            Err(_) => None,
        };

        Ok(Config {
            server_port: var_or("SERVER_PORT", "8082").parse().context("SERVER_PORT")?,
            admin_port: var_or("ADMIN_PORT", "9092").parse().context("ADMIN_PORT")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL").ok(),
            customers_base_url: var_or("CUSTOMERS_BASE_URL", "http://localhost:8087"),
            odfi: OdfiConfig {
                routing_number,
                gateway,
                cutoffs: Cutoffs {
                    timezone,
                    windows,
                    holidays,
                },
                file_config: FileConfig {
                    company_identification: var_or("ODFI_COMPANY_IDENTIFICATION", ""),
                    company_name: var_or("ODFI_COMPANY_NAME", ""),
                    company_descriptor: var_or("ODFI_COMPANY_DESCRIPTOR", ""),
                    balance_entries: parse_bool(&var_or("ODFI_BALANCE_ENTRIES", "false"))?,
                    offset,
                },
            },
            upload: UploadConfig {
                kind: upload_kind,
                paths: RemotePaths {
                    outbound: var_or("ODFI_OUTBOUND_PATH", "outbound/"),
                    inbound: var_or("ODFI_INBOUND_PATH", "inbound/"),
                    returns: var_or("ODFI_RETURN_PATH", "returned/"),
                    reconciliation: var_or("ODFI_RECONCILIATION_PATH", "reconciliation/"),
                },
                timeout: parse_duration(&var_or("ODFI_UPLOAD_TIMEOUT", "60s"))?,
                local_directory: PathBuf::from(var_or("ODFI_LOCAL_DIRECTORY", "./storage/inbound")),
                filename_template,
                gpg: parse_bool(&var_or("ODFI_GPG_SUFFIX", "false"))?,
            },
            storage: StorageConfig {
                keep_remote_files: parse_bool(&var_or("ODFI_STORAGE_KEEP_REMOTE_FILES", "false"))?,
                cleanup_local_directory: parse_bool(&var_or(
                    "ODFI_STORAGE_CLEANUP_LOCAL_DIRECTORY",
                    "true",
                ))?,
                remove_zero_byte_files_after: parse_duration(&var_or(
                    "ODFI_STORAGE_REMOVE_ZERO_BYTE_FILES_AFTER",
                    "12h",
                ))?,
            },
            inbound: InboundConfig {
                interval: parse_duration(&var_or("ODFI_INBOUND_INTERVAL", "10m"))?,
            },
            pipeline: PipelineConfig {
                stream,
                merge_dir: PathBuf::from(var_or("PIPELINE_MERGE_DIR", "./storage/mergable")),
                flatten_batches: parse_bool(&var_or("PIPELINE_FLATTEN_BATCHES", "false"))?,
            },
            email,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    raw.parse::<bool>()
        .with_context(|| format!("expected true/false, got {raw:?}"))
}

fn parse_account_type(raw: &str) -> anyhow::Result<AccountType> {
    AccountType::from_str(raw).ok_or_else(|| anyhow::anyhow!("unknown account type {raw:?}"))
}

fn parse_list<T>(raw: &str, parse: impl Fn(&str) -> anyhow::Result<T>) -> anyhow::Result<Vec<T>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse)
        .collect()
}

/// Parses durations of the form `45s`, `10m`, `12h` or plain seconds.
pub fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("empty duration");
    }
    let (value, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = value
        .parse()
        .with_context(|| format!("invalid duration {raw:?}"))?;
    let seconds = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        other => bail!("unknown duration unit {other:?} in {raw:?}"),
    };
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("12h").unwrap(), Duration::from_secs(43_200));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn list_parsing_skips_blank_entries() {
        let windows = parse_list("16:20, 18:00,", |raw| {
            NaiveTime::parse_from_str(raw, "%H:%M").map_err(Into::into)
        })
        .unwrap();
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn account_type_parsing() {
        assert_eq!(parse_account_type("savings").unwrap(), AccountType::Savings);
        assert!(parse_account_type("brokerage").is_err());
    }
}
