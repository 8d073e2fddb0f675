//! Remote file-store agents used to ship outbound NACHA files and pull
//! inbound ones.
//!
//! Three variants exist: a local directory (development and tests), FTP and
//! SFTP. Uploads are two-phase — write `name.tmp`, then rename — so the
//! remote side never observes a partially written file. FTP and SFTP cannot
//! guarantee the rename is atomic on every server; they issue the same
//! two-phase sequence as a best-effort approximation.

pub mod filename_template;
mod filesystem;
mod ftp;
mod sftp;

pub use filesystem::FilesystemAgent;
pub use ftp::FtpAgent;
pub use sftp::SftpAgent;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::config::{UploadConfig, UploadKind};

/// Connection-level failures are retried; the rest surface immediately.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("write failed for {name}: {message}")]
    WriteFailed { name: String, message: String },
    #[error("rename failed for {name}: {message}")]
    RenameFailed { name: String, message: String },
    #[error("listing {path} failed: {message}")]
    ListFailed { path: String, message: String },
    #[error("reading {name} failed: {message}")]
    ReadFailed { name: String, message: String },
    #[error("deleting {name} failed: {message}")]
    DeleteFailed { name: String, message: String },
    #[error("{0}")]
    Semantic(String),
}

impl UploadError {
    pub fn is_transient(&self) -> bool {
        matches!(self, UploadError::Unreachable(_) | UploadError::Timeout(_))
    }
}

/// A file pulled down from the remote store.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub filename: String,
    pub contents: Vec<u8>,
    /// Remote modification time when the protocol exposes one.
    pub modified: Option<SystemTime>,
}

impl DownloadedFile {
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn older_than(&self, age: Duration) -> bool {
        match self.modified {
            Some(modified) => match SystemTime::now().duration_since(modified) {
                Ok(elapsed) => elapsed >= age,
                Err(_) => false,
            },
            None => false,
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    async fn ping(&self) -> Result<(), UploadError>;

    /// Writes `contents` under the outbound path as `name`, via a temporary
    /// name and a rename.
    async fn upload_file(&self, name: &str, contents: Vec<u8>) -> Result<(), UploadError>;

    async fn get_inbound_files(&self) -> Result<Vec<DownloadedFile>, UploadError>;
    async fn get_return_files(&self) -> Result<Vec<DownloadedFile>, UploadError>;
    async fn get_reconciliation_files(&self) -> Result<Vec<DownloadedFile>, UploadError>;

    /// Deletes a remote file given its path relative to the store root.
    async fn delete_file(&self, path: &str) -> Result<(), UploadError>;

    fn hostname(&self) -> String;
}

/// Builds the configured agent variant.
pub fn new_agent(cfg: &UploadConfig) -> Result<Arc<dyn Agent>, UploadError> {
    match &cfg.kind {
        UploadKind::Filesystem { root } => Ok(Arc::new(FilesystemAgent::new(
            root.clone(),
            cfg.paths.clone(),
        ))),
        UploadKind::Ftp {
            host,
            username,
            password,
        } => Ok(Arc::new(FtpAgent::new(
            host.clone(),
            username.clone(),
            password.clone(),
            cfg.paths.clone(),
            cfg.timeout,
        ))),
        UploadKind::Sftp {
            host,
            username,
            password,
        } => Ok(Arc::new(SftpAgent::new(
            host.clone(),
            username.clone(),
            password.clone(),
            cfg.paths.clone(),
            cfg.timeout,
        ))),
    }
}

const RETRY_ATTEMPTS: u32 = 3;

/// Runs `op` up to three times, backing off between connection-level
/// failures. Semantic errors return on the first attempt.
pub(crate) async fn with_retries<T, F, Fut>(op: F) -> Result<T, UploadError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, UploadError>>,
{
    let mut delay = Duration::from_millis(250);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < RETRY_ATTEMPTS => {
                tracing::warn!(attempt, error = %err, "transient upload error, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_retries(|| async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(UploadError::Unreachable("connection refused".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn semantic_errors_surface_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(UploadError::Semantic("permission denied".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_byte_age_check() {
        let file = DownloadedFile {
            filename: "stale.tmp".into(),
            contents: Vec::new(),
            modified: Some(SystemTime::now() - Duration::from_secs(7200)),
        };
        assert!(file.is_empty());
        assert!(file.older_than(Duration::from_secs(3600)));
        assert!(!file.older_than(Duration::from_secs(86_400)));

        let unknown_age = DownloadedFile {
            filename: "new".into(),
            contents: Vec::new(),
            modified: None,
        };
        assert!(!unknown_age.older_than(Duration::from_secs(0)));
    }
}
