//! FTP agent backed by `suppaftp`.
//!
//! The library is blocking, so every operation opens a fresh session inside
//! `spawn_blocking` and quits when done. FTP offers no atomicity guarantee
//! for RNFR/RNTO on every server; the `.tmp` + rename sequence is a
//! best-effort approximation of the atomic put.

use std::io::Cursor;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

use crate::config::RemotePaths;

use super::{with_retries, Agent, DownloadedFile, UploadError};

pub struct FtpAgent {
    host: String,
    username: String,
    password: String,
    paths: RemotePaths,
    timeout: Duration,
}

impl FtpAgent {
    pub fn new(
        host: String,
        username: String,
        password: String,
        paths: RemotePaths,
        timeout: Duration,
    ) -> Self {
        FtpAgent {
            host,
            username,
            password,
            paths,
            timeout,
        }
    }

    fn connect(&self) -> Result<FtpStream, UploadError> {
        let mut stream = FtpStream::connect(&self.host)
            .map_err(|e| UploadError::Unreachable(format!("{}: {e}", self.host)))?;
        stream
            .login(&self.username, &self.password)
            .map_err(|e| map_ftp_error(e, "login"))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| map_ftp_error(e, "transfer type"))?;
        Ok(stream)
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, UploadError>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T, UploadError> + Send + Clone + 'static,
    {
        let timeout = self.timeout;
        with_retries(|| {
            let op = op.clone();
            let agent = self.clone_config();
            async move {
                let task = tokio::task::spawn_blocking(move || {
                    let mut stream = agent.connect()?;
                    let result = op(&mut stream);
                    let _ = stream.quit();
                    result
                });
                match tokio::time::timeout(timeout, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) => Err(UploadError::Unreachable(join_err.to_string())),
                    Err(_) => Err(UploadError::Timeout(timeout)),
                }
            }
        })
        .await
    }

    fn clone_config(&self) -> FtpAgent {
        FtpAgent {
            host: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            paths: self.paths.clone(),
            timeout: self.timeout,
        }
    }

    async fn download_dir(&self, dir: String) -> Result<Vec<DownloadedFile>, UploadError> {
        self.run_blocking(move |stream| {
            let trimmed = dir.trim_end_matches('/').to_string();
            let names = stream.nlst(Some(trimmed.as_str())).map_err(|e| UploadError::ListFailed {
                path: trimmed.clone(),
                message: e.to_string(),
            })?;
            let mut files = Vec::new();
            for name in names {
                let short = name.rsplit('/').next().unwrap_or(&name).to_string();
                let path = format!("{trimmed}/{short}");
                let buffer = stream.retr_as_buffer(&path).map_err(|e| UploadError::ReadFailed {
                    name: path.clone(),
                    message: e.to_string(),
                })?;
                let modified = stream
                    .mdtm(&path)
                    .ok()
                    .map(naive_to_system_time);
                files.push(DownloadedFile {
                    filename: path,
                    contents: buffer.into_inner(),
                    modified,
                });
            }
            Ok(files)
        })
        .await
    }
}

fn naive_to_system_time(naive: chrono::NaiveDateTime) -> SystemTime {
    let secs = naive.and_utc().timestamp().max(0) as u64;
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn map_ftp_error(err: FtpError, context: &str) -> UploadError {
    match err {
        FtpError::ConnectionError(e) => UploadError::Unreachable(format!("{context}: {e}")),
        other => UploadError::Semantic(format!("{context}: {other}")),
    }
}

#[async_trait]
impl Agent for FtpAgent {
    async fn ping(&self) -> Result<(), UploadError> {
        self.run_blocking(|stream| {
            stream
                .noop()
                .map_err(|e| UploadError::Unreachable(e.to_string()))
        })
        .await
    }

    async fn upload_file(&self, name: &str, contents: Vec<u8>) -> Result<(), UploadError> {
        let outbound = self.paths.outbound.trim_end_matches('/').to_string();
        let name = name.to_string();
        self.run_blocking(move |stream| {
            let tmp = format!("{outbound}/{name}.tmp");
            let target = format!("{outbound}/{name}");
            stream
                .put_file(&tmp, &mut Cursor::new(contents.clone()))
                .map_err(|e| UploadError::WriteFailed {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            stream
                .rename(&tmp, &target)
                .map_err(|e| UploadError::RenameFailed {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            Ok(())
        })
        .await
    }

    async fn get_inbound_files(&self) -> Result<Vec<DownloadedFile>, UploadError> {
        self.download_dir(self.paths.inbound.clone()).await
    }

    async fn get_return_files(&self) -> Result<Vec<DownloadedFile>, UploadError> {
        self.download_dir(self.paths.returns.clone()).await
    }

    async fn get_reconciliation_files(&self) -> Result<Vec<DownloadedFile>, UploadError> {
        self.download_dir(self.paths.reconciliation.clone()).await
    }

    async fn delete_file(&self, path: &str) -> Result<(), UploadError> {
        let path = path.to_string();
        self.run_blocking(move |stream| {
            stream.rm(&path).map_err(|e| UploadError::DeleteFailed {
                name: path.clone(),
                message: e.to_string(),
            })
        })
        .await
    }

    fn hostname(&self) -> String {
        self.host.clone()
    }
}
