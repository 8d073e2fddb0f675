//! SFTP agent backed by `ssh2`.
//!
//! Like the FTP agent, each operation opens a fresh session inside
//! `spawn_blocking`. SFTP rename is atomic on most servers when the
//! overwrite flag is honored.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use ssh2::{RenameFlags, Session, Sftp};

use crate::config::RemotePaths;

use super::{with_retries, Agent, DownloadedFile, UploadError};

pub struct SftpAgent {
    host: String,
    username: String,
    password: String,
    paths: RemotePaths,
    timeout: Duration,
}

impl SftpAgent {
    pub fn new(
        host: String,
        username: String,
        password: String,
        paths: RemotePaths,
        timeout: Duration,
    ) -> Self {
        SftpAgent {
            host,
            username,
            password,
            paths,
            timeout,
        }
    }

    fn connect(&self) -> Result<(Session, Sftp), UploadError> {
        let tcp = TcpStream::connect(&self.host)
            .map_err(|e| UploadError::Unreachable(format!("{}: {e}", self.host)))?;
        tcp.set_read_timeout(Some(self.timeout)).ok();
        tcp.set_write_timeout(Some(self.timeout)).ok();

        let mut session =
            Session::new().map_err(|e| UploadError::Unreachable(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| UploadError::Unreachable(format!("handshake: {e}")))?;
        session
            .userauth_password(&self.username, &self.password)
            .map_err(|e| UploadError::Semantic(format!("authentication: {e}")))?;
        let sftp = session
            .sftp()
            .map_err(|e| UploadError::Unreachable(format!("sftp channel: {e}")))?;
        Ok((session, sftp))
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, UploadError>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp) -> Result<T, UploadError> + Send + Clone + 'static,
    {
        let timeout = self.timeout;
        with_retries(|| {
            let op = op.clone();
            let agent = self.clone_config();
            async move {
                let task = tokio::task::spawn_blocking(move || {
                    let (_session, sftp) = agent.connect()?;
                    op(&sftp)
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

    fn clone_config(&self) -> SftpAgent {
        SftpAgent {
            host: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            paths: self.paths.clone(),
            timeout: self.timeout,
        }
    }

    async fn download_dir(&self, dir: String) -> Result<Vec<DownloadedFile>, UploadError> {
        self.run_blocking(move |sftp| {
            let trimmed = dir.trim_end_matches('/').to_string();
            let entries = sftp
                .readdir(Path::new(&trimmed))
                .map_err(|e| UploadError::ListFailed {
                    path: trimmed.clone(),
                    message: e.to_string(),
                })?;
            let mut files = Vec::new();
            for (path, stat) in entries {
                if stat.is_dir() {
                    continue;
                }
                let mut contents = Vec::new();
                let mut file = sftp.open(&path).map_err(|e| UploadError::ReadFailed {
                    name: path.display().to_string(),
                    message: e.to_string(),
                })?;
                file.read_to_end(&mut contents)
                    .map_err(|e| UploadError::ReadFailed {
                        name: path.display().to_string(),
                        message: e.to_string(),
                    })?;
                let modified = stat
                    .mtime
                    .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs));
                files.push(DownloadedFile {
                    filename: path.display().to_string(),
                    contents,
                    modified,
                });
            }
            Ok(files)
        })
        .await
    }
}

#[async_trait]
impl Agent for SftpAgent {
    async fn ping(&self) -> Result<(), UploadError> {
        self.run_blocking(|sftp| {
            sftp.stat(Path::new("."))
                .map(|_| ())
                .map_err(|e| UploadError::Unreachable(e.to_string()))
        })
        .await
    }

    async fn upload_file(&self, name: &str, contents: Vec<u8>) -> Result<(), UploadError> {
        let outbound = self.paths.outbound.trim_end_matches('/').to_string();
        let name = name.to_string();
        self.run_blocking(move |sftp| {
            let tmp = format!("{outbound}/{name}.tmp");
            let target = format!("{outbound}/{name}");
            {
                let mut file =
                    sftp.create(Path::new(&tmp)).map_err(|e| UploadError::WriteFailed {
                        name: name.clone(),
                        message: e.to_string(),
                    })?;
                file.write_all(&contents).map_err(|e| UploadError::WriteFailed {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            }
            sftp.rename(
                Path::new(&tmp),
                Path::new(&target),
                Some(RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE),
            )
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
        self.run_blocking(move |sftp| {
            sftp.unlink(Path::new(&path))
                .map_err(|e| UploadError::DeleteFailed {
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
