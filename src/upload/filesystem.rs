//! Local-directory agent, used in development and tests. The rename after
//! writing `name.tmp` is atomic on POSIX filesystems.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::RemotePaths;

use super::{Agent, DownloadedFile, UploadError};

pub struct FilesystemAgent {
    root: PathBuf,
    paths: RemotePaths,
}

impl FilesystemAgent {
    pub fn new(root: PathBuf, paths: RemotePaths) -> Self {
        FilesystemAgent { root, paths }
    }

    fn dir(&self, sub: &str) -> PathBuf {
        self.root.join(sub.trim_end_matches('/'))
    }

    fn read_dir(&self, sub: &str) -> Result<Vec<DownloadedFile>, UploadError> {
        let dir = self.dir(sub);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|e| UploadError::ListFailed {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| UploadError::ListFailed {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().to_string();
            let contents = fs::read(&path).map_err(|e| UploadError::ReadFailed {
                name: filename.clone(),
                message: e.to_string(),
            })?;
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            files.push(DownloadedFile {
                filename: format!("{}/{}", sub.trim_end_matches('/'), filename),
                contents,
                modified,
            });
        }
        Ok(files)
    }
}

#[async_trait]
impl Agent for FilesystemAgent {
    async fn ping(&self) -> Result<(), UploadError> {
        fs::create_dir_all(&self.root)
            .map_err(|e| UploadError::Unreachable(format!("{}: {e}", self.root.display())))
    }

    async fn upload_file(&self, name: &str, contents: Vec<u8>) -> Result<(), UploadError> {
        let dir = self.dir(&self.paths.outbound);
        fs::create_dir_all(&dir).map_err(|e| UploadError::WriteFailed {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        let tmp = dir.join(format!("{name}.tmp"));
        let target = dir.join(name);
        fs::write(&tmp, &contents).map_err(|e| UploadError::WriteFailed {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        fs::rename(&tmp, &target).map_err(|e| UploadError::RenameFailed {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_inbound_files(&self) -> Result<Vec<DownloadedFile>, UploadError> {
        self.read_dir(&self.paths.inbound)
    }

    async fn get_return_files(&self) -> Result<Vec<DownloadedFile>, UploadError> {
        self.read_dir(&self.paths.returns)
    }

    async fn get_reconciliation_files(&self) -> Result<Vec<DownloadedFile>, UploadError> {
        self.read_dir(&self.paths.reconciliation)
    }

    async fn delete_file(&self, path: &str) -> Result<(), UploadError> {
        let full = self.root.join(path);
        if !full.exists() {
            return Ok(());
        }
        fs::remove_file(&full).map_err(|e| UploadError::DeleteFailed {
            name: path.to_string(),
            message: e.to_string(),
        })
    }

    fn hostname(&self) -> String {
        self.root.display().to_string()
    }
}

impl FilesystemAgent {
    /// The resolved outbound directory, handy for assertions in tests.
    pub fn outbound_dir(&self) -> PathBuf {
        self.dir(&self.paths.outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn agent(root: &Path) -> FilesystemAgent {
        FilesystemAgent::new(
            root.to_path_buf(),
            RemotePaths {
                outbound: "outbound/".into(),
                inbound: "inbound/".into(),
                returns: "returned/".into(),
                reconciliation: "reconciliation/".into(),
            },
        )
    }

    #[tokio::test]
    async fn upload_writes_through_a_temporary_name() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(dir.path());
        agent.upload_file("20210419-1620-221475786-1.ach", b"records".to_vec())
            .await
            .unwrap();

        let target = dir.path().join("outbound/20210419-1620-221475786-1.ach");
        assert_eq!(fs::read(&target).unwrap(), b"records");
        assert!(!dir.path().join("outbound/20210419-1620-221475786-1.ach.tmp").exists());
    }

    #[tokio::test]
    async fn inbound_listing_includes_contents_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("inbound")).unwrap();
        fs::write(dir.path().join("inbound/returns.ach"), b"data").unwrap();

        let agent = agent(dir.path());
        let files = agent.get_inbound_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "inbound/returns.ach");
        assert_eq!(files[0].contents, b"data");
        assert!(files[0].modified.is_some());
    }

    #[tokio::test]
    async fn missing_directories_list_empty() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(dir.path());
        assert!(agent.get_return_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("inbound")).unwrap();
        fs::write(dir.path().join("inbound/x.ach"), b"x").unwrap();

        let agent = agent(dir.path());
        agent.delete_file("inbound/x.ach").await.unwrap();
        agent.delete_file("inbound/x.ach").await.unwrap();
        assert!(!dir.path().join("inbound/x.ach").exists());
    }
}
