//! Durable spool of transfer IDs awaiting the next cutoff flush.
//!
//! Layout on disk: a `pending/` directory holds one empty file per queued
//! transfer ID. `drain` renames the whole directory to `drain-<generation>`
//! in one step, so an entry is observable to at most one drain at a time.
//! `commit` deletes the generation directory; `rollback` moves its entries
//! back. A generation directory still present at startup had neither, so
//! recovery rolls it back.

use std::fs;
use std::io;
use std::path::PathBuf;

use uuid::Uuid;

const PENDING_DIR: &str = "pending";
const GENERATION_PREFIX: &str = "drain-";

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("transfer id {0:?} contains characters unsafe for spooling")]
    InvalidTransferId(String),
    #[error("spool i/o failure: {0}")]
    Io(#[from] io::Error),
}

pub struct MergeBuffer {
    dir: PathBuf,
}

/// One drained batch of transfer IDs, pinned to a directory until it is
/// committed or rolled back.
#[derive(Debug)]
pub struct Generation {
    pub id: String,
    pub transfer_ids: Vec<String>,
    dir: PathBuf,
}

impl Generation {
    pub fn is_empty(&self) -> bool {
        self.transfer_ids.is_empty()
    }
}

impl MergeBuffer {
    /// Opens the spool, creating directories as needed and rolling back any
    /// generation a previous process drained but never committed.
    pub fn new(dir: PathBuf) -> Result<Self, MergeError> {
        let buffer = MergeBuffer { dir };
        fs::create_dir_all(buffer.pending_dir())?;
        buffer.recover()?;
        Ok(buffer)
    }

    fn pending_dir(&self) -> PathBuf {
        self.dir.join(PENDING_DIR)
    }

    fn recover(&self) -> Result<(), MergeError> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_prefix(GENERATION_PREFIX) {
                let generation = Generation {
                    id: id.to_string(),
                    transfer_ids: list_ids(&entry.path())?,
                    dir: entry.path(),
                };
                tracing::warn!(
                    generation = %generation.id,
                    entries = generation.transfer_ids.len(),
                    "rolling back uncommitted spool generation"
                );
                self.rollback(generation)?;
            }
        }
        Ok(())
    }

    /// Queues a transfer ID. Re-adding an already queued ID is a no-op.
    pub fn add(&self, transfer_id: &str) -> Result<(), MergeError> {
        validate_id(transfer_id)?;
        fs::create_dir_all(self.pending_dir())?;
        fs::write(self.pending_dir().join(transfer_id), b"")?;
        Ok(())
    }

    /// Atomically takes everything queued so far. Later `add` calls land in
    /// a fresh pending set.
    pub fn drain(&self) -> Result<Generation, MergeError> {
        let id = Uuid::new_v4().simple().to_string();
        let target = self.dir.join(format!("{GENERATION_PREFIX}{id}"));
        let pending = self.pending_dir();

        let transfer_ids = list_ids(&pending)?;
        if transfer_ids.is_empty() {
            return Ok(Generation {
                id,
                transfer_ids,
                dir: target,
            });
        }

        fs::rename(&pending, &target)?;
        fs::create_dir_all(&pending)?;
        Ok(Generation {
            id,
            transfer_ids,
            dir: target,
        })
    }

    /// Removes a drained generation from durable storage.
    pub fn commit(&self, generation: Generation) -> Result<(), MergeError> {
        if generation.dir.exists() {
            fs::remove_dir_all(&generation.dir)?;
        }
        Ok(())
    }

    /// Restores a drained generation to the head of the buffer.
    pub fn rollback(&self, generation: Generation) -> Result<(), MergeError> {
        if !generation.dir.exists() {
            return Ok(());
        }
        fs::create_dir_all(self.pending_dir())?;
        for id in &generation.transfer_ids {
            let from = generation.dir.join(id);
            let to = self.pending_dir().join(id);
            if to.exists() {
                fs::remove_file(&from)?;
            } else {
                fs::rename(&from, &to)?;
            }
        }
        fs::remove_dir_all(&generation.dir)?;
        Ok(())
    }

    pub fn pending_count(&self) -> Result<usize, MergeError> {
        Ok(list_ids(&self.pending_dir())?.len())
    }
}

fn list_ids(dir: &PathBuf) -> Result<Vec<String>, MergeError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().is_file() {
            ids.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

fn validate_id(transfer_id: &str) -> Result<(), MergeError> {
    let ok = !transfer_id.is_empty()
        && transfer_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(MergeError::InvalidTransferId(transfer_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_drain_commit_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = MergeBuffer::new(dir.path().to_path_buf()).unwrap();

        buffer.add("transfer-a").unwrap();
        buffer.add("transfer-b").unwrap();
        buffer.add("transfer-a").unwrap(); // idempotent
        assert_eq!(buffer.pending_count().unwrap(), 2);

        let generation = buffer.drain().unwrap();
        assert_eq!(generation.transfer_ids, vec!["transfer-a", "transfer-b"]);
        assert_eq!(buffer.pending_count().unwrap(), 0);

        // adds after a drain land in the next generation
        buffer.add("transfer-c").unwrap();
        assert_eq!(buffer.pending_count().unwrap(), 1);

        buffer.commit(generation).unwrap();
        let next = buffer.drain().unwrap();
        assert_eq!(next.transfer_ids, vec!["transfer-c"]);
    }

    #[test]
    fn rollback_restores_entries() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = MergeBuffer::new(dir.path().to_path_buf()).unwrap();

        buffer.add("transfer-a").unwrap();
        let generation = buffer.drain().unwrap();
        buffer.rollback(generation).unwrap();
        assert_eq!(buffer.pending_count().unwrap(), 1);

        let again = buffer.drain().unwrap();
        assert_eq!(again.transfer_ids, vec!["transfer-a"]);
    }

    #[test]
    fn startup_rolls_back_uncommitted_generations() {
        let dir = tempfile::tempdir().unwrap();
        {
            let buffer = MergeBuffer::new(dir.path().to_path_buf()).unwrap();
            buffer.add("transfer-a").unwrap();
            let _abandoned = buffer.drain().unwrap();
            // process "crashes" here: neither commit nor rollback
        }
        let reopened = MergeBuffer::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.pending_count().unwrap(), 1);
    }

    #[test]
    fn empty_drain_allocates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = MergeBuffer::new(dir.path().to_path_buf()).unwrap();
        let generation = buffer.drain().unwrap();
        assert!(generation.is_empty());
        buffer.commit(generation).unwrap();
    }

    #[test]
    fn path_traversal_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = MergeBuffer::new(dir.path().to_path_buf()).unwrap();
        assert!(buffer.add("../escape").is_err());
        assert!(buffer.add("").is_err());
    }
}
