//! Periodic download and dispatch of inbound ACH files.
//!
//! Every interval the scheduler pulls the inbound, return and
//! reconciliation directories, parses each file and walks batches in file
//! order and entries in batch order. Entry-level failures are recorded and
//! processing continues; a file that fails to parse is left in place for
//! investigation and never deleted.

mod corrections;
mod prenotes;
mod returns;

pub use corrections::CorrectionProcessor;
pub use prenotes::PrenoteProcessor;
pub use returns::ReturnProcessor;

use std::fs;
use std::sync::Arc;

use tokio::sync::watch;

use crate::ach::records::Addenda;
use crate::ach::File;
use crate::config::{InboundConfig, StorageConfig, UploadConfig};
use crate::upload::{Agent, DownloadedFile};

pub struct Processors {
    pub corrections: CorrectionProcessor,
    pub prenotes: PrenoteProcessor,
    pub returns: ReturnProcessor,
}

pub struct PeriodicScheduler {
    agent: Arc<dyn Agent>,
    storage: StorageConfig,
    inbound: InboundConfig,
    upload_cfg: UploadConfig,
    processors: Processors,
}

impl PeriodicScheduler {
    pub fn new(
        agent: Arc<dyn Agent>,
        storage: StorageConfig,
        inbound: InboundConfig,
        upload_cfg: UploadConfig,
        processors: Processors,
    ) -> Self {
        PeriodicScheduler {
            agent,
            storage,
            inbound,
            upload_cfg,
            processors,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.inbound.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("inbound processor shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.scan().await {
                        tracing::error!(error = %err, "inbound scan failed");
                    }
                }
            }
        }
    }

    /// One full pass over every watched remote directory.
    pub async fn scan(&self) -> anyhow::Result<()> {
        let downloads = [
            self.agent.get_inbound_files().await,
            self.agent.get_return_files().await,
            self.agent.get_reconciliation_files().await,
        ];
        for result in downloads {
            let files = match result {
                Ok(files) => files,
                Err(err) => {
                    tracing::error!(error = %err, "inbound download failed");
                    continue;
                }
            };
            for file in files {
                self.handle_file(file).await;
            }
        }
        Ok(())
    }

    async fn handle_file(&self, download: DownloadedFile) {
        if download.is_empty() {
            // leftover .tmp files from interrupted uploads
            if download.older_than(self.storage.remove_zero_byte_files_after) {
                tracing::info!(filename = %download.filename, "removing stale zero-byte remote file");
                if let Err(err) = self.agent.delete_file(&download.filename).await {
                    tracing::warn!(filename = %download.filename, error = %err, "zero-byte cleanup failed");
                }
            }
            return;
        }

        let local_copy = self.save_local_copy(&download);

        let contents = String::from_utf8_lossy(&download.contents);
        let parsed = match File::parse(&contents) {
            Ok(parsed) => parsed,
            Err(err) => {
                metrics::counter!("inbound_parse_errors_total").increment(1);
                tracing::error!(
                    filename = %download.filename,
                    error = %err,
                    "failed to parse inbound file, leaving it in place"
                );
                return;
            }
        };

        self.dispatch(&download.filename, &parsed).await;
        metrics::counter!("inbound_files_processed_total").increment(1);

        if !self.storage.keep_remote_files {
            if let Err(err) = self.agent.delete_file(&download.filename).await {
                tracing::warn!(filename = %download.filename, error = %err, "remote cleanup failed");
            }
        }
        if self.storage.cleanup_local_directory {
            if let Some(path) = local_copy {
                let _ = fs::remove_file(path);
            }
        }
    }

    fn save_local_copy(&self, download: &DownloadedFile) -> Option<std::path::PathBuf> {
        let name = download.filename.rsplit('/').next()?;
        let dir = &self.upload_cfg.local_directory;
        if let Err(err) = fs::create_dir_all(dir) {
            tracing::warn!(error = %err, "could not create local inbound directory");
            return None;
        }
        let path = dir.join(name);
        match fs::write(&path, &download.contents) {
            Ok(()) => Some(path),
            Err(err) => {
                tracing::warn!(filename = %name, error = %err, "could not save local copy");
                None
            }
        }
    }

    async fn dispatch(&self, filename: &str, file: &File) {
        for batch in &file.batches {
            let effective_entry_date = batch.header.effective_entry_date;
            for entry in &batch.entries {
                let mut routed = false;
                for addenda in &entry.addenda {
                    match addenda {
                        Addenda::Return(addenda99) => {
                            routed = true;
                            self.processors
                                .returns
                                .process(filename, entry, addenda99, effective_entry_date)
                                .await;
                        }
                        Addenda::Change(addenda98) => {
                            routed = true;
                            self.processors.corrections.process(filename, entry, addenda98);
                        }
                        Addenda::PaymentRelated { .. } => {}
                    }
                }
                if !routed && entry.is_prenote() {
                    self.processors.prenotes.process(filename, entry);
                }
            }
        }
    }
}
