//! The cutoff control loop.
//!
//! Between ticks the aggregator drains the transfer bus into the durable
//! merge buffer. Each tick drains the buffer into a generation, builds one
//! NACHA file per still-PENDING transfer, optionally flattens matching
//! batches, uploads, then records trace numbers and marks the transfers
//! PROCESSED. Upload failure rolls the generation back so nothing is ever
//! silently dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use tokio::sync::{mpsc, watch};

use crate::ach::file::flatten;
use crate::ach::builder::Participant;
use crate::ach::File;
use crate::config::{OdfiConfig, UploadConfig};
use crate::customers::{Account, CustomerError, CustomersClient};
use crate::domain::{Endpoint, Transfer, TransferStatus};
use crate::fundflow::Strategy;
use crate::notify::{Direction, EmailNotifier, FileSummary, Message};
use crate::ports::{RepositoryError, TransferRepository};
use crate::schedule::CutoffTick;
use crate::upload::filename_template::FilenameData;
use crate::upload::Agent;

use super::bus::TransferSubscription;
use super::merge::MergeBuffer;

/// How long a tick waits for in-flight publishes before draining the buffer.
const BUS_GRACE_PERIOD: Duration = Duration::from_millis(250);

struct BuiltFile {
    file: File,
    /// Transfers carried by this file, with the trace numbers each was
    /// assigned at build time.
    owners: Vec<(String, Vec<String>)>,
}

pub struct Aggregator {
    odfi: OdfiConfig,
    upload_cfg: UploadConfig,
    flatten_batches: bool,
    repo: Arc<dyn TransferRepository>,
    agent: Arc<dyn Agent>,
    merger: MergeBuffer,
    strategy: Arc<dyn Strategy>,
    customers: CustomersClient,
    notifier: Option<Arc<EmailNotifier>>,
    uploads_today: u32,
    last_upload_day: Option<NaiveDate>,
}

impl Aggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        odfi: OdfiConfig,
        upload_cfg: UploadConfig,
        flatten_batches: bool,
        repo: Arc<dyn TransferRepository>,
        agent: Arc<dyn Agent>,
        merger: MergeBuffer,
        strategy: Arc<dyn Strategy>,
        customers: CustomersClient,
        notifier: Option<Arc<EmailNotifier>>,
    ) -> Self {
        Aggregator {
            odfi,
            upload_cfg,
            flatten_batches,
            repo,
            agent,
            merger,
            strategy,
            customers,
            notifier,
            uploads_today: 0,
            last_upload_day: None,
        }
    }

    /// Runs until shutdown. In-flight flushes complete before exit.
    pub async fn run(
        mut self,
        mut subscription: Box<dyn TransferSubscription>,
        mut ticks: mpsc::Receiver<CutoffTick>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("aggregator shutting down");
                    return;
                }
                message = subscription.recv() => {
                    match message {
                        Some(message) => self.enqueue(&mut subscription, message).await,
                        None => {
                            tracing::info!("transfer bus closed, aggregator exiting");
                            return;
                        }
                    }
                }
                tick = ticks.recv() => {
                    match tick {
                        Some(tick) => {
                            if let Err(err) = self.flush(&mut subscription, &tick).await {
                                metrics::counter!("ach_flush_errors_total").increment(1);
                                tracing::error!(error = %err, "cutoff flush failed");
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    }

    async fn enqueue(
        &mut self,
        subscription: &mut Box<dyn TransferSubscription>,
        message: super::bus::BusMessage,
    ) {
        match self.merger.add(&message.transfer_id) {
            Ok(()) => {
                if let Err(err) = subscription.ack(&message).await {
                    tracing::warn!(error = %err, "failed to acknowledge bus message");
                }
            }
            Err(err) => {
                // left unacknowledged so the substrate redelivers it
                tracing::error!(
                    transfer_id = %message.transfer_id,
                    error = %err,
                    "failed to spool transfer"
                );
            }
        }
    }

    /// One complete cutoff flush.
    pub async fn flush(
        &mut self,
        subscription: &mut Box<dyn TransferSubscription>,
        tick: &CutoffTick,
    ) -> anyhow::Result<()> {
        // absorb in-flight publishes
        let deadline = Instant::now() + BUS_GRACE_PERIOD;
        while Instant::now() < deadline {
            match subscription.try_recv().await {
                Some(message) => self.enqueue(subscription, message).await,
                None => break,
            }
        }

        let generation = self.merger.drain()?;
        tracing::info!(
            generation = %generation.id,
            transfers = generation.transfer_ids.len(),
            firing_time = %tick.firing_time,
            "cutoff flush started"
        );
        if generation.is_empty() {
            self.merger.commit(generation)?;
            return Ok(());
        }

        let mut built: Vec<BuiltFile> = Vec::new();
        let mut transient: Vec<String> = Vec::new();
        let mut sequence: u32 = 1;

        for transfer_id in &generation.transfer_ids {
            let transfer = match self.repo.get_transfer(transfer_id).await {
                Ok(transfer) => transfer,
                Err(RepositoryError::NotFound(_)) => continue,
                Err(err) => {
                    tracing::warn!(transfer_id = %transfer_id, error = %err, "repository read failed, retrying next cutoff");
                    transient.push(transfer_id.clone());
                    continue;
                }
            };
            if transfer.status != TransferStatus::Pending {
                tracing::debug!(transfer_id = %transfer_id, status = ?transfer.status, "skipping non-pending transfer");
                continue;
            }
            match self.build(&transfer, &mut sequence).await {
                Ok(file) => built.push(file),
                Err(BuildOutcome::Transient(err)) => {
                    tracing::warn!(transfer_id = %transfer_id, error = %err, "transient build failure, retrying next cutoff");
                    transient.push(transfer_id.clone());
                }
                Err(BuildOutcome::Deterministic(err)) => {
                    tracing::error!(transfer_id = %transfer_id, error = %err, "transfer failed to originate");
                    metrics::counter!("transfers_failed_total").increment(1);
                    if let Err(update_err) = self
                        .repo
                        .update_transfer_status(transfer_id, TransferStatus::Failed)
                        .await
                    {
                        tracing::error!(transfer_id = %transfer_id, error = %update_err, "failed to mark transfer FAILED");
                    }
                }
            }
        }

        let built = if self.flatten_batches {
            flatten_built(built)
        } else {
            built
        };

        for built_file in built {
            if let Err(err) = self.upload(&built_file, tick).await {
                metrics::counter!("ach_upload_errors_total").increment(1);
                tracing::error!(error = %err, "upload failed, rolling back generation");
                self.merger.rollback(generation)?;
                return Err(err);
            }
        }

        self.merger.commit(generation)?;
        for transfer_id in transient {
            self.merger.add(&transfer_id)?;
        }
        Ok(())
    }

    async fn build(
        &self,
        transfer: &Transfer,
        sequence: &mut u32,
    ) -> Result<BuiltFile, BuildOutcome> {
        let source = self.resolve(&transfer.source).await?;
        let destination = self.resolve(&transfer.destination).await?;

        let company_id = match self
            .repo
            .get_company_identification(&transfer.organization)
            .await
        {
            Ok(Some(value)) => value,
            Ok(None) => self.odfi.file_config.company_identification.clone(),
            Err(err) => {
                tracing::warn!(error = %err, "organization config read failed, using default company identification");
                self.odfi.file_config.company_identification.clone()
            }
        };

        let (files, traces) = self
            .strategy
            .originate(&company_id, transfer, &source, &destination, *sequence)
            .map_err(|err| BuildOutcome::Deterministic(err.to_string()))?;
        *sequence += traces.len() as u32;

        // the first-party strategy emits exactly one file per transfer
        let file = files
            .into_iter()
            .next()
            .ok_or_else(|| BuildOutcome::Deterministic("strategy produced no files".into()))?;
        Ok(BuiltFile {
            file,
            owners: vec![(transfer.transfer_id.clone(), traces)],
        })
    }

    async fn resolve(&self, endpoint: &Endpoint) -> Result<Participant, BuildOutcome> {
        let customer = self
            .customers
            .get_customer(&endpoint.customer_id)
            .await
            .map_err(|err| match err {
                CustomerError::RequestError(_) => BuildOutcome::Transient(err.to_string()),
                other => BuildOutcome::Deterministic(other.to_string()),
            })?;
        Ok(Participant {
            customer,
            account: Account {
                account_id: endpoint.account_id.clone(),
                routing_number: endpoint.routing_number.clone(),
                account_type: endpoint.account_type,
            },
            account_number: endpoint.account_number.clone(),
        })
    }

    async fn upload(&mut self, built: &BuiltFile, tick: &CutoffTick) -> anyhow::Result<()> {
        let local_now = tick.firing_time.with_timezone(&self.odfi.cutoffs.timezone);
        let today = local_now.date_naive();
        if self.last_upload_day != Some(today) {
            self.last_upload_day = Some(today);
            self.uploads_today = 0;
        }
        let index = self.uploads_today + 1;

        let filename = self.upload_cfg.filename_template.render(&FilenameData {
            routing_number: self.odfi.routing_number.clone(),
            gpg: self.upload_cfg.gpg,
            index,
            timestamp: local_now.naive_local(),
        });

        self.agent
            .upload_file(&filename, built.file.render_bytes())
            .await?;
        self.uploads_today = index;
        metrics::counter!("ach_files_uploaded_total").increment(1);
        tracing::info!(filename = %filename, entries = built.file.entry_count(), "uploaded ACH file");

        let now = Utc::now();
        for (transfer_id, traces) in &built.owners {
            // trace numbers land before the status flips to PROCESSED
            self.repo.save_trace_numbers(transfer_id, traces).await?;
            self.repo.mark_processed(transfer_id, now).await?;
            metrics::counter!("transfers_processed_total").increment(1);
        }

        if let Some(notifier) = &self.notifier {
            let message = Message {
                direction: Direction::Upload,
                filename,
                hostname: self.agent.hostname(),
                file: Some(FileSummary::from_file(&built.file)),
            };
            if let Err(err) = notifier.send(&message).await {
                tracing::warn!(error = %err, "upload notification failed");
            }
        }
        Ok(())
    }
}

enum BuildOutcome {
    /// Retried at the next cutoff; the transfer stays PENDING.
    Transient(String),
    /// Will never succeed; the transfer is marked FAILED.
    Deterministic(String),
}

impl std::fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildOutcome::Transient(msg) | BuildOutcome::Deterministic(msg) => write!(f, "{msg}"),
        }
    }
}

/// Coalesces per-transfer files that share a gateway pair, carrying the
/// transfer-to-trace ownership across the merge.
fn flatten_built(built: Vec<BuiltFile>) -> Vec<BuiltFile> {
    let mut groups: Vec<(String, Vec<File>, Vec<(String, Vec<String>)>)> = Vec::new();
    for item in built {
        let key = format!(
            "{}|{}",
            item.file.header.immediate_origin, item.file.header.immediate_destination
        );
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, files, owners)) => {
                files.push(item.file);
                owners.extend(item.owners);
            }
            None => groups.push((key, vec![item.file], item.owners)),
        }
    }
    groups
        .into_iter()
        .flat_map(|(_, files, owners)| {
            flatten(files)
                .into_iter()
                .map(move |file| BuiltFile {
                    file,
                    owners: owners.clone(),
                })
        })
        .collect()
}
