//! Cutoff tick scheduling.
//!
//! Each configured `HH:MM` window gets its own task that sleeps until the
//! next local occurrence, emits a tick and advances a day. Manual triggers
//! from the admin API inject a tick on the same channel without moving the
//! scheduled fire times.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::{mpsc, watch};

use crate::config::Cutoffs;

/// A cutoff firing. Downstream cannot tell scheduled and manual ticks apart.
#[derive(Debug, Clone)]
pub struct CutoffTick {
    pub firing_time: DateTime<Utc>,
}

/// Handle the admin API uses to force an immediate flush.
#[derive(Clone)]
pub struct ManualTrigger {
    tx: mpsc::Sender<CutoffTick>,
}

impl ManualTrigger {
    pub async fn fire(&self) -> bool {
        self.tx
            .send(CutoffTick {
                firing_time: Utc::now(),
            })
            .await
            .is_ok()
    }
}

/// Computes the next occurrence of `window` in `tz` strictly after `now`.
pub fn next_occurrence(tz: Tz, window: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let local_now = now.with_timezone(&tz);
    let mut date = local_now.date_naive();
    loop {
        let candidate = date.and_time(window);
        // skipped local times (DST spring-forward) resolve to the next day
        if let Some(local) = tz.from_local_datetime(&candidate).earliest() {
            let utc = local.with_timezone(&Utc);
            if utc > now {
                return utc;
            }
        }
        date = date.succ_opt().unwrap_or(date + ChronoDuration::days(1));
    }
}

/// Starts one task per window. The returned receiver yields ticks until
/// shutdown; the trigger injects out-of-band ticks.
pub fn start(
    cutoffs: &Cutoffs,
    shutdown: watch::Receiver<bool>,
) -> (mpsc::Receiver<CutoffTick>, ManualTrigger) {
    let (tx, rx) = mpsc::channel(16);
    for window in cutoffs.windows.clone() {
        let tz = cutoffs.timezone;
        let tx = tx.clone();
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = next_occurrence(tz, window, now);
                let wait = (next - now).to_std().unwrap_or_default();
                tracing::debug!(window = %window, next = %next, "cutoff scheduled");
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if tx.send(CutoffTick { firing_time: next }).await.is_err() {
                            return;
                        }
                    }
                    _ = shutdown.changed() => return,
                }
            }
        });
    }
    (rx, ManualTrigger { tx })
}
