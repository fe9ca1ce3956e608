//! Periodic retry scheduler.
//!
//! Owns the tick loop that asks the retry processor for due jobs and hands
//! them to the UI over a channel. The UI performs the actual hand-off; this
//! loop only surfaces work.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::ExportJob;

use super::queue::RetryProcessor;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

const POLL_INTERVAL_SECS: u64 = 30;

pub struct RetrySchedulerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl RetrySchedulerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(&mut self, queue: RetryProcessor, due_tx: mpsc::Sender<ExportJob>) -> Result<()> {
        if self.handle.is_some() {
            bail!("retry scheduler already running");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(scheduler_loop(queue, due_tx, token_clone));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("retry scheduler task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for RetrySchedulerController {
    fn default() -> Self {
        Self::new()
    }
}

async fn scheduler_loop(
    queue: RetryProcessor,
    due_tx: mpsc::Sender<ExportJob>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let due = match queue.collect_due_jobs(Utc::now()).await {
                    Ok(jobs) => jobs,
                    Err(err) => {
                        log_error!("retry pass failed: {err:?}");
                        continue;
                    }
                };

                if due.is_empty() {
                    continue;
                }

                log_info!("surfacing {} job(s) ready for hand-off", due.len());
                for job in due {
                    if due_tx.send(job).await.is_err() {
                        log_info!("due-job receiver dropped; scheduler shutting down");
                        return;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("retry scheduler shutting down");
                break;
            }
        }
    }
}
