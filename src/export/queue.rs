//! Durable job queue and retry bookkeeping.
//!
//! The queue never delivers anything itself: delivery is a human-assisted
//! hand-off in the UI. This module only decides *when* a job is eligible to
//! be surfaced again, with bounded backoff, and keeps the books when the
//! user reports how the hand-off went.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::db::models::export_job::MAX_ATTEMPTS;
use crate::db::{Database, ExportJob, JobBadge, JobCounts, JobStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Backoff schedule, indexed by how many failures the job has accumulated.
const RETRY_DELAYS_SECS: [i64; MAX_ATTEMPTS as usize] = [5, 30, 120];

/// Finished jobs older than this are swept by `cleanup_old_jobs`.
const RETENTION_DAYS: i64 = 7;

/// Wait before the next automatic retry, or `None` once the failure budget
/// is spent.
fn backoff_delay(failures: u32) -> Option<Duration> {
    if failures == 0 || failures > MAX_ATTEMPTS {
        return None;
    }
    Some(Duration::seconds(RETRY_DELAYS_SECS[(failures - 1) as usize]))
}

#[derive(Clone)]
pub struct RetryProcessor {
    db: Database,
}

impl RetryProcessor {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Appends a fresh queued job, immediately eligible for surfacing.
    pub async fn enqueue(
        &self,
        bundle_id: &str,
        notebook_ref: &str,
        dedupe_key: &str,
        now: DateTime<Utc>,
    ) -> Result<ExportJob> {
        let job = ExportJob {
            job_id: Uuid::new_v4().to_string(),
            bundle_id: bundle_id.to_string(),
            notebook_ref: notebook_ref.to_string(),
            dedupe_key: dedupe_key.to_string(),
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            created_at: now,
            last_attempt_at: None,
            next_attempt_at: Some(now),
        };

        self.db.insert_export_job(&job).await?;
        log_info!("enqueued export job {} -> {}", job.job_id, job.notebook_ref);
        Ok(job)
    }

    /// Records one failed hand-off. Schedules the next automatic retry, or
    /// parks the job in `max_retries` once the budget is spent.
    pub async fn record_failure(
        &self,
        job_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<ExportJob> {
        let mut job = self
            .db
            .get_export_job(job_id)
            .await?
            .ok_or_else(|| anyhow!("Job not found"))?;

        if job.status.is_terminal() {
            log_warn!(
                "ignoring failure report for terminal job {} ({})",
                job.job_id,
                job.status.as_str()
            );
            return Ok(job);
        }

        let failures = job.attempts + 1;
        job.last_error = Some(error.to_string());
        job.last_attempt_at = Some(now);

        match backoff_delay(failures) {
            Some(delay) => {
                job.attempts = failures;
                job.status = JobStatus::Failed;
                job.next_attempt_at = Some(now + delay);
                log_info!(
                    "export job {} failed (attempt {}/{}), next retry in {}s",
                    job.job_id,
                    failures,
                    MAX_ATTEMPTS,
                    delay.num_seconds()
                );
            }
            None => {
                job.attempts = MAX_ATTEMPTS;
                job.status = JobStatus::MaxRetries;
                job.next_attempt_at = None;
                log_warn!(
                    "export job {} exhausted its retries; waiting on manual action",
                    job.job_id
                );
            }
        }

        self.db.update_job_retry_state(&job).await?;
        Ok(job)
    }

    /// The scheduled pass: failed jobs whose backoff elapsed re-enter the
    /// queued state, then every due queued job is returned for the UI to
    /// surface. Terminal jobs never show up here.
    pub async fn collect_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ExportJob>> {
        let requeued = self.db.requeue_due_failed_jobs(now).await?;
        if requeued > 0 {
            log_info!("{requeued} failed job(s) re-entered the retry queue");
        }
        self.db.list_due_jobs(now).await
    }

    /// Manual retry. Resets the attempt counter: the user asked for a fresh
    /// start, not a continuation of a spent budget.
    pub async fn retry_job(&self, job_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.db.requeue_job(job_id, now).await
    }

    /// Cancellation is logical removal; there is no in-flight delivery to
    /// preempt.
    pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
        let removed = self.db.delete_export_job(job_id).await?;
        if !removed {
            return Err(anyhow!("Job not found"));
        }
        log_info!("cancelled export job {job_id}");
        Ok(())
    }

    pub async fn complete_job(&self, job_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.db.mark_job_completed(job_id, now).await?;
        log_info!("export job {job_id} confirmed delivered");
        Ok(())
    }

    pub async fn clear_failed_jobs(&self) -> Result<usize> {
        let cleared = self.db.delete_terminal_failed_jobs().await?;
        if cleared > 0 {
            log_info!("cleared {cleared} job(s) that had exhausted retries");
        }
        Ok(cleared)
    }

    pub async fn cleanup_old_jobs(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let pruned = self.db.delete_finished_jobs_before(cutoff).await?;
        if pruned > 0 {
            log_info!("pruned {pruned} finished job(s) older than {RETENTION_DAYS} days");
        }
        Ok(pruned)
    }

    /// Every job, newest first, for the UI's queue view.
    pub async fn jobs(&self) -> Result<Vec<ExportJob>> {
        self.db.list_export_jobs().await
    }

    pub async fn counts(&self) -> Result<JobCounts> {
        self.db.count_jobs().await
    }

    pub async fn badge(&self) -> Result<JobBadge> {
        Ok(JobBadge::from_counts(self.counts().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_matches_the_product_tiers() {
        assert_eq!(backoff_delay(1), Some(Duration::seconds(5)));
        assert_eq!(backoff_delay(2), Some(Duration::seconds(30)));
        assert_eq!(backoff_delay(3), Some(Duration::minutes(2)));
    }

    #[test]
    fn backoff_ends_after_the_attempt_budget() {
        assert_eq!(backoff_delay(0), None);
        assert_eq!(backoff_delay(4), None);
        assert_eq!(backoff_delay(99), None);
    }
}
