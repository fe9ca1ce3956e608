use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_job_status, parse_optional_datetime, to_i64, to_u32},
    models::{ExportJob, JobCounts, JobStatus},
};

fn row_to_job(row: &Row) -> Result<ExportJob> {
    let status: String = row.get("status")?;
    let attempts: i64 = row.get("attempts")?;
    let created_at: String = row.get("created_at")?;
    let last_attempt_at: Option<String> = row.get("last_attempt_at")?;
    let next_attempt_at: Option<String> = row.get("next_attempt_at")?;

    Ok(ExportJob {
        job_id: row.get("job_id")?,
        bundle_id: row.get("bundle_id")?,
        notebook_ref: row.get("notebook_ref")?,
        dedupe_key: row.get("dedupe_key")?,
        status: parse_job_status(&status)?,
        attempts: to_u32(attempts, "attempts")?,
        last_error: row.get("last_error")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        last_attempt_at: parse_optional_datetime(last_attempt_at, "last_attempt_at")?,
        next_attempt_at: parse_optional_datetime(next_attempt_at, "next_attempt_at")?,
    })
}

const JOB_COLUMNS: &str = "job_id, bundle_id, notebook_ref, dedupe_key, status, attempts, \
                           last_error, created_at, last_attempt_at, next_attempt_at";

impl Database {
    pub async fn insert_export_job(&self, job: &ExportJob) -> Result<()> {
        let record = job.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO export_jobs (job_id, bundle_id, notebook_ref, dedupe_key, status, attempts, last_error, created_at, last_attempt_at, next_attempt_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.job_id,
                    record.bundle_id,
                    record.notebook_ref,
                    record.dedupe_key,
                    record.status.as_str(),
                    to_i64(record.attempts)?,
                    record.last_error,
                    record.created_at.to_rfc3339(),
                    record
                        .last_attempt_at
                        .as_ref()
                        .map(|dt| dt.to_rfc3339()),
                    record
                        .next_attempt_at
                        .as_ref()
                        .map(|dt| dt.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_export_job(&self, job_id: &str) -> Result<Option<ExportJob>> {
        let job_id = job_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM export_jobs WHERE job_id = ?1"
            ))?;

            let mut rows = stmt.query(params![job_id])?;
            let job = match rows.next()? {
                Some(row) => Some(row_to_job(row)?),
                None => None,
            };
            Ok(job)
        })
        .await
    }

    pub async fn list_export_jobs(&self) -> Result<Vec<ExportJob>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM export_jobs ORDER BY created_at DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut jobs = Vec::new();
            while let Some(row) = rows.next()? {
                jobs.push(row_to_job(row)?);
            }
            Ok(jobs)
        })
        .await
    }

    /// Persists the retry bookkeeping the processor computed for one job.
    pub async fn update_job_retry_state(&self, job: &ExportJob) -> Result<()> {
        let record = job.clone();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE export_jobs
                 SET status = ?1,
                     attempts = ?2,
                     last_error = ?3,
                     last_attempt_at = ?4,
                     next_attempt_at = ?5
                 WHERE job_id = ?6",
                params![
                    record.status.as_str(),
                    to_i64(record.attempts)?,
                    record.last_error,
                    record
                        .last_attempt_at
                        .as_ref()
                        .map(|dt| dt.to_rfc3339()),
                    record
                        .next_attempt_at
                        .as_ref()
                        .map(|dt| dt.to_rfc3339()),
                    record.job_id,
                ],
            )?;

            if rows_affected == 0 {
                return Err(anyhow::anyhow!("Job not found"));
            }
            Ok(())
        })
        .await
    }

    /// Puts failed jobs whose backoff has elapsed back into the queued state.
    /// Terminal jobs are untouched.
    pub async fn requeue_due_failed_jobs(&self, now: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE export_jobs
                 SET status = ?1
                 WHERE status = ?2
                   AND next_attempt_at IS NOT NULL
                   AND next_attempt_at <= ?3",
                params![
                    JobStatus::Queued.as_str(),
                    JobStatus::Failed.as_str(),
                    now.to_rfc3339(),
                ],
            )?;
            Ok(updated)
        })
        .await
    }

    /// Queued jobs whose scheduled time has elapsed, oldest first.
    pub async fn list_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ExportJob>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM export_jobs
                 WHERE status = ?1
                   AND next_attempt_at IS NOT NULL
                   AND next_attempt_at <= ?2
                 ORDER BY next_attempt_at ASC"
            ))?;

            let mut rows = stmt.query(params![JobStatus::Queued.as_str(), now.to_rfc3339()])?;
            let mut jobs = Vec::new();
            while let Some(row) = rows.next()? {
                jobs.push(row_to_job(row)?);
            }
            Ok(jobs)
        })
        .await
    }

    /// Manual retry: back to queued, error cleared, attempts reset,
    /// immediately eligible.
    pub async fn requeue_job(&self, job_id: &str, now: DateTime<Utc>) -> Result<()> {
        let job_id = job_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE export_jobs
                 SET status = ?1,
                     attempts = 0,
                     last_error = NULL,
                     next_attempt_at = ?2
                 WHERE job_id = ?3",
                params![JobStatus::Queued.as_str(), now.to_rfc3339(), job_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow::anyhow!("Job not found"));
            }
            Ok(())
        })
        .await
    }

    pub async fn mark_job_completed(&self, job_id: &str, now: DateTime<Utc>) -> Result<()> {
        let job_id = job_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE export_jobs
                 SET status = ?1,
                     last_attempt_at = ?2,
                     next_attempt_at = NULL
                 WHERE job_id = ?3",
                params![JobStatus::Completed.as_str(), now.to_rfc3339(), job_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow::anyhow!("Job not found"));
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_export_job(&self, job_id: &str) -> Result<bool> {
        let job_id = job_id.to_string();
        self.execute(move |conn| {
            let rows_affected =
                conn.execute("DELETE FROM export_jobs WHERE job_id = ?1", params![job_id])?;
            Ok(rows_affected > 0)
        })
        .await
    }

    /// Bulk-removes jobs that exhausted their retries.
    pub async fn delete_terminal_failed_jobs(&self) -> Result<usize> {
        self.execute(|conn| {
            let deleted = conn.execute(
                "DELETE FROM export_jobs WHERE status = ?1",
                params![JobStatus::MaxRetries.as_str()],
            )?;
            Ok(deleted)
        })
        .await
    }

    /// Prunes finished jobs (completed or retries-exhausted) whose last
    /// activity predates the cutoff.
    pub async fn delete_finished_jobs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM export_jobs
                 WHERE status IN (?1, ?2)
                   AND COALESCE(last_attempt_at, created_at) < ?3",
                params![
                    JobStatus::Completed.as_str(),
                    JobStatus::MaxRetries.as_str(),
                    cutoff.to_rfc3339(),
                ],
            )?;
            Ok(deleted)
        })
        .await
    }

    pub async fn count_jobs(&self) -> Result<JobCounts> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM export_jobs GROUP BY status")?;

            let mut rows = stmt.query([])?;
            let mut counts = JobCounts::default();
            while let Some(row) = rows.next()? {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                let count = count as usize;
                counts.total += count;
                match parse_job_status(&status)? {
                    JobStatus::Queued => counts.pending += count,
                    JobStatus::Failed | JobStatus::MaxRetries => counts.failed += count,
                    JobStatus::Completed => {}
                }
            }
            Ok(counts)
        })
        .await
    }
}
