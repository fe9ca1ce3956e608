use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::parse_datetime,
    models::PendingJob,
};

fn row_to_pending(row: &Row) -> Result<PendingJob> {
    let payload: String = row.get("payload")?;
    let created_at: String = row.get("created_at")?;
    let expires_at: String = row.get("expires_at")?;

    Ok(PendingJob {
        nonce: row.get("nonce")?,
        job_id: row.get("job_id")?,
        payload: serde_json::from_str(&payload).context("failed to parse pending payload")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        expires_at: parse_datetime(&expires_at, "expires_at")?,
    })
}

const PENDING_COLUMNS: &str = "nonce, job_id, payload, created_at, expires_at";

impl Database {
    pub async fn insert_pending_job(&self, pending: &PendingJob) -> Result<()> {
        let record = pending.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO pending_jobs (nonce, job_id, payload, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.nonce,
                    record.job_id,
                    serde_json::to_string(&record.payload)?,
                    record.created_at.to_rfc3339(),
                    record.expires_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Removes and returns the entry for a nonce in one step, so a nonce can
    /// resolve at most one confirmation.
    pub async fn take_pending_job(&self, nonce: &str) -> Result<Option<PendingJob>> {
        let nonce = nonce.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let pending = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {PENDING_COLUMNS} FROM pending_jobs WHERE nonce = ?1"
                ))?;
                let mut rows = stmt.query(params![nonce])?;
                match rows.next()? {
                    Some(row) => Some(row_to_pending(row)?),
                    None => None,
                }
            };

            if pending.is_some() {
                tx.execute("DELETE FROM pending_jobs WHERE nonce = ?1", params![nonce])?;
            }

            tx.commit()?;
            Ok(pending)
        })
        .await
    }

    pub async fn peek_pending_job(&self, nonce: &str) -> Result<Option<PendingJob>> {
        let nonce = nonce.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PENDING_COLUMNS} FROM pending_jobs WHERE nonce = ?1"
            ))?;
            let mut rows = stmt.query(params![nonce])?;
            let pending = match rows.next()? {
                Some(row) => Some(row_to_pending(row)?),
                None => None,
            };
            Ok(pending)
        })
        .await
    }

    /// Sweeps abandoned entries. Expiry is otherwise only observed lazily on
    /// lookup.
    pub async fn purge_expired_pending_jobs(&self, now: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM pending_jobs WHERE expires_at <= ?1",
                params![now.to_rfc3339()],
            )?;
            Ok(deleted)
        })
        .await
    }
}
