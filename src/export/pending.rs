//! Pending-confirmation registry: a short-lived, nonce-keyed correlator for
//! one UI round trip. Deliberately separate from the durable queue —
//! abandoned entries just expire, nothing retries them.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};

use crate::db::{Database, PendingJob};

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// How long a confirmation may sit unanswered before it is abandoned.
pub const DEFAULT_TTL_MS: i64 = 120_000;

const NONCE_LEN: usize = 32;

/// Pure expiry check; the TTL is observed lazily on lookup, there is no
/// live timer.
pub fn is_expired(pending: &PendingJob, now: DateTime<Utc>) -> bool {
    now >= pending.expires_at
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct PendingRegistry {
    db: Database,
    ttl: Duration,
}

impl PendingRegistry {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            ttl: Duration::milliseconds(DEFAULT_TTL_MS),
        }
    }

    /// Files a new entry and hands back its nonce for the UI to echo.
    pub async fn register(
        &self,
        job_id: &str,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<PendingJob> {
        let pending = PendingJob {
            nonce: generate_nonce(),
            job_id: job_id.to_string(),
            payload,
            created_at: now,
            expires_at: now + self.ttl,
        };

        self.db.insert_pending_job(&pending).await?;
        log_info!("registered pending confirmation for {}", pending.job_id);
        Ok(pending)
    }

    /// Removes and returns the entry exactly once. An expired entry is
    /// dropped and reported as absent — a stale confirmation resolves
    /// nothing.
    pub async fn take(&self, nonce: &str, now: DateTime<Utc>) -> Result<Option<PendingJob>> {
        let Some(pending) = self.db.take_pending_job(nonce).await? else {
            return Ok(None);
        };

        if is_expired(&pending, now) {
            log_info!("dropped expired pending confirmation for {}", pending.job_id);
            return Ok(None);
        }

        Ok(Some(pending))
    }

    /// Reads without consuming; expired entries read as absent.
    pub async fn peek(&self, nonce: &str, now: DateTime<Utc>) -> Result<Option<PendingJob>> {
        let pending = self.db.peek_pending_job(nonce).await?;
        Ok(pending.filter(|p| !is_expired(p, now)))
    }

    /// Housekeeping sweep for entries nobody will ever answer.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let purged = self.db.purge_expired_pending_jobs(now).await?;
        if purged > 0 {
            log_info!("purged {purged} abandoned confirmation(s)");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_created_at(created_at: DateTime<Utc>) -> PendingJob {
        PendingJob {
            nonce: "n".into(),
            job_id: "j".into(),
            payload: serde_json::json!({}),
            created_at,
            expires_at: created_at + Duration::milliseconds(DEFAULT_TTL_MS),
        }
    }

    #[test]
    fn expiry_is_a_pure_time_comparison() {
        let created = Utc::now();
        let pending = pending_created_at(created);

        assert!(!is_expired(&pending, created + Duration::milliseconds(119_000)));
        assert!(is_expired(&pending, created + Duration::milliseconds(121_000)));
    }

    #[test]
    fn nonces_are_long_and_distinct() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), NONCE_LEN);
        assert_ne!(a, b);
    }
}
