use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One confirmation round trip awaiting the user. Lives in its own table,
/// apart from the durable queue: it correlates a bounded-time UI exchange
/// and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJob {
    /// High-entropy lookup key; a stale or forged confirmation cannot guess
    /// its way to someone else's entry.
    pub nonce: String,
    pub job_id: String,
    /// Whatever the caller needs back when the user answers, typically the
    /// raw note awaiting a PII bypass.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
