use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::connection::Database;

impl Database {
    pub async fn has_dedupe_key(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare("SELECT 1 FROM dedupe_keys WHERE key = ?1 LIMIT 1")?;
            let exists = stmt.exists(params![key])?;
            Ok(exists)
        })
        .await
    }

    /// INSERT OR IGNORE keeps this idempotent; marking the same key from two
    /// call sites is deliberate (see the confirmation path) and harmless.
    pub async fn insert_dedupe_key(&self, key: &str, now: DateTime<Utc>) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO dedupe_keys (key, created_at) VALUES (?1, ?2)",
                params![key, now.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }
}
