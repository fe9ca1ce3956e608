//! Content-addressed duplicate suppression.
//!
//! The fingerprint covers the source URL, the normalized excerpt, the
//! resolved destination, and a coarse UTC calendar-day bucket of the capture
//! time. Rapid double-submits of the same excerpt collapse onto one key;
//! the same excerpt exported the next day gets a fresh one.

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use crate::bundle::ReadingBundle;
use crate::db::Database;

/// Deterministic fingerprint for a (bundle, destination) pair.
pub fn compute_dedupe_key(bundle: &ReadingBundle, notebook_ref: &str) -> String {
    let content = normalize_content(bundle.excerpt().unwrap_or(""));
    let day_bucket = bundle.captured_at.format("%Y-%m-%d").to_string();
    let material = format!("{}\n{}\n{}\n{}", bundle.url, content, notebook_ref, day_bucket);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes()).to_string()
}

/// Case-folded, whitespace-collapsed excerpt text, so trivial reflows of the
/// same selection fingerprint identically.
fn normalize_content(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Read/mark interface over the persisted key set.
#[derive(Clone)]
pub struct DedupeGuard {
    db: Database,
}

impl DedupeGuard {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Pure read; no side effects on the key set.
    pub async fn is_dedupe_hit(&self, key: &str) -> Result<bool> {
        self.db.has_dedupe_key(key).await
    }

    /// The sole mutation, idempotent by construction: marking a key twice is
    /// indistinguishable from marking it once.
    pub async fn mark_dedupe_hit(&self, key: &str) -> Result<()> {
        self.db.insert_dedupe_key(key, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{build_bundle, RawNote};
    use chrono::TimeZone;

    fn bundle_at(day: u32, selection: &str) -> ReadingBundle {
        let mut note = RawNote::for_url("https://example.com/article");
        note.selected_text = Some(selection.to_string());
        note.captured_at = Some(Utc.with_ymd_and_hms(2026, 3, day, 10, 30, 0).unwrap());
        build_bundle(&note, true).unwrap()
    }

    #[test]
    fn identical_inputs_yield_identical_keys() {
        let a = bundle_at(5, "some passage");
        let b = bundle_at(5, "some passage");
        assert_eq!(compute_dedupe_key(&a, "Inbox"), compute_dedupe_key(&b, "Inbox"));
    }

    #[test]
    fn whitespace_and_case_do_not_change_the_key() {
        let a = bundle_at(5, "Some   Passage\nhere");
        let b = bundle_at(5, "some passage here");
        assert_eq!(compute_dedupe_key(&a, "Inbox"), compute_dedupe_key(&b, "Inbox"));
    }

    #[test]
    fn destination_is_part_of_the_fingerprint() {
        let bundle = bundle_at(5, "some passage");
        assert_ne!(
            compute_dedupe_key(&bundle, "Inbox"),
            compute_dedupe_key(&bundle, "Research")
        );
    }

    #[test]
    fn a_later_day_gets_a_fresh_key() {
        let today = bundle_at(5, "some passage");
        let tomorrow = bundle_at(6, "some passage");
        assert_ne!(
            compute_dedupe_key(&today, "Inbox"),
            compute_dedupe_key(&tomorrow, "Inbox")
        );
    }
}
