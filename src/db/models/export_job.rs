//! Export-job data models: the persisted queue row plus the shapes the UI
//! renders (job list entries, badge counts).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failures a job may accumulate before it goes terminal and waits for a
/// human decision.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Failed,
    MaxRetries,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Failed => "failed",
            JobStatus::MaxRetries => "max_retries",
            JobStatus::Completed => "completed",
        }
    }

    /// Terminal states are never auto-rescheduled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::MaxRetries | JobStatus::Completed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub job_id: String,
    pub bundle_id: String,
    pub notebook_ref: String,
    pub dedupe_key: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// Row shape for the UI's job list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDisplay {
    pub job_id: String,
    pub notebook_ref: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub can_retry: bool,
}

impl From<ExportJob> for JobDisplay {
    fn from(job: ExportJob) -> Self {
        let can_retry = matches!(job.status, JobStatus::Failed | JobStatus::MaxRetries);
        Self {
            job_id: job.job_id,
            notebook_ref: job.notebook_ref,
            status: job.status,
            attempts: job.attempts,
            max_attempts: MAX_ATTEMPTS,
            created_at: job.created_at,
            last_attempt_at: job.last_attempt_at,
            last_error: job.last_error,
            can_retry,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub pending: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BadgeColor {
    Neutral,
    Amber,
    Red,
}

/// Toolbar badge for the queue: escalating color plus a capped count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobBadge {
    pub counts: JobCounts,
    pub color: BadgeColor,
    pub text: Option<String>,
}

impl JobBadge {
    pub fn from_counts(counts: JobCounts) -> Self {
        let color = if counts.failed > 0 {
            BadgeColor::Red
        } else if counts.pending > 0 {
            BadgeColor::Amber
        } else {
            BadgeColor::Neutral
        };

        let outstanding = counts.pending + counts.failed;
        let text = match outstanding {
            0 => None,
            n if n > 99 => Some("99+".to_string()),
            n => Some(n.to_string()),
        };

        Self { counts, color, text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pending: usize, failed: usize) -> JobCounts {
        JobCounts {
            pending,
            failed,
            total: pending + failed,
        }
    }

    #[test]
    fn badge_color_escalates() {
        assert_eq!(JobBadge::from_counts(counts(0, 0)).color, BadgeColor::Neutral);
        assert_eq!(JobBadge::from_counts(counts(2, 0)).color, BadgeColor::Amber);
        assert_eq!(JobBadge::from_counts(counts(2, 1)).color, BadgeColor::Red);
    }

    #[test]
    fn badge_text_caps_at_ninety_nine() {
        assert_eq!(JobBadge::from_counts(counts(0, 0)).text, None);
        assert_eq!(JobBadge::from_counts(counts(7, 0)).text.as_deref(), Some("7"));
        assert_eq!(
            JobBadge::from_counts(counts(150, 3)).text.as_deref(),
            Some("99+")
        );
    }

    #[test]
    fn display_row_allows_retry_only_after_a_failure() {
        let job = ExportJob {
            job_id: "j1".into(),
            bundle_id: "b1".into(),
            notebook_ref: "Inbox".into(),
            dedupe_key: "k1".into(),
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            last_attempt_at: None,
            next_attempt_at: None,
        };

        let display = JobDisplay::from(job.clone());
        assert!(!display.can_retry);
        assert_eq!(display.max_attempts, MAX_ATTEMPTS);

        let failed = ExportJob {
            status: JobStatus::MaxRetries,
            attempts: 3,
            ..job
        };
        assert!(JobDisplay::from(failed).can_retry);
    }
}
