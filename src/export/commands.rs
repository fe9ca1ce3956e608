//! The surface the UI calls.
//!
//! Expected policy outcomes flow through as data; anything the store throws
//! is caught here and flattened to a generic `unexpected_error` so the UI
//! never sees a raw failure.

use chrono::Utc;
use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::bundle::RawNote;
use crate::db::{JobBadge, JobCounts, JobDisplay};
use crate::App;

use super::orchestrator::{ExportBlock, ExportOutcome};

/// `prepare_export` result plus, on a PII preview, the nonce the UI must
/// echo back to confirm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareExportResponse {
    #[serde(flatten)]
    pub outcome: ExportOutcome,
    pub confirmation_nonce: Option<String>,
}

fn unexpected(err: anyhow::Error) -> PrepareExportResponse {
    error!("export pipeline error: {err:?}");
    PrepareExportResponse {
        outcome: ExportOutcome::blocked(ExportBlock::UnexpectedError),
        confirmation_nonce: None,
    }
}

/// Runs the export pipeline for a note. On a PII preview the note is parked
/// in the pending-confirmation registry and the response carries the nonce.
pub async fn prepare_export(app: &App, note: RawNote, bypass_pii: bool) -> PrepareExportResponse {
    let outcome = match app.orchestrator.prepare_export(&note, bypass_pii).await {
        Ok(outcome) => outcome,
        Err(err) => return unexpected(err),
    };

    let mut confirmation_nonce = None;
    if outcome.reason == Some(ExportBlock::PiiWarning) {
        let bundle_id = outcome
            .bundle
            .as_ref()
            .map(|b| b.id.clone())
            .unwrap_or_default();
        let payload = match serde_json::to_value(&note) {
            Ok(payload) => payload,
            Err(err) => return unexpected(err.into()),
        };

        match app.pending.register(&bundle_id, payload, Utc::now()).await {
            Ok(pending) => confirmation_nonce = Some(pending.nonce),
            Err(err) => return unexpected(err),
        }
    }

    PrepareExportResponse {
        outcome,
        confirmation_nonce,
    }
}

/// Resolves a PII confirmation: consumes the nonce, re-runs the pipeline
/// with the bypass, and re-marks the dedupe key on success (the mark is
/// idempotent, so the double write with the orchestrator is harmless).
pub async fn confirm_export(app: &App, nonce: &str) -> PrepareExportResponse {
    let pending = match app.pending.take(nonce, Utc::now()).await {
        Ok(Some(pending)) => pending,
        Ok(None) => {
            warn!("confirmation nonce unknown or expired");
            return PrepareExportResponse {
                outcome: ExportOutcome::blocked(ExportBlock::UnexpectedError),
                confirmation_nonce: None,
            };
        }
        Err(err) => return unexpected(err),
    };

    let note: RawNote = match serde_json::from_value(pending.payload) {
        Ok(note) => note,
        Err(err) => return unexpected(err.into()),
    };

    let outcome = match app.orchestrator.prepare_export(&note, true).await {
        Ok(outcome) => outcome,
        Err(err) => return unexpected(err),
    };

    if outcome.ok {
        if let Some(key) = outcome.dedupe_key.as_deref() {
            if let Err(err) = app.orchestrator.dedupe_guard().mark_dedupe_hit(key).await {
                return unexpected(err);
            }
        }
    }

    PrepareExportResponse {
        outcome,
        confirmation_nonce: None,
    }
}

pub async fn get_jobs_for_display(app: &App) -> Result<Vec<JobDisplay>, String> {
    let jobs = app.queue.jobs().await.map_err(|e| e.to_string())?;
    Ok(jobs.into_iter().map(JobDisplay::from).collect())
}

pub async fn get_pending_jobs_count(app: &App) -> Result<JobCounts, String> {
    app.queue.counts().await.map_err(|e| e.to_string())
}

pub async fn get_job_badge(app: &App) -> Result<JobBadge, String> {
    app.queue.badge().await.map_err(|e| e.to_string())
}

pub async fn retry_job(app: &App, job_id: &str) -> Result<(), String> {
    app.queue
        .retry_job(job_id, Utc::now())
        .await
        .map_err(|e| e.to_string())
}

pub async fn cancel_job(app: &App, job_id: &str) -> Result<(), String> {
    app.queue.cancel_job(job_id).await.map_err(|e| e.to_string())
}

pub async fn clear_failed_jobs(app: &App) -> Result<usize, String> {
    app.queue.clear_failed_jobs().await.map_err(|e| e.to_string())
}

/// The UI reports a hand-off that did not stick; the processor decides what
/// happens next.
pub async fn report_job_failure(
    app: &App,
    job_id: &str,
    error: &str,
) -> Result<JobDisplay, String> {
    app.queue
        .record_failure(job_id, error, Utc::now())
        .await
        .map(JobDisplay::from)
        .map_err(|e| e.to_string())
}

pub async fn complete_job(app: &App, job_id: &str) -> Result<(), String> {
    app.queue
        .complete_job(job_id, Utc::now())
        .await
        .map_err(|e| e.to_string())
}
