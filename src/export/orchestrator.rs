//! The export decision pipeline.
//!
//! One entry point, a fixed gate order, and one explainable outcome per
//! call. Policy failures are data (`ok=false` plus a reason), not errors;
//! only the store is allowed to raise.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::bundle::{self, RawNote, ReadingBundle};
use crate::db::{Database, ExportJob};
use crate::dedupe::{self, DedupeGuard};
use crate::notebook;
use crate::privacy;
use crate::settings::SettingsStore;

use super::queue::RetryProcessor;

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Why an export did not go through. Closed, stable set; the UI branches on
/// these strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportBlock {
    Disabled,
    MissingBundle,
    CloudExportDisabled,
    SensitiveDomain,
    Dedupe,
    PiiWarning,
    UnexpectedError,
}

impl ExportBlock {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportBlock::Disabled => "disabled",
            ExportBlock::MissingBundle => "missing_bundle",
            ExportBlock::CloudExportDisabled => "cloud_export_disabled",
            ExportBlock::SensitiveDomain => "sensitive_domain",
            ExportBlock::Dedupe => "dedupe",
            ExportBlock::PiiWarning => "pii_warning",
            ExportBlock::UnexpectedError => "unexpected_error",
        }
    }
}

/// The single result shape for every `prepare_export` call. Which fields
/// are populated depends on how far the pipeline got.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    pub ok: bool,
    pub reason: Option<ExportBlock>,
    pub bundle: Option<ReadingBundle>,
    pub clip_text: Option<String>,
    pub notebook_ref: Option<String>,
    pub notebook_url: Option<String>,
    pub dedupe_key: Option<String>,
    pub job: Option<ExportJob>,
}

impl ExportOutcome {
    pub fn blocked(reason: ExportBlock) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            bundle: None,
            clip_text: None,
            notebook_ref: None,
            notebook_url: None,
            dedupe_key: None,
            job: None,
        }
    }
}

#[derive(Clone)]
pub struct ExportOrchestrator {
    settings: Arc<SettingsStore>,
    dedupe: DedupeGuard,
    queue: RetryProcessor,
}

impl ExportOrchestrator {
    pub fn new(db: Database, settings: Arc<SettingsStore>) -> Self {
        Self {
            settings,
            dedupe: DedupeGuard::new(db.clone()),
            queue: RetryProcessor::new(db),
        }
    }

    /// Runs the gated pipeline for one note.
    ///
    /// Gates run in a strict order and short-circuit on the first failure:
    /// feature switch, bundle build, cloud-export consent, sensitive domain,
    /// dedupe, then the PII gate. The PII gate is special: without a bypass
    /// it returns a *preview* — bundle, clip text, destination and dedupe
    /// key, but no job and no dedupe mark — so the UI can ask the user. A
    /// follow-up call with `bypass_pii` re-runs the same pipeline and, since
    /// nothing was marked, reaches the commit step. Consent and domain gates
    /// sit in front of the PII gate on purpose: a bypass must never leak a
    /// clip those gates would have stopped.
    pub async fn prepare_export(&self, note: &RawNote, bypass_pii: bool) -> Result<ExportOutcome> {
        let export = self.settings.export();
        if !export.enabled {
            return Ok(ExportOutcome::blocked(ExportBlock::Disabled));
        }

        let Some(bundle) = bundle::build_bundle(note, export.allow_cloud_export) else {
            return Ok(ExportOutcome::blocked(ExportBlock::MissingBundle));
        };

        if !bundle.privacy.allow_cloud_export {
            return Ok(ExportOutcome::blocked(ExportBlock::CloudExportDisabled));
        }

        if privacy::is_sensitive_url(&bundle.url, &self.settings.sensitive_domains()) {
            return Ok(ExportOutcome::blocked(ExportBlock::SensitiveDomain));
        }

        let rules = self.settings.rules();
        let notebook_ref =
            notebook::resolve_notebook_ref(&bundle, &rules, export.default_notebook_ref.as_deref());
        let dedupe_key = dedupe::compute_dedupe_key(&bundle, &notebook_ref);

        if self.dedupe.is_dedupe_hit(&dedupe_key).await? {
            return Ok(ExportOutcome::blocked(ExportBlock::Dedupe));
        }

        let clip_text = bundle::format_clip(&bundle, export.export_max_chars);
        let notebook_url = notebook::notebook_url(&notebook_ref, &export.base_url);

        if bundle.privacy.contains_pii && export.pii_warning && !bypass_pii {
            // Preview, not a commit: the user gets everything needed to
            // decide, and a later bypass call recomputes from scratch.
            return Ok(ExportOutcome {
                ok: false,
                reason: Some(ExportBlock::PiiWarning),
                bundle: Some(bundle),
                clip_text: Some(clip_text),
                notebook_ref: Some(notebook_ref),
                notebook_url: Some(notebook_url),
                dedupe_key: Some(dedupe_key),
                job: None,
            });
        }

        log_info!(
            "exporting clip from {} to {} (mode {}, confidence {:.2})",
            bundle.domain,
            notebook_ref,
            bundle.reading_mode.as_str(),
            bundle.confidence
        );

        let job = self
            .queue
            .enqueue(&bundle.id, &notebook_ref, &dedupe_key, Utc::now())
            .await?;
        self.dedupe.mark_dedupe_hit(&dedupe_key).await?;

        log_info!("export job {} queued for hand-off", job.job_id);

        Ok(ExportOutcome {
            ok: true,
            reason: None,
            bundle: Some(bundle),
            clip_text: Some(clip_text),
            notebook_ref: Some(notebook_ref),
            notebook_url: Some(notebook_url),
            dedupe_key: Some(dedupe_key),
            job: Some(job),
        })
    }

    pub(crate) fn dedupe_guard(&self) -> &DedupeGuard {
        &self.dedupe
    }
}
