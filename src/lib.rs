mod bundle;
mod db;
mod dedupe;
mod export;
mod notebook;
mod privacy;
mod settings;
mod signals;
mod utils;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;

pub use bundle::{build_bundle, format_clip, PrivacyFlags, RawNote, ReadingBundle};
pub use db::{
    BadgeColor, Database, ExportJob, JobBadge, JobCounts, JobDisplay, JobStatus, PendingJob,
};
pub use dedupe::{compute_dedupe_key, DedupeGuard};
pub use export::{
    commands, ExportBlock, ExportOrchestrator, ExportOutcome, PendingRegistry, RetryProcessor,
    RetrySchedulerController,
};
pub use notebook::{notebook_url, resolve_notebook_ref, FALLBACK_NOTEBOOK};
pub use privacy::{contains_pii, is_sensitive_url};
pub use settings::{ExportSettings, NotebookRule, NotebookRules, SettingsStore};
pub use signals::{derive_confidence, derive_reading_mode, ReadingMode};

/// Everything the surrounding UI holds onto: one database handle, the
/// settings store, and the pipeline pieces wired to them.
pub struct App {
    db: Database,
    settings: Arc<SettingsStore>,
    pub(crate) orchestrator: ExportOrchestrator,
    pub(crate) queue: RetryProcessor,
    pub(crate) pending: PendingRegistry,
}

impl App {
    /// Opens (or creates) the store under `data_dir` and runs startup
    /// housekeeping: abandoned confirmations are purged and finished jobs
    /// past retention are pruned. Queued jobs from before the restart stay
    /// put — that is the whole point of the durable queue.
    pub async fn init(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join("leclip.sqlite3"))?;
        let settings = Arc::new(SettingsStore::new(data_dir.join("settings.json"))?);

        let orchestrator = ExportOrchestrator::new(db.clone(), settings.clone());
        let queue = RetryProcessor::new(db.clone());
        let pending = PendingRegistry::new(db.clone());

        let now = Utc::now();
        let purged = pending.purge_expired(now).await?;
        let pruned = queue.cleanup_old_jobs(now).await?;
        if purged > 0 || pruned > 0 {
            info!("startup housekeeping: {purged} confirmation(s) purged, {pruned} job(s) pruned");
        }

        Ok(Self {
            db,
            settings,
            orchestrator,
            queue,
            pending,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn queue(&self) -> &RetryProcessor {
        &self.queue
    }

    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }
}

/// Initialize logging for a host binary (reads `RUST_LOG`).
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
