//! End-to-end exercises of the export pipeline against a real on-disk
//! store: gate ordering, the preview/confirm round trip, dedupe, and the
//! retry lifecycle.

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use leclip::{commands, App, ExportBlock, JobStatus, RawNote, RetrySchedulerController};

async fn app_with_settings(settings_json: Option<&str>) -> (App, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    if let Some(json) = settings_json {
        std::fs::write(dir.path().join("settings.json"), json).expect("write settings");
    }
    let app = App::init(dir.path()).await.expect("app init");
    (app, dir)
}

fn note_with_selection(url: &str, selection: &str) -> RawNote {
    let mut note = RawNote::for_url(url);
    note.selected_text = Some(selection.to_string());
    note.captured_at = Some(Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap());
    note
}

#[tokio::test]
async fn disabled_feature_blocks_everything() {
    let (app, _dir) = app_with_settings(Some(r#"{"export": {"enabled": false}}"#)).await;

    let note = note_with_selection("https://example.com/a", "a perfectly fine passage");
    let response = commands::prepare_export(&app, note, false).await;

    assert!(!response.outcome.ok);
    assert_eq!(response.outcome.reason, Some(ExportBlock::Disabled));
    assert!(response.outcome.bundle.is_none());
}

#[tokio::test]
async fn unbuildable_note_reports_missing_bundle() {
    let (app, _dir) = app_with_settings(None).await;

    let response = commands::prepare_export(&app, RawNote::for_url("   "), false).await;
    assert_eq!(response.outcome.reason, Some(ExportBlock::MissingBundle));
}

#[tokio::test]
async fn cloud_export_consent_is_respected() {
    let (app, _dir) = app_with_settings(None).await;

    let mut note = note_with_selection("https://example.com/a", "passage");
    note.allow_cloud_export = Some(false);
    let response = commands::prepare_export(&app, note, false).await;
    assert_eq!(response.outcome.reason, Some(ExportBlock::CloudExportDisabled));
}

#[tokio::test]
async fn sensitive_domains_outrank_the_pii_gate() {
    let (app, _dir) = app_with_settings(Some(
        r#"{"sensitive_domains": ["*.bank.com"]}"#,
    ))
    .await;

    // PII present too, but the domain gate comes first.
    let note = note_with_selection("https://www.bank.com/statement", "contact a@b.com");
    let response = commands::prepare_export(&app, note, false).await;
    assert_eq!(response.outcome.reason, Some(ExportBlock::SensitiveDomain));
    assert!(response.confirmation_nonce.is_none());
}

#[tokio::test]
async fn successful_export_creates_a_queued_job() {
    let (app, _dir) = app_with_settings(Some(
        r#"{
            "export": {"default_notebook_ref": "Reading List"},
            "rules": {"by_tag": [{"tag": "rust", "notebook_ref": "Programming"}]}
        }"#,
    ))
    .await;

    let mut note = note_with_selection("https://blog.example.com/post", "a fine passage");
    note.tags = vec!["rust".into()];
    let response = commands::prepare_export(&app, note, false).await;

    assert!(response.outcome.ok);
    assert_eq!(response.outcome.notebook_ref.as_deref(), Some("Programming"));
    assert_eq!(
        response.outcome.notebook_url.as_deref(),
        Some("https://notebook.example.com/n/Programming")
    );

    let job = response.outcome.job.expect("job created");
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempts, 0);

    let displays = commands::get_jobs_for_display(&app).await.unwrap();
    assert_eq!(displays.len(), 1);
    assert_eq!(displays[0].job_id, job.job_id);
    assert_eq!(displays[0].max_attempts, 3);
    assert!(!displays[0].can_retry);

    let counts = commands::get_pending_jobs_count(&app).await.unwrap();
    assert_eq!((counts.pending, counts.failed, counts.total), (1, 0, 1));
}

#[tokio::test]
async fn immediate_duplicate_is_suppressed() {
    let (app, _dir) = app_with_settings(None).await;

    let note = note_with_selection("https://example.com/a", "the same passage");
    let first = commands::prepare_export(&app, note.clone(), false).await;
    assert!(first.outcome.ok);

    let second = commands::prepare_export(&app, note, false).await;
    assert!(!second.outcome.ok);
    assert_eq!(second.outcome.reason, Some(ExportBlock::Dedupe));
    assert!(second.outcome.job.is_none());
}

#[tokio::test]
async fn pii_preview_then_confirm_then_dedupe() {
    let (app, _dir) = app_with_settings(None).await;

    let note = note_with_selection("https://example.com/a", "write to someone@example.org");

    // First call: a preview, not a commit.
    let preview = commands::prepare_export(&app, note.clone(), false).await;
    assert!(!preview.outcome.ok);
    assert_eq!(preview.outcome.reason, Some(ExportBlock::PiiWarning));
    assert!(preview.outcome.bundle.is_some());
    assert!(preview.outcome.clip_text.is_some());
    assert!(preview.outcome.notebook_url.is_some());
    assert!(preview.outcome.dedupe_key.is_some());
    assert!(preview.outcome.job.is_none());

    let nonce = preview.confirmation_nonce.expect("nonce for confirmation");

    // No job yet, and the dedupe key is unmarked, so the confirm commits.
    let confirmed = commands::confirm_export(&app, &nonce).await;
    assert!(confirmed.outcome.ok);
    assert!(confirmed.outcome.job.is_some());

    // The nonce is spent.
    let replay = commands::confirm_export(&app, &nonce).await;
    assert_eq!(replay.outcome.reason, Some(ExportBlock::UnexpectedError));

    // Either bypass value now lands on the dedupe gate.
    let repeat = commands::prepare_export(&app, note.clone(), true).await;
    assert_eq!(repeat.outcome.reason, Some(ExportBlock::Dedupe));
    let repeat = commands::prepare_export(&app, note, false).await;
    assert_eq!(repeat.outcome.reason, Some(ExportBlock::Dedupe));
}

#[tokio::test]
async fn retry_lifecycle_ends_in_max_retries() {
    let (app, _dir) = app_with_settings(None).await;

    let note = note_with_selection("https://example.com/a", "passage");
    let job = commands::prepare_export(&app, note, false)
        .await
        .outcome
        .job
        .expect("job");

    // Three failures walk the backoff tiers and stay retryable.
    for expected_attempts in 1..=3 {
        let display = commands::report_job_failure(&app, &job.job_id, "clipboard hand-off failed")
            .await
            .unwrap();
        assert_eq!(display.status, JobStatus::Failed);
        assert_eq!(display.attempts, expected_attempts);
        assert!(display.can_retry);
    }

    // A due pass well past the longest backoff re-surfaces the job.
    let later = Utc::now() + Duration::minutes(5);
    let due = app.queue().collect_due_jobs(later).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].job_id, job.job_id);
    assert_eq!(due[0].status, JobStatus::Queued);

    // The fourth failure exhausts the budget.
    let display = commands::report_job_failure(&app, &job.job_id, "still failing")
        .await
        .unwrap();
    assert_eq!(display.status, JobStatus::MaxRetries);
    assert_eq!(display.attempts, 3);

    // Terminal jobs never come back on a scheduled pass.
    let much_later = Utc::now() + Duration::days(1);
    let due = app.queue().collect_due_jobs(much_later).await.unwrap();
    assert!(due.is_empty());

    let badge = commands::get_job_badge(&app).await.unwrap();
    assert_eq!(badge.counts.failed, 1);
}

#[tokio::test]
async fn manual_retry_resets_the_budget() {
    let (app, _dir) = app_with_settings(None).await;

    let note = note_with_selection("https://example.com/a", "passage");
    let job = commands::prepare_export(&app, note, false)
        .await
        .outcome
        .job
        .expect("job");

    for _ in 0..4 {
        commands::report_job_failure(&app, &job.job_id, "no luck")
            .await
            .unwrap();
    }

    commands::retry_job(&app, &job.job_id).await.unwrap();

    let displays = commands::get_jobs_for_display(&app).await.unwrap();
    assert_eq!(displays[0].status, JobStatus::Queued);
    assert_eq!(displays[0].attempts, 0);
    assert!(displays[0].last_error.is_none());

    // Immediately eligible again.
    let due = app.queue().collect_due_jobs(Utc::now()).await.unwrap();
    assert_eq!(due.len(), 1);
}

#[tokio::test]
async fn cancel_and_clear_remove_jobs() {
    let (app, _dir) = app_with_settings(None).await;

    let first = commands::prepare_export(
        &app,
        note_with_selection("https://example.com/a", "passage one"),
        false,
    )
    .await
    .outcome
    .job
    .unwrap();

    let second = commands::prepare_export(
        &app,
        note_with_selection("https://example.com/b", "passage two"),
        false,
    )
    .await
    .outcome
    .job
    .unwrap();

    commands::cancel_job(&app, &first.job_id).await.unwrap();
    assert!(commands::cancel_job(&app, &first.job_id).await.is_err());

    for _ in 0..4 {
        commands::report_job_failure(&app, &second.job_id, "nope")
            .await
            .unwrap();
    }
    let cleared = commands::clear_failed_jobs(&app).await.unwrap();
    assert_eq!(cleared, 1);

    let counts = commands::get_pending_jobs_count(&app).await.unwrap();
    assert_eq!(counts.total, 0);
}

#[tokio::test]
async fn completed_jobs_leave_the_pending_count() {
    let (app, _dir) = app_with_settings(None).await;

    let job = commands::prepare_export(
        &app,
        note_with_selection("https://example.com/a", "passage"),
        false,
    )
    .await
    .outcome
    .job
    .unwrap();

    commands::complete_job(&app, &job.job_id).await.unwrap();

    let counts = commands::get_pending_jobs_count(&app).await.unwrap();
    assert_eq!((counts.pending, counts.failed), (0, 0));
    assert_eq!(counts.total, 1);

    let badge = commands::get_job_badge(&app).await.unwrap();
    assert!(badge.text.is_none());
}

#[tokio::test]
async fn queue_survives_a_restart() {
    let dir = TempDir::new().unwrap();

    let job_id = {
        let app = App::init(dir.path()).await.unwrap();
        let note = note_with_selection("https://example.com/a", "durable passage");
        commands::prepare_export(&app, note, false)
            .await
            .outcome
            .job
            .unwrap()
            .job_id
    };

    let reopened = App::init(dir.path()).await.unwrap();
    let displays = commands::get_jobs_for_display(&reopened).await.unwrap();
    assert_eq!(displays.len(), 1);
    assert_eq!(displays[0].job_id, job_id);

    // The dedupe mark survived too.
    let note = note_with_selection("https://example.com/a", "durable passage");
    let repeat = commands::prepare_export(&reopened, note, false).await;
    assert_eq!(repeat.outcome.reason, Some(ExportBlock::Dedupe));
}

#[tokio::test]
async fn scheduler_surfaces_due_jobs_to_the_ui_channel() {
    let (app, _dir) = app_with_settings(None).await;

    let job = commands::prepare_export(
        &app,
        note_with_selection("https://example.com/a", "passage"),
        false,
    )
    .await
    .outcome
    .job
    .unwrap();

    let (due_tx, mut due_rx) = tokio::sync::mpsc::channel(8);
    let mut scheduler = RetrySchedulerController::new();
    scheduler.start(app.queue().clone(), due_tx).unwrap();
    assert!(scheduler.start(app.queue().clone(), tokio::sync::mpsc::channel(1).0).is_err());

    // The first tick fires immediately, and a fresh job is due immediately.
    let surfaced = tokio::time::timeout(std::time::Duration::from_secs(5), due_rx.recv())
        .await
        .expect("scheduler tick")
        .expect("channel open");
    assert_eq!(surfaced.job_id, job.job_id);

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn pending_registry_takes_exactly_once() {
    let (app, _dir) = app_with_settings(None).await;

    let now = Utc::now();
    let pending = app
        .pending()
        .register("bundle-1", serde_json::json!({"k": "v"}), now)
        .await
        .unwrap();

    let peeked = app.pending().peek(&pending.nonce, now).await.unwrap();
    assert!(peeked.is_some());

    let taken = app.pending().take(&pending.nonce, now).await.unwrap();
    assert_eq!(taken.unwrap().job_id, "bundle-1");

    assert!(app.pending().take(&pending.nonce, now).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_pending_entries_read_as_absent() {
    let (app, _dir) = app_with_settings(None).await;

    let created = Utc::now();
    let pending = app
        .pending()
        .register("bundle-1", serde_json::json!({}), created)
        .await
        .unwrap();

    let before_expiry = created + Duration::milliseconds(119_000);
    assert!(app.pending().peek(&pending.nonce, before_expiry).await.unwrap().is_some());

    let after_expiry = created + Duration::milliseconds(121_000);
    assert!(app.pending().peek(&pending.nonce, after_expiry).await.unwrap().is_none());
    assert!(app.pending().take(&pending.nonce, after_expiry).await.unwrap().is_none());
}
