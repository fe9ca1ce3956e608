//! Bundle building: normalizes a raw in-context note into the immutable
//! snapshot every downstream gate works from, plus the clip formatter that
//! turns a bundle into the text actually handed to the notebook app.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::privacy;
use crate::signals::{self, ReadingMode};

/// A raw reading note as the UI captured it. Everything is optional except
/// the URL; the bundle builder decides what survives normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawNote {
    pub url: String,
    pub title: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    /// Explicit mode the user picked, passed through verbatim. Invalid
    /// values fall back to derivation.
    pub reading_mode: Option<String>,
    /// The chat command that produced this note, if any.
    pub command: Option<String>,
    pub selected_text: Option<String>,
    pub viewport_excerpt: Option<String>,
    pub user_intent_label: Option<String>,
    pub atomic_thought: Option<String>,
    pub tags: Vec<String>,
    pub tags_confirmed: bool,
    pub ai_summary: Option<String>,
    pub ai_critique: Option<String>,
    /// Per-note override of the cloud-export consent setting.
    pub allow_cloud_export: Option<bool>,
}

impl RawNote {
    pub fn for_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyFlags {
    pub contains_pii: bool,
    pub allow_cloud_export: bool,
}

/// Canonical derived snapshot of a note: one per export attempt, immutable
/// once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingBundle {
    pub id: String,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub captured_at: DateTime<Utc>,
    pub reading_mode: ReadingMode,
    pub confidence: f64,
    /// Exactly one of `selected_text` and `viewport_excerpt` is set; the
    /// selection wins, the viewport excerpt is the fallback.
    pub selected_text: Option<String>,
    pub viewport_excerpt: Option<String>,
    pub user_intent_label: Option<String>,
    pub atomic_thought: Option<String>,
    pub tags: BTreeSet<String>,
    pub privacy: PrivacyFlags,
}

impl ReadingBundle {
    /// The excerpt the clip is built from, whichever field carries it.
    pub fn excerpt(&self) -> Option<&str> {
        self.selected_text
            .as_deref()
            .or(self.viewport_excerpt.as_deref())
    }
}

/// Normalize a raw note into a bundle. Returns `None` when no bundle can be
/// built, which the orchestrator reports as `missing_bundle`.
pub fn build_bundle(note: &RawNote, allow_cloud_export_default: bool) -> Option<ReadingBundle> {
    let url = note.url.trim();
    if url.is_empty() {
        return None;
    }
    let domain = privacy::host_of(url)?;

    let captured_at = note.captured_at.unwrap_or_else(Utc::now);

    let selected_text = non_empty(note.selected_text.as_deref());
    let viewport_excerpt = if selected_text.is_some() {
        None
    } else {
        non_empty(note.viewport_excerpt.as_deref())
    };

    let title = non_empty(note.title.as_deref()).unwrap_or_else(|| domain.clone());

    let tags: BTreeSet<String> = note
        .tags
        .iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();

    let mut screened = String::new();
    for part in [
        selected_text.as_deref(),
        viewport_excerpt.as_deref(),
        note.atomic_thought.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        screened.push_str(part);
        screened.push('\n');
    }

    // Consent is a conjunction: a per-note opt-in cannot override a global
    // off switch.
    let privacy = PrivacyFlags {
        contains_pii: privacy::contains_pii(&screened),
        allow_cloud_export: allow_cloud_export_default
            && note.allow_cloud_export.unwrap_or(true),
    };

    Some(ReadingBundle {
        id: Uuid::new_v4().to_string(),
        url: url.to_string(),
        domain,
        title,
        captured_at,
        reading_mode: signals::derive_reading_mode(Some(note)),
        confidence: signals::derive_confidence(Some(note)),
        selected_text,
        viewport_excerpt,
        user_intent_label: non_empty(note.user_intent_label.as_deref()),
        atomic_thought: non_empty(note.atomic_thought.as_deref()),
        tags,
        privacy,
    })
}

/// Format the clip text for a bundle. Pure; truncates on a char boundary
/// when the assembled text exceeds `max_chars`.
pub fn format_clip(bundle: &ReadingBundle, max_chars: usize) -> String {
    let mut clip = String::new();
    clip.push_str(&bundle.title);
    clip.push('\n');

    if let Some(excerpt) = bundle.excerpt() {
        clip.push('\n');
        clip.push_str(excerpt.trim());
        clip.push('\n');
    }

    if let Some(thought) = bundle.atomic_thought.as_deref() {
        clip.push('\n');
        clip.push_str("Thought: ");
        clip.push_str(thought.trim());
        clip.push('\n');
    }

    if !bundle.tags.is_empty() {
        clip.push('\n');
        let tags: Vec<String> = bundle.tags.iter().map(|t| format!("#{t}")).collect();
        clip.push_str(&tags.join(" "));
        clip.push('\n');
    }

    clip.push('\n');
    clip.push_str("Source: ");
    clip.push_str(&bundle.url);

    truncate_chars(&clip, max_chars)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_a_parseable_url() {
        assert!(build_bundle(&RawNote::for_url(""), true).is_none());
        assert!(build_bundle(&RawNote::for_url("   "), true).is_none());
        assert!(build_bundle(&RawNote::for_url("not a url"), true).is_none());
    }

    #[test]
    fn normalizes_the_domain() {
        let bundle =
            build_bundle(&RawNote::for_url("https://WWW.Example.COM/Article"), true).unwrap();
        assert_eq!(bundle.domain, "example.com");
    }

    #[test]
    fn selection_wins_over_viewport_excerpt() {
        let mut note = RawNote::for_url("https://example.com/a");
        note.selected_text = Some("picked text".into());
        note.viewport_excerpt = Some("whatever was visible".into());
        let bundle = build_bundle(&note, true).unwrap();
        assert_eq!(bundle.selected_text.as_deref(), Some("picked text"));
        assert!(bundle.viewport_excerpt.is_none());
    }

    #[test]
    fn viewport_excerpt_is_the_fallback() {
        let mut note = RawNote::for_url("https://example.com/a");
        note.viewport_excerpt = Some("visible text".into());
        let bundle = build_bundle(&note, true).unwrap();
        assert!(bundle.selected_text.is_none());
        assert_eq!(bundle.viewport_excerpt.as_deref(), Some("visible text"));
        assert_eq!(bundle.excerpt(), Some("visible text"));
    }

    #[test]
    fn cloud_export_needs_both_the_setting_and_the_note_to_agree() {
        let mut note = RawNote::for_url("https://example.com/a");
        note.allow_cloud_export = Some(false);
        let bundle = build_bundle(&note, true).unwrap();
        assert!(!bundle.privacy.allow_cloud_export);

        note.allow_cloud_export = Some(true);
        let bundle = build_bundle(&note, false).unwrap();
        assert!(!bundle.privacy.allow_cloud_export);

        note.allow_cloud_export = None;
        let bundle = build_bundle(&note, true).unwrap();
        assert!(bundle.privacy.allow_cloud_export);
    }

    #[test]
    fn flags_pii_in_the_selection() {
        let mut note = RawNote::for_url("https://example.com/a");
        note.selected_text = Some("reach me at someone@example.org".into());
        let bundle = build_bundle(&note, true).unwrap();
        assert!(bundle.privacy.contains_pii);
    }

    #[test]
    fn clip_contains_title_excerpt_tags_and_source() {
        let mut note = RawNote::for_url("https://example.com/a");
        note.title = Some("A Title".into());
        note.selected_text = Some("an excerpt".into());
        note.tags = vec!["reading".into(), "rust".into()];
        let bundle = build_bundle(&note, true).unwrap();

        let clip = format_clip(&bundle, 2000);
        assert!(clip.starts_with("A Title\n"));
        assert!(clip.contains("an excerpt"));
        assert!(clip.contains("#reading #rust"));
        assert!(clip.ends_with("Source: https://example.com/a"));
    }

    #[test]
    fn clip_truncates_on_a_char_boundary() {
        let mut note = RawNote::for_url("https://example.com/a");
        note.selected_text = Some("é".repeat(5000));
        let bundle = build_bundle(&note, true).unwrap();

        let clip = format_clip(&bundle, 100);
        assert_eq!(clip.chars().count(), 100);
        assert!(clip.ends_with('…'));
    }
}
