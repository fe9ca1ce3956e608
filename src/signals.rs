//! Reading-signal derivation: infers how the user was reading a page from
//! the raw note alone. Never fails; every note (even an absent one) maps to
//! a mode and a confidence score.

use serde::{Deserialize, Serialize};

use crate::bundle::RawNote;

/// Selection length above which we assume deep reading.
const DEEP_SELECTION_CHARS: usize = 500;
/// Selections shorter than this (but non-empty) look like a quick skim.
const SKIM_SELECTION_CHARS: usize = 100;
/// Selection length that earns the long-selection confidence bonus.
const LONG_SELECTION_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReadingMode {
    Skim,
    Deep,
    Reference,
    Reread,
}

impl ReadingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingMode::Skim => "skim",
            ReadingMode::Deep => "deep",
            ReadingMode::Reference => "reference",
            ReadingMode::Reread => "reread",
        }
    }

    /// Parses a mode the UI passed through verbatim. Unknown strings are
    /// treated as "no explicit mode" rather than an error.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "skim" => Some(ReadingMode::Skim),
            "deep" => Some(ReadingMode::Deep),
            "reference" => Some(ReadingMode::Reference),
            "reread" => Some(ReadingMode::Reread),
            _ => None,
        }
    }
}

/// Derive the reading mode for a note.
///
/// An explicit, valid mode on the note wins outright. After that, chat
/// command keywords, then engagement signals. Confirmed tags and an authored
/// atomic thought count independently of selection length; they are stronger
/// evidence of intent than how much text happened to be selected.
pub fn derive_reading_mode(note: Option<&RawNote>) -> ReadingMode {
    let Some(note) = note else {
        return ReadingMode::Skim;
    };

    if let Some(mode) = note.reading_mode.as_deref().and_then(ReadingMode::parse) {
        return mode;
    }

    if let Some(command) = note.command.as_deref() {
        let command = command.to_lowercase();
        if ["critique", "quiz", "analyze"].iter().any(|kw| command.contains(kw)) {
            return ReadingMode::Deep;
        }
        if ["reference", "cite"].iter().any(|kw| command.contains(kw)) {
            return ReadingMode::Reference;
        }
    }

    let selection_len = selection_chars(note);
    if selection_len > DEEP_SELECTION_CHARS {
        return ReadingMode::Deep;
    }
    if has_atomic_thought(note) || has_confirmed_tags(note) {
        return ReadingMode::Deep;
    }
    if selection_len > 0 && selection_len < SKIM_SELECTION_CHARS {
        return ReadingMode::Skim;
    }

    ReadingMode::Skim
}

/// Derive a confidence score in `[0, 1]` for the mode inference.
///
/// Additive over independent positive signals, so adding a signal can never
/// lower the score.
pub fn derive_confidence(note: Option<&RawNote>) -> f64 {
    let Some(note) = note else {
        return 0.3;
    };

    let mut confidence: f64 = 0.4;

    let selection_len = selection_chars(note);
    if selection_len > 0 {
        confidence += 0.2;
    }
    if selection_len > LONG_SELECTION_CHARS {
        confidence += 0.1;
    }
    if has_atomic_thought(note) {
        confidence += 0.15;
    }
    if has_confirmed_tags(note) {
        confidence += 0.1;
    }
    if has_ai_annotation(note) {
        confidence += 0.05;
    }

    confidence.min(1.0)
}

fn selection_chars(note: &RawNote) -> usize {
    note.selected_text
        .as_deref()
        .map(|text| text.trim().chars().count())
        .unwrap_or(0)
}

fn has_atomic_thought(note: &RawNote) -> bool {
    note.atomic_thought
        .as_deref()
        .map(|t| !t.trim().is_empty())
        .unwrap_or(false)
}

fn has_confirmed_tags(note: &RawNote) -> bool {
    note.tags_confirmed && !note.tags.is_empty()
}

fn has_ai_annotation(note: &RawNote) -> bool {
    let present = |field: &Option<String>| {
        field.as_deref().map(|t| !t.trim().is_empty()).unwrap_or(false)
    };
    present(&note.ai_summary) || present(&note.ai_critique)
}
