//! Privacy screening for outgoing clips.
//!
//! Two independent checks: a PII sniff over the clip text and a
//! sensitive-domain match over the source URL. The PII patterns are
//! deliberately broad; the orchestrator treats a hit as a warning the user
//! can bypass, never as a hard block.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap()
});

// Phone-like: optional country code, then grouped digits with separators.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ .\-]?)?(?:\(\d{2,4}\)[ .\-]?)?\d{3,4}[ .\-]\d{3,4}(?:[ .\-]\d{2,4})?\b").unwrap()
});

// Credit-card-like grouped digits: 4-4-4-4.
static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}[ \-]\d{4}[ \-]\d{4}[ \-]\d{4}\b").unwrap()
});

// National-ID / generic long digit runs.
static DIGIT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{9,}\b").unwrap());

// Passport-like: one or two letters followed by a digit block.
static PASSPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z]{1,2}\d{6,9}\b").unwrap()
});

/// Heuristic PII detection over free text. Broad on purpose; precision
/// belongs in a dedicated classifier, not here.
pub fn contains_pii(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }

    EMAIL_RE.is_match(text)
        || PHONE_RE.is_match(text)
        || CARD_RE.is_match(text)
        || DIGIT_RUN_RE.is_match(text)
        || PASSPORT_RE.is_match(text)
}

/// True when the URL's host matches any configured sensitive-domain pattern.
/// Unparseable URLs match nothing.
pub fn is_sensitive_url(url: &str, patterns: &[String]) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };

    patterns
        .iter()
        .any(|pattern| domain_matches(&host, pattern))
}

/// Lower-cased host with any leading `www.` stripped, or `None` when the
/// input is not an absolute URL.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(normalize_domain)
}

/// Canonical domain form used everywhere domains are compared.
pub fn normalize_domain(host: &str) -> String {
    let host = host.trim().to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Matches a normalized host against one pattern. Three pattern shapes:
/// exact domains, `*.`-prefixed wildcards (which also match the bare
/// domain), and general globs translated to an anchored regex.
pub fn domain_matches(host: &str, pattern: &str) -> bool {
    let pattern = normalize_domain(pattern);
    if pattern.is_empty() {
        return false;
    }

    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host == suffix || host.ends_with(&format!(".{suffix}"));
    }

    if pattern.contains('*') || pattern.contains('?') {
        return match Regex::new(&glob_to_anchored_regex(&pattern)) {
            Ok(re) => re.is_match(host),
            Err(_) => false,
        };
    }

    host == pattern
}

fn glob_to_anchored_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() + 8);
    regex.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    regex
}
