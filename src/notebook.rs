//! Destination routing: maps a bundle to a notebook reference, and builds
//! the deep link the UI opens in the external notebook app.

use crate::bundle::ReadingBundle;
use crate::settings::NotebookRules;

/// Where clips land when no rule and no configured default applies.
pub const FALLBACK_NOTEBOOK: &str = "Inbox";

/// Resolve the destination notebook for a bundle.
///
/// Strict tier order, first matching tier wins and lower tiers are never
/// consulted: tag > intent > domain > configured default > [`FALLBACK_NOTEBOOK`].
/// Tags are the most explicit routing signal the user gives us; the domain
/// is the weakest, since one page serves many thinking contexts.
pub fn resolve_notebook_ref(
    bundle: &ReadingBundle,
    rules: &NotebookRules,
    default_ref: Option<&str>,
) -> String {
    for rule in &rules.by_tag {
        if let Some(tag) = rule.tag.as_deref() {
            if bundle.tags.contains(tag) {
                return rule.notebook_ref.clone();
            }
        }
    }

    if let Some(intent) = bundle.user_intent_label.as_deref() {
        for rule in &rules.by_intent {
            if let Some(rule_intent) = rule.intent.as_deref() {
                if rule_intent.eq_ignore_ascii_case(intent) {
                    return rule.notebook_ref.clone();
                }
            }
        }
    }

    for rule in &rules.by_domain {
        if let Some(rule_domain) = rule.domain.as_deref() {
            if domain_rule_matches(&bundle.domain, rule_domain) {
                return rule.notebook_ref.clone();
            }
        }
    }

    match default_ref {
        Some(default) if !default.trim().is_empty() => default.to_string(),
        _ => FALLBACK_NOTEBOOK.to_string(),
    }
}

/// Exact match, or the bundle domain is a subdomain of the rule domain.
fn domain_rule_matches(domain: &str, rule_domain: &str) -> bool {
    let rule_domain = crate::privacy::normalize_domain(rule_domain);
    if rule_domain.is_empty() {
        return false;
    }
    domain == rule_domain || domain.ends_with(&format!(".{rule_domain}"))
}

/// Deep link into the external notebook app for a resolved reference.
/// Pure; never touches the network.
pub fn notebook_url(notebook_ref: &str, base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{base}/n/{}", urlencoding::encode(notebook_ref))
}
