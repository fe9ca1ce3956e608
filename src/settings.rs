use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Knobs for the export pipeline. Every field has a default so a partial or
/// missing settings file still yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub enabled: bool,
    pub allow_cloud_export: bool,
    pub pii_warning: bool,
    pub export_max_chars: usize,
    pub default_notebook_ref: Option<String>,
    pub base_url: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_cloud_export: true,
            pii_warning: true,
            export_max_chars: 2000,
            default_notebook_ref: None,
            base_url: "https://notebook.example.com".into(),
        }
    }
}

/// One routing rule. Which of `tag`/`intent`/`domain` is consulted depends
/// on the list the rule sits in; a rule without a `notebook_ref` is
/// unusable and dropped at load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotebookRule {
    pub tag: Option<String>,
    pub intent: Option<String>,
    pub domain: Option<String>,
    pub notebook_ref: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotebookRules {
    pub by_tag: Vec<NotebookRule>,
    pub by_intent: Vec<NotebookRule>,
    pub by_domain: Vec<NotebookRule>,
}

impl NotebookRules {
    /// Drops rules that cannot route anything. Keeps the relative order of
    /// the survivors, since rule priority is positional.
    fn sanitize(&mut self) {
        let discard = |rules: &mut Vec<NotebookRule>, list: &str| {
            let before = rules.len();
            rules.retain(|rule| !rule.notebook_ref.trim().is_empty());
            if rules.len() < before {
                warn!(
                    "discarded {} invalid {list} rule(s) missing a notebook_ref",
                    before - rules.len()
                );
            }
        };
        discard(&mut self.by_tag, "by_tag");
        discard(&mut self.by_intent, "by_intent");
        discard(&mut self.by_domain, "by_domain");
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    export: ExportSettings,
    rules: NotebookRules,
    sensitive_domains: Vec<String>,
}

/// JSON-file settings store. Reads land in memory behind an `RwLock`;
/// writes persist the whole document back to disk.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };
        data.rules.sanitize();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn export(&self) -> ExportSettings {
        self.data.read().unwrap().export.clone()
    }

    pub fn rules(&self) -> NotebookRules {
        self.data.read().unwrap().rules.clone()
    }

    pub fn sensitive_domains(&self) -> Vec<String> {
        self.data.read().unwrap().sensitive_domains.clone()
    }

    pub fn update_export(&self, settings: ExportSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.export = settings;
        self.persist(&guard)
    }

    pub fn update_rules(&self, mut rules: NotebookRules) -> Result<()> {
        rules.sanitize();
        let mut guard = self.data.write().unwrap();
        guard.rules = rules;
        self.persist(&guard)
    }

    pub fn update_sensitive_domains(&self, domains: Vec<String>) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.sensitive_domains = domains;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let mut data: UserSettings = serde_json::from_str(&contents)?;
        data.rules.sanitize();
        let mut guard = self.data.write().unwrap();
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let export = store.export();
        assert!(export.enabled);
        assert!(export.pii_warning);
        assert_eq!(export.export_max_chars, 2000);
        assert!(store.sensitive_domains().is_empty());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"export": {"enabled": false}}"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let export = store.export();
        assert!(!export.enabled);
        assert!(export.allow_cloud_export);
    }

    #[test]
    fn rules_without_a_notebook_ref_are_discarded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
                "rules": {
                    "by_tag": [
                        {"tag": "rust", "notebook_ref": "Programming"},
                        {"tag": "orphan"}
                    ]
                }
            }"#,
        )
        .unwrap();

        let store = SettingsStore::new(path).unwrap();
        let rules = store.rules();
        assert_eq!(rules.by_tag.len(), 1);
        assert_eq!(rules.by_tag[0].notebook_ref, "Programming");
    }

    #[test]
    fn update_export_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut export = store.export();
        export.enabled = false;
        store.update_export(export).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert!(!reopened.export().enabled);
    }
}
