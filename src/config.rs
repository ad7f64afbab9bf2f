//! TOML configuration.
//!
//! See `config/sdx.example.toml` for every key. [`load_config`] parses and
//! validates; everything downstream can assume a valid [`Config`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use shadowdex_core::access::CapabilityPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub adapters: BTreeMap<String, AdapterConfig>,
}

/// Index database: engine, shadow catalog and sync state.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// The system-of-record. Only read.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_commit_every")]
    pub commit_every: usize,
    /// Soft-disabled doctypes.
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            commit_every: default_commit_every(),
            disabled: Vec::new(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

fn default_commit_every() -> usize {
    100
}
fn default_lock_timeout() -> i64 {
    6 * 3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_hits")]
    pub max_hits: usize,
    #[serde(default)]
    pub full_scan: bool,
    #[serde(default = "default_page_window")]
    pub page_window: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_hits: default_max_hits(),
            full_scan: false,
            page_window: default_page_window(),
        }
    }
}

fn default_page_size() -> usize {
    10
}
fn default_max_hits() -> usize {
    1000
}
fn default_page_window() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccessConfig {
    /// `allow` or `deny` when no capability predicate decides.
    #[serde(default = "default_capability")]
    pub capability_default: String,
    #[serde(default)]
    pub courses_table: Option<String>,
    #[serde(default)]
    pub enrolments_table: Option<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            capability_default: default_capability(),
            courses_table: None,
            enrolments_table: None,
        }
    }
}

fn default_capability() -> String {
    "allow".to_string()
}

impl AccessConfig {
    pub fn policy(&self) -> CapabilityPolicy {
        match self.capability_default.as_str() {
            "deny" => CapabilityPolicy::FailClosed,
            _ => CapabilityPolicy::FailOpen,
        }
    }
}

/// One table-backed doctype.
#[derive(Debug, Deserialize, Clone)]
pub struct AdapterConfig {
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub title_column: String,
    pub content_column: String,
    #[serde(default)]
    pub author_column: Option<String>,
    #[serde(default = "default_created_column")]
    pub created_column: String,
    #[serde(default = "default_modified_column")]
    pub modified_column: String,
    #[serde(default)]
    pub course_column: Option<String>,
    #[serde(default)]
    pub group_column: Option<String>,
    #[serde(default)]
    pub user_column: Option<String>,
    #[serde(default)]
    pub context_column: Option<String>,
    /// Non-zero means visible to everyone who can see the course.
    #[serde(default)]
    pub visible_column: Option<String>,
    /// `{id}` is replaced with the doc id.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub join: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

fn default_id_column() -> String {
    "id".to_string()
}
fn default_created_column() -> String {
    "created".to_string()
}
fn default_modified_column() -> String {
    "modified".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ItemConfig {
    pub item_type: String,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
}

impl AdapterConfig {
    /// Configured item types, or one named after the adapter.
    pub fn item_types(&self, name: &str) -> Vec<ItemConfig> {
        if self.items.is_empty() {
            vec![ItemConfig {
                item_type: name.to_string(),
                where_clause: None,
            }]
        } else {
            self.items.clone()
        }
    }

    fn columns(&self) -> Vec<(&'static str, &str)> {
        let mut cols = vec![
            ("table", self.table.as_str()),
            ("id_column", self.id_column.as_str()),
            ("title_column", self.title_column.as_str()),
            ("content_column", self.content_column.as_str()),
            ("created_column", self.created_column.as_str()),
            ("modified_column", self.modified_column.as_str()),
        ];
        for (name, col) in [
            ("author_column", &self.author_column),
            ("course_column", &self.course_column),
            ("group_column", &self.group_column),
            ("user_column", &self.user_column),
            ("context_column", &self.context_column),
            ("visible_column", &self.visible_column),
        ] {
            if let Some(c) = col {
                cols.push((name, c.as_str()));
            }
        }
        cols
    }
}

/// Table and column names are spliced into SQL; keep them to
/// `[A-Za-z0-9_.]`.
pub fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate sync
    if config.sync.commit_every == 0 {
        bail!("sync.commit_every must be > 0");
    }
    if config.sync.lock_timeout_secs <= 0 {
        bail!("sync.lock_timeout_secs must be > 0");
    }
    for dt in &config.sync.disabled {
        if !config.adapters.contains_key(dt) {
            bail!("sync.disabled names unknown adapter '{}'", dt);
        }
    }

    // Validate search
    if config.search.page_size == 0 {
        bail!("search.page_size must be > 0");
    }
    if config.search.max_hits == 0 {
        bail!("search.max_hits must be > 0");
    }

    // Validate access
    match config.access.capability_default.as_str() {
        "allow" | "deny" => {}
        other => bail!(
            "Unknown access.capability_default: '{}'. Must be allow or deny.",
            other
        ),
    }
    for (key, table) in [
        ("access.courses_table", &config.access.courses_table),
        ("access.enrolments_table", &config.access.enrolments_table),
    ] {
        if let Some(t) = table {
            if !is_identifier(t) {
                bail!("{} is not a valid table name: '{}'", key, t);
            }
        }
    }

    // Validate adapters
    for (name, adapter) in &config.adapters {
        if !is_identifier(name) {
            bail!("adapter name '{}' must match [A-Za-z0-9_.]", name);
        }
        for (key, value) in adapter.columns() {
            if !is_identifier(value) {
                bail!("adapters.{}.{} is not a valid identifier: '{}'", name, key, value);
            }
        }
        let mut seen = BTreeSet::new();
        for item in &adapter.items {
            if item.item_type.trim().is_empty() {
                bail!("adapters.{}.items: item_type must not be empty", name);
            }
            if !seen.insert(item.item_type.as_str()) {
                bail!(
                    "adapters.{}.items: duplicate item_type '{}'",
                    name,
                    item.item_type
                );
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(toml: &str) -> Result<Config> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml.as_bytes()).unwrap();
        load_config(file.path())
    }

    const MINIMAL: &str = r#"
[db]
path = "index.sqlite"

[source]
path = "content.sqlite"
"#;

    #[test]
    fn defaults_apply() {
        let cfg = load(MINIMAL).unwrap();
        assert_eq!(cfg.sync.commit_every, 100);
        assert_eq!(cfg.search.page_size, 10);
        assert_eq!(cfg.access.policy(), CapabilityPolicy::FailOpen);
        assert!(cfg.adapters.is_empty());
    }

    #[test]
    fn adapter_without_items_gets_one_item_type() {
        let cfg = load(&format!(
            "{}\n[adapters.wiki]\ntable = \"wiki_pages\"\ntitle_column = \"title\"\ncontent_column = \"body\"\n",
            MINIMAL
        ))
        .unwrap();
        let wiki = &cfg.adapters["wiki"];
        let items = wiki.item_types("wiki");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_type, "wiki");
        assert_eq!(wiki.id_column, "id");
    }

    #[test]
    fn rejects_bad_identifiers_and_values() {
        let bad_table = format!(
            "{}\n[adapters.wiki]\ntable = \"wiki; DROP TABLE x\"\ntitle_column = \"t\"\ncontent_column = \"c\"\n",
            MINIMAL
        );
        assert!(load(&bad_table).is_err());

        let bad_policy = format!("{}\n[access]\ncapability_default = \"maybe\"\n", MINIMAL);
        assert!(load(&bad_policy).is_err());

        let zero_batch = format!("{}\n[sync]\ncommit_every = 0\n", MINIMAL);
        assert!(load(&zero_batch).is_err());

        let unknown_disabled = format!("{}\n[sync]\ndisabled = [\"glossary\"]\n", MINIMAL);
        assert!(load(&unknown_disabled).is_err());
    }

    #[test]
    fn duplicate_item_types_are_rejected() {
        let toml = format!(
            r#"{}
[adapters.forum]
table = "posts"
title_column = "subject"
content_column = "message"

[[adapters.forum.items]]
item_type = "post"

[[adapters.forum.items]]
item_type = "post"
"#,
            MINIMAL
        );
        assert!(load(&toml).is_err());
    }
}
