use chrono::Local;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::diff::ElementSnapshot;
use crate::errors::LocprobeError;
use crate::optimizer::{Alternative, StrategyWeights};

/// Engine tuning, loaded from `~/.locprobe/settings.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_frame_depth: usize,
    pub frame_cache_ttl_ms: u64,
    pub history_max_size: usize,
    pub max_snapshots: usize,
    pub statistics_save_interval_ms: u64,
    pub lookup_timeout_ms: u64,
    pub session_end_timeout_ms: u64,
    pub writer_shutdown_timeout_ms: u64,
    pub perf_slow_ms: u64,
    pub max_test_records: usize,
    pub strategy_weights: StrategyWeights,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_frame_depth: 5,
            frame_cache_ttl_ms: 2000,
            history_max_size: 50,
            max_snapshots: 100,
            statistics_save_interval_ms: 5000,
            lookup_timeout_ms: 3000,
            session_end_timeout_ms: 2000,
            writer_shutdown_timeout_ms: 5000,
            perf_slow_ms: 50,
            max_test_records: 500,
            strategy_weights: StrategyWeights::default(),
        }
    }
}

impl Settings {
    /// Directory holding settings and statistics
    pub fn data_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".locprobe"))
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from `path` (or the default location); a missing file yields defaults
    pub fn load(path: Option<&Path>) -> Result<Self, LocprobeError> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            LocprobeError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            LocprobeError::Config(format!("invalid settings in {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        write_json(path, self)
    }

    pub fn frame_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.frame_cache_ttl_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn session_end_timeout(&self) -> Duration {
        Duration::from_millis(self.session_end_timeout_ms)
    }

    pub fn statistics_save_interval(&self) -> Duration {
        Duration::from_millis(self.statistics_save_interval_ms)
    }

    pub fn writer_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.writer_shutdown_timeout_ms)
    }

    pub fn perf_slow(&self) -> Duration {
        Duration::from_millis(self.perf_slow_ms)
    }
}

/// Write `value` as pretty JSON, replacing `path` atomically
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    use anyhow::Context;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn now_timestamp() -> String {
    Local::now().to_rfc3339()
}

fn default_category() -> String {
    "common".to_string()
}

fn score_from_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().clamp(0.0, 100.0) as u32)
}

/// Stored alternative; older files carry `xpath`/`robustness_score` keys and float scores
#[derive(Deserialize)]
struct StoredAlternative {
    #[serde(alias = "xpath")]
    selector: String,
    strategy: crate::optimizer::Strategy,
    #[serde(alias = "robustness_score", deserialize_with = "score_from_number")]
    score: u32,
    #[serde(default)]
    description: String,
}

fn alternatives_compat<'de, D>(deserializer: D) -> Result<Vec<Alternative>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = Vec::<StoredAlternative>::deserialize(deserializer)?;
    Ok(stored
        .into_iter()
        .map(|alt| Alternative {
            selector: alt.selector,
            strategy: alt.strategy,
            score: alt.score,
            description: alt.description,
        })
        .collect())
}

/// A tracked selector and what has been learned about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorItem {
    pub name: String,
    pub xpath: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub description: String,
    pub css_selector: String,
    pub tags: BTreeSet<String>,
    #[serde(deserialize_with = "alternatives_compat")]
    pub alternatives: Vec<Alternative>,
    pub found_window: String,
    /// Frame path of the last successful lookup
    #[serde(rename = "found_frame", alias = "found_frame_path")]
    pub found_frame_path: String,
    pub ai_generated: bool,
    pub is_verified: bool,
    pub element_tag: String,
    pub element_text: String,
    pub test_count: u32,
    pub success_count: u32,
    #[serde(rename = "last_tested", alias = "last_tested_at")]
    pub last_tested_at: String,
    #[serde(skip_serializing_if = "ElementSnapshot::is_empty")]
    pub element_attributes: ElementSnapshot,
    pub is_favorite: bool,
    pub sort_order: i64,
    pub screenshot_path: String,
    /// Fields written by newer versions, kept for round-trips
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for SelectorItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            xpath: String::new(),
            category: default_category(),
            description: String::new(),
            css_selector: String::new(),
            tags: BTreeSet::new(),
            alternatives: Vec::new(),
            found_window: String::new(),
            found_frame_path: String::new(),
            ai_generated: false,
            is_verified: false,
            element_tag: String::new(),
            element_text: String::new(),
            test_count: 0,
            success_count: 0,
            last_tested_at: String::new(),
            element_attributes: ElementSnapshot::default(),
            is_favorite: false,
            sort_order: 0,
            screenshot_path: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl SelectorItem {
    pub fn new(name: &str, xpath: &str) -> Self {
        Self {
            name: name.to_string(),
            xpath: xpath.to_string(),
            ..Default::default()
        }
    }

    /// Selector used for lookups: XPath when present, else CSS
    pub fn selector(&self) -> &str {
        if self.xpath.trim().is_empty() {
            self.css_selector.trim()
        } else {
            self.xpath.trim()
        }
    }

    /// Count one test outcome
    pub fn record_test(&mut self, success: bool) {
        self.test_count = self.test_count.saturating_add(1);
        if success {
            self.success_count = (self.success_count + 1).min(self.test_count);
        }
        self.last_tested_at = now_timestamp();
    }

    /// Success percentage, 0 when never tested
    pub fn success_rate(&self) -> f64 {
        if self.test_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.test_count as f64 * 100.0
        }
    }

    pub fn has_snapshot(&self) -> bool {
        !self.element_attributes.is_empty()
    }
}

/// A named collection of selector items for one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
    pub login_url: String,
    pub description: String,
    pub items: Vec<SelectorItem>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let now = now_timestamp();
        Self {
            name: String::new(),
            url: String::new(),
            login_url: String::new(),
            description: String::new(),
            items: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
            extra: BTreeMap::new(),
        }
    }
}

impl SiteConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, LocprobeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LocprobeError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: SiteConfig = serde_json::from_str(&content).map_err(|e| {
            LocprobeError::Config(format!("invalid configuration {}: {}", path.display(), e))
        })?;

        let mut names = BTreeSet::new();
        if let Some(duplicate) = config.items.iter().find(|item| !names.insert(item.name.as_str())) {
            return Err(LocprobeError::Config(format!(
                "duplicate item name '{}' in {}",
                duplicate.name,
                path.display()
            )));
        }

        info!(
            "Loaded configuration '{}' with {} item(s)",
            config.name,
            config.items.len()
        );
        Ok(config)
    }

    pub fn save(&mut self, path: &Path) -> anyhow::Result<()> {
        self.touch();
        write_json(path, self)
    }

    pub fn touch(&mut self) {
        self.updated_at = now_timestamp();
    }

    pub fn get_item(&self, name: &str) -> Option<&SelectorItem> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn get_item_mut(&mut self, name: &str) -> Option<&mut SelectorItem> {
        self.items.iter_mut().find(|item| item.name == name)
    }

    /// Insert `item`, or replace the item of the same name keeping its verification history
    pub fn add_or_update(&mut self, mut item: SelectorItem) {
        match self.items.iter().position(|existing| existing.name == item.name) {
            Some(idx) => {
                let existing = &self.items[idx];
                item.is_favorite = existing.is_favorite;
                item.test_count = existing.test_count;
                item.success_count = existing.success_count;
                item.last_tested_at = existing.last_tested_at.clone();
                item.sort_order = existing.sort_order;
                item.is_verified = existing.is_verified;
                if item.element_tag.is_empty() {
                    item.element_tag = existing.element_tag.clone();
                }
                if item.alternatives.is_empty() {
                    item.alternatives = existing.alternatives.clone();
                }
                if item.element_attributes.is_empty() {
                    item.element_attributes = existing.element_attributes.clone();
                }
                self.items[idx] = item;
            }
            None => {
                if item.sort_order == 0 {
                    item.sort_order = self.items.iter().map(|i| i.sort_order).max().unwrap_or(0) + 1;
                }
                self.items.push(item);
            }
        }
        self.touch();
    }

    pub fn remove_item(&mut self, name: &str) -> Option<SelectorItem> {
        let idx = self.items.iter().position(|item| item.name == name)?;
        self.touch();
        Some(self.items.remove(idx))
    }

    /// Swap in a whole item collection, e.g. after undo
    pub fn replace_items(&mut self, items: Vec<SelectorItem>) {
        self.items = items;
        self.touch();
    }

    /// Distinct categories, sorted
    pub fn categories(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.items.iter().map(|i| i.category.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub fn all_tags(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .flat_map(|item| item.tags.iter().cloned())
            .collect()
    }

    /// Items ordered by `sort_order`, then name
    pub fn sorted_items(&self) -> Vec<&SelectorItem> {
        let mut items: Vec<&SelectorItem> = self.items.iter().collect();
        items.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        items
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
