use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use tracing::{debug, warn};

use crate::config::SelectorItem;
use crate::session::{BrowserSession, ValidationSession};
use crate::topology::is_main;
use crate::types::ElementInfo;

/// Characters of element text kept in a snapshot
const SNAPSHOT_TEXT_LIMIT: usize = 100;

/// Structural record of an element at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredSnapshot")]
pub struct ElementSnapshot {
    pub xpath: String,
    pub tag: String,
    pub id: String,
    pub name: String,
    pub class: String,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    pub parent_tag: String,
    pub parent_id: String,
    pub parent_class: String,
    pub sibling_index: usize,
    pub match_count: usize,
    pub captured_at: Option<DateTime<Utc>>,
}

/// On-disk snapshot: structured, or the flat attribute map older files hold
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSnapshot {
    Flat(BTreeMap<String, String>),
    Structured(Box<SnapshotFields>),
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct SnapshotFields {
    xpath: String,
    tag: String,
    id: String,
    name: String,
    class: String,
    text: String,
    attributes: BTreeMap<String, String>,
    parent_tag: String,
    parent_id: String,
    parent_class: String,
    sibling_index: usize,
    match_count: usize,
    captured_at: Option<DateTime<Utc>>,
}

impl From<StoredSnapshot> for ElementSnapshot {
    fn from(stored: StoredSnapshot) -> Self {
        match stored {
            StoredSnapshot::Flat(attributes) => {
                let field = |key: &str| attributes.get(key).cloned().unwrap_or_default();
                Self {
                    tag: field("tag"),
                    id: field("id"),
                    name: field("name"),
                    class: field("class"),
                    attributes: attributes
                        .iter()
                        .filter(|(k, _)| k.as_str() != "tag")
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                    ..Default::default()
                }
            }
            StoredSnapshot::Structured(fields) => {
                let f = *fields;
                Self {
                    xpath: f.xpath,
                    tag: f.tag,
                    id: f.id,
                    name: f.name,
                    class: f.class,
                    text: f.text,
                    attributes: f.attributes,
                    parent_tag: f.parent_tag,
                    parent_id: f.parent_id,
                    parent_class: f.parent_class,
                    sibling_index: f.sibling_index,
                    match_count: f.match_count,
                    captured_at: f.captured_at,
                }
            }
        }
    }
}

impl ElementSnapshot {
    pub fn capture(selector: &str, info: &ElementInfo) -> Self {
        Self {
            xpath: selector.to_string(),
            tag: info.tag.clone(),
            id: info.id.clone(),
            name: info.name.clone(),
            class: info.class.clone(),
            text: info.text.chars().take(SNAPSHOT_TEXT_LIMIT).collect(),
            attributes: info.attributes.clone(),
            parent_tag: info.parent_tag.clone(),
            parent_id: info.parent_id.clone(),
            parent_class: info.parent_class.clone(),
            sibling_index: info.sibling_index,
            match_count: info.match_count,
            captured_at: Some(Utc::now()),
        }
    }

    /// Nothing has ever been captured
    pub fn is_empty(&self) -> bool {
        self.tag.is_empty()
            && self.id.is_empty()
            && self.class.is_empty()
            && self.attributes.is_empty()
    }

    /// Recorded by an older tool without a capture time; such records never
    /// carried text or parent identity
    pub fn is_legacy(&self) -> bool {
        self.captured_at.is_none()
    }

    /// Rebuild the element record an optimizer can work from
    pub fn to_element_info(&self) -> ElementInfo {
        ElementInfo {
            tag: self.tag.clone(),
            id: self.id.clone(),
            name: self.name.clone(),
            class: self.class.clone(),
            text: self.text.clone(),
            attributes: self.attributes.clone(),
            match_count: self.match_count,
            parent_tag: self.parent_tag.clone(),
            parent_id: self.parent_id.clone(),
            parent_class: self.parent_class.clone(),
            sibling_index: self.sibling_index,
            frame_path: String::new(),
            original_xpath: self.xpath.clone(),
        }
    }
}

/// Bounded keyed snapshot store, evicting the oldest insert first
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    snapshots: HashMap<String, ElementSnapshot>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SnapshotStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            snapshots: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Store or overwrite; an overwrite keeps the original insertion position
    pub fn save(&mut self, name: &str, snapshot: ElementSnapshot) {
        if !self.snapshots.contains_key(name) {
            self.order.push_back(name.to_string());
        }
        self.snapshots.insert(name.to_string(), snapshot);
        self.trim_to(self.capacity);
    }

    pub fn save_info(&mut self, name: &str, selector: &str, info: &ElementInfo) {
        self.save(name, ElementSnapshot::capture(selector, info));
    }

    pub fn get(&self, name: &str) -> Option<&ElementSnapshot> {
        self.snapshots.get(name)
    }

    pub fn has_snapshot(&self, name: &str) -> bool {
        self.snapshots.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ElementSnapshot> {
        self.order.retain(|n| n != name);
        self.snapshots.remove(name)
    }

    /// Drop the oldest snapshots until at most `keep` remain
    pub fn clear_old_snapshots(&mut self, keep: usize) {
        self.trim_to(keep);
    }

    fn trim_to(&mut self, limit: usize) {
        while self.snapshots.len() > limit {
            match self.order.pop_front() {
                Some(oldest) => {
                    debug!("Evicting snapshot {}", oldest);
                    self.snapshots.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Names from oldest to newest
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Unchanged,
    Modified,
    Missing,
    Found,
}

impl DiffStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            DiffStatus::Unchanged => "✅",
            DiffStatus::Modified => "⚠️",
            DiffStatus::Missing => "❌",
            DiffStatus::Found => "🔍",
        }
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiffStatus::Unchanged => "unchanged",
            DiffStatus::Modified => "modified",
            DiffStatus::Missing => "missing",
            DiffStatus::Found => "found",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub item_name: String,
    pub selector: String,
    pub status: DiffStatus,
    pub changes: Vec<String>,
    pub match_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        self.status != DiffStatus::Unchanged
    }
}

/// Results of comparing a whole collection, with per-status counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    pub results: Vec<DiffResult>,
    pub unchanged: usize,
    pub modified: usize,
    pub missing: usize,
    pub found: usize,
}

impl DiffReport {
    pub fn from_results(results: Vec<DiffResult>) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        Self {
            unchanged: count(DiffStatus::Unchanged),
            modified: count(DiffStatus::Modified),
            missing: count(DiffStatus::Missing),
            found: count(DiffStatus::Found),
            results,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }
}

/// Baseline for `item`: the stored snapshot, else the one persisted on the item
fn baseline<'a>(item: &'a SelectorItem, store: &'a SnapshotStore) -> Option<&'a ElementSnapshot> {
    store
        .get(&item.name)
        .or(Some(&item.element_attributes))
        .filter(|snapshot| !snapshot.is_empty())
}

fn value_change(field: &str, old: &str, new: &str, changes: &mut Vec<String>) {
    if old == new {
        return;
    }
    if new.is_empty() {
        changes.push(format!("{} removed: {}", field, old));
    } else if old.is_empty() {
        changes.push(format!("{} added: {}", field, new));
    } else {
        changes.push(format!("{} changed: {} -> {}", field, old, new));
    }
}

/// Field-by-field differences between a snapshot and the live element
///
/// Order: tag, id, class, text, parent tag, parent id, parent class, then
/// every other attribute by name.
fn changes_between(old: &ElementSnapshot, current: &ElementInfo) -> Vec<String> {
    let mut changes = Vec::new();

    if !old.tag.is_empty()
        && !current.tag.is_empty()
        && !old.tag.eq_ignore_ascii_case(&current.tag)
    {
        changes.push(format!("tag changed: {} -> {}", old.tag, current.tag));
    }

    value_change("id", &old.id, &current.id, &mut changes);

    if old.class != current.class {
        let before: BTreeSet<&str> = old.class.split_whitespace().collect();
        let after: BTreeSet<&str> = current.class.split_whitespace().collect();
        let added: Vec<&str> = after.difference(&before).copied().collect();
        let removed: Vec<&str> = before.difference(&after).copied().collect();
        if !added.is_empty() {
            changes.push(format!("class added: {}", added.join(", ")));
        }
        if !removed.is_empty() {
            changes.push(format!("class removed: {}", removed.join(", ")));
        }
    }

    let current_text: String = current.text.chars().take(SNAPSHOT_TEXT_LIMIT).collect();
    let text_recorded = !(old.is_legacy() && old.text.is_empty());
    if text_recorded && old.text != current_text {
        changes.push(format!("text changed: {:?} -> {:?}", old.text, current_text));
    }

    // snapshots without parent identity predate parent tracking
    if !old.parent_tag.is_empty() {
        value_change("parent tag", &old.parent_tag, &current.parent_tag, &mut changes);
        value_change("parent id", &old.parent_id, &current.parent_id, &mut changes);
        value_change(
            "parent class",
            &old.parent_class,
            &current.parent_class,
            &mut changes,
        );
    }

    let keys: BTreeSet<&String> = old
        .attributes
        .keys()
        .chain(current.attributes.keys())
        .collect();
    for key in keys {
        if key == "id" || key == "class" {
            continue;
        }
        let old_value = old.attributes.get(key).map(String::as_str).unwrap_or("");
        let new_value = current.attributes.get(key).map(String::as_str).unwrap_or("");
        if old_value == new_value {
            continue;
        }
        if new_value.is_empty() {
            changes.push(format!("attribute removed: {}", key));
        } else if old_value.is_empty() {
            let shown: String = new_value.chars().take(30).collect();
            changes.push(format!("attribute added: {}={}", key, shown));
        } else {
            changes.push(format!("attribute changed: {}", key));
        }
    }

    changes
}

/// Compare `item` against what the page shows now
///
/// `current` is `None` when the element could not be resolved.
pub fn compare(
    item: &SelectorItem,
    store: &SnapshotStore,
    current: Option<&ElementInfo>,
) -> DiffResult {
    let mut result = DiffResult {
        item_name: item.name.clone(),
        selector: item.selector().to_string(),
        status: DiffStatus::Unchanged,
        changes: Vec::new(),
        match_count: 0,
        error: None,
    };

    let Some(current) = current else {
        result.status = DiffStatus::Missing;
        result.changes.push("element not found".to_string());
        return result;
    };
    result.match_count = current.match_count;

    match baseline(item, store) {
        None => {
            result.status = DiffStatus::Found;
            result.changes.push("new element record collected".to_string());
        }
        Some(old) if old.tag.is_empty() && !item.element_tag.is_empty() => {
            let old = ElementSnapshot {
                tag: item.element_tag.clone(),
                ..old.clone()
            };
            result.changes = changes_between(&old, current);
            if !result.changes.is_empty() {
                result.status = DiffStatus::Modified;
            }
        }
        Some(old) => {
            result.changes = changes_between(old, current);
            if !result.changes.is_empty() {
                result.status = DiffStatus::Modified;
            }
        }
    }

    result
}

/// Compare every item with a selector against the live page
///
/// A failure on one item is reported as `missing` for that item only.
pub async fn compare_all(
    items: &[SelectorItem],
    store: &SnapshotStore,
    browser: &BrowserSession,
    session: &mut ValidationSession,
) -> DiffReport {
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        let selector = item.selector();
        if selector.is_empty() {
            continue;
        }

        let frame_hint = Some(item.found_frame_path.as_str()).filter(|p| !is_main(p));
        let result = match browser
            .get_element_info(selector, frame_hint, true, Some(&mut *session))
            .await
        {
            Ok(current) => compare(item, store, current.as_ref()),
            Err(e) => {
                warn!("Comparison of {} failed: {}", item.name, e);
                let mut missing = compare(item, store, None);
                missing.error = Some(e.to_string());
                missing
            }
        };
        results.push(result);
    }

    DiffReport::from_results(results)
}

/// Plain-text report of a comparison run
pub fn render_report(report: &DiffReport) -> String {
    let rule = "=".repeat(50);
    let thin = "-".repeat(50);
    let mut lines = vec![
        rule.clone(),
        "Selector change report".to_string(),
        format!("Generated: {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
        rule,
        String::new(),
        format!("Summary: {} item(s)", report.total()),
        format!("   {} unchanged: {}", DiffStatus::Unchanged.icon(), report.unchanged),
        format!("   {} modified: {}", DiffStatus::Modified.icon(), report.modified),
        format!("   {} missing: {}", DiffStatus::Missing.icon(), report.missing),
        format!("   {} found: {}", DiffStatus::Found.icon(), report.found),
    ];

    if report.modified > 0 || report.missing > 0 {
        lines.push(String::new());
        lines.push(thin.clone());
        lines.push("Details".to_string());
        lines.push(thin);

        for result in report.results.iter().filter(|r| {
            matches!(r.status, DiffStatus::Modified | DiffStatus::Missing)
        }) {
            lines.push(String::new());
            lines.push(format!("{} {}", result.status.icon(), result.item_name));
            let shown: String = result.selector.chars().take(60).collect();
            lines.push(format!("   Selector: {}", shown));
            lines.push(format!("   Status: {}", result.status));
            if let Some(error) = &result.error {
                lines.push(format!("   Error: {}", error));
            }
            for change in &result.changes {
                lines.push(format!("   - {}", change));
            }
        }
    }

    lines.join("\n")
}

/// Similarity of two selectors in [0, 1]
pub fn selector_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    strsim::normalized_levenshtein(a, b)
}

#[cfg(test)]
#[path = "diff_test.rs"]
mod diff_test;
