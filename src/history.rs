use chrono::{DateTime, Local};
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{SelectorItem, write_json};
use crate::diff::ElementSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Add,
    Update,
    Delete,
    BatchUpdate,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HistoryAction::Add => "add",
            HistoryAction::Update => "update",
            HistoryAction::Delete => "delete",
            HistoryAction::BatchUpdate => "batch_update",
        };
        f.write_str(label)
    }
}

/// Item collection as it was before one mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryState {
    /// Items without alternatives, snapshots or screenshots
    pub items: Vec<SelectorItem>,
    pub action: HistoryAction,
    pub item_name: String,
    pub description: String,
    pub timestamp: DateTime<Local>,
}

/// Listing entry for a history view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Local>,
    pub action: HistoryAction,
    pub item_name: String,
    pub description: String,
}

/// Copy of `items` without the large fields
pub fn reduce_items(items: &[SelectorItem]) -> Vec<SelectorItem> {
    items
        .iter()
        .map(|item| SelectorItem {
            alternatives: Vec::new(),
            element_attributes: ElementSnapshot::default(),
            screenshot_path: String::new(),
            ..item.clone()
        })
        .collect()
}

/// Re-attach large fields from the live collection, matching by name
pub fn restore_items(restored: Vec<SelectorItem>, live: &[SelectorItem]) -> Vec<SelectorItem> {
    let by_name: HashMap<&str, &SelectorItem> =
        live.iter().map(|item| (item.name.as_str(), item)).collect();

    restored
        .into_iter()
        .map(|mut item| {
            if let Some(current) = by_name.get(item.name.as_str()) {
                item.alternatives = current.alternatives.clone();
                item.element_attributes = current.element_attributes.clone();
                item.screenshot_path = current.screenshot_path.clone();
            }
            item
        })
        .collect()
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Stacks {
    undo: VecDeque<HistoryState>,
    redo: Vec<HistoryState>,
    baseline: Option<Vec<SelectorItem>>,
}

/// History file kept beside a configuration: `site.json` -> `site.history.json`
pub fn history_path(config_path: &Path) -> PathBuf {
    config_path.with_extension("history.json")
}

/// Bounded linear undo/redo over the item collection
///
/// Every public call takes the lock exactly once, so a caller that already
/// holds it on the same thread can call back in without deadlocking.
pub struct HistoryManager {
    inner: ReentrantMutex<RefCell<Stacks>>,
    max_size: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Stacks::default())),
            max_size: max_size.max(1),
        }
    }

    /// History saved at `path`, or a fresh one based on `items` when there is
    /// none or it cannot be read
    pub fn open(path: &Path, items: &[SelectorItem], max_size: usize) -> Self {
        let history = Self::new(max_size);
        let stored = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Stacks>(&content) {
                Ok(stacks) => Some(stacks),
                Err(e) => {
                    warn!("History file {} is corrupted, starting over: {}", path.display(), e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Could not read history {}: {}", path.display(), e);
                None
            }
        };

        match stored {
            Some(mut stacks) => {
                while stacks.undo.len() > history.max_size {
                    stacks.undo.pop_front();
                }
                debug!(
                    "Loaded history with {} undo and {} redo step(s)",
                    stacks.undo.len(),
                    stacks.redo.len()
                );
                history.with(|current| *current = stacks);
            }
            None => history.reset_baseline(items),
        }
        history
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let guard = self.inner.lock();
        let stacks = guard.borrow();
        write_json(path, &*stacks)
    }

    fn with<R>(&self, f: impl FnOnce(&mut Stacks) -> R) -> R {
        let guard = self.inner.lock();
        let mut stacks = guard.borrow_mut();
        f(&mut stacks)
    }

    /// Record `items` as they are before a mutation; call before mutating
    pub fn push_state(
        &self,
        items: &[SelectorItem],
        action: HistoryAction,
        item_name: &str,
        description: &str,
    ) {
        let state = HistoryState {
            items: reduce_items(items),
            action,
            item_name: item_name.to_string(),
            description: description.to_string(),
            timestamp: Local::now(),
        };
        let max_size = self.max_size;

        self.with(|stacks| {
            stacks.undo.push_back(state);
            while stacks.undo.len() > max_size {
                stacks.undo.pop_front();
            }
            stacks.redo.clear();
        });
        debug!("History push: {} {}", action, item_name);
    }

    /// Step back; `current` is the collection being replaced
    pub fn undo(&self, current: &[SelectorItem]) -> Option<Vec<SelectorItem>> {
        let current = reduce_items(current);
        self.with(|stacks| {
            let previous = stacks.undo.pop_back()?;
            stacks.redo.push(HistoryState {
                items: current,
                action: previous.action,
                item_name: previous.item_name.clone(),
                description: previous.description.clone(),
                timestamp: Local::now(),
            });
            Some(previous.items)
        })
    }

    /// Step forward again after an undo
    pub fn redo(&self, current: &[SelectorItem]) -> Option<Vec<SelectorItem>> {
        let current = reduce_items(current);
        let max_size = self.max_size;
        self.with(|stacks| {
            let next = stacks.redo.pop()?;
            stacks.undo.push_back(HistoryState {
                items: current,
                action: next.action,
                item_name: next.item_name.clone(),
                description: next.description.clone(),
                timestamp: Local::now(),
            });
            while stacks.undo.len() > max_size {
                stacks.undo.pop_front();
            }
            Some(next.items)
        })
    }

    /// Start over from a freshly loaded configuration
    pub fn reset_baseline(&self, items: &[SelectorItem]) {
        let baseline = reduce_items(items);
        self.with(|stacks| {
            stacks.undo.clear();
            stacks.redo.clear();
            stacks.baseline = Some(baseline);
        });
    }

    /// Collection the history was last reset to
    pub fn baseline(&self) -> Option<Vec<SelectorItem>> {
        self.with(|stacks| stacks.baseline.clone())
    }

    pub fn clear(&self) {
        self.with(|stacks| {
            stacks.undo.clear();
            stacks.redo.clear();
        });
    }

    pub fn can_undo(&self) -> bool {
        self.with(|stacks| !stacks.undo.is_empty())
    }

    pub fn can_redo(&self) -> bool {
        self.with(|stacks| !stacks.redo.is_empty())
    }

    pub fn undo_count(&self) -> usize {
        self.with(|stacks| stacks.undo.len())
    }

    pub fn redo_count(&self) -> usize {
        self.with(|stacks| stacks.redo.len())
    }

    pub fn undo_description(&self) -> Option<String> {
        self.with(|stacks| {
            stacks
                .undo
                .back()
                .map(|state| format!("{}: {}", state.action, state.item_name))
        })
    }

    pub fn redo_description(&self) -> Option<String> {
        self.with(|stacks| {
            stacks
                .redo
                .last()
                .map(|state| format!("Redo: {}", state.item_name))
        })
    }

    /// Most recent undo entries first
    pub fn history_list(&self, limit: usize) -> Vec<HistoryEntry> {
        self.with(|stacks| {
            stacks
                .undo
                .iter()
                .rev()
                .take(limit)
                .map(|state| HistoryEntry {
                    timestamp: state.timestamp,
                    action: state.action,
                    item_name: state.item_name.clone(),
                    description: state.description.clone(),
                })
                .collect()
        })
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;
