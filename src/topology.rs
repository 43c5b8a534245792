use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::driver::{Driver, DriverFault, FrameDescriptor};

/// Path segment naming the top-level document
pub const MAIN_FRAME: &str = "main";

/// Whether `path` designates the top-level document
pub fn is_main(path: &str) -> bool {
    let trimmed = path.trim().trim_matches('/');
    trimmed.is_empty() || trimmed == MAIN_FRAME
}

/// Frame path segments, with a leading `main` dropped
pub fn segments(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path
        .trim()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if parts.first() == Some(&MAIN_FRAME) {
        parts.remove(0);
    }
    parts
}

/// Canonical form of a frame path: `main` or `a/b/c`
pub fn normalize_path(path: &str) -> String {
    let parts = segments(path);
    if parts.is_empty() {
        MAIN_FRAME.to_string()
    } else {
        parts.join("/")
    }
}

/// One frame found during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameNode {
    pub frame_path: String,
    pub window_handle: String,
    /// 1 for frames of the top-level document
    pub depth: usize,
    /// Frame element positions leading to this frame
    pub index_path: Vec<u16>,
    /// Seat-map popups get special treatment by callers
    pub is_seat_related: bool,
}

impl FrameNode {
    fn new(segments: &[String], index_path: Vec<u16>, window_handle: &str) -> Self {
        let frame_path = segments.join("/");
        Self {
            is_seat_related: frame_path.to_lowercase().contains("seat"),
            depth: segments.len(),
            frame_path,
            window_handle: window_handle.to_string(),
            index_path,
        }
    }
}

/// Cached frame topology of one window
#[derive(Debug, Clone)]
pub struct TopologyCache {
    entries: Vec<FrameNode>,
    window_handle: Option<String>,
    captured_at: Option<Instant>,
    ttl: Duration,
}

impl TopologyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Vec::new(),
            window_handle: None,
            captured_at: None,
            ttl,
        }
    }

    /// Fresh and captured from `window_handle`
    pub fn is_valid_for(&self, window_handle: &str) -> bool {
        self.is_valid() && self.window_handle.as_deref() == Some(window_handle)
    }

    pub fn is_valid(&self) -> bool {
        self.captured_at
            .is_some_and(|captured| captured.elapsed() <= self.ttl)
    }

    pub fn store(&mut self, window_handle: &str, entries: Vec<FrameNode>) {
        self.entries = entries;
        self.window_handle = Some(window_handle.to_string());
        self.captured_at = Some(Instant::now());
    }

    /// Drop the cached topology; the next lookup rediscovers
    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.window_handle = None;
        self.captured_at = None;
    }

    pub fn entries(&self) -> &[FrameNode] {
        &self.entries
    }
}

/// Outcome of a topology scan
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Frames ordered shallow to deep
    pub frames: Vec<FrameNode>,
    /// False when some frame could not be scanned
    pub complete: bool,
}

/// Path segment for each sibling frame; an identifier shared by two siblings
/// falls back to `index=N` for all of them so every frame stays addressable
pub fn sibling_segments(children: &[FrameDescriptor]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for child in children {
        *seen.entry(child.identifier()).or_default() += 1;
    }

    children
        .iter()
        .map(|child| {
            let identifier = child.identifier();
            if seen.get(&identifier).copied().unwrap_or_default() > 1 {
                format!("index={}", child.index)
            } else {
                identifier
            }
        })
        .collect()
}

pub(crate) async fn enter_index_path(driver: &dyn Driver, index_path: &[u16]) -> Result<(), DriverFault> {
    driver.switch_to_default().await?;
    for index in index_path {
        driver.switch_to_frame(*index).await?;
    }
    Ok(())
}

/// Breadth-first scan of the current window's frames, at most `max_depth` deep
///
/// Leaves the driver at the top-level document. Session-level faults abort
/// the scan; other faults skip the affected subtree and mark the scan
/// incomplete.
pub async fn discover(driver: &dyn Driver, max_depth: usize) -> Result<Discovery, DriverFault> {
    let window = driver.current_window().await?;
    let mut frames = Vec::new();
    let mut complete = true;
    let mut queue: VecDeque<(Vec<u16>, Vec<String>)> = VecDeque::new();
    queue.push_back((Vec::new(), Vec::new()));

    while let Some((index_path, names)) = queue.pop_front() {
        if names.len() >= max_depth {
            continue;
        }

        let children = match enter_index_path(driver, &index_path).await {
            Ok(()) => driver.frame_descriptors().await,
            Err(fault) => Err(fault),
        };

        let children = match children {
            Ok(children) => children,
            Err(fault) if fault.is_session_level() => {
                let _ = driver.switch_to_default().await;
                return Err(fault);
            }
            Err(fault) => {
                debug!("Skipping frame subtree {}: {}", names.join("/"), fault);
                complete = false;
                continue;
            }
        };

        let child_segments = sibling_segments(&children);
        for (child, segment) in children.iter().zip(child_segments) {
            let mut child_indices = index_path.clone();
            child_indices.push(child.index);
            let mut child_names = names.clone();
            child_names.push(segment);

            frames.push(FrameNode::new(&child_names, child_indices.clone(), &window));
            queue.push_back((child_indices, child_names));
        }
    }

    driver.switch_to_default().await?;
    debug!("Discovered {} frame(s) in window {}", frames.len(), window);

    Ok(Discovery { frames, complete })
}

#[cfg(test)]
#[path = "topology_test.rs"]
mod topology_test;
