use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::types::{ElementInfo, Locator};

/// Failure reported by a browser driver, split by how the engine reacts to it
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverFault {
    #[error("no such element: {0}")]
    NotFound(String),
    #[error("stale element reference: {0}")]
    StaleReference(String),
    #[error("no such window: {0}")]
    NoSuchWindow(String),
    #[error("no such frame: {0}")]
    NoSuchFrame(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("script error: {0}")]
    Script(String),
    #[error("session failure: {0}")]
    Session(String),
}

impl DriverFault {
    /// Classify a free-form WebDriver error message
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let msg = message.to_string();

        if lower.contains("stale element") {
            DriverFault::StaleReference(msg)
        } else if lower.contains("no such window")
            || lower.contains("target window already closed")
            || lower.contains("web view not found")
        {
            DriverFault::NoSuchWindow(msg)
        } else if lower.contains("no such frame") {
            DriverFault::NoSuchFrame(msg)
        } else if lower.contains("no such element") || lower.contains("unable to locate") {
            DriverFault::NotFound(msg)
        } else if lower.contains("invalid selector")
            || lower.contains("invalid expression")
            || lower.contains("invalid argument")
        {
            DriverFault::InvalidSelector(msg)
        } else if lower.contains("javascript error") {
            DriverFault::Script(msg)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            DriverFault::Timeout(msg)
        } else {
            DriverFault::Session(msg)
        }
    }

    /// Faults after which the session must be re-checked before further use
    pub fn is_session_level(&self) -> bool {
        matches!(self, DriverFault::NoSuchWindow(_) | DriverFault::Session(_))
    }
}

/// A frame element found in the current document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameDescriptor {
    /// Position among the document's frame elements, as used by `switch_to_frame`
    pub index: u16,
    pub id: String,
    pub name: String,
}

impl FrameDescriptor {
    /// Path segment for this frame: id, then name, then `index=N`
    pub fn identifier(&self) -> String {
        if !self.id.is_empty() {
            self.id.clone()
        } else if !self.name.is_empty() {
            self.name.clone()
        } else {
            format!("index={}", self.index)
        }
    }

    pub fn matches(&self, segment: &str) -> bool {
        (!self.id.is_empty() && self.id == segment)
            || (!self.name.is_empty() && self.name == segment)
            || format!("index={}", self.index) == segment
    }
}

/// CSS selector for frame elements; listing and entering must agree on its order
pub(crate) const FRAME_ELEMENTS: &str = "iframe, frame";

pub(crate) const LIST_FRAMES_SCRIPT: &str = r#"
    var frames = document.querySelectorAll('iframe, frame');
    var out = [];
    for (var i = 0; i < frames.length; i++) {
        out.push({
            index: i,
            id: frames[i].id || '',
            name: frames[i].getAttribute('name') || ''
        });
    }
    return out;
"#;

pub(crate) const DESCRIBE_ELEMENT_SCRIPT: &str = r#"
    var kind = arguments[0], value = arguments[1], withAttrs = arguments[2];
    var nodes = [];
    try {
        if (kind === 'xpath') {
            var snap = document.evaluate(value, document, null,
                XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
            for (var i = 0; i < snap.snapshotLength; i++) {
                nodes.push(snap.snapshotItem(i));
            }
        } else {
            nodes = Array.prototype.slice.call(document.querySelectorAll(value));
        }
    } catch (e) {
        return null;
    }
    if (nodes.length === 0) {
        return null;
    }
    var el = nodes[0];
    var classOf = function (n) {
        return typeof n.className === 'string' ? n.className : (n.getAttribute('class') || '');
    };
    var attrs = {};
    if (withAttrs && el.attributes) {
        for (var a = 0; a < el.attributes.length; a++) {
            attrs[el.attributes[a].name] = el.attributes[a].value;
        }
    }
    var parent = el.parentElement;
    var position = 0;
    if (parent) {
        for (var j = 0; j < parent.children.length; j++) {
            if (parent.children[j] === el) {
                position = j + 1;
                break;
            }
        }
    }
    return {
        tag: el.tagName.toLowerCase(),
        id: el.id || '',
        name: el.getAttribute('name') || '',
        class: classOf(el),
        text: (el.textContent || '').trim().substring(0, 100),
        attributes: attrs,
        match_count: nodes.length,
        parent_tag: parent ? parent.tagName.toLowerCase() : '',
        parent_id: parent ? (parent.id || '') : '',
        parent_class: parent ? classOf(parent) : '',
        sibling_index: position
    };
"#;

/// Browser automation capability consumed by the session engine
///
/// All frame operations act on the driver's current browsing context. The
/// engine is the single owner of a driver at any time; implementations do not
/// need to support interleaved calls.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverFault>;

    /// Number of elements matching `locator` in the current document
    async fn find_all(&self, locator: &Locator) -> Result<usize, DriverFault>;

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, DriverFault>;

    /// Window handles in the order the browser reports them
    async fn window_handles(&self) -> Result<Vec<String>, DriverFault>;

    async fn current_window(&self) -> Result<String, DriverFault>;

    async fn switch_to_window(&self, handle: &str) -> Result<(), DriverFault>;

    /// Return to the top-level document of the current window
    async fn switch_to_default(&self) -> Result<(), DriverFault>;

    /// Enter the `index`-th element matching `iframe, frame` in the current
    /// document, the same order `frame_descriptors` reports
    async fn switch_to_frame(&self, index: u16) -> Result<(), DriverFault>;

    /// Title of the current window's top-level document
    async fn title(&self) -> Result<String, DriverFault> {
        let value = self
            .execute_script("return document.title;", vec![])
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Frame elements of the current document
    async fn frame_descriptors(&self) -> Result<Vec<FrameDescriptor>, DriverFault> {
        let value = self.execute_script(LIST_FRAMES_SCRIPT, vec![]).await?;
        serde_json::from_value(value)
            .map_err(|e| DriverFault::Session(format!("unexpected frame listing: {}", e)))
    }

    /// Structural record of the first element matching `locator`, `None` when absent
    async fn describe_element(
        &self,
        locator: &Locator,
        include_attributes: bool,
    ) -> Result<Option<ElementInfo>, DriverFault> {
        let value = self
            .execute_script(
                DESCRIBE_ELEMENT_SCRIPT,
                vec![
                    json!(locator.kind()),
                    json!(locator.value()),
                    json!(include_attributes),
                ],
            )
            .await?;

        if value.is_null() {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| DriverFault::Session(format!("unexpected element record: {}", e)))
    }
}

#[cfg(test)]
#[path = "driver_test.rs"]
mod driver_test;
