use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::SelectorItem;
use crate::errors::LocprobeError;
use crate::session::BrowserSession;
use crate::topology::MAIN_FRAME;
use crate::types::ElementInfo;

const RESULT_SCRIPT: &str = "return window.__pickerResult || null;";
const ACTIVE_SCRIPT: &str = "return !!window.__pickerActive;";
const LOCKED_SCRIPT: &str = "return !!window.__pickerLocked;";
const CLEANUP_SCRIPT: &str = r#"
    if (typeof window.__pickerCleanup === 'function') {
        window.__pickerCleanup();
    }
    window.__pickerResult = null;
    return true;
"#;

/// Payload the picker script leaves in `window.__pickerResult`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PickerPayload {
    xpath: String,
    #[serde(alias = "css_selector")]
    css: String,
    tag: String,
    text: String,
    attributes: BTreeMap<String, String>,
}

/// Element chosen by the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickedElement {
    pub xpath: String,
    pub css_selector: String,
    pub tag: String,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    pub frame_path: String,
}

impl PickedElement {
    /// New item pointing at the picked element
    pub fn into_item(self, name: &str) -> SelectorItem {
        let mut item = SelectorItem::new(name, &self.xpath);
        item.css_selector = self.css_selector;
        item.element_tag = self.tag;
        item.element_text = self.text;
        item.found_frame_path = self.frame_path;
        item
    }

    /// Structural record usable by the optimizer
    pub fn to_element_info(&self) -> ElementInfo {
        let attr = |key: &str| self.attributes.get(key).cloned().unwrap_or_default();
        ElementInfo {
            tag: self.tag.to_lowercase(),
            id: attr("id"),
            name: attr("name"),
            class: attr("class"),
            text: self.text.clone(),
            attributes: self.attributes.clone(),
            match_count: 1,
            frame_path: self.frame_path.clone(),
            original_xpath: self.xpath.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PickerOutcome {
    Picked(PickedElement),
    Cancelled,
}

fn parse_outcome(frame_path: &str, value: Value) -> Option<PickerOutcome> {
    match value {
        Value::Null => None,
        Value::String(s) if s == "CANCELLED" => Some(PickerOutcome::Cancelled),
        Value::Object(_) => match serde_json::from_value::<PickerPayload>(value) {
            Ok(payload) => Some(PickerOutcome::Picked(PickedElement {
                xpath: payload.xpath,
                css_selector: payload.css,
                tag: payload.tag,
                text: payload.text,
                attributes: payload.attributes,
                frame_path: frame_path.to_string(),
            })),
            Err(e) => {
                warn!("Ignoring malformed picker result in {}: {}", frame_path, e);
                None
            }
        },
        _ => None,
    }
}

impl BrowserSession {
    /// Top document plus every frame, freshly discovered
    async fn picker_contexts(&self) -> Vec<(String, Vec<u16>)> {
        let mut contexts = vec![(MAIN_FRAME.to_string(), Vec::new())];
        match self.refresh_frames().await {
            Ok(frames) => contexts.extend(
                frames
                    .into_iter()
                    .map(|node| (node.frame_path, node.index_path)),
            ),
            Err(e) => debug!("Picker frame scan failed: {}", e),
        }
        contexts
    }

    /// Run `script` in every context until `pick` accepts a value
    async fn scan_contexts<T>(
        &self,
        script: &str,
        mut pick: impl FnMut(&str, Value) -> Option<T>,
    ) -> Result<Option<T>, LocprobeError> {
        let mut outcome = Ok(None);

        for (path, index_path) in self.picker_contexts().await {
            let value = match self.enter_index_path(&index_path).await {
                Ok(()) => self.driver().execute_script(script, vec![]).await,
                Err(fault) => Err(fault),
            };

            match value {
                Ok(value) => {
                    if let Some(found) = pick(&path, value) {
                        outcome = Ok(Some(found));
                        break;
                    }
                }
                Err(fault) if fault.is_session_level() => {
                    outcome = Err(LocprobeError::from(fault));
                    break;
                }
                Err(fault) => debug!("Picker script skipped in {}: {}", path, fault),
            }
        }

        if let Err(e) = self.reset_to_default().await {
            debug!("Could not reset context after picker scan: {}", e);
        }
        outcome
    }

    /// Inject the picker script into the top document and every frame
    ///
    /// Returns the number of contexts that accepted the script.
    pub async fn start_picker(&self, script: &str) -> Result<usize, LocprobeError> {
        self.ensure_alive().await?;
        self.cleanup_picker().await;

        let mut injected = 0;
        self.scan_contexts(script, |path, _| {
            debug!("Picker injected into {}", path);
            injected += 1;
            None::<()>
        })
        .await?;

        info!("Picker active in {} context(s)", injected);
        Ok(injected)
    }

    /// Result of the picker from whichever frame holds it
    ///
    /// A lost browser window counts as a cancelled pick.
    pub async fn picker_result(&self) -> Result<Option<PickerOutcome>, LocprobeError> {
        if !self.is_alive().await {
            return Ok(Some(PickerOutcome::Cancelled));
        }
        self.scan_contexts(RESULT_SCRIPT, parse_outcome).await
    }

    pub async fn is_picker_active(&self) -> bool {
        self.flag_set(ACTIVE_SCRIPT).await
    }

    /// Whether the operator has locked a highlighted element
    pub async fn is_picker_locked(&self) -> bool {
        self.flag_set(LOCKED_SCRIPT).await
    }

    async fn flag_set(&self, script: &str) -> bool {
        if !self.is_alive().await {
            return false;
        }
        matches!(
            self.scan_contexts(script, |_, value| value.as_bool().filter(|set| *set))
                .await,
            Ok(Some(true))
        )
    }

    /// Remove the picker from every context; returns how many were cleaned
    pub async fn cleanup_picker(&self) -> usize {
        let mut cleaned = 0;
        let outcome = self
            .scan_contexts(CLEANUP_SCRIPT, |_, _| {
                cleaned += 1;
                None::<()>
            })
            .await;
        if let Err(e) = outcome {
            warn!("Picker cleanup interrupted: {}", e);
        }
        cleaned
    }
}

#[cfg(test)]
#[path = "picker_test.rs"]
mod picker_test;
