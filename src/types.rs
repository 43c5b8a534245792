use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Output format for CLI results
#[derive(Clone, Copy, Debug, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format for programmatic consumption
    Json,
    /// Human-readable simple format
    Simple,
}

/// Browser viewport dimensions
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
}

impl ViewportSize {
    /// Parse viewport size from "WIDTHxHEIGHT" format (e.g., "1400x900")
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid viewport format. Use WIDTHxHEIGHT (e.g., 1400x900)");
        }

        let width = parts[0]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid width in viewport size"))?;
        let height = parts[1]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid height in viewport size"))?;

        Ok(ViewportSize { width, height })
    }
}

/// A selector together with the query language it is written in
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Locator {
    XPath(String),
    Css(String),
}

impl Locator {
    /// Guess the query language from the selector's shape
    pub fn parse(selector: &str) -> Self {
        let trimmed = selector.trim();
        if trimmed.starts_with('/') || trimmed.starts_with('(') || trimmed.starts_with("./") {
            Locator::XPath(trimmed.to_string())
        } else {
            Locator::Css(trimmed.to_string())
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::XPath(v) | Locator::Css(v) => v,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Locator::XPath(_) => "xpath",
            Locator::Css(_) => "css",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value().is_empty()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Structural record of an element, as read from the live page
///
/// This is what the change detector snapshots and what the optimizer
/// derives alternatives from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementInfo {
    /// Lower-case tag name
    pub tag: String,
    pub id: String,
    pub name: String,
    pub class: String,
    /// Trimmed text content, at most 100 characters
    pub text: String,
    /// Every attribute on the element (empty when not requested)
    pub attributes: BTreeMap<String, String>,
    /// Number of elements the locator matched
    pub match_count: usize,
    pub parent_tag: String,
    pub parent_id: String,
    pub parent_class: String,
    /// 1-based position among the parent's element children
    pub sibling_index: usize,
    /// Frame path the element was read from ("main" for the top document)
    pub frame_path: String,
    /// Selector originally used to capture the element, if any
    #[serde(skip_serializing_if = "String::is_empty")]
    pub original_xpath: String,
}

/// Why a validation did not produce a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    /// Element absent in every searched context
    NotFound,
    /// Lookup exceeded its bounded wait
    Timeout,
    /// The preferred frame path could not be entered
    FrameResolution { path: String },
    /// The browser rejected the selector as malformed
    InvalidSelector { message: String },
    /// Browser or session failure
    Driver { message: String },
}

impl ValidationFailure {
    /// Driver failures are reported once per session, not per item
    pub fn is_driver_level(&self) -> bool {
        matches!(self, ValidationFailure::Driver { .. })
    }

    pub fn message(&self) -> String {
        match self {
            ValidationFailure::NotFound => "element not found".to_string(),
            ValidationFailure::Timeout => "lookup timed out".to_string(),
            ValidationFailure::FrameResolution { path } => {
                format!("frame path could not be resolved: {}", path)
            }
            ValidationFailure::InvalidSelector { message } => {
                format!("invalid selector: {}", message)
            }
            ValidationFailure::Driver { message } => message.clone(),
        }
    }
}

/// Outcome of a single selector validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub selector: String,
    pub found: bool,
    pub match_count: usize,
    pub elapsed_ms: f64,
    /// Frame path where the selector matched ("main" for the top document)
    pub frame_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ValidationFailure>,
}

impl ValidationResult {
    pub fn found(selector: &str, match_count: usize, frame_path: &str, elapsed_ms: f64) -> Self {
        Self {
            selector: selector.to_string(),
            found: true,
            match_count,
            elapsed_ms,
            frame_path: frame_path.to_string(),
            error: None,
        }
    }

    pub fn failed(selector: &str, failure: ValidationFailure, elapsed_ms: f64) -> Self {
        Self {
            selector: selector.to_string(),
            found: false,
            match_count: 0,
            elapsed_ms,
            frame_path: String::new(),
            error: Some(failure),
        }
    }

    /// Timeouts count as failed tests but are flagged for diagnostics
    pub fn timed_out(&self) -> bool {
        matches!(self.error, Some(ValidationFailure::Timeout))
    }

    pub fn error_message(&self) -> String {
        self.error.as_ref().map(|e| e.message()).unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
