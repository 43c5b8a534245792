use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use crate::types::{ElementInfo, Locator};

static POSITIONAL_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\]").expect("positional index pattern"));
static CSS_NTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":nth-(child|of-type|last-child)\(").expect("nth pattern"));
static INDEX_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(//[\w*-]+\)\[\d+\]$").expect("index-only pattern")
});
static ATTR_EQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@[\w:-]+\s*=").expect("attribute predicate pattern"));
static SEPARATOR_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([\[\]\(\),=])\s*").expect("separator pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Attributes too volatile to anchor a compound predicate on
const NOISY_ATTRIBUTES: [&str; 3] = ["style", "onclick", "onmouseover"];

/// Locator strategy, ordered from most to least stable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Id,
    DataAttr,
    Name,
    Class,
    Text,
    Ancestor,
    #[serde(alias = "original")]
    Relative,
    Attributes,
    Index,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Strategy::Id => "id",
            Strategy::DataAttr => "data-attr",
            Strategy::Name => "name",
            Strategy::Class => "class",
            Strategy::Text => "text",
            Strategy::Ancestor => "ancestor",
            Strategy::Relative => "relative",
            Strategy::Attributes => "attributes",
            Strategy::Index => "index",
        };
        f.write_str(label)
    }
}

/// Base robustness weight per strategy, on a 0-100 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyWeights {
    pub id: u32,
    pub data_attr: u32,
    pub name: u32,
    pub class: u32,
    pub text: u32,
    pub ancestor: u32,
    pub relative: u32,
    pub attributes: u32,
    pub index: u32,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            id: 95,
            data_attr: 90,
            name: 85,
            class: 70,
            text: 65,
            ancestor: 60,
            relative: 50,
            attributes: 45,
            index: 30,
        }
    }
}

impl StrategyWeights {
    pub fn weight(&self, strategy: Strategy) -> u32 {
        match strategy {
            Strategy::Id => self.id,
            Strategy::DataAttr => self.data_attr,
            Strategy::Name => self.name,
            Strategy::Class => self.class,
            Strategy::Text => self.text,
            Strategy::Ancestor => self.ancestor,
            Strategy::Relative => self.relative,
            Strategy::Attributes => self.attributes,
            Strategy::Index => self.index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatch {
    Exact,
    Normalized,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Nearest ancestor carries an id
    Id(String),
    /// Parent tag plus one of its classes
    TagClass { tag: String, class: String },
}

/// A candidate locator, carrying only what its strategy needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorPlan {
    Id {
        tag: String,
        id: String,
    },
    DataAttr {
        tag: String,
        attr: String,
        value: String,
    },
    Name {
        tag: String,
        name: String,
    },
    Class {
        tag: String,
        class: String,
        exact: bool,
    },
    Text {
        tag: String,
        text: String,
        mode: TextMatch,
    },
    Ancestor {
        anchor: Anchor,
        tag: String,
        class: Option<String>,
    },
    Relative {
        xpath: String,
    },
    Attributes {
        tag: String,
        pairs: Vec<(String, String)>,
    },
    Index {
        tag: String,
        position: usize,
    },
}

impl LocatorPlan {
    pub fn strategy(&self) -> Strategy {
        match self {
            LocatorPlan::Id { .. } => Strategy::Id,
            LocatorPlan::DataAttr { .. } => Strategy::DataAttr,
            LocatorPlan::Name { .. } => Strategy::Name,
            LocatorPlan::Class { .. } => Strategy::Class,
            LocatorPlan::Text { .. } => Strategy::Text,
            LocatorPlan::Ancestor { .. } => Strategy::Ancestor,
            LocatorPlan::Relative { .. } => Strategy::Relative,
            LocatorPlan::Attributes { .. } => Strategy::Attributes,
            LocatorPlan::Index { .. } => Strategy::Index,
        }
    }

    pub fn to_xpath(&self) -> String {
        match self {
            LocatorPlan::Id { tag, id } => format!("//{}[@id={}]", tag, escape_xpath_text(id)),
            LocatorPlan::DataAttr { tag, attr, value } => {
                format!("//{}[@{}={}]", tag, attr, escape_xpath_text(value))
            }
            LocatorPlan::Name { tag, name } => {
                format!("//{}[@name={}]", tag, escape_xpath_text(name))
            }
            LocatorPlan::Class { tag, class, exact } => {
                if *exact {
                    format!("//{}[@class={}]", tag, escape_xpath_text(class))
                } else {
                    format!("//{}[contains(@class, {})]", tag, escape_xpath_text(class))
                }
            }
            LocatorPlan::Text { tag, text, mode } => {
                let literal = escape_xpath_text(text);
                match mode {
                    TextMatch::Exact => format!("//{}[text()={}]", tag, literal),
                    TextMatch::Normalized => format!("//{}[normalize-space()={}]", tag, literal),
                    TextMatch::Contains => format!("//{}[contains(text(), {})]", tag, literal),
                }
            }
            LocatorPlan::Ancestor { anchor, tag, class } => {
                let prefix = match anchor {
                    Anchor::Id(id) => format!("//*[@id={}]", escape_xpath_text(id)),
                    Anchor::TagClass { tag, class } => {
                        format!("//{}[contains(@class, {})]", tag, escape_xpath_text(class))
                    }
                };
                match class {
                    Some(class) => format!(
                        "{}//{}[contains(@class, {})]",
                        prefix,
                        tag,
                        escape_xpath_text(class)
                    ),
                    None => format!("{}//{}", prefix, tag),
                }
            }
            LocatorPlan::Relative { xpath } => xpath.clone(),
            LocatorPlan::Attributes { tag, pairs } => {
                let conditions: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("@{}={}", k, escape_xpath_text(v)))
                    .collect();
                format!("//{}[{}]", tag, conditions.join(" and "))
            }
            LocatorPlan::Index { tag, position } => format!("(//{})[{}]", tag, position),
        }
    }

    fn describe(&self) -> String {
        match self {
            LocatorPlan::Id { id, .. } => format!("id attribute: {}", id),
            LocatorPlan::DataAttr { attr, .. } => format!("data attribute: {}", attr),
            LocatorPlan::Name { name, .. } => format!("name attribute: {}", name),
            LocatorPlan::Class { class, exact, .. } => {
                if *exact {
                    "exact class match".to_string()
                } else {
                    format!("contains class: {}", class)
                }
            }
            LocatorPlan::Text { mode, .. } => match mode {
                TextMatch::Exact => "exact text match".to_string(),
                TextMatch::Normalized => "normalized text match".to_string(),
                TextMatch::Contains => "text prefix match".to_string(),
            },
            LocatorPlan::Ancestor { anchor, .. } => match anchor {
                Anchor::Id(id) => format!("under ancestor #{}", id),
                Anchor::TagClass { tag, class } => format!("under {}.{}", tag, class),
            },
            LocatorPlan::Relative { .. } => "originally captured path".to_string(),
            LocatorPlan::Attributes { .. } => "compound attributes".to_string(),
            LocatorPlan::Index { position, .. } => format!("position {} in document", position),
        }
    }
}

/// A ranked alternative selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub selector: String,
    pub strategy: Strategy,
    pub score: u32,
    #[serde(default)]
    pub description: String,
}

/// Quote `text` as an XPath string literal
///
/// Text holding both quote kinds becomes a `concat(...)` of double-quoted
/// segments joined by `'"'`.
pub fn escape_xpath_text(text: &str) -> String {
    if text.is_empty() {
        return "\"\"".to_string();
    }

    let has_double = text.contains('"');
    let has_single = text.contains('\'');

    if has_double && has_single {
        let segments: Vec<&str> = text.split('"').collect();
        let mut parts = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            if !segment.is_empty() {
                parts.push(format!("\"{}\"", segment));
            }
            if i + 1 < segments.len() {
                parts.push("'\"'".to_string());
            }
        }
        format!("concat({})", parts.join(", "))
    } else if has_double {
        format!("'{}'", text)
    } else {
        format!("\"{}\"", text)
    }
}

/// Strip a leading `/html/body` so the path floats relative to the document
pub fn optimize_xpath(xpath: &str) -> String {
    match xpath.strip_prefix("/html/body") {
        Some("") | None => xpath.to_string(),
        Some(rest) if rest.starts_with("//") => rest.to_string(),
        Some(rest) => format!("/{}", rest),
    }
}

/// Shortest stable form of an element: by id, else by name
pub fn simplify(info: &ElementInfo) -> Option<String> {
    let tag = tag_or_any(&info.tag);
    if !info.id.is_empty() {
        Some(LocatorPlan::Id { tag, id: info.id.clone() }.to_xpath())
    } else if !info.name.is_empty() {
        Some(
            LocatorPlan::Name {
                tag,
                name: info.name.clone(),
            }
            .to_xpath(),
        )
    } else {
        None
    }
}

fn tag_or_any(tag: &str) -> String {
    if tag.is_empty() {
        "*".to_string()
    } else {
        tag.to_lowercase()
    }
}

fn normalize(selector: &str) -> String {
    let tight = SEPARATOR_SPACE.replace_all(selector.trim(), "$1");
    WHITESPACE.replace_all(&tight, " ").replace('\'', "\"")
}

fn meaningful_class(class: &str) -> bool {
    class.chars().count() > 3 && !class.starts_with('_')
}

/// Scores and ranks selectors
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    weights: StrategyWeights,
}

impl Optimizer {
    pub fn new(weights: StrategyWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &StrategyWeights {
        &self.weights
    }

    /// Candidate plans for an element with their scores, in generation order
    pub fn plans(&self, info: &ElementInfo) -> Vec<(LocatorPlan, u32)> {
        let w = &self.weights;
        let tag = tag_or_any(&info.tag);
        let mut plans = Vec::new();

        if !info.id.is_empty() {
            plans.push((
                LocatorPlan::Id {
                    tag: tag.clone(),
                    id: info.id.clone(),
                },
                w.id,
            ));
            plans.push((
                LocatorPlan::Id {
                    tag: "*".to_string(),
                    id: info.id.clone(),
                },
                w.id.saturating_sub(2),
            ));
        }

        for (attr, value) in &info.attributes {
            if attr.starts_with("data-") && !value.is_empty() {
                plans.push((
                    LocatorPlan::DataAttr {
                        tag: tag.clone(),
                        attr: attr.clone(),
                        value: value.clone(),
                    },
                    w.data_attr,
                ));
            }
        }

        if !info.name.is_empty() {
            plans.push((
                LocatorPlan::Name {
                    tag: tag.clone(),
                    name: info.name.clone(),
                },
                w.name,
            ));
        }

        let classes: Vec<&str> = info.class.split_whitespace().collect();
        if !classes.is_empty() {
            plans.push((
                LocatorPlan::Class {
                    tag: tag.clone(),
                    class: classes.join(" "),
                    exact: true,
                },
                w.class,
            ));
            for class in classes.iter().take(3).filter(|c| meaningful_class(c)) {
                plans.push((
                    LocatorPlan::Class {
                        tag: tag.clone(),
                        class: class.to_string(),
                        exact: false,
                    },
                    w.class.saturating_sub(5),
                ));
            }
        }

        let text = info.text.trim();
        if !text.is_empty() {
            if text.chars().count() <= 30 {
                plans.push((
                    LocatorPlan::Text {
                        tag: tag.clone(),
                        text: text.to_string(),
                        mode: TextMatch::Exact,
                    },
                    w.text,
                ));
            }
            plans.push((
                LocatorPlan::Text {
                    tag: tag.clone(),
                    text: text.chars().take(20).collect(),
                    mode: TextMatch::Contains,
                },
                w.text.saturating_sub(5),
            ));
            plans.push((
                LocatorPlan::Text {
                    tag: tag.clone(),
                    text: text.to_string(),
                    mode: TextMatch::Normalized,
                },
                w.text.saturating_sub(3),
            ));
        }

        if !info.parent_id.is_empty() {
            plans.push((
                LocatorPlan::Ancestor {
                    anchor: Anchor::Id(info.parent_id.clone()),
                    tag: tag.clone(),
                    class: None,
                },
                w.ancestor + 10,
            ));
            if let Some(first) = classes.first() {
                plans.push((
                    LocatorPlan::Ancestor {
                        anchor: Anchor::Id(info.parent_id.clone()),
                        tag: tag.clone(),
                        class: Some(first.to_string()),
                    },
                    w.ancestor + 5,
                ));
            }
        }

        if !info.parent_tag.is_empty()
            && let Some(parent_class) = info.parent_class.split_whitespace().next()
        {
            plans.push((
                LocatorPlan::Ancestor {
                    anchor: Anchor::TagClass {
                        tag: info.parent_tag.to_lowercase(),
                        class: parent_class.to_string(),
                    },
                    tag: tag.clone(),
                    class: None,
                },
                w.ancestor,
            ));
        }

        let meaningful: Vec<(String, String)> = info
            .attributes
            .iter()
            .filter(|(k, v)| {
                !v.is_empty() && !NOISY_ATTRIBUTES.contains(&k.as_str()) && v.chars().count() < 50
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if meaningful.len() >= 2 {
            plans.push((
                LocatorPlan::Attributes {
                    tag: tag.clone(),
                    pairs: meaningful.into_iter().take(2).collect(),
                },
                w.attributes,
            ));
        }

        if info.sibling_index > 0 {
            plans.push((
                LocatorPlan::Index {
                    tag: tag.clone(),
                    position: info.sibling_index,
                },
                w.index,
            ));
        }

        if !info.original_xpath.is_empty() {
            plans.push((
                LocatorPlan::Relative {
                    xpath: info.original_xpath.clone(),
                },
                w.relative,
            ));
        }

        plans
    }

    /// Ranked, de-duplicated alternatives, highest score first
    pub fn generate(&self, info: &ElementInfo) -> Vec<Alternative> {
        let mut alternatives: Vec<Alternative> = self
            .plans(info)
            .into_iter()
            .map(|(plan, score)| Alternative {
                selector: plan.to_xpath(),
                strategy: plan.strategy(),
                score: score.min(100),
                description: plan.describe(),
            })
            .collect();

        alternatives.sort_by(|a, b| b.score.cmp(&a.score));

        let mut seen = HashSet::new();
        alternatives.retain(|alt| seen.insert(normalize(&alt.selector)));
        alternatives
    }

    /// Strategy an arbitrary selector most resembles
    pub fn classify(&self, selector: &str) -> Strategy {
        match Locator::parse(selector) {
            Locator::XPath(xpath) => classify_xpath(&xpath),
            Locator::Css(css) => classify_css(&css),
        }
    }

    /// Robustness score in [0, 100] for an existing selector
    pub fn score(&self, selector: &str) -> u32 {
        let selector = selector.trim();
        if selector.is_empty() {
            return 0;
        }

        let strategy = self.classify(selector);
        let mut score = self.weights.weight(strategy) as i64;

        let locator = Locator::parse(selector);
        let indices = match &locator {
            Locator::XPath(x) => POSITIONAL_INDEX.find_iter(x).count(),
            Locator::Css(c) => CSS_NTH.find_iter(c).count(),
        } as i64;
        // the index strategy's own position is already priced into its weight
        let charged = if strategy == Strategy::Index {
            (indices - 1).max(0)
        } else {
            indices
        };
        score -= charged * 10;

        if let Locator::XPath(x) = &locator {
            if x.starts_with('/') && !x.starts_with("//") {
                score -= 10;
            }
            let depth = x.matches('/').count() as i64;
            if depth > 10 {
                score -= (depth - 10) * 2;
            }
        }

        score.clamp(0, 100) as u32
    }
}

fn classify_xpath(xpath: &str) -> Strategy {
    if INDEX_ONLY.is_match(xpath) {
        return Strategy::Index;
    }
    if xpath.starts_with('/') && !xpath.starts_with("//") && !xpath.contains('@') {
        return if POSITIONAL_INDEX.is_match(xpath) {
            Strategy::Index
        } else {
            Strategy::Relative
        };
    }

    let first_predicate_end = xpath.find(']');
    let descends_after_anchor =
        first_predicate_end.is_some_and(|end| xpath[end..].contains("//"));

    if xpath.contains("@id=") || xpath.contains("@id =") {
        if descends_after_anchor {
            return Strategy::Ancestor;
        }
        return Strategy::Id;
    }
    if xpath.contains("@data-") {
        return Strategy::DataAttr;
    }
    if xpath.contains("@name=") || xpath.contains("@name =") {
        return Strategy::Name;
    }
    if xpath.contains("@class") {
        return if descends_after_anchor {
            Strategy::Ancestor
        } else {
            Strategy::Class
        };
    }
    if xpath.contains("text()") || xpath.contains("normalize-space(") {
        return Strategy::Text;
    }
    if ATTR_EQ.find_iter(xpath).count() >= 2 {
        return Strategy::Attributes;
    }
    if POSITIONAL_INDEX.is_match(xpath) {
        return Strategy::Index;
    }
    Strategy::Relative
}

fn classify_css(css: &str) -> Strategy {
    let nested = css.contains(' ') || css.contains('>');
    if css.contains('#') {
        if nested && !css.trim_end().rsplit([' ', '>']).next().unwrap_or("").contains('#') {
            return Strategy::Ancestor;
        }
        return Strategy::Id;
    }
    if css.contains("[data-") {
        return Strategy::DataAttr;
    }
    if css.contains("[name=") {
        return Strategy::Name;
    }
    if CSS_NTH.is_match(css) {
        return Strategy::Index;
    }
    if css.matches('[').count() >= 2 {
        return Strategy::Attributes;
    }
    if css.contains('.') {
        return if nested {
            Strategy::Ancestor
        } else {
            Strategy::Class
        };
    }
    Strategy::Relative
}

#[cfg(test)]
#[path = "optimizer_test.rs"]
mod optimizer_test;
