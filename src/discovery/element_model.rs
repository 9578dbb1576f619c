use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::browser::driver::{BoundingBox, MemoryUsage};

/// Attribute values longer than this are dropped from discovery output.
pub const MAX_ATTRIBUTE_LEN: usize = 1000;

pub const FORM_SELECTOR: &str = "form";

pub const BUTTON_SELECTOR: &str =
    r#"button, input[type="button"], input[type="submit"], [role="button"], a.btn"#;

/// Button candidates owned by a form; reported through the form entry instead.
pub const FORM_BUTTON_SELECTOR: &str = r#"form button, form input[type="button"], form input[type="submit"], form [role="button"], form a.btn"#;

pub const NAV_LINK_SELECTOR: &str = r#"nav a, header a, [role="navigation"] a, .nav a, .navbar a, .menu a"#;

pub const INPUT_SELECTOR: &str =
    r#"input:not([type="submit"]):not([type="button"]), textarea, select"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementType {
    Form,
    Button,
    NavigationLink,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Id,
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementIdentifier {
    #[serde(rename = "type")]
    pub kind: IdentifierKind,
    /// Re-resolvable selector for the element
    pub value: String,
}

/// A DOM node worth writing tests against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestableElement {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub identifier: ElementIdentifier,
    /// `true` when the selector fell back to the bare tag name
    #[serde(default)]
    pub degraded_selector: bool,
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_text: Option<String>,
    pub location: BoundingBox,
    /// Field selectors, forms only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_elements: Option<Vec<String>>,
}

/// Result of crawling one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub title: String,
    pub elements: Vec<TestableElement>,
    pub timestamp: DateTime<Utc>,
    /// SHA-1 over the ordered element selectors
    pub signature: String,
}

/// Figures from the most recent crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStats {
    pub memory_usage: MemoryUsage,
    pub crawl_duration_ms: u64,
    pub elements_found: usize,
    pub error_count: usize,
}

/// Drop attributes whose value exceeds [`MAX_ATTRIBUTE_LEN`] characters.
pub fn filter_attributes(attributes: BTreeMap<String, String>) -> BTreeMap<String, String> {
    attributes
        .into_iter()
        .filter(|(_, v)| v.chars().count() <= MAX_ATTRIBUTE_LEN)
        .collect()
}
