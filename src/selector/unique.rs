//! Stable selectors for discovered DOM nodes.
//!
//! Rules are tried in a fixed order and the first applicable one wins, even
//! when a later rule would produce a shorter string:
//!
//! 1. `#id`
//! 2. `tag[name="…"]`
//! 3. `tag.class1.class2…` (full class list)
//! 4. positional path `body > tag:nth-of-type(i) > …`

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::driver::{NodeDescription, NodeHandle, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectorStrategy {
    Id,
    Name,
    ClassList,
    Path,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueSelector {
    pub value: String,
    pub strategy: SelectorStrategy,
}

/// The node could not be inspected. `tag` is the bare-tag fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degraded {
    pub tag: String,
    pub reason: String,
}

impl Degraded {
    pub fn fallback(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for Degraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "degraded to '{}': {}", self.tag, self.reason)
    }
}

impl std::error::Error for Degraded {}

/// Pure rule application over an already-evaluated node description.
pub fn selector_for(node: &NodeDescription) -> UniqueSelector {
    if let Some(id) = node.id.as_deref().filter(|s| !s.is_empty()) {
        return UniqueSelector {
            value: format!("#{}", id),
            strategy: SelectorStrategy::Id,
        };
    }

    if let Some(name) = node.name.as_deref().filter(|s| !s.is_empty()) {
        return UniqueSelector {
            value: format!("{}[name=\"{}\"]", node.tag, name),
            strategy: SelectorStrategy::Name,
        };
    }

    let classes: Vec<&str> = node
        .classes
        .iter()
        .map(String::as_str)
        .filter(|c| !c.is_empty())
        .collect();
    if !classes.is_empty() {
        return UniqueSelector {
            value: format!("{}.{}", node.tag, classes.join(".")),
            strategy: SelectorStrategy::ClassList,
        };
    }

    let mut segments = vec!["body".to_string()];
    segments.extend(
        node.path
            .iter()
            .map(|s| format!("{}:nth-of-type({})", s.tag, s.nth_of_type)),
    );
    UniqueSelector {
        value: segments.join(" > "),
        strategy: SelectorStrategy::Path,
    }
}

/// Evaluate `node` in the page and derive its selector.
pub async fn generate_unique_selector(
    page: &dyn Page,
    node: &NodeHandle,
) -> Result<UniqueSelector, Degraded> {
    match page.describe(node).await {
        Ok(description) => Ok(selector_for(&description)),
        Err(e) => {
            debug!(node = %node.id, tag = %node.tag, error = %e, "selector degraded to tag name");
            Err(Degraded {
                tag: node.tag.clone(),
                reason: e.to_string(),
            })
        }
    }
}

/// Selector string for `node`, using the bare tag when evaluation fails.
/// The flag is `true` when the fallback was used.
pub async fn selector_or_fallback(page: &dyn Page, node: &NodeHandle) -> (String, bool) {
    match generate_unique_selector(page, node).await {
        Ok(s) => (s.value, false),
        Err(d) => (d.tag, true),
    }
}
