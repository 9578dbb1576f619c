//! Browser driving capability consumed by the discovery and orchestration engines.
//!
//! The engines never talk to a concrete browser. They hold trait objects for a
//! [`Browser`], the isolated [`BrowserContext`]s it hands out, and the [`Page`]s
//! opened inside a context. `BrowserSession` (NDJSON over a Playwright
//! subprocess) and `MockBrowser` (in-memory DOM) implement the contract.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DriverResult;

// ============================================================================
// Value types exchanged with the driver
// ============================================================================

/// Opaque reference to a DOM node returned by `query`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    /// Driver-assigned node id, valid for the lifetime of its page
    pub id: String,

    /// Lowercase tag name, known even when the node can no longer be inspected
    pub tag: String,
}

impl NodeHandle {
    pub fn new(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
        }
    }
}

/// One `tag:nth-of-type(n)` hop of a node's position under `<body>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    pub tag: String,
    /// 1-based index among siblings sharing the same tag
    pub nth_of_type: usize,
}

/// Structural facts about a node, as evaluated in the page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeDescription {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Path from the first child of `<body>` down to the node itself
    #[serde(default)]
    pub path: Vec<PathSegment>,
}

/// Render box of a node in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A box with no area is treated as not rendered.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// DOM state awaited by `wait_for_selector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementState {
    Attached,
    Detached,
    Visible,
    Hidden,
}

/// Page load milestones awaited by `wait_for_load_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

/// A network response observed by the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResponse {
    pub url: String,
    pub status: u16,
}

/// An outgoing network request observed by the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedRequest {
    pub url: String,
    pub method: String,
}

/// Heap figures reported by the driver process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub heap_used: u64,
    pub heap_total: u64,
    pub rss: u64,
}

// ============================================================================
// Capability traits
// ============================================================================

/// Starts a browser. Held by the supervisor so the driver can be relaunched.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> DriverResult<Arc<dyn Browser>>;
}

#[async_trait]
pub trait Browser: Send + Sync {
    /// Create an isolated browsing context (own cookies, storage, pages).
    async fn new_context(&self) -> DriverResult<Box<dyn BrowserContext>>;

    async fn memory_usage(&self) -> DriverResult<MemoryUsage>;

    /// Ask the driver process to run a garbage collection.
    async fn collect_garbage(&self) -> DriverResult<()>;

    async fn close(&self) -> DriverResult<()>;
}

#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> DriverResult<Box<dyn Page>>;

    async fn close(&self) -> DriverResult<()>;
}

#[async_trait]
pub trait Page: Send + Sync {
    // ---- navigation ----
    async fn goto(&self, url: &str) -> DriverResult<()>;
    async fn reload(&self) -> DriverResult<()>;
    async fn current_url(&self) -> DriverResult<String>;
    async fn title(&self) -> DriverResult<String>;

    // ---- interaction (selectors are driver-native query strings) ----
    async fn click(&self, selector: &str) -> DriverResult<()>;
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()>;
    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()>;
    async fn hover(&self, selector: &str) -> DriverResult<()>;
    async fn check(&self, selector: &str) -> DriverResult<()>;
    async fn uncheck(&self, selector: &str) -> DriverResult<()>;
    async fn submit(&self, selector: &str) -> DriverResult<()>;

    // ---- waiting ----
    async fn wait_for_selector(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> DriverResult<()>;
    async fn wait_for_timeout(&self, duration: Duration) -> DriverResult<()>;
    async fn wait_for_load_state(&self, state: LoadState) -> DriverResult<()>;

    // ---- DOM inspection ----
    async fn query(&self, selector: &str) -> DriverResult<Vec<NodeHandle>>;
    async fn query_within(&self, parent: &NodeHandle, selector: &str)
    -> DriverResult<Vec<NodeHandle>>;
    async fn describe(&self, node: &NodeHandle) -> DriverResult<NodeDescription>;
    async fn bounding_box(&self, node: &NodeHandle) -> DriverResult<Option<BoundingBox>>;
    async fn is_visible(&self, node: &NodeHandle) -> DriverResult<bool>;
    async fn node_text(&self, node: &NodeHandle) -> DriverResult<Option<String>>;
    async fn attributes(&self, node: &NodeHandle) -> DriverResult<BTreeMap<String, String>>;

    /// Text content of the first match, `None` when nothing matches.
    async fn text_content(&self, selector: &str) -> DriverResult<Option<String>>;

    /// Named attribute of the first match; outer `None` when nothing matches.
    async fn attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>>;

    /// Evaluate a script in the page and return its JSON-serializable result.
    async fn evaluate(&self, script: &str) -> DriverResult<Value>;

    async fn accessibility_snapshot(&self) -> DriverResult<Option<Value>>;

    /// PNG screenshot of the full page.
    async fn screenshot(&self) -> DriverResult<Vec<u8>>;

    // ---- network observation ----
    async fn wait_for_response(
        &self,
        url_fragment: &str,
        timeout: Duration,
    ) -> DriverResult<ObservedResponse>;
    async fn wait_for_request(
        &self,
        url_fragment: &str,
        timeout: Duration,
    ) -> DriverResult<ObservedRequest>;

    async fn close(&self) -> DriverResult<()>;
}
