//! In-memory browser used by the test suite.
//!
//! A `MockBrowser` holds scripted documents keyed by URL. Pages opened from
//! it resolve a useful subset of CSS (tag, `#id`, `.class`, `[attr="v"]`,
//! `:not(..)`, `:nth-of-type(n)`, descendant and `>` combinators, selector
//! lists) plus the `text=` prefix, and record every driver call so tests can
//! verify what the engines did.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::browser::driver::{
    BoundingBox, Browser, BrowserContext, BrowserLauncher, ElementState, LoadState,
    MemoryUsage, NodeDescription, NodeHandle, ObservedRequest, ObservedResponse, Page,
    PathSegment,
};
use crate::error::{DriverError, DriverResult};

/// Smallest byte sequence that starts like a PNG file.
pub const MOCK_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

// ============================================================================
// Scripted DOM
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MockElement {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
    pub bounding_box: Option<BoundingBox>,
    pub visible: bool,
    /// Index of the parent element; `None` means a direct child of `<body>`
    pub parent: Option<usize>,
    /// `describe` fails for detached nodes
    pub detached: bool,
}

impl MockElement {
    /// A visible element with a 100x20 box.
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            attributes: BTreeMap::new(),
            text: None,
            bounding_box: Some(BoundingBox::new(0.0, 0.0, 100.0, 20.0)),
            visible: true,
            parent: None,
            detached: false,
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn name(self, name: &str) -> Self {
        self.attr("name", name)
    }

    pub fn class(self, classes: &str) -> Self {
        self.attr("class", classes)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn bbox(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bounding_box = Some(BoundingBox::new(x, y, width, height));
        self
    }

    /// Not rendered: no box, reported invisible.
    pub fn hidden(mut self) -> Self {
        self.bounding_box = None;
        self.visible = false;
        self
    }

    pub fn child_of(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    fn element_id(&self) -> Option<&str> {
        self.attributes.get("id").map(String::as_str)
    }

    fn classes(&self) -> Vec<String> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockDocument {
    pub title: String,
    pub elements: Vec<MockElement>,
    pub accessibility: Option<Value>,
    /// Returned by `evaluate` (navigation timing in practice)
    pub evaluation: Value,
    pub responses: Vec<ObservedResponse>,
    pub requests: Vec<ObservedRequest>,
}

impl MockDocument {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            elements: Vec::new(),
            accessibility: Some(json!({ "role": "WebArea", "name": title })),
            evaluation: json!({
                "navigationStart": 0.0,
                "domContentLoadedEventEnd": 400.0,
                "loadEventEnd": 800.0
            }),
            responses: Vec::new(),
            requests: Vec::new(),
        }
    }

    /// Append an element and return its index for use with `child_of`.
    pub fn push(&mut self, element: MockElement) -> usize {
        self.elements.push(element);
        self.elements.len() - 1
    }

    pub fn with(mut self, element: MockElement) -> Self {
        self.push(element);
        self
    }

    pub fn with_response(mut self, url: &str, status: u16) -> Self {
        self.responses.push(ObservedResponse {
            url: url.to_string(),
            status,
        });
        self
    }

    pub fn with_request(mut self, url: &str, method: &str) -> Self {
        self.requests.push(ObservedRequest {
            url: url.to_string(),
            method: method.to_string(),
        });
        self
    }

    pub fn with_accessibility(mut self, snapshot: Option<Value>) -> Self {
        self.accessibility = snapshot;
        self
    }

    pub fn with_evaluation(mut self, value: Value) -> Self {
        self.evaluation = value;
        self
    }

    /// Indices of elements matching a driver-native query, in document order.
    pub fn query(&self, selector: &str) -> Vec<usize> {
        if let Some(text) = selector.strip_prefix("text=") {
            let needle = text.trim().to_lowercase();
            return (0..self.elements.len())
                .filter(|&i| {
                    self.elements[i]
                        .text
                        .as_deref()
                        .is_some_and(|t| t.to_lowercase().contains(&needle))
                })
                .collect();
        }
        if selector.starts_with("xpath=") {
            return Vec::new();
        }

        let list: Vec<Vec<(Combinator, Compound)>> = selector
            .split(',')
            .filter_map(|s| parse_complex(s.trim()))
            .collect();

        (0..self.elements.len())
            .filter(|&i| list.iter().any(|parts| self.matches_complex(i, parts)))
            .collect()
    }

    fn parent_node(&self, node: Node) -> Node {
        match node {
            Node::Element(i) => self.elements[i].parent.map(Node::Element).unwrap_or(Node::Body),
            Node::Body | Node::Outside => Node::Outside,
        }
    }

    fn nth_of_type(&self, idx: usize) -> usize {
        let el = &self.elements[idx];
        1 + self.elements[..idx]
            .iter()
            .filter(|o| o.parent == el.parent && o.tag == el.tag)
            .count()
    }

    fn matches_compound(&self, node: Node, c: &Compound) -> bool {
        let idx = match node {
            Node::Element(i) => i,
            Node::Body => return c.tag.as_deref() == Some("body") && c.is_tag_only(),
            Node::Outside => return false,
        };
        let el = &self.elements[idx];
        if let Some(tag) = &c.tag {
            if tag != "*" && *tag != el.tag {
                return false;
            }
        }
        if let Some(id) = &c.id {
            if el.element_id() != Some(id.as_str()) {
                return false;
            }
        }
        let classes = el.classes();
        if !c.classes.iter().all(|cl| classes.contains(cl)) {
            return false;
        }
        for (name, value) in &c.attrs {
            match (el.attributes.get(name), value) {
                (None, _) => return false,
                (Some(actual), Some(expected)) if actual != expected => return false,
                _ => {}
            }
        }
        if let Some(n) = c.nth_of_type {
            if self.nth_of_type(idx) != n {
                return false;
            }
        }
        !c.nots.iter().any(|not| self.matches_compound(node, not))
    }

    fn matches_complex(&self, idx: usize, parts: &[(Combinator, Compound)]) -> bool {
        let Some(((comb, last), rest)) = parts.split_last() else {
            return false;
        };
        self.matches_compound(Node::Element(idx), last)
            && self.match_ancestors(self.parent_node(Node::Element(idx)), rest, *comb)
    }

    fn match_ancestors(&self, start: Node, parts: &[(Combinator, Compound)], comb: Combinator) -> bool {
        let Some(((prev_comb, last), rest)) = parts.split_last() else {
            return true;
        };
        let mut node = start;
        loop {
            if node == Node::Outside {
                return false;
            }
            if self.matches_compound(node, last)
                && self.match_ancestors(self.parent_node(node), rest, *prev_comb)
            {
                return true;
            }
            if comb == Combinator::Child {
                return false;
            }
            node = self.parent_node(node);
        }
    }

    fn is_descendant(&self, idx: usize, ancestor: usize) -> bool {
        let mut current = self.elements[idx].parent;
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.elements[p].parent;
        }
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Element(usize),
    Body,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
    nots: Vec<Compound>,
    nth_of_type: Option<usize>,
}

impl Compound {
    fn is_tag_only(&self) -> bool {
        self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.nots.is_empty()
            && self.nth_of_type.is_none()
    }
}

fn parse_complex(selector: &str) -> Option<Vec<(Combinator, Compound)>> {
    let mut parts = Vec::new();
    let mut comb = Combinator::Descendant;
    for token in split_outside_parens(selector) {
        if token == ">" {
            comb = Combinator::Child;
            continue;
        }
        parts.push((comb, parse_compound(&token)?));
        comb = Combinator::Descendant;
    }
    if parts.is_empty() { None } else { Some(parts) }
}

/// Whitespace split that keeps `:not(a b)` and `[x="a b"]` intact.
fn split_outside_parens(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quoted = false;
    for ch in s.chars() {
        match ch {
            '"' => quoted = !quoted,
            '(' | '[' if !quoted => depth += 1,
            ')' | ']' if !quoted => depth -= 1,
            _ => {}
        }
        if ch.is_whitespace() && depth == 0 && !quoted {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else if ch == '>' && depth == 0 && !quoted {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(">".to_string());
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn read_ident(chars: &[char], i: &mut usize) -> String {
    let start = *i;
    while *i < chars.len() && (chars[*i].is_alphanumeric() || matches!(chars[*i], '-' | '_' | '*')) {
        *i += 1;
    }
    chars[start..*i].iter().collect()
}

fn read_until(chars: &[char], i: &mut usize, open: char, close: char) -> Option<String> {
    let mut depth = 1;
    let start = *i;
    while *i < chars.len() {
        if chars[*i] == open {
            depth += 1;
        } else if chars[*i] == close {
            depth -= 1;
            if depth == 0 {
                let inner: String = chars[start..*i].iter().collect();
                *i += 1;
                return Some(inner);
            }
        }
        *i += 1;
    }
    None
}

fn parse_compound(s: &str) -> Option<Compound> {
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    let mut c = Compound::default();

    let tag = read_ident(&chars, &mut i);
    if !tag.is_empty() {
        c.tag = Some(tag.to_lowercase());
    }

    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                c.id = Some(read_ident(&chars, &mut i));
            }
            '.' => {
                i += 1;
                c.classes.push(read_ident(&chars, &mut i));
            }
            '[' => {
                i += 1;
                let inner = read_until(&chars, &mut i, '[', ']')?;
                match inner.split_once('=') {
                    Some((name, value)) => c.attrs.push((
                        name.trim().to_string(),
                        Some(value.trim().trim_matches('"').trim_matches('\'').to_string()),
                    )),
                    None => c.attrs.push((inner.trim().to_string(), None)),
                }
            }
            ':' => {
                i += 1;
                let pseudo = read_ident(&chars, &mut i);
                if chars.get(i) != Some(&'(') {
                    return None;
                }
                i += 1;
                let arg = read_until(&chars, &mut i, '(', ')')?;
                match pseudo.as_str() {
                    "not" => c.nots.push(parse_compound(arg.trim())?),
                    "nth-of-type" => c.nth_of_type = Some(arg.trim().parse().ok()?),
                    _ => return None,
                }
            }
            _ => return None,
        }
    }
    Some(c)
}

// ============================================================================
// Shared state
// ============================================================================

#[derive(Debug)]
pub struct MockState {
    pub documents: HashMap<String, MockDocument>,
    pub unreachable: HashSet<String>,
    pub memory: MemoryUsage,
    pub screenshot: Vec<u8>,
    /// Number of upcoming `new_context` calls that fail with a transient error
    pub failing_contexts: u32,
    /// `wait_for_timeout` really sleeps instead of returning at once
    pub real_waits: bool,
    pub launches: u32,
    pub calls: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            documents: HashMap::new(),
            unreachable: HashSet::new(),
            memory: MemoryUsage {
                heap_used: 64 * 1024 * 1024,
                heap_total: 128 * 1024 * 1024,
                rss: 256 * 1024 * 1024,
            },
            screenshot: MOCK_PNG.to_vec(),
            failing_contexts: 0,
            real_waits: false,
            launches: 0,
            calls: Vec::new(),
        }
    }
}

/// Scripted browser; cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    state: Arc<Mutex<MockState>>,
    next_page: Arc<AtomicUsize>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, url: &str, document: MockDocument) -> Self {
        self.state().documents.insert(url.to_string(), document);
        self
    }

    pub fn with_unreachable(self, url: &str) -> Self {
        self.state().unreachable.insert(url.to_string());
        self
    }

    pub fn with_real_waits(self) -> Self {
        self.state().real_waits = true;
        self
    }

    pub fn set_heap_used(&self, bytes: u64) {
        self.state().memory.heap_used = bytes;
    }

    pub fn fail_next_contexts(&self, count: u32) {
        self.state().failing_contexts = count;
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every recorded driver call, e.g. `"goto:https://app.test/"`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn was_called(&self, prefix: &str) -> bool {
        self.count_calls(prefix) > 0
    }

    pub fn launches(&self) -> u32 {
        self.state().launches
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowser {
    async fn launch(&self) -> DriverResult<Arc<dyn Browser>> {
        self.state().launches += 1;
        self.record("launch".into());
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl Browser for MockBrowser {
    async fn new_context(&self) -> DriverResult<Box<dyn BrowserContext>> {
        self.record("new_context".into());
        {
            let mut state = self.state();
            if state.failing_contexts > 0 {
                state.failing_contexts -= 1;
                return Err(DriverError::SessionIO("context creation refused".into()));
            }
        }
        Ok(Box::new(MockContext {
            browser: self.clone(),
        }))
    }

    async fn memory_usage(&self) -> DriverResult<MemoryUsage> {
        Ok(self.state().memory)
    }

    async fn collect_garbage(&self) -> DriverResult<()> {
        self.record("collect_garbage".into());
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.record("close_browser".into());
        Ok(())
    }
}

#[derive(Debug)]
struct MockContext {
    browser: MockBrowser,
}

#[async_trait]
impl BrowserContext for MockContext {
    async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
        let id = self.browser.next_page.fetch_add(1, Ordering::Relaxed);
        self.browser.record(format!("new_page:{}", id));
        Ok(Box::new(MockPage {
            browser: self.browser.clone(),
            current: Mutex::new(None),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.browser.record("close_context".into());
        Ok(())
    }
}

#[derive(Debug)]
struct MockPage {
    browser: MockBrowser,
    current: Mutex<Option<String>>,
}

impl MockPage {
    fn url(&self) -> DriverResult<String> {
        self.current
            .lock()
            .ok()
            .and_then(|c| c.clone())
            .ok_or_else(|| DriverError::SessionProtocol {
                command: "page".into(),
                error: "no document loaded".into(),
            })
    }

    /// Run `f` against the loaded document.
    fn with_doc<T>(&self, f: impl FnOnce(&MockDocument) -> DriverResult<T>) -> DriverResult<T> {
        let url = self.url()?;
        let state = self.browser.state();
        let doc = state.documents.get(&url).ok_or_else(|| DriverError::Navigation {
            url: url.clone(),
            reason: "document disappeared".into(),
        })?;
        f(doc)
    }

    fn element(&self, node: &NodeHandle) -> DriverResult<MockElement> {
        let idx: usize = node
            .id
            .parse()
            .map_err(|_| DriverError::Detached(node.id.clone()))?;
        self.with_doc(|doc| {
            doc.elements
                .get(idx)
                .cloned()
                .ok_or_else(|| DriverError::Detached(node.id.clone()))
        })
    }

    fn interact(&self, verb: &str, selector: &str, value: Option<&str>) -> DriverResult<()> {
        let call = match value {
            Some(v) => format!("{}:{}={}", verb, selector, v),
            None => format!("{}:{}", verb, selector),
        };
        self.browser.record(call);
        self.with_doc(|doc| {
            if doc.query(selector).is_empty() {
                Err(DriverError::ElementNotFound(selector.to_string()))
            } else {
                Ok(())
            }
        })
    }

    fn handles(doc: &MockDocument, indices: Vec<usize>) -> Vec<NodeHandle> {
        indices
            .into_iter()
            .map(|i| NodeHandle::new(i.to_string(), doc.elements[i].tag.clone()))
            .collect()
    }
}

#[async_trait]
impl Page for MockPage {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.browser.record(format!("goto:{}", url));
        let known = {
            let state = self.browser.state();
            !state.unreachable.contains(url) && state.documents.contains_key(url)
        };
        if !known {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(url.to_string());
        }
        Ok(())
    }

    async fn reload(&self) -> DriverResult<()> {
        self.browser.record("reload".into());
        self.url().map(|_| ())
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.url()
    }

    async fn title(&self) -> DriverResult<String> {
        self.with_doc(|doc| Ok(doc.title.clone()))
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        self.interact("click", selector, None)
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.interact("fill", selector, Some(value))
    }

    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.interact("select", selector, Some(value))
    }

    async fn hover(&self, selector: &str) -> DriverResult<()> {
        self.interact("hover", selector, None)
    }

    async fn check(&self, selector: &str) -> DriverResult<()> {
        self.interact("check", selector, None)
    }

    async fn uncheck(&self, selector: &str) -> DriverResult<()> {
        self.interact("uncheck", selector, None)
    }

    async fn submit(&self, selector: &str) -> DriverResult<()> {
        self.interact("submit", selector, None)
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> DriverResult<()> {
        self.browser.record(format!("wait_for_selector:{}", selector));
        let reached = self.with_doc(|doc| {
            let matches = doc.query(selector);
            let shown = |i: &usize| {
                let el = &doc.elements[*i];
                el.visible && el.bounding_box.is_some_and(|b| !b.is_empty())
            };
            Ok(match state {
                ElementState::Attached => !matches.is_empty(),
                ElementState::Detached => matches.is_empty(),
                ElementState::Visible => matches.iter().any(shown),
                ElementState::Hidden => !matches.iter().any(shown),
            })
        })?;
        if reached {
            Ok(())
        } else {
            Err(DriverError::Timeout {
                what: format!("selector '{}' to be {:?}", selector, state).to_lowercase(),
                ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn wait_for_timeout(&self, duration: Duration) -> DriverResult<()> {
        self.browser
            .record(format!("wait:{}", duration.as_millis()));
        let real = self.browser.state().real_waits;
        if real {
            tokio::time::sleep(duration).await;
        }
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState) -> DriverResult<()> {
        self.browser.record(format!("load_state:{:?}", state));
        Ok(())
    }

    async fn query(&self, selector: &str) -> DriverResult<Vec<NodeHandle>> {
        self.with_doc(|doc| Ok(Self::handles(doc, doc.query(selector))))
    }

    async fn query_within(
        &self,
        parent: &NodeHandle,
        selector: &str,
    ) -> DriverResult<Vec<NodeHandle>> {
        let ancestor: usize = parent
            .id
            .parse()
            .map_err(|_| DriverError::Detached(parent.id.clone()))?;
        self.with_doc(|doc| {
            let inside = doc
                .query(selector)
                .into_iter()
                .filter(|&i| doc.is_descendant(i, ancestor))
                .collect();
            Ok(Self::handles(doc, inside))
        })
    }

    async fn describe(&self, node: &NodeHandle) -> DriverResult<NodeDescription> {
        let idx: usize = node
            .id
            .parse()
            .map_err(|_| DriverError::Detached(node.id.clone()))?;
        self.with_doc(|doc| {
            let el = doc
                .elements
                .get(idx)
                .ok_or_else(|| DriverError::Detached(node.id.clone()))?;
            if el.detached {
                return Err(DriverError::Detached(node.id.clone()));
            }
            let mut path = Vec::new();
            let mut current = Some(idx);
            while let Some(i) = current {
                path.push(PathSegment {
                    tag: doc.elements[i].tag.clone(),
                    nth_of_type: doc.nth_of_type(i),
                });
                current = doc.elements[i].parent;
            }
            path.reverse();
            Ok(NodeDescription {
                tag: el.tag.clone(),
                id: el.attributes.get("id").cloned(),
                name: el.attributes.get("name").cloned(),
                classes: el.classes(),
                path,
            })
        })
    }

    async fn bounding_box(&self, node: &NodeHandle) -> DriverResult<Option<BoundingBox>> {
        Ok(self.element(node)?.bounding_box)
    }

    async fn is_visible(&self, node: &NodeHandle) -> DriverResult<bool> {
        Ok(self.element(node)?.visible)
    }

    async fn node_text(&self, node: &NodeHandle) -> DriverResult<Option<String>> {
        Ok(self.element(node)?.text)
    }

    async fn attributes(&self, node: &NodeHandle) -> DriverResult<BTreeMap<String, String>> {
        Ok(self.element(node)?.attributes)
    }

    async fn text_content(&self, selector: &str) -> DriverResult<Option<String>> {
        self.with_doc(|doc| {
            Ok(doc
                .query(selector)
                .first()
                .and_then(|&i| doc.elements[i].text.clone()))
        })
    }

    async fn attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>> {
        self.with_doc(|doc| {
            Ok(doc
                .query(selector)
                .first()
                .and_then(|&i| doc.elements[i].attributes.get(name).cloned()))
        })
    }

    async fn evaluate(&self, _script: &str) -> DriverResult<Value> {
        self.browser.record("evaluate".into());
        self.with_doc(|doc| Ok(doc.evaluation.clone()))
    }

    async fn accessibility_snapshot(&self) -> DriverResult<Option<Value>> {
        self.with_doc(|doc| Ok(doc.accessibility.clone()))
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        self.browser.record("screenshot".into());
        Ok(self.browser.state().screenshot.clone())
    }

    async fn wait_for_response(
        &self,
        url_fragment: &str,
        timeout: Duration,
    ) -> DriverResult<ObservedResponse> {
        self.with_doc(|doc| {
            doc.responses
                .iter()
                .find(|r| r.url.contains(url_fragment))
                .cloned()
                .ok_or_else(|| DriverError::Timeout {
                    what: format!("response matching '{}'", url_fragment),
                    ms: timeout.as_millis() as u64,
                })
        })
    }

    async fn wait_for_request(
        &self,
        url_fragment: &str,
        timeout: Duration,
    ) -> DriverResult<ObservedRequest> {
        self.with_doc(|doc| {
            doc.requests
                .iter()
                .find(|r| r.url.contains(url_fragment))
                .cloned()
                .ok_or_else(|| DriverError::Timeout {
                    what: format!("request matching '{}'", url_fragment),
                    ms: timeout.as_millis() as u64,
                })
        })
    }

    async fn close(&self) -> DriverResult<()> {
        self.browser.record("close_page".into());
        Ok(())
    }
}
