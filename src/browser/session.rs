use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use crate::browser::driver::{
    BoundingBox, Browser, BrowserContext, BrowserLauncher, ElementState, LoadState,
    MemoryUsage, NodeDescription, NodeHandle, ObservedRequest, ObservedResponse, Page,
};
use crate::error::{DriverError, DriverResult};

// ============================================================================
// Wire protocol (one JSON object per line)
// ============================================================================

/// Interaction performed by the `action` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    Click,
    Fill,
    SelectOption,
    Hover,
    Check,
    Uncheck,
    Submit,
}

/// Request sent to browser_server.js over stdin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BrowserRequest {
    NewContext,
    CloseContext {
        context: String,
    },
    NewPage {
        context: String,
    },
    ClosePage {
        page: String,
    },
    Navigate {
        page: String,
        url: String,
    },
    Reload {
        page: String,
    },
    CurrentUrl {
        page: String,
    },
    Title {
        page: String,
    },
    Action {
        page: String,
        action: Interaction,
        selector: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    WaitForSelector {
        page: String,
        selector: String,
        state: ElementState,
        timeout_ms: u64,
    },
    Wait {
        page: String,
        duration_ms: u64,
    },
    WaitForLoadState {
        page: String,
        state: LoadState,
    },
    Query {
        page: String,
        selector: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        within: Option<String>,
    },
    Describe {
        page: String,
        node: String,
    },
    BoundingBox {
        page: String,
        node: String,
    },
    IsVisible {
        page: String,
        node: String,
    },
    NodeText {
        page: String,
        node: String,
    },
    Attributes {
        page: String,
        node: String,
    },
    TextContent {
        page: String,
        selector: String,
    },
    Attribute {
        page: String,
        selector: String,
        name: String,
    },
    Evaluate {
        page: String,
        script: String,
    },
    Accessibility {
        page: String,
    },
    Screenshot {
        page: String,
    },
    WaitForResponse {
        page: String,
        url_fragment: String,
        timeout_ms: u64,
    },
    WaitForRequest {
        page: String,
        url_fragment: String,
        timeout_ms: u64,
    },
    Memory,
    CollectGarbage,
    Quit,
}

impl BrowserRequest {
    /// Command name as it appears on the wire, used in error messages.
    pub fn command_name(&self) -> &'static str {
        match self {
            BrowserRequest::NewContext => "new_context",
            BrowserRequest::CloseContext { .. } => "close_context",
            BrowserRequest::NewPage { .. } => "new_page",
            BrowserRequest::ClosePage { .. } => "close_page",
            BrowserRequest::Navigate { .. } => "navigate",
            BrowserRequest::Reload { .. } => "reload",
            BrowserRequest::CurrentUrl { .. } => "current_url",
            BrowserRequest::Title { .. } => "title",
            BrowserRequest::Action { .. } => "action",
            BrowserRequest::WaitForSelector { .. } => "wait_for_selector",
            BrowserRequest::Wait { .. } => "wait",
            BrowserRequest::WaitForLoadState { .. } => "wait_for_load_state",
            BrowserRequest::Query { .. } => "query",
            BrowserRequest::Describe { .. } => "describe",
            BrowserRequest::BoundingBox { .. } => "bounding_box",
            BrowserRequest::IsVisible { .. } => "is_visible",
            BrowserRequest::NodeText { .. } => "node_text",
            BrowserRequest::Attributes { .. } => "attributes",
            BrowserRequest::TextContent { .. } => "text_content",
            BrowserRequest::Attribute { .. } => "attribute",
            BrowserRequest::Evaluate { .. } => "evaluate",
            BrowserRequest::Accessibility { .. } => "accessibility",
            BrowserRequest::Screenshot { .. } => "screenshot",
            BrowserRequest::WaitForResponse { .. } => "wait_for_response",
            BrowserRequest::WaitForRequest { .. } => "wait_for_request",
            BrowserRequest::Memory => "memory",
            BrowserRequest::CollectGarbage => "collect_garbage",
            BrowserRequest::Quit => "quit",
        }
    }
}

/// A request paired with the id its response will echo back.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub request: &'a BrowserRequest,
}

/// Response received from browser_server.js over stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserResponse {
    #[serde(default)]
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub ready: Option<bool>,
}

impl BrowserResponse {
    /// Decode the `data` payload, treating a missing payload as JSON null.
    pub fn decode<T: DeserializeOwned>(self, command: &str) -> DriverResult<T> {
        serde_json::from_value(self.data.unwrap_or(Value::Null)).map_err(|e| DriverError::Json {
            context: format!("{} response", command),
            source: e,
        })
    }
}

// ============================================================================
// Launcher
// ============================================================================

/// Launches `browser_server.js` with Node.js.
#[derive(Debug, Clone)]
pub struct SessionLauncher {
    pub node_binary: String,
    pub script: PathBuf,
}

impl SessionLauncher {
    pub fn new(node_binary: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            node_binary: node_binary.into(),
            script: script.into(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for SessionLauncher {
    async fn launch(&self) -> DriverResult<Arc<dyn Browser>> {
        let session = BrowserSession::launch(&self.node_binary, &self.script).await?;
        Ok(Arc::new(session))
    }
}

// ============================================================================
// Connection: request/response multiplexing over the child's pipes
// ============================================================================

type Pending = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<BrowserResponse>>>>;

struct Connection {
    stdin: Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
    child: Mutex<Child>,
}

impl Connection {
    /// Send a request and wait for the response carrying the same id.
    async fn send(&self, request: &BrowserRequest) -> DriverResult<BrowserResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&Envelope { id, request }).map_err(|e| {
            DriverError::Json {
                context: "BrowserRequest".into(),
                source: e,
            }
        })?;

        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }

        {
            let mut stdin = self.stdin.lock().await;
            let write = async {
                stdin.write_all(json.as_bytes()).await?;
                stdin.write_all(b"\n").await?;
                stdin.flush().await
            };
            if let Err(e) = write.await {
                if let Ok(mut pending) = self.pending.lock() {
                    pending.remove(&id);
                }
                return Err(DriverError::SessionIO(format!(
                    "Failed to write to browser_server.js stdin: {}",
                    e
                )));
            }
        }

        rx.await.map_err(|_| {
            DriverError::SessionIO(
                "No response from browser_server.js (process may have died)".into(),
            )
        })
    }

    /// Send a request and verify it succeeded.
    async fn send_ok(&self, request: &BrowserRequest) -> DriverResult<BrowserResponse> {
        let response = self.send(request).await?;
        if !response.ok {
            return Err(DriverError::SessionProtocol {
                command: request.command_name().into(),
                error: response.error.unwrap_or_else(|| "Unknown error".into()),
            });
        }
        Ok(response)
    }

    async fn call<T: DeserializeOwned>(&self, request: BrowserRequest) -> DriverResult<T> {
        let response = self.send_ok(&request).await?;
        response.decode(request.command_name())
    }

    async fn call_unit(&self, request: BrowserRequest) -> DriverResult<()> {
        self.send_ok(&request).await.map(|_| ())
    }
}

/// Route each stdout line to the waiter registered under its id.
async fn read_responses(stdout: BufReader<ChildStdout>, pending: Pending) {
    let mut lines = stdout.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let response: BrowserResponse = match serde_json::from_str(line) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Unparseable line from browser_server.js: {}", e);
                        continue;
                    }
                };
                let Some(id) = response.id else {
                    debug!("Dropping unsolicited browser_server.js message");
                    continue;
                };
                let waiter = pending.lock().ok().and_then(|mut p| p.remove(&id));
                if let Some(tx) = waiter {
                    let _ = tx.send(response);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Reading browser_server.js stdout failed: {}", e);
                break;
            }
        }
    }
    // Dropping the senders wakes every waiter with an error.
    if let Ok(mut p) = pending.lock() {
        p.clear();
    }
}

// ============================================================================
// BrowserSession
// ============================================================================

/// A persistent browser session backed by browser_server.js.
///
/// Launches a long-lived Node.js process that keeps a Chromium browser open.
/// Commands are sent as NDJSON over stdin, responses read from stdout and
/// matched to their request by id, so several contexts can drive the same
/// process concurrently.
pub struct BrowserSession {
    conn: Arc<Connection>,
}

impl BrowserSession {
    /// Launch a new browser session by spawning browser_server.js.
    pub async fn launch(node_binary: &str, script: &std::path::Path) -> DriverResult<Self> {
        let mut child = Command::new(node_binary)
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::SubprocessSpawn {
                script: script.display().to_string(),
                source: e,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            DriverError::SessionIO("Failed to capture stdin of browser_server.js".into())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            DriverError::SessionIO("Failed to capture stdout of browser_server.js".into())
        })?;

        let mut reader = BufReader::new(stdout);

        // Wait for the ready signal
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| DriverError::SessionIO(format!("Failed to read ready signal: {}", e)))?;

        let response: BrowserResponse =
            serde_json::from_str(line.trim()).map_err(|e| DriverError::Json {
                context: "browser_server.js ready signal".into(),
                source: e,
            })?;

        if !response.ok || response.ready != Some(true) {
            return Err(DriverError::SessionProtocol {
                command: "launch".into(),
                error: "Did not receive ready signal from browser_server.js".into(),
            });
        }

        let pending: Pending = Arc::default();
        tokio::spawn(read_responses(reader, pending.clone()));

        Ok(BrowserSession {
            conn: Arc::new(Connection {
                stdin: Mutex::new(stdin),
                pending,
                next_id: AtomicU64::new(1),
                child: Mutex::new(child),
            }),
        })
    }
}

#[async_trait]
impl Browser for BrowserSession {
    async fn new_context(&self) -> DriverResult<Box<dyn BrowserContext>> {
        let context_id: String = self.conn.call(BrowserRequest::NewContext).await?;
        Ok(Box::new(SessionContext {
            conn: self.conn.clone(),
            context_id,
        }))
    }

    async fn memory_usage(&self) -> DriverResult<MemoryUsage> {
        self.conn.call(BrowserRequest::Memory).await
    }

    async fn collect_garbage(&self) -> DriverResult<()> {
        self.conn.call_unit(BrowserRequest::CollectGarbage).await
    }

    async fn close(&self) -> DriverResult<()> {
        // Best-effort quit, the process may already be gone
        let _ = self.conn.send(&BrowserRequest::Quit).await;
        let mut child = self.conn.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(_) => Ok(()),
            Err(_) => child
                .kill()
                .await
                .map_err(|e| DriverError::SessionIO(format!("Failed to kill browser: {}", e))),
        }
    }
}

struct SessionContext {
    conn: Arc<Connection>,
    context_id: String,
}

#[async_trait]
impl BrowserContext for SessionContext {
    async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
        let page_id: String = self
            .conn
            .call(BrowserRequest::NewPage {
                context: self.context_id.clone(),
            })
            .await?;
        Ok(Box::new(SessionPage {
            conn: self.conn.clone(),
            page_id,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.conn
            .call_unit(BrowserRequest::CloseContext {
                context: self.context_id.clone(),
            })
            .await
    }
}

struct SessionPage {
    conn: Arc<Connection>,
    page_id: String,
}

impl SessionPage {
    fn page(&self) -> String {
        self.page_id.clone()
    }

    async fn interact(
        &self,
        action: Interaction,
        selector: &str,
        value: Option<&str>,
    ) -> DriverResult<()> {
        self.conn
            .call_unit(BrowserRequest::Action {
                page: self.page(),
                action,
                selector: selector.to_string(),
                value: value.map(str::to_string),
            })
            .await
    }
}

#[async_trait]
impl Page for SessionPage {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.conn
            .call_unit(BrowserRequest::Navigate {
                page: self.page(),
                url: url.to_string(),
            })
            .await
            .map_err(|e| match e {
                DriverError::SessionProtocol { error, .. } => DriverError::Navigation {
                    url: url.to_string(),
                    reason: error,
                },
                other => other,
            })
    }

    async fn reload(&self) -> DriverResult<()> {
        self.conn
            .call_unit(BrowserRequest::Reload { page: self.page() })
            .await
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.conn
            .call(BrowserRequest::CurrentUrl { page: self.page() })
            .await
    }

    async fn title(&self) -> DriverResult<String> {
        self.conn.call(BrowserRequest::Title { page: self.page() }).await
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        self.interact(Interaction::Click, selector, None).await
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.interact(Interaction::Fill, selector, Some(value)).await
    }

    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.interact(Interaction::SelectOption, selector, Some(value))
            .await
    }

    async fn hover(&self, selector: &str) -> DriverResult<()> {
        self.interact(Interaction::Hover, selector, None).await
    }

    async fn check(&self, selector: &str) -> DriverResult<()> {
        self.interact(Interaction::Check, selector, None).await
    }

    async fn uncheck(&self, selector: &str) -> DriverResult<()> {
        self.interact(Interaction::Uncheck, selector, None).await
    }

    async fn submit(&self, selector: &str) -> DriverResult<()> {
        self.interact(Interaction::Submit, selector, None).await
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> DriverResult<()> {
        self.conn
            .call_unit(BrowserRequest::WaitForSelector {
                page: self.page(),
                selector: selector.to_string(),
                state,
                timeout_ms: timeout.as_millis() as u64,
            })
            .await
    }

    async fn wait_for_timeout(&self, duration: Duration) -> DriverResult<()> {
        self.conn
            .call_unit(BrowserRequest::Wait {
                page: self.page(),
                duration_ms: duration.as_millis() as u64,
            })
            .await
    }

    async fn wait_for_load_state(&self, state: LoadState) -> DriverResult<()> {
        self.conn
            .call_unit(BrowserRequest::WaitForLoadState {
                page: self.page(),
                state,
            })
            .await
    }

    async fn query(&self, selector: &str) -> DriverResult<Vec<NodeHandle>> {
        self.conn
            .call(BrowserRequest::Query {
                page: self.page(),
                selector: selector.to_string(),
                within: None,
            })
            .await
    }

    async fn query_within(
        &self,
        parent: &NodeHandle,
        selector: &str,
    ) -> DriverResult<Vec<NodeHandle>> {
        self.conn
            .call(BrowserRequest::Query {
                page: self.page(),
                selector: selector.to_string(),
                within: Some(parent.id.clone()),
            })
            .await
    }

    async fn describe(&self, node: &NodeHandle) -> DriverResult<NodeDescription> {
        self.conn
            .call(BrowserRequest::Describe {
                page: self.page(),
                node: node.id.clone(),
            })
            .await
            .map_err(|e| match e {
                DriverError::SessionProtocol { .. } => DriverError::Detached(node.id.clone()),
                other => other,
            })
    }

    async fn bounding_box(&self, node: &NodeHandle) -> DriverResult<Option<BoundingBox>> {
        self.conn
            .call(BrowserRequest::BoundingBox {
                page: self.page(),
                node: node.id.clone(),
            })
            .await
    }

    async fn is_visible(&self, node: &NodeHandle) -> DriverResult<bool> {
        self.conn
            .call(BrowserRequest::IsVisible {
                page: self.page(),
                node: node.id.clone(),
            })
            .await
    }

    async fn node_text(&self, node: &NodeHandle) -> DriverResult<Option<String>> {
        self.conn
            .call(BrowserRequest::NodeText {
                page: self.page(),
                node: node.id.clone(),
            })
            .await
    }

    async fn attributes(&self, node: &NodeHandle) -> DriverResult<BTreeMap<String, String>> {
        self.conn
            .call(BrowserRequest::Attributes {
                page: self.page(),
                node: node.id.clone(),
            })
            .await
    }

    async fn text_content(&self, selector: &str) -> DriverResult<Option<String>> {
        self.conn
            .call(BrowserRequest::TextContent {
                page: self.page(),
                selector: selector.to_string(),
            })
            .await
    }

    async fn attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>> {
        self.conn
            .call(BrowserRequest::Attribute {
                page: self.page(),
                selector: selector.to_string(),
                name: name.to_string(),
            })
            .await
    }

    async fn evaluate(&self, script: &str) -> DriverResult<Value> {
        self.conn
            .call(BrowserRequest::Evaluate {
                page: self.page(),
                script: script.to_string(),
            })
            .await
    }

    async fn accessibility_snapshot(&self) -> DriverResult<Option<Value>> {
        self.conn
            .call(BrowserRequest::Accessibility { page: self.page() })
            .await
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        let encoded: String = self
            .conn
            .call(BrowserRequest::Screenshot { page: self.page() })
            .await?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| DriverError::SessionIO(format!("Screenshot is not valid base64: {}", e)))
    }

    async fn wait_for_response(
        &self,
        url_fragment: &str,
        timeout: Duration,
    ) -> DriverResult<ObservedResponse> {
        self.conn
            .call(BrowserRequest::WaitForResponse {
                page: self.page(),
                url_fragment: url_fragment.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
            .await
    }

    async fn wait_for_request(
        &self,
        url_fragment: &str,
        timeout: Duration,
    ) -> DriverResult<ObservedRequest> {
        self.conn
            .call(BrowserRequest::WaitForRequest {
                page: self.page(),
                url_fragment: url_fragment.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
            .await
    }

    async fn close(&self) -> DriverResult<()> {
        self.conn
            .call_unit(BrowserRequest::ClosePage { page: self.page() })
            .await
    }
}
