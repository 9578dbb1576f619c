use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::artifact::queue::ScreenshotQueue;
use crate::browser::driver::{ElementState, Page};
use crate::error::{DriverError, EngineError, EngineResult};
use crate::selector::resolve_selector;
use crate::spec::context::ExecutionConfig;
use crate::spec::spec_model::{Assertion, AssertionLog, AssertionType};

/// Reads the navigation-timing milestones used by `performanceMetric`.
pub const NAVIGATION_TIMING_SCRIPT: &str = "(() => { const t = performance.timing; \
     return { navigationStart: t.navigationStart, \
     domContentLoadedEventEnd: t.domContentLoadedEventEnd, \
     loadEventEnd: t.loadEventEnd }; })()";

/// A passing check with the values it compared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Check {
    pub expected: Option<String>,
    pub observed: Option<String>,
}

impl Check {
    fn new(expected: impl Into<String>, observed: impl Into<String>) -> Self {
        Self {
            expected: Some(expected.into()),
            observed: Some(observed.into()),
        }
    }
}

/// Evaluates assertions for one case, queueing diagnostic screenshots.
pub struct AssertionEvaluator<'a> {
    page: &'a dyn Page,
    config: &'a ExecutionConfig,
    screenshots: &'a ScreenshotQueue,
    test_case_id: &'a str,
    /// 1-based ordinal of the last evaluated assertion; keeps labels unique
    evaluated: AtomicUsize,
}

impl<'a> AssertionEvaluator<'a> {
    pub fn new(
        page: &'a dyn Page,
        config: &'a ExecutionConfig,
        screenshots: &'a ScreenshotQueue,
        test_case_id: &'a str,
    ) -> Self {
        Self {
            page,
            config,
            screenshots,
            test_case_id,
            evaluated: AtomicUsize::new(0),
        }
    }

    /// Evaluate one assertion into its log entry. Never fails: errors are
    /// recorded on the entry so sibling assertions still run.
    pub async fn evaluate(&self, assertion: &Assertion) -> AssertionLog {
        let kind = assertion.assertion_type;
        let ordinal = self.evaluated.fetch_add(1, Ordering::Relaxed) + 1;
        let outcome = self.check(assertion).await;

        let (passed, expected, observed, error) = match outcome {
            Ok(check) => (true, check.expected, check.observed, None),
            Err(EngineError::AssertionFailed {
                expected, observed, ..
            }) => {
                let message = format!("expected {}, observed {}", expected, observed);
                (false, Some(expected), Some(observed), Some(message))
            }
            Err(e) => (false, None, None, Some(e.to_string())),
        };

        let screenshot = if !passed {
            let label = format!("failed-{}-{}-{}", kind, ordinal, Utc::now().timestamp_millis());
            self.capture(&label).await
        } else if self.config.capture_success_screenshots {
            self.capture(&format!("success-{}-{}", kind, ordinal)).await
        } else {
            None
        };

        if passed {
            debug!(case = self.test_case_id, assertion = %kind, "assertion passed");
        } else {
            debug!(case = self.test_case_id, assertion = %kind, error = ?error, "assertion failed");
        }

        AssertionLog {
            assertion_type: kind,
            passed,
            expected,
            observed,
            error,
            screenshot,
            timestamp: Utc::now(),
        }
    }

    /// Run the type-specific comparison. `AssertionFailed` carries the
    /// expected and observed values.
    pub async fn check(&self, a: &Assertion) -> EngineResult<Check> {
        let kind = a.assertion_type;
        let wait = Duration::from_millis(a.timeout.unwrap_or(self.config.assertion_timeout_ms));

        match kind {
            AssertionType::ElementExists => {
                let sel = required_selector(a)?;
                self.wait_for(kind, &sel, ElementState::Attached, wait).await?;
                Ok(Check::new("attached", "attached"))
            }

            AssertionType::ElementVisible => {
                let sel = required_selector(a)?;
                self.wait_for(kind, &sel, ElementState::Visible, wait).await?;
                match &a.expected_value {
                    Some(expected) => {
                        let text = self.page.text_content(&sel).await?.unwrap_or_default();
                        compare(kind, expected.trim(), text.trim(), |e, o| e == o)
                    }
                    None => Ok(Check::new("visible", "visible")),
                }
            }

            AssertionType::TextEquals | AssertionType::TextContains => {
                let sel = required_selector(a)?;
                let expected = required(a.expected_value.as_deref(), kind, "expectedValue")?;
                let text = self
                    .page
                    .text_content(&sel)
                    .await?
                    .ok_or_else(|| failed(kind, expected, "<no matching element>"))?;
                if kind == AssertionType::TextEquals {
                    compare(kind, expected.trim(), text.trim(), |e, o| e == o)
                } else {
                    compare(kind, expected, &text, |e, o| o.contains(e))
                }
            }

            AssertionType::UrlEquals | AssertionType::UrlContains => {
                let expected = required(a.expected_value.as_deref(), kind, "expectedValue")?;
                let url = self.page.current_url().await?;
                if kind == AssertionType::UrlEquals {
                    compare(kind, expected, &url, |e, o| e == o)
                } else {
                    compare(kind, expected, &url, |e, o| o.contains(e))
                }
            }

            AssertionType::TitleContains => {
                let expected = required(a.expected_value.as_deref(), kind, "expectedValue")?;
                let title = self.page.title().await?;
                compare(kind, expected, &title, |e, o| o.contains(e))
            }

            AssertionType::AttributeEquals | AssertionType::AttributeContains => {
                let sel = required_selector(a)?;
                let name = required(a.attribute.as_deref(), kind, "attribute")?;
                let expected = required(a.expected_value.as_deref(), kind, "expectedValue")?;
                let value = self
                    .page
                    .attribute(&sel, name)
                    .await?
                    .ok_or_else(|| failed(kind, expected, format!("<no attribute '{}'>", name)))?;
                if kind == AssertionType::AttributeEquals {
                    compare(kind, expected, &value, |e, o| e == o)
                } else {
                    compare(kind, expected, &value, |e, o| o.contains(e))
                }
            }

            AssertionType::HttpStatus => {
                let fragment = required(a.url_pattern.as_deref(), kind, "urlPattern")?;
                let accepted = a.accepted_statuses.clone().unwrap_or_else(|| vec![200]);
                let expected = format!("{:?}", accepted);
                let response = self
                    .page
                    .wait_for_response(fragment, wait)
                    .await
                    .map_err(|e| timed_out(kind, &expected, e))?;

                let ordinal = self.evaluated.load(Ordering::Relaxed);
                self.capture(&format!("http-status-{}-{}", response.status, ordinal)).await;
                if accepted.contains(&response.status) {
                    Ok(Check::new(expected, response.status.to_string()))
                } else {
                    Err(failed(kind, expected, response.status.to_string()))
                }
            }

            AssertionType::ElementCount => {
                let sel = required_selector(a)?;
                let raw = required(a.expected_value.as_deref(), kind, "expectedValue")?;
                let expected: usize = raw.trim().parse().map_err(|_| {
                    EngineError::InvalidExpectedValue {
                        assertion: kind,
                        value: raw.to_string(),
                    }
                })?;
                let count = self.page.query(&sel).await?.len();
                if count == expected {
                    Ok(Check::new(expected.to_string(), count.to_string()))
                } else {
                    Err(failed(kind, expected.to_string(), count.to_string()))
                }
            }

            AssertionType::NetworkRequest => {
                let fragment = required(a.url_pattern.as_deref(), kind, "urlPattern")?;
                let expected = match &a.method {
                    Some(m) => format!("{} {}", m.to_uppercase(), fragment),
                    None => format!("request to {}", fragment),
                };
                let request = self
                    .page
                    .wait_for_request(fragment, wait)
                    .await
                    .map_err(|e| timed_out(kind, &expected, e))?;
                let observed = format!("{} {}", request.method.to_uppercase(), request.url);
                match &a.method {
                    Some(m) if !m.eq_ignore_ascii_case(&request.method) => {
                        Err(failed(kind, expected, observed))
                    }
                    _ => Ok(Check::new(expected, observed)),
                }
            }

            AssertionType::PerformanceMetric => {
                let threshold = match a.expected_value.as_deref() {
                    Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
                        EngineError::InvalidExpectedValue {
                            assertion: kind,
                            value: raw.to_string(),
                        }
                    })?,
                    None => self.config.performance_threshold_ms as f64,
                };
                let expected = format!("load time <= {}ms", threshold);
                let timing = self.page.evaluate(NAVIGATION_TIMING_SCRIPT).await?;
                let load_ms = load_time_ms(&timing)
                    .ok_or_else(|| failed(kind, &expected, "navigation timing unavailable"))?;
                let observed = format!("{}ms", load_ms);
                if load_ms <= threshold {
                    Ok(Check::new(expected, observed))
                } else {
                    Err(failed(kind, expected, observed))
                }
            }

            AssertionType::Accessibility => {
                let snapshot = self.page.accessibility_snapshot().await?;
                if snapshot.as_ref().is_some_and(|s| !is_empty_snapshot(s)) {
                    Ok(Check::new("non-empty accessibility tree", "present"))
                } else {
                    Err(failed(kind, "non-empty accessibility tree", "empty"))
                }
            }
        }
    }

    async fn wait_for(
        &self,
        kind: AssertionType,
        selector: &str,
        state: ElementState,
        wait: Duration,
    ) -> EngineResult<()> {
        self.page
            .wait_for_selector(selector, state, wait)
            .await
            .map_err(|e| {
                let expected = format!("'{}' {}", selector, state_name(state));
                timed_out(kind, &expected, e)
            })
    }

    /// Screenshot the page into the queue; failures only log.
    async fn capture(&self, label: &str) -> Option<String> {
        match self.page.screenshot().await {
            Ok(png) => {
                self.screenshots.push(self.test_case_id, label, png);
                Some(label.to_string())
            }
            Err(e) => {
                warn!(case = self.test_case_id, label, error = %e, "assertion screenshot failed");
                None
            }
        }
    }
}

fn required<'v>(value: Option<&'v str>, kind: AssertionType, field: &'static str) -> EngineResult<&'v str> {
    value.ok_or(EngineError::MissingField {
        assertion: kind,
        field,
    })
}

fn required_selector(a: &Assertion) -> EngineResult<String> {
    let sel = resolve_selector(a.selector.as_ref());
    if sel.is_empty() {
        return Err(EngineError::MissingField {
            assertion: a.assertion_type,
            field: "selector",
        });
    }
    Ok(sel)
}

fn failed(kind: AssertionType, expected: impl Into<String>, observed: impl Into<String>) -> EngineError {
    EngineError::AssertionFailed {
        assertion: kind,
        expected: expected.into(),
        observed: observed.into(),
    }
}

fn compare(
    kind: AssertionType,
    expected: &str,
    observed: &str,
    ok: impl Fn(&str, &str) -> bool,
) -> EngineResult<Check> {
    if ok(expected, observed) {
        Ok(Check::new(expected, observed))
    } else {
        Err(failed(kind, expected, observed))
    }
}

/// Driver timeouts become assertion failures; anything else propagates.
fn timed_out(kind: AssertionType, expected: &str, err: DriverError) -> EngineError {
    match err {
        DriverError::Timeout { ms, .. } => failed(kind, expected, format!("nothing within {}ms", ms)),
        other => EngineError::Driver(other),
    }
}

fn state_name(state: ElementState) -> &'static str {
    match state {
        ElementState::Attached => "attached",
        ElementState::Detached => "detached",
        ElementState::Visible => "visible",
        ElementState::Hidden => "hidden",
    }
}

/// `loadEventEnd - navigationStart`, when both are present and set.
pub fn load_time_ms(timing: &Value) -> Option<f64> {
    let start = timing.get("navigationStart")?.as_f64()?;
    let end = timing.get("loadEventEnd")?.as_f64()?;
    if end <= 0.0 || end < start {
        return None;
    }
    Some(end - start)
}

fn is_empty_snapshot(snapshot: &Value) -> bool {
    match snapshot {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
