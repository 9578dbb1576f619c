use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::selector::Selector;

// ============================================================================
// Declarative suite model
// ============================================================================

/// A simulated user action. The set is closed; every variant is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Navigate,
    Click,
    Type,
    Select,
    Check,
    Uncheck,
    Clear,
    Submit,
    Hover,
    Wait,
    Screenshot,
    Assert,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Navigate => "navigate",
            Action::Click => "click",
            Action::Type => "type",
            Action::Select => "select",
            Action::Check => "check",
            Action::Uncheck => "uncheck",
            Action::Clear => "clear",
            Action::Submit => "submit",
            Action::Hover => "hover",
            Action::Wait => "wait",
            Action::Screenshot => "screenshot",
            Action::Assert => "assert",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssertionType {
    ElementExists,
    ElementVisible,
    TextEquals,
    TextContains,
    UrlEquals,
    UrlContains,
    TitleContains,
    AttributeEquals,
    AttributeContains,
    HttpStatus,
    ElementCount,
    NetworkRequest,
    PerformanceMetric,
    Accessibility,
}

impl AssertionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssertionType::ElementExists => "elementExists",
            AssertionType::ElementVisible => "elementVisible",
            AssertionType::TextEquals => "textEquals",
            AssertionType::TextContains => "textContains",
            AssertionType::UrlEquals => "urlEquals",
            AssertionType::UrlContains => "urlContains",
            AssertionType::TitleContains => "titleContains",
            AssertionType::AttributeEquals => "attributeEquals",
            AssertionType::AttributeContains => "attributeContains",
            AssertionType::HttpStatus => "httpStatus",
            AssertionType::ElementCount => "elementCount",
            AssertionType::NetworkRequest => "networkRequest",
            AssertionType::PerformanceMetric => "performanceMetric",
            AssertionType::Accessibility => "accessibility",
        }
    }
}

impl fmt::Display for AssertionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered unit of a test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_number: u32,

    pub action: Action,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,

    /// Literal value (URL for navigate, text for type, option for select)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default)]
    pub expected_result: String,

    /// Milliseconds; bounds every driver call of the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default)]
    pub wait_for_navigation: bool,

    /// Fixture key looked up when `value` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_valid_data: Option<bool>,
}

impl Step {
    pub fn new(step_number: u32, action: Action) -> Self {
        Self {
            step_number,
            action,
            selector: None,
            value: None,
            expected_result: String::new(),
            timeout: None,
            wait_for_navigation: false,
            test_data: None,
            use_valid_data: None,
        }
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A verifiable expectation about page state after all steps ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    pub assertion_type: AssertionType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<String>,

    /// Attribute name for attributeEquals / attributeContains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// URL fragment for httpStatus / networkRequest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_statuses: Option<Vec<u16>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Assertion {
    pub fn new(assertion_type: AssertionType) -> Self {
        Self {
            assertion_type,
            selector: None,
            expected_value: None,
            attribute: None,
            url_pattern: None,
            method: None,
            accepted_statuses: None,
            timeout: None,
        }
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_expected(mut self, value: impl Into<String>) -> Self {
        self.expected_value = Some(value.into());
        self
    }
}

/// Named fixture values a step may reference instead of a literal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestData {
    #[serde(default)]
    pub valid: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid: Option<BTreeMap<String, Value>>,
}

impl TestData {
    /// Fixture `key` from the valid or invalid set, rendered as text.
    /// JSON `null` and missing keys both yield `None`.
    pub fn lookup(&self, key: &str, use_valid: bool) -> Option<String> {
        let set = if use_valid {
            Some(&self.valid)
        } else {
            self.invalid.as_ref()
        };
        match set?.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub assertions: Vec<Assertion>,

    #[serde(default)]
    pub test_data: TestData,

    #[serde(default)]
    pub depends_on: BTreeSet<String>,

    #[serde(default)]
    pub status: TestStatus,
}

impl TestCase {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps: Vec::new(),
            assertions: Vec::new(),
            test_data: TestData::default(),
            depends_on: BTreeSet::new(),
            status: TestStatus::NotRun,
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    /// Steps sorted by ascending step number.
    pub fn ordered_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.step_number);
        steps
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub test_cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            test_cases: Vec::new(),
        }
    }

    pub fn with_case(mut self, case: TestCase) -> Self {
        self.test_cases.push(case);
        self
    }

    /// Structural checks run before any driver work.
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidSuite("suite id is empty".into()));
        }
        if self.test_cases.is_empty() {
            return Err(EngineError::InvalidSuite(format!(
                "suite '{}' has no test cases",
                self.id
            )));
        }
        let mut seen = BTreeSet::new();
        for case in &self.test_cases {
            if case.id.trim().is_empty() {
                return Err(EngineError::InvalidSuite(format!(
                    "suite '{}' contains a test case without an id",
                    self.id
                )));
            }
            if !seen.insert(case.id.as_str()) {
                return Err(EngineError::InvalidSuite(format!(
                    "suite '{}' has duplicate test case id '{}'",
                    self.id, case.id
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Execution records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    #[default]
    NotRun,
    Running,
    Passed,
    Failed,
    Blocked,
    Skipped,
}

impl TestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestStatus::Passed | TestStatus::Failed | TestStatus::Blocked | TestStatus::Skipped
        )
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestStatus::NotRun => "NOT_RUN",
            TestStatus::Running => "RUNNING",
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Blocked => "BLOCKED",
            TestStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLog {
    pub step_number: u32,
    pub action: Action,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Label of the screenshot queued for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionLog {
    pub assertion_type: AssertionType,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLogs {
    pub steps: Vec<StepLog>,
    pub assertions: Vec<AssertionLog>,
}

impl RunLogs {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.assertions.is_empty()
    }
}

/// Execution record of one test case instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: Uuid,
    pub test_case_id: String,
    pub status: TestStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Base64 PNG of the final page state on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default)]
    pub logs: RunLogs,
}

impl TestRun {
    /// A new run in `RUNNING`.
    pub fn start(test_case_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_case_id: test_case_id.into(),
            status: TestStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            error_message: None,
            stack_trace: None,
            screenshot: None,
            screenshot_path: None,
            logs: RunLogs::default(),
        }
    }

    /// Terminal without ever running: no logs, no page.
    fn terminal(test_case_id: impl Into<String>, status: TestStatus, message: &str) -> Self {
        let mut run = Self::start(test_case_id);
        run.status = TestStatus::NotRun;
        run.error_message = Some(message.to_string());
        run.complete(status);
        run
    }

    pub fn blocked(test_case_id: impl Into<String>, message: &str) -> Self {
        Self::terminal(test_case_id, TestStatus::Blocked, message)
    }

    pub fn skipped(test_case_id: impl Into<String>, message: &str) -> Self {
        Self::terminal(test_case_id, TestStatus::Skipped, message)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Move to a terminal status and stamp completion. One-shot: returns
    /// `false` and changes nothing when the run is already complete or
    /// `status` is not terminal.
    pub fn complete(&mut self, status: TestStatus) -> bool {
        if self.is_complete() || !status.is_terminal() {
            return false;
        }
        let completed_at = Utc::now();
        self.status = status;
        self.duration = Some(elapsed_ms(self.started_at, completed_at));
        self.completed_at = Some(completed_at);
        true
    }
}

/// Which branch of the suite status rule decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuiteStatusRule {
    AnyFailed,
    AllPassed,
    AnyBlocked,
    /// Nothing failed, not everything passed, nothing blocked (e.g. skips)
    Fallback,
}

/// FAILED if any failed; else PASSED if all passed; else BLOCKED if any
/// blocked; else FAILED.
pub fn derive_suite_status(
    total: usize,
    passed: usize,
    failed: usize,
    blocked: usize,
) -> (TestStatus, SuiteStatusRule) {
    if failed > 0 {
        (TestStatus::Failed, SuiteStatusRule::AnyFailed)
    } else if passed == total {
        (TestStatus::Passed, SuiteStatusRule::AllPassed)
    } else if blocked > 0 {
        (TestStatus::Blocked, SuiteStatusRule::AnyBlocked)
    } else {
        (TestStatus::Failed, SuiteStatusRule::Fallback)
    }
}

/// Aggregate execution record for one suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteRun {
    pub id: Uuid,
    pub test_suite_id: String,
    pub status: TestStatus,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub blocked_tests: usize,
    pub skipped_tests: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_rule: Option<SuiteStatusRule>,
    pub test_runs: Vec<TestRun>,
}

impl TestSuiteRun {
    pub fn start(suite: &TestSuite) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_suite_id: suite.id.clone(),
            status: TestStatus::Running,
            total_tests: suite.test_cases.len(),
            passed_tests: 0,
            failed_tests: 0,
            blocked_tests: 0,
            skipped_tests: 0,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            error_message: None,
            status_rule: None,
            test_runs: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn counted(&self) -> usize {
        self.passed_tests + self.failed_tests + self.blocked_tests + self.skipped_tests
    }

    /// Append a completed case run and bump the matching counter.
    pub fn record(&mut self, run: TestRun) {
        match run.status {
            TestStatus::Passed => self.passed_tests += 1,
            TestStatus::Failed => self.failed_tests += 1,
            TestStatus::Blocked => self.blocked_tests += 1,
            TestStatus::Skipped => self.skipped_tests += 1,
            TestStatus::NotRun | TestStatus::Running => {}
        }
        self.test_runs.push(run);
    }

    pub fn has_run(&self, test_case_id: &str) -> bool {
        self.test_runs.iter().any(|r| r.test_case_id == test_case_id)
    }

    /// Record every declared case past the last recorded run as SKIPPED.
    /// Runs are recorded in declaration order, so position identifies the
    /// case even when ids repeat.
    pub fn skip_remaining(&mut self, suite: &TestSuite, message: &str) {
        let remaining: Vec<String> = suite
            .test_cases
            .iter()
            .skip(self.test_runs.len())
            .map(|case| case.id.clone())
            .collect();
        for id in remaining {
            self.record(TestRun::skipped(id, message));
        }
    }

    /// Derive the status and stamp completion. One-shot.
    pub fn finalize(&mut self) {
        if self.is_complete() {
            return;
        }
        let (status, rule) = derive_suite_status(
            self.total_tests,
            self.passed_tests,
            self.failed_tests,
            self.blocked_tests,
        );
        let completed_at = Utc::now();
        self.status = status;
        self.status_rule = Some(rule);
        self.duration = Some(elapsed_ms(self.started_at, completed_at));
        self.completed_at = Some(completed_at);
    }
}

fn elapsed_ms(started: DateTime<Utc>, completed: DateTime<Utc>) -> u64 {
    (completed - started).num_milliseconds().max(0) as u64
}
