use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;
use webtest_engine::browser::driver::{Browser, BrowserLauncher};
use webtest_engine::browser::mock::{MockBrowser, MockDocument, MockElement};
use webtest_engine::error::{DriverResult, EngineError};
use webtest_engine::recovery::retry::RetryPolicy;
use webtest_engine::recovery::supervisor::RecoveryConfig;
use webtest_engine::selector::Selector;
use webtest_engine::service::{ServiceConfig, TestAutomationService};
use webtest_engine::spec::context::ExecutionConfig;
use webtest_engine::spec::dependency::BLOCKED_MESSAGE;
use webtest_engine::spec::orchestrator::ExecutionPolicy;
use webtest_engine::spec::spec_model::{
    Action, Assertion, AssertionType, Step, SuiteStatusRule, TestCase, TestStatus, TestSuite,
};
use webtest_engine::spec::suite::SKIPPED_MESSAGE;

const LOGIN_URL: &str = "https://app.test/login";
const DOWN_URL: &str = "https://unreachable.test/";

// =========================================================================
// Helpers
// =========================================================================

fn login_document() -> MockDocument {
    let mut doc = MockDocument::new("Login | App");
    let form = doc.push(MockElement::new("form").id("login"));
    doc.push(MockElement::new("input").id("email").child_of(form));
    doc.push(MockElement::new("button").id("submit").text("Sign in").child_of(form));
    doc
}

fn mock_browser() -> MockBrowser {
    MockBrowser::new()
        .with_document(LOGIN_URL, login_document())
        .with_unreachable(DOWN_URL)
}

fn config(results: &TempDir) -> ServiceConfig {
    ServiceConfig {
        retry: RetryPolicy::new(3, 0),
        recovery: RecoveryConfig {
            recovery_delay_ms: 0,
            ..RecoveryConfig::default()
        },
        results_dir: results.path().to_path_buf(),
        ..ServiceConfig::default()
    }
}

async fn started_service(browser: &MockBrowser, config: ServiceConfig) -> TestAutomationService {
    let service = TestAutomationService::new(Arc::new(browser.clone()), config);
    service.start().await.unwrap();
    service
}

fn login_case(id: &str) -> TestCase {
    TestCase::new(id, "Log in")
        .with_step(Step::new(1, Action::Navigate).with_value(LOGIN_URL))
        .with_step(
            Step::new(2, Action::Type)
                .with_selector(Selector::id("email"))
                .with_value("user@example.com"),
        )
        .with_step(Step::new(3, Action::Click).with_selector(Selector::id("submit")))
        .with_assertion(Assertion::new(AssertionType::TitleContains).with_expected("Login"))
}

fn broken_case(id: &str) -> TestCase {
    TestCase::new(id, "Open unreachable page")
        .with_step(Step::new(1, Action::Navigate).with_value(DOWN_URL))
        .with_assertion(Assertion::new(AssertionType::UrlContains).with_expected("unreachable"))
}

// =========================================================================
// Suite execution
// =========================================================================

#[tokio::test]
async fn passing_suite_records_logs_and_artifacts() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;

    let suite = TestSuite::new("auth", "Auth").with_case(login_case("login"));
    let run = service.run_test_suite(&suite).await.unwrap();

    assert_eq!(run.status, TestStatus::Passed);
    assert_eq!(run.status_rule, Some(SuiteStatusRule::AllPassed));
    assert_eq!((run.total_tests, run.passed_tests), (1, 1));
    assert!(run.is_complete());

    let case = &run.test_runs[0];
    assert_eq!(case.status, TestStatus::Passed);
    assert_eq!(case.logs.steps.len(), 3);
    assert_eq!(case.logs.assertions.len(), 1);
    assert!(case.screenshot.is_none());

    assert!(browser.was_called("fill:#email=user@example.com"));
    assert_eq!(browser.count_calls("close_page"), 1);
    assert_eq!(browser.count_calls("close_context"), 1);

    let listing = service.list_artifacts("login").await.unwrap();
    assert_eq!(listing.logs.len(), 1);
    assert!(listing.screenshots.is_empty());
}

#[tokio::test]
async fn failed_dependency_blocks_dependent_case() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;

    let suite = TestSuite::new("checkout", "Checkout")
        .with_case(broken_case("open-shop"))
        .with_case(login_case("pay").depends_on("open-shop"));
    let run = service.run_test_suite(&suite).await.unwrap();

    assert_eq!(run.status, TestStatus::Failed);
    assert_eq!(run.total_tests, 2);
    assert_eq!(run.failed_tests, 1);
    assert_eq!(run.blocked_tests, 1);
    assert_eq!(run.passed_tests, 0);

    let failed = &run.test_runs[0];
    assert_eq!(failed.status, TestStatus::Failed);
    assert!(failed.error_message.as_deref().unwrap().contains("Step 1 failed"));
    assert!(failed.stack_trace.is_some());
    assert!(failed.screenshot.is_some());
    assert!(failed.screenshot_path.is_some());
    assert_eq!(failed.logs.steps.len(), 1);
    assert_eq!(failed.logs.steps[0].screenshot.as_deref(), Some("failed-step-1"));
    // Assertions never run after a failed step
    assert!(failed.logs.assertions.is_empty());

    let blocked = &run.test_runs[1];
    assert_eq!(blocked.status, TestStatus::Blocked);
    assert_eq!(blocked.error_message.as_deref(), Some(BLOCKED_MESSAGE));
    assert!(blocked.logs.is_empty());
    assert!(!browser.was_called(&format!("goto:{}", LOGIN_URL)));

    // final screenshot plus the drained step screenshot
    let listing = service.list_artifacts("open-shop").await.unwrap();
    assert_eq!(listing.screenshots.len(), 2);
    assert_eq!(listing.logs.len(), 1);
}

#[tokio::test]
async fn assertion_failure_fails_case_after_all_assertions_run() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;

    let case = login_case("login")
        .with_assertion(Assertion::new(AssertionType::UrlContains).with_expected("/dashboard"))
        .with_assertion(Assertion::new(AssertionType::UrlContains).with_expected("/login"));
    let suite = TestSuite::new("auth", "Auth").with_case(case);
    let run = service.run_test_suite(&suite).await.unwrap();

    let case = &run.test_runs[0];
    assert_eq!(case.status, TestStatus::Failed);
    assert_eq!(case.logs.assertions.len(), 3);
    assert_eq!(case.error_message.as_deref(), Some("1 of 3 assertions failed"));
    assert_eq!(run.status, TestStatus::Failed);
}

#[tokio::test]
async fn every_assertion_screenshot_gets_its_own_file() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let mut config = config(&results);
    config.execution = ExecutionConfig {
        capture_success_screenshots: true,
        ..ExecutionConfig::default()
    };
    let service = started_service(&browser, config).await;

    let case = TestCase::new("shots", "Many screenshots")
        .with_step(Step::new(1, Action::Navigate).with_value(LOGIN_URL))
        .with_assertion(Assertion::new(AssertionType::ElementExists).with_selector(Selector::id("email")))
        .with_assertion(Assertion::new(AssertionType::ElementExists).with_selector(Selector::id("submit")))
        .with_assertion(Assertion::new(AssertionType::UrlEquals).with_expected("https://app.test/a"))
        .with_assertion(Assertion::new(AssertionType::UrlEquals).with_expected("https://app.test/b"));
    let run = service
        .run_test_suite(&TestSuite::new("shots", "Shots").with_case(case))
        .await
        .unwrap();

    let labels: Vec<&str> = run.test_runs[0]
        .logs
        .assertions
        .iter()
        .filter_map(|a| a.screenshot.as_deref())
        .collect();
    assert_eq!(labels.len(), 4);
    let mut unique = labels.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 4);

    // Assertion failures are not fatal, so there is no final screenshot
    let listing = service.list_artifacts("shots").await.unwrap();
    assert_eq!(listing.screenshots.len(), labels.len());
    for label in labels {
        assert!(
            listing.screenshots.iter().any(|name| name.starts_with(&format!("shots_{}_", label))),
            "{}",
            label
        );
    }
}

#[tokio::test]
async fn type_without_value_fails_case_with_step_screenshot() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;

    let case = TestCase::new("fill-form", "Type without data")
        .with_step(Step::new(1, Action::Navigate).with_value(LOGIN_URL))
        .with_step(Step::new(2, Action::Type).with_selector(Selector::id("email")))
        .with_assertion(Assertion::new(AssertionType::TitleContains).with_expected("Login"));
    let run = service
        .run_test_suite(&TestSuite::new("forms", "Forms").with_case(case))
        .await
        .unwrap();

    let case = &run.test_runs[0];
    assert_eq!(case.status, TestStatus::Failed);
    assert_eq!(
        case.error_message.as_deref(),
        Some("Step 2: action 'type' requires a value")
    );
    assert!(case.logs.assertions.is_empty());
    assert_eq!(case.logs.steps[1].screenshot.as_deref(), Some("failed-step-2"));
    assert!(!browser.was_called("fill:"));

    let listing = service.list_artifacts("fill-form").await.unwrap();
    assert!(listing.screenshots.iter().any(|n| n.starts_with("fill-form_failed-step-2_")));
    assert!(listing.screenshots.iter().any(|n| n.starts_with("fill-form_final_")));
}

#[tokio::test]
async fn case_deadline_fails_slow_case() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser().with_real_waits();
    let mut config = config(&results);
    config.execution = ExecutionConfig {
        case_deadline_ms: 50,
        ..ExecutionConfig::default()
    };
    let service = started_service(&browser, config).await;

    let mut slow = Step::new(2, Action::Wait);
    slow.timeout = Some(5_000);
    let case = TestCase::new("slow", "Slow case")
        .with_step(Step::new(1, Action::Navigate).with_value(LOGIN_URL))
        .with_step(slow)
        .with_assertion(Assertion::new(AssertionType::TitleContains).with_expected("Login"));
    let run = service
        .run_test_suite(&TestSuite::new("timing", "Timing").with_case(case))
        .await
        .unwrap();

    let case = &run.test_runs[0];
    assert_eq!(case.status, TestStatus::Failed);
    assert_eq!(
        case.error_message.as_deref(),
        Some("Test case 'slow' exceeded its deadline of 50ms")
    );
    assert!(case.duration.unwrap() < 5_000);
    assert!(case.screenshot.is_some());
    assert!(case.logs.assertions.is_empty());
    assert_eq!(browser.count_calls("close_page"), 1);

    let listing = service.list_artifacts("slow").await.unwrap();
    assert!(listing.screenshots.iter().any(|n| n.starts_with("slow_final_")));
}

#[tokio::test]
async fn suite_status_is_blocked_when_nothing_failed() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;

    let suite = TestSuite::new("s", "S")
        .with_case(login_case("a"))
        .with_case(login_case("b").depends_on("missing"));
    let run = service.run_test_suite(&suite).await.unwrap();

    assert_eq!(run.status, TestStatus::Blocked);
    assert_eq!(run.status_rule, Some(SuiteStatusRule::AnyBlocked));
}

#[tokio::test]
async fn run_requires_started_service() {
    let results = TempDir::new().unwrap();
    let service = TestAutomationService::new(Arc::new(mock_browser()), config(&results));
    let suite = TestSuite::new("auth", "Auth").with_case(login_case("login"));

    let err = service.run_test_suite(&suite).await.unwrap_err();
    assert!(matches!(err, EngineError::NotStarted));
}

#[tokio::test]
async fn invalid_suite_is_rejected_before_driver_work() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;

    let err = service
        .run_test_suite(&TestSuite::new("empty", "Empty"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSuite(_)));
    assert!(!browser.was_called("new_context"));
}

#[tokio::test]
async fn run_by_id_reports_unknown_suite() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;
    let suites = vec![TestSuite::new("auth", "Auth").with_case(login_case("login"))];

    let err = service.run_test_suite_by_id(&suites, "billing").await.unwrap_err();
    assert!(matches!(err, EngineError::SuiteNotFound(id) if id == "billing"));

    let run = service.run_test_suite_by_id(&suites, "auth").await.unwrap();
    assert_eq!(run.test_suite_id, "auth");
}

// =========================================================================
// Retry and recovery
// =========================================================================

#[tokio::test]
async fn transient_context_failures_are_retried() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;
    browser.fail_next_contexts(2);

    let suite = TestSuite::new("auth", "Auth").with_case(login_case("login"));
    let run = service.run_test_suite(&suite).await.unwrap();

    assert_eq!(run.status, TestStatus::Passed);
    assert_eq!(browser.count_calls("new_context"), 3);
}

#[tokio::test]
async fn exhausted_context_retries_surface_error() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;
    browser.fail_next_contexts(5);

    let suite = TestSuite::new("auth", "Auth").with_case(login_case("login"));
    let err = service.run_test_suite(&suite).await.unwrap_err();

    assert!(matches!(err, EngineError::RetriesExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn heap_pressure_restarts_driver_between_cases() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let mut cfg = config(&results);
    cfg.recovery.heap_threshold_bytes = 1024;
    let service = started_service(&browser, cfg).await;

    let suite = TestSuite::new("auth", "Auth")
        .with_case(login_case("first"))
        .with_case(login_case("second").depends_on("first"));
    let run = service.run_test_suite(&suite).await.unwrap();

    assert_eq!(run.status, TestStatus::Passed);
    // initial launch plus one relaunch after each case
    assert_eq!(browser.launches(), 3);
    assert_eq!(browser.count_calls("collect_garbage"), 2);
    assert_eq!(browser.count_calls("close_browser"), 2);
}

// =========================================================================
// Multi-suite orchestration
// =========================================================================

#[tokio::test]
async fn sequential_policy_shares_one_context_and_keeps_order() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;

    let suites = vec![
        TestSuite::new("one", "One").with_case(login_case("a")),
        TestSuite::new("two", "Two").with_case(broken_case("b")),
        TestSuite::new("three", "Three").with_case(login_case("c")),
    ];
    let runs = service
        .run_all_test_suites(&suites, ExecutionPolicy::Sequential)
        .await
        .unwrap();

    let ids: Vec<&str> = runs.iter().map(|r| r.test_suite_id.as_str()).collect();
    assert_eq!(ids, vec!["one", "two", "three"]);
    let statuses: Vec<TestStatus> = runs.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![TestStatus::Passed, TestStatus::Failed, TestStatus::Passed]
    );
    assert_eq!(browser.count_calls("new_context"), 1);
    assert_eq!(browser.count_calls("close_context"), 1);
    assert_eq!(browser.count_calls("close_browser"), 0);

    service.shutdown().await.unwrap();
    assert_eq!(browser.count_calls("close_browser"), 1);

    let summary = service.get_all_suites_summary(&runs);
    assert_eq!(summary.passed_suites, 2);
    assert!(!summary.all_passed());
}

#[tokio::test]
async fn parallel_policy_isolates_suites_without_restarts() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let mut cfg = config(&results);
    cfg.recovery.heap_threshold_bytes = 1024;
    let service = started_service(&browser, cfg).await;

    let suites = vec![
        TestSuite::new("one", "One").with_case(login_case("a")),
        TestSuite::new("two", "Two").with_case(login_case("b")),
        TestSuite::new("three", "Three").with_case(login_case("c")),
    ];
    let runs = service
        .run_all_test_suites(&suites, ExecutionPolicy::Parallel { max_concurrency: 2 })
        .await
        .unwrap();

    let ids: Vec<&str> = runs.iter().map(|r| r.test_suite_id.as_str()).collect();
    assert_eq!(ids, vec!["one", "two", "three"]);
    assert!(runs.iter().all(|r| r.status == TestStatus::Passed));
    assert_eq!(browser.count_calls("new_context"), 3);
    assert_eq!(browser.count_calls("close_context"), 3);
    assert_eq!(browser.launches(), 1);
    assert_eq!(browser.count_calls("collect_garbage"), 3);
}

#[tokio::test]
async fn invalid_suite_in_batch_becomes_failed_run() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;

    let suites = vec![
        TestSuite::new("empty", "Empty"),
        TestSuite::new("auth", "Auth").with_case(login_case("login")),
    ];
    let runs = service
        .run_all_test_suites(&suites, ExecutionPolicy::Sequential)
        .await
        .unwrap();

    assert_eq!(runs[0].status, TestStatus::Failed);
    assert!(runs[0].error_message.as_deref().unwrap().contains("no test cases"));
    assert_eq!(runs[1].status, TestStatus::Passed);
}

#[tokio::test]
async fn duplicate_case_ids_skip_every_declared_case() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let service = started_service(&browser, config(&results)).await;

    let suites = vec![
        TestSuite::new("dupes", "Dupes")
            .with_case(login_case("a"))
            .with_case(login_case("a"))
            .with_case(login_case("b")),
    ];
    let runs = service
        .run_all_test_suites(&suites, ExecutionPolicy::Sequential)
        .await
        .unwrap();

    let run = &runs[0];
    assert_eq!(run.status, TestStatus::Failed);
    assert_eq!(run.total_tests, 3);
    assert_eq!(run.skipped_tests, 3);
    assert_eq!(run.counted(), run.total_tests);
    assert_eq!(run.test_runs.len(), 3);
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .contains("duplicate test case id 'a'"));
    assert!(!browser.was_called("goto:"));
}

/// Hands out the same mock browser, which refuses contexts after a relaunch.
struct RefusingRelauncher {
    browser: MockBrowser,
    launches: AtomicU32,
}

#[async_trait]
impl BrowserLauncher for RefusingRelauncher {
    async fn launch(&self) -> DriverResult<Arc<dyn Browser>> {
        if self.launches.fetch_add(1, Ordering::SeqCst) > 0 {
            self.browser.fail_next_contexts(100);
        }
        self.browser.launch().await
    }
}

#[tokio::test]
async fn failed_recovery_aborts_suite_and_skips_remaining_cases() {
    let results = TempDir::new().unwrap();
    let browser = mock_browser();
    let mut cfg = config(&results);
    cfg.recovery.heap_threshold_bytes = 1024;
    let launcher = RefusingRelauncher {
        browser: browser.clone(),
        launches: AtomicU32::new(0),
    };
    let service = TestAutomationService::new(Arc::new(launcher), cfg);
    service.start().await.unwrap();

    let suite = TestSuite::new("auth", "Auth")
        .with_case(login_case("first"))
        .with_case(login_case("second"));
    let err = service.run_test_suite(&suite).await.unwrap_err();

    let EngineError::SuiteAborted { suite_run, source } = err else {
        panic!("expected SuiteAborted");
    };
    assert!(matches!(*source, EngineError::RetriesExhausted { .. }));
    assert!(suite_run.is_complete());
    assert_eq!(suite_run.status, TestStatus::Failed);
    assert_eq!(suite_run.passed_tests, 1);
    assert_eq!(suite_run.skipped_tests, 1);
    assert_eq!(suite_run.counted(), suite_run.total_tests);
    assert_eq!(
        suite_run.test_runs[1].error_message.as_deref(),
        Some(SKIPPED_MESSAGE)
    );
    assert!(suite_run.error_message.is_some());
}
