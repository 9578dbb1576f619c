use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use webtest_engine::browser::driver::{Browser, BrowserLauncher};
use webtest_engine::browser::mock::MockBrowser;
use webtest_engine::error::{DriverError, DriverResult, EngineError};
use webtest_engine::recovery::retry::RetryPolicy;
use webtest_engine::recovery::supervisor::{BrowserSupervisor, MemoryCheck, RecoveryConfig};

fn no_delay() -> RecoveryConfig {
    RecoveryConfig {
        heap_threshold_bytes: 1024,
        recovery_delay_ms: 0,
    }
}

// =========================================================================
// Retry policy
// =========================================================================

#[test]
fn default_policy_is_three_attempts_with_linear_backoff() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
    assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    assert_eq!(policy.delay_for(3), Duration::from_millis(3000));
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let policy = RetryPolicy::new(3, 0);
    let mut attempts = 0;
    let value = policy
        .run("flaky", || {
            attempts += 1;
            let n = attempts;
            async move {
                if n < 3 {
                    Err(DriverError::SessionIO("pipe hiccup".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 3);
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn non_retryable_errors_return_immediately() {
    let policy = RetryPolicy::new(5, 0);
    let mut attempts = 0;
    let err = policy
        .run("validate", || {
            attempts += 1;
            async { Err::<(), _>(EngineError::InvalidSuite("bad".into())) }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidSuite(_)));
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn element_not_found_is_not_retried() {
    let policy = RetryPolicy::new(3, 0);
    let mut attempts = 0;
    let err = policy
        .run("click", || {
            attempts += 1;
            async { Err::<(), _>(DriverError::ElementNotFound("#x".into())) }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Driver(DriverError::ElementNotFound(_))));
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn exhausted_retries_keep_last_error() {
    let policy = RetryPolicy::new(2, 0);
    let err = policy
        .run("launch browser", || async {
            Err::<(), _>(DriverError::Timeout {
                what: "ready signal".into(),
                ms: 10,
            })
        })
        .await
        .unwrap_err();

    match err {
        EngineError::RetriesExhausted {
            operation,
            attempts,
            source,
        } => {
            assert_eq!(operation, "launch browser");
            assert_eq!(attempts, 2);
            assert!(matches!(*source, EngineError::Driver(DriverError::Timeout { .. })));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn zero_attempts_still_tries_once() {
    let policy = RetryPolicy::new(0, 0);
    let mut attempts = 0;
    let _ = policy
        .run("once", || {
            attempts += 1;
            async { Err::<(), _>(DriverError::Closed) }
        })
        .await;
    assert_eq!(attempts, 1);
}

// =========================================================================
// Browser supervisor
// =========================================================================

#[tokio::test]
async fn supervisor_starts_once() {
    let browser = MockBrowser::new();
    let supervisor = BrowserSupervisor::new(Arc::new(browser.clone()), no_delay(), RetryPolicy::new(3, 0));

    assert!(matches!(supervisor.browser().await, Err(EngineError::NotStarted)));
    supervisor.start().await.unwrap();
    supervisor.start().await.unwrap();

    assert!(supervisor.is_running().await);
    assert_eq!(browser.launches(), 1);
}

#[tokio::test]
async fn healthy_heap_needs_no_action() {
    let browser = MockBrowser::new();
    let supervisor = BrowserSupervisor::new(
        Arc::new(browser.clone()),
        RecoveryConfig::default(),
        RetryPolicy::new(3, 0),
    );
    supervisor.start().await.unwrap();

    let check = supervisor.check_memory(true).await.unwrap();
    assert_eq!(check, MemoryCheck::Healthy { heap_used: 64 * 1024 * 1024 });
    assert!(!browser.was_called("collect_garbage"));
}

#[tokio::test]
async fn heap_over_threshold_hints_gc_without_restart() {
    let browser = MockBrowser::new();
    let supervisor = BrowserSupervisor::new(Arc::new(browser.clone()), no_delay(), RetryPolicy::new(3, 0));
    supervisor.start().await.unwrap();

    let check = supervisor.check_memory(false).await.unwrap();
    assert!(matches!(check, MemoryCheck::Collected { .. }));
    assert!(browser.was_called("collect_garbage"));
    assert_eq!(browser.launches(), 1);
}

#[tokio::test]
async fn heap_over_threshold_restarts_when_allowed() {
    let browser = MockBrowser::new();
    let supervisor = BrowserSupervisor::new(Arc::new(browser.clone()), no_delay(), RetryPolicy::new(3, 0));
    supervisor.start().await.unwrap();
    browser.set_heap_used(2048);

    let check = supervisor.check_memory(true).await.unwrap();
    assert_eq!(check, MemoryCheck::Restarted { heap_used: 2048 });
    assert_eq!(browser.launches(), 2);
    assert!(browser.was_called("close_browser"));
    assert!(supervisor.is_running().await);
}

/// Succeeds on the first launch only.
struct OneShotLauncher {
    browser: MockBrowser,
    launches: AtomicU32,
}

#[async_trait]
impl BrowserLauncher for OneShotLauncher {
    async fn launch(&self) -> DriverResult<Arc<dyn Browser>> {
        if self.launches.fetch_add(1, Ordering::SeqCst) == 0 {
            self.browser.launch().await
        } else {
            Err(DriverError::SubprocessSpawn {
                script: "browser_server.js".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "node missing"),
            })
        }
    }
}

#[tokio::test]
async fn failed_relaunch_is_a_recovery_error() {
    let launcher = OneShotLauncher {
        browser: MockBrowser::new(),
        launches: AtomicU32::new(0),
    };
    let supervisor = BrowserSupervisor::new(Arc::new(launcher), no_delay(), RetryPolicy::new(3, 0));
    supervisor.start().await.unwrap();

    let err = supervisor.check_memory(true).await.unwrap_err();
    assert!(matches!(err, EngineError::Recovery(DriverError::SubprocessSpawn { .. })));
    assert!(!supervisor.is_running().await);
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let browser = MockBrowser::new();
    let supervisor = BrowserSupervisor::new(Arc::new(browser.clone()), no_delay(), RetryPolicy::new(3, 0));
    supervisor.start().await.unwrap();

    supervisor.shutdown().await.unwrap();
    supervisor.shutdown().await.unwrap();

    assert_eq!(browser.count_calls("close_browser"), 1);
    assert!(!supervisor.is_running().await);
}
