use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::spec::spec_model::{Action, AssertionLog, RunLogs, StepLog};

/// Timeouts and capture switches shared by the executor, evaluator and runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Bound for each driver call when the step sets no `timeout`
    pub action_timeout_ms: u64,

    /// Pause of a `wait` step without `timeout`
    pub wait_ms: u64,

    /// Wait bound for assertions without `timeout`
    pub assertion_timeout_ms: u64,

    /// Deadline for one whole test case
    pub case_deadline_ms: u64,

    /// Load-time ceiling for `performanceMetric` without `expectedValue`
    pub performance_threshold_ms: u64,

    /// Also queue a `success-<type>-<n>` screenshot for passing assertions
    pub capture_success_screenshots: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 30_000,
            wait_ms: 5_000,
            assertion_timeout_ms: 5_000,
            case_deadline_ms: 300_000,
            performance_threshold_ms: 3_000,
            capture_success_screenshots: false,
        }
    }
}

impl ExecutionConfig {
    pub fn case_deadline(&self) -> Duration {
        Duration::from_millis(self.case_deadline_ms)
    }
}

/// Tracks the step and assertion logs of the case being executed.
#[derive(Debug, Clone, Default)]
pub struct TestContext {
    /// Step currently executing
    pub current_step: Option<u32>,

    pub logs: RunLogs,
}

impl TestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&mut self, step_number: u32, action: Action, error: Option<String>, screenshot: Option<String>) {
        self.logs.steps.push(StepLog {
            step_number,
            action,
            passed: error.is_none(),
            error,
            screenshot,
            timestamp: Utc::now(),
        });
    }

    pub fn record_assertion(&mut self, log: AssertionLog) {
        self.logs.assertions.push(log);
    }

    /// Check if all recorded assertions passed.
    pub fn all_passed(&self) -> bool {
        self.logs.assertions.iter().all(|a| a.passed)
    }

    pub fn fail_count(&self) -> usize {
        self.logs.assertions.iter().filter(|a| !a.passed).count()
    }

    pub fn total_count(&self) -> usize {
        self.logs.assertions.len()
    }

    pub fn into_logs(self) -> RunLogs {
        self.logs
    }
}
