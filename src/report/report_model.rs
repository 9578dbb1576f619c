use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::spec::spec_model::{TestStatus, TestSuiteRun};

// ============================================================================
// Summary projections over suite runs
// ============================================================================

/// Compact view of one `TestSuiteRun`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteSummary {
    pub suite_run_id: Uuid,
    pub test_suite_id: String,
    pub status: TestStatus,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub skipped: usize,

    /// Percentage of cases that passed, 0.0 for an empty suite
    pub pass_rate: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Ids of cases that ended FAILED
    pub failed_cases: Vec<String>,
}

impl SuiteSummary {
    pub fn from_run(run: &TestSuiteRun) -> Self {
        Self {
            suite_run_id: run.id,
            test_suite_id: run.test_suite_id.clone(),
            status: run.status,
            total: run.total_tests,
            passed: run.passed_tests,
            failed: run.failed_tests,
            blocked: run.blocked_tests,
            skipped: run.skipped_tests,
            pass_rate: pass_rate(run.passed_tests, run.total_tests),
            duration_ms: run.duration,
            started_at: run.started_at,
            completed_at: run.completed_at,
            failed_cases: run
                .test_runs
                .iter()
                .filter(|r| r.status == TestStatus::Failed)
                .map(|r| r.test_case_id.clone())
                .collect(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

/// Totals across many suite runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllSuitesSummary {
    pub total_suites: usize,
    pub passed_suites: usize,
    pub failed_suites: usize,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    pub blocked_tests: usize,
    pub skipped_tests: usize,
    pub pass_rate: f64,

    /// Sum of suite durations in milliseconds
    pub total_duration_ms: u64,

    pub suites: Vec<SuiteSummary>,
}

impl AllSuitesSummary {
    pub fn from_runs(runs: &[TestSuiteRun]) -> Self {
        let suites: Vec<SuiteSummary> = runs.iter().map(SuiteSummary::from_run).collect();
        let passed_suites = suites.iter().filter(|s| s.all_passed()).count();
        let total_tests = suites.iter().map(|s| s.total).sum();
        let passed_tests = suites.iter().map(|s| s.passed).sum();

        Self {
            total_suites: suites.len(),
            passed_suites,
            failed_suites: suites.len() - passed_suites,
            total_tests,
            passed_tests,
            failed_tests: suites.iter().map(|s| s.failed).sum(),
            blocked_tests: suites.iter().map(|s| s.blocked).sum(),
            skipped_tests: suites.iter().map(|s| s.skipped).sum(),
            pass_rate: pass_rate(passed_tests, total_tests),
            total_duration_ms: suites.iter().filter_map(|s| s.duration_ms).sum(),
            suites,
        }
    }

    /// Whether every suite ended PASSED.
    pub fn all_passed(&self) -> bool {
        self.failed_suites == 0
    }
}

fn pass_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 * 100.0 / total as f64
    }
}
