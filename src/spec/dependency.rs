use std::collections::HashMap;

use crate::spec::spec_model::{TestCase, TestRun, TestStatus};

/// Diagnostic recorded on every blocked run.
pub const BLOCKED_MESSAGE: &str = "Blocked: one or more dependencies did not pass";

/// Final status of each case already recorded in the current suite run.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    statuses: HashMap<String, TestStatus>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, run: &TestRun) {
        self.statuses.insert(run.test_case_id.clone(), run.status);
    }

    pub fn status_of(&self, test_case_id: &str) -> Option<TestStatus> {
        self.statuses.get(test_case_id).copied()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Eligible,
    /// Dependencies that are missing or did not pass
    Blocked { unmet: Vec<String> },
}

/// A case may run only when every dependency has a PASSED run.
pub fn check_dependencies(case: &TestCase, registry: &RunRegistry) -> GateDecision {
    let unmet: Vec<String> = case
        .depends_on
        .iter()
        .filter(|id| registry.status_of(id) != Some(TestStatus::Passed))
        .cloned()
        .collect();

    if unmet.is_empty() {
        GateDecision::Eligible
    } else {
        GateDecision::Blocked { unmet }
    }
}
