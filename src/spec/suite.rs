use tracing::{error, info};

use crate::browser::driver::BrowserContext;
use crate::error::{EngineError, EngineResult};
use crate::recovery::supervisor::{BrowserSupervisor, MemoryCheck};
use crate::spec::dependency::{BLOCKED_MESSAGE, GateDecision, RunRegistry, check_dependencies};
use crate::spec::runner::CaseRunner;
use crate::spec::spec_model::{SuiteStatusRule, TestRun, TestStatus, TestSuite, TestSuiteRun};

/// Recorded on cases that never ran because their suite was aborted.
pub const SKIPPED_MESSAGE: &str = "Skipped: suite aborted before this case ran";

// ============================================================================
// Per-suite state
// ============================================================================

/// Owns the run registry and the live `TestSuiteRun` of one suite execution.
#[derive(Debug)]
pub struct SuiteExecution {
    registry: RunRegistry,
    suite_run: TestSuiteRun,
}

impl SuiteExecution {
    pub fn new(suite: &TestSuite) -> Self {
        Self {
            registry: RunRegistry::new(),
            suite_run: TestSuiteRun::start(suite),
        }
    }

    /// Register a finished run and append it to the suite run.
    pub fn record(&mut self, run: TestRun) {
        self.registry.register(&run);
        self.suite_run.record(run);
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn suite_run(&self) -> &TestSuiteRun {
        &self.suite_run
    }

    pub fn finish(mut self) -> TestSuiteRun {
        self.suite_run.finalize();
        self.suite_run
    }

    /// Finalize after a fatal error: unrun cases become SKIPPED.
    pub fn abort(self, suite: &TestSuite, fatal: EngineError) -> EngineError {
        error!(suite = %suite.id, error = %fatal, "test suite aborted");
        let mut run = self.suite_run;
        run.skip_remaining(suite, SKIPPED_MESSAGE);
        run.error_message = Some(fatal.to_string());
        run.finalize();
        EngineError::SuiteAborted {
            suite_run: Box::new(run),
            source: Box::new(fatal),
        }
    }
}

/// A finalized run for a suite that could not start: every case SKIPPED.
pub fn unstarted_run(suite: &TestSuite, message: &str) -> TestSuiteRun {
    let mut run = TestSuiteRun::start(suite);
    run.skip_remaining(suite, SKIPPED_MESSAGE);
    run.error_message = Some(message.to_string());
    run.finalize();
    // Zero cases would otherwise derive as all-passed
    if run.status == TestStatus::Passed {
        run.status = TestStatus::Failed;
        run.status_rule = Some(SuiteStatusRule::Fallback);
    }
    run
}

/// Collapse any suite outcome into a finalized run.
pub fn settle(suite: &TestSuite, result: EngineResult<TestSuiteRun>) -> TestSuiteRun {
    match result {
        Ok(run) => run,
        Err(EngineError::SuiteAborted { suite_run, .. }) => *suite_run,
        Err(e) => unstarted_run(suite, &e.to_string()),
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Runs the cases of a suite in declared order through the dependency gate.
pub struct SuiteCoordinator<'a> {
    runner: CaseRunner<'a>,
    supervisor: &'a BrowserSupervisor,
    allow_restart: bool,
}

impl<'a> SuiteCoordinator<'a> {
    pub fn new(runner: CaseRunner<'a>, supervisor: &'a BrowserSupervisor, allow_restart: bool) -> Self {
        Self {
            runner,
            supervisor,
            allow_restart,
        }
    }

    /// Run `suite` in `context`. When the supervisor relaunches the driver
    /// the context is replaced with one from the new browser.
    ///
    /// A fatal error is returned as `SuiteAborted` carrying the finalized run.
    pub async fn run_suite(
        &self,
        suite: &TestSuite,
        context: &mut Box<dyn BrowserContext>,
    ) -> EngineResult<TestSuiteRun> {
        suite.validate()?;
        info!(suite = %suite.id, cases = suite.test_cases.len(), "test suite started");

        let mut execution = SuiteExecution::new(suite);
        for case in &suite.test_cases {
            if let GateDecision::Blocked { unmet } = check_dependencies(case, execution.registry()) {
                info!(case = %case.id, unmet = ?unmet, "test case blocked");
                execution.record(TestRun::blocked(case.id.clone(), BLOCKED_MESSAGE));
                continue;
            }

            if let Err(fatal) = self.runner.run_case(&mut execution, context.as_ref(), case).await {
                return Err(execution.abort(suite, fatal));
            }

            match self.supervisor.check_memory(self.allow_restart).await {
                Ok(MemoryCheck::Restarted { .. }) => match self.supervisor.new_context().await {
                    Ok(fresh) => *context = fresh,
                    Err(e) => return Err(execution.abort(suite, e)),
                },
                Ok(_) => {}
                Err(e) => return Err(execution.abort(suite, e)),
            }
        }

        let run = execution.finish();
        info!(
            suite = %suite.id,
            status = %run.status,
            passed = run.passed_tests,
            failed = run.failed_tests,
            blocked = run.blocked_tests,
            skipped = run.skipped_tests,
            "test suite finished"
        );
        Ok(run)
    }
}
