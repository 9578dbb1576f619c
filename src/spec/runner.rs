use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{error, info, warn};

use crate::artifact::queue::ScreenshotQueue;
use crate::artifact::store::ArtifactStore;
use crate::browser::driver::{BrowserContext, Page};
use crate::error::{EngineError, EngineResult, error_chain};
use crate::recovery::retry::RetryPolicy;
use crate::spec::assertion::AssertionEvaluator;
use crate::spec::context::{ExecutionConfig, TestContext};
use crate::spec::spec_model::{TestCase, TestRun, TestStatus};
use crate::spec::step_executor::execute_step;
use crate::spec::suite::SuiteExecution;

/// Executes one eligible test case in its own page.
pub struct CaseRunner<'a> {
    config: &'a ExecutionConfig,
    retry: &'a RetryPolicy,
    store: &'a ArtifactStore,
    screenshots: &'a ScreenshotQueue,
}

impl<'a> CaseRunner<'a> {
    pub fn new(
        config: &'a ExecutionConfig,
        retry: &'a RetryPolicy,
        store: &'a ArtifactStore,
        screenshots: &'a ScreenshotQueue,
    ) -> Self {
        Self {
            config,
            retry,
            store,
            screenshots,
        }
    }

    /// Run `case` and record its run in `execution`.
    ///
    /// Step and assertion failures end up on the run. Only an infrastructure
    /// failure (no page could be opened) is returned, after the FAILED run
    /// has been recorded.
    pub async fn run_case(
        &self,
        execution: &mut SuiteExecution,
        context: &dyn BrowserContext,
        case: &TestCase,
    ) -> EngineResult<()> {
        let mut run = TestRun::start(case.id.clone());
        info!(case = %case.id, name = %case.name, "test case started");

        let page = match self.retry.run("open page", || context.new_page()).await {
            Ok(page) => page,
            Err(e) => {
                error!(case = %case.id, error = %e, "could not open a page");
                run.error_message = Some(e.to_string());
                run.stack_trace = Some(error_chain(&e));
                run.complete(TestStatus::Failed);
                self.finish(execution, run).await;
                return Err(e);
            }
        };

        let mut ctx = TestContext::new();
        let deadline = self.config.case_deadline();
        let outcome =
            match tokio::time::timeout(deadline, self.execute(page.as_ref(), case, &mut ctx)).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::DeadlineExceeded {
                    case: case.id.clone(),
                    ms: deadline.as_millis() as u64,
                }),
            };

        match outcome {
            Ok(()) if ctx.all_passed() => {
                run.complete(TestStatus::Passed);
            }
            Ok(()) => {
                run.error_message = Some(format!(
                    "{} of {} assertions failed",
                    ctx.fail_count(),
                    ctx.total_count()
                ));
                run.complete(TestStatus::Failed);
            }
            Err(e) => {
                warn!(case = %case.id, error = %e, "test case failed");
                run.error_message = Some(e.to_string());
                run.stack_trace = Some(error_chain(&e));
                self.final_screenshot(page.as_ref(), &mut run).await;
                run.complete(TestStatus::Failed);
            }
        }
        run.logs = ctx.into_logs();

        if let Err(e) = page.close().await {
            warn!(case = %case.id, error = %e, "failed to close page");
        }
        self.finish(execution, run).await;
        Ok(())
    }

    /// Steps in order, stopping at the first failure; then every assertion.
    async fn execute(&self, page: &dyn Page, case: &TestCase, ctx: &mut TestContext) -> EngineResult<()> {
        for step in case.ordered_steps() {
            ctx.current_step = Some(step.step_number);
            match execute_step(page, step, &case.test_data, self.config).await {
                Ok(()) => ctx.record_step(step.step_number, step.action, None, None),
                Err(e) => {
                    let label = format!("failed-step-{}", step.step_number);
                    let shot = match page.screenshot().await {
                        Ok(png) => {
                            self.screenshots.push(&case.id, &label, png);
                            Some(label)
                        }
                        Err(se) => {
                            warn!(case = %case.id, error = %se, "step failure screenshot failed");
                            None
                        }
                    };
                    ctx.record_step(step.step_number, step.action, Some(e.to_string()), shot);
                    return Err(e);
                }
            }
        }
        ctx.current_step = None;

        let evaluator = AssertionEvaluator::new(page, self.config, self.screenshots, &case.id);
        for assertion in &case.assertions {
            let log = evaluator.evaluate(assertion).await;
            ctx.record_assertion(log);
        }
        Ok(())
    }

    /// Attach the final page state inline and on disk.
    async fn final_screenshot(&self, page: &dyn Page, run: &mut TestRun) {
        let png = match page.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                warn!(case = %run.test_case_id, error = %e, "final screenshot failed");
                return;
            }
        };
        match self.store.write_screenshot(&run.test_case_id, "final", &png).await {
            Ok(stored) => {
                run.screenshot = Some(stored.base64);
                run.screenshot_path = Some(stored.path.display().to_string());
            }
            Err(e) => {
                warn!(case = %run.test_case_id, error = %e, "final screenshot not written");
                run.screenshot = Some(STANDARD.encode(&png));
            }
        }
    }

    /// Persist the run log and hand the run to the suite.
    async fn finish(&self, execution: &mut SuiteExecution, run: TestRun) {
        if let Err(e) = self.store.write_run_log(&run).await {
            warn!(case = %run.test_case_id, error = %e, "run log not written");
        }
        info!(
            case = %run.test_case_id,
            status = %run.status,
            duration_ms = run.duration.unwrap_or(0),
            "test case finished"
        );
        execution.record(run);
    }
}
