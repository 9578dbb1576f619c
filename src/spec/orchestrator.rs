use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::artifact::queue::ScreenshotQueue;
use crate::artifact::store::ArtifactStore;
use crate::browser::driver::BrowserContext;
use crate::error::EngineResult;
use crate::recovery::retry::RetryPolicy;
use crate::recovery::supervisor::BrowserSupervisor;
use crate::spec::context::ExecutionConfig;
use crate::spec::runner::CaseRunner;
use crate::spec::spec_model::{TestSuite, TestSuiteRun};
use crate::spec::suite::{SuiteCoordinator, settle, unstarted_run};

/// How multiple suites share the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ExecutionPolicy {
    /// One suite at a time in one shared context
    Sequential,
    /// One isolated context per suite, at most `max_concurrency` at once
    #[serde(rename_all = "camelCase")]
    Parallel { max_concurrency: usize },
}

/// Runs one or many suites against the supervised browser.
pub struct Orchestrator<'a> {
    config: &'a ExecutionConfig,
    retry: &'a RetryPolicy,
    store: &'a ArtifactStore,
    supervisor: &'a BrowserSupervisor,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a ExecutionConfig,
        retry: &'a RetryPolicy,
        store: &'a ArtifactStore,
        supervisor: &'a BrowserSupervisor,
    ) -> Self {
        Self {
            config,
            retry,
            store,
            supervisor,
        }
    }

    fn coordinator<'q>(&'q self, screenshots: &'q ScreenshotQueue, allow_restart: bool) -> SuiteCoordinator<'q> {
        let runner = CaseRunner::new(self.config, self.retry, self.store, screenshots);
        SuiteCoordinator::new(runner, self.supervisor, allow_restart)
    }

    /// Run every suite; results come back in input order and every entry is
    /// a finalized run, failures included.
    pub async fn run_suites(&self, suites: &[TestSuite], policy: ExecutionPolicy) -> Vec<TestSuiteRun> {
        info!(suites = suites.len(), policy = ?policy, "orchestrating suites");
        match policy {
            ExecutionPolicy::Sequential => self.run_sequential(suites).await,
            ExecutionPolicy::Parallel { max_concurrency } => {
                self.run_parallel(suites, max_concurrency).await
            }
        }
    }

    /// One suite in its own context; the context is closed and the
    /// screenshot queue drained before returning.
    pub async fn run_isolated(&self, suite: &TestSuite, allow_restart: bool) -> EngineResult<TestSuiteRun> {
        suite.validate()?;
        let screenshots = ScreenshotQueue::new();
        let mut context = self.supervisor.new_context().await?;

        let result = self
            .coordinator(&screenshots, allow_restart)
            .run_suite(suite, &mut context)
            .await;

        close_context(context.as_ref()).await;
        screenshots.drain(self.store).await;
        result
    }

    async fn run_sequential(&self, suites: &[TestSuite]) -> Vec<TestSuiteRun> {
        let mut context = match self.supervisor.new_context().await {
            Ok(context) => context,
            Err(e) => {
                error!(error = %e, "could not create the shared browser context");
                let message = e.to_string();
                return suites.iter().map(|s| unstarted_run(s, &message)).collect();
            }
        };

        let screenshots = ScreenshotQueue::new();
        let mut runs = Vec::with_capacity(suites.len());
        {
            let coordinator = self.coordinator(&screenshots, true);
            for suite in suites {
                let result = coordinator.run_suite(suite, &mut context).await;
                runs.push(settle(suite, result));
            }
        }

        close_context(context.as_ref()).await;
        screenshots.drain(self.store).await;
        runs
    }

    async fn run_parallel(&self, suites: &[TestSuite], max_concurrency: usize) -> Vec<TestSuiteRun> {
        let semaphore = Semaphore::new(max_concurrency.max(1));
        let semaphore = &semaphore;

        let tasks = suites.iter().map(|suite| async move {
            let _permit = semaphore.acquire().await.ok();
            // A restart would invalidate sibling suites' contexts
            let result = self.run_isolated(suite, false).await;
            settle(suite, result)
        });
        join_all(tasks).await
    }
}

async fn close_context(context: &dyn BrowserContext) {
    if let Err(e) = context.close().await {
        warn!(error = %e, "failed to close browser context");
    }
}
