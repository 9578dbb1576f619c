//! Lifecycle owner for the engines.
//!
//! `TestAutomationService` holds the browser supervisor, the artifact store
//! and the latest crawl statistics. Callers `start()` it, invoke operations,
//! and `shutdown()` on exit or on a termination signal.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifact::store::{ArtifactListing, ArtifactStore};
use crate::browser::driver::BrowserLauncher;
use crate::discovery::crawler::{DiscoveryConfig, crawl_page, validate_url};
use crate::discovery::element_model::{CrawlResult, CrawlStats};
use crate::error::{EngineError, EngineResult};
use crate::recovery::retry::RetryPolicy;
use crate::recovery::supervisor::{BrowserSupervisor, RecoveryConfig};
use crate::report::report_model::{AllSuitesSummary, SuiteSummary};
use crate::spec::context::ExecutionConfig;
use crate::spec::orchestrator::{ExecutionPolicy, Orchestrator};
use crate::spec::spec_model::{TestSuite, TestSuiteRun};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub execution: ExecutionConfig,
    pub retry: RetryPolicy,
    pub recovery: RecoveryConfig,
    pub discovery: DiscoveryConfig,
    /// Results root holding `logs/` and `screenshots/`
    pub results_dir: PathBuf,
    /// Concurrency ceiling for the parallel policy
    pub max_parallel_suites: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig::default(),
            retry: RetryPolicy::default(),
            recovery: RecoveryConfig::default(),
            discovery: DiscoveryConfig::default(),
            results_dir: PathBuf::from("test-results"),
            max_parallel_suites: 4,
        }
    }
}

pub struct TestAutomationService {
    config: ServiceConfig,
    supervisor: BrowserSupervisor,
    store: ArtifactStore,
    last_crawl: Mutex<CrawlStats>,
}

impl TestAutomationService {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: ServiceConfig) -> Self {
        let supervisor =
            BrowserSupervisor::new(launcher, config.recovery.clone(), config.retry.clone());
        let store = ArtifactStore::new(config.results_dir.clone());
        Self {
            config,
            supervisor,
            store,
            last_crawl: Mutex::new(CrawlStats::default()),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub async fn start(&self) -> EngineResult<()> {
        self.supervisor.start().await?;
        info!(results = %self.store.root().display(), "test automation service started");
        Ok(())
    }

    /// Close the driver. Safe to call more than once.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.supervisor.shutdown().await?;
        info!("test automation service stopped");
        Ok(())
    }

    /// Default policy from configuration.
    pub fn parallel_policy(&self) -> ExecutionPolicy {
        ExecutionPolicy::Parallel {
            max_concurrency: self.config.max_parallel_suites,
        }
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            &self.config.execution,
            &self.config.retry,
            &self.store,
            &self.supervisor,
        )
    }

    /// Run one suite in its own context.
    pub async fn run_test_suite(&self, suite: &TestSuite) -> EngineResult<TestSuiteRun> {
        self.ensure_started().await?;
        self.orchestrator().run_isolated(suite, true).await
    }

    /// Run many suites; every entry of the result is a finalized run.
    pub async fn run_all_test_suites(
        &self,
        suites: &[TestSuite],
        policy: ExecutionPolicy,
    ) -> EngineResult<Vec<TestSuiteRun>> {
        self.ensure_started().await?;
        Ok(self.orchestrator().run_suites(suites, policy).await)
    }

    pub async fn run_test_suite_by_id(
        &self,
        suites: &[TestSuite],
        id: &str,
    ) -> EngineResult<TestSuiteRun> {
        let suite = suites
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| EngineError::SuiteNotFound(id.to_string()))?;
        self.run_test_suite(suite).await
    }

    /// Discover testable elements on `url`. Invalid URLs fail before any
    /// driver call.
    pub async fn crawl_page(&self, url: &str) -> EngineResult<CrawlResult> {
        validate_url(url)?;
        let browser = self.supervisor.browser().await?;

        let (result, stats) = crawl_page(browser.as_ref(), url, &self.config.discovery).await?;
        if let Ok(mut last) = self.last_crawl.lock() {
            *last = stats;
        }
        drop(browser);

        self.supervisor.check_memory(true).await?;
        Ok(result)
    }

    /// Figures from the most recent crawl.
    pub fn get_stats(&self) -> CrawlStats {
        self.last_crawl.lock().map(|s| *s).unwrap_or_default()
    }

    pub fn get_suite_summary(&self, run: &TestSuiteRun) -> SuiteSummary {
        SuiteSummary::from_run(run)
    }

    pub fn get_all_suites_summary(&self, runs: &[TestSuiteRun]) -> AllSuitesSummary {
        AllSuitesSummary::from_runs(runs)
    }

    pub async fn list_artifacts(&self, prefix: &str) -> EngineResult<ArtifactListing> {
        self.store.list_artifacts(prefix).await
    }

    async fn ensure_started(&self) -> EngineResult<()> {
        if self.supervisor.is_running().await {
            Ok(())
        } else {
            Err(EngineError::NotStarted)
        }
    }
}
