use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::browser::driver::{Browser, BrowserContext, BrowserLauncher};
use crate::error::{EngineError, EngineResult};
use crate::recovery::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Driver heap above which a GC hint (and possibly a restart) is issued
    pub heap_threshold_bytes: u64,
    /// Pause between closing and relaunching the driver
    pub recovery_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            heap_threshold_bytes: 1024 * 1024 * 1024,
            recovery_delay_ms: 2000,
        }
    }
}

/// Outcome of a post-cycle memory sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryCheck {
    Healthy { heap_used: u64 },
    /// Over threshold; GC hinted, driver kept
    Collected { heap_used: u64 },
    /// Over threshold; driver relaunched, existing contexts are gone
    Restarted { heap_used: u64 },
}

/// Owns the running browser and relaunches it under memory pressure.
pub struct BrowserSupervisor {
    launcher: Arc<dyn BrowserLauncher>,
    browser: RwLock<Option<Arc<dyn Browser>>>,
    config: RecoveryConfig,
    retry: RetryPolicy,
}

impl BrowserSupervisor {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: RecoveryConfig, retry: RetryPolicy) -> Self {
        Self {
            launcher,
            browser: RwLock::new(None),
            config,
            retry,
        }
    }

    /// Launch the driver unless it is already running.
    pub async fn start(&self) -> EngineResult<()> {
        let mut slot = self.browser.write().await;
        if slot.is_none() {
            let browser = self.retry.run("launch browser", || self.launcher.launch()).await?;
            info!("browser started");
            *slot = Some(browser);
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.browser.read().await.is_some()
    }

    pub async fn browser(&self) -> EngineResult<Arc<dyn Browser>> {
        self.browser.read().await.clone().ok_or(EngineError::NotStarted)
    }

    /// Fresh isolated context on the current browser, with retry.
    pub async fn new_context(&self) -> EngineResult<Box<dyn BrowserContext>> {
        let browser = self.browser().await?;
        self.retry
            .run("create browser context", || browser.new_context())
            .await
    }

    /// Sample driver heap after a page-context cycle. Over the threshold a GC
    /// is hinted; with `allow_restart` the driver is also relaunched.
    pub async fn check_memory(&self, allow_restart: bool) -> EngineResult<MemoryCheck> {
        let browser = self.browser().await?;
        let heap_used = match browser.memory_usage().await {
            Ok(usage) => usage.heap_used,
            Err(e) => {
                warn!(error = %e, "memory sample failed");
                return Ok(MemoryCheck::Healthy { heap_used: 0 });
            }
        };

        if heap_used <= self.config.heap_threshold_bytes {
            return Ok(MemoryCheck::Healthy { heap_used });
        }

        warn!(
            heap_used,
            threshold = self.config.heap_threshold_bytes,
            "driver heap over threshold"
        );
        if let Err(e) = browser.collect_garbage().await {
            warn!(error = %e, "garbage collection hint failed");
        }
        if !allow_restart {
            return Ok(MemoryCheck::Collected { heap_used });
        }

        drop(browser);
        self.recover().await?;
        Ok(MemoryCheck::Restarted { heap_used })
    }

    /// Close the driver, wait, relaunch. A failed relaunch is fatal.
    pub async fn recover(&self) -> EngineResult<()> {
        let mut slot = self.browser.write().await;
        if let Some(old) = slot.take() {
            if let Err(e) = old.close().await {
                warn!(error = %e, "closing browser before recovery failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(self.config.recovery_delay_ms)).await;

        let browser = self.launcher.launch().await.map_err(EngineError::Recovery)?;
        info!("browser relaunched");
        *slot = Some(browser);
        Ok(())
    }

    pub async fn shutdown(&self) -> EngineResult<()> {
        let browser = self.browser.write().await.take();
        if let Some(browser) = browser {
            browser.close().await?;
            info!("browser closed");
        }
        Ok(())
    }
}
