use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{info, warn};
use url::Url;

use crate::browser::driver::{Browser, LoadState, Page};
use crate::discovery::classifier::classify_page;
use crate::discovery::element_model::{CrawlResult, CrawlStats, TestableElement};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Load milestone awaited after navigation
    pub load_state: LoadState,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            load_state: LoadState::DomContentLoaded,
        }
    }
}

/// Crawl one page in a fresh context and classify its interactive elements.
///
/// The URL is validated before any driver call. The page and context are
/// closed on every exit path.
pub async fn crawl_page(
    browser: &dyn Browser,
    url: &str,
    config: &DiscoveryConfig,
) -> EngineResult<(CrawlResult, CrawlStats)> {
    validate_url(url)?;

    let started = Instant::now();
    let context = browser.new_context().await?;
    let page = match context.new_page().await {
        Ok(page) => page,
        Err(e) => {
            let _ = context.close().await;
            return Err(e.into());
        }
    };

    let outcome = crawl_in_page(page.as_ref(), url, config).await;

    if let Err(e) = page.close().await {
        warn!(error = %e, "failed to close crawl page");
    }
    if let Err(e) = context.close().await {
        warn!(error = %e, "failed to close crawl context");
    }

    let (result, error_count) = outcome?;
    let memory_usage = browser.memory_usage().await.unwrap_or_default();
    let stats = CrawlStats {
        memory_usage,
        crawl_duration_ms: started.elapsed().as_millis() as u64,
        elements_found: result.elements.len(),
        error_count,
    };

    info!(
        url,
        elements = stats.elements_found,
        errors = stats.error_count,
        duration_ms = stats.crawl_duration_ms,
        "crawl complete"
    );
    Ok((result, stats))
}

async fn crawl_in_page(
    page: &dyn Page,
    url: &str,
    config: &DiscoveryConfig,
) -> EngineResult<(CrawlResult, usize)> {
    page.goto(url).await?;
    page.wait_for_load_state(config.load_state).await?;

    let title = page.title().await?;
    let classification = classify_page(page).await;
    let signature = signature(&classification.elements);

    Ok((
        CrawlResult {
            url: url.to_string(),
            title,
            elements: classification.elements,
            timestamp: Utc::now(),
            signature,
        },
        classification.error_count,
    ))
}

/// SHA-1 over the ordered element selectors.
pub fn signature(elements: &[TestableElement]) -> String {
    let mut hasher = Sha1::new();
    for el in elements {
        hasher.update(el.identifier.value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Accept absolute `http`/`https` URLs with a host.
pub fn validate_url(url: &str) -> EngineResult<()> {
    let invalid = |reason: String| EngineError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}
