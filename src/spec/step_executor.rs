use std::time::Duration;

use tracing::debug;

use crate::browser::driver::{LoadState, Page};
use crate::error::{DriverError, DriverResult, EngineError, EngineResult};
use crate::selector::resolve_selector;
use crate::spec::context::ExecutionConfig;
use crate::spec::spec_model::{Action, Step, TestData};

/// Literal `value` first, then the fixture named by `testData` from the
/// valid or invalid set. Absence is `None`, never an error.
pub fn resolve_value(step: &Step, data: &TestData) -> Option<String> {
    if let Some(value) = &step.value {
        return Some(value.clone());
    }
    let key = step.test_data.as_deref()?;
    data.lookup(key, step.use_valid_data.unwrap_or(true))
}

/// Perform one step against `page`. Never screenshots; the runner does that.
pub async fn execute_step(
    page: &dyn Page,
    step: &Step,
    data: &TestData,
    config: &ExecutionConfig,
) -> EngineResult<()> {
    let selector = resolve_selector(step.selector.as_ref());
    let value = resolve_value(step, data);
    let limit = Duration::from_millis(step.timeout.unwrap_or(config.action_timeout_ms));
    let n = step.step_number;

    debug!(step = n, action = %step.action, selector = %selector, "executing step");

    let require_selector = || {
        if selector.is_empty() {
            Err(EngineError::MissingSelector {
                step: n,
                action: step.action,
            })
        } else {
            Ok(selector.as_str())
        }
    };
    let require_value = || {
        value.as_deref().ok_or(EngineError::MissingValue {
            step: n,
            action: step.action,
        })
    };

    match step.action {
        Action::Navigate => match value.as_deref() {
            Some(url) => bounded(n, limit, page.goto(url)).await?,
            None => bounded(n, limit, page.reload()).await?,
        },
        Action::Click => bounded(n, limit, page.click(require_selector()?)).await?,
        Action::Hover => bounded(n, limit, page.hover(require_selector()?)).await?,
        Action::Submit => bounded(n, limit, page.submit(require_selector()?)).await?,
        Action::Check => bounded(n, limit, page.check(require_selector()?)).await?,
        Action::Uncheck => bounded(n, limit, page.uncheck(require_selector()?)).await?,
        Action::Clear => bounded(n, limit, page.fill(require_selector()?, "")).await?,
        Action::Type => {
            let text = require_value()?;
            bounded(n, limit, page.fill(require_selector()?, text)).await?
        }
        Action::Select => {
            let option = require_value()?;
            bounded(n, limit, page.select_option(require_selector()?, option)).await?
        }
        Action::Wait => {
            let pause = Duration::from_millis(step.timeout.unwrap_or(config.wait_ms));
            page.wait_for_timeout(pause)
                .await
                .map_err(|source| EngineError::StepFailed { step: n, source })?
        }
        Action::Screenshot | Action::Assert => {
            return Err(EngineError::UnsupportedAction {
                step: n,
                action: step.action,
            });
        }
    }

    if step.wait_for_navigation {
        bounded(n, limit, page.wait_for_load_state(LoadState::NetworkIdle)).await?;
    }
    Ok(())
}

/// Run one driver call under the step's time limit.
async fn bounded<F>(step: u32, limit: Duration, call: F) -> EngineResult<()>
where
    F: Future<Output = DriverResult<()>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(|source| EngineError::StepFailed { step, source }),
        Err(_) => Err(EngineError::StepFailed {
            step,
            source: DriverError::Timeout {
                what: format!("step {}", step),
                ms: limit.as_millis() as u64,
            },
        }),
    }
}
