use thiserror::Error;

use crate::spec::spec_model::{Action, AssertionType, TestSuiteRun};

/// Errors reported by a browser driver implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Node.js subprocess failed to spawn (browser_server.js)
    #[error("Failed to spawn {script} (is Node.js installed?): {source}")]
    SubprocessSpawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the driver process failed
    #[error("Browser session I/O failed: {0}")]
    SessionIO(String),

    /// The driver answered a command with `ok: false`
    #[error("Browser command '{command}' failed: {error}")]
    SessionProtocol { command: String, error: String },

    /// A driver payload could not be encoded or decoded
    #[error("JSON error ({context}): {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Timed out after {ms}ms waiting for {what}")]
    Timeout { what: String, ms: u64 },

    #[error("No element matches selector '{0}'")]
    ElementNotFound(String),

    /// Node handle no longer attached to the document, or not inspectable
    #[error("Node '{0}' is detached or inaccessible")]
    Detached(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Browser is closed")]
    Closed,
}

impl DriverError {
    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DriverError::SessionIO(_)
                | DriverError::Timeout { .. }
                | DriverError::Navigation { .. }
                | DriverError::Closed
        )
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Errors raised by the orchestration and discovery engines.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid test suite: {0}")]
    InvalidSuite(String),

    #[error("Step {step}: action '{action}' requires a value")]
    MissingValue { step: u32, action: Action },

    #[error("Step {step}: action '{action}' requires a selector")]
    MissingSelector { step: u32, action: Action },

    #[error("Step {step}: unsupported action '{action}'")]
    UnsupportedAction { step: u32, action: Action },

    #[error("Step {step} failed: {source}")]
    StepFailed {
        step: u32,
        #[source]
        source: DriverError,
    },

    #[error("Assertion '{assertion}' requires '{field}'")]
    MissingField {
        assertion: AssertionType,
        field: &'static str,
    },

    #[error("Assertion '{assertion}' has an invalid expected value '{value}'")]
    InvalidExpectedValue {
        assertion: AssertionType,
        value: String,
    },

    #[error("Assertion '{assertion}' failed: expected {expected}, observed {observed}")]
    AssertionFailed {
        assertion: AssertionType,
        expected: String,
        observed: String,
    },

    #[error("Test case '{case}' exceeded its deadline of {ms}ms")]
    DeadlineExceeded { case: String, ms: u64 },

    #[error("'{operation}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Browser recovery failed: {0}")]
    Recovery(#[source] DriverError),

    #[error("Test suite not found: {0}")]
    SuiteNotFound(String),

    /// A fatal error stopped a suite; the run is finalized with what completed.
    #[error("Test suite '{}' aborted: {source}", .suite_run.test_suite_id)]
    SuiteAborted {
        suite_run: Box<TestSuiteRun>,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Service has not been started")]
    NotStarted,

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    /// Transient infrastructure failures are retried; validation and
    /// assertion failures never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Driver(e) => e.is_transient(),
            EngineError::StepFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Render an error and its `source()` chain, one cause per line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}
