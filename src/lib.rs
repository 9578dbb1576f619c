//! Functional testing engine for web applications.
//!
//! Two engines sit on top of an abstract browser capability
//! ([`browser::driver`]):
//!
//! - **orchestration** ([`spec`]): runs declarative test suites (steps then
//!   assertions) with dependency gating, per-case deadlines, retry and
//!   driver recovery, producing `TestSuiteRun` records and artifacts;
//! - **discovery** ([`discovery`]): crawls a page and classifies forms,
//!   buttons, navigation links and inputs with stable selectors.
//!
//! [`service::TestAutomationService`] owns the browser lifecycle and exposes
//! both engines.

pub mod artifact;
pub mod browser;
pub mod cli;
pub mod discovery;
pub mod error;
pub mod recovery;
pub mod report;
pub mod selector;
pub mod service;
pub mod spec;

pub use error::{DriverError, EngineError, EngineResult};
pub use service::{ServiceConfig, TestAutomationService};
