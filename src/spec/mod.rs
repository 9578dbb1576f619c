pub mod assertion;
pub mod context;
pub mod dependency;
pub mod orchestrator;
pub mod runner;
pub mod spec_model;
pub mod step_executor;
pub mod suite;
