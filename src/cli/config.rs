use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::discovery::crawler::DiscoveryConfig;
use crate::recovery::retry::RetryPolicy;
use crate::recovery::supervisor::RecoveryConfig;
use crate::service::ServiceConfig;
use crate::spec::context::ExecutionConfig;

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "webtest",
    version,
    about = "Run declarative web test suites and discover testable elements"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: webtest.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run test suites from YAML or JSON files
    Run {
        /// Suite file or directory of suite files
        #[arg(long)]
        suite: String,

        /// Only run the suite with this id
        #[arg(long)]
        suite_id: Option<String>,

        /// Run suites concurrently in isolated contexts
        #[arg(long)]
        parallel: bool,

        /// Output format: console, html, junit, json
        #[arg(long)]
        format: Option<String>,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Crawl a page and list its testable elements as JSON
    Crawl {
        /// Absolute http(s) URL
        #[arg(long)]
        url: String,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List stored run logs and screenshots
    Artifacts {
        /// Only list artifacts whose name starts with this test case id
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `webtest.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_node")]
    pub node_binary: String,

    #[serde(default = "default_script")]
    pub script: PathBuf,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            node_binary: default_node(),
            script: default_script(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    #[serde(default)]
    pub parallel: bool,

    #[serde(default = "default_four")]
    pub max_parallel_suites: usize,

    #[serde(default = "default_console")]
    pub format: String,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_parallel_suites: 4,
            format: default_console(),
        }
    }
}

// Serde default helpers
fn default_node() -> String { "node".to_string() }
fn default_script() -> PathBuf { PathBuf::from("node/browser_server.js") }
fn default_results_dir() -> PathBuf { PathBuf::from("test-results") }
fn default_four() -> usize { 4 }
fn default_console() -> String { "console".to_string() }

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Missing file gives defaults; a malformed
/// file is reported and also gives defaults.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or("webtest.yaml");
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|e| {
            warn!(path = config_path, error = %e, "ignoring malformed config file");
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    }
}

// ============================================================================
// Service wiring
// ============================================================================

impl AppConfig {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            execution: self.execution.clone(),
            retry: self.retry.clone(),
            recovery: self.recovery.clone(),
            discovery: self.discovery.clone(),
            results_dir: self.artifacts.results_dir.clone(),
            max_parallel_suites: self.orchestration.max_parallel_suites,
        }
    }
}
