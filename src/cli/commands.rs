use std::path::Path;

use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::report::console::format_console_report;
use crate::report::html::generate_html_report;
use crate::report::junit::generate_junit_xml;
use crate::report::report_model::AllSuitesSummary;
use crate::service::TestAutomationService;
use crate::spec::orchestrator::ExecutionPolicy;
use crate::spec::spec_model::{TestSuite, TestSuiteRun};

// ============================================================================
// run subcommand
// ============================================================================

/// Run suites and return whether every suite PASSED.
pub async fn cmd_run(
    service: &TestAutomationService,
    suite_path: &str,
    suite_id: Option<&str>,
    parallel: bool,
    format: &str,
    output: Option<&str>,
) -> EngineResult<bool> {
    let suites = load_suites(suite_path)?;
    if suites.is_empty() {
        warn!(path = suite_path, "no test suites found");
        return Ok(true);
    }

    let runs = match suite_id {
        Some(id) => vec![settle_single(service.run_test_suite_by_id(&suites, id).await)?],
        None => {
            let policy = if parallel {
                service.parallel_policy()
            } else {
                ExecutionPolicy::Sequential
            };
            info!(suites = suites.len(), parallel, "running test suites");
            service.run_all_test_suites(&suites, policy).await?
        }
    };

    let all_passed = AllSuitesSummary::from_runs(&runs).all_passed();
    let content = render(&runs, format)?;
    write_output(output, &content)?;
    Ok(all_passed)
}

/// An aborted suite still produces a report.
fn settle_single(result: EngineResult<TestSuiteRun>) -> EngineResult<TestSuiteRun> {
    match result {
        Err(EngineError::SuiteAborted { suite_run, .. }) => Ok(*suite_run),
        other => other,
    }
}

pub fn render(runs: &[TestSuiteRun], format: &str) -> EngineResult<String> {
    Ok(match format {
        "html" => generate_html_report(runs),
        "junit" => generate_junit_xml(runs),
        "json" => serde_json::to_string_pretty(runs)?,
        _ => format_console_report(runs),
    })
}

/// Load suites from a single YAML/JSON file or a directory of them, the
/// latter sorted by file name. A file may hold one suite or a list.
pub fn load_suites(path: &str) -> EngineResult<Vec<TestSuite>> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_dir() {
        return parse_suite_file(Path::new(path));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let p = entry?.path();
        if p.extension()
            .is_some_and(|e| e == "yaml" || e == "yml" || e == "json")
        {
            files.push(p);
        }
    }
    files.sort();

    let mut suites = Vec::new();
    for file in files {
        suites.extend(parse_suite_file(&file)?);
    }
    Ok(suites)
}

fn parse_suite_file(path: &Path) -> EngineResult<Vec<TestSuite>> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path.extension().is_some_and(|e| e == "json");

    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<TestSuite>),
        One(TestSuite),
    }

    let parsed: OneOrMany = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(match parsed {
        OneOrMany::Many(suites) => suites,
        OneOrMany::One(suite) => vec![suite],
    })
}

// ============================================================================
// crawl subcommand
// ============================================================================

pub async fn cmd_crawl(
    service: &TestAutomationService,
    url: &str,
    output: Option<&str>,
) -> EngineResult<()> {
    let result = service.crawl_page(url).await?;
    let stats = service.get_stats();
    info!(
        elements = stats.elements_found,
        errors = stats.error_count,
        duration_ms = stats.crawl_duration_ms,
        "crawl finished"
    );
    let content = serde_json::to_string_pretty(&result)?;
    write_output(output, &format!("{}\n", content))
}

// ============================================================================
// artifacts subcommand
// ============================================================================

pub async fn cmd_artifacts(service: &TestAutomationService, prefix: &str) -> EngineResult<()> {
    let listing = service.list_artifacts(prefix).await?;
    println!("logs ({}):", listing.logs.len());
    for name in &listing.logs {
        println!("  {}", name);
    }
    println!("screenshots ({}):", listing.screenshots.len());
    for name in &listing.screenshots {
        println!("  {}", name);
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn write_output(output: Option<&str>, content: &str) -> EngineResult<()> {
    match output {
        Some(path) => std::fs::write(path, content)?,
        None => print!("{}", content),
    }
    Ok(())
}
