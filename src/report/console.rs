use crate::report::report_model::AllSuitesSummary;
use crate::spec::spec_model::{TestRun, TestStatus, TestSuiteRun};

// ============================================================================
// Console reporter
// ============================================================================

/// Format suite runs for terminal output.
///
/// Produces output like:
/// ```text
/// === Test Suite: checkout (FAILED) ===
///
/// ✓ PASS     login (2 steps, 1 assertions)
/// ✗ FAIL     pay (1 steps, 0 assertions)
///     [ERROR] Step 1 failed: Navigation to https://pay.test failed
/// ⊘ BLOCKED  receipt
///
/// === Results: 1 passed, 1 failed, 1 blocked, 0 skipped (3 total) in 1.2s ===
/// ```
pub fn format_console_report(runs: &[TestSuiteRun]) -> String {
    let mut out = String::new();

    for run in runs {
        out.push_str(&format!(
            "=== Test Suite: {} ({}) ===\n\n",
            run.test_suite_id, run.status
        ));

        if let Some(ref error) = run.error_message {
            out.push_str(&format!("[ABORTED] {}\n", error));
        }

        for case in &run.test_runs {
            format_case(&mut out, case);
        }

        out.push_str(&format!(
            "\n=== Results: {} passed, {} failed, {} blocked, {} skipped ({} total)",
            run.passed_tests, run.failed_tests, run.blocked_tests, run.skipped_tests, run.total_tests
        ));
        if let Some(ms) = run.duration {
            out.push_str(&format!(" in {:.1}s", ms as f64 / 1000.0));
        }
        out.push_str(" ===\n\n");
    }

    if runs.len() > 1 {
        let all = AllSuitesSummary::from_runs(runs);
        out.push_str(&format!(
            "=== {} of {} suites passed ({:.1}% of tests) ===\n",
            all.passed_suites, all.total_suites, all.pass_rate
        ));
    }

    out
}

fn format_case(out: &mut String, case: &TestRun) {
    let marker = match case.status {
        TestStatus::Passed => "\u{2713} PASS   ",
        TestStatus::Failed => "\u{2717} FAIL   ",
        TestStatus::Blocked => "\u{2298} BLOCKED",
        TestStatus::Skipped => "- SKIP   ",
        TestStatus::NotRun | TestStatus::Running => "? ----   ",
    };

    match case.status {
        TestStatus::Blocked | TestStatus::Skipped => {
            out.push_str(&format!("{}  {}\n", marker, case.test_case_id));
            return;
        }
        _ => out.push_str(&format!(
            "{}  {} ({} steps, {} assertions)\n",
            marker,
            case.test_case_id,
            case.logs.steps.len(),
            case.logs.assertions.len()
        )),
    }

    if case.status != TestStatus::Failed {
        return;
    }

    if let Some(failed_step) = case.logs.steps.iter().find(|s| !s.passed) {
        let detail = failed_step.error.as_deref().unwrap_or("step failed");
        out.push_str(&format!("    [ERROR] {}\n", detail));
    } else if let Some(ref error) = case.error_message {
        out.push_str(&format!("    [ERROR] {}\n", error));
    }

    for a in case.logs.assertions.iter().filter(|a| !a.passed) {
        let detail = a.error.as_deref().unwrap_or("assertion failed");
        out.push_str(&format!("    [FAIL] {}: {}\n", a.assertion_type, detail));
    }
}
