use crate::report::report_model::AllSuitesSummary;
use crate::spec::spec_model::{TestStatus, TestSuiteRun};

// ============================================================================
// HTML reporter
// ============================================================================

/// Generate a self-contained HTML report for one or more suite runs.
///
/// Green/red header from the overall outcome, one section per suite, one
/// card per case coloured by status, failure details and the inline final
/// screenshot of failed cases. Inline CSS only.
pub fn generate_html_report(runs: &[TestSuiteRun]) -> String {
    let summary = AllSuitesSummary::from_runs(runs);
    let header_color = if summary.all_passed() {
        "#4CAF50"
    } else {
        "#f44336"
    };
    let status_text = if summary.all_passed() {
        "ALL SUITES PASSED"
    } else {
        "SOME SUITES FAILED"
    };

    let mut sections = String::new();
    for run in runs {
        sections.push_str(&format!(
            "<h2>{} <span class=\"badge {}\">{}</span></h2>\n",
            escape_html(&run.test_suite_id),
            status_class(run.status),
            run.status
        ));
        if let Some(ref error) = run.error_message {
            sections.push_str(&format!(
                "<p class=\"error\">Aborted: {}</p>\n",
                escape_html(error)
            ));
        }

        for case in &run.test_runs {
            sections.push_str(&format!(
                "<div class=\"test-case {class}\">\n<h3>{id}: {status}</h3>\n<p>Steps: {steps} | Assertions: {assertions} | {duration}ms</p>\n",
                class = status_class(case.status),
                id = escape_html(&case.test_case_id),
                status = case.status,
                steps = case.logs.steps.len(),
                assertions = case.logs.assertions.len(),
                duration = case.duration.unwrap_or(0),
            ));

            if let Some(ref error) = case.error_message {
                sections.push_str(&format!(
                    "<p class=\"error\">{}</p>\n",
                    escape_html(error)
                ));
            }

            let failed: Vec<_> = case.logs.assertions.iter().filter(|a| !a.passed).collect();
            if !failed.is_empty() {
                sections.push_str("<ul class=\"failures\">\n");
                for a in failed {
                    let msg = a.error.as_deref().unwrap_or("assertion failed");
                    sections.push_str(&format!(
                        "<li>{}: {}</li>\n",
                        a.assertion_type,
                        escape_html(msg)
                    ));
                }
                sections.push_str("</ul>\n");
            }

            if let Some(ref png) = case.screenshot {
                sections.push_str(&format!(
                    "<img class=\"shot\" alt=\"final page state\" src=\"data:image/png;base64,{}\">\n",
                    png
                ));
            }
            sections.push_str("</div>\n");
        }
    }

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Web Test Report</title>
<style>
body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 0; padding: 0; background: #f5f5f5; }}
.header {{ background: {header_color}; color: white; padding: 20px 30px; }}
.header h1 {{ margin: 0 0 8px 0; font-size: 24px; }}
.header p {{ margin: 0; font-size: 16px; opacity: 0.9; }}
.content {{ max-width: 900px; margin: 20px auto; padding: 0 20px; }}
.badge {{ font-size: 12px; padding: 2px 8px; border-radius: 4px; color: white; background: #999; }}
.badge.pass {{ background: #4CAF50; }}
.badge.fail {{ background: #f44336; }}
.badge.blocked {{ background: #FF9800; }}
.test-case {{ background: white; border-radius: 6px; padding: 16px 20px; margin-bottom: 12px; border-left: 4px solid #ccc; }}
.test-case.pass {{ border-left-color: #4CAF50; }}
.test-case.fail {{ border-left-color: #f44336; }}
.test-case.blocked {{ border-left-color: #FF9800; }}
.test-case h3 {{ margin: 0 0 8px 0; font-size: 16px; }}
.test-case p {{ margin: 4px 0; color: #666; font-size: 14px; }}
.error {{ color: #f44336; font-weight: bold; }}
.failures {{ margin: 8px 0 0 0; padding-left: 20px; }}
.failures li {{ color: #c62828; font-size: 13px; margin-bottom: 4px; }}
.shot {{ max-width: 100%; margin-top: 8px; border: 1px solid #ddd; }}
</style>
</head>
<body>
<div class="header">
<h1>{status_text}</h1>
<p>{passed} passed, {failed} failed, {blocked} blocked, {skipped} skipped ({total} tests in {suites} suites)</p>
</div>
<div class="content">
{sections}
</div>
</body>
</html>"##,
        header_color = header_color,
        status_text = status_text,
        passed = summary.passed_tests,
        failed = summary.failed_tests,
        blocked = summary.blocked_tests,
        skipped = summary.skipped_tests,
        total = summary.total_tests,
        suites = summary.total_suites,
        sections = sections,
    )
}

fn status_class(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "pass",
        TestStatus::Failed => "fail",
        TestStatus::Blocked => "blocked",
        TestStatus::Skipped | TestStatus::NotRun | TestStatus::Running => "skip",
    }
}

/// Escape HTML special characters.
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
