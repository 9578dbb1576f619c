use crate::spec::spec_model::{TestRun, TestStatus, TestSuiteRun};

// ============================================================================
// JUnit XML reporter
// ============================================================================

/// Generate JUnit XML for CI systems, one `<testsuite>` per suite run.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <testsuites tests="3" failures="1" skipped="1">
///   <testsuite name="checkout" tests="3" failures="1" skipped="1" time="1.234">
///     <testcase name="login" classname="checkout" time="0.200" />
///     <testcase name="pay" classname="checkout" time="0.500">
///       <failure message="Step 1 failed: ..." type="ExecutionError">...</failure>
///     </testcase>
///     <testcase name="receipt" classname="checkout"><skipped message="Blocked: ..." /></testcase>
///   </testsuite>
/// </testsuites>
/// ```
///
/// BLOCKED and SKIPPED cases both map to `<skipped>`.
pub fn generate_junit_xml(runs: &[TestSuiteRun]) -> String {
    let mut suites = String::new();
    let (mut tests, mut failures, mut skipped) = (0, 0, 0);

    for run in runs {
        let suite_skipped = run.blocked_tests + run.skipped_tests;
        tests += run.total_tests;
        failures += run.failed_tests;
        skipped += suite_skipped;

        let time_attr = run
            .duration
            .map(|ms| format!(" time=\"{:.3}\"", ms as f64 / 1000.0))
            .unwrap_or_default();

        suites.push_str(&format!(
            "  <testsuite name=\"{name}\" tests=\"{tests}\" failures=\"{failures}\" skipped=\"{skipped}\"{time}>\n",
            name = escape_xml(&run.test_suite_id),
            tests = run.total_tests,
            failures = run.failed_tests,
            skipped = suite_skipped,
            time = time_attr,
        ));
        for case in &run.test_runs {
            suites.push_str(&format_case(&run.test_suite_id, case));
        }
        suites.push_str("  </testsuite>\n");
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuites tests=\"{}\" failures=\"{}\" skipped=\"{}\">\n{}</testsuites>\n",
        tests, failures, skipped, suites
    )
}

fn format_case(suite_id: &str, case: &TestRun) -> String {
    let name = escape_xml(&case.test_case_id);
    let classname = escape_xml(suite_id);
    let time = case
        .duration
        .map(|ms| format!(" time=\"{:.3}\"", ms as f64 / 1000.0))
        .unwrap_or_default();

    match case.status {
        TestStatus::Passed => format!(
            "    <testcase name=\"{}\" classname=\"{}\"{} />\n",
            name, classname, time
        ),
        TestStatus::Blocked | TestStatus::Skipped | TestStatus::NotRun | TestStatus::Running => {
            let message = case.error_message.as_deref().unwrap_or("not run");
            format!(
                "    <testcase name=\"{}\" classname=\"{}\"><skipped message=\"{}\" /></testcase>\n",
                name,
                classname,
                escape_xml(message)
            )
        }
        TestStatus::Failed => {
            let failed_assertions: Vec<String> = case
                .logs
                .assertions
                .iter()
                .filter(|a| !a.passed)
                .map(|a| {
                    format!(
                        "{}: {}",
                        a.assertion_type,
                        a.error.as_deref().unwrap_or("assertion failed")
                    )
                })
                .collect();

            let kind = if failed_assertions.is_empty() {
                "ExecutionError"
            } else {
                "AssertionFailure"
            };
            let message = case.error_message.as_deref().unwrap_or("test case failed");

            let mut body_parts = failed_assertions;
            if let Some(ref trace) = case.stack_trace {
                body_parts.push(trace.clone());
            }

            format!(
                "    <testcase name=\"{name}\" classname=\"{classname}\"{time}>\n      <failure message=\"{message}\" type=\"{kind}\">{body}</failure>\n    </testcase>\n",
                name = name,
                classname = classname,
                time = time,
                message = escape_xml(message),
                kind = kind,
                body = escape_xml(&body_parts.join("\n")),
            )
        }
    }
}

/// Escape XML special characters.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
