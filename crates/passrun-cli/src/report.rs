//! Human-readable rendering of a run summary.

use passrun::{RunSummary, Stage, StageResult, TestRecord};
use std::fmt::Write;

/// Failure detail lines shown per test.
const DETAIL_LINES: usize = 6;

/// Render the full report: one line per test, then totals.
pub fn render(summary: &RunSummary) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Run ID: {}", summary.run_id);
    let _ = writeln!(
        out,
        "Status: {}",
        if summary.success() { "✓ PASSED" } else { "✗ FAILED" }
    );
    let _ = writeln!(out, "Duration: {}ms", summary.duration_ms);
    let _ = writeln!(out);

    for record in &summary.tests {
        render_record(&mut out, record);
    }

    if !summary.collisions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Name collisions (run one at a time):");
        for name in &summary.collisions {
            let _ = writeln!(out, "  - {}", name);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Stages: {} discovered, {} compiled, {} linked, {} executed ({} files scanned)",
        summary.discovered, summary.compiled, summary.linked, summary.executed, summary.files_scanned
    );
    let _ = writeln!(
        out,
        "Failures: {} compile, {} link, {} execute",
        summary.failures_at(Stage::Compile).len(),
        summary.failures_at(Stage::Link).len(),
        summary.failures_at(Stage::Execute).len()
    );
    let _ = writeln!(out, "Summary: {}/{} tests passed", summary.passed, summary.discovered);

    out
}

fn render_record(out: &mut String, record: &TestRecord) {
    let (glyph, status) = match (&record.result, &record.failure) {
        (StageResult::Ran(0), _) => ("✓", "passed".to_string()),
        (_, Some(failure)) => (
            "✗",
            match failure.exit_code {
                Some(code) => format!("failed at {} (exit code: {})", failure.stage, code),
                None => format!("failed at {}", failure.stage),
            },
        ),
        (StageResult::Pending, None) => ("✗", "aborted".to_string()),
        (other, None) => ("✗", other.to_string()),
    };

    let _ = writeln!(
        out,
        "  {} {} {} ({}ms)",
        glyph, record.case.name, status, record.duration_ms
    );
    let _ = writeln!(out, "      {}", record.case.source.display());

    if let Some(failure) = &record.failure {
        let lines: Vec<&str> = failure.detail.lines().collect();
        for line in lines.iter().take(DETAIL_LINES) {
            let _ = writeln!(out, "      | {}", line);
        }
        if lines.len() > DETAIL_LINES {
            let _ = writeln!(out, "      | ... ({} more lines)", lines.len() - DETAIL_LINES);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passrun::{Aggregator, StageFailure, TestCase, ToolchainConfig};

    fn record(name: &str, result: StageResult, failure: Option<StageFailure>) -> TestRecord {
        let config = ToolchainConfig::builder("x64").unwrap().build().unwrap();
        TestRecord {
            case: TestCase::new(name, format!("tests/{}.pass.cpp", name), &config),
            result,
            failure,
            duration_ms: 7,
        }
    }

    fn summary(records: Vec<TestRecord>, collisions: Vec<String>) -> RunSummary {
        let mut agg = Aggregator::new();
        for (i, r) in records.into_iter().enumerate() {
            agg.record(i, r);
        }
        agg.finish("run-1".to_string(), chrono::Utc::now(), 9, collisions, "d".to_string())
    }

    #[test]
    fn test_report_names_failing_stage() {
        let s = summary(
            vec![
                record("add", StageResult::Ran(0), None),
                record(
                    "broken",
                    StageResult::CompileFailed,
                    Some(StageFailure::new(Stage::Compile, Some(1), "error: expected ';'")),
                ),
                record(
                    "crashes",
                    StageResult::ExecutionFailed,
                    Some(StageFailure::new(Stage::Execute, Some(1), "exited with code 1")),
                ),
            ],
            Vec::new(),
        );

        let text = render(&s);
        assert!(text.contains("✓ add passed"));
        assert!(text.contains("✗ broken failed at compile (exit code: 1)"));
        assert!(text.contains("| error: expected ';'"));
        assert!(text.contains("✗ crashes failed at execute (exit code: 1)"));
        assert!(text.contains("Failures: 1 compile, 0 link, 1 execute"));
        assert!(text.contains("Summary: 1/3 tests passed"));
        assert!(text.contains("✗ FAILED"));
    }

    #[test]
    fn test_report_lists_collisions_and_aborted() {
        let s = summary(
            vec![
                record("x", StageResult::Ran(0), None),
                record("x", StageResult::Pending, None),
            ],
            vec!["x".to_string()],
        );

        let text = render(&s);
        assert!(text.contains("Name collisions"));
        assert!(text.contains("  - x"));
        assert!(text.contains("✗ x aborted"));
    }

    #[test]
    fn test_long_detail_is_truncated() {
        let detail = (0..20).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let s = summary(
            vec![record(
                "noisy",
                StageResult::LinkFailed,
                Some(StageFailure::new(Stage::Link, Some(1), detail)),
            )],
            Vec::new(),
        );

        let text = render(&s);
        assert!(text.contains("| line 5"));
        assert!(!text.contains("| line 6"));
        assert!(text.contains("(14 more lines)"));
    }

    #[test]
    fn test_empty_run_passes() {
        let text = render(&summary(Vec::new(), Vec::new()));
        assert!(text.contains("✓ PASSED"));
        assert!(text.contains("Summary: 0/0 tests passed"));
    }
}
