//! Result aggregation for a harness run.

use crate::error::StageFailure;
use crate::resolve::TestCase;
use crate::stage::{Stage, StageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Final state of one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub case: TestCase,
    pub result: StageResult,
    /// Why the test stopped, when it did not pass.
    pub failure: Option<StageFailure>,
    /// Wall-clock time for this test's whole pipeline.
    pub duration_ms: u64,
}

impl TestRecord {
    pub fn passed(&self) -> bool {
        self.result.is_pass()
    }
}

/// Collects test records as pipelines finish, in any order.
///
/// Pure bookkeeping; recording never fails.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: BTreeMap<usize, TestRecord>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the final state of the test discovered at position `index`.
    ///
    /// A later record for the same index replaces the earlier one.
    pub fn record(&mut self, index: usize, record: TestRecord) {
        self.records.insert(index, record);
    }

    /// Whether the test at `index` has been recorded.
    pub fn contains(&self, index: usize) -> bool {
        self.records.contains_key(&index)
    }

    /// Number of records so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Produce the run summary, ordered by discovery position.
    pub fn finish(
        self,
        run_id: String,
        started_at: DateTime<Utc>,
        files_scanned: usize,
        collisions: Vec<String>,
        config_digest: String,
    ) -> RunSummary {
        let tests: Vec<TestRecord> = self.records.into_values().collect();

        let count = |pred: fn(&StageResult) -> bool| tests.iter().filter(|t| pred(&t.result)).count();
        let discovered = tests.len();
        let compiled = count(StageResult::reached_compiled);
        let linked = count(StageResult::reached_linked);
        let executed = count(StageResult::reached_execution);
        let passed = count(StageResult::is_pass);

        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        RunSummary {
            run_id,
            started_at,
            finished_at,
            duration_ms,
            config_digest,
            files_scanned,
            discovered,
            compiled,
            linked,
            executed,
            passed,
            failed: discovered - passed,
            collisions,
            tests,
        }
    }
}

/// Ordered outcome of every test in one run plus derived counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// Digest of the toolchain configuration used.
    pub config_digest: String,

    /// Regular files visited by discovery, tests or not.
    pub files_scanned: usize,
    /// Files accepted as test cases.
    pub discovered: usize,
    pub compiled: usize,
    pub linked: usize,
    pub executed: usize,
    pub passed: usize,
    pub failed: usize,

    /// Canonical names produced by more than one source file.
    pub collisions: Vec<String>,

    /// Per-test records in discovery order.
    pub tests: Vec<TestRecord>,
}

impl RunSummary {
    /// Whether every discovered test passed.
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Tests that failed at `stage`.
    pub fn failures_at(&self, stage: Stage) -> Vec<&TestRecord> {
        self.tests
            .iter()
            .filter(|t| t.result.failed_stage() == Some(stage))
            .collect()
    }

    /// Record for the test named `name` (first one, if names collide).
    pub fn get(&self, name: &str) -> Option<&TestRecord> {
        self.tests.iter().find(|t| t.case.name == name)
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
